use cubecast_proto::packets::{PlayerIdentification, ServerIdentification, SetPermission};

use crate::verify::{self, VerificationOutcome};

use super::bandwidth::BandwidthMode;

use super::*;

impl Session {
    /// Connecting → LoadingMain → Online. Nothing is registered anywhere
    /// until every check has passed.
    pub(super) fn login(&mut self) -> Result<(), SessionError> {
        let ip = self.handle.addr().ip();
        let ident = match self.read_packet_blocking(Phase::Login)? {
            ClientPacket::Handshake(ident) => ident,
            other => return Err(other.unexpected("Handshake").into()),
        };

        if let Err(e) = ident.check_version() {
            warn!(target: LOG_SUSPICIOUS, "{} ({ip}): {e}", ident.username);
            return Err(e.into());
        }
        if !verify::is_valid_name(&ident.username) {
            warn!(target: LOG_SUSPICIOUS, "Unacceptable player name {:?} from {ip}", ident.username);
            return Err(SessionError::protocol("Unacceptable player name!"));
        }

        let info = self.server.players().find_or_create(&ident.username);
        let _ = self.handle.info.set(Arc::clone(&info));
        let mode = info
            .bandwidth()
            .unwrap_or(BandwidthMode::Default)
            .resolve(self.server.config().bandwidth.mode);
        self.view.set_profile(mode.profile());

        self.verify_name(&info, &ident)?;
        self.check_bans(&info)?;
        self.check_paid(&info)?;

        if let Err(message) = self.server.hooks().connecting(&self.handle) {
            return Err(SessionError::login(message, LeaveReason::LoginFailed));
        }

        if ident.supports_extensions() {
            self.negotiate()?;
        }

        if self.server.is_shutting_down() {
            return Err(SessionError::login("Server shutting down", LeaveReason::ServerShutdown));
        }
        let registry = self.server.registry();
        if let Err(count) = registry.register(Arc::clone(&self.handle)) {
            return Err(SessionError::ServerFull(format!(
                "Sorry, server is full ({count}/{})",
                registry.capacity()
            )));
        }
        self.registered = true;
        self.server.players().record_login(&info, ip);

        self.handle.set_state(SessionState::LoadingMain);
        let rank = info.rank();
        let server = Arc::clone(&self.server);
        let config = server.config();
        self.send_now(&Packet::encode(&ServerIdentification::new(
            config.server.name.as_str(),
            config.server.motd.as_str(),
            rank.can(Permission::DeleteAdmincrete),
        )))?;

        let main = server.worlds().main();
        let joined = self.join_world_now(JoinRequest {
            world: main,
            target: JoinTarget::Spawn,
            reason: WorldChangeReason::FirstWorld,
        })?;
        if !joined {
            return Err(SessionError::WorldFull(
                "Either main world is full, or an error occurred.".to_string(),
            ));
        }

        self.announce_arrival(&info)?;
        self.announced = true;
        self.handle.set_state(SessionState::Online);
        self.flush()?;
        info!(
            "{} ({ip}) logged in as {} with {:?}",
            info.name(),
            rank.name,
            self.encoding.capabilities()
        );
        Ok(())
    }

    fn verify_name(
        &mut self,
        info: &PlayerInfo,
        ident: &PlayerIdentification,
    ) -> Result<(), SessionError> {
        let ip = self.handle.addr().ip();
        let security = &self.server.config().security;
        let token_valid = self
            .server
            .verifier()
            .verify(&ident.username, &ident.verification_key);
        let outcome = verify::resolve(
            security.verify_names,
            token_valid,
            ip,
            security.allow_unverified_lan,
            info.has_used_ip(ip),
        );
        match outcome {
            VerificationOutcome::Verified => {}
            VerificationOutcome::Rejected => {
                self.server.players().record_failed_login(info, ip);
                warn!(
                    target: LOG_SUSPICIOUS,
                    "Could not verify name of {} from {ip}", ident.username
                );
                return Err(SessionError::login(
                    "Could not verify player name!",
                    LeaveReason::UnverifiedName,
                ));
            }
            VerificationOutcome::AcceptedLoopback
            | VerificationOutcome::AcceptedLan
            | VerificationOutcome::AcceptedReturningIp
            | VerificationOutcome::AdmittedUnverified => {}
        }
        if let Some(how) = outcome.unverified_admission() {
            warn!(
                target: LOG_SUSPICIOUS,
                "{} ({ip}) logged in without name verification, {how}",
                ident.username
            );
        }
        self.handle
            .verified
            .store(outcome != VerificationOutcome::AdmittedUnverified, Ordering::Release);
        if outcome == VerificationOutcome::AdmittedUnverified {
            self.handle.message("&WYour name could not be verified.");
        }
        Ok(())
    }

    fn check_bans(&mut self, info: &PlayerInfo) -> Result<(), SessionError> {
        let ip = self.handle.addr().ip();
        if let Some(ban) = info.ban() {
            self.server.players().record_failed_login(info, ip);
            warn!(target: LOG_SUSPICIOUS, "Banned player {} tried to log in from {ip}", info.name());
            return Err(SessionError::login(ban.describe(&info.name()), LeaveReason::LoginFailed));
        }
        if let Some(ban) = self.server.ip_bans().lookup(ip) {
            self.server.players().record_failed_login(info, ip);
            warn!(
                target: LOG_SUSPICIOUS,
                "{} tried to log in from banned IP {ip}",
                info.name()
            );
            return Err(SessionError::login(ban.describe("Your IP"), LeaveReason::LoginFailed));
        }
        Ok(())
    }

    fn check_paid(&mut self, info: &PlayerInfo) -> Result<(), SessionError> {
        if !self.server.config().security.paid_players_only {
            return Ok(());
        }
        self.send_now(&Packet::encode(&ServerIdentification::new(
            self.server.config().server.name.as_str(),
            "Please wait; Checking paid status...",
            false,
        )))?;
        self.flush()?;
        match self.server.accounts().is_paid(&info.name()) {
            Ok(true) => Ok(()),
            Ok(false) => Err(SessionError::login(
                "Paid players allowed only.",
                LeaveReason::LoginFailed,
            )),
            Err(e) => {
                warn!("Paid status check for {} failed: {e}", info.name());
                Err(SessionError::login(
                    "Paid players allowed only.",
                    LeaveReason::LoginFailed,
                ))
            }
        }
    }

    fn announce_arrival(&mut self, info: &PlayerInfo) -> Result<(), SessionError> {
        let server = Arc::clone(&self.server);
        let config = server.config();
        let rank = info.rank();

        if config.server.show_connection_messages && !info.is_hidden() {
            let text = format!("&S{}&S connected.", info.display_name());
            for other in server.registry().all() {
                if other.id() != self.handle.id() {
                    other.message(&text);
                }
            }
        }

        if !self.handle.is_verified() {
            for other in server.registry().all() {
                if other.id() != self.handle.id() && other.can(Permission::Hide) {
                    other.message(&format!(
                        "&WPlayer {}&W logged in without name verification.",
                        info.display_name()
                    ));
                }
            }
        }

        let mut lines = Vec::new();
        if info.is_frozen() {
            lines.push("&WYou are currently frozen.".to_string());
        }
        if info.times_visited() > 1 {
            lines.push(format!("&SWelcome back to {}", config.server.name));
        } else {
            lines.push(format!("&SWelcome to {}", config.server.name));
        }
        lines.push(format!("&SYour rank is {}&S.", rank.display()));
        if info.is_hidden() {
            if rank.can(Permission::Hide) {
                lines.push("&SYou are hidden from other players.".to_string());
            } else {
                info.set_hidden(false);
            }
        }
        for line in lines {
            self.send_all(self.encoding.message(MessageClass::Chat, &line))?;
        }
        self.send_now(&Packet::encode(&SetPermission {
            op: rank.can(Permission::DeleteAdmincrete),
        }))
    }
}
