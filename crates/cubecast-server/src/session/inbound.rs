use cubecast_proto::packets::{Message, PlayerClicked, SetBlockClient};
use tracing::trace;

use crate::hooks::{chat_text, CommandCall, CommandOutcome};

use super::guard::{MoveRequest, MoveVerdict};
use super::*;

/// Longest chat line assembled from LongerMessages continuations.
const MAX_CHAT_BUFFER: usize = 2048;

/// Minimum time between two "no speedhacking" notices.
const SPEEDHACK_NOTICE_INTERVAL: Duration = Duration::from_secs(1);

impl Session {
    /// Read what the socket has and handle every complete packet in it.
    pub(super) fn process_inbound(&mut self) -> Result<(), SessionError> {
        self.fill_inbound()?;
        while let Some(mut frame) = self.next_frame(Phase::Play)? {
            match ClientPacket::decode(&mut frame)? {
                ClientPacket::Ping => self.handle_ping()?,
                ClientPacket::Teleport(teleport) => self.handle_movement(teleport)?,
                ClientPacket::SetBlock(edit) => self.handle_set_block(edit)?,
                ClientPacket::Message(message) => self.handle_message(message),
                ClientPacket::PlayerClicked(click) => self.handle_click(&click),
                other => return Err(other.unexpected("a gameplay packet").into()),
            }
        }
        Ok(())
    }

    fn handle_ping(&mut self) -> Result<(), SessionError> {
        let Some(ms) = self.ping.finish(Instant::now()) else {
            return Ok(());
        };
        let average = self.ping.average().unwrap_or(f64::from(ms));
        self.handle
            .ping_ms
            .store(average.round() as u32, Ordering::Relaxed);
        if self.encoding.supports(CapabilitySet::MESSAGE_TYPES) {
            let line = format!("&SPing: &f{ms}&Sms Avg: &f{average:.0}&Sms");
            self.send_all(self.encoding.message(MessageClass::BottomRight3, &line))?;
        }
        Ok(())
    }

    // ─── Movement ────────────────────────────────────────────────────────────

    fn handle_movement(&mut self, teleport: Teleport) -> Result<(), SessionError> {
        let Some(info) = self.handle.info().cloned() else {
            return Ok(());
        };

        // HeldBlock clients put the held block in the id byte.
        if self.encoding.supports(CapabilitySet::HELD_BLOCK) && teleport.id != self.handle.held_block() {
            self.handle.held_block.store(teleport.id, Ordering::Relaxed);
            self.send_held_block_status()?;
        }

        // A spectator's position comes from its target.
        if self.handle.spectating().is_some() {
            return Ok(());
        }

        let current = self.handle.position();
        let proposed = teleport.position;
        let restrained = info.is_frozen()
            || self
                .handle
                .world()
                .is_some_and(|w| w.denies_movement(proposed.block()));
        let exempt = info.rank().can(Permission::UseSpeedHack) && info.allows_speedhack();

        let request = MoveRequest {
            current,
            proposed,
            exempt,
            restrained,
        };
        match self.guard.check(request, Instant::now()) {
            MoveVerdict::Unchanged => Ok(()),
            MoveVerdict::Accept(position) => self.apply_move(current, position),
            MoveVerdict::Clamp { position, correct } => {
                self.handle.set_position(position);
                if correct {
                    self.send_now(&Packet::encode(&Teleport::new(SELF_ID, position)))?;
                }
                Ok(())
            }
            MoveVerdict::Deny { revert_to, spam } => self.deny_move(revert_to, spam),
        }
    }

    fn apply_move(&mut self, from: Position, to: Position) -> Result<(), SessionError> {
        if !self.server.hooks().moving(&self.handle, from, to) {
            return self.teleport_self(from);
        }
        self.handle.set_position(to);
        self.server.hooks().moved(&self.handle, from);
        Ok(())
    }

    fn deny_move(&mut self, revert_to: Position, spam: bool) -> Result<(), SessionError> {
        self.handle.set_position(revert_to);
        self.send_now(&Packet::encode(&Teleport::new(SELF_ID, revert_to)))?;

        let now = Instant::now();
        let quiet = self
            .last_speedhack_notice
            .is_some_and(|at| now.saturating_duration_since(at) < SPEEDHACK_NOTICE_INTERVAL);
        if !quiet {
            self.last_speedhack_notice = Some(now);
            let what = if spam { "movement packet spam" } else { "moving too fast" };
            warn!(
                target: LOG_SUSPICIOUS,
                "{} ({}) reverted for {what}",
                self.handle.name(),
                self.handle.addr().ip()
            );
            self.send_all(
                self.encoding
                    .message(MessageClass::Chat, "&WYou are not allowed to speedhack."),
            )?;
        }
        Ok(())
    }

    // ─── Block edits ─────────────────────────────────────────────────────────

    fn handle_set_block(&mut self, edit: SetBlockClient) -> Result<(), SessionError> {
        let (Some(world), Some(info)) = (self.handle.world(), self.handle.info().cloned()) else {
            return Ok(());
        };
        let Some(existing) = world.block(edit.pos) else {
            debug!("{} edited {} outside of {}", self.handle.name(), edit.pos, world.name());
            return Ok(());
        };
        if edit.block > self.encoding.max_block() {
            warn!(
                target: LOG_SUSPICIOUS,
                "{} tried to use unknown block {}",
                self.handle.name(),
                edit.block
            );
            self.revert_block(edit.pos, existing);
            return Ok(());
        }

        let settings = world.settings();
        let rank = info.rank();
        let refusal = if info.is_frozen() {
            Some("&WYou cannot build while frozen.".to_string())
        } else if !edit.place && !settings.deletable {
            Some("&WDeleting blocks is disabled in this world.".to_string())
        } else if edit.place && !settings.buildable {
            Some("&WPlacing blocks is disabled in this world.".to_string())
        } else if !world.can_build(rank.level) {
            Some(format!("&WYour rank cannot build in {}.", world.name()))
        } else if world.denies_building(edit.pos) {
            Some("&WYou are not allowed to build here.".to_string())
        } else {
            let (target, verb) = if edit.place {
                (edit.block, "place")
            } else {
                (existing, "delete")
            };
            (!rank.can_edit(target, edit.place)).then(|| {
                let name = block::name(target).unwrap_or("that block");
                format!("&WYou are not allowed to {verb} {name}.")
            })
        };
        if let Some(message) = refusal {
            self.handle.message(&message);
            self.revert_block(edit.pos, existing);
            return Ok(());
        }

        let new_block = if edit.place { edit.block } else { block::AIR };
        match world.set_block(edit.pos, new_block) {
            Ok(old) if old == new_block => {}
            Ok(_) => {
                let registry = self.server.registry();
                for member in world.members() {
                    if member == self.handle.id() {
                        continue;
                    }
                    if let Some(other) = registry.get(member) {
                        other.send_block(edit.pos, new_block);
                    }
                }
            }
            Err(e) => {
                warn!("Edit by {} at {} failed: {e}", self.handle.name(), edit.pos);
                self.revert_block(edit.pos, existing);
            }
        }
        Ok(())
    }

    /// Show this client the block that is really there.
    fn revert_block(&self, pos: BlockPos, actual: u8) {
        self.handle.send_block(pos, actual);
    }

    // ─── Chat ────────────────────────────────────────────────────────────────

    fn handle_message(&mut self, message: Message) {
        let text = if self.handle.can(Permission::UseColorCodes) {
            message.text
        } else {
            strip_color_codes(&message.text)
        };

        if self.encoding.supports(CapabilitySet::LONGER_MESSAGES) && message.kind == 1 {
            if self.chat_buffer.len() + text.len() > MAX_CHAT_BUFFER {
                self.chat_buffer.clear();
                self.handle.message("&WMessage too long, discarded.");
            } else {
                self.chat_buffer.push_str(&text);
            }
            return;
        }
        let line = if self.chat_buffer.is_empty() {
            text
        } else {
            let mut line = std::mem::take(&mut self.chat_buffer);
            line.push_str(&text);
            line
        };
        if line.trim().is_empty() {
            return;
        }

        let server = Arc::clone(&self.server);
        let handle = Arc::clone(&self.handle);
        let result = panic::catch_unwind(AssertUnwindSafe(|| dispatch_line(&server, &handle, &line)));
        if let Err(payload) = result {
            error!(
                target: LOG_CRASH,
                "Error while handling {:?} from {}: {}",
                line,
                handle.name(),
                panic_message(payload.as_ref())
            );
            handle.message("&WError while handling your message; it has been reported.");
        }
    }

    fn handle_click(&mut self, click: &PlayerClicked) {
        trace!(
            "{} clicked button {} (action {}) on entity {} block {}",
            self.handle.name(),
            click.button,
            click.action,
            click.target_entity,
            click.target_block
        );
    }
}

fn dispatch_line(server: &Server, session: &SessionHandle, line: &str) {
    let Some(call) = CommandCall::parse(line) else {
        if !session.can(Permission::Chat) {
            session.message("&WYou are not allowed to chat.");
            return;
        }
        server.chat().chat(server, session, chat_text(line));
        return;
    };
    debug!("{} issued /{} {}", session.name(), call.name, call.raw_args);
    match server.commands().dispatch(server, session, &call) {
        CommandOutcome::Done => {}
        CommandOutcome::Unknown => session.message(&format!("&WUnknown command \"{}\"", call.name)),
        CommandOutcome::Denied(reason) | CommandOutcome::Failed(reason) => {
            session.message(&format!("&W{reason}"));
        }
    }
}

/// Remove `&x` color sequences. A trailing lone `&` is kept.
pub(crate) fn strip_color_codes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '&' {
            if let Some(code) = chars.peek() {
                if code.is_ascii_hexdigit() || code.is_ascii_alphabetic() {
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::strip_color_codes;

    #[test]
    fn color_codes_are_stripped() {
        assert_eq!(strip_color_codes("&chello &fworld"), "hello world");
        assert_eq!(strip_color_codes("a && b"), "a && b");
        assert_eq!(strip_color_codes("trailing &"), "trailing &");
        assert_eq!(strip_color_codes("plain"), "plain");
    }
}
