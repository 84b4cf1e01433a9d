//! Moving a session into a world: membership handover, map transfer and the
//! per-world packets a client needs before it can play.

use cubecast_proto::codec::CHUNK_LEN;
use cubecast_proto::packets::{
    HackControl, LevelDataChunk, LevelFinalize, LevelInitialize, ServerIdentification,
};

use super::*;

/// Why a session is changing worlds. Passed to the join hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorldChangeReason {
    /// Placed in the main world right after login.
    FirstWorld,
    ManualJoin,
    /// Reloaded into the world it is already in.
    Rejoin,
    /// Following a spectated player into another world.
    Spectate,
    Teleport,
    /// The previous world was unloaded.
    WorldRemoved,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinTarget {
    Spawn,
    At(Position),
}

/// A requested world change, executed by the session's own worker.
#[derive(Clone)]
pub struct JoinRequest {
    pub world: Arc<World>,
    pub target: JoinTarget,
    pub reason: WorldChangeReason,
}

impl std::fmt::Debug for JoinRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinRequest")
            .field("world", &self.world.name())
            .field("target", &self.target)
            .field("reason", &self.reason)
            .finish()
    }
}

impl Session {
    /// Run the pending join, if another thread asked for one.
    pub(super) fn process_pending_join(&mut self) -> Result<(), SessionError> {
        if let Some(request) = self.handle.take_pending_join() {
            self.join_world_now(request)?;
        }
        Ok(())
    }

    /// Move into `request.world`. Returns `Ok(false)` when the join was
    /// refused; the session then stays where it was, untouched.
    pub(super) fn join_world_now(&mut self, request: JoinRequest) -> Result<bool, SessionError> {
        let JoinRequest {
            world,
            target,
            reason,
        } = request;
        let Some(info) = self.handle.info().cloned() else {
            return Err(SessionError::Internal("world join before login".into()));
        };
        let previous = self.handle.world();
        let first = previous.is_none();

        if !self.server.hooks().joining_world(&self.handle, &world, reason) {
            debug!("Join of {} to {} cancelled by hook", self.handle.name(), world.name());
            return Ok(false);
        }

        let map = match world.compress_for_transfer(self.encoding.max_block()) {
            Ok(map) => map,
            Err(e) => {
                error!("Failed to prepare map of {} for {}: {e}", world.name(), self.handle.name());
                if !first {
                    self.handle
                        .message(&format!("&WCould not join {}: map transfer failed.", world.name()));
                }
                return Ok(false);
            }
        };

        let same_world = previous.as_ref().is_some_and(|old| Arc::ptr_eq(old, &world));
        if !same_world {
            if let Err(e) = world.accept(self.handle.id()) {
                info!("{} could not join {}: {e}", self.handle.name(), world.name());
                if !first {
                    self.handle
                        .message(&format!("&WCould not join {}: {e}", world.name()));
                }
                return Ok(false);
            }
            if let Some(old) = &previous {
                if !old.release(self.handle.id()) {
                    error!(
                        "{} was missing from the member list of {}",
                        self.handle.name(),
                        old.name()
                    );
                }
            }
        }

        // Nothing from the old world may reach the client past this point.
        let mut removals = Vec::new();
        self.view.reset(&mut removals);
        let dropped = self.handle.outbox.clear_blocks();
        if dropped > 0 {
            debug!("Dropped {dropped} stale block updates for {}", self.handle.name());
        }

        let spawn = match target {
            JoinTarget::Spawn => world.spawn(),
            JoinTarget::At(position) => position,
        };
        *self.handle.world.write() = Some(Arc::clone(&world));
        self.handle.set_position(spawn);
        self.guard.reset(spawn);

        self.send_all(removals)?;
        let settings = world.settings();
        let rank = info.rank();
        let is_op = rank.can(Permission::DeleteAdmincrete);

        if !first {
            let motd = settings.motd.clone().unwrap_or_else(|| "Welcome!".to_string());
            self.send_now(&Packet::encode(&ServerIdentification::new(
                format!("Loading world {}", world.name()),
                motd,
                is_op,
            )))?;
        }

        let can_build = world.can_build(rank.level);
        let permissions = self.encoding.block_permissions(|id| {
            (
                can_build && settings.buildable && rank.can_edit(id, true),
                can_build && settings.deletable && rank.can_edit(id, false),
            )
        });
        self.send_all(permissions)?;

        self.send_map(&map, world.dimensions())?;

        self.send_all(self.encoding.environment(&settings.environment))?;
        let name = info.name();
        self.send_now(&self.encoding.add_entity(SELF_ID, &info.display_name(), &name, spawn))?;
        let model = self.handle.model();
        if model != "humanoid" {
            if let Some(packet) = self.encoding.change_model(SELF_ID, &model) {
                self.send_now(&packet)?;
            }
        }
        let hacks = HackControl::from_motd(settings.motd.as_deref().unwrap_or(""), is_op);
        let extras = [
            self.encoding.hack_control(&hacks),
            self.encoding.click_distance(settings.click_distance),
        ];
        self.send_all(extras.into_iter().flatten())?;
        self.send_held_block_status()?;
        self.send_all(
            self.encoding
                .message(MessageClass::Status1, &self.server.config().server.name),
        )?;

        self.update_visible_entities()?;
        self.last_view_update = Instant::now();
        self.teleport_self(spawn)?;

        if same_world {
            self.send_all(
                self.encoding
                    .message(MessageClass::Chat, &format!("&SRejoined world {}", world.name())),
            )?;
        } else if !first {
            self.send_all(
                self.encoding
                    .message(MessageClass::Chat, &format!("&SJoined world {}", world.name())),
            )?;
        }
        if let Some(greeting) = &settings.greeting {
            self.send_all(self.encoding.message(MessageClass::Chat, greeting))?;
        }

        self.server
            .hooks()
            .joined_world(&self.handle, &world, previous.as_deref(), reason);
        self.flush()?;
        info!("{} joined world {} ({reason:?})", self.handle.name(), world.name());
        Ok(true)
    }

    /// Level initialize, data chunks and finalize. Nagle stays on for the
    /// bulk of the transfer.
    fn send_map(&mut self, map: &[u8], dims: cubecast_world::Dimensions) -> Result<(), SessionError> {
        self.stream.set_nodelay(false)?;
        self.send_now(&Packet::encode(&LevelInitialize))?;
        let total = map.len().max(1);
        let mut sent = 0;
        for chunk in map.chunks(CHUNK_LEN) {
            sent += chunk.len();
            let percent = (sent * 100 / total) as u8;
            self.send_now(&Packet::encode(&LevelDataChunk {
                data: chunk,
                percent,
            }))?;
        }
        self.send_now(&Packet::encode(&LevelFinalize {
            x: dims.width as i16,
            y: dims.height as i16,
            z: dims.length as i16,
        }))?;
        self.flush()?;
        self.stream
            .set_nodelay(self.server.config().network.low_latency)?;
        Ok(())
    }

    pub(super) fn send_held_block_status(&mut self) -> Result<(), SessionError> {
        let held = self.handle.held_block();
        let name = block::name(held).unwrap_or("Unknown");
        self.send_all(self.encoding.message(
            MessageClass::BottomRight1,
            &format!("Block:&f{name} &SID:&f{held}"),
        ))
    }
}
