use std::thread;

use cubecast_proto::packets::{id, BULK_CAPACITY};

use super::*;

impl Session {
    /// Steady state: runs until the client leaves, is kicked or the
    /// connection fails.
    pub(super) fn io_loop(&mut self) -> Result<(), SessionError> {
        let network = self.server.config().network.clone();
        let sleep = Duration::from_millis(network.sleep_delay_ms);
        let idle_timeout = Duration::from_millis(network.idle_timeout_ms);
        let poll_every = network.poll_interval_ticks.max(1);
        let ping_every = network.ping_interval_polls.max(1);
        let mut ticks: u32 = 0;
        let mut polls: u32 = 0;

        loop {
            ticks = ticks.wrapping_add(1);
            if ticks % poll_every == 0 {
                polls = polls.wrapping_add(1);
                if self.last_activity.elapsed() > idle_timeout {
                    return Err(SessionError::TimedOut);
                }
                if polls % ping_every == 0 {
                    self.send_keepalive()?;
                }
            }

            self.drain_priority(network.max_packets_per_tick)?;
            self.drain_blocks(network.max_block_updates_per_tick, network.bulk_threshold)?;
            self.process_pending_join()?;
            self.process_inbound()?;
            self.maybe_update_view()?;
            self.flush()?;

            thread::sleep(sleep);
        }
    }

    fn send_keepalive(&mut self) -> Result<(), SessionError> {
        let now = Instant::now();
        self.send_now(&Packet::encode(&cubecast_proto::packets::Ping))?;
        self.ping.start(now);
        self.handle.measure_bandwidth(&mut self.meter, now);
        Ok(())
    }

    /// Send queued packets in order. A kick is written, flushed and ends
    /// the session.
    fn drain_priority(&mut self, cap: usize) -> Result<(), SessionError> {
        for _ in 0..cap {
            let Some(packet) = self.handle.outbox.pop_packet() else {
                break;
            };
            self.send_now(&packet)?;
            if packet.opcode() == id::KICK {
                self.flush()?;
                let reason = match self.handle.leave_reason() {
                    LeaveReason::Unknown => LeaveReason::Kick,
                    reason => reason,
                };
                return Err(SessionError::Kicked(reason));
            }
        }
        Ok(())
    }

    /// Send queued block changes. A large backlog goes out as one bulk
    /// packet when the client supports it.
    fn drain_blocks(&mut self, cap: usize, bulk_threshold: usize) -> Result<(), SessionError> {
        let outbox = &self.handle.outbox;
        let backlog = outbox.block_backlog();
        if backlog == 0 {
            return Ok(());
        }
        let world = self.handle.world();

        if backlog > bulk_threshold && self.encoding.supports(CapabilitySet::BULK_BLOCK_UPDATE) {
            if let Some(world) = world {
                let dims = world.dimensions();
                let limit = cap.min(BULK_CAPACITY);
                let mut entries = Vec::with_capacity(limit);
                while entries.len() < limit {
                    let Some(update) = outbox.pop_block() else {
                        break;
                    };
                    if let Some(index) = dims.index(update.pos) {
                        entries.push((index as i32, update.block));
                    }
                }
                if let Some(packet) = self.encoding.bulk_blocks(&entries) {
                    self.send_now(&packet)?;
                }
                return Ok(());
            }
        }

        let mut packets = Vec::new();
        for _ in 0..cap {
            let Some(update) = outbox.pop_block() else {
                break;
            };
            packets.push(self.encoding.set_block(update.pos, update.block));
        }
        self.send_all(packets)
    }
}
