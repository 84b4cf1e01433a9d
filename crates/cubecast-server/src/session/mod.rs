//! One connected client: the handle other threads use to reach it, and the
//! worker that owns its socket.
//!
//! Only [`SessionShared`]'s queues, the pending-join slot and `kick` are
//! meant for foreign threads. Everything else on the handle is written by
//! the session's own worker and merely readable elsewhere.

pub mod bandwidth;
pub mod guard;
pub mod outbox;
pub mod slots;
pub mod view;
pub mod world_join;

mod inbound;
mod io_loop;
mod login;
mod negotiate;

use std::any::Any;
use std::io::{self, BufWriter, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use cubecast_proto::block;
use cubecast_proto::capability::{CapabilitySet, Encoding};
use cubecast_proto::packets::{
    frame_len, ClientPacket, Kick, MessageClass, Packet, Phase, Teleport,
};
use cubecast_proto::types::{BlockPos, Position, SELF_ID};
use cubecast_world::{MemberId, World};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::error::{LeaveReason, SessionError};
use crate::player_db::PlayerInfo;
use crate::rank::Permission;
use crate::server::Server;
use crate::{LOG_CRASH, LOG_SUSPICIOUS};

use self::bandwidth::{BandwidthMeter, PingTracker};
use self::guard::{GuardConfig, MovementGuard};
use self::outbox::{BlockUpdate, Outbox};
use self::view::{EntitySnapshot, EntityView, ObserverSnapshot};

pub use self::world_join::{JoinRequest, JoinTarget, WorldChangeReason};

/// Read timeout once the session is in steady state; keeps the loop from
/// blocking on a quiet client.
const POLL_READ_TIMEOUT: Duration = Duration::from_millis(1);

const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionState {
    Connecting = 0,
    LoadingMain = 1,
    Online = 2,
    PendingDisconnect = 3,
    Disconnected = 4,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Connecting,
            1 => Self::LoadingMain,
            2 => Self::Online,
            3 => Self::PendingDisconnect,
            _ => Self::Disconnected,
        }
    }
}

// ─── Shared handle ───────────────────────────────────────────────────────────

pub type SessionHandle = Arc<SessionShared>;

pub struct SessionShared {
    id: MemberId,
    addr: SocketAddr,
    state: AtomicU8,
    info: OnceLock<Arc<PlayerInfo>>,
    verified: AtomicBool,
    outbox: Outbox,
    world: RwLock<Option<Arc<World>>>,
    position: AtomicU64,
    pending_join: Mutex<Option<JoinRequest>>,
    caps: AtomicU32,
    leave_reason: AtomicU8,
    /// Member id of the spectated session, 0 for none.
    spectating: AtomicU32,
    ping_ms: AtomicU32,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    /// Bytes per second, as of the last keepalive.
    sent_rate: AtomicU32,
    received_rate: AtomicU32,
    held_block: AtomicU8,
    model: RwLock<String>,
}

impl SessionShared {
    pub fn new(id: MemberId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            state: AtomicU8::new(SessionState::Connecting as u8),
            info: OnceLock::new(),
            verified: AtomicBool::new(false),
            outbox: Outbox::new(),
            world: RwLock::new(None),
            position: AtomicU64::new(Position::ZERO.pack()),
            pending_join: Mutex::new(None),
            caps: AtomicU32::new(0),
            leave_reason: AtomicU8::new(LeaveReason::Unknown as u8),
            spectating: AtomicU32::new(0),
            ping_ms: AtomicU32::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            sent_rate: AtomicU32::new(0),
            received_rate: AtomicU32::new(0),
            held_block: AtomicU8::new(block::STONE),
            model: RwLock::new("humanoid".to_string()),
        }
    }

    pub fn id(&self) -> MemberId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn is_online(&self) -> bool {
        self.state() == SessionState::Online
    }

    /// Player record, once the handshake named one.
    pub fn info(&self) -> Option<&Arc<PlayerInfo>> {
        self.info.get()
    }

    /// Player name, or the remote address before login.
    pub fn name(&self) -> String {
        match self.info() {
            Some(info) => info.name(),
            None => self.addr.to_string(),
        }
    }

    pub fn display_name(&self) -> String {
        match self.info() {
            Some(info) => info.display_name(),
            None => self.addr.to_string(),
        }
    }

    pub fn can(&self, permission: Permission) -> bool {
        self.info().is_some_and(|info| info.rank().can(permission))
    }

    pub fn is_verified(&self) -> bool {
        self.verified.load(Ordering::Acquire)
    }

    pub fn world(&self) -> Option<Arc<World>> {
        self.world.read().clone()
    }

    pub fn position(&self) -> Position {
        Position::unpack(self.position.load(Ordering::Acquire))
    }

    pub(crate) fn set_position(&self, position: Position) {
        self.position.store(position.pack(), Ordering::Release);
    }

    pub fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::from_bits_truncate(self.caps.load(Ordering::Acquire))
    }

    pub fn encoding(&self) -> Encoding {
        Encoding::from(self.capabilities())
    }

    pub fn leave_reason(&self) -> LeaveReason {
        LeaveReason::from_u8(self.leave_reason.load(Ordering::Acquire))
    }

    /// First recorded reason wins.
    pub(crate) fn record_leave_reason(&self, reason: LeaveReason) {
        let _ = self.leave_reason.compare_exchange(
            LeaveReason::Unknown as u8,
            reason as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn spectating(&self) -> Option<MemberId> {
        match self.spectating.load(Ordering::Acquire) {
            0 => None,
            id => Some(id),
        }
    }

    /// Follow another session, or stop with `None`.
    pub fn spectate(&self, target: Option<MemberId>) {
        self.spectating.store(target.unwrap_or(0), Ordering::Release);
    }

    /// Average keepalive round trip in milliseconds.
    pub fn ping_ms(&self) -> u32 {
        self.ping_ms.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn bytes_sent_rate(&self) -> u32 {
        self.sent_rate.load(Ordering::Relaxed)
    }

    pub fn bytes_received_rate(&self) -> u32 {
        self.received_rate.load(Ordering::Relaxed)
    }

    /// Feed the byte counters to `meter` and publish the new rates.
    fn measure_bandwidth(&self, meter: &mut BandwidthMeter, now: Instant) {
        meter.measure(now, self.bytes_sent(), self.bytes_received());
        self.sent_rate
            .store(meter.sent_rate().round() as u32, Ordering::Relaxed);
        self.received_rate
            .store(meter.received_rate().round() as u32, Ordering::Relaxed);
    }

    pub fn held_block(&self) -> u8 {
        self.held_block.load(Ordering::Relaxed)
    }

    pub fn model(&self) -> String {
        self.model.read().clone()
    }

    pub fn set_model(&self, model: impl Into<String>) {
        *self.model.write() = model.into();
    }

    // --- cross-thread entry points ---

    /// Queue a packet. Dropped once the session is closing.
    pub fn send(&self, packet: Packet) -> bool {
        self.outbox.push(packet)
    }

    /// Queue a block change for this client only.
    pub fn send_block(&self, pos: BlockPos, block: u8) -> bool {
        self.outbox.push_block(BlockUpdate { pos, block })
    }

    pub fn message(&self, text: &str) {
        self.message_class(MessageClass::Chat, text);
    }

    /// Message in a MessageTypes slot; ignored if the client lacks it.
    pub fn message_class(&self, class: MessageClass, text: &str) {
        for packet in self.encoding().message(class, text) {
            self.send(packet);
        }
    }

    /// Replace everything queued with a kick. Returns false if the session
    /// was already closing.
    pub fn kick(&self, reason: LeaveReason, message: &str) -> bool {
        if !self.outbox.close_with(Packet::encode(&Kick::new(message))) {
            return false;
        }
        self.record_leave_reason(reason);
        self.set_state(SessionState::PendingDisconnect);
        true
    }

    /// Ask the worker to move this session to `world`'s spawn.
    pub fn join_world(&self, world: Arc<World>, reason: WorldChangeReason) {
        *self.pending_join.lock() = Some(JoinRequest {
            world,
            target: JoinTarget::Spawn,
            reason,
        });
    }

    /// Ask the worker to move this session to `position` in `world`.
    pub fn join_world_at(&self, world: Arc<World>, position: Position, reason: WorldChangeReason) {
        *self.pending_join.lock() = Some(JoinRequest {
            world,
            target: JoinTarget::At(position),
            reason,
        });
    }

    pub(crate) fn take_pending_join(&self) -> Option<JoinRequest> {
        self.pending_join.lock().take()
    }

    pub fn has_pending_join(&self) -> bool {
        self.pending_join.lock().is_some()
    }

    /// What an observer's view needs; `None` before login finished.
    pub fn snapshot(&self) -> Option<EntitySnapshot> {
        let info = self.info()?;
        let name = info.name();
        Some(EntitySnapshot {
            id: self.id,
            name: info.display_name(),
            skin: name,
            rank: info.rank(),
            model: self.model(),
            position: self.position(),
            hidden: info.is_hidden(),
            spectating: self.spectating(),
        })
    }
}

impl std::fmt::Debug for SessionShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionShared")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("state", &self.state())
            .field("name", &self.name())
            .finish()
    }
}

// ─── Worker ──────────────────────────────────────────────────────────────────

pub(crate) struct Session {
    server: Arc<Server>,
    handle: SessionHandle,
    stream: TcpStream,
    writer: BufWriter<TcpStream>,
    inbound: BytesMut,
    encoding: Encoding,
    view: EntityView,
    guard: MovementGuard,
    meter: BandwidthMeter,
    ping: PingTracker,
    chat_buffer: String,
    registered: bool,
    /// Whether others were told about this session's arrival.
    announced: bool,
    last_view_update: Instant,
    last_activity: Instant,
    last_speedhack_notice: Option<Instant>,
}

impl Session {
    pub(crate) fn new(
        server: Arc<Server>,
        handle: SessionHandle,
        stream: TcpStream,
        writer: TcpStream,
    ) -> Self {
        let config = server.config();
        let profile = config.bandwidth.mode.profile();
        let view = EntityView::new(profile, config.bandwidth.full_update_interval);
        let guard = MovementGuard::new(GuardConfig::from(&config.anti_cheat));
        let now = Instant::now();
        Self {
            handle,
            stream,
            writer: BufWriter::new(writer),
            inbound: BytesMut::with_capacity(READ_CHUNK),
            encoding: Encoding::default(),
            view,
            guard,
            meter: BandwidthMeter::new(now),
            ping: PingTracker::default(),
            chat_buffer: String::new(),
            registered: false,
            announced: false,
            last_view_update: now,
            last_activity: now,
            last_speedhack_notice: None,
            server,
        }
    }

    /// Drive the session to completion. Always ends in [`Self::finalize`].
    pub(crate) fn run(mut self) {
        let result = match panic::catch_unwind(AssertUnwindSafe(|| self.run_inner())) {
            Ok(result) => result,
            Err(payload) => Err(SessionError::Internal(panic_message(payload.as_ref()))),
        };
        self.handle_exit(result);
        self.finalize();
    }

    fn run_inner(&mut self) -> Result<(), SessionError> {
        self.login()?;
        self.stream.set_read_timeout(Some(POLL_READ_TIMEOUT))?;
        self.io_loop()
    }

    fn handle_exit(&mut self, result: Result<(), SessionError>) {
        let Err(err) = result else {
            self.handle.record_leave_reason(LeaveReason::ClientQuit);
            return;
        };
        let reason = err.leave_reason();
        self.handle.record_leave_reason(reason);
        let who = self.handle.name();
        let ip = self.handle.addr().ip();
        match &err {
            SessionError::ClientQuit(_) | SessionError::Closed => {
                debug!("Lost connection to {who} ({ip}): {err}");
            }
            SessionError::Kicked(_) => debug!("{who} was kicked ({reason:?})"),
            SessionError::Internal(_) => {
                error!(target: LOG_CRASH, "Session of {who} ({ip}) failed: {err}");
            }
            _ if reason.is_suspicious() => {
                warn!(target: LOG_SUSPICIOUS, "{who} ({ip}) was kicked: {err}");
            }
            _ => info!("{who} ({ip}) was disconnected: {err}"),
        }
        if let Some(message) = err.client_message() {
            self.kick_now(&message);
        }
    }

    fn finalize(&mut self) {
        let reason = self.handle.leave_reason();
        self.handle.set_state(SessionState::Disconnected);
        self.handle.outbox.close();
        self.handle.spectate(None);

        let world = self.handle.world.write().take();
        if let Some(world) = world {
            if !world.release(self.handle.id()) {
                debug!("{} was not a member of {}", self.handle.name(), world.name());
            }
        }

        if self.registered {
            self.server.registry().unregister(self.handle.id());
            info!("{} left the server ({reason:?})", self.handle.name());
            let hidden = self.handle.info().is_some_and(|i| i.is_hidden());
            if self.announced && !hidden && self.server.config().server.show_connection_messages {
                self.server
                    .registry()
                    .message_all(&format!("&S{}&S left the server.", self.handle.display_name()));
            }
        }
        self.server.hooks().disconnected(&self.handle, reason);

        let _ = self.writer.flush();
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    fn set_capabilities(&mut self, caps: CapabilitySet) {
        self.handle.caps.store(caps.bits(), Ordering::Release);
        self.encoding = Encoding::from(caps);
    }

    // --- socket output ---

    fn send_now(&mut self, packet: &Packet) -> Result<(), SessionError> {
        self.writer.write_all(packet.bytes())?;
        self.handle
            .bytes_sent
            .fetch_add(packet.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn send_all(&mut self, packets: impl IntoIterator<Item = Packet>) -> Result<(), SessionError> {
        for packet in packets {
            self.send_now(&packet)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SessionError> {
        self.writer.flush()?;
        Ok(())
    }

    /// Best effort; the connection is going away either way.
    fn kick_now(&mut self, message: &str) {
        let packet = Packet::encode(&Kick::new(message));
        if self.send_now(&packet).and_then(|()| self.flush()).is_err() {
            debug!("Could not deliver kick to {}", self.handle.name());
        }
        self.handle.set_state(SessionState::PendingDisconnect);
    }

    fn teleport_self(&mut self, position: Position) -> Result<(), SessionError> {
        self.handle.set_position(position);
        self.guard.reset(position);
        self.send_now(&Packet::encode(&Teleport::new(SELF_ID, position)))
    }

    // --- socket input ---

    /// Pull whatever the socket has. Returns the number of bytes read; a
    /// read timeout counts as zero.
    fn fill_inbound(&mut self) -> Result<usize, SessionError> {
        let mut chunk = [0u8; READ_CHUNK];
        match self.stream.read(&mut chunk) {
            Ok(0) => Err(SessionError::Closed),
            Ok(n) => {
                self.inbound.extend_from_slice(&chunk[..n]);
                self.handle
                    .bytes_received
                    .fetch_add(n as u64, Ordering::Relaxed);
                self.last_activity = Instant::now();
                Ok(n)
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Split one complete frame off the inbound buffer.
    fn next_frame(&mut self, phase: Phase) -> Result<Option<Bytes>, SessionError> {
        let Some(&opcode) = self.inbound.first() else {
            return Ok(None);
        };
        let len = frame_len(opcode, phase, self.encoding.capabilities())
            .ok_or(SessionError::UnknownOpcode(opcode))?;
        if self.inbound.len() < len {
            return Ok(None);
        }
        Ok(Some(self.inbound.split_to(len).freeze()))
    }

    /// Wait up to the socket timeout for the next packet.
    fn read_packet_blocking(&mut self, phase: Phase) -> Result<ClientPacket, SessionError> {
        let timeout = Duration::from_millis(self.server.config().network.socket_timeout_ms);
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(mut frame) = self.next_frame(phase)? {
                return Ok(ClientPacket::decode(&mut frame)?);
            }
            if Instant::now() >= deadline {
                return Err(SessionError::TimedOut);
            }
            self.fill_inbound()?;
        }
    }

    // --- view sync ---

    fn maybe_update_view(&mut self) -> Result<(), SessionError> {
        if self.last_view_update.elapsed() > self.view.profile().refresh_interval {
            self.update_visible_entities()?;
            self.last_view_update = Instant::now();
        }
        Ok(())
    }

    fn update_visible_entities(&mut self) -> Result<(), SessionError> {
        if self.handle.spectating().is_some() {
            self.follow_spectated()?;
        }
        let Some(world) = self.handle.world() else {
            return Ok(());
        };
        let Some(info) = self.handle.info().cloned() else {
            return Ok(());
        };

        let observer = ObserverSnapshot {
            id: self.handle.id(),
            rank: info.rank(),
            position: self.handle.position(),
            spectating: self.handle.spectating(),
        };
        let registry = self.server.registry();
        let others: Vec<EntitySnapshot> = world
            .members()
            .into_iter()
            .filter(|&member| member != observer.id)
            .filter_map(|member| registry.get(member))
            .filter_map(|other| other.snapshot())
            .collect();

        let mut out = Vec::new();
        self.view
            .tick(&observer, &others, &self.encoding, world.spawn(), &mut out)
            .map_err(|e| SessionError::Internal(e.to_string()))?;
        self.send_all(out)
    }

    fn follow_spectated(&mut self) -> Result<(), SessionError> {
        let Some(target_id) = self.handle.spectating() else {
            return Ok(());
        };
        let Some(info) = self.handle.info().cloned() else {
            return Ok(());
        };
        let rank = info.rank();
        let target = self.server.registry().get(target_id).filter(|t| {
            t.is_online()
                && t.info()
                    .is_some_and(|ti| view::can_see(&rank, ti.is_hidden(), &ti.rank()))
        });
        let Some(target) = target else {
            self.handle.spectate(None);
            self.handle.message("&SStopped spectating (player left)");
            return Ok(());
        };
        let Some(target_world) = target.world() else {
            return Ok(());
        };
        let target_pos = target.position();

        let same_world = self
            .handle
            .world()
            .is_some_and(|w| Arc::ptr_eq(&w, &target_world));
        if !same_world {
            if target_world.can_join(rank.level) {
                self.handle
                    .join_world_at(target_world, target_pos, WorldChangeReason::Spectate);
            } else {
                self.handle.spectate(None);
                self.handle.message(&format!(
                    "&SStopped spectating {}&S: cannot join world {}",
                    target.display_name(),
                    target_world.name()
                ));
            }
            return Ok(());
        }

        if target_pos != self.handle.position() {
            self.teleport_self(target_pos)?;
        }
        let held = target.held_block();
        if held != self.handle.held_block() {
            self.handle.held_block.store(held, Ordering::Relaxed);
            if let Some(packet) = self.encoding.hold_this(held, false) {
                self.send_now(&packet)?;
            }
        }
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cubecast_proto::packets::id;
    use cubecast_world::{Dimensions, Map, WorldSettings};

    fn shared() -> SessionShared {
        SessionShared::new(7, "127.0.0.1:50000".parse().unwrap())
    }

    fn world(name: &str) -> Arc<World> {
        let dims = Dimensions::new(16, 16, 16).unwrap();
        Arc::new(World::new(name, Map::flat(dims), WorldSettings::default()))
    }

    #[test]
    fn name_falls_back_to_address() {
        let session = shared();
        assert_eq!(session.name(), "127.0.0.1:50000");
        assert_eq!(session.state(), SessionState::Connecting);
        assert!(session.snapshot().is_none());
    }

    #[test]
    fn bandwidth_rates_are_published() {
        let session = shared();
        let start = Instant::now();
        let mut meter = BandwidthMeter::new(start);
        session.bytes_sent.fetch_add(4000, Ordering::Relaxed);
        session.bytes_received.fetch_add(1000, Ordering::Relaxed);

        session.measure_bandwidth(&mut meter, start + Duration::from_secs(2));
        assert_eq!(session.bytes_sent_rate(), 2000);
        assert_eq!(session.bytes_received_rate(), 500);

        session.measure_bandwidth(&mut meter, start + Duration::from_secs(3));
        assert_eq!(session.bytes_sent_rate(), 0);
        assert_eq!(session.bytes_received_rate(), 0);
    }

    #[test]
    fn kick_is_final() {
        let session = shared();
        assert!(session.send(Packet::encode(&cubecast_proto::packets::Ping)));
        session.send_block(BlockPos::new(1, 1, 1), block::STONE);

        assert!(session.kick(LeaveReason::ServerShutdown, "bye"));
        assert!(!session.kick(LeaveReason::Kick, "again"));
        assert!(!session.send(Packet::encode(&cubecast_proto::packets::Ping)));
        assert_eq!(session.leave_reason(), LeaveReason::ServerShutdown);
        assert_eq!(session.state(), SessionState::PendingDisconnect);

        let last = session.outbox.pop_packet().unwrap();
        assert_eq!(last.opcode(), id::KICK);
        assert!(session.outbox.pop_packet().is_none());
        assert_eq!(session.outbox.block_backlog(), 0);
    }

    #[test]
    fn pending_join_keeps_last_request() {
        let session = shared();
        let first = world("first");
        let second = world("second");
        session.join_world(first, WorldChangeReason::ManualJoin);
        let at = Position::new(64, 96, 64, 0, 0);
        session.join_world_at(Arc::clone(&second), at, WorldChangeReason::Teleport);
        assert!(session.has_pending_join());

        let request = session.take_pending_join().unwrap();
        assert!(Arc::ptr_eq(&request.world, &second));
        assert_eq!(request.target, JoinTarget::At(at));
        assert_eq!(request.reason, WorldChangeReason::Teleport);
        assert!(session.take_pending_join().is_none());
    }

    #[test]
    fn spectate_target_round_trips() {
        let session = shared();
        assert_eq!(session.spectating(), None);
        session.spectate(Some(12));
        assert_eq!(session.spectating(), Some(12));
        session.spectate(None);
        assert_eq!(session.spectating(), None);
    }

    #[test]
    fn panic_payloads_are_readable() {
        let payload = std::panic::catch_unwind(|| panic!("boom {}", 1)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom 1");
        let payload = std::panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static");
    }
}
