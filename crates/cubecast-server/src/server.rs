//! Process-wide state shared by every session: configuration, ranks,
//! worlds, player data and the extension points.

use std::io;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cubecast_world::{Dimensions, Map, MemberId, World, WorldManager};
use tracing::{info, warn};

use crate::bans::{IpBanList, JsonIpBanList};
use crate::config::{ConfigError, ServerConfig, WorldConfig};
use crate::error::LeaveReason;
use crate::hooks::{ChatHandler, CommandDispatcher, NoHooks, SessionHooks, UnknownCommands, WorldChat};
use crate::player_db::{JsonPlayerDb, PlayerDb};
use crate::rank::RankSet;
use crate::registry::SessionRegistry;
use crate::session::{Session, SessionHandle, SessionShared};
use crate::verify::{AccountStatus, AssumePaid, NameVerifier};

pub struct Server {
    config: ServerConfig,
    ranks: Arc<RankSet>,
    worlds: WorldManager,
    players: Arc<dyn PlayerDb>,
    ip_bans: Arc<dyn IpBanList>,
    accounts: Arc<dyn AccountStatus>,
    verifier: NameVerifier,
    registry: SessionRegistry,
    hooks: Arc<dyn SessionHooks>,
    commands: Arc<dyn CommandDispatcher>,
    chat: Arc<dyn ChatHandler>,
    next_session_id: AtomicU32,
    shutting_down: AtomicBool,
}

impl Server {
    pub fn builder(config: ServerConfig) -> ServerBuilder {
        ServerBuilder::new(config)
    }

    /// Server with JSON-backed player and ban data at the configured paths.
    pub fn from_config(config: ServerConfig) -> Result<Arc<Self>, ConfigError> {
        let ranks = Arc::new(RankSet::new(config.ranks.clone()));
        let players = JsonPlayerDb::load(&config.server.players_file, Arc::clone(&ranks));
        let ip_bans = JsonIpBanList::load(&config.server.ip_bans_file);
        Self::builder(config)
            .ranks(ranks)
            .players(Arc::new(players))
            .ip_bans(Arc::new(ip_bans))
            .build()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn ranks(&self) -> &RankSet {
        &self.ranks
    }

    pub fn worlds(&self) -> &WorldManager {
        &self.worlds
    }

    pub fn players(&self) -> &dyn PlayerDb {
        self.players.as_ref()
    }

    pub fn ip_bans(&self) -> &dyn IpBanList {
        self.ip_bans.as_ref()
    }

    pub fn accounts(&self) -> &dyn AccountStatus {
        self.accounts.as_ref()
    }

    pub fn verifier(&self) -> &NameVerifier {
        &self.verifier
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn hooks(&self) -> &dyn SessionHooks {
        self.hooks.as_ref()
    }

    pub fn commands(&self) -> &dyn CommandDispatcher {
        self.commands.as_ref()
    }

    pub fn chat(&self) -> &dyn ChatHandler {
        self.chat.as_ref()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Hand an accepted socket to a new session worker thread.
    pub fn start_session(self: &Arc<Self>, stream: TcpStream) -> io::Result<SessionHandle> {
        let addr = stream.peer_addr()?;
        let network = &self.config.network;
        let timeout = Some(Duration::from_millis(network.socket_timeout_ms.max(1)));
        stream.set_nodelay(network.low_latency)?;
        stream.set_read_timeout(timeout)?;
        stream.set_write_timeout(timeout)?;
        let writer = stream.try_clone()?;

        let id: MemberId = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let handle = Arc::new(SessionShared::new(id, addr));
        let session = Session::new(Arc::clone(self), Arc::clone(&handle), stream, writer);
        thread::Builder::new()
            .name(format!("session-{id}"))
            .spawn(move || session.run())?;
        info!("Accepted connection from {addr} as session {id}");
        Ok(handle)
    }

    /// Kick everyone. Sessions still logging in are refused once they try
    /// to register.
    pub fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let sessions = self.registry.all();
        info!("Shutting down, disconnecting {} players", sessions.len());
        for session in sessions {
            session.kick(LeaveReason::ServerShutdown, "Server shutting down");
        }
    }

    pub fn save_all(&self) {
        if let Err(e) = self.players.save() {
            warn!("Failed to save player data: {e}");
        }
        if let Err(e) = self.ip_bans.save() {
            warn!("Failed to save IP bans: {e}");
        }
    }
}

/// Assembles a [`Server`]. Anything not set falls back to an in-memory or
/// permissive default.
pub struct ServerBuilder {
    config: ServerConfig,
    ranks: Option<Arc<RankSet>>,
    worlds: Option<WorldManager>,
    players: Option<Arc<dyn PlayerDb>>,
    ip_bans: Option<Arc<dyn IpBanList>>,
    accounts: Option<Arc<dyn AccountStatus>>,
    verifier: Option<NameVerifier>,
    hooks: Option<Arc<dyn SessionHooks>>,
    commands: Option<Arc<dyn CommandDispatcher>>,
    chat: Option<Arc<dyn ChatHandler>>,
}

impl ServerBuilder {
    fn new(config: ServerConfig) -> Self {
        Self {
            config,
            ranks: None,
            worlds: None,
            players: None,
            ip_bans: None,
            accounts: None,
            verifier: None,
            hooks: None,
            commands: None,
            chat: None,
        }
    }

    pub fn ranks(mut self, ranks: Arc<RankSet>) -> Self {
        self.ranks = Some(ranks);
        self
    }

    pub fn worlds(mut self, worlds: WorldManager) -> Self {
        self.worlds = Some(worlds);
        self
    }

    pub fn players(mut self, players: Arc<dyn PlayerDb>) -> Self {
        self.players = Some(players);
        self
    }

    pub fn ip_bans(mut self, ip_bans: Arc<dyn IpBanList>) -> Self {
        self.ip_bans = Some(ip_bans);
        self
    }

    pub fn accounts(mut self, accounts: Arc<dyn AccountStatus>) -> Self {
        self.accounts = Some(accounts);
        self
    }

    pub fn verifier(mut self, verifier: NameVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn SessionHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn commands(mut self, commands: Arc<dyn CommandDispatcher>) -> Self {
        self.commands = Some(commands);
        self
    }

    pub fn chat(mut self, chat: Arc<dyn ChatHandler>) -> Self {
        self.chat = Some(chat);
        self
    }

    pub fn build(self) -> Result<Arc<Server>, ConfigError> {
        let config = self.config;
        let ranks = self
            .ranks
            .unwrap_or_else(|| Arc::new(RankSet::new(config.ranks.clone())));
        let worlds = match self.worlds {
            Some(worlds) => worlds,
            None => load_worlds(&config)?,
        };
        let players = self
            .players
            .unwrap_or_else(|| Arc::new(JsonPlayerDb::in_memory(Arc::clone(&ranks))));
        let verifier = self.verifier.unwrap_or_else(NameVerifier::random);
        info!("Name verification salt is {}", verifier.salt());

        Ok(Arc::new(Server {
            registry: SessionRegistry::new(config.server.max_players),
            ranks,
            worlds,
            players,
            ip_bans: self
                .ip_bans
                .unwrap_or_else(|| Arc::new(JsonIpBanList::in_memory())),
            accounts: self.accounts.unwrap_or_else(|| Arc::new(AssumePaid)),
            verifier,
            hooks: self.hooks.unwrap_or_else(|| Arc::new(NoHooks)),
            commands: self.commands.unwrap_or_else(|| Arc::new(UnknownCommands)),
            chat: self.chat.unwrap_or_else(|| Arc::new(WorldChat)),
            next_session_id: AtomicU32::new(1),
            shutting_down: AtomicBool::new(false),
            config,
        }))
    }
}

fn build_world(world: &WorldConfig) -> Result<World, ConfigError> {
    let dims = Dimensions::new(world.width, world.height, world.length)
        .map_err(|e| ConfigError::Invalid(format!("world {}: {e}", world.name)))?;
    Ok(World::new(
        world.name.as_str(),
        Map::flat(dims),
        world.settings.clone(),
    ))
}

/// Flat worlds from `[[worlds]]`, or a single `main` world if none are
/// configured.
fn load_worlds(config: &ServerConfig) -> Result<WorldManager, ConfigError> {
    let defaults = [WorldConfig::flat("main")];
    let configured: &[WorldConfig] = if config.worlds.is_empty() {
        &defaults
    } else {
        &config.worlds
    };
    let main_name = config
        .server
        .main_world
        .clone()
        .unwrap_or_else(|| configured[0].name.clone());

    let mut main = None;
    let mut others = Vec::new();
    for world in configured {
        let built = build_world(world)?;
        if main.is_none() && world.name.eq_ignore_ascii_case(&main_name) {
            main = Some(built);
        } else {
            others.push(built);
        }
    }
    let main = main.ok_or_else(|| ConfigError::Invalid(format!("main world {main_name} is not configured")))?;
    let manager = WorldManager::new(main);
    for world in others {
        manager.add(world);
    }
    info!("Loaded {} worlds", manager.all().len());
    Ok(manager)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{Shutdown, TcpListener};
    use std::time::Instant;

    use bytes::{BufMut, BytesMut};
    use cubecast_proto::codec::ProtoEncode;
    use cubecast_proto::packets::{id, server_frame_len, PlayerIdentification};
    use cubecast_proto::PROTOCOL_VERSION;
    use cubecast_world::WorldSettings;

    use crate::session::{SessionState, WorldChangeReason};

    const CONFIG: &str = r#"
        [server]
        address = "127.0.0.1"
        port = 0
        name = "Loopback"
        motd = "Testing"
        max_players = 1

        [[worlds]]
        name = "main"
        width = 16
        height = 16
        length = 16
    "#;

    fn server() -> Arc<Server> {
        let config = ServerConfig::parse(CONFIG).unwrap();
        Server::builder(config).build().unwrap()
    }

    /// Connect a client socket and hand the accepted side to `server`.
    fn connect(server: &Arc<Server>) -> (TcpStream, SessionHandle) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let (accepted, _) = listener.accept().unwrap();
        let handle = server.start_session(accepted).unwrap();
        (client, handle)
    }

    fn handshake(client: &mut TcpStream, name: &str) {
        let mut buf = BytesMut::new();
        buf.put_u8(id::HANDSHAKE);
        PlayerIdentification {
            protocol_version: PROTOCOL_VERSION,
            username: name.to_string(),
            verification_key: "-".to_string(),
            magic: 0,
        }
        .proto_encode(&mut buf);
        client.write_all(&buf).unwrap();
    }

    /// One server frame, or `None` once the server closed the socket.
    fn read_frame(client: &mut TcpStream) -> Option<Vec<u8>> {
        let mut opcode = [0u8; 1];
        if client.read(&mut opcode).ok()? == 0 {
            return None;
        }
        let len = server_frame_len(opcode[0]).expect("unknown server opcode");
        let mut frame = vec![0u8; len];
        frame[0] = opcode[0];
        client.read_exact(&mut frame[1..]).unwrap();
        Some(frame)
    }

    fn text_of(frame: &[u8], offset: usize) -> String {
        String::from_utf8_lossy(&frame[offset..offset + 64])
            .trim_end()
            .to_string()
    }

    /// Read until a frame with `opcode` shows up.
    fn read_until(client: &mut TcpStream, opcode: u8) -> Vec<u8> {
        loop {
            let frame = read_frame(client).expect("connection closed early");
            if frame[0] == opcode {
                return frame;
            }
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn unknown_opcode_is_kicked() {
        let server = server();
        let (mut client, handle) = connect(&server);
        client.write_all(&[0xFF]).unwrap();

        let kick = read_until(&mut client, id::KICK);
        assert_eq!(text_of(&kick, 1), "Unknown packet opcode 255");
        assert!(read_frame(&mut client).is_none());
        wait_for(|| handle.state() == SessionState::Disconnected);
        assert_eq!(handle.leave_reason(), LeaveReason::InvalidOpcodeKick);
        assert_eq!(server.registry().count(), 0);
    }

    #[test]
    fn login_joins_main_world() {
        let server = server();
        let (mut client, handle) = connect(&server);
        handshake(&mut client, "Tester");

        let ident = read_until(&mut client, id::HANDSHAKE);
        assert_eq!(text_of(&ident, 2), "Loopback");
        read_until(&mut client, id::LEVEL_INITIALIZE);
        let finalize = read_until(&mut client, id::LEVEL_FINALIZE);
        assert_eq!(&finalize[1..], &[0, 16, 0, 16, 0, 16]);
        let teleport = read_until(&mut client, id::TELEPORT);
        assert_eq!(teleport[1], 255);
        read_until(&mut client, id::SET_PERMISSION);

        wait_for(|| handle.is_online());
        assert_eq!(handle.name(), "Tester");
        assert_eq!(handle.world().unwrap().name(), "main");
        assert_eq!(server.registry().count(), 1);

        client.shutdown(Shutdown::Both).unwrap();
        wait_for(|| handle.state() == SessionState::Disconnected);
        assert_eq!(server.registry().count(), 0);
        assert!(!server.worlds().main().is_member(handle.id()));
    }

    #[test]
    fn second_player_sees_full_server() {
        let server = server();
        let (mut first, first_handle) = connect(&server);
        handshake(&mut first, "First");
        read_until(&mut first, id::SET_PERMISSION);
        wait_for(|| first_handle.is_online());

        let (mut second, second_handle) = connect(&server);
        handshake(&mut second, "Second");
        let kick = read_until(&mut second, id::KICK);
        assert_eq!(text_of(&kick, 1), "Sorry, server is full (1/1)");
        wait_for(|| second_handle.state() == SessionState::Disconnected);
        assert_eq!(second_handle.leave_reason(), LeaveReason::ServerFull);
        assert_eq!(server.registry().count(), 1);
        assert!(server.registry().get(second_handle.id()).is_none());
    }

    #[test]
    fn failed_join_leaves_session_in_place() {
        let server = server();
        let full = server.worlds().add(World::new(
            "full",
            Map::flat(Dimensions::new(16, 16, 16).unwrap()),
            WorldSettings {
                max_players: 0,
                ..WorldSettings::default()
            },
        ));
        let (mut client, handle) = connect(&server);
        handshake(&mut client, "Tester");
        read_until(&mut client, id::SET_PERMISSION);
        wait_for(|| handle.is_online());
        let before = handle.position();

        handle.join_world(Arc::clone(&full), WorldChangeReason::ManualJoin);
        let text = loop {
            let frame = read_until(&mut client, id::MESSAGE);
            let text = text_of(&frame, 2);
            if text.contains("Could not join") {
                break text;
            }
        };
        assert!(text.contains("full"), "{text}");
        assert_eq!(handle.world().unwrap().name(), "main");
        assert_eq!(handle.position(), before);
        assert!(!full.is_member(handle.id()));
        assert!(server.worlds().main().is_member(handle.id()));
    }

    #[test]
    fn kick_is_the_last_packet() {
        let server = server();
        let (mut client, handle) = connect(&server);
        handshake(&mut client, "Tester");
        read_until(&mut client, id::SET_PERMISSION);
        wait_for(|| handle.is_online());

        server.shutdown();
        let kick = read_until(&mut client, id::KICK);
        assert_eq!(text_of(&kick, 1), "Server shutting down");
        assert!(read_frame(&mut client).is_none());
        wait_for(|| handle.state() == SessionState::Disconnected);
        assert_eq!(handle.leave_reason(), LeaveReason::ServerShutdown);
    }

    #[test]
    fn default_world_when_none_configured() {
        let server_only = CONFIG.split("[[worlds]]").next().unwrap();
        let config = ServerConfig::parse(server_only).unwrap();
        let manager = load_worlds(&config).unwrap();
        assert_eq!(manager.main().name(), "main");
        assert_eq!(manager.all().len(), 1);
    }
}
