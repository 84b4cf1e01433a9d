//! Extension points the session engine calls out to: lifecycle hooks,
//! command dispatch and chat delivery.

use cubecast_proto::types::Position;
use cubecast_world::World;
use tracing::info;

use crate::error::LeaveReason;
use crate::server::Server;
use crate::session::{SessionHandle, WorldChangeReason};

// ─── Lifecycle ───────────────────────────────────────────────────────────────

/// Callbacks fired by a session worker. Methods returning `bool` or
/// `Result` can veto the action; every default allows it.
pub trait SessionHooks: Send + Sync {
    /// After name verification and ban checks. `Err` kicks with that text.
    fn connecting(&self, _session: &SessionHandle) -> Result<(), String> {
        Ok(())
    }

    /// Before a world transfer starts. Returning false keeps the session
    /// where it is.
    fn joining_world(
        &self,
        _session: &SessionHandle,
        _world: &World,
        _reason: WorldChangeReason,
    ) -> bool {
        true
    }

    fn joined_world(
        &self,
        _session: &SessionHandle,
        _world: &World,
        _previous: Option<&World>,
        _reason: WorldChangeReason,
    ) {
    }

    /// Returning false sends the client back to `from`.
    fn moving(&self, _session: &SessionHandle, _from: Position, _to: Position) -> bool {
        true
    }

    fn moved(&self, _session: &SessionHandle, _from: Position) {}

    fn disconnected(&self, _session: &SessionHandle, _reason: LeaveReason) {}
}

pub struct NoHooks;

impl SessionHooks for NoHooks {}

// ─── Commands ────────────────────────────────────────────────────────────────

/// A `/command arg arg` line split into name and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandCall {
    pub name: String,
    pub args: Vec<String>,
    /// Everything after the command name, untouched.
    pub raw_args: String,
}

impl CommandCall {
    /// `None` for lines that are not commands. `//text` is chat.
    pub fn parse(line: &str) -> Option<Self> {
        let body = line.strip_prefix('/')?;
        if body.starts_with('/') {
            return None;
        }
        let body = body.trim_start();
        let (name, rest) = match body.split_once(' ') {
            Some((name, rest)) => (name, rest.trim()),
            None => (body, ""),
        };
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_ascii_lowercase(),
            args: rest.split_whitespace().map(str::to_string).collect(),
            raw_args: rest.to_string(),
        })
    }
}

/// Chat text of a non-command line; a leading `//` escapes one slash.
pub fn chat_text(line: &str) -> &str {
    if line.starts_with("//") {
        &line[1..]
    } else {
        line
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Done,
    Unknown,
    Denied(String),
    Failed(String),
}

pub trait CommandDispatcher: Send + Sync {
    fn dispatch(&self, server: &Server, session: &SessionHandle, call: &CommandCall)
        -> CommandOutcome;
}

/// Knows no commands.
pub struct UnknownCommands;

impl CommandDispatcher for UnknownCommands {
    fn dispatch(&self, _server: &Server, _session: &SessionHandle, _call: &CommandCall) -> CommandOutcome {
        CommandOutcome::Unknown
    }
}

// ─── Chat ────────────────────────────────────────────────────────────────────

pub trait ChatHandler: Send + Sync {
    fn chat(&self, server: &Server, session: &SessionHandle, text: &str);
}

/// Sends chat to everyone in the sender's world.
pub struct WorldChat;

impl ChatHandler for WorldChat {
    fn chat(&self, server: &Server, session: &SessionHandle, text: &str) {
        let Some(world) = session.world() else {
            return;
        };
        info!("<{}> {text}", session.name());
        let line = format!("{}&f: {text}", session.display_name());
        for member in world.members() {
            if let Some(other) = server.registry().get(member) {
                other.message(&line);
            }
        }
    }
}
