//! Engine ports: the types, events and traits through which the nametag
//! engine talks to the hosting game server.
//!
//! Nothing here holds engine state. A host implements [`GameServer`] and
//! [`Scheduler`], optionally [`TextFormatter`] and [`VanishHook`], and feeds
//! [`NametagEvent`]s in.

use std::fmt;
use std::sync::Arc;

use nametags_proto::packets::ClientboundPacket;
use nametags_proto::text::TextComponent;
use nametags_proto::types::{Uuid, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─── Types ───────────────────────────────────────────────────────────────────

/// Stable identity of a player across reconnects.
pub type PlayerId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    #[default]
    Survival,
    Creative,
    Adventure,
    Spectator,
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GameMode::Survival => "survival",
            GameMode::Creative => "creative",
            GameMode::Adventure => "adventure",
            GameMode::Spectator => "spectator",
        };
        f.write_str(name)
    }
}

/// Client family behind a connection (Bedrock players arrive through a proxy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Platform {
    #[default]
    Java,
    Bedrock,
}

/// Point-in-time view of a player, as reported by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    /// Server-assigned entity id of the player entity.
    pub entity_id: i32,
    pub world: String,
    pub position: Vec3,
    pub online: bool,
    pub dead: bool,
    pub game_mode: GameMode,
    pub platform: Platform,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PotionEffectKind {
    Invisibility,
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectAction {
    Added,
    Removed,
    Cleared,
}

// ─── Events ──────────────────────────────────────────────────────────────────

/// Notifications the host forwards to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum NametagEvent {
    PlayerJoin {
        player: PlayerId,
    },
    PlayerQuit {
        player: PlayerId,
    },
    PlayerDeath {
        player: PlayerId,
    },
    PlayerRespawn {
        player: PlayerId,
    },
    GameModeChange {
        player: PlayerId,
        old: GameMode,
        new: GameMode,
    },
    PotionEffect {
        player: PlayerId,
        action: EffectAction,
        effect: PotionEffectKind,
    },
    VanishChange {
        player: PlayerId,
        vanished: bool,
    },
    /// `observer`'s client was told about `subject`'s entity.
    TrackStart {
        observer: PlayerId,
        subject: PlayerId,
    },
    /// `observer`'s client was told to forget `subject`'s entity.
    TrackStop {
        observer: PlayerId,
        subject: PlayerId,
    },
}

impl NametagEvent {
    /// The player whose label the event is about.
    pub fn subject(&self) -> PlayerId {
        match self {
            NametagEvent::PlayerJoin { player }
            | NametagEvent::PlayerQuit { player }
            | NametagEvent::PlayerDeath { player }
            | NametagEvent::PlayerRespawn { player }
            | NametagEvent::GameModeChange { player, .. }
            | NametagEvent::PotionEffect { player, .. }
            | NametagEvent::VanishChange { player, .. } => *player,
            NametagEvent::TrackStart { subject, .. } | NametagEvent::TrackStop { subject, .. } => {
                *subject
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NametagEvent::PlayerJoin { .. } => "join",
            NametagEvent::PlayerQuit { .. } => "quit",
            NametagEvent::PlayerDeath { .. } => "death",
            NametagEvent::PlayerRespawn { .. } => "respawn",
            NametagEvent::GameModeChange { .. } => "gamemode",
            NametagEvent::PotionEffect { .. } => "potion",
            NametagEvent::VanishChange { .. } => "vanish",
            NametagEvent::TrackStart { .. } => "track",
            NametagEvent::TrackStop { .. } => "untrack",
        }
    }
}

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SendError {
    #[error("player {0} has no open connection")]
    NotConnected(PlayerId),

    #[error("connection of {player} rejected packet: {reason}")]
    Rejected { player: PlayerId, reason: String },
}

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("placeholder '{placeholder}' failed: {reason}")]
    Placeholder { placeholder: String, reason: String },

    #[error("cannot format line '{line}': {reason}")]
    Template { line: String, reason: String },
}

// ─── Game server port ────────────────────────────────────────────────────────

/// Read access to players and a per-player packet sink.
///
/// Called from the tick thread, scheduler tasks and packet filters alike,
/// so implementations must be thread-safe.
pub trait GameServer: Send + Sync {
    fn player(&self, id: PlayerId) -> Option<PlayerView>;

    fn online_players(&self) -> Vec<PlayerView>;

    fn send_packet(&self, to: PlayerId, packet: ClientboundPacket) -> Result<(), SendError>;

    fn is_online(&self, id: PlayerId) -> bool {
        self.player(id).is_some_and(|p| p.online)
    }

    fn players_in_world(&self, world: &str) -> Vec<PlayerView> {
        self.online_players()
            .into_iter()
            .filter(|p| p.world == world)
            .collect()
    }

    fn player_by_entity_id(&self, entity_id: i32) -> Option<PlayerView> {
        self.online_players()
            .into_iter()
            .find(|p| p.entity_id == entity_id)
    }
}

// ─── Scheduler port ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

pub type Task = Box<dyn FnOnce() + Send + 'static>;
pub type RepeatingTask = Arc<dyn Fn() + Send + Sync + 'static>;

/// Deferred execution measured in game ticks.
///
/// Tasks may run on the tick thread or a worker thread; they must re-check
/// whatever state they depend on instead of trusting what was true when they
/// were scheduled.
pub trait Scheduler: Send + Sync {
    /// Run `task` once, `delay_ticks` ticks from now (0 = next tick).
    fn run_later(&self, delay_ticks: u64, task: Task) -> TaskId;

    /// Run `task` after `delay_ticks`, then every `interval_ticks`.
    fn run_repeating(&self, delay_ticks: u64, interval_ticks: u64, task: RepeatingTask) -> TaskId;

    /// Drop a pending task. Unknown ids are ignored.
    fn cancel(&self, id: TaskId);
}

// ─── Collaborators ───────────────────────────────────────────────────────────

/// Placeholder expansion and colour formatting for one template line.
pub trait TextFormatter: Send + Sync {
    fn format(&self, player: &PlayerView, line: &str) -> Result<TextComponent, FormatError>;
}

/// Vanish plugin integration.
pub trait VanishHook: Send + Sync {
    fn is_vanished(&self, subject: PlayerId) -> bool;

    fn can_see(&self, observer: PlayerId, subject: PlayerId) -> bool;
}

/// Used when no vanish plugin is installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoVanish;

impl VanishHook for NoVanish {
    fn is_vanished(&self, _subject: PlayerId) -> bool {
        false
    }

    fn can_see(&self, _observer: PlayerId, _subject: PlayerId) -> bool {
        true
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
