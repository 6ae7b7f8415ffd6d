//! Nametag visibility and synchronization engine.
//!
//! Every player gets a synthetic text display riding on their player entity.
//! The engine mirrors the server's own entity tracking to decide which
//! clients see which display, hides displays on death, invisibility and
//! spectating, and rewrites outbound packets so the vanilla name tag stays
//! off and passenger updates never knock the display loose.

pub mod composer;
pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod memory;
pub mod passengers;
pub mod relation;
pub mod scheduler;

pub use config::{NametagConfig, NametagSettings, SpectatorPolicy};
pub use display::{DisplayHandle, HideReason};
pub use engine::{NametagEngine, NametagEngineBuilder, PacketVerdict};
pub use error::NametagError;
pub use relation::TrackingSnapshot;
