//! Engine-level errors.
//!
//! Per-observer failures (a packet that cannot be delivered, a label that
//! cannot be formatted) never surface here: they are logged and contained
//! where they happen. These variants cover setup and the raw packet filter.

use std::path::PathBuf;

use nametags_proto::error::ProtoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NametagError {
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to start composer pool: {0}")]
    ComposerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("malformed outbound packet 0x{id:02X}: {source}")]
    MalformedPacket {
        id: i32,
        #[source]
        source: ProtoError,
    },
}
