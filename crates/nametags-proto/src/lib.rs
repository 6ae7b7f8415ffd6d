//! Java Edition wire types and the clientbound packets the nametag engine
//! reads, rewrites or emits.

pub mod codec;
pub mod error;
pub mod packets;
pub mod text;
pub mod types;
