//! Clientbound packets handled by the nametag engine.

pub mod add_entity;
pub mod remove_entities;
pub mod set_entity_data;
pub mod set_passengers;
pub mod set_player_team;

pub use add_entity::AddEntity;
pub use remove_entities::RemoveEntities;
pub use set_entity_data::{Billboard, EntityDataEntry, EntityDataValue, SetEntityData};
pub use set_passengers::SetPassengers;
pub use set_player_team::{NameTagVisibility, SetPlayerTeam, TeamAction, TeamInfo};

use bytes::{Bytes, BytesMut};

use crate::codec::{ProtoDecode, ProtoEncode};
use crate::error::ProtoError;

/// Play-state packet ids (protocol 764).
pub mod id {
    pub const ADD_ENTITY: i32 = 0x01;
    pub const REMOVE_ENTITIES: i32 = 0x3E;
    pub const SET_ENTITY_DATA: i32 = 0x54;
    pub const SET_PASSENGERS: i32 = 0x5B;
    pub const SET_PLAYER_TEAM: i32 = 0x5C;
}

fn encode_to_bytes(pkt: &impl ProtoEncode) -> Bytes {
    let mut buf = BytesMut::new();
    pkt.proto_encode(&mut buf);
    buf.freeze()
}

/// Packets the engine itself sends to a viewer.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientboundPacket {
    AddEntity(AddEntity),
    RemoveEntities(RemoveEntities),
    SetEntityData(SetEntityData),
    SetPassengers(SetPassengers),
}

impl ClientboundPacket {
    pub fn id(&self) -> i32 {
        match self {
            ClientboundPacket::AddEntity(_) => id::ADD_ENTITY,
            ClientboundPacket::RemoveEntities(_) => id::REMOVE_ENTITIES,
            ClientboundPacket::SetEntityData(_) => id::SET_ENTITY_DATA,
            ClientboundPacket::SetPassengers(_) => id::SET_PASSENGERS,
        }
    }

    /// Payload bytes, without the packet id.
    pub fn encode_payload(&self) -> Bytes {
        match self {
            ClientboundPacket::AddEntity(p) => encode_to_bytes(p),
            ClientboundPacket::RemoveEntities(p) => encode_to_bytes(p),
            ClientboundPacket::SetEntityData(p) => encode_to_bytes(p),
            ClientboundPacket::SetPassengers(p) => encode_to_bytes(p),
        }
    }
}

/// A server packet on its way to one client, as seen by the outbound filter.
///
/// Only the three kinds the engine rewrites are decoded; everything else is
/// carried as opaque bytes and re-emitted unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundPacket {
    Teams(SetPlayerTeam),
    SetPassengers(SetPassengers),
    RemoveEntities(RemoveEntities),
    Other { id: i32, payload: Bytes },
}

impl OutboundPacket {
    pub fn decode(packet_id: i32, payload: Bytes) -> Result<Self, ProtoError> {
        let mut buf = payload.clone();
        Ok(match packet_id {
            id::SET_PLAYER_TEAM => OutboundPacket::Teams(SetPlayerTeam::proto_decode(&mut buf)?),
            id::SET_PASSENGERS => {
                OutboundPacket::SetPassengers(SetPassengers::proto_decode(&mut buf)?)
            }
            id::REMOVE_ENTITIES => {
                OutboundPacket::RemoveEntities(RemoveEntities::proto_decode(&mut buf)?)
            }
            _ => OutboundPacket::Other {
                id: packet_id,
                payload,
            },
        })
    }

    pub fn id(&self) -> i32 {
        match self {
            OutboundPacket::Teams(_) => id::SET_PLAYER_TEAM,
            OutboundPacket::SetPassengers(_) => id::SET_PASSENGERS,
            OutboundPacket::RemoveEntities(_) => id::REMOVE_ENTITIES,
            OutboundPacket::Other { id, .. } => *id,
        }
    }

    pub fn encode_payload(&self) -> Bytes {
        match self {
            OutboundPacket::Teams(p) => encode_to_bytes(p),
            OutboundPacket::SetPassengers(p) => encode_to_bytes(p),
            OutboundPacket::RemoveEntities(p) => encode_to_bytes(p),
            OutboundPacket::Other { payload, .. } => payload.clone(),
        }
    }
}

impl From<ClientboundPacket> for OutboundPacket {
    fn from(pkt: ClientboundPacket) -> Self {
        match pkt {
            ClientboundPacket::SetPassengers(p) => OutboundPacket::SetPassengers(p),
            ClientboundPacket::RemoveEntities(p) => OutboundPacket::RemoveEntities(p),
            other => OutboundPacket::Other {
                id: other.id(),
                payload: other.encode_payload(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uninteresting_ids_pass_through_untouched() {
        let payload = Bytes::from_static(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let pkt = OutboundPacket::decode(0x23, payload.clone()).unwrap();
        assert_eq!(pkt.id(), 0x23);
        assert_eq!(pkt.encode_payload(), payload);
    }

    #[test]
    fn passengers_are_decoded() {
        let original = ClientboundPacket::SetPassengers(SetPassengers {
            vehicle_id: 10,
            passenger_ids: vec![11],
        });
        let pkt = OutboundPacket::decode(original.id(), original.encode_payload()).unwrap();
        assert!(matches!(
            pkt,
            OutboundPacket::SetPassengers(ref p) if p.vehicle_id == 10 && p.passenger_ids == vec![11]
        ));
    }

    #[test]
    fn malformed_interesting_packet_is_an_error() {
        let pkt = OutboundPacket::decode(id::SET_PLAYER_TEAM, Bytes::from_static(&[0x05, b'a']));
        assert!(pkt.is_err());
    }

    #[test]
    fn engine_packets_convert_for_filtering() {
        let pkt: OutboundPacket = ClientboundPacket::RemoveEntities(RemoveEntities::single(4)).into();
        assert_eq!(pkt, OutboundPacket::RemoveEntities(RemoveEntities::single(4)));
        let spawn = ClientboundPacket::AddEntity(AddEntity::text_display(
            1,
            crate::types::Uuid::ZERO,
            crate::types::Vec3::ZERO,
        ));
        let pkt: OutboundPacket = spawn.clone().into();
        assert_eq!(pkt.id(), id::ADD_ENTITY);
        assert_eq!(pkt.encode_payload(), spawn.encode_payload());
    }
}
