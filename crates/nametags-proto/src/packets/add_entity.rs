//! AddEntity (0x01) — Server → Client.
//!
//! Spawns a non-player entity. Used once per viewer to bring the synthetic
//! text display into that client's world.

use bytes::BufMut;

use crate::codec::ProtoEncode;
use crate::types::{Uuid, VarInt, Vec3};

/// Registry id of `minecraft:text_display`.
pub const TEXT_DISPLAY_TYPE: i32 = 104;

/// Spawn an entity at a position.
#[derive(Debug, Clone, PartialEq)]
pub struct AddEntity {
    pub entity_id: i32,
    pub uuid: Uuid,
    pub entity_type: i32,
    pub position: Vec3,
    /// Angles in 1/256ths of a full turn.
    pub pitch: u8,
    pub yaw: u8,
    pub head_yaw: u8,
    pub data: i32,
    pub velocity: (i16, i16, i16),
}

impl AddEntity {
    /// A stationary text display at `position`.
    pub fn text_display(entity_id: i32, uuid: Uuid, position: Vec3) -> Self {
        Self {
            entity_id,
            uuid,
            entity_type: TEXT_DISPLAY_TYPE,
            position,
            pitch: 0,
            yaw: 0,
            head_yaw: 0,
            data: 0,
            velocity: (0, 0, 0),
        }
    }
}

impl ProtoEncode for AddEntity {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        VarInt(self.entity_id).proto_encode(buf);
        self.uuid.proto_encode(buf);
        VarInt(self.entity_type).proto_encode(buf);
        self.position.proto_encode(buf);
        buf.put_u8(self.pitch);
        buf.put_u8(self.yaw);
        buf.put_u8(self.head_yaw);
        VarInt(self.data).proto_encode(buf);
        buf.put_i16(self.velocity.0);
        buf.put_i16(self.velocity.1);
        buf.put_i16(self.velocity.2);
    }
}
