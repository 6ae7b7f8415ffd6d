//! SetPassengers (0x5B) — Server → Client.
//!
//! Replaces the full passenger list of a vehicle entity. Every update
//! overwrites the previous one on the client, so a list that omits the
//! synthetic display silently detaches it.

use bytes::{Buf, BufMut};

use crate::codec::{read_varint_array, write_varint_array, ProtoDecode, ProtoEncode};
use crate::error::ProtoError;
use crate::types::VarInt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetPassengers {
    pub vehicle_id: i32,
    pub passenger_ids: Vec<i32>,
}

impl SetPassengers {
    /// Append `id` unless it is already riding. Returns whether the list changed.
    pub fn add_passenger(&mut self, id: i32) -> bool {
        if self.passenger_ids.contains(&id) {
            return false;
        }
        self.passenger_ids.push(id);
        true
    }
}

impl ProtoEncode for SetPassengers {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        VarInt(self.vehicle_id).proto_encode(buf);
        write_varint_array(buf, &self.passenger_ids);
    }
}

impl ProtoDecode for SetPassengers {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        let vehicle_id = VarInt::proto_decode(buf)?.0;
        let passenger_ids = read_varint_array(buf)?;
        Ok(Self {
            vehicle_id,
            passenger_ids,
        })
    }
}
