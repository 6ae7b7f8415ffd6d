//! RemoveEntities (0x3E) — Server → Client.
//!
//! Despawns a batch of entities from the client's world.

use bytes::{Buf, BufMut};

use crate::codec::{read_varint_array, write_varint_array, ProtoDecode, ProtoEncode};
use crate::error::ProtoError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveEntities {
    pub entity_ids: Vec<i32>,
}

impl RemoveEntities {
    pub fn single(entity_id: i32) -> Self {
        Self {
            entity_ids: vec![entity_id],
        }
    }
}

impl ProtoEncode for RemoveEntities {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        write_varint_array(buf, &self.entity_ids);
    }
}

impl ProtoDecode for RemoveEntities {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            entity_ids: read_varint_array(buf)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn encode_single() {
        let mut buf = BytesMut::new();
        RemoveEntities::single(42).proto_encode(&mut buf);
        assert_eq!(&buf[..], &[0x01, 0x2A]);
    }

    #[test]
    fn decode_batch() {
        let mut data: &[u8] = &[0x03, 0x01, 0x02, 0xAC, 0x02];
        let pkt = RemoveEntities::proto_decode(&mut data).unwrap();
        assert_eq!(pkt.entity_ids, vec![1, 2, 300]);
    }
}
