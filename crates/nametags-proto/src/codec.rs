//! Protocol encoding/decoding traits and helpers.

use bytes::{Buf, BufMut};

use crate::error::ProtoError;
use crate::types::VarInt;

/// Longest string the decoder accepts, in bytes.
pub const MAX_STRING_BYTES: usize = 32767 * 4;

/// Encode a value onto a buffer.
pub trait ProtoEncode {
    fn proto_encode(&self, buf: &mut impl BufMut);
}

/// Decode a value from a buffer.
pub trait ProtoDecode: Sized {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError>;
}

/// Write a protocol string (VarInt length + UTF-8).
pub fn write_string(buf: &mut impl BufMut, s: &str) {
    VarInt(s.len() as i32).proto_encode(buf);
    buf.put_slice(s.as_bytes());
}

/// Read a protocol string (VarInt length + UTF-8).
pub fn read_string(buf: &mut impl Buf) -> Result<String, ProtoError> {
    let len = VarInt::proto_decode(buf)?.0;
    if len < 0 {
        return Err(ProtoError::InvalidData(format!("negative string length {len}")));
    }
    let len = len as usize;
    if len > MAX_STRING_BYTES {
        return Err(ProtoError::StringTooLong {
            len,
            max: MAX_STRING_BYTES,
        });
    }
    ensure_remaining(buf, len)?;
    let data = buf.copy_to_bytes(len);
    String::from_utf8(data.to_vec()).map_err(|_| ProtoError::InvalidUtf8)
}

/// Read a single byte.
pub fn read_u8(buf: &mut impl Buf) -> Result<u8, ProtoError> {
    ensure_remaining(buf, 1)?;
    Ok(buf.get_u8())
}

/// Read a VarInt-prefixed array of VarInts.
pub fn read_varint_array(buf: &mut impl Buf) -> Result<Vec<i32>, ProtoError> {
    let count = VarInt::proto_decode(buf)?.0;
    if count < 0 || count as usize > buf.remaining() {
        return Err(ProtoError::InvalidData(format!(
            "array length {count} exceeds {} remaining bytes",
            buf.remaining()
        )));
    }
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(VarInt::proto_decode(buf)?.0);
    }
    Ok(out)
}

/// Write a VarInt-prefixed array of VarInts.
pub fn write_varint_array(buf: &mut impl BufMut, values: &[i32]) {
    VarInt(values.len() as i32).proto_encode(buf);
    for v in values {
        VarInt(*v).proto_encode(buf);
    }
}

pub(crate) fn ensure_remaining(buf: &impl Buf, needed: usize) -> Result<(), ProtoError> {
    if buf.remaining() < needed {
        return Err(ProtoError::BufferTooShort {
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn string_unicode() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "§aネームタグ");
        let result = read_string(&mut buf.freeze()).unwrap();
        assert_eq!(result, "§aネームタグ");
    }

    #[test]
    fn string_buffer_too_short() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "Hello");
        let truncated = buf.freeze().slice(..3);
        assert!(matches!(
            read_string(&mut truncated.clone()),
            Err(ProtoError::BufferTooShort { .. })
        ));
    }

    #[test]
    fn varint_array_rejects_absurd_length() {
        let mut buf = BytesMut::new();
        VarInt(1_000_000).proto_encode(&mut buf);
        buf.put_u8(1);
        assert!(read_varint_array(&mut buf.freeze()).is_err());
    }

    #[test]
    fn varint_array_reads_back() {
        let mut buf = BytesMut::new();
        write_varint_array(&mut buf, &[7, 300, 2_147_483_000]);
        let values = read_varint_array(&mut buf.freeze()).unwrap();
        assert_eq!(values, vec![7, 300, 2_147_483_000]);
    }
}
