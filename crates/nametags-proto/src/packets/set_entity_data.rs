//! SetEntityData (0x54) — Server → Client.
//!
//! Updates entity metadata. For text displays this carries the label text
//! and every rendering attribute.

use bytes::BufMut;
use serde::{Deserialize, Serialize};

use crate::codec::{write_string, ProtoEncode};
use crate::text::TextComponent;
use crate::types::{VarInt, Vector3f};

/// Metadata indices for `minecraft:text_display`.
pub mod index {
    pub const TRANSLATION: u8 = 11;
    pub const SCALE: u8 = 12;
    pub const BILLBOARD: u8 = 15;
    pub const VIEW_RANGE: u8 = 17;
    pub const TEXT: u8 = 23;
    pub const LINE_WIDTH: u8 = 24;
    pub const BACKGROUND_COLOR: u8 = 25;
    pub const TEXT_OPACITY: u8 = 26;
    pub const STYLE_FLAGS: u8 = 27;
}

/// Bits of the text display style byte.
pub mod style {
    pub const SHADOW: u8 = 0x01;
    pub const SEE_THROUGH: u8 = 0x02;
    pub const DEFAULT_BACKGROUND: u8 = 0x04;
}

const SERIALIZER_BYTE: i32 = 0;
const SERIALIZER_VARINT: i32 = 1;
const SERIALIZER_FLOAT: i32 = 3;
const SERIALIZER_COMPONENT: i32 = 5;
const SERIALIZER_VECTOR3: i32 = 26;

/// Ends the metadata list.
const END_OF_METADATA: u8 = 0xFF;

/// How a display entity turns to face the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Billboard {
    Fixed,
    Vertical,
    Horizontal,
    #[default]
    Center,
}

impl Billboard {
    pub fn id(&self) -> u8 {
        match self {
            Billboard::Fixed => 0,
            Billboard::Vertical => 1,
            Billboard::Horizontal => 2,
            Billboard::Center => 3,
        }
    }
}

/// Typed metadata value.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityDataValue {
    Byte(u8),
    VarInt(i32),
    Float(f32),
    Component(TextComponent),
    Vector3(Vector3f),
}

impl EntityDataValue {
    fn serializer(&self) -> i32 {
        match self {
            EntityDataValue::Byte(_) => SERIALIZER_BYTE,
            EntityDataValue::VarInt(_) => SERIALIZER_VARINT,
            EntityDataValue::Float(_) => SERIALIZER_FLOAT,
            EntityDataValue::Component(_) => SERIALIZER_COMPONENT,
            EntityDataValue::Vector3(_) => SERIALIZER_VECTOR3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityDataEntry {
    pub index: u8,
    pub value: EntityDataValue,
}

impl EntityDataEntry {
    pub fn new(index: u8, value: EntityDataValue) -> Self {
        Self { index, value }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetEntityData {
    pub entity_id: i32,
    pub entries: Vec<EntityDataEntry>,
}

impl SetEntityData {
    /// The entry at `index`, if present.
    pub fn get(&self, index: u8) -> Option<&EntityDataValue> {
        self.entries
            .iter()
            .find(|e| e.index == index)
            .map(|e| &e.value)
    }

    /// The label text carried by this update, if any.
    pub fn text(&self) -> Option<&TextComponent> {
        match self.get(index::TEXT) {
            Some(EntityDataValue::Component(c)) => Some(c),
            _ => None,
        }
    }
}

impl ProtoEncode for SetEntityData {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        VarInt(self.entity_id).proto_encode(buf);
        for entry in &self.entries {
            buf.put_u8(entry.index);
            VarInt(entry.value.serializer()).proto_encode(buf);
            match &entry.value {
                EntityDataValue::Byte(v) => buf.put_u8(*v),
                EntityDataValue::VarInt(v) => VarInt(*v).proto_encode(buf),
                EntityDataValue::Float(v) => buf.put_f32(*v),
                EntityDataValue::Component(c) => write_string(buf, &c.to_json()),
                EntityDataValue::Vector3(v) => v.proto_encode(buf),
            }
        }
        buf.put_u8(END_OF_METADATA);
    }
}
