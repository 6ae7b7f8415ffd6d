//! SetPlayerTeam (0x5C) — Server → Client.
//!
//! Creates, updates or removes a scoreboard team. The team's name tag
//! visibility rule is what makes the client draw (or hide) the vanilla
//! name tag above members' heads.

use bytes::{Buf, BufMut};

use crate::codec::{read_string, read_u8, write_string, ProtoDecode, ProtoEncode};
use crate::error::ProtoError;
use crate::types::VarInt;

pub const MODE_CREATE: u8 = 0;
pub const MODE_REMOVE: u8 = 1;
pub const MODE_UPDATE_INFO: u8 = 2;
pub const MODE_ADD_ENTITIES: u8 = 3;
pub const MODE_REMOVE_ENTITIES: u8 = 4;

/// Team-level rule for drawing the vanilla name tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameTagVisibility {
    Always,
    Never,
    HideForOtherTeams,
    HideForOwnTeam,
}

impl NameTagVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            NameTagVisibility::Always => "always",
            NameTagVisibility::Never => "never",
            NameTagVisibility::HideForOtherTeams => "hideForOtherTeams",
            NameTagVisibility::HideForOwnTeam => "hideForOwnTeam",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ProtoError> {
        match s {
            "always" => Ok(NameTagVisibility::Always),
            "never" => Ok(NameTagVisibility::Never),
            "hideForOtherTeams" => Ok(NameTagVisibility::HideForOtherTeams),
            "hideForOwnTeam" => Ok(NameTagVisibility::HideForOwnTeam),
            other => Err(ProtoError::InvalidData(format!(
                "unknown name tag visibility '{other}'"
            ))),
        }
    }
}

/// Team parameters sent with create and update-info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamInfo {
    /// JSON chat component.
    pub display_name: String,
    pub friendly_flags: u8,
    pub name_tag_visibility: NameTagVisibility,
    pub collision_rule: String,
    pub color: i32,
    /// JSON chat component.
    pub prefix: String,
    /// JSON chat component.
    pub suffix: String,
}

impl ProtoEncode for TeamInfo {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        write_string(buf, &self.display_name);
        buf.put_u8(self.friendly_flags);
        write_string(buf, self.name_tag_visibility.as_str());
        write_string(buf, &self.collision_rule);
        VarInt(self.color).proto_encode(buf);
        write_string(buf, &self.prefix);
        write_string(buf, &self.suffix);
    }
}

impl ProtoDecode for TeamInfo {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            display_name: read_string(buf)?,
            friendly_flags: read_u8(buf)?,
            name_tag_visibility: NameTagVisibility::parse(&read_string(buf)?)?,
            collision_rule: read_string(buf)?,
            color: VarInt::proto_decode(buf)?.0,
            prefix: read_string(buf)?,
            suffix: read_string(buf)?,
        })
    }
}

/// What the packet does to the team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeamAction {
    Create {
        info: TeamInfo,
        entities: Vec<String>,
    },
    Remove,
    UpdateInfo(TeamInfo),
    AddEntities(Vec<String>),
    RemoveEntities(Vec<String>),
}

impl TeamAction {
    pub fn mode(&self) -> u8 {
        match self {
            TeamAction::Create { .. } => MODE_CREATE,
            TeamAction::Remove => MODE_REMOVE,
            TeamAction::UpdateInfo(_) => MODE_UPDATE_INFO,
            TeamAction::AddEntities(_) => MODE_ADD_ENTITIES,
            TeamAction::RemoveEntities(_) => MODE_REMOVE_ENTITIES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetPlayerTeam {
    pub name: String,
    pub action: TeamAction,
}

impl SetPlayerTeam {
    /// Team info carried by create / update-info packets.
    pub fn info_mut(&mut self) -> Option<&mut TeamInfo> {
        match &mut self.action {
            TeamAction::Create { info, .. } | TeamAction::UpdateInfo(info) => Some(info),
            _ => None,
        }
    }
}

fn write_entities(buf: &mut impl BufMut, entities: &[String]) {
    VarInt(entities.len() as i32).proto_encode(buf);
    for e in entities {
        write_string(buf, e);
    }
}

fn read_entities(buf: &mut impl Buf) -> Result<Vec<String>, ProtoError> {
    let count = VarInt::proto_decode(buf)?.0;
    if count < 0 || count as usize > buf.remaining() {
        return Err(ProtoError::InvalidData(format!(
            "team entity count {count} out of range"
        )));
    }
    (0..count).map(|_| read_string(buf)).collect()
}

impl ProtoEncode for SetPlayerTeam {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        write_string(buf, &self.name);
        buf.put_u8(self.action.mode());
        match &self.action {
            TeamAction::Create { info, entities } => {
                info.proto_encode(buf);
                write_entities(buf, entities);
            }
            TeamAction::Remove => {}
            TeamAction::UpdateInfo(info) => info.proto_encode(buf),
            TeamAction::AddEntities(entities) | TeamAction::RemoveEntities(entities) => {
                write_entities(buf, entities)
            }
        }
    }
}

impl ProtoDecode for SetPlayerTeam {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        let name = read_string(buf)?;
        let action = match read_u8(buf)? {
            MODE_CREATE => {
                let info = TeamInfo::proto_decode(buf)?;
                let entities = read_entities(buf)?;
                TeamAction::Create { info, entities }
            }
            MODE_REMOVE => TeamAction::Remove,
            MODE_UPDATE_INFO => TeamAction::UpdateInfo(TeamInfo::proto_decode(buf)?),
            MODE_ADD_ENTITIES => TeamAction::AddEntities(read_entities(buf)?),
            MODE_REMOVE_ENTITIES => TeamAction::RemoveEntities(read_entities(buf)?),
            other => return Err(ProtoError::UnknownTeamMode(other)),
        };
        Ok(Self { name, action })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn info(visibility: NameTagVisibility) -> TeamInfo {
        TeamInfo {
            display_name: r#"{"text":"red"}"#.into(),
            friendly_flags: 0x03,
            name_tag_visibility: visibility,
            collision_rule: "always".into(),
            color: 12,
            prefix: r#"{"text":"[R] "}"#.into(),
            suffix: r#"{"text":""}"#.into(),
        }
    }

    #[test]
    fn create_decodes_after_encode() {
        let pkt = SetPlayerTeam {
            name: "red".into(),
            action: TeamAction::Create {
                info: info(NameTagVisibility::Always),
                entities: vec!["Alice".into(), "Bob".into()],
            },
        };
        let mut buf = BytesMut::new();
        pkt.proto_encode(&mut buf);
        let decoded = SetPlayerTeam::proto_decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, pkt);
    }

    #[test]
    fn rewriting_visibility_preserves_other_fields() {
        let mut pkt = SetPlayerTeam {
            name: "blue".into(),
            action: TeamAction::UpdateInfo(info(NameTagVisibility::HideForOtherTeams)),
        };
        pkt.info_mut().unwrap().name_tag_visibility = NameTagVisibility::Never;

        let mut buf = BytesMut::new();
        pkt.proto_encode(&mut buf);
        let decoded = SetPlayerTeam::proto_decode(&mut buf.freeze()).unwrap();
        let mut expected = info(NameTagVisibility::Never);
        expected.name_tag_visibility = NameTagVisibility::Never;
        assert_eq!(decoded.action, TeamAction::UpdateInfo(expected));
    }

    #[test]
    fn membership_modes_have_no_info() {
        let mut pkt = SetPlayerTeam {
            name: "t".into(),
            action: TeamAction::AddEntities(vec!["Carol".into()]),
        };
        assert!(pkt.info_mut().is_none());
        pkt.action = TeamAction::Remove;
        assert!(pkt.info_mut().is_none());
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "t");
        buf.put_u8(9);
        assert!(matches!(
            SetPlayerTeam::proto_decode(&mut buf.freeze()),
            Err(ProtoError::UnknownTeamMode(9))
        ));
    }

    #[test]
    fn unknown_visibility_is_rejected() {
        assert!(NameTagVisibility::parse("sometimes").is_err());
        assert_eq!(
            NameTagVisibility::parse("hideForOwnTeam").unwrap(),
            NameTagVisibility::HideForOwnTeam
        );
    }
}
