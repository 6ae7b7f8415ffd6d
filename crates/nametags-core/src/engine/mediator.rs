use super::*;

use bytes::Bytes;
use nametags_api::Platform;
use nametags_proto::packets::{
    NameTagVisibility, OutboundPacket, RemoveEntities, SetPassengers, SetPlayerTeam,
};

/// What the connection pipeline should do with a packet after filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketVerdict {
    /// Send the original bytes.
    PassThrough,
    /// The packet was modified and must be encoded again.
    ReEncode,
}

impl NametagEngine {
    // ─── Outbound filter ─────────────────────────────────────────────────

    /// Inspect (and possibly rewrite) a packet about to be sent to
    /// `receiver`.
    pub fn on_outbound_packet(
        &self,
        receiver: PlayerId,
        packet: &mut OutboundPacket,
    ) -> PacketVerdict {
        match packet {
            OutboundPacket::Teams(pkt) => self.filter_teams(receiver, pkt),
            OutboundPacket::SetPassengers(pkt) => self.filter_passengers(receiver, pkt),
            OutboundPacket::RemoveEntities(pkt) => {
                self.filter_remove_entities(receiver, pkt);
                PacketVerdict::PassThrough
            }
            OutboundPacket::Other { .. } => PacketVerdict::PassThrough,
        }
    }

    /// Byte-level variant of [`Self::on_outbound_packet`]: returns the
    /// payload to send in place of `payload`.
    pub fn on_raw_outbound(
        &self,
        receiver: PlayerId,
        packet_id: i32,
        payload: Bytes,
    ) -> Result<Bytes, NametagError> {
        let mut packet = OutboundPacket::decode(packet_id, payload.clone()).map_err(|source| {
            NametagError::MalformedPacket {
                id: packet_id,
                source,
            }
        })?;
        Ok(match self.on_outbound_packet(receiver, &mut packet) {
            PacketVerdict::PassThrough => payload,
            PacketVerdict::ReEncode => packet.encode_payload(),
        })
    }

    fn suppresses_vanilla_tags(&self, receiver: PlayerId) -> bool {
        let platform = self
            .server()
            .player(receiver)
            .map(|p| p.platform)
            .unwrap_or_default();
        match platform {
            Platform::Java => self.settings().disable_default_name_tag,
            Platform::Bedrock => self.settings().disable_default_name_tag_bedrock,
        }
    }

    /// Force the vanilla name tag off on team create/update.
    fn filter_teams(&self, receiver: PlayerId, pkt: &mut SetPlayerTeam) -> PacketVerdict {
        if !self.suppresses_vanilla_tags(receiver) {
            return PacketVerdict::PassThrough;
        }
        match pkt.info_mut() {
            Some(info) if info.name_tag_visibility != NameTagVisibility::Never => {
                info.name_tag_visibility = NameTagVisibility::Never;
                PacketVerdict::ReEncode
            }
            _ => PacketVerdict::PassThrough,
        }
    }

    /// Remember the real riders and keep the display in the list for
    /// receivers that can see it.
    fn filter_passengers(&self, receiver: PlayerId, pkt: &mut SetPassengers) -> PacketVerdict {
        let Some(subject) = self.resolve_entity(pkt.vehicle_id) else {
            return PacketVerdict::PassThrough;
        };
        let Some(handle) = self.get_display(subject) else {
            return PacketVerdict::PassThrough;
        };
        self.inner.ctx.passengers.record(
            pkt.vehicle_id,
            &pkt.passenger_ids,
            EntityIdAllocator::is_synthetic,
        );
        if handle.is_visible_to(receiver) && pkt.add_passenger(handle.entity_id()) {
            return PacketVerdict::ReEncode;
        }
        PacketVerdict::PassThrough
    }

    /// A player entity is leaving `receiver`'s client: take its display
    /// with it.
    fn filter_remove_entities(&self, receiver: PlayerId, pkt: &RemoveEntities) {
        for &entity_id in &pkt.entity_ids {
            if EntityIdAllocator::is_synthetic(entity_id) {
                continue;
            }
            let Some(subject) = self.resolve_entity(entity_id) else {
                continue;
            };
            if let Some(handle) = self.get_display(subject) {
                if handle.is_visible_to(receiver) {
                    handle.unsubscribe(receiver);
                }
            }
        }
    }

    fn resolve_entity(&self, entity_id: i32) -> Option<PlayerId> {
        if let Some(player) = self.inner.entity_index.get(&entity_id) {
            return Some(*player);
        }
        self.server()
            .player_by_entity_id(entity_id)
            .filter(|p| p.online)
            .map(|p| p.id)
    }
}
