//! In-process [`GameServer`]: a player table plus a recorded outbox.
//!
//! Backs the integration tests and the simulator. Packets sent to a player
//! who is offline, or whose connection is marked failing, are rejected the
//! way a real connection would reject them.

use std::sync::Mutex;
use std::sync::PoisonError;

use dashmap::{DashMap, DashSet};
use nametags_api::{GameMode, GameServer, Platform, PlayerId, PlayerView, SendError};
use nametags_proto::packets::ClientboundPacket;
use nametags_proto::types::Vec3;

pub const DEFAULT_WORLD: &str = "world";

#[derive(Default)]
pub struct MemoryServer {
    players: DashMap<PlayerId, PlayerView>,
    outbox: Mutex<Vec<(PlayerId, ClientboundPacket)>>,
    failing: DashSet<PlayerId>,
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put an online survival Java player into the default world.
    /// The player id is derived from `entity_id`.
    pub fn spawn(&self, name: &str, entity_id: i32, position: Vec3) -> PlayerId {
        let id = PlayerId::v4_from_bits(0x6e61_6d65_7461_6773, entity_id as u64);
        self.insert(PlayerView {
            id,
            name: name.to_string(),
            entity_id,
            world: DEFAULT_WORLD.to_string(),
            position,
            online: true,
            dead: false,
            game_mode: GameMode::Survival,
            platform: Platform::Java,
        });
        id
    }

    pub fn insert(&self, view: PlayerView) {
        self.players.insert(view.id, view);
    }

    fn update(&self, id: PlayerId, f: impl FnOnce(&mut PlayerView)) {
        if let Some(mut view) = self.players.get_mut(&id) {
            f(view.value_mut());
        }
    }

    pub fn set_online(&self, id: PlayerId, online: bool) {
        self.update(id, |p| p.online = online);
    }

    pub fn set_dead(&self, id: PlayerId, dead: bool) {
        self.update(id, |p| p.dead = dead);
    }

    pub fn set_game_mode(&self, id: PlayerId, mode: GameMode) {
        self.update(id, |p| p.game_mode = mode);
    }

    pub fn set_platform(&self, id: PlayerId, platform: Platform) {
        self.update(id, |p| p.platform = platform);
    }

    pub fn move_to(&self, id: PlayerId, world: &str, position: Vec3) {
        self.update(id, |p| {
            p.world = world.to_string();
            p.position = position;
        });
    }

    /// Make every send to `id` fail with [`SendError::Rejected`].
    pub fn fail_sends_to(&self, id: PlayerId) {
        self.failing.insert(id);
    }

    pub fn restore_sends_to(&self, id: PlayerId) {
        self.failing.remove(&id);
    }

    /// Drain everything sent so far.
    pub fn take_outbox(&self) -> Vec<(PlayerId, ClientboundPacket)> {
        std::mem::take(&mut *self.outbox.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Packets sent to `id` so far, without draining.
    pub fn sent_to(&self, id: PlayerId) -> Vec<ClientboundPacket> {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(to, _)| *to == id)
            .map(|(_, pkt)| pkt.clone())
            .collect()
    }

    pub fn outbox_len(&self) -> usize {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl GameServer for MemoryServer {
    fn player(&self, id: PlayerId) -> Option<PlayerView> {
        self.players.get(&id).map(|p| p.value().clone())
    }

    fn online_players(&self) -> Vec<PlayerView> {
        self.players
            .iter()
            .filter(|p| p.online)
            .map(|p| p.value().clone())
            .collect()
    }

    fn send_packet(&self, to: PlayerId, packet: ClientboundPacket) -> Result<(), SendError> {
        if !self.is_online(to) {
            return Err(SendError::NotConnected(to));
        }
        if self.failing.contains(&to) {
            return Err(SendError::Rejected {
                player: to,
                reason: "connection marked failing".into(),
            });
        }
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((to, packet));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nametags_proto::packets::RemoveEntities;

    #[test]
    fn offline_players_reject_packets() {
        let server = MemoryServer::new();
        let id = server.spawn("Alex", 1, Vec3::ZERO);
        let pkt = ClientboundPacket::RemoveEntities(RemoveEntities::single(9));

        assert!(server.send_packet(id, pkt.clone()).is_ok());
        server.set_online(id, false);
        assert!(matches!(
            server.send_packet(id, pkt.clone()),
            Err(SendError::NotConnected(_))
        ));
        assert_eq!(server.take_outbox().len(), 1);
        assert!(server.online_players().is_empty());
        assert!(server.player(id).is_some());
    }

    #[test]
    fn failing_connection_rejects_until_restored() {
        let server = MemoryServer::new();
        let id = server.spawn("Steve", 2, Vec3::ZERO);
        let pkt = ClientboundPacket::RemoveEntities(RemoveEntities::single(9));

        server.fail_sends_to(id);
        assert!(matches!(
            server.send_packet(id, pkt.clone()),
            Err(SendError::Rejected { .. })
        ));
        server.restore_sends_to(id);
        assert!(server.send_packet(id, pkt).is_ok());
        assert_eq!(server.sent_to(id).len(), 1);
    }

    #[test]
    fn lookups_by_world_and_entity_id() {
        let server = MemoryServer::new();
        let a = server.spawn("A", 10, Vec3::ZERO);
        let b = server.spawn("B", 11, Vec3::ZERO);
        server.move_to(b, "nether", Vec3::new(1.0, 2.0, 3.0));

        assert_eq!(server.players_in_world(DEFAULT_WORLD).len(), 1);
        assert_eq!(server.player_by_entity_id(11).map(|p| p.id), Some(b));
        assert_eq!(server.player_by_entity_id(10).map(|p| p.id), Some(a));
        assert!(server.player_by_entity_id(12).is_none());
    }
}
