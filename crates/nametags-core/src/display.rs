//! Display handle: one synthetic text display per subject, riding on the
//! subject's player entity, with its own viewer and blocked sets.
//!
//! The handle never guesses who should see it. Callers decide (through the
//! observer relation) and call [`DisplayHandle::subscribe`] /
//! [`DisplayHandle::unsubscribe`]; the handle only enforces the hard rules:
//! the owner never sees its own display, blocked observers never see it, and
//! nothing is sent once the handle is destroyed.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use dashmap::DashSet;
use nametags_api::{GameServer, PlayerId, Scheduler};
use nametags_proto::packets::{
    set_entity_data::{index, style},
    AddEntity, Billboard, ClientboundPacket, EntityDataEntry, EntityDataValue, RemoveEntities,
    SetEntityData,
};
use nametags_proto::text::TextComponent;
use nametags_proto::types::{Uuid, Vector3f};
use tracing::{debug, warn};

use crate::config::NametagSettings;
use crate::passengers::PassengerRegistry;

// ─── Entity ids ──────────────────────────────────────────────────────────────

/// Lowest id the allocator will ever hand out. Server-assigned entity ids
/// count up from 1 and never get near it.
pub const SYNTHETIC_ID_FLOOR: i32 = 0x4000_0000;

/// Hands out synthetic entity ids counting down from `i32::MAX`.
pub struct EntityIdAllocator {
    next: AtomicI32,
}

impl EntityIdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicI32::new(i32::MAX),
        }
    }

    pub fn allocate(&self) -> i32 {
        self.next.fetch_sub(1, Ordering::Relaxed)
    }

    pub fn is_synthetic(id: i32) -> bool {
        id >= SYNTHETIC_ID_FLOOR
    }
}

impl Default for EntityIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Hide reasons ────────────────────────────────────────────────────────────

/// Conditions that hide a label from everyone at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HideReason {
    Invisibility,
    Death,
    Spectator,
}

impl HideReason {
    fn bit(self) -> u8 {
        match self {
            HideReason::Invisibility => 0x01,
            HideReason::Death => 0x02,
            HideReason::Spectator => 0x04,
        }
    }
}

// ─── Metadata ────────────────────────────────────────────────────────────────

/// Everything the client needs to render the label.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayMeta {
    pub text: TextComponent,
    pub billboard: Billboard,
    pub shadow: bool,
    pub see_through: bool,
    /// ARGB.
    pub background_color: i32,
    pub translation: Vector3f,
    pub view_range: f32,
    pub opacity: u8,
}

impl DisplayMeta {
    pub fn from_settings(settings: &NametagSettings) -> Self {
        Self {
            text: TextComponent::empty(),
            billboard: settings.billboard,
            shadow: settings.shadowed,
            see_through: settings.see_through,
            background_color: settings.background_color,
            translation: Vector3f::new(0.0, settings.y_offset, 0.0),
            view_range: settings.view_range,
            opacity: settings.text_opacity,
        }
    }

    fn style_flags(&self) -> u8 {
        let mut flags = 0;
        if self.shadow {
            flags |= style::SHADOW;
        }
        if self.see_through {
            flags |= style::SEE_THROUGH;
        }
        flags
    }

    pub fn to_packet(&self, entity_id: i32) -> SetEntityData {
        SetEntityData {
            entity_id,
            entries: vec![
                EntityDataEntry::new(
                    index::TRANSLATION,
                    EntityDataValue::Vector3(self.translation),
                ),
                EntityDataEntry::new(index::BILLBOARD, EntityDataValue::Byte(self.billboard.id())),
                EntityDataEntry::new(index::VIEW_RANGE, EntityDataValue::Float(self.view_range)),
                EntityDataEntry::new(index::TEXT, EntityDataValue::Component(self.text.clone())),
                EntityDataEntry::new(
                    index::BACKGROUND_COLOR,
                    EntityDataValue::VarInt(self.background_color),
                ),
                EntityDataEntry::new(index::TEXT_OPACITY, EntityDataValue::Byte(self.opacity)),
                EntityDataEntry::new(index::STYLE_FLAGS, EntityDataValue::Byte(self.style_flags())),
            ],
        }
    }
}

// ─── Handle ──────────────────────────────────────────────────────────────────

/// Shared collaborators every handle needs.
#[derive(Clone)]
pub struct DisplayContext {
    pub server: Arc<dyn GameServer>,
    pub scheduler: Arc<dyn Scheduler>,
    pub passengers: Arc<PassengerRegistry>,
    pub settings: Arc<NametagSettings>,
}

pub struct DisplayHandle {
    owner: PlayerId,
    owner_entity_id: i32,
    entity_id: i32,
    uuid: Uuid,
    meta: Mutex<DisplayMeta>,
    viewers: DashSet<PlayerId>,
    blocked: DashSet<PlayerId>,
    hidden: AtomicU8,
    removed: AtomicBool,
    /// Serializes subscribe against hide, block and destroy.
    gate: Mutex<()>,
    /// Bumped for every label composition started for this handle.
    generation: AtomicU64,
    ctx: DisplayContext,
}

impl fmt::Debug for DisplayHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayHandle")
            .field("owner", &self.owner)
            .field("entity_id", &self.entity_id)
            .field("viewers", &self.viewers.len())
            .field("blocked", &self.blocked.len())
            .field("hidden", &self.hidden.load(Ordering::Relaxed))
            .field("removed", &self.is_removed())
            .finish()
    }
}

impl DisplayHandle {
    pub fn new(
        owner: PlayerId,
        owner_entity_id: i32,
        entity_id: i32,
        ctx: DisplayContext,
    ) -> Arc<Self> {
        let uuid = Uuid::v4_from_bits(rand::random(), rand::random());
        let meta = DisplayMeta::from_settings(&ctx.settings);
        Arc::new(Self {
            owner,
            owner_entity_id,
            entity_id,
            uuid,
            meta: Mutex::new(meta),
            viewers: DashSet::new(),
            blocked: DashSet::new(),
            hidden: AtomicU8::new(0),
            removed: AtomicBool::new(false),
            gate: Mutex::new(()),
            generation: AtomicU64::new(0),
            ctx,
        })
    }

    pub fn owner(&self) -> PlayerId {
        self.owner
    }

    pub fn owner_entity_id(&self) -> i32 {
        self.owner_entity_id
    }

    pub fn entity_id(&self) -> i32 {
        self.entity_id
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    pub fn meta(&self) -> DisplayMeta {
        self.lock_meta().clone()
    }

    pub fn text(&self) -> TextComponent {
        self.lock_meta().text.clone()
    }

    pub fn viewers(&self) -> Vec<PlayerId> {
        self.viewers.iter().map(|v| *v).collect()
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.len()
    }

    fn lock_meta(&self) -> std::sync::MutexGuard<'_, DisplayMeta> {
        self.meta.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_gate(&self) -> std::sync::MutexGuard<'_, ()> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ─── Attributes ──────────────────────────────────────────────────────

    fn update_meta(&self, f: impl FnOnce(&mut DisplayMeta)) {
        f(&mut self.lock_meta());
        self.fix_viewers();
    }

    pub fn set_text(&self, text: TextComponent) {
        self.update_meta(|m| m.text = text);
    }

    /// Start a label composition; pass the returned generation to
    /// [`Self::apply_composed`] once it completes.
    pub fn begin_compose(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Set the composed text unless a newer composition has started since.
    pub fn apply_composed(&self, generation: u64, text: TextComponent) -> bool {
        let mut meta = self.lock_meta();
        if self.generation.load(Ordering::Acquire) != generation {
            debug!(
                "display {} dropped stale label (generation {generation})",
                self.entity_id
            );
            return false;
        }
        meta.text = text;
        drop(meta);
        self.fix_viewers();
        true
    }

    pub fn set_billboard(&self, billboard: Billboard) {
        self.update_meta(|m| m.billboard = billboard);
    }

    pub fn set_shadow(&self, shadow: bool) {
        self.update_meta(|m| m.shadow = shadow);
    }

    pub fn set_see_through(&self, see_through: bool) {
        self.update_meta(|m| m.see_through = see_through);
    }

    pub fn set_background_color(&self, argb: i32) {
        self.update_meta(|m| m.background_color = argb);
    }

    pub fn set_transform(&self, translation: Vector3f) {
        self.update_meta(|m| m.translation = translation);
    }

    pub fn set_view_range(&self, range: f32) {
        self.update_meta(|m| m.view_range = range);
    }

    pub fn set_opacity(&self, opacity: u8) {
        self.update_meta(|m| m.opacity = opacity);
    }

    /// Drop viewers whose connection is gone. Returns how many were dropped.
    pub fn fix_viewers(&self) -> usize {
        let before = self.viewers.len();
        let server = &self.ctx.server;
        self.viewers.retain(|viewer| server.is_online(*viewer));
        let dropped = before.saturating_sub(self.viewers.len());
        if dropped > 0 {
            debug!("display {} dropped {dropped} stale viewer(s)", self.entity_id);
        }
        dropped
    }

    // ─── Blocking ────────────────────────────────────────────────────────

    pub fn is_hidden(&self) -> bool {
        self.hidden.load(Ordering::Acquire) != 0
    }

    pub fn is_hidden_for(&self, reason: HideReason) -> bool {
        self.hidden.load(Ordering::Acquire) & reason.bit() != 0
    }

    /// Hidden handles treat every observer as blocked.
    pub fn is_blocked(&self, observer: PlayerId) -> bool {
        self.is_hidden() || self.blocked.contains(&observer)
    }

    /// Hide from everyone and detach current viewers.
    pub fn hide(&self, reason: HideReason) {
        let _gate = self.lock_gate();
        self.hidden.fetch_or(reason.bit(), Ordering::AcqRel);
        for viewer in self.viewers() {
            self.remove_viewer_best_effort(viewer);
        }
    }

    /// Clear one hide reason. Nobody is re-subscribed here; returns whether
    /// the handle is now visible again.
    pub fn unhide(&self, reason: HideReason) -> bool {
        let prev = self.hidden.fetch_and(!reason.bit(), Ordering::AcqRel);
        prev & !reason.bit() == 0
    }

    /// Deny `observer` and detach it if it is currently viewing.
    pub fn block(&self, observer: PlayerId) {
        let _gate = self.lock_gate();
        if self.viewers.contains(&observer) {
            self.remove_viewer_best_effort(observer);
        }
        self.blocked.insert(observer);
    }

    pub fn unblock(&self, observer: PlayerId) -> bool {
        self.blocked.remove(&observer).is_some()
    }

    /// Clear the per-observer blocked set, returning who was in it.
    pub fn unblock_all(&self) -> Vec<PlayerId> {
        let released: Vec<PlayerId> = self.blocked.iter().map(|b| *b).collect();
        for observer in &released {
            self.blocked.remove(observer);
        }
        released
    }

    // ─── Viewers ─────────────────────────────────────────────────────────

    pub fn is_visible_to(&self, observer: PlayerId) -> bool {
        self.viewers.contains(&observer)
    }

    fn may_subscribe(&self, observer: PlayerId) -> bool {
        observer != self.owner && !self.is_removed() && !self.is_blocked(observer)
    }

    /// Spawn the display for `observer` and attach it to the owner.
    ///
    /// The attach is sent again after `attach_resend_delay_ticks`, because the
    /// first one can reach the client before it has loaded the owner entity.
    /// Returns false if nothing was done.
    pub fn subscribe(self: &Arc<Self>, observer: PlayerId) -> bool {
        if !self.show_to(observer) {
            return false;
        }
        self.schedule_attach_resend(observer);
        true
    }

    /// Admission check, viewer insert and the spawn packets, all under the
    /// gate so a concurrent hide or destroy either sees the viewer or
    /// keeps it out.
    fn show_to(&self, observer: PlayerId) -> bool {
        let _gate = self.lock_gate();
        if !self.may_subscribe(observer) {
            return false;
        }
        if !self.viewers.insert(observer) {
            return false;
        }
        let Some(owner) = self.ctx.server.player(self.owner) else {
            self.viewers.remove(&observer);
            return false;
        };

        let position = owner
            .position
            .offset_y(self.ctx.settings.owner_anchor_height);
        let spawn = AddEntity::text_display(self.entity_id, self.uuid, position);
        let data = self.lock_meta().to_packet(self.entity_id);
        let attach = self
            .ctx
            .passengers
            .attach_packet(self.owner_entity_id, self.entity_id);

        for pkt in [
            ClientboundPacket::AddEntity(spawn),
            ClientboundPacket::SetEntityData(data),
            ClientboundPacket::SetPassengers(attach),
        ] {
            if let Err(e) = self.ctx.server.send_packet(observer, pkt) {
                warn!("failed to show label of {} to {observer}: {e}", self.owner);
                break;
            }
        }
        true
    }

    fn schedule_attach_resend(self: &Arc<Self>, observer: PlayerId) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let delay = self.ctx.settings.attach_resend_delay_ticks;
        self.ctx.scheduler.run_later(
            delay,
            Box::new(move || {
                let Some(handle) = weak.upgrade() else {
                    return;
                };
                if handle.is_removed() || !handle.is_visible_to(observer) {
                    return;
                }
                handle.send_attach(observer);
            }),
        );
    }

    /// Send the merged passenger list for the owner to `observer`.
    pub fn send_attach(&self, observer: PlayerId) {
        let attach = self
            .ctx
            .passengers
            .attach_packet(self.owner_entity_id, self.entity_id);
        if let Err(e) = self
            .ctx
            .server
            .send_packet(observer, ClientboundPacket::SetPassengers(attach))
        {
            debug!("attach resend for {} to {observer} failed: {e}", self.owner);
        }
    }

    /// Detach and despawn the display for `observer`. Blocked observers are
    /// already excluded, so this is a no-op for them.
    pub fn unsubscribe(&self, observer: PlayerId) -> bool {
        if self.blocked.contains(&observer) {
            return false;
        }
        if self.viewers.remove(&observer).is_none() {
            return false;
        }
        if let Err(e) = self.send_detach(observer) {
            warn!("failed to hide label of {} from {observer}: {e}", self.owner);
        }
        true
    }

    fn send_detach(&self, observer: PlayerId) -> Result<(), nametags_api::SendError> {
        let server = &self.ctx.server;
        server.send_packet(
            observer,
            ClientboundPacket::RemoveEntities(RemoveEntities::single(self.entity_id)),
        )?;
        let detach = self.ctx.passengers.detach_packet(self.owner_entity_id);
        server.send_packet(observer, ClientboundPacket::SetPassengers(detach))
    }

    /// Add `observer` without sending anything.
    pub fn subscribe_silently(&self, observer: PlayerId) -> bool {
        let _gate = self.lock_gate();
        self.may_subscribe(observer) && self.viewers.insert(observer)
    }

    /// Remove `observer` without sending anything.
    pub fn unsubscribe_silently(&self, observer: PlayerId) -> bool {
        self.viewers.remove(&observer).is_some()
    }

    /// Remove `observer` and despawn the display on its client; a failed
    /// send is logged and otherwise ignored.
    pub fn remove_viewer_best_effort(&self, observer: PlayerId) {
        if self.viewers.remove(&observer).is_none() {
            return;
        }
        if let Err(e) = self.send_detach(observer) {
            debug!("best-effort detach of {} from {observer} failed: {e}", self.owner);
        }
    }

    /// A departing player: forget it everywhere, send nothing.
    pub fn handle_quit(&self, observer: PlayerId) {
        self.viewers.remove(&observer);
        self.blocked.remove(&observer);
    }

    /// Push the current metadata to every online viewer. Returns the number
    /// of viewers it was delivered to.
    pub fn refresh(&self) -> usize {
        if self.is_removed() {
            return 0;
        }
        self.fix_viewers();
        let pkt = ClientboundPacket::SetEntityData(self.lock_meta().to_packet(self.entity_id));
        let mut delivered = 0;
        for viewer in self.viewers() {
            match self.ctx.server.send_packet(viewer, pkt.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("failed to refresh label of {} for {viewer}: {e}", self.owner),
            }
        }
        delivered
    }

    /// Remove the display from every client and clear all observer state.
    /// Only the first call does anything.
    pub fn destroy(&self) -> bool {
        let _gate = self.lock_gate();
        if self.removed.swap(true, Ordering::AcqRel) {
            return false;
        }
        for viewer in self.viewers() {
            self.remove_viewer_best_effort(viewer);
        }
        self.viewers.clear();
        self.blocked.clear();
        self.ctx.passengers.forget(self.owner_entity_id);
        debug!("display {} of {} destroyed", self.entity_id, self.owner);
        true
    }

    /// Online players in the owner's world within `nearby_radius`, owner
    /// excluded. A candidate set for bulk resync, not who is tracking.
    pub fn find_nearby_observers(&self) -> Vec<PlayerId> {
        let Some(owner) = self.ctx.server.player(self.owner) else {
            return Vec::new();
        };
        let radius = self.ctx.settings.nearby_radius;
        self.ctx
            .server
            .players_in_world(&owner.world)
            .into_iter()
            .filter(|p| p.online && p.id != self.owner)
            .filter(|p| p.position.distance(&owner.position) <= radius)
            .map(|p| p.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryServer;
    use crate::scheduler::TickScheduler;
    use nametags_proto::types::Vec3;

    struct Fixture {
        server: Arc<MemoryServer>,
        scheduler: Arc<TickScheduler>,
        handle: Arc<DisplayHandle>,
        owner: PlayerId,
        viewer: PlayerId,
    }

    fn fixture() -> Fixture {
        let server = Arc::new(MemoryServer::new());
        let scheduler = Arc::new(TickScheduler::new());
        let owner = server.spawn("Owner", 1, Vec3::new(0.0, 64.0, 0.0));
        let viewer = server.spawn("Viewer", 2, Vec3::new(5.0, 64.0, 0.0));
        let ctx = DisplayContext {
            server: server.clone(),
            scheduler: scheduler.clone(),
            passengers: Arc::new(PassengerRegistry::new()),
            settings: Arc::new(NametagSettings::default()),
        };
        let handle = DisplayHandle::new(owner, 1, EntityIdAllocator::new().allocate(), ctx);
        Fixture {
            server,
            scheduler,
            handle,
            owner,
            viewer,
        }
    }

    #[test]
    fn allocator_counts_down_from_max() {
        let alloc = EntityIdAllocator::new();
        assert_eq!(alloc.allocate(), i32::MAX);
        assert_eq!(alloc.allocate(), i32::MAX - 1);
        assert!(EntityIdAllocator::is_synthetic(i32::MAX - 1));
        assert!(!EntityIdAllocator::is_synthetic(42));
    }

    #[test]
    fn subscribe_spawns_and_attaches() {
        let f = fixture();
        assert!(f.handle.subscribe(f.viewer));
        let sent = f.server.sent_to(f.viewer);
        assert_eq!(sent.len(), 3);
        match &sent[0] {
            ClientboundPacket::AddEntity(p) => {
                assert_eq!(p.entity_id, f.handle.entity_id());
                assert!((p.position.y - 65.8).abs() < 1e-9);
            }
            other => panic!("expected spawn, got {other:?}"),
        }
        assert!(matches!(sent[1], ClientboundPacket::SetEntityData(_)));
        match &sent[2] {
            ClientboundPacket::SetPassengers(p) => {
                assert_eq!(p.vehicle_id, 1);
                assert_eq!(p.passenger_ids, vec![f.handle.entity_id()]);
            }
            other => panic!("expected passengers, got {other:?}"),
        }
    }

    #[test]
    fn attach_is_repeated_after_delay() {
        let f = fixture();
        f.handle.subscribe(f.viewer);
        f.server.take_outbox();
        for _ in 0..3 {
            f.scheduler.tick();
        }
        assert!(f.server.sent_to(f.viewer).is_empty());
        f.scheduler.tick();
        let sent = f.server.take_outbox();
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0].1, ClientboundPacket::SetPassengers(_)));
    }

    #[test]
    fn attach_repeat_skipped_after_unsubscribe() {
        let f = fixture();
        f.handle.subscribe(f.viewer);
        f.handle.unsubscribe(f.viewer);
        f.server.take_outbox();
        f.scheduler.run_until_idle(10);
        assert_eq!(f.server.outbox_len(), 0);
    }

    #[test]
    fn subscribe_twice_sends_once() {
        let f = fixture();
        assert!(f.handle.subscribe(f.viewer));
        assert!(!f.handle.subscribe(f.viewer));
        assert_eq!(f.handle.viewer_count(), 1);
        assert_eq!(f.server.sent_to(f.viewer).len(), 3);
    }

    #[test]
    fn owner_never_views_itself() {
        let f = fixture();
        assert!(!f.handle.subscribe(f.owner));
        assert!(!f.handle.subscribe_silently(f.owner));
        assert!(!f.handle.is_visible_to(f.owner));
        assert_eq!(f.server.outbox_len(), 0);
    }

    #[test]
    fn blocked_observer_is_never_subscribed() {
        let f = fixture();
        f.handle.block(f.viewer);
        assert!(!f.handle.subscribe(f.viewer));
        assert!(!f.handle.unsubscribe(f.viewer));
        assert!(f.handle.unblock(f.viewer));
        assert!(f.handle.subscribe(f.viewer));
    }

    #[test]
    fn block_detaches_current_viewer() {
        let f = fixture();
        f.handle.subscribe(f.viewer);
        f.server.take_outbox();
        f.handle.block(f.viewer);
        assert!(!f.handle.is_visible_to(f.viewer));
        let sent = f.server.take_outbox();
        assert!(matches!(sent[0].1, ClientboundPacket::RemoveEntities(_)));
    }

    #[test]
    fn hide_clears_viewers_until_every_reason_is_gone() {
        let f = fixture();
        f.handle.subscribe(f.viewer);
        f.handle.hide(HideReason::Death);
        f.handle.hide(HideReason::Invisibility);
        assert_eq!(f.handle.viewer_count(), 0);
        assert!(!f.handle.subscribe(f.viewer));

        assert!(!f.handle.unhide(HideReason::Death));
        assert!(f.handle.is_hidden_for(HideReason::Invisibility));
        assert!(f.handle.unhide(HideReason::Invisibility));
        assert!(f.handle.subscribe(f.viewer));
    }

    #[test]
    fn unsubscribe_despawns_and_detaches() {
        let f = fixture();
        f.handle.subscribe(f.viewer);
        f.server.take_outbox();
        assert!(f.handle.unsubscribe(f.viewer));
        let sent = f.server.take_outbox();
        assert_eq!(sent.len(), 2);
        assert!(matches!(
            &sent[0].1,
            ClientboundPacket::RemoveEntities(p) if p.entity_ids == vec![f.handle.entity_id()]
        ));
        assert!(matches!(
            &sent[1].1,
            ClientboundPacket::SetPassengers(p) if p.passenger_ids.is_empty()
        ));
        assert!(!f.handle.unsubscribe(f.viewer));
    }

    #[test]
    fn silent_variants_send_nothing() {
        let f = fixture();
        assert!(f.handle.subscribe_silently(f.viewer));
        assert!(f.handle.is_visible_to(f.viewer));
        assert!(f.handle.unsubscribe_silently(f.viewer));
        assert_eq!(f.server.outbox_len(), 0);
    }

    #[test]
    fn refresh_skips_offline_and_survives_failures() {
        let f = fixture();
        let third = f.server.spawn("Third", 3, Vec3::ZERO);
        let gone = f.server.spawn("Gone", 4, Vec3::ZERO);
        for p in [f.viewer, third, gone] {
            f.handle.subscribe_silently(p);
        }
        f.server.set_online(gone, false);
        f.server.fail_sends_to(f.viewer);

        f.handle.set_text(TextComponent::plain("Owner"));
        assert!(!f.handle.is_visible_to(gone));
        assert_eq!(f.handle.refresh(), 1);

        let sent = f.server.sent_to(third);
        match &sent[..] {
            [ClientboundPacket::SetEntityData(p)] => {
                assert_eq!(p.text().map(|t| t.plain_text()), Some("Owner".into()));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn destroy_runs_once() {
        let f = fixture();
        f.handle.subscribe(f.viewer);
        f.server.take_outbox();
        assert!(f.handle.destroy());
        assert!(!f.handle.destroy());
        assert_eq!(f.handle.viewer_count(), 0);
        assert_eq!(f.server.take_outbox().len(), 2);
        assert!(!f.handle.subscribe(f.viewer));
        assert_eq!(f.handle.refresh(), 0);
    }

    #[test]
    fn nearby_excludes_owner_and_far_players() {
        let f = fixture();
        let far = f.server.spawn("Far", 5, Vec3::new(500.0, 64.0, 0.0));
        let other_world = f.server.spawn("Nether", 6, Vec3::ZERO);
        f.server.move_to(other_world, "nether", Vec3::ZERO);

        let nearby = f.handle.find_nearby_observers();
        assert_eq!(nearby, vec![f.viewer]);
        assert!(!nearby.contains(&far));
    }

    #[test]
    fn metadata_reflects_settings_and_setters() {
        let f = fixture();
        f.handle.set_shadow(true);
        f.handle.set_see_through(true);
        f.handle.set_opacity(0x80);
        let pkt = f.handle.meta().to_packet(f.handle.entity_id());
        assert_eq!(
            pkt.get(index::STYLE_FLAGS),
            Some(&EntityDataValue::Byte(style::SHADOW | style::SEE_THROUGH))
        );
        assert_eq!(pkt.get(index::TEXT_OPACITY), Some(&EntityDataValue::Byte(0x80)));
        assert_eq!(
            pkt.get(index::BACKGROUND_COLOR),
            Some(&EntityDataValue::VarInt(0x4000_0000))
        );
    }

    /// Spawns minus despawns the viewer's client has received.
    fn net_spawns(f: &Fixture) -> i64 {
        f.server
            .sent_to(f.viewer)
            .iter()
            .map(|p| match p {
                ClientboundPacket::AddEntity(_) => 1,
                ClientboundPacket::RemoveEntities(_) => -1,
                _ => 0,
            })
            .sum()
    }

    fn race(rounds: usize, other: impl Fn(&DisplayHandle) + Sync) {
        for _ in 0..rounds {
            let f = fixture();
            let barrier = std::sync::Barrier::new(2);
            std::thread::scope(|scope| {
                scope.spawn(|| {
                    barrier.wait();
                    f.handle.subscribe(f.viewer);
                });
                scope.spawn(|| {
                    barrier.wait();
                    other(&f.handle);
                });
            });
            assert!(!f.handle.is_visible_to(f.viewer));
            assert_eq!(net_spawns(&f), 0);
        }
    }

    #[test]
    fn concurrent_subscribe_and_hide_never_leaves_a_viewer() {
        race(2_000, |handle| handle.hide(HideReason::Invisibility));
    }

    #[test]
    fn concurrent_subscribe_and_destroy_never_leaves_a_ghost() {
        race(2_000, |handle| {
            handle.destroy();
        });
    }

    #[test]
    fn stale_composition_is_dropped() {
        let f = fixture();
        f.handle.subscribe_silently(f.viewer);
        let older = f.handle.begin_compose();
        let newer = f.handle.begin_compose();

        assert!(f.handle.apply_composed(newer, TextComponent::plain("new")));
        assert!(!f.handle.apply_composed(older, TextComponent::plain("old")));
        assert_eq!(f.handle.text().plain_text(), "new");
        assert_eq!(f.server.outbox_len(), 0);
    }
}
