//! The nametag engine: owns every display handle and the observer relation,
//! and reacts to lifecycle events, tracking events and outbound packets.

mod lifecycle;
mod mediator;
mod tracker;

pub use mediator::PacketVerdict;

use std::sync::{Arc, Mutex, PoisonError, Weak};

use dashmap::{DashMap, DashSet};
use tracing::{debug, info, warn};

use nametags_api::{
    GameServer, NoVanish, PlayerId, PlayerView, Scheduler, TaskId, TextFormatter, VanishHook,
};

use crate::composer::{LabelComposer, PlainFormatter};
use crate::config::{NametagSettings, SpectatorPolicy};
use crate::display::{DisplayContext, DisplayHandle, EntityIdAllocator, HideReason};
use crate::error::NametagError;
use crate::passengers::PassengerRegistry;
use crate::relation::{ObserverRelation, TrackingSnapshot};

struct Inner {
    ctx: DisplayContext,
    composer: LabelComposer,
    vanish: Arc<dyn VanishHook>,
    displays: DashMap<PlayerId, Arc<DisplayHandle>>,
    relation: ObserverRelation,
    /// subject → observers whose track event arrived before the display.
    pending: DashMap<PlayerId, Vec<PlayerId>>,
    died: DashSet<PlayerId>,
    /// Players under an invisibility effect, whether or not they have a
    /// display yet.
    invisible: DashSet<PlayerId>,
    /// Server entity id → player, for packets that only carry entity ids.
    entity_index: DashMap<i32, PlayerId>,
    ids: EntityIdAllocator,
    tasks: Mutex<Vec<TaskId>>,
}

/// Cheap to clone; every clone drives the same engine.
#[derive(Clone)]
pub struct NametagEngine {
    inner: Arc<Inner>,
}

/// Handle captured by scheduled closures so they never keep a shut-down
/// engine alive.
#[derive(Clone)]
struct WeakEngine(Weak<Inner>);

impl WeakEngine {
    fn upgrade(&self) -> Option<NametagEngine> {
        self.0.upgrade().map(|inner| NametagEngine { inner })
    }
}

pub struct NametagEngineBuilder {
    settings: NametagSettings,
    server: Arc<dyn GameServer>,
    scheduler: Arc<dyn Scheduler>,
    formatter: Arc<dyn TextFormatter>,
    vanish: Arc<dyn VanishHook>,
}

impl NametagEngineBuilder {
    pub fn formatter(mut self, formatter: Arc<dyn TextFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn vanish(mut self, vanish: Arc<dyn VanishHook>) -> Self {
        self.vanish = vanish;
        self
    }

    pub fn build(self) -> Result<NametagEngine, NametagError> {
        let mut settings = self.settings;
        settings.normalize();
        let composer = LabelComposer::new(self.formatter, &settings)?;
        let ctx = DisplayContext {
            server: self.server,
            scheduler: self.scheduler,
            passengers: Arc::new(PassengerRegistry::new()),
            settings: Arc::new(settings),
        };
        Ok(NametagEngine {
            inner: Arc::new(Inner {
                ctx,
                composer,
                vanish: self.vanish,
                displays: DashMap::new(),
                relation: ObserverRelation::new(),
                pending: DashMap::new(),
                died: DashSet::new(),
                invisible: DashSet::new(),
                entity_index: DashMap::new(),
                ids: EntityIdAllocator::new(),
                tasks: Mutex::new(Vec::new()),
            }),
        })
    }
}

impl NametagEngine {
    /// Defaults to [`PlainFormatter`] and no vanish integration.
    pub fn builder(
        settings: NametagSettings,
        server: Arc<dyn GameServer>,
        scheduler: Arc<dyn Scheduler>,
    ) -> NametagEngineBuilder {
        NametagEngineBuilder {
            settings,
            server,
            scheduler,
            formatter: Arc::new(PlainFormatter),
            vanish: Arc::new(NoVanish),
        }
    }

    fn downgrade(&self) -> WeakEngine {
        WeakEngine(Arc::downgrade(&self.inner))
    }

    pub fn settings(&self) -> &NametagSettings {
        &self.inner.ctx.settings
    }

    fn server(&self) -> &dyn GameServer {
        self.inner.ctx.server.as_ref()
    }

    fn scheduler(&self) -> &dyn Scheduler {
        self.inner.ctx.scheduler.as_ref()
    }

    // ─── Startup / shutdown ──────────────────────────────────────────────

    /// Index online players, restore a previous tracking snapshot if any,
    /// give every online player a display and register periodic tasks.
    pub fn start(&self, prior: Option<TrackingSnapshot>) {
        let online = self.server().online_players();
        for player in &online {
            self.inner.entity_index.insert(player.entity_id, player.id);
        }

        if let Some(snapshot) = prior {
            let restored = self.inner.relation.restore(&snapshot);
            info!("Restored {restored} tracking pair(s) from previous session");
            let server = self.server();
            let stale = self.inner.relation.retain(|observer, subject| {
                server.is_online(observer) && server.is_online(subject)
            });
            if stale > 0 {
                debug!("Dropped {stale} restored pair(s) with an offline player");
            }
        }

        for player in &online {
            self.add_subject(player.id);
        }

        let mut tasks = Vec::new();
        let interval = self.settings().refresh_interval_ticks;
        if interval > 0 {
            let engine = self.downgrade();
            tasks.push(self.scheduler().run_repeating(
                interval,
                interval,
                Arc::new(move || {
                    if let Some(engine) = engine.upgrade() {
                        engine.refresh_all();
                    }
                }),
            ));
        }
        if self.settings().respawn_watchdog {
            let engine = self.downgrade();
            tasks.push(self.scheduler().run_repeating(
                1,
                1,
                Arc::new(move || {
                    if let Some(engine) = engine.upgrade() {
                        engine.check_respawns();
                    }
                }),
            ));
        }
        self.lock_tasks().extend(tasks);

        info!("Nametag engine started with {} player(s)", online.len());
    }

    /// Cancel periodic tasks, remove every display from every client and
    /// hand back the observer relation for the next engine instance.
    pub fn shutdown(&self) -> TrackingSnapshot {
        for id in self.lock_tasks().drain(..) {
            self.scheduler().cancel(id);
        }
        let snapshot = self.inner.relation.snapshot();

        let owners: Vec<PlayerId> = self.inner.displays.iter().map(|e| *e.key()).collect();
        for owner in owners {
            if let Some((_, handle)) = self.inner.displays.remove(&owner) {
                handle.destroy();
            }
        }
        self.inner.pending.clear();
        self.inner.died.clear();
        self.inner.invisible.clear();

        info!(
            "Nametag engine stopped, handing off {} tracking pair(s)",
            snapshot.len()
        );
        snapshot
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<TaskId>> {
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ─── Subjects ────────────────────────────────────────────────────────

    pub fn get_display(&self, player: PlayerId) -> Option<Arc<DisplayHandle>> {
        self.inner
            .displays
            .get(&player)
            .map(|h| Arc::clone(h.value()))
    }

    pub fn display_count(&self) -> usize {
        self.inner.displays.len()
    }

    /// The add path: make sure `player` has a display with a fresh label,
    /// drain observers queued before it existed, and show it to everyone
    /// currently tracking the player.
    pub fn add_subject(&self, player: PlayerId) {
        let Some(view) = self.server().player(player).filter(|p| p.online) else {
            debug!("add_subject: {player} is not online");
            return;
        };
        self.inner.entity_index.insert(view.entity_id, player);
        self.ensure_display(&view);
        self.refresh_subject(player);
        self.drain_pending(player);
        self.show_to_trackers(player);
    }

    fn ensure_display(&self, view: &PlayerView) -> Arc<DisplayHandle> {
        let mut created = false;
        let handle = self
            .inner
            .displays
            .entry(view.id)
            .or_insert_with(|| {
                created = true;
                DisplayHandle::new(
                    view.id,
                    view.entity_id,
                    self.inner.ids.allocate(),
                    self.inner.ctx.clone(),
                )
            })
            .value()
            .clone();

        if created {
            debug!(
                "Created display {} for {} ({})",
                handle.entity_id(),
                view.name,
                view.id
            );
            if view.dead {
                self.inner.died.insert(view.id);
                handle.hide(HideReason::Death);
            }
            if view.game_mode == nametags_api::GameMode::Spectator
                && self.settings().spectator_policy == SpectatorPolicy::Hide
            {
                handle.hide(HideReason::Spectator);
            }
            if self.inner.invisible.contains(&view.id) {
                handle.hide(HideReason::Invisibility);
            }
        }
        handle
    }

    /// Tear down `player`'s display and forget it on both sides of the
    /// relation. `immediate = false` defers the teardown by one tick and
    /// skips it if the player is back online by then.
    pub fn remove_subject(&self, player: PlayerId, immediate: bool) {
        if immediate {
            self.purge_subject(player);
            return;
        }
        let engine = self.downgrade();
        self.scheduler().run_later(
            1,
            Box::new(move || {
                let Some(engine) = engine.upgrade() else {
                    return;
                };
                if engine.server().is_online(player) {
                    debug!("deferred removal of {player} skipped, player is online");
                    return;
                }
                engine.purge_subject(player);
            }),
        );
    }

    fn purge_subject(&self, player: PlayerId) {
        if let Some((_, handle)) = self.inner.displays.remove(&player) {
            handle.destroy();
            self.inner
                .entity_index
                .remove_if(&handle.owner_entity_id(), |_, owner| *owner == player);
        }
        self.inner.relation.purge(player);
        self.inner.pending.remove(&player);
        for mut queue in self.inner.pending.iter_mut() {
            queue.value_mut().retain(|o| *o != player);
        }
        self.inner.died.remove(&player);
        self.inner.invisible.remove(&player);
        for entry in self.inner.displays.iter() {
            entry.value().handle_quit(player);
        }
        debug!("Removed subject {player}");
    }

    /// Recompose `player`'s label and push it to current viewers. A failed
    /// composition keeps whatever text the display already had.
    pub fn refresh_subject(&self, player: PlayerId) {
        let Some(view) = self.server().player(player) else {
            return;
        };
        let Some(handle) = self.get_display(player) else {
            return;
        };
        let generation = handle.begin_compose();
        let handle = Arc::downgrade(&handle);
        self.inner.composer.compose_async(view, move |result| {
            let Some(handle) = handle.upgrade() else {
                return;
            };
            match result {
                Ok(text) => {
                    if !handle.apply_composed(generation, text) {
                        return;
                    }
                }
                Err(e) => warn!("Failed to compose label for {player}: {e}"),
            }
            handle.refresh();
        });
    }

    pub fn refresh_all(&self) {
        let owners: Vec<PlayerId> = self.inner.displays.iter().map(|e| *e.key()).collect();
        for owner in owners {
            self.refresh_subject(owner);
        }
    }

    /// Subscribe every online observer the relation says is tracking
    /// `subject`. Blocked and hidden handles refuse on their own.
    fn show_to_trackers(&self, subject: PlayerId) {
        let Some(handle) = self.get_display(subject) else {
            return;
        };
        for observer in self.inner.relation.observers_of(subject) {
            if !self.server().is_online(observer) || !self.vanish_allows(observer, subject) {
                continue;
            }
            handle.subscribe(observer);
        }
    }

    fn vanish_allows(&self, observer: PlayerId, subject: PlayerId) -> bool {
        !self.inner.vanish.is_vanished(subject) || self.inner.vanish.can_see(observer, subject)
    }

    /// Observers currently tracking `subject`, per the relation.
    pub fn observers_of(&self, subject: PlayerId) -> Vec<PlayerId> {
        self.inner.relation.observers_of(subject)
    }

    pub fn is_tracking(&self, observer: PlayerId, subject: PlayerId) -> bool {
        self.inner.relation.contains(observer, subject)
    }

    pub fn pending_count(&self, subject: PlayerId) -> usize {
        self.inner
            .pending
            .get(&subject)
            .map(|q| q.len())
            .unwrap_or(0)
    }
}
