use super::*;

use nametags_api::{EffectAction, GameMode, NametagEvent, PotionEffectKind};

impl NametagEngine {
    /// Entry point for every host notification.
    pub fn handle_event(&self, event: NametagEvent) {
        debug!("event {} for {}", event.name(), event.subject());
        match event {
            NametagEvent::PlayerJoin { player } => self.on_join(player),
            NametagEvent::PlayerQuit { player } => self.on_quit(player),
            NametagEvent::PlayerDeath { player } => self.on_death(player),
            NametagEvent::PlayerRespawn { player } => self.on_respawn(player),
            NametagEvent::GameModeChange { player, old, new } => {
                self.on_game_mode_change(player, old, new)
            }
            NametagEvent::PotionEffect {
                player,
                action,
                effect,
            } => self.on_potion_effect(player, action, effect),
            NametagEvent::VanishChange { player, vanished } => {
                self.on_vanish_change(player, vanished)
            }
            NametagEvent::TrackStart { observer, subject } => {
                self.on_track_start(observer, subject)
            }
            NametagEvent::TrackStop { observer, subject } => self.on_track_stop(observer, subject),
        }
    }

    // ─── Join / quit ─────────────────────────────────────────────────────

    fn on_join(&self, player: PlayerId) {
        if let Some(view) = self.server().player(player) {
            self.inner.entity_index.insert(view.entity_id, player);
        }
        // Let the player entity finish spawning on clients first.
        let engine = self.downgrade();
        self.scheduler().run_later(
            self.settings().join_delay_ticks,
            Box::new(move || {
                if let Some(engine) = engine.upgrade() {
                    engine.add_subject(player);
                }
            }),
        );
    }

    fn on_quit(&self, player: PlayerId) {
        self.remove_subject(player, true);
        self.inner.entity_index.retain(|_, owner| *owner != player);
    }

    // ─── Death ───────────────────────────────────────────────────────────

    fn on_death(&self, player: PlayerId) {
        self.inner.died.insert(player);
        if let Some(handle) = self.get_display(player) {
            handle.hide(HideReason::Death);
        }
    }

    fn on_respawn(&self, player: PlayerId) {
        self.inner.died.remove(&player);
        let engine = self.downgrade();
        self.scheduler().run_later(
            self.settings().respawn_delay_ticks,
            Box::new(move || {
                if let Some(engine) = engine.upgrade() {
                    engine.revive(player);
                }
            }),
        );
    }

    /// Clear the death hide and re-run the add path, unless the player
    /// died again or left in the meantime.
    fn revive(&self, player: PlayerId) {
        if self.inner.died.contains(&player) {
            return;
        }
        let Some(view) = self.server().player(player).filter(|p| p.online) else {
            return;
        };
        if view.dead {
            return;
        }
        if let Some(handle) = self.get_display(player) {
            handle.unhide(HideReason::Death);
        }
        self.add_subject(player);
    }

    /// Re-add players who stand again but whose respawn was never reported.
    pub(super) fn check_respawns(&self) {
        let died: Vec<PlayerId> = self.inner.died.iter().map(|p| *p).collect();
        for player in died {
            match self.server().player(player) {
                Some(view) if view.online && view.dead => {}
                Some(view) if view.online => {
                    debug!("{} is alive again without a respawn event", view.name);
                    self.inner.died.remove(&player);
                    self.revive(player);
                }
                _ => {
                    self.inner.died.remove(&player);
                }
            }
        }
    }

    // ─── Potion effects ──────────────────────────────────────────────────

    fn on_potion_effect(&self, player: PlayerId, action: EffectAction, effect: PotionEffectKind) {
        if effect != PotionEffectKind::Invisibility {
            return;
        }
        match action {
            EffectAction::Added => {
                self.inner.invisible.insert(player);
            }
            EffectAction::Removed | EffectAction::Cleared => {
                self.inner.invisible.remove(&player);
            }
        }
        let Some(handle) = self.get_display(player) else {
            return;
        };
        match action {
            EffectAction::Added => handle.hide(HideReason::Invisibility),
            EffectAction::Removed | EffectAction::Cleared => {
                if handle.unhide(HideReason::Invisibility) {
                    self.show_to_trackers(player);
                }
            }
        }
    }

    // ─── Game mode ───────────────────────────────────────────────────────

    fn on_game_mode_change(&self, player: PlayerId, old: GameMode, new: GameMode) {
        if old == new {
            return;
        }
        let entering = new == GameMode::Spectator;
        let leaving = old == GameMode::Spectator;

        match self.settings().spectator_policy {
            SpectatorPolicy::Hide => {
                let Some(handle) = self.get_display(player) else {
                    return;
                };
                if entering {
                    handle.hide(HideReason::Spectator);
                } else if leaving && handle.unhide(HideReason::Spectator) {
                    self.add_subject(player);
                }
            }
            SpectatorPolicy::Show => {
                if entering {
                    self.add_subject(player);
                }
            }
        }
    }

    // ─── Vanish ──────────────────────────────────────────────────────────

    fn on_vanish_change(&self, player: PlayerId, vanished: bool) {
        let Some(handle) = self.get_display(player) else {
            return;
        };
        if vanished {
            let mut candidates = handle.viewers();
            candidates.extend(self.inner.relation.observers_of(player));
            for observer in candidates {
                if !self.inner.vanish.can_see(observer, player) {
                    handle.block(observer);
                }
            }
        } else {
            let released = handle.unblock_all();
            debug!("{player} unvanished, {} observer(s) released", released.len());
            self.add_subject(player);
        }
    }
}
