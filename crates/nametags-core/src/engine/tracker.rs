use super::*;

impl NametagEngine {
    // ─── Tracking ────────────────────────────────────────────────────────

    /// `observer`'s client started tracking `subject`'s player entity.
    pub(super) fn on_track_start(&self, observer: PlayerId, subject: PlayerId) {
        if !self.server().is_online(subject) {
            return;
        }
        self.inner.relation.insert(observer, subject);

        if !self.vanish_allows(observer, subject) {
            if let Some(handle) = self.get_display(subject) {
                handle.block(observer);
            }
            return;
        }
        if self.inner.died.contains(&subject) {
            // Resumes through the respawn add path.
            return;
        }

        if self.get_display(subject).is_none() {
            self.inner
                .pending
                .entry(subject)
                .or_default()
                .push(observer);
            // The display may have appeared between the lookup and the push;
            // its own drain would then have missed this entry.
            if self.get_display(subject).is_some() {
                self.drain_pending(subject);
            }
            return;
        }

        self.schedule_subscribe(observer, subject);
    }

    /// `observer`'s client forgot `subject`'s player entity.
    pub(super) fn on_track_stop(&self, observer: PlayerId, subject: PlayerId) {
        self.inner.relation.remove(observer, subject);
        if let Some(mut queue) = self.inner.pending.get_mut(&subject) {
            queue.retain(|o| *o != observer);
        }
        if let Some(handle) = self.get_display(subject) {
            handle.unsubscribe(observer);
        }
    }

    /// Consume the pending queue of `subject`. Each entry is scheduled once
    /// and then gone. Returns how many were drained.
    pub(super) fn drain_pending(&self, subject: PlayerId) -> usize {
        let Some((_, observers)) = self.inner.pending.remove(&subject) else {
            return 0;
        };
        let count = observers.len();
        for observer in observers {
            self.schedule_subscribe(observer, subject);
        }
        if count > 0 {
            debug!("Drained {count} pending observer(s) of {subject}");
        }
        count
    }

    /// Subscribe after the tracking packet has had time to settle on the
    /// client.
    fn schedule_subscribe(&self, observer: PlayerId, subject: PlayerId) {
        let engine = self.downgrade();
        self.scheduler().run_later(
            self.settings().track_settle_delay_ticks,
            Box::new(move || {
                if let Some(engine) = engine.upgrade() {
                    engine.subscribe_if_tracking(observer, subject);
                }
            }),
        );
    }

    /// Subscribe only if the relation still holds, both players are online
    /// and vanish allows it. An untrack that lands while subscribing undoes
    /// the subscription.
    pub(super) fn subscribe_if_tracking(&self, observer: PlayerId, subject: PlayerId) -> bool {
        if !self.inner.relation.contains(observer, subject) {
            return false;
        }
        if !self.server().is_online(subject) || !self.server().is_online(observer) {
            return false;
        }
        if !self.vanish_allows(observer, subject) {
            return false;
        }
        let Some(handle) = self.get_display(subject) else {
            return false;
        };
        if !handle.subscribe(observer) {
            return false;
        }
        if !self.inner.relation.contains(observer, subject) {
            handle.unsubscribe(observer);
            return false;
        }
        true
    }
}
