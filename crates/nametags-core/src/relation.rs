//! Observer relation: which subjects each observer's client is currently
//! tracking, mirrored from the game's own track/untrack notifications.

use dashmap::{DashMap, DashSet};
use nametags_api::PlayerId;
use serde::{Deserialize, Serialize};

#[derive(Default)]
pub struct ObserverRelation {
    tracked: DashMap<PlayerId, DashSet<PlayerId>>,
}

/// Serializable copy of the relation, handed to the host on shutdown and
/// back to a fresh engine on startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingSnapshot {
    pub entries: Vec<TrackedPair>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackedPair {
    pub observer: PlayerId,
    pub subject: PlayerId,
}

impl TrackingSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ObserverRelation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the pair was already present.
    pub fn insert(&self, observer: PlayerId, subject: PlayerId) -> bool {
        self.tracked.entry(observer).or_default().insert(subject)
    }

    /// Returns false if the pair was not present.
    pub fn remove(&self, observer: PlayerId, subject: PlayerId) -> bool {
        let removed = match self.tracked.get(&observer) {
            Some(subjects) => subjects.remove(&subject).is_some(),
            None => return false,
        };
        self.tracked
            .remove_if(&observer, |_, subjects| subjects.is_empty());
        removed
    }

    pub fn contains(&self, observer: PlayerId, subject: PlayerId) -> bool {
        self.tracked
            .get(&observer)
            .is_some_and(|subjects| subjects.contains(&subject))
    }

    /// Subjects `observer` currently tracks.
    pub fn tracked_by(&self, observer: PlayerId) -> Vec<PlayerId> {
        self.tracked
            .get(&observer)
            .map(|subjects| subjects.iter().map(|s| *s).collect())
            .unwrap_or_default()
    }

    /// Observers currently tracking `subject`.
    pub fn observers_of(&self, subject: PlayerId) -> Vec<PlayerId> {
        self.tracked
            .iter()
            .filter(|entry| entry.value().contains(&subject))
            .map(|entry| *entry.key())
            .collect()
    }

    /// Drop `player` from both sides of the relation.
    pub fn purge(&self, player: PlayerId) {
        self.tracked.remove(&player);
        for entry in self.tracked.iter() {
            entry.value().remove(&player);
        }
        self.tracked.retain(|_, subjects| !subjects.is_empty());
    }

    /// Keep only the pairs `keep(observer, subject)` accepts. Returns how
    /// many were dropped.
    pub fn retain(&self, mut keep: impl FnMut(PlayerId, PlayerId) -> bool) -> usize {
        let mut dropped = 0;
        for entry in self.tracked.iter() {
            let observer = *entry.key();
            entry.value().retain(|subject| {
                let kept = keep(observer, *subject);
                if !kept {
                    dropped += 1;
                }
                kept
            });
        }
        self.tracked.retain(|_, subjects| !subjects.is_empty());
        dropped
    }

    pub fn len(&self) -> usize {
        self.tracked.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> TrackingSnapshot {
        let mut entries: Vec<TrackedPair> = self
            .tracked
            .iter()
            .flat_map(|entry| {
                let observer = *entry.key();
                entry
                    .value()
                    .iter()
                    .map(|subject| TrackedPair {
                        observer,
                        subject: *subject,
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        entries.sort();
        TrackingSnapshot { entries }
    }

    /// Merge a snapshot into the relation. Returns how many pairs were new.
    pub fn restore(&self, snapshot: &TrackingSnapshot) -> usize {
        snapshot
            .entries
            .iter()
            .filter(|pair| self.insert(pair.observer, pair.subject))
            .count()
    }
}
