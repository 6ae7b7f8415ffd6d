//! Scripted session: a few players join, walk into each other's tracking
//! range, drink invisibility, die, respawn and leave, with a reload of the
//! engine in the middle.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use nametags_api::{
    EffectAction, GameMode, GameServer, NametagEvent, PlayerId, PotionEffectKind,
};
use nametags_core::memory::MemoryServer;
use nametags_core::scheduler::TickScheduler;
use nametags_core::{NametagEngine, NametagError, NametagSettings, TrackingSnapshot};
use nametags_proto::packets::{
    ClientboundPacket, NameTagVisibility, OutboundPacket, SetPassengers, SetPlayerTeam,
    TeamAction, TeamInfo,
};
use nametags_proto::types::Vec3;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
enum Step {
    Join(&'static str, i32),
    Quit(&'static str),
    Track(&'static str, &'static str),
    Untrack(&'static str, &'static str),
    Invisibility(&'static str, bool),
    Die(&'static str),
    Respawn(&'static str),
    SwitchMode(&'static str, GameMode),
    /// Server sends a team update to the named receiver.
    TeamUpdate(&'static str),
    /// Server mounts a rider (entity id) on the first player, seen by the second.
    Mount(&'static str, &'static str, i32),
    Reload,
}

fn script() -> VecDeque<(u64, Step)> {
    use Step::*;
    VecDeque::from(vec![
        (2, Join("Alice", 11)),
        (2, Join("Bob", 12)),
        (3, Track("Bob", "Alice")),
        (4, Join("Carol", 13)),
        (4, Track("Carol", "Alice")),
        (5, Track("Alice", "Bob")),
        (8, TeamUpdate("Bob")),
        (12, Mount("Alice", "Bob", 900)),
        (20, Invisibility("Alice", true)),
        (30, Invisibility("Alice", false)),
        (40, Die("Bob")),
        (45, Respawn("Bob")),
        (50, SwitchMode("Carol", GameMode::Spectator)),
        (55, SwitchMode("Carol", GameMode::Survival)),
        (60, Reload),
        (70, Untrack("Carol", "Alice")),
        (80, Quit("Alice")),
    ])
}

pub struct Scenario {
    settings: NametagSettings,
    server: Arc<MemoryServer>,
    scheduler: Arc<TickScheduler>,
    engine: NametagEngine,
    players: HashMap<&'static str, PlayerId>,
    names: HashMap<PlayerId, &'static str>,
    steps: VecDeque<(u64, Step)>,
}

impl Scenario {
    pub fn new(
        settings: NametagSettings,
        prior: Option<TrackingSnapshot>,
    ) -> Result<Self, NametagError> {
        let server = Arc::new(MemoryServer::new());
        let scheduler = Arc::new(TickScheduler::new());
        let engine =
            NametagEngine::builder(settings.clone(), server.clone(), scheduler.clone()).build()?;
        engine.start(prior);
        Ok(Self {
            settings,
            server,
            scheduler,
            engine,
            players: HashMap::new(),
            names: HashMap::new(),
            steps: script(),
        })
    }

    pub fn is_finished(&self) -> bool {
        self.steps.is_empty() && self.scheduler.pending() <= self.repeating_tasks()
    }

    fn repeating_tasks(&self) -> usize {
        usize::from(self.settings.refresh_interval_ticks > 0)
            + usize::from(self.settings.respawn_watchdog)
    }

    /// Run the steps due at the current tick, then advance the scheduler.
    pub fn tick(&mut self) -> Result<(), NametagError> {
        let now = self.scheduler.current_tick();
        while self.steps.front().is_some_and(|(at, _)| *at <= now) {
            if let Some((_, step)) = self.steps.pop_front() {
                self.apply(step)?;
            }
        }
        self.scheduler.tick();
        self.log_outbox();
        Ok(())
    }

    fn id(&self, name: &str) -> Option<PlayerId> {
        let id = self.players.get(name).copied();
        if id.is_none() {
            warn!("Script refers to unknown player {name}");
        }
        id
    }

    fn apply(&mut self, step: Step) -> Result<(), NametagError> {
        debug!("step {step:?}");
        match step {
            Step::Join(name, entity_id) => {
                let position = Vec3::new(entity_id as f64, 64.0, 0.0);
                let id = self.server.spawn(name, entity_id, position);
                self.players.insert(name, id);
                self.names.insert(id, name);
                info!("{name} joined as entity {entity_id}");
                self.engine
                    .handle_event(NametagEvent::PlayerJoin { player: id });
            }
            Step::Quit(name) => {
                let Some(id) = self.id(name) else {
                    return Ok(());
                };
                self.server.set_online(id, false);
                self.engine
                    .handle_event(NametagEvent::PlayerQuit { player: id });
                info!("{name} left");
            }
            Step::Track(observer, subject) => {
                if let (Some(o), Some(s)) = (self.id(observer), self.id(subject)) {
                    self.engine.handle_event(NametagEvent::TrackStart {
                        observer: o,
                        subject: s,
                    });
                }
            }
            Step::Untrack(observer, subject) => {
                if let (Some(o), Some(s)) = (self.id(observer), self.id(subject)) {
                    self.engine.handle_event(NametagEvent::TrackStop {
                        observer: o,
                        subject: s,
                    });
                }
            }
            Step::Invisibility(name, gained) => {
                let Some(id) = self.id(name) else {
                    return Ok(());
                };
                let action = if gained {
                    EffectAction::Added
                } else {
                    EffectAction::Removed
                };
                self.engine.handle_event(NametagEvent::PotionEffect {
                    player: id,
                    action,
                    effect: PotionEffectKind::Invisibility,
                });
            }
            Step::Die(name) => {
                let Some(id) = self.id(name) else {
                    return Ok(());
                };
                self.server.set_dead(id, true);
                self.engine
                    .handle_event(NametagEvent::PlayerDeath { player: id });
            }
            Step::Respawn(name) => {
                let Some(id) = self.id(name) else {
                    return Ok(());
                };
                self.server.set_dead(id, false);
                self.engine
                    .handle_event(NametagEvent::PlayerRespawn { player: id });
            }
            Step::SwitchMode(name, new) => {
                let Some(id) = self.id(name) else {
                    return Ok(());
                };
                let old = self
                    .server
                    .player(id)
                    .map(|p| p.game_mode)
                    .unwrap_or_default();
                self.server.set_game_mode(id, new);
                self.engine
                    .handle_event(NametagEvent::GameModeChange { player: id, old, new });
            }
            Step::TeamUpdate(receiver) => {
                let Some(id) = self.id(receiver) else {
                    return Ok(());
                };
                let mut pkt = OutboundPacket::Teams(SetPlayerTeam {
                    name: "players".into(),
                    action: TeamAction::UpdateInfo(TeamInfo {
                        display_name: "{\"text\":\"Players\"}".into(),
                        friendly_flags: 0,
                        name_tag_visibility: NameTagVisibility::Always,
                        collision_rule: "always".into(),
                        color: 15,
                        prefix: "{\"text\":\"\"}".into(),
                        suffix: "{\"text\":\"\"}".into(),
                    }),
                });
                let verdict = self.engine.on_outbound_packet(id, &mut pkt);
                info!("team update to {receiver}: {verdict:?} -> {pkt:?}");
            }
            Step::Mount(vehicle, receiver, rider) => {
                let (Some(v), Some(r)) = (self.id(vehicle), self.id(receiver)) else {
                    return Ok(());
                };
                let Some(view) = self.server.player(v) else {
                    return Ok(());
                };
                let pkt = OutboundPacket::SetPassengers(SetPassengers {
                    vehicle_id: view.entity_id,
                    passenger_ids: vec![rider],
                });
                let packet_id = pkt.id();
                let payload = self
                    .engine
                    .on_raw_outbound(r, packet_id, pkt.encode_payload())?;
                let pkt = OutboundPacket::decode(packet_id, payload).map_err(|source| {
                    NametagError::MalformedPacket {
                        id: packet_id,
                        source,
                    }
                })?;
                info!("passengers of {vehicle} as seen by {receiver}: {pkt:?}");
            }
            Step::Reload => self.reload()?,
        }
        Ok(())
    }

    /// Hand the tracking relation from one engine instance to the next, the
    /// way a plugin reload would.
    fn reload(&mut self) -> Result<(), NametagError> {
        let snapshot = self.engine.shutdown();
        info!("Reloading engine with {} tracking pair(s)", snapshot.len());
        self.log_outbox();
        self.engine = NametagEngine::builder(
            self.settings.clone(),
            self.server.clone(),
            self.scheduler.clone(),
        )
        .build()?;
        self.engine.start(Some(snapshot));
        Ok(())
    }

    fn log_outbox(&self) {
        for (to, pkt) in self.server.take_outbox() {
            let to = self.names.get(&to).copied().unwrap_or("?");
            match pkt {
                ClientboundPacket::AddEntity(p) => {
                    info!("-> {to}: spawn display {} at {}", p.entity_id, p.position)
                }
                ClientboundPacket::SetEntityData(p) => info!(
                    "-> {to}: display {} text {:?}",
                    p.entity_id,
                    p.text().map(|t| t.plain_text()).unwrap_or_default()
                ),
                ClientboundPacket::SetPassengers(p) => info!(
                    "-> {to}: passengers of {} = {:?}",
                    p.vehicle_id, p.passenger_ids
                ),
                ClientboundPacket::RemoveEntities(p) => {
                    info!("-> {to}: remove {:?}", p.entity_ids)
                }
            }
        }
    }

    /// Final shutdown; returns the relation for the next run.
    pub fn finish(self) -> TrackingSnapshot {
        let snapshot = self.engine.shutdown();
        self.log_outbox();
        snapshot
    }

    pub fn current_tick(&self) -> u64 {
        self.scheduler.current_tick()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> NametagSettings {
        NametagSettings {
            composer_threads: 0,
            ..Default::default()
        }
    }

    fn run(scenario: &mut Scenario) {
        for _ in 0..500 {
            scenario.tick().unwrap();
            if scenario.is_finished() {
                return;
            }
        }
        panic!("script did not finish");
    }

    #[test]
    fn script_runs_to_completion() {
        let mut scenario = Scenario::new(settings(), None).unwrap();
        run(&mut scenario);
        assert!(scenario.current_tick() >= 80);

        let bob = scenario.players["Bob"];
        let carol = scenario.players["Carol"];
        assert!(scenario.engine.get_display(bob).is_some());
        assert!(scenario.engine.get_display(carol).is_some());
        assert!(scenario.engine.get_display(scenario.players["Alice"]).is_none());

        let snapshot = scenario.finish();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn reload_keeps_labels_visible() {
        let mut scenario = Scenario::new(settings(), None).unwrap();
        while scenario.current_tick() < 65 {
            scenario.tick().unwrap();
        }
        let alice = scenario.players["Alice"];
        let bob = scenario.players["Bob"];
        let display = scenario.engine.get_display(alice).unwrap();
        assert!(display.is_visible_to(bob));
    }
}
