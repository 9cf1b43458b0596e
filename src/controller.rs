//! Owns every placeholder and embed of the page and drives the scheduler, orchestrator and
//! health monitor from a single cooperative tick.
//!
//! The page itself is reached through [`Stage`] and the embedded players through
//! [`PlayerHandle`], so the controller runs the same against the DOM and against test doubles.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::ClipId;
use crate::config::ReelConfig;
use crate::error::Error;
use crate::health::{HealthMonitor, Recovery, Vitals};
use crate::manifest::Manifest;
use crate::orchestrator::{Bounds, Intent, Orchestrator, Viewport};
use crate::scheduler::MountScheduler;

/// Control surface of one embedded player. Calls are requests, the player may ignore them.
pub trait PlayerHandle {
    fn play(&self) -> Result<(), Error>;
    fn pause(&self) -> Result<(), Error>;
    fn set_current_time(&self, seconds: f64) -> Result<(), Error>;
    fn unload(&self) -> Result<(), Error>;
}

/// The page the reel lives in.
pub trait Stage {
    type Handle: PlayerHandle;

    /// Attaches a live embed for `src` to the placeholder of `clip`. Events of the new player
    /// must be reported with `generation`.
    fn mount(&mut self, clip: ClipId, generation: u32, src: &str) -> Result<Self::Handle, Error>;

    /// Removes whatever embed the placeholder of `clip` holds.
    fn unmount(&mut self, clip: ClipId);

    fn bounds(&self, clip: ClipId) -> Option<Bounds>;

    fn viewport(&self) -> Viewport;
}

#[derive(Clone, Debug, PartialEq)]
pub struct Placeholder {
    pub mounted: bool,
    pub embed_url_final: Option<String>,
}

pub struct EmbedRecord<H> {
    pub generation: u32,
    /// `None` when creating the player failed. The health monitor remounts those.
    pub handle: Option<H>,
    pub vitals: Vitals,
}

pub struct Controller<S: Stage> {
    stage: S,
    placeholders: Vec<Placeholder>,
    registry: BTreeMap<ClipId, EmbedRecord<S::Handle>>,
    scheduler: MountScheduler,
    health: HealthMonitor,
    orchestrator: Orchestrator,
    generation: u32,
    stopped: bool,
}

impl<S: Stage> Controller<S> {
    pub fn new(config: ReelConfig, manifest: &Manifest, stage: S) -> Self {
        let placeholders: Vec<Placeholder> = manifest
            .clips()
            .iter()
            .map(|clip| Placeholder {
                mounted: false,
                embed_url_final: clip.embed_url_final(),
            })
            .collect();

        let eligible = placeholders
            .iter()
            .enumerate()
            .filter(|(_, placeholder)| placeholder.embed_url_final.is_some())
            .map(|(index, _)| ClipId(index));

        let scheduler = MountScheduler::new(config.mount.clone(), eligible);

        tracing::info!(
            device = ?config.device,
            clips = placeholders.len(),
            pending = scheduler.pending(),
            "Controller created."
        );

        Self {
            stage,
            placeholders,
            registry: BTreeMap::new(),
            scheduler,
            health: HealthMonitor::new(config.health.clone(), config.jitter_seed),
            orchestrator: Orchestrator::new(config.orchestrator.clone()),
            generation: 0,
            stopped: false,
        }
    }

    pub fn start(&mut self, now: Duration) {
        if self.stopped {
            return;
        }

        for clip in self.scheduler.start(now) {
            self.mount(clip, now);
        }
    }

    /// One pass of every subsystem against `now`.
    pub fn tick(&mut self, now: Duration) {
        if self.stopped {
            return;
        }

        for clip in self.scheduler.poll(now) {
            self.dispatch(clip, now);
        }

        if self.orchestrator.is_enabled() && self.orchestrator.is_due(now) {
            self.orchestrate(now);
        }

        self.check_health(now);

        for clip in self.scheduler.admit_remounts(now) {
            self.remount(clip, now);
        }
    }

    /// The player of `clip` finished loading.
    pub fn on_ready(&mut self, clip: ClipId, generation: u32, _now: Duration) {
        if !self.is_current(clip, generation) {
            return;
        }

        if self.scheduler.settle(clip) {
            tracing::debug!(clip = clip.0, generation, "Mount settled.");
        }
    }

    /// The player of `clip` reported its playhead position.
    pub fn on_progress(&mut self, clip: ClipId, generation: u32, position: f64, now: Duration) {
        if self.stopped {
            return;
        }

        let Some(record) = self.registry.get_mut(&clip) else {
            return;
        };

        if record.generation != generation {
            return;
        }

        let started = record.vitals.has_started();
        if record.vitals.record_progress(position, now) && !started {
            tracing::info!(clip = clip.0, generation, position, "Embed started.");
        }
    }

    /// Scroll, resize and load events re-rank the active set immediately.
    pub fn on_viewport_change(&mut self, now: Duration) {
        if self.stopped || !self.orchestrator.is_enabled() {
            return;
        }

        self.orchestrate(now);
    }

    /// Removes every embed. Further calls, events and ticks are ignored.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }

        self.stopped = true;

        for clip in std::mem::take(&mut self.registry).into_keys() {
            self.stage.unmount(clip);
        }

        for placeholder in &mut self.placeholders {
            placeholder.mounted = false;
        }

        tracing::info!("Controller stopped.");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn placeholders(&self) -> &[Placeholder] {
        &self.placeholders
    }

    pub fn record(&self, clip: ClipId) -> Option<&EmbedRecord<S::Handle>> {
        self.registry.get(&clip)
    }

    pub fn scheduler(&self) -> &MountScheduler {
        &self.scheduler
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn stage(&self) -> &S {
        &self.stage
    }

    pub fn stage_mut(&mut self) -> &mut S {
        &mut self.stage
    }

    fn is_current(&self, clip: ClipId, generation: u32) -> bool {
        !self.stopped
            && self
                .registry
                .get(&clip)
                .is_some_and(|record| record.generation == generation)
    }

    fn next_generation(&mut self) -> u32 {
        self.generation += 1;
        self.generation
    }

    /// Mounts a fresh placeholder or replaces the embed of one that already has a record.
    fn dispatch(&mut self, clip: ClipId, now: Duration) {
        if self.registry.contains_key(&clip) {
            self.remount(clip, now);
        } else {
            self.mount(clip, now);
        }
    }

    fn mount(&mut self, clip: ClipId, now: Duration) {
        let Some(placeholder) = self.placeholders.get_mut(clip.0) else {
            return;
        };

        if placeholder.mounted {
            return;
        }

        let Some(src) = placeholder.embed_url_final.clone() else {
            return;
        };

        placeholder.mounted = true;

        let generation = self.next_generation();
        let handle = self.attach(clip, generation, &src);

        self.registry.insert(
            clip,
            EmbedRecord {
                generation,
                handle,
                vitals: Vitals::new(now),
            },
        );
    }

    fn remount(&mut self, clip: ClipId, now: Duration) {
        let Some(src) = self
            .placeholders
            .get(clip.0)
            .and_then(|placeholder| placeholder.embed_url_final.clone())
        else {
            return;
        };

        let Some(previous) = self.registry.remove(&clip) else {
            return;
        };

        drop(previous.handle);
        self.stage.unmount(clip);
        self.orchestrator.forget(clip);

        let generation = self.next_generation();
        let handle = self.attach(clip, generation, &src);
        let vitals = previous.vitals.remounted(now);

        tracing::warn!(
            clip = clip.0,
            generation,
            remounts = vitals.remounts,
            "Embed remounted."
        );

        self.registry.insert(
            clip,
            EmbedRecord {
                generation,
                handle,
                vitals,
            },
        );
    }

    fn attach(&mut self, clip: ClipId, generation: u32, src: &str) -> Option<S::Handle> {
        match self.stage.mount(clip, generation, src) {
            Ok(handle) => {
                tracing::info!(clip = clip.0, generation, "Embed mounted.");
                Some(handle)
            }
            Err(error) => {
                tracing::warn!(clip = clip.0, generation, %error, "Mount failed.");
                None
            }
        }
    }

    fn orchestrate(&mut self, now: Duration) {
        let candidates: Vec<(ClipId, Bounds)> = self
            .registry
            .keys()
            .filter_map(|clip| self.stage.bounds(*clip).map(|bounds| (*clip, bounds)))
            .collect();

        let viewport = self.stage.viewport();
        let was_active = self.orchestrator.active().clone();
        let intents = self.orchestrator.plan(&candidates, viewport, now);

        // Time spent paused or off the active set does not count as silence.
        for clip in self.orchestrator.active().difference(&was_active) {
            if let Some(record) = self.registry.get_mut(clip) {
                record.vitals.observe(now);
            }
        }

        for (clip, intent) in intents {
            let Some(record) = self.registry.get_mut(&clip) else {
                continue;
            };

            if intent == Intent::Play {
                record.vitals.observe(now);
            }

            let Some(handle) = record.handle.as_ref() else {
                continue;
            };

            tracing::debug!(clip = clip.0, ?intent, "Activity intent.");

            match intent {
                Intent::Play => best_effort(clip, "play", handle.play()),
                Intent::Pause => best_effort(clip, "pause", handle.pause()),
            }
        }
    }

    fn check_health(&mut self, now: Duration) {
        // Small devices only care about what the orchestrator keeps active.
        let scope: Vec<ClipId> = if self.orchestrator.is_enabled() {
            self.orchestrator.active().iter().copied().collect()
        } else {
            self.registry.keys().copied().collect()
        };

        for clip in scope {
            if self.scheduler.is_remount_queued(clip) {
                continue;
            }

            let Some(record) = self.registry.get_mut(&clip) else {
                continue;
            };

            let Some(recovery) = self.health.plan(&mut record.vitals, now) else {
                continue;
            };

            tracing::info!(
                clip = clip.0,
                generation = record.generation,
                ?recovery,
                "Recovering embed."
            );

            match (recovery, record.handle.as_ref()) {
                (Recovery::Remount, _) => {
                    self.scheduler.request_remount(clip);
                }
                // Nothing to talk to, the remount step will replace it.
                (_, None) => {}
                (Recovery::Resume, Some(handle)) => best_effort(clip, "play", handle.play()),
                (Recovery::Seek { to }, Some(handle)) => {
                    best_effort(clip, "seek", handle.set_current_time(to));
                    best_effort(clip, "play", handle.play());
                }
                (Recovery::Deep, Some(handle)) => {
                    best_effort(clip, "unload", handle.unload());
                    best_effort(clip, "play", handle.play());
                }
            }
        }
    }
}

fn best_effort(clip: ClipId, call: &'static str, result: Result<(), Error>) {
    if let Err(error) = result {
        tracing::debug!(clip = clip.0, call, %error, "Player call failed.");
    }
}
