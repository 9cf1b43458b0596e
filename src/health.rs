//! Progress tracking and recovery for mounted embeds.
//!
//! An embed that never reports progress is "black", one that reported progress and went quiet
//! is stalled. Recovery escalates from a plain resume, to nudging the playhead forward, to a
//! deep reload of the player, and for black embeds to a full remount. Every step is rate limited
//! per embed by a shared cooldown.

use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::config::HealthTuning;

/// Positions closer than this are the same frame.
const SAME_POSITION: f64 = 1e-3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Health {
    /// Mounted recently, no verdict yet.
    Pending,
    Ok,
    /// No progress since mount for longer than the black threshold.
    NeverStarted,
    /// Progress stopped for longer than the stall threshold.
    Stalled,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Recovery {
    Resume,
    /// Move the playhead to `to` seconds and resume.
    Seek { to: f64 },
    /// Unload the player and resume.
    Deep,
    /// Replace the iframe with a fresh one.
    Remount,
}

/// Progress and recovery bookkeeping of one embed. Times are measured from page load.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Vitals {
    pub mounted_at: Duration,
    /// Start of the current watch. Silence before it is not held against the embed.
    pub observed_since: Duration,
    pub first_progress_at: Option<Duration>,
    pub last_progress_at: Option<Duration>,
    /// Last reported playhead position in seconds.
    pub position: Option<f64>,
    pub last_action_at: Option<Duration>,
    /// Recovery actions since the last progress signal.
    pub attempts: u32,
    /// Seeks since the last progress signal or deep recovery.
    pub seeks: u32,
    pub last_deep_at: Option<Duration>,
    pub remounts: u32,
    pub last_remount_at: Option<Duration>,
}

impl Vitals {
    pub fn new(now: Duration) -> Self {
        Self {
            mounted_at: now,
            observed_since: now,
            ..Default::default()
        }
    }

    /// Restarts the watch, as when the embed was told to play after sitting paused.
    pub fn observe(&mut self, now: Duration) {
        self.observed_since = now;
        self.attempts = 0;
        self.seeks = 0;
    }

    /// Vitals for the replacement of this embed. Only the remount history survives.
    pub fn remounted(&self, now: Duration) -> Self {
        Self {
            mounted_at: now,
            observed_since: now,
            last_action_at: Some(now),
            remounts: self.remounts + 1,
            last_remount_at: Some(now),
            ..Default::default()
        }
    }

    /// Records a reported playhead position. Returns whether it counts as progress.
    ///
    /// Any change counts, including the jump back to zero of a looping clip.
    pub fn record_progress(&mut self, position: f64, now: Duration) -> bool {
        if !position.is_finite() {
            return false;
        }

        if let Some(previous) = self.position {
            if (previous - position).abs() < SAME_POSITION {
                return false;
            }
        }

        self.position = Some(position);
        self.first_progress_at.get_or_insert(now);
        self.last_progress_at = Some(now);
        self.attempts = 0;
        self.seeks = 0;

        true
    }

    pub fn has_started(&self) -> bool {
        self.first_progress_at.is_some()
    }
}

pub struct HealthMonitor {
    tuning: HealthTuning,
    rng: SmallRng,
}

impl HealthMonitor {
    pub fn new(tuning: HealthTuning, seed: u64) -> Self {
        Self {
            tuning,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn classify(&self, vitals: &Vitals, now: Duration) -> Health {
        let quiet_since = vitals
            .last_progress_at
            .map(|last| last.max(vitals.observed_since));

        match quiet_since {
            None if now.saturating_sub(vitals.observed_since) >= self.tuning.black_after => {
                Health::NeverStarted
            }
            None => Health::Pending,
            Some(at) if now.saturating_sub(at) >= self.tuning.stall_after => Health::Stalled,
            Some(_) => Health::Ok,
        }
    }

    /// Picks the next recovery step for an unhealthy embed and stamps it on `vitals`.
    pub fn plan(&mut self, vitals: &mut Vitals, now: Duration) -> Option<Recovery> {
        let health = self.classify(vitals, now);

        if matches!(health, Health::Pending | Health::Ok) {
            return None;
        }

        let since_action = vitals.last_action_at.map(|at| now.saturating_sub(at));

        if since_action.is_some_and(|since| since < self.tuning.cooldown) {
            return None;
        }

        let recovery = if vitals.attempts == 0 {
            Recovery::Resume
        } else if health == Health::NeverStarted {
            let silent = now.saturating_sub(vitals.observed_since);

            if silent < self.tuning.remount_after() || !self.remount_allowed(vitals, now) {
                return None;
            }

            Recovery::Remount
        } else if since_action.is_some_and(|since| since < self.tuning.grace) {
            return None;
        } else if vitals.seeks < self.tuning.seeks_before_deep || !self.deep_allowed(vitals, now) {
            let to = vitals.position.unwrap_or(0.0) + self.seek_step(vitals.seeks);
            vitals.seeks += 1;

            Recovery::Seek { to }
        } else {
            vitals.seeks = 0;
            vitals.last_deep_at = Some(now);

            Recovery::Deep
        };

        vitals.attempts += 1;
        vitals.last_action_at = Some(now);

        Some(recovery)
    }

    fn remount_allowed(&self, vitals: &Vitals, now: Duration) -> bool {
        vitals
            .last_remount_at
            .is_none_or(|at| now.saturating_sub(at) >= self.tuning.remount_cooldown)
    }

    fn deep_allowed(&self, vitals: &Vitals, now: Duration) -> bool {
        vitals
            .last_deep_at
            .is_none_or(|at| now.saturating_sub(at) >= self.tuning.deep_window)
    }

    fn seek_step(&mut self, seeks: u32) -> f64 {
        let base = self.tuning.seek_step + self.tuning.seek_growth * seeks as f64;
        let jitter = self.rng.random::<f64>() * self.tuning.seek_jitter;

        (base + jitter).min(self.tuning.seek_max)
    }
}
