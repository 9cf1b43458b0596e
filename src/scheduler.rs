//! Decides when each placeholder receives its embed.
//!
//! Mounting happens in three stages: an eager burst on start, paced batches bounded by the
//! number of loads still in flight, and a final sweep once the deadline passes. A mount stops
//! counting as in flight when its player reports ready or when its load timeout expires,
//! whichever comes first.
//!
//! Remounts of broken embeds go through the same cap. They wait in their own queue and are
//! served before fresh mounts.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use crate::ClipId;
use crate::config::MountProfile;

pub struct MountScheduler {
    profile: MountProfile,
    /// Placeholders still waiting for an embed, in manifest order.
    pending: VecDeque<ClipId>,
    /// Loading mounts and the time they settle regardless of readiness.
    in_flight: BTreeMap<ClipId, Duration>,
    remounts: VecDeque<ClipId>,
    started_at: Option<Duration>,
    last_batch_at: Duration,
    swept: bool,
}

impl MountScheduler {
    pub fn new(profile: MountProfile, clips: impl IntoIterator<Item = ClipId>) -> Self {
        Self {
            profile,
            pending: clips.into_iter().collect(),
            in_flight: BTreeMap::new(),
            remounts: VecDeque::new(),
            started_at: None,
            last_batch_at: Duration::ZERO,
            swept: false,
        }
    }

    /// Mounts the eager prefix. Calling it again is a no-op.
    pub fn start(&mut self, now: Duration) -> Vec<ClipId> {
        if self.started_at.is_some() {
            return vec![];
        }

        self.started_at = Some(now);
        self.last_batch_at = now;

        let burst = self.profile.burst.min(self.profile.concurrency);
        let mounts = self.take(burst, now);

        tracing::info!(mounts = mounts.len(), pending = self.pending.len(), "Burst mounted.");

        mounts
    }

    /// Advances the schedule to `now` and returns the placeholders to mount. Admitted remounts
    /// come first, then fresh mounts in manifest order.
    pub fn poll(&mut self, now: Duration) -> Vec<ClipId> {
        let Some(started_at) = self.started_at else {
            return vec![];
        };

        let mut mounts = self.admit_remounts(now);

        if self.pending.is_empty() {
            return mounts;
        }

        if !self.swept && now >= started_at + self.profile.deadline {
            self.swept = true;
            let swept: Vec<ClipId> = self.pending.drain(..).collect();

            tracing::warn!(mounts = swept.len(), "Deadline passed, force mounting the rest.");

            mounts.extend(swept);
            return mounts;
        }

        let since = now.saturating_sub(self.last_batch_at);

        if since < self.profile.tick {
            return mounts;
        }

        // Heartbeats can be throttled (background tabs, busy main thread). When the gap since the
        // last batch exceeds the watchdog interval, make up for the batches that never ran.
        let allowance = if since >= self.profile.watchdog {
            let missed = (since.as_millis() / self.profile.tick.as_millis().max(1)) as usize;
            tracing::debug!(missed, "Watchdog catching up on missed batches.");
            self.profile.batch * missed.max(1)
        } else {
            self.profile.batch
        };

        self.last_batch_at = now;

        let batch = self.take(allowance.min(self.free()), now);

        if !batch.is_empty() {
            tracing::info!(
                mounts = batch.len(),
                in_flight = self.in_flight.len(),
                pending = self.pending.len(),
                "Batch mounted."
            );
        }

        mounts.extend(batch);
        mounts
    }

    /// Queues a fresh embed for `clip`. A load still running for it is given up.
    pub fn request_remount(&mut self, clip: ClipId) -> bool {
        if self.remounts.contains(&clip) {
            return false;
        }

        self.in_flight.remove(&clip);
        self.remounts.push_back(clip);

        true
    }

    /// Queued remounts that fit under the cap at `now`. Each counts in flight until settled.
    pub fn admit_remounts(&mut self, now: Duration) -> Vec<ClipId> {
        self.expire(now);

        let count = self.free().min(self.remounts.len());
        let admitted: Vec<ClipId> = self.remounts.drain(..count).collect();

        for clip in &admitted {
            self.in_flight.insert(*clip, now + self.profile.load_timeout);
        }

        if !self.remounts.is_empty() {
            tracing::debug!(waiting = self.remounts.len(), "Remounts waiting for a slot.");
        }

        admitted
    }

    pub fn is_remount_queued(&self, clip: ClipId) -> bool {
        self.remounts.contains(&clip)
    }

    /// Frees the slot of `clip` because its player reported ready.
    pub fn settle(&mut self, clip: ClipId) -> bool {
        self.in_flight.remove(&clip).is_some()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_loading(&self, clip: ClipId) -> bool {
        self.in_flight.contains_key(&clip)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_drained(&self) -> bool {
        self.pending.is_empty()
    }

    fn free(&self) -> usize {
        self.profile.concurrency.saturating_sub(self.in_flight.len())
    }

    fn take(&mut self, count: usize, now: Duration) -> Vec<ClipId> {
        let count = count.min(self.pending.len());
        let mounts: Vec<ClipId> = self.pending.drain(..count).collect();

        for clip in &mounts {
            self.in_flight.insert(*clip, now + self.profile.load_timeout);
        }

        mounts
    }

    fn expire(&mut self, now: Duration) {
        let before = self.in_flight.len();
        self.in_flight.retain(|_, settles_at| *settles_at > now);

        let expired = before - self.in_flight.len();
        if expired > 0 {
            tracing::debug!(expired, "Mounts settled by timeout.");
        }
    }
}
