mod support;

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::Duration;

use showreel::config::MountProfile;
use showreel::{ClipDescriptor, ClipId, Controller, DeviceClass, Manifest, ReelConfig};

use support::{Call, Clock, FakeStage, Log, calls, manifest, mounts_at, ms};

struct Harness {
    controller: Controller<FakeStage>,
    clock: Clock,
}

impl Harness {
    fn new(config: ReelConfig, manifest: &Manifest) -> Self {
        let clock: Clock = Rc::new(RefCell::new(Duration::ZERO));
        let stage = FakeStage::new(clock.clone());

        Self {
            controller: Controller::new(config, manifest, stage),
            clock,
        }
    }

    fn at(&mut self, now: Duration) {
        *self.clock.borrow_mut() = now;
    }

    fn start(&mut self, now: Duration) {
        self.at(now);
        self.controller.start(now);
    }

    fn tick(&mut self, now: Duration) {
        self.at(now);
        self.controller.tick(now);
    }

    fn run(&mut self, from: u64, to: u64, step: u64) {
        for millis in (from..=to).step_by(step as usize) {
            self.tick(ms(millis));
        }
    }

    fn scroll(&mut self, focus: usize, now: Duration) {
        self.at(now);
        self.controller.stage_mut().column(10, 400.0, focus);
        self.controller.on_viewport_change(now);
    }

    fn ready(&mut self, clip: usize, now: Duration) {
        self.at(now);
        let generation = self.generation(clip);
        self.controller.on_ready(ClipId(clip), generation, now);
    }

    fn progress(&mut self, clip: usize, position: f64, now: Duration) {
        self.at(now);
        let generation = self.generation(clip);
        self.controller
            .on_progress(ClipId(clip), generation, position, now);
    }

    fn generation(&self, clip: usize) -> u32 {
        self.controller
            .record(ClipId(clip))
            .map(|record| record.generation)
            .unwrap_or_default()
    }

    fn log(&self) -> Log {
        self.controller.stage().log.clone()
    }
}

fn small_with_everything_mounted(count: usize) -> ReelConfig {
    ReelConfig {
        mount: MountProfile {
            concurrency: count,
            burst: count,
            ..MountProfile::small()
        },
        ..ReelConfig::for_device(DeviceClass::Small)
    }
}

#[test]
fn desktop_bursts_twelve_then_batches_five() {
    let mut harness = Harness::new(ReelConfig::for_device(DeviceClass::Large), &manifest(20));

    harness.start(ms(0));
    assert_eq!(mounts_at(&harness.log(), ms(0)), (0..12).collect::<Vec<_>>());

    for clip in 0..12 {
        harness.ready(clip, ms(100));
    }

    harness.tick(ms(250));
    assert_eq!(harness.controller.scheduler().pending(), 8);

    harness.tick(ms(400));
    assert_eq!(mounts_at(&harness.log(), ms(400)), vec![12, 13, 14, 15, 16]);

    for clip in 12..17 {
        harness.ready(clip, ms(450));
    }

    harness.tick(ms(650));
    assert!(mounts_at(&harness.log(), ms(650)).is_empty());

    harness.tick(ms(800));
    assert_eq!(mounts_at(&harness.log(), ms(800)), vec![17, 18, 19]);
    assert!(harness.controller.placeholders().iter().all(|p| p.mounted));
}

#[test]
fn nothing_mounts_until_started() {
    let mut harness = Harness::new(ReelConfig::for_device(DeviceClass::Small), &manifest(4));
    harness.controller.stage_mut().column(4, 400.0, 0);

    // Heartbeats keep running while the player script loads.
    harness.run(0, 90_000, 250);
    harness.controller.on_viewport_change(ms(90_000));
    assert!(calls(&harness.log()).is_empty());

    harness.start(ms(90_100));
    assert_eq!(
        calls(&harness.log()),
        vec![(ms(90_100), Call::Mount { clip: 0, generation: 1 })]
    );
}

#[test]
fn in_flight_mounts_never_exceed_the_cap() {
    for device in [DeviceClass::Large, DeviceClass::Small] {
        let config = ReelConfig::for_device(device);
        let cap = config.mount.concurrency;
        let mut harness = Harness::new(config, &manifest(40));

        harness.start(ms(0));

        for millis in (0..=70_000).step_by(250) {
            harness.tick(ms(millis));
            assert!(harness.controller.scheduler().in_flight() <= cap);

            // Every third clip reports ready shortly after mounting, the rest time out.
            if millis % 1000 == 0 {
                for clip in (0..40).step_by(3) {
                    if harness.controller.scheduler().is_loading(ClipId(clip)) {
                        harness.ready(clip, ms(millis));
                    }
                }
            }
        }

        assert!(harness.controller.placeholders().iter().all(|p| p.mounted));
    }
}

#[test]
fn deadline_sweep_mounts_everything_left() {
    let mut harness = Harness::new(ReelConfig::for_device(DeviceClass::Small), &manifest(30));

    harness.start(ms(0));
    harness.run(250, 59_750, 250);

    let mounted = harness
        .controller
        .placeholders()
        .iter()
        .filter(|p| p.mounted)
        .count();
    assert!(mounted < 30);

    harness.tick(ms(60_000));

    assert!(harness.controller.placeholders().iter().all(|p| p.mounted));
    assert_eq!(harness.controller.stage().live.len(), 30);
}

#[test]
fn clips_without_embed_url_are_skipped() {
    let manifest = Manifest::new(vec![
        ClipDescriptor::with_embed_url("https://player.vimeo.com/video/1"),
        ClipDescriptor::default(),
        ClipDescriptor::with_embed_url(" "),
    ]);
    let mut harness = Harness::new(ReelConfig::for_device(DeviceClass::Large), &manifest);

    harness.start(ms(0));
    harness.run(0, 30_000, 500);

    let mounted: Vec<bool> = harness
        .controller
        .placeholders()
        .iter()
        .map(|p| p.mounted)
        .collect();
    assert_eq!(mounted, vec![true, false, false]);
}

#[test]
fn black_embed_resumes_once_then_remounts_once() {
    let mut harness = Harness::new(ReelConfig::for_device(DeviceClass::Large), &manifest(1));

    harness.start(ms(0));
    harness.run(100, 14_000, 100);

    assert_eq!(
        calls(&harness.log()),
        vec![
            (ms(0), Call::Mount { clip: 0, generation: 1 }),
            (ms(7000), Call::Play { clip: 0 }),
            (ms(14_000), Call::Unmount { clip: 0 }),
            (ms(14_000), Call::Mount { clip: 0, generation: 2 }),
        ]
    );

    let record = harness.controller.record(ClipId(0)).unwrap();
    assert_eq!(record.generation, 2);
    assert_eq!(record.vitals.remounts, 1);
    assert_eq!(record.vitals.attempts, 0);
    assert_eq!(record.vitals.first_progress_at, None);
    assert_eq!(record.vitals.mounted_at, ms(14_000));
}

#[test]
fn remounts_respect_the_cooldown() {
    let mut harness = Harness::new(ReelConfig::for_device(DeviceClass::Large), &manifest(1));

    harness.start(ms(0));
    harness.run(100, 120_000, 100);

    let remounts: Vec<Duration> = calls(&harness.log())
        .into_iter()
        .filter(|(_, call)| matches!(call, Call::Unmount { .. }))
        .map(|(at, _)| at)
        .collect();

    assert_eq!(remounts.first(), Some(&ms(14_000)));
    assert!(remounts.len() >= 3);
    assert!(remounts.windows(2).all(|w| w[1] - w[0] >= ms(30_000)));
    assert_eq!(harness.controller.stage().live.len(), 1);
}

#[test]
fn stale_generations_are_ignored() {
    let mut harness = Harness::new(ReelConfig::for_device(DeviceClass::Large), &manifest(1));

    harness.start(ms(0));
    harness.run(100, 14_000, 100);

    harness.controller.on_progress(ClipId(0), 1, 3.0, ms(14_100));
    assert_eq!(harness.controller.record(ClipId(0)).unwrap().vitals.position, None);

    harness.progress(0, 3.0, ms(14_200));
    assert_eq!(harness.controller.record(ClipId(0)).unwrap().vitals.position, Some(3.0));
}

#[test]
fn stalled_embed_recovery_is_rate_limited() {
    let mut harness = Harness::new(ReelConfig::for_device(DeviceClass::Large), &manifest(1));

    harness.start(ms(0));
    harness.ready(0, ms(200));

    for step in 0..8 {
        harness.progress(0, step as f64 * 0.25, ms(250 + step * 250));
        harness.tick(ms(250 + step * 250));
    }

    harness.run(2100, 90_000, 100);

    let log = calls(&harness.log());
    let actions: BTreeSet<Duration> = log
        .iter()
        .filter(|(_, call)| !matches!(call, Call::Mount { .. }))
        .map(|(at, _)| *at)
        .collect();
    let actions: Vec<Duration> = actions.into_iter().collect();

    assert!(actions.len() > 10);
    assert!(actions.windows(2).all(|w| w[1] - w[0] >= ms(1500)));

    let deep: Vec<Duration> = log
        .iter()
        .filter(|(_, call)| matches!(call, Call::Unload { .. }))
        .map(|(at, _)| *at)
        .collect();
    assert!(!deep.is_empty());
    assert!(deep.windows(2).all(|w| w[1] - w[0] >= ms(30_000)));

    assert!(log.iter().any(|(_, call)| matches!(call, Call::Seek { to, .. } if *to > 1.75)));
    // A stalled embed that once played is never torn down.
    assert!(!log.iter().any(|(_, call)| matches!(call, Call::Unmount { .. })));
}

#[test]
fn progress_resets_the_ladder() {
    let mut harness = Harness::new(ReelConfig::for_device(DeviceClass::Large), &manifest(1));

    harness.start(ms(0));
    harness.progress(0, 0.5, ms(500));
    harness.run(600, 4000, 100);

    assert_eq!(harness.controller.record(ClipId(0)).unwrap().vitals.attempts, 1);

    harness.progress(0, 0.75, ms(4100));
    assert_eq!(harness.controller.record(ClipId(0)).unwrap().vitals.attempts, 0);
}

#[test]
fn failed_mounts_are_retried_by_remounting() {
    let mut harness = Harness::new(ReelConfig::for_device(DeviceClass::Large), &manifest(2));
    harness.controller.stage_mut().failing.push(1);

    harness.start(ms(0));

    let record = harness.controller.record(ClipId(1)).unwrap();
    assert!(record.handle.is_none());
    assert!(harness.controller.placeholders()[1].mounted);

    harness.controller.stage_mut().failing.clear();
    harness.run(100, 14_000, 100);

    let record = harness.controller.record(ClipId(1)).unwrap();
    assert!(record.handle.is_some());
    assert_eq!(record.vitals.remounts, 1);
    assert_eq!(harness.controller.stage().live.get(&1), Some(&record.generation));
}

#[test]
fn mobile_plays_the_five_nearest_and_pauses_the_rest() {
    let mut harness = Harness::new(small_with_everything_mounted(10), &manifest(10));
    harness.controller.stage_mut().column(10, 400.0, 4);

    harness.start(ms(0));
    harness.controller.on_viewport_change(ms(0));

    let log = calls(&harness.log());
    let played: BTreeSet<usize> = log
        .iter()
        .filter_map(|(_, call)| match call {
            Call::Play { clip } => Some(*clip),
            _ => None,
        })
        .collect();
    let paused: BTreeSet<usize> = log
        .iter()
        .filter_map(|(_, call)| match call {
            Call::Pause { clip } => Some(*clip),
            _ => None,
        })
        .collect();

    assert_eq!(played, BTreeSet::from([2, 3, 4, 5, 6]));
    assert_eq!(paused, BTreeSet::from([0, 1, 7, 8, 9]));
    assert_eq!(
        harness.controller.orchestrator().active(),
        &BTreeSet::from([2, 3, 4, 5, 6].map(ClipId))
    );
}

#[test]
fn mobile_health_only_watches_the_active_set() {
    let mut harness = Harness::new(small_with_everything_mounted(10), &manifest(10));
    harness.controller.stage_mut().column(10, 400.0, 0);

    harness.start(ms(0));
    harness.run(0, 20_000, 250);

    let remounted: BTreeSet<usize> = calls(&harness.log())
        .into_iter()
        .filter_map(|(_, call)| match call {
            Call::Unmount { clip } => Some(clip),
            _ => None,
        })
        .collect();

    assert_eq!(remounted, BTreeSet::from([0, 1, 2, 3, 4]));
}

#[test]
fn clips_paused_before_they_played_get_a_fresh_watch() {
    let mut harness = Harness::new(small_with_everything_mounted(10), &manifest(10));
    harness.controller.stage_mut().column(10, 400.0, 0);

    harness.start(ms(0));
    harness.run(0, 29_750, 250);
    harness.scroll(9, ms(30_000));
    harness.run(30_250, 40_000, 250);

    let clip_nine: Vec<(Duration, Call)> = calls(&harness.log())
        .into_iter()
        .filter(|(_, call)| match call {
            Call::Mount { clip, .. }
            | Call::Unmount { clip }
            | Call::Play { clip }
            | Call::Pause { clip }
            | Call::Seek { clip, .. }
            | Call::Unload { clip } => *clip == 9,
        })
        .collect();

    assert_eq!(
        clip_nine,
        vec![
            (ms(0), Call::Mount { clip: 9, generation: 10 }),
            (ms(0), Call::Pause { clip: 9 }),
            (ms(30_000), Call::Play { clip: 9 }),
            (ms(37_000), Call::Play { clip: 9 }),
        ]
    );
}

#[test]
fn remounts_share_the_mobile_handshake_slot() {
    let mut harness = Harness::new(ReelConfig::for_device(DeviceClass::Small), &manifest(10));
    harness.controller.stage_mut().column(10, 400.0, 0);

    harness.start(ms(0));

    for millis in (250..=59_000).step_by(250) {
        harness.tick(ms(millis));
        assert!(harness.controller.scheduler().in_flight() <= 1);
    }

    let log = calls(&harness.log());
    let mounts: Vec<Duration> = log
        .iter()
        .filter(|(_, call)| matches!(call, Call::Mount { .. }))
        .map(|(at, _)| *at)
        .collect();

    // No player ever reports ready, so every handshake holds the slot for the full load timeout.
    assert!(mounts.windows(2).all(|w| w[1] - w[0] >= ms(6000)));
    assert!(log.iter().any(|(_, call)| matches!(call, Call::Unmount { .. })));
}

#[test]
fn desktop_never_orchestrates() {
    let mut harness = Harness::new(ReelConfig::for_device(DeviceClass::Large), &manifest(10));
    harness.controller.stage_mut().column(10, 400.0, 4);

    harness.start(ms(0));
    harness.controller.on_viewport_change(ms(10));
    harness.run(0, 5000, 250);

    assert!(
        !calls(&harness.log())
            .iter()
            .any(|(_, call)| matches!(call, Call::Pause { .. } | Call::Play { .. }))
    );
}

#[test]
fn stop_is_idempotent_and_final() {
    let mut harness = Harness::new(ReelConfig::for_device(DeviceClass::Large), &manifest(20));

    harness.start(ms(0));
    harness.controller.stop();
    harness.controller.stop();

    assert!(harness.controller.is_stopped());
    assert!(harness.controller.stage().live.is_empty());
    assert!(harness.controller.placeholders().iter().all(|p| !p.mounted));

    let before = calls(&harness.log()).len();
    harness.run(0, 60_000, 500);
    harness.controller.on_viewport_change(ms(60_000));

    assert_eq!(calls(&harness.log()).len(), before);
}
