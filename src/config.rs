//! Tunables for the reel, grouped per concern and selected per device class.
//!
//! A [`ReelConfig`] is built once and handed to the controller. Nothing reads tunables from
//! anywhere else.

use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Error;

lazy_static::lazy_static! {
    static ref MOBILE_AGENT: Regex =
        Regex::new(r"(?i)iphone|ipad|ipod|android|mobile|silk|opera mini").unwrap();
}

/// Viewports at or below this width are treated as small devices.
pub const SMALL_VIEWPORT_MAX: f64 = 768.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    /// Phones and small tablets. Mounts strictly one at a time.
    Small,
    /// Desktop class. Mounts in bursts and batches.
    Large,
}

/// What the page knows about the device when the reel starts.
#[derive(Clone, Debug, Default)]
pub struct DeviceHints {
    pub viewport_width: f64,
    pub coarse_pointer: bool,
    pub user_agent: String,
}

impl DeviceClass {
    pub fn detect(hints: &DeviceHints) -> Self {
        let narrow = hints.viewport_width > 0.0 && hints.viewport_width <= SMALL_VIEWPORT_MAX;

        if narrow || hints.coarse_pointer || MOBILE_AGENT.is_match(&hints.user_agent) {
            DeviceClass::Small
        } else {
            DeviceClass::Large
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountProfile {
    /// Maximum number of mounts that may be loading at once.
    pub concurrency: usize,
    /// Mounted synchronously on start.
    pub burst: usize,
    /// Mounted per batch step.
    pub batch: usize,
    #[serde(with = "millis")]
    pub tick: Duration,
    #[serde(with = "millis")]
    pub watchdog: Duration,
    /// A mount that has not reported ready by then stops counting as loading.
    #[serde(with = "millis")]
    pub load_timeout: Duration,
    /// Everything still unmounted is force-mounted at this point.
    #[serde(with = "millis")]
    pub deadline: Duration,
}

impl MountProfile {
    pub fn large() -> Self {
        Self {
            concurrency: 12,
            burst: 12,
            batch: 5,
            tick: Duration::from_millis(400),
            watchdog: Duration::from_millis(1500),
            load_timeout: Duration::from_secs(8),
            deadline: Duration::from_secs(25),
        }
    }

    /// Sequential mounting with spacing. Parallel handshakes are unreliable on phones.
    pub fn small() -> Self {
        Self {
            concurrency: 1,
            burst: 1,
            batch: 1,
            tick: Duration::from_millis(700),
            watchdog: Duration::from_millis(2500),
            load_timeout: Duration::from_secs(6),
            deadline: Duration::from_secs(60),
        }
    }
}

impl Default for MountProfile {
    fn default() -> Self {
        Self::large()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthTuning {
    /// Silence after mount before an embed counts as never started.
    #[serde(with = "millis")]
    pub black_after: Duration,
    /// Silence after the last progress signal before an embed counts as stalled.
    #[serde(with = "millis")]
    pub stall_after: Duration,
    /// Minimum spacing of two recovery actions on the same embed.
    #[serde(with = "millis")]
    pub cooldown: Duration,
    /// Wait after a resume before escalating to a seek.
    #[serde(with = "millis")]
    pub grace: Duration,
    pub seek_step: f64,
    pub seek_growth: f64,
    pub seek_max: f64,
    pub seek_jitter: f64,
    /// Seeks in one stall episode before a deep recovery is considered.
    pub seeks_before_deep: u32,
    #[serde(with = "millis")]
    pub deep_window: Duration,
    /// Remount once never-started silence reaches `black_after + remount_after_stalls * stall_after`.
    pub remount_after_stalls: u32,
    #[serde(with = "millis")]
    pub remount_cooldown: Duration,
}

impl Default for HealthTuning {
    fn default() -> Self {
        Self {
            black_after: Duration::from_secs(7),
            stall_after: Duration::from_millis(3500),
            cooldown: Duration::from_millis(1500),
            grace: Duration::from_millis(2500),
            seek_step: 0.35,
            seek_growth: 0.15,
            seek_max: 1.5,
            seek_jitter: 0.2,
            seeks_before_deep: 2,
            deep_window: Duration::from_secs(30),
            remount_after_stalls: 2,
            remount_cooldown: Duration::from_secs(30),
        }
    }
}

impl HealthTuning {
    pub fn remount_after(&self) -> Duration {
        self.black_after + self.stall_after * self.remount_after_stalls
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorTuning {
    pub enabled: bool,
    /// Size of the active set.
    pub active: usize,
    #[serde(with = "millis")]
    pub interval: Duration,
    /// In viewport heights from the viewport centre.
    pub play_line: f64,
    /// In viewport heights from the viewport centre. Larger than `play_line`.
    pub pause_line: f64,
    #[serde(with = "millis")]
    pub activation_grace: Duration,
}

impl Default for OrchestratorTuning {
    fn default() -> Self {
        Self {
            enabled: false,
            active: 5,
            interval: Duration::from_millis(500),
            play_line: 1.25,
            pause_line: 1.5,
            activation_grace: Duration::from_millis(1200),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallaxTuning {
    /// Fraction of the remaining distance covered per frame, `1.0` snaps immediately.
    pub smoothing: f64,
    /// Offsets closer than this to the target snap to it.
    pub epsilon: f64,
}

impl Default for ParallaxTuning {
    fn default() -> Self {
        Self {
            smoothing: 0.18,
            epsilon: 0.1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioTuning {
    pub src: String,
    pub volume: f64,
    #[serde(with = "millis")]
    pub retry_delay: Duration,
}

impl Default for AudioTuning {
    fn default() -> Self {
        Self {
            src: "./assets/audio/bg.mp3".into(),
            volume: 1.0,
            retry_delay: Duration::from_millis(60),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReelConfig {
    pub device: DeviceClass,
    pub mount: MountProfile,
    pub health: HealthTuning,
    pub orchestrator: OrchestratorTuning,
    pub parallax: ParallaxTuning,
    pub audio: AudioTuning,
    /// Cadence of the single cooperative loop driving every subsystem.
    #[serde(with = "millis")]
    pub heartbeat: Duration,
    pub jitter_seed: u64,
}

impl ReelConfig {
    pub fn for_device(device: DeviceClass) -> Self {
        let (mount, orchestrator) = match device {
            DeviceClass::Large => (MountProfile::large(), OrchestratorTuning::default()),
            DeviceClass::Small => (
                MountProfile::small(),
                OrchestratorTuning {
                    enabled: true,
                    ..OrchestratorTuning::default()
                },
            ),
        };

        Self {
            device,
            mount,
            health: HealthTuning::default(),
            orchestrator,
            parallax: ParallaxTuning::default(),
            audio: AudioTuning::default(),
            heartbeat: Duration::from_millis(250),
            jitter_seed: 0x5eed,
        }
    }

    /// The preset for `device` with the manifest's overrides applied. Rejected overrides are
    /// logged and the preset is used as is.
    pub fn resolve(device: DeviceClass, overrides: Option<&serde_json::Value>) -> Self {
        let preset = Self::for_device(device);

        let Some(overrides) = overrides else {
            return preset;
        };

        match preset.with_overrides(overrides) {
            Ok(config) => {
                tracing::info!(device = ?config.device, "Config overrides applied.");
                config
            }
            Err(error) => {
                tracing::warn!(%error, "Config overrides ignored.");
                preset
            }
        }
    }

    /// Applies a partial JSON object on top of this config. Durations are in milliseconds.
    pub fn with_overrides(&self, overrides: &serde_json::Value) -> Result<Self, Error> {
        if !overrides.is_object() {
            return Err(Error::Config("expected an object".into()));
        }

        let mut merged = serde_json::to_value(self).map_err(|e| Error::Config(e.to_string()))?;
        merge(&mut merged, overrides.clone());

        serde_json::from_value(merged).map_err(|e| Error::Config(e.to_string()))
    }
}

impl Default for ReelConfig {
    fn default() -> Self {
        Self::for_device(DeviceClass::Large)
    }
}

fn merge(base: &mut serde_json::Value, overrides: serde_json::Value) {
    match (base, overrides) {
        (serde_json::Value::Object(base), serde_json::Value::Object(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(&key) {
                    Some(slot) => merge(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
