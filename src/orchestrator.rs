//! Keeps only the embeds closest to the viewport centre decoding.
//!
//! The active set is recomputed from scratch on every pass. Stability at its edge comes from
//! the two distance lines instead: an active embed is told to play only inside the play line,
//! an inactive one is paused only beyond the pause line, and anything in between keeps
//! whatever it was last told.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::ClipId;
use crate::config::OrchestratorTuning;

/// Visible area of the page, in CSS pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub height: f64,
}

/// Vertical extent of a placeholder relative to the top of the viewport, in CSS pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub top: f64,
    pub height: f64,
}

impl Bounds {
    pub fn center(&self) -> f64 {
        self.top + self.height / 2.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intent {
    Play,
    Pause,
}

pub struct Orchestrator {
    tuning: OrchestratorTuning,
    active: BTreeSet<ClipId>,
    /// Last intent issued per embed.
    intents: BTreeMap<ClipId, Intent>,
    activated_at: BTreeMap<ClipId, Duration>,
    last_pass: Option<Duration>,
}

impl Orchestrator {
    pub fn new(tuning: OrchestratorTuning) -> Self {
        Self {
            tuning,
            active: BTreeSet::new(),
            intents: BTreeMap::new(),
            activated_at: BTreeMap::new(),
            last_pass: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.tuning.enabled
    }

    pub fn is_due(&self, now: Duration) -> bool {
        self.last_pass
            .is_none_or(|at| now.saturating_sub(at) >= self.tuning.interval)
    }

    pub fn active(&self) -> &BTreeSet<ClipId> {
        &self.active
    }

    pub fn is_active(&self, clip: ClipId) -> bool {
        self.active.contains(&clip)
    }

    /// Drops what was issued to `clip`. Used when its embed is replaced.
    pub fn forget(&mut self, clip: ClipId) {
        self.intents.remove(&clip);
        self.activated_at.remove(&clip);
    }

    /// Ranks `candidates` by distance to the viewport centre and returns the intents to issue.
    pub fn plan(
        &mut self,
        candidates: &[(ClipId, Bounds)],
        viewport: Viewport,
        now: Duration,
    ) -> Vec<(ClipId, Intent)> {
        self.last_pass = Some(now);

        let centre = viewport.height / 2.0;
        let unit = viewport.height.max(1.0);

        let mut ranked: Vec<(ClipId, f64)> = candidates
            .iter()
            .map(|(clip, bounds)| (*clip, (bounds.center() - centre).abs() / unit))
            .collect();

        ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        self.active = ranked
            .iter()
            .take(self.tuning.active)
            .map(|(clip, _)| *clip)
            .collect();

        let mut intents = vec![];

        for (rank, (clip, distance)) in ranked.into_iter().enumerate() {
            let issued = self.intents.get(&clip).copied();

            if rank < self.tuning.active {
                if distance <= self.tuning.play_line && issued != Some(Intent::Play) {
                    self.intents.insert(clip, Intent::Play);
                    self.activated_at.insert(clip, now);
                    intents.push((clip, Intent::Play));
                }
            } else if distance >= self.tuning.pause_line && issued != Some(Intent::Pause) {
                let settling = self
                    .activated_at
                    .get(&clip)
                    .is_some_and(|at| now.saturating_sub(*at) < self.tuning.activation_grace);

                if !settling {
                    self.intents.insert(clip, Intent::Pause);
                    intents.push((clip, Intent::Pause));
                }
            }
        }

        intents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    const VIEWPORT: Viewport = Viewport { height: 800.0 };

    /// Ten stacked 400px clips, scrolled so clip `focus` sits in the viewport centre.
    fn column(focus: usize) -> Vec<(ClipId, Bounds)> {
        let scroll = focus as f64 * 400.0 + 200.0 - VIEWPORT.height / 2.0;

        (0..10)
            .map(|i| {
                let bounds = Bounds {
                    top: i as f64 * 400.0 - scroll,
                    height: 400.0,
                };
                (ClipId(i), bounds)
            })
            .collect()
    }

    fn enabled() -> Orchestrator {
        Orchestrator::new(OrchestratorTuning {
            enabled: true,
            ..OrchestratorTuning::default()
        })
    }

    fn with(intents: &[(ClipId, Intent)], wanted: Intent) -> Vec<usize> {
        let mut clips: Vec<usize> = intents
            .iter()
            .filter(|(_, intent)| *intent == wanted)
            .map(|(clip, _)| clip.0)
            .collect();
        clips.sort();
        clips
    }

    #[test]
    fn nearest_five_play_the_rest_pause() {
        let mut orchestrator = enabled();
        let intents = orchestrator.plan(&column(4), VIEWPORT, ms(0));

        assert_eq!(with(&intents, Intent::Play), vec![2, 3, 4, 5, 6]);
        assert_eq!(with(&intents, Intent::Pause), vec![0, 1, 7, 8, 9]);
        assert_eq!(
            orchestrator.active().iter().map(|c| c.0).collect::<Vec<_>>(),
            vec![2, 3, 4, 5, 6]
        );
    }

    #[test]
    fn intents_are_issued_once() {
        let mut orchestrator = enabled();
        orchestrator.plan(&column(4), VIEWPORT, ms(0));

        assert!(orchestrator.plan(&column(4), VIEWPORT, ms(500)).is_empty());
    }

    #[test]
    fn recently_activated_embeds_are_not_paused() {
        let mut orchestrator = enabled();
        orchestrator.plan(&column(4), VIEWPORT, ms(0));

        // Clip 7 activates, then the page jumps back before its grace runs out.
        let intents = orchestrator.plan(&column(5), VIEWPORT, ms(500));
        assert_eq!(with(&intents, Intent::Play), vec![7]);

        let intents = orchestrator.plan(&column(1), VIEWPORT, ms(1500));
        assert_eq!(with(&intents, Intent::Pause), vec![5, 6]);
        assert!(!with(&intents, Intent::Pause).contains(&7));

        let intents = orchestrator.plan(&column(1), VIEWPORT, ms(2000));
        assert_eq!(with(&intents, Intent::Pause), vec![7]);
    }

    #[test]
    fn embeds_between_the_lines_are_left_alone() {
        let mut orchestrator = Orchestrator::new(OrchestratorTuning {
            enabled: true,
            active: 1,
            ..OrchestratorTuning::default()
        });

        // Clip 0 at a quarter viewport height from the centre is inactive but inside the pause line.
        let candidates = [
            (ClipId(0), Bounds { top: 0.0, height: 400.0 }),
            (ClipId(1), Bounds { top: 200.0, height: 400.0 }),
        ];
        let intents = orchestrator.plan(&candidates, VIEWPORT, ms(0));

        assert_eq!(intents, vec![(ClipId(1), Intent::Play)]);
    }

    #[test]
    fn ties_break_in_manifest_order() {
        let mut orchestrator = Orchestrator::new(OrchestratorTuning {
            enabled: true,
            active: 1,
            ..OrchestratorTuning::default()
        });
        let candidates = [
            (ClipId(3), Bounds { top: 0.0, height: 400.0 }),
            (ClipId(2), Bounds { top: 400.0, height: 400.0 }),
        ];

        orchestrator.plan(&candidates, VIEWPORT, ms(0));

        assert!(orchestrator.is_active(ClipId(2)));
    }

    #[test]
    fn passes_follow_the_interval() {
        let mut orchestrator = enabled();

        assert!(orchestrator.is_due(ms(0)));
        orchestrator.plan(&[], VIEWPORT, ms(0));
        assert!(!orchestrator.is_due(ms(499)));
        assert!(orchestrator.is_due(ms(500)));
    }
}
