use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use showreel::controller::{PlayerHandle, Stage};
use showreel::orchestrator::{Bounds, Viewport};
use showreel::{ClipDescriptor, ClipId, Error, Manifest};

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Mount { clip: usize, generation: u32 },
    Unmount { clip: usize },
    Play { clip: usize },
    Pause { clip: usize },
    Seek { clip: usize, to: f64 },
    Unload { clip: usize },
}

pub type Log = Rc<RefCell<Vec<(Duration, Call)>>>;

/// Shared virtual clock so handles can timestamp their calls.
pub type Clock = Rc<RefCell<Duration>>;

pub struct FakeHandle {
    clip: usize,
    log: Log,
    clock: Clock,
}

impl FakeHandle {
    fn push(&self, call: Call) -> Result<(), Error> {
        self.log.borrow_mut().push((*self.clock.borrow(), call));
        Ok(())
    }
}

impl PlayerHandle for FakeHandle {
    fn play(&self) -> Result<(), Error> {
        self.push(Call::Play { clip: self.clip })
    }

    fn pause(&self) -> Result<(), Error> {
        self.push(Call::Pause { clip: self.clip })
    }

    fn set_current_time(&self, seconds: f64) -> Result<(), Error> {
        self.push(Call::Seek {
            clip: self.clip,
            to: seconds,
        })
    }

    fn unload(&self) -> Result<(), Error> {
        self.push(Call::Unload { clip: self.clip })
    }
}

/// Records every mount and fails the test when a placeholder would hold two iframes.
pub struct FakeStage {
    pub log: Log,
    pub clock: Clock,
    pub live: BTreeMap<usize, u32>,
    pub failing: Vec<usize>,
    pub bounds: BTreeMap<usize, Bounds>,
    pub viewport: Viewport,
}

impl FakeStage {
    pub fn new(clock: Clock) -> Self {
        Self {
            log: Rc::default(),
            clock,
            live: BTreeMap::new(),
            failing: vec![],
            bounds: BTreeMap::new(),
            viewport: Viewport { height: 800.0 },
        }
    }

    /// Lays `count` clips of `height` out in a column, scrolled so `focus` is centred.
    pub fn column(&mut self, count: usize, height: f64, focus: usize) {
        let scroll = focus as f64 * height + height / 2.0 - self.viewport.height / 2.0;

        self.bounds = (0..count)
            .map(|i| {
                let bounds = Bounds {
                    top: i as f64 * height - scroll,
                    height,
                };
                (i, bounds)
            })
            .collect();
    }
}

impl Stage for FakeStage {
    type Handle = FakeHandle;

    fn mount(&mut self, clip: ClipId, generation: u32, _src: &str) -> Result<FakeHandle, Error> {
        assert!(
            !self.live.contains_key(&clip.0),
            "clip {} mounted twice",
            clip.0
        );

        self.log
            .borrow_mut()
            .push((*self.clock.borrow(), Call::Mount { clip: clip.0, generation }));

        if self.failing.contains(&clip.0) {
            return Err(Error::Mount("player script missing".into()));
        }

        self.live.insert(clip.0, generation);

        Ok(FakeHandle {
            clip: clip.0,
            log: self.log.clone(),
            clock: self.clock.clone(),
        })
    }

    fn unmount(&mut self, clip: ClipId) {
        self.live.remove(&clip.0);
        self.log
            .borrow_mut()
            .push((*self.clock.borrow(), Call::Unmount { clip: clip.0 }));
    }

    fn bounds(&self, clip: ClipId) -> Option<Bounds> {
        self.bounds.get(&clip.0).copied()
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }
}

pub fn manifest(count: usize) -> Manifest {
    Manifest::new(
        (0..count)
            .map(|i| ClipDescriptor::with_embed_url(format!("https://player.vimeo.com/video/{i}")))
            .collect(),
    )
}

pub const fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

pub fn calls(log: &Log) -> Vec<(Duration, Call)> {
    log.borrow().clone()
}

pub fn mounts_at(log: &Log, at: Duration) -> Vec<usize> {
    log.borrow()
        .iter()
        .filter(|(when, _)| *when == at)
        .filter_map(|(_, call)| match call {
            Call::Mount { clip, .. } => Some(*clip),
            _ => None,
        })
        .collect()
}
