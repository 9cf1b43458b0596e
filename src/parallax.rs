use crate::config::ParallaxTuning;

/// Smoothed vertical offset of one clip section.
#[derive(Clone, Debug, PartialEq)]
pub struct Parallax {
    speed: f64,
    offset: f64,
}

impl Parallax {
    pub fn new(speed: f64) -> Self {
        Self { speed, offset: 0.0 }
    }

    pub fn target(scroll_y: f64, speed: f64) -> f64 {
        scroll_y * speed
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn is_static(&self) -> bool {
        self.speed == 0.0
    }

    /// Eases the offset toward the scroll target. Returns the CSS transform when the offset moved,
    /// and whether more frames are needed to get there.
    pub fn step(&mut self, scroll_y: f64, tuning: &ParallaxTuning) -> (Option<String>, bool) {
        if self.is_static() {
            return (None, false);
        }

        let target = Self::target(scroll_y, self.speed);
        let remaining = target - self.offset;

        if remaining.abs() <= tuning.epsilon {
            if remaining == 0.0 {
                return (None, false);
            }
            self.offset = target;
            return (Some(self.transform()), false);
        }

        self.offset += remaining * tuning.smoothing.clamp(0.0, 1.0);
        let settled = (target - self.offset).abs() <= tuning.epsilon;
        if settled {
            self.offset = target;
        }

        (Some(self.transform()), !settled)
    }

    pub fn transform(&self) -> String {
        format!("translateY({:.2}px)", self.offset)
    }
}

/// Coalesces scroll events into at most one pending animation frame.
#[derive(Debug, Default)]
pub struct FrameGate {
    pending: bool,
}

impl FrameGate {
    /// True when the caller should request a frame.
    pub fn request(&mut self) -> bool {
        !std::mem::replace(&mut self.pending, true)
    }

    pub fn release(&mut self) {
        self.pending = false;
    }
}
