/// Page events that count as a user gesture for unlocking audio.
pub const GESTURES: [&str; 4] = ["click", "pointerdown", "touchstart", "keydown"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnlockState {
    Locked,
    /// The first `play()` was issued.
    Starting,
    /// The first `play()` was rejected, the element was reloaded and one retry is scheduled.
    Retrying,
    Playing,
    /// The retry was rejected as well. No further attempts.
    Failed,
}

/// One-shot background audio start behind the first user gesture.
#[derive(Debug)]
pub struct AudioUnlock {
    state: UnlockState,
}

impl Default for AudioUnlock {
    fn default() -> Self {
        Self {
            state: UnlockState::Locked,
        }
    }
}

impl AudioUnlock {
    pub fn state(&self) -> UnlockState {
        self.state
    }

    /// True exactly once, for the gesture that should start playback.
    pub fn on_gesture(&mut self) -> bool {
        if self.state != UnlockState::Locked {
            return false;
        }

        self.state = UnlockState::Starting;
        true
    }

    /// Feeds back the outcome of a `play()`. Returns true when a retry should be scheduled.
    pub fn on_play_result(&mut self, ok: bool) -> bool {
        self.state = match (self.state, ok) {
            (_, true) => UnlockState::Playing,
            (UnlockState::Starting, false) => UnlockState::Retrying,
            (_, false) => UnlockState::Failed,
        };

        self.state == UnlockState::Retrying
    }
}
