//! Per-side cooldown for gesture-triggered scoring

use super::Side;

/// Default minimum gap between two accepted gestures on one side
pub const GESTURE_COOLDOWN_MS: u64 = 1200;

/// Suppresses repeated scoring while a gesture is held across frames
#[derive(Debug, Clone)]
pub struct GestureDebouncer {
    cooldown_ms: u64,
    /// Last accepted time per side; `None` until a gesture is accepted
    left: Option<u64>,
    right: Option<u64>,
}

impl GestureDebouncer {
    pub fn new(cooldown_ms: u64) -> Self {
        Self {
            cooldown_ms,
            left: None,
            right: None,
        }
    }

    fn last_accepted_mut(&mut self, side: Side) -> &mut Option<u64> {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    /// Accept the gesture and start a new cooldown, or reject it untouched
    pub fn should_accept(&mut self, side: Side, now_ms: u64) -> bool {
        let cooldown_ms = self.cooldown_ms;
        let last = self.last_accepted_mut(side);

        if let Some(previous) = *last {
            if now_ms.saturating_sub(previous) < cooldown_ms {
                return false;
            }
        }

        *last = Some(now_ms);
        true
    }

    /// Forget both sides' cooldowns
    pub fn reset(&mut self) {
        self.left = None;
        self.right = None;
    }
}

impl Default for GestureDebouncer {
    fn default() -> Self {
        Self::new(GESTURE_COOLDOWN_MS)
    }
}
