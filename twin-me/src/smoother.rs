//! Frame-rate independent smoothing of blend parameters.

use std::time::Duration;
use twin_core::AnimationConfig;
use twin_spk::BlendShapes;

/// Moves the visible pose toward a target with exponential smoothing.
///
/// Each step covers `clamp(dt * rate, 0, 1)` of the remaining distance, so the
/// pose never overshoots. A parameter within `epsilon` of its target snaps
/// onto it.
#[derive(Debug, Clone)]
pub struct BlendSmoother {
    current: BlendShapes,
    rate: f32,
    epsilon: f32,
}

impl BlendSmoother {
    pub fn new(rate: f32, epsilon: f32) -> Self {
        Self {
            current: BlendShapes::NEUTRAL,
            rate: if rate.is_finite() { rate.max(0.0) } else { 0.0 },
            epsilon: if epsilon.is_finite() { epsilon.max(0.0) } else { 0.0 },
        }
    }

    pub fn from_config(config: &AnimationConfig) -> Self {
        Self::new(config.smoothing_rate, config.settle_epsilon)
    }

    /// Advance one tick toward `target` and return the new pose.
    pub fn step(&mut self, target: BlendShapes, dt: Duration) -> BlendShapes {
        let factor = (dt.as_secs_f32() * self.rate).clamp(0.0, 1.0);
        let target = target.clamped();
        let current = self.current.to_array();
        let goal = target.to_array();

        let mut next = [0.0f32; 3];
        for i in 0..3 {
            let value = current[i] + (goal[i] - current[i]) * factor;
            next[i] = if (goal[i] - value).abs() < self.epsilon {
                goal[i]
            } else {
                value
            };
        }

        self.current = BlendShapes::from_array(next);
        self.current
    }

    pub fn current(&self) -> BlendShapes {
        self.current
    }

    pub fn is_neutral(&self) -> bool {
        self.current.is_neutral()
    }

    /// Jump straight to neutral without decay.
    pub fn reset(&mut self) {
        self.current = BlendShapes::NEUTRAL;
    }
}
