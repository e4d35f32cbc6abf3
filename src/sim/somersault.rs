//! Full-rotation (trick) counter
//!
//! Derived telemetry over the chassis angle: feed the current angle once per
//! tick and the counter reports the tick a full somersault completes.

use std::f32::consts::TAU;

use crate::angle_delta;

/// Angle deltas smaller than this are treated as jitter and ignored
const NOISE_THRESHOLD: f32 = 0.05;

/// Tracks completed clockwise/counterclockwise rotations of an angle signal
#[derive(Debug, Clone, Default)]
pub struct SomersaultCounter {
    last_angle: f32,
    /// Signed displacement accumulated since the window last reset
    accumulated: f32,
    window_min: f32,
    window_max: f32,
    clockwise: u32,
    counterclockwise: u32,
    primed: bool,
}

impl SomersaultCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget all progress and counts
    pub fn init(&mut self) {
        *self = Self::default();
    }

    /// Completed rotations with positive (counterclockwise) angle deltas
    pub fn counterclockwise_count(&self) -> u32 {
        self.counterclockwise
    }

    /// Completed rotations the other way round
    pub fn clockwise_count(&self) -> u32 {
        self.clockwise
    }

    /// Feed the current tick's angle (radians, any range).
    ///
    /// Returns `Some(counterclockwise)` exactly on the tick a full rotation
    /// completes; the direction is the sign of the triggering delta.
    pub fn update(&mut self, angle: f32) -> Option<bool> {
        if !self.primed {
            self.last_angle = angle;
            self.primed = true;
            return None;
        }

        let delta = angle_delta(self.last_angle, angle);
        self.last_angle = angle;
        if delta.abs() < NOISE_THRESHOLD {
            return None;
        }

        self.accumulated += delta;
        self.window_min = self.window_min.min(self.accumulated);
        self.window_max = self.window_max.max(self.accumulated);

        if self.window_max - self.window_min >= TAU {
            let counterclockwise = delta > 0.0;
            if counterclockwise {
                self.counterclockwise += 1;
            } else {
                self.clockwise += 1;
            }
            self.accumulated = 0.0;
            self.window_min = 0.0;
            self.window_max = 0.0;
            return Some(counterclockwise);
        }
        None
    }
}
