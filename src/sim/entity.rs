//! Level entities: trigger circles and scripted line movers
//!
//! Scripted motion is a tagged variant evaluated as a pure function of the
//! tick time, so a mover's position never depends on how often it was asked
//! (replay determinism) and movers compose with a timing window instead of
//! inheriting from it.

use std::f32::consts::TAU;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::collision::{CollisionSystem, DynamicLineId};

/// What touching an entity means to the game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    /// End of level, only armed once every `MustCollect` is taken
    Finish,
    /// Must be collected before the finish arms
    MustCollect,
    /// Touching this kills the rider
    Death,
}

/// A circular trigger placed in the level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub pos: Vec2,
    pub radius: f32,
}

impl Entity {
    pub fn new(kind: EntityKind, pos: Vec2, radius: f32) -> Self {
        Self { kind, pos, radius }
    }

    /// Does a disk at `p` with radius `r` overlap this trigger?
    pub fn is_touched(&self, p: Vec2, r: f32) -> bool {
        let reach = self.radius + r;
        (p - self.pos).length_squared() <= reach * reach
    }
}

/// Tick window during which a mover is live; outside it the mover holds the
/// position it had at the nearest window edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveWindow {
    pub start_tick: u32,
    pub end_tick: u32,
}

impl MoveWindow {
    pub fn new(start_tick: u32, end_tick: u32) -> Self {
        Self {
            start_tick,
            end_tick,
        }
    }

    /// A window that never closes
    pub fn always() -> Self {
        Self {
            start_tick: 0,
            end_tick: u32::MAX,
        }
    }

    /// Clamp a tick into the live range
    pub fn clamp(&self, tick: u32) -> u32 {
        tick.clamp(self.start_tick, self.end_tick)
    }
}

/// One kind of scripted motion, parameterized by period in seconds.
///
/// All variants are evaluated at an absolute time `t`, never incrementally.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Motion {
    /// Orbit on a circle of `radius`, starting at `initial_angle`; the
    /// orbit center is wherever the base position puts it
    Rotation {
        radius: f32,
        initial_angle: f32,
        period: f32,
    },
    /// Oscillate along `delta` and back, one round trip per period
    Translation { delta: Vec2, period: f32 },
    /// Spin in place around the shape's own midpoint
    SelfRotation { period: f32 },
}

impl Motion {
    /// Translation offset of the shape's reference point at time `t`.
    ///
    /// Zero at `t = 0` for every variant, so registering a mover never
    /// teleports its line.
    pub fn offset_at(&self, t: f32) -> Vec2 {
        match *self {
            Motion::Rotation {
                radius,
                initial_angle,
                period,
            } => {
                if period == 0.0 {
                    return Vec2::ZERO;
                }
                let angle = initial_angle + TAU * t / period;
                (Vec2::from_angle(angle) - Vec2::from_angle(initial_angle)) * radius
            }
            Motion::Translation { delta, period } => {
                if period == 0.0 {
                    return Vec2::ZERO;
                }
                // triangle wave: out along delta, then back
                let phase = (t / period).rem_euclid(1.0);
                let f = if phase < 0.5 { phase * 2.0 } else { 2.0 - phase * 2.0 };
                delta * f
            }
            Motion::SelfRotation { .. } => Vec2::ZERO,
        }
    }

    /// Spin of the shape around its own midpoint at time `t`
    pub fn spin_at(&self, t: f32) -> f32 {
        match *self {
            Motion::SelfRotation { period } if period != 0.0 => TAU * t / period,
            _ => 0.0,
        }
    }
}

/// Drives one dynamic collision line along a [`Motion`] inside a
/// [`MoveWindow`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineMover {
    pub line: DynamicLineId,
    /// Endpoints at registration time, the motion's frame of reference
    pub base_p1: Vec2,
    pub base_p2: Vec2,
    pub motion: Motion,
    pub window: MoveWindow,
}

impl LineMover {
    pub fn new(
        line: DynamicLineId,
        base_p1: Vec2,
        base_p2: Vec2,
        motion: Motion,
        window: MoveWindow,
    ) -> Self {
        Self {
            line,
            base_p1,
            base_p2,
            motion,
            window,
        }
    }

    /// Endpoints at simulation tick `tick` (holds at the window edges)
    pub fn endpoints_at(&self, tick: u32, dt: f32) -> (Vec2, Vec2) {
        let live = self.window.clamp(tick) - self.window.start_tick;
        let t = live as f32 * dt;

        let offset = self.motion.offset_at(t);
        let spin = self.motion.spin_at(t);
        if spin == 0.0 {
            return (self.base_p1 + offset, self.base_p2 + offset);
        }

        let mid = (self.base_p1 + self.base_p2) * 0.5;
        let rot = Vec2::from_angle(spin);
        (
            mid + offset + rot.rotate(self.base_p1 - mid),
            mid + offset + rot.rotate(self.base_p2 - mid),
        )
    }

    /// Write this tick's endpoints into the collision system
    pub fn apply(&self, tick: u32, dt: f32, collision: &mut CollisionSystem) {
        let (p1, p2) = self.endpoints_at(tick, dt);
        collision.move_dynamic_line(self.line, p1, p2);
    }
}
