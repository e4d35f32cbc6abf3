//! Physics tuning parameters
//!
//! Every constant that shapes how the bike rides lives here so a level pack
//! can ship its own feel. Serialized as JSON; the defaults are the values the
//! simulation was tuned against. Changing any of them changes trajectories,
//! so replays only make sense against the parameter set they were recorded
//! with.

use std::fs;
use std::io;
use std::path::Path;

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// World and contact-solver parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsParams {
    /// Gravitational acceleration (negative y is down)
    pub gravity: Vec2,
    /// Fraction of penetration corrected per tick (error reduction)
    pub contact_bias: f32,
    /// Penetration tolerated before positional correction kicks in
    pub contact_slop: f32,
    /// Bounciness of wheel-ground contacts
    pub elasticity: f32,
    /// Approach speeds below this produce no bounce at all
    pub restitution_threshold: f32,
    /// Scales line grip into the solver's friction coefficient
    pub friction_scale: f32,
}

impl Default for PhysicsParams {
    fn default() -> Self {
        Self {
            gravity: Vec2::new(0.0, -9.81),
            contact_bias: 0.3,
            contact_slop: 0.005,
            elasticity: 0.0,
            restitution_threshold: 1.0,
            friction_scale: 0.05,
        }
    }
}

/// Bike geometry and drive-train parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BikeParams {
    // Geometry
    pub wheel_radius: f32,
    pub wheel_base: f32,
    /// Chassis center of mass height above the wheel axles; together with
    /// the wheel base this fixes the chassis-local suspension anchors
    pub mass_elevation: f32,
    /// Head/torso safety segment, chassis-local endpoints
    pub safety_line: (Vec2, Vec2),

    // Masses
    pub wheel_mass: f32,
    pub frame_mass: f32,
    pub inertial_length: f32,
    pub inertial_height: f32,

    // Drive train
    pub max_engine: f32,
    pub engine_damp: f32,
    pub brake_factor: f32,
    pub roll_resist: f32,
    pub roll_resist_max: f32,
    pub max_roll_velocity: f32,

    // Rider
    pub rider_attitude_torque: f32,
    /// Per-tick decay applied to the attitude torque
    pub attitude_defactor: f32,

    // Suspension joints
    pub suspension_bias: f32,
    pub suspension_softness: f32,

    /// Wheel grip against level lines
    pub wheel_grip: f32,
}

impl Default for BikeParams {
    fn default() -> Self {
        Self {
            wheel_radius: 0.35,
            wheel_base: 1.4,
            mass_elevation: 0.9,
            safety_line: (Vec2::new(-0.2, 1.1), Vec2::new(0.3, 0.45)),

            wheel_mass: 10.0,
            frame_mass: 90.0,
            inertial_length: 1.2,
            inertial_height: 1.8,

            max_engine: 1400.0,
            engine_damp: 0.4,
            brake_factor: 80.0,
            roll_resist: 1.0,
            roll_resist_max: 20.0,
            max_roll_velocity: 60.0,

            rider_attitude_torque: 10000.0,
            attitude_defactor: 0.75,

            suspension_bias: 0.2,
            suspension_softness: 0.0005,

            wheel_grip: 20.0,
        }
    }
}

/// Full tuning set, persisted as one document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Params {
    pub physics: PhysicsParams,
    pub bike: BikeParams,
}

impl Params {
    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let json = fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(io::Error::other)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        fs::write(path, json)
    }
}
