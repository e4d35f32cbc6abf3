//! The motorbike: chassis, two wheels, two suspension pins
//!
//! The bike composes three bodies in the solver. Wheels are pinned to
//! chassis-local anchors; suspension travel comes from the joints'
//! bias/softness, the pins themselves are never broken. Drive and brake are
//! torques on the wheel bodies, rider lean is a decaying torque on the
//! chassis.

use glam::Vec2;

use super::collision::{CollisionSystem, Contact};
use super::solver::{box_inertia, disc_inertia, Body, BodyId, JointId, PinJoint, Solver, SolverError};
use crate::consts::MAX_CONTACTS;
use crate::input::ControlState;
use crate::params::BikeParams;

/// Attitude torque magnitudes below this snap to zero
const ATTITUDE_EPSILON: f32 = 100.0;

/// Which wheel, in solver insertion order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wheel {
    Rear = 0,
    Front = 1,
}

/// Which way the bike points; drive torque goes to the wheel that is
/// currently at the back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    Right,
    Left,
}

impl Facing {
    fn sign(self) -> f32 {
        match self {
            Facing::Right => 1.0,
            Facing::Left => -1.0,
        }
    }
}

/// Chassis + wheels + suspension joints, plus the drive-train state
pub struct Bike {
    params: BikeParams,
    chassis: BodyId,
    wheels: [BodyId; 2],
    joints: [JointId; 2],
    facing: Facing,
    /// Rider lean torque, decays every tick
    attitude: f32,
    /// Earliest tick another lean input is accepted
    next_attitude_tick: u32,
    /// Ground contact per wheel as of the last contact collection
    touching: [bool; 2],
}

impl Bike {
    /// Create the three bodies and two suspension pins at `start`, the point
    /// on the ground midway between the wheel axles.
    pub fn spawn(solver: &mut Solver, start: Vec2, params: &BikeParams) -> Result<Self, SolverError> {
        let half_base = params.wheel_base * 0.5;
        // chassis-local wheel rest positions, where the pins hold them
        let rear_anchor = Vec2::new(-half_base, -params.mass_elevation);
        let front_anchor = Vec2::new(half_base, -params.mass_elevation);

        let chassis = solver.add_body(Body::dynamic(
            params.frame_mass,
            box_inertia(params.frame_mass, params.inertial_length, params.inertial_height),
            start + Vec2::new(0.0, params.mass_elevation),
        ));
        let wheel_inertia = disc_inertia(params.wheel_mass, params.wheel_radius);
        let rear = solver.add_body(Body::dynamic(
            params.wheel_mass,
            wheel_inertia,
            start + Vec2::new(-half_base, 0.0),
        ));
        let front = solver.add_body(Body::dynamic(
            params.wheel_mass,
            wheel_inertia,
            start + Vec2::new(half_base, 0.0),
        ));

        let rear_joint = solver.add_joint(PinJoint::new(
            chassis,
            rear,
            rear_anchor,
            Vec2::ZERO,
            params.suspension_bias,
            params.suspension_softness,
        ))?;
        let front_joint = solver.add_joint(PinJoint::new(
            chassis,
            front,
            front_anchor,
            Vec2::ZERO,
            params.suspension_bias,
            params.suspension_softness,
        ))?;

        Ok(Self {
            params: params.clone(),
            chassis,
            wheels: [rear, front],
            joints: [rear_joint, front_joint],
            facing: Facing::Right,
            attitude: 0.0,
            next_attitude_tick: 0,
            touching: [false; 2],
        })
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    pub fn chassis_id(&self) -> BodyId {
        self.chassis
    }

    pub fn wheel_id(&self, wheel: Wheel) -> BodyId {
        self.wheels[wheel as usize]
    }

    pub fn joint_ids(&self) -> [JointId; 2] {
        self.joints
    }

    /// Ground contact per wheel, `[rear, front]`, as of the last
    /// [`collect_contacts`](Self::collect_contacts)
    pub fn touching(&self) -> [bool; 2] {
        self.touching
    }

    /// Mirror the facing direction; drive torque moves to the other wheel
    pub fn flip_direction(&mut self) {
        self.facing = match self.facing {
            Facing::Right => Facing::Left,
            Facing::Left => Facing::Right,
        };
    }

    /// Turn the tick's control state into forces and torques.
    ///
    /// Runs before the solver step so the torques take effect this tick.
    pub fn apply_controls(&mut self, solver: &mut Solver, control: ControlState, tick: u32) {
        let p = &self.params;
        let dir = self.facing.sign();
        // the wheel at the back receives engine torque
        let drive_wheel = match self.facing {
            Facing::Right => self.wheels[Wheel::Rear as usize],
            Facing::Left => self.wheels[Wheel::Front as usize],
        };

        // engine: torque spins the drive wheel toward forward travel, cut
        // off once the wheel already rolls at the velocity cap
        let drive = control.drive_amount();
        if drive > 0.0 {
            let ang_vel = solver.body(drive_wheel).map_or(0.0, |b| b.ang_vel);
            if ang_vel * -dir < p.max_roll_velocity {
                if let Some(body) = solver.body_mut(drive_wheel) {
                    body.apply_torque(-dir * p.max_engine * p.engine_damp * drive);
                }
            }
        }

        // brake and rolling resistance, both wheels
        for &wheel in &self.wheels {
            let Some(body) = solver.body_mut(wheel) else {
                continue;
            };
            let ang_vel = body.ang_vel;
            if control.brake() {
                body.apply_torque(-ang_vel * p.brake_factor);
            }
            let resist = if ang_vel.abs() < p.max_roll_velocity {
                p.roll_resist
            } else {
                p.roll_resist_max
            };
            body.apply_torque(-ang_vel * resist);
        }

        // rider lean: a fresh burst is accepted after the previous one had
        // time to act, then the stored torque decays toward zero
        let pull = control.pull_amount();
        if pull != 0.0 && tick >= self.next_attitude_tick {
            self.attitude = pull * p.rider_attitude_torque;
            self.next_attitude_tick = tick + (0.6 * pull.abs() * crate::consts::TICK_RATE as f32) as u32;
        }
        if self.attitude != 0.0 {
            if let Some(body) = solver.body_mut(self.chassis) {
                body.apply_torque(self.attitude);
            }
            self.attitude *= p.attitude_defactor;
            if self.attitude.abs() < ATTITUDE_EPSILON {
                self.attitude = 0.0;
            }
        }
    }

    /// Query both wheels against the level and append this tick's contact
    /// constraints. Returns the per-wheel touch flags `[rear, front]`.
    ///
    /// A wheel overlapping two non-parallel lines yields two simultaneous
    /// contacts; all of them go to the solver, which reconciles them over
    /// its iterations.
    pub fn collect_contacts(
        &mut self,
        solver: &Solver,
        collision: &CollisionSystem,
        contacts: &mut Vec<(BodyId, Contact)>,
    ) -> [bool; 2] {
        let mut touching = [false; 2];
        let mut buf: Vec<Contact> = Vec::with_capacity(MAX_CONTACTS);
        for (i, &wheel) in self.wheels.iter().enumerate() {
            let Some(body) = solver.body(wheel) else {
                continue;
            };
            buf.clear();
            collision.collide_circle(body.pos.x, body.pos.y, self.params.wheel_radius, &mut buf, MAX_CONTACTS);
            touching[i] = !buf.is_empty();
            contacts.extend(buf.iter().map(|c| (wheel, *c)));
        }
        self.touching = touching;
        touching
    }

    /// Does the rider's head/torso segment cross level geometry?
    pub fn check_safety_line(&self, solver: &Solver, collision: &CollisionSystem) -> bool {
        let Some(chassis) = solver.body(self.chassis) else {
            return false;
        };
        let (mut a, mut b) = self.params.safety_line;
        if self.facing == Facing::Left {
            a.x = -a.x;
            b.x = -b.x;
        }
        let wa = chassis.local_to_world(a);
        let wb = chassis.local_to_world(b);
        collision.check_line(wa.x, wa.y, wb.x, wb.y)
    }

    /// World positions of `[rear, front]` wheel centers
    pub fn wheel_positions(&self, solver: &Solver) -> [Vec2; 2] {
        let mut out = [Vec2::ZERO; 2];
        for (i, &wheel) in self.wheels.iter().enumerate() {
            if let Some(body) = solver.body(wheel) {
                out[i] = body.pos;
            }
        }
        out
    }

    /// Chassis world position and orientation
    pub fn chassis_transform(&self, solver: &Solver) -> (Vec2, f32) {
        solver
            .body(self.chassis)
            .map_or((Vec2::ZERO, 0.0), |b| (b.pos, b.angle))
    }
}
