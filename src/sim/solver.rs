//! Rigid bodies, pin joints and the iterative impulse solver
//!
//! The solver runs a fixed per-tick pipeline: integrate forces into
//! velocities, resolve joint and contact constraints with a fixed number of
//! sequential-impulse iterations, then integrate velocities into positions.
//! The iteration count never adapts to convergence: identical inputs must
//! produce identical results for replays to stay bit-exact.
//!
//! Bodies and joints live in slot vectors so handles stay valid and the
//! iteration order is stable regardless of removals.

use glam::Vec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::collision::Contact;
use crate::params::PhysicsParams;

/// Handle to a body in a [`Solver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BodyId(u32);

/// Handle to a joint in a [`Solver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JointId(u32);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SolverError {
    #[error("body handle does not refer to a live body")]
    UnknownBody,
    #[error("joint handle does not refer to a live joint")]
    UnknownJoint,
    #[error("body is still referenced by a joint")]
    BodyInUse,
    #[error("joint must connect two distinct bodies")]
    DegenerateJoint,
}

/// A rigid body.
///
/// Inverse mass and inverse moment of inertia are the stored quantities: a
/// zero inverse marks an immovable body and no impulse is ever divided by a
/// mass at solve time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Body {
    pub inv_mass: f32,
    pub inv_inertia: f32,
    pub pos: Vec2,
    pub vel: Vec2,
    pub angle: f32,
    pub ang_vel: f32,
    /// Force accumulator, cleared after each step
    #[serde(skip)]
    pub force: Vec2,
    /// Torque accumulator, cleared after each step
    #[serde(skip)]
    pub torque: f32,
}

impl Body {
    /// Dynamic body from mass and moment of inertia
    pub fn dynamic(mass: f32, inertia: f32, pos: Vec2) -> Self {
        Self {
            inv_mass: 1.0 / mass,
            inv_inertia: 1.0 / inertia,
            pos,
            vel: Vec2::ZERO,
            angle: 0.0,
            ang_vel: 0.0,
            force: Vec2::ZERO,
            torque: 0.0,
        }
    }

    /// Immovable anchor body
    pub fn fixed(pos: Vec2) -> Self {
        Self {
            inv_mass: 0.0,
            inv_inertia: 0.0,
            pos,
            vel: Vec2::ZERO,
            angle: 0.0,
            ang_vel: 0.0,
            force: Vec2::ZERO,
            torque: 0.0,
        }
    }

    #[inline]
    pub fn is_fixed(&self) -> bool {
        self.inv_mass == 0.0
    }

    #[inline]
    pub fn apply_force(&mut self, force: Vec2) {
        self.force += force;
    }

    #[inline]
    pub fn apply_torque(&mut self, torque: f32) {
        self.torque += torque;
    }

    /// Apply an impulse at offset `r` from the center of mass
    #[inline]
    pub fn apply_impulse(&mut self, impulse: Vec2, r: Vec2) {
        self.vel += impulse * self.inv_mass;
        self.ang_vel += self.inv_inertia * r.perp_dot(impulse);
    }

    /// Velocity of the material point at offset `r` from the center of mass
    #[inline]
    pub fn velocity_at(&self, r: Vec2) -> Vec2 {
        self.vel + Vec2::new(-r.y, r.x) * self.ang_vel
    }

    /// Rotate a local offset into world orientation
    #[inline]
    pub fn rotate(&self, local: Vec2) -> Vec2 {
        let (sin, cos) = self.angle.sin_cos();
        Vec2::new(local.x * cos - local.y * sin, local.x * sin + local.y * cos)
    }

    /// Transform a local point into world space
    #[inline]
    pub fn local_to_world(&self, local: Vec2) -> Vec2 {
        self.pos + self.rotate(local)
    }
}

/// Moment of inertia of a solid disc
pub fn disc_inertia(mass: f32, radius: f32) -> f32 {
    0.5 * mass * radius * radius
}

/// Moment of inertia of a solid box
pub fn box_inertia(mass: f32, width: f32, height: f32) -> f32 {
    mass * (width * width + height * height) / 12.0
}

/// Pin constraint: the world-space images of `anchor_a` (local to body a)
/// and `anchor_b` (local to body b) are held coincident.
///
/// `bias_factor` is the fraction of positional error corrected per tick;
/// `softness` mixes compliance into the effective mass, which is where
/// suspension springiness comes from: the pin is never broken.
#[derive(Debug, Clone)]
pub struct PinJoint {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub anchor_a: Vec2,
    pub anchor_b: Vec2,
    pub bias_factor: f32,
    pub softness: f32,
    // per-tick solve state
    r_a: Vec2,
    r_b: Vec2,
    // inverse effective mass, row-major 2x2
    inv_k: [f32; 4],
    bias: Vec2,
    accumulated: Vec2,
}

impl PinJoint {
    pub fn new(
        body_a: BodyId,
        body_b: BodyId,
        anchor_a: Vec2,
        anchor_b: Vec2,
        bias_factor: f32,
        softness: f32,
    ) -> Self {
        Self {
            body_a,
            body_b,
            anchor_a,
            anchor_b,
            bias_factor,
            softness,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            inv_k: [0.0; 4],
            bias: Vec2::ZERO,
            accumulated: Vec2::ZERO,
        }
    }

    fn pre_step(&mut self, a: &Body, b: &Body, dt: f32) {
        self.r_a = a.rotate(self.anchor_a);
        self.r_b = b.rotate(self.anchor_b);

        // K = (1/ma + 1/mb) I + 1/Ia [ra.y² -ra.x*ra.y; …] + 1/Ib [...] + softness I
        let k11 = a.inv_mass
            + b.inv_mass
            + a.inv_inertia * self.r_a.y * self.r_a.y
            + b.inv_inertia * self.r_b.y * self.r_b.y
            + self.softness;
        let k12 = -a.inv_inertia * self.r_a.x * self.r_a.y - b.inv_inertia * self.r_b.x * self.r_b.y;
        let k22 = a.inv_mass
            + b.inv_mass
            + a.inv_inertia * self.r_a.x * self.r_a.x
            + b.inv_inertia * self.r_b.x * self.r_b.x
            + self.softness;

        let det = k11 * k22 - k12 * k12;
        let inv_det = if det != 0.0 { 1.0 / det } else { 0.0 };
        self.inv_k = [k22 * inv_det, -k12 * inv_det, -k12 * inv_det, k11 * inv_det];

        let separation = (b.pos + self.r_b) - (a.pos + self.r_a);
        self.bias = separation * (-self.bias_factor / dt);
        self.accumulated = Vec2::ZERO;
    }

    fn solve(&mut self, a: &mut Body, b: &mut Body) {
        let dv = b.velocity_at(self.r_b) - a.velocity_at(self.r_a);
        let rhs = self.bias - dv - self.accumulated * self.softness;
        let impulse = Vec2::new(
            self.inv_k[0] * rhs.x + self.inv_k[1] * rhs.y,
            self.inv_k[2] * rhs.x + self.inv_k[3] * rhs.y,
        );

        a.apply_impulse(-impulse, self.r_a);
        b.apply_impulse(impulse, self.r_b);
        self.accumulated += impulse;
    }

    /// Current world-space anchor separation, for invariant checks
    pub fn anchor_separation(&self, a: &Body, b: &Body) -> f32 {
        (b.local_to_world(self.anchor_b) - a.local_to_world(self.anchor_a)).length()
    }
}

/// One-tick contact constraint between a body and static level geometry
struct ContactConstraint {
    body: BodyId,
    normal: Vec2,
    r: Vec2,
    mass_normal: f32,
    mass_tangent: f32,
    bias: f32,
    velocity_bias: f32,
    friction: f32,
    jn_acc: f32,
    jt_acc: f32,
}

impl ContactConstraint {
    fn pre_step(id: BodyId, body: &Body, contact: &Contact, params: &PhysicsParams, dt: f32) -> Self {
        let n = contact.normal;
        let t = Vec2::new(-n.y, n.x);
        let r = contact.point - body.pos;

        let rn = r.dot(n);
        let k_normal = body.inv_mass + body.inv_inertia * (r.dot(r) - rn * rn);
        let rt = r.dot(t);
        let k_tangent = body.inv_mass + body.inv_inertia * (r.dot(r) - rt * rt);

        let bias = params.contact_bias / dt * (contact.depth - params.contact_slop).max(0.0);

        // restitution from the approach speed before solving
        let vn = body.velocity_at(r).dot(n);
        let velocity_bias = if vn < -params.restitution_threshold {
            -params.elasticity * vn
        } else {
            0.0
        };

        Self {
            body: id,
            normal: n,
            r,
            mass_normal: if k_normal > 0.0 { 1.0 / k_normal } else { 0.0 },
            mass_tangent: if k_tangent > 0.0 { 1.0 / k_tangent } else { 0.0 },
            bias,
            velocity_bias,
            friction: contact.grip * params.friction_scale,
            jn_acc: 0.0,
            jt_acc: 0.0,
        }
    }

    fn solve(&mut self, body: &mut Body) {
        let n = self.normal;
        let t = Vec2::new(-n.y, n.x);

        // normal impulse, accumulated and clamped to be repulsive only
        let vn = body.velocity_at(self.r).dot(n);
        let d_jn = self.mass_normal * (-vn + self.bias.max(self.velocity_bias));
        let jn_new = (self.jn_acc + d_jn).max(0.0);
        let d_jn = jn_new - self.jn_acc;
        self.jn_acc = jn_new;
        body.apply_impulse(n * d_jn, self.r);

        // friction impulse, clamped by the friction cone
        let vt = body.velocity_at(self.r).dot(t);
        let d_jt = self.mass_tangent * -vt;
        let max_jt = self.friction * self.jn_acc;
        let jt_new = (self.jt_acc + d_jt).clamp(-max_jt, max_jt);
        let d_jt = jt_new - self.jt_acc;
        self.jt_acc = jt_new;
        body.apply_impulse(t * d_jt, self.r);
    }
}

/// The rigid-body world: bodies, joints and the per-tick solve pipeline
pub struct Solver {
    bodies: Vec<Option<Body>>,
    joints: Vec<Option<PinJoint>>,
    gravity: Vec2,
    iterations: u32,
}

impl Solver {
    pub fn new(gravity: Vec2, iterations: u32) -> Self {
        Self {
            bodies: Vec::new(),
            joints: Vec::new(),
            gravity,
            iterations,
        }
    }

    pub fn add_body(&mut self, body: Body) -> BodyId {
        let id = BodyId(self.bodies.len() as u32);
        self.bodies.push(Some(body));
        id
    }

    /// Remove a body. Fails while any joint still references it: a joint
    /// over a dead body would silently corrupt the simulation.
    pub fn remove_body(&mut self, id: BodyId) -> Result<(), SolverError> {
        let slot = self
            .bodies
            .get(id.0 as usize)
            .ok_or(SolverError::UnknownBody)?;
        if slot.is_none() {
            return Err(SolverError::UnknownBody);
        }
        let referenced = self
            .joints
            .iter()
            .flatten()
            .any(|j| j.body_a == id || j.body_b == id);
        if referenced {
            return Err(SolverError::BodyInUse);
        }
        self.bodies[id.0 as usize] = None;
        Ok(())
    }

    pub fn add_joint(&mut self, joint: PinJoint) -> Result<JointId, SolverError> {
        if joint.body_a == joint.body_b {
            return Err(SolverError::DegenerateJoint);
        }
        if self.body(joint.body_a).is_none() || self.body(joint.body_b).is_none() {
            return Err(SolverError::UnknownBody);
        }
        let id = JointId(self.joints.len() as u32);
        self.joints.push(Some(joint));
        Ok(id)
    }

    pub fn remove_joint(&mut self, id: JointId) -> Result<(), SolverError> {
        match self.joints.get_mut(id.0 as usize) {
            Some(slot) if slot.is_some() => {
                *slot = None;
                Ok(())
            }
            _ => Err(SolverError::UnknownJoint),
        }
    }

    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(id.0 as usize).and_then(|b| b.as_ref())
    }

    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        self.bodies.get_mut(id.0 as usize).and_then(|b| b.as_mut())
    }

    pub fn joint(&self, id: JointId) -> Option<&PinJoint> {
        self.joints.get(id.0 as usize).and_then(|j| j.as_ref())
    }

    /// Advance the whole system by exactly `dt`.
    ///
    /// `dt` must be the engine's fixed tick; `contacts` are this tick's
    /// fresh manifolds, one `(body, contact)` pair each, and are consumed
    /// here. Nothing persists to the next call.
    pub fn step(&mut self, dt: f32, contacts: &[(BodyId, Contact)], params: &PhysicsParams) {
        debug_assert!(dt > 0.0);

        // forces -> velocities
        for body in self.bodies.iter_mut().flatten() {
            if body.is_fixed() {
                body.force = Vec2::ZERO;
                body.torque = 0.0;
                continue;
            }
            body.vel += (self.gravity + body.force * body.inv_mass) * dt;
            body.ang_vel += body.torque * body.inv_inertia * dt;
        }

        // constraint setup
        for joint in self.joints.iter_mut().flatten() {
            let (a, b) = two_bodies(&self.bodies, joint.body_a, joint.body_b);
            joint.pre_step(a, b, dt);
        }

        let mut contact_constraints: Vec<ContactConstraint> = Vec::with_capacity(contacts.len());
        for (id, contact) in contacts {
            let Some(body) = self.body(*id) else {
                continue;
            };
            if body.is_fixed() {
                continue;
            }
            contact_constraints.push(ContactConstraint::pre_step(*id, body, contact, params, dt));
        }

        // fixed-count Gauss-Seidel impulse iterations
        for _ in 0..self.iterations {
            for joint in self.joints.iter_mut().flatten() {
                let (a, b) = two_bodies_mut(&mut self.bodies, joint.body_a, joint.body_b);
                joint.solve(a, b);
            }
            for c in &mut contact_constraints {
                if let Some(body) = self.bodies[c.body.0 as usize].as_mut() {
                    c.solve(body);
                }
            }
        }

        // velocities -> positions
        for body in self.bodies.iter_mut().flatten() {
            if body.is_fixed() {
                continue;
            }
            body.pos += body.vel * dt;
            body.angle += body.ang_vel * dt;
            body.force = Vec2::ZERO;
            body.torque = 0.0;
        }
    }
}

/// Shared borrows of two distinct live bodies
fn two_bodies(bodies: &[Option<Body>], a: BodyId, b: BodyId) -> (&Body, &Body) {
    match (bodies[a.0 as usize].as_ref(), bodies[b.0 as usize].as_ref()) {
        (Some(a), Some(b)) => (a, b),
        _ => panic!("joint references a removed body"),
    }
}

/// Mutable borrows of two distinct live bodies
fn two_bodies_mut(bodies: &mut [Option<Body>], a: BodyId, b: BodyId) -> (&mut Body, &mut Body) {
    let (ai, bi) = (a.0 as usize, b.0 as usize);
    assert_ne!(ai, bi, "joint references the same body twice");
    let (first, second, swap) = if ai < bi { (ai, bi, false) } else { (bi, ai, true) };
    let (lo, hi) = bodies.split_at_mut(second);
    match (lo[first].as_mut(), hi[0].as_mut()) {
        (Some(x), Some(y)) => {
            if swap {
                (y, x)
            } else {
                (x, y)
            }
        }
        _ => panic!("joint references a removed body"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{SOLVER_ITERATIONS, TICK_DT};

    fn params() -> PhysicsParams {
        PhysicsParams::default()
    }

    fn gravity_solver() -> Solver {
        Solver::new(Vec2::new(0.0, -9.81), SOLVER_ITERATIONS)
    }

    #[test]
    fn test_free_fall_matches_integration() {
        let mut solver = gravity_solver();
        let id = solver.add_body(Body::dynamic(2.0, 1.0, Vec2::ZERO));
        for _ in 0..100 {
            solver.step(TICK_DT, &[], &params());
        }
        let body = solver.body(id).expect("body is live");
        // semi-implicit Euler after 1s: v = g, x = g*dt*sum(1..n)
        assert!((body.vel.y + 9.81).abs() < 1e-3);
        assert!(body.pos.y < -4.8 && body.pos.y > -5.1);
    }

    #[test]
    fn test_fixed_body_never_moves() {
        let mut solver = gravity_solver();
        let anchor = solver.add_body(Body::fixed(Vec2::new(1.0, 2.0)));
        let ball = solver.add_body(Body::dynamic(1.0, disc_inertia(1.0, 0.5), Vec2::new(1.0, 1.0)));
        solver
            .add_joint(PinJoint::new(
                anchor,
                ball,
                Vec2::ZERO,
                Vec2::new(0.0, 1.0),
                0.2,
                0.0,
            ))
            .expect("joint is valid");

        // hammer the anchor through joint impulses and a direct contact
        let contact = Contact {
            point: Vec2::new(1.0, 2.0),
            normal: Vec2::Y,
            depth: 0.5,
            grip: 1.0,
        };
        for _ in 0..200 {
            solver.step(TICK_DT, &[(anchor, contact)], &params());
        }
        let body = solver.body(anchor).expect("body is live");
        assert_eq!(body.pos, Vec2::new(1.0, 2.0));
        assert_eq!(body.vel, Vec2::ZERO);
        assert_eq!(body.ang_vel, 0.0);
    }

    #[test]
    fn test_pin_joint_holds_anchors() {
        let mut solver = gravity_solver();
        let anchor = solver.add_body(Body::fixed(Vec2::new(0.0, 5.0)));
        let bob = solver.add_body(Body::dynamic(
            3.0,
            disc_inertia(3.0, 0.3),
            Vec2::new(1.0, 5.0),
        ));
        let jid = solver
            .add_joint(PinJoint::new(
                anchor,
                bob,
                Vec2::ZERO,
                Vec2::new(-1.0, 0.0),
                0.2,
                0.0,
            ))
            .expect("joint is valid");

        for _ in 0..500 {
            solver.step(TICK_DT, &[], &params());
        }
        let joint = solver.joint(jid).expect("joint is live");
        let a = solver.body(anchor).expect("body is live");
        let b = solver.body(bob).expect("body is live");
        assert!(
            joint.anchor_separation(a, b) < 1e-3,
            "pendulum anchors drifted {} apart",
            joint.anchor_separation(a, b)
        );
    }

    #[test]
    fn test_remove_jointed_body_fails_fast() {
        let mut solver = gravity_solver();
        let a = solver.add_body(Body::fixed(Vec2::ZERO));
        let b = solver.add_body(Body::dynamic(1.0, 1.0, Vec2::X));
        let jid = solver
            .add_joint(PinJoint::new(a, b, Vec2::ZERO, Vec2::ZERO, 0.2, 0.0))
            .expect("joint is valid");

        assert_eq!(solver.remove_body(b), Err(SolverError::BodyInUse));
        solver.remove_joint(jid).expect("joint is live");
        assert_eq!(solver.remove_body(b), Ok(()));
        assert_eq!(solver.remove_body(b), Err(SolverError::UnknownBody));
    }

    #[test]
    fn test_self_joint_rejected() {
        let mut solver = gravity_solver();
        let a = solver.add_body(Body::dynamic(1.0, 1.0, Vec2::ZERO));
        let result = solver.add_joint(PinJoint::new(a, a, Vec2::ZERO, Vec2::X, 0.2, 0.0));
        assert_eq!(result.err(), Some(SolverError::DegenerateJoint));
    }

    #[test]
    fn test_contact_stops_falling_body() {
        let mut solver = gravity_solver();
        let ball = solver.add_body(Body::dynamic(
            5.0,
            disc_inertia(5.0, 0.35),
            Vec2::new(0.0, 0.35),
        ));

        // resting on the floor: a fresh surface contact every tick
        for _ in 0..300 {
            let body = solver.body(ball).expect("body is live");
            let depth = (0.35 - body.pos.y).max(0.0);
            let contact = Contact {
                point: Vec2::new(body.pos.x, 0.0),
                normal: Vec2::Y,
                depth,
                grip: 20.0,
            };
            solver.step(TICK_DT, &[(ball, contact)], &params());
        }
        let body = solver.body(ball).expect("body is live");
        assert!(
            (body.pos.y - 0.35).abs() < 0.05,
            "ball should rest near the surface, y = {}",
            body.pos.y
        );
        assert!(body.vel.length() < 0.5);
    }

    #[test]
    fn test_step_is_deterministic() {
        let run = || {
            let mut solver = gravity_solver();
            let anchor = solver.add_body(Body::fixed(Vec2::new(0.0, 3.0)));
            let bob = solver.add_body(Body::dynamic(
                2.0,
                disc_inertia(2.0, 0.4),
                Vec2::new(1.5, 3.0),
            ));
            solver
                .add_joint(PinJoint::new(
                    anchor,
                    bob,
                    Vec2::ZERO,
                    Vec2::new(-1.5, 0.0),
                    0.2,
                    0.001,
                ))
                .expect("joint is valid");
            for _ in 0..1000 {
                solver.step(TICK_DT, &[], &params());
            }
            let b = solver.body(bob).expect("body is live");
            (
                b.pos.x.to_bits(),
                b.pos.y.to_bits(),
                b.angle.to_bits(),
                b.vel.x.to_bits(),
                b.vel.y.to_bits(),
            )
        };
        assert_eq!(run(), run());
    }
}
