//! Deterministic simulation module
//!
//! All physics and gameplay logic lives here. This module must be pure and
//! deterministic:
//! - Fixed timestep only
//! - Stable iteration order (Vec storage, no hash maps in the stepped path)
//! - Fixed solver iteration counts
//! - No wall clock, no randomness, no rendering or platform dependencies

pub mod collision;
pub mod entity;
pub mod geom;
pub mod scene;
pub mod solver;
pub mod somersault;
pub mod vehicle;

pub use collision::{CollisionStats, CollisionSystem, Contact, DynamicLineId, Line};
pub use entity::{Entity, EntityKind, LineMover, Motion, MoveWindow};
pub use geom::Aabb;
pub use scene::{LevelBlueprint, MovingLine, Scene, SceneError, SceneEvent};
pub use solver::{Body, BodyId, JointId, PinJoint, Solver, SolverError};
pub use somersault::SomersaultCounter;
pub use vehicle::{Bike, Facing, Wheel};
