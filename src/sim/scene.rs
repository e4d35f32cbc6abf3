//! Fixed-step simulation loop, level scene and replay state machine
//!
//! One [`Scene`] owns everything a ride needs: the collision grid built from
//! a level blueprint, the solver with the bike's bodies, trigger entities,
//! line movers and the somersault counter. `step` advances exactly one tick
//! of [`TICK_DT`](crate::consts::TICK_DT) and reports what happened as
//! events; the caller decides how often to render.
//!
//! Recording and playback are mutually exclusive states on the scene. A
//! recording captures the control stream as `(tick, control)` change frames;
//! playback substitutes those frames for live input, which reproduces the
//! ride exactly because the stepped path is deterministic.

use glam::Vec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::collision::{CollisionSystem, Contact, Line};
use super::entity::{Entity, EntityKind, LineMover, Motion, MoveWindow};
use super::solver::{BodyId, Solver, SolverError};
use super::somersault::SomersaultCounter;
use super::vehicle::{Bike, Wheel};
use crate::consts::{SOLVER_ITERATIONS, TICK_DT, TICK_RATE};
use crate::input::ControlState;
use crate::params::Params;
use crate::replay::{InputFrame, Replay, ReplayInfo};

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("level bounding box is empty")]
    EmptyBounds,
    #[error("level defines no start position inside its bounds")]
    StartOutOfBounds,
    #[error("recording already in progress")]
    AlreadyRecording,
    #[error("scene is playing back a replay")]
    PlaybackActive,
    #[error("no recording in progress")]
    NotRecording,
    #[error("replay was recorded on level {replay} but this scene runs {scene}")]
    LevelMismatch { replay: String, scene: String },
    #[error("replay tick rate {0} does not match the simulation tick rate")]
    TickRateMismatch(u32),
    #[error(transparent)]
    Solver(#[from] SolverError),
}

/// A dynamic line placement: the line plus the motion that drives it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovingLine {
    pub line: Line,
    pub motion: Motion,
    pub window: MoveWindow,
}

/// Everything the level geometry provider hands over at scene load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelBlueprint {
    pub id: String,
    pub bounds_min: Vec2,
    pub bounds_max: Vec2,
    /// Static level edges, solid side left of p1→p2
    pub lines: Vec<Line>,
    /// Entity-driven edges
    pub moving_lines: Vec<MovingLine>,
    pub entities: Vec<Entity>,
    /// Ground point midway between the wheel axles at spawn
    pub start: Vec2,
}

impl LevelBlueprint {
    /// Minimal empty level, useful as a test fixture
    pub fn flat(id: &str, half_width: f32) -> Self {
        Self {
            id: id.to_string(),
            bounds_min: Vec2::new(-half_width, -5.0),
            bounds_max: Vec2::new(half_width, 30.0),
            lines: vec![Line::new(
                Vec2::new(-half_width, 0.0),
                Vec2::new(half_width, 0.0),
                20.0,
            )],
            moving_lines: Vec::new(),
            entities: Vec::new(),
            start: Vec2::new(0.0, 0.35),
        }
    }
}

/// What a tick did, in emission order
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    /// A wheel started or stopped touching level geometry
    WheelTouch { wheel: Wheel, touching: bool },
    /// A trigger entity was touched this tick (first touch only for
    /// `MustCollect`)
    EntityTouched { index: usize, kind: EntityKind },
    /// The chassis completed a full rotation
    Somersault { counterclockwise: bool },
    /// The rider's safety line or a death trigger was hit
    Crashed,
    /// The finish armed and was touched
    Finished { tick: u32 },
}

enum ReplayMode {
    Stopped,
    Recording {
        player: String,
        frames: Vec<InputFrame>,
    },
    Playing {
        replay: Replay,
    },
    PlaybackFinished,
}

/// A level being ridden: simulation state plus the replay state machine
pub struct Scene {
    level_id: String,
    params: Params,
    collision: CollisionSystem,
    solver: Solver,
    bike: Bike,
    movers: Vec<LineMover>,
    entities: Vec<Entity>,
    collected: Vec<bool>,
    somersault: SomersaultCounter,
    replay_mode: ReplayMode,
    tick: u32,
    finish_tick: Option<u32>,
    dead: bool,
    last_control: ControlState,
    /// Per-tick contact scratch, reused across ticks
    contacts: Vec<(BodyId, Contact)>,
}

impl Scene {
    pub fn new(blueprint: &LevelBlueprint, params: Params) -> Result<Self, SceneError> {
        let min = blueprint.bounds_min;
        let max = blueprint.bounds_max;
        if !(max.x > min.x) || !(max.y > min.y) {
            return Err(SceneError::EmptyBounds);
        }
        if blueprint.start.x < min.x
            || blueprint.start.x > max.x
            || blueprint.start.y < min.y
            || blueprint.start.y > max.y
        {
            return Err(SceneError::StartOutOfBounds);
        }

        let mut collision = CollisionSystem::new();
        collision.set_bounds(min.x, min.y, max.x, max.y);
        for line in &blueprint.lines {
            collision.define_line(line.p1.x, line.p1.y, line.p2.x, line.p2.y, line.grip);
        }

        let mut movers = Vec::with_capacity(blueprint.moving_lines.len());
        for moving in &blueprint.moving_lines {
            let id = collision.add_dynamic_line(moving.line);
            movers.push(LineMover::new(
                id,
                moving.line.p1,
                moving.line.p2,
                moving.motion,
                moving.window,
            ));
        }

        let mut solver = Solver::new(params.physics.gravity, SOLVER_ITERATIONS);
        let bike = Bike::spawn(&mut solver, blueprint.start, &params.bike)?;

        Ok(Self {
            level_id: blueprint.id.clone(),
            collected: vec![false; blueprint.entities.len()],
            entities: blueprint.entities.clone(),
            params,
            collision,
            solver,
            bike,
            movers,
            somersault: SomersaultCounter::new(),
            replay_mode: ReplayMode::Stopped,
            tick: 0,
            finish_tick: None,
            dead: false,
            last_control: ControlState::new(),
            contacts: Vec::new(),
        })
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn level_id(&self) -> &str {
        &self.level_id
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn finish_tick(&self) -> Option<u32> {
        self.finish_tick
    }

    pub fn bike(&self) -> &Bike {
        &self.bike
    }

    pub fn solver(&self) -> &Solver {
        &self.solver
    }

    pub fn collision(&self) -> &CollisionSystem {
        &self.collision
    }

    pub fn somersault_counter(&self) -> &SomersaultCounter {
        &self.somersault
    }

    /// Chassis position and angle, for the renderer
    pub fn chassis_transform(&self) -> (Vec2, f32) {
        self.bike.chassis_transform(&self.solver)
    }

    /// Wheel centers `[rear, front]`, for the renderer
    pub fn wheel_positions(&self) -> [Vec2; 2] {
        self.bike.wheel_positions(&self.solver)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.replay_mode, ReplayMode::Recording { .. })
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.replay_mode, ReplayMode::Playing { .. })
    }

    /// Did a playback run out of recorded frames?
    pub fn playback_finished(&self) -> bool {
        matches!(self.replay_mode, ReplayMode::PlaybackFinished)
    }

    /// Begin recording the control stream under `player`'s name
    pub fn start_recording(&mut self, player: &str) -> Result<(), SceneError> {
        match self.replay_mode {
            ReplayMode::Stopped => {
                self.replay_mode = ReplayMode::Recording {
                    player: player.to_string(),
                    frames: Vec::new(),
                };
                Ok(())
            }
            ReplayMode::Recording { .. } => Err(SceneError::AlreadyRecording),
            ReplayMode::Playing { .. } | ReplayMode::PlaybackFinished => {
                Err(SceneError::PlaybackActive)
            }
        }
    }

    /// Stop recording. The replay is returned only for finished rides;
    /// an abandoned ride's stream is discarded.
    pub fn finalize_recording(&mut self, finished: bool) -> Result<Option<Replay>, SceneError> {
        let mode = std::mem::replace(&mut self.replay_mode, ReplayMode::Stopped);
        match mode {
            ReplayMode::Recording { player, frames } => {
                if !finished {
                    return Ok(None);
                }
                Ok(Some(Replay {
                    info: ReplayInfo {
                        level_id: self.level_id.clone(),
                        player,
                        tick_rate: TICK_RATE,
                        finished: self.finish_tick.is_some(),
                        finish_tick: self.finish_tick.unwrap_or(self.tick),
                    },
                    frames,
                }))
            }
            other => {
                self.replay_mode = other;
                Err(SceneError::NotRecording)
            }
        }
    }

    /// Switch the scene to playback: from now on `step`'s `control` argument
    /// is ignored and the recorded stream is used instead.
    pub fn start_playback(&mut self, replay: Replay) -> Result<(), SceneError> {
        if self.is_recording() {
            return Err(SceneError::AlreadyRecording);
        }
        if replay.info.level_id != self.level_id {
            return Err(SceneError::LevelMismatch {
                replay: replay.info.level_id.clone(),
                scene: self.level_id.clone(),
            });
        }
        if replay.info.tick_rate != TICK_RATE {
            return Err(SceneError::TickRateMismatch(replay.info.tick_rate));
        }
        self.replay_mode = ReplayMode::Playing { replay };
        Ok(())
    }

    /// Advance the simulation by exactly one fixed tick.
    ///
    /// `control` is this tick's live input; during playback it is replaced
    /// by the recorded stream. Events are returned in a stable order.
    pub fn step(&mut self, control: ControlState) -> Vec<SceneEvent> {
        let mut events = Vec::new();
        let tick = self.tick;

        // input source: live, or the recorded stream during playback
        let playback_done = matches!(
            &self.replay_mode,
            ReplayMode::Playing { replay } if tick >= replay.info.finish_tick
        );
        if playback_done {
            self.replay_mode = ReplayMode::PlaybackFinished;
        }
        let control = match &self.replay_mode {
            ReplayMode::Playing { replay } => replay.control_at(tick),
            ReplayMode::PlaybackFinished => ControlState::new(),
            // a dead rider's bike coasts
            _ if self.dead => ControlState::new(),
            _ => control,
        };

        if let ReplayMode::Recording { frames, .. } = &mut self.replay_mode {
            let changed = frames.last().map(|f| f.control) != Some(control);
            let first = frames.is_empty();
            if (first && control != ControlState::new()) || (!first && changed) {
                frames.push(InputFrame { tick, control });
            }
        }

        // scripted movers reposition their lines before any queries
        for mover in &self.movers {
            mover.apply(tick, TICK_DT, &mut self.collision);
        }

        // edge-triggered direction flip
        if control.flip() && !self.last_control.flip() {
            self.bike.flip_direction();
        }
        self.last_control = control;

        self.bike.apply_controls(&mut self.solver, control, tick);

        let was_touching = self.bike.touching();
        self.contacts.clear();
        let touching = self
            .bike
            .collect_contacts(&self.solver, &self.collision, &mut self.contacts);
        for (i, wheel) in [Wheel::Rear, Wheel::Front].into_iter().enumerate() {
            if touching[i] != was_touching[i] {
                events.push(SceneEvent::WheelTouch {
                    wheel,
                    touching: touching[i],
                });
            }
        }

        self.solver
            .step(TICK_DT, &self.contacts, &self.params.physics);

        let (chassis_pos, chassis_angle) = self.bike.chassis_transform(&self.solver);
        if let Some(counterclockwise) = self.somersault.update(chassis_angle) {
            events.push(SceneEvent::Somersault { counterclockwise });
        }

        if !self.dead && self.bike.check_safety_line(&self.solver, &self.collision) {
            self.dead = true;
            events.push(SceneEvent::Crashed);
        }

        self.check_entities(chassis_pos, &mut events);

        self.tick += 1;
        events
    }

    /// Trigger-entity overlap tests against both wheels and the chassis
    fn check_entities(&mut self, chassis_pos: Vec2, events: &mut Vec<SceneEvent>) {
        let wheels = self.bike.wheel_positions(&self.solver);
        let wheel_r = self.params.bike.wheel_radius;
        let probes = [
            (wheels[0], wheel_r),
            (wheels[1], wheel_r),
            (chassis_pos, wheel_r),
        ];

        let all_collected = self
            .entities
            .iter()
            .zip(&self.collected)
            .all(|(e, &taken)| e.kind != EntityKind::MustCollect || taken);

        for (index, entity) in self.entities.iter().enumerate() {
            let touched = probes.iter().any(|&(p, r)| entity.is_touched(p, r));
            if !touched {
                continue;
            }
            match entity.kind {
                EntityKind::MustCollect => {
                    if !self.collected[index] {
                        self.collected[index] = true;
                        events.push(SceneEvent::EntityTouched {
                            index,
                            kind: entity.kind,
                        });
                    }
                }
                EntityKind::Death => {
                    events.push(SceneEvent::EntityTouched {
                        index,
                        kind: entity.kind,
                    });
                    if !self.dead {
                        self.dead = true;
                        events.push(SceneEvent::Crashed);
                    }
                }
                EntityKind::Finish => {
                    events.push(SceneEvent::EntityTouched {
                        index,
                        kind: entity.kind,
                    });
                    // the finish only arms once every strawberry is taken
                    if all_collected && !self.dead && self.finish_tick.is_none() {
                        self.finish_tick = Some(self.tick);
                        events.push(SceneEvent::Finished { tick: self.tick });
                    }
                }
            }
        }
    }
}
