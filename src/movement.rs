//! The parkour state machine.
//!
//! [`ParkourMovement`] decides which locomotion mode a body is in and what that mode asks
//! of the body. It never integrates motion itself: the host calls
//! [`ParkourMovement::advance`] once per fixed tick with a [`ParkourBody`] and a
//! [`GeometryQuery`], then integrates the body with whatever velocity, gravity scale,
//! plane constraint and collision settings the machine left on it.

use bevy_math::prelude::*;
use bevy_reflect::prelude::*;
use core::time::Duration;
use tracing::debug;

use crate::{
    body::{CapsuleSize, ParkourBody},
    config::{ParkourConfig, ParkourError},
    directions::{DirectionChange, DirectionScanner, TraceDirection},
    edges::{EdgeClassifier, EdgeState, Side},
    events::{HangingToggle, MovementStateChange, Observers, SubscriptionId},
    hang_point::find_hang_point,
    hanging::{HangAdjustment, HangMachine, HangingState},
    query::GeometryQuery,
    timers::{ParkourTimers, TimerKind},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Reflect)]
pub enum MovementState {
    #[default]
    Walk,
    Crawl,
    Slide,
    Jump,
    /// Airborne crouch that gives one forward boost per airborne phase.
    TuckJump,
    Hang,
    Wallrun,
}

impl MovementState {
    /// States that keep the body crouched.
    pub fn is_crouched(self) -> bool {
        matches!(
            self,
            MovementState::Crawl | MovementState::Slide | MovementState::TuckJump
        )
    }
}

#[derive(Debug)]
pub struct ParkourMovement {
    cfg: ParkourConfig,
    capsule: CapsuleSize,
    state: MovementState,
    hang: HangMachine,
    scanner: DirectionScanner,
    timers: ParkourTimers,
    can_air_boost: bool,
    can_wallrun: bool,
    crouch_held: bool,
    jump_off_location: Vec3,
    state_changed: Observers<MovementStateChange>,
    hanging_toggled: Observers<HangingToggle>,
}

impl ParkourMovement {
    /// Builds a machine in [`MovementState::Walk`] for a body with the given capsule.
    pub fn new(cfg: ParkourConfig, capsule: CapsuleSize) -> Result<Self, ParkourError> {
        cfg.validate(capsule)?;
        Ok(Self {
            cfg,
            capsule,
            state: MovementState::Walk,
            hang: HangMachine::default(),
            scanner: DirectionScanner::default(),
            timers: ParkourTimers::default(),
            can_air_boost: true,
            can_wallrun: true,
            crouch_held: false,
            jump_off_location: Vec3::ZERO,
            state_changed: Observers::default(),
            hanging_toggled: Observers::default(),
        })
    }

    pub fn config(&self) -> &ParkourConfig {
        &self.cfg
    }

    pub fn capsule(&self) -> CapsuleSize {
        self.capsule
    }

    pub fn movement_state(&self) -> MovementState {
        self.state
    }

    pub fn hanging_state(&self) -> HangingState {
        self.hang.state()
    }

    pub fn edge_state(&self, side: Side) -> EdgeState {
        self.hang.edge_state(side)
    }

    pub fn edges(&self) -> &EdgeClassifier {
        self.hang.edges()
    }

    pub fn blocked_directions(&self) -> &DirectionScanner {
        &self.scanner
    }

    pub fn timers(&self) -> &ParkourTimers {
        &self.timers
    }

    pub fn can_air_boost(&self) -> bool {
        self.can_air_boost
    }

    pub fn can_wallrun(&self) -> bool {
        self.can_wallrun
    }

    pub fn is_crouch_held(&self) -> bool {
        self.crouch_held
    }

    /// Where the body last left the ground or a ledge.
    pub fn jump_off_location(&self) -> Vec3 {
        self.jump_off_location
    }

    pub fn on_state_changed(
        &mut self,
        callback: impl FnMut(&MovementStateChange) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.state_changed.subscribe(callback)
    }

    pub fn on_hanging_toggled(
        &mut self,
        callback: impl FnMut(&HangingToggle) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.hanging_toggled.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.state_changed.unsubscribe(id) || self.hanging_toggled.unsubscribe(id)
    }

    /// Takes over attach and corner moves. See [`TransitionHook`](crate::hanging::TransitionHook).
    pub fn set_transition_hook(
        &mut self,
        hook: impl FnMut(&HangAdjustment) + Send + Sync + 'static,
    ) {
        self.hang.set_hook(Box::new(hook));
    }

    /// Goes back to teleporting the body on attach and corner moves.
    pub fn clear_transition_hook(&mut self) {
        self.hang.clear_hook();
    }

    /// Runs one tick: fires due timers, then the current state's per-tick behaviour.
    pub fn advance(
        &mut self,
        delta: Duration,
        body: &mut dyn ParkourBody,
        world: &dyn GeometryQuery,
    ) {
        for kind in self.timers.tick(delta) {
            self.on_timer_fired(kind, body);
        }

        match self.state {
            MovementState::Walk => {
                self.update_blocked_directions(body, world);
                if self.state == MovementState::Walk && !body.is_grounded() {
                    self.leave_ground(body);
                }
            }
            MovementState::Crawl | MovementState::Slide => {
                if !body.is_grounded() {
                    self.leave_ground(body);
                }
            }
            MovementState::Jump => {
                self.update_blocked_directions(body, world);
                if self.state != MovementState::Jump
                    || self.try_to_hang_in_current_location(body, world)
                    || self.try_to_start_wallrun(body)
                {
                    return;
                }
                if has_landed(body) {
                    self.land(body);
                }
            }
            MovementState::TuckJump => {
                if has_landed(body) {
                    self.land(body);
                }
            }
            MovementState::Hang => {
                let capsule = self.capsule;
                self.with_hang(body, |hang, cfg, body, timers| {
                    hang.tick(cfg, capsule, world, body, timers);
                });
            }
            MovementState::Wallrun => {
                self.update_blocked_directions(body, world);
                if self.state != MovementState::Wallrun {
                    return;
                }
                if !self.is_running_into_something() && self.fulfills_wallrun_conditions(body) {
                    self.apply_wallrun_velocity(body);
                } else {
                    self.change_state(MovementState::Jump, body);
                }
            }
        }
    }

    /// Dispatches a jump press. Returns whether anything happened.
    pub fn attempt_jump(&mut self, body: &mut dyn ParkourBody) -> bool {
        match self.state {
            MovementState::Walk | MovementState::Crawl if body.is_grounded() => {
                self.jump_off_location = body.location();
                let mut velocity = body.velocity();
                velocity.y = velocity.y.max(self.cfg.jump_velocity);
                body.set_velocity(velocity);
                self.change_state(MovementState::Jump, body);
                true
            }
            MovementState::Hang if self.hang.state() == HangingState::Hanging => {
                self.jump_off_location = body.location();
                self.finish_hang(body);
                self.lunge(body);
                true
            }
            MovementState::Wallrun => {
                self.change_state(MovementState::Jump, body);
                self.lunge(body);
                self.timers
                    .start(TimerKind::NoWallrun, self.cfg.no_wallrun_cooldown);
                true
            }
            _ => false,
        }
    }

    /// Dispatches a crouch press. The press is remembered until
    /// [`attempt_uncrouch`](Self::attempt_uncrouch).
    pub fn attempt_crouch(&mut self, body: &mut dyn ParkourBody) {
        self.crouch_held = true;
        let speed = horizontal_speed(body.velocity());
        match self.state {
            MovementState::Walk => {
                let next = if speed >= self.cfg.min_slide_speed {
                    MovementState::Slide
                } else {
                    MovementState::Crawl
                };
                self.change_state(next, body);
            }
            MovementState::Jump => {
                if speed >= self.cfg.min_tuck_jump_speed {
                    self.change_state(MovementState::TuckJump, body);
                }
            }
            MovementState::Hang => {
                self.finish_hang(body);
            }
            MovementState::Wallrun => self.change_state(MovementState::Jump, body),
            MovementState::Crawl | MovementState::Slide | MovementState::TuckJump => {}
        }
    }

    pub fn attempt_uncrouch(&mut self, body: &mut dyn ParkourBody) {
        self.crouch_held = false;
        match self.state {
            MovementState::Crawl | MovementState::Slide => {
                self.change_state(MovementState::Walk, body);
            }
            state if !state.is_crouched() && body.is_crouching() => body.uncrouch(),
            _ => {}
        }
    }

    /// Looks for a ledge in front of the body and starts hanging from it.
    ///
    /// Fails while already hanging or during the cooldown after letting go.
    pub fn try_to_hang_in_current_location(
        &mut self,
        body: &mut dyn ParkourBody,
        world: &dyn GeometryQuery,
    ) -> bool {
        if self.state == MovementState::Hang || self.timers.is_active(TimerKind::NoHang) {
            return false;
        }
        let Some(target) = find_hang_point(
            &self.cfg,
            self.capsule,
            world,
            body.location(),
            body.rotation(),
        ) else {
            return false;
        };

        self.change_state(MovementState::Hang, body);
        self.with_hang(body, |hang, cfg, body, timers| {
            hang.begin(target, cfg, body, timers);
        });
        true
    }

    /// Lets go of the ledge and falls into [`MovementState::Jump`].
    pub fn finish_hang(&mut self, body: &mut dyn ParkourBody) -> bool {
        if self.state != MovementState::Hang {
            return false;
        }
        self.change_state(MovementState::Jump, body);
        true
    }

    /// Tells the machine a hooked attach or corner move has finished.
    pub fn adjustment_ended(&mut self, body: &mut dyn ParkourBody) {
        self.with_hang(body, |hang, cfg, body, timers| {
            hang.adjustment_ended(cfg, body, timers);
        });
    }

    fn change_state(&mut self, new: MovementState, body: &mut dyn ParkourBody) {
        if self.state == new {
            return;
        }
        let previous = self.state;
        self.exit_state(previous, new, body);
        self.state = new;
        debug!(from = ?previous, to = ?new, "movement state changed");
        self.enter_state(new, body);
        self.state_changed
            .emit(&MovementStateChange { previous, new });
    }

    fn exit_state(
        &mut self,
        previous: MovementState,
        new: MovementState,
        body: &mut dyn ParkourBody,
    ) {
        match previous {
            MovementState::Hang => self.with_hang(body, |hang, cfg, body, timers| {
                hang.change_state(HangingState::NotHanging, cfg, body, timers);
            }),
            MovementState::Slide => self.timers.cancel(TimerKind::Slide),
            _ => {}
        }
        if previous.is_crouched() && !new.is_crouched() && !self.crouch_held {
            body.uncrouch();
        }
    }

    fn enter_state(&mut self, new: MovementState, body: &mut dyn ParkourBody) {
        match new {
            MovementState::Walk => {
                body.set_gravity_scale(1.0);
                self.rearm_on_ground();
            }
            MovementState::Crawl => {
                body.crouch();
                body.set_gravity_scale(1.0);
                self.rearm_on_ground();
            }
            MovementState::Slide => {
                body.crouch();
                let velocity = body.velocity();
                let travel = Vec3::new(velocity.x, 0.0, velocity.z).normalize_or_zero();
                body.set_velocity(velocity + travel * self.cfg.slide_force);
                self.timers
                    .start(TimerKind::Slide, self.cfg.slide_duration);
            }
            MovementState::Jump => {
                body.set_gravity_scale(1.0);
                if self.can_wallrun && !self.timers.is_active(TimerKind::Wallrun) {
                    self.timers
                        .start(TimerKind::Wallrun, self.cfg.max_wallrun_time);
                }
            }
            MovementState::TuckJump => {
                body.crouch();
                if self.can_air_boost {
                    self.can_air_boost = false;
                    let forward = TraceDirection::Ahead.to_world(body.rotation());
                    body.set_velocity(body.velocity() + forward * self.cfg.tuck_jump_forward_force);
                }
            }
            MovementState::Hang => {
                self.can_wallrun = true;
                self.timers.cancel(TimerKind::Wallrun);
                // Scans stop while attached; whatever is beside the body on release is new.
                self.scanner.clear();
                body.set_gravity_scale(0.0);
            }
            MovementState::Wallrun => body.set_gravity_scale(0.0),
        }
    }

    fn rearm_on_ground(&mut self) {
        self.can_air_boost = true;
        self.can_wallrun = true;
        self.timers.cancel(TimerKind::Wallrun);
        self.timers.cancel(TimerKind::NoWallrun);
    }

    fn on_timer_fired(&mut self, kind: TimerKind, body: &mut dyn ParkourBody) {
        debug!(?kind, "parkour timer fired");
        match kind {
            TimerKind::Wallrun => {
                self.can_wallrun = false;
                if self.state == MovementState::Wallrun {
                    self.change_state(MovementState::Jump, body);
                }
            }
            TimerKind::Slide => {
                if self.state != MovementState::Slide {
                    return;
                }
                if body.is_grounded() {
                    self.land(body);
                } else {
                    self.leave_ground(body);
                }
            }
            TimerKind::NoHang | TimerKind::NoWallrun => {}
        }
    }

    fn leave_ground(&mut self, body: &mut dyn ParkourBody) {
        self.jump_off_location = body.location();
        self.change_state(MovementState::Jump, body);
    }

    fn land(&mut self, body: &mut dyn ParkourBody) {
        let next = if self.crouch_held {
            MovementState::Crawl
        } else {
            MovementState::Walk
        };
        self.change_state(next, body);
    }

    fn update_blocked_directions(&mut self, body: &mut dyn ParkourBody, world: &dyn GeometryQuery) {
        let changes = self.scanner.update(
            world,
            body.location(),
            body.rotation(),
            self.capsule,
            self.cfg.side_trace_radius_factor,
        );
        for change in changes {
            self.on_direction_changed(change, body);
        }
    }

    fn on_direction_changed(&mut self, change: DirectionChange, body: &mut dyn ParkourBody) {
        use TraceDirection::{Left, Right};
        if let (MovementState::Wallrun, DirectionChange::Cleared(Left | Right)) = (self.state, change)
            && !self.scanner.is_blocked(Left)
            && !self.scanner.is_blocked(Right)
        {
            self.change_state(MovementState::Jump, body);
        }
    }

    /// Starts a wall-run off whichever side wall the last scan found, however long it has
    /// been there.
    fn try_to_start_wallrun(&mut self, body: &mut dyn ParkourBody) -> bool {
        if self.is_running_into_something() || !self.fulfills_wallrun_conditions(body) {
            return false;
        }
        self.change_state(MovementState::Wallrun, body);
        true
    }

    /// A wall ahead or the ground below ends a wall-run, and keeps one from starting.
    fn is_running_into_something(&self) -> bool {
        self.scanner.is_blocked(TraceDirection::Ahead) || self.scanner.is_blocked(TraceDirection::Down)
    }

    /// The side a wall-run would use. Left wins when both are blocked.
    fn wallrun_side(&self) -> Option<TraceDirection> {
        [TraceDirection::Left, TraceDirection::Right]
            .into_iter()
            .find(|&direction| self.scanner.is_blocked(direction))
    }

    fn fulfills_wallrun_conditions(&self, body: &dyn ParkourBody) -> bool {
        if !self.can_wallrun
            || !self.timers.is_active(TimerKind::Wallrun)
            || self.timers.is_active(TimerKind::NoWallrun)
        {
            return false;
        }
        if body.movement_input() == Vec2::ZERO {
            return false;
        }
        let Some(hit) = self.wallrun_side().and_then(|side| self.scanner.hit(side)) else {
            return false;
        };

        let normal = hit.normal;
        let forward = TraceDirection::Ahead.to_world(body.rotation());
        let Some(along_wall) = (forward - normal * forward.dot(normal)).try_normalize() else {
            return false;
        };
        let velocity = body.velocity();
        velocity.dot(normal).abs() <= self.cfg.max_wallrun_lateral_speed
            && velocity.dot(along_wall) >= self.cfg.min_wallrun_forward_speed
    }

    fn apply_wallrun_velocity(&self, body: &mut dyn ParkourBody) {
        let Some(side) = self.wallrun_side() else {
            return;
        };
        let rotation = body.rotation();
        let below_jump_off = self.jump_off_location.y - body.location().y;
        let vertical = if below_jump_off.abs() < self.cfg.wallrun_height_boost_range {
            below_jump_off + self.cfg.jump_velocity
        } else {
            0.0
        };
        body.set_velocity(
            TraceDirection::Ahead.to_world(rotation) * self.cfg.wallrun_forward_speed
                + side.to_world(rotation) * self.cfg.wallrun_lateral_speed
                + Vec3::Y * vertical,
        );
    }

    /// Launches the body along the view direction, pitch clamped to the configured range.
    fn lunge(&self, body: &mut dyn ParkourBody) {
        let (yaw, pitch, _) = body.view_rotation().to_euler(EulerRot::YXZ);
        let pitch = pitch.clamp(
            self.cfg.lunge_min_pitch_degrees.to_radians(),
            self.cfg.lunge_max_pitch_degrees.to_radians(),
        );
        let direction = Quat::from_euler(EulerRot::YXZ, yaw, pitch, 0.0) * Vec3::NEG_Z;
        let mut velocity = direction * self.cfg.lunge_speed;
        velocity.y = velocity
            .y
            .max(self.cfg.jump_velocity * self.cfg.lunge_lift_factor);
        body.set_velocity(velocity);
    }

    /// Runs `f` on the hang sub-machine and reports crossings of the not-hanging boundary.
    fn with_hang(
        &mut self,
        body: &mut dyn ParkourBody,
        f: impl FnOnce(&mut HangMachine, &ParkourConfig, &mut dyn ParkourBody, &mut ParkourTimers),
    ) {
        let was_hanging = self.hang.state().is_hanging();
        f(&mut self.hang, &self.cfg, body, &mut self.timers);
        let state = self.hang.state();
        if state.is_hanging() != was_hanging {
            debug!(hanging = state.is_hanging(), "hanging toggled");
            self.hanging_toggled.emit(&HangingToggle {
                hanging: state.is_hanging(),
                state,
            });
        }
    }
}

fn has_landed(body: &dyn ParkourBody) -> bool {
    body.is_grounded() && body.velocity().y <= 0.0
}

fn horizontal_speed(velocity: Vec3) -> f32 {
    Vec2::new(velocity.x, velocity.z).length()
}
