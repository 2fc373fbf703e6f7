//! The nested state machine that attaches the body to a ledge and carries it around corners.

use bevy_math::prelude::*;
use bevy_reflect::prelude::*;
use bevy_transform::prelude::*;
use core::fmt;
use tracing::debug;

use crate::{
    body::{CapsuleSize, ParkourBody},
    config::ParkourConfig,
    edges::{EdgeClassifier, EdgeContact, EdgeState, Side},
    query::GeometryQuery,
    timers::{ParkourTimers, TimerKind},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Reflect)]
pub enum HangingState {
    #[default]
    NotHanging,
    /// Moving onto a freshly found hang point.
    AdjustingLocation,
    Hanging,
    /// Moving around a corner onto the next plane.
    TraversingACorner,
}

impl HangingState {
    pub fn is_hanging(self) -> bool {
        self != HangingState::NotHanging
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Reflect)]
pub enum HangAdjustmentKind {
    /// Attaching to a ledge.
    Attach,
    /// Traversing a corner onto a new plane.
    Corner,
}

/// A move the body has to make before it can hang.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HangAdjustment {
    pub kind: HangAdjustmentKind,
    pub target: Transform,
}

/// Replaces the default teleport when the body moves onto a hang point or around a corner.
///
/// Whoever binds a hook takes over the move and must call
/// [`ParkourMovement::adjustment_ended`](crate::ParkourMovement::adjustment_ended) once the
/// body has arrived.
pub type TransitionHook = Box<dyn FnMut(&HangAdjustment) + Send + Sync>;

#[derive(Default)]
pub struct HangMachine {
    state: HangingState,
    edges: EdgeClassifier,
    hook: Option<TransitionHook>,
    pending: Option<HangAdjustment>,
}

impl fmt::Debug for HangMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HangMachine")
            .field("state", &self.state)
            .field("edges", &self.edges)
            .field("hook", &self.hook.is_some())
            .field("pending", &self.pending)
            .finish()
    }
}

impl HangMachine {
    pub fn state(&self) -> HangingState {
        self.state
    }

    pub fn edges(&self) -> &EdgeClassifier {
        &self.edges
    }

    pub fn edge_state(&self, side: Side) -> EdgeState {
        self.edges.state(side)
    }

    /// The adjustment a bound hook is currently carrying out.
    pub fn pending_adjustment(&self) -> Option<&HangAdjustment> {
        self.pending.as_ref()
    }

    pub fn set_hook(&mut self, hook: TransitionHook) {
        self.hook = Some(hook);
    }

    pub fn clear_hook(&mut self) -> Option<TransitionHook> {
        self.hook.take()
    }

    /// Assigns `new` and applies its entry effects. Does nothing if `new` is already current.
    pub fn change_state(
        &mut self,
        new: HangingState,
        cfg: &ParkourConfig,
        body: &mut dyn ParkourBody,
        timers: &mut ParkourTimers,
    ) {
        if self.state == new {
            return;
        }
        debug!(from = ?self.state, to = ?new, "hanging state changed");
        self.state = new;

        match new {
            HangingState::NotHanging => {
                timers.start(TimerKind::NoHang, cfg.no_hang_cooldown);
                body.set_plane_constraint(None);
                body.set_gravity_scale(1.0);
                body.set_collision_enabled(true);
                body.set_input_enabled(true);
                self.pending = None;
                self.edges.reset();
            }
            HangingState::AdjustingLocation => {
                body.set_input_enabled(false);
                body.set_gravity_scale(0.0);
                body.set_velocity(Vec3::ZERO);
                body.set_collision_enabled(false);
                self.edges.reset();
            }
            HangingState::TraversingACorner => {
                body.set_collision_enabled(false);
                self.edges.reset();
            }
            HangingState::Hanging => {
                self.pending = None;
                let normal = Dir3::new(body.rotation() * Vec3::NEG_Z).ok();
                body.set_plane_constraint(normal);
                body.set_collision_enabled(true);
                body.set_input_enabled(true);
            }
        }
    }

    /// Starts attaching to `target`, which must come from a successful hang point search.
    pub fn begin(
        &mut self,
        target: Transform,
        cfg: &ParkourConfig,
        body: &mut dyn ParkourBody,
        timers: &mut ParkourTimers,
    ) {
        self.change_state(HangingState::AdjustingLocation, cfg, body, timers);
        self.adjust(
            HangAdjustment {
                kind: HangAdjustmentKind::Attach,
                target,
            },
            cfg,
            body,
            timers,
        );
    }

    fn adjust(
        &mut self,
        adjustment: HangAdjustment,
        cfg: &ParkourConfig,
        body: &mut dyn ParkourBody,
        timers: &mut ParkourTimers,
    ) {
        if let Some(hook) = self.hook.as_mut() {
            self.pending = Some(adjustment);
            hook(&adjustment);
            return;
        }
        body.set_location(adjustment.target.translation);
        body.set_rotation(adjustment.target.rotation);
        self.adjustment_ended(cfg, body, timers);
    }

    /// Completes an attach or corner move. Ignored unless one is in progress.
    pub fn adjustment_ended(
        &mut self,
        cfg: &ParkourConfig,
        body: &mut dyn ParkourBody,
        timers: &mut ParkourTimers,
    ) {
        if matches!(
            self.state,
            HangingState::AdjustingLocation | HangingState::TraversingACorner
        ) {
            self.change_state(HangingState::Hanging, cfg, body, timers);
        }
    }

    /// Per-tick work while hanging: resolve the plane's edges, keep the body off blocked
    /// edges and start corner traversals.
    pub fn tick(
        &mut self,
        cfg: &ParkourConfig,
        capsule: CapsuleSize,
        world: &dyn GeometryQuery,
        body: &mut dyn ParkourBody,
        timers: &mut ParkourTimers,
    ) {
        if self.state != HangingState::Hanging {
            return;
        }
        self.edges
            .update_edge_statuses(cfg, capsule, world, body.location(), body.rotation());

        let location = body.location();
        let (corrected, contact) = self.edges.resolve_contacts(location, capsule);
        if corrected != location {
            body.set_location(corrected);
            let lateral = body.rotation() * Vec3::X;
            let velocity = body.velocity();
            body.set_velocity(velocity - lateral * velocity.dot(lateral));
        }

        if let Some(EdgeContact::Corner { side, target }) = contact {
            debug!(?side, "traversing corner");
            self.change_state(HangingState::TraversingACorner, cfg, body, timers);
            self.adjust(
                HangAdjustment {
                    kind: HangAdjustmentKind::Corner,
                    target,
                },
                cfg,
                body,
                timers,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BoxWorld, TestBody};
    use std::sync::{Arc, Mutex};

    fn target() -> Transform {
        Transform::from_xyz(0.0, 0.35, -0.59)
    }

    #[test]
    fn begin_without_hook_teleports_and_hangs() {
        let cfg = ParkourConfig::default();
        let mut machine = HangMachine::default();
        let mut body = TestBody::at(Vec3::new(0.0, 0.1, 0.0)).airborne();
        body.velocity = Vec3::new(1.0, -3.0, 0.0);
        let mut timers = ParkourTimers::default();

        machine.begin(target(), &cfg, &mut body, &mut timers);

        assert_eq!(machine.state(), HangingState::Hanging);
        assert_eq!(body.location, target().translation);
        assert_eq!(body.velocity, Vec3::ZERO);
        assert_eq!(body.gravity_scale, 0.0);
        assert!(body.collision_enabled);
        assert!(body.input_enabled);
        assert_eq!(body.plane_constraint, Some(Dir3::NEG_Z));
    }

    #[test]
    fn bound_hook_defers_until_adjustment_ended() {
        let cfg = ParkourConfig::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut machine = HangMachine::default();
        let sink = seen.clone();
        machine.set_hook(Box::new(move |adjustment| {
            sink.lock().unwrap().push(*adjustment);
        }));
        let mut body = TestBody::default().airborne();
        let mut timers = ParkourTimers::default();

        machine.begin(target(), &cfg, &mut body, &mut timers);
        assert_eq!(machine.state(), HangingState::AdjustingLocation);
        assert!(!body.input_enabled);
        assert!(!body.collision_enabled);
        assert_eq!(body.location, Vec3::ZERO);
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[HangAdjustment {
                kind: HangAdjustmentKind::Attach,
                target: target(),
            }]
        );
        assert_eq!(
            machine.pending_adjustment().map(|a| a.kind),
            Some(HangAdjustmentKind::Attach)
        );

        machine.adjustment_ended(&cfg, &mut body, &mut timers);
        assert_eq!(machine.state(), HangingState::Hanging);
        assert!(machine.pending_adjustment().is_none());
        assert!(body.input_enabled && body.collision_enabled);
    }

    #[test]
    fn adjustment_ended_is_ignored_when_idle() {
        let cfg = ParkourConfig::default();
        let mut machine = HangMachine::default();
        let mut body = TestBody::default();
        let mut timers = ParkourTimers::default();
        machine.adjustment_ended(&cfg, &mut body, &mut timers);
        assert_eq!(machine.state(), HangingState::NotHanging);
    }

    #[test]
    fn letting_go_restores_body_and_arms_cooldown() {
        let cfg = ParkourConfig::default();
        let mut machine = HangMachine::default();
        let mut body = TestBody::default().airborne();
        let mut timers = ParkourTimers::default();
        machine.begin(target(), &cfg, &mut body, &mut timers);

        machine.change_state(HangingState::NotHanging, &cfg, &mut body, &mut timers);
        assert_eq!(body.gravity_scale, 1.0);
        assert_eq!(body.plane_constraint, None);
        assert!(timers.is_active(TimerKind::NoHang));
    }

    #[test]
    fn corner_contact_moves_body_to_next_plane() {
        let cfg = ParkourConfig::default();
        let capsule = CapsuleSize::default();
        let world = BoxWorld::default().with_wall(-0.1, 0.1, -1.0, 1.0, 2.0);
        let mut machine = HangMachine::default();
        let mut body = TestBody::default().airborne();
        let mut timers = ParkourTimers::default();
        machine.begin(target(), &cfg, &mut body, &mut timers);

        machine.tick(&cfg, capsule, &world, &mut body, &mut timers);
        assert_eq!(machine.edge_state(Side::Left), EdgeState::Corner);

        // Shuffle left into the corner trigger.
        body.location += Vec3::NEG_X * 0.33;
        machine.tick(&cfg, capsule, &world, &mut body, &mut timers);

        assert_eq!(machine.state(), HangingState::Hanging);
        assert!((body.rotation * Vec3::NEG_Z).abs_diff_eq(Vec3::X, 1.0e-5));
        assert!((body.location.x - (-0.1 - cfg.attach_distance)).abs() < 1.0e-4);
        // The new plane starts out unresolved.
        assert_eq!(machine.edge_state(Side::Left), EdgeState::Unknown);
        assert!(machine.edges().regions().is_empty());
    }

    #[test]
    fn blocked_edge_stops_lateral_motion() {
        let cfg = ParkourConfig::default();
        let capsule = CapsuleSize::default();
        let world = BoxWorld::default().with_wall(-0.1, 0.1, -1.0, 1.0, 0.2);
        let mut machine = HangMachine::default();
        let mut body = TestBody::default().airborne();
        let mut timers = ParkourTimers::default();
        machine.begin(target(), &cfg, &mut body, &mut timers);
        machine.tick(&cfg, capsule, &world, &mut body, &mut timers);
        assert_eq!(machine.edge_state(Side::Right), EdgeState::Block);

        body.location += Vec3::X * 0.1;
        body.velocity = Vec3::new(2.0, 0.0, 0.0);
        machine.tick(&cfg, capsule, &world, &mut body, &mut timers);

        assert!(body.location.abs_diff_eq(target().translation, 1.0e-5));
        assert_eq!(body.velocity, Vec3::ZERO);
        assert_eq!(machine.state(), HangingState::Hanging);
    }
}
