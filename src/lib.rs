#![doc = include_str!("../readme.md")]

/// Everything you need to get started with `bevy_parkour`
pub mod prelude {
    pub(crate) use {
        avian3d::prelude::*,
        bevy_app::prelude::*,
        bevy_derive::{Deref, DerefMut},
        bevy_ecs::prelude::*,
        bevy_enhanced_input::prelude::*,
        bevy_math::prelude::*,
        bevy_reflect::prelude::*,
        bevy_time::prelude::*,
        bevy_transform::prelude::*,
        bevy_utils::prelude::*,
    };

    pub use crate::{
        HangingToggled, MovementStateChanged, ParkourController, ParkourControllerState,
        ParkourMachine, ParkourPlugin, ParkourSystems,
        camera::{ParkourCamera, ParkourCameraOf},
        config::{ParkourConfig, ParkourError},
        edges::{EdgeState, Side},
        hanging::{HangAdjustment, HangAdjustmentKind, HangingState},
        input::{Crouch, Jump, Movement, RotateCamera},
        movement::{MovementState, ParkourMovement},
    };
}

use crate::{
    body::CapsuleSize,
    events::{HangingToggle, MovementStateChange},
    input::AccumulatedInput,
    prelude::*,
};
use avian3d::{
    character_controller::move_and_slide::MoveHitData,
    parry::shape::{Capsule, SharedShape},
};
use bevy_ecs::{
    entity::EntityHashSet, intern::Interned, lifecycle::HookContext,
    relationship::RelationshipSourceCollection as _, schedule::ScheduleLabel, world::DeferredWorld,
};
use bevy_time::Stopwatch;
use core::time::Duration;
use std::sync::{Arc, Mutex};
use tracing::error;

pub mod avian;
pub mod body;
pub mod camera;
pub mod config;
mod controller;
pub mod directions;
pub mod edges;
pub mod events;
mod fixed_update_utils;
pub mod hang_point;
pub mod hanging;
pub mod input;
pub mod movement;
pub mod query;
#[cfg(test)]
mod testing;
pub mod timers;

pub use movement::{MovementState, ParkourMovement};

/// Also requires you to add [`PhysicsPlugins`] and [`EnhancedInputPlugin`] to work properly.
pub struct ParkourPlugin {
    schedule: Interned<dyn ScheduleLabel>,
}

impl ParkourPlugin {
    /// Create a new plugin in the given schedule. The default is [`FixedPostUpdate`].
    pub fn new(schedule: impl ScheduleLabel) -> Self {
        Self {
            schedule: schedule.intern(),
        }
    }
}

impl Default for ParkourPlugin {
    fn default() -> Self {
        Self {
            schedule: FixedPostUpdate.intern(),
        }
    }
}

impl Plugin for ParkourPlugin {
    fn build(&self, app: &mut App) {
        app.configure_sets(
            self.schedule,
            ParkourSystems::MoveCharacters.in_set(PhysicsSystems::First),
        )
        .add_message::<MovementStateChanged>()
        .add_message::<HangingToggled>()
        .add_plugins((
            camera::plugin,
            input::plugin,
            controller::plugin(self.schedule),
            fixed_update_utils::plugin,
        ));
    }
}

/// System set used by all systems of `bevy_parkour`.
#[derive(SystemSet, Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum ParkourSystems {
    MoveCharacters,
}

/// Written whenever a controller's [`MovementState`] changes.
#[derive(Message, Clone, Copy, Debug, PartialEq, Eq)]
pub struct MovementStateChanged {
    pub entity: Entity,
    pub previous: MovementState,
    pub new: MovementState,
}

/// Written whenever a controller grabs or lets go of a ledge.
#[derive(Message, Clone, Copy, Debug, PartialEq, Eq)]
pub struct HangingToggled {
    pub entity: Entity,
    pub hanging: bool,
}

#[derive(Component, Clone, Reflect, Debug)]
#[reflect(Component)]
#[require(
    AccumulatedInput,
    ParkourControllerState,
    TranslationInterpolation,
    RigidBody = RigidBody::Kinematic,
    Collider = Collider::capsule(0.35, 1.1),
    CustomPositionIntegration,
    Transform,
    SpeculativeMargin::ZERO,
)]
#[component(on_add=ParkourController::on_add)]
pub struct ParkourController {
    /// Tunables of the parkour state machine itself.
    pub parkour: ParkourConfig,
    pub crouch_height: f32,
    pub filter: SpatialQueryFilter,
    pub standing_view_height: f32,
    pub crouch_view_height: f32,
    /// Eye height while hanging, roughly level with the ledge.
    pub hang_view_height: f32,
    /// How far, in degrees, the view may turn away from the wall while hanging.
    pub hang_look_yaw_degrees: f32,
    pub ground_distance: f32,
    pub min_walk_cos: f32,
    pub stop_speed: f32,
    pub friction_hz: f32,
    /// Ground friction while sliding.
    pub slide_friction_hz: f32,
    pub acceleration_hz: f32,
    pub air_acceleration_hz: f32,
    pub gravity: f32,
    pub crouch_speed_scale: f32,
    pub speed: f32,
    /// Sideways speed while shuffling along a ledge.
    pub hang_speed: f32,
    pub move_and_slide: MoveAndSlideConfig,
    pub max_speed: f32,
    pub max_air_speed: f32,
    pub unground_speed: f32,
    pub coyote_time: Duration,
    pub jump_input_buffer: Duration,
}

impl Default for ParkourController {
    fn default() -> Self {
        Self {
            parkour: ParkourConfig::default(),
            crouch_height: 1.1,
            filter: SpatialQueryFilter::default(),
            standing_view_height: 1.7,
            crouch_view_height: 1.0,
            hang_view_height: 1.5,
            hang_look_yaw_degrees: 100.0,
            ground_distance: 0.05,
            min_walk_cos: 0.766,
            stop_speed: 2.54,
            friction_hz: 4.0,
            slide_friction_hz: 0.5,
            acceleration_hz: 5.0,
            air_acceleration_hz: 12.0,
            gravity: 9.81,
            crouch_speed_scale: 1.0 / 3.0,
            speed: 6.0,
            hang_speed: 1.5,
            move_and_slide: MoveAndSlideConfig {
                skin_width: 0.0075,
                ..default()
            },
            max_speed: 100.0,
            max_air_speed: 0.76,
            unground_speed: 10.0,
            coyote_time: Duration::from_millis(150),
            jump_input_buffer: Duration::from_millis(150),
        }
    }
}

impl ParkourController {
    pub fn on_add(mut world: DeferredWorld, ctx: HookContext) {
        let (crouch_height, parkour) = {
            let Some(mut controller) = world.get_mut::<Self>(ctx.entity) else {
                return;
            };
            controller.filter.excluded_entities.add(ctx.entity);
            (controller.crouch_height, controller.parkour.clone())
        };

        let Some(collider) = world.entity(ctx.entity).get::<Collider>().cloned() else {
            return;
        };
        let standing_aabb = collider.aabb(default(), Rotation::default());
        let size = standing_aabb.max - standing_aabb.min;
        let capsule = CapsuleSize {
            radius: size.x.min(size.z) / 2.0,
            half_height: size.y / 2.0,
        };

        let movement = match ParkourMovement::new(parkour, capsule) {
            Ok(movement) => movement,
            Err(err) => {
                error!(entity = ?ctx.entity, "removing parkour controller: {err}");
                world.commands().entity(ctx.entity).remove::<Self>();
                return;
            }
        };

        let Some(mut state) = world.get_mut::<ParkourControllerState>(ctx.entity) else {
            return;
        };
        state.standing_collider = collider.clone();

        let standing_height = size.y;
        let mut crouching_collider = Collider::from(SharedShape(Arc::from(
            state.standing_collider.shape().clone_dyn(),
        )));
        if let Some(capsule) = crouching_collider.shape_mut().make_mut().as_capsule_mut() {
            let radius = capsule.radius;
            let new_height = (crouch_height - 2.0 * radius).max(0.0);
            *capsule = Capsule::new_y(new_height / 2.0, radius);
        } else {
            crouching_collider.set_scale(vec3(1.0, crouch_height / standing_height, 1.0), 16);
        }
        state.crouching_collider = Collider::compound(vec![(
            Vec3::Y * (crouch_height - standing_height) / 2.0,
            Rotation::default(),
            crouching_collider,
        )]);

        world
            .commands()
            .entity(ctx.entity)
            .insert(ParkourMachine::new(movement));
    }
}

/// Per-body state of the movement integrator, including everything the parkour state
/// machine asked of the body during the last tick.
#[derive(Component, Clone, Reflect, Debug)]
#[reflect(Component)]
pub struct ParkourControllerState {
    #[reflect(ignore)]
    pub standing_collider: Collider,
    #[reflect(ignore)]
    pub crouching_collider: Collider,
    pub grounded: Option<MoveHitData>,
    pub crouching: bool,
    /// Whether the state machine wants the body crouched.
    pub crouch_requested: bool,
    pub gravity_scale: f32,
    pub collision_enabled: bool,
    pub input_enabled: bool,
    #[reflect(ignore)]
    pub plane_constraint: Option<Dir3>,
    pub movement_state: MovementState,
    pub hanging_state: HangingState,
    pub touching_entities: EntityHashSet,
    pub last_ground: Stopwatch,
}

impl Default for ParkourControllerState {
    fn default() -> Self {
        Self {
            standing_collider: default(),
            crouching_collider: default(),
            grounded: None,
            crouching: false,
            crouch_requested: false,
            gravity_scale: 1.0,
            collision_enabled: true,
            input_enabled: true,
            plane_constraint: None,
            movement_state: default(),
            hanging_state: default(),
            touching_entities: default(),
            last_ground: default(),
        }
    }
}

impl ParkourControllerState {
    pub fn collider(&self) -> &Collider {
        if self.crouching {
            &self.crouching_collider
        } else {
            &self.standing_collider
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Notification {
    State(MovementStateChange),
    Hanging(HangingToggle),
}

/// The [`ParkourMovement`] driving a [`ParkourController`]. Inserted by the controller.
///
/// Its notifications are forwarded as [`MovementStateChanged`] and [`HangingToggled`]
/// messages after every tick.
#[derive(Component, Deref, DerefMut, Debug)]
pub struct ParkourMachine {
    #[deref]
    movement: ParkourMovement,
    outbox: Arc<Mutex<Vec<Notification>>>,
}

impl ParkourMachine {
    fn new(mut movement: ParkourMovement) -> Self {
        let outbox = Arc::new(Mutex::new(Vec::new()));
        let states = outbox.clone();
        movement.on_state_changed(move |change| {
            if let Ok(mut outbox) = states.lock() {
                outbox.push(Notification::State(*change));
            }
        });
        let toggles = outbox.clone();
        movement.on_hanging_toggled(move |toggle| {
            if let Ok(mut outbox) = toggles.lock() {
                outbox.push(Notification::Hanging(*toggle));
            }
        });
        Self { movement, outbox }
    }

    fn take_notifications(&self) -> Vec<Notification> {
        self.outbox
            .lock()
            .map(|mut outbox| core::mem::take(&mut *outbox))
            .unwrap_or_default()
    }
}
