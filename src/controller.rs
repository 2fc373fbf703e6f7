use bevy_ecs::{intern::Interned, schedule::ScheduleLabel};
use core::time::Duration;
use tracing::warn;

use crate::{
    Notification, ParkourControllerState,
    avian::{AvianBody, AvianGeometry},
    body::yaw_only,
    input::AccumulatedInput,
    prelude::*,
};

pub(super) fn plugin(schedule: Interned<dyn ScheduleLabel>) -> impl Fn(&mut App) {
    move |app: &mut App| {
        app.add_systems(
            schedule,
            run_parkour.in_set(ParkourSystems::MoveCharacters),
        );
    }
}

#[derive(Debug)]
struct Ctx {
    orientation: Transform,
    cfg: ParkourController,
    input: AccumulatedInput,
    dt: f32,
    dt_duration: Duration,
}

fn run_parkour(
    mut controllers: Query<(
        Entity,
        &ParkourController,
        &mut ParkourControllerState,
        &mut ParkourMachine,
        &mut AccumulatedInput,
        &mut Transform,
        &mut LinearVelocity,
        Option<&ParkourCamera>,
    )>,
    cams: Query<&Transform, Without<ParkourController>>,
    colliders: Query<&ColliderOf>,
    rigid_bodies: Query<&RigidBody>,
    time: Res<Time>,
    move_and_slide: MoveAndSlide,
    mut state_changes: MessageWriter<MovementStateChanged>,
    mut hanging_toggles: MessageWriter<HangingToggled>,
) {
    let simulating_physics = |entity: Entity| {
        colliders
            .get(entity)
            .ok()
            .and_then(|collider_of| rigid_bodies.get(collider_of.body).ok())
            .is_some_and(RigidBody::is_dynamic)
    };

    for (entity, cfg, mut state, mut machine, mut input, mut transform, mut velocity, cam) in
        &mut controllers
    {
        state.touching_entities.clear();
        state.last_ground.tick(time.delta());

        let ctx = Ctx {
            orientation: cam
                .and_then(|e| cams.get(e.get()).copied().ok())
                .unwrap_or(*transform),
            cfg: cfg.clone(),
            input: input.clone(),
            dt: time.delta_secs(),
            dt_duration: time.delta(),
        };

        if state.collision_enabled {
            depenetrate_character(&mut transform, &move_and_slide, &state, &ctx);
        }
        update_grounded(&transform, &velocity, &move_and_slide, &mut state, &ctx);

        // The body faces where the player looks, unless a ledge dictates its facing.
        if machine.movement_state() != MovementState::Hang && state.input_enabled {
            transform.rotation = yaw_only(ctx.orientation.rotation);
        }

        {
            let geometry = AvianGeometry::new(
                &move_and_slide.query_pipeline,
                &ctx.cfg.filter,
                &simulating_physics,
            );
            let mut body = AvianBody {
                transform: &mut transform,
                velocity: &mut velocity.0,
                state: &mut state,
                view_rotation: ctx.orientation.rotation,
                movement_input: ctx.input.last_movement.unwrap_or_default(),
                coyote_time: ctx.cfg.coyote_time,
            };
            handle_jump(&mut machine, &mut body, &mut input, &ctx);
            handle_crouch_input(&mut machine, &mut body, &mut input);
            machine.advance(ctx.dt_duration, &mut body, &geometry);
        }
        state.movement_state = machine.movement_state();
        state.hanging_state = machine.hanging_state();

        handle_crouching(*transform, &move_and_slide, &mut state, &ctx);

        if !state.collision_enabled {
            // Attach and corner moves owned by a transition hook.
            transform.translation += velocity.0 * ctx.dt;
        } else if state.movement_state == MovementState::Hang {
            hang_move(&mut transform, &mut velocity, &move_and_slide, &mut state, &ctx);
        } else {
            integrate(&mut transform, &mut velocity, &move_and_slide, &mut state, &ctx);
        }

        for notification in machine.take_notifications() {
            match notification {
                Notification::State(change) => {
                    state_changes.write(MovementStateChanged {
                        entity,
                        previous: change.previous,
                        new: change.new,
                    });
                }
                Notification::Hanging(toggle) => {
                    hanging_toggles.write(HangingToggled {
                        entity,
                        hanging: toggle.hanging,
                    });
                }
            }
        }
    }
}

fn integrate(
    transform: &mut Transform,
    velocity: &mut Vec3,
    move_and_slide: &MoveAndSlide,
    state: &mut ParkourControllerState,
    ctx: &Ctx,
) {
    start_gravity(velocity, state, ctx);

    if state.grounded.is_some() {
        velocity.y = 0.0;
        friction(velocity, state, ctx);
    }

    validate_velocity(velocity, ctx);

    let wish_velocity = calculate_wish_velocity(state, ctx);
    if state.movement_state == MovementState::Wallrun {
        // The state machine owns the velocity while running along a wall.
        constrain_to_plane(velocity, state);
        move_character(transform, velocity, move_and_slide, state, ctx);
    } else if state.grounded.is_some() {
        ground_move(transform, velocity, wish_velocity, move_and_slide, state, ctx);
    } else {
        air_move(transform, velocity, wish_velocity, move_and_slide, state, ctx);
    }

    update_grounded(transform, velocity, move_and_slide, state, ctx);
    validate_velocity(velocity, ctx);

    finish_gravity(velocity, state, ctx);

    if state.grounded.is_some() {
        velocity.y = 0.0;
        state.last_ground.reset();
    }
}

fn depenetrate_character(
    transform: &mut Transform,
    move_and_slide: &MoveAndSlide,
    state: &ParkourControllerState,
    ctx: &Ctx,
) {
    let offset = move_and_slide.depenetrate(
        state.collider(),
        transform.translation,
        transform.rotation,
        &((&ctx.cfg.move_and_slide).into()),
        &ctx.cfg.filter,
    );
    transform.translation += offset;
}

/// Sideways shuffle along the ledge. No gravity, no motion off the wall plane.
fn hang_move(
    transform: &mut Transform,
    velocity: &mut Vec3,
    move_and_slide: &MoveAndSlide,
    state: &mut ParkourControllerState,
    ctx: &Ctx,
) {
    let lateral = ctx.input.last_movement.unwrap_or_default().x;
    let mut right = Vec3::from(transform.right());
    right.y = 0.0;
    *velocity = right.normalize_or_zero() * lateral * ctx.cfg.hang_speed;
    constrain_to_plane(velocity, state);
    validate_velocity(velocity, ctx);
    move_character(transform, velocity, move_and_slide, state, ctx);
    velocity.y = 0.0;
}

fn ground_move(
    transform: &mut Transform,
    velocity: &mut Vec3,
    wish_velocity: Vec3,
    move_and_slide: &MoveAndSlide,
    state: &mut ParkourControllerState,
    ctx: &Ctx,
) {
    velocity.y = 0.0;
    accelerate(velocity, wish_velocity, wish_velocity.length(), ctx.cfg.acceleration_hz, ctx);
    velocity.y = 0.0;
    constrain_to_plane(velocity, state);

    if velocity.length() < 0.01 {
        *velocity = Vec3::ZERO;
        return;
    }
    move_character(transform, velocity, move_and_slide, state, ctx);
}

fn air_move(
    transform: &mut Transform,
    velocity: &mut Vec3,
    wish_velocity: Vec3,
    move_and_slide: &MoveAndSlide,
    state: &mut ParkourControllerState,
    ctx: &Ctx,
) {
    let capped = f32::min(wish_velocity.length(), ctx.cfg.max_air_speed);
    accelerate(velocity, wish_velocity, capped, ctx.cfg.air_acceleration_hz, ctx);
    constrain_to_plane(velocity, state);
    move_character(transform, velocity, move_and_slide, state, ctx);
}

/// Accelerates toward `wish_velocity` until the speed along it reaches `max_speed`.
fn accelerate(
    velocity: &mut Vec3,
    wish_velocity: Vec3,
    max_speed: f32,
    acceleration_hz: f32,
    ctx: &Ctx,
) {
    let Ok((wish_dir, wish_speed)) = Dir3::new_and_length(wish_velocity) else {
        return;
    };
    let current_speed = velocity.dot(*wish_dir);
    let add_speed = max_speed - current_speed;

    if add_speed <= 0.0 {
        return;
    }

    let accel_speed = wish_speed * acceleration_hz * ctx.dt;
    let accel_speed = f32::min(accel_speed, add_speed);

    *velocity += accel_speed * wish_dir;
}

fn constrain_to_plane(velocity: &mut Vec3, state: &ParkourControllerState) {
    if let Some(normal) = state.plane_constraint {
        *velocity -= *normal * velocity.dot(*normal);
    }
}

fn move_character(
    transform: &mut Transform,
    velocity: &mut Vec3,
    move_and_slide: &MoveAndSlide,
    state: &mut ParkourControllerState,
    ctx: &Ctx,
) {
    let mut config = ctx.cfg.move_and_slide.clone();
    if let Some(grounded) = state.grounded {
        config.planes.push(Dir3::new_unchecked(grounded.normal1));
    }

    let mut touching_entities = core::mem::take(&mut state.touching_entities);
    let out = move_and_slide.move_and_slide(
        state.collider(),
        transform.translation,
        transform.rotation,
        *velocity,
        ctx.dt_duration,
        &config,
        &ctx.cfg.filter,
        |hit| {
            touching_entities.insert(hit.entity);
            true
        },
    );
    transform.translation = out.position;
    *velocity = out.projected_velocity;
    core::mem::swap(&mut state.touching_entities, &mut touching_entities);
}

fn update_grounded(
    transform: &Transform,
    velocity: &Vec3,
    move_and_slide: &MoveAndSlide,
    state: &mut ParkourControllerState,
    ctx: &Ctx,
) {
    if !state.collision_enabled || velocity.y > ctx.cfg.unground_speed {
        state.grounded = None;
        return;
    }
    let cast_dir = Dir3::NEG_Y;
    let cast_dist = ctx.cfg.ground_distance;
    let hit = move_and_slide.cast_move(
        state.collider(),
        transform.translation,
        transform.rotation,
        cast_dir * cast_dist,
        ctx.cfg.move_and_slide.skin_width,
        &ctx.cfg.filter,
    );
    state.grounded = hit.filter(|hit| hit.normal1.y >= ctx.cfg.min_walk_cos);
}

fn friction(velocity: &mut Vec3, state: &ParkourControllerState, ctx: &Ctx) {
    let speed = velocity.length();
    if speed < 0.001 {
        return;
    }

    let friction = if state.movement_state == MovementState::Slide {
        ctx.cfg.slide_friction_hz
    } else {
        ctx.cfg.friction_hz
    };
    let control = f32::max(speed, ctx.cfg.stop_speed);
    let drop = control * friction * ctx.dt;

    let new_speed = (speed - drop).max(0.0);
    if new_speed != speed {
        *velocity *= new_speed / speed;
    }
}

/// Feeds a buffered jump press to the state machine. A press stays buffered for
/// `jump_input_buffer` so it can land right after touching down.
fn handle_jump(
    machine: &mut ParkourMachine,
    body: &mut AvianBody,
    input: &mut AccumulatedInput,
    ctx: &Ctx,
) {
    let Some(jump_time) = input.jumped.clone() else {
        return;
    };
    if jump_time.elapsed() > ctx.cfg.jump_input_buffer {
        return;
    }
    if !machine.attempt_jump(&mut *body) {
        return;
    }
    input.jumped = None;
    body.state.grounded = None;
    body.state.last_ground.set_elapsed(ctx.cfg.coyote_time);
}

/// Replays the crouch edges since the last tick as crouch and uncrouch attempts.
fn handle_crouch_input(
    machine: &mut ParkourMachine,
    body: &mut AvianBody,
    input: &mut AccumulatedInput,
) {
    let Some(crouch) = input.crouch.take() else {
        return;
    };
    for &pressed in crouch.edges() {
        if pressed {
            machine.attempt_crouch(&mut *body);
        } else {
            machine.attempt_uncrouch(&mut *body);
        }
    }
}

fn start_gravity(velocity: &mut Vec3, state: &ParkourControllerState, ctx: &Ctx) {
    velocity.y -= ctx.cfg.gravity * state.gravity_scale * 0.5 * ctx.dt;
    validate_velocity(velocity, ctx);
}

fn finish_gravity(velocity: &mut Vec3, state: &ParkourControllerState, ctx: &Ctx) {
    velocity.y -= ctx.cfg.gravity * state.gravity_scale * 0.5 * ctx.dt;
    validate_velocity(velocity, ctx);
}

fn validate_velocity(velocity: &mut Vec3, ctx: &Ctx) {
    for i in 0..3 {
        if !velocity[i].is_finite() {
            warn!("velocity[{i}] is not finite: {}, setting to 0", velocity[i]);
            velocity[i] = 0.0;
        }
    }
    *velocity = velocity.clamp_length(0.0, ctx.cfg.max_speed);
}

fn calculate_wish_velocity(state: &ParkourControllerState, ctx: &Ctx) -> Vec3 {
    if !state.input_enabled {
        return Vec3::ZERO;
    }
    let movement = ctx.input.last_movement.unwrap_or_default();
    let mut forward = Vec3::from(ctx.orientation.forward());
    forward.y = 0.0;
    forward = forward.normalize_or_zero();
    let mut right = Vec3::from(ctx.orientation.right());
    right.y = 0.0;
    right = right.normalize_or_zero();

    let wish_dir = (movement.y * forward + movement.x * right).normalize_or_zero();

    let speed = if state.crouching {
        ctx.cfg.speed * ctx.cfg.crouch_speed_scale
    } else {
        ctx.cfg.speed
    };
    wish_dir * speed
}

/// Applies the machine's crouch request. Standing up waits until there is headroom.
fn handle_crouching(
    transform: Transform,
    move_and_slide: &MoveAndSlide,
    state: &mut ParkourControllerState,
    ctx: &Ctx,
) {
    if state.crouch_requested {
        state.crouching = true;
    } else if state.crouching {
        state.crouching = false;
        let is_intersecting = is_intersecting(transform, state, move_and_slide, ctx);
        state.crouching = is_intersecting;
    }
}

#[must_use]
fn is_intersecting(
    transform: Transform,
    state: &ParkourControllerState,
    move_and_slide: &MoveAndSlide,
    ctx: &Ctx,
) -> bool {
    let mut intersecting = false;
    move_and_slide.query_pipeline.shape_intersections_callback(
        state.collider(),
        transform.translation,
        transform.rotation,
        &ctx.cfg.filter,
        |_| {
            intersecting = true;
            false
        },
    );
    intersecting
}
