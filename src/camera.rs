//! First-person view of a parkour body. The view rotation is also what lunges aim with.

use core::f32::consts::{FRAC_PI_2, PI, TAU};

use crate::{ParkourControllerState, input::RotateCamera, prelude::*};

pub(super) fn plugin(app: &mut App) {
    app.add_systems(
        RunFixedMainLoop,
        follow_body.after(TransformEasingSystems::UpdateEasingTick),
    )
    .add_observer(look_around);
}

const MAX_PITCH: f32 = FRAC_PI_2 - 0.01;

/// Put this on the camera that follows a [`ParkourController`].
#[derive(Component, Clone, Copy)]
#[relationship(relationship_target = ParkourCamera)]
pub struct ParkourCameraOf(pub Entity);

#[derive(Component, Clone, Copy)]
#[relationship_target(relationship = ParkourCameraOf)]
pub struct ParkourCamera(Entity);

impl ParkourCamera {
    pub fn get(self) -> Entity {
        self.0
    }
}

fn follow_body(
    mut cameras: Query<(&mut Transform, &ParkourCameraOf), Without<ParkourControllerState>>,
    bodies: Query<(&Transform, &ParkourController, &ParkourControllerState)>,
) {
    for (mut camera_transform, camera_of) in &mut cameras {
        let Ok((body_transform, cfg, state)) = bodies.get(camera_of.0) else {
            continue;
        };
        camera_transform.translation =
            body_transform.translation + Vec3::Y * eye_offset(cfg, state);
    }
}

/// Eye position relative to the body origin for the current stance.
pub(crate) fn eye_offset(cfg: &ParkourController, state: &ParkourControllerState) -> f32 {
    // The crouching collider is a shifted compound, so the feet come from the standing one.
    let height = state
        .standing_collider
        .aabb(Vec3::default(), Rotation::default())
        .size()
        .y;
    let view_height = if state.hanging_state.is_hanging() {
        cfg.hang_view_height
    } else if state.crouching {
        cfg.crouch_view_height
    } else {
        cfg.standing_view_height
    };
    -height / 2.0 + view_height
}

fn look_around(
    rotate: On<Fire<RotateCamera>>,
    bodies: Query<(&ParkourCamera, &ParkourController, &ParkourControllerState)>,
    mut transforms: Query<&mut Transform>,
) {
    let Ok((camera, cfg, state)) = bodies.get(rotate.context) else {
        return;
    };
    let hang_facing = if state.hanging_state.is_hanging() {
        transforms
            .get(rotate.context)
            .ok()
            .map(|body| (body.rotation, cfg.hang_look_yaw_degrees.to_radians()))
    } else {
        None
    };
    let Ok(mut transform) = transforms.get_mut(camera.get()) else {
        return;
    };
    transform.rotation = look_rotation(transform.rotation, -rotate.value, hang_facing);
}

/// Turns the view by `delta_degrees` (yaw, pitch).
///
/// With `hang_facing` set to the body's rotation and a limit in radians, the yaw stays
/// within that limit of the way the body faces the wall.
pub(crate) fn look_rotation(
    current: Quat,
    delta_degrees: Vec2,
    hang_facing: Option<(Quat, f32)>,
) -> Quat {
    let (mut yaw, pitch, _) = current.to_euler(EulerRot::YXZ);
    yaw += delta_degrees.x.to_radians();
    let pitch = (pitch + delta_degrees.y.to_radians()).clamp(-MAX_PITCH, MAX_PITCH);

    if let Some((facing, limit)) = hang_facing {
        let (facing_yaw, _, _) = facing.to_euler(EulerRot::YXZ);
        let away = wrap_angle(yaw - facing_yaw).clamp(-limit, limit);
        yaw = facing_yaw + away;
    }
    Quat::from_euler(EulerRot::YXZ, yaw, pitch, 0.0)
}

fn wrap_angle(angle: f32) -> f32 {
    (angle + PI).rem_euclid(TAU) - PI
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hanging::HangingState;

    fn yaw_pitch(rotation: Quat) -> (f32, f32) {
        let (yaw, pitch, _) = rotation.to_euler(EulerRot::YXZ);
        (yaw.to_degrees(), pitch.to_degrees())
    }

    #[test]
    fn free_look_clamps_only_pitch() {
        let (yaw, pitch) = yaw_pitch(look_rotation(Quat::IDENTITY, Vec2::new(30.0, 120.0), None));
        assert!((yaw - 30.0).abs() < 1.0e-3);
        assert!((pitch - MAX_PITCH.to_degrees()).abs() < 1.0e-3);
    }

    #[test]
    fn hanging_look_stays_around_the_wall() {
        let facing = Some((Quat::IDENTITY, 100f32.to_radians()));
        let (yaw, _) = yaw_pitch(look_rotation(Quat::IDENTITY, Vec2::new(170.0, 0.0), facing));
        assert!((yaw - 100.0).abs() < 1.0e-3);

        // Turning the other way past the back of the body does not wrap around.
        let start = Quat::from_rotation_y(-90f32.to_radians());
        let (yaw, _) = yaw_pitch(look_rotation(start, Vec2::new(-60.0, 0.0), facing));
        assert!((yaw - -100.0).abs() < 1.0e-3);
    }

    #[test]
    fn eye_follows_stance() {
        let cfg = ParkourController::default();
        let mut state = ParkourControllerState {
            standing_collider: Collider::capsule(0.35, 1.1),
            ..default()
        };
        // Capsule of height 1.8, origin at its center.
        assert!((eye_offset(&cfg, &state) - (cfg.standing_view_height - 0.9)).abs() < 1.0e-4);

        state.crouching = true;
        assert!((eye_offset(&cfg, &state) - (cfg.crouch_view_height - 0.9)).abs() < 1.0e-4);

        state.hanging_state = HangingState::Hanging;
        assert!((eye_offset(&cfg, &state) - (cfg.hang_view_height - 0.9)).abs() < 1.0e-4);
    }
}
