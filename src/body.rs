//! The body a parkour machine drives, and helpers for its body-relative axes.

use bevy_math::prelude::*;
use bevy_reflect::prelude::*;

/// Dimensions of the capsule the body collides with.
#[derive(Clone, Copy, Debug, PartialEq, Reflect)]
pub struct CapsuleSize {
    pub radius: f32,
    /// Half of the full standing height, caps included.
    pub half_height: f32,
}

impl Default for CapsuleSize {
    fn default() -> Self {
        Self {
            radius: 0.35,
            half_height: 0.9,
        }
    }
}

/// Everything the state machine reads from and writes to the body it drives.
///
/// The host's movement integrator implements this and applies the outputs
/// (velocity, gravity scale, plane constraint, collision and input toggles) when it
/// integrates the body after [`ParkourMovement::advance`](crate::ParkourMovement::advance).
pub trait ParkourBody {
    fn location(&self) -> Vec3;
    fn set_location(&mut self, location: Vec3);
    fn rotation(&self) -> Quat;
    fn set_rotation(&mut self, rotation: Quat);
    /// Rotation the player is looking with. Used to aim lunges.
    fn view_rotation(&self) -> Quat;

    fn velocity(&self) -> Vec3;
    fn set_velocity(&mut self, velocity: Vec3);
    fn set_gravity_scale(&mut self, scale: f32);

    fn set_collision_enabled(&mut self, enabled: bool);
    fn set_input_enabled(&mut self, enabled: bool);
    /// Restricts motion to the plane with the given normal, or lifts the restriction.
    fn set_plane_constraint(&mut self, normal: Option<Dir3>);

    /// Movement input in body space: `x` is right, `y` is forward.
    fn movement_input(&self) -> Vec2;
    fn is_grounded(&self) -> bool;
    fn is_crouching(&self) -> bool;
    fn crouch(&mut self);
    fn uncrouch(&mut self);
}

/// Converts a body-space offset (forward, right, up) into world space.
pub(crate) fn local_offset(rotation: Quat, forward: f32, right: f32, up: f32) -> Vec3 {
    rotation * Vec3::new(right, up, -forward)
}

/// Yaw-only rotation whose forward axis points along the horizontal part of `direction`.
pub(crate) fn yaw_facing(direction: Vec3) -> Option<Quat> {
    let flat = Vec3::new(direction.x, 0.0, direction.z);
    if flat.length_squared() < 1.0e-8 {
        return None;
    }
    Some(Quat::from_rotation_y(f32::atan2(-flat.x, -flat.z)))
}

/// Strips pitch and roll from `rotation`.
pub(crate) fn yaw_only(rotation: Quat) -> Quat {
    let (yaw, _, _) = rotation.to_euler(EulerRot::YXZ);
    Quat::from_rotation_y(yaw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::f32::consts::FRAC_PI_2;

    #[test]
    fn local_offset_follows_bevy_axes() {
        let offset = local_offset(Quat::IDENTITY, 1.0, 2.0, 3.0);
        assert!(offset.abs_diff_eq(Vec3::new(2.0, 3.0, -1.0), 1.0e-6));

        // Turning left by a quarter puts "forward" on -X.
        let turned = local_offset(Quat::from_rotation_y(FRAC_PI_2), 1.0, 0.0, 0.0);
        assert!(turned.abs_diff_eq(Vec3::NEG_X, 1.0e-6));
    }

    #[test]
    fn yaw_facing_ignores_vertical_part() {
        let rotation = yaw_facing(Vec3::new(1.0, 5.0, 0.0)).unwrap();
        assert!((rotation * Vec3::NEG_Z).abs_diff_eq(Vec3::X, 1.0e-5));
        assert!(yaw_facing(Vec3::Y).is_none());
    }

    #[test]
    fn yaw_only_drops_pitch() {
        let rotation = Quat::from_euler(EulerRot::YXZ, 0.3, 0.7, 0.0);
        let flat = yaw_only(rotation);
        assert!((flat * Vec3::NEG_Z).y.abs() < 1.0e-6);
        let (yaw, pitch, roll) = flat.to_euler(EulerRot::YXZ);
        assert!((yaw - 0.3).abs() < 1.0e-5);
        assert!(pitch.abs() < 1.0e-6 && roll.abs() < 1.0e-6);
    }
}
