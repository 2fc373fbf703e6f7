//! Parkour tunables and their validation.

use bevy_math::prelude::*;
use bevy_reflect::prelude::*;
use core::time::Duration;
use thiserror::Error;

use crate::body::CapsuleSize;

/// Tunables of the parkour state machine.
///
/// Distances are in meters, speeds in meters per second.
#[derive(Clone, Debug, Reflect)]
pub struct ParkourConfig {
    /// Half extents of the box swept above a ledge to make sure the hands fit.
    /// `x` is the lateral half width, `y` the vertical half thickness and `z` the depth.
    pub hand_half_extents: Vec3,
    /// Height above the body origin at which ledges are looked for.
    pub grab_height: f32,
    /// How far in front of the body ledges are looked for.
    pub grab_reach: f32,
    /// Vertical distance between the ledge surface and the body origin while hanging.
    pub attach_height: f32,
    /// Horizontal distance between the wall and the body origin while hanging.
    pub attach_distance: f32,
    /// Half extents of the regions spawned at the left and right ends of a hang plane.
    /// `x` is the lateral half width, `y` the vertical half height and `z` the depth.
    pub edge_region_half_extents: Vec3,

    /// Horizontal speed needed to turn a crouch into a slide.
    pub min_slide_speed: f32,
    /// Horizontal velocity added when a slide starts.
    pub slide_force: f32,
    pub slide_duration: Duration,
    /// Horizontal speed needed to turn an airborne crouch into a tuck jump.
    pub min_tuck_jump_speed: f32,
    /// Forward velocity added by a tuck jump. Once per airborne phase.
    pub tuck_jump_forward_force: f32,

    /// Upward velocity of a grounded jump.
    pub jump_velocity: f32,
    /// Speed of a lunge off a ledge or a wall.
    pub lunge_speed: f32,
    /// A lunge always leaves with at least `jump_velocity * lunge_lift_factor` upward.
    pub lunge_lift_factor: f32,
    /// View pitch range, in degrees, lunges are aimed within.
    pub lunge_min_pitch_degrees: f32,
    pub lunge_max_pitch_degrees: f32,

    /// How long after leaving the ground wall-runs may start or continue.
    pub max_wallrun_time: Duration,
    /// Cooldown after jumping off a wall during which no wall-run can start.
    pub no_wallrun_cooldown: Duration,
    /// Cooldown after letting go of a ledge during which no hang is attempted.
    pub no_hang_cooldown: Duration,
    pub wallrun_forward_speed: f32,
    /// Speed pulling the body into the wall during a wall-run.
    pub wallrun_lateral_speed: f32,
    /// Largest speed away from or into the wall a wall-run tolerates.
    pub max_wallrun_lateral_speed: f32,
    /// Smallest speed along the wall a wall-run needs.
    pub min_wallrun_forward_speed: f32,
    /// A wall-run keeps the body level with the jump-off point while within this height of it.
    pub wallrun_height_boost_range: f32,

    /// Length of the Ahead, Behind, Left and Right scans, in capsule radii.
    pub side_trace_radius_factor: f32,
}

impl Default for ParkourConfig {
    fn default() -> Self {
        Self {
            hand_half_extents: Vec3::new(0.15, 0.01, 0.05),
            grab_height: 0.65,
            grab_reach: 1.0,
            attach_height: 0.65,
            attach_distance: CapsuleSize::default().radius + 0.06,
            edge_region_half_extents: Vec3::new(0.06, 0.64, 0.64),
            min_slide_speed: 8.0,
            slide_force: 8.0,
            slide_duration: Duration::from_secs(1),
            min_tuck_jump_speed: 2.0,
            tuck_jump_forward_force: 12.0,
            jump_velocity: 4.2,
            lunge_speed: 10.0,
            lunge_lift_factor: 1.5,
            lunge_min_pitch_degrees: -30.0,
            lunge_max_pitch_degrees: 5.0,
            max_wallrun_time: Duration::from_secs(2),
            no_wallrun_cooldown: Duration::from_millis(70),
            no_hang_cooldown: Duration::from_millis(100),
            wallrun_forward_speed: 12.0,
            wallrun_lateral_speed: 2.0,
            max_wallrun_lateral_speed: 9.0,
            min_wallrun_forward_speed: 0.1,
            wallrun_height_boost_range: 3.0,
            side_trace_radius_factor: 5.0,
        }
    }
}

/// Configuration faults detected when a [`ParkourMovement`](crate::ParkourMovement) is built.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParkourError {
    #[error("capsule must have a positive radius and half height, got {0:?}")]
    DegenerateCapsule(CapsuleSize),
    #[error("`{field}` must be positive, got {value}")]
    NonPositive { field: &'static str, value: f32 },
    #[error("`{field}` components must all be positive, got {value}")]
    NonPositiveExtents { field: &'static str, value: Vec3 },
    #[error("lunge pitch range is empty: [{min}, {max}]")]
    EmptyPitchRange { min: f32, max: f32 },
}

impl ParkourConfig {
    /// Checks the config together with the capsule it will drive.
    pub fn validate(&self, capsule: CapsuleSize) -> Result<(), ParkourError> {
        let finite_positive = |v: f32| v.is_finite() && v > 0.0;
        if !finite_positive(capsule.radius) || !finite_positive(capsule.half_height) {
            return Err(ParkourError::DegenerateCapsule(capsule));
        }
        for (field, value) in [
            ("grab_height", self.grab_height),
            ("grab_reach", self.grab_reach),
            ("attach_height", self.attach_height),
            ("attach_distance", self.attach_distance),
            ("side_trace_radius_factor", self.side_trace_radius_factor),
        ] {
            if !finite_positive(value) {
                return Err(ParkourError::NonPositive { field, value });
            }
        }
        for (field, value) in [
            ("hand_half_extents", self.hand_half_extents),
            ("edge_region_half_extents", self.edge_region_half_extents),
        ] {
            if !(value.is_finite() && value.cmpgt(Vec3::ZERO).all()) {
                return Err(ParkourError::NonPositiveExtents { field, value });
            }
        }
        if self.lunge_min_pitch_degrees > self.lunge_max_pitch_degrees {
            return Err(ParkourError::EmptyPitchRange {
                min: self.lunge_min_pitch_degrees,
                max: self.lunge_max_pitch_degrees,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(
            ParkourConfig::default().validate(CapsuleSize::default()),
            Ok(())
        );
    }

    #[test]
    fn rejects_degenerate_capsule() {
        let capsule = CapsuleSize {
            radius: 0.0,
            half_height: 0.9,
        };
        assert_eq!(
            ParkourConfig::default().validate(capsule),
            Err(ParkourError::DegenerateCapsule(capsule))
        );
    }

    #[test]
    fn rejects_bad_tunables() {
        let cfg = ParkourConfig {
            grab_reach: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(CapsuleSize::default()),
            Err(ParkourError::NonPositive {
                field: "grab_reach",
                ..
            })
        ));

        let cfg = ParkourConfig {
            hand_half_extents: Vec3::new(0.15, 0.0, 0.05),
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(CapsuleSize::default()),
            Err(ParkourError::NonPositiveExtents { .. })
        ));

        let cfg = ParkourConfig {
            lunge_min_pitch_degrees: 10.0,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(CapsuleSize::default()),
            Err(ParkourError::EmptyPitchRange { .. })
        ));
    }
}
