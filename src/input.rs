use bevy_time::Stopwatch;

use crate::prelude::*;

use crate::fixed_update_utils::did_fixed_timestep_run_this_frame;

pub(super) fn plugin(app: &mut App) {
    app.add_observer(apply_movement)
        .add_observer(apply_jump)
        .add_observer(press_crouch)
        .add_observer(release_crouch)
        .add_systems(
            RunFixedMainLoop,
            clear_accumulated_input
                .run_if(did_fixed_timestep_run_this_frame)
                .in_set(RunFixedMainLoopSystems::AfterFixedMainLoop),
        )
        .add_systems(PreUpdate, tick_timers.in_set(EnhancedInputSystems::Update));
}

/// Walking, and shuffling sideways while hanging.
#[derive(Debug, InputAction)]
#[action_output(Vec2)]
pub struct Movement;

/// Jumps, lunges off ledges and walls.
#[derive(Debug, InputAction)]
#[action_output(bool)]
pub struct Jump;

/// Held to crawl, slide or tuck. Pressing it while hanging lets go.
#[derive(Debug, InputAction)]
#[action_output(bool)]
pub struct Crouch;

#[derive(Debug, InputAction)]
#[action_output(Vec2)]
pub struct RotateCamera;

/// Crouch edges since the last fixed update loop, folded so that the machine sees the
/// same net presses and releases no matter how many frames passed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Reflect)]
pub enum CrouchInput {
    Pressed,
    Released,
    /// Pressed, then released before a fixed tick ran. Still starts a slide.
    PressedAndReleased,
    /// Released, then pressed again. Still ends a slide.
    ReleasedAndPressed,
}

impl CrouchInput {
    /// The edges to replay, `true` for a press.
    pub fn edges(self) -> &'static [bool] {
        match self {
            CrouchInput::Pressed => &[true],
            CrouchInput::Released => &[false],
            CrouchInput::PressedAndReleased => &[true, false],
            CrouchInput::ReleasedAndPressed => &[false, true],
        }
    }
}

/// Input accumulated since the last fixed update loop. Is cleared after every fixed update loop.
#[derive(Component, Clone, Reflect, Default, Debug)]
#[reflect(Component)]
pub struct AccumulatedInput {
    // The last non-zero move that was input since the last fixed update loop
    pub last_movement: Option<Vec2>,
    // Time since the last jump input. Will be `None` once the state machine took the jump.
    pub jumped: Option<Stopwatch>,
    // Will be `None` once the state machine took the crouch edges.
    pub crouch: Option<CrouchInput>,
}

impl AccumulatedInput {
    pub fn press_crouch(&mut self) {
        self.crouch = match self.crouch {
            None | Some(CrouchInput::PressedAndReleased) => Some(CrouchInput::Pressed),
            Some(CrouchInput::Released) => Some(CrouchInput::ReleasedAndPressed),
            held => held,
        };
    }

    pub fn release_crouch(&mut self) {
        self.crouch = match self.crouch {
            None | Some(CrouchInput::ReleasedAndPressed) => Some(CrouchInput::Released),
            Some(CrouchInput::Pressed) => Some(CrouchInput::PressedAndReleased),
            released => released,
        };
    }
}

fn apply_movement(
    movement: On<Fire<Movement>>,
    mut accumulated_inputs: Query<&mut AccumulatedInput>,
) {
    if let Ok(mut accumulated_inputs) = accumulated_inputs.get_mut(movement.context) {
        accumulated_inputs.last_movement = Some(movement.value);
    }
}

fn apply_jump(jump: On<Fire<Jump>>, mut accumulated_inputs: Query<&mut AccumulatedInput>) {
    if let Ok(mut accumulated_inputs) = accumulated_inputs.get_mut(jump.context) {
        accumulated_inputs.jumped = Some(Stopwatch::new());
    }
}

fn press_crouch(crouch: On<Start<Crouch>>, mut accumulated_inputs: Query<&mut AccumulatedInput>) {
    if let Ok(mut accumulated_inputs) = accumulated_inputs.get_mut(crouch.context) {
        accumulated_inputs.press_crouch();
    }
}

fn release_crouch(
    crouch: On<Complete<Crouch>>,
    mut accumulated_inputs: Query<&mut AccumulatedInput>,
) {
    if let Ok(mut accumulated_inputs) = accumulated_inputs.get_mut(crouch.context) {
        accumulated_inputs.release_crouch();
    }
}

fn clear_accumulated_input(mut accumulated_inputs: Query<&mut AccumulatedInput>) {
    for mut accumulated_input in &mut accumulated_inputs {
        // Unconsumed jumps stay buffered, crouch edges are taken by the first fixed tick.
        accumulated_input.last_movement = None;
    }
}

fn tick_timers(mut inputs: Query<&mut AccumulatedInput>, time: Res<Time>) {
    for mut input in inputs.iter_mut() {
        if let Some(jumped) = input.jumped.as_mut() {
            jumped.tick(time.delta());
        }
    }
}
