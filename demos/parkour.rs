use avian3d::prelude::*;
use bevy::{
    input::common_conditions::input_just_pressed,
    prelude::*,
    window::{CursorGrabMode, CursorOptions},
};
use bevy_enhanced_input::prelude::*;
use bevy_parkour::prelude::*;

fn main() -> AppExit {
    App::new()
        .add_plugins((
            DefaultPlugins,
            PhysicsPlugins::default(),
            EnhancedInputPlugin,
            ParkourPlugin::default(),
        ))
        .add_input_context::<PlayerInput>()
        .add_systems(Startup, (setup, spawn_level))
        .add_systems(
            Update,
            (
                log_parkour_messages,
                capture_cursor.run_if(input_just_pressed(MouseButton::Left)),
                release_cursor.run_if(input_just_pressed(KeyCode::Escape)),
            ),
        )
        .run()
}

fn setup(mut commands: Commands) {
    let player = commands
        .spawn((
            // Parkour tunables live in `ParkourController::parkour`.
            ParkourController::default(),
            Collider::capsule(0.35, 1.1),
            Transform::from_xyz(0.0, 2.0, 6.0),
            PlayerInput,
            actions!(PlayerInput[
                (
                    Action::<Movement>::new(),
                    DeadZone::default(),
                    Bindings::spawn((
                        Cardinal::wasd_keys(),
                        Axial::left_stick()
                    ))
                ),
                (
                    Action::<Jump>::new(),
                    bindings![KeyCode::Space, GamepadButton::South],
                ),
                (
                    Action::<Crouch>::new(),
                    bindings![KeyCode::ControlLeft, GamepadButton::LeftTrigger2],
                ),
                (
                    Action::<RotateCamera>::new(),
                    Bindings::spawn((
                        Spawn((Binding::mouse_motion(), Scale::splat(0.07))),
                        Axial::right_stick().with((Scale::splat(4.0), DeadZone::default())),
                    ))
                ),
            ]),
        ))
        .id();

    commands.spawn((Camera3d::default(), ParkourCameraOf(player)));

    commands.spawn((
        Transform::from_xyz(0.0, 1.0, 0.0).looking_at(vec3(1.0, -2.0, -2.0), Vec3::Y),
        DirectionalLight {
            shadows_enabled: true,
            ..default()
        },
    ));
}

/// Floor, a ledge to hang from, a long wall to run along and a pillar to hang around.
fn spawn_level(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let material = materials.add(Color::srgb(0.6, 0.6, 0.65));
    let blocks = [
        // floor
        (vec3(0.0, -0.5, 0.0), vec3(60.0, 1.0, 60.0)),
        // ledge wall, top at 2.6m
        (vec3(0.0, 1.3, -6.0), vec3(6.0, 2.6, 1.0)),
        // wall-run wall
        (vec3(-8.0, 2.5, -10.0), vec3(1.0, 5.0, 24.0)),
        // pillar
        (vec3(7.0, 1.4, -4.0), vec3(1.2, 2.8, 1.2)),
    ];
    for (center, size) in blocks {
        commands.spawn((
            Mesh3d(meshes.add(Cuboid::from_size(size))),
            MeshMaterial3d(material.clone()),
            Transform::from_translation(center),
            RigidBody::Static,
            Collider::cuboid(size.x, size.y, size.z),
        ));
    }
}

fn log_parkour_messages(
    mut states: MessageReader<MovementStateChanged>,
    mut toggles: MessageReader<HangingToggled>,
) {
    for change in states.read() {
        info!(
            "{}: {:?} -> {:?}",
            change.entity, change.previous, change.new
        );
    }
    for toggle in toggles.read() {
        info!("{}: hanging = {}", toggle.entity, toggle.hanging);
    }
}

#[derive(Component, Default)]
pub(crate) struct PlayerInput;

fn capture_cursor(mut cursor: Single<&mut CursorOptions>) {
    cursor.grab_mode = CursorGrabMode::Locked;
    cursor.visible = false;
}

fn release_cursor(mut cursor: Single<&mut CursorOptions>) {
    cursor.visible = true;
    cursor.grab_mode = CursorGrabMode::None;
}
