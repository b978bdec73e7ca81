use bevy::prelude::*;
use bevy_infinite_grid::{InfiniteGridBundle, InfiniteGridPlugin, InfiniteGridSettings};
use bevy_orbital_surfaces::{
    IsosurfacePlugin,
    grid::{Bounds, ScalarGrid},
    plugin::{Lobe, OrbitalSurface},
    types::{Point, Vector},
};
use bevy_panorbit_camera::{PanOrbitCamera, PanOrbitCameraPlugin};

const RESOLUTION: usize = 72;
const ISOVALUE_STEP: f32 = 0.005;

fn main() {
    App::new()
        .add_plugins((
            DefaultPlugins,
            IsosurfacePlugin::default(),
            PanOrbitCameraPlugin,
            InfiniteGridPlugin,
        ))
        .add_systems(Startup, setup)
        .add_systems(Update, adjust_isovalue)
        .run();
}

/// A 3d_xy-like orbital: four lobes of alternating sign in the xz-plane.
fn d_orbital(p: Point) -> f32 {
    let r = p.coords.norm();
    p.x * p.z * (-r / 1.5).exp()
}

fn setup(
    mut commands: Commands,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    bevy::log::info!("Orbital Lobes Example: Up/Down to change the isovalue");

    commands.spawn(InfiniteGridBundle {
        settings: InfiniteGridSettings {
            fadeout_distance: 200.0,
            ..Default::default()
        },
        ..Default::default()
    });

    commands.spawn((
        Camera3d::default(),
        PanOrbitCamera {
            button_orbit: MouseButton::Right,
            button_pan: MouseButton::Middle,
            ..default()
        },
        Transform::from_xyz(12.0, 10.0, 12.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    commands.spawn((
        DirectionalLight {
            illuminance: light_consts::lux::OVERCAST_DAY,
            ..Default::default()
        },
        Transform::default().with_rotation(Quat::from_rotation_x(-45.0_f32.to_radians())),
    ));

    let bounds = Bounds::centered(Point::new(0.0, 3.0, 0.0), Vector::new(16.0, 16.0, 16.0))
        .expect("demo bounds are valid");
    let grid =
        ScalarGrid::from_fn(RESOLUTION, bounds, &d_orbital).expect("demo grid is valid");

    for surface in OrbitalSurface::lobes(grid, 0.02) {
        let color = match surface.lobe {
            Lobe::Positive => Color::srgb(0.2, 0.45, 0.95),
            Lobe::Negative => Color::srgb(0.95, 0.3, 0.2),
        };
        commands.spawn((
            surface,
            MeshMaterial3d(materials.add(StandardMaterial {
                base_color: color,
                double_sided: true,
                cull_mode: None,
                ..Default::default()
            })),
        ));
    }
}

/// Every press re-queues both lobes. Rapid presses supersede in-flight extractions.
fn adjust_isovalue(keys: Res<ButtonInput<KeyCode>>, mut surfaces: Query<&mut OrbitalSurface>) {
    let delta = if keys.just_pressed(KeyCode::ArrowUp) {
        ISOVALUE_STEP
    } else if keys.just_pressed(KeyCode::ArrowDown) {
        -ISOVALUE_STEP
    } else {
        return;
    };

    for mut surface in surfaces.iter_mut() {
        surface.isovalue = (surface.isovalue + delta).max(ISOVALUE_STEP);
        bevy::log::info!(lobe = ?surface.lobe, isovalue = surface.isovalue);
    }
}
