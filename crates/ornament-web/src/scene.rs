//! 3D scene management

use bevy::input::mouse::{AccumulatedMouseMotion, AccumulatedMouseScroll, MouseScrollUnit};
use bevy::pbr::{DistanceFog, FogFalloff};
use bevy::prelude::*;
use bevy::window::PrimaryWindow;
use ornament_core::tree::{marker_hit_distance, MARKER_RADIUS, PREVIEW_RADIUS};
use ornament_core::{OrnamentRef, Placement, Selection, TreeShape};

use crate::app::{CameraSettings, DecorativeOrnaments, PlacementState, SelectedOrnament, Tree, UserOrnaments};

/// Max pointer travel (in pixels) between press and release for a click;
/// anything longer is an orbit drag
const CLICK_SLOP: f32 = 6.0;

pub struct ScenePlugin;

impl Plugin for ScenePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PressState>()
            .add_systems(Startup, (load_marker_assets, setup_scene).chain())
            .add_systems(Update, (
                update_camera,
                handle_pointer,
                handle_escape,
                sync_user_markers,
                update_preview_marker.after(handle_pointer),
            ));
    }
}

/// Marker component for the main camera
#[derive(Component)]
pub struct MainCamera;

/// A rendered ornament
#[derive(Component, Debug, Clone, Copy)]
pub struct OrnamentMarker(pub OrnamentRef);

/// Marker component for the pending placement preview
#[derive(Component)]
pub struct PreviewMarker;

/// Shared meshes and materials for ornament markers
#[derive(Resource)]
pub struct MarkerAssets {
    pub sphere: Handle<Mesh>,
    pub decorative: Handle<StandardMaterial>,
    pub user: Handle<StandardMaterial>,
}

fn load_marker_assets(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let sphere = meshes.add(Sphere::new(MARKER_RADIUS).mesh().uv(16, 16));
    let decorative = materials.add(StandardMaterial {
        base_color: Color::srgb_u8(0xff, 0x8d, 0xa1),
        emissive: LinearRgba::from(Color::srgb_u8(0xff, 0x40, 0x81)) * 2.0,
        ..default()
    });
    let user = materials.add(StandardMaterial {
        base_color: Color::srgb_u8(0x00, 0xff, 0x88),
        emissive: LinearRgba::from(Color::srgb_u8(0x00, 0xff, 0x00)) * 2.0,
        ..default()
    });

    commands.insert_resource(MarkerAssets { sphere, decorative, user });
}

fn setup_scene(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    marker_assets: Res<MarkerAssets>,
    tree: Res<Tree>,
    decorative: Res<DecorativeOrnaments>,
) {
    let background = Color::srgb_u8(0x0b, 0x0c, 0x1a);

    // Camera - Y up, starting above and in front of the tree
    commands.spawn((
        Camera3d::default(),
        Projection::Perspective(PerspectiveProjection {
            fov: 50f32.to_radians(),
            ..default()
        }),
        Transform::from_xyz(0.0, 10.0, 10.0).looking_at(Vec3::ZERO, Vec3::Y),
        DistanceFog {
            color: background,
            falloff: FogFalloff::Linear { start: 10.0, end: 25.0 },
            ..default()
        },
        AmbientLight {
            color: Color::WHITE,
            brightness: 400.0,
            ..default()
        },
        MainCamera,
    ));

    commands.spawn((
        DirectionalLight {
            illuminance: 6000.0,
            ..default()
        },
        Transform::from_xyz(10.0, 15.0, 10.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    // Warm fill from above the apex
    commands.spawn((
        PointLight {
            intensity: 1_500_000.0,
            range: 30.0,
            color: Color::srgb_u8(0xff, 0xdd, 0xdd),
            ..default()
        },
        Transform::from_xyz(0.0, 10.0, 0.0),
    ));

    // Tree
    let shape = tree.0;
    commands.spawn((
        Mesh3d(meshes.add(Cone::new(shape.base_radius, shape.height).mesh().resolution(64))),
        MeshMaterial3d(materials.add(StandardMaterial {
            base_color: Color::srgb_u8(0x1f, 0x8d, 0x3a),
            perceptual_roughness: 0.8,
            ..default()
        })),
        Transform::from_translation(shape.center),
    ));

    for (index, ornament) in decorative.as_slice().iter().enumerate() {
        commands.spawn((
            Mesh3d(marker_assets.sphere.clone()),
            MeshMaterial3d(marker_assets.decorative.clone()),
            Transform::from_translation(ornament.position),
            OrnamentMarker(OrnamentRef::decorative(index)),
        ));
    }

    // Preview of the pending placement, hidden until a point is picked
    commands.spawn((
        Mesh3d(meshes.add(Sphere::new(PREVIEW_RADIUS).mesh().uv(16, 16))),
        MeshMaterial3d(materials.add(StandardMaterial {
            base_color: Color::srgb(1.0, 1.0, 0.0),
            emissive: LinearRgba::rgb(1.0, 1.0, 0.0) * 3.0,
            ..default()
        })),
        Transform::default(),
        Visibility::Hidden,
        PreviewMarker,
    ));
}

fn update_camera(
    mut camera: Single<&mut Transform, With<MainCamera>>,
    mut settings: ResMut<CameraSettings>,
    mouse_motion: Res<AccumulatedMouseMotion>,
    mouse_scroll: Res<AccumulatedMouseScroll>,
    mouse_button: Res<ButtonInput<MouseButton>>,
    touches: Res<Touches>,
    time: Res<Time>,
    mut contexts: bevy_egui::EguiContexts,
) {
    // Check if egui wants the mouse - if so, don't process camera controls
    let egui_wants_pointer = contexts
        .ctx_mut()
        .map(|ctx| ctx.wants_pointer_input())
        .unwrap_or(false);

    if !egui_wants_pointer {
        // Orbit with left drag or a single finger
        let mut drag = Vec2::ZERO;
        if mouse_button.pressed(MouseButton::Left) {
            drag += mouse_motion.delta;
        }
        if touches.iter().count() == 1 {
            drag += touches.iter().map(|t| t.delta()).sum::<Vec2>();
        }
        settings.azimuth -= drag.x * settings.sensitivity;
        settings.elevation = (settings.elevation + drag.y * settings.sensitivity).clamp(-0.2, 1.5);

        let scroll = match mouse_scroll.unit {
            MouseScrollUnit::Line => mouse_scroll.delta.y,
            MouseScrollUnit::Pixel => mouse_scroll.delta.y / 100.0,
        };
        if scroll != 0.0 {
            let zoom_factor = 1.0 - scroll * settings.zoom_speed;
            settings.target_distance = (settings.target_distance * zoom_factor).clamp(4.0, 30.0);
        }
    }

    // Smooth interpolation for zoom
    let dt = time.delta_secs();
    let lerp_factor = 1.0 - (-settings.smooth_factor * 60.0 * dt).exp();
    settings.distance += (settings.target_distance - settings.distance) * lerp_factor;

    // Spherical coordinates around the target, Y up
    let offset = Vec3::new(
        settings.distance * settings.elevation.cos() * settings.azimuth.sin(),
        settings.distance * settings.elevation.sin(),
        settings.distance * settings.elevation.cos() * settings.azimuth.cos(),
    );
    camera.translation = settings.target + offset;
    camera.look_at(settings.target, Vec3::Y);
}

/// Where the current press started, for click vs. drag detection
#[derive(Resource, Default)]
pub struct PressState {
    start: Option<Vec2>,
}

/// What a click in the scene did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClickOutcome {
    /// A placement was picked on the tree
    Placed(Vec3),
    /// An ornament was selected
    Selected(OrnamentRef),
    Missed,
}

/// Resolve a click ray against the scene.
///
/// While picking, only the tree is clickable; otherwise the nearest marker
/// along the ray is selected.
pub fn resolve_click(
    origin: Vec3,
    direction: Vec3,
    tree: &TreeShape,
    placement: &mut Placement,
    selection: &mut Selection,
    markers: impl IntoIterator<Item = (OrnamentRef, Vec3)>,
) -> ClickOutcome {
    if placement.is_picking() {
        return tree
            .intersect_ray(origin, direction)
            .and_then(|hit| placement.confirm(hit))
            .map_or(ClickOutcome::Missed, ClickOutcome::Placed);
    }

    let nearest = markers
        .into_iter()
        .filter_map(|(target, center)| {
            marker_hit_distance(origin, direction, center, MARKER_RADIUS).map(|t| (t, target))
        })
        .min_by(|a, b| a.0.total_cmp(&b.0));

    match nearest {
        Some((_, target)) => {
            selection.select(target);
            ClickOutcome::Selected(target)
        }
        None => ClickOutcome::Missed,
    }
}

/// Handle tree picking and ornament selection via mouse click or touch tap
fn handle_pointer(
    mouse_button: Res<ButtonInput<MouseButton>>,
    touches: Res<Touches>,
    window: Single<&Window, With<PrimaryWindow>>,
    camera: Single<(&Camera, &GlobalTransform), With<MainCamera>>,
    markers: Query<(&OrnamentMarker, &GlobalTransform)>,
    tree: Res<Tree>,
    mut press: ResMut<PressState>,
    mut placement: ResMut<PlacementState>,
    mut selected: ResMut<SelectedOrnament>,
    mut contexts: bevy_egui::EguiContexts,
) {
    let egui_wants_pointer = contexts
        .ctx_mut()
        .map(|ctx| ctx.wants_pointer_input())
        .unwrap_or(false);

    let mut click_pos = None;

    if mouse_button.just_pressed(MouseButton::Left) && !egui_wants_pointer {
        press.start = window.cursor_position();
    }
    if mouse_button.just_released(MouseButton::Left) {
        if let (Some(start), Some(end)) = (press.start.take(), window.cursor_position()) {
            if start.distance(end) <= CLICK_SLOP {
                click_pos = Some(end);
            }
        }
    }

    for touch in touches.iter_just_pressed() {
        if !egui_wants_pointer {
            press.start = Some(touch.position());
        }
    }
    for touch in touches.iter_just_released() {
        if let Some(start) = press.start.take() {
            if start.distance(touch.position()) <= CLICK_SLOP {
                click_pos = Some(touch.position());
            }
        }
    }

    let Some(pos) = click_pos else {
        return;
    };

    let (camera, camera_transform) = *camera;
    let Ok(ray) = camera.viewport_to_world(camera_transform, pos) else {
        return;
    };

    let outcome = resolve_click(
        ray.origin,
        *ray.direction,
        &tree.0,
        &mut placement.0,
        &mut selected.0,
        markers.iter().map(|(marker, transform)| (marker.0, transform.translation())),
    );

    match outcome {
        ClickOutcome::Placed(point) => tracing::info!("Placement picked at {:?}", point),
        ClickOutcome::Selected(target) => tracing::debug!("Selected ornament {:?}", target),
        ClickOutcome::Missed => {}
    }
}

/// Escape cancels picking, otherwise closes the popup
fn handle_escape(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut placement: ResMut<PlacementState>,
    mut selected: ResMut<SelectedOrnament>,
) {
    if !keyboard.just_pressed(KeyCode::Escape) {
        return;
    }
    if placement.0.is_picking() {
        placement.0.cancel();
    } else {
        selected.0.clear();
    }
}

/// Spawn markers for user ornaments that have arrived since the last frame
pub(crate) fn sync_user_markers(
    mut commands: Commands,
    user: Res<UserOrnaments>,
    marker_assets: Res<MarkerAssets>,
    mut spawned: Local<usize>,
) {
    // The user set only grows, so everything past `spawned` is new
    for (index, ornament) in user.0.iter().enumerate().skip(*spawned) {
        commands.spawn((
            Mesh3d(marker_assets.sphere.clone()),
            MeshMaterial3d(marker_assets.user.clone()),
            Transform::from_translation(ornament.position),
            OrnamentMarker(OrnamentRef::user(index)),
        ));
    }
    *spawned = user.0.len();
}

fn update_preview_marker(
    placement: Res<PlacementState>,
    mut preview: Single<(&mut Transform, &mut Visibility), With<PreviewMarker>>,
) {
    if !placement.is_changed() {
        return;
    }
    let (ref mut transform, ref mut visibility) = *preview;
    match placement.0.preview() {
        Some(point) => {
            transform.translation = point;
            **visibility = Visibility::Visible;
        }
        None => **visibility = Visibility::Hidden,
    }
}
