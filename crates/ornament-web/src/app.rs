//! Bevy application setup and shared state

use bevy::prelude::*;
use bevy_egui::EguiPlugin;
use bevy_picking::DefaultPickingPlugins;
use ornament_core::tree::generate_decorative;
use ornament_core::{Ornament, OrnamentBook, OrnamentForm, OrnamentKind, OrnamentRef, Placement, Selection, StoreConfig, TreeShape};

use crate::network::{NetworkPlugin, StoreSettings};
use crate::scene::ScenePlugin;
use crate::ui::UiPlugin;

/// Tree dimensions used for rendering, scattering and picking
#[derive(Debug, Clone, Resource, Default)]
pub struct Tree(pub TreeShape);

/// Decorative ornaments, generated once at startup and never modified
#[derive(Debug, Clone, Resource)]
pub struct DecorativeOrnaments(Vec<Ornament>);

impl DecorativeOrnaments {
    pub fn generate(shape: &TreeShape) -> Self {
        Self(generate_decorative(shape, &mut rand::thread_rng()))
    }

    pub fn as_slice(&self) -> &[Ornament] {
        &self.0
    }
}

/// Ornaments from the store, the realtime channel, and local submissions
#[derive(Debug, Clone, Resource, Default)]
pub struct UserOrnaments(pub OrnamentBook);

/// Pending placement for the next submission
#[derive(Debug, Clone, Resource, Default)]
pub struct PlacementState(pub Placement);

/// Ornament shown in the detail popup
#[derive(Debug, Clone, Resource, Default)]
pub struct SelectedOrnament(pub Selection);

/// Submission form fields
#[derive(Debug, Clone, Resource, Default)]
pub struct FormState(pub OrnamentForm);

/// Realtime channel status for the UI indicator
#[derive(Debug, Clone, Resource, Default)]
pub struct ChannelStatus {
    pub joined: bool,
}

/// Look up an ornament in either set
pub fn resolve_ornament<'a>(
    target: OrnamentRef,
    decorative: &'a DecorativeOrnaments,
    user: &'a UserOrnaments,
) -> Option<&'a Ornament> {
    match target.kind {
        OrnamentKind::Decorative => decorative.as_slice().get(target.index),
        OrnamentKind::User => user.0.get(target.index),
    }
}

/// Camera orbit settings (Y up, orbiting the tree)
#[derive(Debug, Clone, Resource)]
pub struct CameraSettings {
    pub distance: f32,
    pub target_distance: f32, // For smooth zoom
    pub azimuth: f32,
    pub elevation: f32,
    pub target: Vec3,
    pub sensitivity: f32,
    pub zoom_speed: f32,
    pub smooth_factor: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        // Starts at (0, 10, 10) looking at the origin
        let distance = 200f32.sqrt();
        Self {
            distance,
            target_distance: distance,
            azimuth: 0.0,
            elevation: std::f32::consts::FRAC_PI_4,
            target: Vec3::ZERO,
            sensitivity: 0.005,
            zoom_speed: 0.1,
            smooth_factor: 0.15,
        }
    }
}

/// Run the Bevy application
pub fn run(store_config: StoreConfig) {
    let tree = Tree::default();
    let decorative = DecorativeOrnaments::generate(&tree.0);
    tracing::info!("Generated {} decorative ornaments", decorative.as_slice().len());

    App::new()
        .insert_resource(ClearColor(Color::srgb_u8(0x0b, 0x0c, 0x1a)))
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "Ornament Tree".to_string(),
                canvas: Some("#ornament-canvas".to_string()),
                fit_canvas_to_parent: true,
                prevent_default_event_handling: false,
                ..default()
            }),
            ..default()
        }))
        // bevy_egui looks for bevy_picking's PickingPlugin, so it must be added first
        .add_plugins(DefaultPickingPlugins)
        .add_plugins(EguiPlugin::default())
        .insert_resource(StoreSettings(store_config))
        .insert_resource(tree)
        .insert_resource(decorative)
        .init_resource::<UserOrnaments>()
        .init_resource::<PlacementState>()
        .init_resource::<SelectedOrnament>()
        .init_resource::<FormState>()
        .init_resource::<ChannelStatus>()
        .init_resource::<CameraSettings>()
        .add_plugins(NetworkPlugin)
        .add_plugins(ScenePlugin)
        .add_plugins(UiPlugin)
        .run();
}
