//! UI overlays using bevy_egui

use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts, EguiPrimaryContextPass};
use ornament_core::{country_label, Ornament, OrnamentForm, OrnamentKind, Placement, TreeShape, COUNTRIES};

use crate::app::{resolve_ornament, ChannelStatus, DecorativeOrnaments, FormState, PlacementState, SelectedOrnament, Tree, UserOrnaments};
use crate::network::{insert_ornament, StoreSettings};

pub struct UiPlugin;

impl Plugin for UiPlugin {
    fn build(&self, app: &mut App) {
        // Main UI system runs in EguiPrimaryContextPass for proper input handling (bevy_egui 0.38+)
        app.add_systems(EguiPrimaryContextPass, ui_system);
    }
}

/// Submit the form: on success the ornament is added to the user set
/// immediately and returned so the caller can write it to the store.
pub fn submit_form(
    form: &mut OrnamentForm,
    placement: &mut Placement,
    tree: &TreeShape,
    user: &mut UserOrnaments,
) -> Option<Ornament> {
    match form.submit(placement, tree, &mut rand::thread_rng()) {
        Ok(ornament) => {
            user.0.push(ornament.clone());
            Some(ornament)
        }
        Err(e) => {
            tracing::debug!("Submission rejected: {}", e);
            None
        }
    }
}

fn ui_system(
    mut contexts: EguiContexts,
    mut form: ResMut<FormState>,
    mut placement: ResMut<PlacementState>,
    mut selected: ResMut<SelectedOrnament>,
    mut user: ResMut<UserOrnaments>,
    decorative: Res<DecorativeOrnaments>,
    tree: Res<Tree>,
    status: Res<ChannelStatus>,
    settings: Res<StoreSettings>,
) {
    // Get the egui context - early return if not available
    let Ok(ctx) = contexts.ctx_mut() else { return };

    // Picking hint: dims the scene but never takes the pointer
    if placement.0.is_picking() {
        let screen = ctx.screen_rect();
        ctx.layer_painter(egui::LayerId::new(egui::Order::Background, egui::Id::new("pick_dim")))
            .rect_filled(screen, 0.0, egui::Color32::from_black_alpha(128));

        egui::Area::new(egui::Id::new("pick_hint"))
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .interactable(false)
            .show(ctx, |ui| {
                ui.label(
                    egui::RichText::new("✨ Click on the tree to choose where your ornament goes ✨")
                        .size(20.0)
                        .strong()
                        .color(egui::Color32::WHITE),
                );
            });
    }

    // Detail popup
    if let Some(target) = selected.0.current() {
        let ornament = resolve_ornament(target, &decorative, &user).cloned();
        let mut close = false;

        if let Some(ornament) = ornament {
            egui::Window::new("ornament_popup")
                .title_bar(false)
                .resizable(false)
                .collapsible(false)
                .anchor(egui::Align2::CENTER_BOTTOM, [0.0, -96.0])
                .show(ctx, |ui| {
                    ui.vertical_centered(|ui| {
                        ui.label(egui::RichText::new(&ornament.country).size(30.0));
                        ui.label(egui::RichText::new(country_label(&ornament.country)).small().color(egui::Color32::GRAY));
                        ui.label(egui::RichText::new(&ornament.message).strong());
                        if target.kind == OrnamentKind::User {
                            ui.label(egui::RichText::new("from a visitor").small().color(egui::Color32::GRAY));
                        }
                        if ui.button("Close").clicked() {
                            close = true;
                        }
                    });
                });
        } else {
            close = true;
        }

        if close {
            selected.0.clear();
        }
    }

    // Submission form
    egui::Window::new("ornament_form")
        .title_bar(false)
        .resizable(false)
        .collapsible(false)
        .anchor(egui::Align2::CENTER_BOTTOM, [0.0, -16.0])
        .show(ctx, |ui| {
            ui.horizontal(|ui| {
                // Realtime connection indicator
                let status_color = if status.joined {
                    egui::Color32::GREEN
                } else {
                    egui::Color32::RED
                };
                ui.colored_label(status_color, "●");

                let form = &mut form.0;
                egui::ComboBox::from_id_salt("country")
                    .selected_text(format!("{} {}", form.country, country_label(&form.country)))
                    .show_ui(ui, |ui| {
                        for country in COUNTRIES {
                            ui.selectable_value(
                                &mut form.country,
                                country.to_string(),
                                format!("{} {}", country, country_label(country)),
                            );
                        }
                    });

                let message = ui.add(
                    egui::TextEdit::singleline(&mut form.message)
                        .hint_text("Write a message")
                        .desired_width(192.0),
                );
                let enter_pressed = message.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));

                let choose_text = match placement.0 {
                    Placement::Confirmed(_) => "Choose again",
                    _ => "Choose placement",
                };
                if ui.button(choose_text).clicked() {
                    placement.0.begin_picking();
                }

                let can_submit = !form.message.trim().is_empty();
                let add_clicked = ui.add_enabled(can_submit, egui::Button::new("Add")).clicked();

                if add_clicked || enter_pressed {
                    if let Some(ornament) = submit_form(form, &mut placement.0, &tree.0, &mut user) {
                        tracing::info!("Added ornament at {:?}", ornament.position);
                        insert_ornament(&settings, &ornament);
                    }
                }
            });
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{resolve_click, ClickOutcome};
    use bevy::math::Vec3;
    use ornament_core::store::insert_body;
    use ornament_core::tree::DECORATIVE_COUNT;
    use ornament_core::{OrnamentRef, Selection};

    #[test]
    fn test_pick_then_submit() {
        let tree = TreeShape::default();
        let decorative = DecorativeOrnaments::generate(&tree);
        let mut user = UserOrnaments::default();
        let mut placement = Placement::default();
        let mut selection = Selection::default();
        let mut form = OrnamentForm::default();

        assert!(user.0.is_empty());
        assert_eq!(decorative.as_slice().len(), DECORATIVE_COUNT);

        // Choose placement, then click the front of the tree
        placement.begin_picking();
        let outcome = resolve_click(Vec3::new(0.0, 0.4, 20.0), Vec3::NEG_Z, &tree, &mut placement, &mut selection, Vec::<(OrnamentRef, Vec3)>::new());
        let ClickOutcome::Placed(point) = outcome else {
            panic!("expected a placement, got {:?}", outcome);
        };
        assert_eq!(placement.preview(), Some(point));

        form.country = "🇫🇷".to_string();
        form.message = "Hi".to_string();
        let ornament = submit_form(&mut form, &mut placement, &tree, &mut user).expect("submission accepted");

        assert_eq!(ornament.position, point);
        assert_eq!(user.0.len(), 1);
        assert_eq!(user.0.get(0), Some(&ornament));
        assert_eq!(placement, Placement::Idle);
        assert!(form.message.is_empty());

        let body: serde_json::Value = serde_json::from_str(&insert_body(&ornament).unwrap()).unwrap();
        let row = &body[0];
        assert_eq!(row["country"], "🇫🇷");
        assert_eq!(row["message"], "Hi");
        for (axis, expected) in [("x", point.x), ("y", point.y), ("z", point.z)] {
            let value = row[axis].as_f64().expect("flat numeric coordinate") as f32;
            assert!((value - expected).abs() < 1e-5, "{axis}: {value} != {expected}");
        }

        // The realtime echo of the same row is not shown twice
        assert!(!user.0.push(ornament.clone()));
        assert_eq!(user.0.len(), 1);

        // Decorative set is untouched by submissions
        assert_eq!(decorative.as_slice().len(), DECORATIVE_COUNT);
    }

    #[test]
    fn test_empty_message_is_not_submitted() {
        let tree = TreeShape::default();
        let mut user = UserOrnaments::default();
        let mut placement = Placement::Picking;
        let mut form = OrnamentForm::default();

        assert!(submit_form(&mut form, &mut placement, &tree, &mut user).is_none());
        assert!(user.0.is_empty());
        assert!(placement.is_picking());
    }
}
