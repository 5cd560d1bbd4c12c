mod piano_roll;

pub use piano_roll::{Hsl, PianoRoll, Rect, Rgb, Surface, Timeline, note_color};

use crate::api::ModelInfo;
use crate::coordinator::SessionId;
use crate::session::SessionState;
use crate::{EngineCommand, EngineHandle, EngineUpdate};
use eframe::egui;
use std::time::Duration;

/// `M:SS`, seconds rounded down.
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() {
        seconds.max(0.0).floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

struct MelodyCard {
    session: SessionId,
    name: String,
    url: String,
    state: SessionState,
    duration: Option<f64>,
    roll: Option<egui::TextureHandle>,
}

pub struct MelodeckApp {
    engine: EngineHandle,
    melodies: Vec<MelodyCard>,
    models: Vec<ModelInfo>,
    selected_model: Option<String>,
    generating: bool,
    error_message: Option<String>,
}

impl MelodeckApp {
    pub fn new(engine: EngineHandle) -> Self {
        engine.send(EngineCommand::ListModels);
        Self {
            engine,
            melodies: Vec::new(),
            models: Vec::new(),
            selected_model: None,
            generating: false,
            error_message: None,
        }
    }

    fn card_mut(&mut self, session: SessionId) -> Option<&mut MelodyCard> {
        self.melodies.iter_mut().find(|m| m.session == session)
    }

    fn process_engine_updates(&mut self, ctx: &egui::Context) {
        while let Ok(update) = self.engine.update_rx.try_recv() {
            match update {
                EngineUpdate::MelodyAdded { session, name, url } => {
                    self.melodies.push(MelodyCard {
                        session,
                        name,
                        url,
                        state: SessionState::Idle,
                        duration: None,
                        roll: None,
                    });
                }
                EngineUpdate::SessionState {
                    session,
                    state,
                    duration,
                } => {
                    if let Some(card) = self.card_mut(session) {
                        card.state = state;
                        card.duration = duration;
                    }
                }
                EngineUpdate::Visualization { session, image } => {
                    let size = [image.width() as usize, image.height() as usize];
                    let pixels = egui::ColorImage::from_rgba_unmultiplied(size, image.as_raw());
                    let texture = ctx.load_texture(
                        format!("roll-{}", session),
                        pixels,
                        egui::TextureOptions::NEAREST,
                    );
                    if let Some(card) = self.card_mut(session) {
                        card.roll = Some(texture);
                    }
                }
                EngineUpdate::Removed(session) => {
                    self.melodies.retain(|m| m.session != session);
                }
                EngineUpdate::Models(models) => {
                    if self.selected_model.is_none() {
                        self.selected_model = models.first().map(|m| m.id.clone());
                    }
                    self.models = models;
                }
                EngineUpdate::Generating(generating) => {
                    self.generating = generating;
                    if generating {
                        self.error_message = None;
                    }
                }
                EngineUpdate::Error { message } => {
                    self.error_message = Some(message);
                }
            }
        }
    }

    fn menu_bar(&mut self, ui: &mut egui::Ui) {
        egui::MenuBar::new().ui(ui, |ui| {
            ui.menu_button("File", |ui| {
                if ui.button("Open MIDI file...").clicked() {
                    if let Some(path) = rfd::FileDialog::new()
                        .set_title("Open MIDI file")
                        .add_filter("MIDI", &["mid", "midi"])
                        .pick_file()
                    {
                        let name = path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_else(|| "melody".to_string());
                        self.engine.send(EngineCommand::AddMelody {
                            name,
                            url: format!("file://{}", path.display()),
                        });
                    }
                    ui.close();
                }

                ui.separator();

                if ui.button("Quit").clicked() {
                    ui.ctx().send_viewport_cmd(egui::ViewportCommand::Close);
                }
            });
        });
    }

    fn generator(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let selected_name = self
                .models
                .iter()
                .find(|m| Some(&m.id) == self.selected_model.as_ref())
                .map(|m| m.name.clone())
                .unwrap_or_else(|| "No models".to_string());

            egui::ComboBox::from_label("Model")
                .selected_text(selected_name)
                .show_ui(ui, |ui| {
                    for model in &self.models {
                        ui.selectable_value(
                            &mut self.selected_model,
                            Some(model.id.clone()),
                            &model.name,
                        );
                    }
                });

            if ui.button("⟳").on_hover_text("Refresh models").clicked() {
                self.engine.send(EngineCommand::ListModels);
            }

            let can_generate = !self.generating && self.selected_model.is_some();
            let label = if self.generating {
                "Generating..."
            } else {
                "Generate Melody"
            };
            if ui.add_enabled(can_generate, egui::Button::new(label)).clicked() {
                if let Some(model_id) = self.selected_model.clone() {
                    self.engine.send(EngineCommand::Generate { model_id });
                }
            }
            if self.generating {
                ui.spinner();
            }
        });
    }

    fn melody_card(engine: &EngineHandle, ui: &mut egui::Ui, card: &MelodyCard) {
        ui.group(|ui| {
            ui.horizontal(|ui| {
                ui.strong(&card.name);
                if let Some(duration) = card.duration {
                    ui.label(format_duration(duration));
                }
                if ui.small_button("✕").on_hover_text("Remove").clicked() {
                    engine.send(EngineCommand::Remove(card.session));
                }
            });

            ui.horizontal(|ui| match &card.state {
                SessionState::Idle | SessionState::Loading => {
                    ui.spinner();
                    ui.label("Loading...");
                }
                SessionState::Error { message, .. } => {
                    ui.colored_label(egui::Color32::RED, message);
                    if ui.button("Retry").clicked() {
                        engine.send(EngineCommand::Load {
                            session: card.session,
                            url: card.url.clone(),
                        });
                    }
                }
                state => {
                    let label = if *state == SessionState::Playing {
                        "⏸ Pause"
                    } else {
                        "▶ Play"
                    };
                    if ui.button(label).clicked() {
                        engine.send(EngineCommand::TogglePlayback(card.session));
                    }
                    if ui.button("⏹ Stop").clicked() {
                        engine.send(EngineCommand::Stop(card.session));
                    }
                    ui.label(state.label());
                }
            });

            if let Some(texture) = &card.roll {
                ui.image((texture.id(), texture.size_vec2()));
            }
        });
    }
}

impl eframe::App for MelodeckApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_engine_updates(ctx);

        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            self.menu_bar(ui);
        });

        if let Some(ref error) = self.error_message {
            egui::TopBottomPanel::top("error").show(ctx, |ui| {
                ui.colored_label(egui::Color32::RED, error);
            });
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            self.generator(ui);
            ui.separator();

            if self.melodies.is_empty() {
                ui.vertical_centered(|ui| {
                    ui.heading("No melodies yet");
                    ui.label("Generate one or use File → Open MIDI file");
                });
                return;
            }

            egui::ScrollArea::vertical().show(ui, |ui| {
                for card in &self.melodies {
                    Self::melody_card(&self.engine, ui, card);
                    ui.add_space(8.0);
                }
            });
        });

        ctx.request_repaint_after(Duration::from_millis(100));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_render_as_minutes_and_seconds() {
        assert_eq!(format_duration(0.0), "0:00");
        assert_eq!(format_duration(9.99), "0:09");
        assert_eq!(format_duration(75.4), "1:15");
        assert_eq!(format_duration(600.0), "10:00");
        assert_eq!(format_duration(f64::NAN), "0:00");
    }
}
