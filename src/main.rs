#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // hide console window on Windows in release

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use eframe::egui;
use image_cropper::{
    AlignImage, CropperEvent, CropperOptions, CropperPosition, Dimensions, ImageCropper,
    ImageSource, ImageTransform, Key, KeyInput, MoveType, OutputFormat, OutputType, PinchEvent,
    PointerEvent, ResizeHandle,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp", "ico"];

#[derive(Clone, Copy, Debug, Default, PartialEq)]
enum AspectRatioMode {
    #[default]
    Free,
    Original,
    Square,
    // Landscape
    R3_2,
    R4_3,
    R16_9,
    R16_10,
    // Portrait
    R2_3,
    R3_4,
    R9_16,
    R10_16,
    Custom,
}

impl AspectRatioMode {
    const LANDSCAPE: [AspectRatioMode; 4] = [Self::R3_2, Self::R4_3, Self::R16_9, Self::R16_10];
    const PORTRAIT: [AspectRatioMode; 4] = [Self::R2_3, Self::R3_4, Self::R9_16, Self::R10_16];

    fn counterpart(&self) -> Self {
        match self {
            AspectRatioMode::R3_2 => AspectRatioMode::R2_3,
            AspectRatioMode::R4_3 => AspectRatioMode::R3_4,
            AspectRatioMode::R16_9 => AspectRatioMode::R9_16,
            AspectRatioMode::R16_10 => AspectRatioMode::R10_16,
            AspectRatioMode::R2_3 => AspectRatioMode::R3_2,
            AspectRatioMode::R3_4 => AspectRatioMode::R4_3,
            AspectRatioMode::R9_16 => AspectRatioMode::R16_9,
            AspectRatioMode::R10_16 => AspectRatioMode::R16_10,
            _ => *self,
        }
    }

    /// `None` for free cropping.
    fn ratio(&self, image: Dimensions, custom_w: u32, custom_h: u32) -> Option<f64> {
        match self {
            AspectRatioMode::Free => None,
            AspectRatioMode::Original => Some(image.aspect_ratio()),
            AspectRatioMode::Square => Some(1.0),
            AspectRatioMode::R3_2 => Some(3.0 / 2.0),
            AspectRatioMode::R4_3 => Some(4.0 / 3.0),
            AspectRatioMode::R16_9 => Some(16.0 / 9.0),
            AspectRatioMode::R16_10 => Some(16.0 / 10.0),
            AspectRatioMode::R2_3 => Some(2.0 / 3.0),
            AspectRatioMode::R3_4 => Some(3.0 / 4.0),
            AspectRatioMode::R9_16 => Some(9.0 / 16.0),
            AspectRatioMode::R10_16 => Some(10.0 / 16.0),
            AspectRatioMode::Custom => Some(custom_w as f64 / custom_h as f64),
        }
    }
}

impl std::fmt::Display for AspectRatioMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AspectRatioMode::Free => "Free",
            AspectRatioMode::Original => "Original",
            AspectRatioMode::Square => "1:1",
            AspectRatioMode::R3_2 => "3:2",
            AspectRatioMode::R4_3 => "4:3",
            AspectRatioMode::R16_9 => "16:9",
            AspectRatioMode::R16_10 => "16:10",
            AspectRatioMode::R2_3 => "2:3",
            AspectRatioMode::R3_4 => "3:4",
            AspectRatioMode::R9_16 => "9:16",
            AspectRatioMode::R10_16 => "10:16",
            AspectRatioMode::Custom => "Custom",
        };
        write!(f, "{}", s)
    }
}

struct CropperApp {
    cropper: ImageCropper,
    texture: Option<egui::TextureHandle>,
    texture_stale: bool,
    aspect_ratio_mode: AspectRatioMode,
    custom_w: u32,
    custom_h: u32,
    is_portrait: bool,
    canvas_rotation: i32,
    pinch_scale: Option<f64>,
    status: Option<String>,
}

impl CropperApp {
    fn new(_cc: &eframe::CreationContext<'_>, cropper: ImageCropper) -> Self {
        Self {
            cropper,
            texture: None,
            texture_stale: false,
            aspect_ratio_mode: AspectRatioMode::Free,
            custom_w: 4,
            custom_h: 3,
            is_portrait: false,
            canvas_rotation: 0,
            pinch_scale: None,
            status: None,
        }
    }

    fn open(&mut self, path: &Path) {
        info!(path = %path.display(), "opening image");
        self.cropper.load_image(&ImageSource::file(path));
        self.apply_aspect_ratio();
    }

    fn process_events(&mut self) {
        for event in self.cropper.drain_events() {
            match event {
                CropperEvent::ImageLoaded => {
                    self.texture_stale = true;
                    self.status = None;
                }
                CropperEvent::LoadImageFailed(reason) => {
                    self.texture = None;
                    self.status = Some(format!("Failed to load image: {reason}"));
                }
                CropperEvent::ImageCropped(result) => {
                    self.status = Some(format!("Cropped {}x{}", result.width, result.height));
                }
                _ => {}
            }
        }
    }

    fn refresh_texture(&mut self, ctx: &egui::Context) {
        if !self.texture_stale {
            return;
        }
        self.texture_stale = false;
        self.texture = self.cropper.loaded_image().map(|loaded| {
            let image = &loaded.transformed.image;
            let size = [image.width() as _, image.height() as _];
            let image_buffer = image.to_rgba8();
            let pixels = image_buffer.as_flat_samples();
            let color_image = egui::ColorImage::from_rgba_unmultiplied(size, pixels.as_slice());
            ctx.load_texture("image", color_image, egui::TextureOptions::LINEAR)
        });
    }

    fn apply_aspect_ratio(&mut self) {
        let original = self
            .cropper
            .loaded_image()
            .map(|l| l.transformed.size)
            .unwrap_or(Dimensions::new(1.0, 1.0));
        let ratio = self
            .aspect_ratio_mode
            .ratio(original, self.custom_w, self.custom_h);
        let options = CropperOptions {
            maintain_aspect_ratio: Some(ratio.is_some()),
            aspect_ratio: ratio,
            ..Default::default()
        };
        if let Err(e) = self.cropper.set_options(&options) {
            self.status = Some(e.to_string());
        }
        if ratio.is_none() {
            self.cropper.reset_cropper_position();
        }
    }

    fn rotate(&mut self, quarter_turns: i32) {
        self.canvas_rotation = (self.canvas_rotation + quarter_turns).rem_euclid(4);
        let options = CropperOptions {
            canvas_rotation: Some(self.canvas_rotation),
            ..Default::default()
        };
        if let Err(e) = self.cropper.set_options(&options) {
            self.status = Some(e.to_string());
        }
    }

    fn flip(&mut self) {
        let transform = ImageTransform {
            flip_h: !self.cropper.transform().flip_h,
            ..*self.cropper.transform()
        };
        self.cropper.set_transform(transform);
    }

    fn save_to(&mut self, path: &Path) -> Result<()> {
        let format = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(OutputFormat::from_extension)
            .unwrap_or_default();
        self.cropper.set_options(&CropperOptions {
            format: Some(format),
            ..Default::default()
        })?;
        let result = self
            .cropper
            .crop_sync(OutputType::Blob)
            .context("nothing to crop yet")?;
        let blob = result.blob.context("crop produced no bytes")?;
        std::fs::write(path, &blob.bytes)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), width = result.width, height = result.height, "saved crop");
        Ok(())
    }

    fn save(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Image", IMAGE_EXTENSIONS)
            .save_file()
        else {
            return;
        };
        if let Err(e) = self.save_to(&path) {
            warn!(error = %e, "failed to save image");
            self.status = Some(format!("{e:#}"));
        }
    }

    fn hit_test(pos: egui::Pos2, rect: egui::Rect) -> Option<ResizeHandle> {
        let tolerance = 10.0;
        let min = rect.min;
        let max = rect.max;

        if pos.distance(min) < tolerance {
            return Some(ResizeHandle::TopLeft);
        }
        if pos.distance(egui::pos2(max.x, min.y)) < tolerance {
            return Some(ResizeHandle::TopRight);
        }
        if pos.distance(egui::pos2(min.x, max.y)) < tolerance {
            return Some(ResizeHandle::BottomLeft);
        }
        if pos.distance(max) < tolerance {
            return Some(ResizeHandle::BottomRight);
        }

        if (pos.x - min.x).abs() < tolerance && pos.y > min.y && pos.y < max.y {
            return Some(ResizeHandle::Left);
        }
        if (pos.x - max.x).abs() < tolerance && pos.y > min.y && pos.y < max.y {
            return Some(ResizeHandle::Right);
        }
        if (pos.y - min.y).abs() < tolerance && pos.x > min.x && pos.x < max.x {
            return Some(ResizeHandle::Top);
        }
        if (pos.y - max.y).abs() < tolerance && pos.x > min.x && pos.x < max.x {
            return Some(ResizeHandle::Bottom);
        }

        if rect.contains(pos) {
            return Some(ResizeHandle::Center);
        }
        None
    }

    fn start_gesture(&mut self, local: egui::Pos2, screen_crop_rect: egui::Rect, pos: egui::Pos2) {
        let event = PointerEvent::mouse(local.x as f64, local.y as f64);
        match Self::hit_test(pos, screen_crop_rect) {
            Some(ResizeHandle::Center) => self.cropper.start_move(&event, MoveType::Move, None),
            Some(handle) if !self.cropper.settings().hide_resize_squares => {
                self.cropper
                    .start_move(&event, MoveType::Resize, Some(handle))
            }
            Some(_) => {}
            None => self.cropper.start_move(&event, MoveType::Drag, None),
        }
    }

    fn forward_keys(&mut self, ctx: &egui::Context) {
        if ctx.wants_keyboard_input() {
            return;
        }
        let keys: Vec<KeyInput> = ctx.input(|i| {
            i.events
                .iter()
                .filter_map(|event| match event {
                    egui::Event::Key {
                        key,
                        pressed: true,
                        modifiers,
                        ..
                    } => {
                        let key = match key {
                            egui::Key::ArrowUp => Key::ArrowUp,
                            egui::Key::ArrowDown => Key::ArrowDown,
                            egui::Key::ArrowLeft => Key::ArrowLeft,
                            egui::Key::ArrowRight => Key::ArrowRight,
                            other => Key::from_name(other.name()),
                        };
                        Some(KeyInput {
                            key,
                            shift: modifiers.shift,
                            alt: modifiers.alt,
                        })
                    }
                    _ => None,
                })
                .collect()
        });
        for key in keys {
            self.cropper.key_down(key);
        }
    }

    fn forward_pinch(&mut self, ctx: &egui::Context) {
        match (ctx.input(|i| i.multi_touch()), self.pinch_scale) {
            (Some(touch), scale) => {
                if scale.is_none() {
                    self.cropper.start_pinch();
                }
                let scale = scale.unwrap_or(1.0) * touch.zoom_delta as f64;
                self.pinch_scale = Some(scale);
                self.cropper.handle_pinch(PinchEvent { scale });
            }
            (None, Some(_)) => {
                self.pinch_scale = None;
                self.cropper.end_pinch();
            }
            (None, None) => {}
        }
    }

    fn toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("Aspect Ratio:");
            let mut changed = false;
            egui::ComboBox::from_id_salt("params_aspect_ratio")
                .selected_text(format!("{}", self.aspect_ratio_mode))
                .show_ui(ui, |ui| {
                    for mode in [AspectRatioMode::Free, AspectRatioMode::Original, AspectRatioMode::Square] {
                        changed |= ui
                            .selectable_value(&mut self.aspect_ratio_mode, mode, mode.to_string())
                            .changed();
                    }
                    ui.separator();
                    let presets = if self.is_portrait {
                        AspectRatioMode::PORTRAIT
                    } else {
                        AspectRatioMode::LANDSCAPE
                    };
                    for mode in presets {
                        changed |= ui
                            .selectable_value(&mut self.aspect_ratio_mode, mode, mode.to_string())
                            .changed();
                    }
                    ui.separator();
                    changed |= ui
                        .selectable_value(
                            &mut self.aspect_ratio_mode,
                            AspectRatioMode::Custom,
                            "Custom",
                        )
                        .changed();
                });

            if ui.button("🔄").clicked() {
                self.is_portrait = !self.is_portrait;
                if self.aspect_ratio_mode == AspectRatioMode::Custom {
                    std::mem::swap(&mut self.custom_w, &mut self.custom_h);
                } else {
                    self.aspect_ratio_mode = self.aspect_ratio_mode.counterpart();
                }
                changed = true;
            }

            if self.aspect_ratio_mode == AspectRatioMode::Custom {
                changed |= ui
                    .add(
                        egui::DragValue::new(&mut self.custom_w)
                            .speed(0.1)
                            .range(1..=100),
                    )
                    .changed();
                ui.label(":");
                changed |= ui
                    .add(
                        egui::DragValue::new(&mut self.custom_h)
                            .speed(0.1)
                            .range(1..=100),
                    )
                    .changed();
            }

            if changed {
                self.apply_aspect_ratio();
            }

            ui.separator();
            if ui.button("⟲").on_hover_text("Rotate left").clicked() {
                self.rotate(-1);
            }
            if ui.button("⟳").on_hover_text("Rotate right").clicked() {
                self.rotate(1);
            }
            if ui.button("↔").on_hover_text("Flip horizontally").clicked() {
                self.flip();
            }

            ui.separator();
            if ui.button("Save Cropped Image").clicked() {
                self.save();
            }
        });
    }

    fn crop_area(&mut self, ui: &mut egui::Ui, texture: &egui::TextureHandle) {
        const PADDING: f32 = 20.0;
        let available_size = ui.available_size();
        let max_size = available_size - egui::vec2(PADDING * 2.0, PADDING * 2.0);
        let image_size = texture.size_vec2();

        // Calculate size to fit within available space while maintaining aspect ratio
        let scale = (max_size.x / image_size.x).min(max_size.y / image_size.y);
        let display_size = image_size * scale;
        let total_display_size = display_size + egui::vec2(PADDING * 2.0, PADDING * 2.0);

        let x_offset = match self.cropper.settings().align_image {
            AlignImage::Left => 0.0,
            AlignImage::Center => (available_size.x - total_display_size.x) / 2.0,
        };
        let y_offset = (available_size.y - total_display_size.y) / 2.0;
        let start_pos = ui.cursor().min + egui::vec2(x_offset.max(0.0), y_offset.max(0.0));
        let target_rect = egui::Rect::from_min_size(start_pos, total_display_size);
        let response = ui.allocate_rect(target_rect, egui::Sense::click_and_drag());
        let painter = ui.painter_at(target_rect);
        let image_rect = egui::Rect::from_min_size(
            target_rect.min + egui::vec2(PADDING, PADDING),
            display_size,
        );

        // The displayed image size is the cropper's container.
        let container = Dimensions::new(display_size.x as f64, display_size.y as f64);
        if self.cropper.is_ready() {
            self.cropper.on_container_resize(container);
        } else {
            self.cropper.image_layout_ready(container);
        }

        let transform = self.cropper.transform();
        let (u0, u1) = if transform.flip_h { (1.0, 0.0) } else { (0.0, 1.0) };
        let (v0, v1) = if transform.flip_v { (1.0, 0.0) } else { (0.0, 1.0) };
        painter.image(
            texture.id(),
            image_rect,
            egui::Rect::from_min_max(egui::pos2(u0, v0), egui::pos2(u1, v1)),
            egui::Color32::WHITE,
        );

        if !self.cropper.is_ready() {
            return;
        }

        let to_screen = |p: CropperPosition| {
            egui::Rect::from_min_max(
                image_rect.min + egui::vec2(p.x1 as f32, p.y1 as f32),
                image_rect.min + egui::vec2(p.x2 as f32, p.y2 as f32),
            )
        };

        if response.drag_started() {
            if let Some(pos) = response.interact_pointer_pos() {
                let screen_crop_rect = to_screen(self.cropper.cropper_position());
                let local = (pos - image_rect.min).to_pos2();
                self.start_gesture(local, screen_crop_rect, pos);
            }
        }
        if response.dragged() {
            if let Some(pos) = response.interact_pointer_pos() {
                let local = pos - image_rect.min;
                self.cropper
                    .handle_move(&PointerEvent::mouse(local.x as f64, local.y as f64));
            }
        }
        if response.drag_stopped() {
            self.cropper.handle_up();
        }

        let screen_crop_rect = to_screen(self.cropper.cropper_position());
        let settings = self.cropper.settings();

        // Draw overlay (dimmed area outside crop)
        let overlay_color = egui::Color32::from_black_alpha(150);
        for rect in [
            egui::Rect::from_min_max(
                image_rect.min,
                egui::pos2(image_rect.max.x, screen_crop_rect.min.y),
            ),
            egui::Rect::from_min_max(
                egui::pos2(image_rect.min.x, screen_crop_rect.max.y),
                image_rect.max,
            ),
            egui::Rect::from_min_max(
                egui::pos2(image_rect.min.x, screen_crop_rect.min.y),
                egui::pos2(screen_crop_rect.min.x, screen_crop_rect.max.y),
            ),
            egui::Rect::from_min_max(
                egui::pos2(screen_crop_rect.max.x, screen_crop_rect.min.y),
                egui::pos2(image_rect.max.x, screen_crop_rect.max.y),
            ),
        ] {
            painter.rect_filled(rect, 0.0, overlay_color);
        }

        let border = egui::Stroke::new(1.0, egui::Color32::WHITE);
        if settings.round_cropper {
            let radius = screen_crop_rect.width().min(screen_crop_rect.height()) / 2.0;
            painter.circle_stroke(screen_crop_rect.center(), radius, border);
        } else {
            painter.rect_stroke(screen_crop_rect, 0.0, border);
        }

        if !settings.hide_resize_squares {
            let handle_radius = 6.0;
            let handle_stroke = egui::Stroke::new(1.0, egui::Color32::BLACK);
            let handle_fill = egui::Color32::WHITE;
            let position = self.cropper.cropper_position();
            for handle in ResizeHandle::EDGES {
                let (x, y) = handle.anchor(&position);
                let pos = image_rect.min + egui::vec2(x as f32, y as f32);
                painter.circle(pos, handle_radius, handle_fill, handle_stroke);
            }
        }
    }
}

impl eframe::App for CropperApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let dropped: Option<PathBuf> =
            ctx.input(|i| i.raw.dropped_files.first().and_then(|f| f.path.clone()));
        if let Some(path) = dropped {
            self.open(&path);
        }

        self.forward_keys(ctx);
        self.forward_pinch(ctx);
        self.process_events();
        self.refresh_texture(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.button("Open Image").clicked() {
                    if let Some(path) = rfd::FileDialog::new()
                        .add_filter("Image", IMAGE_EXTENSIONS)
                        .pick_file()
                    {
                        self.open(&path);
                    }
                }
                if let Some(status) = &self.status {
                    ui.label(status);
                }
            });

            if let Some(texture) = self.texture.clone() {
                self.toolbar(ui);
                ui.separator();
                self.crop_area(ui, &texture);
            }
        });

        self.process_events();
    }
}

/// Options from the JSON file named by the first argument, layered over the
/// app defaults.
fn load_options() -> Result<ImageCropper> {
    let mut cropper = ImageCropper::new(&CropperOptions {
        auto_crop: Some(false),
        maintain_aspect_ratio: Some(false),
        ..Default::default()
    })?;
    if let Some(path) = std::env::args_os().nth(1) {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", Path::new(&path).display()))?;
        let options: CropperOptions =
            serde_json::from_str(&text).context("invalid cropper options")?;
        cropper.set_options(&options)?;
        info!(path = %Path::new(&path).display(), "loaded cropper options");
    }
    Ok(cropper)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cropper = load_options()?;
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([800.0, 600.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Image Cropper",
        options,
        Box::new(|cc| Ok(Box::new(CropperApp::new(cc, cropper)))),
    )
    .map_err(|e| anyhow!("{e}"))
}
