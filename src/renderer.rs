//! Crop rendering: maps the container-space rectangle onto the transformed
//! bitmap, draws it through the active [`ImageTransform`], optionally
//! resamples, and encodes the result.
//!
//! A [`CropJob`] is an owned snapshot of everything a render needs, so it can
//! be moved to a blocking task while the cropper keeps mutating its live
//! state.

use std::io::Cursor;
use std::time::Instant;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::codecs::bmp::BmpEncoder;
use image::codecs::ico::IcoEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ExtendedColorType, ImageEncoder, Rgba, RgbaImage};
use tracing::debug;

use crate::error::{CropperError, Result};
use crate::geometry::{CropperPosition, Dimensions};
use crate::loader::{LoadedImage, total_rotation};
use crate::settings::{CropperSettings, ImageTransform, OutputFormat, OutputType, TranslateUnit};

/// Encoded output bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CropBlob {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

/// Outcome of a crop.
#[derive(Clone, Debug, PartialEq)]
pub struct CropResult {
    /// Output size after any resize.
    pub width: u32,
    pub height: u32,
    /// The rectangle in container pixels.
    pub cropper_position: CropperPosition,
    /// The rectangle in transformed-bitmap pixels.
    pub image_position: CropperPosition,
    /// The rectangle relative to the unpadded original, in contain mode.
    pub offset_image_position: Option<CropperPosition>,
    pub base64: Option<String>,
    pub blob: Option<CropBlob>,
    /// Order in which the job was created; later results supersede earlier ones.
    pub sequence: u64,
}

/// Container-to-bitmap ratio; the display scales both axes uniformly.
fn container_ratio(loaded: &LoadedImage, max_size: Dimensions) -> f64 {
    loaded.transformed.size.width / max_size.width
}

/// The crop rectangle in transformed-bitmap pixels, rounded to whole pixels.
///
/// Clamped to the bitmap unless contain mode is on, where padding outside the
/// original is part of the output.
pub fn get_image_position(
    loaded: &LoadedImage,
    cropper: &CropperPosition,
    max_size: Dimensions,
    settings: &CropperSettings,
) -> CropperPosition {
    let ratio = container_ratio(loaded, max_size);
    let mut out = cropper.scaled(ratio, ratio).rounded();
    if !settings.contain_within_aspect_ratio {
        let size = loaded.transformed.size;
        out.x1 = out.x1.max(0.0);
        out.y1 = out.y1.max(0.0);
        out.x2 = out.x2.min(size.width);
        out.y2 = out.y2.min(size.height);
    }
    out
}

/// The image position shifted by half the contain padding, i.e. relative to
/// the original bitmap inside the padded canvas. Only meaningful in contain
/// mode, where edges may fall outside the original bitmap.
pub fn get_offset_image_position(
    loaded: &LoadedImage,
    cropper: &CropperPosition,
    max_size: Dimensions,
    settings: &CropperSettings,
) -> CropperPosition {
    let transformed = loaded.transformed.size;
    let original = if total_rotation(settings, loaded.exif_transform) % 2 == 1 {
        loaded.original.size.swapped()
    } else {
        loaded.original.size
    };
    let offset_x = (transformed.width - original.width) / 2.0;
    let offset_y = (transformed.height - original.height) / 2.0;
    let ratio = container_ratio(loaded, max_size);
    cropper.scaled(ratio, ratio).rounded().translated(-offset_x, -offset_y)
}

/// Scale factor applied after cropping to honour `resize_to_width/height`.
///
/// With both targets set the smaller ratio wins; upscaling only happens when
/// `only_scale_down` is off.
pub fn get_resize_ratio(width: f64, height: f64, settings: &CropperSettings) -> f64 {
    let mut ratios = Vec::with_capacity(2);
    if settings.resize_to_width > 0 {
        ratios.push(settings.resize_to_width as f64 / width);
    }
    if settings.resize_to_height > 0 {
        ratios.push(settings.resize_to_height as f64 / height);
    }
    let result = ratios.into_iter().reduce(f64::min).unwrap_or(1.0);
    if result > 1.0 && !settings.only_scale_down {
        result
    } else {
        result.min(1.0)
    }
}

/// Output size for a `width × height` source region.
pub fn output_dimensions(width: u32, height: u32, settings: &CropperSettings) -> (u32, u32) {
    let ratio = get_resize_ratio(width as f64, height as f64, settings);
    if ratio == 1.0 {
        return (width, height);
    }
    let out_width = (width as f64 * ratio).round().max(1.0);
    let out_height = if settings.maintain_aspect_ratio {
        (out_width / settings.aspect_ratio).round()
    } else {
        (height as f64 * ratio).round()
    };
    (out_width as u32, out_height.max(1.0) as u32)
}

/// Owned snapshot of one crop request.
#[derive(Clone, Debug)]
pub struct CropJob {
    pub loaded: LoadedImage,
    pub settings: CropperSettings,
    pub cropper: CropperPosition,
    pub max_size: Dimensions,
    pub transform: ImageTransform,
    pub sequence: u64,
}

impl CropJob {
    /// Geometry only; no pixels are touched.
    pub fn geometry(&self) -> CropResult {
        let image_position =
            get_image_position(&self.loaded, &self.cropper, self.max_size, &self.settings);
        let offset_image_position = self.settings.contain_within_aspect_ratio.then(|| {
            get_offset_image_position(&self.loaded, &self.cropper, self.max_size, &self.settings)
        });
        let width = image_position.width().max(0.0) as u32;
        let height = image_position.height().max(0.0) as u32;
        let (width, height) = if width > 0 && height > 0 {
            output_dimensions(width, height, &self.settings)
        } else {
            (width, height)
        };
        CropResult {
            width,
            height,
            cropper_position: self.cropper,
            image_position,
            offset_image_position,
            base64: None,
            blob: None,
            sequence: self.sequence,
        }
    }

    /// Draw, resample and encode on the calling thread.
    pub fn render(self, output: OutputType) -> Result<CropResult> {
        let started = Instant::now();
        let mut result = self.geometry();
        let surface = self.draw(&result.image_position)?;
        let surface = if (surface.width(), surface.height()) != (result.width, result.height) {
            imageops::resize(&surface, result.width, result.height, FilterType::Triangle)
        } else {
            surface
        };

        let format = self.settings.format;
        let bytes = encode(&surface, format, self.settings.quality())?;
        match output {
            OutputType::Base64 => {
                result.base64 = Some(format!(
                    "data:{};base64,{}",
                    format.mime_type(),
                    STANDARD.encode(&bytes)
                ));
            }
            OutputType::Blob => {
                result.blob = Some(CropBlob {
                    bytes,
                    mime_type: format.mime_type(),
                });
            }
        }
        debug!(
            sequence = self.sequence,
            width = result.width,
            height = result.height,
            elapsed_ms = started.elapsed().as_millis(),
            "crop rendered"
        );
        Ok(result)
    }

    /// [`render`](Self::render) on a blocking task.
    pub async fn render_async(self, output: OutputType) -> Result<CropResult> {
        tokio::task::spawn_blocking(move || self.render(output))
            .await
            .map_err(|e| CropperError::Join(e.to_string()))?
    }

    fn draw(&self, position: &CropperPosition) -> Result<RgbaImage> {
        let width = position.width().max(0.0) as u32;
        let height = position.height().max(0.0) as u32;
        if width == 0 || height == 0 {
            return Err(CropperError::RenderUnavailable(format!(
                "empty crop region {width}x{height}"
            )));
        }
        let mut surface = match self.settings.background_color {
            Some(c) => RgbaImage::from_pixel(width, height, Rgba([c.r, c.g, c.b, c.a])),
            None => RgbaImage::new(width, height),
        };
        let image = &self.loaded.transformed.image;
        if self.transform.is_identity() {
            draw_direct(&mut surface, image, position);
        } else {
            let (translate_h, translate_v) = self.canvas_translate();
            draw_transformed(&mut surface, image, position, &self.transform, translate_h, translate_v);
        }
        Ok(surface)
    }

    /// Transform translation in bitmap pixels.
    fn canvas_translate(&self) -> (f64, f64) {
        let size = self.loaded.transformed.size;
        match self.transform.translate_unit {
            TranslateUnit::Pixels => {
                let ratio = container_ratio(&self.loaded, self.max_size);
                (self.transform.translate_h * ratio, self.transform.translate_v * ratio)
            }
            TranslateUnit::Percent => (
                self.transform.translate_h / 100.0 * size.width,
                self.transform.translate_v / 100.0 * size.height,
            ),
        }
    }
}

/// Copy the in-bounds part of the region; padding stays background.
fn draw_direct(surface: &mut RgbaImage, image: &DynamicImage, position: &CropperPosition) {
    let x = position.x1.max(0.0) as u32;
    let y = position.y1.max(0.0) as u32;
    let x2 = (position.x2.max(0.0) as u32).min(image.width());
    let y2 = (position.y2.max(0.0) as u32).min(image.height());
    if x >= x2 || y >= y2 {
        return;
    }
    let region = image.crop_imm(x, y, x2 - x, y2 - y).to_rgba8();
    imageops::overlay(
        surface,
        &region,
        x as i64 - position.x1 as i64,
        y as i64 - position.y1 as i64,
    );
}

/// Inverse-map every output pixel through
/// `scale/flip -> crop origin translate -> rotate` about the bitmap center and
/// composite the bilinear sample over the surface.
fn draw_transformed(
    surface: &mut RgbaImage,
    image: &DynamicImage,
    position: &CropperPosition,
    transform: &ImageTransform,
    translate_h: f64,
    translate_v: f64,
) {
    let source = image.to_rgba8();
    let (w, h) = (source.width() as f64, source.height() as f64);
    let scale_x = transform.scale * if transform.flip_h { -1.0 } else { 1.0 };
    let scale_y = transform.scale * if transform.flip_v { -1.0 } else { 1.0 };
    if scale_x == 0.0 || scale_y == 0.0 {
        return;
    }
    let (sin, cos) = transform.rotate.to_radians().sin_cos();
    let origin_x = w / 2.0 + translate_h - position.x1;
    let origin_y = h / 2.0 + translate_v - position.y1;

    for (ox, oy, pixel) in surface.enumerate_pixels_mut() {
        let qx = (ox as f64 + 0.5 - origin_x) / scale_x;
        let qy = (oy as f64 + 0.5 - origin_y) / scale_y;
        let u = qx * cos + qy * sin + w / 2.0;
        let v = -qx * sin + qy * cos + h / 2.0;
        if let Some(sample) = sample_bilinear(&source, u, v) {
            blend_over(pixel, sample);
        }
    }
}

/// Premultiplied bilinear sample at continuous coordinates (pixel centers at
/// `i + 0.5`); outside pixels count as transparent.
fn sample_bilinear(source: &RgbaImage, u: f64, v: f64) -> Option<[f64; 4]> {
    let fx = u - 0.5;
    let fy = v - 0.5;
    let x0 = fx.floor();
    let y0 = fy.floor();
    let (tx, ty) = (fx - x0, fy - y0);
    let (w, h) = (source.width() as i64, source.height() as i64);
    if x0 < -1.0 || y0 < -1.0 || x0 >= w as f64 || y0 >= h as f64 {
        return None;
    }
    let mut acc = [0.0; 4];
    for (dx, dy, weight) in [
        (0, 0, (1.0 - tx) * (1.0 - ty)),
        (1, 0, tx * (1.0 - ty)),
        (0, 1, (1.0 - tx) * ty),
        (1, 1, tx * ty),
    ] {
        let (x, y) = (x0 as i64 + dx, y0 as i64 + dy);
        if weight == 0.0 || x < 0 || y < 0 || x >= w || y >= h {
            continue;
        }
        let p = source.get_pixel(x as u32, y as u32).0;
        let alpha = p[3] as f64 / 255.0;
        acc[0] += p[0] as f64 * alpha * weight;
        acc[1] += p[1] as f64 * alpha * weight;
        acc[2] += p[2] as f64 * alpha * weight;
        acc[3] += alpha * weight;
    }
    (acc[3] > 0.0).then_some(acc)
}

/// Source-over composite of a premultiplied sample.
fn blend_over(dst: &mut Rgba<u8>, src: [f64; 4]) {
    let src_alpha = src[3].min(1.0);
    let dst_alpha = dst[3] as f64 / 255.0;
    let out_alpha = src_alpha + dst_alpha * (1.0 - src_alpha);
    if out_alpha <= 0.0 {
        return;
    }
    for c in 0..3 {
        let dst_premul = dst[c] as f64 * dst_alpha;
        let value = (src[c] + dst_premul * (1.0 - src_alpha)) / out_alpha;
        dst[c] = value.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_alpha * 255.0).round().clamp(0.0, 255.0) as u8;
}

/// Encode an RGBA surface. JPEG has no alpha channel, so it is flattened first.
pub fn encode(surface: &RgbaImage, format: OutputFormat, quality: f64) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    let (w, h) = surface.dimensions();
    match format {
        OutputFormat::Png => {
            PngEncoder::new(&mut buf).write_image(surface.as_raw(), w, h, ExtendedColorType::Rgba8)?
        }
        OutputFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(surface.clone()).to_rgb8();
            let q = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
            JpegEncoder::new_with_quality(&mut buf, q).write_image(
                rgb.as_raw(),
                w,
                h,
                ExtendedColorType::Rgb8,
            )?
        }
        OutputFormat::Bmp => {
            BmpEncoder::new(&mut buf).write_image(surface.as_raw(), w, h, ExtendedColorType::Rgba8)?
        }
        OutputFormat::Webp => WebPEncoder::new_lossless(&mut buf).write_image(
            surface.as_raw(),
            w,
            h,
            ExtendedColorType::Rgba8,
        )?,
        OutputFormat::Ico => {
            if w > 256 || h > 256 {
                return Err(CropperError::Encode(format!(
                    "ico output is limited to 256x256, got {w}x{h}"
                )));
            }
            IcoEncoder::new(&mut buf).write_image(surface.as_raw(), w, h, ExtendedColorType::Rgba8)?
        }
    }
    Ok(buf.into_inner())
}
