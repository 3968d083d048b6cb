//! Cropper settings: user options, validation, and the derived scaled bounds.
//!
//! Hosts patch settings with a [`CropperOptions`] (every field optional, so a
//! JSON document with only the keys that changed deserializes directly).
//! [`CropperSettings::set_options`] merges, normalizes and validates the patch
//! atomically: on error the previous settings are left untouched.

use serde::{Deserialize, Serialize};

use crate::error::{CropperError, Result};
use crate::geometry::{CropperPosition, Dimensions, MIN_CROPPER_SIZE};

/// Encoding of the cropped output.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Jpeg,
    Bmp,
    Webp,
    Ico,
}

impl OutputFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Bmp => "image/bmp",
            OutputFormat::Webp => "image/webp",
            OutputFormat::Ico => "image/x-icon",
        }
    }

    /// Detect format from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "bmp" => Some(Self::Bmp),
            "webp" => Some(Self::Webp),
            "ico" => Some(Self::Ico),
            _ => None,
        }
    }
}

/// Which representation a crop produces.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    /// `data:` URL, produced synchronously.
    #[default]
    Base64,
    /// Encoded bytes, produced on a blocking task.
    Blob,
}

/// Horizontal placement of the displayed image inside its viewport.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignImage {
    Left,
    #[default]
    Center,
}

/// Unit of [`ImageTransform`] translation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslateUnit {
    /// Percentage of the transformed image size.
    #[default]
    Percent,
    /// Container pixels.
    #[serde(rename = "px")]
    Pixels,
}

/// Background fill for the output surface, as sRGB with alpha.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BackgroundColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl BackgroundColor {
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa`.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let digits = hex.trim().trim_start_matches('#');
        let invalid = || CropperError::Configuration(format!("invalid background color '{hex}'"));
        let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());
        if !digits.is_ascii() {
            return Err(invalid());
        }
        match digits.len() {
            3 => {
                let expand = |i: usize| channel(&digits[i..i + 1].repeat(2));
                Ok(Self::rgba(expand(0)?, expand(1)?, expand(2)?, 255))
            }
            6 | 8 => {
                let a = if digits.len() == 8 {
                    channel(&digits[6..8])?
                } else {
                    255
                };
                Ok(Self::rgba(
                    channel(&digits[0..2])?,
                    channel(&digits[2..4])?,
                    channel(&digits[4..6])?,
                    a,
                ))
            }
            _ => Err(invalid()),
        }
    }

    pub fn to_hex(self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl TryFrom<String> for BackgroundColor {
    type Error = CropperError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(&value)
    }
}

impl From<BackgroundColor> for String {
    fn from(color: BackgroundColor) -> Self {
        color.to_hex()
    }
}

/// CSS-style transform of the displayed image, independent of the rotation
/// baked into the transformed bitmap.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImageTransform {
    pub scale: f64,
    /// Degrees, clockwise.
    pub rotate: f64,
    pub flip_h: bool,
    pub flip_v: bool,
    pub translate_h: f64,
    pub translate_v: f64,
    pub translate_unit: TranslateUnit,
}

impl Default for ImageTransform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            rotate: 0.0,
            flip_h: false,
            flip_v: false,
            translate_h: 0.0,
            translate_v: 0.0,
            translate_unit: TranslateUnit::Percent,
        }
    }
}

impl ImageTransform {
    /// No scaling, rotation, flip or translation.
    pub fn is_identity(&self) -> bool {
        self.scale == 1.0
            && self.rotate == 0.0
            && !self.flip_h
            && !self.flip_v
            && self.translate_h == 0.0
            && self.translate_v == 0.0
    }
}

/// Partial settings patch. Absent fields keep their current value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CropperOptions {
    pub format: Option<OutputFormat>,
    pub output: Option<OutputType>,
    pub auto_crop: Option<bool>,
    pub maintain_aspect_ratio: Option<bool>,
    pub aspect_ratio: Option<f64>,
    pub resize_to_width: Option<u32>,
    pub resize_to_height: Option<u32>,
    pub only_scale_down: Option<bool>,
    pub cropper_min_width: Option<f64>,
    pub cropper_min_height: Option<f64>,
    pub cropper_max_width: Option<f64>,
    pub cropper_max_height: Option<f64>,
    pub cropper_static_width: Option<f64>,
    pub cropper_static_height: Option<f64>,
    pub canvas_rotation: Option<i32>,
    pub initial_step_size: Option<u32>,
    pub round_cropper: Option<bool>,
    pub hide_resize_squares: Option<bool>,
    pub background_color: Option<BackgroundColor>,
    pub contain_within_aspect_ratio: Option<bool>,
    pub image_quality: Option<u8>,
    pub align_image: Option<AlignImage>,
    pub allow_move_image: Option<bool>,
    pub disabled: Option<bool>,
    pub hidden: Option<bool>,
}

/// What a [`CropperSettings::set_options`] call changed, so the owner can
/// decide between rescaling bounds, resetting the cropper, or re-transforming
/// the image.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SettingsChange {
    pub aspect_ratio: bool,
    pub bounds: bool,
    pub image_transform: bool,
    pub visibility: bool,
}

impl SettingsChange {
    pub fn any(&self) -> bool {
        self.aspect_ratio || self.bounds || self.image_transform || self.visibility
    }
}

/// Full, validated settings plus bounds derived from the image and container.
#[derive(Clone, Debug, PartialEq)]
pub struct CropperSettings {
    pub format: OutputFormat,
    pub output: OutputType,
    pub auto_crop: bool,
    pub maintain_aspect_ratio: bool,
    pub aspect_ratio: f64,
    pub resize_to_width: u32,
    pub resize_to_height: u32,
    pub only_scale_down: bool,
    /// Bitmap pixels; 0 means unconstrained.
    pub cropper_min_width: f64,
    pub cropper_min_height: f64,
    pub cropper_max_width: f64,
    pub cropper_max_height: f64,
    pub cropper_static_width: f64,
    pub cropper_static_height: f64,
    /// Quarter turns, combined with the EXIF rotation.
    pub canvas_rotation: i32,
    pub initial_step_size: u32,
    pub round_cropper: bool,
    pub hide_resize_squares: bool,
    pub background_color: Option<BackgroundColor>,
    pub contain_within_aspect_ratio: bool,
    pub image_quality: u8,
    pub align_image: AlignImage,
    pub allow_move_image: bool,
    pub disabled: bool,
    pub hidden: bool,

    // Derived, in container pixels.
    pub cropper_scaled_min_width: f64,
    pub cropper_scaled_min_height: f64,
    pub cropper_scaled_max_width: f64,
    pub cropper_scaled_max_height: f64,
}

impl Default for CropperSettings {
    fn default() -> Self {
        Self {
            format: OutputFormat::Png,
            output: OutputType::Base64,
            auto_crop: true,
            maintain_aspect_ratio: true,
            aspect_ratio: 1.0,
            resize_to_width: 0,
            resize_to_height: 0,
            only_scale_down: false,
            cropper_min_width: 0.0,
            cropper_min_height: 0.0,
            cropper_max_width: 0.0,
            cropper_max_height: 0.0,
            cropper_static_width: 0.0,
            cropper_static_height: 0.0,
            canvas_rotation: 0,
            initial_step_size: 3,
            round_cropper: false,
            hide_resize_squares: false,
            background_color: None,
            contain_within_aspect_ratio: false,
            image_quality: 92,
            align_image: AlignImage::Center,
            allow_move_image: false,
            disabled: false,
            hidden: false,
            cropper_scaled_min_width: MIN_CROPPER_SIZE,
            cropper_scaled_min_height: MIN_CROPPER_SIZE,
            cropper_scaled_max_width: 20000.0,
            cropper_scaled_max_height: 20000.0,
        }
    }
}

impl CropperSettings {
    /// Settings built from defaults plus one patch.
    pub fn from_options(options: &CropperOptions) -> Result<Self> {
        let mut settings = Self::default();
        settings.set_options(options)?;
        Ok(settings)
    }

    /// Merge `options` into these settings.
    ///
    /// Fails with [`CropperError::Configuration`] when the merged result keeps
    /// the aspect ratio but the ratio is not positive.
    pub fn set_options(&mut self, options: &CropperOptions) -> Result<SettingsChange> {
        let mut next = self.clone();
        next.merge(options);
        next.apply_static_size();
        next.validate()?;

        let change = SettingsChange {
            aspect_ratio: next.maintain_aspect_ratio != self.maintain_aspect_ratio
                || next.aspect_ratio != self.aspect_ratio,
            bounds: next.cropper_min_width != self.cropper_min_width
                || next.cropper_min_height != self.cropper_min_height
                || next.cropper_max_width != self.cropper_max_width
                || next.cropper_max_height != self.cropper_max_height
                || next.cropper_static_width != self.cropper_static_width
                || next.cropper_static_height != self.cropper_static_height,
            image_transform: next.canvas_rotation != self.canvas_rotation
                || next.contain_within_aspect_ratio != self.contain_within_aspect_ratio
                || (next.contain_within_aspect_ratio && next.aspect_ratio != self.aspect_ratio),
            visibility: next.hidden != self.hidden,
        };
        *self = next;
        Ok(change)
    }

    fn merge(&mut self, o: &CropperOptions) {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = o.$field {
                    self.$field = value;
                })*
            };
        }
        take!(
            format,
            output,
            auto_crop,
            maintain_aspect_ratio,
            aspect_ratio,
            resize_to_width,
            resize_to_height,
            only_scale_down,
            cropper_min_width,
            cropper_min_height,
            cropper_max_width,
            cropper_max_height,
            cropper_static_width,
            cropper_static_height,
            canvas_rotation,
            initial_step_size,
            round_cropper,
            hide_resize_squares,
            contain_within_aspect_ratio,
            image_quality,
            align_image,
            allow_move_image,
            disabled,
            hidden,
        );
        if o.background_color.is_some() {
            self.background_color = o.background_color;
        }
    }

    /// A static size pins the rectangle and overrides aspect-ratio maintenance.
    fn apply_static_size(&mut self) {
        if self.has_static_size() {
            self.hide_resize_squares = true;
            self.cropper_min_width = self.cropper_static_width;
            self.cropper_min_height = self.cropper_static_height;
            self.cropper_max_width = self.cropper_static_width;
            self.cropper_max_height = self.cropper_static_height;
            self.maintain_aspect_ratio = false;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.maintain_aspect_ratio && !(self.aspect_ratio > 0.0) {
            return Err(CropperError::Configuration(
                "aspectRatio must be a positive number when maintainAspectRatio is enabled"
                    .into(),
            ));
        }
        if self.image_quality > 100 {
            return Err(CropperError::Configuration(format!(
                "imageQuality must be between 0 and 100, got {}",
                self.image_quality
            )));
        }
        Ok(())
    }

    pub fn has_static_size(&self) -> bool {
        self.cropper_static_width > 0.0 && self.cropper_static_height > 0.0
    }

    /// Encoder quality in `0.0..=1.0`.
    pub fn quality(&self) -> f64 {
        (self.image_quality as f64 / 100.0).clamp(0.0, 1.0)
    }

    /// Convert the bitmap-pixel min/max bounds into container pixels.
    ///
    /// `transformed` is the pixel size of the bitmap being cropped, `None`
    /// before an image is loaded. Minimums are floored at
    /// [`MIN_CROPPER_SIZE`]; maximums are aspect-corrected and then never
    /// allowed below the minimums.
    pub fn recompute_scaled_bounds(&mut self, transformed: Option<Dimensions>, max_size: Dimensions) {
        let Some(transformed) = transformed.filter(|t| !t.is_empty() && !max_size.is_empty())
        else {
            self.cropper_scaled_min_width = MIN_CROPPER_SIZE;
            self.cropper_scaled_min_height = MIN_CROPPER_SIZE;
            self.cropper_scaled_max_width = max_size.width;
            self.cropper_scaled_max_height = max_size.height;
            return;
        };
        // Bitmap pixels per container pixel; the display never stretches one axis.
        let ratio = transformed.width / max_size.width;

        self.cropper_scaled_min_width = if self.cropper_min_width > 0.0 {
            (self.cropper_min_width / ratio).max(MIN_CROPPER_SIZE)
        } else {
            MIN_CROPPER_SIZE
        };
        self.cropper_scaled_min_height = if self.maintain_aspect_ratio {
            (self.cropper_scaled_min_width / self.aspect_ratio).max(MIN_CROPPER_SIZE)
        } else if self.cropper_min_height > 0.0 {
            (self.cropper_min_height / ratio).max(MIN_CROPPER_SIZE)
        } else {
            MIN_CROPPER_SIZE
        };

        let mut max_width = if self.cropper_max_width > MIN_CROPPER_SIZE {
            self.cropper_max_width / ratio
        } else {
            max_size.width
        };
        let mut max_height = if self.cropper_max_height > MIN_CROPPER_SIZE {
            self.cropper_max_height / ratio
        } else {
            max_size.height
        };
        if self.maintain_aspect_ratio {
            if max_width > max_height * self.aspect_ratio {
                max_width = max_height * self.aspect_ratio;
            } else if max_width < max_height * self.aspect_ratio {
                max_height = max_width / self.aspect_ratio;
            }
        }
        self.cropper_scaled_max_width = max_width.max(self.cropper_scaled_min_width);
        self.cropper_scaled_max_height = max_height.max(self.cropper_scaled_min_height);
    }

    /// Exact ratio check; only used to skip needless resets.
    pub fn aspect_ratio_is_correct(&self, cropper: &CropperPosition) -> bool {
        cropper.width() / cropper.height() == self.aspect_ratio
    }
}

/// Field-wise position equality with 3-decimal tolerance.
pub fn equals_cropper_position(a: &CropperPosition, b: &CropperPosition) -> bool {
    a.approx_eq(b)
}

/// Exact field-wise transform equality.
pub fn equals_transform(a: &ImageTransform, b: &ImageTransform) -> bool {
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_aspect_ratio_is_rejected() {
        let mut settings = CropperSettings::default();
        let err = settings
            .set_options(&CropperOptions {
                maintain_aspect_ratio: Some(true),
                aspect_ratio: Some(0.0),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, CropperError::Configuration(_)));
        assert!(err.to_string().contains("aspectRatio must be a positive number"));
        // Rejected patch leaves the previous value in place.
        assert_eq!(settings.aspect_ratio, 1.0);
    }

    #[test]
    fn zero_aspect_ratio_allowed_when_not_maintained() {
        let settings = CropperSettings::from_options(&CropperOptions {
            maintain_aspect_ratio: Some(false),
            aspect_ratio: Some(0.0),
            ..Default::default()
        });
        assert!(settings.is_ok());
    }

    #[test]
    fn static_size_overrides_aspect_ratio() {
        let settings = CropperSettings::from_options(&CropperOptions {
            cropper_static_width: Some(200.0),
            cropper_static_height: Some(100.0),
            maintain_aspect_ratio: Some(true),
            ..Default::default()
        })
        .unwrap();
        assert!(settings.hide_resize_squares);
        assert!(!settings.maintain_aspect_ratio);
        assert_eq!(settings.cropper_min_width, 200.0);
        assert_eq!(settings.cropper_max_width, 200.0);
        assert_eq!(settings.cropper_min_height, 100.0);
        assert_eq!(settings.cropper_max_height, 100.0);
    }

    #[test]
    fn change_flags() {
        let mut settings = CropperSettings::default();
        let change = settings
            .set_options(&CropperOptions {
                aspect_ratio: Some(16.0 / 9.0),
                ..Default::default()
            })
            .unwrap();
        assert!(change.aspect_ratio);
        assert!(!change.bounds);

        let change = settings
            .set_options(&CropperOptions {
                canvas_rotation: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert!(change.image_transform);
        assert!(!change.aspect_ratio);

        let change = settings.set_options(&CropperOptions::default()).unwrap();
        assert!(!change.any());
    }

    #[test]
    fn scaled_bounds_without_image_use_floor_and_container() {
        let mut settings = CropperSettings::default();
        settings.recompute_scaled_bounds(None, Dimensions::new(400.0, 300.0));
        assert_eq!(settings.cropper_scaled_min_width, 20.0);
        assert_eq!(settings.cropper_scaled_min_height, 20.0);
        assert_eq!(settings.cropper_scaled_max_width, 400.0);
        assert_eq!(settings.cropper_scaled_max_height, 300.0);
    }

    #[test]
    fn scaled_bounds_convert_bitmap_pixels() {
        let mut settings = CropperSettings::from_options(&CropperOptions {
            maintain_aspect_ratio: Some(false),
            cropper_min_width: Some(200.0),
            cropper_min_height: Some(20.0),
            cropper_max_width: Some(800.0),
            cropper_max_height: Some(600.0),
            ..Default::default()
        })
        .unwrap();
        // 2000px bitmap shown at 500px: ratio 4.
        settings.recompute_scaled_bounds(
            Some(Dimensions::new(2000.0, 1000.0)),
            Dimensions::new(500.0, 250.0),
        );
        assert_eq!(settings.cropper_scaled_min_width, 50.0);
        assert_eq!(settings.cropper_scaled_min_height, 20.0);
        assert_eq!(settings.cropper_scaled_max_width, 200.0);
        assert_eq!(settings.cropper_scaled_max_height, 150.0);
    }

    #[test]
    fn scaled_max_is_aspect_corrected() {
        let mut settings = CropperSettings::from_options(&CropperOptions {
            aspect_ratio: Some(2.0),
            ..Default::default()
        })
        .unwrap();
        settings.recompute_scaled_bounds(
            Some(Dimensions::new(400.0, 300.0)),
            Dimensions::new(400.0, 300.0),
        );
        assert_eq!(settings.cropper_scaled_max_width, 400.0);
        assert_eq!(settings.cropper_scaled_max_height, 200.0);
    }

    #[test]
    fn background_color_parsing() {
        assert_eq!(
            BackgroundColor::from_hex("#fff").unwrap(),
            BackgroundColor::rgba(255, 255, 255, 255)
        );
        assert_eq!(
            BackgroundColor::from_hex("#10203040").unwrap(),
            BackgroundColor::rgba(16, 32, 48, 64)
        );
        assert!(BackgroundColor::from_hex("#12").is_err());
        assert_eq!(BackgroundColor::rgba(1, 2, 3, 255).to_hex(), "#010203");
    }

    #[test]
    fn options_deserialize_from_json() {
        let options: CropperOptions = serde_json::from_str(
            r##"{"aspectRatio": 1.5, "format": "jpeg", "output": "blob", "backgroundColor": "#000000"}"##,
        )
        .unwrap();
        assert_eq!(options.aspect_ratio, Some(1.5));
        assert_eq!(options.format, Some(OutputFormat::Jpeg));
        assert_eq!(options.output, Some(OutputType::Blob));
        assert_eq!(options.background_color, Some(BackgroundColor::rgba(0, 0, 0, 255)));
        assert_eq!(options.resize_to_width, None);
    }

    #[test]
    fn non_ascii_background_color_is_a_configuration_error() {
        for hex in ["#€", "#€€", "ab€d"] {
            assert!(matches!(
                BackgroundColor::from_hex(hex),
                Err(CropperError::Configuration(_))
            ));
        }
        let err = serde_json::from_str::<CropperOptions>(r##"{"backgroundColor": "#€"}"##);
        assert!(err.is_err());
    }

    #[test]
    fn transform_equality_defaults() {
        let a = ImageTransform::default();
        let b: ImageTransform = serde_json::from_str(r#"{"rotate": 0}"#).unwrap();
        assert!(equals_transform(&a, &b));
        assert_eq!(b.scale, 1.0);
        let c = ImageTransform {
            flip_h: true,
            ..a
        };
        assert!(!equals_transform(&a, &c));
    }

    #[test]
    fn quality_is_fraction() {
        let settings = CropperSettings::default();
        assert!((settings.quality() - 0.92).abs() < 1e-9);
    }
}
