//! Image loading: decoding from files, bytes, base64 and URLs, EXIF
//! orientation, and baking rotation/flip/padding into the bitmap that is
//! displayed and cropped.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use exif::{In, Tag};
use image::{DynamicImage, ImageReader, RgbaImage, imageops};
use tracing::debug;

use crate::error::{CropperError, Result};
use crate::geometry::{Dimensions, cover_aspect};
use crate::settings::CropperSettings;

/// Where an image comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    File(PathBuf),
    Bytes(Vec<u8>),
    /// Raw base64 or a `data:image/...;base64,` URI.
    Base64(String),
    /// Requires the `network` feature.
    Url(String),
}

impl ImageSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn base64(data: impl Into<String>) -> Self {
        Self::Base64(data.into())
    }
}

/// Rotation (quarter turns, clockwise) and horizontal flip from EXIF.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ExifTransform {
    pub rotate: u8,
    pub flip: bool,
}

impl ExifTransform {
    /// Map the EXIF `Orientation` tag (1-8); anything else is the identity.
    pub fn from_orientation(value: u32) -> Self {
        let (rotate, flip) = match value {
            2 => (0, true),
            3 => (2, false),
            4 => (2, true),
            5 => (1, true),
            6 => (1, false),
            7 => (3, true),
            8 => (3, false),
            _ => (0, false),
        };
        Self { rotate, flip }
    }

    /// Read the orientation tag from an encoded image; identity when absent.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut cursor = Cursor::new(bytes);
        match exif::Reader::new().read_from_container(&mut cursor) {
            Ok(exif) => exif
                .get_field(Tag::Orientation, In::PRIMARY)
                .and_then(|field| field.value.get_uint(0))
                .map(Self::from_orientation)
                .unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }
}

/// A decoded bitmap and its pixel size.
#[derive(Clone, Debug)]
pub struct LoadedBitmap {
    pub image: Arc<DynamicImage>,
    pub size: Dimensions,
}

impl LoadedBitmap {
    pub fn new(image: DynamicImage) -> Self {
        let size = Dimensions::from_pixels(image.width(), image.height());
        Self {
            image: Arc::new(image),
            size,
        }
    }
}

/// The decoded source plus the bitmap actually displayed and cropped.
///
/// Immutable once built: a new load produces a new value, so renders holding
/// a previous `LoadedImage` stay valid.
#[derive(Clone, Debug)]
pub struct LoadedImage {
    pub original: LoadedBitmap,
    pub transformed: LoadedBitmap,
    pub exif_transform: ExifTransform,
}

/// Decode an image from memory, reading its EXIF orientation.
pub fn load_from_bytes(bytes: &[u8]) -> Result<LoadedImage> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    if reader.format().is_none() {
        return Err(CropperError::ImageLoad("unrecognized image type".into()));
    }
    let image = reader.decode()?;
    let exif_transform = ExifTransform::from_bytes(bytes);
    debug!(
        width = image.width(),
        height = image.height(),
        rotate = exif_transform.rotate,
        flip = exif_transform.flip,
        "image decoded"
    );
    let original = LoadedBitmap::new(image);
    Ok(LoadedImage {
        transformed: original.clone(),
        original,
        exif_transform,
    })
}

pub fn load_from_file(path: &Path) -> Result<LoadedImage> {
    let bytes = std::fs::read(path)?;
    load_from_bytes(&bytes).map_err(|e| match e {
        CropperError::ImageLoad(msg) => {
            CropperError::ImageLoad(format!("{}: {msg}", path.display()))
        }
        other => other,
    })
}

/// Decode base64, accepting an optional `data:` URI prefix.
pub fn load_from_base64(data: &str) -> Result<LoadedImage> {
    let payload = match data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };
    let bytes = STANDARD.decode(payload.trim())?;
    load_from_bytes(&bytes)
}

#[cfg(feature = "network")]
pub async fn load_from_url(url: &str) -> Result<LoadedImage> {
    let response = reqwest::get(url)
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| CropperError::ImageLoad(format!("{url}: {e}")))?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| CropperError::ImageLoad(format!("{url}: {e}")))?;
    run_blocking(move || load_from_bytes(&bytes)).await
}

#[cfg(not(feature = "network"))]
pub async fn load_from_url(url: &str) -> Result<LoadedImage> {
    Err(CropperError::ImageLoad(format!(
        "{url}: loading from URLs requires the `network` feature"
    )))
}

/// Load any non-URL source on the calling thread.
pub fn load_sync(source: &ImageSource) -> Result<LoadedImage> {
    match source {
        ImageSource::File(path) => load_from_file(path),
        ImageSource::Bytes(bytes) => load_from_bytes(bytes),
        ImageSource::Base64(data) => load_from_base64(data),
        ImageSource::Url(url) => Err(CropperError::ImageLoad(format!(
            "{url}: URLs can only be loaded asynchronously"
        ))),
    }
}

/// Load any source, decoding on a blocking task.
pub async fn load(source: ImageSource) -> Result<LoadedImage> {
    match source {
        ImageSource::Url(url) => load_from_url(&url).await,
        other => run_blocking(move || load_sync(&other)).await,
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CropperError::Join(e.to_string()))?
}

/// Quarter turns of the combined canvas and EXIF rotation, in `0..4`.
pub fn total_rotation(settings: &CropperSettings, exif: ExifTransform) -> u8 {
    (settings.canvas_rotation + exif.rotate as i32).rem_euclid(4) as u8
}

/// Size of the transformed bitmap for a source of `original` size.
pub fn transformed_size(original: Dimensions, exif: ExifTransform, settings: &CropperSettings) -> Dimensions {
    let rotated = if total_rotation(settings, exif) % 2 == 1 {
        original.swapped()
    } else {
        original
    };
    if settings.contain_within_aspect_ratio && settings.aspect_ratio > 0.0 {
        cover_aspect(rotated, settings.aspect_ratio)
    } else {
        rotated
    }
}

/// Bake EXIF orientation, canvas rotation and aspect-ratio padding into a new
/// transformed bitmap. Returns the original as-is when nothing applies and
/// `force` is false.
pub fn transform_loaded_image(
    loaded: &LoadedImage,
    settings: &CropperSettings,
    force: bool,
) -> LoadedImage {
    let exif = loaded.exif_transform;
    let rotation = total_rotation(settings, exif);
    if !force && rotation == 0 && !exif.flip && !settings.contain_within_aspect_ratio {
        return LoadedImage {
            original: loaded.original.clone(),
            transformed: loaded.original.clone(),
            exif_transform: exif,
        };
    }

    let mut image = match rotation {
        1 => loaded.original.image.rotate90(),
        2 => loaded.original.image.rotate180(),
        3 => loaded.original.image.rotate270(),
        _ => (*loaded.original.image).clone(),
    };
    if exif.flip {
        image = image.fliph();
    }

    let size = transformed_size(loaded.original.size, exif, settings);
    let (width, height) = (size.width.round() as u32, size.height.round() as u32);
    if width != image.width() || height != image.height() {
        let mut canvas = RgbaImage::new(width, height);
        let x = (width as i64 - image.width() as i64) / 2;
        let y = (height as i64 - image.height() as i64) / 2;
        imageops::overlay(&mut canvas, &image.to_rgba8(), x, y);
        image = DynamicImage::ImageRgba8(canvas);
    }
    debug!(rotation, flip = exif.flip, width, height, "image transformed");

    LoadedImage {
        original: loaded.original.clone(),
        transformed: LoadedBitmap::new(image),
        exif_transform: exif,
    }
}
