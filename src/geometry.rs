//! Geometry primitives shared by the position engine and the renderer.
//!
//! Everything here is pure: no settings, no image, no state.

use serde::{Deserialize, Serialize};

/// Minimum edge length of the crop rectangle in container pixels.
pub const MIN_CROPPER_SIZE: f64 = 20.0;

/// Width × height, used both for container sizes and bitmap sizes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
}

impl Dimensions {
    pub const ZERO: Self = Self {
        width: 0.0,
        height: 0.0,
    };

    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Dimensions of a bitmap in pixels.
    pub fn from_pixels(width: u32, height: u32) -> Self {
        Self::new(width as f64, height as f64)
    }

    /// True when either side is zero (or negative), e.g. an element not laid out yet.
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width / self.height
    }

    /// Same size with width and height exchanged (a quarter turn).
    pub fn swapped(self) -> Self {
        Self::new(self.height, self.width)
    }
}

/// Crop rectangle corners in container pixel space.
///
/// `x1 <= x2` and `y1 <= y2` hold after every engine operation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CropperPosition {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl CropperPosition {
    /// Held before an image is laid out so nothing renders prematurely.
    pub const UNINITIALIZED: Self = Self {
        x1: -100.0,
        y1: -100.0,
        x2: 10000.0,
        y2: 10000.0,
    };

    pub const fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn size(&self) -> Dimensions {
        Dimensions::new(self.width(), self.height())
    }

    pub fn center(&self) -> (f64, f64) {
        (
            self.x1 + self.width() / 2.0,
            self.y1 + self.height() / 2.0,
        )
    }

    pub fn translated(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x1 + dx, self.y1 + dy, self.x2 + dx, self.y2 + dy)
    }

    /// Scale every coordinate independently per axis.
    pub fn scaled(self, sx: f64, sy: f64) -> Self {
        Self::new(self.x1 * sx, self.y1 * sy, self.x2 * sx, self.y2 * sy)
    }

    /// Swap corners so that `x1 <= x2` and `y1 <= y2`.
    pub fn normalized(self) -> Self {
        Self::new(
            self.x1.min(self.x2),
            self.y1.min(self.y2),
            self.x1.max(self.x2),
            self.y1.max(self.y2),
        )
    }

    /// Equality after rounding each coordinate to three decimals.
    pub fn approx_eq(&self, other: &Self) -> bool {
        round3(self.x1) == round3(other.x1)
            && round3(self.y1) == round3(other.y1)
            && round3(self.x2) == round3(other.x2)
            && round3(self.y2) == round3(other.y2)
    }

    /// Round every coordinate to the nearest integer.
    pub fn rounded(self) -> Self {
        Self::new(
            self.x1.round(),
            self.y1.round(),
            self.x2.round(),
            self.y2.round(),
        )
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// `max(min, min(value, max))`; unlike `f64::clamp` this never panics when
/// `min > max`, the lower bound wins instead.
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.min(max).max(min)
}

/// Axis-aligned bounding box of `size` rotated by `degrees` about its center.
pub fn rotate_box(size: Dimensions, degrees: f64) -> Dimensions {
    let radians = degrees.to_radians();
    let (sin, cos) = (radians.sin().abs(), radians.cos().abs());
    Dimensions::new(
        size.width * cos + size.height * sin,
        size.width * sin + size.height * cos,
    )
}

/// Largest box of the given aspect ratio (width / height) that fits inside `bounds`.
pub fn fit_aspect(bounds: Dimensions, aspect_ratio: f64) -> Dimensions {
    if bounds.width / aspect_ratio <= bounds.height {
        Dimensions::new(bounds.width, bounds.width / aspect_ratio)
    } else {
        Dimensions::new(bounds.height * aspect_ratio, bounds.height)
    }
}

/// Smallest box of the given aspect ratio that contains `bounds`.
pub fn cover_aspect(bounds: Dimensions, aspect_ratio: f64) -> Dimensions {
    Dimensions::new(
        bounds.width.max(bounds.height * aspect_ratio),
        bounds.height.max(bounds.width / aspect_ratio),
    )
}
