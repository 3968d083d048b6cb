//! Crop rectangle engine: initialization, container rescale, move, handle
//! resize, pinch resize, aspect-ratio correction and bounds enforcement.
//!
//! Every function here mutates a [`CropperPosition`] it is handed and reads
//! settings by shared reference. Moves and resizes are always recomputed from
//! the gesture-start snapshot in [`MoveStart`] plus the live pointer delta, so
//! a long drag does not accumulate rounding error.
//!
//! Constraint order when a rectangle is (re)built:
//!
//! ```text
//! static size pin -> min/max clamp -> aspect-ratio correction -> bounds overflow correction
//! ```

use serde::{Deserialize, Serialize};

use crate::geometry::{CropperPosition, Dimensions, clamp, fit_aspect};
use crate::settings::{CropperSettings, ImageTransform};

/// Named drag target on the crop rectangle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeHandle {
    Left,
    TopLeft,
    Top,
    TopRight,
    Right,
    BottomRight,
    Bottom,
    BottomLeft,
    /// Synthetic handle for pinch resizing around the rectangle center.
    Center,
}

impl ResizeHandle {
    /// The eight edge and corner handles, clockwise from the left edge.
    pub const EDGES: [ResizeHandle; 8] = [
        ResizeHandle::Left,
        ResizeHandle::TopLeft,
        ResizeHandle::Top,
        ResizeHandle::TopRight,
        ResizeHandle::Right,
        ResizeHandle::BottomRight,
        ResizeHandle::Bottom,
        ResizeHandle::BottomLeft,
    ];

    /// Where this handle sits on `rect`.
    pub fn anchor(self, rect: &CropperPosition) -> (f64, f64) {
        let (cx, cy) = rect.center();
        match self {
            ResizeHandle::Left => (rect.x1, cy),
            ResizeHandle::TopLeft => (rect.x1, rect.y1),
            ResizeHandle::Top => (cx, rect.y1),
            ResizeHandle::TopRight => (rect.x2, rect.y1),
            ResizeHandle::Right => (rect.x2, cy),
            ResizeHandle::BottomRight => (rect.x2, rect.y2),
            ResizeHandle::Bottom => (cx, rect.y2),
            ResizeHandle::BottomLeft => (rect.x1, rect.y2),
            ResizeHandle::Center => (cx, cy),
        }
    }
}

/// Kind of gesture in progress.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveType {
    /// Translate the crop rectangle.
    Move,
    /// Drag one handle of the crop rectangle.
    Resize,
    /// Two-finger scale around the rectangle center.
    Pinch,
    /// Translate the displayed image instead of the rectangle.
    Drag,
}

/// A pointer position in container pixels.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientPoint {
    pub client_x: f64,
    pub client_y: f64,
}

impl ClientPoint {
    pub const fn new(client_x: f64, client_y: f64) -> Self {
        Self { client_x, client_y }
    }
}

/// Snapshot taken when a gesture starts; read-only until the gesture ends.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MoveStart {
    pub active: bool,
    pub move_type: MoveType,
    pub position: Option<ResizeHandle>,
    pub client_x: f64,
    pub client_y: f64,
    pub cropper: CropperPosition,
    pub transform: ImageTransform,
}

impl MoveStart {
    pub fn new(
        move_type: MoveType,
        position: Option<ResizeHandle>,
        point: ClientPoint,
        cropper: CropperPosition,
        transform: ImageTransform,
    ) -> Self {
        Self {
            active: true,
            move_type,
            position,
            client_x: point.client_x,
            client_y: point.client_y,
            cropper,
            transform,
        }
    }

    /// Pinch snapshot: the reference point is the rectangle center.
    pub fn pinch(cropper: CropperPosition, transform: ImageTransform) -> Self {
        let (cx, cy) = cropper.center();
        Self::new(
            MoveType::Pinch,
            Some(ResizeHandle::Center),
            ClientPoint::new(cx, cy),
            cropper,
            transform,
        )
    }

    fn delta(&self, point: ClientPoint) -> (f64, f64) {
        (point.client_x - self.client_x, point.client_y - self.client_y)
    }
}

/// Live input for a resize step.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ResizeInput {
    /// Pointer position for edge/corner handles.
    Pointer(ClientPoint),
    /// Pinch scale relative to gesture start, for the center handle.
    Pinch { scale: f64 },
}

/// Largest legal rectangle for a fresh image, centered in `max_size`.
pub fn initial_position(max_size: Dimensions, settings: &CropperSettings) -> CropperPosition {
    let mut size = Dimensions::new(
        settings.cropper_scaled_max_width.min(max_size.width),
        settings.cropper_scaled_max_height.min(max_size.height),
    );
    if settings.maintain_aspect_ratio && !settings.has_static_size() {
        size = fit_aspect(size, settings.aspect_ratio);
    }
    let x1 = (max_size.width - size.width) / 2.0;
    let y1 = (max_size.height - size.height) / 2.0;
    let mut cropper = CropperPosition::new(x1, y1, x1 + size.width, y1 + size.height);
    check_within_bounds(&mut cropper, max_size, true);
    cropper
}

/// Bring the rectangle inside the scaled min/max around its own center.
/// Returns whether it changed.
pub fn fit_to_size_bounds(
    cropper: &mut CropperPosition,
    max_size: Dimensions,
    settings: &CropperSettings,
) -> bool {
    let current = cropper.size();
    let mut size = Dimensions::new(
        clamp(
            current.width,
            settings.cropper_scaled_min_width,
            settings.cropper_scaled_max_width,
        ),
        clamp(
            current.height,
            settings.cropper_scaled_min_height,
            settings.cropper_scaled_max_height,
        ),
    );
    if size == current {
        return false;
    }
    if settings.maintain_aspect_ratio {
        size = fit_aspect(size, settings.aspect_ratio);
    }
    let (cx, cy) = cropper.center();
    *cropper = CropperPosition::new(
        cx - size.width / 2.0,
        cy - size.height / 2.0,
        cx + size.width / 2.0,
        cy + size.height / 2.0,
    );
    check_within_bounds(cropper, max_size, true);
    true
}

/// Linear rescale of every coordinate when the container size changes.
pub fn resize_to_container(
    cropper: &mut CropperPosition,
    old_max_size: Dimensions,
    new_max_size: Dimensions,
) {
    if old_max_size == new_max_size || old_max_size.is_empty() {
        return;
    }
    *cropper = cropper.scaled(
        new_max_size.width / old_max_size.width,
        new_max_size.height / old_max_size.height,
    );
}

/// Translate the gesture-start rectangle by the pointer delta.
pub fn move_by(cropper: &mut CropperPosition, move_start: &MoveStart, point: ClientPoint) {
    let (dx, dy) = move_start.delta(point);
    *cropper = move_start.cropper.translated(dx, dy);
}

/// Resize by the handle recorded in `move_start`, then restore the aspect
/// ratio if it is maintained.
pub fn resize(
    cropper: &mut CropperPosition,
    move_start: &MoveStart,
    input: ResizeInput,
    max_size: Dimensions,
    settings: &CropperSettings,
) {
    let Some(handle) = move_start.position else {
        return;
    };
    let (move_x, move_y) = match input {
        ResizeInput::Pointer(point) => move_start.delta(point),
        ResizeInput::Pinch { .. } => (0.0, 0.0),
    };
    let start = &move_start.cropper;
    let s = settings;

    // Each moving edge is bounded by the opposite edge's live value.
    let left = |c: &CropperPosition| {
        (start.x1 + move_x)
            .max(c.x2 - s.cropper_scaled_max_width)
            .min(c.x2 - s.cropper_scaled_min_width)
    };
    let right = |c: &CropperPosition| {
        (start.x2 + move_x)
            .min(c.x1 + s.cropper_scaled_max_width)
            .max(c.x1 + s.cropper_scaled_min_width)
    };
    let top = |c: &CropperPosition| {
        (start.y1 + move_y)
            .max(c.y2 - s.cropper_scaled_max_height)
            .min(c.y2 - s.cropper_scaled_min_height)
    };
    let bottom = |c: &CropperPosition| {
        (start.y2 + move_y)
            .min(c.y1 + s.cropper_scaled_max_height)
            .max(c.y1 + s.cropper_scaled_min_height)
    };

    match handle {
        ResizeHandle::Left => cropper.x1 = left(cropper),
        ResizeHandle::TopLeft => {
            cropper.x1 = left(cropper);
            cropper.y1 = top(cropper);
        }
        ResizeHandle::Top => cropper.y1 = top(cropper),
        ResizeHandle::TopRight => {
            cropper.x2 = right(cropper);
            cropper.y1 = top(cropper);
        }
        ResizeHandle::Right => cropper.x2 = right(cropper),
        ResizeHandle::BottomRight => {
            cropper.x2 = right(cropper);
            cropper.y2 = bottom(cropper);
        }
        ResizeHandle::Bottom => cropper.y2 = bottom(cropper),
        ResizeHandle::BottomLeft => {
            cropper.x1 = left(cropper);
            cropper.y2 = bottom(cropper);
        }
        ResizeHandle::Center => {
            let scale = match input {
                ResizeInput::Pinch { scale } => scale,
                ResizeInput::Pointer(_) => 1.0,
            };
            pinch_around_center(cropper, move_start, scale, max_size, settings);
        }
    }

    if settings.maintain_aspect_ratio {
        check_aspect_ratio(handle, cropper, max_size, settings);
    }
}

fn pinch_around_center(
    cropper: &mut CropperPosition,
    move_start: &MoveStart,
    scale: f64,
    max_size: Dimensions,
    s: &CropperSettings,
) {
    let start = &move_start.cropper;
    let new_width = clamp(
        start.width().abs() * scale,
        s.cropper_scaled_min_width,
        s.cropper_scaled_max_width,
    );
    let new_height = clamp(
        start.height().abs() * scale,
        s.cropper_scaled_min_height,
        s.cropper_scaled_max_height,
    );

    cropper.x1 = move_start.client_x - new_width / 2.0;
    cropper.x2 = move_start.client_x + new_width / 2.0;
    cropper.y1 = move_start.client_y - new_height / 2.0;
    cropper.y2 = move_start.client_y + new_height / 2.0;

    // Shift, don't shrink.
    if cropper.x1 < 0.0 {
        cropper.x2 -= cropper.x1;
        cropper.x1 = 0.0;
    } else if cropper.x2 > max_size.width {
        cropper.x1 -= cropper.x2 - max_size.width;
        cropper.x2 = max_size.width;
    }
    if cropper.y1 < 0.0 {
        cropper.y2 -= cropper.y1;
        cropper.y1 = 0.0;
    } else if cropper.y2 > max_size.height {
        cropper.y1 -= cropper.y2 - max_size.height;
        cropper.y2 = max_size.height;
    }
}

/// Recompute one pair of coordinates from the other so the rectangle has the
/// configured aspect ratio, then pull it back inside `max_size` in a single
/// pass that keeps the ratio exact.
///
/// Which pair is derived depends on the edges `handle` moved. For the
/// overflow step, `overflow_y * ratio` and `overflow_x` are compared and the
/// larger one drives the correction on both axes.
pub fn check_aspect_ratio(
    handle: ResizeHandle,
    cropper: &mut CropperPosition,
    max_size: Dimensions,
    settings: &CropperSettings,
) {
    let ratio = settings.aspect_ratio;
    // (shrink along x, shrink along y) for one-sided overflow.
    let correction = |overflow_x: f64, overflow_y: f64| {
        if overflow_y * ratio > overflow_x {
            (overflow_y * ratio, overflow_y)
        } else {
            (overflow_x, overflow_x / ratio)
        }
    };

    match handle {
        ResizeHandle::Top => {
            cropper.x2 = cropper.x1 + cropper.height() * ratio;
            let overflow_x = (cropper.x2 - max_size.width).max(0.0);
            let overflow_y = (0.0 - cropper.y1).max(0.0);
            if overflow_x > 0.0 || overflow_y > 0.0 {
                let (dx, dy) = correction(overflow_x, overflow_y);
                cropper.x2 -= dx;
                cropper.y1 += dy;
            }
        }
        ResizeHandle::Bottom => {
            cropper.x2 = cropper.x1 + cropper.height() * ratio;
            let overflow_x = (cropper.x2 - max_size.width).max(0.0);
            let overflow_y = (cropper.y2 - max_size.height).max(0.0);
            if overflow_x > 0.0 || overflow_y > 0.0 {
                let (dx, dy) = correction(overflow_x, overflow_y);
                cropper.x2 -= dx;
                cropper.y2 -= dy;
            }
        }
        ResizeHandle::TopLeft => {
            cropper.y1 = cropper.y2 - cropper.width() / ratio;
            let overflow_x = (0.0 - cropper.x1).max(0.0);
            let overflow_y = (0.0 - cropper.y1).max(0.0);
            if overflow_x > 0.0 || overflow_y > 0.0 {
                let (dx, dy) = correction(overflow_x, overflow_y);
                cropper.x1 += dx;
                cropper.y1 += dy;
            }
        }
        ResizeHandle::TopRight => {
            cropper.y1 = cropper.y2 - cropper.width() / ratio;
            let overflow_x = (cropper.x2 - max_size.width).max(0.0);
            let overflow_y = (0.0 - cropper.y1).max(0.0);
            if overflow_x > 0.0 || overflow_y > 0.0 {
                let (dx, dy) = correction(overflow_x, overflow_y);
                cropper.x2 -= dx;
                cropper.y1 += dy;
            }
        }
        ResizeHandle::Right | ResizeHandle::BottomRight => {
            cropper.y2 = cropper.y1 + cropper.width() / ratio;
            let overflow_x = (cropper.x2 - max_size.width).max(0.0);
            let overflow_y = (cropper.y2 - max_size.height).max(0.0);
            if overflow_x > 0.0 || overflow_y > 0.0 {
                let (dx, dy) = correction(overflow_x, overflow_y);
                cropper.x2 -= dx;
                cropper.y2 -= dy;
            }
        }
        ResizeHandle::Left | ResizeHandle::BottomLeft => {
            cropper.y2 = cropper.y1 + cropper.width() / ratio;
            let overflow_x = (0.0 - cropper.x1).max(0.0);
            let overflow_y = (cropper.y2 - max_size.height).max(0.0);
            if overflow_x > 0.0 || overflow_y > 0.0 {
                let (dx, dy) = correction(overflow_x, overflow_y);
                cropper.x1 += dx;
                cropper.y2 -= dy;
            }
        }
        ResizeHandle::Center => {
            cropper.x2 = cropper.x1 + cropper.height() * ratio;
            cropper.y2 = cropper.y1 + cropper.width() / ratio;
            let overflow_x1 = (0.0 - cropper.x1).max(0.0);
            let overflow_x2 = (cropper.x2 - max_size.width).max(0.0);
            let overflow_y1 = (cropper.y2 - max_size.height).max(0.0);
            let overflow_y2 = (0.0 - cropper.y1).max(0.0);
            if overflow_x1 > 0.0 || overflow_x2 > 0.0 || overflow_y1 > 0.0 || overflow_y2 > 0.0 {
                let (dx1, dy1) = correction(overflow_x1, overflow_y1);
                let (dx2, dy2) = correction(overflow_x2, overflow_y2);
                cropper.x1 += dx1;
                cropper.x2 -= dx2;
                cropper.y1 += dy2;
                cropper.y2 -= dy1;
            }
        }
    }
}

/// Pull every edge back inside `[0, max_size]`.
///
/// With `maintain_size` the opposite edge shifts by the same overflow so the
/// rectangle keeps its size (drag-moves along a border); without it only the
/// offending edge moves. A rectangle larger than the container is finally
/// clamped to it, which keeps repeated application a no-op.
pub fn check_within_bounds(cropper: &mut CropperPosition, max_size: Dimensions, maintain_size: bool) {
    if cropper.x1 < 0.0 {
        if maintain_size {
            cropper.x2 -= cropper.x1;
        }
        cropper.x1 = 0.0;
    }
    if cropper.y1 < 0.0 {
        if maintain_size {
            cropper.y2 -= cropper.y1;
        }
        cropper.y1 = 0.0;
    }
    if cropper.x2 > max_size.width {
        if maintain_size {
            cropper.x1 -= cropper.x2 - max_size.width;
        }
        cropper.x2 = max_size.width;
    }
    if cropper.y2 > max_size.height {
        if maintain_size {
            cropper.y1 -= cropper.y2 - max_size.height;
        }
        cropper.y2 = max_size.height;
    }

    cropper.x1 = cropper.x1.max(0.0).min(max_size.width);
    cropper.y1 = cropper.y1.max(0.0).min(max_size.height);
    cropper.x2 = cropper.x2.min(max_size.width).max(cropper.x1);
    cropper.y2 = cropper.y2.min(max_size.height).max(cropper.y1);
}
