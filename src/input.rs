//! Normalizes raw host input (mouse, touch, keyboard, pinch) into the
//! vocabulary of the position engine.

use crate::position::{ClientPoint, MoveType, ResizeHandle};

/// A pointer-like event from the host.
#[derive(Clone, Debug, PartialEq)]
pub enum PointerEvent {
    /// Mouse or pen pointer.
    Mouse { client_x: f64, client_y: f64 },
    /// Touch event; only the first touch point is used.
    Touch { touches: Vec<ClientPoint> },
    /// An already-normalized point (keyboard nudges, tests).
    Point(ClientPoint),
}

impl PointerEvent {
    pub fn mouse(client_x: f64, client_y: f64) -> Self {
        Self::Mouse { client_x, client_y }
    }

    /// Client coordinates; a touch event without touches reads as the origin.
    pub fn client_point(&self) -> ClientPoint {
        match self {
            PointerEvent::Mouse { client_x, client_y } => ClientPoint::new(*client_x, *client_y),
            PointerEvent::Touch { touches } => touches.first().copied().unwrap_or_default(),
            PointerEvent::Point(point) => *point,
        }
    }
}

impl From<ClientPoint> for PointerEvent {
    fn from(point: ClientPoint) -> Self {
        Self::Point(point)
    }
}

/// Pinch update: scale relative to the gesture start.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PinchEvent {
    pub scale: f64,
}

/// Keys the cropper reacts to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    /// `1`..=`9`
    Digit(u8),
    Other,
}

impl Key {
    /// Parse a DOM-style key name (`"ArrowUp"`, `"5"`).
    pub fn from_name(name: &str) -> Self {
        match name {
            "ArrowUp" => Key::ArrowUp,
            "ArrowDown" => Key::ArrowDown,
            "ArrowLeft" => Key::ArrowLeft,
            "ArrowRight" => Key::ArrowRight,
            _ => match name.parse::<u8>() {
                Ok(d @ 1..=9) => Key::Digit(d),
                _ => Key::Other,
            },
        }
    }
}

/// A key press with the modifiers the cropper cares about.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct KeyInput {
    pub key: Key,
    pub shift: bool,
    pub alt: bool,
}

impl KeyInput {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            shift: false,
            alt: false,
        }
    }

    pub fn shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn alt(mut self) -> Self {
        self.alt = true;
        self
    }
}

/// What a key press asks the cropper to do.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum KeyAction {
    SetStepSize(u32),
    /// A complete gesture: start at the origin, move to `to`, release.
    Nudge {
        move_type: MoveType,
        handle: Option<ResizeHandle>,
        to: ClientPoint,
    },
}

/// Map a key press to a cropper action.
///
/// Arrows move the rectangle by `step_size`; with Shift they resize the edge
/// the arrow points at, and Alt targets the opposite edge instead.
pub fn translate_key(input: KeyInput, step_size: u32) -> Option<KeyAction> {
    let step = step_size as f64;
    let (to, edge, inverted_edge) = match input.key {
        Key::Digit(d) => return Some(KeyAction::SetStepSize(d as u32)),
        Key::Other => return None,
        Key::ArrowUp => (ClientPoint::new(0.0, -step), ResizeHandle::Top, ResizeHandle::Bottom),
        Key::ArrowRight => (ClientPoint::new(step, 0.0), ResizeHandle::Right, ResizeHandle::Left),
        Key::ArrowDown => (ClientPoint::new(0.0, step), ResizeHandle::Bottom, ResizeHandle::Top),
        Key::ArrowLeft => (ClientPoint::new(-step, 0.0), ResizeHandle::Left, ResizeHandle::Right),
    };
    let (move_type, handle) = if input.shift {
        (
            MoveType::Resize,
            Some(if input.alt { inverted_edge } else { edge }),
        )
    } else {
        (MoveType::Move, None)
    };
    Some(KeyAction::Nudge {
        move_type,
        handle,
        to,
    })
}
