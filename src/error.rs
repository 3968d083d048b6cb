//! Cropper error types

use thiserror::Error;

/// Errors produced by the cropper and its image collaborators
#[derive(Error, Debug)]
pub enum CropperError {
    /// Invalid option combination, raised from settings validation
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The image source could not be read or is not an image
    #[error("Image load failed: {0}")]
    ImageLoad(String),

    /// Pixel decoding or encoding failed inside the `image` crate
    #[error("Image codec error: {0}")]
    Decode(#[from] image::ImageError),

    /// File system access failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Base64 payload was malformed
    #[error("Invalid base64 data: {0}")]
    Base64(#[from] base64::DecodeError),

    /// No image or no drawable surface; the crop is skipped
    #[error("Render unavailable: {0}")]
    RenderUnavailable(String),

    /// The cropped surface could not be encoded to the requested format
    #[error("Encode failed: {0}")]
    Encode(String),

    /// A blocking render task was cancelled or panicked
    #[error("Render task failed: {0}")]
    Join(String),
}

/// Result type for cropper operations
pub type Result<T> = std::result::Result<T, CropperError>;
