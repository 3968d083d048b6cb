//! Geometry engine of an interactive image cropper.
//!
//! [`ImageCropper`] keeps a crop rectangle in container pixels (the on-screen
//! size of the displayed image), enforces bounds, min/max and static sizes and
//! a fixed aspect ratio while the user moves, resizes or pinches it, and
//! renders the selected region of the loaded image on demand.
//!
//! ```no_run
//! use image_cropper::{CropperOptions, Dimensions, ImageCropper, ImageSource, OutputType};
//!
//! let mut cropper = ImageCropper::new(&CropperOptions {
//!     aspect_ratio: Some(16.0 / 9.0),
//!     ..Default::default()
//! })?;
//! cropper.load_image(&ImageSource::file("photo.jpg"));
//! cropper.image_layout_ready(Dimensions::new(800.0, 600.0));
//! let result = cropper.crop_sync(OutputType::Base64);
//! # Ok::<(), image_cropper::CropperError>(())
//! ```

pub mod cropper;
pub mod error;
pub mod geometry;
pub mod input;
pub mod loader;
pub mod position;
pub mod renderer;
pub mod settings;

pub use cropper::{CropperEvent, ImageCropper, LayoutStatus};
pub use error::{CropperError, Result};
pub use geometry::{CropperPosition, Dimensions};
pub use input::{Key, KeyInput, PinchEvent, PointerEvent};
pub use loader::{ImageSource, LoadedImage};
pub use position::{ClientPoint, MoveType, ResizeHandle};
pub use renderer::{CropBlob, CropJob, CropResult};
pub use settings::{
    AlignImage, BackgroundColor, CropperOptions, CropperSettings, ImageTransform, OutputFormat,
    OutputType, TranslateUnit,
};
