//! The cropper state machine.
//!
//! [`ImageCropper`] owns the crop rectangle, the container size, the gesture
//! snapshot and the loaded image, and turns host calls (options, loads,
//! layout reports, pointer/key/pinch input) into rectangle updates and
//! [`CropperEvent`]s. Hosts poll [`ImageCropper::drain_events`] after each
//! call and redraw from the accessors.
//!
//! ```text
//! Uninitialized --load + layout--> Initialized <--gesture end-- Interacting
//!       ^                              |  start_move / start_pinch  ^
//!       +-------- new image -----------+----------------------------+
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{CropperError, Result};
use crate::geometry::{CropperPosition, Dimensions, rotate_box};
use crate::input::{KeyAction, KeyInput, PinchEvent, PointerEvent, translate_key};
use crate::loader::{self, ImageSource, LoadedImage, transform_loaded_image};
use crate::position::{self, ClientPoint, MoveStart, MoveType, ResizeHandle, ResizeInput};
use crate::renderer::{CropJob, CropResult};
use crate::settings::{
    CropperOptions, CropperSettings, ImageTransform, OutputType, TranslateUnit,
    equals_cropper_position, equals_transform,
};

/// Layout reports with a zero size tolerated before the load is given up.
pub const LAYOUT_RETRY_LIMIT: u32 = 40;

/// Delay between layout polls in [`ImageCropper::wait_for_layout`].
pub const LAYOUT_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Notifications for the host.
#[derive(Clone, Debug, PartialEq)]
pub enum CropperEvent {
    ImageLoaded,
    LoadImageFailed(String),
    /// The container size the rectangle was initialized against.
    CropperReady(Dimensions),
    StartCropImage,
    ImageCropped(CropResult),
    /// End of an image drag.
    TransformChange(ImageTransform),
    CropperChange(CropperPosition),
}

/// Outcome of one layout report.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LayoutStatus {
    Ready,
    /// Size still zero; report again later.
    Pending,
    Failed,
}

#[derive(Debug)]
pub struct ImageCropper {
    settings: CropperSettings,
    cropper: CropperPosition,
    max_size: Dimensions,
    transform: ImageTransform,
    loaded: Option<LoadedImage>,
    move_start: Option<MoveStart>,
    ready: bool,
    layout_attempts: u32,
    step_size: u32,
    deferred_resize: Option<Dimensions>,
    events: VecDeque<CropperEvent>,
    next_sequence: u64,
    last_delivered: u64,
    pending_crop: Option<CropJob>,
}

impl Default for ImageCropper {
    fn default() -> Self {
        Self::with_settings(CropperSettings::default())
    }
}

impl ImageCropper {
    pub fn new(options: &CropperOptions) -> Result<Self> {
        Ok(Self::with_settings(CropperSettings::from_options(options)?))
    }

    fn with_settings(settings: CropperSettings) -> Self {
        Self {
            step_size: settings.initial_step_size,
            settings,
            cropper: CropperPosition::UNINITIALIZED,
            max_size: Dimensions::ZERO,
            transform: ImageTransform::default(),
            loaded: None,
            move_start: None,
            ready: false,
            layout_attempts: 0,
            deferred_resize: None,
            events: VecDeque::new(),
            next_sequence: 0,
            last_delivered: 0,
            pending_crop: None,
        }
    }

    pub fn settings(&self) -> &CropperSettings {
        &self.settings
    }

    pub fn cropper_position(&self) -> CropperPosition {
        self.cropper
    }

    pub fn max_size(&self) -> Dimensions {
        self.max_size
    }

    pub fn transform(&self) -> &ImageTransform {
        &self.transform
    }

    pub fn loaded_image(&self) -> Option<&LoadedImage> {
        self.loaded.as_ref()
    }

    pub fn step_size(&self) -> u32 {
        self.step_size
    }

    /// An image is loaded and the rectangle is valid for the current container.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn active_gesture(&self) -> Option<MoveType> {
        self.move_start.filter(|m| m.active).map(|m| m.move_type)
    }

    pub fn drain_events(&mut self) -> Vec<CropperEvent> {
        self.events.drain(..).collect()
    }

    /// Apply an options patch. Invalid patches are rejected whole.
    pub fn set_options(&mut self, options: &CropperOptions) -> Result<()> {
        let change = self.settings.set_options(options)?;
        if let Some(step) = options.initial_step_size {
            self.step_size = step;
        }
        if !change.any() {
            return Ok(());
        }

        if change.image_transform {
            if let Some(loaded) = self.loaded.take() {
                // The displayed bitmap changes shape; wait for the next layout.
                self.loaded = Some(transform_loaded_image(&loaded, &self.settings, false));
                self.ready = false;
                self.layout_attempts = 0;
                self.move_start = None;
                self.cropper = CropperPosition::UNINITIALIZED;
                self.events.push_back(CropperEvent::ImageLoaded);
                return Ok(());
            }
        }

        if change.visibility && !self.settings.hidden {
            if let Some(size) = self.deferred_resize.take() {
                self.on_container_resize(size);
            }
        }

        if self.ready && (change.bounds || change.aspect_ratio) {
            self.recompute_bounds();
            let wrong_ratio = self.settings.maintain_aspect_ratio
                && !self.settings.aspect_ratio_is_correct(&self.cropper);
            if (change.bounds && self.settings.has_static_size())
                || (change.aspect_ratio && wrong_ratio)
            {
                self.reset_cropper_position();
            } else if change.bounds
                && position::fit_to_size_bounds(&mut self.cropper, self.max_size, &self.settings)
            {
                debug!(cropper = ?self.cropper, "cropper fitted to new size bounds");
                self.events.push_back(CropperEvent::CropperChange(self.cropper));
                self.do_auto_crop();
            }
        }
        Ok(())
    }

    /// Load on the calling thread. Failures become [`CropperEvent::LoadImageFailed`].
    pub fn load_image(&mut self, source: &ImageSource) {
        self.image_loaded(loader::load_sync(source));
    }

    /// Load on a blocking task; URLs need the `network` feature.
    pub async fn load_image_async(&mut self, source: ImageSource) {
        let result = loader::load(source).await;
        self.image_loaded(result);
    }

    /// Accept the outcome of a load performed by the host.
    pub fn image_loaded(&mut self, result: Result<LoadedImage>) {
        self.ready = false;
        self.layout_attempts = 0;
        self.move_start = None;
        self.pending_crop = None;
        self.cropper = CropperPosition::UNINITIALIZED;
        match result {
            Ok(loaded) => {
                let loaded = transform_loaded_image(&loaded, &self.settings, false);
                info!(
                    width = loaded.transformed.size.width,
                    height = loaded.transformed.size.height,
                    "image loaded"
                );
                self.loaded = Some(loaded);
                self.events.push_back(CropperEvent::ImageLoaded);
            }
            Err(e) => {
                warn!(error = %e, "image load failed");
                self.loaded = None;
                self.events.push_back(CropperEvent::LoadImageFailed(e.to_string()));
            }
        }
    }

    /// Report the displayed size of the loaded image.
    ///
    /// A zero size means layout has not settled; after
    /// [`LAYOUT_RETRY_LIMIT`] such reports the load is failed. Once ready,
    /// later reports are treated as container resizes.
    pub fn image_layout_ready(&mut self, size: Dimensions) -> LayoutStatus {
        if self.loaded.is_none() {
            return LayoutStatus::Failed;
        }
        if self.ready {
            self.on_container_resize(size);
            return LayoutStatus::Ready;
        }
        if size.is_empty() {
            self.layout_attempts += 1;
            if self.layout_attempts > LAYOUT_RETRY_LIMIT {
                warn!(attempts = self.layout_attempts, "image never got a layout size");
                self.loaded = None;
                self.events.push_back(CropperEvent::LoadImageFailed(
                    "image did not report a layout size".into(),
                ));
                return LayoutStatus::Failed;
            }
            return LayoutStatus::Pending;
        }

        self.max_size = size;
        self.ready = true;
        self.layout_attempts = 0;
        self.recompute_bounds();
        self.reset_cropper_position();
        self.events.push_back(CropperEvent::CropperReady(size));
        LayoutStatus::Ready
    }

    /// Poll `probe` every [`LAYOUT_RETRY_INTERVAL`] until layout settles or
    /// the retry limit is hit.
    pub async fn wait_for_layout<F>(&mut self, mut probe: F) -> LayoutStatus
    where
        F: FnMut() -> Dimensions,
    {
        loop {
            match self.image_layout_ready(probe()) {
                LayoutStatus::Pending => tokio::time::sleep(LAYOUT_RETRY_INTERVAL).await,
                status => return status,
            }
        }
    }

    /// Re-center the largest legal rectangle.
    pub fn reset_cropper_position(&mut self) {
        if !self.ready {
            return;
        }
        self.cropper = position::initial_position(self.max_size, &self.settings);
        debug!(cropper = ?self.cropper, "cropper reset");
        self.events.push_back(CropperEvent::CropperChange(self.cropper));
        self.do_auto_crop();
    }

    pub fn get_cropper_position(&self) -> CropperPosition {
        self.cropper
    }

    /// Host-supplied rectangle; edges outside the container are clamped.
    pub fn set_cropper_position(&mut self, cropper: CropperPosition) {
        if !self.ready || equals_cropper_position(&cropper, &self.cropper) {
            return;
        }
        self.cropper = cropper.normalized();
        position::check_within_bounds(&mut self.cropper, self.max_size, false);
        self.events.push_back(CropperEvent::CropperChange(self.cropper));
        self.do_auto_crop();
    }

    /// Rescale the rectangle to a new container size. Deferred while hidden.
    pub fn on_container_resize(&mut self, new_size: Dimensions) {
        if self.settings.hidden {
            self.deferred_resize = Some(new_size);
            return;
        }
        if !self.ready || new_size.is_empty() || new_size == self.max_size {
            return;
        }
        let old_size = self.max_size;
        position::resize_to_container(&mut self.cropper, old_size, new_size);
        self.max_size = new_size;
        self.recompute_bounds();
        position::check_within_bounds(&mut self.cropper, self.max_size, false);
        debug!(?old_size, ?new_size, "container resized");
        self.events.push_back(CropperEvent::CropperChange(self.cropper));
    }

    /// Replace the display transform.
    pub fn set_transform(&mut self, transform: ImageTransform) {
        if equals_transform(&transform, &self.transform) {
            return;
        }
        self.transform = transform;
        self.do_auto_crop();
    }

    /// Bounding box of the displayed image under the current scale and rotation.
    pub fn displayed_bounds(&self) -> Dimensions {
        let scale = self.transform.scale.abs();
        rotate_box(
            Dimensions::new(self.max_size.width * scale, self.max_size.height * scale),
            self.transform.rotate,
        )
    }

    pub fn start_move(&mut self, event: &PointerEvent, move_type: MoveType, handle: Option<ResizeHandle>) {
        if !self.ready || self.settings.disabled {
            return;
        }
        if self.active_gesture() == Some(MoveType::Pinch) {
            return;
        }
        if move_type == MoveType::Drag && !self.settings.allow_move_image {
            return;
        }
        let point = event.client_point();
        debug!(?move_type, ?handle, x = point.client_x, y = point.client_y, "gesture start");
        self.move_start = Some(MoveStart::new(
            move_type,
            handle,
            point,
            self.cropper,
            self.transform,
        ));
    }

    pub fn handle_move(&mut self, event: &PointerEvent) {
        let Some(start) = self.move_start.filter(|m| m.active) else {
            return;
        };
        let point = event.client_point();
        match start.move_type {
            MoveType::Move => {
                position::move_by(&mut self.cropper, &start, point);
                position::check_within_bounds(&mut self.cropper, self.max_size, true);
            }
            MoveType::Resize => {
                if !self.settings.has_static_size() {
                    position::resize(
                        &mut self.cropper,
                        &start,
                        ResizeInput::Pointer(point),
                        self.max_size,
                        &self.settings,
                    );
                }
                position::check_within_bounds(&mut self.cropper, self.max_size, false);
            }
            MoveType::Drag => {
                let (dx, dy) = (point.client_x - start.client_x, point.client_y - start.client_y);
                let (dx, dy) = match self.transform.translate_unit {
                    TranslateUnit::Pixels => (dx, dy),
                    TranslateUnit::Percent => (
                        dx / self.max_size.width * 100.0,
                        dy / self.max_size.height * 100.0,
                    ),
                };
                self.transform.translate_h = start.transform.translate_h + dx;
                self.transform.translate_v = start.transform.translate_v + dy;
            }
            MoveType::Pinch => {}
        }
    }

    /// End a pointer gesture. Image drags report the new transform; everything
    /// else reports the rectangle and auto-crops.
    pub fn handle_up(&mut self) {
        let Some(start) = self.move_start.take().filter(|m| m.active) else {
            return;
        };
        debug!(move_type = ?start.move_type, "gesture end");
        if start.move_type == MoveType::Drag {
            self.events.push_back(CropperEvent::TransformChange(self.transform));
        } else {
            self.events.push_back(CropperEvent::CropperChange(self.cropper));
        }
        self.do_auto_crop();
    }

    pub fn start_pinch(&mut self) {
        if !self.ready || self.settings.disabled {
            return;
        }
        self.move_start = Some(MoveStart::pinch(self.cropper, self.transform));
    }

    pub fn handle_pinch(&mut self, event: PinchEvent) {
        let Some(start) = self
            .move_start
            .filter(|m| m.active && m.move_type == MoveType::Pinch)
        else {
            return;
        };
        position::resize(
            &mut self.cropper,
            &start,
            ResizeInput::Pinch { scale: event.scale },
            self.max_size,
            &self.settings,
        );
        position::check_within_bounds(&mut self.cropper, self.max_size, false);
    }

    pub fn end_pinch(&mut self) {
        if self.active_gesture() == Some(MoveType::Pinch) {
            self.handle_up();
        }
    }

    /// Keyboard input. Returns whether the key was consumed.
    pub fn key_down(&mut self, input: KeyInput) -> bool {
        if self.settings.disabled {
            return false;
        }
        match translate_key(input, self.step_size) {
            None => false,
            Some(KeyAction::SetStepSize(step)) => {
                self.step_size = step;
                true
            }
            // Nothing to nudge yet, or a pointer/pinch gesture owns the rectangle.
            Some(KeyAction::Nudge { .. }) if !self.ready || self.active_gesture().is_some() => {
                false
            }
            Some(KeyAction::Nudge { move_type, handle, to }) => {
                self.start_move(&ClientPoint::default().into(), move_type, handle);
                self.handle_move(&to.into());
                self.handle_up();
                true
            }
        }
    }

    /// Snapshot the current state into a render job, or `None` before an image
    /// is ready.
    pub fn crop_job(&mut self) -> Option<CropJob> {
        if !self.ready {
            return None;
        }
        let loaded = self.loaded.clone()?;
        self.next_sequence += 1;
        Some(CropJob {
            loaded,
            settings: self.settings.clone(),
            cropper: self.cropper,
            max_size: self.max_size,
            transform: self.transform,
            sequence: self.next_sequence,
        })
    }

    /// Render on the calling thread.
    pub fn crop_sync(&mut self, output: OutputType) -> Option<CropResult> {
        let job = self.crop_job()?;
        self.events.push_back(CropperEvent::StartCropImage);
        self.finish_async_crop(job.render(output))
    }

    /// Render on a blocking task.
    pub async fn crop_async(&mut self, output: OutputType) -> Option<CropResult> {
        let job = self.crop_job()?;
        self.events.push_back(CropperEvent::StartCropImage);
        let result = job.render_async(output).await;
        self.finish_async_crop(result)
    }

    /// Auto-crop job waiting for the host to render it off-thread.
    pub fn take_pending_crop(&mut self) -> Option<CropJob> {
        self.pending_crop.take()
    }

    /// Deliver a finished render. Results older than the last delivered one
    /// are dropped.
    pub fn finish_async_crop(&mut self, result: Result<CropResult>) -> Option<CropResult> {
        match result {
            Ok(result) if result.sequence < self.last_delivered => {
                debug!(
                    sequence = result.sequence,
                    latest = self.last_delivered,
                    "stale crop dropped"
                );
                None
            }
            Ok(result) => {
                self.last_delivered = result.sequence;
                self.events.push_back(CropperEvent::ImageCropped(result.clone()));
                Some(result)
            }
            Err(CropperError::RenderUnavailable(reason)) => {
                debug!(%reason, "crop skipped");
                None
            }
            Err(e) => {
                warn!(error = %e, "crop failed");
                None
            }
        }
    }

    fn do_auto_crop(&mut self) {
        if !self.settings.auto_crop {
            return;
        }
        match self.settings.output {
            OutputType::Base64 => {
                self.crop_sync(OutputType::Base64);
            }
            OutputType::Blob => {
                if let Some(job) = self.crop_job() {
                    self.events.push_back(CropperEvent::StartCropImage);
                    self.pending_crop = Some(job);
                }
            }
        }
    }

    fn recompute_bounds(&mut self) {
        let transformed = self.loaded.as_ref().map(|l| l.transformed.size);
        self.settings.recompute_scaled_bounds(transformed, self.max_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Key;
    use image::{DynamicImage, ImageFormat, RgbaImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> ImageSource {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            image::Rgba([10, 20, 30, 255]),
        ));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        ImageSource::Bytes(out.into_inner())
    }

    fn ready(options: CropperOptions) -> ImageCropper {
        let mut cropper = ImageCropper::new(&options).unwrap();
        cropper.load_image(&png(400, 300));
        assert_eq!(
            cropper.image_layout_ready(Dimensions::new(400.0, 300.0)),
            LayoutStatus::Ready
        );
        cropper.drain_events();
        cropper
    }

    fn cropped(events: &[CropperEvent]) -> Vec<&CropResult> {
        events
            .iter()
            .filter_map(|e| match e {
                CropperEvent::ImageCropped(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn uninitialized_cropper_cannot_crop() {
        let mut cropper = ImageCropper::default();
        assert_eq!(cropper.cropper_position(), CropperPosition::UNINITIALIZED);
        assert!(cropper.crop_sync(OutputType::Base64).is_none());
        assert!(cropper.drain_events().is_empty());
    }

    #[test]
    fn load_then_layout_initializes_and_auto_crops() {
        let mut cropper = ImageCropper::default();
        cropper.load_image(&png(400, 300));
        assert_eq!(cropper.drain_events(), vec![CropperEvent::ImageLoaded]);
        assert_eq!(cropper.image_layout_ready(Dimensions::ZERO), LayoutStatus::Pending);
        assert!(!cropper.is_ready());

        assert_eq!(
            cropper.image_layout_ready(Dimensions::new(400.0, 300.0)),
            LayoutStatus::Ready
        );
        assert_eq!(
            cropper.cropper_position(),
            CropperPosition::new(50.0, 0.0, 350.0, 300.0)
        );
        let events = cropper.drain_events();
        assert!(events.contains(&CropperEvent::CropperReady(Dimensions::new(400.0, 300.0))));
        assert!(events.contains(&CropperEvent::StartCropImage));
        let results = cropped(&events);
        assert_eq!(results.len(), 1);
        assert_eq!((results[0].width, results[0].height), (300, 300));
        assert!(results[0].base64.is_some());
    }

    #[test]
    fn layout_gives_up_after_retry_limit() {
        let mut cropper = ImageCropper::default();
        cropper.load_image(&png(10, 10));
        cropper.drain_events();
        for _ in 0..LAYOUT_RETRY_LIMIT {
            assert_eq!(cropper.image_layout_ready(Dimensions::ZERO), LayoutStatus::Pending);
        }
        assert_eq!(cropper.image_layout_ready(Dimensions::ZERO), LayoutStatus::Failed);
        assert!(matches!(
            cropper.drain_events().as_slice(),
            [CropperEvent::LoadImageFailed(_)]
        ));
        assert!(cropper.loaded_image().is_none());
    }

    #[test]
    fn load_failure_is_an_event() {
        let mut cropper = ImageCropper::default();
        cropper.load_image(&ImageSource::Bytes(b"nope".to_vec()));
        assert!(matches!(
            cropper.drain_events().as_slice(),
            [CropperEvent::LoadImageFailed(_)]
        ));
        assert!(!cropper.is_ready());
    }

    #[test]
    fn move_gesture_clamps_and_crops_on_release() {
        let mut cropper = ready(CropperOptions::default());
        cropper.start_move(&PointerEvent::mouse(100.0, 100.0), MoveType::Move, None);
        assert_eq!(cropper.active_gesture(), Some(MoveType::Move));
        cropper.handle_move(&PointerEvent::mouse(150.0, 120.0));
        assert_eq!(
            cropper.cropper_position(),
            CropperPosition::new(100.0, 0.0, 400.0, 300.0)
        );
        assert!(cropper.drain_events().is_empty());

        cropper.handle_up();
        assert_eq!(cropper.active_gesture(), None);
        let events = cropper.drain_events();
        assert_eq!(events[0], CropperEvent::CropperChange(cropper.cropper_position()));
        let results = cropped(&events);
        assert_eq!(
            results[0].image_position,
            CropperPosition::new(100.0, 0.0, 400.0, 300.0)
        );
    }

    #[test]
    fn disabled_cropper_ignores_gestures() {
        let mut cropper = ready(CropperOptions {
            disabled: Some(true),
            ..Default::default()
        });
        let before = cropper.cropper_position();
        cropper.start_move(&PointerEvent::mouse(100.0, 100.0), MoveType::Move, None);
        cropper.handle_move(&PointerEvent::mouse(150.0, 120.0));
        cropper.handle_up();
        cropper.start_pinch();
        cropper.handle_pinch(PinchEvent { scale: 0.5 });
        assert!(!cropper.key_down(KeyInput::new(Key::ArrowLeft)));
        assert_eq!(cropper.cropper_position(), before);
        assert!(cropper.drain_events().is_empty());
    }

    #[test]
    fn drag_moves_image_only_when_allowed() {
        let mut cropper = ready(CropperOptions::default());
        cropper.start_move(&PointerEvent::mouse(10.0, 10.0), MoveType::Drag, None);
        assert_eq!(cropper.active_gesture(), None);

        cropper
            .set_options(&CropperOptions {
                allow_move_image: Some(true),
                auto_crop: Some(false),
                ..Default::default()
            })
            .unwrap();
        let before = cropper.cropper_position();
        cropper.start_move(&PointerEvent::mouse(10.0, 10.0), MoveType::Drag, None);
        cropper.handle_move(&PointerEvent::mouse(30.0, 10.0));
        assert_eq!(cropper.transform().translate_h, 5.0);
        assert_eq!(cropper.transform().translate_v, 0.0);
        cropper.handle_up();
        assert_eq!(cropper.cropper_position(), before);
        match cropper.drain_events().as_slice() {
            [CropperEvent::TransformChange(t)] => assert_eq!(t.translate_h, 5.0),
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn keys_nudge_and_set_step() {
        let mut cropper = ready(CropperOptions::default());
        assert!(cropper.key_down(KeyInput::new(Key::ArrowLeft)));
        assert_eq!(
            cropper.cropper_position(),
            CropperPosition::new(47.0, 0.0, 347.0, 300.0)
        );
        assert!(cropper.key_down(KeyInput::new(Key::Digit(5))));
        assert_eq!(cropper.step_size(), 5);
        cropper.key_down(KeyInput::new(Key::ArrowLeft));
        assert_eq!(cropper.cropper_position().x1, 42.0);
        assert!(!cropper.key_down(KeyInput::new(Key::Other)));
    }

    #[test]
    fn keys_do_not_interrupt_a_drag() {
        let mut cropper = ready(CropperOptions::default());
        cropper.start_move(&PointerEvent::mouse(100.0, 100.0), MoveType::Move, None);
        cropper.handle_move(&PointerEvent::mouse(90.0, 100.0));
        assert_eq!(cropper.cropper_position().x1, 40.0);

        assert!(!cropper.key_down(KeyInput::new(Key::ArrowUp)));
        assert_eq!(cropper.active_gesture(), Some(MoveType::Move));
        assert!(cropper.drain_events().is_empty());

        cropper.handle_move(&PointerEvent::mouse(80.0, 100.0));
        assert_eq!(
            cropper.cropper_position(),
            CropperPosition::new(30.0, 0.0, 330.0, 300.0)
        );
        cropper.handle_up();
        assert_eq!(
            cropper.drain_events()[0],
            CropperEvent::CropperChange(CropperPosition::new(30.0, 0.0, 330.0, 300.0))
        );
    }

    #[test]
    fn arrow_keys_are_not_consumed_before_ready() {
        let mut cropper = ImageCropper::default();
        assert!(!cropper.key_down(KeyInput::new(Key::ArrowLeft)));
        assert!(cropper.key_down(KeyInput::new(Key::Digit(7))));
        assert_eq!(cropper.step_size(), 7);
        assert!(cropper.drain_events().is_empty());
    }

    #[test]
    fn max_size_change_shrinks_live_rectangle() {
        let mut cropper = ready(CropperOptions {
            maintain_aspect_ratio: Some(false),
            ..Default::default()
        });
        assert_eq!(
            cropper.cropper_position(),
            CropperPosition::new(0.0, 0.0, 400.0, 300.0)
        );
        cropper
            .set_options(&CropperOptions {
                cropper_max_width: Some(100.0),
                cropper_max_height: Some(100.0),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(cropper.settings().cropper_scaled_max_width, 100.0);
        assert_eq!(
            cropper.cropper_position(),
            CropperPosition::new(150.0, 100.0, 250.0, 200.0)
        );
        let events = cropper.drain_events();
        assert_eq!(
            events[0],
            CropperEvent::CropperChange(CropperPosition::new(150.0, 100.0, 250.0, 200.0))
        );
        let results = cropped(&events);
        assert_eq!((results[0].width, results[0].height), (100, 100));
    }

    #[test]
    fn min_size_change_grows_rectangle_inside_container() {
        let mut cropper = ready(CropperOptions {
            maintain_aspect_ratio: Some(false),
            auto_crop: Some(false),
            ..Default::default()
        });
        cropper.set_cropper_position(CropperPosition::new(0.0, 0.0, 100.0, 100.0));
        cropper
            .set_options(&CropperOptions {
                cropper_min_width: Some(200.0),
                cropper_min_height: Some(200.0),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            cropper.cropper_position(),
            CropperPosition::new(0.0, 0.0, 200.0, 200.0)
        );

        // Already legal under a looser bound: untouched, no event.
        cropper.drain_events();
        cropper
            .set_options(&CropperOptions {
                cropper_min_width: Some(50.0),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            cropper.cropper_position(),
            CropperPosition::new(0.0, 0.0, 200.0, 200.0)
        );
        assert!(cropper.drain_events().is_empty());
    }

    #[test]
    fn max_size_change_keeps_aspect_ratio() {
        let mut cropper = ready(CropperOptions::default());
        cropper
            .set_options(&CropperOptions {
                cropper_max_width: Some(100.0),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            cropper.cropper_position(),
            CropperPosition::new(150.0, 100.0, 250.0, 200.0)
        );
    }

    #[test]
    fn shift_alt_resizes_opposite_edge() {
        let mut cropper = ready(CropperOptions {
            maintain_aspect_ratio: Some(false),
            ..Default::default()
        });
        assert_eq!(
            cropper.cropper_position(),
            CropperPosition::new(0.0, 0.0, 400.0, 300.0)
        );
        cropper.key_down(KeyInput::new(Key::ArrowLeft).shift().alt());
        assert_eq!(
            cropper.cropper_position(),
            CropperPosition::new(0.0, 0.0, 397.0, 300.0)
        );
    }

    #[test]
    fn pinch_scales_around_center() {
        let mut cropper = ready(CropperOptions::default());
        cropper.start_pinch();
        cropper.handle_pinch(PinchEvent { scale: 0.5 });
        // Pointer moves are ignored during a pinch.
        cropper.start_move(&PointerEvent::mouse(0.0, 0.0), MoveType::Move, None);
        cropper.handle_move(&PointerEvent::mouse(50.0, 50.0));
        cropper.end_pinch();
        assert_eq!(
            cropper.cropper_position(),
            CropperPosition::new(125.0, 75.0, 275.0, 225.0)
        );
        assert_eq!(cropper.active_gesture(), None);
    }

    #[test]
    fn invalid_options_leave_state_untouched() {
        let mut cropper = ready(CropperOptions::default());
        let err = cropper
            .set_options(&CropperOptions {
                aspect_ratio: Some(0.0),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, CropperError::Configuration(_)));
        assert_eq!(cropper.settings().aspect_ratio, 1.0);
    }

    #[test]
    fn aspect_ratio_change_resets_rectangle() {
        let mut cropper = ready(CropperOptions::default());
        cropper
            .set_options(&CropperOptions {
                aspect_ratio: Some(2.0),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            cropper.cropper_position(),
            CropperPosition::new(0.0, 50.0, 400.0, 250.0)
        );
    }

    #[test]
    fn host_position_is_clamped_and_deduplicated() {
        let mut cropper = ready(CropperOptions::default());
        cropper.set_cropper_position(CropperPosition::new(-10.0, 0.0, 100.0, 100.0));
        assert_eq!(
            cropper.get_cropper_position(),
            CropperPosition::new(0.0, 0.0, 100.0, 100.0)
        );
        cropper.drain_events();
        cropper.set_cropper_position(CropperPosition::new(0.0001, 0.0, 100.0, 100.0));
        assert!(cropper.drain_events().is_empty());
    }

    #[test]
    fn container_resize_is_deferred_while_hidden() {
        let mut cropper = ready(CropperOptions::default());
        cropper.on_container_resize(Dimensions::new(200.0, 150.0));
        assert_eq!(
            cropper.cropper_position(),
            CropperPosition::new(25.0, 0.0, 175.0, 150.0)
        );

        cropper
            .set_options(&CropperOptions {
                hidden: Some(true),
                ..Default::default()
            })
            .unwrap();
        cropper.on_container_resize(Dimensions::new(100.0, 75.0));
        assert_eq!(cropper.max_size(), Dimensions::new(200.0, 150.0));

        cropper
            .set_options(&CropperOptions {
                hidden: Some(false),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(cropper.max_size(), Dimensions::new(100.0, 75.0));
        assert_eq!(
            cropper.cropper_position(),
            CropperPosition::new(12.5, 0.0, 87.5, 75.0)
        );
    }

    #[test]
    fn canvas_rotation_waits_for_new_layout() {
        let mut cropper = ready(CropperOptions::default());
        cropper
            .set_options(&CropperOptions {
                canvas_rotation: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert!(!cropper.is_ready());
        let size = cropper.loaded_image().unwrap().transformed.size;
        assert_eq!(size, Dimensions::new(300.0, 400.0));
        assert_eq!(
            cropper.image_layout_ready(Dimensions::new(300.0, 400.0)),
            LayoutStatus::Ready
        );
        assert_eq!(
            cropper.cropper_position(),
            CropperPosition::new(0.0, 50.0, 300.0, 350.0)
        );
    }

    #[test]
    fn stale_results_are_dropped() {
        let mut cropper = ready(CropperOptions::default());
        let first = cropper.crop_job().unwrap();
        let second = cropper.crop_job().unwrap();
        assert!(second.sequence > first.sequence);
        assert!(cropper
            .finish_async_crop(second.render(OutputType::Base64))
            .is_some());
        assert!(cropper
            .finish_async_crop(first.render(OutputType::Base64))
            .is_none());
    }

    #[test]
    fn displayed_bounds_follow_rotation() {
        let mut cropper = ready(CropperOptions {
            auto_crop: Some(false),
            ..Default::default()
        });
        cropper.set_transform(ImageTransform {
            rotate: 90.0,
            ..Default::default()
        });
        let bounds = cropper.displayed_bounds();
        assert!((bounds.width - 300.0).abs() < 1e-9);
        assert!((bounds.height - 400.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn blob_auto_crop_is_rendered_by_the_host() {
        let mut cropper = ready(CropperOptions {
            output: Some(OutputType::Blob),
            ..Default::default()
        });
        cropper.reset_cropper_position();
        let job = cropper.take_pending_crop().unwrap();
        let result = cropper
            .finish_async_crop(job.render_async(OutputType::Blob).await)
            .unwrap();
        assert_eq!(result.blob.unwrap().mime_type, "image/png");
        assert!(cropper.take_pending_crop().is_none());
    }

    #[tokio::test]
    async fn wait_for_layout_polls_until_sized() {
        let mut cropper = ImageCropper::default();
        cropper.load_image_async(png(40, 40)).await;
        let mut calls = 0;
        let status = cropper
            .wait_for_layout(|| {
                calls += 1;
                if calls < 3 {
                    Dimensions::ZERO
                } else {
                    Dimensions::new(40.0, 40.0)
                }
            })
            .await;
        assert_eq!(status, LayoutStatus::Ready);
        assert_eq!(calls, 3);
        assert!(cropper.crop_async(OutputType::Base64).await.is_some());
    }
}
