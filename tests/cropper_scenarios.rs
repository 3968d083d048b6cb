use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use image_cropper::{
    BackgroundColor, CropResult, CropperEvent, CropperOptions, CropperPosition, Dimensions,
    ImageCropper, ImageSource, LayoutStatus, MoveType, OutputType, PointerEvent, ResizeHandle,
};

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut img = RgbaImage::from_pixel(width, height, Rgba([200, 200, 200, 255]));
    img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn data_uri(width: u32, height: u32) -> ImageSource {
    ImageSource::base64(format!(
        "data:image/png;base64,{}",
        STANDARD.encode(png_bytes(width, height))
    ))
}

fn last_crop(events: &[CropperEvent]) -> Option<&CropResult> {
    events.iter().rev().find_map(|e| match e {
        CropperEvent::ImageCropped(result) => Some(result),
        _ => None,
    })
}

fn ready_cropper(options: CropperOptions, image: (u32, u32), container: Dimensions) -> ImageCropper {
    let mut cropper = ImageCropper::new(&options).unwrap();
    cropper.load_image(&data_uri(image.0, image.1));
    assert_eq!(cropper.image_layout_ready(container), LayoutStatus::Ready);
    cropper
}

#[test]
fn default_initialization_centers_a_square() {
    let mut cropper = ready_cropper(
        CropperOptions::default(),
        (800, 600),
        Dimensions::new(400.0, 300.0),
    );
    assert_eq!(
        cropper.cropper_position(),
        CropperPosition::new(50.0, 0.0, 350.0, 300.0)
    );
    let events = cropper.drain_events();
    assert_eq!(events[0], CropperEvent::ImageLoaded);
    assert!(events.contains(&CropperEvent::CropperReady(Dimensions::new(400.0, 300.0))));
    let crop = last_crop(&events).unwrap();
    // Container is half the bitmap size.
    assert_eq!(crop.image_position, CropperPosition::new(100.0, 0.0, 700.0, 600.0));
    assert_eq!((crop.width, crop.height), (600, 600));
}

#[test]
fn crop_to_base64_end_to_end() {
    let mut cropper = ready_cropper(
        CropperOptions::default(),
        (1000, 1000),
        Dimensions::new(500.0, 500.0),
    );
    cropper.drain_events();
    cropper.set_cropper_position(CropperPosition::new(0.0, 0.0, 250.0, 250.0));

    let events = cropper.drain_events();
    let crop = last_crop(&events).unwrap();
    assert_eq!(crop.image_position, CropperPosition::new(0.0, 0.0, 500.0, 500.0));
    assert_eq!((crop.width, crop.height), (500, 500));
    assert_eq!(crop.offset_image_position, None);

    let uri = crop.base64.as_deref().unwrap();
    let payload = uri.strip_prefix("data:image/png;base64,").unwrap();
    let decoded = image::load_from_memory(&STANDARD.decode(payload).unwrap())
        .unwrap()
        .to_rgba8();
    assert_eq!(decoded.dimensions(), (500, 500));
    assert_eq!(decoded.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
}

#[test]
fn resize_keeps_configured_aspect_ratio() {
    let mut cropper = ready_cropper(
        CropperOptions {
            aspect_ratio: Some(1.5),
            auto_crop: Some(false),
            ..Default::default()
        },
        (600, 400),
        Dimensions::new(600.0, 400.0),
    );
    assert_eq!(
        cropper.cropper_position(),
        CropperPosition::new(0.0, 0.0, 600.0, 400.0)
    );
    cropper.start_move(
        &PointerEvent::mouse(600.0, 400.0),
        MoveType::Resize,
        Some(ResizeHandle::BottomRight),
    );
    cropper.handle_move(&PointerEvent::mouse(500.0, 370.0));
    cropper.handle_up();

    let p = cropper.cropper_position();
    assert_eq!((p.x1, p.y1, p.x2), (0.0, 0.0, 500.0));
    assert!((p.width() / p.height() - 1.5).abs() < 1e-9);
}

#[test]
fn random_gestures_stay_within_container() {
    let container = Dimensions::new(320.0, 240.0);
    let mut cropper = ready_cropper(
        CropperOptions {
            aspect_ratio: Some(4.0 / 3.0),
            auto_crop: Some(false),
            ..Default::default()
        },
        (640, 480),
        container,
    );

    let mut seed: u64 = 0x9E37_79B9_7F4A_7C15;
    let mut next = move |range: f64| {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        (seed % 10_000) as f64 / 10_000.0 * range
    };

    for step in 0..300 {
        let start = PointerEvent::mouse(next(320.0), next(240.0));
        if step % 3 == 0 {
            cropper.start_move(&start, MoveType::Move, None);
        } else {
            let handle = ResizeHandle::EDGES[(next(8.0) as usize).min(7)];
            cropper.start_move(&start, MoveType::Resize, Some(handle));
        }
        cropper.handle_move(&PointerEvent::mouse(next(500.0) - 90.0, next(400.0) - 80.0));
        cropper.handle_up();

        let p = cropper.cropper_position();
        assert!(
            0.0 <= p.x1 && p.x1 <= p.x2 && p.x2 <= container.width,
            "step {step}: {p:?}"
        );
        assert!(
            0.0 <= p.y1 && p.y1 <= p.y2 && p.y2 <= container.height,
            "step {step}: {p:?}"
        );
    }
}

#[test]
fn json_options_drive_blob_output() {
    let options: CropperOptions = serde_json::from_str(
        r#"{
            "aspectRatio": 2,
            "resizeToWidth": 100,
            "format": "jpeg",
            "output": "blob",
            "imageQuality": 80
        }"#,
    )
    .unwrap();
    let mut cropper = ready_cropper(options, (400, 200), Dimensions::new(400.0, 200.0));
    assert!(cropper.drain_events().contains(&CropperEvent::StartCropImage));

    let job = cropper.take_pending_crop().unwrap();
    let result = cropper
        .finish_async_crop(job.render(OutputType::Blob))
        .unwrap();
    assert_eq!((result.width, result.height), (100, 50));
    let blob = result.blob.unwrap();
    assert_eq!(blob.mime_type, "image/jpeg");
    let decoded = image::load_from_memory(&blob.bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (100, 50));
}

#[test]
fn contain_mode_reports_offset_position() {
    let mut cropper = ready_cropper(
        CropperOptions {
            aspect_ratio: Some(1.0),
            contain_within_aspect_ratio: Some(true),
            background_color: Some(BackgroundColor::from_hex("#ffffff").unwrap()),
            ..Default::default()
        },
        (200, 100),
        Dimensions::new(200.0, 200.0),
    );
    let transformed = cropper.loaded_image().unwrap().transformed.size;
    assert_eq!(transformed, Dimensions::new(200.0, 200.0));

    let crop = cropper.crop_sync(OutputType::Base64).unwrap();
    assert_eq!(crop.image_position, CropperPosition::new(0.0, 0.0, 200.0, 200.0));
    assert_eq!(
        crop.offset_image_position,
        Some(CropperPosition::new(0.0, -50.0, 200.0, 150.0))
    );
}

#[test]
fn replacing_the_image_returns_to_uninitialized() {
    let mut cropper = ready_cropper(
        CropperOptions::default(),
        (100, 100),
        Dimensions::new(100.0, 100.0),
    );
    cropper.load_image(&ImageSource::Bytes(b"not an image".to_vec()));
    assert!(!cropper.is_ready());
    assert_eq!(cropper.cropper_position(), CropperPosition::UNINITIALIZED);
    assert!(matches!(
        cropper.drain_events().last(),
        Some(CropperEvent::LoadImageFailed(_))
    ));
    assert!(cropper.crop_sync(OutputType::Base64).is_none());
}

#[tokio::test]
async fn async_load_and_crop() {
    let mut cropper = ImageCropper::default();
    cropper
        .load_image_async(ImageSource::Bytes(png_bytes(64, 32)))
        .await;
    assert_eq!(
        cropper.image_layout_ready(Dimensions::new(64.0, 32.0)),
        LayoutStatus::Ready
    );
    let result = cropper.crop_async(OutputType::Blob).await.unwrap();
    assert_eq!((result.width, result.height), (32, 32));
    assert_eq!(result.blob.unwrap().mime_type, "image/png");
}
