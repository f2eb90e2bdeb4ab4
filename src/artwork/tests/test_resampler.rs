use crate::artwork::{
    encoder_quality, ImageOutputFormat, ImageResampler, ImageResizeOptions, LanczosResize, ResizeStrategy,
};
use crate::config::ImageConfig;
use crate::error::{AudioToolsError, Result};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| image::Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
    let mut buffer = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buffer), format)
        .unwrap();
    buffer
}

struct SlowResize(Duration);

impl ResizeStrategy for SlowResize {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn resize(&self, image: &DynamicImage, width: u32, height: u32) -> Result<DynamicImage> {
        std::thread::sleep(self.0);
        LanczosResize.resize(image, width, height)
    }
}

struct BrokenResize;

impl ResizeStrategy for BrokenResize {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn resize(&self, _image: &DynamicImage, _width: u32, _height: u32) -> Result<DynamicImage> {
        Err(AudioToolsError::Resize("out of memory".to_string()))
    }
}

#[tokio::test]
async fn test_crop_to_square_exact_size() {
    let source = encoded(4000, 3000, ImageFormat::Bmp);
    let options = ImageResizeOptions {
        width: 1000,
        height: 1000,
        quality: 85,
        format: ImageOutputFormat::Jpeg,
        crop_to_square: true,
    };
    let blob = ImageResampler::default().resize(&source, &options).await.unwrap();

    assert_eq!((blob.width, blob.height), (1000, 1000));
    assert_eq!(blob.mime_type, "image/jpeg");
    let decoded = image::load_from_memory(&blob.bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (1000, 1000));
}

#[tokio::test]
async fn test_zero_dimensions_inherit_source() {
    let source = encoded(64, 48, ImageFormat::Png);
    let options = ImageResizeOptions {
        width: 32,
        format: ImageOutputFormat::Png,
        ..ImageResizeOptions::default()
    };
    let blob = ImageResampler::default().resize(&source, &options).await.unwrap();
    assert_eq!((blob.width, blob.height), (32, 48));

    let cropped = ImageResizeOptions {
        crop_to_square: true,
        format: ImageOutputFormat::Webp,
        ..ImageResizeOptions::default()
    };
    let blob = ImageResampler::default().resize(&source, &cropped).await.unwrap();
    assert_eq!((blob.width, blob.height), (48, 48));
    assert_eq!(image::guess_format(&blob.bytes).unwrap(), ImageFormat::WebP);
}

#[tokio::test]
async fn test_slow_primary_falls_back() {
    let config = ImageConfig {
        primary_timeout_ms: 100,
        ..ImageConfig::default()
    };
    let resampler = ImageResampler::new(config).with_primary(Arc::new(SlowResize(Duration::from_secs(1))));
    let source = encoded(400, 300, ImageFormat::Png);
    let options = ImageResizeOptions {
        width: 100,
        height: 100,
        crop_to_square: true,
        ..ImageResizeOptions::default()
    };

    let started = Instant::now();
    let blob = resampler.resize(&source, &options).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!((blob.width, blob.height), (100, 100));
}

#[tokio::test]
async fn test_failing_primary_falls_back() {
    let resampler = ImageResampler::default().with_primary(Arc::new(BrokenResize));
    let source = encoded(50, 50, ImageFormat::Png);
    let options = ImageResizeOptions {
        width: 10,
        height: 10,
        ..ImageResizeOptions::default()
    };
    let blob = resampler.resize(&source, &options).await.unwrap();
    assert_eq!((blob.width, blob.height), (10, 10));
}

#[tokio::test]
async fn test_undecodable_input() {
    let err = ImageResampler::default()
        .resize(b"definitely not an image", &ImageResizeOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AudioToolsError::ImageLoad(_)));
}

#[tokio::test]
async fn test_oversized_surface() {
    let config = ImageConfig {
        max_dimension: 512,
        ..ImageConfig::default()
    };
    let options = ImageResizeOptions {
        width: 4096,
        height: 4096,
        ..ImageResizeOptions::default()
    };
    let err = ImageResampler::new(config)
        .resize(&encoded(16, 16, ImageFormat::Png), &options)
        .await
        .unwrap_err();
    assert!(matches!(err, AudioToolsError::Context(_)));
}

#[test]
fn test_quality_mapping() {
    assert_eq!(encoder_quality(0), 0.0);
    assert_eq!(encoder_quality(50), 0.5);
    assert_eq!(encoder_quality(100), 1.0);
    assert_eq!(encoder_quality(250), 1.0);
}

#[test]
fn test_options_from_json() {
    let options: ImageResizeOptions =
        serde_json::from_str(r#"{"width":500,"height":0,"quality":70,"format":"webp","cropToSquare":true}"#).unwrap();
    assert_eq!(options.format, ImageOutputFormat::Webp);
    assert!(options.crop_to_square);
    assert_eq!("JPG".parse::<ImageOutputFormat>().unwrap(), ImageOutputFormat::Jpeg);
}
