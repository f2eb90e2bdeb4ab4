//! Resampling strategies.

use image::imageops::FilterType;
use image::DynamicImage;

use crate::error::{AudioToolsError, Result};

/// One way of scaling an image to exact dimensions
pub trait ResizeStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn resize(&self, image: &DynamicImage, width: u32, height: u32) -> Result<DynamicImage>;
}

/// High-quality Lanczos3 resampling, the primary path
#[derive(Debug, Default, Clone, Copy)]
pub struct LanczosResize;

impl ResizeStrategy for LanczosResize {
    fn name(&self) -> &'static str {
        "lanczos3"
    }

    fn resize(&self, image: &DynamicImage, width: u32, height: u32) -> Result<DynamicImage> {
        scale(image, width, height, FilterType::Lanczos3)
    }
}

/// Bilinear resampling, used when the primary path times out or fails
#[derive(Debug, Default, Clone, Copy)]
pub struct BilinearResize;

impl ResizeStrategy for BilinearResize {
    fn name(&self) -> &'static str {
        "bilinear"
    }

    fn resize(&self, image: &DynamicImage, width: u32, height: u32) -> Result<DynamicImage> {
        scale(image, width, height, FilterType::Triangle)
    }
}

fn scale(image: &DynamicImage, width: u32, height: u32, filter: FilterType) -> Result<DynamicImage> {
    if width == 0 || height == 0 || image.width() == 0 || image.height() == 0 {
        return Err(AudioToolsError::Resize(format!(
            "cannot scale {}x{} to {}x{}",
            image.width(),
            image.height(),
            width,
            height
        )));
    }
    if image.width() == width && image.height() == height {
        return Ok(image.clone());
    }
    Ok(image.resize_exact(width, height, filter))
}

/// Centered square crop, side = min(width, height)
pub fn crop_to_square(image: &DynamicImage) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    let side = width.min(height);
    if width == height {
        return image.clone();
    }
    image.crop_imm((width - side) / 2, (height - side) / 2, side, side)
}
