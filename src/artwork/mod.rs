//! # Cover art resampler
//!
//! Decodes an uploaded picture, optionally crops it to a centered square and
//! scales it to the requested size. The high-quality path runs under a time
//! budget; if it does not finish in time, or fails, a bilinear scale is used
//! instead so that any image that decodes can be resized.

pub mod resize;

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, ImageReader};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::ImageConfig;
use crate::error::{AudioToolsError, Result};

pub use resize::{crop_to_square, BilinearResize, LanczosResize, ResizeStrategy};

/// Encoded output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageOutputFormat {
    #[default]
    Jpeg,
    Png,
    Webp,
}

impl ImageOutputFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }
}

impl std::str::FromStr for ImageOutputFormat {
    type Err = AudioToolsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::Webp),
            other => Err(AudioToolsError::InvalidSettings(format!("unsupported image format: {}", other))),
        }
    }
}

/// Parameters of one resize call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResizeOptions {
    /// 0 keeps the source (or cropped) width
    pub width: u32,
    /// 0 keeps the source (or cropped) height
    pub height: u32,
    /// 0 - 100, values above 100 are treated as 100
    pub quality: u8,
    pub format: ImageOutputFormat,
    pub crop_to_square: bool,
}

impl Default for ImageResizeOptions {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            quality: 90,
            format: ImageOutputFormat::Jpeg,
            crop_to_square: false,
        }
    }
}

/// Encoded result
#[derive(Debug, Clone)]
pub struct ImageBlob {
    pub bytes: Bytes,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Map the 0 - 100 quality scale onto the encoder's 0.0 - 1.0 scale
pub fn encoder_quality(quality: u8) -> f32 {
    (f32::from(quality) / 100.0).clamp(0.0, 1.0)
}

/// Cover art resizer with a time-bounded primary strategy
pub struct ImageResampler {
    config: ImageConfig,
    primary: Arc<dyn ResizeStrategy>,
    fallback: Arc<dyn ResizeStrategy>,
}

impl ImageResampler {
    pub fn new(config: ImageConfig) -> Self {
        Self {
            config,
            primary: Arc::new(LanczosResize),
            fallback: Arc::new(BilinearResize),
        }
    }

    /// Replace the primary strategy
    pub fn with_primary(mut self, primary: Arc<dyn ResizeStrategy>) -> Self {
        self.primary = primary;
        self
    }

    pub async fn resize(&self, data: &[u8], options: &ImageResizeOptions) -> Result<ImageBlob> {
        let data = data.to_vec();
        let source = tokio::task::spawn_blocking(move || decode_image(&data))
            .await
            .map_err(|e| AudioToolsError::ImageLoad(format!("decode task failed: {}", e)))??;

        let source = if options.crop_to_square {
            crop_to_square(&source)
        } else {
            source
        };
        let (width, height) = self.target_dimensions(&source, options)?;
        debug!(
            "Resizing cover {}x{} -> {}x{}",
            source.width(),
            source.height(),
            width,
            height
        );

        let source = Arc::new(source);
        let resized = match self.run_primary(source.clone(), width, height).await {
            Ok(image) => image,
            Err(reason) => {
                warn!("{} resize failed ({}), falling back to {}", self.primary.name(), reason, self.fallback.name());
                let fallback = self.fallback.clone();
                tokio::task::spawn_blocking(move || fallback.resize(&source, width, height))
                    .await
                    .map_err(|e| AudioToolsError::Resize(format!("fallback task failed: {}", e)))??
            }
        };

        let format = options.format;
        let quality = encoder_quality(options.quality);
        let bytes = tokio::task::spawn_blocking(move || encode_image(&resized, format, quality))
            .await
            .map_err(|e| AudioToolsError::Resize(format!("encode task failed: {}", e)))??;

        Ok(ImageBlob {
            bytes: bytes.into(),
            mime_type: format.mime_type(),
            width,
            height,
        })
    }

    fn target_dimensions(&self, source: &DynamicImage, options: &ImageResizeOptions) -> Result<(u32, u32)> {
        let width = if options.width == 0 { source.width() } else { options.width };
        let height = if options.height == 0 { source.height() } else { options.height };
        let max = self.config.max_dimension;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(AudioToolsError::Context(format!(
                "cannot allocate a {}x{} surface (limit {})",
                width, height, max
            )));
        }
        Ok((width, height))
    }

    /// Primary strategy under the time budget. The error is only used for logging.
    async fn run_primary(&self, source: Arc<DynamicImage>, width: u32, height: u32) -> std::result::Result<DynamicImage, String> {
        let primary = self.primary.clone();
        let budget = Duration::from_millis(self.config.primary_timeout_ms);
        // Задачу spawn_blocking нельзя прервать: по таймауту результат просто отбрасывается
        let task = tokio::task::spawn_blocking(move || primary.resize(&source, width, height));
        match tokio::time::timeout(budget, task).await {
            Ok(Ok(Ok(image))) => Ok(image),
            Ok(Ok(Err(e))) => Err(e.to_string()),
            Ok(Err(e)) => Err(format!("task failed: {}", e)),
            Err(_) => Err(format!("timed out after {} ms", budget.as_millis())),
        }
    }
}

impl Default for ImageResampler {
    fn default() -> Self {
        Self::new(ImageConfig::default())
    }
}

fn decode_image(data: &[u8]) -> Result<DynamicImage> {
    ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| AudioToolsError::ImageLoad(e.to_string()))?
        .decode()
        .map_err(|e| AudioToolsError::ImageLoad(e.to_string()))
}

fn encode_image(image: &DynamicImage, format: ImageOutputFormat, quality: f32) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let result = match format {
        ImageOutputFormat::Jpeg => {
            let quality = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
            JpegEncoder::new_with_quality(&mut buffer, quality).encode_image(&image.to_rgb8())
        }
        ImageOutputFormat::Png => image.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png),
        // Кодировщик WebP в image только lossless, качество не применяется
        ImageOutputFormat::Webp => DynamicImage::ImageRgba8(image.to_rgba8())
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::WebP),
    };
    result.map_err(|e| AudioToolsError::Resize(format!("failed to encode image: {}", e)))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    mod test_resampler;
}
