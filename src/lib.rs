//! Audio tooling for the artist portal
//!
//! Quality analysis of uploaded tracks, waveform and spectrum previews,
//! format conversion through an external media engine and cover art resizing.

pub mod artwork;
pub mod config;
pub mod engine;
pub mod error;
pub mod logger;
pub mod media;
pub mod notification;
pub mod progress;
pub mod transcode;

use std::path::Path;

use crate::artwork::{ImageBlob, ImageResampler, ImageResizeOptions};
use crate::config::AppConfig;
use crate::engine::FfmpegEngine;
use crate::error::Result;
use crate::media::analysis::{analyze_file, AudioAnalysisResult};
use crate::media::{decode_file, Player, SpectrumAnalyzer, WaveformEnvelope};
use crate::progress::ProgressObserver;
use crate::transcode::{AudioBlob, AudioProcessingSettings, SourceFile, TranscodingPipeline};

pub use crate::error::AudioToolsError;

/// Entry point bundling the four tools around one configuration
pub struct AudioTools {
    config: AppConfig,
    pipeline: TranscodingPipeline<FfmpegEngine>,
    resampler: ImageResampler,
}

impl AudioTools {
    pub fn new(config: AppConfig) -> Self {
        let pipeline = TranscodingPipeline::new(FfmpegEngine::new(config.engine.clone()));
        let resampler = ImageResampler::new(config.image.clone());
        Self {
            config,
            pipeline,
            resampler,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &TranscodingPipeline<FfmpegEngine> {
        &self.pipeline
    }

    /// Signal analysis of a file on disk
    pub async fn analyze(&self, path: &Path) -> Result<AudioAnalysisResult> {
        analyze_file(path, &self.config.analysis).await
    }

    /// Normalized amplitude envelope with the configured bucket count
    pub async fn waveform(&self, path: &Path, buckets: Option<usize>) -> Result<WaveformEnvelope> {
        let audio = decode_file(path).await?;
        let buckets = buckets.unwrap_or(self.config.player.waveform_buckets);
        blocking(move || WaveformEnvelope::compute(&audio, buckets)).await
    }

    /// Spectrum bars at `time` seconds
    pub async fn spectrum(&self, path: &Path, time: f64, bars: Option<usize>) -> Result<Vec<f32>> {
        let audio = decode_file(path).await?;
        let fft_size = self.config.player.fft_size;
        let bars = bars.unwrap_or(self.config.player.spectrum_bars);
        blocking(move || SpectrumAnalyzer::new(fft_size).bars_at(&audio, time, bars)).await
    }

    pub async fn convert(
        &self,
        input: &SourceFile,
        settings: &AudioProcessingSettings,
        observer: Option<&dyn ProgressObserver>,
    ) -> Result<AudioBlob> {
        self.pipeline.convert(input, settings, observer).await
    }

    /// Abort the running conversion, if any
    pub async fn cancel(&self) {
        self.pipeline.cancel().await
    }

    pub async fn resize_cover(&self, data: &[u8], options: &ImageResizeOptions) -> Result<ImageBlob> {
        self.resampler.resize(data, options).await
    }

    /// A player configured from this instance
    pub fn player(&self) -> Player {
        Player::new(self.config.player.clone())
    }
}

/// Signal passes are O(samples); keep them off the async workers
async fn blocking<T, F>(task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| AudioToolsError::Decode(format!("signal task failed: {}", e)))
}

impl Default for AudioTools {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}
