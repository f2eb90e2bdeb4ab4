//! Library configuration
//!
//! All sections have sensible defaults; a JSON file may override any subset of them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AudioToolsError, Result};

/// Where to fetch a static FFmpeg build per operating system
pub const FFMPEG_DOWNLOAD_URLS: &[(&str, &str)] = &[
    (
        "windows",
        "https://github.com/BtbN/FFmpeg-Builds/releases/download/latest/ffmpeg-master-latest-win64-gpl.zip",
    ),
    ("macos", "https://evermeet.cx/ffmpeg/getrelease/zip"),
    (
        "linux",
        "https://johnvansickle.com/ffmpeg/releases/ffmpeg-release-amd64-static.tar.xz",
    ),
];

/// Media engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Explicit path to the ffmpeg binary. Skips discovery when set.
    pub ffmpeg_path: Option<PathBuf>,
    /// Directory where a downloaded ffmpeg build is cached
    pub tools_dir: PathBuf,
    /// Allow downloading ffmpeg when it is not installed
    pub allow_download: bool,
    /// Oldest accepted ffmpeg version
    pub min_version: String,
    /// Hard limit for a single job, in seconds
    pub job_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            tools_dir: std::env::temp_dir().join("artist-audio-tools").join("ffmpeg"),
            allow_download: true,
            min_version: "4.0.0".to_string(),
            job_timeout_secs: 1800,
        }
    }
}

impl EngineConfig {
    /// Download URL for the current platform
    pub fn download_url(&self) -> Option<&'static str> {
        FFMPEG_DOWNLOAD_URLS
            .iter()
            .find(|(os, _)| *os == std::env::consts::OS)
            .map(|(_, url)| *url)
    }
}

/// Signal analyzer thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Samples below this absolute amplitude count as silence (~-60 dBFS)
    pub silence_threshold: f32,
    /// Longest silent run (seconds) that is still tolerated
    pub min_silence_secs: f64,
    /// Peak amplitude at or above which the signal is considered clipped (~-0.09 dBFS)
    pub clipping_threshold: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            silence_threshold: 0.001,
            min_silence_secs: 5.0,
            clipping_threshold: 0.99,
        }
    }
}

/// Cover art resampler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Time budget for the high-quality resize path before falling back
    pub primary_timeout_ms: u64,
    /// Largest surface side we agree to allocate
    pub max_dimension: u32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            primary_timeout_ms: 3000,
            max_dimension: 16384,
        }
    }
}

/// Playback session and visualisation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Interval between `TimeUpdate` events while playing
    pub time_update_interval_ms: u64,
    /// Interval between spectrum frames
    pub frame_interval_ms: u64,
    /// Transform window size for the spectrum view (power of two)
    pub fft_size: usize,
    /// Number of bars drawn in the spectrum view
    pub spectrum_bars: usize,
    /// Number of buckets in the precomputed waveform
    pub waveform_buckets: usize,
    /// Default skip step for the skip buttons, in seconds
    pub skip_seconds: f64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            time_update_interval_ms: 250,
            frame_interval_ms: 16,
            fft_size: 2048,
            spectrum_bars: 64,
            waveform_buckets: 800,
            skip_seconds: 10.0,
        }
    }
}

/// Full configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub analysis: AnalysisConfig,
    pub image: ImageConfig,
    pub player: PlayerConfig,
}

impl AppConfig {
    /// Load configuration from a JSON file. Missing keys fall back to defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AudioToolsError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: AppConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would break the processing code
    pub fn validate(&self) -> Result<()> {
        if !self.player.fft_size.is_power_of_two() || self.player.fft_size < 32 {
            return Err(AudioToolsError::Configuration(format!(
                "fft_size must be a power of two >= 32, got {}",
                self.player.fft_size
            )));
        }
        if self.player.spectrum_bars == 0 || self.player.waveform_buckets == 0 {
            return Err(AudioToolsError::Configuration(
                "spectrum_bars and waveform_buckets must be positive".to_string(),
            ));
        }
        if semver::Version::parse(&self.engine.min_version).is_err() {
            return Err(AudioToolsError::Configuration(format!(
                "min_version is not a semantic version: {}",
                self.engine.min_version
            )));
        }
        Ok(())
    }
}
