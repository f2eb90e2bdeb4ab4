//! # Signal analysis
//!
//! Computes quality metrics for an uploaded track in a single pass over the
//! decoded samples: peak level, average (RMS) volume, clipping and long
//! silences.
//!
//! Only the first channel is analysed. A track whose problems live only in
//! the right channel will not be flagged.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::error::{AudioToolsError, Result};
use crate::media::decode::{decode_audio_bytes, extension_of, DecodedAudio};

/// Level reported for a signal with no energy at all, in dB.
///
/// `20 * log10(0)` is minus infinity, which does not survive JSON.
pub const SILENCE_FLOOR_DB: f64 = -100.0;

/// Quality metrics of one decoded buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioAnalysisResult {
    /// Seconds
    pub duration: f64,
    pub sample_rate: u32,
    pub number_of_channels: u16,
    /// dBFS
    pub peak_level: f64,
    pub clipping_detected: bool,
    pub silence_detected: bool,
    /// RMS level, dBFS
    pub average_volume: f64,
}

/// Running state of the one-pass scan
#[derive(Debug, Default)]
struct SignalScan {
    peak: f32,
    sum_of_squares: f64,
    samples: usize,
    current_silence: usize,
    longest_silence: usize,
}

impl SignalScan {
    fn push(&mut self, sample: f32, silence_threshold: f32) {
        let amplitude = sample.abs();
        if amplitude > self.peak {
            self.peak = amplitude;
        }
        self.sum_of_squares += (sample as f64) * (sample as f64);
        self.samples += 1;

        if amplitude < silence_threshold {
            self.current_silence += 1;
        } else {
            self.flush_silence();
        }
    }

    /// Close the current silent run
    fn flush_silence(&mut self) {
        self.longest_silence = self.longest_silence.max(self.current_silence);
        self.current_silence = 0;
    }

    fn rms(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            (self.sum_of_squares / self.samples as f64).sqrt()
        }
    }
}

/// Analyse a decoded buffer with the default thresholds
pub fn analyze(decoded: &DecodedAudio) -> AudioAnalysisResult {
    analyze_with_config(decoded, &AnalysisConfig::default())
}

/// Analyse a decoded buffer
pub fn analyze_with_config(decoded: &DecodedAudio, config: &AnalysisConfig) -> AudioAnalysisResult {
    let mut scan = SignalScan::default();
    for &sample in decoded.first_channel() {
        scan.push(sample, config.silence_threshold);
    }
    // Тишина до самого конца файла тоже считается
    scan.flush_silence();

    let longest_silence_secs = if decoded.sample_rate > 0 {
        scan.longest_silence as f64 / decoded.sample_rate as f64
    } else {
        0.0
    };

    AudioAnalysisResult {
        duration: round2(decoded.duration),
        sample_rate: decoded.sample_rate,
        number_of_channels: decoded.channel_count() as u16,
        peak_level: round2(to_db(scan.peak as f64)),
        clipping_detected: scan.peak >= config.clipping_threshold,
        silence_detected: longest_silence_secs > config.min_silence_secs,
        average_volume: round2(to_db(scan.rms())),
    }
}

/// Decode and analyse a file
pub async fn analyze_file<P: AsRef<Path>>(path: P, config: &AnalysisConfig) -> Result<AudioAnalysisResult> {
    let path = path.as_ref();
    log::info!("Analysing {}", path.display());
    let data = tokio::fs::read(path).await?;
    analyze_bytes(data, extension_of(path), config).await
}

/// Decode and analyse in-memory file bytes
pub async fn analyze_bytes(
    data: Vec<u8>,
    extension: Option<String>,
    config: &AnalysisConfig,
) -> Result<AudioAnalysisResult> {
    let config = config.clone();
    tokio::task::spawn_blocking(move || {
        let decoded = decode_audio_bytes(&data, extension.as_deref())?;
        Ok(analyze_with_config(&decoded, &config))
    })
    .await
    .map_err(|e| AudioToolsError::Decode(format!("analysis task failed: {}", e)))?
}

/// Amplitude to dBFS, floored at [`SILENCE_FLOOR_DB`]
pub fn to_db(amplitude: f64) -> f64 {
    if amplitude <= 0.0 {
        return SILENCE_FLOOR_DB;
    }
    (20.0 * amplitude.log10()).max(SILENCE_FLOOR_DB)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
