//! Precomputed amplitude envelope for the scrubbable waveform.

use serde::{Deserialize, Serialize};

use crate::media::decode::DecodedAudio;

/// Peak envelope normalised so that the loudest bucket is 1.0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveformEnvelope {
    pub peaks: Vec<f32>,
    /// Seconds covered by each bucket
    pub bucket_duration: f64,
}

impl WaveformEnvelope {
    /// Compute `buckets` peaks across all channels.
    ///
    /// Buffers shorter than `buckets` frames produce one bucket per frame.
    pub fn compute(decoded: &DecodedAudio, buckets: usize) -> Self {
        let frames = decoded.frames();
        let buckets = buckets.min(frames);
        if buckets == 0 {
            return Self {
                peaks: Vec::new(),
                bucket_duration: 0.0,
            };
        }

        let mut peaks = vec![0.0_f32; buckets];
        for channel in &decoded.channels {
            for (i, sample) in channel.iter().enumerate() {
                // Frame i lands in bucket floor(i * buckets / frames)
                let bucket = (i * buckets / frames).min(buckets - 1);
                peaks[bucket] = peaks[bucket].max(sample.abs());
            }
        }

        let max = peaks.iter().copied().fold(0.0_f32, f32::max);
        if max > 0.0 {
            for peak in &mut peaks {
                *peak /= max;
            }
        }

        Self {
            peaks,
            bucket_duration: decoded.duration / buckets as f64,
        }
    }

    /// Bucket index under the playhead
    pub fn bucket_at(&self, time: f64) -> Option<usize> {
        if self.peaks.is_empty() || self.bucket_duration <= 0.0 || time < 0.0 {
            return None;
        }
        let index = (time / self.bucket_duration) as usize;
        Some(index.min(self.peaks.len() - 1))
    }

    /// Seek target for a click at `fraction` (0.0 - 1.0) of the waveform width
    pub fn time_at_fraction(&self, fraction: f64) -> f64 {
        fraction.clamp(0.0, 1.0) * self.bucket_duration * self.peaks.len() as f64
    }
}
