//! Real-time magnitude spectrum for the frequency-bar view.
//!
//! Mirrors what a browser `AnalyserNode` hands to a canvas: a Hann-windowed
//! FFT over the last `fft_size` samples before the playhead, smoothed over
//! time and mapped from the [-100, -30] dB range to [0, 1].

use std::sync::Arc;

use apodize::hanning_iter;
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::media::decode::DecodedAudio;

pub const MIN_DECIBELS: f32 = -100.0;
pub const MAX_DECIBELS: f32 = -30.0;
pub const DEFAULT_SMOOTHING: f32 = 0.8;

pub struct SpectrumAnalyzer {
    fft_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    smoothing: f32,
    smoothed: Vec<f32>,
}

impl SpectrumAnalyzer {
    /// `fft_size` must be a power of two; the config layer enforces it
    pub fn new(fft_size: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        let window: Vec<f32> = hanning_iter(fft_size).map(|x| x as f32).collect();

        Self {
            fft_size,
            fft,
            window,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch,
            smoothing: DEFAULT_SMOOTHING,
            smoothed: vec![0.0; fft_size / 2],
        }
    }

    pub fn with_smoothing(mut self, smoothing: f32) -> Self {
        self.smoothing = smoothing.clamp(0.0, 0.99);
        self
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Forget the smoothing history (after a seek)
    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|m| *m = 0.0);
    }

    /// Feed one window of mono samples and return the smoothed linear magnitudes.
    ///
    /// Shorter input is zero-padded at the front; longer input keeps its tail.
    pub fn process(&mut self, samples: &[f32]) -> &[f32] {
        let n = self.fft_size;
        let tail = &samples[samples.len().saturating_sub(n)..];
        let pad = n - tail.len();

        for i in 0..n {
            let sample = if i < pad { 0.0 } else { tail[i - pad] };
            self.buffer[i] = Complex::new(sample * self.window[i], 0.0);
        }

        if self.scratch.is_empty() {
            self.fft.process(&mut self.buffer);
        } else {
            self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);
        }

        let scale = 1.0 / n as f32;
        for (smoothed, bin) in self.smoothed.iter_mut().zip(self.buffer.iter()) {
            let magnitude = bin.norm() * scale;
            *smoothed = self.smoothing * *smoothed + (1.0 - self.smoothing) * magnitude;
        }
        &self.smoothed
    }

    /// Spectrum of the window ending at `time`, grouped into `bar_count` bars in [0, 1]
    pub fn bars_at(&mut self, decoded: &DecodedAudio, time: f64, bar_count: usize) -> Vec<f32> {
        let window = mono_window(decoded, time, self.fft_size);
        let bin_count = self.bin_count();
        let magnitudes = self.process(&window).to_vec();
        group_into_bars(&magnitudes, bar_count.min(bin_count))
    }
}

/// Average of all channels over the `size` frames that end at `time`
fn mono_window(decoded: &DecodedAudio, time: f64, size: usize) -> Vec<f32> {
    let frames = decoded.frames();
    let end = ((time.max(0.0) * decoded.sample_rate as f64) as usize).min(frames);
    let start = end.saturating_sub(size);
    let channel_count = decoded.channel_count().max(1) as f32;

    (start..end)
        .map(|i| decoded.channels.iter().map(|ch| ch.get(i).copied().unwrap_or(0.0)).sum::<f32>() / channel_count)
        .collect()
}

/// Map a linear magnitude to the [0, 1] display range
pub fn normalize_magnitude(magnitude: f32) -> f32 {
    let db = 20.0 * magnitude.max(1e-10).log10();
    ((db - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS)).clamp(0.0, 1.0)
}

fn group_into_bars(magnitudes: &[f32], bar_count: usize) -> Vec<f32> {
    if bar_count == 0 || magnitudes.is_empty() {
        return Vec::new();
    }
    let per_bar = magnitudes.len() / bar_count;
    magnitudes
        .chunks(per_bar.max(1))
        .take(bar_count)
        .map(|chunk| normalize_magnitude(chunk.iter().sum::<f32>() / chunk.len() as f32))
        .collect()
}
