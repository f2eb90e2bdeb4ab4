//! Analyzer and visualisation throughput
//!
//! A 3 minute stereo track at 44.1 kHz should analyse well under a second.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use artist_audio_tools::media::analysis::analyze;
use artist_audio_tools::media::{DecodedAudio, SpectrumAnalyzer, WaveformEnvelope};

const SAMPLE_RATE: u32 = 44100;

fn track(seconds: u32) -> DecodedAudio {
    let frames = (SAMPLE_RATE * seconds) as usize;
    let left: Vec<f32> = (0..frames)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            // Тон с паузой каждые 10 секунд
            if (t as u32) % 10 == 9 {
                0.0
            } else {
                0.6 * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
            }
        })
        .collect();
    let right = left.iter().map(|s| s * 0.5).collect();
    DecodedAudio::new(SAMPLE_RATE, vec![left, right])
}

fn bench_analyze(c: &mut Criterion) {
    let mut group = c.benchmark_group("analyze");
    for seconds in [30u32, 180] {
        let audio = track(seconds);
        group.throughput(Throughput::Elements(audio.frames() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(seconds), &audio, |b, audio| {
            b.iter(|| analyze(black_box(audio)))
        });
    }
    group.finish();
}

fn bench_waveform(c: &mut Criterion) {
    let audio = track(180);
    c.bench_function("waveform_800_buckets", |b| {
        b.iter(|| WaveformEnvelope::compute(black_box(&audio), 800))
    });
}

fn bench_spectrum_frame(c: &mut Criterion) {
    let audio = track(10);
    let mut analyzer = SpectrumAnalyzer::new(2048);
    c.bench_function("spectrum_frame_2048", |b| {
        b.iter(|| analyzer.bars_at(black_box(&audio), 4.5, 64))
    });
}

criterion_group!(benches, bench_analyze, bench_waveform, bench_spectrum_frame);
criterion_main!(benches);
