use crate::config::AnalysisConfig;
use crate::error::AudioToolsError;
use crate::media::analysis::{analyze, analyze_bytes, analyze_with_config, to_db, SILENCE_FLOOR_DB};
use crate::media::decode::DecodedAudio;
use std::f32::consts::PI;

const SAMPLE_RATE: u32 = 8000;

fn sine_wave(freq: f32, amplitude: f32, seconds: f32) -> Vec<f32> {
    let n = (seconds * SAMPLE_RATE as f32) as usize;
    (0..n)
        .map(|i| amplitude * (2.0 * PI * freq * i as f32 / SAMPLE_RATE as f32).sin())
        .collect()
}

fn silence(seconds: f32) -> Vec<f32> {
    vec![0.0; (seconds * SAMPLE_RATE as f32) as usize]
}

#[test]
fn test_pure_silence_does_not_blow_up() {
    let decoded = DecodedAudio::new(SAMPLE_RATE, vec![silence(6.0)]);
    let result = analyze(&decoded);

    assert!(result.silence_detected);
    assert!(!result.clipping_detected);
    assert_eq!(result.peak_level, SILENCE_FLOOR_DB);
    assert_eq!(result.average_volume, SILENCE_FLOOR_DB);
    assert!(result.peak_level.is_finite());
    assert_eq!(result.duration, 6.0);
}

#[test]
fn test_full_scale_square_wave_clips() {
    let samples: Vec<f32> = (0..SAMPLE_RATE as usize * 2)
        .map(|i| if (i / 40) % 2 == 0 { 1.0 } else { -1.0 })
        .collect();
    let decoded = DecodedAudio::new(SAMPLE_RATE, vec![samples]);
    let result = analyze(&decoded);

    assert!(result.clipping_detected);
    assert_eq!(result.peak_level, 0.0);
    assert_eq!(result.average_volume, 0.0);
    assert!(!result.silence_detected);
}

#[test]
fn test_short_gaps_do_not_add_up() {
    // Пять пауз по секунде: в сумме больше 5 секунд, но ни одна не длиннее 4.9
    let mut samples = Vec::new();
    for _ in 0..5 {
        samples.extend(sine_wave(440.0, 0.5, 1.0));
        samples.extend(silence(1.0));
    }
    samples.extend(silence(0.5));
    let decoded = DecodedAudio::new(SAMPLE_RATE, vec![samples]);

    let result = analyze(&decoded);
    assert!(!result.silence_detected);
}

#[test]
fn test_trailing_silence_is_counted() {
    let mut samples = sine_wave(440.0, 0.5, 1.0);
    samples.extend(silence(5.5));
    let decoded = DecodedAudio::new(SAMPLE_RATE, vec![samples]);

    assert!(analyze(&decoded).silence_detected);
}

#[test]
fn test_sine_levels() {
    let decoded = DecodedAudio::new(SAMPLE_RATE, vec![sine_wave(440.0, 0.5, 2.0)]);
    let result = analyze(&decoded);

    // 0.5 → -6.02 dB, RMS синуса на 3.01 dB ниже пика
    assert!((result.peak_level - -6.02).abs() <= 0.02, "peak {}", result.peak_level);
    assert!((result.average_volume - -9.03).abs() <= 0.02, "rms {}", result.average_volume);
    assert!(!result.clipping_detected);
    assert_eq!(result.sample_rate, SAMPLE_RATE);
    assert_eq!(result.number_of_channels, 1);
}

#[test]
fn test_only_first_channel_is_analysed() {
    let left = sine_wave(440.0, 0.25, 1.0);
    let right = vec![1.0; left.len()];
    let decoded = DecodedAudio::new(SAMPLE_RATE, vec![left, right]);

    let result = analyze(&decoded);
    assert!(!result.clipping_detected);
    assert_eq!(result.number_of_channels, 2);
}

#[test]
fn test_values_are_rounded() {
    let decoded = DecodedAudio::new(SAMPLE_RATE, vec![sine_wave(440.0, 0.3, 1.234)]);
    let result = analyze(&decoded);

    for value in [result.duration, result.peak_level, result.average_volume] {
        assert!(((value * 100.0).round() - value * 100.0).abs() < 1e-6, "{} is not rounded", value);
    }
}

#[test]
fn test_custom_thresholds() {
    let mut samples = sine_wave(440.0, 0.5, 1.0);
    samples.extend(silence(2.0));
    let decoded = DecodedAudio::new(SAMPLE_RATE, vec![samples]);

    let config = AnalysisConfig {
        min_silence_secs: 1.5,
        clipping_threshold: 0.4,
        ..AnalysisConfig::default()
    };
    let result = analyze_with_config(&decoded, &config);
    assert!(result.silence_detected);
    assert!(result.clipping_detected);
}

#[test]
fn test_empty_buffer() {
    let decoded = DecodedAudio::new(SAMPLE_RATE, vec![Vec::new()]);
    let result = analyze(&decoded);

    assert_eq!(result.duration, 0.0);
    assert_eq!(result.peak_level, SILENCE_FLOOR_DB);
    assert!(!result.silence_detected);
}

#[test]
fn test_to_db() {
    assert_eq!(to_db(1.0), 0.0);
    assert_eq!(to_db(0.0), SILENCE_FLOOR_DB);
    assert_eq!(to_db(1e-9), SILENCE_FLOOR_DB);
    assert!((to_db(0.1) - -20.0).abs() < 1e-9);
}

#[test]
fn test_result_serializes_camel_case() {
    let decoded = DecodedAudio::new(SAMPLE_RATE, vec![silence(1.0)]);
    let json = serde_json::to_value(analyze(&decoded)).unwrap();

    assert!(json.get("peakLevel").is_some());
    assert!(json.get("numberOfChannels").is_some());
    assert!(json.get("silenceDetected").is_some());
}

#[tokio::test]
async fn test_analyze_encoded_bytes() {
    let data = super::test_decode::wav_bytes(SAMPLE_RATE, 1, &silence(6.0));
    let result = analyze_bytes(data, Some("wav".to_string()), &AnalysisConfig::default())
        .await
        .unwrap();
    assert!(result.silence_detected);
    assert_eq!(result.duration, 6.0);

    let err = analyze_bytes(b"not audio at all".to_vec(), None, &AnalysisConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AudioToolsError::Decode(_)));
}

#[tokio::test]
async fn test_analyze_file_matches_in_memory_analysis() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("take.wav");
    let mut samples = sine_wave(440.0, 0.5, 1.0);
    samples.extend(silence(1.0));
    let data = super::test_decode::wav_bytes(SAMPLE_RATE, 1, &samples);
    std::fs::write(&path, &data).unwrap();

    let config = AnalysisConfig::default();
    let from_file = crate::media::analyze_file(&path, &config).await.unwrap();
    let from_bytes = analyze_bytes(data, Some("wav".to_string()), &config).await.unwrap();
    assert_eq!(from_file, from_bytes);
    assert_eq!(from_file.duration, 2.0);
}
