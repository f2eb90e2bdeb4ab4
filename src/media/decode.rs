//! # Audio decoding
//!
//! Turns raw file bytes into per-channel PCM samples.
//!
//! WAV goes through `hound` first (cheap and exact for 8/16/24/32-bit PCM and
//! float); everything else, and any WAV that hound rejects, is probed and
//! decoded with `symphonia`.
//!
//! ```rust,no_run
//! # async fn demo() -> artist_audio_tools::error::Result<()> {
//! use artist_audio_tools::media::decode::decode_file;
//!
//! let decoded = decode_file("master.flac").await?;
//! println!("{} Hz, {} channels, {:.1} s", decoded.sample_rate, decoded.channel_count(), decoded.duration);
//! # Ok(())
//! # }
//! ```

use std::io::Cursor;
use std::path::Path;

use log::{debug, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{AudioToolsError, Result};

/// Decoded PCM audio, one sample vector per channel, values in [-1.0, 1.0]
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
    /// Duration in seconds
    pub duration: f64,
}

impl DecodedAudio {
    /// Build from per-channel samples. All channels are expected to have the same length.
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        let frames = channels.first().map_or(0, Vec::len);
        let duration = if sample_rate > 0 {
            frames as f64 / sample_rate as f64
        } else {
            0.0
        };
        Self {
            sample_rate,
            channels,
            duration,
        }
    }

    /// Build from interleaved samples
    pub fn from_interleaved(sample_rate: u32, channel_count: usize, samples: &[f32]) -> Self {
        let channel_count = channel_count.max(1);
        let mut channels = vec![Vec::with_capacity(samples.len() / channel_count); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (ch, sample) in frame.iter().enumerate() {
                channels[ch].push(*sample);
            }
        }
        Self::new(sample_rate, channels)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of sample frames
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Samples of the first channel; empty if there are none
    pub fn first_channel(&self) -> &[f32] {
        self.channels.first().map_or(&[], Vec::as_slice)
    }
}

/// Read and decode a file. Decoding runs on the blocking pool.
pub async fn decode_file<P: AsRef<Path>>(path: P) -> Result<DecodedAudio> {
    let path = path.as_ref();
    let data = tokio::fs::read(path).await?;
    let extension = extension_of(path);

    tokio::task::spawn_blocking(move || decode_audio_bytes(&data, extension.as_deref()))
        .await
        .map_err(|e| AudioToolsError::Decode(format!("decoder task failed: {}", e)))?
}

/// Decode an in-memory file. `extension` is a format hint such as `"mp3"`.
pub fn decode_audio_bytes(data: &[u8], extension: Option<&str>) -> Result<DecodedAudio> {
    if data.is_empty() {
        return Err(AudioToolsError::Decode("input is empty".to_string()));
    }

    let is_wav = extension.map_or(false, |ext| ext.eq_ignore_ascii_case("wav"))
        || data.starts_with(b"RIFF");
    if is_wav {
        match decode_wav_bytes(data) {
            Ok(decoded) => return Ok(decoded),
            Err(e) => debug!("hound rejected WAV input ({}), trying symphonia", e),
        }
    }

    decode_with_symphonia(data, extension)
}

/// Decode WAV data with hound
fn decode_wav_bytes(data: &[u8]) -> Result<DecodedAudio> {
    let reader = hound::WavReader::new(Cursor::new(data))
        .map_err(|e| AudioToolsError::Decode(format!("invalid WAV: {}", e)))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| AudioToolsError::Decode(format!("corrupt WAV data: {}", e)))?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| AudioToolsError::Decode(format!("corrupt WAV data: {}", e)))?
        }
    };

    Ok(DecodedAudio::from_interleaved(
        spec.sample_rate,
        spec.channels as usize,
        &samples,
    ))
}

fn decode_with_symphonia(data: &[u8], extension: Option<&str>) -> Result<DecodedAudio> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data.to_vec())), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AudioToolsError::Decode(format!("unrecognised format: {}", e)))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioToolsError::Decode("no audio track found".to_string()))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels: Vec<Vec<f32>> = track
        .codec_params
        .channels
        .map(|c| vec![Vec::new(); c.count()])
        .unwrap_or_default();

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AudioToolsError::Decode(format!("unsupported codec: {}", e)))?;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(AudioToolsError::Decode(format!("failed to read packet: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let count = spec.channels.count().max(1);
                sample_rate.get_or_insert(spec.rate);
                if channels.len() != count {
                    channels = vec![Vec::new(); count];
                }

                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                for frame in buffer.samples().chunks_exact(count) {
                    for (ch, sample) in frame.iter().enumerate() {
                        channels[ch].push(*sample);
                    }
                }
            }
            // Битый пакет пропускаем, остальные ошибки фатальны
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => return Err(AudioToolsError::Decode(format!("decoder failed: {}", e))),
        }
    }

    let sample_rate = sample_rate
        .ok_or_else(|| AudioToolsError::Decode("sample rate is unknown".to_string()))?;
    if channels.is_empty() {
        return Err(AudioToolsError::Decode("channel layout is unknown".to_string()));
    }

    let decoded = DecodedAudio::new(sample_rate, channels);
    debug!(
        "Decoded {} frames at {} Hz ({} channels)",
        decoded.frames(),
        decoded.sample_rate,
        decoded.channel_count()
    );
    Ok(decoded)
}

pub(crate) fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}
