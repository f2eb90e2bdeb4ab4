//! Conversion job description and its result.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::engine::ffmpeg::parse_timestamp;
use crate::error::{AudioToolsError, Result};

/// Target container/codec of a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp3,
    Ogg,
    Wav,
    M4a,
}

impl OutputFormat {
    /// Encoder passed to `-c:a`
    pub fn codec(&self) -> &'static str {
        match self {
            Self::Mp3 => "libmp3lame",
            Self::Ogg => "libvorbis",
            Self::Wav => "pcm_s16le",
            Self::M4a => "aac",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
            Self::Ogg => "audio/ogg",
            Self::Wav => "audio/wav",
            Self::M4a => "audio/mp4",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Ogg => "ogg",
            Self::Wav => "wav",
            Self::M4a => "m4a",
        }
    }

    /// Uncompressed formats take no bitrate
    pub fn is_lossless(&self) -> bool {
        matches!(self, Self::Wav)
    }

    /// Whether an attached cover picture has to be re-encoded
    pub fn reencodes_cover(&self) -> bool {
        matches!(self, Self::Mp3)
    }

    /// Whether the container can carry a cover picture at all
    pub fn supports_cover(&self) -> bool {
        !matches!(self, Self::Wav)
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = AudioToolsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mp3" => Ok(Self::Mp3),
            "ogg" => Ok(Self::Ogg),
            "wav" => Ok(Self::Wav),
            "m4a" | "aac" => Ok(Self::M4a),
            other => Err(AudioToolsError::InvalidSettings(format!("unsupported format: {}", other))),
        }
    }
}

/// Tags written into the output file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
}

impl TrackMetadata {
    /// Non-empty tags in a fixed order
    pub fn tags(&self) -> Vec<(&'static str, &str)> {
        [("title", &self.title), ("artist", &self.artist), ("album", &self.album)]
            .into_iter()
            .filter_map(|(key, value)| {
                value
                    .as_deref()
                    .filter(|v| !v.trim().is_empty())
                    .map(|v| (key, v))
            })
            .collect()
    }
}

/// Everything a single conversion needs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioProcessingSettings {
    pub format: OutputFormat,
    /// e.g. "192k"
    pub bitrate: Option<String>,
    /// e.g. "44100"
    pub sample_rate: Option<String>,
    /// Apply EBU R128 loudness normalization
    pub normalize: bool,
    pub trim_start: Option<String>,
    pub trim_end: Option<String>,
    pub metadata: Option<TrackMetadata>,
    #[serde(skip)]
    pub cover_art: Option<Bytes>,
}

impl AudioProcessingSettings {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            ..Default::default()
        }
    }

    /// Reject values the engine would misinterpret
    pub fn validate(&self) -> Result<()> {
        let start = match self.trim_start.as_deref() {
            Some(value) => Some(parse_timestamp(value).ok_or_else(|| {
                AudioToolsError::InvalidSettings(format!("invalid trim start: {}", value))
            })?),
            None => None,
        };
        let end = match self.trim_end.as_deref() {
            Some(value) => Some(parse_timestamp(value).ok_or_else(|| {
                AudioToolsError::InvalidSettings(format!("invalid trim end: {}", value))
            })?),
            None => None,
        };
        if let (Some(start), Some(end)) = (start, end) {
            if end <= start {
                return Err(AudioToolsError::InvalidSettings(format!(
                    "trim end ({}) must be after trim start ({})",
                    end, start
                )));
            }
        }

        if let Some(bitrate) = self.bitrate.as_deref() {
            let digits = bitrate.trim_end_matches(['k', 'K', 'm', 'M']);
            if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                return Err(AudioToolsError::InvalidSettings(format!("invalid bitrate: {}", bitrate)));
            }
        }
        if let Some(rate) = self.sample_rate.as_deref() {
            if rate.parse::<u32>().map_or(true, |r| r == 0) {
                return Err(AudioToolsError::InvalidSettings(format!("invalid sample rate: {}", rate)));
            }
        }
        Ok(())
    }
}

/// Input file of a conversion
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Original file name, used to keep the input extension for the engine
    pub name: String,
    pub bytes: Bytes,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub async fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("input")
            .to_string();
        Ok(Self::new(name, bytes))
    }

    /// Extension of the original name, `bin` when there is none
    pub fn extension(&self) -> String {
        Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_else(|| "bin".to_string())
    }

    pub fn stem(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output")
    }
}

/// Output of a conversion
#[derive(Debug, Clone)]
pub struct AudioBlob {
    pub bytes: Bytes,
    pub mime_type: &'static str,
    pub format: OutputFormat,
}

impl AudioBlob {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `<stem>.<ext>` for a save-as dialog
    pub fn suggested_file_name(&self, stem: &str) -> String {
        format!("{}.{}", stem, self.format.extension())
    }

    /// Write the blob to `dir` (or to `dir` itself when it has an extension)
    pub async fn save_to(&self, path: impl AsRef<Path>, stem: &str) -> Result<PathBuf> {
        let path = path.as_ref();
        let target = if path.extension().is_some() {
            path.to_path_buf()
        } else {
            tokio::fs::create_dir_all(path).await?;
            path.join(self.suggested_file_name(stem))
        };
        tokio::fs::write(&target, &self.bytes).await?;
        Ok(target)
    }
}
