//! # Media module
//!
//! Decoding, signal analysis and the playback visualisations.

pub mod analysis;
pub mod decode;
pub mod player;
pub mod spectrum;
pub mod waveform;

pub use analysis::{analyze, analyze_file, AudioAnalysisResult};
pub use decode::{decode_audio_bytes, decode_file, DecodedAudio};
pub use player::{PlaybackSession, Player, PlayerEvent, VisualMode, VisualSurface};
pub use spectrum::SpectrumAnalyzer;
pub use waveform::WaveformEnvelope;

#[cfg(test)]
mod tests {
    mod test_analysis;
    mod test_decode;
    mod test_player;
}
