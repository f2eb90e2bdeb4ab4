//! # Transcoding pipeline
//!
//! Converts an uploaded track into one of the distribution formats by staging
//! it in a [`MediaEngine`](crate::engine::MediaEngine) namespace, running one
//! engine job and reading the result back.

pub mod args;
pub mod pipeline;
pub mod settings;

pub use args::build_command_args;
pub use pipeline::TranscodingPipeline;
pub use settings::{AudioBlob, AudioProcessingSettings, OutputFormat, SourceFile, TrackMetadata};

#[cfg(test)]
mod tests {
    mod fake_engine;
    mod test_pipeline;
}
