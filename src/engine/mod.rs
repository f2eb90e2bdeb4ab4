//! # Media engine boundary
//!
//! The transcoding pipeline talks to its encoder through [`MediaEngine`]: a
//! command-style interface with an isolated working namespace for staging
//! files. [`FfmpegEngine`] runs a native ffmpeg process; anything else (a
//! remote conversion service, a different encoder) can be plugged in by
//! implementing the trait.

pub mod ffmpeg;
pub mod namespace;
pub mod tools;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::Result;

pub use ffmpeg::FfmpegEngine;
pub use namespace::WorkingNamespace;
pub use tools::ExternalTool;

/// Events emitted by an engine while a job runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EngineEvent {
    /// Fraction of the current job that is done (0.0 - 1.0)
    Progress { progress: f32 },
    /// One line of engine output
    Log { message: String },
}

/// Command-based media engine.
///
/// Implementations are not reentrant: callers must not run two jobs at once.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Initialise the engine (locate or fetch its binary, create the working namespace).
    /// Calling it on a loaded engine is a no-op.
    async fn load(&self) -> Result<()>;

    fn is_loaded(&self) -> bool;

    /// Store `data` under `name` in the working namespace
    async fn write_file(&self, name: &str, data: &[u8]) -> Result<()>;

    async fn read_file(&self, name: &str) -> Result<Vec<u8>>;

    async fn delete_file(&self, name: &str) -> Result<()>;

    /// Names currently present in the working namespace
    async fn list_files(&self) -> Result<Vec<String>>;

    /// Run one job and return its exit code
    async fn exec(&self, args: &[String]) -> Result<i32>;

    /// Kill any running job and drop all engine state. The next use needs `load()` again.
    async fn terminate(&self);

    /// Subscribe to progress and log events. Dropping the receiver detaches it.
    fn subscribe(&self) -> broadcast::Receiver<EngineEvent>;
}
