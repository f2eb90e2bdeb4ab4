//! Conversion jobs against a single media engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::args::build_command_args;
use super::settings::{AudioBlob, AudioProcessingSettings, SourceFile};
use crate::engine::namespace::unique_name;
use crate::engine::{EngineEvent, MediaEngine};
use crate::error::{AudioToolsError, Result};
use crate::progress::{ConversionStep, ProgressObserver, ProgressTracker};

/// Owns one engine and runs conversion jobs on it one at a time.
///
/// The engine is loaded on the first job. Concurrent `convert` calls queue up
/// on an internal lock in arrival order; `cancel` does not wait for it.
pub struct TranscodingPipeline<E: MediaEngine> {
    engine: Arc<E>,
    job_lock: Arc<Mutex<()>>,
    // Растёт при каждом cancel(); задание сравнивает со значением на старте
    cancel_generation: AtomicU64,
}

/// Names staged in the engine namespace for one job
struct StagedFiles {
    input: String,
    output: String,
    cover: Option<String>,
}

impl StagedFiles {
    fn names(&self) -> Vec<String> {
        [Some(&self.input), Some(&self.output), self.cover.as_ref()]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }
}

/// Holds the job slot and the staged names until they are released.
///
/// If the job future is dropped before `release`, the deletes run on a
/// spawned task and the slot is handed back only after they finish, so the
/// next job never starts next to a previous job's files.
struct JobGuard<E: MediaEngine + 'static> {
    engine: Arc<E>,
    names: Vec<String>,
    slot: Option<OwnedMutexGuard<()>>,
}

impl<E: MediaEngine + 'static> JobGuard<E> {
    async fn release(mut self) {
        let names = std::mem::take(&mut self.names);
        release_files(self.engine.as_ref(), &names).await;
    }
}

impl<E: MediaEngine + 'static> Drop for JobGuard<E> {
    fn drop(&mut self) {
        if self.names.is_empty() {
            return;
        }
        let names = std::mem::take(&mut self.names);
        let engine = self.engine.clone();
        let slot = self.slot.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Conversion dropped before finishing, releasing {} working files", names.len());
                handle.spawn(async move {
                    release_files(engine.as_ref(), &names).await;
                    drop(slot);
                });
            }
            Err(_) => warn!("No runtime to release working files {:?}", names),
        }
    }
}

/// Best-effort delete; files that are already gone are fine
async fn release_files<E: MediaEngine + ?Sized>(engine: &E, names: &[String]) {
    for name in names {
        match engine.delete_file(name).await {
            Ok(()) => {}
            Err(AudioToolsError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
            // Рабочий каталог удалён вместе с движком
            Err(AudioToolsError::Cancelled) => {}
            Err(e) => warn!("Failed to delete working file {}: {}", name, e),
        }
    }
}

impl<E: MediaEngine + 'static> TranscodingPipeline<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine: Arc::new(engine),
            job_lock: Arc::new(Mutex::new(())),
            cancel_generation: AtomicU64::new(0),
        }
    }

    pub fn engine(&self) -> &E {
        self.engine.as_ref()
    }

    /// Convert `input` according to `settings`.
    ///
    /// Every file the job puts into the engine namespace is removed, whether
    /// the job succeeded, failed, was cancelled or its future was dropped.
    /// A `cancel` that lands anywhere inside the job surfaces as
    /// [`AudioToolsError::Cancelled`].
    pub async fn convert(
        &self,
        input: &SourceFile,
        settings: &AudioProcessingSettings,
        observer: Option<&dyn ProgressObserver>,
    ) -> Result<AudioBlob> {
        settings.validate()?;

        let slot = self.job_lock.clone().lock_owned().await;
        let generation = self.cancel_generation.load(Ordering::SeqCst);
        let mut guard = JobGuard {
            engine: self.engine.clone(),
            names: Vec::new(),
            slot: Some(slot),
        };
        let mut tracker = ProgressTracker::new(observer);

        tracker.set_step(ConversionStep::LoadingEngine);
        if let Err(e) = self.ensure_loaded().await {
            return Err(self.interrupted(generation, e));
        }
        if self.cancelled_since(generation) {
            // load() мог завершиться уже после terminate()
            self.engine.terminate().await;
            info!("Conversion of {} cancelled while loading the engine", input.name);
            return Err(AudioToolsError::Cancelled);
        }

        let format = settings.format;
        let staged = StagedFiles {
            input: unique_name("input", &input.extension()),
            output: unique_name("output", format.extension()),
            cover: settings
                .cover_art
                .as_ref()
                .filter(|_| format.supports_cover())
                .map(|cover| unique_name("cover", cover_extension(cover))),
        };
        guard.names = staged.names();

        let result = self
            .run_job(input, settings, &staged, generation, &mut tracker)
            .await
            .map_err(|e| self.interrupted(generation, e));
        guard.release().await;

        match &result {
            Ok(blob) => {
                tracker.complete();
                info!("Converted {} to {} ({} bytes)", input.name, format.extension(), blob.len());
            }
            Err(AudioToolsError::Cancelled) => info!("Conversion of {} cancelled", input.name),
            Err(e) => error!("Conversion of {} failed: {}", input.name, e),
        }
        result
    }

    /// Terminate the engine, killing whatever job is running.
    /// The next `convert` loads a fresh engine.
    pub async fn cancel(&self) {
        info!("Cancelling media engine");
        self.cancel_generation.fetch_add(1, Ordering::SeqCst);
        self.engine.terminate().await;
    }

    fn cancelled_since(&self, generation: u64) -> bool {
        self.cancel_generation.load(Ordering::SeqCst) != generation
    }

    /// Any failure after a cancel is reported as the cancel itself
    fn interrupted(&self, generation: u64, error: AudioToolsError) -> AudioToolsError {
        if self.cancelled_since(generation) {
            debug!("Error after cancel: {}", error);
            AudioToolsError::Cancelled
        } else {
            error
        }
    }

    async fn ensure_loaded(&self) -> Result<()> {
        if self.engine.is_loaded() {
            return Ok(());
        }
        info!("Loading media engine");
        self.engine.load().await.map_err(|e| match e {
            AudioToolsError::EngineLoad(_) | AudioToolsError::Cancelled => e,
            other => AudioToolsError::EngineLoad(other.to_string()),
        })
    }

    async fn run_job(
        &self,
        input: &SourceFile,
        settings: &AudioProcessingSettings,
        staged: &StagedFiles,
        generation: u64,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<AudioBlob> {
        tracker.set_step(ConversionStep::StagingFiles);
        self.engine.write_file(&staged.input, &input.bytes).await?;
        if let (Some(name), Some(cover)) = (&staged.cover, &settings.cover_art) {
            self.engine.write_file(name, cover).await?;
        }

        let args = build_command_args(&staged.input, staged.cover.as_deref(), &staged.output, settings);
        debug!("Engine arguments: {:?}", args);

        if self.cancelled_since(generation) {
            return Err(AudioToolsError::Cancelled);
        }
        tracker.set_step(ConversionStep::Encoding);
        let exit_code = self.exec_with_progress(&args, tracker).await?;
        if exit_code != 0 {
            return Err(AudioToolsError::Conversion { exit_code });
        }

        tracker.set_step(ConversionStep::Collecting);
        let bytes = self.engine.read_file(&staged.output).await?;
        Ok(AudioBlob {
            bytes: bytes.into(),
            mime_type: settings.format.mime_type(),
            format: settings.format,
        })
    }

    /// Run the job while forwarding engine progress to the tracker.
    /// The subscription lives only for this call.
    async fn exec_with_progress(&self, args: &[String], tracker: &mut ProgressTracker<'_>) -> Result<i32> {
        let mut events = self.engine.subscribe();
        let mut listening = true;
        let mut exec = self.engine.exec(args);

        let result = loop {
            tokio::select! {
                biased;
                event = events.recv(), if listening => match event {
                    Ok(event) => forward_event(event, tracker),
                    Err(RecvError::Lagged(skipped)) => debug!("Skipped {} engine events", skipped),
                    Err(RecvError::Closed) => listening = false,
                },
                result = &mut exec => break result,
            }
        };

        loop {
            match events.try_recv() {
                Ok(event) => forward_event(event, tracker),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        drop(events);
        result
    }
}

fn forward_event(event: EngineEvent, tracker: &mut ProgressTracker<'_>) {
    match event {
        EngineEvent::Progress { progress } => tracker.update_step_progress(progress * 100.0, None),
        EngineEvent::Log { message } => debug!("engine: {}", message),
    }
}

fn cover_extension(cover: &[u8]) -> &'static str {
    image::guess_format(cover)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("jpg")
}
