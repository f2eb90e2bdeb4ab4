//! Native ffmpeg behind the [`MediaEngine`] interface.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::{broadcast, watch};

use super::namespace::WorkingNamespace;
use super::tools::{locate_ffmpeg, ExternalTool};
use super::{EngineEvent, MediaEngine};
use crate::config::EngineConfig;
use crate::error::{AudioToolsError, Result};

const EVENT_CAPACITY: usize = 256;

static DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Duration:\s*(\d+:\d+:\d+(?:\.\d+)?)").expect("valid regex"));
static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"time=\s*(\d+:\d+:\d+(?:\.\d+)?)").expect("valid regex"));

#[derive(Default)]
struct EngineState {
    binary: Option<ExternalTool>,
    namespace: Option<WorkingNamespace>,
    // terminate() был вызван и load() ещё не выполнялся заново
    terminated: bool,
}

impl EngineState {
    fn unavailable(&self) -> AudioToolsError {
        if self.terminated {
            AudioToolsError::Cancelled
        } else {
            not_loaded()
        }
    }
}

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    Terminated,
    TimedOut,
}

/// ffmpeg process runner with a private working directory
pub struct FfmpegEngine {
    config: EngineConfig,
    state: Mutex<EngineState>,
    events: broadcast::Sender<EngineEvent>,
    // Поколение: каждое terminate() увеличивает его и прерывает текущий exec
    terminate_tx: watch::Sender<u64>,
}

impl FfmpegEngine {
    pub fn new(config: EngineConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (terminate_tx, _) = watch::channel(0);
        Self {
            config,
            state: Mutex::new(EngineState::default()),
            events,
            terminate_tx,
        }
    }

    /// The located ffmpeg binary, once loaded
    pub fn tool(&self) -> Option<ExternalTool> {
        self.state.lock().binary.clone()
    }

    /// Number of attached event listeners
    pub fn listener_count(&self) -> usize {
        self.events.receiver_count()
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let state = self.state.lock();
        let namespace = state.namespace.as_ref().ok_or_else(|| state.unavailable())?;
        namespace.resolve(name)
    }

    /// An I/O failure caused by a concurrent terminate() is a cancellation
    fn io_failure(&self, error: std::io::Error) -> AudioToolsError {
        if self.state.lock().terminated {
            AudioToolsError::Cancelled
        } else {
            error.into()
        }
    }
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

fn not_loaded() -> AudioToolsError {
    AudioToolsError::EngineLoad("media engine is not loaded".to_string())
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn load(&self) -> Result<()> {
        if self.is_loaded() {
            return Ok(());
        }

        let mut terminate_rx = self.terminate_tx.subscribe();
        let generation = *terminate_rx.borrow_and_update();

        let located = tokio::select! {
            located = locate_ffmpeg(&self.config) => located,
            _ = terminate_rx.changed() => {
                info!("Engine load interrupted by terminate");
                return Err(AudioToolsError::Cancelled);
            }
        };
        let tool = located.map_err(|e| match e {
            AudioToolsError::EngineLoad(_) => e,
            other => AudioToolsError::EngineLoad(other.to_string()),
        })?;
        let namespace = WorkingNamespace::new()
            .map_err(|e| AudioToolsError::EngineLoad(format!("failed to create working directory: {}", e)))?;
        debug!("Engine working directory: {}", namespace.path().display());

        let mut state = self.state.lock();
        if *self.terminate_tx.borrow() != generation {
            info!("Engine terminated while loading, discarding {}", tool.path.display());
            return Err(AudioToolsError::Cancelled);
        }
        if state.binary.is_none() {
            state.binary = Some(tool);
            state.namespace = Some(namespace);
            state.terminated = false;
        }
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        let state = self.state.lock();
        state.binary.is_some() && state.namespace.is_some()
    }

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<()> {
        let path = self.resolve(name)?;
        tokio::fs::write(&path, data).await.map_err(|e| self.io_failure(e))?;
        if let Some(namespace) = self.state.lock().namespace.as_mut() {
            namespace.register(name);
        }
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.resolve(name)?;
        tokio::fs::read(&path).await.map_err(|e| self.io_failure(e))
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        let path = self.resolve(name)?;
        tokio::fs::remove_file(&path).await.map_err(|e| self.io_failure(e))?;
        if let Some(namespace) = self.state.lock().namespace.as_mut() {
            namespace.unregister(name);
        }
        Ok(())
    }

    async fn list_files(&self) -> Result<Vec<String>> {
        let state = self.state.lock();
        let namespace = state.namespace.as_ref().ok_or_else(|| state.unavailable())?;
        namespace.entries()
    }

    async fn exec(&self, args: &[String]) -> Result<i32> {
        // Подписка и снимок состояния под одной блокировкой: terminate() меняет оба под ней же
        let (binary, workdir, mut terminate_rx) = {
            let state = self.state.lock();
            match (&state.binary, &state.namespace) {
                (Some(binary), Some(namespace)) => (
                    binary.path.clone(),
                    namespace.path().to_path_buf(),
                    self.terminate_tx.subscribe(),
                ),
                _ => return Err(state.unavailable()),
            }
        };
        let expected = expected_duration(args);

        info!("Running ffmpeg {}", args.join(" "));
        let mut child = tokio::process::Command::new(&binary)
            .args(["-hide_banner", "-nostdin", "-y"])
            .args(args)
            .current_dir(&workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let reader = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(forward_output(stderr, expected, self.events.clone())));

        let timeout = Duration::from_secs(self.config.job_timeout_secs);
        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status),
            _ = terminate_rx.changed() => Outcome::Terminated,
            _ = tokio::time::sleep(timeout) => Outcome::TimedOut,
        };

        if !matches!(outcome, Outcome::Exited(_)) {
            if let Err(e) = child.kill().await {
                warn!("Failed to kill ffmpeg: {}", e);
            }
        }
        // Дожидаемся чтения stderr, чтобы все события ушли до возврата
        if let Some(reader) = reader {
            let _ = reader.await;
        }

        match outcome {
            Outcome::Exited(status) => {
                let status = status?;
                let code = status.code().unwrap_or(-1);
                if status.success() {
                    info!("ffmpeg finished successfully");
                } else {
                    error!("ffmpeg failed with status {}", status);
                }
                Ok(code)
            }
            Outcome::Terminated => {
                info!("ffmpeg job terminated");
                Err(AudioToolsError::Cancelled)
            }
            Outcome::TimedOut => {
                error!("ffmpeg timed out after {} seconds", self.config.job_timeout_secs);
                Err(AudioToolsError::Other(format!(
                    "ffmpeg timed out after {} seconds",
                    self.config.job_timeout_secs
                )))
            }
        }
    }

    async fn terminate(&self) {
        let mut state = self.state.lock();
        state.binary = None;
        // Удаляет рабочий каталог вместе с содержимым
        state.namespace = None;
        state.terminated = true;
        self.terminate_tx.send_modify(|generation| *generation = generation.wrapping_add(1));
        debug!("Media engine terminated");
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}

/// Read ffmpeg's stderr, turning status lines into progress events.
///
/// Status lines are terminated by `\r`, regular log lines by `\n`.
async fn forward_output<R>(stderr: R, expected: Option<f64>, events: broadcast::Sender<EngineEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stderr);
    let mut chunk = Vec::new();
    let mut total = expected;

    loop {
        chunk.clear();
        match reader.read_until(b'\r', &mut chunk).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Failed to read ffmpeg output: {}", e);
                break;
            }
        }

        let text = String::from_utf8_lossy(&chunk);
        for line in text.split(['\r', '\n']).map(str::trim).filter(|l| !l.is_empty()) {
            if total.is_none() {
                total = parse_duration_line(line);
            }
            if let (Some(position), Some(total)) = (parse_time_line(line), total) {
                let _ = events.send(EngineEvent::Progress {
                    progress: progress_fraction(position, total),
                });
            }
            debug!("ffmpeg: {}", line);
            let _ = events.send(EngineEvent::Log {
                message: line.to_string(),
            });
        }
    }
}

/// Parse `HH:MM:SS.ms`, `MM:SS` or plain seconds
pub fn parse_timestamp(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let mut seconds = 0.0;
    for part in value.split(':') {
        let part: f64 = part.parse().ok()?;
        if part < 0.0 {
            return None;
        }
        seconds = seconds * 60.0 + part;
    }
    if value.split(':').count() > 3 {
        return None;
    }
    Some(seconds)
}

fn parse_duration_line(line: &str) -> Option<f64> {
    DURATION_RE
        .captures(line)
        .and_then(|caps| parse_timestamp(&caps[1]))
        .filter(|d| *d > 0.0)
}

fn parse_time_line(line: &str) -> Option<f64> {
    TIME_RE.captures(line).and_then(|caps| parse_timestamp(&caps[1]))
}

/// Output length implied by `-ss` / `-to`, when `-to` is given
fn expected_duration(args: &[String]) -> Option<f64> {
    let value_of = |flag: &str| {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .and_then(|v| parse_timestamp(v))
    };
    let start = value_of("-ss").unwrap_or(0.0);
    value_of("-to").map(|end| end - start).filter(|d| *d > 0.0)
}

fn progress_fraction(position: f64, total: f64) -> f32 {
    if total <= 0.0 {
        return 0.0;
    }
    (position / total).clamp(0.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("00:01:30.5"), Some(90.5));
        assert_eq!(parse_timestamp("1:00:00"), Some(3600.0));
        assert_eq!(parse_timestamp("02:05"), Some(125.0));
        assert_eq!(parse_timestamp("42.25"), Some(42.25));
        assert_eq!(parse_timestamp("abc"), None);
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("1:2:3:4"), None);
    }

    #[test]
    fn test_parse_stderr_lines() {
        let line = "  Duration: 00:03:20.05, start: 0.025057, bitrate: 320 kb/s";
        assert_eq!(parse_duration_line(line), Some(200.05));
        assert_eq!(parse_duration_line("  Duration: N/A, bitrate: N/A"), None);

        let line = "size=    1024kB time=00:00:10.00 bitrate= 838.9kbits/s speed=41.2x";
        assert_eq!(parse_time_line(line), Some(10.0));
        assert_eq!(parse_time_line("size=N/A time=N/A bitrate=N/A"), None);
    }

    #[test]
    fn test_expected_duration_from_trim() {
        assert_eq!(
            expected_duration(&args(&["-i", "in.wav", "-ss", "00:00:05", "-to", "00:00:15", "out.mp3"])),
            Some(10.0)
        );
        assert_eq!(expected_duration(&args(&["-i", "in.wav", "-to", "30", "out.mp3"])), Some(30.0));
        assert_eq!(expected_duration(&args(&["-i", "in.wav", "-ss", "5", "out.mp3"])), None);
        assert_eq!(expected_duration(&args(&["-i", "in.wav", "-ss", "20", "-to", "10", "out.mp3"])), None);
    }

    #[test]
    fn test_progress_fraction_is_clamped() {
        assert_eq!(progress_fraction(5.0, 10.0), 0.5);
        assert_eq!(progress_fraction(12.0, 10.0), 1.0);
        assert_eq!(progress_fraction(1.0, 0.0), 0.0);
    }

    #[tokio::test]
    async fn test_forward_output_emits_progress_and_logs() {
        let (tx, mut rx) = broadcast::channel(32);
        let stderr: &[u8] = b"Input #0, wav\n  Duration: 00:00:20.00, bitrate: 1411 kb/s\nsize=1kB time=00:00:05.00 speed=1x\rsize=2kB time=00:00:10.00 speed=1x\r";
        forward_output(stderr, None, tx).await;

        let mut progress = Vec::new();
        let mut logs = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                EngineEvent::Progress { progress: p } => progress.push(p),
                EngineEvent::Log { .. } => logs += 1,
            }
        }
        assert_eq!(progress, vec![0.25, 0.5]);
        assert_eq!(logs, 4);
    }

    #[tokio::test]
    async fn test_unloaded_engine_rejects_work() {
        let engine = FfmpegEngine::default();
        assert!(!engine.is_loaded());
        assert!(matches!(engine.list_files().await, Err(AudioToolsError::EngineLoad(_))));
        assert!(matches!(
            engine.exec(&args(&["-version"])).await,
            Err(AudioToolsError::EngineLoad(_))
        ));
        assert!(matches!(
            engine.write_file("a.wav", b"data").await,
            Err(AudioToolsError::EngineLoad(_))
        ));
    }

    /// A stand-in binary that answers `-version` after `delay_secs`
    #[cfg(unix)]
    fn scripted_ffmpeg(dir: &std::path::Path, delay_secs: u32) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("ffmpeg");
        let script = format!(
            "#!/bin/sh\nsleep {}\necho \"ffmpeg version 6.1.1 Copyright (c) 2000-2023 the FFmpeg developers\"\n",
            delay_secs
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    fn scripted_engine(binary: PathBuf) -> FfmpegEngine {
        FfmpegEngine::new(EngineConfig {
            ffmpeg_path: Some(binary),
            allow_download: false,
            ..EngineConfig::default()
        })
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_during_load_cancels_it() {
        let dir = tempfile::tempdir().unwrap();
        let engine = std::sync::Arc::new(scripted_engine(scripted_ffmpeg(dir.path(), 2)));

        let load = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.load().await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;
        engine.terminate().await;

        let result = tokio::time::timeout(Duration::from_secs(5), load).await.unwrap().unwrap();
        assert!(matches!(result, Err(AudioToolsError::Cancelled)));
        assert!(!engine.is_loaded());
        assert!(engine.tool().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_operations_after_terminate_are_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let engine = scripted_engine(scripted_ffmpeg(dir.path(), 0));

        engine.load().await.unwrap();
        engine.write_file("input.wav", b"data").await.unwrap();
        assert_eq!(engine.list_files().await.unwrap(), vec!["input.wav".to_string()]);

        engine.terminate().await;
        assert!(matches!(
            engine.write_file("input.wav", b"data").await,
            Err(AudioToolsError::Cancelled)
        ));
        assert!(matches!(engine.read_file("input.wav").await, Err(AudioToolsError::Cancelled)));
        assert!(matches!(engine.list_files().await, Err(AudioToolsError::Cancelled)));
        assert!(matches!(
            engine.exec(&args(&["-i", "input.wav", "out.mp3"])).await,
            Err(AudioToolsError::Cancelled)
        ));

        // Новый load() начинает с чистого рабочего каталога
        engine.load().await.unwrap();
        assert!(engine.list_files().await.unwrap().is_empty());
        assert!(matches!(
            engine.read_file("input.wav").await,
            Err(AudioToolsError::Io(_))
        ));
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_load_and_roundtrip_files() {
        let engine = FfmpegEngine::new(EngineConfig {
            allow_download: false,
            ..EngineConfig::default()
        });
        engine.load().await.unwrap();
        engine.write_file("note.txt", b"hello").await.unwrap();
        assert_eq!(engine.list_files().await.unwrap(), vec!["note.txt".to_string()]);
        assert_eq!(engine.read_file("note.txt").await.unwrap(), b"hello");
        engine.delete_file("note.txt").await.unwrap();
        assert!(engine.list_files().await.unwrap().is_empty());

        engine.terminate().await;
        assert!(!engine.is_loaded());
    }
}
