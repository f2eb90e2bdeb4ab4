//! Ready-made progress observers.

use std::io::Write;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::progress::{ProgressInfo, ProgressObserver};

/// Prints progress lines to stderr, leaving stdout to command output
pub struct ConsoleProgressObserver {
    prefix: Option<String>,
}

impl ConsoleProgressObserver {
    pub fn new() -> Self {
        Self { prefix: None }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: Some(prefix.into()) }
    }

    /// The line printed for `progress`
    pub fn render(&self, progress: &ProgressInfo) -> String {
        format!("{}{}", self.prefix.as_deref().unwrap_or(""), format_line(progress))
    }
}

impl Default for ConsoleProgressObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for ConsoleProgressObserver {
    fn on_progress_update(&self, progress: ProgressInfo) {
        eprintln!("{}", self.render(&progress));
    }
}

/// Keeps every update in memory
#[derive(Clone, Default)]
pub struct MemoryProgressObserver {
    history: Arc<Mutex<Vec<ProgressInfo>>>,
}

impl MemoryProgressObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<ProgressInfo> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    pub fn clear_history(&self) {
        if let Ok(mut history) = self.history.lock() {
            history.clear();
        }
    }
}

impl ProgressObserver for MemoryProgressObserver {
    fn on_progress_update(&self, progress: ProgressInfo) {
        if let Ok(mut history) = self.history.lock() {
            history.push(progress);
        }
    }
}

/// Appends timestamped progress lines to a file
pub struct FileProgressObserver {
    file_path: String,
}

impl FileProgressObserver {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self { file_path: file_path.into() }
    }
}

impl ProgressObserver for FileProgressObserver {
    fn on_progress_update(&self, progress: ProgressInfo) {
        let entry = format!(
            "[{}] {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            format_line(&progress)
        );

        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
        {
            Ok(mut file) => {
                let _ = file.write_all(entry.as_bytes());
            }
            Err(e) => log::warn!("Cannot write progress to {}: {}", self.file_path, e),
        }
    }
}

/// Forwards updates into a tokio channel, dropping them when the channel is full
pub struct ChannelProgressObserver {
    sender: mpsc::Sender<ProgressInfo>,
}

impl ChannelProgressObserver {
    pub fn new(sender: mpsc::Sender<ProgressInfo>) -> Self {
        Self { sender }
    }
}

impl ProgressObserver for ChannelProgressObserver {
    fn on_progress_update(&self, progress: ProgressInfo) {
        if let Err(e) = self.sender.try_send(progress) {
            log::debug!("Progress update dropped: {}", e);
        }
    }
}

/// Calls a closure on every update
pub struct CallbackProgressObserver<F>
where
    F: Fn(ProgressInfo) + Send + Sync + 'static,
{
    callback: F,
}

impl<F> CallbackProgressObserver<F>
where
    F: Fn(ProgressInfo) + Send + Sync + 'static,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressObserver for CallbackProgressObserver<F>
where
    F: Fn(ProgressInfo) + Send + Sync + 'static,
{
    fn on_progress_update(&self, progress: ProgressInfo) {
        (self.callback)(progress);
    }
}

/// Draws a single-line progress bar on stderr
pub struct ProgressBarObserver {
    width: usize,
    last_progress: Mutex<f32>,
}

impl ProgressBarObserver {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            // -1 forces the first redraw
            last_progress: Mutex::new(-1.0),
        }
    }
}

impl Default for ProgressBarObserver {
    fn default() -> Self {
        Self::new(40)
    }
}

impl ProgressObserver for ProgressBarObserver {
    fn on_progress_update(&self, progress: ProgressInfo) {
        let Ok(mut last_progress) = self.last_progress.lock() else {
            return;
        };

        // Redraw only on a visible change
        if (*last_progress - progress.total_progress).abs() < 1.0
            && *last_progress >= 0.0
            && progress.total_progress < 100.0
        {
            return;
        }
        *last_progress = progress.total_progress;

        let filled = ((progress.total_progress / 100.0) * self.width as f32) as usize;
        let filled = filled.min(self.width);
        eprint!(
            "\r[{}{}] {:5.1}% - {}",
            "=".repeat(filled),
            " ".repeat(self.width - filled),
            progress.total_progress,
            progress.step
        );
        let _ = std::io::stderr().flush();

        if progress.total_progress >= 100.0 {
            eprintln!();
        }
    }
}

/// Fans an update out to several observers
#[derive(Default)]
pub struct CompositeProgressObserver {
    observers: Vec<Box<dyn ProgressObserver>>,
}

impl CompositeProgressObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) {
        self.observers.push(observer);
    }

    pub fn clear(&mut self) {
        self.observers.clear();
    }
}

impl ProgressObserver for CompositeProgressObserver {
    fn on_progress_update(&self, progress: ProgressInfo) {
        for observer in &self.observers {
            observer.on_progress_update(progress.clone());
        }
    }
}

fn format_line(progress: &ProgressInfo) -> String {
    let details = progress.details.as_deref().unwrap_or("");
    format!(
        "Step: {}, step progress: {:.1}%, total: {:.1}%{}",
        progress.step,
        progress.step_progress,
        progress.total_progress,
        if details.is_empty() { String::new() } else { format!(", details: {}", details) }
    )
}
