use crate::engine::{EngineEvent, MediaEngine};
use crate::error::{AudioToolsError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

/// In-memory engine: "encodes" by prefixing the input bytes
pub struct FakeEngine {
    files: Mutex<HashMap<String, Vec<u8>>>,
    calls: Mutex<Vec<Vec<String>>>,
    events: broadcast::Sender<EngineEvent>,
    terminated: Notify,
    loaded: AtomicBool,
    pub loads: AtomicUsize,
    pub load_attempts: AtomicUsize,
    /// load() sleeps this long and ignores terminate() meanwhile
    pub load_delay: Mutex<Option<Duration>>,
    pub fail_load: AtomicBool,
    pub write_attempts: AtomicUsize,
    /// write_file() sleeps this long before touching the namespace
    pub stage_delay: Mutex<Option<Duration>>,
    pub exit_code: AtomicI32,
    pub job_duration: Mutex<Option<Duration>>,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl FakeEngine {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            files: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            events,
            terminated: Notify::new(),
            loaded: AtomicBool::new(false),
            loads: AtomicUsize::new(0),
            load_attempts: AtomicUsize::new(0),
            load_delay: Mutex::new(None),
            write_attempts: AtomicUsize::new(0),
            stage_delay: Mutex::new(None),
            fail_load: AtomicBool::new(false),
            exit_code: AtomicI32::new(0),
            job_duration: Mutex::new(None),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn listener_count(&self) -> usize {
        self.events.receiver_count()
    }

    fn ensure_loaded(&self) -> Result<()> {
        if self.loaded.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AudioToolsError::EngineLoad("fake engine is not loaded".to_string()))
        }
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    async fn load(&self) -> Result<()> {
        self.load_attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.load_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(AudioToolsError::Other("core module unavailable".to_string()));
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<()> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.stage_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.ensure_loaded()?;
        self.files.lock().unwrap().insert(name.to_string(), data.to_vec());
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        self.ensure_loaded()?;
        self.files
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, name.to_string()).into())
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        self.ensure_loaded()?;
        match self.files.lock().unwrap().remove(name) {
            Some(_) => Ok(()),
            None => Err(std::io::Error::new(std::io::ErrorKind::NotFound, name.to_string()).into()),
        }
    }

    async fn list_files(&self) -> Result<Vec<String>> {
        self.ensure_loaded()?;
        Ok(self.file_names())
    }

    async fn exec(&self, args: &[String]) -> Result<i32> {
        self.ensure_loaded()?;
        self.calls.lock().unwrap().push(args.to_vec());

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        let _ = self.events.send(EngineEvent::Log {
            message: "starting".to_string(),
        });
        let _ = self.events.send(EngineEvent::Progress { progress: 0.5 });

        let hold = *self.job_duration.lock().unwrap();
        if let Some(hold) = hold {
            let terminated = tokio::select! {
                _ = tokio::time::sleep(hold) => false,
                _ = self.terminated.notified() => true,
            };
            if terminated {
                self.active.fetch_sub(1, Ordering::SeqCst);
                return Err(AudioToolsError::Cancelled);
            }
        }
        let _ = self.events.send(EngineEvent::Progress { progress: 1.0 });
        self.active.fetch_sub(1, Ordering::SeqCst);

        let code = self.exit_code.load(Ordering::SeqCst);
        if code == 0 {
            let input_index = args.iter().position(|a| a == "-i").map(|i| i + 1);
            let input = input_index
                .and_then(|i| args.get(i))
                .and_then(|name| self.files.lock().unwrap().get(name).cloned())
                .unwrap_or_default();
            let output = args.last().cloned().unwrap_or_default();
            let mut encoded = b"encoded:".to_vec();
            encoded.extend(input);
            self.files.lock().unwrap().insert(output, encoded);
        } else {
            // Частично записанный выход, как у настоящего движка
            if let Some(output) = args.last() {
                self.files.lock().unwrap().insert(output.clone(), b"partial".to_vec());
            }
        }
        Ok(code)
    }

    async fn terminate(&self) {
        self.loaded.store(false, Ordering::SeqCst);
        self.files.lock().unwrap().clear();
        self.terminated.notify_waiters();
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}
