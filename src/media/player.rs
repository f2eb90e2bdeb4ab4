//! # Playback session
//!
//! Transport (play / pause / seek / skip / volume / mute) for one media
//! source plus the two visualisations shown under the player: the
//! precomputed waveform with a progress cursor and the live spectrum bars.
//!
//! A [`Player`] owns at most one [`PlaybackSession`]. Loading a new source
//! tears the previous session down before the new one is created, and a
//! session owns at most one spectrum render task, started and stopped by
//! the transport and view-mode transitions.
//!
//! Audio output itself is not handled here: the session keeps the playback
//! clock that the visualisations and the time display follow.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::PlayerConfig;
use crate::error::{AudioToolsError, Result};
use crate::media::decode::{decode_file, DecodedAudio};
use crate::media::spectrum::SpectrumAnalyzer;
use crate::media::waveform::WaveformEnvelope;

/// Lifecycle events of a playback session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlayerEvent {
    /// The source is decoded and its duration is known
    Ready { duration: f64 },
    /// Periodic position update while playing, and after seeks
    TimeUpdate { current_time: f64 },
    /// Playback reached the end
    Finished,
}

/// Which visualisation is shown under the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualMode {
    Waveform,
    Spectrum,
}

/// Drawing target for the visualisations
pub trait VisualSurface: Send + Sync {
    /// Draw the waveform with the playhead at `progress` (0.0 - 1.0)
    fn draw_waveform(&self, envelope: &WaveformEnvelope, progress: f64);
    /// Draw one frame of spectrum bars, each in [0, 1]
    fn draw_spectrum(&self, bars: &[f32]);
}

/// Shared transport state
#[derive(Debug)]
struct Transport {
    duration: f64,
    /// Position at `anchor`, or the frozen position while paused
    position: f64,
    anchor: Option<Instant>,
    volume: f32,
    muted: bool,
    mode: VisualMode,
}

impl Transport {
    fn is_playing(&self) -> bool {
        self.anchor.is_some()
    }

    fn current_time(&self) -> f64 {
        let elapsed = self.anchor.map_or(0.0, |a| a.elapsed().as_secs_f64());
        (self.position + elapsed).min(self.duration)
    }

    fn freeze(&mut self) {
        self.position = self.current_time();
        self.anchor = None;
    }
}

pub struct PlaybackSession {
    source: String,
    audio: Arc<DecodedAudio>,
    envelope: Arc<WaveformEnvelope>,
    state: Arc<Mutex<Transport>>,
    events: broadcast::Sender<PlayerEvent>,
    surface: Option<Arc<dyn VisualSurface>>,
    config: PlayerConfig,
    ticker: Option<JoinHandle<()>>,
    render: Option<JoinHandle<()>>,
}

impl PlaybackSession {
    fn new(
        source: String,
        audio: DecodedAudio,
        config: PlayerConfig,
        events: broadcast::Sender<PlayerEvent>,
        surface: Option<Arc<dyn VisualSurface>>,
    ) -> Self {
        let envelope = WaveformEnvelope::compute(&audio, config.waveform_buckets);
        let state = Transport {
            duration: audio.duration,
            position: 0.0,
            anchor: None,
            volume: 1.0,
            muted: false,
            mode: VisualMode::Waveform,
        };

        let session = Self {
            source,
            audio: Arc::new(audio),
            envelope: Arc::new(envelope),
            state: Arc::new(Mutex::new(state)),
            events,
            surface,
            config,
            ticker: None,
            render: None,
        };

        let _ = session.events.send(PlayerEvent::Ready {
            duration: session.duration(),
        });
        session.draw_waveform();
        session
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn duration(&self) -> f64 {
        self.state.lock().duration
    }

    pub fn current_time(&self) -> f64 {
        self.state.lock().current_time()
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().is_playing()
    }

    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    pub fn is_muted(&self) -> bool {
        self.state.lock().muted
    }

    /// Gain the output stage should apply
    pub fn effective_volume(&self) -> f32 {
        let state = self.state.lock();
        if state.muted {
            0.0
        } else {
            state.volume
        }
    }

    pub fn visual_mode(&self) -> VisualMode {
        self.state.lock().mode
    }

    pub fn envelope(&self) -> &WaveformEnvelope {
        &self.envelope
    }

    pub fn audio(&self) -> &DecodedAudio {
        &self.audio
    }

    /// True while a spectrum render task is alive
    pub fn is_rendering(&self) -> bool {
        self.render.as_ref().map_or(false, |h| !h.is_finished())
    }

    pub fn play(&mut self) {
        {
            let mut state = self.state.lock();
            if state.is_playing() {
                return;
            }
            // Повторный запуск с конца начинается сначала
            if state.position >= state.duration {
                state.position = 0.0;
            }
            state.anchor = Some(Instant::now());
        }
        debug!("Playing {}", self.source);
        self.start_ticker();
        if self.visual_mode() == VisualMode::Spectrum {
            self.start_render();
        }
    }

    pub fn pause(&mut self) {
        self.state.lock().freeze();
        self.stop_ticker();
        self.stop_render();
        self.draw_waveform();
    }

    pub fn toggle_play(&mut self) {
        if self.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Jump to `time` seconds, clamped to the track
    pub fn seek(&mut self, time: f64) {
        let current_time = {
            let mut state = self.state.lock();
            state.position = time.clamp(0.0, state.duration);
            if state.anchor.is_some() {
                state.anchor = Some(Instant::now());
            }
            state.position
        };
        let _ = self.events.send(PlayerEvent::TimeUpdate { current_time });
        if !self.is_playing() {
            self.draw_waveform();
        }
    }

    /// Move the playhead by `seconds` (negative rewinds)
    pub fn skip(&mut self, seconds: f64) {
        let target = self.current_time() + seconds;
        self.seek(target);
    }

    pub fn skip_forward(&mut self) {
        self.skip(self.config.skip_seconds);
    }

    pub fn skip_backward(&mut self) {
        self.skip(-self.config.skip_seconds);
    }

    pub fn set_volume(&mut self, volume: f32) {
        let mut state = self.state.lock();
        state.volume = volume.clamp(0.0, 1.0);
        // Ненулевая громкость снимает mute
        if state.volume > 0.0 {
            state.muted = false;
        }
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.state.lock().muted = muted;
    }

    pub fn toggle_mute(&mut self) {
        let mut state = self.state.lock();
        state.muted = !state.muted;
    }

    /// Switch the visualisation. The spectrum loop only runs while playing.
    pub fn set_visual_mode(&mut self, mode: VisualMode) {
        {
            let mut state = self.state.lock();
            if state.mode == mode {
                return;
            }
            state.mode = mode;
        }
        self.stop_render();
        match mode {
            VisualMode::Spectrum if self.is_playing() => self.start_render(),
            VisualMode::Spectrum => {}
            VisualMode::Waveform => self.draw_waveform(),
        }
    }

    /// Stop playback and tear down all tasks
    pub fn destroy(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.state.lock().freeze();
        self.stop_ticker();
        self.stop_render();
    }

    fn draw_waveform(&self) {
        if let Some(surface) = &self.surface {
            let (time, duration) = {
                let state = self.state.lock();
                (state.current_time(), state.duration)
            };
            let progress = if duration > 0.0 { time / duration } else { 0.0 };
            surface.draw_waveform(&self.envelope, progress);
        }
    }

    fn start_ticker(&mut self) {
        self.stop_ticker();

        let state = self.state.clone();
        let events = self.events.clone();
        let envelope = self.envelope.clone();
        let surface = self.surface.clone();
        let period = Duration::from_millis(self.config.time_update_interval_ms.max(1));

        self.ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let (time, duration, finished, mode) = {
                    let mut state = state.lock();
                    let time = state.current_time();
                    let finished = time >= state.duration;
                    if finished {
                        state.position = state.duration;
                        state.anchor = None;
                    }
                    (time, state.duration, finished, state.mode)
                };

                let _ = events.send(PlayerEvent::TimeUpdate { current_time: time });
                if mode == VisualMode::Waveform {
                    if let Some(surface) = &surface {
                        let progress = if duration > 0.0 { time / duration } else { 0.0 };
                        surface.draw_waveform(&envelope, progress);
                    }
                }

                if finished {
                    let _ = events.send(PlayerEvent::Finished);
                    break;
                }
            }
        }));
    }

    fn stop_ticker(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }

    fn start_render(&mut self) {
        // Не больше одной задачи отрисовки на плеер
        self.stop_render();

        let Some(surface) = self.surface.clone() else {
            return;
        };
        let state = self.state.clone();
        let audio = self.audio.clone();
        let bars = self.config.spectrum_bars;
        let mut analyzer = SpectrumAnalyzer::new(self.config.fft_size);
        let period = Duration::from_millis(self.config.frame_interval_ms.max(1));

        self.render = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let time = {
                    let state = state.lock();
                    if !state.is_playing() || state.mode != VisualMode::Spectrum {
                        break;
                    }
                    state.current_time()
                };
                let frame = analyzer.bars_at(&audio, time, bars);
                surface.draw_spectrum(&frame);
            }
        }));
    }

    fn stop_render(&mut self) {
        if let Some(handle) = self.render.take() {
            handle.abort();
        }
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A mounted player: one live session at a time
pub struct Player {
    config: PlayerConfig,
    events: broadcast::Sender<PlayerEvent>,
    surface: Option<Arc<dyn VisualSurface>>,
    session: Option<PlaybackSession>,
}

impl Player {
    pub fn new(config: PlayerConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            config,
            events,
            surface: None,
            session: None,
        }
    }

    pub fn with_surface(mut self, surface: Arc<dyn VisualSurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Subscribe to events of the current and all future sessions
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    /// Decode `path` and bind the player to it
    pub async fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<&mut PlaybackSession> {
        let path = path.as_ref();
        // Старый сеанс закрываем до декодирования нового
        self.unload();
        let audio = decode_file(path).await?;
        Ok(self.load_decoded(path.display().to_string(), audio))
    }

    /// Bind the player to already decoded audio
    pub fn load_decoded(&mut self, source: impl Into<String>, audio: DecodedAudio) -> &mut PlaybackSession {
        self.unload();
        let source = source.into();
        info!("Loaded {} ({:.2} s)", source, audio.duration);
        self.session.insert(PlaybackSession::new(
            source,
            audio,
            self.config.clone(),
            self.events.clone(),
            self.surface.clone(),
        ))
    }

    /// Destroy the current session, if any
    pub fn unload(&mut self) {
        if let Some(session) = self.session.take() {
            debug!("Destroying session for {}", session.source());
            session.destroy();
        }
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Result<&mut PlaybackSession> {
        self.session
            .as_mut()
            .ok_or_else(|| AudioToolsError::Other("no media loaded".to_string()))
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.unload();
    }
}
