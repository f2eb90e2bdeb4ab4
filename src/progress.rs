//! Progress reporting for long-running conversion jobs.
//!
//! The pipeline drives a [`ProgressTracker`] through the [`ConversionStep`]s of a
//! job; every update is pushed to the caller-supplied [`ProgressObserver`].

use serde::{Deserialize, Serialize};

/// Snapshot of a job's progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressInfo {
    /// Current step of the job
    pub step: String,
    /// Completion of the current step (0.0 - 100.0)
    pub step_progress: f32,
    /// Completion of the whole job (0.0 - 100.0)
    pub total_progress: f32,
    /// Free-form details
    pub details: Option<String>,
}

impl ProgressInfo {
    pub fn new(step: impl Into<String>, step_progress: f32, total_progress: f32, details: Option<String>) -> Self {
        Self {
            step: step.into(),
            step_progress: step_progress.clamp(0.0, 100.0),
            total_progress: total_progress.clamp(0.0, 100.0),
            details,
        }
    }
}

/// Receives progress updates
pub trait ProgressObserver: Send + Sync {
    fn on_progress_update(&self, progress: ProgressInfo);
}

/// Steps of a conversion job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversionStep {
    /// Locating or downloading the engine
    LoadingEngine,
    /// Writing inputs into the engine working namespace
    StagingFiles,
    /// The engine is running
    Encoding,
    /// Reading back the output
    Collecting,
}

impl ConversionStep {
    const ORDER: [ConversionStep; 4] = [
        Self::LoadingEngine,
        Self::StagingFiles,
        Self::Encoding,
        Self::Collecting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoadingEngine => "Loading engine",
            Self::StagingFiles => "Staging files",
            Self::Encoding => "Encoding",
            Self::Collecting => "Collecting output",
        }
    }

    /// Share of the whole job, in percent
    pub fn weight(&self) -> f32 {
        match self {
            Self::LoadingEngine => 10.0,
            Self::StagingFiles => 5.0,
            Self::Encoding => 80.0,
            Self::Collecting => 5.0,
        }
    }

    fn index(&self) -> usize {
        Self::ORDER.iter().position(|s| s == self).unwrap_or(0)
    }
}

/// Tracks the progress of a single job and forwards it to an observer.
///
/// Steps only move forward; earlier steps count as complete once a later one starts.
pub struct ProgressTracker<'a> {
    observer: Option<&'a dyn ProgressObserver>,
    current_step: ConversionStep,
    step_progress: f32,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(observer: Option<&'a dyn ProgressObserver>) -> Self {
        Self {
            observer,
            current_step: ConversionStep::LoadingEngine,
            step_progress: 0.0,
        }
    }

    pub fn current_step(&self) -> ConversionStep {
        self.current_step
    }

    /// Move to `step` and report it with zero step progress
    pub fn set_step(&mut self, step: ConversionStep) {
        if step.index() < self.current_step.index() {
            return;
        }
        self.current_step = step;
        self.step_progress = 0.0;
        self.report(None);
    }

    /// Update the current step's progress (0.0 - 100.0)
    pub fn update_step_progress(&mut self, progress: f32, details: Option<String>) {
        self.step_progress = progress.clamp(0.0, 100.0);
        self.report(details);
    }

    /// Overall progress in percent
    pub fn total_progress(&self) -> f32 {
        let done: f32 = ConversionStep::ORDER[..self.current_step.index()]
            .iter()
            .map(|s| s.weight())
            .sum();
        (done + self.current_step.weight() * self.step_progress / 100.0).clamp(0.0, 100.0)
    }

    /// Mark the job as finished
    pub fn complete(&mut self) {
        self.current_step = ConversionStep::Collecting;
        self.step_progress = 100.0;
        self.report(Some("Done".to_string()));
    }

    fn report(&self, details: Option<String>) {
        if let Some(observer) = self.observer {
            observer.on_progress_update(ProgressInfo::new(
                self.current_step.as_str(),
                self.step_progress,
                self.total_progress(),
                details,
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct TestObserver {
        updates: Arc<Mutex<Vec<ProgressInfo>>>,
    }

    impl TestObserver {
        fn new() -> (Self, Arc<Mutex<Vec<ProgressInfo>>>) {
            let updates = Arc::new(Mutex::new(Vec::new()));
            (Self { updates: updates.clone() }, updates)
        }
    }

    impl ProgressObserver for TestObserver {
        fn on_progress_update(&self, progress: ProgressInfo) {
            self.updates.lock().unwrap().push(progress);
        }
    }

    #[test]
    fn test_progress_tracker() {
        let (observer, updates) = TestObserver::new();
        let mut tracker = ProgressTracker::new(Some(&observer));

        tracker.update_step_progress(50.0, None);
        {
            let updates = updates.lock().unwrap();
            assert_eq!(updates.len(), 1);
            assert_eq!(updates[0].step, ConversionStep::LoadingEngine.as_str());
            assert_eq!(updates[0].total_progress, 5.0);
        }

        tracker.set_step(ConversionStep::Encoding);
        tracker.update_step_progress(50.0, None);
        {
            let updates = updates.lock().unwrap();
            assert_eq!(updates.len(), 3);
            assert_eq!(updates[1].step_progress, 0.0);
            assert_eq!(updates[2].total_progress, 55.0);
        }

        tracker.complete();
        let updates = updates.lock().unwrap();
        assert_eq!(updates.last().unwrap().total_progress, 100.0);
    }

    #[test]
    fn test_steps_do_not_go_back() {
        let mut tracker = ProgressTracker::new(None);
        tracker.set_step(ConversionStep::Encoding);
        tracker.set_step(ConversionStep::StagingFiles);
        assert_eq!(tracker.current_step(), ConversionStep::Encoding);
    }

    #[test]
    fn test_weights_sum_to_hundred() {
        let total: f32 = ConversionStep::ORDER.iter().map(|s| s.weight()).sum();
        assert_eq!(total, 100.0);
    }
}
