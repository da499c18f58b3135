//! Progress Reporter
//!
//! Turns the controller's position stream into discrete watch-progress
//! records. Records are queued on a channel and uploaded by a background
//! task; the player never waits for, or learns about, upload failures.

use crate::types::{PlayerConfig, ProgressReport};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Who is watching
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Viewer {
    /// Progress is not persisted
    Anonymous,
    Authenticated { token: String },
}

impl Viewer {
    /// Build from an optional bearer token; blank tokens count as anonymous
    pub fn from_token(token: Option<String>) -> Self {
        match token {
            Some(token) if !token.trim().is_empty() => Viewer::Authenticated { token },
            _ => Viewer::Anonymous,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Viewer::Authenticated { .. })
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            Viewer::Authenticated { token } => Some(token),
            Viewer::Anonymous => None,
        }
    }
}

/// Persistence collaborator for progress reports
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn submit(&self, report: &ProgressReport) -> Result<()>;
}

/// Result of one time-update tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressOutcome {
    /// Nothing was queued
    Skipped,
    /// A regular progress report was queued
    Reported,
    /// Completion was observed for the first time
    Completed,
}

/// Queue feeding a [`ProgressUploader`]
pub fn progress_channel() -> (
    mpsc::UnboundedSender<ProgressReport>,
    mpsc::UnboundedReceiver<ProgressReport>,
) {
    mpsc::unbounded_channel()
}

/// Per-episode progress tracker
#[derive(Debug)]
pub struct ProgressReporter {
    episode_id: i64,
    persist: bool,
    tx: mpsc::UnboundedSender<ProgressReport>,
    completed: bool,
    tolerance: f64,
    interval: f64,
    last_reported: Option<f64>,
}

impl ProgressReporter {
    pub fn new(
        episode_id: i64,
        viewer: &Viewer,
        tx: mpsc::UnboundedSender<ProgressReport>,
        config: &PlayerConfig,
    ) -> Self {
        Self {
            episode_id,
            persist: viewer.is_authenticated(),
            tx,
            completed: false,
            tolerance: config.completion_tolerance_secs,
            interval: config.progress_interval_secs,
            last_reported: None,
        }
    }

    pub fn episode_id(&self) -> i64 {
        self.episode_id
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Start tracking another episode
    pub fn restart(&mut self, episode_id: i64) {
        self.episode_id = episode_id;
        self.completed = false;
        self.last_reported = None;
    }

    /// Feed one position update
    pub fn on_time_update(&mut self, elapsed: f64, duration: Option<f64>) -> ProgressOutcome {
        if self.completed || !elapsed.is_finite() {
            return ProgressOutcome::Skipped;
        }

        let reached_end = duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .is_some_and(|d| elapsed >= d - self.tolerance);
        if reached_end {
            self.completed = true;
            info!(episode_id = self.episode_id, elapsed, "Episode completed");
            self.queue(elapsed, true);
            return ProgressOutcome::Completed;
        }

        if let Some(last) = self.last_reported {
            if self.interval > 0.0 && (elapsed - last).abs() < self.interval {
                return ProgressOutcome::Skipped;
            }
        }
        if self.queue(elapsed, false) {
            ProgressOutcome::Reported
        } else {
            ProgressOutcome::Skipped
        }
    }

    fn queue(&mut self, elapsed: f64, completed: bool) -> bool {
        if !self.persist {
            trace!(episode_id = self.episode_id, "Anonymous viewer, progress not persisted");
            return false;
        }
        let report = ProgressReport {
            episode_id: self.episode_id,
            watched_seconds: elapsed,
            completed,
        };
        self.last_reported = Some(elapsed);
        if self.tx.send(report).is_err() {
            debug!(episode_id = self.episode_id, "Progress uploader gone, report dropped");
        }
        true
    }
}

/// Upload counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadStats {
    pub sent: u64,
    pub failed: u64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Background task draining the report queue into a [`ProgressSink`]
pub struct ProgressUploader {
    sink: Arc<dyn ProgressSink>,
    stats: Arc<RwLock<UploadStats>>,
}

impl ProgressUploader {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            sink,
            stats: Arc::new(RwLock::new(UploadStats::default())),
        }
    }

    /// Shared view of the counters
    pub fn stats(&self) -> Arc<RwLock<UploadStats>> {
        Arc::clone(&self.stats)
    }

    /// Drain until every sender is dropped
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<ProgressReport>) {
        while let Some(report) = rx.recv().await {
            match self.sink.submit(&report).await {
                Ok(()) => {
                    let mut stats = self.stats.write().await;
                    stats.sent += 1;
                    stats.last_success_at = Some(Utc::now());
                    debug!(
                        episode_id = report.episode_id,
                        watched = report.watched_seconds,
                        completed = report.completed,
                        "Progress saved"
                    );
                }
                Err(err) => {
                    let mut stats = self.stats.write().await;
                    stats.failed += 1;
                    stats.last_error = Some(err.to_string());
                    warn!(
                        episode_id = report.episode_id,
                        code = err.error_code(),
                        error = %err,
                        "Progress submission failed"
                    );
                }
            }
        }
    }

    /// Run on the current tokio runtime
    pub fn spawn(self, rx: mpsc::UnboundedReceiver<ProgressReport>) -> JoinHandle<()> {
        tokio::spawn(self.run(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::Mutex;

    fn authed() -> Viewer {
        Viewer::Authenticated { token: "secret".into() }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressReport>) -> Vec<ProgressReport> {
        let mut out = Vec::new();
        while let Ok(report) = rx.try_recv() {
            out.push(report);
        }
        out
    }

    #[test]
    fn test_reports_every_tick() {
        let (tx, mut rx) = progress_channel();
        let mut reporter = ProgressReporter::new(5, &authed(), tx, &PlayerConfig::default());
        assert_eq!(reporter.on_time_update(1.0, Some(100.0)), ProgressOutcome::Reported);
        assert_eq!(reporter.on_time_update(1.25, Some(100.0)), ProgressOutcome::Reported);
        let reports = drain(&mut rx);
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.episode_id == 5 && !r.completed));
    }

    #[test]
    fn test_completion_once() {
        let (tx, mut rx) = progress_channel();
        let mut reporter = ProgressReporter::new(5, &authed(), tx, &PlayerConfig::default());
        assert_eq!(reporter.on_time_update(99.2, Some(100.0)), ProgressOutcome::Completed);
        assert_eq!(reporter.on_time_update(99.6, Some(100.0)), ProgressOutcome::Skipped);
        assert_eq!(reporter.on_time_update(100.0, Some(100.0)), ProgressOutcome::Skipped);
        let completed: Vec<_> = drain(&mut rx).into_iter().filter(|r| r.completed).collect();
        assert_eq!(completed.len(), 1);
    }

    #[test]
    fn test_anonymous_never_queues_but_completes() {
        let (tx, mut rx) = progress_channel();
        let mut reporter = ProgressReporter::new(5, &Viewer::Anonymous, tx, &PlayerConfig::default());
        assert_eq!(reporter.on_time_update(10.0, Some(100.0)), ProgressOutcome::Skipped);
        assert_eq!(reporter.on_time_update(99.5, Some(100.0)), ProgressOutcome::Completed);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_unknown_duration_never_completes() {
        let (tx, _rx) = progress_channel();
        let mut reporter = ProgressReporter::new(5, &authed(), tx, &PlayerConfig::default());
        assert_eq!(reporter.on_time_update(5000.0, None), ProgressOutcome::Reported);
        assert!(!reporter.is_completed());
    }

    #[test]
    fn test_interval_throttles() {
        let (tx, mut rx) = progress_channel();
        let config = PlayerConfig { progress_interval_secs: 5.0, ..Default::default() };
        let mut reporter = ProgressReporter::new(5, &authed(), tx, &config);
        reporter.on_time_update(0.0, Some(100.0));
        reporter.on_time_update(2.0, Some(100.0));
        reporter.on_time_update(5.5, Some(100.0));
        let watched: Vec<_> = drain(&mut rx).iter().map(|r| r.watched_seconds).collect();
        assert_eq!(watched, [0.0, 5.5]);
    }

    #[test]
    fn test_viewer_from_token() {
        assert_eq!(Viewer::from_token(None), Viewer::Anonymous);
        assert_eq!(Viewer::from_token(Some("  ".into())), Viewer::Anonymous);
        assert!(Viewer::from_token(Some("abc".into())).is_authenticated());
    }

    struct FlakySink {
        seen: Mutex<Vec<ProgressReport>>,
    }

    #[async_trait]
    impl ProgressSink for FlakySink {
        async fn submit(&self, report: &ProgressReport) -> Result<()> {
            self.seen.lock().unwrap().push(*report);
            if report.completed {
                Err(Error::Api { url: "https://api.example.com/progress".into(), status: 500 })
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_uploader_counts_and_swallows_failures() {
        let sink = Arc::new(FlakySink { seen: Mutex::new(Vec::new()) });
        let uploader = ProgressUploader::new(sink.clone());
        let stats = uploader.stats();
        let (tx, rx) = progress_channel();
        let handle = uploader.spawn(rx);

        tx.send(ProgressReport { episode_id: 1, watched_seconds: 3.0, completed: false }).unwrap();
        tx.send(ProgressReport { episode_id: 1, watched_seconds: 99.5, completed: true }).unwrap();
        drop(tx);
        handle.await.unwrap();

        let stats = stats.read().await;
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.failed, 1);
        assert!(stats.last_success_at.is_some());
        assert_eq!(sink.seen.lock().unwrap().len(), 2);
    }
}
