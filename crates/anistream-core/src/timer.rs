//! Owned timers
//!
//! Timer tasks belong to the struct that armed them: re-arming aborts the
//! previous task and dropping the owner aborts whatever is still pending.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

/// One-shot timer that restarts every time it is armed
#[derive(Debug)]
pub struct IdleTimer {
    timeout: Duration,
    handle: Option<JoinHandle<()>>,
}

impl IdleTimer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, handle: None }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `on_fire` after the timeout unless re-armed or cancelled first.
    /// Must be called from within a tokio runtime.
    pub fn arm<F>(&mut self, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();
        let timeout = self.timeout;
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            on_fire();
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            trace!("Idle timer cancelled");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for IdleTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Auto-hiding controls overlay
#[derive(Debug)]
pub struct ControlsVisibility {
    visible: Arc<AtomicBool>,
    timer: IdleTimer,
}

impl ControlsVisibility {
    /// Controls start visible and hide after `idle` without pointer movement
    pub fn new(idle: Duration) -> Self {
        let mut controls = Self {
            visible: Arc::new(AtomicBool::new(true)),
            timer: IdleTimer::new(idle),
        };
        controls.pointer_moved();
        controls
    }

    pub fn pointer_moved(&mut self) {
        self.visible.store(true, Ordering::SeqCst);
        let visible = Arc::clone(&self.visible);
        self.timer.arm(move || visible.store(false, Ordering::SeqCst));
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    /// Stop the hide timer, e.g. on unmount
    pub fn cancel(&mut self) {
        self.timer.cancel();
    }
}
