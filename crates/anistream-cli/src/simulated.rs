//! Media element on a virtual clock
//!
//! Stands in for a real decoder: it remembers what the controller asked for
//! and produces the native events a player would raise, one per step.

use anistream_core::{MediaElement, MediaEvent, SourceToken};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct SimState {
    token: Option<SourceToken>,
    url: String,
    metadata_sent: bool,
    ended_sent: bool,
    playing: bool,
    position: f64,
}

/// Shared handle; one clone goes into the session, the other drives it
#[derive(Debug, Clone)]
pub struct SimulatedElement {
    state: Arc<Mutex<SimState>>,
    duration: f64,
    tick: f64,
}

impl SimulatedElement {
    pub fn new(duration: f64, tick: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::default())),
            duration,
            tick: tick.max(0.001),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn current_url(&self) -> Option<String> {
        let state = self.lock();
        state.token.map(|_| state.url.clone())
    }

    /// Advance the virtual clock by one step.
    ///
    /// Returns the event the element raises, or `None` while it is idle,
    /// paused or unloaded.
    pub fn step(&self) -> Option<(SourceToken, MediaEvent)> {
        let mut state = self.lock();
        let token = state.token?;

        if !state.metadata_sent {
            state.metadata_sent = true;
            return Some((token, MediaEvent::MetadataLoaded { duration: self.duration }));
        }
        if !state.playing {
            return None;
        }
        if state.position >= self.duration {
            if state.ended_sent {
                return None;
            }
            state.ended_sent = true;
            state.playing = false;
            return Some((token, MediaEvent::Ended));
        }
        state.position = (state.position + self.tick).min(self.duration);
        Some((token, MediaEvent::TimeUpdate { elapsed: state.position }))
    }
}

impl MediaElement for SimulatedElement {
    fn load(&mut self, url: &str, token: SourceToken) {
        let mut state = self.lock();
        state.token = Some(token);
        state.url = url.to_string();
        state.metadata_sent = false;
        state.ended_sent = false;
        state.playing = false;
        state.position = 0.0;
    }

    fn play(&mut self) {
        let mut state = self.lock();
        if state.token.is_some() {
            state.playing = true;
            state.ended_sent = false;
        }
    }

    fn pause(&mut self) {
        self.lock().playing = false;
    }

    fn seek(&mut self, seconds: f64) {
        self.lock().position = seconds;
    }

    fn set_volume(&mut self, _volume: f64) {}

    fn set_muted(&mut self, _muted: bool) {}

    fn request_fullscreen(&mut self) -> anistream_core::Result<()> {
        Err(anistream_core::Error::Fullscreen("headless player has no screen".into()))
    }

    fn exit_fullscreen(&mut self) -> anistream_core::Result<()> {
        Ok(())
    }

    fn unload(&mut self) {
        let mut state = self.lock();
        state.token = None;
        state.playing = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let mut element = SimulatedElement::new(10.0, 4.0);
        assert!(element.step().is_none());

        element.load("https://cdn.example.com/a.mp4", SourceToken(1));
        assert_eq!(
            element.step(),
            Some((SourceToken(1), MediaEvent::MetadataLoaded { duration: 10.0 }))
        );
        assert!(element.step().is_none());

        element.play();
        let elapsed: Vec<_> = std::iter::from_fn(|| element.step())
            .map(|(_, event)| event)
            .collect();
        assert_eq!(
            elapsed,
            [
                MediaEvent::TimeUpdate { elapsed: 4.0 },
                MediaEvent::TimeUpdate { elapsed: 8.0 },
                MediaEvent::TimeUpdate { elapsed: 10.0 },
                MediaEvent::Ended,
            ]
        );
        assert!(element.step().is_none());
    }

    #[test]
    fn test_reload_issues_new_token() {
        let mut element = SimulatedElement::new(10.0, 1.0);
        element.load("https://cdn.example.com/a.mp4", SourceToken(1));
        element.step();
        element.load("https://cdn.example.com/b.mp4", SourceToken(2));
        assert_eq!(element.current_url().as_deref(), Some("https://cdn.example.com/b.mp4"));
        assert!(matches!(element.step(), Some((SourceToken(2), MediaEvent::MetadataLoaded { .. }))));

        element.unload();
        assert!(element.current_url().is_none());
    }
}
