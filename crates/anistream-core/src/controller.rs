//! Playback Controller
//!
//! Owns the transport state of the single active media element:
//! - Idle / Playing / Paused / Ended state machine
//! - Seeking, volume and mute, fullscreen
//! - Quality switches that keep the playback position
//! - Stale event rejection through [`SourceToken`]s

use crate::{
    keyboard::PlayerCommand,
    media::{EventOutcome, MediaElement, MediaEvent, MediaFailure, SourceToken},
    source::embed_url,
    types::{PlaybackState, SourceKind, VideoSource},
    Error, Result,
};
use serde::Serialize;
use tracing::{debug, info, instrument, trace, warn};

/// What the playback view currently renders
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ViewMode {
    /// Nothing activated yet
    Empty,
    /// Native element with full transport control
    Direct,
    /// Third-party iframe; only episode navigation is available
    Embedded { embed_url: String },
    /// Terminal display state until the viewer picks another quality
    Unplayable { failure: MediaFailure },
}

/// Position to re-apply once a replacement source has loaded
#[derive(Debug, Clone, Copy)]
struct PendingRestore {
    elapsed: f64,
    resume: bool,
}

/// Point-in-time view of the controller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub quality: Option<String>,
    pub elapsed: f64,
    pub duration: Option<f64>,
    pub volume: f64,
    pub muted: bool,
    pub fullscreen: bool,
}

/// Transport controller for one media element
pub struct PlaybackController {
    element: Box<dyn MediaElement>,
    source: Option<VideoSource>,
    mode: ViewMode,
    state: PlaybackState,
    elapsed: f64,
    duration: Option<f64>,
    volume: f64,
    /// Volume restored when unmuting from a zero level
    last_audible_volume: f64,
    /// Explicit mute toggle, independent of a zero volume
    muted: bool,
    /// Set when `m` lifted a zero volume; the next `m` drops back to zero
    unmuted_from_zero: bool,
    fullscreen: bool,
    generation: u64,
    detached: bool,
    pending_restore: Option<PendingRestore>,
    autoplay: bool,
}

impl PlaybackController {
    pub fn new(element: Box<dyn MediaElement>, autoplay: bool) -> Self {
        Self {
            element,
            source: None,
            mode: ViewMode::Empty,
            state: PlaybackState::Idle,
            elapsed: 0.0,
            duration: None,
            volume: 1.0,
            last_audible_volume: 1.0,
            muted: false,
            unmuted_from_zero: false,
            fullscreen: false,
            generation: 0,
            detached: false,
            pending_restore: None,
            autoplay,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn mode(&self) -> &ViewMode {
        &self.mode
    }

    pub fn source(&self) -> Option<&VideoSource> {
        self.source.as_ref()
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Muted either explicitly or through a zero volume
    pub fn is_muted(&self) -> bool {
        self.muted || self.volume <= 0.0
    }

    /// Volume actually sent to the speakers
    pub fn effective_volume(&self) -> f64 {
        if self.is_muted() {
            0.0
        } else {
            self.volume
        }
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Token events for the active source must carry
    pub fn current_token(&self) -> SourceToken {
        SourceToken(self.generation)
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            state: self.state,
            quality: self.source.as_ref().map(|s| s.quality.clone()),
            elapsed: self.elapsed,
            duration: self.duration,
            volume: self.volume,
            muted: self.is_muted(),
            fullscreen: self.fullscreen,
        }
    }

    fn set_state(&mut self, new_state: PlaybackState) -> Result<()> {
        let current = self.state;
        if current == new_state {
            return Ok(());
        }
        if !current.can_transition_to(new_state) {
            return Err(Error::InvalidStateTransition {
                from: current.to_string(),
                to: new_state.to_string(),
            });
        }
        self.state = new_state;
        info!(from = %current, to = %new_state, position = self.elapsed, "State transition");
        Ok(())
    }

    fn next_token(&mut self) -> SourceToken {
        self.generation += 1;
        self.pending_restore = None;
        SourceToken(self.generation)
    }

    /// Start a fresh source from zero
    #[instrument(skip(self, source), fields(quality = %source.quality))]
    pub fn activate(&mut self, source: VideoSource, kind: SourceKind) -> SourceToken {
        let token = self.next_token();
        self.elapsed = 0.0;
        self.duration = None;
        let _ = self.set_state(PlaybackState::Idle);

        match kind {
            SourceKind::Direct => {
                self.element.load(&source.url, token);
                self.mode = ViewMode::Direct;
            }
            SourceKind::Embedded => {
                self.element.unload();
                let embed = embed_url(&source.url).unwrap_or_else(|| source.url.clone());
                self.mode = ViewMode::Embedded { embed_url: embed };
            }
        }
        info!(token = %token, kind = %kind, "Source activated");
        self.source = Some(source);
        token
    }

    /// Replace the source while keeping position and play/pause state
    #[instrument(skip(self, source), fields(quality = %source.quality))]
    pub fn switch_source(&mut self, source: VideoSource, kind: SourceKind) -> SourceToken {
        let keep_position = self.mode == ViewMode::Direct && kind == SourceKind::Direct;
        if !keep_position {
            return self.activate(source, kind);
        }

        let restore = PendingRestore {
            elapsed: self.elapsed,
            resume: self.state.is_playing(),
        };
        let token = self.next_token();
        self.pending_restore = Some(restore);
        self.element.load(&source.url, token);
        info!(token = %token, elapsed = restore.elapsed, resume = restore.resume, "Switching quality");
        self.source = Some(source);
        token
    }

    /// Show a terminal error instead of the player
    pub fn mark_unplayable(&mut self, failure: MediaFailure) {
        self.next_token();
        self.element.unload();
        let _ = self.set_state(PlaybackState::Idle);
        warn!(failure = %failure, "Source unplayable");
        self.mode = ViewMode::Unplayable { failure };
    }

    /// Stop accepting events. Any callback still in flight becomes a no-op.
    pub fn detach(&mut self) {
        if self.detached {
            return;
        }
        self.next_token();
        self.detached = true;
        self.element.pause();
        self.element.unload();
        debug!("Controller detached");
    }

    /// Apply a native media event
    pub fn handle_event(&mut self, token: SourceToken, event: MediaEvent) -> EventOutcome {
        if self.detached || token != self.current_token() {
            trace!(token = %token, current = %self.current_token(), "Ignoring stale media event");
            return EventOutcome::Stale;
        }

        match event {
            MediaEvent::MetadataLoaded { duration } => {
                self.on_metadata(duration);
                EventOutcome::Applied
            }
            MediaEvent::TimeUpdate { elapsed } => {
                if self.pending_restore.is_some() {
                    // Replacement source is still on its own timeline
                    return EventOutcome::Applied;
                }
                self.on_time_update(elapsed);
                EventOutcome::Position {
                    elapsed: self.elapsed,
                    duration: self.duration,
                }
            }
            MediaEvent::Ended => {
                if let Some(duration) = self.duration {
                    self.elapsed = duration;
                }
                let _ = self.set_state(PlaybackState::Ended);
                EventOutcome::Position {
                    elapsed: self.elapsed,
                    duration: self.duration,
                }
            }
            MediaEvent::PlayRejected { reason } => {
                warn!(reason = %reason, "Play request rejected");
                if matches!(self.state, PlaybackState::Playing | PlaybackState::Idle) {
                    let _ = self.set_state(PlaybackState::Paused);
                }
                EventOutcome::Applied
            }
            MediaEvent::Failed(failure) => {
                self.mark_unplayable(failure);
                EventOutcome::Failed
            }
        }
    }

    fn on_metadata(&mut self, duration: f64) {
        self.duration = (duration.is_finite() && duration > 0.0).then_some(duration);
        debug!(duration = ?self.duration, "Metadata loaded");

        if let Some(restore) = self.pending_restore.take() {
            let target = self.clamp_position(restore.elapsed);
            self.elapsed = target;
            self.element.seek(target);
            if restore.resume {
                self.element.play();
            }
            info!(elapsed = target, resume = restore.resume, "Position restored after quality switch");
        }

        if self.autoplay && self.state == PlaybackState::Idle {
            if let Err(err) = self.play() {
                debug!(error = %err, "Autoplay skipped");
            }
        }
    }

    fn on_time_update(&mut self, elapsed: f64) {
        if !elapsed.is_finite() {
            return;
        }
        self.elapsed = self.clamp_position(elapsed);
        if let Some(duration) = self.duration {
            if self.elapsed >= duration && self.state.is_playing() {
                let _ = self.set_state(PlaybackState::Ended);
            }
        }
    }

    fn clamp_position(&self, position: f64) -> f64 {
        match self.duration {
            Some(duration) => position.clamp(0.0, duration),
            None => position.max(0.0),
        }
    }

    fn require_direct(&self) -> Result<()> {
        if self.detached || self.mode != ViewMode::Direct {
            return Err(Error::NoPlayableSource);
        }
        Ok(())
    }

    /// Start playback. A later rejection moves the state back to Paused.
    #[instrument(skip(self))]
    pub fn play(&mut self) -> Result<()> {
        self.require_direct()?;

        if self.state == PlaybackState::Ended {
            let at_end = self.duration.map_or(true, |d| self.elapsed >= d);
            if at_end {
                self.elapsed = 0.0;
                self.element.seek(0.0);
            }
        }
        self.set_state(PlaybackState::Playing)?;
        self.element.play();
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn pause(&mut self) -> Result<()> {
        self.require_direct()?;
        if self.state.is_playing() {
            self.set_state(PlaybackState::Paused)?;
            self.element.pause();
        }
        Ok(())
    }

    /// Flip between playing and paused
    pub fn toggle_play(&mut self) {
        let result = if self.state.is_playing() {
            self.pause()
        } else {
            self.play()
        };
        if let Err(err) = result {
            debug!(error = %err, "Toggle play ignored");
        }
    }

    /// Seek to an absolute position, clamped to the media bounds
    #[instrument(skip(self))]
    pub fn seek(&mut self, target: f64) {
        let Some(duration) = self.duration else {
            debug!("Seek ignored before duration is known");
            return;
        };
        if self.require_direct().is_err() || target.is_nan() {
            return;
        }

        let clamped = target.clamp(0.0, duration);
        info!(from = self.elapsed, to = clamped, "Seeking");
        self.elapsed = clamped;
        self.element.seek(clamped);
    }

    /// Seek relative to the current position
    pub fn seek_by(&mut self, delta: f64) {
        self.seek(self.elapsed + delta);
    }

    /// Set the volume level, clamped to [0, 1]
    pub fn set_volume(&mut self, level: f64) {
        if level.is_nan() || self.detached {
            return;
        }
        let level = level.clamp(0.0, 1.0);
        self.volume = level;
        self.unmuted_from_zero = false;
        if level > 0.0 {
            self.last_audible_volume = level;
        }
        self.element.set_volume(level);
        debug!(volume = level, muted = self.is_muted(), "Volume changed");
    }

    /// Explicit mute; unmuting restores the last audible volume.
    /// Two presses in a row leave volume and mute state as they were.
    pub fn toggle_mute(&mut self) {
        if self.detached {
            return;
        }
        if self.unmuted_from_zero {
            self.unmuted_from_zero = false;
            self.volume = 0.0;
            self.element.set_volume(0.0);
        } else if self.is_muted() {
            self.muted = false;
            if self.volume <= 0.0 {
                self.volume = self.last_audible_volume;
                self.unmuted_from_zero = true;
                self.element.set_volume(self.volume);
            }
            self.element.set_muted(false);
        } else {
            self.muted = true;
            self.element.set_muted(true);
        }
        debug!(muted = self.is_muted(), volume = self.volume, "Mute toggled");
    }

    /// Enter or leave fullscreen. Failures leave the state unchanged.
    pub fn toggle_fullscreen(&mut self) {
        if self.detached {
            return;
        }
        let result = if self.fullscreen {
            self.element.exit_fullscreen()
        } else {
            self.element.request_fullscreen()
        };
        match result {
            Ok(()) => self.fullscreen = !self.fullscreen,
            Err(err) => debug!(error = %err, "Fullscreen change refused"),
        }
    }

    /// Run a transport command. Episode navigation is handled by the session.
    pub fn apply(&mut self, command: PlayerCommand) {
        if matches!(self.mode, ViewMode::Embedded { .. }) && !command.is_coarse() {
            trace!(?command, "Transport command ignored for embedded source");
            return;
        }
        match command {
            PlayerCommand::TogglePlay => self.toggle_play(),
            PlayerCommand::ToggleFullscreen => self.toggle_fullscreen(),
            PlayerCommand::ToggleMute => self.toggle_mute(),
            PlayerCommand::SeekBy(delta) => self.seek_by(delta),
            PlayerCommand::NextEpisode | PlayerCommand::PreviousEpisode => {}
        }
    }
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("elapsed", &self.elapsed)
            .field("duration", &self.duration)
            .field("generation", &self.generation)
            .field("detached", &self.detached)
            .finish()
    }
}
