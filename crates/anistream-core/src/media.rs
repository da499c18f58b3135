//! Media element seam
//!
//! The controller never talks to a concrete player. Hosts implement
//! [`MediaElement`] over whatever actually decodes video (a browser
//! `<video>` element, a desktop pipeline, a simulation) and feed the
//! element's native events back tagged with the [`SourceToken`] they were
//! issued for.

use crate::Result;
use serde::{Deserialize, Serialize};

/// Identity of one source activation.
///
/// Every load hands out a fresh token; events carrying an older token
/// belong to a replaced source and are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceToken(pub u64);

impl std::fmt::Display for SourceToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The single playback element owned by a controller
pub trait MediaElement: Send {
    /// Replace the current media with `url`
    fn load(&mut self, url: &str, token: SourceToken);

    /// Start playback. Rejection arrives later as [`MediaEvent::PlayRejected`].
    fn play(&mut self);

    fn pause(&mut self);

    fn seek(&mut self, seconds: f64);

    fn set_volume(&mut self, volume: f64);

    fn set_muted(&mut self, muted: bool);

    fn request_fullscreen(&mut self) -> Result<()>;

    fn exit_fullscreen(&mut self) -> Result<()>;

    /// Release the media; no further events are expected
    fn unload(&mut self) {}
}

/// Native events raised by a media element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MediaEvent {
    /// Duration became known
    MetadataLoaded { duration: f64 },
    /// Playback position moved
    TimeUpdate { elapsed: f64 },
    /// The element reached the end of the media
    Ended,
    /// A play request was refused (autoplay policy, interrupted load)
    PlayRejected { reason: String },
    /// The media could not be loaded or decoded
    Failed(MediaFailure),
}

/// Why a source is unplayable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum MediaFailure {
    /// The episode has no sources at all
    NoSource,
    Network(String),
    UnsupportedFormat(String),
    Decode(String),
}

impl std::fmt::Display for MediaFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaFailure::NoSource => write!(f, "no playable source"),
            MediaFailure::Network(detail) => write!(f, "network error: {detail}"),
            MediaFailure::UnsupportedFormat(detail) => write!(f, "unsupported format: {detail}"),
            MediaFailure::Decode(detail) => write!(f, "decode error: {detail}"),
        }
    }
}

/// Outcome of feeding an event to the controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventOutcome {
    /// Event belonged to a replaced source or a detached view
    Stale,
    /// Event was applied
    Applied,
    /// Position update applied; carries the values for progress tracking
    Position { elapsed: f64, duration: Option<f64> },
    /// Media failed; the view is now unplayable
    Failed,
}
