//! Core types for Anistream

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One encoded rendition of an episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSource {
    /// Quality label, e.g. "720p"
    pub quality: String,
    /// Direct media URL or third-party watch page
    pub url: String,
    /// Whether the viewer may download this rendition
    #[serde(default)]
    pub is_downloadable: bool,
}

impl VideoSource {
    pub fn new(quality: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            quality: quality.into(),
            url: url.into(),
            is_downloadable: false,
        }
    }

    /// Mark the source as downloadable
    pub fn with_downloadable(mut self, downloadable: bool) -> Self {
        self.is_downloadable = downloadable;
        self
    }
}

/// How a source has to be rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Playable by a native media element with full transport control
    Direct,
    /// Only reachable through a third-party iframe player
    Embedded,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Direct => write!(f, "direct"),
            SourceKind::Embedded => write!(f, "embedded"),
        }
    }
}

/// Transport state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackState {
    /// Source assigned, playback not started
    Idle,
    /// Media is playing
    Playing,
    /// Playback paused
    Paused,
    /// Elapsed time reached the duration
    Ended,
}

impl PlaybackState {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: PlaybackState) -> bool {
        use PlaybackState::*;
        matches!(
            (self, target),
            (Idle, Playing) | (Idle, Paused) |
            (Playing, Paused) | (Playing, Ended) |
            (Paused, Playing) | (Paused, Ended) |
            (Ended, Playing) |
            // A newly activated source always starts over
            (_, Idle)
        )
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing)
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Ended => write!(f, "ended"),
        }
    }
}

/// An episode within a season, with its resolved renditions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub id: i64,
    #[serde(alias = "episodeNumber")]
    pub number: u32,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub sources: Vec<VideoSource>,
}

impl Episode {
    pub fn new(id: i64, number: u32) -> Self {
        Self {
            id,
            number,
            title: None,
            sources: Vec::new(),
        }
    }

    pub fn with_sources(mut self, sources: Vec<VideoSource>) -> Self {
        self.sources = sources;
        self
    }
}

/// A watch-progress record sent to the persistence API
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub episode_id: i64,
    pub watched_seconds: f64,
    pub completed: bool,
}

/// Player configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Start playback as soon as metadata is loaded
    pub autoplay: bool,
    /// Seconds skipped by the arrow keys
    pub seek_step_secs: f64,
    /// Idle time before the controls overlay hides (milliseconds)
    pub controls_idle_timeout_ms: u64,
    /// How close to the end a tick counts as completion (seconds)
    pub completion_tolerance_secs: f64,
    /// Minimum media time between two progress reports (0 = every tick)
    pub progress_interval_secs: f64,
    /// Additional host names treated as embeddable players
    pub extra_embed_hosts: Vec<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            autoplay: true,
            seek_step_secs: 10.0,
            controls_idle_timeout_ms: 3000,
            completion_tolerance_secs: 1.0,
            progress_interval_secs: 0.0,
            extra_embed_hosts: Vec::new(),
        }
    }
}

impl PlayerConfig {
    /// Reject values the controller cannot work with
    pub fn validate(&self) -> Result<()> {
        let non_negative = |name: &str, value: f64| {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(Error::InvalidConfig(format!("{name} must be a non-negative number, got {value}")))
            }
        };
        non_negative("seek_step_secs", self.seek_step_secs)?;
        non_negative("completion_tolerance_secs", self.completion_tolerance_secs)?;
        non_negative("progress_interval_secs", self.progress_interval_secs)?;
        if self.controls_idle_timeout_ms == 0 {
            return Err(Error::InvalidConfig("controls_idle_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    /// Load a configuration from JSON
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: PlayerConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }
}
