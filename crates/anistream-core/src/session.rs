//! Player Session - orchestrates one viewer watching one season
//!
//! Coordinates:
//! - Source selection for the open episode
//! - Transport through the [`PlaybackController`]
//! - Progress reporting and auto-advance on completion
//! - Keyboard navigation between sibling episodes
//!
//! [`PlaybackView`] is the mounted form of a session: it owns the key
//! subscription and the controls timer, and tears both down on unmount.

use crate::{
    bus::{EventBus, Subscription},
    controller::{PlaybackController, ViewMode},
    episodes::EpisodeList,
    keyboard::{Key, KeyBindings, PlayerCommand},
    media::{EventOutcome, MediaElement, MediaEvent, MediaFailure, SourceToken},
    progress::{ProgressOutcome, ProgressReporter, Viewer},
    source::{find_quality, rank, SourceClassifier},
    timer::ControlsVisibility,
    types::{PlayerConfig, ProgressReport, SessionId, SourceKind, VideoSource},
    Error, Result,
};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// Key presses from the host, one bus per page
pub type KeyBus = EventBus<Key>;

/// Things the playback view shows to the viewer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum PlayerNotice {
    EpisodeLoaded {
        episode_id: i64,
        quality: String,
        kind: SourceKind,
    },
    QualityChanged {
        quality: String,
    },
    /// Completion moved playback to the next episode
    AdvancedTo {
        episode_id: i64,
        number: u32,
    },
    /// Last episode of the season finished
    EndOfContent {
        episode_id: i64,
    },
    Unplayable {
        episode_id: i64,
        failure: MediaFailure,
    },
}

/// Player session for one season
pub struct PlayerSession {
    id: SessionId,
    config: PlayerConfig,
    controller: PlaybackController,
    classifier: SourceClassifier,
    bindings: KeyBindings,
    reporter: ProgressReporter,
    episodes: EpisodeList,
    current: Option<i64>,
    ranked: Vec<VideoSource>,
    notices: EventBus<PlayerNotice>,
}

impl PlayerSession {
    pub fn new(
        element: Box<dyn MediaElement>,
        episodes: EpisodeList,
        viewer: &Viewer,
        progress_tx: mpsc::UnboundedSender<ProgressReport>,
        config: PlayerConfig,
    ) -> Self {
        let first = episodes.iter().next().map_or(0, |episode| episode.id);
        Self {
            id: SessionId::new(),
            controller: PlaybackController::new(element, config.autoplay),
            classifier: SourceClassifier::with_extra_hosts(config.extra_embed_hosts.clone()),
            bindings: KeyBindings::new(config.seek_step_secs),
            reporter: ProgressReporter::new(first, viewer, progress_tx, &config),
            episodes,
            current: None,
            ranked: Vec::new(),
            notices: EventBus::new(),
            config,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut PlaybackController {
        &mut self.controller
    }

    pub fn episodes(&self) -> &EpisodeList {
        &self.episodes
    }

    pub fn current_episode(&self) -> Option<i64> {
        self.current
    }

    /// Sources of the open episode, best first
    pub fn ranked_sources(&self) -> &[VideoSource] {
        &self.ranked
    }

    /// Listen for viewer-facing notices
    pub fn subscribe_notices(&self) -> Subscription<PlayerNotice> {
        self.notices.subscribe()
    }

    /// Store fetched renditions for an episode
    pub fn set_sources(&mut self, episode_id: i64, sources: Vec<VideoSource>) -> bool {
        self.episodes.set_sources(episode_id, sources)
    }

    /// Open an episode on its default source.
    ///
    /// An episode without sources is not an error: the view switches to
    /// the unplayable state and the viewer can still navigate away.
    #[instrument(skip(self))]
    pub fn open_episode(&mut self, episode_id: i64) -> Result<SourceToken> {
        let episode = self
            .episodes
            .get(episode_id)
            .ok_or(Error::EpisodeNotFound { episode_id })?;
        self.ranked = rank(&episode.sources);
        self.current = Some(episode_id);
        self.reporter.restart(episode_id);

        let Some(source) = self.ranked.first().cloned() else {
            self.controller.mark_unplayable(MediaFailure::NoSource);
            self.notices.publish(PlayerNotice::Unplayable {
                episode_id,
                failure: MediaFailure::NoSource,
            });
            return Ok(self.controller.current_token());
        };

        let kind = self.classifier.classify(&source);
        let quality = source.quality.clone();
        let token = self.controller.activate(source, kind);
        info!(session_id = %self.id, episode_id, quality = %quality, kind = %kind, "Episode opened");
        self.notices.publish(PlayerNotice::EpisodeLoaded { episode_id, quality, kind });
        Ok(token)
    }

    /// Change rendition mid-playback, keeping position and play state
    #[instrument(skip(self))]
    pub fn switch_quality(&mut self, quality: &str) -> Result<SourceToken> {
        let source = find_quality(&self.ranked, quality)
            .cloned()
            .ok_or_else(|| Error::UnknownQuality { quality: quality.to_string() })?;
        let kind = self.classifier.classify(&source);
        let label = source.quality.clone();
        let token = self.controller.switch_source(source, kind);
        self.notices.publish(PlayerNotice::QualityChanged { quality: label });
        Ok(token)
    }

    /// Route a native media event through the controller and the reporter
    pub fn handle_media_event(&mut self, token: SourceToken, event: MediaEvent) -> EventOutcome {
        let outcome = self.controller.handle_event(token, event);
        let Some(episode_id) = self.current else {
            return outcome;
        };

        match outcome {
            EventOutcome::Position { elapsed, duration } => {
                if self.reporter.on_time_update(elapsed, duration) == ProgressOutcome::Completed {
                    self.on_completed(episode_id);
                }
            }
            EventOutcome::Failed => {
                if let ViewMode::Unplayable { failure } = self.controller.mode() {
                    self.notices.publish(PlayerNotice::Unplayable {
                        episode_id,
                        failure: failure.clone(),
                    });
                }
            }
            EventOutcome::Stale | EventOutcome::Applied => {}
        }
        outcome
    }

    fn on_completed(&mut self, episode_id: i64) {
        let next = self
            .episodes
            .next_after(episode_id)
            .map(|episode| (episode.id, episode.number));
        match next {
            Some((next_id, number)) => {
                info!(session_id = %self.id, from = episode_id, to = next_id, "Auto-advancing");
                if self.open_episode(next_id).is_ok() {
                    self.notices.publish(PlayerNotice::AdvancedTo { episode_id: next_id, number });
                }
            }
            None => {
                info!(session_id = %self.id, episode_id, "End of season reached");
                self.notices.publish(PlayerNotice::EndOfContent { episode_id });
            }
        }
    }

    /// Apply a key press. Returns the command it mapped to, if any.
    pub fn handle_key(&mut self, key: Key) -> Option<PlayerCommand> {
        let command = self.bindings.command_for(key)?;
        match command {
            PlayerCommand::NextEpisode => {
                self.next_episode();
            }
            PlayerCommand::PreviousEpisode => {
                self.previous_episode();
            }
            other => self.controller.apply(other),
        }
        Some(command)
    }

    /// Open the following episode, if there is one
    pub fn next_episode(&mut self) -> Option<i64> {
        let target = self
            .current
            .and_then(|id| self.episodes.next_after(id))
            .map(|episode| episode.id);
        self.navigate(target)
    }

    /// Open the preceding episode, if there is one
    pub fn previous_episode(&mut self) -> Option<i64> {
        let target = self
            .current
            .and_then(|id| self.episodes.previous_before(id))
            .map(|episode| episode.id);
        self.navigate(target)
    }

    fn navigate(&mut self, target: Option<i64>) -> Option<i64> {
        let Some(episode_id) = target else {
            debug!(current = ?self.current, "No adjacent episode");
            return None;
        };
        match self.open_episode(episode_id) {
            Ok(_) => Some(episode_id),
            Err(err) => {
                warn!(episode_id, error = %err, "Navigation failed");
                None
            }
        }
    }
}

impl std::fmt::Debug for PlayerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerSession")
            .field("id", &self.id)
            .field("current", &self.current)
            .field("controller", &self.controller)
            .finish()
    }
}

/// A session attached to a page
#[derive(Debug)]
pub struct PlaybackView {
    session: PlayerSession,
    keys: Option<Subscription<Key>>,
    controls: ControlsVisibility,
}

impl PlaybackView {
    /// Attach to the page: start listening for keys and show the controls.
    /// Must be called from within a tokio runtime.
    pub fn mount(session: PlayerSession, keys: &KeyBus) -> Self {
        let idle = Duration::from_millis(session.config.controls_idle_timeout_ms);
        debug!(session_id = %session.id, "Playback view mounted");
        Self {
            keys: Some(keys.subscribe()),
            controls: ControlsVisibility::new(idle),
            session,
        }
    }

    pub fn session(&self) -> &PlayerSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut PlayerSession {
        &mut self.session
    }

    pub fn is_mounted(&self) -> bool {
        self.keys.is_some()
    }

    /// Apply every key press queued since the last pump
    pub fn pump_keys(&mut self) -> usize {
        let Some(keys) = self.keys.as_mut() else {
            return 0;
        };
        let pressed = keys.drain();
        for key in &pressed {
            self.session.handle_key(*key);
        }
        pressed.len()
    }

    pub fn pointer_moved(&mut self) {
        if self.is_mounted() {
            self.controls.pointer_moved();
        }
    }

    pub fn controls_visible(&self) -> bool {
        self.controls.is_visible()
    }

    /// Detach from the page. Late media callbacks become no-ops.
    pub fn unmount(&mut self) {
        if self.keys.take().is_none() {
            return;
        }
        self.controls.cancel();
        self.session.controller.detach();
        debug!(session_id = %self.session.id, "Playback view unmounted");
    }
}

impl Drop for PlaybackView {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::progress_channel;
    use crate::types::{Episode, PlaybackState};

    struct NullElement;

    impl MediaElement for NullElement {
        fn load(&mut self, _url: &str, _token: SourceToken) {}
        fn play(&mut self) {}
        fn pause(&mut self) {}
        fn seek(&mut self, _seconds: f64) {}
        fn set_volume(&mut self, _volume: f64) {}
        fn set_muted(&mut self, _muted: bool) {}
        fn request_fullscreen(&mut self) -> Result<()> {
            Ok(())
        }
        fn exit_fullscreen(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn season() -> EpisodeList {
        EpisodeList::new(vec![
            Episode::new(1, 1).with_sources(vec![
                VideoSource::new("480p", "https://cdn.example.com/1-480.mp4"),
                VideoSource::new("1080p", "https://cdn.example.com/1-1080.mp4"),
            ]),
            Episode::new(2, 2).with_sources(vec![VideoSource::new("720p", "https://cdn.example.com/2-720.mp4")]),
            Episode::new(3, 3),
        ])
    }

    fn session() -> PlayerSession {
        let (tx, _rx) = progress_channel();
        PlayerSession::new(Box::new(NullElement), season(), &Viewer::Anonymous, tx, PlayerConfig::default())
    }

    #[test]
    fn test_open_picks_best_quality() {
        let mut session = session();
        let mut notices = session.subscribe_notices();
        session.open_episode(1).unwrap();
        assert_eq!(session.controller().source().unwrap().quality, "1080p");
        assert_eq!(
            notices.try_next(),
            Some(PlayerNotice::EpisodeLoaded { episode_id: 1, quality: "1080p".into(), kind: SourceKind::Direct })
        );
    }

    #[test]
    fn test_open_without_sources_is_unplayable() {
        let mut session = session();
        let mut notices = session.subscribe_notices();
        session.open_episode(3).unwrap();
        assert_eq!(
            notices.try_next(),
            Some(PlayerNotice::Unplayable { episode_id: 3, failure: MediaFailure::NoSource })
        );
        assert!(session.previous_episode().is_some());
    }

    #[test]
    fn test_unknown_episode_and_quality() {
        let mut session = session();
        assert!(matches!(session.open_episode(42), Err(Error::EpisodeNotFound { episode_id: 42 })));
        session.open_episode(1).unwrap();
        assert!(matches!(session.switch_quality("4k"), Err(Error::UnknownQuality { .. })));
    }

    #[test]
    fn test_completion_advances() {
        let mut session = session();
        let mut notices = session.subscribe_notices();
        let token = session.open_episode(1).unwrap();
        session.handle_media_event(token, MediaEvent::MetadataLoaded { duration: 60.0 });
        session.handle_media_event(token, MediaEvent::TimeUpdate { elapsed: 59.5 });

        assert_eq!(session.current_episode(), Some(2));
        assert!(notices.drain().contains(&PlayerNotice::AdvancedTo { episode_id: 2, number: 2 }));
        assert_eq!(session.controller().state(), PlaybackState::Idle);
    }

    #[test]
    fn test_last_episode_ends() {
        let (tx, _rx) = progress_channel();
        let episodes = EpisodeList::new(vec![
            Episode::new(7, 1).with_sources(vec![VideoSource::new("720p", "https://cdn.example.com/7.mp4")]),
        ]);
        let mut session = PlayerSession::new(Box::new(NullElement), episodes, &Viewer::Anonymous, tx, PlayerConfig::default());
        let mut notices = session.subscribe_notices();
        let token = session.open_episode(7).unwrap();
        session.handle_media_event(token, MediaEvent::MetadataLoaded { duration: 30.0 });
        session.handle_media_event(token, MediaEvent::Ended);

        assert_eq!(session.controller().state(), PlaybackState::Ended);
        assert!(notices.drain().contains(&PlayerNotice::EndOfContent { episode_id: 7 }));
    }

    #[test]
    fn test_keys_navigate() {
        let mut session = session();
        session.open_episode(1).unwrap();
        assert_eq!(session.handle_key(Key::Char('n')), Some(PlayerCommand::NextEpisode));
        assert_eq!(session.current_episode(), Some(2));
        session.handle_key(Key::Char('p'));
        assert_eq!(session.current_episode(), Some(1));
        session.handle_key(Key::Char('p'));
        assert_eq!(session.current_episode(), Some(1));
        assert_eq!(session.handle_key(Key::Char('z')), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_releases_everything() {
        let bus = KeyBus::new();
        let mut session = session();
        let token = session.open_episode(1).unwrap();
        let mut view = PlaybackView::mount(session, &bus);
        assert_eq!(bus.listener_count(), 1);

        bus.publish(Key::Char('n'));
        assert_eq!(view.pump_keys(), 1);
        assert_eq!(view.session().current_episode(), Some(2));

        view.unmount();
        assert_eq!(bus.listener_count(), 0);
        assert!(!view.is_mounted());
        let late = view
            .session_mut()
            .handle_media_event(token, MediaEvent::TimeUpdate { elapsed: 5.0 });
        assert_eq!(late, EventOutcome::Stale);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(view.controls_visible());
    }
}
