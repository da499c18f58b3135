//! Anistream Core - playback core for episodic anime streaming
//!
//! This crate provides everything between the catalog API and a media element:
//! - Source ranking and direct/embedded classification
//! - Transport state machine with quality switching
//! - Watch-progress reporting and auto-advance
//! - Keyboard bindings, controls auto-hide, episode navigation
//! - Catalog API client and rendition downloads
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Anistream Core                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │    Source    │  │   Episode    │  │   Keyboard   │           │
//! │  │   Selector   │  │     List     │  │   Bindings   │           │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘           │
//! │         └─────────────────┼─────────────────┘                   │
//! │                    ┌──────┴──────┐        ┌──────────────┐      │
//! │                    │   Player    │───────▶│   Playback   │      │
//! │                    │   Session   │        │  Controller  │      │
//! │                    └──────┬──────┘        └──────┬───────┘      │
//! │                           │                      │              │
//! │  ┌──────────────┐  ┌──────┴──────┐        ┌──────┴───────┐      │
//! │  │   Progress   │◀─│  Progress   │        │    Media     │      │
//! │  │   Uploader   │  │  Reporter   │        │   Element    │      │
//! │  └──────┬───────┘  └─────────────┘        └──────────────┘      │
//! │  ┌──────┴───────┐                                               │
//! │  │ Catalog API  │                                               │
//! │  └──────────────┘                                               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod bus;
pub mod controller;
pub mod download;
pub mod episodes;
pub mod error;
pub mod keyboard;
pub mod media;
pub mod progress;
pub mod session;
pub mod source;
pub mod timer;
pub mod types;

pub use api::{CatalogClient, Envelope, HttpProgressSink};
pub use bus::{EventBus, Subscription};
pub use controller::{PlaybackController, PlaybackSnapshot, ViewMode};
pub use download::{download_filename, Downloader};
pub use episodes::EpisodeList;
pub use error::{Error, Result};
pub use keyboard::{Key, KeyBindings, PlayerCommand};
pub use media::{EventOutcome, MediaElement, MediaEvent, MediaFailure, SourceToken};
pub use progress::{
    progress_channel, ProgressOutcome, ProgressReporter, ProgressSink, ProgressUploader,
    UploadStats, Viewer,
};
pub use session::{KeyBus, PlaybackView, PlayerNotice, PlayerSession};
pub use source::{classify, default_source, embed_url, rank, SourceClassifier};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version once at startup
pub fn init() {
    tracing::info!(version = VERSION, "Anistream Core initialized");
}
