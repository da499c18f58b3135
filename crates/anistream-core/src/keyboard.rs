//! Keyboard shortcuts for the playback view

use serde::{Deserialize, Serialize};

/// A key press as delivered by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    Space,
    ArrowLeft,
    ArrowRight,
    Char(char),
}

impl Key {
    /// Parse a DOM `KeyboardEvent.key` value
    pub fn from_dom(key: &str) -> Option<Self> {
        match key {
            " " | "Spacebar" => Some(Key::Space),
            "ArrowLeft" => Some(Key::ArrowLeft),
            "ArrowRight" => Some(Key::ArrowRight),
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(Key::Char(c)),
                    _ => None,
                }
            }
        }
    }
}

/// What a bound key asks the player to do
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PlayerCommand {
    TogglePlay,
    ToggleFullscreen,
    ToggleMute,
    /// Relative seek in seconds
    SeekBy(f64),
    NextEpisode,
    PreviousEpisode,
}

impl PlayerCommand {
    /// Commands an embedded player still accepts
    pub fn is_coarse(&self) -> bool {
        matches!(self, PlayerCommand::NextEpisode | PlayerCommand::PreviousEpisode)
    }
}

/// Key to command table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyBindings {
    seek_step: f64,
}

impl KeyBindings {
    pub fn new(seek_step: f64) -> Self {
        Self { seek_step }
    }

    pub fn command_for(&self, key: Key) -> Option<PlayerCommand> {
        match key {
            Key::Space => Some(PlayerCommand::TogglePlay),
            Key::ArrowRight => Some(PlayerCommand::SeekBy(self.seek_step)),
            Key::ArrowLeft => Some(PlayerCommand::SeekBy(-self.seek_step)),
            Key::Char(c) => match c.to_ascii_lowercase() {
                'k' => Some(PlayerCommand::TogglePlay),
                'f' => Some(PlayerCommand::ToggleFullscreen),
                'm' => Some(PlayerCommand::ToggleMute),
                'n' => Some(PlayerCommand::NextEpisode),
                'p' => Some(PlayerCommand::PreviousEpisode),
                _ => None,
            },
        }
    }
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self::new(10.0)
    }
}
