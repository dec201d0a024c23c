//! Media element contract
//!
//! The host's `<video>` element. Setters take `&self`; implementations use
//! interior mutability, the same way the element itself behaves.

use crate::client::DrmInfo;
use crate::types::Drm;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// DOM media events the adapters care about
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    CanPlay,
    LoadedMetadata,
    Playing,
    Pause,
    DurationChange(f64),
    Ended,
    VolumeChange,
    RateChange,
    /// Native audio or text track list changed
    TracksChanged,
    Error(String),
}

/// Listener registered on the element
pub type MediaListener = Box<dyn Fn(MediaEvent) + Send + Sync>;

/// Text track display mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextTrackMode {
    #[default]
    Disabled,
    Hidden,
    Showing,
}

/// Audio track exposed by the element itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeAudioTrack {
    pub id: String,
    pub label: String,
    pub language: Option<String>,
    pub enabled: bool,
}

/// Text track exposed by the element itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeTextTrack {
    pub label: String,
    pub language: Option<String>,
    pub mode: TextTrackMode,
}

impl NativeTextTrack {
    /// Label, falling back to the language code
    pub fn display_label(&self) -> String {
        if self.label.is_empty() {
            self.language.clone().unwrap_or_default()
        } else {
            self.label.clone()
        }
    }
}

#[async_trait]
pub trait MediaElement: Send + Sync {
    fn volume(&self) -> f64;
    fn set_volume(&self, volume: f64);

    fn muted(&self) -> bool;
    fn set_muted(&self, muted: bool);

    fn current_time(&self) -> f64;
    fn set_current_time(&self, time: f64);

    /// Media duration; infinite for live streams, NaN before metadata
    fn duration(&self) -> f64;

    fn paused(&self) -> bool;

    fn playback_rate(&self) -> f64;
    fn set_playback_rate(&self, rate: f64);

    /// Start playback; fails when the runtime blocks it
    async fn play(&self) -> Result<()>;
    fn pause(&self);

    /// Set or clear the `src` attribute
    fn set_src(&self, src: Option<&str>);

    /// Restart from the beginning when playback ends
    fn set_loop(&self, looping: bool);

    fn audio_tracks(&self) -> Vec<NativeAudioTrack> {
        Vec::new()
    }
    fn set_audio_track_enabled(&self, _index: usize, _enabled: bool) {}

    fn text_tracks(&self) -> Vec<NativeTextTrack> {
        Vec::new()
    }
    fn set_text_track_mode(&self, _index: usize, _mode: TextTrackMode) {}

    /// Register a DOM event listener, returning its id
    fn add_listener(&self, listener: MediaListener) -> u64;
    fn remove_listener(&self, id: u64);

    /// Configure element-level key system playback (FairPlay)
    fn configure_key_system(&self, _drm: Drm, _info: Option<&DrmInfo>) -> Result<()> {
        Ok(())
    }
}
