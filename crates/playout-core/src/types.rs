//! Core types for Playout Core

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a playout session
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

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Streaming packaging format
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Hls,
    Dash,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Hls => "hls",
            Protocol::Dash => "dash",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hls" => Ok(Protocol::Hls),
            "dash" => Ok(Protocol::Dash),
            other => Err(format!("unknown protocol '{}'", other)),
        }
    }
}

/// Content protection scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Drm {
    #[serde(rename = "fairplay")]
    FairPlay,
    #[serde(rename = "sample-aes")]
    SampleAes,
    #[serde(rename = "aes-128")]
    Aes128,
    #[serde(rename = "widevine")]
    Widevine,
    #[serde(rename = "clear")]
    Clear,
    #[serde(rename = "playready")]
    PlayReady,
}

impl Drm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Drm::FairPlay => "fairplay",
            Drm::SampleAes => "sample-aes",
            Drm::Aes128 => "aes-128",
            Drm::Widevine => "widevine",
            Drm::Clear => "clear",
            Drm::PlayReady => "playready",
        }
    }

    /// Key system name used by EME-based engines
    pub fn key_system(&self) -> Option<&'static str> {
        match self {
            Drm::Widevine => Some("com.widevine.alpha"),
            Drm::PlayReady => Some("com.microsoft.playready"),
            Drm::FairPlay => Some("com.apple.fps"),
            _ => None,
        }
    }

    /// Whether this scheme can only be played by the native element
    pub fn requires_native_playback(&self) -> bool {
        matches!(self, Drm::FairPlay | Drm::SampleAes)
    }
}

impl fmt::Display for Drm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Drm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fairplay" => Ok(Drm::FairPlay),
            "sample-aes" => Ok(Drm::SampleAes),
            "aes-128" => Ok(Drm::Aes128),
            "widevine" => Ok(Drm::Widevine),
            "clear" => Ok(Drm::Clear),
            "playready" => Ok(Drm::PlayReady),
            other => Err(format!("unknown drm '{}'", other)),
        }
    }
}

/// Content type as declared by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Live,
    #[default]
    Vod,
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Parse the `WIDTHxHEIGHT` form used by HLS `RESOLUTION` attributes
    pub fn parse(s: &str) -> Option<Self> {
        let (w, h) = s.split_once('x')?;
        Some(Self::new(w.trim().parse().ok()?, h.trim().parse().ok()?))
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A selectable quality level, audio track, or text track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    /// Backend-specific index; -1 for the Auto / Disabled pseudo entry
    pub index: i32,
    pub label: String,
    /// Label shown when this entry is the active one
    pub active_label: String,
    pub active: bool,
    pub language: Option<String>,
    pub bitrate: Option<u64>,
    pub resolution: Option<Resolution>,
}

impl TrackDescriptor {
    pub fn new(index: i32, label: impl Into<String>, active: bool) -> Self {
        let label = label.into();
        Self {
            index,
            active_label: label.clone(),
            label,
            active,
            language: None,
            bitrate: None,
            resolution: None,
        }
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }
}

/// All options of one kind plus the active option
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackList {
    pub options: Vec<TrackDescriptor>,
    pub active: Option<TrackDescriptor>,
}

impl TrackList {
    pub fn new(options: Vec<TrackDescriptor>) -> Self {
        let active = options.iter().find(|t| t.active).cloned();
        Self { options, active }
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }
}

/// Playback state carried across a reload or a collection switch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RestartHints {
    pub volume: f64,
    pub muted: bool,
    /// Resume position; `None` starts from the beginning
    pub current_time: Option<f64>,
    pub playing: bool,
}

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Constructed, nothing loaded
    Idle,
    /// Negotiating and attaching a backend
    Loading,
    /// Backend attached and playable
    Ready,
    Playing,
    Paused,
    /// Waiting out a reload delay
    Reloading,
    /// Terminal
    Destroyed,
}

impl SessionState {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, target),
            // Destroy is always allowed, except out of Destroyed
            (Idle | Loading | Ready | Playing | Paused | Reloading, Destroyed) |
            // From Idle
            (Idle, Loading) | (Idle, Reloading) |
            // From Loading
            (Loading, Loading) | (Loading, Ready) | (Loading, Idle) | (Loading, Reloading) |
            // From Ready
            (Ready, Playing) | (Ready, Paused) | (Ready, Loading) | (Ready, Reloading) | (Ready, Idle) |
            // From Playing
            (Playing, Paused) | (Playing, Loading) | (Playing, Reloading) | (Playing, Idle) |
            // From Paused
            (Paused, Playing) | (Paused, Loading) | (Paused, Reloading) | (Paused, Idle) |
            // From Reloading
            (Reloading, Loading)
        )
    }

    pub fn is_terminal(&self) -> bool {
        *self == SessionState::Destroyed
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Loading => write!(f, "loading"),
            SessionState::Ready => write!(f, "ready"),
            SessionState::Playing => write!(f, "playing"),
            SessionState::Paused => write!(f, "paused"),
            SessionState::Reloading => write!(f, "reloading"),
            SessionState::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// Extract the `hq__` version hash from a playout URL or link path
pub fn version_hash_from_path(path: &str) -> Option<String> {
    path.split('/')
        .find(|segment| segment.starts_with("hq__"))
        .map(str::to_string)
}
