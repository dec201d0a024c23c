//! Session configuration
//!
//! A `PlayerConfig` is built once per `initialize` call by deep-merging caller
//! overrides (a JSON value) over the defaults. Keys the caller leaves out keep
//! their default; unknown keys are ignored.

use crate::client::{ContentRef, PlayoutOptions};
use crate::recovery::RecoveryConfig;
use crate::types::{ContentType, Drm, Protocol};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default content-fabric configuration endpoint
pub const DEFAULT_NETWORK: &str = "https://main.net955305.contentfabric.io/config";

/// Complete session configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub client: ClientOptions,
    pub source: SourceOptions,
    pub player: PlayerOptions,
}

impl PlayerConfig {
    /// Merge `overrides` over the defaults
    pub fn from_overrides(overrides: &Value) -> Result<Self> {
        Self::default().merged(overrides)
    }

    /// Merge `overrides` over this configuration, returning a new value
    pub fn merged(&self, overrides: &Value) -> Result<Self> {
        let mut base = serde_json::to_value(self)?;
        deep_merge(&mut base, overrides);
        let mut config: PlayerConfig = serde_json::from_value(base)?;
        config.normalize();
        Ok(config)
    }

    /// Custom hls.js options imply the custom profile
    fn normalize(&mut self) {
        let has_custom = self
            .player
            .hlsjs_options
            .as_ref()
            .and_then(Value::as_object)
            .is_some_and(|o| !o.is_empty());

        if has_custom {
            self.player.player_profile = PlayerProfile::Custom;
        }
    }

    pub fn is_live(&self) -> bool {
        self.source.content_info.content_type == ContentType::Live
    }
}

/// Recursively merge `overrides` into `base`. Objects merge key by key; any
/// other value replaces the base value. `null` leaves the base untouched.
pub fn deep_merge(base: &mut Value, overrides: &Value) {
    match (base, overrides) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            for (key, value) in override_map {
                if value.is_null() {
                    continue;
                }
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, value) if !value.is_null() => *base = value.clone(),
        _ => {}
    }
}

/// Content client options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Fabric configuration URL
    pub network: String,
    pub static_token: Option<String>,
    pub tenant_id: Option<String>,
    pub ntp_id: Option<String>,
    /// Require an access code before playout
    pub prompt_ticket: bool,
    pub ticket_code: Option<String>,
    pub ticket_subject: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            network: DEFAULT_NETWORK.to_string(),
            static_token: None,
            tenant_id: None,
            ntp_id: None,
            prompt_ticket: false,
            ticket_code: None,
            ticket_subject: None,
        }
    }
}

/// Media catalog collection reference
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionOptions {
    pub catalog_object_id: Option<String>,
    pub catalog_version_hash: Option<String>,
    pub collection_id: Option<String>,
}

/// Descriptive information about the content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentInfo {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub content_type: ContentType,
}

/// What to play and how to negotiate it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceOptions {
    /// Protocols in preference order
    pub protocols: Vec<Protocol>,
    /// DRM schemes in preference order
    pub drms: Vec<Drm>,
    pub content: ContentRef,
    pub direct_link: bool,
    /// Explicit offering id
    pub offering: Option<String>,
    /// Acceptable offering ids in preference order
    pub offerings: Vec<String>,
    pub clip_start: Option<f64>,
    pub clip_end: Option<f64>,
    pub ignore_trimming: bool,
    pub resolve: bool,
    pub collection: CollectionOptions,
    pub content_info: ContentInfo,
    /// Pre-resolved playout matrix; skips the playout call when present
    pub playout_options: Option<PlayoutOptions>,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            protocols: vec![Protocol::Hls, Protocol::Dash],
            drms: vec![
                Drm::FairPlay,
                Drm::SampleAes,
                Drm::Aes128,
                Drm::Widevine,
                Drm::Clear,
                Drm::PlayReady,
            ],
            content: ContentRef::default(),
            direct_link: false,
            offering: None,
            offerings: Vec::new(),
            clip_start: None,
            clip_end: None,
            ignore_trimming: false,
            resolve: false,
            collection: CollectionOptions::default(),
            content_info: ContentInfo::default(),
            playout_options: None,
        }
    }
}

impl SourceOptions {
    /// Whether offerings must be resolved before the playout call
    pub fn uses_offerings(&self) -> bool {
        self.offering.is_some() || self.direct_link || !self.offerings.is_empty()
    }
}

/// Autoplay behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Autoplay {
    #[default]
    Off,
    On,
    WhenVisible,
}

/// Mute behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MuteMode {
    #[default]
    Off,
    On,
    WhenNotVisible,
    /// Start unmuted, fall back to muted if autoplay is blocked
    OffIfPossible,
}

impl MuteMode {
    /// Muted state of a freshly initialized element
    pub fn starts_muted(&self) -> bool {
        matches!(self, MuteMode::On | MuteMode::WhenNotVisible)
    }
}

/// Controls visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlsMode {
    Off,
    OffWithVolumeToggle,
    #[default]
    AutoHide,
    On,
    Default,
}

/// hls.js tuning profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerProfile {
    #[default]
    Default,
    LowLatency,
    UltraLowLatency,
    Custom,
}

impl PlayerProfile {
    pub const ALL: [PlayerProfile; 4] = [
        PlayerProfile::Default,
        PlayerProfile::LowLatency,
        PlayerProfile::UltraLowLatency,
        PlayerProfile::Custom,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PlayerProfile::Default => "Default",
            PlayerProfile::LowLatency => "Low Latency Live",
            PlayerProfile::UltraLowLatency => "Ultra Low Latency Live",
            PlayerProfile::Custom => "Custom",
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            PlayerProfile::Default => "default",
            PlayerProfile::LowLatency => "low_latency",
            PlayerProfile::UltraLowLatency => "ultra_low_latency",
            PlayerProfile::Custom => "custom",
        }
    }
}

/// Playback behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerOptions {
    pub autoplay: Autoplay,
    pub muted: MuteMode,
    pub controls: ControlsMode,
    #[serde(rename = "loop")]
    pub loop_playback: bool,
    /// Bitrate cap in bps
    pub max_bitrate: Option<u64>,
    pub cap_level_to_player_size: bool,
    pub player_profile: PlayerProfile,
    /// Custom hls.js settings, merged over the profile settings
    pub hlsjs_options: Option<Value>,
    /// Custom dash.js settings
    pub dashjs_options: Option<Value>,
    /// Delay before retrying a blocked autoplay muted
    pub autoplay_retry_delay_ms: u64,
    pub recovery: RecoveryConfig,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            autoplay: Autoplay::Off,
            muted: MuteMode::Off,
            controls: ControlsMode::AutoHide,
            loop_playback: false,
            max_bitrate: None,
            cap_level_to_player_size: false,
            player_profile: PlayerProfile::Default,
            hlsjs_options: None,
            dashjs_options: None,
            autoplay_retry_delay_ms: 250,
            recovery: RecoveryConfig::default(),
        }
    }
}
