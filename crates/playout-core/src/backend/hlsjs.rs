//! hls.js adapter
//!
//! Drives an `HlsEngine` attached to the element. The auth token travels as a
//! bearer header, so the playout URL is loaded without it.

use super::{
    element_text_tracks, level_descriptor, quality_list, set_element_text_track, translate_media,
    AdapterCore, Backend, BackendEvent, BackendKind, BackendState, EventSender, MediaElement, Platform,
};
use crate::config::{deep_merge, PlayerOptions, PlayerProfile};
use crate::negotiate::PlayoutNegotiation;
use crate::recovery::{FaultKind, MediaFault};
use crate::types::{Resolution, TrackDescriptor, TrackList};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Engine construction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HlsConfig {
    /// hls.js configuration object
    pub settings: Value,
    /// `Authorization` header value for every request
    pub authorization: Option<String>,
}

/// A variant stream as reported by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HlsLevel {
    pub bitrate: u64,
    pub width: u32,
    pub height: u32,
    /// Level carries no video
    #[serde(default)]
    pub audio_only: bool,
}

impl HlsLevel {
    pub fn resolution(&self) -> Option<Resolution> {
        (!self.audio_only).then(|| Resolution::new(self.width, self.height))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HlsTrack {
    pub id: i32,
    pub name: String,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HlsErrorType {
    Network,
    Media,
    KeySystem,
    Mux,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HlsError {
    pub error_type: HlsErrorType,
    pub details: String,
    pub fatal: bool,
    /// HTTP status of the failed load
    pub response_code: Option<u16>,
}

/// Engine events
#[derive(Debug, Clone, PartialEq)]
pub enum HlsEvent {
    ManifestLoaded,
    ManifestParsed { levels: Vec<HlsLevel>, first_level: usize },
    LevelSwitched(i32),
    LevelUpdated,
    AudioTracksUpdated,
    AudioTrackSwitched,
    SubtitleTracksUpdated,
    SubtitleTrackSwitch,
    FragLoaded,
    Error(HlsError),
}

pub type HlsEventHandler = Box<dyn Fn(HlsEvent) + Send + Sync>;

/// The hls.js instance
///
/// Implementations must not hold internal locks while invoking the event
/// handler; the adapter calls back into the engine from it.
pub trait HlsEngine: Send + Sync {
    fn on_event(&self, handler: HlsEventHandler);

    fn load_source(&self, url: &str);
    fn attach_media(&self, media: Arc<dyn MediaElement>);

    fn levels(&self) -> Vec<HlsLevel>;
    fn current_level(&self) -> i32;
    fn auto_level_enabled(&self) -> bool;
    /// `-1` re-enables automatic selection
    fn set_next_level(&self, index: i32);
    fn immediate_level_switch(&self);
    fn set_start_level(&self, index: i32);
    fn remove_level(&self, index: usize);

    fn audio_tracks(&self) -> Vec<HlsTrack>;
    fn audio_track(&self) -> i32;
    fn set_audio_track(&self, id: i32);

    fn recover_media_error(&self);
    fn destroy(&self);
}

/// Engine settings for a tuning profile
pub fn profile_settings(profile: PlayerProfile) -> Value {
    match profile {
        PlayerProfile::Default => json!({
            "maxBufferLength": 30,
            "backBufferLength": 30,
            "liveSyncDurationCount": 3
        }),
        PlayerProfile::LowLatency => json!({
            "lowLatencyMode": true,
            "maxBufferLength": 10,
            "backBufferLength": 10,
            "liveSyncDuration": 4,
            "liveMaxLatencyDuration": 8,
            "maxLiveSyncPlaybackRate": 1.1
        }),
        PlayerProfile::UltraLowLatency => json!({
            "lowLatencyMode": true,
            "maxBufferLength": 4,
            "backBufferLength": 4,
            "liveSyncDuration": 2,
            "liveMaxLatencyDuration": 4,
            "maxLiveSyncPlaybackRate": 1.2
        }),
        PlayerProfile::Custom => json!({}),
    }
}

/// Full engine configuration: player size cap, then profile, then custom
pub fn engine_settings(options: &PlayerOptions) -> Value {
    let mut settings = json!({ "capLevelToPlayerSize": options.cap_level_to_player_size });
    deep_merge(&mut settings, &profile_settings(options.player_profile));

    if options.player_profile == PlayerProfile::Custom {
        if let Some(custom) = &options.hlsjs_options {
            deep_merge(&mut settings, custom);
        }
    }

    settings
}

/// Levels to drop for a bitrate cap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelCap {
    /// Indices to remove, highest first
    pub remove: Vec<usize>,
    /// Replacement start level when the original one is removed
    pub start_level: Option<usize>,
}

pub fn cap_levels(bitrates: &[u64], first_level: usize, max_bitrate: u64) -> LevelCap {
    let mut remove: Vec<usize> = bitrates
        .iter()
        .enumerate()
        .filter(|(_, bitrate)| **bitrate > max_bitrate)
        .map(|(index, _)| index)
        .rev()
        .collect();

    if !bitrates.is_empty() && remove.len() == bitrates.len() {
        warn!(max_bitrate, "Max bitrate is less than all available levels for this content");
        remove.retain(|index| *index > 0);
    }

    let start_level = if remove.contains(&first_level) {
        (0..bitrates.len()).rev().find(|index| !remove.contains(index))
    } else {
        None
    };

    LevelCap { remove, start_level }
}

fn apply_cap(engine: &dyn HlsEngine, levels: &[HlsLevel], first_level: usize, max_bitrate: u64) {
    let bitrates: Vec<u64> = levels.iter().map(|level| level.bitrate).collect();
    let cap = cap_levels(&bitrates, first_level, max_bitrate);
    if cap.remove.is_empty() {
        return;
    }

    info!(max_bitrate, removed = ?cap.remove, "Removing levels above max bitrate");

    if let Some(start) = cap.start_level {
        engine.set_start_level(start as i32);
    }
    for index in cap.remove {
        engine.remove_level(index);
    }
}

/// Engine events to session events
pub fn translate(event: &HlsEvent) -> Option<BackendEvent> {
    match event {
        HlsEvent::FragLoaded => Some(BackendEvent::FragmentLoaded),
        HlsEvent::Error(error) => {
            let kind = match error.error_type {
                HlsErrorType::Network => FaultKind::Network,
                HlsErrorType::Media => FaultKind::Media,
                HlsErrorType::KeySystem => FaultKind::KeySystem,
                HlsErrorType::Mux | HlsErrorType::Other => FaultKind::Other,
            };
            Some(BackendEvent::Error(MediaFault {
                kind,
                fatal: error.fatal,
                status: error.response_code,
                details: error.details.clone(),
            }))
        }
        HlsEvent::ManifestLoaded
        | HlsEvent::ManifestParsed { .. }
        | HlsEvent::LevelSwitched(_)
        | HlsEvent::LevelUpdated
        | HlsEvent::AudioTracksUpdated
        | HlsEvent::AudioTrackSwitched
        | HlsEvent::SubtitleTracksUpdated
        | HlsEvent::SubtitleTrackSwitch => Some(BackendEvent::SettingsChanged),
    }
}

pub struct HlsJsAdapter {
    core: Arc<AdapterCore>,
    platform: Arc<dyn Platform>,
    options: PlayerOptions,
    engine: Mutex<Option<Arc<dyn HlsEngine>>>,
}

impl HlsJsAdapter {
    pub fn new(platform: Arc<dyn Platform>, options: PlayerOptions, events: EventSender) -> Self {
        Self {
            core: AdapterCore::new(BackendKind::HlsJs, events, translate_media),
            platform,
            options,
            engine: Mutex::new(None),
        }
    }

    fn engine(&self) -> Option<Arc<dyn HlsEngine>> {
        self.engine.lock().clone()
    }
}

#[async_trait]
impl Backend for HlsJsAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::HlsJs
    }

    fn state(&self) -> BackendState {
        self.core.state()
    }

    #[instrument(skip_all, fields(drm = %playout.drm, profile = self.options.player_profile.key()))]
    async fn attach(
        &self,
        media: Arc<dyn MediaElement>,
        playout: &PlayoutNegotiation,
        token: Option<&str>,
    ) -> Result<()> {
        if !self.core.transition(BackendState::Attaching) {
            return Err(Error::Destroyed);
        }

        let config = HlsConfig {
            settings: engine_settings(&self.options),
            authorization: token.map(|token| format!("Bearer {}", token)),
        };
        let engine = self.platform.create_hls_engine(&config)?;

        let core = Arc::downgrade(&self.core);
        let weak_engine = Arc::downgrade(&engine);
        let max_bitrate = self.options.max_bitrate;
        engine.on_event(Box::new(move |event| {
            let Some(core) = core.upgrade() else {
                return;
            };

            if let (HlsEvent::ManifestParsed { levels, first_level }, Some(max)) = (&event, max_bitrate) {
                if let Some(engine) = weak_engine.upgrade() {
                    apply_cap(engine.as_ref(), levels, *first_level, max);
                }
            }

            if let Some(event) = translate(&event) {
                core.emit(event);
            }
        }));

        *self.engine.lock() = Some(Arc::clone(&engine));
        self.core.bind_media(Arc::clone(&media));

        let url = playout.header_auth_url();
        engine.load_source(url.as_str());
        engine.attach_media(media);

        info!(url = %url, "hls.js attached");
        Ok(())
    }

    fn levels(&self) -> TrackList {
        let Some(engine) = self.engine() else {
            return TrackList::default();
        };

        let current = engine.current_level();
        let auto = engine.auto_level_enabled();
        let levels = engine
            .levels()
            .iter()
            .enumerate()
            .map(|(index, level)| {
                let index = index as i32;
                level_descriptor(index, level.bitrate, level.resolution(), index == current && !auto)
            })
            .collect();

        quality_list(levels, current, Some(auto))
    }

    fn set_level(&self, index: i32) -> Result<()> {
        let engine = self.engine().ok_or(Error::NoBackend)?;
        if index < -1 || index >= engine.levels().len() as i32 {
            return Err(Error::InvalidConfig(format!("no quality level {}", index)));
        }

        engine.set_next_level(index);
        engine.immediate_level_switch();
        Ok(())
    }

    fn audio_tracks(&self) -> TrackList {
        let Some(engine) = self.engine() else {
            return TrackList::default();
        };

        let active = engine.audio_track();
        let tracks = engine
            .audio_tracks()
            .into_iter()
            .map(|track| TrackDescriptor::new(track.id, track.name, track.id == active).with_language(track.language))
            .collect();

        TrackList::new(tracks)
    }

    fn set_audio_track(&self, index: i32) -> Result<()> {
        let engine = self.engine().ok_or(Error::NoBackend)?;
        if !engine.audio_tracks().iter().any(|track| track.id == index) {
            return Err(Error::InvalidConfig(format!("no audio track {}", index)));
        }

        engine.set_audio_track(index);
        engine.immediate_level_switch();
        Ok(())
    }

    fn text_tracks(&self) -> TrackList {
        self.core
            .media()
            .map(|media| element_text_tracks(media.as_ref()))
            .unwrap_or_default()
    }

    fn set_text_track(&self, index: i32) -> Result<()> {
        let media = self.core.media().ok_or(Error::NoBackend)?;
        set_element_text_track(media.as_ref(), index)
    }

    fn recover_media_error(&self) -> Result<()> {
        let engine = self.engine().ok_or(Error::NoBackend)?;
        info!("Attempting to recover using recoverMediaError");
        engine.recover_media_error();
        self.core.recover();
        Ok(())
    }

    fn destroy(&self) {
        if self.core.release() {
            if let Some(engine) = self.engine.lock().take() {
                engine.destroy();
            }
            info!("hls.js released");
        }
    }
}
