//! dash.js adapter

use super::{
    level_descriptor, license_server, quality_list, text_list, translate_media, AdapterCore, Backend,
    BackendEvent, BackendKind, BackendState, EventSender, MediaElement, Platform,
};
use crate::config::{deep_merge, PlayerOptions};
use crate::negotiate::PlayoutNegotiation;
use crate::recovery::{FaultKind, MediaFault};
use crate::types::{Resolution, TrackDescriptor, TrackList};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument};

/// Video representation as reported by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashBitrate {
    pub quality_index: i32,
    pub bitrate: u64,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashTrack {
    pub index: i32,
    pub label: Option<String>,
    pub language: Option<String>,
}

impl DashTrack {
    fn display_label(&self) -> String {
        self.label
            .clone()
            .or_else(|| self.language.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashError {
    pub code: i32,
    pub message: String,
    /// HTTP status when a download failed
    pub status: Option<u16>,
}

/// Engine events
#[derive(Debug, Clone, PartialEq)]
pub enum DashEvent {
    ManifestLoaded,
    CanPlay,
    QualityChangeRendered,
    TrackChangeRendered,
    RepresentationSwitch,
    TextTracksAdded,
    FragmentLoadingCompleted,
    Error(DashError),
}

pub type DashEventHandler = Box<dyn Fn(DashEvent) + Send + Sync>;

/// The dash.js `MediaPlayer` instance
pub trait DashEngine: Send + Sync {
    fn on_event(&self, handler: DashEventHandler);

    fn update_settings(&self, settings: &Value);
    fn set_protection_data(&self, key_system: &str, server_url: &str);
    /// Bearer token attached to every request
    fn set_request_authorization(&self, token: &str);

    fn initialize(&self, media: Arc<dyn MediaElement>, url: &str, autoplay: bool);

    fn bitrate_list(&self) -> Vec<DashBitrate>;
    fn quality(&self) -> i32;
    fn set_quality(&self, index: i32);
    fn auto_switch_enabled(&self) -> bool;

    fn audio_tracks(&self) -> Vec<DashTrack>;
    fn current_audio_track(&self) -> Option<i32>;
    fn set_audio_track(&self, index: i32);

    fn text_tracks(&self) -> Vec<DashTrack>;
    /// `-1` when text is off
    fn current_text_track(&self) -> i32;
    fn set_text_track(&self, index: i32);

    /// `reset()`: detach and free buffers
    fn destroy(&self);
}

/// Engine settings: defaults, custom options, then the player caps
pub fn engine_settings(options: &PlayerOptions) -> Value {
    let mut settings = json!({
        "streaming": {
            "buffer": {
                "fastSwitchEnabled": true,
                "flushBufferAtTrackSwitch": true
            },
            "text": {
                "defaultEnabled": false
            }
        }
    });

    if let Some(custom) = &options.dashjs_options {
        deep_merge(&mut settings, custom);
    }

    if options.cap_level_to_player_size {
        deep_merge(&mut settings, &json!({ "streaming": { "abr": { "limitBitrateByPortal": true } } }));
    }

    if let Some(max_bitrate) = options.max_bitrate {
        deep_merge(
            &mut settings,
            &json!({ "streaming": { "abr": { "maxBitrate": { "video": max_bitrate / 1000 } } } }),
        );
    }

    settings
}

pub fn translate(event: &DashEvent) -> Option<BackendEvent> {
    match event {
        DashEvent::FragmentLoadingCompleted => Some(BackendEvent::FragmentLoaded),
        DashEvent::Error(error) => {
            let kind = if error.status.is_some() {
                FaultKind::Network
            } else {
                FaultKind::Other
            };
            Some(BackendEvent::Error(MediaFault {
                kind,
                fatal: true,
                status: error.status,
                details: format!("{} (code {})", error.message, error.code),
            }))
        }
        DashEvent::ManifestLoaded
        | DashEvent::CanPlay
        | DashEvent::QualityChangeRendered
        | DashEvent::TrackChangeRendered
        | DashEvent::RepresentationSwitch
        | DashEvent::TextTracksAdded => Some(BackendEvent::SettingsChanged),
    }
}

pub struct DashJsAdapter {
    core: Arc<AdapterCore>,
    platform: Arc<dyn Platform>,
    options: PlayerOptions,
    engine: Mutex<Option<Arc<dyn DashEngine>>>,
}

impl DashJsAdapter {
    pub fn new(platform: Arc<dyn Platform>, options: PlayerOptions, events: EventSender) -> Self {
        Self {
            core: AdapterCore::new(BackendKind::DashJs, events, translate_media),
            platform,
            options,
            engine: Mutex::new(None),
        }
    }

    fn engine(&self) -> Option<Arc<dyn DashEngine>> {
        self.engine.lock().clone()
    }
}

#[async_trait]
impl Backend for DashJsAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::DashJs
    }

    fn state(&self) -> BackendState {
        self.core.state()
    }

    #[instrument(skip_all, fields(drm = %playout.drm))]
    async fn attach(
        &self,
        media: Arc<dyn MediaElement>,
        playout: &PlayoutNegotiation,
        token: Option<&str>,
    ) -> Result<()> {
        let license = license_server(playout)?;

        if !self.core.transition(BackendState::Attaching) {
            return Err(Error::Destroyed);
        }

        let engine = self.platform.create_dash_engine()?;
        engine.update_settings(&engine_settings(&self.options));

        if let Some(token) = token {
            engine.set_request_authorization(token);
        }
        if let Some((key_system, server)) = license {
            engine.set_protection_data(key_system, &server);
        }

        let core = Arc::downgrade(&self.core);
        engine.on_event(Box::new(move |event| {
            if let (Some(core), Some(event)) = (core.upgrade(), translate(&event)) {
                core.emit(event);
            }
        }));

        *self.engine.lock() = Some(Arc::clone(&engine));
        self.core.bind_media(Arc::clone(&media));

        let url = playout.header_auth_url();
        engine.initialize(media, url.as_str(), false);

        info!(url = %url, "dash.js attached");
        Ok(())
    }

    fn levels(&self) -> TrackList {
        let Some(engine) = self.engine() else {
            return TrackList::default();
        };

        let current = engine.quality();
        let auto = engine.auto_switch_enabled();
        let levels = engine
            .bitrate_list()
            .into_iter()
            .map(|level| {
                level_descriptor(
                    level.quality_index,
                    level.bitrate,
                    Some(Resolution::new(level.width, level.height)),
                    level.quality_index == current && !auto,
                )
            })
            .collect();

        quality_list(levels, current, Some(auto))
    }

    fn set_level(&self, index: i32) -> Result<()> {
        let engine = self.engine().ok_or(Error::NoBackend)?;
        if index != -1 && !engine.bitrate_list().iter().any(|level| level.quality_index == index) {
            return Err(Error::InvalidConfig(format!("no quality level {}", index)));
        }

        if index >= 0 {
            engine.set_quality(index);
        }
        engine.update_settings(&json!({
            "streaming": {
                "trackSwitchMode": "alwaysReplace",
                "buffer": { "fastSwitchEnabled": true, "flushBufferAtTrackSwitch": true },
                "abr": { "autoSwitchBitrate": { "video": index == -1 } }
            }
        }));
        Ok(())
    }

    fn audio_tracks(&self) -> TrackList {
        let Some(engine) = self.engine() else {
            return TrackList::default();
        };

        let active = engine.current_audio_track();
        let tracks = engine
            .audio_tracks()
            .into_iter()
            .map(|track| {
                TrackDescriptor::new(track.index, track.display_label(), Some(track.index) == active)
                    .with_language(track.language)
            })
            .collect();

        TrackList::new(tracks)
    }

    fn set_audio_track(&self, index: i32) -> Result<()> {
        let engine = self.engine().ok_or(Error::NoBackend)?;
        if !engine.audio_tracks().iter().any(|track| track.index == index) {
            return Err(Error::InvalidConfig(format!("no audio track {}", index)));
        }

        engine.set_audio_track(index);
        Ok(())
    }

    fn text_tracks(&self) -> TrackList {
        let Some(engine) = self.engine() else {
            return TrackList::default();
        };

        let active = engine.current_text_track();
        let tracks = engine
            .text_tracks()
            .into_iter()
            .enumerate()
            .map(|(index, track)| {
                let index = index as i32;
                TrackDescriptor::new(index, track.display_label(), index == active).with_language(track.language)
            })
            .collect();

        text_list(tracks)
    }

    fn set_text_track(&self, index: i32) -> Result<()> {
        let engine = self.engine().ok_or(Error::NoBackend)?;
        if index >= engine.text_tracks().len() as i32 {
            return Err(Error::InvalidConfig(format!("no text track {}", index)));
        }

        engine.set_text_track(index.max(-1));
        Ok(())
    }

    fn destroy(&self) {
        if self.core.release() {
            if let Some(engine) = self.engine.lock().take() {
                engine.destroy();
            }
            info!("dash.js released");
        }
    }
}
