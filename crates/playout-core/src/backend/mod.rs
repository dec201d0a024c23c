//! Backend adapters
//!
//! One `Backend` trait with three implementations: the native element (HLS
//! with FairPlay / SAMPLE-AES, or runtimes without hls.js), hls.js, and
//! dash.js. Adapters normalize element and engine events into
//! `BackendEvent`s delivered on an unbounded channel.

pub mod dashjs;
pub mod hlsjs;
pub mod media;
pub mod native;

pub use dashjs::{DashEngine, DashEvent, DashJsAdapter};
pub use hlsjs::{HlsConfig, HlsEngine, HlsEvent, HlsJsAdapter};
pub use media::{MediaElement, MediaEvent, MediaListener, NativeAudioTrack, NativeTextTrack, TextTrackMode};
pub use native::NativeHlsAdapter;

use crate::config::PlayerOptions;
use crate::negotiate::PlayoutNegotiation;
use crate::recovery::MediaFault;
use crate::types::{Drm, Protocol, Resolution, TrackDescriptor, TrackList};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Normalized adapter event
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// First `canplay` after attach
    Ready,
    LoadedMetadata,
    Playing,
    Paused,
    DurationChanged(f64),
    /// Tracks, levels or other user-visible settings changed
    SettingsChanged,
    FragmentLoaded,
    Ended,
    Error(MediaFault),
}

pub type EventSender = mpsc::UnboundedSender<BackendEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<BackendEvent>;

/// Create the channel an adapter reports on
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Which adapter is driving the element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    NativeHls,
    HlsJs,
    DashJs,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::NativeHls => write!(f, "native-hls"),
            BackendKind::HlsJs => write!(f, "hls.js"),
            BackendKind::DashJs => write!(f, "dash.js"),
        }
    }
}

/// Adapter lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendState {
    Uninitialized,
    Attaching,
    Ready,
    Playing,
    Paused,
    /// Transient; returns to the state it interrupted
    Error,
    Destroyed,
}

impl BackendState {
    pub fn can_transition_to(&self, target: BackendState) -> bool {
        use BackendState::*;
        matches!(
            (self, target),
            (Uninitialized | Attaching | Ready | Playing | Paused | Error, Destroyed)
                | (Uninitialized, Attaching)
                | (Attaching, Ready)
                | (Ready, Playing) | (Ready, Paused)
                | (Playing, Paused) | (Paused, Playing)
                | (Attaching | Ready | Playing | Paused, Error)
                | (Error, Playing) | (Error, Paused)
        )
    }
}

impl fmt::Display for BackendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendState::Uninitialized => "uninitialized",
            BackendState::Attaching => "attaching",
            BackendState::Ready => "ready",
            BackendState::Playing => "playing",
            BackendState::Paused => "paused",
            BackendState::Error => "error",
            BackendState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// A playback backend bound to one media element
#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn state(&self) -> BackendState;

    /// Start streaming `playout` into `media`
    async fn attach(
        &self,
        media: Arc<dyn MediaElement>,
        playout: &PlayoutNegotiation,
        token: Option<&str>,
    ) -> Result<()>;

    /// Quality levels, highest bitrate first
    fn levels(&self) -> TrackList;
    fn set_level(&self, index: i32) -> Result<()>;

    fn audio_tracks(&self) -> TrackList;
    fn set_audio_track(&self, index: i32) -> Result<()>;

    fn text_tracks(&self) -> TrackList;
    /// `-1` disables text
    fn set_text_track(&self, index: i32) -> Result<()>;

    /// Recover from a media error without reloading
    fn recover_media_error(&self) -> Result<()> {
        Err(Error::BackendUnsupported(format!(
            "{} cannot recover media errors in place",
            self.kind()
        )))
    }

    /// Release listeners and engine resources; idempotent
    fn destroy(&self);
}

/// Runtime capabilities and engine construction
pub trait Platform: Send + Sync {
    fn hlsjs_supported(&self) -> bool;

    /// The element can play HLS (and FairPlay) by itself
    fn native_hls_supported(&self) -> bool;

    fn create_hls_engine(&self, config: &HlsConfig) -> Result<Arc<dyn HlsEngine>>;

    fn create_dash_engine(&self) -> Result<Arc<dyn DashEngine>>;
}

/// Decide which adapter can play `protocol` / `drm` on this platform
pub fn backend_kind(platform: &dyn Platform, protocol: Protocol, drm: Drm) -> Result<BackendKind> {
    match protocol {
        Protocol::Hls if drm.requires_native_playback() || !platform.hlsjs_supported() => {
            if !platform.native_hls_supported() {
                return Err(Error::BackendUnsupported(format!(
                    "HLS with {} requires native playback",
                    drm
                )));
            }
            Ok(BackendKind::NativeHls)
        }
        Protocol::Hls => Ok(BackendKind::HlsJs),
        Protocol::Dash => Ok(BackendKind::DashJs),
    }
}

/// Construct the adapter for a negotiated playout
pub fn select_backend(
    platform: Arc<dyn Platform>,
    playout: &PlayoutNegotiation,
    options: &PlayerOptions,
    events: EventSender,
) -> Result<Arc<dyn Backend>> {
    let kind = backend_kind(platform.as_ref(), playout.protocol, playout.drm)?;

    if kind == BackendKind::DashJs {
        license_server(playout)?;
    }

    debug!(%kind, protocol = %playout.protocol, drm = %playout.drm, "Selected backend");

    let backend: Arc<dyn Backend> = match kind {
        BackendKind::NativeHls => Arc::new(NativeHlsAdapter::new(events)),
        BackendKind::HlsJs => Arc::new(HlsJsAdapter::new(platform, options.clone(), events)),
        BackendKind::DashJs => Arc::new(DashJsAdapter::new(platform, options.clone(), events)),
    };

    Ok(backend)
}

/// License server for EME key systems; `None` for unencrypted playout
pub(crate) fn license_server(playout: &PlayoutNegotiation) -> Result<Option<(&'static str, String)>> {
    let Some(key_system) = playout.drm.key_system() else {
        return Ok(None);
    };

    playout
        .key_servers()
        .and_then(|info| info.license_servers.first())
        .map(|server| Some((key_system, server.clone())))
        .ok_or_else(|| {
            Error::BackendUnsupported(format!("{} playout without a license server", playout.drm))
        })
}

/// Descriptor for a quality level
pub fn level_descriptor(index: i32, bitrate: u64, resolution: Option<Resolution>, active: bool) -> TrackDescriptor {
    let mut level = match resolution {
        Some(resolution) => {
            let mut level = TrackDescriptor::new(
                index,
                format!("{} ({:.1}Mbps)", resolution, bitrate as f64 / 1_000_000.0),
                active,
            );
            level.active_label = resolution.to_string();
            level
        }
        None => TrackDescriptor::new(index, format!("{}kbps", bitrate / 1000), active),
    };

    level.bitrate = Some(bitrate);
    level.resolution = resolution;
    level
}

/// Sort levels by descending bitrate and prepend the Auto entry
///
/// `auto_enabled` is `None` when the engine has no automatic selection.
pub fn quality_list(mut levels: Vec<TrackDescriptor>, current: i32, auto_enabled: Option<bool>) -> TrackList {
    levels.sort_by(|a, b| b.bitrate.cmp(&a.bitrate));

    if let (Some(auto), false) = (auto_enabled, levels.is_empty()) {
        let active_label = levels
            .iter()
            .find(|level| level.index == current)
            .map(|level| format!("Auto ({})", level.active_label))
            .unwrap_or_else(|| "Auto".to_string());

        let mut entry = TrackDescriptor::new(-1, "Auto", auto);
        entry.active_label = active_label;
        levels.insert(0, entry);
    }

    TrackList::new(levels)
}

/// Prepend the Disabled entry to a non-empty text track list
pub fn text_list(mut tracks: Vec<TrackDescriptor>) -> TrackList {
    if !tracks.is_empty() {
        let showing = tracks.iter().any(|track| track.active);
        tracks.insert(0, TrackDescriptor::new(-1, "Disabled", !showing));
    }

    TrackList::new(tracks)
}

/// Translation shared by engine-driven adapters; element errors are
/// reported by the engine instead
pub(crate) fn translate_media(event: &MediaEvent) -> Option<BackendEvent> {
    match event {
        MediaEvent::CanPlay => Some(BackendEvent::Ready),
        MediaEvent::LoadedMetadata => Some(BackendEvent::LoadedMetadata),
        MediaEvent::Playing => Some(BackendEvent::Playing),
        MediaEvent::Pause => Some(BackendEvent::Paused),
        MediaEvent::DurationChange(duration) => Some(BackendEvent::DurationChanged(*duration)),
        MediaEvent::Ended => Some(BackendEvent::Ended),
        MediaEvent::VolumeChange | MediaEvent::RateChange | MediaEvent::TracksChanged => {
            Some(BackendEvent::SettingsChanged)
        }
        MediaEvent::Error(_) => None,
    }
}

/// Text tracks held by the element (native and hls.js)
pub(crate) fn element_text_tracks(media: &dyn MediaElement) -> TrackList {
    let tracks = media
        .text_tracks()
        .into_iter()
        .enumerate()
        .map(|(index, track)| {
            TrackDescriptor::new(index as i32, track.display_label(), track.mode == TextTrackMode::Showing)
                .with_language(track.language)
        })
        .collect();

    text_list(tracks)
}

pub(crate) fn set_element_text_track(media: &dyn MediaElement, index: i32) -> Result<()> {
    let count = media.text_tracks().len();
    if index >= count as i32 {
        return Err(Error::InvalidConfig(format!("no text track {}", index)));
    }

    for i in 0..count {
        media.set_text_track_mode(i, TextTrackMode::Disabled);
    }
    if index >= 0 {
        media.set_text_track_mode(index as usize, TextTrackMode::Showing);
    }

    Ok(())
}

struct StateSlot {
    current: BackendState,
    before_error: Option<BackendState>,
}

/// State, event channel and element listener shared by every adapter
pub(crate) struct AdapterCore {
    kind: BackendKind,
    state: Mutex<StateSlot>,
    events: EventSender,
    media: Mutex<Option<(Arc<dyn MediaElement>, u64)>>,
    translate: fn(&MediaEvent) -> Option<BackendEvent>,
}

impl AdapterCore {
    pub(crate) fn new(
        kind: BackendKind,
        events: EventSender,
        translate: fn(&MediaEvent) -> Option<BackendEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            kind,
            state: Mutex::new(StateSlot {
                current: BackendState::Uninitialized,
                before_error: None,
            }),
            events,
            media: Mutex::new(None),
            translate,
        })
    }

    pub(crate) fn state(&self) -> BackendState {
        self.state.lock().current
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.state() == BackendState::Destroyed
    }

    pub(crate) fn transition(&self, target: BackendState) -> bool {
        let mut slot = self.state.lock();
        if slot.current == target {
            return true;
        }
        if !slot.current.can_transition_to(target) {
            debug!(backend = %self.kind, from = %slot.current, to = %target, "Ignoring backend transition");
            return false;
        }
        if target == BackendState::Error {
            slot.before_error = Some(slot.current);
        }
        slot.current = target;
        true
    }

    /// Leave the error state for whatever it interrupted
    pub(crate) fn recover(&self) {
        let mut slot = self.state.lock();
        if slot.current == BackendState::Error {
            if let Some(previous) = slot.before_error.take() {
                slot.current = previous;
            }
        }
    }

    /// Update state for `event` and forward it to the session
    pub(crate) fn emit(&self, event: BackendEvent) {
        if self.is_destroyed() {
            return;
        }

        let event = match event {
            BackendEvent::Ready => {
                let mut slot = self.state.lock();
                if slot.current == BackendState::Attaching {
                    slot.current = BackendState::Ready;
                    BackendEvent::Ready
                } else {
                    BackendEvent::SettingsChanged
                }
            }
            BackendEvent::Playing => {
                self.transition(BackendState::Playing);
                event
            }
            BackendEvent::Paused => {
                self.transition(BackendState::Paused);
                event
            }
            BackendEvent::Error(fault) => {
                if fault.fatal {
                    self.transition(BackendState::Error);
                }
                BackendEvent::Error(fault)
            }
            other => other,
        };

        if self.events.send(event).is_err() {
            warn!(backend = %self.kind, "Backend event dropped, session is gone");
        }
    }

    /// Listen to `media` until released
    pub(crate) fn bind_media(self: &Arc<Self>, media: Arc<dyn MediaElement>) {
        let weak: Weak<AdapterCore> = Arc::downgrade(self);
        let id = media.add_listener(Box::new(move |event| {
            if let Some(core) = weak.upgrade() {
                if let Some(event) = (core.translate)(&event) {
                    core.emit(event);
                }
            }
        }));

        if let Some((previous, previous_id)) = self.media.lock().replace((media, id)) {
            previous.remove_listener(previous_id);
        }
    }

    pub(crate) fn media(&self) -> Option<Arc<dyn MediaElement>> {
        self.media.lock().as_ref().map(|(media, _)| Arc::clone(media))
    }

    /// Move to `Destroyed` and drop the element listener. Returns false if
    /// already released.
    pub(crate) fn release(&self) -> bool {
        {
            let mut slot = self.state.lock();
            if slot.current == BackendState::Destroyed {
                return false;
            }
            slot.current = BackendState::Destroyed;
        }

        if let Some((media, id)) = self.media.lock().take() {
            media.remove_listener(id);
        }
        true
    }
}
