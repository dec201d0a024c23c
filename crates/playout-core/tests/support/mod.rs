//! Mock collaborators for session tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use playout_core::backend::dashjs::{DashBitrate, DashEventHandler, DashTrack};
use playout_core::backend::hlsjs::{HlsEventHandler, HlsLevel, HlsTrack};
use playout_core::backend::{
    DashEngine, DashEvent, HlsConfig, HlsEngine, HlsEvent, MediaElement, MediaEvent, MediaListener,
    NativeTextTrack, Platform, TextTrackMode,
};
use playout_core::client::{ClientResult, TicketRedemption};
use playout_core::{
    ClientError, ContentClient, ContentRef, Drm, Error, Offering, PlayoutOptions, PlayoutRequest, ReadyInfo,
    Result, SessionHooks,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Let spawned tasks run. Under paused time, also advances the clock by 1ms.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// =============================================================================
// Content client
// =============================================================================

pub struct MockClient {
    pub offerings: Mutex<BTreeMap<String, Offering>>,
    pub matrix: Mutex<PlayoutOptions>,
    pub drms: Mutex<Vec<Drm>>,
    /// Metadata by subtree
    pub metadata: Mutex<HashMap<String, Value>>,
    /// Errors returned by the next playout calls, in order
    pub playout_failures: Mutex<VecDeque<ClientError>>,
    pub redeem_error: Mutex<Option<ClientError>>,
    /// When set, playout calls wait for a notification
    pub gate: Mutex<Option<Arc<Notify>>>,
    pub requests: Mutex<Vec<PlayoutRequest>>,
    pub metadata_requests: Mutex<Vec<(ContentRef, String)>>,
    pub redemptions: Mutex<Vec<TicketRedemption>>,
    pub region_resets: AtomicUsize,
}

impl MockClient {
    pub fn new(matrix: PlayoutOptions, drms: Vec<Drm>) -> Arc<Self> {
        Arc::new(Self {
            offerings: Mutex::new(BTreeMap::new()),
            matrix: Mutex::new(matrix),
            drms: Mutex::new(drms),
            metadata: Mutex::new(HashMap::new()),
            playout_failures: Mutex::new(VecDeque::new()),
            redeem_error: Mutex::new(None),
            gate: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            metadata_requests: Mutex::new(Vec::new()),
            redemptions: Mutex::new(Vec::new()),
            region_resets: AtomicUsize::new(0),
        })
    }

    /// Clear HLS only
    pub fn hls_clear() -> Arc<Self> {
        Self::new(
            PlayoutOptions::default().with_method(
                playout_core::Protocol::Hls,
                Drm::Clear,
                "https://host/q/hq__content/rep/playout/default/hls-clear/playlist.m3u8?authorization=tok123",
            ),
            vec![Drm::Clear, Drm::Aes128],
        )
    }

    pub fn fail_playout(&self, error: ClientError, times: usize) {
        let mut failures = self.playout_failures.lock();
        for _ in 0..times {
            failures.push_back(error.clone());
        }
    }

    pub fn set_metadata(&self, subtree: &str, value: Value) {
        self.metadata.lock().insert(subtree.to_string(), value);
    }

    pub fn playout_calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requested_hashes(&self) -> Vec<Option<String>> {
        self.requests
            .lock()
            .iter()
            .map(|request| request.content.version_hash.clone())
            .collect()
    }

    pub fn metadata_calls(&self, subtree: &str) -> usize {
        self.metadata_requests
            .lock()
            .iter()
            .filter(|(_, requested)| requested == subtree)
            .count()
    }
}

#[async_trait]
impl ContentClient for MockClient {
    async fn available_offerings(&self, _content: &ContentRef) -> ClientResult<BTreeMap<String, Offering>> {
        Ok(self.offerings.lock().clone())
    }

    async fn playout_options(&self, request: &PlayoutRequest) -> ClientResult<PlayoutOptions> {
        self.requests.lock().push(request.clone());

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if let Some(error) = self.playout_failures.lock().pop_front() {
            return Err(error);
        }
        Ok(self.matrix.lock().clone())
    }

    async fn available_drms(&self) -> ClientResult<Vec<Drm>> {
        Ok(self.drms.lock().clone())
    }

    async fn content_metadata(&self, content: &ContentRef, subtree: &str) -> ClientResult<Value> {
        self.metadata_requests
            .lock()
            .push((content.clone(), subtree.to_string()));
        Ok(self.metadata.lock().get(subtree).cloned().unwrap_or(Value::Null))
    }

    async fn latest_version_hash(&self, object_id: &str) -> ClientResult<String> {
        Ok(format!("hq__latest_{}", object_id))
    }

    async fn redeem_code(&self, redemption: &TicketRedemption) -> ClientResult<()> {
        self.redemptions.lock().push(redemption.clone());
        match self.redeem_error.lock().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn reset_region(&self) -> ClientResult<()> {
        self.region_resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Media element
// =============================================================================

pub struct MediaState {
    pub volume: f64,
    pub muted: bool,
    pub current_time: f64,
    pub duration: f64,
    pub paused: bool,
    pub rate: f64,
    pub src: Option<String>,
    pub looping: bool,
    pub text_tracks: Vec<NativeTextTrack>,
    /// Outcomes of upcoming `play` calls; empty means success
    pub play_results: VecDeque<bool>,
}

type SharedListener = Arc<dyn Fn(MediaEvent) + Send + Sync>;

pub struct MockMedia {
    pub state: Mutex<MediaState>,
    listeners: Mutex<BTreeMap<u64, SharedListener>>,
    next_id: AtomicU64,
    pub play_calls: AtomicUsize,
    pub key_systems: Mutex<Vec<Drm>>,
}

impl MockMedia {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MediaState {
                volume: 1.0,
                muted: false,
                current_time: 0.0,
                duration: f64::NAN,
                paused: true,
                rate: 1.0,
                src: None,
                looping: false,
                text_tracks: Vec::new(),
                play_results: VecDeque::new(),
            }),
            listeners: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            play_calls: AtomicUsize::new(0),
            key_systems: Mutex::new(Vec::new()),
        })
    }

    /// Dispatch a DOM event to every listener
    pub fn fire(&self, event: MediaEvent) {
        let listeners: Vec<SharedListener> = self.listeners.lock().values().cloned().collect();
        for listener in listeners {
            listener(event.clone());
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn src(&self) -> Option<String> {
        self.state.lock().src.clone()
    }
}

#[async_trait]
impl MediaElement for MockMedia {
    fn volume(&self) -> f64 {
        self.state.lock().volume
    }

    fn set_volume(&self, volume: f64) {
        self.state.lock().volume = volume;
    }

    fn muted(&self) -> bool {
        self.state.lock().muted
    }

    fn set_muted(&self, muted: bool) {
        self.state.lock().muted = muted;
    }

    fn current_time(&self) -> f64 {
        self.state.lock().current_time
    }

    fn set_current_time(&self, time: f64) {
        self.state.lock().current_time = time;
    }

    fn duration(&self) -> f64 {
        self.state.lock().duration
    }

    fn paused(&self) -> bool {
        self.state.lock().paused
    }

    fn playback_rate(&self) -> f64 {
        self.state.lock().rate
    }

    fn set_playback_rate(&self, rate: f64) {
        self.state.lock().rate = rate;
    }

    async fn play(&self) -> Result<()> {
        self.play_calls.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock();
        if state.play_results.pop_front().unwrap_or(true) {
            state.paused = false;
            Ok(())
        } else {
            Err(Error::FatalPlayback("NotAllowedError".to_string()))
        }
    }

    fn pause(&self) {
        self.state.lock().paused = true;
    }

    fn set_src(&self, src: Option<&str>) {
        let mut state = self.state.lock();
        state.src = src.map(str::to_string);
        if src.is_none() {
            state.paused = true;
            state.current_time = 0.0;
        }
    }

    fn set_loop(&self, looping: bool) {
        self.state.lock().looping = looping;
    }

    fn text_tracks(&self) -> Vec<NativeTextTrack> {
        self.state.lock().text_tracks.clone()
    }

    fn set_text_track_mode(&self, index: usize, mode: TextTrackMode) {
        if let Some(track) = self.state.lock().text_tracks.get_mut(index) {
            track.mode = mode;
        }
    }

    fn add_listener(&self, listener: MediaListener) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().insert(id, Arc::from(listener));
        id
    }

    fn remove_listener(&self, id: u64) {
        self.listeners.lock().remove(&id);
    }

    fn configure_key_system(&self, drm: Drm, _info: Option<&playout_core::DrmInfo>) -> Result<()> {
        self.key_systems.lock().push(drm);
        Ok(())
    }
}

// =============================================================================
// hls.js engine
// =============================================================================

type Hook = Arc<dyn Fn() + Send + Sync>;

pub struct MockHlsEngine {
    pub config: HlsConfig,
    handler: Mutex<Option<Arc<HlsEventHandler>>>,
    pub levels: Mutex<Vec<HlsLevel>>,
    pub current_level: AtomicI32,
    pub auto_level: AtomicBool,
    pub next_level: Mutex<Option<i32>>,
    pub start_level: Mutex<Option<i32>>,
    pub removed: Mutex<Vec<usize>>,
    pub audio_tracks: Mutex<Vec<HlsTrack>>,
    pub audio_track: AtomicI32,
    pub sources: Mutex<Vec<String>>,
    pub recover_calls: AtomicUsize,
    pub destroy_calls: AtomicUsize,
    attach_hook: Option<Hook>,
}

impl MockHlsEngine {
    /// Deliver an engine event to the adapter
    pub fn emit(&self, event: HlsEvent) {
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            handler(event);
        }
    }
}

impl HlsEngine for MockHlsEngine {
    fn on_event(&self, handler: HlsEventHandler) {
        *self.handler.lock() = Some(Arc::new(handler));
    }

    fn load_source(&self, url: &str) {
        self.sources.lock().push(url.to_string());
    }

    fn attach_media(&self, _media: Arc<dyn MediaElement>) {
        if let Some(hook) = &self.attach_hook {
            hook();
        }
    }

    fn levels(&self) -> Vec<HlsLevel> {
        self.levels.lock().clone()
    }

    fn current_level(&self) -> i32 {
        self.current_level.load(Ordering::SeqCst)
    }

    fn auto_level_enabled(&self) -> bool {
        self.auto_level.load(Ordering::SeqCst)
    }

    fn set_next_level(&self, index: i32) {
        *self.next_level.lock() = Some(index);
        self.auto_level.store(index == -1, Ordering::SeqCst);
        if index >= 0 {
            self.current_level.store(index, Ordering::SeqCst);
        }
    }

    fn immediate_level_switch(&self) {}

    fn set_start_level(&self, index: i32) {
        *self.start_level.lock() = Some(index);
    }

    fn remove_level(&self, index: usize) {
        let mut levels = self.levels.lock();
        if index < levels.len() {
            levels.remove(index);
            self.removed.lock().push(index);
        }
    }

    fn audio_tracks(&self) -> Vec<HlsTrack> {
        self.audio_tracks.lock().clone()
    }

    fn audio_track(&self) -> i32 {
        self.audio_track.load(Ordering::SeqCst)
    }

    fn set_audio_track(&self, id: i32) {
        self.audio_track.store(id, Ordering::SeqCst);
    }

    fn recover_media_error(&self) {
        self.recover_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn destroy(&self) {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// dash.js engine
// =============================================================================

pub struct MockDashEngine {
    handler: Mutex<Option<Arc<DashEventHandler>>>,
    pub settings: Mutex<Vec<Value>>,
    pub protection: Mutex<Option<(String, String)>>,
    pub authorization: Mutex<Option<String>>,
    pub initialized: Mutex<Option<(String, bool)>>,
    pub bitrates: Mutex<Vec<DashBitrate>>,
    pub quality: AtomicI32,
    pub auto_switch: AtomicBool,
    pub audio_tracks: Mutex<Vec<DashTrack>>,
    pub audio_track: Mutex<Option<i32>>,
    pub destroy_calls: AtomicUsize,
}

impl MockDashEngine {
    pub fn emit(&self, event: DashEvent) {
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            handler(event);
        }
    }
}

impl DashEngine for MockDashEngine {
    fn on_event(&self, handler: DashEventHandler) {
        *self.handler.lock() = Some(Arc::new(handler));
    }

    fn update_settings(&self, settings: &Value) {
        self.settings.lock().push(settings.clone());
    }

    fn set_protection_data(&self, key_system: &str, server_url: &str) {
        *self.protection.lock() = Some((key_system.to_string(), server_url.to_string()));
    }

    fn set_request_authorization(&self, token: &str) {
        *self.authorization.lock() = Some(token.to_string());
    }

    fn initialize(&self, _media: Arc<dyn MediaElement>, url: &str, autoplay: bool) {
        *self.initialized.lock() = Some((url.to_string(), autoplay));
    }

    fn bitrate_list(&self) -> Vec<DashBitrate> {
        self.bitrates.lock().clone()
    }

    fn quality(&self) -> i32 {
        self.quality.load(Ordering::SeqCst)
    }

    fn set_quality(&self, index: i32) {
        self.quality.store(index, Ordering::SeqCst);
    }

    fn auto_switch_enabled(&self) -> bool {
        self.auto_switch.load(Ordering::SeqCst)
    }

    fn audio_tracks(&self) -> Vec<DashTrack> {
        self.audio_tracks.lock().clone()
    }

    fn current_audio_track(&self) -> Option<i32> {
        *self.audio_track.lock()
    }

    fn set_audio_track(&self, index: i32) {
        *self.audio_track.lock() = Some(index);
    }

    fn text_tracks(&self) -> Vec<DashTrack> {
        Vec::new()
    }

    fn current_text_track(&self) -> i32 {
        -1
    }

    fn set_text_track(&self, _index: i32) {}

    fn destroy(&self) {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Platform
// =============================================================================

pub struct MockPlatform {
    pub hlsjs: bool,
    pub native_hls: bool,
    /// Levels and audio tracks given to every new hls.js engine
    pub hls_levels: Vec<HlsLevel>,
    pub hls_audio: Vec<HlsTrack>,
    pub dash_bitrates: Vec<DashBitrate>,
    pub attach_hook: Mutex<Option<Hook>>,
    pub hls_engines: Mutex<Vec<Arc<MockHlsEngine>>>,
    pub dash_engines: Mutex<Vec<Arc<MockDashEngine>>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            hlsjs: true,
            native_hls: false,
            hls_levels: Vec::new(),
            hls_audio: Vec::new(),
            dash_bitrates: Vec::new(),
            attach_hook: Mutex::new(None),
            hls_engines: Mutex::new(Vec::new()),
            dash_engines: Mutex::new(Vec::new()),
        }
    }

    pub fn hls_engine(&self) -> Arc<MockHlsEngine> {
        match self.hls_engines.lock().last() {
            Some(engine) => Arc::clone(engine),
            None => panic!("no hls.js engine created"),
        }
    }

    pub fn dash_engine(&self) -> Arc<MockDashEngine> {
        match self.dash_engines.lock().last() {
            Some(engine) => Arc::clone(engine),
            None => panic!("no dash.js engine created"),
        }
    }

    pub fn hls_engine_count(&self) -> usize {
        self.hls_engines.lock().len()
    }
}

impl Platform for MockPlatform {
    fn hlsjs_supported(&self) -> bool {
        self.hlsjs
    }

    fn native_hls_supported(&self) -> bool {
        self.native_hls
    }

    fn create_hls_engine(&self, config: &HlsConfig) -> Result<Arc<dyn HlsEngine>> {
        let engine = Arc::new(MockHlsEngine {
            config: config.clone(),
            handler: Mutex::new(None),
            levels: Mutex::new(self.hls_levels.clone()),
            current_level: AtomicI32::new(0),
            auto_level: AtomicBool::new(true),
            next_level: Mutex::new(None),
            start_level: Mutex::new(None),
            removed: Mutex::new(Vec::new()),
            audio_tracks: Mutex::new(self.hls_audio.clone()),
            audio_track: AtomicI32::new(self.hls_audio.first().map(|track| track.id).unwrap_or(-1)),
            sources: Mutex::new(Vec::new()),
            recover_calls: AtomicUsize::new(0),
            destroy_calls: AtomicUsize::new(0),
            attach_hook: self.attach_hook.lock().clone(),
        });

        self.hls_engines.lock().push(Arc::clone(&engine));
        Ok(engine)
    }

    fn create_dash_engine(&self) -> Result<Arc<dyn DashEngine>> {
        let engine = Arc::new(MockDashEngine {
            handler: Mutex::new(None),
            settings: Mutex::new(Vec::new()),
            protection: Mutex::new(None),
            authorization: Mutex::new(None),
            initialized: Mutex::new(None),
            bitrates: Mutex::new(self.dash_bitrates.clone()),
            quality: AtomicI32::new(0),
            auto_switch: AtomicBool::new(true),
            audio_tracks: Mutex::new(Vec::new()),
            audio_track: Mutex::new(None),
            destroy_calls: AtomicUsize::new(0),
        });

        self.dash_engines.lock().push(Arc::clone(&engine));
        Ok(engine)
    }
}

// =============================================================================
// Hooks
// =============================================================================

#[derive(Default)]
pub struct RecordingHooks {
    pub ready: Mutex<Vec<ReadyInfo>>,
    pub errors: Mutex<Vec<Error>>,
    pub restarts: AtomicUsize,
    pub abort_restart: AtomicBool,
}

#[async_trait]
impl SessionHooks for RecordingHooks {
    fn on_ready(&self, info: &ReadyInfo) {
        self.ready.lock().push(info.clone());
    }

    fn on_error(&self, error: &Error) {
        self.errors.lock().push(error.clone());
    }

    async fn on_restart(&self, _error: &Error) -> bool {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        self.abort_restart.load(Ordering::SeqCst)
    }
}
