//! Playout Session - Main orchestrator for playback
//!
//! Coordinates:
//! - Configuration merge and the access code gate
//! - Collection loading
//! - Protocol / DRM negotiation
//! - Backend selection, attach and teardown
//! - Error recovery and hard reloads
//! - Settings notifications

use crate::backend::{event_channel, select_backend, Backend, BackendEvent, BackendKind, EventReceiver, MediaElement, Platform};
use crate::bus::{ListenerHandle, SettingsBus};
use crate::client::{ContentClient, ContentRef, TicketRedemption};
use crate::collection::{load_collection, CollectionState};
use crate::config::{Autoplay, PlayerConfig, PlayerProfile};
use crate::negotiate::{resolve_playout, PlayoutNegotiation};
use crate::recovery::{MediaFault, RecoveryAction, RecoveryConfig, RecoveryPolicy, ReloadBudget};
use crate::types::*;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// Metadata subtree explaining why content is restricted
pub const PERMISSION_MESSAGE_METADATA: &str = "public/asset_metadata/permission_message";

const RELOADING_MESSAGE: &str = "Something went wrong, reloading player...";
const GIVE_UP_MESSAGE: &str = "Unable to play content";

/// Summary passed to `SessionHooks::on_ready`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadyInfo {
    pub session_id: SessionId,
    pub backend: BackendKind,
    pub protocol: Protocol,
    pub drm: Drm,
    pub playout_url: Url,
    pub version_hash: Option<String>,
    pub offering: Option<String>,
    pub is_live: bool,
}

/// Caller callbacks
#[async_trait]
pub trait SessionHooks: Send + Sync {
    /// The backend can play
    fn on_ready(&self, _info: &ReadyInfo) {}

    /// Any initialization failure or surfaced playback error
    fn on_error(&self, _error: &Error) {}

    /// Called before a hard reload; returning true destroys the session
    async fn on_restart(&self, _error: &Error) -> bool {
        false
    }
}

/// Hooks that do nothing
pub struct NoHooks;

impl SessionHooks for NoHooks {}

/// User-visible message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayMessage {
    pub text: String,
    pub at: DateTime<Utc>,
}

impl DisplayMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            at: Utc::now(),
        }
    }
}

/// Last play and mute decisions taken on visibility changes
#[derive(Debug, Default)]
pub(crate) struct VisibilityActions {
    pub(crate) play: Option<bool>,
    pub(crate) mute: Option<bool>,
}

#[derive(Default)]
pub(crate) struct Flags {
    pub(crate) loading: AtomicBool,
    pub(crate) destroyed: AtomicBool,
    pub(crate) reloading: AtomicBool,
    pub(crate) playback_started: AtomicBool,
    pub(crate) can_play: AtomicBool,
    pub(crate) is_live: AtomicBool,
    pub(crate) ticket_redeemed: AtomicBool,
}

pub(crate) struct SessionInner {
    pub(crate) id: SessionId,
    pub(crate) media: Arc<dyn MediaElement>,
    pub(crate) client: Arc<dyn ContentClient>,
    pub(crate) platform: Arc<dyn Platform>,
    pub(crate) hooks: RwLock<Arc<dyn SessionHooks>>,
    pub(crate) bus: SettingsBus,
    /// Caller parameters, re-merged on every initialize
    pub(crate) overrides: Mutex<Value>,
    pub(crate) config: RwLock<Arc<PlayerConfig>>,
    pub(crate) negotiated: RwLock<Option<PlayoutNegotiation>>,
    pub(crate) backend: RwLock<Option<Arc<dyn Backend>>>,
    pub(crate) collection: RwLock<Option<CollectionState>>,
    pub(crate) policy: Mutex<RecoveryPolicy>,
    pub(crate) reloads: Mutex<ReloadBudget>,
    pub(crate) flags: Flags,
    pub(crate) last_duration: Mutex<Option<f64>>,
    pub(crate) pending_seek: Mutex<Option<f64>>,
    pub(crate) message: RwLock<Option<DisplayMessage>>,
    pub(crate) state: RwLock<SessionState>,
    pub(crate) state_tx: watch::Sender<SessionState>,
    pub(crate) init_lock: tokio::sync::Mutex<()>,
    /// Bumped on every attach and teardown; stale pumps exit
    pub(crate) generation: AtomicU64,
    pub(crate) pump: Mutex<Option<JoinHandle<()>>>,
    pub(crate) reload_task: Mutex<Option<JoinHandle<()>>>,
    pub(crate) last_text_track: Mutex<Option<i32>>,
    pub(crate) visibility: Mutex<VisibilityActions>,
}

/// Playout session bound to one media element
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct PlayoutSession {
    pub(crate) inner: Arc<SessionInner>,
}

impl PlayoutSession {
    /// Create an idle session
    pub fn new(media: Arc<dyn MediaElement>, client: Arc<dyn ContentClient>, platform: Arc<dyn Platform>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        let config = PlayerConfig::default();

        Self {
            inner: Arc::new(SessionInner {
                id: SessionId::new(),
                media,
                client,
                platform,
                hooks: RwLock::new(Arc::new(NoHooks)),
                bus: SettingsBus::new(),
                overrides: Mutex::new(Value::Object(Default::default())),
                policy: Mutex::new(RecoveryPolicy::new(config.player.recovery.clone())),
                reloads: Mutex::new(ReloadBudget::new(config.player.recovery.max_reloads)),
                config: RwLock::new(Arc::new(config)),
                negotiated: RwLock::new(None),
                backend: RwLock::new(None),
                collection: RwLock::new(None),
                flags: Flags::default(),
                last_duration: Mutex::new(None),
                pending_seek: Mutex::new(None),
                message: RwLock::new(None),
                state: RwLock::new(SessionState::Idle),
                state_tx,
                init_lock: tokio::sync::Mutex::new(()),
                generation: AtomicU64::new(0),
                pump: Mutex::new(None),
                reload_task: Mutex::new(None),
                last_text_track: Mutex::new(None),
                visibility: Mutex::new(VisibilityActions::default()),
            }),
        }
    }

    /// Install caller hooks
    pub fn with_hooks(self, hooks: Arc<dyn SessionHooks>) -> Self {
        *self.inner.hooks.write() = hooks;
        self
    }

    fn downgrade(&self) -> Weak<SessionInner> {
        Arc::downgrade(&self.inner)
    }

    fn upgrade(weak: &Weak<SessionInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.read()
    }

    /// Subscribe to lifecycle changes
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    /// Effective configuration of the current initialization
    pub fn config(&self) -> Arc<PlayerConfig> {
        Arc::clone(&self.inner.config.read())
    }

    pub fn negotiated(&self) -> Option<PlayoutNegotiation> {
        self.inner.negotiated.read().clone()
    }

    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.backend().map(|backend| backend.kind())
    }

    pub(crate) fn backend(&self) -> Option<Arc<dyn Backend>> {
        self.inner.backend.read().clone()
    }

    pub fn collection(&self) -> Option<CollectionState> {
        self.inner.collection.read().clone()
    }

    pub fn media(&self) -> Arc<dyn MediaElement> {
        Arc::clone(&self.inner.media)
    }

    pub fn is_loading(&self) -> bool {
        self.inner.flags.loading.load(Ordering::SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.flags.destroyed.load(Ordering::SeqCst)
    }

    pub fn is_reloading(&self) -> bool {
        self.inner.flags.reloading.load(Ordering::SeqCst)
    }

    pub fn is_live(&self) -> bool {
        self.inner.flags.is_live.load(Ordering::SeqCst)
    }

    pub fn can_play(&self) -> bool {
        self.inner.flags.can_play.load(Ordering::SeqCst)
    }

    pub fn playback_started(&self) -> bool {
        self.inner.flags.playback_started.load(Ordering::SeqCst)
    }

    pub fn display_message(&self) -> Option<DisplayMessage> {
        self.inner.message.read().clone()
    }

    /// Backend errors since the last successful fragment load
    pub fn error_count(&self) -> u32 {
        self.inner.policy.lock().soft_errors()
    }

    /// Hard reloads since playback last started
    pub fn reload_count(&self) -> u32 {
        self.inner.reloads.lock().attempts()
    }

    /// Register a settings listener
    pub fn register_settings_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.bus.register(listener)
    }

    pub(crate) fn notify(&self) {
        self.inner.bus.notify();
    }

    pub(crate) fn set_message(&self, text: Option<&str>) {
        *self.inner.message.write() = text.map(DisplayMessage::new);
        self.notify();
    }

    fn hooks(&self) -> Arc<dyn SessionHooks> {
        Arc::clone(&self.inner.hooks.read())
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::Destroyed);
        }
        Ok(())
    }

    /// Transition to new state
    fn set_state(&self, new_state: SessionState) -> Result<()> {
        let current = {
            let mut state = self.inner.state.write();
            let current = *state;
            if current == new_state {
                return Ok(());
            }
            if !current.can_transition_to(new_state) {
                return Err(Error::InvalidStateTransition {
                    from: current.to_string(),
                    to: new_state.to_string(),
                });
            }
            *state = new_state;
            current
        };

        self.inner.state_tx.send_replace(new_state);
        info!(from = %current, to = %new_state, session_id = %self.inner.id, "State transition");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Merge `overrides` over the defaults and start playout
    ///
    /// Calls made while another initialization is in flight queue behind it.
    /// A no-op once destroyed.
    #[instrument(skip_all, fields(session_id = %self.inner.id))]
    pub async fn initialize(&self, overrides: Value, hints: Option<RestartHints>) -> Result<()> {
        self.run_initialize(Some(overrides), hints).await
    }

    /// Initialize again with the stored parameters
    pub(crate) async fn reinitialize(&self, hints: Option<RestartHints>) -> Result<()> {
        self.run_initialize(None, hints).await
    }

    async fn run_initialize(&self, overrides: Option<Value>, hints: Option<RestartHints>) -> Result<()> {
        if self.is_destroyed() {
            return Ok(());
        }

        let _guard = self.inner.init_lock.lock().await;
        if self.is_destroyed() {
            return Ok(());
        }

        self.teardown();
        self.inner.flags.loading.store(true, Ordering::SeqCst);
        let _ = self.set_state(SessionState::Loading);
        self.notify();

        let overrides = match overrides {
            Some(overrides) => {
                // New parameters load their own collection
                *self.inner.overrides.lock() = overrides.clone();
                *self.inner.collection.write() = None;
                *self.inner.visibility.lock() = VisibilityActions::default();
                overrides
            }
            None => self.inner.overrides.lock().clone(),
        };

        let result = self.load(&overrides, hints).await;
        self.inner.flags.loading.store(false, Ordering::SeqCst);

        let result = match result {
            Ok(()) => Ok(()),
            Err(Error::Destroyed) => Ok(()),
            Err(err) => Err(self.handle_init_failure(err).await),
        };

        self.notify();
        result
    }

    async fn load(&self, overrides: &Value, hints: Option<RestartHints>) -> Result<()> {
        let mut config = PlayerConfig::from_overrides(overrides)?;

        self.inner.media.set_loop(config.player.loop_playback);

        match hints {
            Some(hints) => {
                self.inner.media.set_volume(hints.volume);
                self.inner.media.set_muted(hints.muted);
                if hints.playing {
                    config.player.autoplay = Autoplay::On;
                }
                *self.inner.pending_seek.lock() = hints.current_time.filter(|time| *time > 0.0);
            }
            None => self.inner.media.set_muted(config.player.muted.starts_muted()),
        }

        self.apply_config(config.clone());

        self.ensure_ticket(&config).await?;
        self.ensure_alive()?;

        let token = config.source.content.authorization_token.as_deref();
        let needs_collection = self.inner.collection.read().is_none();
        if needs_collection {
            if let Some(collection) = load_collection(self.inner.client.as_ref(), &config.source.collection, token).await? {
                *self.inner.collection.write() = Some(collection);
            }
        }
        self.ensure_alive()?;

        let entry = self
            .inner
            .collection
            .read()
            .as_ref()
            .and_then(|collection| collection.active().cloned());

        let negotiation = resolve_playout(self.inner.client.as_ref(), &config.source, entry.as_ref()).await?;
        self.ensure_alive()?;

        let token = negotiation.authorization_token(token);
        let (events, receiver) = event_channel();
        let backend = select_backend(Arc::clone(&self.inner.platform), &negotiation, &config.player, events)?;

        *self.inner.negotiated.write() = Some(negotiation.clone());
        *self.inner.backend.write() = Some(Arc::clone(&backend));

        if let Err(err) = backend
            .attach(Arc::clone(&self.inner.media), &negotiation, token.as_deref())
            .await
        {
            self.teardown();
            return Err(err);
        }

        if self.is_destroyed() {
            // Destroyed while attaching
            self.teardown();
            return Err(Error::Destroyed);
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.start_pump(receiver, generation);

        info!(
            backend = %backend.kind(),
            protocol = %negotiation.protocol,
            drm = %negotiation.drm,
            version_hash = ?negotiation.version_hash,
            "Playout initialized"
        );

        Ok(())
    }

    fn apply_config(&self, config: PlayerConfig) {
        let recovery: RecoveryConfig = config.player.recovery.clone();

        self.inner.reloads.lock().set_max(recovery.max_reloads);
        *self.inner.policy.lock() = RecoveryPolicy::new(recovery);
        *self.inner.last_duration.lock() = None;

        self.inner.flags.is_live.store(config.is_live(), Ordering::SeqCst);
        self.inner.flags.can_play.store(false, Ordering::SeqCst);
        *self.inner.config.write() = Arc::new(config);
    }

    /// Release the current backend, if any
    fn teardown(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);

        if let Some(pump) = self.inner.pump.lock().take() {
            pump.abort();
        }

        let backend = self.inner.backend.write().take();
        if let Some(backend) = backend {
            debug!(backend = %backend.kind(), "Tearing down backend");
            backend.destroy();
        }

        *self.inner.negotiated.write() = None;
        self.inner.flags.can_play.store(false, Ordering::SeqCst);
    }

    /// Stop everything; the session cannot be reused
    pub fn destroy(&self) {
        if self.inner.flags.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        info!(session_id = %self.inner.id, "Destroying session");

        if let Some(task) = self.inner.reload_task.lock().take() {
            task.abort();
        }

        self.teardown();
        let _ = self.set_state(SessionState::Destroyed);
        self.inner.bus.clear();
    }

    // ------------------------------------------------------------------
    // Access codes
    // ------------------------------------------------------------------

    async fn ensure_ticket(&self, config: &PlayerConfig) -> Result<()> {
        if !config.client.prompt_ticket || self.inner.flags.ticket_redeemed.load(Ordering::SeqCst) {
            return Ok(());
        }

        let code = config.client.ticket_code.as_deref().ok_or(Error::TicketRequired)?;
        self.redeem(config, code).await
    }

    async fn redeem(&self, config: &PlayerConfig, code: &str) -> Result<()> {
        let tenant_id = config
            .client
            .tenant_id
            .clone()
            .ok_or_else(|| Error::InvalidConfig("tenant_id is required to redeem a ticket".to_string()))?;
        let ntp_id = config
            .client
            .ntp_id
            .clone()
            .ok_or_else(|| Error::InvalidConfig("ntp_id is required to redeem a ticket".to_string()))?;

        // "subject:code" carries its own subject
        let (subject, code) = match code.split_once(':') {
            Some((subject, code)) => (Some(subject.to_string()), code.to_string()),
            None => (config.client.ticket_subject.clone(), code.to_string()),
        };

        let redemption = TicketRedemption {
            tenant_id,
            ntp_id,
            code,
            subject,
        };

        self.inner
            .client
            .redeem_code(&redemption)
            .await
            .map_err(|err| Error::TicketRedemption(err.message))?;

        info!(tenant_id = %redemption.tenant_id, "Ticket redeemed");
        self.inner.flags.ticket_redeemed.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Redeem an access code, then initialize with the stored parameters
    pub async fn redeem_ticket(&self, code: &str) -> Result<()> {
        self.ensure_alive()?;

        let config = PlayerConfig::from_overrides(&self.inner.overrides.lock().clone())?;
        if let Err(err) = self.redeem(&config, code).await {
            self.set_message(Some(&err.display_message()));
            return Err(err);
        }

        self.set_message(None);
        self.reinitialize(None).await
    }

    // ------------------------------------------------------------------
    // Failures and reloads
    // ------------------------------------------------------------------

    async fn handle_init_failure(&self, err: Error) -> Error {
        error!(code = err.error_code(), error = %err, "Failed to initialize playout");

        let err = if err.is_permission() {
            let err = self.enrich_permission_error(&err).await;
            self.set_message(Some(&err.display_message()));
            err
        } else if err.is_server() {
            let delay = self.config().player.recovery.server_error_delay();
            self.schedule_reload(err.clone(), delay);
            err
        } else {
            self.set_message(Some(&err.display_message()));
            err
        };

        // Server errors stay in flight until the reload takes over
        if !err.is_server() {
            let _ = self.set_state(SessionState::Idle);
        }

        self.call_on_error(&err);
        err
    }

    /// Permission error carrying the content's own message when it has one
    async fn enrich_permission_error(&self, err: &Error) -> Error {
        let message = match self.permission_message().await {
            Some(message) => Some(message),
            None => match err {
                Error::Client(client) => client.display_message.clone(),
                Error::Permission { message, .. } => message.clone(),
                _ => None,
            },
        };

        Error::Permission {
            status: err.status().unwrap_or(403),
            message,
        }
    }

    /// Stop playback for good after a permission fault
    fn surface_permission_fault(&self, err: Error) {
        self.teardown();
        let _ = self.set_state(SessionState::Idle);

        let weak = self.downgrade();
        tokio::spawn(async move {
            let Some(session) = Self::upgrade(&weak) else {
                return;
            };
            let err = session.enrich_permission_error(&err).await;
            if session.is_destroyed() {
                return;
            }
            session.set_message(Some(&err.display_message()));
            session.call_on_error(&err);
        });
    }

    /// Content-provided explanation for a permission failure
    async fn permission_message(&self) -> Option<String> {
        let content = self.config().source.content.clone();

        let version_hash = match (&content.version_hash, &content.object_id, &content.link_path) {
            (Some(hash), _, _) => Some(hash.clone()),
            (None, Some(object_id), None) => match self.inner.client.latest_version_hash(object_id).await {
                Ok(hash) => Some(hash),
                Err(err) => {
                    warn!(error = %err, "Unable to resolve version for permission message");
                    return None;
                }
            },
            _ => None,
        };

        let target = ContentRef {
            version_hash,
            link_path: content.link_path.clone(),
            object_id: content.object_id.clone(),
            authorization_token: content.authorization_token.clone(),
            write_token: None,
        };

        match self.inner.client.content_metadata(&target, PERMISSION_MESSAGE_METADATA).await {
            Ok(Value::String(message)) if !message.is_empty() => Some(message),
            Ok(_) => None,
            Err(err) => {
                warn!(error = %err, "Unable to load permission message");
                None
            }
        }
    }

    fn call_on_error(&self, err: &Error) {
        let hooks = self.hooks();
        if catch_unwind(AssertUnwindSafe(|| hooks.on_error(err))).is_err() {
            error!("Error hook panicked");
        }
    }

    fn call_on_ready(&self, info: &ReadyInfo) {
        let hooks = self.hooks();
        if catch_unwind(AssertUnwindSafe(|| hooks.on_ready(info))).is_err() {
            error!("Ready hook panicked");
        }
    }

    async fn call_on_restart(&self, err: &Error) -> bool {
        let hooks = self.hooks();
        let err = err.clone();

        match tokio::spawn(async move { hooks.on_restart(&err).await }).await {
            Ok(abort) => abort,
            Err(join_error) => {
                error!(error = %join_error, "Restart hook failed");
                false
            }
        }
    }

    /// Run `hard_reload` in the background
    pub(crate) fn schedule_reload(&self, err: Error, delay: Duration) {
        if self.is_destroyed() || self.is_reloading() {
            return;
        }

        let weak = self.downgrade();
        let task = tokio::spawn(async move {
            if let Some(session) = Self::upgrade(&weak) {
                session.hard_reload(err, delay).await;
            }
        });

        if let Some(previous) = self.inner.reload_task.lock().replace(task) {
            if !previous.is_finished() {
                debug!("Replacing pending reload task");
            }
        }
    }

    /// Tear down and re-initialize after `delay`, keeping playback state
    ///
    /// Only one reload runs at a time, including its re-initialization. A
    /// server error while re-initializing reloads again. Gives up once the
    /// reload budget is spent.
    #[instrument(skip(self), fields(session_id = %self.inner.id))]
    pub async fn hard_reload(&self, err: Error, delay: Duration) {
        if self.is_destroyed() || self.inner.flags.reloading.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut next = Some((err, delay));
        while let Some((err, delay)) = next.take() {
            let Some(hints) = self.prepare_reload(&err, delay).await else {
                break;
            };

            info!("Reloading stream");
            if let Err(err) = self.reinitialize(Some(hints)).await {
                if err.is_server() {
                    let delay = self.config().player.recovery.server_error_delay();
                    next = Some((err, delay));
                }
            }
        }

        self.inner.flags.reloading.store(false, Ordering::SeqCst);
    }

    async fn prepare_reload(&self, err: &Error, delay: Duration) -> Option<RestartHints> {
        let acquired = self.inner.reloads.lock().try_acquire();
        if !acquired {
            warn!(reloads = self.reload_count(), error = %err, "Reload limit reached");
            let _ = self.set_state(SessionState::Idle);
            self.set_message(Some(GIVE_UP_MESSAGE));
            return None;
        }

        if self.call_on_restart(err).await {
            info!("Restart hook aborted playback");
            self.destroy();
            return None;
        }

        let _ = self.set_state(SessionState::Reloading);
        self.set_message(Some(RELOADING_MESSAGE));

        tokio::time::sleep(delay).await;
        if self.is_destroyed() {
            return None;
        }

        if let Err(reset_error) = self.inner.client.reset_region().await {
            warn!(error = %reset_error, "Failed to reset region");
        }

        self.set_message(None);
        Some(self.capture_hints(true))
    }

    /// Playback state of the element right now
    pub fn capture_hints(&self, keep_position: bool) -> RestartHints {
        let media = &self.inner.media;
        RestartHints {
            volume: media.volume(),
            muted: media.muted(),
            current_time: keep_position.then(|| media.current_time()),
            playing: !media.paused(),
        }
    }

    // ------------------------------------------------------------------
    // Event pump
    // ------------------------------------------------------------------

    fn start_pump(&self, mut receiver: EventReceiver, generation: u64) {
        let weak = self.downgrade();

        let pump = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let Some(session) = Self::upgrade(&weak) else {
                    break;
                };
                if session.is_destroyed() || session.inner.generation.load(Ordering::SeqCst) != generation {
                    break;
                }
                session.handle_event(event);
            }
        });

        if let Some(previous) = self.inner.pump.lock().replace(pump) {
            previous.abort();
        }
    }

    fn handle_event(&self, event: BackendEvent) {
        debug!(?event, "Backend event");

        match event {
            BackendEvent::Ready => self.on_ready(),
            BackendEvent::LoadedMetadata => {
                if let Some(time) = self.inner.pending_seek.lock().take() {
                    self.inner.media.set_current_time(time);
                }
            }
            BackendEvent::Playing => {
                self.inner.reloads.lock().reset();
                self.inner.flags.playback_started.store(true, Ordering::SeqCst);
                let _ = self.set_state(SessionState::Playing);
                self.notify();
            }
            BackendEvent::Paused => {
                let _ = self.set_state(SessionState::Paused);
                self.notify();
            }
            BackendEvent::DurationChanged(duration) => {
                self.check_live(duration);
                *self.inner.last_duration.lock() = Some(duration);
            }
            BackendEvent::SettingsChanged => self.notify(),
            BackendEvent::FragmentLoaded => self.inner.policy.lock().on_fragment_loaded(),
            BackendEvent::Ended => self.on_ended(),
            BackendEvent::Error(fault) => self.handle_fault(fault),
        }
    }

    fn on_ready(&self) {
        self.inner.flags.can_play.store(true, Ordering::SeqCst);
        self.check_live(self.inner.media.duration());
        let _ = self.set_state(SessionState::Ready);

        let (Some(negotiation), Some(kind)) = (self.negotiated(), self.backend_kind()) else {
            return;
        };

        info!(backend = %kind, "Playback ready");

        self.call_on_ready(&ReadyInfo {
            session_id: self.inner.id,
            backend: kind,
            protocol: negotiation.protocol,
            drm: negotiation.drm,
            playout_url: negotiation.playout_url.clone(),
            version_hash: negotiation.version_hash.clone(),
            offering: negotiation.offering.clone(),
            is_live: self.is_live(),
        });

        if self.config().player.autoplay == Autoplay::On {
            let weak = self.downgrade();
            tokio::spawn(async move {
                if let Some(session) = Self::upgrade(&weak) {
                    let _ = session.play().await;
                }
            });
        }

        self.notify();
    }

    fn on_ended(&self) {
        let advance = self
            .inner
            .collection
            .read()
            .as_ref()
            .is_some_and(CollectionState::should_auto_advance);

        if advance {
            let weak = self.downgrade();
            tokio::spawn(async move {
                if let Some(session) = Self::upgrade(&weak) {
                    let _ = session.collection_next(Some(true)).await;
                }
            });
        }

        self.notify();
    }

    /// Infinite duration once playable, or a duration that keeps growing
    fn check_live(&self, duration: f64) {
        let growing = self
            .inner
            .last_duration
            .lock()
            .is_some_and(|previous| previous > 0.0 && duration > 0.0 && (duration - previous).abs() > 1.0);

        let infinite = self.can_play() && duration.is_infinite();

        if (infinite || growing) && !self.inner.flags.is_live.swap(true, Ordering::SeqCst) {
            info!(duration, "Live content detected");
            self.notify();
        }
    }

    fn handle_fault(&self, fault: MediaFault) {
        let action = self.inner.policy.lock().on_fault(&fault);
        warn!(fault = %fault, soft_errors = self.error_count(), "Backend error");

        match action {
            RecoveryAction::Ignore => {}
            RecoveryAction::RecoverInPlace => {
                let recovered = self
                    .backend()
                    .map(|backend| backend.recover_media_error())
                    .unwrap_or(Err(Error::NoBackend));

                if let Err(err) = recovered {
                    debug!(error = %err, "In-place recovery unavailable");
                    let delay = self.config().player.recovery.reload_delay();
                    self.schedule_reload(fault.to_error(), delay);
                }
            }
            RecoveryAction::HardReload { delay, error } => self.schedule_reload(error, delay),
            RecoveryAction::Surface(err) if err.is_permission() => self.surface_permission_fault(err),
            RecoveryAction::Surface(err) => {
                self.set_message(Some(&err.display_message()));
                self.call_on_error(&err);
            }
        }
    }

    // ------------------------------------------------------------------
    // Player profiles
    // ------------------------------------------------------------------

    /// Switch the hls.js tuning profile and re-initialize in place
    pub async fn set_player_profile(&self, profile: PlayerProfile, custom: Option<Value>) -> Result<()> {
        self.ensure_alive()?;
        if self.backend_kind() != Some(BackendKind::HlsJs) {
            return Err(Error::BackendUnsupported(
                "player profiles require hls.js".to_string(),
            ));
        }

        {
            let mut overrides = self.inner.overrides.lock();
            if !overrides.is_object() {
                *overrides = Value::Object(Default::default());
            }
            if let Some(root) = overrides.as_object_mut() {
                let player = root
                    .entry("player")
                    .or_insert_with(|| Value::Object(Default::default()));
                if !player.is_object() {
                    *player = Value::Object(Default::default());
                }
                if let Some(player) = player.as_object_mut() {
                    player.insert("player_profile".to_string(), Value::String(profile.key().to_string()));
                    let custom = match profile {
                        PlayerProfile::Custom => custom.unwrap_or(Value::Null),
                        _ => Value::Null,
                    };
                    player.insert("hlsjs_options".to_string(), custom);
                }
            }
        }

        info!(profile = profile.key(), "Switching player profile");

        let hints = self.capture_hints(!self.is_live());
        self.reinitialize(Some(hints)).await
    }
}
