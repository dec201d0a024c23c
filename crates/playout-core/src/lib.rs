//! Playout Core - Session orchestration for browser video playback
//!
//! This crate provides the engine behind an embedded player:
//! - Protocol / DRM negotiation against the content service
//! - Native HLS, hls.js and dash.js backend adapters behind one trait
//! - Initialize / teardown / hard reload lifecycle
//! - Playlist and collection sequencing
//! - Error classification and recovery
//! - Settings change notifications for the UI layer
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Playout Core                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │   Content    │  │  Negotiator  │  │  Collection  │           │
//! │  │    Client    │  │              │  │  Sequencer   │           │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘           │
//! │         │                 │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                           │                                     │
//! │                    ┌──────┴──────┐                              │
//! │                    │   Playout   │                              │
//! │                    │   Session   │                              │
//! │                    └──────┬──────┘                              │
//! │                           │                                     │
//! │  ┌──────────────┐  ┌──────┴──────┐  ┌──────────────┐            │
//! │  │   Recovery   │  │   Backend   │  │   Settings   │            │
//! │  │    Policy    │  │   Adapters  │  │     Bus      │            │
//! │  └──────────────┘  └─────────────┘  └──────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod types;
pub mod client;
pub mod config;
pub mod negotiate;
pub mod backend;
pub mod collection;
pub mod recovery;
pub mod bus;
pub mod session;
pub mod controls;

pub use error::{Error, Result};
pub use types::*;
pub use client::{ClientError, ContentClient, ContentRef, DrmInfo, Offering, PlayoutOptions, PlayoutRequest};
pub use config::{Autoplay, ControlsMode, MuteMode, PlayerConfig, PlayerOptions, PlayerProfile, SourceOptions};
pub use negotiate::{negotiate, select_offering, PlayoutNegotiation};
pub use backend::{Backend, BackendEvent, BackendKind, BackendState, MediaElement, MediaEvent, Platform};
pub use collection::{CollectionKind, CollectionState, CollectionTarget, MediaEntry};
pub use recovery::{classify, ErrorClass, MediaFault, RecoveryAction, RecoveryConfig, RecoveryPolicy};
pub use bus::{ListenerHandle, SettingsBus};
pub use session::{DisplayMessage, NoHooks, PlayoutSession, ReadyInfo, SessionHooks};
pub use controls::{ContentDetails, PlayerSettings, RateChange, PLAYBACK_RATES};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library with default configuration
pub fn init() {
    tracing::info!(version = VERSION, "Playout Core initialized");
}
