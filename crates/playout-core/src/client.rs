//! Content client contract
//!
//! The content-fabric SDK is an external collaborator. The session only needs
//! the handful of calls below; transport and wire format belong to the
//! implementor.

use crate::types::{Drm, Protocol};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Failure reported by the content client
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct ClientError {
    /// HTTP status, when the failure came from a fabric node
    pub status: Option<u16>,
    pub message: String,
    /// Human-readable message supplied by the service
    pub display_message: Option<String>,
}

impl ClientError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            display_message: None,
        }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
            display_message: None,
        }
    }

    pub fn with_display_message(mut self, message: impl Into<String>) -> Self {
        self.display_message = Some(message.into());
        self
    }
}

/// Result type for client calls
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Reference to a content object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentRef {
    pub object_id: Option<String>,
    pub version_hash: Option<String>,
    pub write_token: Option<String>,
    pub link_path: Option<String>,
    pub authorization_token: Option<String>,
}

impl ContentRef {
    pub fn version(hash: impl Into<String>) -> Self {
        Self {
            version_hash: Some(hash.into()),
            ..Default::default()
        }
    }

    pub fn object(id: impl Into<String>) -> Self {
        Self {
            object_id: Some(id.into()),
            ..Default::default()
        }
    }
}

/// One named playable variant of a content item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offering {
    pub uri: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Clip and resolution options passed through to the playout call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClipOptions {
    pub clip_start: Option<f64>,
    pub clip_end: Option<f64>,
    pub ignore_trimming: bool,
    pub resolve: bool,
}

/// Parameters for resolving the playout matrix
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayoutRequest {
    pub content: ContentRef,
    pub offering: Option<String>,
    /// Set in direct-link mode instead of `content`
    pub offering_uri: Option<String>,
    pub direct_link: bool,
    pub options: ClipOptions,
}

/// Key server descriptor for one DRM scheme
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrmInfo {
    pub license_servers: Vec<String>,
    pub cert: Option<String>,
}

/// One playable method: URL plus the DRM descriptors that go with it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayoutMethod {
    pub playout_url: String,
    #[serde(default)]
    pub drms: BTreeMap<Drm, DrmInfo>,
}

/// Methods offered by one protocol, keyed by DRM
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolOptions {
    pub playout_methods: BTreeMap<Drm, PlayoutMethod>,
}

/// Multiview descriptor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiviewInfo {
    pub enabled: bool,
    pub available_views: Vec<serde_json::Value>,
}

/// The playout option matrix: protocol → drm → method
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayoutOptions {
    pub protocols: BTreeMap<Protocol, ProtocolOptions>,
    pub session_id: Option<String>,
    pub multiview: MultiviewInfo,
}

impl PlayoutOptions {
    pub fn method(&self, protocol: Protocol, drm: Drm) -> Option<&PlayoutMethod> {
        self.protocols.get(&protocol)?.playout_methods.get(&drm)
    }

    /// Add a method, mostly for building matrices by hand
    pub fn with_method(mut self, protocol: Protocol, drm: Drm, playout_url: impl Into<String>) -> Self {
        self.protocols.entry(protocol).or_default().playout_methods.insert(
            drm,
            PlayoutMethod {
                playout_url: playout_url.into(),
                drms: BTreeMap::new(),
            },
        );
        self
    }
}

/// Access code redemption parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketRedemption {
    pub tenant_id: String,
    pub ntp_id: String,
    pub code: String,
    pub subject: Option<String>,
}

/// Async content-fabric service consumed by the session
#[async_trait]
pub trait ContentClient: Send + Sync {
    /// Offerings available for the content, keyed by offering id
    async fn available_offerings(&self, content: &ContentRef) -> ClientResult<BTreeMap<String, Offering>>;

    /// Resolve the protocol/DRM playout matrix
    async fn playout_options(&self, request: &PlayoutRequest) -> ClientResult<PlayoutOptions>;

    /// DRM schemes supported by the current runtime
    async fn available_drms(&self) -> ClientResult<Vec<Drm>>;

    /// Read a metadata subtree of a content object
    async fn content_metadata(&self, content: &ContentRef, subtree: &str) -> ClientResult<serde_json::Value>;

    /// Latest version hash of an object
    async fn latest_version_hash(&self, object_id: &str) -> ClientResult<String>;

    /// Redeem an access code
    async fn redeem_code(&self, redemption: &TicketRedemption) -> ClientResult<()>;

    /// Re-resolve region and node information
    async fn reset_region(&self) -> ClientResult<()> {
        Ok(())
    }
}

/// Default static token for a content space: base64 of `{"qspace_id": ...}`
pub fn default_static_token(content_space_id: &str) -> String {
    let body = serde_json::json!({ "qspace_id": content_space_id });
    STANDARD.encode(body.to_string())
}
