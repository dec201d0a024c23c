//! Protocol / DRM negotiation
//!
//! Protocol preference dominates DRM preference: a less preferred protocol is
//! only considered once every DRM of the more preferred one has been ruled
//! out.

use crate::client::{
    ClipOptions, ContentClient, ContentRef, DrmInfo, MultiviewInfo, Offering, PlayoutOptions, PlayoutRequest,
};
use crate::collection::MediaEntry;
use crate::config::SourceOptions;
use crate::types::{version_hash_from_path, Drm, Protocol};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};
use url::Url;

/// Query parameter that carries the auth token in playout URLs
pub const AUTHORIZATION_PARAM: &str = "authorization";

/// Pick a protocol and DRM from the playout matrix
pub fn negotiate(
    preferred_protocols: &[Protocol],
    preferred_drms: &[Drm],
    available_drms: &[Drm],
    matrix: &PlayoutOptions,
) -> Result<(Protocol, Drm)> {
    for protocol in preferred_protocols {
        let Some(options) = matrix.protocols.get(protocol) else {
            continue;
        };

        let drm = preferred_drms
            .iter()
            .find(|drm| available_drms.contains(drm) && options.playout_methods.contains_key(drm));

        match drm {
            Some(drm) => return Ok((*protocol, *drm)),
            None => debug!(protocol = %protocol, "No acceptable DRM for protocol"),
        }
    }

    Err(Error::NoValidCombination)
}

/// Choose an offering from the availability map
///
/// An explicit id wins if present, then the first available id of the
/// preference list, then the lexicographically smallest id.
pub fn select_offering(
    explicit: Option<&str>,
    preferences: &[String],
    available: &BTreeMap<String, Offering>,
) -> Option<String> {
    if let Some(id) = explicit {
        return available.contains_key(id).then(|| id.to_string());
    }

    if !preferences.is_empty() {
        return preferences.iter().find(|id| available.contains_key(*id)).cloned();
    }

    available.keys().next().cloned()
}

/// Remove the auth token from a playout URL
pub fn strip_authorization(url: &Url) -> Url {
    let mut stripped = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != AUTHORIZATION_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    if pairs.is_empty() {
        stripped.set_query(None);
    } else {
        stripped.query_pairs_mut().clear().extend_pairs(pairs);
    }

    stripped
}

/// Outcome of a successful negotiation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayoutNegotiation {
    pub protocol: Protocol,
    pub drm: Drm,
    pub playout_url: Url,
    /// Key server descriptors for the chosen method
    pub drm_info: BTreeMap<Drm, DrmInfo>,
    /// Client-supported DRMs intersected with the preference list
    pub available_drms: Vec<Drm>,
    pub offering: Option<String>,
    pub offering_uri: Option<String>,
    pub session_id: Option<String>,
    pub multiview: MultiviewInfo,
    /// `hq__` hash embedded in the playout URL
    pub version_hash: Option<String>,
}

impl PlayoutNegotiation {
    /// Configured token, falling back to the one embedded in the URL
    pub fn authorization_token(&self, configured: Option<&str>) -> Option<String> {
        configured.map(str::to_string).or_else(|| {
            self.playout_url
                .query_pairs()
                .find(|(key, _)| key == AUTHORIZATION_PARAM)
                .map(|(_, value)| value.into_owned())
        })
    }

    /// URL for backends that send the token as a header
    pub fn header_auth_url(&self) -> Url {
        strip_authorization(&self.playout_url)
    }

    /// Key server descriptor for the negotiated DRM
    pub fn key_servers(&self) -> Option<&DrmInfo> {
        self.drm_info.get(&self.drm)
    }
}

/// Resolve offerings and the playout matrix, then negotiate
#[instrument(skip_all)]
pub async fn resolve_playout(
    client: &dyn ContentClient,
    source: &SourceOptions,
    active_entry: Option<&MediaEntry>,
) -> Result<PlayoutNegotiation> {
    let mut content = source.content.clone();
    let mut cached = source.playout_options.clone();

    if let Some(entry) = active_entry {
        content.object_id = None;
        content.link_path = None;
        content.version_hash = Some(entry.media_hash.clone());
        cached = None;
    }

    let options = ClipOptions {
        clip_start: source.clip_start.or(source.clip_end.map(|_| 0.0)),
        clip_end: source.clip_end,
        ignore_trimming: source.ignore_trimming,
        resolve: source.resolve,
    };

    let (offering, offering_uri) = if source.uses_offerings() {
        let available = client.available_offerings(&content).await?;
        let offering = select_offering(source.offering.as_deref(), &source.offerings, &available)
            .ok_or_else(|| Error::OfferingNotFound {
                requested: source
                    .offering
                    .clone()
                    .unwrap_or_else(|| source.offerings.join(",")),
            })?;
        let uri = available.get(&offering).map(|o| o.uri.clone());
        (Some(offering), uri)
    } else {
        (None, None)
    };

    let matrix = match cached {
        Some(matrix) => matrix,
        None => {
            let request = if source.direct_link {
                PlayoutRequest {
                    content: ContentRef::default(),
                    offering: None,
                    offering_uri: offering_uri.clone(),
                    direct_link: true,
                    options,
                }
            } else {
                PlayoutRequest {
                    content: content.clone(),
                    offering: offering.clone(),
                    offering_uri: None,
                    direct_link: false,
                    options,
                }
            };
            client.playout_options(&request).await?
        }
    };

    let available_drms: Vec<Drm> = client
        .available_drms()
        .await?
        .into_iter()
        .filter(|drm| source.drms.contains(drm))
        .collect();

    let (protocol, drm) = negotiate(&source.protocols, &source.drms, &available_drms, &matrix)?;
    let method = matrix
        .method(protocol, drm)
        .ok_or(Error::NoValidCombination)?;

    let playout_url = Url::parse(&method.playout_url)?;
    let version_hash = version_hash_from_path(playout_url.path());

    info!(protocol = %protocol, drm = %drm, offering = ?offering, "Negotiated playout");

    Ok(PlayoutNegotiation {
        protocol,
        drm,
        playout_url,
        drm_info: method.drms.clone(),
        available_drms,
        offering,
        offering_uri,
        session_id: matrix.session_id.clone(),
        multiview: matrix.multiview.clone(),
        version_hash,
    })
}
