//! Collection sequencer
//!
//! A media catalog can group content into playlists and collections. The
//! session loads the configured collection once and plays one entry at a time;
//! moving the cursor re-initializes playout for the new entry.

use crate::client::{ContentClient, ContentRef};
use crate::config::CollectionOptions;
use crate::types::version_hash_from_path;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};

/// Catalog metadata subtree holding collection definitions
pub const COLLECTIONS_METADATA: &str = "public/asset_metadata/info/collections";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    /// Advances to the next entry when one ends
    Playlist,
    Collection,
}

/// One playable item of a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaEntry {
    pub id: String,
    pub index: usize,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Version hash of the media object
    pub media_hash: String,
}

/// Entry selector for `play`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionTarget {
    Index(usize),
    Id(String),
}

impl From<usize> for CollectionTarget {
    fn from(index: usize) -> Self {
        CollectionTarget::Index(index)
    }
}

impl From<&str> for CollectionTarget {
    fn from(id: &str) -> Self {
        CollectionTarget::Id(id.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct RawCollection {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    media: Option<Value>,
}

impl RawEntry {
    fn media_hash(&self) -> Option<String> {
        let link = self.media.as_ref()?.get("/")?.as_str()?;
        version_hash_from_path(link)
    }
}

/// Loaded collection plus the playback cursor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionState {
    pub id: String,
    pub kind: CollectionKind,
    pub title: Option<String>,
    pub entries: Vec<MediaEntry>,
    cursor: usize,
}

impl CollectionState {
    pub fn new(id: impl Into<String>, kind: CollectionKind, entries: Vec<MediaEntry>) -> Self {
        Self {
            id: id.into(),
            kind,
            title: None,
            entries,
            cursor: 0,
        }
    }

    /// Find `collection_id` in the catalog's collection list
    ///
    /// Entries without a media link are dropped.
    pub fn from_metadata(collection_id: &str, catalog: &str, metadata: &Value) -> Result<Self> {
        let collections: Vec<RawCollection> = match metadata {
            Value::Null => Vec::new(),
            other => serde_json::from_value(other.clone())?,
        };

        let raw = collections
            .into_iter()
            .find(|collection| collection.id == collection_id)
            .ok_or_else(|| {
                Error::collection(format!(
                    "No collection with ID {} found for media catalog {}",
                    collection_id, catalog
                ))
            })?;

        let entries: Vec<MediaEntry> = raw
            .content
            .iter()
            .filter_map(|entry| Some((entry, entry.media_hash()?)))
            .enumerate()
            .map(|(index, (entry, media_hash))| MediaEntry {
                id: entry.id.clone().unwrap_or_else(|| media_hash.clone()),
                index,
                title: entry.title.clone(),
                description: entry.description.clone(),
                media_hash,
            })
            .collect();

        if entries.is_empty() {
            return Err(Error::collection(format!(
                "Collection {} has no playable media",
                collection_id
            )));
        }

        let kind = match raw.kind.as_deref() {
            Some("playlist") => CollectionKind::Playlist,
            _ => CollectionKind::Collection,
        };

        Ok(Self {
            id: raw.id,
            kind,
            title: raw.title,
            entries,
            cursor: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_playlist(&self) -> bool {
        self.kind == CollectionKind::Playlist
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn active(&self) -> Option<&MediaEntry> {
        self.entries.get(self.cursor)
    }

    /// Resolve a target to an entry index
    pub fn resolve(&self, target: &CollectionTarget) -> Option<usize> {
        match target {
            CollectionTarget::Index(index) => (*index < self.len()).then_some(*index),
            CollectionTarget::Id(id) => self.entries.iter().position(|entry| &entry.id == id),
        }
    }

    /// Move the cursor; false if the index is out of range
    pub fn select(&mut self, index: usize) -> bool {
        if index >= self.len() {
            return false;
        }
        self.cursor = index;
        true
    }

    /// Index after the cursor, clamped to the last entry
    pub fn next_index(&self) -> usize {
        (self.cursor + 1).min(self.len().saturating_sub(1))
    }

    /// Index before the cursor, clamped to the first entry
    pub fn previous_index(&self) -> usize {
        self.cursor.saturating_sub(1)
    }

    /// A playlist moves on when the active entry ends
    pub fn should_auto_advance(&self) -> bool {
        self.is_playlist() && self.cursor + 1 < self.len()
    }
}

/// Load the configured collection from the media catalog
///
/// Returns `None` when no collection is configured.
#[instrument(skip_all, fields(collection_id = ?options.collection_id))]
pub async fn load_collection(
    client: &dyn ContentClient,
    options: &CollectionOptions,
    authorization_token: Option<&str>,
) -> Result<Option<CollectionState>> {
    let Some(collection_id) = options.collection_id.as_deref() else {
        return Ok(None);
    };

    let catalog_hash = match (&options.catalog_version_hash, &options.catalog_object_id) {
        (Some(hash), _) => hash.clone(),
        (None, Some(object_id)) => client.latest_version_hash(object_id).await?,
        (None, None) => {
            return Err(Error::collection(
                "Invalid collection options: Media catalog not specified",
            ))
        }
    };

    let catalog = ContentRef {
        version_hash: Some(catalog_hash.clone()),
        authorization_token: authorization_token.map(str::to_string),
        ..Default::default()
    };

    let metadata = client.content_metadata(&catalog, COLLECTIONS_METADATA).await?;
    let label = options.catalog_object_id.clone().unwrap_or(catalog_hash);
    let state = CollectionState::from_metadata(collection_id, &label, &metadata)?;

    info!(
        entries = state.len(),
        playlist = state.is_playlist(),
        "Collection loaded"
    );

    Ok(Some(state))
}
