//! Turns the Plex webhook payload into a typed [`RatingEvent`].
//!
//! Plex posts a loosely shaped JSON document for every library event. Only
//! `media.rate` events are relayed; everything else is acknowledged and
//! dropped by the caller.
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::warn;

pub const RATE_EVENT: &str = "media.rate";

// Positions inside `Metadata.Guid` that hold the per-network identifier.
const IMDB_GUID_INDEX: usize = 0;
const TVDB_GUID_INDEX: usize = 1;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("payload is missing required field `{0}`")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlexWebhook {
    pub event: Option<String>,
    pub rating: Option<f64>,
    #[serde(rename = "Account")]
    pub account: Option<PlexAccount>,
    #[serde(rename = "Metadata")]
    pub metadata: Option<PlexMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlexAccount {
    pub title: Option<String>,
    pub thumb: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlexMetadata {
    pub library_section_type: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub title: Option<String>,
    pub parent_title: Option<String>,
    pub grandparent_title: Option<String>,
    pub parent_index: Option<i64>,
    pub index: Option<i64>,
    pub summary: Option<String>,
    pub audience_rating: Option<f64>,
    pub thumb: Option<String>,
    pub parent_thumb: Option<String>,
    pub grandparent_thumb: Option<String>,
    pub guid: Option<String>,
    #[serde(rename = "Guid", default)]
    pub guids: Vec<PlexGuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlexGuid {
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Episode,
    Season,
    Movie,
    Other,
}

impl MediaKind {
    fn from_plex(kind: Option<&str>) -> Self {
        match kind {
            Some("episode") => MediaKind::Episode,
            Some("season") => MediaKind::Season,
            Some("movie") => MediaKind::Movie,
            _ => MediaKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DebounceKey(String);

impl DebounceKey {
    pub fn new(actor_name: &str, media_title: &str) -> Self {
        Self(format!("{}:{}", actor_name, media_title))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DebounceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RatingEvent {
    pub actor_name: String,
    /// Title as Plex reported it, before any formatting.
    pub media_title: String,
    /// Title shown in the notification.
    pub display_title: String,
    pub media_kind: MediaKind,
    pub rating: u32,
    pub summary: Option<String>,
    pub audience_rating: Option<f64>,
    pub artwork_path: String,
    pub external_ids: BTreeMap<String, String>,
    /// Markdown link to the external database page, when one could be derived.
    pub details_link: Option<String>,
    pub thumbnail_url: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl RatingEvent {
    pub fn debounce_key(&self) -> DebounceKey {
        DebounceKey::new(&self.actor_name, &self.media_title)
    }
}

pub fn parse_payload(raw: &str) -> Result<PlexWebhook, NormalizeError> {
    Ok(serde_json::from_str(raw)?)
}

/// Returns `Ok(None)` for events that are not ratings.
pub fn normalize(
    webhook: PlexWebhook,
    received_at: DateTime<Utc>,
) -> Result<Option<RatingEvent>, NormalizeError> {
    let event = webhook.event.ok_or(NormalizeError::MissingField("event"))?;
    if event != RATE_EVENT {
        return Ok(None);
    }

    let metadata = webhook
        .metadata
        .ok_or(NormalizeError::MissingField("Metadata"))?;
    let account = webhook
        .account
        .ok_or(NormalizeError::MissingField("Account"))?;
    let raw_rating = webhook.rating.ok_or(NormalizeError::MissingField("rating"))?;

    let actor_name = account
        .title
        .ok_or(NormalizeError::MissingField("Account.title"))?;
    let media_title = metadata
        .title
        .clone()
        .ok_or(NormalizeError::MissingField("Metadata.title"))?;
    let artwork_path = select_artwork(&metadata)
        .ok_or(NormalizeError::MissingField("Metadata.thumb"))?
        .to_string();

    let media_kind = MediaKind::from_plex(metadata.kind.as_deref());
    let display_title = format_title(media_kind, &metadata, &media_title);
    let details_link = details_link(&metadata);
    let external_ids = external_ids(&metadata.guids);

    Ok(Some(RatingEvent {
        actor_name,
        media_title,
        display_title,
        media_kind,
        rating: clamp_rating(raw_rating),
        summary: metadata.summary.filter(|s| !s.trim().is_empty()),
        audience_rating: metadata.audience_rating,
        artwork_path,
        external_ids,
        details_link,
        thumbnail_url: account.thumb,
        received_at,
    }))
}

/// Negative ratings (Plex uses -1 for "cleared") become 0. The upper bound is
/// left alone.
pub fn clamp_rating(raw: f64) -> u32 {
    if raw.is_nan() || raw < 0.0 {
        0
    } else {
        raw as u32
    }
}

fn select_artwork(metadata: &PlexMetadata) -> Option<&str> {
    metadata
        .grandparent_thumb
        .as_deref()
        .or(metadata.parent_thumb.as_deref())
        .or(metadata.thumb.as_deref())
}

fn format_title(kind: MediaKind, metadata: &PlexMetadata, title: &str) -> String {
    match kind {
        MediaKind::Episode => format!(
            "{} - {} (S{} · E{})",
            metadata.grandparent_title.as_deref().unwrap_or_default(),
            title,
            metadata.parent_index.unwrap_or_default(),
            metadata.index.unwrap_or_default()
        ),
        MediaKind::Season => format!(
            "{} - {}",
            metadata.parent_title.as_deref().unwrap_or_default(),
            title
        ),
        MediaKind::Movie | MediaKind::Other => title.to_string(),
    }
}

fn details_link(metadata: &PlexMetadata) -> Option<String> {
    match metadata.library_section_type.as_deref() {
        Some("show") => network_id(metadata, TVDB_GUID_INDEX)
            .map(|id| format!("[TheTVDB](https://thetvdb.com/?tab=series&id={id})")),
        Some("movie") => network_id(metadata, IMDB_GUID_INDEX)
            .map(|id| format!("[IMDb](https://www.imdb.com/title/{id})")),
        other => {
            warn!("{} is not handled!", other.unwrap_or("<missing section type>"));
            None
        }
    }
}

fn network_id(metadata: &PlexMetadata, index: usize) -> Option<String> {
    if !metadata.guids.is_empty() {
        return metadata
            .guids
            .get(index)
            .map(|g| after_scheme(&g.id).to_string());
    }
    metadata.guid.as_deref().map(legacy_guid_id)
}

fn after_scheme(id: &str) -> &str {
    id.rsplit("//").next().unwrap_or(id)
}

/// `com.plexapp.agents.thetvdb://81189/1/1?lang=en` -> `81189`
fn legacy_guid_id(guid: &str) -> String {
    let tail = after_scheme(guid);
    let tail = tail.split('?').next().unwrap_or(tail);
    let tail = tail.split('/').next().unwrap_or(tail);
    tail.rsplit('-').next().unwrap_or(tail).to_string()
}

fn external_ids(guids: &[PlexGuid]) -> BTreeMap<String, String> {
    guids
        .iter()
        .filter_map(|g| g.id.split_once("://"))
        .map(|(source, id)| (source.to_string(), id.to_string()))
        .collect()
}
