//! Landmark journal and pending-queue data model
//!
//! Both collections are persisted as JSON arrays. Field names follow the
//! on-device blob shape (`photo_uri`, `server_id`, `narrative_p1`, ...), so the
//! serde attributes below are part of the storage format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Server id of a record that has never been reconciled with the server
pub const UNASSIGNED_SERVER_ID: i64 = -1;

fn unassigned_server_id() -> i64 {
    UNASSIGNED_SERVER_ID
}

fn unknown_name() -> String {
    "Unknown".to_string()
}

/// Text form of a loosely typed analysis value; `null` has none
fn text_of(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Accepts strings, numbers, booleans and `null` (as "")
fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(text_of(Value::deserialize(deserializer)?).unwrap_or_default())
}

fn lenient_name<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(text_of(Value::deserialize(deserializer)?).unwrap_or_else(unknown_name))
}

/// One captured photo awaiting analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingItem {
    /// Stable identifier assigned at enqueue time; the placeholder record carries it too
    pub id: Uuid,

    /// Opaque reference to the local image bytes (path or `file://` URI)
    #[serde(rename = "photo_uri")]
    pub photo_ref: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,

    /// Set once at enqueue, never mutated
    pub created_at: DateTime<Utc>,
}

impl PendingItem {
    pub fn new(
        photo_ref: impl Into<String>,
        latitude: Option<f64>,
        longitude: Option<f64>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            photo_ref: photo_ref.into(),
            latitude,
            longitude,
            created_at,
        }
    }
}

/// Lifecycle of a journal record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// Placeholder for a queued photo that has not been analyzed yet
    Pending,
    /// Carries analysis results
    #[default]
    Analyzed,
}

/// Free-text analysis fields returned by the analyze endpoint
///
/// `status` is the landmark's designation ("UNESCO Site", "Historic Landmark", ...)
/// and has no bearing on [`RecordState`]. The model behind the endpoint does
/// not always answer with strings, so every field takes any scalar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkDetails {
    #[serde(default = "unknown_name", deserialize_with = "lenient_name")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub location: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub year_built: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub status: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub architect: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub capacity: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub narrative_p1: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub narrative_quote: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub narrative_p2: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub nearby1_name: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub nearby1_category: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub nearby2_name: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub nearby2_category: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub nearby3_name: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub nearby3_category: String,
}

/// A user-visible journal entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkRecord {
    #[serde(default = "unassigned_server_id")]
    pub server_id: i64,

    #[serde(rename = "photo_uri")]
    pub photo_ref: String,

    #[serde(default)]
    pub state: RecordState,

    /// Id of the originating [`PendingItem`] while this record is a placeholder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_id: Option<Uuid>,

    #[serde(flatten)]
    pub details: LandmarkDetails,

    #[serde(default)]
    pub is_saved: bool,

    /// 0 (unrated) to 5
    #[serde(default)]
    pub rating: u8,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,

    /// Language the analysis was requested in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl LandmarkRecord {
    /// Placeholder shown in the journal while `item` waits in the queue
    pub fn placeholder(item: &PendingItem) -> Self {
        Self {
            server_id: UNASSIGNED_SERVER_ID,
            photo_ref: item.photo_ref.clone(),
            state: RecordState::Pending,
            pending_id: Some(item.id),
            details: LandmarkDetails::default(),
            is_saved: true,
            rating: 0,
            created_at: item.created_at,
            latitude: item.latitude,
            longitude: item.longitude,
            language: None,
        }
    }

    /// Record produced by an immediate (interactive) analysis
    ///
    /// Not saved to the journal until the user asks for it.
    pub fn analyzed(
        photo_ref: impl Into<String>,
        server_id: i64,
        details: LandmarkDetails,
        latitude: Option<f64>,
        longitude: Option<f64>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            server_id,
            photo_ref: photo_ref.into(),
            state: RecordState::Analyzed,
            pending_id: None,
            details,
            is_saved: false,
            rating: 0,
            created_at,
            latitude,
            longitude,
            language: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state == RecordState::Pending
    }

    /// Rewrite a placeholder in place with analysis results
    ///
    /// `rating`, `is_saved`, `created_at` and coordinates are kept from the placeholder.
    pub fn reconcile(
        &mut self,
        server_id: i64,
        details: LandmarkDetails,
        prepared_ref: Option<String>,
        language: Option<String>,
    ) {
        self.server_id = server_id;
        self.details = details;
        self.state = RecordState::Analyzed;
        self.pending_id = None;
        if let Some(new_ref) = prepared_ref {
            self.photo_ref = new_ref;
        }
        if language.is_some() {
            self.language = language;
        }
    }
}
