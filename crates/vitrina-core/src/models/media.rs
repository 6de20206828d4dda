use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

/// Media kind enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "media_kind", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Folder segment used when deriving the remote storage folder.
    pub fn folder_segment(&self) -> &'static str {
        match self {
            MediaKind::Image => "images",
            MediaKind::Video => "videos",
        }
    }
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MediaKind::Image => write!(f, "image"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

impl FromStr for MediaKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(MediaKind::Image),
            "video" => Ok(MediaKind::Video),
            _ => Err(anyhow::anyhow!("Invalid media kind: {}", s)),
        }
    }
}

/// Media attachment record for a catalog item.
///
/// Tracks where the bytes currently live: `local_ref` points at staging
/// storage before ingestion, `remote_url`/`remote_id` are set once the
/// remote store holds the file. A record with `remote_url` set is terminal
/// and is never uploaded again.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct MediaRecord {
    pub id: Uuid,
    /// Owning catalog item. Back-reference only; the record does not own it.
    pub owner_id: Uuid,
    pub kind: MediaKind,
    pub original_filename: String,
    /// Staging-storage key. Present only before successful ingestion.
    pub local_ref: Option<String>,
    /// Remote URL. Immutable once set.
    pub remote_url: Option<String>,
    /// Opaque file id returned by the remote store, paired with `remote_url`.
    pub remote_id: Option<String>,
    pub is_primary: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaRecord {
    /// Build a fresh record pointing at staged local bytes.
    pub fn new_local(
        owner_id: Uuid,
        kind: MediaKind,
        original_filename: String,
        local_ref: String,
        sort_order: i32,
        is_primary: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            kind,
            original_filename,
            local_ref: Some(local_ref),
            remote_url: None,
            remote_id: None,
            is_primary,
            sort_order,
            created_at: now,
            updated_at: now,
        }
    }

    /// Terminal records have been ingested; the upload is never re-attempted.
    pub fn is_terminal(&self) -> bool {
        self.remote_url.is_some()
    }

    /// Inert records hold neither local nor remote bytes. Never enqueued.
    pub fn is_inert(&self) -> bool {
        self.local_ref.is_none() && self.remote_url.is_none()
    }

    /// Remote storage folder, derived deterministically from the owner and
    /// kind so repeated attempts target a stable location.
    pub fn remote_folder(&self) -> String {
        format!("/catalog/{}/{}", self.owner_id, self.kind.folder_segment())
    }
}
