//! Document Store (C1): persists document records and their version history.
//!
//! Two adapters satisfy [`DocumentStore`]: [`filesystem::FjallDocumentStore`] (embedded,
//! single-process, backed by `fjall`) and [`redis_store::RedisDocumentStore`]
//! (cross-process, backed by `redis`). Both honor the same save/load/list/version
//! contract; callers should not need to know which one is in use.

pub mod filesystem;
pub mod redis_store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Document kind, derived from the client-supplied kind or the file extension (see
/// [`Kind::from_extension`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Pdf,
    Word,
    Excel,
    Text,
    Json,
    Xml,
    Csv,
    Markdown,
    Webpage,
    Youtube,
    Podcast,
}

impl Kind {
    /// Maps a file extension (without the leading dot, any case) to a [`Kind`].
    ///
    /// Mirrors §6.2 of the specification: `.mp4` maps to the podcast/youtube media
    /// pipeline's audio-track extraction path, so it resolves to `Youtube` here.
    pub fn from_extension(ext: &str) -> Option<Self> {
        Some(match ext.to_ascii_lowercase().as_str() {
            "pdf" => Kind::Pdf,
            "doc" | "docx" => Kind::Word,
            "xls" | "xlsx" => Kind::Excel,
            "txt" => Kind::Text,
            "md" => Kind::Markdown,
            "json" => Kind::Json,
            "xml" => Kind::Xml,
            "csv" => Kind::Csv,
            "html" | "htm" => Kind::Webpage,
            "mp3" | "wav" => Kind::Podcast,
            "mp4" => Kind::Youtube,
            _ => return None,
        })
    }

    /// Direct-content kinds complete synchronously at submission time (§4.8); all
    /// others require asynchronous queue processing.
    pub fn is_direct_content(self) -> bool {
        matches!(self, Kind::Json | Kind::Xml | Kind::Csv | Kind::Markdown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// How the document entered the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "method", content = "reference")]
pub enum Origin {
    Upload(String),
    Url(String),
    Inline,
}

/// Opaque access-control labels. The core carries these through but never
/// interprets or enforces them (§3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessGroup {
    Me,
    Group,
    Company,
    World,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessPermission {
    Read,
    Write,
    SummaryOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub kind: Kind,
    pub name: String,
    pub origin: Origin,
    pub owner: String,
    pub access_group: AccessGroup,
    pub access_permission: AccessPermission,
    pub stage: ProcessingStage,
    pub raw_text: Option<String>,
    pub formatted_content: Option<String>,
    pub structured_data: Option<serde_json::Value>,
    pub embedding: Option<Vec<f32>>,
    pub summary: Option<String>,
    pub language: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub version: u64,
}

impl Document {
    /// Constructs a brand-new document at version 1, owned by `owner`.
    pub fn new(id: String, kind: Kind, name: String, origin: Origin, owner: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind,
            name,
            origin,
            owner,
            access_group: AccessGroup::Me,
            access_permission: AccessPermission::Read,
            stage: if kind.is_direct_content() {
                ProcessingStage::Completed
            } else {
                ProcessingStage::Pending
            },
            raw_text: None,
            formatted_content: None,
            structured_data: None,
            embedding: None,
            summary: None,
            language: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            deleted: false,
            deleted_at: None,
            deleted_by: None,
            version: 1,
        }
    }

    pub fn projection(&self) -> DocumentProjection {
        DocumentProjection {
            id: self.id.clone(),
            kind: self.kind,
            name: self.name.clone(),
            owner: self.owner.clone(),
            stage: self.stage,
            summary: self.summary.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted: self.deleted,
            version: self.version,
        }
    }
}

/// Lightweight view used by [`DocumentStore::list`]; carries only the fields a
/// listing UI needs, never the (possibly large) content facets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentProjection {
    pub id: String,
    pub kind: Kind,
    pub name: String,
    pub owner: String,
    pub stage: ProcessingStage,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
    pub version: u64,
}

/// One immutable version snapshot (§3.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentVersion {
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub change_description: String,
    pub commit_message: Option<String>,
    pub snapshot: Document,
}

/// Conjunctive filter for [`DocumentStore::list`]; unspecified fields match all.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub user: Option<String>,
    pub kind: Option<Kind>,
    pub limit: usize,
    pub offset: usize,
    pub include_deleted: bool,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend unavailable: {0}")]
    Backend(String),
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("version {version} not found for document {id}")]
    VersionNotFound { id: String, version: u64 },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// The Document Store contract (§4.1). Implementations must guarantee that `save`
/// is atomic with respect to readers and that `list` reflects a point-in-time
/// consistent view of the metadata projection.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn save(&self, doc: &Document) -> Result<()>;
    async fn load(&self, id: &str) -> Result<Option<Document>>;
    async fn delete(&self, id: &str, soft: bool, user: &str) -> Result<()>;
    async fn exists(&self, id: &str) -> Result<bool>;
    async fn list(&self, filter: ListFilter) -> Result<Vec<DocumentProjection>>;

    async fn save_version(&self, version: &DocumentVersion) -> Result<()>;
    async fn get_versions(&self, id: &str) -> Result<Vec<DocumentVersion>>;

    /// Loads version `n`, writes it back as a new version (`current + 1`) with a
    /// change record noting the revert, and returns the resulting document.
    async fn revert_to(&self, id: &str, n: u64, user: &str) -> Result<Document>;

    /// Naive case-insensitive substring match over name, raw text, and summary.
    /// Documented placeholder per Open Question 3 (SPEC_FULL §9) — not a full-text
    /// index.
    async fn search_documents(&self, query: &str, user: Option<&str>, limit: usize)
    -> Result<Vec<DocumentProjection>>;
}
