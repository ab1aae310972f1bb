//! Cross-process Document Store backed by Redis.
//!
//! Grounded on the `redis` crate usage in the video-generation worker reference
//! example (manual `redis::Value` parsing, explicit key namespacing) and on the
//! key-layout conventions in SPEC_FULL §6.3. Every `load` refreshes the document's
//! TTL so actively-read documents are never evicted out from under a worker.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use super::{
    Document, DocumentProjection, DocumentStore, DocumentVersion, ListFilter, Result, StoreError,
};

/// TTL applied (and refreshed on read) to every stored document, in seconds.
/// Chosen generously since the Redis adapter is meant for active working sets,
/// not cold archival storage.
const DOCUMENT_TTL_SECS: i64 = 7 * 24 * 3600;

fn doc_key(id: &str) -> String {
    format!("doc:{id}")
}

fn versions_key(id: &str) -> String {
    format!("doc:versions:{id}")
}

const INDEX_KEY: &str = "doc:index";

pub struct RedisDocumentStore {
    conn: ConnectionManager,
}

impl RedisDocumentStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| StoreError::Backend(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl DocumentStore for RedisDocumentStore {
    async fn save(&self, doc: &Document) -> Result<()> {
        let mut conn = self.conn.clone();
        let body = serde_json::to_string(doc)?;

        let _: () = conn
            .set_ex(doc_key(&doc.id), &body, DOCUMENT_TTL_SECS as u64)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let _: () = conn
            .zadd(INDEX_KEY, &doc.id, doc.updated_at.timestamp())
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        if doc.version == 1 {
            let version = DocumentVersion {
                version: 1,
                timestamp: doc.created_at,
                user: doc.owner.clone(),
                change_description: "created".to_string(),
                commit_message: None,
                snapshot: doc.clone(),
            };
            self.save_version(&version).await?;
        }
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Document>> {
        let mut conn = self.conn.clone();
        let body: Option<String> = conn
            .get(doc_key(id))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let Some(body) = body else { return Ok(None) };

        let _: () = conn
            .expire(doc_key(id), DOCUMENT_TTL_SECS)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Some(serde_json::from_str(&body)?))
    }

    async fn delete(&self, id: &str, soft: bool, user: &str) -> Result<()> {
        if soft {
            let mut doc = self
                .load(id)
                .await?
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            doc.deleted = true;
            doc.deleted_at = Some(chrono::Utc::now());
            doc.deleted_by = Some(user.to_string());
            doc.version += 1;
            doc.updated_at = chrono::Utc::now();
            self.save(&doc).await?;
        } else {
            let mut conn = self.conn.clone();
            let _: () = conn
                .del(doc_key(id))
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let _: () = conn
                .del(versions_key(id))
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let _: () = conn
                .zrem(INDEX_KEY, id)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        Ok(())
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn
            .exists(doc_key(id))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(exists)
    }

    async fn list(&self, filter: ListFilter) -> Result<Vec<DocumentProjection>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .zrevrange(INDEX_KEY, 0, -1)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut projections = Vec::new();
        for id in ids {
            let Some(doc) = self.load(&id).await? else {
                continue;
            };
            if !filter.include_deleted && doc.deleted {
                continue;
            }
            if let Some(user) = &filter.user {
                if &doc.owner != user {
                    continue;
                }
            }
            if let Some(kind) = filter.kind {
                if doc.kind != kind {
                    continue;
                }
            }
            projections.push(doc.projection());
        }

        let limit = if filter.limit == 0 {
            projections.len()
        } else {
            filter.limit
        };
        Ok(projections
            .into_iter()
            .skip(filter.offset)
            .take(limit)
            .collect())
    }

    async fn save_version(&self, version: &DocumentVersion) -> Result<()> {
        let mut conn = self.conn.clone();
        let body = serde_json::to_string(version)?;
        let _: () = conn
            .hset(versions_key(&version.snapshot.id), version.version, body)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_versions(&self, id: &str) -> Result<Vec<DocumentVersion>> {
        let mut conn = self.conn.clone();
        let fields: Vec<(u64, String)> = conn
            .hgetall(versions_key(id))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut versions = Vec::with_capacity(fields.len());
        for (_, body) in fields {
            versions.push(serde_json::from_str::<DocumentVersion>(&body)?);
        }
        versions.sort_by_key(|v| v.version);
        Ok(versions)
    }

    async fn revert_to(&self, id: &str, n: u64, user: &str) -> Result<Document> {
        let versions = self.get_versions(id).await?;
        let target = versions
            .iter()
            .find(|v| v.version == n)
            .ok_or_else(|| StoreError::VersionNotFound {
                id: id.to_string(),
                version: n,
            })?;

        let current = self
            .load(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut reverted = target.snapshot.clone();
        reverted.version = current.version + 1;
        reverted.updated_at = chrono::Utc::now();
        self.save(&reverted).await?;

        self.save_version(&DocumentVersion {
            version: reverted.version,
            timestamp: reverted.updated_at,
            user: user.to_string(),
            change_description: format!("reverted to version {n}"),
            commit_message: None,
            snapshot: reverted.clone(),
        })
        .await?;

        Ok(reverted)
    }

    async fn search_documents(
        &self,
        query: &str,
        user: Option<&str>,
        limit: usize,
    ) -> Result<Vec<DocumentProjection>> {
        let needle = query.to_ascii_lowercase();
        let all = self
            .list(ListFilter {
                user: user.map(|s| s.to_string()),
                ..Default::default()
            })
            .await?;

        let mut matches = Vec::new();
        for projection in all {
            let Some(doc) = self.load(&projection.id).await? else {
                continue;
            };
            let haystacks = [
                Some(doc.name.to_ascii_lowercase()),
                doc.raw_text.as_ref().map(|s| s.to_ascii_lowercase()),
                doc.summary.as_ref().map(|s| s.to_ascii_lowercase()),
            ];
            if haystacks
                .iter()
                .flatten()
                .any(|field| field.contains(&needle))
            {
                matches.push(projection);
            }
        }
        matches.truncate(if limit == 0 { matches.len() } else { limit });
        Ok(matches)
    }
}
