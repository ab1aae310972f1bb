//! Embedded, single-process Document Store backed by `fjall`.
//!
//! Grounded on the teacher's `ledger::store::FjallStore` (keyspace + named
//! partitions, JSON snapshots, zero-padded lexicographic keys for ordered range
//! scans over a document's versions).

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use fjall::{Config as FjallConfig, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::debug;

use super::{
    Document, DocumentProjection, DocumentStore, DocumentVersion, ListFilter, Result, StoreError,
};

fn doc_key(id: &str) -> String {
    format!("doc:{id}")
}

fn version_key(id: &str, version: u64) -> String {
    format!("ver:{id}:{version:016}")
}

fn version_prefix(id: &str) -> String {
    format!("ver:{id}:")
}

/// Embedded document store. All partitions live in one `fjall` keyspace rooted at
/// the configured directory.
pub struct FjallDocumentStore {
    keyspace: Keyspace,
    documents: PartitionHandle,
    versions: PartitionHandle,
}

impl FjallDocumentStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Backend(format!("failed to create {parent:?}: {e}")))?;
        }

        let keyspace = FjallConfig::new(path)
            .open()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let documents = keyspace
            .open_partition("documents", PartitionCreateOptions::default())
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let versions = keyspace
            .open_partition("versions", PartitionCreateOptions::default())
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self {
            keyspace,
            documents,
            versions,
        })
    }

    fn get_document(&self, id: &str) -> Result<Option<Document>> {
        match self
            .documents
            .get(doc_key(id))
            .map_err(|e| StoreError::Backend(e.to_string()))?
        {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_document(&self, doc: &Document) -> Result<()> {
        let bytes = serde_json::to_vec(doc)?;
        self.documents
            .insert(doc_key(&doc.id), bytes)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FjallDocumentStore {
    async fn save(&self, doc: &Document) -> Result<()> {
        self.put_document(doc)?;
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
        debug!(document_id = %doc.id, version = doc.version, "saved document");
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Document>> {
        self.get_document(id)
    }

    async fn delete(&self, id: &str, soft: bool, user: &str) -> Result<()> {
        if soft {
            let mut doc = self
                .get_document(id)?
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            doc.deleted = true;
            doc.deleted_at = Some(Utc::now());
            doc.deleted_by = Some(user.to_string());
            doc.version += 1;
            doc.updated_at = Utc::now();
            self.put_document(&doc)?;
        } else {
            self.documents
                .remove(doc_key(id))
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let prefix = version_prefix(id);
            let mut keys = Vec::new();
            for entry in self.versions.iter() {
                let (key, _) = entry.map_err(|e| StoreError::Backend(e.to_string()))?;
                if key.starts_with(prefix.as_bytes()) {
                    keys.push(key);
                }
            }
            for key in keys {
                self.versions
                    .remove(key)
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
            }
        }
        Ok(())
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self
            .documents
            .get(doc_key(id))
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .is_some())
    }

    async fn list(&self, filter: ListFilter) -> Result<Vec<DocumentProjection>> {
        let mut projections = Vec::new();
        for entry in self.documents.iter() {
            let (_, value) = entry.map_err(|e| StoreError::Backend(e.to_string()))?;
            let doc: Document = serde_json::from_slice(&value)?;

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

        projections.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

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
        let bytes = serde_json::to_vec(version)?;
        self.versions
            .insert(version_key(&version.snapshot.id, version.version), bytes)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        self.keyspace
            .persist(fjall::PersistMode::Buffer)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_versions(&self, id: &str) -> Result<Vec<DocumentVersion>> {
        let prefix = version_prefix(id);
        let mut versions = Vec::new();
        for entry in self.versions.iter() {
            let (key, value) = entry.map_err(|e| StoreError::Backend(e.to_string()))?;
            if !key.starts_with(prefix.as_bytes()) {
                continue;
            }
            versions.push(serde_json::from_slice(&value)?);
        }
        versions.sort_by_key(|v: &DocumentVersion| v.version);
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
            .get_document(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut reverted = target.snapshot.clone();
        reverted.version = current.version + 1;
        reverted.updated_at = Utc::now();
        self.put_document(&reverted)?;

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
        let mut matches = Vec::new();
        for entry in self.documents.iter() {
            let (_, value) = entry.map_err(|e| StoreError::Backend(e.to_string()))?;
            let doc: Document = serde_json::from_slice(&value)?;
            if doc.deleted {
                continue;
            }
            if let Some(user) = user {
                if doc.owner != user {
                    continue;
                }
            }
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
                matches.push(doc.projection());
            }
        }
        matches.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        matches.truncate(if limit == 0 { matches.len() } else { limit });
        Ok(matches)
    }
}
