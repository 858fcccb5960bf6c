//! Recommendation trail storage.
//!
//! Each folder carries one JSON sidecar (`.redline-trail.json`) holding every
//! document version and its recommendation items. The sidecar lives inside
//! the folder directory, so deleting a folder deletes its trail with it and
//! no separate cascade is needed.
//!
//! All mutations go through a single async mutex and an atomic temp+rename
//! write, so concurrent uploads and decisions against one store never
//! interleave partial sidecar states.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use uuid::Uuid;

use redline_core::{
    Decision, DocumentVersion, Error, RecommendationItem, RecommendationStatus,
    RecommendationStore, Result, TrailEntry,
};

/// Sidecar file name, dot-prefixed so folder listings never surface it.
pub const TRAIL_FILE: &str = ".redline-trail.json";

/// On-disk shape of a folder's trail sidecar.
///
/// Versions are stored per document in ascending version order; the trail
/// projection reverses them on read.
#[derive(Debug, Default, Serialize, Deserialize)]
struct TrailFile {
    documents: BTreeMap<String, Vec<DocumentVersion>>,
}

/// Filesystem implementation of [`RecommendationStore`].
pub struct FsRecommendationStore {
    base_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FsRecommendationStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn trail_path(&self, folder: &str) -> PathBuf {
        self.base_path.join(folder).join(TRAIL_FILE)
    }

    async fn load(&self, folder: &str) -> Result<TrailFile> {
        let folder_dir = self.base_path.join(folder);
        if !fs::try_exists(&folder_dir).await? {
            return Err(Error::FolderNotFound(folder.to_string()));
        }

        let path = self.trail_path(folder);
        if !fs::try_exists(&path).await? {
            return Ok(TrailFile::default());
        }

        let bytes = fs::read(&path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn save(&self, folder: &str, trail: &TrailFile) -> Result<()> {
        let path = self.trail_path(folder);
        let data = serde_json::to_vec_pretty(trail)?;

        // Atomic write: temp file + rename
        let temp_path = path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp_path, &path).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl RecommendationStore for FsRecommendationStore {
    #[instrument(skip(self, points), fields(point_count = points.len()))]
    async fn create_version(
        &self,
        folder: &str,
        document: &str,
        points: Vec<String>,
        content_hash: &str,
    ) -> Result<DocumentVersion> {
        let _guard = self.write_lock.lock().await;
        let mut trail = self.load(folder).await?;

        let versions = trail.documents.entry(document.to_string()).or_default();
        let next = versions.last().map(|v| v.version).unwrap_or(0) + 1;

        let now = Utc::now();
        let version = DocumentVersion {
            document_name: document.to_string(),
            version: next,
            content_hash: content_hash.to_string(),
            recommendations: points.into_iter().map(RecommendationItem::pending).collect(),
            created_at: now,
            updated_at: now,
        };
        versions.push(version.clone());

        self.save(folder, &trail).await?;
        debug!(folder = %folder, document = %document, version = next, "trail: version created");
        Ok(version)
    }

    async fn trail(&self, folder: &str, document: Option<&str>) -> Result<Vec<TrailEntry>> {
        let trail = self.load(folder).await?;

        let mut entries = Vec::new();
        for (name, versions) in &trail.documents {
            if let Some(filter) = document {
                if name != filter {
                    continue;
                }
            }
            // Newest version first within each document
            entries.extend(versions.iter().rev().cloned());
        }
        Ok(entries)
    }

    async fn get_version(
        &self,
        folder: &str,
        document: &str,
        version: i32,
    ) -> Result<DocumentVersion> {
        let trail = self.load(folder).await?;
        trail
            .documents
            .get(document)
            .and_then(|versions| versions.iter().find(|v| v.version == version))
            .cloned()
            .ok_or_else(|| Error::VersionNotFound {
                document: document.to_string(),
                version,
            })
    }

    #[instrument(skip(self, decision), fields(accepts = decision.accept_ids.len(), rejects = decision.reject_ids.len()))]
    async fn decide(
        &self,
        folder: &str,
        document: &str,
        version: i32,
        decision: &Decision,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut trail = self.load(folder).await?;

        let entry = trail
            .documents
            .get_mut(document)
            .and_then(|versions| versions.iter_mut().find(|v| v.version == version))
            .ok_or_else(|| Error::VersionNotFound {
                document: document.to_string(),
                version,
            })?;

        let now = Utc::now();
        let mut touched = 0usize;

        // Accepts first, rejects second: an id named in both sets ends up
        // rejected. Ids not present in this version are skipped.
        for (ids, status) in [
            (&decision.accept_ids, RecommendationStatus::Accepted),
            (&decision.reject_ids, RecommendationStatus::Rejected),
        ] {
            for id in ids {
                if let Some(item) = entry.recommendations.iter_mut().find(|r| r.id == *id) {
                    item.status = status;
                    item.updated_at = now;
                    touched += 1;
                }
            }
        }

        if touched > 0 {
            entry.updated_at = now;
            self.save(folder, &trail).await?;
        }
        debug!(folder = %folder, document = %document, version, touched, "trail: decision applied");
        Ok(())
    }

    async fn pending_ids(&self, folder: &str, document: &str, version: i32) -> Result<Vec<Uuid>> {
        Ok(self.get_version(folder, document, version).await?.pending_ids())
    }
}
