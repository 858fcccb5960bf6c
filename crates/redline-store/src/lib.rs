//! # redline-store
//!
//! Filesystem-backed storage for redline: folder/document blobs plus the
//! per-folder recommendation trail sidecar.

pub mod folders;
pub mod recommendations;

use std::path::PathBuf;
use std::sync::Arc;

pub use folders::{compute_content_hash, FsFolderStore};
pub use recommendations::{FsRecommendationStore, TRAIL_FILE};

/// Bundle of both stores rooted at one data directory.
///
/// The two stores share the directory layout: the folder store owns the
/// directories and document files, the recommendation store owns the trail
/// sidecar inside each folder.
#[derive(Clone)]
pub struct Store {
    folders: Arc<FsFolderStore>,
    recommendations: Arc<FsRecommendationStore>,
}

impl Store {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        Self {
            folders: Arc::new(FsFolderStore::new(base_path.clone())),
            recommendations: Arc::new(FsRecommendationStore::new(base_path)),
        }
    }

    pub fn folders(&self) -> Arc<FsFolderStore> {
        self.folders.clone()
    }

    pub fn recommendations(&self) -> Arc<FsRecommendationStore> {
        self.recommendations.clone()
    }

    /// Round-trip storage health check, run once at startup.
    pub async fn validate(&self) -> std::result::Result<(), String> {
        self.folders.validate().await
    }
}
