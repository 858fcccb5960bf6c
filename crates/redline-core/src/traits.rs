//! Core traits for redline abstractions.
//!
//! These traits define the seams between the recommendation store, the
//! folder/document blob store, and the AI engine, enabling pluggable
//! backends and testability.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// RECOMMENDATION STORE
// =============================================================================

/// Owner of persisted recommendation state, per `(folder, document, version)`.
///
/// No other component mutates recommendation items directly.
#[async_trait]
pub trait RecommendationStore: Send + Sync {
    /// Record version N+1 of a document with all items `Pending`.
    ///
    /// Called after upload/extraction completes. Fails with
    /// `Error::FolderNotFound` if the folder does not exist. An empty point
    /// list is allowed and produces a version with no recommendations.
    async fn create_version(
        &self,
        folder: &str,
        document: &str,
        points: Vec<String>,
        content_hash: &str,
    ) -> Result<DocumentVersion>;

    /// Read the trail: every version (optionally filtered to one document),
    /// newest version first within each document, recommendations in
    /// extraction order. Never mutates state.
    ///
    /// A folder with no documents yields an empty list; a missing folder
    /// yields `Error::FolderNotFound`.
    async fn trail(&self, folder: &str, document: Option<&str>) -> Result<Vec<TrailEntry>>;

    /// Fetch one version. `Error::VersionNotFound` when absent.
    async fn get_version(
        &self,
        folder: &str,
        document: &str,
        version: i32,
    ) -> Result<DocumentVersion>;

    /// Apply a batch decision to one version.
    ///
    /// Accepts are applied before rejects, so an id named in both sets ends
    /// up rejected. Ids not present in the version are silently ignored
    /// (the UI may send stale ids after a concurrent refresh). Touched items
    /// and the version itself get their `updated_at` bumped. Idempotent per
    /// id.
    async fn decide(
        &self,
        folder: &str,
        document: &str,
        version: i32,
        decision: &Decision,
    ) -> Result<()>;

    /// Ids of currently pending items in a version, in extraction order.
    /// Callers use this for the accept-all-pending fallback.
    async fn pending_ids(&self, folder: &str, document: &str, version: i32) -> Result<Vec<Uuid>>;
}

// =============================================================================
// FOLDER / DOCUMENT BLOB STORE
// =============================================================================

/// Opaque blob storage addressed by `(folder, filename)`.
///
/// This is the interface of the external file store; redline ships a
/// filesystem implementation but owns none of its internals.
#[async_trait]
pub trait FolderStore: Send + Sync {
    /// Create a folder. `Error::InvalidInput` on a bad name.
    async fn create_folder(&self, name: &str) -> Result<()>;

    /// List folder names, sorted.
    async fn list_folders(&self) -> Result<Vec<String>>;

    /// Delete a folder and everything in it. Hard cascade: reads started
    /// after a successful delete must not observe the folder.
    async fn delete_folder(&self, name: &str) -> Result<()>;

    async fn folder_exists(&self, name: &str) -> Result<bool>;

    /// List file names in a folder, sorted.
    async fn list_files(&self, folder: &str) -> Result<Vec<String>>;

    /// Store file bytes, overwriting any previous content.
    async fn put_file(&self, folder: &str, filename: &str, data: &[u8]) -> Result<()>;

    /// Fetch file bytes. `Error::DocumentNotFound` when absent.
    async fn get_file(&self, folder: &str, filename: &str) -> Result<Vec<u8>>;

    async fn delete_file(&self, folder: &str, filename: &str) -> Result<()>;
}

// =============================================================================
// INFERENCE
// =============================================================================

/// Backend for text generation (LLM).
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text given a prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate text with system context.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Generate with JSON format enforcement (backend guarantees valid JSON).
    async fn generate_json(&self, system: &str, prompt: &str) -> Result<String>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// The AI engine boundary: suggestion extraction, regeneration, and chat.
///
/// Consumed as a black box. Implementations never mutate recommendation
/// state; regeneration is advisory and persistence of its output is a
/// separate, caller-initiated step.
#[async_trait]
pub trait SuggestionEngine: Send + Sync {
    /// Produce review suggestions for a freshly uploaded document.
    async fn extract(&self, document: &str, content: &str) -> Result<Vec<String>>;

    /// Rewrite the document applying the given recommendation points.
    /// All points are passed regardless of their stored status.
    async fn rewrite(
        &self,
        document: &str,
        content: &str,
        points: &[String],
    ) -> Result<RewriteOutcome>;

    /// Free-text Q&A over the document and its recommendations. The engine
    /// owns the contract for what counts as an "apply" intent; when it
    /// detects one it performs the same rewrite and reports how many points
    /// were applied.
    async fn chat(
        &self,
        document: &str,
        content: &str,
        points: &[String],
        message: &str,
    ) -> Result<ChatReply>;
}
