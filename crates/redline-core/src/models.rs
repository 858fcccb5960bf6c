//! Core data models for redline.
//!
//! All wire-facing types serialize as camelCase JSON to match the REST
//! surface consumed by the review UI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tri-state status of a recommendation item.
///
/// `Pending` is the initial state. `Accepted`/`Rejected` are reached only
/// through an explicit decision call, and may be re-decided by a later call
/// naming the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

impl RecommendationStatus {
    /// Returns true once an explicit decision has been recorded.
    pub fn is_decided(&self) -> bool {
        !matches!(self, RecommendationStatus::Pending)
    }

    /// Parse from the lowercase storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecommendationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Accepted => write!(f, "accepted"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// One AI-suggested review point attached to a document version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationItem {
    /// Unique within the owning version. UUIDv7, so ids sort by creation time.
    pub id: Uuid,
    /// Free-text suggestion produced by the extraction engine.
    pub point: String,
    pub status: RecommendationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecommendationItem {
    /// Create a fresh pending item for a newly extracted point.
    pub fn pending(point: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            point: point.into(),
            status: RecommendationStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One immutable upload instance of a document, with its recommendation set.
///
/// Versions are append-only per document and numbered from 1. The item list
/// is mutable in status only; text and count are fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentVersion {
    pub document_name: String,
    pub version: i32,
    /// BLAKE3 hash of the uploaded bytes ("blake3:<hex>").
    pub content_hash: String,
    /// Insertion order = extraction order; preserved across reads.
    pub recommendations: Vec<RecommendationItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentVersion {
    /// Ids of items still awaiting a decision, in insertion order.
    pub fn pending_ids(&self) -> Vec<Uuid> {
        self.recommendations
            .iter()
            .filter(|r| r.status == RecommendationStatus::Pending)
            .map(|r| r.id)
            .collect()
    }
}

/// Read-only trail projection entry. Recomputed from stored versions on
/// every read; newest version first within each document.
pub type TrailEntry = DocumentVersion;

/// Which way a bulk decision goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    Accept,
    Reject,
}

/// A batch accept/reject operation against one version's recommendation ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    #[serde(default)]
    pub accept_ids: Vec<Uuid>,
    #[serde(default)]
    pub reject_ids: Vec<Uuid>,
}

impl Decision {
    /// A decision that names no ids (applying it is a no-op).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn accept(ids: Vec<Uuid>) -> Self {
        Self {
            accept_ids: ids,
            reject_ids: Vec::new(),
        }
    }

    pub fn reject(ids: Vec<Uuid>) -> Self {
        Self {
            accept_ids: Vec::new(),
            reject_ids: ids,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.accept_ids.is_empty() && self.reject_ids.is_empty()
    }

    /// Ids named in both sets. Well-formed calls have none; the store
    /// resolves any overlap with the reject-wins tie-break.
    pub fn overlapping_ids(&self) -> Vec<Uuid> {
        self.accept_ids
            .iter()
            .filter(|id| self.reject_ids.contains(id))
            .copied()
            .collect()
    }
}

/// Result of a chat-driven document regeneration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteOutcome {
    /// Full rewritten document text.
    pub modified_content: String,
    /// Name to save the rewritten document under ("spec.txt" -> "spec_revised.txt").
    pub suggested_file_name: String,
}

/// Reply from the conversational entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub reply: String,
    /// Number of recommendation points applied, present only when the
    /// engine detected an apply intent and performed a rewrite.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied: Option<usize>,
}
