//! Suggestion extraction, document regeneration, and review chat.
//!
//! `RewriteEngine` turns any [`GenerationBackend`] into the AI surface the
//! rest of redline consumes. It never touches stored recommendation state;
//! persisting a regenerated document is the caller's decision.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, instrument, warn};

use redline_core::{ChatReply, GenerationBackend, Result, RewriteOutcome, SuggestionEngine};

/// Messages matching this are treated as a request to regenerate the
/// document rather than a question about it.
static APPLY_INTENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(apply|rewrite|regenerate|revise|incorporate|redo)\b")
        .expect("apply intent regex is valid")
});

const EXTRACT_SYSTEM: &str = "You are a meticulous document reviewer. You read a document and \
    produce concrete, actionable improvement recommendations. Respond with a JSON array of \
    strings, one recommendation per string, and nothing else.";

const REWRITE_SYSTEM: &str = "You are a careful technical editor. Rewrite the document applying \
    every listed recommendation. Preserve the document's structure and tone. Respond with the \
    full rewritten document and nothing else.";

const CHAT_SYSTEM: &str = "You are a review assistant. Answer questions about the document and \
    its recommendations concisely, grounding every answer in the provided text.";

/// [`SuggestionEngine`] implementation over a pluggable generation backend.
pub struct RewriteEngine<B: GenerationBackend> {
    backend: B,
}

impl<B: GenerationBackend> RewriteEngine<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

/// Derive the file name a regenerated document is saved under.
///
/// `spec.txt` -> `spec_revised.txt`; extensionless names get a plain suffix.
pub fn revised_file_name(document: &str) -> String {
    match document.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}_revised.{}", stem, ext),
        _ => format!("{}_revised", document),
    }
}

/// Parse model output into recommendation points.
///
/// Primary path is a JSON array of strings (the prompt asks for one, and the
/// Ollama backend enforces JSON format). Falls back to plain-line parsing
/// with bullet and numbering prefixes stripped, since smaller models drift.
fn parse_points(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();

    if let Ok(points) = serde_json::from_str::<Vec<String>>(trimmed) {
        return points
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
    }

    // Some models wrap the array in an object.
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(arr) = value
            .get("recommendations")
            .or_else(|| value.get("points"))
            .and_then(|v| v.as_array())
        {
            return arr
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }

    trimmed
        .lines()
        .map(strip_list_prefix)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

fn strip_list_prefix(line: &str) -> &str {
    let line = line.trim_start();
    if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
        return rest;
    }
    // Numbered prefixes like "1. " or "12) "
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return rest;
        }
    }
    line
}

fn numbered_points(points: &[String]) -> String {
    points
        .iter()
        .enumerate()
        .map(|(i, p)| format!("{}. {}", i + 1, p))
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl<B: GenerationBackend> SuggestionEngine for RewriteEngine<B> {
    #[instrument(skip(self, content), fields(subsystem = "inference", component = "rewrite", op = "extract", document = %document))]
    async fn extract(&self, document: &str, content: &str) -> Result<Vec<String>> {
        let prompt = format!(
            "Review the following document and list improvement recommendations.\n\n\
             Document name: {}\n\nDocument content:\n{}",
            document, content
        );

        let raw = self.backend.generate_json(EXTRACT_SYSTEM, &prompt).await?;
        let points = parse_points(&raw);
        if points.is_empty() {
            warn!(document = %document, response_len = raw.len(), "No recommendations parsed from model output");
        }
        debug!(result_count = points.len(), "Extraction complete");
        Ok(points)
    }

    #[instrument(skip(self, content, points), fields(subsystem = "inference", component = "rewrite", op = "rewrite", document = %document, point_count = points.len()))]
    async fn rewrite(
        &self,
        document: &str,
        content: &str,
        points: &[String],
    ) -> Result<RewriteOutcome> {
        let prompt = format!(
            "Rewrite this document applying all recommendations below.\n\n\
             Document name: {}\n\nRecommendations:\n{}\n\nDocument content:\n{}",
            document,
            numbered_points(points),
            content
        );

        let modified_content = self.backend.generate_with_system(REWRITE_SYSTEM, &prompt).await?;
        Ok(RewriteOutcome {
            modified_content,
            suggested_file_name: revised_file_name(document),
        })
    }

    #[instrument(skip(self, content, points, message), fields(subsystem = "inference", component = "rewrite", op = "chat", document = %document))]
    async fn chat(
        &self,
        document: &str,
        content: &str,
        points: &[String],
        message: &str,
    ) -> Result<ChatReply> {
        if APPLY_INTENT.is_match(message) {
            if points.is_empty() {
                return Ok(ChatReply {
                    reply: format!("There are no recommendations to apply to {}.", document),
                    applied: None,
                });
            }
            debug!(point_count = points.len(), "Apply intent detected, regenerating");
            let outcome = self.rewrite(document, content, points).await?;
            return Ok(ChatReply {
                reply: outcome.modified_content,
                applied: Some(points.len()),
            });
        }

        let prompt = format!(
            "Document name: {}\n\nDocument content:\n{}\n\nCurrent recommendations:\n{}\n\n\
             Question: {}",
            document,
            content,
            numbered_points(points),
            message
        );
        let reply = self.backend.generate_with_system(CHAT_SYSTEM, &prompt).await?;
        Ok(ChatReply {
            reply,
            applied: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockGenerationBackend;

    fn points(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn revised_file_name_inserts_suffix() {
        assert_eq!(revised_file_name("spec.txt"), "spec_revised.txt");
        assert_eq!(revised_file_name("contract.v2.md"), "contract.v2_revised.md");
        assert_eq!(revised_file_name("README"), "README_revised");
        assert_eq!(revised_file_name(".env"), ".env_revised");
    }

    #[test]
    fn parse_points_json_array() {
        let parsed = parse_points(r#"["Add a title", "Fix dates"]"#);
        assert_eq!(parsed, points(&["Add a title", "Fix dates"]));
    }

    #[test]
    fn parse_points_wrapped_object() {
        let parsed = parse_points(r#"{"recommendations": ["Add a title"]}"#);
        assert_eq!(parsed, points(&["Add a title"]));
    }

    #[test]
    fn parse_points_line_fallback() {
        let parsed = parse_points("- Add a title\n* Fix dates\n1. Name the parties\n\nPlain line");
        assert_eq!(
            parsed,
            points(&["Add a title", "Fix dates", "Name the parties", "Plain line"])
        );
    }

    #[test]
    fn parse_points_drops_empty_entries() {
        assert!(parse_points("").is_empty());
        assert!(parse_points(r#"["", "  "]"#).is_empty());
    }

    #[test]
    fn apply_intent_matching() {
        assert!(APPLY_INTENT.is_match("Please apply the recommendations"));
        assert!(APPLY_INTENT.is_match("REWRITE the doc"));
        assert!(APPLY_INTENT.is_match("can you regenerate it?"));
        assert!(!APPLY_INTENT.is_match("what does clause 3 mean?"));
        assert!(!APPLY_INTENT.is_match("is this applicable here?"));
    }

    #[tokio::test]
    async fn extract_parses_backend_output() {
        let backend = MockGenerationBackend::new()
            .with_fixed_response(r#"["Add a signature block", "Clarify term length"]"#);
        let engine = RewriteEngine::new(backend);

        let result = engine.extract("spec.txt", "some contract text").await.unwrap();
        assert_eq!(
            result,
            points(&["Add a signature block", "Clarify term length"])
        );
    }

    #[tokio::test]
    async fn rewrite_returns_content_and_name() {
        let backend = MockGenerationBackend::new().with_fixed_response("rewritten body");
        let engine = RewriteEngine::new(backend);

        let outcome = engine
            .rewrite("spec.txt", "body", &points(&["a"]))
            .await
            .unwrap();
        assert_eq!(outcome.modified_content, "rewritten body");
        assert_eq!(outcome.suggested_file_name, "spec_revised.txt");
    }

    #[tokio::test]
    async fn chat_apply_intent_triggers_rewrite() {
        let backend = MockGenerationBackend::new().with_fixed_response("new document text");
        let engine = RewriteEngine::new(backend);

        let reply = engine
            .chat("spec.txt", "body", &points(&["a", "b"]), "apply the changes")
            .await
            .unwrap();
        assert_eq!(reply.reply, "new document text");
        assert_eq!(reply.applied, Some(2));
    }

    #[tokio::test]
    async fn chat_apply_intent_with_no_points_is_a_no_op() {
        let backend = MockGenerationBackend::new();
        let engine = RewriteEngine::new(backend);

        let reply = engine
            .chat("spec.txt", "body", &[], "apply everything")
            .await
            .unwrap();
        assert!(reply.applied.is_none());
        // No generation call is made for an empty apply.
        assert_eq!(engine.backend().generate_call_count(), 0);
    }

    #[tokio::test]
    async fn chat_question_answers_without_applying() {
        let backend = MockGenerationBackend::new().with_fixed_response("It means net 30.");
        let engine = RewriteEngine::new(backend);

        let reply = engine
            .chat("spec.txt", "body", &points(&["a"]), "what does clause 3 mean?")
            .await
            .unwrap();
        assert_eq!(reply.reply, "It means net 30.");
        assert!(reply.applied.is_none());
    }
}
