//! # redline-inference
//!
//! Generation backends and the suggestion engine for redline: an Ollama
//! implementation of [`redline_core::GenerationBackend`], a deterministic
//! mock for tests, and the [`RewriteEngine`] that turns either into the
//! extraction/regeneration/chat surface.

pub mod engine;
pub mod mock;
pub mod ollama;

pub use engine::{revised_file_name, RewriteEngine};
pub use mock::{MockCall, MockGenerationBackend};
pub use ollama::OllamaBackend;
