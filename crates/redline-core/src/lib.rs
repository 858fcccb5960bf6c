//! # redline-core
//!
//! Core types, traits, and abstractions for the redline review engine.
//!
//! This crate provides the foundational data structures and trait definitions
//! that other redline crates depend on.

pub mod defaults;
pub mod error;
pub mod file_safety;
pub mod logging;
pub mod models;
pub mod selection;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use file_safety::{
    detect_content_type, validate_file, validate_storage_name, ValidationResult,
};
pub use models::*;
pub use selection::{effective_decision, SelectionState};
pub use traits::*;
