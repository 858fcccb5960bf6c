//! Upload safety validation and storage name checks.
//!
//! Multi-layer protection for uploaded documents:
//! 1. Size cap
//! 2. Extension blocklist for executables
//! 3. Magic byte detection
//!
//! Plus name validation for folders and files, since both become path
//! components under the store root.

use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::defaults::FILENAME_MAX_LENGTH;
use crate::error::{Error, Result};

/// Magic byte signatures for executable files
pub const MAGIC_SIGNATURES: &[(&str, &[u8])] = &[
    ("Windows PE/MZ", &[0x4D, 0x5A]),
    ("ELF", &[0x7F, 0x45, 0x4C, 0x46]),
    ("Mach-O 32", &[0xFE, 0xED, 0xFA, 0xCE]),
    ("Mach-O 64", &[0xFE, 0xED, 0xFA, 0xCF]),
    ("WebAssembly", &[0x00, 0x61, 0x73, 0x6D]),
];

/// Blocked file extensions (case-insensitive)
static BLOCKED_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // Windows executables
        "exe", "dll", "scr", "pif", "com", "msi",
        // Unix binaries
        "so", "dylib", "out",
        // JVM
        "jar", "war", "class",
        // Packages
        "deb", "rpm", "apk", "dmg", "pkg",
        // Other dangerous
        "reg", "inf", "scf", "lnk", "hta",
    ]
    .into_iter()
    .collect()
});

/// Result of file safety validation
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub allowed: bool,
    pub block_reason: Option<String>,
}

impl ValidationResult {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            block_reason: None,
        }
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            block_reason: Some(reason.into()),
        }
    }
}

/// Validate an uploaded file against size and executable checks.
pub fn validate_file(filename: &str, data: &[u8], max_size_bytes: u64) -> ValidationResult {
    if data.len() as u64 > max_size_bytes {
        return ValidationResult::blocked(format!(
            "File exceeds maximum size of {} bytes",
            max_size_bytes
        ));
    }

    if let Some(ext) = filename.rsplit('.').next() {
        if BLOCKED_EXTENSIONS.contains(ext.to_lowercase().as_str()) {
            return ValidationResult::blocked(format!("File extension .{} is not allowed", ext));
        }
    }

    for (name, magic) in MAGIC_SIGNATURES {
        if data.len() >= magic.len() && &data[..magic.len()] == *magic {
            return ValidationResult::blocked(format!("Executable file detected: {}", name));
        }
    }

    ValidationResult::allowed()
}

/// Detect content type from magic bytes, falling back to extension.
pub fn detect_content_type(filename: &str, data: &[u8]) -> String {
    if let Some(kind) = infer::get(data) {
        return kind.mime_type().to_string();
    }

    if let Some(ext) = filename.rsplit('.').next() {
        if let Some(mime) = mime_from_extension(ext) {
            return mime.to_string();
        }
    }

    "application/octet-stream".to_string()
}

/// Extension-based MIME lookup for text formats with no magic bytes.
fn mime_from_extension(ext: &str) -> Option<&'static str> {
    match ext.to_lowercase().as_str() {
        "txt" => Some("text/plain"),
        "md" | "markdown" => Some("text/markdown"),
        "html" | "htm" => Some("text/html"),
        "css" => Some("text/css"),
        "csv" => Some("text/csv"),
        "json" => Some("application/json"),
        "xml" => Some("application/xml"),
        "yaml" | "yml" => Some("application/yaml"),
        _ => None,
    }
}

/// Validate a folder or file name before it becomes a path component.
///
/// Rejects empty names, path separators, traversal components, leading
/// dots (reserved for store sidecars), and over-long names.
pub fn validate_storage_name(kind: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{} name must not be empty", kind)));
    }
    if name.len() > FILENAME_MAX_LENGTH {
        return Err(Error::InvalidInput(format!(
            "{} name exceeds {} characters",
            kind, FILENAME_MAX_LENGTH
        )));
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(Error::InvalidInput(format!(
            "{} name must not contain path separators",
            kind
        )));
    }
    if name == "." || name == ".." || name.starts_with('.') {
        return Err(Error::InvalidInput(format!(
            "{} name must not start with a dot",
            kind
        )));
    }
    Ok(())
}
