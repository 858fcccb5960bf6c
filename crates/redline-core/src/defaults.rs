//! Central defaults for redline configuration.
//!
//! Every tunable lives here so operational limits are discoverable in one
//! place. Environment variables override these at startup.

/// Default HTTP listen port (`PORT`).
pub const SERVER_PORT: u16 = 3000;

/// Default data directory for the filesystem store (`REDLINE_DATA_DIR`).
pub const DATA_DIR: &str = "/var/lib/redline/data";

/// Maximum size of a single uploaded file in bytes (10 MB).
pub const MAX_UPLOAD_SIZE_BYTES: u64 = 10 * 1024 * 1024;

/// Maximum HTTP request body size in bytes (12 MB, upload plus multipart
/// framing overhead).
pub const MAX_BODY_SIZE_BYTES: usize = 12 * 1024 * 1024;

/// Maximum length of a folder or file name in characters.
pub const FILENAME_MAX_LENGTH: usize = 255;

/// Rate limit: requests allowed per period per client.
pub const RATE_LIMIT_REQUESTS: u32 = 100;

/// Rate limit period in seconds.
pub const RATE_LIMIT_PERIOD_SECS: u64 = 60;

/// CORS preflight cache duration in seconds.
pub const CORS_MAX_AGE_SECS: u64 = 3600;

/// Default Ollama server URL (`OLLAMA_BASE`).
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default generation model (`OLLAMA_GEN_MODEL`).
pub const GEN_MODEL: &str = "llama3.2";

/// Generation request timeout in seconds (`REDLINE_GEN_TIMEOUT_SECS`).
pub const GEN_TIMEOUT_SECS: u64 = 120;

/// Threshold above which a generation call is logged as slow.
pub const SLOW_GENERATION_SECS: u64 = 30;

/// Characters of prompt/response text included in debug logs.
pub const LOG_PREVIEW_LENGTH: usize = 200;
