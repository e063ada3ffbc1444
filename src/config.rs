//! Process-wide configuration.
//!
//! Everything is read from the environment exactly once at startup and
//! passed into the components that need it. Deep call paths never touch
//! env vars directly.

use std::env;
use std::time::Duration;

pub const DEFAULT_VISION_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_SIDECAR_URL: &str = "http://localhost:3001";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Immutable settings shared across all requests.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Gemini API key. Absence is not fatal at startup: the text-based
    /// pipeline works without it, and the vision path fails fast with a
    /// 503 when it is missing.
    pub gemini_api_key: Option<String>,
    pub vision_model: String,
    pub ocr_sidecar_url: String,
    pub max_upload_bytes: usize,
    pub fetch_timeout: Duration,
    pub vision_timeout: Duration,
    pub bind_addr: String,
}

impl Settings {
    pub fn from_env() -> Self {
        let gemini_api_key = env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty());

        Self {
            gemini_api_key,
            vision_model: env::var("VISION_MODEL")
                .unwrap_or_else(|_| DEFAULT_VISION_MODEL.to_string()),
            ocr_sidecar_url: env::var("OCR_SIDECAR_URL")
                .unwrap_or_else(|_| DEFAULT_SIDECAR_URL.to_string()),
            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            fetch_timeout: Duration::from_secs(30),
            vision_timeout: Duration::from_secs(90),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            ocr_sidecar_url: DEFAULT_SIDECAR_URL.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            fetch_timeout: Duration::from_secs(30),
            vision_timeout: Duration::from_secs(90),
            bind_addr: "0.0.0.0:3000".to_string(),
        }
    }
}
