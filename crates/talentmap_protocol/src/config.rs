//! Runtime configuration knobs shared across the pipeline.
//!
//! Every knob has a canonical default and an environment override. Callers
//! construct one `Config` at startup and pass it down; nothing in the core
//! reads the environment after init.

use std::path::PathBuf;

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;
pub const DEFAULT_FILE_TTL_SECS: u64 = 3600;
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.70;
pub const DEFAULT_STREAM_ROW_THRESHOLD: usize = 50_000;

/// Ingestion over this wall-clock budget is a hard failure.
pub const INGEST_TIMEOUT_SECS: u64 = 30;
/// An embedding index build over this budget is abandoned (degraded mode).
pub const EMBED_BUILD_TIMEOUT_SECS: u64 = 60;
/// Resolution over this budget only warns (soft limit, <= 100 columns).
pub const RESOLVE_SOFT_TIMEOUT_SECS: u64 = 5;

pub const ENV_MAX_UPLOAD_BYTES: &str = "TALENTMAP_MAX_UPLOAD_BYTES";
pub const ENV_FILE_TTL_SECS: &str = "TALENTMAP_FILE_TTL_SECS";
pub const ENV_EMBED_CACHE_DIR: &str = "TALENTMAP_EMBED_CACHE_DIR";
pub const ENV_MIN_CONFIDENCE: &str = "TALENTMAP_MIN_CONFIDENCE";
pub const ENV_STREAM_ROW_THRESHOLD: &str = "TALENTMAP_STREAM_ROW_THRESHOLD";

/// Canonical pipeline configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Upfront size gate for uploads.
    pub max_upload_bytes: u64,
    /// Seconds an ingested table stays in the store after last access.
    pub file_ttl_secs: u64,
    /// Directory for persisted embedding matrices. None means the
    /// application home default (resolved by the facade).
    pub embed_cache_dir: Option<PathBuf>,
    /// Resolver commit floor for the fuzzy stage.
    pub min_confidence: f64,
    /// Row count above which XML emission writes in batches.
    pub stream_row_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            file_ttl_secs: DEFAULT_FILE_TTL_SECS,
            embed_cache_dir: None,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            stream_row_threshold: DEFAULT_STREAM_ROW_THRESHOLD,
        }
    }
}

impl Config {
    /// Build a config from defaults plus environment overrides.
    /// Malformed values are ignored with a warning rather than failing init.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = read_env_parsed::<u64>(ENV_MAX_UPLOAD_BYTES) {
            config.max_upload_bytes = v;
        }
        if let Some(v) = read_env_parsed::<u64>(ENV_FILE_TTL_SECS) {
            config.file_ttl_secs = v;
        }
        if let Ok(dir) = std::env::var(ENV_EMBED_CACHE_DIR) {
            if !dir.trim().is_empty() {
                config.embed_cache_dir = Some(PathBuf::from(dir));
            }
        }
        if let Some(v) = read_env_parsed::<f64>(ENV_MIN_CONFIDENCE) {
            if (0.0..=1.0).contains(&v) {
                config.min_confidence = v;
            } else {
                tracing::warn!(value = v, "{} outside [0,1]; keeping default", ENV_MIN_CONFIDENCE);
            }
        }
        if let Some(v) = read_env_parsed::<usize>(ENV_STREAM_ROW_THRESHOLD) {
            config.stream_row_threshold = v;
        }
        config
    }
}

fn read_env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(%name, %raw, "ignoring unparseable environment override");
            None
        }
    }
}
