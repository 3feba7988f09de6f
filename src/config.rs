use std::time::Duration;

use serde::Deserialize;

/// Number of chunks to mark as immediately needed at the start of a request window.
pub const IMMEDIATE_CHUNK_COUNT: usize = 4;

/// Forward lookahead prioritized at high level beyond the requested window (16 MiB).
pub const FORWARD_LOOKAHEAD_BYTES: u64 = 16 * 1024 * 1024;

/// Backward window prioritized at medium level before the requested window (2 MiB).
pub const BACKWARD_LOOKAHEAD_BYTES: u64 = 2 * 1024 * 1024;

/// In-memory range cache capacity (256 MiB).
pub const CACHE_CAPACITY_BYTES: u64 = 256 * 1024 * 1024;

/// Range cache entry time-to-live.
pub const CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Registry-level inactivity after which a session is torn down.
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// How long to wait for engine metadata before giving up on a session.
pub const METADATA_TIMEOUT: Duration = Duration::from_secs(60);

/// Period between janitor sweeps of the artifact store.
pub const JANITOR_SWEEP_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// How long an artifact directory may sit idle before a sweep removes it.
pub const ARTIFACT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Top-level configuration for the streaming engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Directory holding per-content artifact subdirectories.
    pub data_dir: String,
    /// In-memory range cache capacity in bytes.
    pub cache_capacity_bytes: u64,
    /// Range cache entry TTL in seconds.
    pub cache_ttl_secs: u64,
    /// Session idle timeout in seconds.
    pub session_idle_secs: u64,
    /// Metadata readiness deadline in seconds.
    pub metadata_timeout_secs: u64,
    /// Janitor sweep period in seconds.
    pub janitor_period_secs: u64,
    /// Artifact retention threshold in seconds.
    pub artifact_retention_secs: u64,
    /// Chunks marked immediate at the head of a request window.
    pub immediate_chunks: usize,
    /// Forward lookahead in bytes (high priority).
    pub lookahead_bytes: u64,
    /// Backward lookahead in bytes (medium priority).
    pub backward_lookahead_bytes: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            data_dir: String::new(),
            cache_capacity_bytes: CACHE_CAPACITY_BYTES,
            cache_ttl_secs: CACHE_TTL.as_secs(),
            session_idle_secs: SESSION_IDLE_TIMEOUT.as_secs(),
            metadata_timeout_secs: METADATA_TIMEOUT.as_secs(),
            janitor_period_secs: JANITOR_SWEEP_PERIOD.as_secs(),
            artifact_retention_secs: ARTIFACT_RETENTION.as_secs(),
            immediate_chunks: IMMEDIATE_CHUNK_COUNT,
            lookahead_bytes: FORWARD_LOOKAHEAD_BYTES,
            backward_lookahead_bytes: BACKWARD_LOOKAHEAD_BYTES,
        }
    }
}

impl StreamConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }

    pub fn janitor_period(&self) -> Duration {
        Duration::from_secs(self.janitor_period_secs)
    }

    pub fn artifact_retention(&self) -> Duration {
        Duration::from_secs(self.artifact_retention_secs)
    }
}
