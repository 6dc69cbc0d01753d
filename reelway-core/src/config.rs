//! Centralized configuration for Reelway.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::path::PathBuf;
use std::time::Duration;

use crate::readiness::ReadinessThreshold;

/// Central configuration for all Reelway components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct ReelwayConfig {
    pub resolver: ResolverConfig,
    pub session: SessionConfig,
    pub server: ServerConfig,
    pub readiness: ReadinessConfig,
    pub simulation: SimulationConfig,
}

/// Upstream page fetching configuration.
///
/// Mirrors reject requests that do not look like a desktop browser coming
/// from the site itself, so both headers are always sent.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// User agent sent with every page fetch
    pub user_agent: &'static str,
    /// Referer override. `None` uses the home page of the content reference.
    pub referer: Option<String>,
    /// Timeout for a single page fetch
    pub request_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
            referer: None,
            request_timeout: Duration::from_secs(15),
        }
    }
}

/// Download session manager configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Parent directory for per-session save directories
    pub download_root: PathBuf,
    /// Capacity of the manager command channel
    pub command_buffer: usize,
    /// Capacity of the range prioritization channel
    pub priority_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            download_root: std::env::temp_dir().join("reelway"),
            command_buffer: 64,
            priority_buffer: 32,
        }
    }
}

/// Loopback range server configuration.
///
/// The listener is always bound to 127.0.0.1; only the port is tunable.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listening port, 0 picks an ephemeral port
    pub port: u16,
    /// How long a request may wait for bytes that have not arrived yet
    pub availability_timeout: Duration,
    /// Size of each body chunk read from disk
    pub chunk_size: usize,
    /// Content type used when the file extension is not recognized
    pub content_type_fallback: &'static str,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            availability_timeout: Duration::from_secs(30),
            chunk_size: 65536, // 64 KiB
            content_type_fallback: "video/mp4",
        }
    }
}

/// Playback readiness configuration.
#[derive(Debug, Clone)]
pub struct ReadinessConfig {
    /// Point at which playback may begin before the download completes
    pub threshold: ReadinessThreshold,
    /// Upper bound on waiting for a session to become playable
    pub wait_timeout: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            threshold: ReadinessThreshold::Percent(2.0),
            wait_timeout: Duration::from_secs(600),
        }
    }
}

/// Simulated download engine configuration for development.
///
/// Controls how fast the simulated engine feeds a local file into the
/// session save directory.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Average simulated download speed in bytes per second
    pub bytes_per_second: u64,
    /// Interval between progress events
    pub tick: Duration,
    /// Deterministic seed for reproducible rate jitter
    pub deterministic_seed: Option<u64>,
    /// Progress percentage at which the engine reports the stream ready
    pub ready_after_percent: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            bytes_per_second: 2_097_152, // 2 MB/s
            tick: Duration::from_millis(250),
            deterministic_seed: None,
            ready_after_percent: 1.0,
        }
    }
}

impl SimulationConfig {
    /// Creates a configuration for deterministic testing.
    pub fn deterministic_testing() -> Self {
        Self {
            bytes_per_second: 10_485_760, // 10 MB/s for fast tests
            tick: Duration::from_millis(10),
            deterministic_seed: Some(42),
            ready_after_percent: 1.0,
        }
    }
}

impl ReelwayConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults. Unparsable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(port) = env_parse::<u16>("REELWAY_HTTP_PORT") {
            config.server.port = port;
        }

        if let Some(seconds) = env_parse::<u64>("REELWAY_AVAILABILITY_TIMEOUT") {
            config.server.availability_timeout = Duration::from_secs(seconds);
        }

        if let Some(seconds) = env_parse::<u64>("REELWAY_FETCH_TIMEOUT") {
            config.resolver.request_timeout = Duration::from_secs(seconds);
        }

        if let Ok(referer) = std::env::var("REELWAY_REFERER") {
            if !referer.is_empty() {
                config.resolver.referer = Some(referer);
            }
        }

        if let Ok(dir) = std::env::var("REELWAY_DOWNLOAD_DIR") {
            if !dir.is_empty() {
                config.session.download_root = PathBuf::from(dir);
            }
        }

        // Byte threshold wins over percent when both are given
        if let Some(percent) = env_parse::<f32>("REELWAY_READY_PERCENT") {
            config.readiness.threshold = ReadinessThreshold::Percent(percent.clamp(0.0, 100.0));
        }

        if let Some(bytes) = env_parse::<u64>("REELWAY_READY_BYTES") {
            config.readiness.threshold = ReadinessThreshold::MinBytes(bytes);
        }

        if let Some(seed) = env_parse::<u64>("REELWAY_SIMULATION_SEED") {
            config.simulation.deterministic_seed = Some(seed);
        }

        config
    }

    /// Creates a configuration tuned for fast, deterministic tests.
    pub fn for_testing() -> Self {
        let mut config = Self::default();
        config.server.port = 0;
        config.server.availability_timeout = Duration::from_millis(500);
        config.server.chunk_size = 1024;
        config.readiness.wait_timeout = Duration::from_secs(5);
        config.simulation = SimulationConfig::deterministic_testing();
        config
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReelwayConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.content_type_fallback, "video/mp4");
        assert!(config.resolver.user_agent.starts_with("Mozilla/5.0"));
        assert!(config.resolver.referer.is_none());
        assert_eq!(config.readiness.threshold, ReadinessThreshold::Percent(2.0));
    }

    #[test]
    fn test_testing_config_is_fast() {
        let config = ReelwayConfig::for_testing();
        assert_eq!(config.server.port, 0);
        assert!(config.server.availability_timeout < Duration::from_secs(1));
        assert_eq!(config.simulation.deterministic_seed, Some(42));
    }
}
