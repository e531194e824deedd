use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub similarity: SimilarityWeights,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub url: String,
    /// Maximum pool connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

/// Duplicate detector tuning
#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    /// Minimum similarity score for a merge candidate (inclusive)
    pub merge_threshold: f64,
    /// Maximum candidates collected per group
    pub max_merge_candidates: usize,
    /// Default window size for a scheduled scan
    pub scan_limit: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            merge_threshold: 0.85,
            max_merge_candidates: 5,
            scan_limit: 200,
        }
    }
}

/// Weights for the topic similarity score. Must sum to 1.0.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SimilarityWeights {
    pub name: f64,
    pub category: f64,
    pub canonical: f64,
    pub slug: f64,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            name: 0.4,
            category: 0.2,
            canonical: 0.3,
            slug: 0.1,
        }
    }
}

/// Background worker and sweep scheduling
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Interval between scheduled duplicate scans (0 disables)
    pub scan_interval_secs: u64,
    /// Interval between symbol archival sweeps
    pub archive_interval_secs: u64,
    /// Retry attempts for a merge job before marking the record failed
    pub max_job_retries: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 0,
            archive_interval_secs: 3600,
            max_job_retries: 3,
        }
    }
}

/// Symbol registry policy knobs
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Days until a freshly minted symbol expires if never activated
    pub default_expiration_days: i64,
    /// Symbol prefixes reserved by governance
    #[serde(default)]
    pub reserved_prefixes: Vec<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_expiration_days: 365,
            reserved_prefixes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default `config/` directory
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("database.max_connections", 5)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("TRENDREG_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (TRENDREG_DATABASE__URL, etc.)
            .add_source(
                Environment::with_prefix("TRENDREG")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detector_defaults() {
        let cfg = DetectorConfig::default();
        assert_eq!(cfg.merge_threshold, 0.85);
        assert_eq!(cfg.max_merge_candidates, 5);
    }

    #[test]
    fn test_similarity_weights_sum_to_one() {
        let w = SimilarityWeights::default();
        assert!((w.name + w.category + w.canonical + w.slug - 1.0).abs() < 1e-9);
    }
}
