//! Pipeline configuration.
//!
//! One explicit struct per component, passed by reference into constructors.
//! There is no process-wide mutable configuration; a run's behavior is fully
//! determined by the `PipelineConfig` it was built with. Values load from a
//! TOML file with serde defaults, plus a small set of environment overrides
//! for retry tuning.

use std::time::Duration;

use serde::Deserialize;

use crate::error::PipelineError;

/// Top-level configuration for one pipeline run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub fetch: FetchConfig,
    pub cache: CacheConfig,
    pub resolver: ResolverConfig,
    pub amendments: AmendmentConfig,
    pub expenses: ExpenseConfig,
    pub votes: VoteConfig,
    pub propositions: PropositionConfig,
    /// Bounded worker pool size for partitioned targets.
    pub workers: usize,
    /// SQLite database path.
    pub db_path: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            cache: CacheConfig::default(),
            resolver: ResolverConfig::default(),
            amendments: AmendmentConfig::default(),
            expenses: ExpenseConfig::default(),
            votes: VoteConfig::default(),
            propositions: PropositionConfig::default(),
            workers: 10,
            db_path: "plenario.db".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Loads configuration from a TOML file. Missing keys fall back to
    /// defaults; a missing file is an error.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&raw).map_err(|e| PipelineError::Config(e.to_string()))
    }
}

/// Fetch-layer tuning: rate limiting, retries, and cache TTLs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Minimum interval between outbound requests, in milliseconds.
    pub min_interval_ms: u64,
    /// Maximum retries for transient network errors.
    pub max_retries: usize,
    /// Base backoff for the first retry, in milliseconds.
    pub base_backoff_ms: u64,
    /// Backoff ceiling, in milliseconds.
    pub max_backoff_ms: u64,
    /// Cooldown after an HTTP 429 before the single retry, in milliseconds.
    pub rate_limit_cooldown_ms: u64,
    /// TTL for cached single-resource API responses, in hours.
    pub api_ttl_hours: u64,
    /// TTL for cached bulk downloads, in hours.
    pub bulk_ttl_hours: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 300,
            max_retries: 3,
            base_backoff_ms: 2_000,
            max_backoff_ms: 30_000,
            rate_limit_cooldown_ms: 5_000,
            api_ttl_hours: 2,
            bulk_ttl_hours: 6,
        }
    }
}

impl FetchConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_millis(self.rate_limit_cooldown_ms)
    }

    pub fn api_ttl(&self) -> Duration {
        Duration::from_secs(self.api_ttl_hours * 3600)
    }

    pub fn bulk_ttl(&self) -> Duration {
        Duration::from_secs(self.bulk_ttl_hours * 3600)
    }

    /// Applies `PLENARIO_RETRY_*` environment overrides, for operators
    /// tuning a run without editing the config file.
    pub fn with_env_overrides(mut self) -> Self {
        self.max_retries = env_usize("PLENARIO_RETRY_MAX", self.max_retries);
        self.base_backoff_ms = env_u64("PLENARIO_RETRY_BASE_MS", self.base_backoff_ms);
        self.max_backoff_ms = env_u64("PLENARIO_RETRY_MAX_MS", self.max_backoff_ms);
        self
    }
}

/// Local response-cache settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: String,
    pub default_ttl_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: "cache".to_string(),
            default_ttl_hours: 6,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_hours * 3600)
    }
}

/// Entity-resolution tuning. The similarity threshold and token-window size
/// are empirically chosen; both are exposed rather than hard-coded.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Minimum similarity ratio for a fuzzy match to be accepted.
    pub fuzzy_threshold: f64,
    /// Maximum token-subsequence length tried by the token-window strategy.
    pub token_window: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.70,
            token_window: 2,
        }
    }
}

/// Amendment collection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AmendmentConfig {
    /// Bulk CSV download URL (Portal da Transparência).
    pub download_url: String,
    /// Preferred CSV member name inside the downloaded ZIP.
    pub expected_csv_name: String,
    /// Downloads smaller than this are treated as error pages.
    pub min_archive_bytes: usize,
    /// Amendments below this value are dropped.
    pub min_value: f64,
    pub page_size: i64,
    /// Safety ceiling for API pagination.
    pub max_pages: Option<usize>,
}

impl Default for AmendmentConfig {
    fn default() -> Self {
        Self {
            download_url:
                "https://portaldatransparencia.gov.br/download-de-dados/emendas-parlamentares/UNICO"
                    .to_string(),
            expected_csv_name: "EmendasParlamentares".to_string(),
            min_archive_bytes: 1_000_000,
            min_value: 0.01,
            page_size: 100,
            max_pages: Some(100),
        }
    }
}

/// Expense (CEAP) collection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExpenseConfig {
    /// Months to collect. Empty means the whole year.
    pub months: Vec<u32>,
    /// Expenses below this net value are dropped.
    pub min_value: f64,
    pub page_size: i64,
    pub max_pages: Option<usize>,
}

impl Default for ExpenseConfig {
    fn default() -> Self {
        Self {
            months: Vec::new(),
            min_value: 0.01,
            page_size: 100,
            max_pages: None,
        }
    }
}

/// Roll-call vote collection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoteConfig {
    /// Organ filter (e.g. "PLEN"). Empty means all organs.
    pub organs: Vec<String>,
    pub page_size: i64,
    pub max_items: Option<usize>,
    /// Base URL for the yearly bulk JSON archives.
    pub archive_base_url: String,
}

impl Default for VoteConfig {
    fn default() -> Self {
        Self {
            organs: Vec::new(),
            page_size: 100,
            max_items: Some(5_000),
            archive_base_url: "https://dadosabertos.camara.leg.br/arquivos".to_string(),
        }
    }
}

/// Proposition collection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PropositionConfig {
    /// Proposition kinds to keep, in priority order.
    pub kinds: Vec<String>,
    pub max_items: Option<usize>,
    pub archive_base_url: String,
}

impl Default for PropositionConfig {
    fn default() -> Self {
        Self {
            kinds: ["PL", "PEC", "PLP", "MPV", "PDC", "PLV", "PRC", "SUG", "REQ", "RIC"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
            max_items: Some(15_000),
            archive_base_url: "https://dadosabertos.camara.leg.br/arquivos".to_string(),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|val| val.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|val| val.parse::<usize>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.workers, 10);
        assert_eq!(cfg.fetch.min_interval_ms, 300);
        assert_eq!(cfg.fetch.max_retries, 3);
        assert_eq!(cfg.resolver.fuzzy_threshold, 0.70);
        assert_eq!(cfg.resolver.token_window, 2);
        assert_eq!(cfg.amendments.min_archive_bytes, 1_000_000);
        assert!(cfg.propositions.kinds.contains(&"PEC".to_string()));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: PipelineConfig = toml::from_str(
            r#"
            workers = 4

            [fetch]
            min_interval_ms = 1000

            [resolver]
            fuzzy_threshold = 0.8
            "#,
        )
        .unwrap();
        assert_eq!(cfg.workers, 4);
        assert_eq!(cfg.fetch.min_interval_ms, 1000);
        assert_eq!(cfg.fetch.max_retries, 3);
        assert_eq!(cfg.resolver.fuzzy_threshold, 0.8);
        assert_eq!(cfg.resolver.token_window, 2);
    }
}
