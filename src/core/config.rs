use anyhow::Result;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub ensemble: EnsembleConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnsembleConfig {
    pub min_models: usize,
    pub max_models: usize,
    pub voting_strategy: String,
    pub weight_update_rate: f64,
    pub performance_window: usize,
    pub retraining_threshold: f64,
    pub enable_meta_learning: bool,
    pub cache_size: usize,
    pub cache_ttl_secs: u64,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    pub log_level: String,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            min_models: 2,
            max_models: 10,
            voting_strategy: "weighted_average".to_string(),
            // Reserved for gradient-style weight updates.
            weight_update_rate: 0.1,
            performance_window: 100,
            retraining_threshold: 0.1,
            enable_meta_learning: true,
            cache_size: 1000,
            cache_ttl_secs: 300,
            request_timeout_secs: 10,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        Ok(Config {
            ensemble: EnsembleConfig {
                min_models: env::var("MIN_MODELS")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .unwrap_or(2),
                max_models: env::var("MAX_MODELS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                voting_strategy: env::var("VOTING_STRATEGY")
                    .unwrap_or_else(|_| "weighted_average".to_string()),
                weight_update_rate: env::var("WEIGHT_UPDATE_RATE")
                    .unwrap_or_else(|_| "0.1".to_string())
                    .parse()
                    .unwrap_or(0.1),
                performance_window: env::var("PERFORMANCE_WINDOW")
                    .unwrap_or_else(|_| "100".to_string())
                    .parse()
                    .unwrap_or(100),
                retraining_threshold: env::var("RETRAINING_THRESHOLD")
                    .unwrap_or_else(|_| "0.1".to_string())
                    .parse()
                    .unwrap_or(0.1),
                enable_meta_learning: env::var("ENABLE_META_LEARNING")
                    .unwrap_or_else(|_| "true".to_string())
                    .parse()
                    .unwrap_or(true),
                cache_size: env::var("CACHE_SIZE")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()
                    .unwrap_or(1000),
                cache_ttl_secs: env::var("CACHE_TTL_SECS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .unwrap_or(300),
                request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            },
            monitoring: MonitoringConfig {
                log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let cfg = EnsembleConfig::default();
        assert!(cfg.min_models >= 1);
        assert!(cfg.max_models >= cfg.min_models);
        assert_eq!(cfg.voting_strategy, "weighted_average");
    }
}
