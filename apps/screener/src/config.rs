use anyhow::{Context, Result};

use crate::analysis::DEFAULT_CONCURRENCY;
use crate::collection::{DelayRange, PacingConfig, DEFAULT_BREAKER_THRESHOLD};
use crate::llm_client;
use crate::pipeline::history::DEFAULT_HISTORY_CAPACITY;
use crate::sync::{bitable, DEFAULT_BATCH_SIZE};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub rust_log: String,
    pub llm: LlmSettings,
    pub listing_feed_url: String,
    pub listing_source: String,
    pub bitable: BitableSettings,
    /// Run report archive; all four S3 variables or none.
    pub s3: Option<S3Settings>,
    pub pipeline: PipelineSettings,
}

#[derive(Clone)]
pub struct LlmSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Clone)]
pub struct BitableSettings {
    pub base_url: String,
    pub app_token: String,
    pub table_id: String,
    pub access_token: String,
}

#[derive(Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Tuning knobs for the stages and the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub analysis_concurrency: usize,
    pub pacing: PacingConfig,
    pub breaker_threshold: u32,
    pub sync_batch_size: usize,
    pub history_capacity: usize,
    pub analysis_max_failure_ratio: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            analysis_concurrency: DEFAULT_CONCURRENCY,
            pacing: PacingConfig::default(),
            breaker_threshold: DEFAULT_BREAKER_THRESHOLD,
            sync_batch_size: DEFAULT_BATCH_SIZE,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            analysis_max_failure_ratio: 1.0,
        }
    }
}

// Secrets stay out of logs.
macro_rules! redacted_debug {
    ($ty:ident { $($field:ident),* }) => {
        impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($ty))
                    $(.field(stringify!($field), &self.$field))*
                    .finish_non_exhaustive()
            }
        }
    };
}

redacted_debug!(LlmSettings { base_url, model });
redacted_debug!(BitableSettings { base_url, table_id });
redacted_debug!(S3Settings { bucket, endpoint });

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: env_or("RUST_LOG", "info"),
            llm: LlmSettings {
                api_key: require_env("LLM_API_KEY")?,
                base_url: env_or("LLM_BASE_URL", llm_client::DEFAULT_BASE_URL),
                model: env_or("LLM_MODEL", llm_client::DEFAULT_MODEL),
            },
            listing_feed_url: require_env("LISTING_FEED_URL")?,
            listing_source: env_or("LISTING_SOURCE", "boss"),
            bitable: BitableSettings {
                base_url: env_or("BITABLE_BASE_URL", bitable::DEFAULT_BASE_URL),
                app_token: require_env("BITABLE_APP_TOKEN")?,
                table_id: require_env("BITABLE_TABLE_ID")?,
                access_token: require_env("BITABLE_ACCESS_TOKEN")?,
            },
            s3: s3_from_env()?,
            pipeline: PipelineSettings::from_env()?,
        })
    }
}

impl PipelineSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let delay = |key: &str, default: DelayRange| -> Result<DelayRange> {
            match lookup(key) {
                Some(raw) => raw
                    .parse()
                    .map_err(|e| anyhow::anyhow!("{key} must look like 1000-3000: {e}")),
                None => Ok(default),
            }
        };
        fn number<T: std::str::FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
            match raw {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(|_| anyhow::anyhow!("{key} must be a number, got '{raw}'")),
                None => Ok(default),
            }
        }

        let ratio: f64 = number(
            lookup("ANALYSIS_MAX_FAILURE_RATIO"),
            "ANALYSIS_MAX_FAILURE_RATIO",
            defaults.analysis_max_failure_ratio,
        )?;
        if !(ratio > 0.0 && ratio <= 1.0) {
            anyhow::bail!("ANALYSIS_MAX_FAILURE_RATIO must be in (0, 1], got {ratio}");
        }

        Ok(Self {
            analysis_concurrency: number(
                lookup("ANALYSIS_CONCURRENCY"),
                "ANALYSIS_CONCURRENCY",
                defaults.analysis_concurrency,
            )?
            .max(1),
            pacing: PacingConfig {
                item: delay("ITEM_DELAY_MS", defaults.pacing.item)?,
                page: delay("PAGE_DELAY_MS", defaults.pacing.page)?,
                error: delay("ERROR_DELAY_MS", defaults.pacing.error)?,
            },
            breaker_threshold: number(
                lookup("BREAKER_THRESHOLD"),
                "BREAKER_THRESHOLD",
                defaults.breaker_threshold,
            )?
            .max(1),
            sync_batch_size: number(
                lookup("SYNC_BATCH_SIZE"),
                "SYNC_BATCH_SIZE",
                defaults.sync_batch_size,
            )?
            .clamp(1, bitable::MAX_BATCH_SIZE),
            history_capacity: number(
                lookup("HISTORY_CAPACITY"),
                "HISTORY_CAPACITY",
                defaults.history_capacity,
            )?
            .max(1),
            analysis_max_failure_ratio: ratio,
        })
    }
}

fn s3_from_env() -> Result<Option<S3Settings>> {
    let keys = ["S3_BUCKET", "S3_ENDPOINT", "AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY"];
    let values: Vec<Option<String>> = keys
        .iter()
        .map(|k| std::env::var(k).ok().filter(|v| !v.trim().is_empty()))
        .collect();

    match values.as_slice() {
        [Some(bucket), Some(endpoint), Some(access_key_id), Some(secret_access_key)] => {
            Ok(Some(S3Settings {
                bucket: bucket.clone(),
                endpoint: endpoint.clone(),
                access_key_id: access_key_id.clone(),
                secret_access_key: secret_access_key.clone(),
            }))
        }
        _ if values.iter().all(Option::is_none) => Ok(None),
        _ => anyhow::bail!("S3 settings are partial; set all of {} or none", keys.join(", ")),
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
