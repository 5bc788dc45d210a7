mod watchlist;

pub use watchlist::WatchlistHandle;

use std::collections::HashMap;
use std::env;

use analysis_core::ReviewRegion;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("missing required option {0}")]
    Missing(&'static str),
}

/// Process-wide typed configuration, loaded once at boot.
///
/// Every recognized option has a default so a bare environment still
/// boots; values that fail to parse are a startup error (exit code 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Watchlist
    pub stock_list: Vec<String>,
    /// Path to a file holding the watchlist; takes precedence over
    /// STOCK_LIST when set, and is re-read each batch.
    pub stock_list_file: Option<String>,

    // Data sources
    pub realtime_source_priority: Vec<String>,
    pub source_priority_overrides: HashMap<String, i32>,
    pub disabled_sources: Vec<String>,
    pub tushare_token: Option<String>,

    // Search providers
    pub bocha_api_keys: Vec<String>,
    pub tavily_api_keys: Vec<String>,
    pub serpapi_api_keys: Vec<String>,
    pub news_max_age_days: i64,

    // LLM
    pub gemini_api_keys: Vec<String>,
    pub anthropic_api_keys: Vec<String>,
    pub openai_api_keys: Vec<String>,
    pub openai_base_url: Option<String>,
    pub model: String,
    pub fallback_models: Vec<String>,
    pub llm_key_cooldown_secs: u64,

    // Agent
    pub agent_mode: bool,
    pub agent_max_steps: usize,
    pub agent_skills: Vec<String>,
    pub agent_strategy_dir: Option<String>,

    // Pipeline behaviour
    pub trading_day_check_enabled: bool,
    pub enable_realtime_indicators: bool,
    pub market_review_region: ReviewRegion,
    pub bias_threshold: f64,
    pub batch_parallelism: usize,
    pub pipeline_deadline_secs: u64,
    pub save_context_snapshot: bool,

    // Scheduler
    pub schedule_time: (u32, u32),
    pub schedule_timezone: String,
    pub run_immediately: bool,

    // Notification
    pub report_summary_only: bool,
    pub merge_email_notification: bool,
    pub single_stock_notify: bool,
    pub notify_max_bytes: usize,
    pub stock_groups: Vec<Vec<String>>,
    pub email_groups: Vec<Vec<String>>,

    // HTTP / auth
    pub webui_host: String,
    pub webui_port: u16,
    pub admin_auth_enabled: bool,
    pub admin_password: Option<String>,

    // Storage
    pub database_url: String,
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn list(key: &str) -> Vec<String> {
    var(key)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn parse_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match var(key) {
        None => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: v }),
    }
}

fn flag(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match var(key) {
        None => Ok(default),
        Some(v) => match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { key, value: v }),
        },
    }
}

/// Parse numbered group variables (STOCK_GROUP_1, STOCK_GROUP_2, ...) into
/// ordered comma-split lists. Numbering starts at 1 and stops at the first
/// gap.
fn groups(prefix: &str) -> Vec<Vec<String>> {
    let mut out = Vec::new();
    for n in 1.. {
        let key = format!("{prefix}_{n}");
        match env::var(&key).ok().filter(|s| !s.trim().is_empty()) {
            Some(v) => out.push(
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
            None => break,
        }
    }
    out
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let schedule_time = {
            let raw = var("SCHEDULE_TIME").unwrap_or_else(|| "18:00".to_string());
            parse_hhmm(&raw).ok_or(ConfigError::Invalid { key: "SCHEDULE_TIME", value: raw })?
        };

        let market_review_region = {
            let raw = var("MARKET_REVIEW_REGION").unwrap_or_else(|| "cn".to_string());
            ReviewRegion::parse(&raw)
                .ok_or(ConfigError::Invalid { key: "MARKET_REVIEW_REGION", value: raw })?
        };

        let mut source_priority_overrides = HashMap::new();
        for (key, value) in env::vars() {
            if let Some(source) = key.strip_suffix("_PRIORITY") {
                if source == "REALTIME_SOURCE" {
                    continue;
                }
                if let Ok(p) = value.trim().parse::<i32>() {
                    source_priority_overrides.insert(source.to_ascii_lowercase(), p);
                }
            }
        }

        let config = Config {
            stock_list: list("STOCK_LIST")
                .into_iter()
                .map(|s| analysis_core::canonicalize(&s))
                .collect(),
            stock_list_file: var("STOCK_LIST_FILE"),

            realtime_source_priority: list("REALTIME_SOURCE_PRIORITY"),
            source_priority_overrides,
            disabled_sources: list("DISABLED_SOURCES"),
            tushare_token: var("TUSHARE_TOKEN"),

            bocha_api_keys: list("BOCHA_API_KEYS"),
            tavily_api_keys: list("TAVILY_API_KEYS"),
            serpapi_api_keys: list("SERPAPI_API_KEYS"),
            news_max_age_days: parse_or("NEWS_MAX_AGE_DAYS", 7)?,

            gemini_api_keys: list("GEMINI_API_KEYS"),
            anthropic_api_keys: list("ANTHROPIC_API_KEYS"),
            openai_api_keys: list("OPENAI_API_KEYS"),
            openai_base_url: var("OPENAI_BASE_URL"),
            model: var("LITELLM_MODEL").unwrap_or_else(|| "gemini-2.5-flash".to_string()),
            fallback_models: list("LITELLM_FALLBACK_MODELS"),
            llm_key_cooldown_secs: parse_or("LLM_KEY_COOLDOWN_SECS", 60)?,

            agent_mode: flag("AGENT_MODE", false)?,
            agent_max_steps: parse_or("AGENT_MAX_STEPS", 10)?,
            agent_skills: list("AGENT_SKILLS"),
            agent_strategy_dir: var("AGENT_STRATEGY_DIR"),

            trading_day_check_enabled: flag("TRADING_DAY_CHECK_ENABLED", true)?,
            enable_realtime_indicators: flag("ENABLE_REALTIME_TECHNICAL_INDICATORS", true)?,
            market_review_region,
            bias_threshold: parse_or("BIAS_THRESHOLD", 5.0)?,
            batch_parallelism: parse_or("BATCH_PARALLELISM", 3)?,
            pipeline_deadline_secs: parse_or("PIPELINE_DEADLINE_SECS", 600)?,
            save_context_snapshot: flag("SAVE_CONTEXT_SNAPSHOT", true)?,

            schedule_time,
            schedule_timezone: var("SCHEDULE_TIMEZONE")
                .unwrap_or_else(|| "Asia/Shanghai".to_string()),
            run_immediately: flag("RUN_IMMEDIATELY", false)?,

            report_summary_only: flag("REPORT_SUMMARY_ONLY", false)?,
            merge_email_notification: flag("MERGE_EMAIL_NOTIFICATION", true)?,
            single_stock_notify: flag("SINGLE_STOCK_NOTIFY", false)?,
            notify_max_bytes: parse_or("NOTIFY_MAX_BYTES", 4096)?,
            stock_groups: groups("STOCK_GROUP"),
            email_groups: groups("EMAIL_GROUP"),

            webui_host: var("WEBUI_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            webui_port: parse_or("WEBUI_PORT", 8000)?,
            admin_auth_enabled: flag("ADMIN_AUTH_ENABLED", false)?,
            admin_password: var("ADMIN_PASSWORD"),

            database_url: var("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://analyzer.db?mode=rwc".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_parallelism == 0 {
            return Err(ConfigError::Invalid {
                key: "BATCH_PARALLELISM",
                value: "0".into(),
            });
        }
        if self.agent_max_steps == 0 {
            return Err(ConfigError::Invalid { key: "AGENT_MAX_STEPS", value: "0".into() });
        }
        if self.admin_auth_enabled && self.admin_password.is_none() {
            return Err(ConfigError::Missing("ADMIN_PASSWORD"));
        }
        Ok(())
    }
}

fn parse_hhmm(raw: &str) -> Option<(u32, u32)> {
    let (h, m) = raw.split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    (h < 24 && m < 60).then_some((h, m))
}
