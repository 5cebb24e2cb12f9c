use std::{
    collections::HashMap,
    env,
    net::SocketAddr,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use anyhow::{Context, Result};

use crate::judge::{
    ClientSettings,
    models::{OCTAVE_LANGUAGE_ID, SubmissionLimits},
};

const DEFAULT_JUDGE_URL: &str = "https://judge0-ce.p.sulu.sh";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// API key -> user id.
    pub api_keys: HashMap<String, String>,
    pub rate_limit_per_minute: u32,
    pub rate_limit_burst: u32,
    pub persistence_path: Option<PathBuf>,
    /// Overall budget for one `/v1/execute` call, on top of the poll budget.
    pub execution_deadline: Duration,
    pub judge: JudgeConfig,
}

#[derive(Debug, Clone)]
pub struct JudgeConfig {
    pub base_url: String,
    /// Sent as `X-Auth-Token` when present.
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    pub client: ClientSettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse::<SocketAddr>()
            .context("invalid BIND_ADDR")?;

        Ok(Self {
            bind_addr,
            api_keys: parse_api_keys(
                &env::var("API_KEYS").unwrap_or_else(|_| "dev-user:dev-key".to_string()),
            ),
            rate_limit_per_minute: env_parse("RATE_LIMIT_PER_MINUTE", 30u32),
            rate_limit_burst: env_parse("RATE_LIMIT_BURST", 5u32),
            persistence_path: env::var("PERSIST_ATTEMPTS_PATH").ok().map(PathBuf::from),
            execution_deadline: Duration::from_millis(env_parse(
                "EXECUTION_DEADLINE_MS",
                15_000u64,
            )),
            judge: JudgeConfig::from_env(),
        })
    }
}

impl JudgeConfig {
    pub fn from_env() -> Self {
        let defaults = ClientSettings::default();
        let limits = SubmissionLimits::default();

        Self {
            base_url: env::var("JUDGE0_API_URL")
                .ok()
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_JUDGE_URL.to_string()),
            api_key: env::var("JUDGE0_API_KEY").ok().filter(|key| !key.is_empty()),
            request_timeout: Duration::from_millis(env_parse("JUDGE_REQUEST_TIMEOUT_MS", 5_000u64)),
            client: ClientSettings {
                language_id: env_parse("JUDGE_LANGUAGE_ID", OCTAVE_LANGUAGE_ID),
                limits: SubmissionLimits {
                    cpu_time_limit_secs: env_parse(
                        "JUDGE_CPU_TIME_LIMIT_SECS",
                        limits.cpu_time_limit_secs,
                    ),
                    wall_time_limit_secs: env_parse(
                        "JUDGE_WALL_TIME_LIMIT_SECS",
                        limits.wall_time_limit_secs,
                    ),
                    memory_limit_kb: env_parse("JUDGE_MEMORY_LIMIT_KB", limits.memory_limit_kb),
                },
                poll_interval: Duration::from_millis(env_parse(
                    "JUDGE_POLL_INTERVAL_MS",
                    defaults.poll_interval.as_millis() as u64,
                )),
                max_poll_attempts: env_parse("JUDGE_MAX_POLL_ATTEMPTS", defaults.max_poll_attempts)
                    .max(1),
                emit_plot_payload: env_flag("JUDGE_EMIT_PLOT_PAYLOAD", defaults.emit_plot_payload),
            },
        }
    }
}

/// Parses `user:key,user:key` into a key -> user lookup.
fn parse_api_keys(input: &str) -> HashMap<String, String> {
    let mut keys = HashMap::new();
    for raw in input.split(',') {
        let entry = raw.trim();
        if entry.is_empty() {
            continue;
        }
        if let Some((user_id, key)) = entry.split_once(':')
            && !user_id.is_empty()
            && !key.is_empty()
        {
            keys.insert(key.to_string(), user_id.to_string());
        }
    }
    if keys.is_empty() {
        keys.insert("dev-key".to_string(), "dev-user".to_string());
    }
    keys
}

/// Filter directive used when `RUST_LOG` is unset. Read before the rest of the
/// configuration so parse warnings below are not lost.
pub fn log_level_from_env() -> String {
    env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    let Ok(raw) = env::var(key) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable setting, using default");
            default
        }
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    let Ok(raw) = env::var(key) else {
        return default;
    };
    parse_flag(&raw).unwrap_or_else(|| {
        tracing::warn!(key, value = %raw, "ignoring unparseable flag, using default");
        default
    })
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
