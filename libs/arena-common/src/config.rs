// Application configuration read from the environment
use anyhow::{Context, Result};
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct SandboxSettings {
    pub base_url: String,
    pub auth_token: Option<String>,
    pub rapidapi_key: Option<String>,
    pub rapidapi_host: Option<String>,
    pub request_timeout_ms: u64,
    pub poll_max_attempts: u32,
    pub poll_initial_delay_ms: u64,
    pub poll_max_delay_ms: u64,
    pub retry_max_attempts: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub workers: usize,
    pub queue_depth: usize,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub redis_url: String,
    pub languages_config: String,
    pub sandbox: SandboxSettings,
    pub run_pool: PoolSettings,
    pub submit_pool: PoolSettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            bind_addr: string_or("BIND_ADDR", "0.0.0.0:3000"),
            redis_url: string_or("REDIS_URL", "redis://127.0.0.1:6379"),
            languages_config: string_or("LANGUAGES_CONFIG", "config/languages.json"),
            sandbox: SandboxSettings {
                base_url: string_or("SANDBOX_URL", "http://127.0.0.1:2358"),
                auth_token: lookup("SANDBOX_AUTH_TOKEN").filter(|v| !v.is_empty()),
                rapidapi_key: lookup("SANDBOX_RAPIDAPI_KEY").filter(|v| !v.is_empty()),
                rapidapi_host: lookup("SANDBOX_RAPIDAPI_HOST").filter(|v| !v.is_empty()),
                request_timeout_ms: parsed(&lookup, "SANDBOX_REQUEST_TIMEOUT_MS", 10_000)?,
                poll_max_attempts: parsed(&lookup, "POLL_MAX_ATTEMPTS", 20)?,
                poll_initial_delay_ms: parsed(&lookup, "POLL_INITIAL_DELAY_MS", 500)?,
                poll_max_delay_ms: parsed(&lookup, "POLL_MAX_DELAY_MS", 2_000)?,
                retry_max_attempts: parsed(&lookup, "RETRY_MAX_ATTEMPTS", 3)?,
            },
            run_pool: PoolSettings {
                workers: parsed(&lookup, "RUN_POOL_WORKERS", 8)?,
                queue_depth: parsed(&lookup, "RUN_QUEUE_DEPTH", 64)?,
            },
            submit_pool: PoolSettings {
                workers: parsed(&lookup, "SUBMIT_POOL_WORKERS", 4)?,
                queue_depth: parsed(&lookup, "SUBMIT_QUEUE_DEPTH", 16)?,
            },
        })
    }
}

fn parsed<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.sandbox.poll_max_attempts, 20);
        assert_eq!(config.run_pool.workers, 8);
        assert_eq!(config.submit_pool.queue_depth, 16);
        assert!(config.sandbox.auth_token.is_none());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("SANDBOX_URL", "https://judge.example"),
            ("SUBMIT_POOL_WORKERS", "2"),
            ("SANDBOX_AUTH_TOKEN", "secret"),
        ]
        .into_iter()
        .collect();
        let config = AppConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.sandbox.base_url, "https://judge.example");
        assert_eq!(config.submit_pool.workers, 2);
        assert_eq!(config.sandbox.auth_token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_invalid_number_names_variable() {
        let err = AppConfig::from_lookup(|k| (k == "POLL_MAX_ATTEMPTS").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("POLL_MAX_ATTEMPTS"));
    }
}
