// src/config.rs

use anyhow::{Context, Result};
use std::{env, net::SocketAddr, str::FromStr, time::Duration};
use url::Url;

pub const DEFAULT_FEED_URL: &str =
    "https://kp.gfz-potsdam.de/app/files/Kp_ap_Ap_SN_F107_nowcast.txt";

/// Process settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub feed_url: Url,
    pub fetch: FetchConfig,
    pub log_level: String,
}

/// Knobs for the outbound feed request.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 2,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl Config {
    /// Defaults for everything except the feed location.
    pub fn with_feed_url(feed_url: Url) -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            feed_url,
            fetch: FetchConfig::default(),
            log_level: "info".to_string(),
        }
    }

    /// Overlay `HOST`, `PORT`, `AP_FEED_URL`, `FETCH_*` and `LOG_LEVEL` onto the defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_url = lookup("AP_FEED_URL").unwrap_or_else(|| DEFAULT_FEED_URL.to_string());
        let feed_url = Url::parse(&raw_url)
            .with_context(|| format!("AP_FEED_URL is not a URL: {}", raw_url))?;
        let mut cfg = Config::with_feed_url(feed_url);

        if let Some(host) = lookup("HOST") {
            cfg.host = host;
        }
        if let Some(port) = parse_var::<u16, _>(&lookup, "PORT")? {
            cfg.port = port;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "FETCH_TIMEOUT_SECS")? {
            cfg.fetch.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = parse_var::<u32, _>(&lookup, "FETCH_MAX_RETRIES")? {
            cfg.fetch.max_retries = retries;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "FETCH_BACKOFF_MS")? {
            cfg.fetch.initial_backoff = Duration::from_millis(ms);
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            cfg.log_level = level;
        }

        Ok(cfg)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid HOST:PORT {}:{}", self.host, self.port))
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(None),
    }
}
