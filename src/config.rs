use std::{env, net::SocketAddr, num::NonZeroUsize, path::PathBuf, time::Duration};

use chrono_tz::Tz;
use thiserror::Error;
use url::Url;

use crate::calendar::SchoolCalendar;
use crate::fetcher::HttpFetcherConfig;
use crate::refresh::RefreshSettings;
use crate::util::retry::RetryPolicy;

const DEFAULT_SLOT_URLS: &str = concat!(
    "https://bbs-friesoythe.webuntis.com/WebUntis/monitor?school=bbs-friesoythe&monitorType=subst&format=Vertretung%20heute,",
    "https://bbs-friesoythe.webuntis.com/WebUntis/monitor?school=bbs-friesoythe&monitorType=subst&format=Vertretung%20morgen,",
    "https://bbs-friesoythe.webuntis.com/WebUntis/monitor?school=bbs-friesoythe&monitorType=subst&format=Vertretung%20in%202%20Tagen,",
    "https://bbs-friesoythe.webuntis.com/WebUntis/monitor?school=bbs-friesoythe&monitorType=subst&format=Vertretung%20in%203%20Tagen",
);

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    http_bind: SocketAddr,
    cache_dir: PathBuf,
    timezone: Tz,
    cutover_hour: u32,
    window_size: NonZeroUsize,
    refresh_interval: Duration,
    backup_hour: u32,
    fetch_max_attempts: NonZeroUsize,
    fetch_retry_delay: Duration,
    fetch_timeout: Duration,
    readiness_timeout: Duration,
    readiness_poll: Duration,
    slot_urls: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// Reads the worker configuration from the environment.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when a value cannot be parsed or violates its
    /// constraints.
    pub fn from_env() -> Result<Self, ConfigError> {
        let window_size = parse_non_zero_usize("SUBST_WINDOW_SIZE", 4)?;
        let slot_urls = parse_slot_urls("SUBST_SLOT_URLS", window_size.get())?;

        Ok(Self {
            http_bind: parse_socket_addr("SUBST_HTTP_BIND", "0.0.0.0:3000")?,
            cache_dir: parse_path("SUBST_CACHE_DIR", "data")?,
            timezone: parse_timezone("SUBST_TIMEZONE", "Europe/Berlin")?,
            cutover_hour: parse_hour("SUBST_CUTOVER_HOUR", 17)?,
            window_size,
            refresh_interval: parse_non_zero_duration_secs("SUBST_REFRESH_INTERVAL_SECS", 600)?,
            backup_hour: parse_hour("SUBST_BACKUP_HOUR", 3)?,
            fetch_max_attempts: parse_non_zero_usize("SUBST_FETCH_MAX_ATTEMPTS", 3)?,
            fetch_retry_delay: parse_duration_ms("SUBST_FETCH_RETRY_DELAY_MS", 5_000)?,
            fetch_timeout: parse_non_zero_duration_ms("SUBST_FETCH_TIMEOUT_MS", 60_000)?,
            readiness_timeout: parse_non_zero_duration_ms("SUBST_READINESS_TIMEOUT_MS", 20_000)?,
            readiness_poll: parse_non_zero_duration_ms("SUBST_READINESS_POLL_MS", 1_000)?,
            slot_urls,
        })
    }

    #[must_use]
    pub fn http_bind(&self) -> SocketAddr {
        self.http_bind
    }

    #[must_use]
    pub fn cache_dir(&self) -> &PathBuf {
        &self.cache_dir
    }

    #[must_use]
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    #[must_use]
    pub fn cutover_hour(&self) -> u32 {
        self.cutover_hour
    }

    #[must_use]
    pub fn window_size(&self) -> usize {
        self.window_size.get()
    }

    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    #[must_use]
    pub fn backup_hour(&self) -> u32 {
        self.backup_hour
    }

    #[must_use]
    pub fn fetch_max_attempts(&self) -> usize {
        self.fetch_max_attempts.get()
    }

    #[must_use]
    pub fn fetch_retry_delay(&self) -> Duration {
        self.fetch_retry_delay
    }

    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    #[must_use]
    pub fn readiness_timeout(&self) -> Duration {
        self.readiness_timeout
    }

    #[must_use]
    pub fn readiness_poll(&self) -> Duration {
        self.readiness_poll
    }

    #[must_use]
    pub fn slot_urls(&self) -> &[String] {
        &self.slot_urls
    }

    #[must_use]
    pub fn calendar(&self) -> SchoolCalendar {
        SchoolCalendar::new(self.timezone, self.cutover_hour, self.window_size.get())
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.fetch_max_attempts.get(), self.fetch_retry_delay)
    }

    #[must_use]
    pub fn refresh_settings(&self) -> RefreshSettings {
        RefreshSettings {
            slot_urls: self.slot_urls.clone(),
            retry: self.retry_policy(),
            attempt_timeout: self.fetch_timeout,
        }
    }

    /// The HTTP request itself may use the whole attempt budget; readiness
    /// polling happens inside it.
    #[must_use]
    pub fn http_fetcher_config(&self) -> HttpFetcherConfig {
        HttpFetcherConfig {
            request_timeout: self.fetch_timeout,
            readiness_timeout: self.readiness_timeout,
            poll_interval: self.readiness_poll,
        }
    }
}

fn invalid(name: &'static str, source: anyhow::Error) -> ConfigError {
    ConfigError::Invalid { name, source }
}

fn parse_socket_addr(name: &'static str, default: &str) -> Result<SocketAddr, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .map_err(|error| invalid(name, anyhow::Error::new(error)))
}

fn parse_path(name: &'static str, default: &str) -> Result<PathBuf, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    if raw.trim().is_empty() {
        return Err(ConfigError::Missing(name));
    }
    Ok(PathBuf::from(raw))
}

fn parse_timezone(name: &'static str, default: &str) -> Result<Tz, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse::<Tz>()
        .map_err(|error| invalid(name, anyhow::anyhow!("{error}")))
}

fn parse_hour(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    let hour = parse_u32(name, default)?;
    if hour > 23 {
        return Err(invalid(name, anyhow::anyhow!("hour must be between 0 and 23")));
    }
    Ok(hour)
}

fn parse_non_zero_usize(name: &'static str, default: usize) -> Result<NonZeroUsize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let parsed = raw
        .parse::<usize>()
        .map_err(|error| invalid(name, anyhow::Error::new(error)))?;
    NonZeroUsize::new(parsed).ok_or_else(|| invalid(name, anyhow::anyhow!("must be greater than zero")))
}

fn parse_non_zero_duration_secs(name: &'static str, default_secs: u64) -> Result<Duration, ConfigError> {
    let secs = parse_u64(name, default_secs)?;
    if secs == 0 {
        return Err(invalid(name, anyhow::anyhow!("must be greater than zero")));
    }
    Ok(Duration::from_secs(secs))
}

fn parse_duration_ms(name: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    let ms = parse_u64(name, default_ms)?;
    Ok(Duration::from_millis(ms))
}

fn parse_non_zero_duration_ms(name: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    let duration = parse_duration_ms(name, default_ms)?;
    if duration.is_zero() {
        return Err(invalid(name, anyhow::anyhow!("must be greater than zero")));
    }
    Ok(duration)
}

fn parse_u32(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u32>()
        .map_err(|error| invalid(name, anyhow::Error::new(error)))
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u64>()
        .map_err(|error| invalid(name, anyhow::Error::new(error)))
}

fn parse_slot_urls(name: &'static str, window_size: usize) -> Result<Vec<String>, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| DEFAULT_SLOT_URLS.to_string());
    let urls: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect();

    for url in &urls {
        Url::parse(url).map_err(|error| invalid(name, anyhow::Error::new(error)))?;
    }
    if urls.len() != window_size {
        return Err(invalid(
            name,
            anyhow::anyhow!(
                "expected one URL per window slot ({window_size}), got {}",
                urls.len()
            ),
        ));
    }
    Ok(urls)
}
