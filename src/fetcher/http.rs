//! HTTP adapter for the monitor pages.
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use super::{FetchError, FetchedPage, PageFetcher, Readiness, extract};

/// Landing pages that mean the monitor refused to render the schedule.
const UNEXPECTED_LANDING_MARKERS: &[&str] = &["login", "error"];

#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    pub request_timeout: Duration,
    pub readiness_timeout: Duration,
    pub poll_interval: Duration,
}

/// Loads monitor pages over HTTP and polls until they show rows or an
/// affirmative empty signal.
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: Client,
    readiness_timeout: Duration,
    poll_interval: Duration,
}

impl HttpPageFetcher {
    /// # Errors
    /// Returns an error when the HTTP client cannot be built.
    pub fn new(config: &HttpFetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("substitution-worker/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build monitor HTTP client")?;

        Ok(Self {
            client,
            readiness_timeout: config.readiness_timeout,
            poll_interval: config.poll_interval,
        })
    }

    async fn load(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await.map_err(|err| {
            if err.is_timeout() {
                FetchError::Unreachable(format!("request to {url} timed out"))
            } else {
                FetchError::Unreachable(err.to_string())
            }
        })?;

        let landed = response.url().clone();
        if is_unexpected_landing(&landed) {
            return Err(FetchError::Redirected(landed.to_string()));
        }

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Unreachable(format!(
                "monitor returned {status} for {url}"
            )));
        }

        response
            .text()
            .await
            .map_err(|err| FetchError::Unreachable(err.to_string()))
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let deadline = Instant::now() + self.readiness_timeout;
        loop {
            let html = self.load(url).await?;
            let snapshot = extract::analyze(&html);
            debug!(
                url,
                readiness = snapshot.readiness.as_str(),
                rows_detected = snapshot.rows_detected,
                rows = snapshot.rows.len(),
                "inspected monitor page"
            );

            if snapshot.readiness != Readiness::Undetermined {
                return Ok(snapshot.into_page());
            }
            if Instant::now() + self.poll_interval >= deadline {
                info!(url, "no readiness signal within budget, treating page as empty");
                return Ok(snapshot.into_page());
            }
            sleep(self.poll_interval).await;
        }
    }
}

/// WebUntis routes its login view through the fragment (`#/login`), so the
/// fragment is checked along with path and query.
fn is_unexpected_landing(url: &Url) -> bool {
    let parts = [url.path(), url.query().unwrap_or_default(), url.fragment().unwrap_or_default()]
        .map(str::to_ascii_lowercase);
    UNEXPECTED_LANDING_MARKERS
        .iter()
        .any(|marker| parts.iter().any(|part| part.contains(marker)))
}
