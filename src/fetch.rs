use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};

const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Narrow transport capability: one URL in, raw body bytes out.
///
/// Production uses [`HttpFetcher`]; tests hand in fixture responses.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_bytes(&self, url: &str) -> anyhow::Result<Vec<u8>>;
}

/// reqwest-backed [`Fetcher`]. Built once at startup and shared read-only by
/// every worker; the request timeout is the only time bound in the run.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("build http client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_bytes(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, DESKTOP_USER_AGENT)
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("GET {url}: unexpected status {status}");
        }

        let body = response
            .bytes()
            .await
            .with_context(|| format!("read body: {url}"))?;

        Ok(body.to_vec())
    }
}
