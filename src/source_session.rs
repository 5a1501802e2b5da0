use std::{num::NonZeroU32, sync::Arc, time::Duration};

use anyhow::Context;
use log::info;
use tokio::sync::Mutex;

use crate::{config::ScrapingConfig, requests::RequestClient};

/// Anything that can turn a URL into page content.
#[allow(async_fn_in_trait)]
pub trait Fetcher {
    async fn fetch(&self, url: &str) -> anyhow::Result<String>;

    /// Frees whatever the fetcher keeps open. A later `fetch` reopens it.
    async fn release(&self) {}
}

/// The one shared connection to the results site. Opened on first use and
/// closed by `release`, which the pipeline calls at the end of every run.
pub struct SourceSession {
    timeout: Duration,
    requests_per_second: NonZeroU32,
    client: Mutex<Option<Arc<RequestClient>>>,
}

impl SourceSession {
    pub fn new(config: &ScrapingConfig) -> anyhow::Result<Self> {
        let requests_per_second = NonZeroU32::new(config.requests_per_second)
            .context("REQUESTS_PER_SECOND must be at least 1")?;
        Ok(Self {
            timeout: config.timeout(),
            requests_per_second,
            client: Mutex::new(None),
        })
    }

    pub async fn acquire(&self) -> anyhow::Result<Arc<RequestClient>> {
        let mut client = self.client.lock().await;
        if let Some(client) = client.as_ref() {
            return Ok(client.clone());
        }
        let opened = Arc::new(RequestClient::new(self.timeout, self.requests_per_second)?);
        info!("Source session opened");
        *client = Some(opened.clone());
        Ok(opened)
    }

    pub async fn is_open(&self) -> bool {
        self.client.lock().await.is_some()
    }
}

impl Fetcher for SourceSession {
    async fn fetch(&self, url: &str) -> anyhow::Result<String> {
        let client = self.acquire().await?;
        client
            .fetch_url_body(url)
            .await
            .with_context(|| format!("failed to fetch {url}"))
    }

    async fn release(&self) {
        if self.client.lock().await.take().is_some() {
            info!("Source session closed");
        }
    }
}
