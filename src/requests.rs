use std::{num::NonZeroU32, time::Duration};

use anyhow::Context;
use reqwest::{Client, ClientBuilder, Response};

use crate::ratelimit::RateLimiter;

const USER_AGENT: &str = concat!("ffcv_points/", env!("CARGO_PKG_VERSION"));

pub struct RequestClient {
    client: Client,
    rate_limiter: RateLimiter,
}

impl RequestClient {
    pub fn new(timeout: Duration, requests_per_second: NonZeroU32) -> anyhow::Result<Self> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build http client")?;
        let rate_limiter = RateLimiter::new(requests_per_second)?;
        Ok(Self {
            client,
            rate_limiter,
        })
    }

    pub async fn fetch_url_response(&self, url: &str) -> anyhow::Result<Response> {
        // Wait (non-blocking) until we're allowed to make a request according
        // to our self-imposed rate-limiting policy.
        self.rate_limiter.wait_until_ready().await;

        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response)
    }

    pub async fn fetch_url_body(&self, url: &str) -> anyhow::Result<String> {
        let response = self.fetch_url_response(url).await?;
        let body = response.text().await?;
        Ok(body)
    }
}
