use anyhow::Context;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter as GovernorRateLimiter};
use std::{num::NonZeroU32, time::Duration};

// The lower, the faster.
const MS_BETWEEN_REQ: Duration = Duration::from_millis(250);

pub struct RateLimiter {
    req_per_sec: DefaultDirectRateLimiter,
    ms_between_req: DefaultDirectRateLimiter,
}

impl RateLimiter {
    pub fn new(requests_per_second: NonZeroU32) -> anyhow::Result<Self> {
        // Limit to X total req/sec on average.
        let req_per_sec = GovernorRateLimiter::direct(Quota::per_second(requests_per_second));

        // No two requests closer than Y ms.
        let spacing =
            Quota::with_period(MS_BETWEEN_REQ).context("request spacing must be non-zero")?;
        let ms_between_req = GovernorRateLimiter::direct(spacing);

        Ok(RateLimiter {
            req_per_sec,
            ms_between_req,
        })
    }

    pub async fn wait_until_ready(&self) {
        // Per-second quota first, then spacing.
        self.req_per_sec.until_ready().await;
        self.ms_between_req.until_ready().await;
    }
}
