// gbak: GitHub account backup tool
//
// SPDX-FileCopyrightText: 2024 Yannis Charalambidis
// SPDX-License-Identifier: MIT

//! Proactive rate-limit backoff.
//!
//! ```text
//! response headers
//!   X-RateLimit-Remaining < threshold ?
//!        | yes
//!        v
//!   tick 0 .. ticks:  cancelled? --> Err(Cancelled)
//!                     sleep(tick)
//!   cancelled? --> Err(Cancelled)
//! ```

use std::time::Duration;

use reqwest::header::HeaderMap;
use tracing::{debug, warn};

use crate::cancel::Cancellation;
use crate::error::{GbakError, GbakResult};

pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// When and how long to back off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    warning_threshold: u64,
    ticks: u32,
    tick: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::new(10, 10, Duration::from_secs(1))
    }
}

impl RateLimitPolicy {
    #[must_use]
    pub const fn new(warning_threshold: u64, ticks: u32, tick: Duration) -> Self {
        Self {
            warning_threshold,
            ticks,
            tick,
        }
    }

    #[must_use]
    pub const fn warning_threshold(&self) -> u64 {
        self.warning_threshold
    }

    /// Interval between cancellation checks.
    #[must_use]
    pub const fn tick(&self) -> Duration {
        self.tick
    }

    #[must_use]
    pub const fn total_wait(&self) -> Duration {
        self.tick.saturating_mul(self.ticks)
    }

    #[must_use]
    pub const fn should_back_off(&self, remaining: u64) -> bool {
        remaining < self.warning_threshold
    }

    /// Wait out the backoff, checking `cancel` before every tick and once
    /// more at the end.
    ///
    /// # Errors
    ///
    /// Returns [`GbakError::Cancelled`] as soon as cancellation is observed.
    pub async fn wait(&self, cancel: &Cancellation) -> GbakResult<()> {
        for elapsed in 0..self.ticks {
            if cancel.is_requested() {
                debug!(elapsed_ticks = elapsed, "backoff interrupted");
                return Err(GbakError::Cancelled);
            }
            debug!(remaining_ticks = self.ticks - elapsed, "waiting for rate limit");
            tokio::time::sleep(self.tick).await;
        }
        if cancel.is_requested() {
            return Err(GbakError::Cancelled);
        }
        Ok(())
    }

    /// Inspect quota headers and back off if the remaining quota is low.
    ///
    /// Returns whether a backoff happened.
    ///
    /// # Errors
    ///
    /// Returns [`GbakError::Cancelled`] if cancellation interrupts the wait.
    pub async fn check(&self, headers: &HeaderMap, cancel: &Cancellation) -> GbakResult<bool> {
        let Some(remaining) = remaining_quota(headers) else {
            return Ok(false);
        };
        if !self.should_back_off(remaining) {
            return Ok(false);
        }

        match quota_reset(headers) {
            Some(reset) => warn!(
                remaining,
                reset,
                "Approaching rate limit. Waiting {} seconds.",
                self.total_wait().as_secs_f64()
            ),
            None => warn!(
                remaining,
                "Approaching rate limit. Waiting {} seconds.",
                self.total_wait().as_secs_f64()
            ),
        }
        self.wait(cancel).await?;
        Ok(true)
    }
}

/// `X-RateLimit-Remaining`, if present and numeric.
#[must_use]
pub fn remaining_quota(headers: &HeaderMap) -> Option<u64> {
    header_u64(headers, REMAINING_HEADER)
}

/// `X-RateLimit-Reset` (epoch seconds), if present and numeric.
#[must_use]
pub fn quota_reset(headers: &HeaderMap) -> Option<u64> {
    header_u64(headers, RESET_HEADER)
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    let raw = headers.get(name)?;
    let parsed = raw.to_str().ok().and_then(|s| s.trim().parse().ok());
    if parsed.is_none() {
        debug!(header = name, value = ?raw, "ignoring unparsable header");
    }
    parsed
}
