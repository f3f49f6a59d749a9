//! Rate limiting and deadlines around collaborator calls.

use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::error::{RagError, Stage};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Paces outbound calls to respect a provider's rate limit.
#[derive(Clone, Default)]
pub struct Throttle {
    limiter: Option<Arc<DirectLimiter>>,
}

impl Throttle {
    /// Allows one call per `interval`. A zero interval disables throttling.
    pub fn every(interval: Duration) -> Self {
        let limiter = Quota::with_period(interval)
            .map(|quota| Arc::new(RateLimiter::direct(quota.allow_burst(NonZeroU32::MIN))));
        Self { limiter }
    }

    /// Never waits.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Waits until the next call is allowed.
    pub async fn ready(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    /// True when this throttle never waits.
    pub fn is_unlimited(&self) -> bool {
        self.limiter.is_none()
    }
}

/// Non-blocking per-minute admission check for inbound requests.
#[derive(Clone)]
pub struct RequestLimiter {
    limiter: Arc<DirectLimiter>,
}

impl RequestLimiter {
    /// Builds a limiter admitting `per_minute` requests with a burst of `burst`.
    /// Returns `None` when either value is zero.
    pub fn new(per_minute: u32, burst: u32) -> Option<Self> {
        let per_minute = NonZeroU32::new(per_minute)?;
        let burst = NonZeroU32::new(burst)?;
        let quota = Quota::per_minute(per_minute).allow_burst(burst);
        Some(Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    /// Takes a permit if one is available.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

/// Runs a collaborator call under a deadline and classifies its failure.
pub async fn with_deadline<T, F>(stage: Stage, limit: Duration, call: F) -> Result<T, RagError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(RagError::provider(stage, source)),
        Err(_) => Err(RagError::Timeout {
            stage,
            after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
