use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use qupid_shared::clients::redis::RedisClient;
use qupid_shared::errors::{AppError, AppResult};

/// Counts hits per key inside a time window.
#[axum::async_trait]
pub trait RateCounter: Send + Sync {
    /// Records a hit and returns whether it is within `limit`.
    async fn hit(&self, key: &str, limit: u64, window: Duration) -> AppResult<bool>;

    /// Drops state that can no longer affect a decision.
    fn cleanup(&self, _max_window: Duration) {}
}

/// Process-local sliding-window log.
#[derive(Default)]
pub struct InMemoryRateCounter {
    windows: DashMap<String, VecDeque<Instant>>,
}

impl InMemoryRateCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit_at(&self, key: &str, limit: u64, window: Duration, now: Instant) -> bool {
        let mut hits = self.windows.entry(key.to_string()).or_default();
        if let Some(cutoff) = now.checked_sub(window) {
            while hits.front().is_some_and(|t| *t <= cutoff) {
                hits.pop_front();
            }
        }
        if hits.len() as u64 >= limit {
            return false;
        }
        hits.push_back(now);
        true
    }

    pub fn prune_at(&self, max_window: Duration, now: Instant) {
        let Some(cutoff) = now.checked_sub(max_window) else { return };
        self.windows.retain(|_, hits| {
            while hits.front().is_some_and(|t| *t <= cutoff) {
                hits.pop_front();
            }
            !hits.is_empty()
        });
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

#[axum::async_trait]
impl RateCounter for InMemoryRateCounter {
    async fn hit(&self, key: &str, limit: u64, window: Duration) -> AppResult<bool> {
        Ok(self.hit_at(key, limit, window, Instant::now()))
    }

    fn cleanup(&self, max_window: Duration) {
        self.prune_at(max_window, Instant::now());
    }
}

/// Shared fixed-window counter for multi-instance deployments.
pub struct RedisRateCounter {
    client: RedisClient,
}

impl RedisRateCounter {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }
}

#[axum::async_trait]
impl RateCounter for RedisRateCounter {
    async fn hit(&self, key: &str, limit: u64, window: Duration) -> AppResult<bool> {
        let window_secs = window.as_secs().max(1);
        let redis_key = format!("qupid:rl:{key}:{window_secs}");
        self.client
            .rate_limit_check(&redis_key, limit, window_secs)
            .await
            .map_err(|e| AppError::internal(format!("rate limiter unavailable: {e}")))
    }
}
