/// In-process sliding-log rate limit store
///
/// State lives for the lifetime of the process and is not shared between
/// instances; deployments that run several replicas should configure Redis.
use super::{RateLimitRule, RateLimitStore, WindowCount};
use crate::error::AppResult;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Tracked keys before idle entries are swept
const MAX_TRACKED_KEYS: usize = 4096;

struct HitLog {
    hits: VecDeque<Instant>,
    window: Duration,
}

impl HitLog {
    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.hits.front() {
            if now.duration_since(*oldest) >= self.window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }

    fn is_idle(&self, now: Instant) -> bool {
        self.hits
            .back()
            .map(|newest| now.duration_since(*newest) >= self.window)
            .unwrap_or(true)
    }
}

/// Sliding-log store keeping one timestamp list per key
#[derive(Default)]
pub struct MemoryRateLimitStore {
    logs: Mutex<HashMap<String, HitLog>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently tracked
    pub async fn tracked_keys(&self) -> usize {
        self.logs.lock().await.len()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn record_hit(&self, key: &str, rule: &RateLimitRule) -> AppResult<WindowCount> {
        let now = Instant::now();
        let mut logs = self.logs.lock().await;

        if logs.len() >= MAX_TRACKED_KEYS && !logs.contains_key(key) {
            let before = logs.len();
            logs.retain(|_, log| !log.is_idle(now));
            debug!("Swept {} idle rate limit keys", before - logs.len());
        }

        let log = logs.entry(key.to_string()).or_insert_with(|| HitLog {
            hits: VecDeque::new(),
            window: rule.window,
        });
        log.window = rule.window;
        log.prune(now);
        log.hits.push_back(now);

        // Only the newest limit + 1 hits can influence a decision
        let keep = rule.limit as usize + 1;
        while log.hits.len() > keep {
            log.hits.pop_front();
        }

        let count = log.hits.len() as u32;
        let reset_after = if count >= rule.limit {
            // The oldest hit that must expire before one more fits
            let idx = log.hits.len() - rule.limit as usize;
            log.hits
                .get(idx)
                .map(|t| rule.window.saturating_sub(now.duration_since(*t)))
                .unwrap_or_default()
        } else {
            Duration::ZERO
        };

        Ok(WindowCount { count, reset_after })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_window_expires() {
        let store = MemoryRateLimitStore::new();
        let rule = RateLimitRule::new(2, 10);

        assert_eq!(store.record_hit("k", &rule).await.unwrap().count, 1);
        assert_eq!(store.record_hit("k", &rule).await.unwrap().count, 2);
        assert_eq!(store.record_hit("k", &rule).await.unwrap().count, 3);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(store.record_hit("k", &rule).await.unwrap().count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let store = MemoryRateLimitStore::new();
        let rule = RateLimitRule::new(2, 10);

        store.record_hit("k", &rule).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        store.record_hit("k", &rule).await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;

        // First hit has left the window, second has not
        let window = store.record_hit("k", &rule).await.unwrap();
        assert_eq!(window.count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_hits_extend_the_block() {
        let store = MemoryRateLimitStore::new();
        let rule = RateLimitRule::new(1, 10);

        store.record_hit("k", &rule).await.unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        let denied = store.record_hit("k", &rule).await.unwrap();
        assert_eq!(denied.count, 2);
        assert_eq!(denied.reset_after, Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(3)).await;
        let still = store.record_hit("k", &rule).await.unwrap();
        assert_eq!(still.count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_keys_are_swept() {
        let store = MemoryRateLimitStore::new();
        let rule = RateLimitRule::new(5, 1);

        for i in 0..MAX_TRACKED_KEYS {
            store.record_hit(&format!("k{}", i), &rule).await.unwrap();
        }
        assert_eq!(store.tracked_keys().await, MAX_TRACKED_KEYS);

        tokio::time::advance(Duration::from_secs(2)).await;
        store.record_hit("fresh", &rule).await.unwrap();
        assert_eq!(store.tracked_keys().await, 1);
    }
}
