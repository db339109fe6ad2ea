/// Shared rate limit store using Redis
///
/// Each key is a sorted set of hit timestamps (milliseconds since the epoch),
/// letting several service instances enforce one sliding window together.
use super::{RateLimitRule, RateLimitStore, WindowCount};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Client;
use std::time::Duration;
use tracing::{error, info};

const KEY_PREFIX: &str = "civic-desk:ratelimit:";

/// Sliding window rate limit store backed by Redis sorted sets
#[derive(Clone)]
pub struct RedisRateLimitStore {
    connection: ConnectionManager,
}

impl RedisRateLimitStore {
    /// Connect to Redis
    pub async fn connect(redis_url: &str) -> AppResult<Self> {
        info!("Connecting rate limit store to Redis");

        let client = Client::open(redis_url).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            AppError::Internal(format!("Redis client creation failed: {}", e))
        })?;

        let connection = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to connect to Redis: {}", e);
            AppError::Internal(format!("Redis connection failed: {}", e))
        })?;

        info!("Redis rate limit store ready");

        Ok(Self { connection })
    }
}

fn build_key(key: &str) -> String {
    format!("{}{}", KEY_PREFIX, key)
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn record_hit(&self, key: &str, rule: &RateLimitRule) -> AppResult<WindowCount> {
        let redis_key = build_key(key);
        let now_ms = chrono::Utc::now().timestamp_millis();
        let window_ms = rule.window.as_millis() as i64;
        let member = format!("{}-{}", now_ms, uuid::Uuid::new_v4().simple());
        let pivot = -(rule.limit as isize);

        let mut conn = self.connection.clone();
        let (count, pivot_hits): (u32, Vec<(String, i64)>) = redis::pipe()
            .atomic()
            .zrembyscore(&redis_key, 0, now_ms - window_ms)
            .ignore()
            .zadd(&redis_key, &member, now_ms)
            .ignore()
            .zcard(&redis_key)
            .zrange_withscores(&redis_key, pivot, pivot)
            .pexpire(&redis_key, window_ms)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Rate limit store failed: {}", e)))?;

        let reset_after = if count >= rule.limit {
            pivot_hits
                .first()
                .map(|(_, hit_ms)| {
                    let remaining = window_ms - (now_ms - hit_ms);
                    Duration::from_millis(remaining.max(0) as u64)
                })
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

    #[test]
    fn test_build_key() {
        assert_eq!(
            build_key("submitComment:1.2.3.4"),
            "civic-desk:ratelimit:submitComment:1.2.3.4"
        );
    }
}
