//! Send throttle: enforces a minimum gap between consecutive outbound sends.
//!
//! Two backends:
//! - [`IntervalThrottle`]: in-process, shared by every batch in this process.
//! - [`RedisThrottle`]: shared by every process pointing at the same Redis key.
//!   Uses `SET NX PX` so only one sender can claim each slot.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionLike, ConnectionManager};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Gate awaited before each outbound send.
#[async_trait]
pub trait Throttle: Send + Sync {
    /// Wait until the next send slot is available.
    async fn acquire(&self);
}

/// In-process fixed-interval throttle.
///
/// Slots are reserved under the lock and slept on outside it, so concurrent
/// callers queue up one interval apart.
pub struct IntervalThrottle {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl IntervalThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    async fn reserve(&self) -> Instant {
        let mut next_slot = self.next_slot.lock().await;
        let now = Instant::now();
        let slot = match *next_slot {
            Some(slot) if slot > now => slot,
            _ => now,
        };
        *next_slot = Some(slot + self.interval);
        slot
    }
}

#[async_trait]
impl Throttle for IntervalThrottle {
    async fn acquire(&self) {
        if self.interval.is_zero() {
            return;
        }
        let slot = self.reserve().await;
        let wait = slot.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            tracing::debug!(wait_ms = wait.as_millis() as u64, "Throttle wait");
        }
        tokio::time::sleep_until(slot).await;
    }
}

/// Redis-backed fixed-interval throttle.
///
/// A slot is claimed with `SET key 1 NX PX interval`. While the key exists the
/// caller polls its remaining TTL. If Redis is unreachable the caller falls
/// back to sleeping one interval locally.
pub struct RedisThrottle<C = ConnectionManager> {
    redis: C,
    key: String,
    interval: Duration,
}

impl<C> RedisThrottle<C>
where
    C: ConnectionLike + Clone + Send + Sync,
{
    pub fn new(redis: C, key: impl Into<String>, interval: Duration) -> Self {
        Self {
            redis,
            key: key.into(),
            interval,
        }
    }

    /// Try to claim the current slot. `Ok(None)` means claimed; `Ok(Some(wait))`
    /// means another sender holds it for roughly `wait`.
    async fn try_claim(&self) -> redis::RedisResult<Option<Duration>> {
        let mut conn = self.redis.clone();
        let millis = self.interval.as_millis().max(1) as u64;

        let claimed: Option<String> = redis::cmd("SET")
            .arg(&self.key)
            .arg("1")
            .arg("NX")
            .arg("PX")
            .arg(millis)
            .query_async(&mut conn)
            .await?;

        if claimed.is_some() {
            return Ok(None);
        }

        let ttl: i64 = redis::cmd("PTTL")
            .arg(&self.key)
            .query_async(&mut conn)
            .await?;

        // -2: key vanished between SET and PTTL; -1: no expiry set
        let wait = match ttl {
            t if t > 0 => Duration::from_millis(t as u64),
            -1 => self.interval,
            _ => Duration::from_millis(1),
        };
        Ok(Some(wait))
    }
}

#[async_trait]
impl<C> Throttle for RedisThrottle<C>
where
    C: ConnectionLike + Clone + Send + Sync,
{
    async fn acquire(&self) {
        if self.interval.is_zero() {
            return;
        }

        loop {
            match self.try_claim().await {
                Ok(None) => return,
                Ok(Some(wait)) => {
                    tracing::debug!(
                        key = %self.key,
                        wait_ms = wait.as_millis() as u64,
                        "Throttle wait"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    tracing::warn!(
                        key = %self.key,
                        error = %e,
                        "Redis throttle unavailable, pacing locally"
                    );
                    tracing::debug!(
                        key = %self.key,
                        wait_ms = self.interval.as_millis() as u64,
                        "Throttle wait"
                    );
                    tokio::time::sleep(self.interval).await;
                    return;
                }
            }
        }
    }
}
