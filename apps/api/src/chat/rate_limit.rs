//! Fixed-window rate limiting for the chat endpoint.
//!
//! The store is a trait so the gateway can be tested without global state and so the
//! in-memory table can be swapped for a shared cache when running more than one instance.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Key used when the caller's address cannot be determined.
pub const UNKNOWN_CLIENT_KEY: &str = "unknown";

/// Shared bucket for new clients that arrive while the table is full of live records.
pub const OVERFLOW_CLIENT_KEY: &str = "overflow";

/// Upper bound on distinct client keys tracked at once.
const MAX_TRACKED_KEYS: usize = 10_000;

/// A full table is scanned for expired records at most this often.
const PRUNE_INTERVAL_SECS: i64 = 1;

/// Per-client counter for the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub count: u32,
    pub window_reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Limited { retry_after_secs: u64 },
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Records a request from `key` at `now` and decides whether it may proceed.
    async fn check(&self, key: &str, now: DateTime<Utc>) -> Result<RateLimitDecision>;
}

/// Process-local store. State is lost on restart.
pub struct InMemoryRateLimitStore {
    max_requests: u32,
    window: chrono::Duration,
    table: Mutex<RecordTable>,
}

#[derive(Debug, Default)]
struct RecordTable {
    records: HashMap<String, RateLimitRecord>,
    next_prune_at: Option<DateTime<Utc>>,
}

impl RecordTable {
    /// Whether a new key may get its own record. A full table is pruned first, but only
    /// once per `PRUNE_INTERVAL_SECS`, so a flood of new keys does not rescan it each time.
    fn has_room(&mut self, now: DateTime<Utc>) -> bool {
        if self.records.len() < MAX_TRACKED_KEYS {
            return true;
        }

        if self.next_prune_at.map_or(true, |at| now >= at) {
            let before = self.records.len();
            self.records.retain(|_, record| record.window_reset_at > now);
            self.next_prune_at = Some(now + chrono::Duration::seconds(PRUNE_INTERVAL_SECS));
            debug!(
                "Pruned {} expired rate limit records",
                before - self.records.len()
            );
        }

        self.records.len() < MAX_TRACKED_KEYS
    }
}

impl InMemoryRateLimitStore {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window: chrono::Duration::from_std(window)
                .unwrap_or_else(|_| chrono::Duration::weeks(52)),
            table: Mutex::new(RecordTable::default()),
        }
    }

    #[cfg(test)]
    fn record(&self, key: &str) -> Option<RateLimitRecord> {
        self.table
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .records
            .get(key)
            .copied()
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .records
            .len()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn check(&self, key: &str, now: DateTime<Utc>) -> Result<RateLimitDecision> {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());

        let key = if table.records.contains_key(key) || table.has_room(now) {
            key
        } else {
            debug!(client_key = key, "Rate limit table full, using overflow bucket");
            OVERFLOW_CLIENT_KEY
        };

        let record = table.records.entry(key.to_string()).or_insert(RateLimitRecord {
            count: 0,
            window_reset_at: now + self.window,
        });

        if now >= record.window_reset_at {
            *record = RateLimitRecord {
                count: 1,
                window_reset_at: now + self.window,
            };
            return Ok(RateLimitDecision::Allowed {
                remaining: self.max_requests.saturating_sub(1),
            });
        }

        if record.count >= self.max_requests {
            return Ok(RateLimitDecision::Limited {
                retry_after_secs: seconds_until(now, record.window_reset_at),
            });
        }

        record.count += 1;
        Ok(RateLimitDecision::Allowed {
            remaining: self.max_requests - record.count,
        })
    }
}

/// Whole seconds until `reset_at`, rounded up and never below 1.
fn seconds_until(now: DateTime<Utc>, reset_at: DateTime<Utc>) -> u64 {
    let millis = (reset_at - now).num_milliseconds().max(0);
    let secs = (millis + 999) / 1000;
    u64::try_from(secs).unwrap_or(1).max(1)
}

/// Best-effort caller address: first `X-Forwarded-For` hop, then `X-Real-IP`.
pub fn client_key(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .unwrap_or(UNKNOWN_CLIENT_KEY)
        .to_string()
}
