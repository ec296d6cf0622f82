use dashmap::DashMap;
use std::collections::VecDeque;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::DetectError;

/// Length of the sliding window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Fixed delay advertised to rejected clients, in seconds.
pub const RETRY_AFTER_SECS: u64 = 60;

/// Outcome of one admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Requests left in the current window after this one
    pub remaining: u32,
    /// Configured requests per window (0 when the limiter is disabled)
    pub limit: u32,
}

/// A sliding-window admission gate keyed by client identity
///
/// Each client owns a queue of request timestamps inside the trailing window.
/// The map is sharded, and a client's queue is pruned, compared and appended
/// while its shard lock is held, so concurrent bursts from one client can
/// neither overshoot the limit nor observe a half-pruned window.
///
/// The limiter is an ordinary value: construct it at startup and share it
/// through an `Arc` with whatever boundary needs it.
#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum number of requests allowed per window, 0 disables the gate
    limit: u32,
    /// Duration of the sliding window
    window: Duration,
    /// Request timestamps per client, oldest first
    windows: DashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter allowing `requests_per_minute` per client
    ///
    /// # Arguments
    ///
    /// * `requests_per_minute` - Maximum admitted requests per client per minute; 0 disables limiting
    pub fn new(requests_per_minute: u32) -> Self {
        Self::with_window(requests_per_minute, WINDOW)
    }

    /// Creates a limiter with a custom window length
    pub fn with_window(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: DashMap::new(),
        }
    }

    /// A limiter that admits everything
    pub fn disabled() -> Self {
        Self::new(0)
    }

    pub fn is_enabled(&self) -> bool {
        self.limit > 0
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Checks and records a request from `client` at the current time
    pub fn check(&self, client: &str) -> RateDecision {
        self.check_at(client, Instant::now())
    }

    /// Checks and records a request from `client` at `now`
    ///
    /// Timestamps at least one window old are pruned before the count is
    /// compared. A rejected request is not recorded.
    pub fn check_at(&self, client: &str, now: Instant) -> RateDecision {
        if !self.is_enabled() {
            return RateDecision {
                allowed: true,
                remaining: 0,
                limit: 0,
            };
        }

        let mut timestamps = self.windows.entry(client.to_string()).or_default();
        prune(&mut timestamps, now, self.window);

        let used = timestamps.len() as u32;
        if used >= self.limit {
            debug!("Rate limit reached for {} ({} in window)", client, used);
            return RateDecision {
                allowed: false,
                remaining: 0,
                limit: self.limit,
            };
        }

        timestamps.push_back(now);
        RateDecision {
            allowed: true,
            remaining: self.limit - used - 1,
            limit: self.limit,
        }
    }

    /// Like [`RateLimiter::check`], but turns a rejection into [`DetectError::RateLimited`]
    pub fn admit(&self, client: &str) -> Result<RateDecision, DetectError> {
        let decision = self.check(client);
        if decision.allowed {
            Ok(decision)
        } else {
            Err(DetectError::RateLimited {
                limit: self.limit,
                retry_after_secs: RETRY_AFTER_SECS,
            })
        }
    }

    /// Drops clients whose window is empty at `now`, returning how many were removed
    ///
    /// Intended for a periodic background task so that the map does not grow
    /// with every client ever seen.
    pub fn purge_idle(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, timestamps| {
            prune(timestamps, now, self.window);
            !timestamps.is_empty()
        });
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            debug!("Purged {} idle rate-limit windows", removed);
        }
        removed
    }

    /// Number of clients currently holding a window
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = timestamps.front() {
        if now.saturating_duration_since(*oldest) >= window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

/// Derives the rate-limit key for a request
///
/// Uses the first hop of `X-Forwarded-For` when present, else the peer address.
pub fn client_identity(forwarded_for: Option<&str>, peer: Option<IpAddr>) -> String {
    if let Some(first) = forwarded_for
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
    {
        return first.to_string();
    }

    match peer {
        Some(addr) => addr.to_string(),
        None => "unknown".to_string(),
    }
}
