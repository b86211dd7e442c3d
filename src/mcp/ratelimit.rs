//! Token-bucket rate limiting around every tool invocation.
//!
//! One global bucket for the whole process plus one lazily-created bucket
//! per session. Buckets never block: a call either takes a token or is
//! rejected immediately.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{RateLimitConfig, RateLimitSpec};
use crate::mcp::session::SessionObserver;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("rate limit exceeded: too many requests globally")]
    Global,

    #[error("rate limit exceeded: too many requests from this session")]
    Session,
}

/// Continuous-refill token bucket. `burst` caps the stored tokens; `rps`
/// tokens accrue per second.
#[derive(Debug)]
pub struct TokenBucket {
    rps: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(spec: RateLimitSpec) -> Self {
        Self {
            rps: spec.rps,
            burst: spec.burst as f64,
            state: Mutex::new(BucketState {
                tokens: spec.burst as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Takes one token if available. Never waits.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().expect("bucket lock poisoned");
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rps).min(self.burst);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Middleware guarding `tools/call`: global bucket first, then the caller's
/// session bucket.
pub struct RateLimiter {
    config: RateLimitConfig,
    global: TokenBucket,
    sessions: RwLock<HashMap<String, TokenBucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            global: TokenBucket::new(config.global),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Admission check for one tool call. A missing session ID only skips
    /// the per-session level.
    pub fn check(&self, session_id: Option<&str>) -> Result<(), RateLimitError> {
        if !self.global.try_acquire() {
            warn!("global rate limit exceeded");
            return Err(RateLimitError::Global);
        }

        if let Some(session_id) = session_id {
            if !self.session_acquire(session_id) {
                warn!(session_id, "session rate limit exceeded");
                return Err(RateLimitError::Session);
            }
        }

        Ok(())
    }

    fn session_acquire(&self, session_id: &str) -> bool {
        {
            let sessions = self.sessions.read().expect("session bucket lock poisoned");
            if let Some(bucket) = sessions.get(session_id) {
                return bucket.try_acquire();
            }
        }

        let mut sessions = self.sessions.write().expect("session bucket lock poisoned");
        // Re-check: another call may have created the bucket while the read
        // lock was released.
        let bucket = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| TokenBucket::new(self.config.session));
        bucket.try_acquire()
    }

    /// Drops the bucket for an ended session. End-of-session removal is
    /// authoritative; there is no background sweep.
    pub fn remove_session(&self, session_id: &str) {
        let removed = self
            .sessions
            .write()
            .expect("session bucket lock poisoned")
            .remove(session_id)
            .is_some();
        if removed {
            debug!(session_id, "removed session rate limiter");
        }
    }

    #[cfg(test)]
    fn session_bucket_count(&self) -> usize {
        self.sessions.read().unwrap().len()
    }
}

impl SessionObserver for RateLimiter {
    fn on_session_start(&self, _session_id: &str, _has_backend: bool) {}

    fn on_session_end(&self, session_id: &str) {
        self.remove_session(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(global: (f64, u32), session: (f64, u32)) -> RateLimitConfig {
        RateLimitConfig {
            global: RateLimitSpec {
                rps: global.0,
                burst: global.1,
            },
            session: RateLimitSpec {
                rps: session.0,
                burst: session.1,
            },
        }
    }

    #[test]
    fn bucket_allows_burst_then_denies() {
        let bucket = TokenBucket::new(RateLimitSpec { rps: 1.0, burst: 3 });
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }

    #[test]
    fn bucket_refills_over_time() {
        let bucket = TokenBucket::new(RateLimitSpec {
            rps: 1000.0,
            burst: 1,
        });
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(bucket.try_acquire());
    }

    #[test]
    fn global_denial_comes_before_session() {
        let limiter = RateLimiter::new(config((1.0, 1), (100.0, 100)));
        assert!(limiter.check(Some("s1")).is_ok());
        assert_eq!(limiter.check(Some("s1")), Err(RateLimitError::Global));
        // The denied call must not have consumed a session bucket entry for
        // a fresh session.
        assert_eq!(limiter.session_bucket_count(), 1);
    }

    #[test]
    fn session_buckets_are_independent() {
        let limiter = RateLimiter::new(config((100.0, 100), (1.0, 1)));
        assert!(limiter.check(Some("s1")).is_ok());
        assert_eq!(limiter.check(Some("s1")), Err(RateLimitError::Session));
        // A different session still has its own burst.
        assert!(limiter.check(Some("s2")).is_ok());
    }

    #[test]
    fn calls_without_session_only_hit_global() {
        let limiter = RateLimiter::new(config((100.0, 100), (1.0, 1)));
        for _ in 0..10 {
            assert!(limiter.check(None).is_ok());
        }
        assert_eq!(limiter.session_bucket_count(), 0);
    }

    #[test]
    fn ended_sessions_lose_their_bucket() {
        let limiter = RateLimiter::new(config((100.0, 100), (1.0, 1)));
        assert!(limiter.check(Some("s1")).is_ok());
        assert_eq!(limiter.session_bucket_count(), 1);

        limiter.on_session_end("s1");
        assert_eq!(limiter.session_bucket_count(), 0);

        // A recreated session starts with a full burst again.
        assert!(limiter.check(Some("s1")).is_ok());
    }
}
