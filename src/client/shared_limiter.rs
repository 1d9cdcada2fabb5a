// Cross-process token bucket persisted to a JSON state file.
//
// Legacy mode for running standalone mission processes side by side: every
// process points at the same state file and the fleet collectively stays
// under the upstream request limit. State updates go through a temp file
// plus atomic rename, so a concurrent writer can never observe a torn file.
// Priority ordering only applies within one process here; the in-process
// RequestScheduler is the default for the single-process commander.
use crate::client::scheduler::{Priority, RateLimit};
use crate::o_debug;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tokio::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
struct BucketState {
    tokens: f64,
    /// Unix seconds, wall clock - shared across processes
    last_refill: f64,
}

pub struct SharedRateLimiter {
    path: PathBuf,
    rate: f64,
    burst: u32,
    // Serializes acquisition within this process
    lock: Mutex<()>,
}

impl SharedRateLimiter {
    pub fn new(path: PathBuf, rate: f64, burst: u32) -> Self {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        Self { path, rate, burst, lock: Mutex::new(()) }
    }

    /// Block until a token is available, then consume it.
    pub async fn acquire_token(&self) {
        loop {
            let wait = {
                let _guard = self.lock.lock().await;
                self.try_acquire()
            };
            if wait <= 0.0 {
                return;
            }
            o_debug!("🪣 Shared rate limiter: waiting {:.2}s", wait);
            tokio::time::sleep(Duration::from_secs_f64(wait)).await;
        }
    }

    /// Take a token if possible. Returns 0.0 on success, else seconds to wait.
    fn try_acquire(&self) -> f64 {
        let now = Utc::now().timestamp_millis() as f64 / 1000.0;
        let state = self.read_state(now);

        let elapsed = (now - state.last_refill).max(0.0);
        let tokens = (state.tokens + elapsed * self.rate).min(self.burst as f64);

        if tokens >= 1.0 {
            self.write_state(BucketState { tokens: tokens - 1.0, last_refill: now });
            return 0.0;
        }
        self.write_state(BucketState { tokens, last_refill: now });
        (1.0 - tokens) / self.rate
    }

    fn read_state(&self, now: f64) -> BucketState {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or(BucketState { tokens: self.burst as f64, last_refill: now })
    }

    fn write_state(&self, state: BucketState) {
        let tmp = self.path.with_extension("tmp");
        let raw = match serde_json::to_string(&state) {
            Ok(raw) => raw,
            Err(_) => return,
        };
        // Write-then-rename keeps the state file whole for other processes
        if fs::write(&tmp, raw).is_ok() {
            let _ = fs::rename(&tmp, &self.path);
        }
    }
}

#[async_trait]
impl RateLimit for SharedRateLimiter {
    async fn acquire(&self, _priority: Priority) {
        self.acquire_token().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_state_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("fc_limiter_{}_{}.json", name, std::process::id()))
    }

    #[tokio::test]
    async fn fresh_bucket_does_not_block() {
        let path = temp_state_path("fresh");
        let _ = fs::remove_file(&path);
        let limiter = SharedRateLimiter::new(path.clone(), 2.0, 10);
        let start = std::time::Instant::now();
        limiter.acquire_token().await;
        assert!(start.elapsed() < Duration::from_millis(100));
        let _ = fs::remove_file(&path);
    }

    #[tokio::test]
    async fn two_limiters_share_one_bucket() {
        let path = temp_state_path("shared");
        let _ = fs::remove_file(&path);
        let first = SharedRateLimiter::new(path.clone(), 10.0, 2);
        let second = SharedRateLimiter::new(path.clone(), 10.0, 2);

        first.acquire_token().await;
        first.acquire_token().await;
        let start = std::time::Instant::now();
        second.acquire_token().await;
        assert!(
            start.elapsed() >= Duration::from_millis(50),
            "second limiter should see the drained bucket, waited {:?}",
            start.elapsed()
        );
        let _ = fs::remove_file(&path);
    }
}
