// In-process priority rate limiter - the single gate for every upstream call.
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};

/// Request priority classes. Lower value = served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    /// Refuel when stranded, emergency actions
    Critical = 0,
    /// Buy/sell at market (revenue-generating)
    High = 1,
    /// Navigate, dock, orbit
    Normal = 2,
    /// Status refresh, get_ship
    Low = 3,
    /// Probe drift, idle polling
    Background = 4,
}

/// One acquire() per upstream request, interchangeable between the
/// in-process scheduler and the file-backed cross-process bucket.
#[async_trait]
pub trait RateLimit: Send + Sync {
    async fn acquire(&self, priority: Priority);
}

struct Waiter {
    priority: Priority,
    seq: u64,
    wake: oneshot::Sender<()>,
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Waiter {}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Waiter {
    // BinaryHeap is a max-heap; invert so the smallest (priority, seq) pops first.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.priority, other.seq).cmp(&(self.priority, self.seq))
    }
}

struct SchedulerState {
    tokens: f64,
    last_refill: Instant,
    queue: BinaryHeap<Waiter>,
    next_seq: u64,
}

impl SchedulerState {
    fn refill(&mut self, rate: f64, burst: u32) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(burst as f64);
        self.last_refill = now;
    }
}

/// Token bucket with a strict priority queue.
///
/// Tokens refill at `rate`/sec up to `burst`. A background tick (10 Hz)
/// wakes the highest-priority waiter while tokens remain; ties within a
/// priority class are FIFO by enqueue order. The fast path consumes a
/// token without enqueueing when nobody is waiting.
pub struct RequestScheduler {
    rate: f64,
    burst: u32,
    state: Mutex<SchedulerState>,
    tick: Mutex<Option<JoinHandle<()>>>,
}

impl RequestScheduler {
    pub fn new(rate: f64, burst: u32) -> Self {
        Self {
            rate,
            burst,
            state: Mutex::new(SchedulerState {
                tokens: burst as f64,
                last_refill: Instant::now(),
                queue: BinaryHeap::new(),
                next_seq: 0,
            }),
            tick: Mutex::new(None),
        }
    }

    /// Start the background drain tick. Call once, after the runtime is up.
    pub fn start(self: &Arc<Self>) {
        let mut slot = match self.tick.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.is_some() {
            return;
        }
        let scheduler = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_millis(100));
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tick.tick().await;
                scheduler.drain();
            }
        }));
    }

    /// Stop the tick and release every pending waiter so callers can
    /// observe the shutdown signal and exit.
    pub fn stop(&self) {
        if let Ok(mut slot) = self.tick.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
        let mut state = self.lock_state();
        while let Some(waiter) = state.queue.pop() {
            let _ = waiter.wake.send(());
        }
    }

    /// Block cooperatively until one token has been consumed.
    pub async fn acquire_token(&self, priority: Priority) {
        let rx = {
            let mut state = self.lock_state();
            state.refill(self.rate, self.burst);
            // Fast path: token available and nobody queued
            if state.tokens >= 1.0 && state.queue.is_empty() {
                state.tokens -= 1.0;
                return;
            }
            let (tx, rx) = oneshot::channel();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.queue.push(Waiter { priority, seq, wake: tx });
            rx
        };
        // A closed channel means the scheduler stopped - treat as released.
        let _ = rx.await;
    }

    fn drain(&self) {
        let mut state = self.lock_state();
        state.refill(self.rate, self.burst);
        while state.tokens >= 1.0 {
            let Some(waiter) = state.queue.pop() else {
                break;
            };
            // Receiver gone (caller cancelled) - token stays available
            if waiter.wake.send(()).is_ok() {
                state.tokens -= 1.0;
            }
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SchedulerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl RateLimit for RequestScheduler {
    async fn acquire(&self, priority: Priority) {
        self.acquire_token(priority).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[tokio::test(start_paused = true)]
    async fn burst_tokens_are_immediate() {
        let scheduler = Arc::new(RequestScheduler::new(2.0, 10));
        scheduler.start();
        let start = Instant::now();
        for _ in 0..10 {
            scheduler.acquire_token(Priority::Normal).await;
        }
        assert!(start.elapsed() < Duration::from_millis(10));
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn third_acquire_waits_after_burst_of_two() {
        let scheduler = Arc::new(RequestScheduler::new(10.0, 2));
        scheduler.start();
        scheduler.acquire_token(Priority::Normal).await;
        scheduler.acquire_token(Priority::Normal).await;
        let start = Instant::now();
        scheduler.acquire_token(Priority::Normal).await;
        assert!(
            start.elapsed() >= Duration::from_millis(50),
            "third acquire should wait for a refill, waited {:?}",
            start.elapsed()
        );
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn waiters_served_in_priority_order() {
        // rate 10/s with a 100ms tick = exactly one token per tick,
        // so admissions happen one at a time in queue order.
        let scheduler = Arc::new(RequestScheduler::new(10.0, 2));
        scheduler.acquire_token(Priority::Normal).await;
        scheduler.acquire_token(Priority::Normal).await;

        let order = Arc::new(StdMutex::new(Vec::new()));
        for (label, priority) in [
            ("background", Priority::Background),
            ("low", Priority::Low),
            ("high", Priority::High),
        ] {
            let scheduler = Arc::clone(&scheduler);
            let order = Arc::clone(&order);
            tokio::spawn(async move {
                scheduler.acquire_token(priority).await;
                order.lock().unwrap().push(label);
            });
        }
        // Let all three enqueue before any token refills
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        scheduler.start();
        tokio::time::sleep(Duration::from_millis(450)).await;

        assert_eq!(*order.lock().unwrap(), vec!["high", "low", "background"]);
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn equal_priority_is_fifo() {
        let scheduler = Arc::new(RequestScheduler::new(10.0, 2));
        scheduler.acquire_token(Priority::Normal).await;
        scheduler.acquire_token(Priority::Normal).await;

        let order = Arc::new(StdMutex::new(Vec::new()));
        for label in ["first", "second"] {
            let scheduler = Arc::clone(&scheduler);
            let order = Arc::clone(&order);
            tokio::spawn(async move {
                scheduler.acquire_token(Priority::Normal).await;
                order.lock().unwrap().push(label);
            });
            // Ensure deterministic enqueue order
            for _ in 0..5 {
                tokio::task::yield_now().await;
            }
        }
        scheduler.start();
        tokio::time::sleep(Duration::from_millis(350)).await;

        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_releases_pending_waiters() {
        let scheduler = Arc::new(RequestScheduler::new(1.0, 1));
        scheduler.acquire_token(Priority::Normal).await;

        let waiter = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move {
                scheduler.acquire_token(Priority::Normal).await;
            })
        };
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        scheduler.stop();
        waiter.await.unwrap();
    }
}
