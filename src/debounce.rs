//! Per-key burst buffer with a delayed flush.
//!
//! The first event for a key arms a timer; later events for the same key are
//! stacked (up to `capacity`) until it fires. The flush forwards only the most
//! recently stacked event, so a user who corrects a rating a few times within
//! the window produces one notification with the final value.
use crate::event::{DebounceKey, RatingEvent};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub const DEFAULT_DELAY: Duration = Duration::from_secs(10);
pub const DEFAULT_CAPACITY: usize = 5;

#[async_trait]
pub trait FlushHandler: Send + Sync {
    async fn on_flush(&self, key: DebounceKey, event: RatingEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// First event of a burst; a flush is now scheduled.
    Scheduled,
    /// Stacked onto a pending burst, which now holds this many events.
    Buffered(usize),
    /// The pending burst was full.
    Dropped,
}

struct PendingBurst {
    events: Vec<RatingEvent>,
    /// Ties the burst to the timer armed for it; a timer whose burst was
    /// already flushed and replaced must not touch the new one.
    generation: u64,
    timer: JoinHandle<()>,
}

struct Inner {
    delay: Duration,
    capacity: usize,
    bursts: Mutex<HashMap<DebounceKey, PendingBurst>>,
    handler: Arc<dyn FlushHandler>,
    generations: AtomicU64,
    in_flight: AtomicUsize,
}

/// Counts a flush as in flight until dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct Debouncer {
    inner: Arc<Inner>,
}

impl Debouncer {
    pub fn new(handler: Arc<dyn FlushHandler>, delay: Duration, capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                delay,
                capacity: capacity.max(1),
                bursts: Mutex::new(HashMap::new()),
                handler,
                generations: AtomicU64::new(0),
                in_flight: AtomicUsize::new(0),
            }),
        }
    }

    pub async fn enqueue(&self, event: RatingEvent) -> Enqueued {
        let key = event.debounce_key();
        let mut bursts = self.inner.bursts.lock().await;

        if let Some(burst) = bursts.get_mut(&key) {
            if burst.events.len() >= self.inner.capacity {
                debug!("Burst for {} is full, dropping event", key);
                return Enqueued::Dropped;
            }
            burst.events.push(event);
            debug!("Buffered event {} for {}", burst.events.len(), key);
            return Enqueued::Buffered(burst.events.len());
        }

        // The map lock is held until the burst is inserted, so the timer can
        // never observe the key before it exists.
        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed);
        let timer = self.arm_timer(key.clone(), generation);
        bursts.insert(
            key.clone(),
            PendingBurst {
                events: vec![event],
                generation,
                timer,
            },
        );
        debug!("Scheduled flush for {} in {:?}", key, self.inner.delay);
        Enqueued::Scheduled
    }

    fn arm_timer(&self, key: DebounceKey, generation: u64) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(this.inner.delay).await;
            if let Some(burst) = this.take(&key, Some(generation)).await {
                this.forward(&key, burst).await;
            }
        })
    }

    /// Flushes `key` now instead of waiting for its timer, which is cancelled.
    pub async fn flush(&self, key: &DebounceKey) {
        if let Some(burst) = self.take(key, None).await {
            burst.timer.abort();
            self.forward(key, burst).await;
        }
    }

    async fn take(&self, key: &DebounceKey, generation: Option<u64>) -> Option<PendingBurst> {
        let mut bursts = self.inner.bursts.lock().await;
        let current = bursts.get(key)?.generation;
        if generation.is_some_and(|g| g != current) {
            return None;
        }
        bursts.remove(key)
    }

    async fn forward(&self, key: &DebounceKey, mut burst: PendingBurst) {
        let _in_flight = InFlight::enter(&self.inner.in_flight);
        let discarded = burst.events.len().saturating_sub(1);
        let Some(event) = burst.events.pop() else {
            return;
        };
        info!(
            "Flushing {} (rating {}, {} earlier discarded)",
            key, event.rating, discarded
        );
        self.inner.handler.on_flush(key.clone(), event).await;
    }

    pub async fn buffered(&self, key: &DebounceKey) -> Option<usize> {
        self.inner
            .bursts
            .lock()
            .await
            .get(key)
            .map(|b| b.events.len())
    }

    /// Timers armed for bursts that have not flushed yet.
    pub async fn armed_timers(&self) -> usize {
        self.inner
            .bursts
            .lock()
            .await
            .values()
            .filter(|b| !b.timer.is_finished())
            .count()
    }

    /// Flushes that left the buffer and are still being delivered.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Cancels every pending flush and returns how many events were discarded.
    pub async fn shutdown(&self) -> usize {
        let mut bursts = self.inner.bursts.lock().await;
        let mut discarded = 0;
        for (_, burst) in bursts.drain() {
            burst.timer.abort();
            discarded += burst.events.len();
        }
        discarded
    }
}
