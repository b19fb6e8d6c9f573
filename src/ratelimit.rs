//! Sliding-window call quota that delays callers instead of rejecting them.
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

#[derive(Debug)]
pub struct SlidingWindow {
    calls: usize,
    period: Duration,
    issued: Mutex<VecDeque<Instant>>,
}

impl SlidingWindow {
    pub fn new(calls: usize, period: Duration) -> Self {
        let calls = calls.max(1);
        Self {
            calls,
            period,
            issued: Mutex::new(VecDeque::with_capacity(calls)),
        }
    }

    /// Waits until the window has room, then records the call.
    pub async fn acquire(&self) {
        loop {
            let wake_at = {
                let mut issued = self.issued.lock().await;
                let now = Instant::now();
                while issued
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= self.period)
                {
                    issued.pop_front();
                }
                if issued.len() < self.calls {
                    issued.push_back(now);
                    return;
                }
                match issued.front() {
                    Some(oldest) => *oldest + self.period,
                    None => continue,
                }
            };
            debug!(
                "Webhook quota of {} calls per {:?} reached, waiting",
                self.calls, self.period
            );
            sleep_until(wake_at).await;
        }
    }

    /// Calls recorded within the current window.
    pub async fn in_window(&self) -> usize {
        let issued = self.issued.lock().await;
        let now = Instant::now();
        issued
            .iter()
            .filter(|t| now.duration_since(**t) < self.period)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_quota_immediately() {
        let window = SlidingWindow::new(3, Duration::from_secs(60));
        let start = Instant::now();
        for _ in 0..3 {
            window.acquire().await;
        }
        assert_eq!(Instant::now(), start);
        assert_eq!(window.in_window().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn delays_call_over_quota_until_oldest_expires() {
        let window = SlidingWindow::new(2, Duration::from_secs(60));
        let start = Instant::now();
        window.acquire().await;
        tokio::time::advance(Duration::from_secs(10)).await;
        window.acquire().await;

        window.acquire().await;
        assert_eq!(Instant::now() - start, Duration::from_secs(60));
        assert_eq!(window.in_window().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn window_slides_rather_than_resets() {
        let window = SlidingWindow::new(2, Duration::from_secs(60));
        let start = Instant::now();
        window.acquire().await;
        tokio::time::advance(Duration::from_secs(30)).await;
        window.acquire().await;
        // first slot frees at 60s, second at 90s
        window.acquire().await;
        window.acquire().await;
        assert_eq!(Instant::now() - start, Duration::from_secs(90));
    }
}
