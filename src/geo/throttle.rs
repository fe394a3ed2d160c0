use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Process-wide minimum interval between calls to one external service.
///
/// Every worker shares the same instance, so the interval holds across
/// workers and not just within one. Callers queue on the lock while the
/// current holder sleeps out the remainder of the interval.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last_tick: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_tick: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits until the interval since the previous call has elapsed, then
    /// records this call.
    pub async fn wait(&self) {
        let mut guard = self.last_tick.lock().await;
        if let Some(prev) = *guard {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *guard = Some(Instant::now());
    }
}
