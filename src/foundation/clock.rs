//! Tick sources driving the live preview loop and the export frame pacing.
//!
//! Both consumers only ever ask "what time is it" and "wake me at `deadline`", measured from
//! the moment the source was created. [`VirtualClock`] jumps straight to the deadline, which
//! makes frame loops deterministic and timer-free under test.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use std::time::Duration;

#[async_trait::async_trait]
pub trait TickSource: Send {
    /// Elapsed time since the source was created.
    fn now(&self) -> Duration;

    /// Resolve once `now() >= deadline`.
    async fn wait_until(&mut self, deadline: Duration);
}

/// Wall-clock tick source backed by the tokio timer.
#[derive(Debug)]
pub struct SystemClock {
    origin: tokio::time::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TickSource for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn wait_until(&mut self, deadline: Duration) {
        tokio::time::sleep_until(self.origin + deadline).await;
    }
}

/// Manually advanced clock. Clones share the same timeline so a test can observe how far a
/// loop has advanced.
#[derive(Clone, Debug, Default)]
pub struct VirtualClock {
    now_nanos: Arc<AtomicU64>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now_nanos
            .fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl TickSource for VirtualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.now_nanos.load(Ordering::SeqCst))
    }

    async fn wait_until(&mut self, deadline: Duration) {
        self.now_nanos
            .fetch_max(deadline.as_nanos() as u64, Ordering::SeqCst);
        // Give other tasks on the runtime a chance to run between virtual ticks.
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn virtual_clock_jumps_to_deadline_and_never_rewinds() {
        let mut clock = VirtualClock::new();
        let observer = clock.clone();
        clock.wait_until(Duration::from_millis(40)).await;
        assert_eq!(observer.now(), Duration::from_millis(40));
        clock.wait_until(Duration::from_millis(10)).await;
        assert_eq!(observer.now(), Duration::from_millis(40));
        observer.advance(Duration::from_millis(5));
        assert_eq!(clock.now(), Duration::from_millis(45));
    }

    #[tokio::test(start_paused = true)]
    async fn system_clock_sleeps_until_deadline() {
        let mut clock = SystemClock::new();
        clock.wait_until(Duration::from_millis(250)).await;
        assert!(clock.now() >= Duration::from_millis(250));
    }
}
