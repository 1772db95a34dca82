//! Service lifecycle and in-flight request accounting.
//!
//! States move one way: `Running → Draining → Stopped`. Every request holds
//! an [`InFlightGuard`] for its whole duration. Once draining has begun and
//! the last guard is dropped, [`Lifecycle::drained`] resolves and the state
//! becomes `Stopped`. Listeners stop accepting connections when draining
//! begins; requests already admitted run to completion.
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Running = 0,
    Draining = 1,
    Stopped = 2,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LifecycleState::Running,
            1 => LifecycleState::Draining,
            _ => LifecycleState::Stopped,
        }
    }
}

#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
    in_flight: AtomicUsize,
    changed: Notify,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Running as u8),
            in_flight: AtomicUsize::new(0),
            changed: Notify::new(),
        }
    }
}

impl Lifecycle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Count a request as in flight until the guard is dropped.
    pub fn enter(self: &Arc<Self>) -> InFlightGuard {
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        metrics::gauge!("dispatch_in_flight_requests").set(now as f64);
        InFlightGuard {
            lifecycle: Arc::clone(self),
        }
    }

    /// Move from `Running` to `Draining`. Returns false if shutdown had
    /// already begun.
    pub fn begin_shutdown(&self) -> bool {
        let started = self
            .state
            .compare_exchange(
                LifecycleState::Running as u8,
                LifecycleState::Draining as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if started {
            tracing::info!(in_flight = self.in_flight(), "shutdown requested, draining");
        }
        self.changed.notify_waiters();
        started
    }

    /// Resolve once shutdown has begun and no request is in flight, then
    /// mark the lifecycle `Stopped`.
    pub async fn drained(&self) {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.state() != LifecycleState::Running && self.in_flight() == 0 {
                self.state
                    .store(LifecycleState::Stopped as u8, Ordering::Release);
                return;
            }
            notified.await;
        }
    }

    /// Resolve once shutdown has begun.
    pub async fn shutdown_requested(&self) {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_running() {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug)]
pub struct InFlightGuard {
    lifecycle: Arc<Lifecycle>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let remaining = self.lifecycle.in_flight.fetch_sub(1, Ordering::AcqRel) - 1;
        metrics::gauge!("dispatch_in_flight_requests").set(remaining as f64);
        if remaining == 0 {
            self.lifecycle.changed.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn guards_track_in_flight_count() {
        let lifecycle = Lifecycle::new();
        let first = lifecycle.enter();
        let second = lifecycle.enter();
        assert_eq!(lifecycle.in_flight(), 2);
        drop(first);
        assert_eq!(lifecycle.in_flight(), 1);
        drop(second);
        assert_eq!(lifecycle.in_flight(), 0);
    }

    #[test]
    fn shutdown_transitions_once() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.is_running());
        assert!(lifecycle.begin_shutdown());
        assert_eq!(lifecycle.state(), LifecycleState::Draining);
        assert!(!lifecycle.begin_shutdown());
    }

    #[tokio::test]
    async fn drained_waits_for_in_flight_requests() {
        let lifecycle = Lifecycle::new();
        let guard = lifecycle.enter();
        lifecycle.begin_shutdown();

        let waiter = {
            let lifecycle = lifecycle.clone();
            tokio::spawn(async move { lifecycle.drained().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        assert_eq!(lifecycle.state(), LifecycleState::Draining);

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("drained in time")
            .expect("join");
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn drained_is_immediate_when_idle() {
        let lifecycle = Lifecycle::new();
        lifecycle.begin_shutdown();
        tokio::time::timeout(Duration::from_secs(1), lifecycle.drained())
            .await
            .expect("drained");
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn shutdown_requested_wakes_waiters() {
        let lifecycle = Lifecycle::new();
        let waiter = {
            let lifecycle = lifecycle.clone();
            tokio::spawn(async move { lifecycle.shutdown_requested().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        lifecycle.begin_shutdown();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("woken")
            .expect("join");
    }
}
