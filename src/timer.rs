//! Timer service: a monotonic clock plus cancellable one-shot and periodic
//! timers, each independently armed (see the "Callback-driven timers"
//! design note — a single re-armed timer is fragile, so the engine never
//! shares one handle across the leaver sweep, the discovery-exit timer,
//! and the dominance-check timer).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Opaque handle to an armed timer. Cancellation is idempotent: cancelling
/// an already-fired or already-cancelled handle is a no-op.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    id: u64,
    cancelled: Arc<std::sync::atomic::AtomicBool>,
}

impl TimerHandle {
    fn new(id: u64) -> Self {
        Self {
            id,
            cancelled: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Timer primitives used by the engine. Callbacks run in the event
/// context (see the concurrency design note); implementations backed by a
/// real clock must guarantee monotonicity of `now_ms`.
pub trait Timer: Send + Sync + 'static {
    /// Milliseconds since some fixed but unspecified epoch. Must never
    /// decrease between calls on the same instance.
    fn now_ms(&self) -> u64;

    /// Arm a one-shot timer; `cb` runs once after `delay_ms`.
    fn arm_one_shot(&self, delay_ms: u64, cb: Box<dyn FnOnce() + Send>) -> TimerHandle;

    /// Arm a periodic timer; `cb` runs every `period_ms` until cancelled.
    fn arm_periodic(&self, period_ms: u64, cb: Box<dyn Fn() + Send>) -> TimerHandle;

    /// Cancel a previously armed timer. Idempotent.
    fn cancel(&self, handle: &TimerHandle);
}

/// A [`Timer`] backed by `std::thread` and `std::time`, suitable for a
/// hosted node. Each arm spawns a short-lived thread that sleeps for the
/// requested delay and then invokes the callback unless cancelled first.
#[derive(Clone)]
pub struct StdTimer {
    start: std::time::Instant,
    next_id: Arc<AtomicU64>,
}

impl StdTimer {
    pub fn new() -> Self {
        Self {
            start: std::time::Instant::now(),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn alloc_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for StdTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer for StdTimer {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn arm_one_shot(&self, delay_ms: u64, cb: Box<dyn FnOnce() + Send>) -> TimerHandle {
        let handle = TimerHandle::new(self.alloc_id());
        let cancelled = handle.cancelled.clone();

        thread::spawn(move || {
            thread::sleep(Duration::from_millis(delay_ms));
            if !cancelled.load(Ordering::SeqCst) {
                cb();
            }
        });

        handle
    }

    fn arm_periodic(&self, period_ms: u64, cb: Box<dyn Fn() + Send>) -> TimerHandle {
        let handle = TimerHandle::new(self.alloc_id());
        let cancelled = handle.cancelled.clone();

        thread::spawn(move || loop {
            thread::sleep(Duration::from_millis(period_ms));
            if cancelled.load(Ordering::SeqCst) {
                return;
            }
            cb();
        });

        handle
    }

    fn cancel(&self, handle: &TimerHandle) {
        handle.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Test/mock timer: time only advances when explicitly stepped, and arms
/// are recorded instead of actually scheduled, so tests can drive timer
/// fires deterministically.
#[cfg(any(test, feature = "mocks"))]
pub mod mock {
    use super::*;

    struct Armed {
        due_ms: u64,
        period_ms: Option<u64>,
        cancelled: Arc<std::sync::atomic::AtomicBool>,
        one_shot: Option<Box<dyn FnOnce() + Send>>,
        periodic: Option<Box<dyn Fn() + Send>>,
    }

    /// A manually-advanced timer for deterministic tests.
    pub struct MockTimer {
        inner: Mutex<MockInner>,
    }

    struct MockInner {
        now_ms: u64,
        next_id: u64,
        armed: Vec<Armed>,
    }

    impl MockTimer {
        pub fn new() -> Self {
            Self {
                inner: Mutex::new(MockInner {
                    now_ms: 0,
                    next_id: 1,
                    armed: Vec::new(),
                }),
            }
        }

        /// Advance the mock clock by `ms`, firing (and re-arming, for
        /// periodics) any timers whose deadline has passed.
        pub fn advance(&self, ms: u64) {
            let target = {
                let mut inner = self.inner.lock().unwrap();
                inner.now_ms += ms;
                inner.now_ms
            };

            loop {
                let due = {
                    let mut inner = self.inner.lock().unwrap();
                    let idx = inner
                        .armed
                        .iter()
                        .position(|a| !a.cancelled.load(Ordering::SeqCst) && a.due_ms <= target);
                    match idx {
                        Some(i) => {
                            let mut a = inner.armed.remove(i);
                            if let Some(period) = a.period_ms {
                                let cb = a.periodic.take();
                                let cancelled = a.cancelled.clone();
                                inner.armed.push(Armed {
                                    due_ms: a.due_ms + period,
                                    period_ms: Some(period),
                                    cancelled,
                                    one_shot: None,
                                    periodic: cb,
                                });
                            }
                            Some(a)
                        }
                        None => None,
                    }
                };

                match due {
                    Some(mut a) => {
                        if a.cancelled.load(Ordering::SeqCst) {
                            continue;
                        }
                        if let Some(cb) = a.one_shot.take() {
                            cb();
                        } else if let Some(cb) = a.periodic.take() {
                            cb();
                        }
                    }
                    None => break,
                }
            }
        }
    }

    impl Default for MockTimer {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Timer for MockTimer {
        fn now_ms(&self) -> u64 {
            self.inner.lock().unwrap().now_ms
        }

        fn arm_one_shot(&self, delay_ms: u64, cb: Box<dyn FnOnce() + Send>) -> TimerHandle {
            let mut inner = self.inner.lock().unwrap();
            let id = inner.next_id;
            inner.next_id += 1;
            let handle = TimerHandle::new(id);
            inner.armed.push(Armed {
                due_ms: inner.now_ms + delay_ms,
                period_ms: None,
                cancelled: handle.cancelled.clone(),
                one_shot: Some(cb),
                periodic: None,
            });
            handle
        }

        fn arm_periodic(&self, period_ms: u64, cb: Box<dyn Fn() + Send>) -> TimerHandle {
            let mut inner = self.inner.lock().unwrap();
            let id = inner.next_id;
            inner.next_id += 1;
            let handle = TimerHandle::new(id);
            inner.armed.push(Armed {
                due_ms: inner.now_ms + period_ms,
                period_ms: Some(period_ms),
                cancelled: handle.cancelled.clone(),
                one_shot: None,
                periodic: Some(cb),
            });
            handle
        }

        fn cancel(&self, handle: &TimerHandle) {
            handle.cancelled.store(true, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod test {
    use super::mock::MockTimer;
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn one_shot_fires_once_after_delay() {
        let timer = MockTimer::new();
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        timer.arm_one_shot(100, Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        timer.advance(50);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        timer.advance(50);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        timer.advance(1000);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn periodic_fires_repeatedly() {
        let timer = MockTimer::new();
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let handle = timer.arm_periodic(100, Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        timer.advance(350);
        assert_eq!(count.load(Ordering::SeqCst), 3);

        timer.cancel(&handle);
        timer.advance(1000);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn cancel_before_fire_suppresses_callback() {
        let timer = MockTimer::new();
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let handle = timer.arm_one_shot(100, Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        timer.cancel(&handle);
        timer.advance(1000);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
