//! Status sink: a side-effect-free-to-the-core notification interface for
//! dominance transitions. The reference firmware paints the OLED blue on
//! `on_became_dominant` and clears it on `on_lost_dominance`; this crate
//! only defines the interface.

/// Receives dominance transition notifications. Implementations must not
/// block for long — they run inside the engine's critical section's
/// aftermath but should treat the call as a fire-and-forget signal to a
/// display or logger.
pub trait StatusSink: Send + Sync + 'static {
    fn on_became_dominant(&self);
    fn on_lost_dominance(&self);
}

/// A sink that does nothing; the default when no display/logger is wired
/// up (e.g. in tests).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl StatusSink for NullSink {
    fn on_became_dominant(&self) {}
    fn on_lost_dominance(&self) {}
}

#[cfg(any(test, feature = "mocks"))]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts transitions for test assertions.
    #[derive(Debug, Default)]
    pub struct CountingSink {
        pub became_dominant: AtomicUsize,
        pub lost_dominance: AtomicUsize,
    }

    impl CountingSink {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl StatusSink for CountingSink {
        fn on_became_dominant(&self) {
            self.became_dominant.fetch_add(1, Ordering::SeqCst);
        }

        fn on_lost_dominance(&self) {
            self.lost_dominance.fetch_add(1, Ordering::SeqCst);
        }
    }
}
