//! Abstraction over the half-duplex broadcast LoRa radio.
//!
//! The core assumes no delivery guarantees and no flow control beyond
//! single-packet granularity: `send` is best-effort and non-blocking,
//! and `set_receive_callback` delivers `(frame, rssi_dbm)` pairs
//! asynchronously from whatever thread or interrupt context the driver
//! uses.

/// Received-signal-strength reading, in dBm, associated with an inbound
/// frame.
pub type RssiDbm = i16;

/// Radio driver interface. `E` is the driver's own error type.
pub trait Radio<E>: Send + Sync + 'static {
    /// Queue `frame` for transmission. Non-blocking; does not guarantee
    /// delivery.
    fn send(&self, frame: &[u8]) -> Result<(), E>;

    /// Register the callback invoked on every received frame. Replaces
    /// any previously registered callback.
    fn set_receive_callback(&self, cb: Box<dyn Fn(&[u8], RssiDbm) + Send + Sync>);
}

/// In-memory mock radio for tests: `send` records frames instead of
/// transmitting them, and a test can invoke `deliver` to simulate an
/// inbound frame reaching the receive callback.
#[cfg(any(test, feature = "mocks"))]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct MockRadioError;

    pub struct MockRadio {
        sent: Mutex<Vec<Vec<u8>>>,
        #[allow(clippy::type_complexity)]
        callback: Mutex<Option<Box<dyn Fn(&[u8], RssiDbm) + Send + Sync>>>,
    }

    impl MockRadio {
        pub fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                callback: Mutex::new(None),
            }
        }

        /// Deliver a frame to whatever callback is currently registered.
        pub fn deliver(&self, frame: &[u8], rssi_dbm: RssiDbm) {
            let guard = self.callback.lock().unwrap();
            if let Some(cb) = guard.as_ref() {
                cb(frame, rssi_dbm);
            }
        }

        /// All frames handed to `send` so far, in order.
        pub fn sent_frames(&self) -> Vec<Vec<u8>> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Default for MockRadio {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Radio<MockRadioError> for MockRadio {
        fn send(&self, frame: &[u8]) -> Result<(), MockRadioError> {
            self.sent.lock().unwrap().push(frame.to_vec());
            Ok(())
        }

        fn set_receive_callback(&self, cb: Box<dyn Fn(&[u8], RssiDbm) + Send + Sync>) {
            *self.callback.lock().unwrap() = Some(cb);
        }
    }
}

#[cfg(test)]
mod test {
    use super::mock::MockRadio;
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn send_records_frame() {
        let radio = MockRadio::new();
        radio.send(&[1, 2, 3]).unwrap();
        assert_eq!(radio.sent_frames(), vec![vec![1, 2, 3]]);
    }

    #[test]
    fn deliver_invokes_registered_callback() {
        let radio = MockRadio::new();
        let got = Arc::new(AtomicBool::new(false));
        let g = got.clone();
        radio.set_receive_callback(Box::new(move |frame, rssi| {
            assert_eq!(frame, &[9, 9]);
            assert_eq!(rssi, -42);
            g.store(true, Ordering::SeqCst);
        }));
        radio.deliver(&[9, 9], -42);
        assert!(got.load(Ordering::SeqCst));
    }
}
