//! The CDS engine: the state machine driving discovery, beacon cadence,
//! neighbor-set broadcasts, leaver detection, and the dominance decision
//! (spec.md §4.3-4.5), wrapped in the four-entry-point facade a packet
//! dispatcher drives (§4.5).
//!
//! `EngineState`, the neighbor table, and the dominant-set index share a
//! single lock (spec.md §5): [`Inner`], guarded by [`CdsEngine`]'s
//! `Mutex`. The lock is never held across a radio send, a timer arm, or
//! `send_beacon`'s sleep — every method here drops the guard before
//! performing one of those.

pub mod config;
pub mod dominance;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

use log::{debug, info, trace, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub use config::EngineConfig;

use crate::codec::{NeighborEntry, Packet};
use crate::error::CdsError;
use crate::mac::Mac;
use crate::neighbor::NeighborTable;
use crate::radio::{Radio, RssiDbm};
use crate::sink::StatusSink;
use crate::timer::{Timer, TimerHandle};

/// Which of the two wire-identical neighbor-set packet types to send. The
/// original source's call site passed a keyword that didn't match its own
/// `packet_type` parameter (spec.md §9); this type makes the two variants
/// impossible to confuse at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetKind {
    Full,
    Update,
}

struct Inner<R, T, S, E> {
    self_mac: Mac,
    is_dominant: bool,
    in_discovery: bool,
    exited_discovery_once: bool,

    beacon_min_ms: u64,
    beacon_max_ms: u64,

    table: NeighborTable,
    rng: StdRng,

    discovery_exit: Option<TimerHandle>,
    leaver_check: Option<TimerHandle>,
    dominance_check: Option<TimerHandle>,

    decode_errors: u64,
    send_errors: u64,
    dropped_unknown_sender: u64,

    self_weak: Option<Weak<CdsEngine<R, T, S, E>>>,
}

/// The CDS engine. `R` is the radio driver, `T` the timer service, `S` the
/// status sink, and `E` the radio driver's error type.
///
/// Constructed behind an `Arc` so that timer callbacks and the radio's
/// receive callback can hold a reference back into the engine without a
/// process-wide singleton (spec.md §9's "Global singleton state" note):
/// the `Arc` is captured once at bind time via a `Weak` stored in
/// [`Inner`], not threaded through every call site.
pub struct CdsEngine<R, T, S, E> {
    inner: Mutex<Inner<R, T, S, E>>,
    radio: R,
    timer: T,
    sink: S,
    config: EngineConfig,
}

impl<R, T, S, E> CdsEngine<R, T, S, E>
where
    R: Radio<E>,
    T: Timer,
    S: StatusSink,
    E: std::fmt::Debug + Send + 'static,
{
    /// Construct a new engine, enter discovery, and arm the boot discovery
    /// window timer. `radio`'s receive callback is not wired up here; call
    /// [`CdsEngine::bind`] once before driving a beacon task.
    pub fn new(self_mac: Mac, radio: R, timer: T, sink: S, config: EngineConfig) -> Arc<Self> {
        let inner = Inner {
            self_mac,
            is_dominant: false,
            in_discovery: true,
            exited_discovery_once: false,

            beacon_min_ms: config.discovery_beacon_min_ms,
            beacon_max_ms: config.discovery_beacon_max_ms,

            table: NeighborTable::new(),
            rng: StdRng::from_entropy(),

            discovery_exit: None,
            leaver_check: None,
            dominance_check: None,

            decode_errors: 0,
            send_errors: 0,
            dropped_unknown_sender: 0,

            self_weak: None,
        };

        let engine = Arc::new(Self {
            inner: Mutex::new(inner),
            radio,
            timer,
            sink,
            config,
        });

        {
            let weak = Arc::downgrade(&engine);
            engine.inner.lock().unwrap().self_weak = Some(weak);
        }

        info!("node {} booting into discovery", self_mac);
        engine.arm_discovery_exit(engine.config.discovery_boot_ms);

        engine
    }

    /// Wire this engine's ingress handlers to the radio's receive
    /// callback. Call once, before the beacon task starts.
    pub fn bind(&self) {
        let engine = self.arc();
        self.radio.set_receive_callback(Box::new(move |frame, rssi_dbm| {
            engine.on_frame(frame, rssi_dbm);
        }));
    }

    /// Whether this node currently considers itself a dominator.
    pub fn is_dominant(&self) -> bool {
        self.inner.lock().unwrap().is_dominant
    }

    /// Number of frames dropped for failing to decode.
    pub fn decode_error_count(&self) -> u64 {
        self.inner.lock().unwrap().decode_errors
    }

    /// Number of radio `send` failures observed so far.
    pub fn send_error_count(&self) -> u64 {
        self.inner.lock().unwrap().send_errors
    }

    /// Sleep a uniform random interval within the engine's current beacon
    /// bounds, then transmit a `BEACON`. Intended to be driven in a loop
    /// from a dedicated task; this is the one cooperative suspend point
    /// in the engine (spec.md §5) — no lock is held across the sleep.
    pub fn send_beacon(&self) -> Result<(), CdsError<E>> {
        let delay_ms = {
            let mut inner = self.inner.lock().unwrap();
            inner.rng.gen_range(inner.beacon_min_ms..inner.beacon_max_ms)
        };

        thread::sleep(Duration::from_millis(delay_ms));

        let (sender, is_dominant) = {
            let inner = self.inner.lock().unwrap();
            (inner.self_mac, inner.is_dominant)
        };

        let frame = Packet::Beacon { sender, is_dominant }.encode();
        self.radio.send(&frame).map_err(|e| {
            warn!("beacon send failed: {:?}", e);
            self.inner.lock().unwrap().send_errors += 1;
            CdsError::Radio(e)
        })
    }

    /// Ingress for a `BEACON` frame (spec.md §4.3).
    pub fn on_beacon(&self, frame: &[u8], rssi_dbm: RssiDbm) {
        let (sender, is_dominant) = match Packet::decode(frame) {
            Ok(Packet::Beacon { sender, is_dominant }) => (sender, is_dominant),
            Ok(_) => {
                self.count_decode_error();
                warn!("on_beacon given a non-BEACON frame");
                return;
            }
            Err(e) => {
                self.count_decode_error();
                warn!("failed to decode BEACON: {:?}", e);
                return;
            }
        };

        let now_ms = self.timer.now_ms();

        let reenter_delay_ms = {
            let mut inner = self.inner.lock().unwrap();
            let was_in_discovery = inner.in_discovery;
            let is_new = inner.table.upsert_beacon(sender, rssi_dbm, is_dominant, now_ms);
            debug!(
                "beacon from {} (dominant={}, rssi={}dBm)",
                sender, is_dominant, rssi_dbm
            );

            if is_new && !was_in_discovery {
                let delay = inner.rng.gen_range(
                    self.config.discovery_reentry_min_ms..self.config.discovery_reentry_max_ms,
                );
                Some(delay)
            } else {
                None
            }
        };

        if let Some(delay_ms) = reenter_delay_ms {
            info!("unknown neighbor {} seen outside discovery; re-entering discovery", sender);
            self.enter_discovery(delay_ms);
        }
    }

    /// Ingress for a `NEIGHBOR_SET` or `UPD_NEIGHBOR_SET` frame (spec.md
    /// §4.3). The wire layout is identical for both; the tag decides
    /// whether the resulting dominance check, once all two-hop views are
    /// present, runs immediately or is coalesced behind a 60s timer.
    pub fn on_neighbor_set(&self, frame: &[u8]) {
        let (sender, entries, is_update) = match Packet::decode(frame) {
            Ok(Packet::NeighborSet { sender, entries }) => (sender, entries, false),
            Ok(Packet::UpdNeighborSet { sender, entries }) => (sender, entries, true),
            Ok(_) => {
                self.count_decode_error();
                warn!("on_neighbor_set given a non-neighbor-set frame");
                return;
            }
            Err(e) => {
                self.count_decode_error();
                warn!("failed to decode neighbor set: {:?}", e);
                return;
            }
        };

        let view = build_view(sender, &entries);

        enum Action {
            None,
            RunNow,
            ArmCheck,
        }

        let action = {
            let mut inner = self.inner.lock().unwrap();

            if !inner.table.contains(&sender) {
                inner.dropped_unknown_sender += 1;
                debug!(
                    "dropping neighbor-set from unknown sender {} (no prior BEACON)",
                    sender
                );
                Action::None
            } else {
                inner.table.set_two_hop(sender, view);

                let all_present = inner.table.snapshot().all(|(_, r)| r.two_hop_view.is_some());
                if !all_present {
                    Action::None
                } else if !is_update {
                    Action::RunNow
                } else if inner.dominance_check.is_none() {
                    Action::ArmCheck
                } else {
                    Action::None
                }
            }
        };

        match action {
            Action::None => {}
            Action::RunNow => self.run_dominance_check(),
            Action::ArmCheck => self.arm_dominance_check(self.config.dominance_check_delay_ms),
        }
    }

    // -- internal dispatch -------------------------------------------------

    fn arc(&self) -> Arc<Self> {
        self.inner
            .lock()
            .unwrap()
            .self_weak
            .clone()
            .and_then(|w| w.upgrade())
            .expect("CdsEngine self-reference not yet installed")
    }

    fn on_frame(&self, frame: &[u8], rssi_dbm: RssiDbm) {
        trace!("received {} byte frame at {}dBm", frame.len(), rssi_dbm);
        match frame.first() {
            Some(&crate::codec::TAG_BEACON) => self.on_beacon(frame, rssi_dbm),
            Some(&crate::codec::TAG_NEIGHBOR_SET) | Some(&crate::codec::TAG_UPD_NEIGHBOR_SET) => {
                self.on_neighbor_set(frame)
            }
            Some(other) => {
                self.count_decode_error();
                warn!("dropping frame with unrecognized tag {}", other);
            }
            None => {
                self.count_decode_error();
                warn!("dropping empty frame");
            }
        }
    }

    fn count_decode_error(&self) {
        self.inner.lock().unwrap().decode_errors += 1;
    }

    // -- discovery -----------------------------------------------------

    fn enter_discovery(&self, delay_ms: u64) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.in_discovery = true;
            inner.beacon_min_ms = self.config.discovery_beacon_min_ms;
            inner.beacon_max_ms = self.config.discovery_beacon_max_ms;
            if let Some(handle) = inner.discovery_exit.take() {
                self.timer.cancel(&handle);
            }
        }
        self.arm_discovery_exit(delay_ms);
    }

    fn arm_discovery_exit(&self, delay_ms: u64) {
        let engine = self.arc();
        let handle = self
            .timer
            .arm_one_shot(delay_ms, Box::new(move || engine.on_discovery_exit_fire()));
        self.inner.lock().unwrap().discovery_exit = Some(handle);
    }

    fn on_discovery_exit_fire(&self) {
        let first_exit = {
            let mut inner = self.inner.lock().unwrap();
            inner.discovery_exit = None;
            inner.in_discovery = false;
            inner.beacon_min_ms = self.config.steady_beacon_min_ms;
            inner.beacon_max_ms = self.config.steady_beacon_max_ms;
            let first = !inner.exited_discovery_once;
            inner.exited_discovery_once = true;
            first
        };

        info!("discovery window closed (first_exit={})", first_exit);

        if first_exit {
            self.broadcast_neighbor_set(SetKind::Full);
            self.arm_leaver_check();
        } else {
            self.broadcast_neighbor_set(SetKind::Update);
        }
    }

    // -- leaver sweep ----------------------------------------------------

    fn arm_leaver_check(&self) {
        let engine = self.arc();
        let handle = self
            .timer
            .arm_periodic(self.config.leaver_period_ms, Box::new(move || engine.on_leaver_fire()));
        self.inner.lock().unwrap().leaver_check = Some(handle);
    }

    fn on_leaver_fire(&self) {
        let removed = {
            let mut inner = self.inner.lock().unwrap();
            if inner.in_discovery {
                return;
            }
            let now_ms = self.timer.now_ms();
            inner.table.expire(now_ms, self.config.leaver_staleness_ms)
        };

        if removed.is_empty() {
            return;
        }

        info!("leaver sweep removed {} neighbor(s)", removed.len());
        self.broadcast_neighbor_set(SetKind::Update);

        let (currently_dominant, check_armed) = {
            let inner = self.inner.lock().unwrap();
            (inner.is_dominant, inner.dominance_check.is_some())
        };

        if currently_dominant && !check_armed {
            self.arm_dominance_check(self.config.dominance_check_delay_ms);
        }
    }

    // -- dominance ---------------------------------------------------------

    fn arm_dominance_check(&self, delay_ms: u64) {
        let engine = self.arc();
        let handle = self
            .timer
            .arm_one_shot(delay_ms, Box::new(move || engine.on_dominance_check_fire()));

        let mut inner = self.inner.lock().unwrap();
        if inner.dominance_check.is_none() {
            inner.dominance_check = Some(handle);
        } else {
            // Lost a race with another arm request (I4): the handle we
            // just created is redundant, cancel it immediately.
            drop(inner);
            self.timer.cancel(&handle);
        }
    }

    fn on_dominance_check_fire(&self) {
        // Clear the handle before computing, so a fresh request arriving
        // mid-computation can arm its own timer (spec.md §5 cancellation).
        self.inner.lock().unwrap().dominance_check = None;
        self.run_dominance_check();
    }

    fn run_dominance_check(&self) {
        let (new_flag, old_flag) = {
            let inner = self.inner.lock().unwrap();
            let decided = dominance::decide(&inner.self_mac, &inner.table, inner.is_dominant);
            (decided, inner.is_dominant)
        };

        if new_flag != old_flag {
            self.inner.lock().unwrap().is_dominant = new_flag;
            if new_flag {
                info!("became dominant");
                self.sink.on_became_dominant();
            } else {
                info!("lost dominance");
                self.sink.on_lost_dominance();
            }
        }

        self.send_immediate_beacon();
    }

    // -- outbound ------------------------------------------------------

    fn send_immediate_beacon(&self) {
        let (sender, is_dominant) = {
            let inner = self.inner.lock().unwrap();
            (inner.self_mac, inner.is_dominant)
        };
        self.send_frame(&Packet::Beacon { sender, is_dominant }.encode());
    }

    fn broadcast_neighbor_set(&self, kind: SetKind) {
        let (sender, entries) = {
            let inner = self.inner.lock().unwrap();
            let entries: Vec<NeighborEntry> = inner
                .table
                .snapshot()
                .map(|(mac, record)| NeighborEntry {
                    mac: *mac,
                    rssi_dbm: record.smoothed_rssi.round() as i16,
                })
                .collect();
            (inner.self_mac, entries)
        };

        let packet = match kind {
            SetKind::Full => Packet::NeighborSet { sender, entries },
            SetKind::Update => Packet::UpdNeighborSet { sender, entries },
        };

        self.send_frame(&packet.encode());
    }

    /// Best-effort send: logs and counts a failure but never retries — the
    /// periodic beacon cadence provides implicit retransmission (spec.md
    /// §7).
    fn send_frame(&self, frame: &[u8]) {
        trace!("sending {} byte frame", frame.len());
        if let Err(e) = self.radio.send(frame) {
            self.inner.lock().unwrap().send_errors += 1;
            warn!("radio send failed: {:?}", e);
        }
    }
}

/// Build a sender's advertised two-hop view from a decoded entry list:
/// the sender itself at RSSI 0 (I2), plus one entry per listed neighbor.
fn build_view(sender: Mac, entries: &[NeighborEntry]) -> HashMap<Mac, i16> {
    let mut view = HashMap::with_capacity(entries.len() + 1);
    view.insert(sender, 0);
    for entry in entries {
        view.insert(entry.mac, entry.rssi_dbm);
    }
    view
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::radio::mock::MockRadio;
    use crate::sink::mock::CountingSink;
    use crate::timer::mock::MockTimer;
    use std::sync::atomic::Ordering;

    type TestEngine = CdsEngine<MockRadio, MockTimer, CountingSink, crate::radio::mock::MockRadioError>;

    fn mac(b: u8) -> Mac {
        Mac::from_bytes([b, b, b, b, b, b])
    }

    fn make_engine() -> Arc<TestEngine> {
        CdsEngine::new(
            mac(0x01),
            MockRadio::new(),
            MockTimer::new(),
            CountingSink::new(),
            EngineConfig::default(),
        )
    }

    // S1: isolated node. After the boot discovery window elapses, the
    // node broadcasts an empty NEIGHBOR_SET and stays non-dominant.
    #[test]
    fn s1_isolated_node_exits_discovery_with_empty_neighbor_set() {
        let engine = make_engine();
        engine.timer.advance(60_000);

        let sent = engine.radio.sent_frames();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            Packet::decode(&sent[0]).unwrap(),
            Packet::NeighborSet {
                sender: mac(0x01),
                entries: vec![],
            }
        );
        assert!(!engine.is_dominant());
    }

    #[test]
    fn unknown_beacon_creates_record_and_stays_in_discovery_bounds() {
        let engine = make_engine();
        let other = mac(0x02);
        let frame = Packet::Beacon { sender: other, is_dominant: false }.encode();

        engine.on_beacon(&frame, -60);

        let inner = engine.inner.lock().unwrap();
        assert!(inner.table.contains(&other));
        assert_eq!(inner.beacon_min_ms, 5_000);
    }

    // S2: two-node clique. Once both the BEACON and the sender's
    // NEIGHBOR_SET arrive, this node's |V(B)| == 2, so it declares
    // itself dominant.
    #[test]
    fn s2_declares_dominant_after_two_node_clique_forms() {
        let _ = simplelog::SimpleLogger::init(log::LevelFilter::Debug, simplelog::Config::default());

        let engine = make_engine();
        let b = mac(0x02);

        engine.on_beacon(&Packet::Beacon { sender: b, is_dominant: false }.encode(), -60);
        engine.on_neighbor_set(&Packet::NeighborSet {
            sender: b,
            entries: vec![NeighborEntry { mac: mac(0x01), rssi_dbm: -60 }],
        }
        .encode());

        assert!(engine.is_dominant());
        assert_eq!(engine.sink.became_dominant.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn neighbor_set_from_unknown_sender_is_dropped() {
        let engine = make_engine();
        let stranger = mac(0x09);

        engine.on_neighbor_set(&Packet::NeighborSet { sender: stranger, entries: vec![] }.encode());

        assert!(!engine.inner.lock().unwrap().table.contains(&stranger));
        assert_eq!(engine.inner.lock().unwrap().dropped_unknown_sender, 1);
    }

    #[test]
    fn malformed_frame_counts_decode_error_and_does_not_panic() {
        let engine = make_engine();
        engine.on_beacon(&[200, 1, 2], -60);
        assert_eq!(engine.decode_error_count(), 1);
    }

    // P4: a silent neighbor is evicted by the next leaver sweep once
    // 120s have passed since its last beacon, and dropped from the
    // dominant set if it was dominant.
    #[test]
    fn leaver_sweep_evicts_stale_dominant_neighbor() {
        let _ = simplelog::SimpleLogger::init(log::LevelFilter::Debug, simplelog::Config::default());

        let engine = make_engine();
        let b = mac(0x02);

        engine.on_beacon(&Packet::Beacon { sender: b, is_dominant: true }.encode(), -60);
        // Exit discovery so the leaver timer is armed, then let a full
        // staleness window plus sweep period elapse with no more beacons.
        engine.timer.advance(60_000);
        engine.timer.advance(120_000);

        let inner = engine.inner.lock().unwrap();
        assert!(!inner.table.contains(&b));
        assert!(!inner.table.dominant_macs().contains(&b));
    }

    #[test]
    fn dominance_check_timer_is_never_armed_twice() {
        let engine = make_engine();
        engine.arm_dominance_check(60_000);
        let first = engine.inner.lock().unwrap().dominance_check.clone();
        engine.arm_dominance_check(60_000);
        let second = engine.inner.lock().unwrap().dominance_check.clone();
        assert_eq!(first.map(|h| h.id()), second.map(|h| h.id()));
    }
}
