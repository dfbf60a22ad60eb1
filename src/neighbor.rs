//! Neighbor table: one record per MAC the node has heard a BEACON from.

use std::collections::{HashMap, HashSet};

use crate::mac::Mac;

/// EWMA smoothing factor applied to received beacon RSSI. `s <- (1 -
/// ALPHA)*s + ALPHA*rssi`.
pub const RSSI_ALPHA: f32 = 0.30;

/// A neighbor's last-known state, as derived from its beacons and
/// neighbor-set broadcasts.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborRecord {
    /// Monotonic timestamp (ms) of the most recently received beacon.
    pub last_beacon_at: u64,

    /// `None` until this neighbor's own NEIGHBOR_SET / UPD_NEIGHBOR_SET
    /// has arrived. When present, always contains the neighbor's own MAC
    /// with RSSI 0 (I2), plus one entry per that neighbor's own
    /// neighbors.
    pub two_hop_view: Option<HashMap<Mac, i16>>,

    /// Mirrors the dominance flag most recently advertised in this
    /// neighbor's beacon.
    pub is_dominant: bool,

    /// EWMA(alpha=0.30) over received beacon RSSIs.
    pub smoothed_rssi: f32,
}

impl NeighborRecord {
    fn new(now_ms: u64, rssi_dbm: i16, is_dominant: bool) -> Self {
        Self {
            last_beacon_at: now_ms,
            two_hop_view: None,
            is_dominant,
            smoothed_rssi: rssi_dbm as f32,
        }
    }
}

/// Mapping from neighbor MAC to its record, plus the derived dominant-set
/// index kept in lockstep with each record's `is_dominant` flag (I1, I3).
#[derive(Debug, Default)]
pub struct NeighborTable {
    records: HashMap<Mac, NeighborRecord>,
    dominant: HashSet<Mac>,
}

impl NeighborTable {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            dominant: HashSet::new(),
        }
    }

    /// Create or refresh a neighbor record from a received beacon.
    ///
    /// On first sight, creates a record with `two_hop_view = None`. On a
    /// later beacon, refreshes the timestamp, dominance flag, and the
    /// smoothed RSSI (`s <- 0.7*s + 0.3*rssi`). Returns `true` if this
    /// MAC was previously unknown to the table.
    pub fn upsert_beacon(&mut self, mac: Mac, rssi_dbm: i16, is_dominant: bool, now_ms: u64) -> bool {
        let is_new = !self.records.contains_key(&mac);

        self.records
            .entry(mac)
            .and_modify(|r| {
                // Clock regressions are ignored: a beacon always moves the
                // timestamp forward, never backward.
                r.last_beacon_at = r.last_beacon_at.max(now_ms);
                r.is_dominant = is_dominant;
                r.smoothed_rssi = (1.0 - RSSI_ALPHA) * r.smoothed_rssi + RSSI_ALPHA * rssi_dbm as f32;
            })
            .or_insert_with(|| NeighborRecord::new(now_ms, rssi_dbm, is_dominant));

        self.sync_dominant_flag(mac, is_dominant);

        is_new
    }

    /// Assign a neighbor's advertised two-hop view. No-op if the neighbor
    /// is not already in the table (a BEACON must arrive first).
    pub fn set_two_hop(&mut self, mac: Mac, view: HashMap<Mac, i16>) {
        if let Some(record) = self.records.get_mut(&mac) {
            record.two_hop_view = Some(view);
        }
    }

    /// Remove every record whose last beacon is older than `staleness_ms`
    /// relative to `now_ms`. Uses a two-phase collect-then-remove (rather
    /// than mutating while iterating) to avoid undefined iteration
    /// semantics during the sweep.
    pub fn expire(&mut self, now_ms: u64, staleness_ms: u64) -> HashSet<Mac> {
        let expired: Vec<Mac> = self
            .records
            .iter()
            .filter(|(_, r)| r.last_beacon_at + staleness_ms < now_ms)
            .map(|(mac, _)| *mac)
            .collect();

        for mac in &expired {
            self.records.remove(mac);
            self.dominant.remove(mac);
        }

        expired.into_iter().collect()
    }

    pub fn snapshot(&self) -> impl Iterator<Item = (&Mac, &NeighborRecord)> {
        self.records.iter()
    }

    pub fn get(&self, mac: &Mac) -> Option<&NeighborRecord> {
        self.records.get(mac)
    }

    pub fn contains(&self, mac: &Mac) -> bool {
        self.records.contains_key(mac)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The set of MACs currently marked dominant (I1).
    pub fn dominant_macs(&self) -> &HashSet<Mac> {
        &self.dominant
    }

    fn sync_dominant_flag(&mut self, mac: Mac, is_dominant: bool) {
        if is_dominant {
            self.dominant.insert(mac);
        } else {
            self.dominant.remove(&mac);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn mac(b: u8) -> Mac {
        Mac::from_bytes([b, b, b, b, b, b])
    }

    #[test]
    fn upsert_creates_record_with_no_two_hop_view() {
        let mut table = NeighborTable::new();
        let is_new = table.upsert_beacon(mac(1), -60, false, 1000);
        assert!(is_new);
        let record = table.get(&mac(1)).unwrap();
        assert_eq!(record.last_beacon_at, 1000);
        assert!(record.two_hop_view.is_none());
        assert_eq!(record.smoothed_rssi, -60.0);
    }

    #[test]
    fn upsert_again_refreshes_and_reports_not_new() {
        let mut table = NeighborTable::new();
        table.upsert_beacon(mac(1), -60, false, 1000);
        let is_new = table.upsert_beacon(mac(1), -60, true, 2000);
        assert!(!is_new);
        let record = table.get(&mac(1)).unwrap();
        assert_eq!(record.last_beacon_at, 2000);
        assert!(record.is_dominant);
    }

    #[test]
    fn ewma_converges_to_constant_input_within_ten_updates() {
        // 0.7^10 * gap < 0.05 requires gap < ~1.77; start 1dB off target so
        // ten updates actually land within the asserted tolerance.
        let mut table = NeighborTable::new();
        table.upsert_beacon(mac(1), -79, false, 0);
        for i in 1..=10 {
            table.upsert_beacon(mac(1), -80, false, i);
        }
        let smoothed = table.get(&mac(1)).unwrap().smoothed_rssi;
        assert!((smoothed - -80.0).abs() < 0.05, "smoothed={}", smoothed);
    }

    #[test]
    fn dominant_set_mirrors_is_dominant_flags() {
        let mut table = NeighborTable::new();
        table.upsert_beacon(mac(1), -60, true, 0);
        table.upsert_beacon(mac(2), -60, false, 0);
        assert!(table.dominant_macs().contains(&mac(1)));
        assert!(!table.dominant_macs().contains(&mac(2)));

        table.upsert_beacon(mac(1), -60, false, 1);
        assert!(!table.dominant_macs().contains(&mac(1)));
    }

    #[test]
    fn expire_removes_stale_records_and_drops_from_dominant_set() {
        let mut table = NeighborTable::new();
        table.upsert_beacon(mac(1), -60, true, 0);
        table.upsert_beacon(mac(2), -60, false, 100);

        let removed = table.expire(120_001, 120_000);
        assert_eq!(removed, [mac(1)].into_iter().collect());
        assert!(!table.contains(&mac(1)));
        assert!(!table.dominant_macs().contains(&mac(1)));
        assert!(table.contains(&mac(2)));
    }

    #[test]
    fn clock_regression_is_ignored() {
        let mut table = NeighborTable::new();
        table.upsert_beacon(mac(1), -60, false, 5000);
        table.upsert_beacon(mac(1), -60, false, 1000);
        assert_eq!(table.get(&mac(1)).unwrap().last_beacon_at, 5000);
    }

    #[test]
    fn set_two_hop_is_dropped_for_unknown_sender() {
        let mut table = NeighborTable::new();
        table.set_two_hop(mac(9), HashMap::new());
        assert!(table.get(&mac(9)).is_none());
    }
}
