/// Timing constants governing the engine's discovery window, beacon
/// cadence, leaver sweep, and dominance-check coalescing window. All
/// fields are in milliseconds; `Default` matches the values given in the
/// specification (seconds, converted here).
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Duration of the initial discovery window entered at boot.
    pub discovery_boot_ms: u64,

    /// Bounds (inclusive lower, exclusive upper) of the randomized delay
    /// before re-entering discovery when an unknown MAC appears outside
    /// discovery.
    pub discovery_reentry_min_ms: u64,
    pub discovery_reentry_max_ms: u64,

    /// Beacon interval bounds while in discovery.
    pub discovery_beacon_min_ms: u64,
    pub discovery_beacon_max_ms: u64,

    /// Beacon interval bounds once discovery has been exited.
    pub steady_beacon_min_ms: u64,
    pub steady_beacon_max_ms: u64,

    /// Leaver sweep period, and the staleness threshold past which a
    /// neighbor with no beacons is considered gone.
    pub leaver_period_ms: u64,
    pub leaver_staleness_ms: u64,

    /// Delay before running a coalesced dominance check after a leaver
    /// removal or a batch of UPD_NEIGHBOR_SET updates.
    pub dominance_check_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            discovery_boot_ms: 60_000,

            discovery_reentry_min_ms: 30_000,
            discovery_reentry_max_ms: 40_000,

            discovery_beacon_min_ms: 5_000,
            discovery_beacon_max_ms: 15_000,

            steady_beacon_min_ms: 40_000,
            steady_beacon_max_ms: 60_000,

            leaver_period_ms: 120_000,
            leaver_staleness_ms: 120_000,

            dominance_check_delay_ms: 60_000,
        }
    }
}
