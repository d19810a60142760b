/// Scheduler cadence and thresholds (spec §4.K / §5).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    /// How often the maintenance sweep runs.
    pub tick_interval_secs: u64,
    /// Leases older than this are reclaimed (spec §5 default: 30 min).
    pub stale_threshold_secs: i64,
    /// `pool_utilization` denominator for the metrics snapshot.
    pub pool_max_size: i64,
}

impl SchedulerConfig {
    pub fn sane_defaults() -> Self {
        Self {
            tick_interval_secs: 60,
            stale_threshold_secs: 30 * 60,
            pool_max_size: 300,
        }
    }
}
