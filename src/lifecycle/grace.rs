//! Process-wide shutdown grace period.
//!
//! Read when a shutdown sequence begins. Changing it while a shutdown is in
//! flight has no defined effect on that shutdown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Default time allowed for a graceful shutdown.
pub const DEFAULT_SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);

static GRACE_PERIOD_NANOS: AtomicU64 = AtomicU64::new(10_000_000_000);

/// Current grace period.
pub fn shutdown_grace_period() -> Duration {
    Duration::from_nanos(GRACE_PERIOD_NANOS.load(Ordering::Relaxed))
}

/// Set the grace period used by subsequent shutdown sequences.
///
/// Values beyond ~584 years saturate.
pub fn set_shutdown_grace_period(period: Duration) {
    let nanos = u64::try_from(period.as_nanos()).unwrap_or(u64::MAX);
    GRACE_PERIOD_NANOS.store(nanos, Ordering::Relaxed);
}
