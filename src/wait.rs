//! Poll a predicate until it holds or time runs out

use std::future::Future;
use std::panic::Location;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;

use crate::common::{Error, Result};

/// Interval the engine polls at unless told otherwise
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Resolve once `predicate` returns true, or fail after `max`
///
/// The timeout error names the source location of the call, not of this
/// function.
#[track_caller]
pub fn wait_for<F>(predicate: F, max: Duration) -> impl Future<Output = Result<()>>
where
    F: FnMut() -> bool,
{
    wait_for_with_interval(predicate, max, DEFAULT_POLL_INTERVAL)
}

#[track_caller]
pub fn wait_for_with_interval<F>(
    mut predicate: F,
    max: Duration,
    interval: Duration,
) -> impl Future<Output = Result<()>>
where
    F: FnMut() -> bool,
{
    let location = Location::caller();
    async move {
        let start = Instant::now();
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if predicate() {
                return Ok(());
            }
            if start.elapsed() >= max {
                return Err(Error::wait_timeout(max, location));
            }
        }
    }
}
