//! Wall-clock access behind `mockable::Clock` so freshness and rate-limit
//! windows can be driven deterministically in tests.

use std::sync::Arc;

pub use mockable::{Clock, DefaultClock};

/// Clock handle shared between the limiter, the cache and the clients.
pub type SharedClock = Arc<dyn Clock + Send + Sync>;

/// The real system clock.
pub fn system_clock() -> SharedClock {
    Arc::new(DefaultClock)
}
