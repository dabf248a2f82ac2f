pub mod dedup;
pub mod limiter;
pub mod registry;
pub mod triggers;

use std::time::Duration;

/// Limiter parameters resolved from a space's settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorParams {
    pub regeneration: Duration,
    pub burst:        u32,
}
