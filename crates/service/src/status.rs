use std::env;
use std::time::Instant;

use ipc::{MetricsSnapshot, StatusInfo};

/// Build a `StatusInfo` from the loaded tables and process uptime.
pub fn make_status(
    entities: usize,
    relations: usize,
    dimension: usize,
    started: Instant,
    metrics: Option<MetricsSnapshot>,
) -> StatusInfo {
    StatusInfo {
        entities: entities as u64,
        relations: relations as u64,
        dimension: u32::try_from(dimension).unwrap_or(u32::MAX),
        uptime_secs: started.elapsed().as_secs(),
        metrics,
    }
}

/// Label stamped on responses so callers can tell instances apart.
pub fn host_label() -> String {
    env::var("EMBSERVE_INSTANCE")
        .or_else(|_| env::var("HOSTNAME"))
        .unwrap_or_else(|_| "embserve".into())
}
