//! Metrics for client map observability
//!
//! All instruments carry a `category` label (garden, seed, shoot, plant).

use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;

/// Global meter for client map metrics
static METER: Lazy<Meter> = Lazy::new(|| global::meter("garden-clientmap"));

/// Counter of `get_client` requests
///
/// Labels:
/// - `category`: garden, seed, shoot, plant
/// - `result`: hit, miss
pub static CLIENT_REQUESTS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("garden_clientmap_requests_total")
        .with_description("Total number of client set requests")
        .with_unit("{requests}")
        .build()
});

/// Counter of client set builds
///
/// Labels:
/// - `category`: garden, seed, shoot, plant
/// - `reason`: initial, rotation
/// - `result`: success, error
pub static CLIENT_SET_BUILDS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("garden_clientmap_builds_total")
        .with_description("Total number of client set builds")
        .with_unit("{builds}")
        .build()
});

/// Histogram of client set build duration
///
/// Labels:
/// - `category`: garden, seed, shoot, plant
pub static CLIENT_SET_BUILD_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("garden_clientmap_build_duration_seconds")
        .with_description("Duration of client set builds in seconds")
        .with_unit("s")
        .build()
});

/// Counter of client sets removed from the cache
///
/// Labels:
/// - `category`: garden, seed, shoot, plant
/// - `reason`: invalidated, idle
pub static CLIENT_SET_REMOVALS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("garden_clientmap_removals_total")
        .with_description("Total number of client sets removed from the cache")
        .with_unit("{client_sets}")
        .build()
});

/// Record a `get_client` request
pub fn record_request(category: &'static str, hit: bool) {
    CLIENT_REQUESTS.add(
        1,
        &[
            KeyValue::new("category", category),
            KeyValue::new("result", if hit { "hit" } else { "miss" }),
        ],
    );
}

/// Record a finished client set build
pub fn record_build(category: &'static str, reason: &'static str, success: bool, seconds: f64) {
    CLIENT_SET_BUILDS.add(
        1,
        &[
            KeyValue::new("category", category),
            KeyValue::new("reason", reason),
            KeyValue::new("result", if success { "success" } else { "error" }),
        ],
    );
    CLIENT_SET_BUILD_DURATION.record(seconds, &[KeyValue::new("category", category)]);
}

/// Record client sets leaving the cache
pub fn record_removal(category: &'static str, reason: &'static str, count: u64) {
    if count == 0 {
        return;
    }
    CLIENT_SET_REMOVALS.add(
        count,
        &[
            KeyValue::new("category", category),
            KeyValue::new("reason", reason),
        ],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    // Without a meter provider the global meter is a no-op; recording must
    // still be safe from any call site.
    #[test]
    fn recording_without_provider_is_noop() {
        record_request("shoot", true);
        record_request("shoot", false);
        record_build("seed", "initial", true, 0.25);
        record_build("seed", "rotation", false, 1.5);
        record_removal("plant", "idle", 0);
        record_removal("plant", "invalidated", 2);
    }
}
