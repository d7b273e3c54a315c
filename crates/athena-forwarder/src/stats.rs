//! Per-core forwarding counters (spec.md §7: "Errors are reported via
//! user-visible counters (per-link and per-core: processed interests /
//! content objects / control / interest-returns, dropped reasons,
//! fragmentation stats)").

use athena_common::InterestReturnReason;

/// Counters for one forwarding engine's lifetime.
#[derive(Debug, Default, Clone)]
pub struct CoreStats {
    pub interests_processed: u64,
    pub content_objects_processed: u64,
    pub control_processed: u64,
    pub interest_returns_received: u64,

    pub content_store_hits: u64,
    pub content_store_misses: u64,
    pub pit_aggregated: u64,
    pub pit_forwarded: u64,

    pub dropped_no_route: u64,
    pub dropped_hop_limit: u64,
    pub dropped_unsolicited_content_object: u64,
    pub dropped_pit_resource_exhausted: u64,
    pub dropped_decode_error: u64,
}

impl CoreStats {
    pub fn new() -> Self {
        CoreStats::default()
    }

    pub fn record_interest_return_reason(&mut self, reason: InterestReturnReason) {
        match reason {
            InterestReturnReason::NoRoute => self.dropped_no_route += 1,
            InterestReturnReason::HopLimitExceeded => self.dropped_hop_limit += 1,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let stats = CoreStats::new();
        assert_eq!(stats.interests_processed, 0);
        assert_eq!(stats.dropped_no_route, 0);
    }

    #[test]
    fn record_interest_return_reason_buckets_correctly() {
        let mut stats = CoreStats::new();
        stats.record_interest_return_reason(InterestReturnReason::NoRoute);
        stats.record_interest_return_reason(InterestReturnReason::HopLimitExceeded);
        assert_eq!(stats.dropped_no_route, 1);
        assert_eq!(stats.dropped_hop_limit, 1);
    }
}
