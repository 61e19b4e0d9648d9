//! Demand accounting and the two single-holder leases.
//!
//! The ledger tracks how many events the downstream subscriber has asked
//! for and not yet received, plus two mutual-exclusion gates: `delivering`
//! (one drain task at a time) and `requesting` (one outstanding upstream
//! byte request at a time). It never touches the event queue.

/// Outstanding event demand plus the delivery and request gates.
#[derive(Debug, Default)]
pub(crate) struct DemandLedger {
    demand: u64,
    delivering: bool,
    requesting: bool,
}

impl DemandLedger {
    /// Grant `n` more events of demand. `n` must be at least one; zero
    /// requests are filtered out before reaching the ledger.
    pub(crate) fn add_demand(&mut self, n: u64) {
        debug_assert!(n >= 1, "demand grants must be positive");
        self.demand = self.demand.saturating_add(n);
    }

    /// Consume one unit of demand ahead of handing an event over.
    pub(crate) fn consume_demand(&mut self) {
        debug_assert!(self.demand > 0, "consumed demand that was never granted");
        self.demand -= 1;
    }

    #[must_use]
    pub(crate) fn demand(&self) -> u64 { self.demand }

    /// Claim the delivery lease. Returns `true` exactly once per
    /// idle-to-active transition.
    pub(crate) fn try_start_delivering(&mut self) -> bool {
        if self.delivering {
            false
        } else {
            self.delivering = true;
            true
        }
    }

    /// Return the delivery lease to idle.
    pub(crate) fn stop_delivering(&mut self) { self.delivering = false; }

    /// Claim the byte-request lease. Returns `true` exactly once per
    /// idle-to-active transition.
    pub(crate) fn try_start_requesting(&mut self) -> bool {
        if self.requesting {
            false
        } else {
            self.requesting = true;
            true
        }
    }

    /// Return the byte-request lease to idle. Safe to call when the lease
    /// is already idle.
    pub(crate) fn stop_requesting(&mut self) { self.requesting = false; }
}
