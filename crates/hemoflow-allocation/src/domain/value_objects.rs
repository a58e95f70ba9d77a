//! Value objects returned by the fulfillment API.

use crate::domain::entities::EntityId;
use serde::{Deserialize, Serialize};

/// The (blood type, blood component) pair that keys compatibility.
///
/// Requests, donations, and inventory rows are only ever matched within
/// one spec; the engine never substitutes across types or components.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BloodSpec {
    /// Blood type key.
    pub blood_type_id: EntityId,
    /// Blood component key.
    pub blood_component_id: EntityId,
}

impl BloodSpec {
    /// Creates a spec from its two keys.
    pub fn new(blood_type_id: EntityId, blood_component_id: EntityId) -> Self {
        Self {
            blood_type_id,
            blood_component_id,
        }
    }
}

/// Result of one fulfillment attempt for one blood request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FulfillmentOutcome {
    /// The request was satisfied from an inventory row.
    FromInventory {
        /// Winning inventory row.
        inventory_id: EntityId,
        /// Units withdrawn.
        quantity: u32,
    },
    /// No inventory could supply the request; confirmed donors were
    /// recruited instead. The request stays unfulfilled until a matched
    /// donation completes.
    DonorsMatched {
        /// Matches created by this attempt. Zero on a re-run that found
        /// every candidate already matched.
        new_matches: u32,
        /// Confirmed donations considered.
        candidates: u32,
    },
    /// Neither inventory nor confirmed donors were available.
    NoMatch,
    /// The request was not in an allocatable state. Benign: this is how a
    /// double trigger (direct call racing the sweep) resolves.
    NotEligible,
}

/// Result of processing one completed donation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// The donation's units were merged into inventory.
    Stocked {
        /// Inventory row the units landed in.
        inventory_id: EntityId,
        /// Units stocked.
        stocked: u32,
        /// Requests fulfilled from the fresh units.
        requests_fulfilled: u32,
        /// Units left on the row after opportunistic fulfillment.
        remaining: u32,
    },
    /// The donation was not processed.
    Skipped(SkipReason),
}

/// Why donation intake declined to process a donation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The donation has not reached the completed state.
    NotCompleted,
    /// A match row already references this donation.
    AlreadyMatched,
    /// Inventory already exists for the donation's spec. Deliberately
    /// coarse: pre-existing unrelated stock of the same spec also trips
    /// this guard.
    InventoryPresent,
}

/// Tally of one reconciliation sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Eligible requests examined.
    pub requests_examined: usize,
    /// Requests satisfied from inventory.
    pub fulfilled_from_inventory: usize,
    /// Donor matches created across all requests.
    pub donor_matches_created: usize,
    /// Requests with neither inventory nor donors.
    pub requests_unmatched: usize,
    /// Completed donations merged into inventory.
    pub donations_stocked: usize,
    /// Requests fulfilled opportunistically during intake.
    pub fulfilled_by_intake: usize,
    /// Items whose transaction failed and rolled back.
    pub failures: usize,
}

impl SweepReport {
    /// True when the sweep changed nothing and hit no failures.
    pub fn is_quiet(&self) -> bool {
        self.fulfilled_from_inventory == 0
            && self.donor_matches_created == 0
            && self.donations_stocked == 0
            && self.fulfilled_by_intake == 0
            && self.failures == 0
    }
}
