//! Outbound (driven) ports for the allocation engine.
//!
//! These traits define what the engine needs from the outside world: a
//! transactional store holding requests, donations, inventory, matches,
//! and the allocation ledger; a fire-and-forget notification sink; and a
//! time source abstracted for deterministic tests.

use crate::domain::entities::{
    AllocationRecord, BloodInventory, BloodRequest, DonationRequest, DonationStatus, EntityId,
    FulfillmentSource, Notification, RequestMatch,
};
use crate::domain::value_objects::BloodSpec;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors surfaced by the store ports.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Another transaction changed a row this transaction read. The
    /// caller must discard its work and retry against fresh state.
    #[error("write conflict on {entity} {id}")]
    Conflict {
        /// Table the conflicting row lives in.
        entity: &'static str,
        /// Conflicting row key.
        id: EntityId,
    },

    /// A row the caller referenced does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Table that was queried.
        entity: &'static str,
        /// Missing row key.
        id: EntityId,
    },

    /// A withdrawal would have driven an inventory row negative. The
    /// candidate filter makes this unreachable; hitting it is a defect,
    /// not an operational failure.
    #[error("inventory {id} would go negative ({available} on hand, {requested} requested)")]
    Underflow {
        /// Inventory row key.
        id: EntityId,
        /// Units on hand.
        available: u32,
        /// Units requested.
        requested: u32,
    },

    /// The store could not be reached or a session could not be opened.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// True when the same operation can be retried against fresh state.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Unavailable(_))
    }
}

/// Transactional store holding all fulfillment state.
///
/// Every engine operation opens one transaction, performs every read that
/// justifies its writes inside it, and commits. Implementations must
/// guarantee read-then-write atomicity (row locking or optimistic
/// version checks), so two concurrent allocations against one inventory
/// row can never both decrement.
pub trait FulfillmentStore: Send + Sync {
    /// Opens a transaction. Dropping the returned session without calling
    /// [`StoreTxn::commit`] rolls it back.
    fn begin(&self) -> Result<Box<dyn StoreTxn + '_>, StoreError>;
}

/// One transactional session against the store.
///
/// Reads record what was observed; [`StoreTxn::commit`] fails with
/// [`StoreError::Conflict`] when any observed row changed underneath the
/// transaction.
pub trait StoreTxn: Send {
    // ---- blood requests ----

    /// Loads a blood request by id.
    fn blood_request(&mut self, id: EntityId) -> Result<BloodRequest, StoreError>;

    /// Lists requests awaiting allocation, emergencies first, then oldest
    /// first. The ordering is part of the contract: the sweep processes
    /// items in exactly this order.
    fn eligible_requests(&mut self) -> Result<Vec<BloodRequest>, StoreError>;

    /// Same as [`StoreTxn::eligible_requests`], restricted to one spec.
    fn eligible_requests_for(&mut self, spec: BloodSpec) -> Result<Vec<BloodRequest>, StoreError>;

    /// Marks a request fulfilled, recording the source.
    fn mark_fulfilled(
        &mut self,
        id: EntityId,
        source: FulfillmentSource,
    ) -> Result<(), StoreError>;

    // ---- donation requests ----

    /// Loads a donation request by id.
    fn donation_request(&mut self, id: EntityId) -> Result<DonationRequest, StoreError>;

    /// Lists confirmed donations for one spec, in repository order.
    fn confirmed_donations(&mut self, spec: BloodSpec) -> Result<Vec<DonationRequest>, StoreError>;

    /// Lists donations that completed but have not been stocked yet.
    fn completed_donations(&mut self) -> Result<Vec<DonationRequest>, StoreError>;

    /// Moves a donation to a new lifecycle state.
    fn set_donation_status(
        &mut self,
        id: EntityId,
        status: DonationStatus,
    ) -> Result<(), StoreError>;

    // ---- inventory ----

    /// Lists inventory rows for one spec holding at least `min_quantity`
    /// units, in repository order.
    fn available_inventory(
        &mut self,
        spec: BloodSpec,
        min_quantity: u32,
    ) -> Result<Vec<BloodInventory>, StoreError>;

    /// Lists every inventory row for one spec, in repository order.
    fn inventory_for(&mut self, spec: BloodSpec) -> Result<Vec<BloodInventory>, StoreError>;

    /// Removes units from an inventory row and bumps its `last_updated`.
    fn withdraw_inventory(
        &mut self,
        id: EntityId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Adds units to an inventory row and bumps its `last_updated`.
    fn deposit_inventory(
        &mut self,
        id: EntityId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Inserts a new inventory row. The `id` on the input is ignored;
    /// the assigned key is returned.
    fn create_inventory(&mut self, row: BloodInventory) -> Result<EntityId, StoreError>;

    // ---- matches ----

    /// True when a pending match already pairs this request and donation.
    fn has_pending_match(
        &mut self,
        blood_request_id: EntityId,
        donation_request_id: EntityId,
    ) -> Result<bool, StoreError>;

    /// True when any match row references this donation.
    fn references_donation(&mut self, donation_request_id: EntityId) -> Result<bool, StoreError>;

    /// Inserts a match row. The `id` on the input is ignored; the
    /// assigned key is returned.
    fn insert_match(&mut self, row: RequestMatch) -> Result<EntityId, StoreError>;

    // ---- allocation ledger ----

    /// Inserts a ledger row. The `id` on the input is ignored; the
    /// assigned key is returned.
    fn insert_allocation(&mut self, row: AllocationRecord) -> Result<EntityId, StoreError>;

    /// Atomically applies every write of this session.
    ///
    /// # Errors
    /// [`StoreError::Conflict`] when a row observed by this session was
    /// changed by a concurrent commit; no write is applied in that case.
    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Fire-and-forget sink for user-facing notifications.
///
/// The engine delivers only after a successful commit and never reads
/// notifications back. Delivery failures are the sink's concern.
pub trait NotificationSink: Send + Sync {
    /// Hands one notification to the outbox.
    fn deliver(&self, notification: Notification);
}

/// Time source for consistent timestamp handling.
///
/// Abstracted to allow testing with deterministic time.
pub trait TimeSource: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Default system time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic time source for tests and simulations.
#[derive(Debug)]
pub struct ManualTimeSource {
    now: parking_lot::Mutex<DateTime<Utc>>,
}

impl ManualTimeSource {
    /// Creates a source frozen at `initial`.
    pub fn new(initial: DateTime<Utc>) -> Self {
        Self {
            now: parking_lot::Mutex::new(initial),
        }
    }

    /// Advances the clock.
    pub fn advance(&self, delta: chrono::Duration) {
        *self.now.lock() += delta;
    }

    /// Jumps the clock to an absolute instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock() = instant;
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
