//! Core domain entities for blood-request fulfillment.
//!
//! All entities are mutable rows identified by an integer surrogate key.
//! State transitions that carry invariants (`mark_fulfilled`, `withdraw`)
//! live here so no caller can produce an inconsistent row.

use crate::domain::value_objects::BloodSpec;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Surrogate key used by every persisted entity.
pub type EntityId = i64;

/// Lifecycle of a blood request.
///
/// ```text
/// [Pending] ──staff approval──→ [Successful] ──engine──→ fulfilled = true
///     │
///     └── staff rejection ──→ [Cancelled]
/// ```
///
/// Only `Successful` requests that are not yet fulfilled are eligible for
/// allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    /// Awaiting staff review.
    Pending,
    /// Approved; awaiting supply.
    Successful,
    /// Rejected or withdrawn.
    Cancelled,
}

/// Lifecycle of a donation request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DonationStatus {
    /// Offered, not yet reviewed.
    Pending,
    /// Confirmed by staff; a candidate for donor matching.
    Confirmed,
    /// Rejected or withdrawn.
    Cancelled,
    /// Donation physically completed; awaiting intake.
    Completed,
    /// Intake finished; units merged into inventory.
    Stocked,
}

/// State of a request/donation pairing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStatus {
    /// Proposed pairing awaiting the donation.
    Pending,
    /// The paired donation satisfied the request.
    Completed,
}

/// Why a match row was created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchKind {
    /// A confirmed donor was recruited toward an unmet request.
    Recruitment,
    /// A completed donation directly satisfied the request.
    Fulfillment,
}

/// Which path satisfied a fulfilled request, for audit purposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FulfillmentSource {
    /// Satisfied from on-hand inventory.
    Inventory,
    /// Satisfied by a completed donation.
    Donation,
}

impl std::fmt::Display for FulfillmentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inventory => write!(f, "Inventory"),
            Self::Donation => write!(f, "Donation"),
        }
    }
}

/// A request for blood units awaiting supply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BloodRequest {
    /// Surrogate key.
    pub id: EntityId,
    /// Requesting user, when the request was placed by an account.
    pub user_id: Option<EntityId>,
    /// Requested blood type.
    pub blood_type_id: EntityId,
    /// Requested blood component.
    pub blood_component_id: EntityId,
    /// Requested unit count. Always positive.
    pub quantity: u32,
    /// Free-text hierarchical location, `province_district_ward`.
    pub location: String,
    /// Staff-driven lifecycle state.
    pub status: RequestStatus,
    /// Emergency requests sort ahead of routine ones in the sweep.
    pub emergency: bool,
    /// Set exactly once, by the engine.
    pub fulfilled: bool,
    /// Which path satisfied the request. Present iff `fulfilled`.
    pub fulfilled_source: Option<FulfillmentSource>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl BloodRequest {
    /// The (type, component) pair this request must be supplied with.
    pub fn spec(&self) -> BloodSpec {
        BloodSpec {
            blood_type_id: self.blood_type_id,
            blood_component_id: self.blood_component_id,
        }
    }

    /// True when the request may be handed to the allocation engine.
    pub fn is_eligible(&self) -> bool {
        self.status == RequestStatus::Successful && !self.fulfilled
    }

    /// Marks the request fulfilled, recording the source.
    ///
    /// # Errors
    /// Returns an error if the request is already fulfilled.
    pub fn mark_fulfilled(&mut self, source: FulfillmentSource) -> Result<(), &'static str> {
        if self.fulfilled {
            return Err("Request already fulfilled");
        }
        self.fulfilled = true;
        self.fulfilled_source = Some(source);
        Ok(())
    }
}

/// A stocked quantity of one blood type/component at one location.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BloodInventory {
    /// Surrogate key.
    pub id: EntityId,
    /// Stocked blood type.
    pub blood_type_id: EntityId,
    /// Stocked blood component.
    pub blood_component_id: EntityId,
    /// Units on hand. Never negative.
    pub quantity: u32,
    /// Measurement unit, e.g. "mL".
    pub unit: String,
    /// Free-text storage location.
    pub location: String,
    /// Bumped on every quantity change; drives FIFO stock rotation.
    pub last_updated: DateTime<Utc>,
}

impl BloodInventory {
    /// The (type, component) pair stocked in this row.
    pub fn spec(&self) -> BloodSpec {
        BloodSpec {
            blood_type_id: self.blood_type_id,
            blood_component_id: self.blood_component_id,
        }
    }

    /// True when the row can supply `quantity` units.
    pub fn can_supply(&self, quantity: u32) -> bool {
        self.quantity >= quantity
    }

    /// Removes `quantity` units and bumps `last_updated`.
    ///
    /// # Errors
    /// Returns an error if the row holds fewer than `quantity` units.
    pub fn withdraw(&mut self, quantity: u32, now: DateTime<Utc>) -> Result<(), &'static str> {
        if quantity > self.quantity {
            return Err("Withdrawal exceeds stock on hand");
        }
        self.quantity -= quantity;
        self.last_updated = now;
        Ok(())
    }

    /// Adds `quantity` units and bumps `last_updated`.
    pub fn deposit(&mut self, quantity: u32, now: DateTime<Utc>) {
        self.quantity += quantity;
        self.last_updated = now;
    }
}

/// An offer to donate blood.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DonationRequest {
    /// Surrogate key.
    pub id: EntityId,
    /// Donating user, when known.
    pub user_id: Option<EntityId>,
    /// Offered blood type.
    pub blood_type_id: EntityId,
    /// Offered blood component.
    pub blood_component_id: EntityId,
    /// Offered unit count.
    pub quantity: u32,
    /// Staff-driven lifecycle state.
    pub status: DonationStatus,
}

impl DonationRequest {
    /// The (type, component) pair this donation provides.
    pub fn spec(&self) -> BloodSpec {
        BloodSpec {
            blood_type_id: self.blood_type_id,
            blood_component_id: self.blood_component_id,
        }
    }

    /// True when the donation may be matched to a request.
    pub fn is_match_candidate(&self) -> bool {
        self.status == DonationStatus::Confirmed
    }
}

/// A proposed or completed pairing between a request and a donation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestMatch {
    /// Surrogate key. Assigned by the store on insert.
    pub id: EntityId,
    /// The request side of the pairing.
    pub blood_request_id: EntityId,
    /// The donation side of the pairing.
    pub donation_request_id: EntityId,
    /// Pairing state.
    pub status: MatchStatus,
    /// When the donor is expected.
    pub scheduled_date: DateTime<Utc>,
    /// Staff-facing description of the pairing.
    pub notes: String,
    /// Why this row exists.
    pub kind: MatchKind,
}

/// Ledger entry recording one allocation of inventory to a request.
///
/// Audit trail only; the guard against re-allocation is
/// [`BloodRequest::fulfilled`], never this table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AllocationRecord {
    /// Surrogate key. Assigned by the store on insert.
    pub id: EntityId,
    /// The fulfilled request.
    pub blood_request_id: EntityId,
    /// The inventory row the units came from.
    pub inventory_id: EntityId,
    /// Units allocated.
    pub quantity: u32,
    /// When the allocation committed.
    pub allocated_at: DateTime<Utc>,
    /// Staff member who triggered the allocation, when not the sweep.
    pub allocated_by: Option<EntityId>,
}

/// Read state of a user-facing notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationStatus {
    /// Delivered, not yet seen.
    Unread,
    /// Seen by the user.
    Read,
}

/// What a notification is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    /// The user's blood request was fulfilled.
    RequestFulfilled,
    /// Donors were matched to the user's blood request.
    DonorsMatched,
}

/// A user-facing message. Written by the engine, never read back.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Surrogate key. Assigned by the sink on delivery.
    pub id: EntityId,
    /// Recipient.
    pub user_id: EntityId,
    /// Human-readable message body.
    pub message: String,
    /// Message category.
    pub kind: NotificationKind,
    /// Read state.
    pub status: NotificationStatus,
    /// When the engine emitted the message.
    pub sent_at: DateTime<Utc>,
}
