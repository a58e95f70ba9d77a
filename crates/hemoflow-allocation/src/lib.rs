//! # Blood-Request Fulfillment & Allocation Engine
//!
//! Decides, for every blood request awaiting supply, whether it can be
//! satisfied from on-hand inventory or must be matched against pending
//! donation requests, and reconciles that state continuously and
//! idempotently in the background.
//!
//! The same engine is reachable from two triggers: a direct call when staff
//! approve a request, and the periodic reconciliation sweep. Both run the
//! identical code path under the identical transactional contract, so
//! correctness holds regardless of interleaving.
//!
//! ## Domain Invariants
//!
//! | ID | Invariant | Enforcement Location |
//! |----|-----------|---------------------|
//! | INVARIANT-1 | Inventory quantity never goes negative | `domain/entities.rs` - `BloodInventory::withdraw()` |
//! | INVARIANT-2 | A fulfilled request always records its source | `domain/entities.rs` - `BloodRequest::mark_fulfilled()` |
//! | INVARIANT-3 | A request is allocated at most once | `engine.rs` - eligibility check inside the same transaction |
//! | INVARIANT-4 | No duplicate pending match per (request, donation) pair | `engine.rs` - existence check before insert |
//! | INVARIANT-5 | One item's failure never rolls back another item | `engine.rs` - one transaction per request/donation |
//!
//! ## Module Structure (Hexagonal Architecture)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      OUTER LAYER                                │
//! │  adapters/ - In-memory store and notification outbox            │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ implements ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      MIDDLE LAYER                               │
//! │  ports/inbound.rs  - FulfillmentApi trait                       │
//! │  ports/outbound.rs - FulfillmentStore, NotificationSink,        │
//! │                      TimeSource traits                          │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      INNER LAYER                                │
//! │  domain/entities.rs      - BloodRequest, BloodInventory, ...    │
//! │  domain/scoring.rs       - location scoring + stock selection   │
//! │  domain/value_objects.rs - BloodSpec, outcomes, SweepReport     │
//! │  engine.rs               - AllocationEngine                     │
//! │  scheduler.rs            - ReconciliationScheduler              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod adapters;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ports;
pub mod scheduler;

pub use config::AllocationConfig;
pub use domain::entities::{
    AllocationRecord, BloodInventory, BloodRequest, DonationRequest, DonationStatus,
    EntityId, FulfillmentSource, MatchKind, MatchStatus, Notification, NotificationKind,
    NotificationStatus, RequestMatch, RequestStatus,
};
pub use domain::scoring::{location_score, pick_best_stocked};
pub use domain::value_objects::{
    BloodSpec, FulfillmentOutcome, IntakeOutcome, SkipReason, SweepReport,
};
pub use engine::AllocationEngine;
pub use error::{AllocationError, Result};
pub use ports::inbound::FulfillmentApi;
pub use ports::outbound::{
    FulfillmentStore, ManualTimeSource, NotificationSink, StoreError, StoreTxn, SystemTimeSource,
    TimeSource,
};
pub use scheduler::ReconciliationScheduler;

/// Default seconds between reconciliation sweeps.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;

/// Default hours between a donor match being created and its scheduled visit.
pub const DEFAULT_MATCH_LEAD_TIME_HOURS: i64 = 24;

/// Default number of commit retries after an optimistic-concurrency conflict.
pub const DEFAULT_MAX_COMMIT_RETRIES: u32 = 2;

/// Location recorded on inventory rows created by donation intake.
pub const DEFAULT_STOCK_LOCATION: &str = "Default Location";

/// Unit recorded on inventory rows created by donation intake.
pub const DEFAULT_STOCK_UNIT: &str = "mL";
