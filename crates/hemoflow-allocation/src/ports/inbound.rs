//! # Inbound Port - FulfillmentApi
//!
//! Primary driving port exposing the fulfillment engine.
//!
//! Two callers share this single entry point: the HTTP layer invokes
//! [`FulfillmentApi::fulfill_request`] directly when staff approve a
//! request, and the reconciliation scheduler invokes
//! [`FulfillmentApi::run_sweep`] on its interval. Both paths run the same
//! code under the same transactional contract, so a race between them
//! resolves as one winner and one benign no-op.

use crate::domain::entities::EntityId;
use crate::domain::value_objects::{FulfillmentOutcome, IntakeOutcome, SweepReport};
use crate::error::Result;

/// Primary API for blood-request fulfillment.
pub trait FulfillmentApi: Send + Sync {
    /// Attempts to satisfy one blood request.
    ///
    /// Tries on-hand inventory first (best location score, oldest stock on
    /// ties); falls back to recruiting confirmed donors. Safe to call
    /// repeatedly: a request that is not `Successful`-and-unfulfilled
    /// resolves to [`FulfillmentOutcome::NotEligible`] without writes.
    ///
    /// # Errors
    /// Transient store failures after the retry allowance is exhausted, or a
    /// defect such as an inventory underflow. Either way the request's
    /// state is untouched and the next sweep retries it.
    fn fulfill_request(&self, request_id: EntityId) -> Result<FulfillmentOutcome>;

    /// Converts one completed donation into inventory stock and
    /// opportunistically fulfills pending requests of the same spec,
    /// strictly in order, first-fit.
    ///
    /// Idempotent via a deliberately coarse guard: the donation is skipped
    /// when any match row already references it or any inventory for its
    /// spec already exists.
    ///
    /// # Errors
    /// Transient store failures; the donation stays `Completed` and the
    /// next sweep retries it.
    fn process_completed_donation(&self, donation_id: EntityId) -> Result<IntakeOutcome>;

    /// Runs one reconciliation pass: every eligible request through
    /// [`FulfillmentApi::fulfill_request`], then every completed donation
    /// through [`FulfillmentApi::process_completed_donation`], each item
    /// in its own transaction. A failing item is logged and skipped; the
    /// sweep always completes.
    fn run_sweep(&self) -> SweepReport;
}
