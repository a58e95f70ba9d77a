//! The allocation engine: one code path for both triggers.
//!
//! Staff approval calls [`AllocationEngine::fulfill_request`] directly;
//! the reconciliation scheduler calls [`AllocationEngine::run_sweep`].
//! Every item runs in its own store transaction that performs the reads
//! justifying its writes, so concurrent invocations are serialized by the
//! store's conflict detection and can never double-allocate.

use crate::config::AllocationConfig;
use crate::domain::entities::{
    AllocationRecord, BloodInventory, BloodRequest, DonationStatus, EntityId, FulfillmentSource,
    MatchKind, MatchStatus, Notification, NotificationKind, NotificationStatus, RequestMatch,
};
use crate::domain::scoring::pick_best_stocked;
use crate::domain::value_objects::{FulfillmentOutcome, IntakeOutcome, SkipReason, SweepReport};
use crate::error::{AllocationError, Result};
use crate::ports::inbound::FulfillmentApi;
use crate::ports::outbound::{FulfillmentStore, NotificationSink, StoreTxn, TimeSource};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Fulfillment and allocation engine.
///
/// Owns handles to its collaborators; holds no mutable state of its own,
/// so one instance can be shared freely between the scheduler task and
/// direct callers.
pub struct AllocationEngine {
    store: Arc<dyn FulfillmentStore>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn TimeSource>,
    config: AllocationConfig,
}

impl AllocationEngine {
    /// Creates an engine over the given collaborators.
    pub fn new(
        store: Arc<dyn FulfillmentStore>,
        notifier: Arc<dyn NotificationSink>,
        clock: Arc<dyn TimeSource>,
        config: AllocationConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            config,
        }
    }

    /// The engine's configuration.
    pub fn config(&self) -> &AllocationConfig {
        &self.config
    }

    /// One fulfillment attempt in one transaction. Returns the outcome
    /// and the notifications to deliver once the commit has succeeded.
    fn try_fulfill(
        &self,
        request_id: EntityId,
    ) -> Result<(FulfillmentOutcome, Vec<Notification>)> {
        let now = self.clock.now();
        let mut txn = self.store.begin()?;

        let request = txn.blood_request(request_id)?;
        if !request.is_eligible() {
            debug!(request_id, "request not awaiting allocation, skipping");
            return Ok((FulfillmentOutcome::NotEligible, Vec::new()));
        }

        let candidates = txn.available_inventory(request.spec(), request.quantity)?;
        let Some(best) = pick_best_stocked(&request.location, &candidates) else {
            return self.recruit_donors(txn, &request, now);
        };
        let inventory_id = best.id;

        txn.withdraw_inventory(inventory_id, request.quantity, now)?;
        txn.mark_fulfilled(request.id, FulfillmentSource::Inventory)?;
        txn.insert_allocation(AllocationRecord {
            id: 0,
            blood_request_id: request.id,
            inventory_id,
            quantity: request.quantity,
            allocated_at: now,
            allocated_by: None,
        })?;
        txn.commit()?;

        info!(
            request_id = request.id,
            inventory_id,
            quantity = request.quantity,
            "fulfilled blood request from inventory"
        );

        let mut notifications = Vec::new();
        if let Some(user_id) = request.user_id {
            notifications.push(self.notification(
                user_id,
                NotificationKind::RequestFulfilled,
                format!(
                    "Your blood request #{} has been fulfilled with {} unit(s) from available inventory.",
                    request.id, request.quantity
                ),
                now,
            ));
        }
        Ok((
            FulfillmentOutcome::FromInventory {
                inventory_id,
                quantity: request.quantity,
            },
            notifications,
        ))
    }

    /// Donor-matching fallback: pair the request with every confirmed
    /// donation of its spec that is not already pending against it.
    fn recruit_donors(
        &self,
        mut txn: Box<dyn StoreTxn + '_>,
        request: &BloodRequest,
        now: DateTime<Utc>,
    ) -> Result<(FulfillmentOutcome, Vec<Notification>)> {
        let candidates = txn.confirmed_donations(request.spec())?;
        if candidates.is_empty() {
            txn.commit()?;
            info!(
                request_id = request.id,
                "no matching inventory and no confirmed donors; request left awaiting supply"
            );
            return Ok((FulfillmentOutcome::NoMatch, Vec::new()));
        }

        let mut new_matches = 0u32;
        for donation in &candidates {
            if txn.has_pending_match(request.id, donation.id)? {
                continue;
            }
            txn.insert_match(RequestMatch {
                id: 0,
                blood_request_id: request.id,
                donation_request_id: donation.id,
                status: MatchStatus::Pending,
                scheduled_date: now + self.config.match_lead_time(),
                notes: format!(
                    "Donor recruited for blood request #{} awaiting {} unit(s)",
                    request.id, request.quantity
                ),
                kind: MatchKind::Recruitment,
            })?;
            new_matches += 1;
        }
        txn.commit()?;

        if new_matches > 0 {
            info!(
                request_id = request.id,
                new_matches,
                candidates = candidates.len(),
                "recruited confirmed donors for blood request"
            );
        } else {
            debug!(
                request_id = request.id,
                candidates = candidates.len(),
                "all confirmed donors already matched to this request"
            );
        }

        let mut notifications = Vec::new();
        if new_matches > 0 {
            if let Some(user_id) = request.user_id {
                notifications.push(self.notification(
                    user_id,
                    NotificationKind::DonorsMatched,
                    format!(
                        "{} compatible donor(s) have been matched to your blood request #{}. \
                         Our staff will contact you to schedule the donation.",
                        new_matches, request.id
                    ),
                    now,
                ));
            }
        }
        Ok((
            FulfillmentOutcome::DonorsMatched {
                new_matches,
                candidates: candidates.len() as u32,
            },
            notifications,
        ))
    }

    fn notification(
        &self,
        user_id: EntityId,
        kind: NotificationKind,
        message: String,
        now: DateTime<Utc>,
    ) -> Notification {
        Notification {
            id: 0,
            user_id,
            message,
            kind,
            status: NotificationStatus::Unread,
            sent_at: now,
        }
    }

    /// Lists eligible request ids in a short-lived read transaction.
    fn list_eligible_request_ids(&self) -> Result<Vec<EntityId>> {
        let mut txn = self.store.begin()?;
        let ids = txn
            .eligible_requests()?
            .into_iter()
            .map(|request| request.id)
            .collect();
        Ok(ids)
    }

    /// Lists completed donation ids in a short-lived read transaction.
    fn list_completed_donation_ids(&self) -> Result<Vec<EntityId>> {
        let mut txn = self.store.begin()?;
        let ids = txn
            .completed_donations()?
            .into_iter()
            .map(|donation| donation.id)
            .collect();
        Ok(ids)
    }
}

impl FulfillmentApi for AllocationEngine {
    fn fulfill_request(&self, request_id: EntityId) -> Result<FulfillmentOutcome> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.try_fulfill(request_id) {
                Ok((outcome, notifications)) => {
                    for notification in notifications {
                        self.notifier.deliver(notification);
                    }
                    return Ok(outcome);
                }
                Err(e) if e.is_defect() => {
                    error!(
                        request_id,
                        error = %e,
                        "invariant violation while allocating; failing this request only"
                    );
                    return Err(e);
                }
                Err(e) if e.is_transient() && attempts <= self.config.max_commit_retries => {
                    warn!(
                        request_id,
                        attempts,
                        error = %e,
                        "commit conflict, retrying against fresh state"
                    );
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        request_id,
                        attempts,
                        error = %e,
                        "retries exhausted; leaving request for the next sweep"
                    );
                    return Err(AllocationError::RetriesExhausted {
                        request_id,
                        attempts,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn process_completed_donation(&self, donation_id: EntityId) -> Result<IntakeOutcome> {
        let now = self.clock.now();
        let mut txn = self.store.begin()?;

        let donation = txn.donation_request(donation_id)?;
        if donation.status != DonationStatus::Completed {
            debug!(donation_id, status = ?donation.status, "donation not completed, skipping intake");
            return Ok(IntakeOutcome::Skipped(SkipReason::NotCompleted));
        }
        if txn.references_donation(donation.id)? {
            debug!(donation_id, "donation already referenced by a match, skipping intake");
            return Ok(IntakeOutcome::Skipped(SkipReason::AlreadyMatched));
        }
        let existing = txn.inventory_for(donation.spec())?;
        if !existing.is_empty() {
            // Coarse guard: unrelated stock of the same spec also lands here.
            debug!(
                donation_id,
                rows = existing.len(),
                "inventory already present for this spec, skipping intake"
            );
            return Ok(IntakeOutcome::Skipped(SkipReason::InventoryPresent));
        }

        // Locate or create the destination row; an occupied locate arm can
        // only mean a row landed after the guard read.
        let inventory_id = match existing.first() {
            Some(row) => {
                txn.deposit_inventory(row.id, donation.quantity, now)?;
                row.id
            }
            None => txn.create_inventory(BloodInventory {
                id: 0,
                blood_type_id: donation.blood_type_id,
                blood_component_id: donation.blood_component_id,
                quantity: donation.quantity,
                unit: self.config.default_stock_unit.clone(),
                location: self.config.default_stock_location.clone(),
                last_updated: now,
            })?,
        };

        // Opportunistic fulfillment: strictly in repository order, first
        // fit. A request too large for what remains is skipped in place,
        // never reordered.
        let mut remaining = donation.quantity;
        let mut requests_fulfilled = 0u32;
        let mut notifications = Vec::new();
        let pending = txn.eligible_requests_for(donation.spec())?;
        for request in &pending {
            if remaining < request.quantity {
                continue;
            }
            txn.withdraw_inventory(inventory_id, request.quantity, now)?;
            remaining -= request.quantity;
            txn.mark_fulfilled(request.id, FulfillmentSource::Donation)?;
            txn.insert_allocation(AllocationRecord {
                id: 0,
                blood_request_id: request.id,
                inventory_id,
                quantity: request.quantity,
                allocated_at: now,
                allocated_by: None,
            })?;
            txn.insert_match(RequestMatch {
                id: 0,
                blood_request_id: request.id,
                donation_request_id: donation.id,
                status: MatchStatus::Completed,
                scheduled_date: now,
                notes: format!("Fulfilled by completed donation #{}", donation.id),
                kind: MatchKind::Fulfillment,
            })?;
            if let Some(user_id) = request.user_id {
                notifications.push(self.notification(
                    user_id,
                    NotificationKind::RequestFulfilled,
                    format!(
                        "Your blood request #{} has been fulfilled with {} unit(s) from a completed donation.",
                        request.id, request.quantity
                    ),
                    now,
                ));
            }
            requests_fulfilled += 1;
        }

        txn.set_donation_status(donation.id, DonationStatus::Stocked)?;
        txn.commit()?;

        info!(
            donation_id,
            inventory_id,
            stocked = donation.quantity,
            requests_fulfilled,
            remaining,
            "stocked completed donation"
        );
        for notification in notifications {
            self.notifier.deliver(notification);
        }
        Ok(IntakeOutcome::Stocked {
            inventory_id,
            stocked: donation.quantity,
            requests_fulfilled,
            remaining,
        })
    }

    fn run_sweep(&self) -> SweepReport {
        let sweep_id = uuid::Uuid::new_v4();
        let mut report = SweepReport::default();

        let request_ids = match self.list_eligible_request_ids() {
            Ok(ids) => ids,
            Err(e) => {
                error!(%sweep_id, error = %e, "could not list eligible requests; skipping sweep");
                report.failures += 1;
                return report;
            }
        };
        report.requests_examined = request_ids.len();

        for request_id in request_ids {
            match self.fulfill_request(request_id) {
                Ok(FulfillmentOutcome::FromInventory { .. }) => {
                    report.fulfilled_from_inventory += 1;
                }
                Ok(FulfillmentOutcome::DonorsMatched { new_matches, .. }) => {
                    report.donor_matches_created += new_matches as usize;
                }
                Ok(FulfillmentOutcome::NoMatch) => report.requests_unmatched += 1,
                Ok(FulfillmentOutcome::NotEligible) => {}
                Err(e) => {
                    report.failures += 1;
                    warn!(
                        %sweep_id,
                        request_id,
                        error = %e,
                        "fulfillment failed; request untouched until the next sweep"
                    );
                }
            }
        }

        let donation_ids = match self.list_completed_donation_ids() {
            Ok(ids) => ids,
            Err(e) => {
                error!(%sweep_id, error = %e, "could not list completed donations");
                report.failures += 1;
                return report;
            }
        };

        for donation_id in donation_ids {
            match self.process_completed_donation(donation_id) {
                Ok(IntakeOutcome::Stocked {
                    requests_fulfilled, ..
                }) => {
                    report.donations_stocked += 1;
                    report.fulfilled_by_intake += requests_fulfilled as usize;
                }
                Ok(IntakeOutcome::Skipped(reason)) => {
                    debug!(%sweep_id, donation_id, ?reason, "donation intake skipped");
                }
                Err(e) => {
                    report.failures += 1;
                    warn!(
                        %sweep_id,
                        donation_id,
                        error = %e,
                        "donation intake failed; donation untouched until the next sweep"
                    );
                }
            }
        }

        info!(
            %sweep_id,
            requests_examined = report.requests_examined,
            fulfilled_from_inventory = report.fulfilled_from_inventory,
            donor_matches_created = report.donor_matches_created,
            requests_unmatched = report.requests_unmatched,
            donations_stocked = report.donations_stocked,
            fulfilled_by_intake = report.fulfilled_by_intake,
            failures = report.failures,
            "reconciliation sweep complete"
        );
        report
    }
}
