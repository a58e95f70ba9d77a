//! # Integration Test: Allocation Flows
//!
//! Drives the allocation engine end to end over the in-memory adapters:
//! inventory allocation, donor recruitment, donation intake, idempotent
//! re-sweeps, and the concurrent-allocation race.

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};

    use chrono::{TimeZone, Utc};

    use hemoflow_allocation::adapters::{InMemoryNotificationOutbox, InMemoryStore};
    use hemoflow_allocation::{
        location_score, AllocationConfig, AllocationEngine, BloodInventory, BloodRequest,
        DonationRequest, DonationStatus, FulfillmentApi, FulfillmentOutcome, FulfillmentSource,
        FulfillmentStore, IntakeOutcome, ManualTimeSource, MatchStatus, NotificationKind,
        RequestStatus, SkipReason, StoreTxn,
    };

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn create_test_engine() -> (
        Arc<InMemoryStore>,
        Arc<InMemoryNotificationOutbox>,
        Arc<AllocationEngine>,
    ) {
        let store = Arc::new(InMemoryStore::new());
        let outbox = Arc::new(InMemoryNotificationOutbox::new());
        let clock = Arc::new(ManualTimeSource::new(
            Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap(),
        ));
        let engine = Arc::new(AllocationEngine::new(
            store.clone(),
            outbox.clone(),
            clock,
            AllocationConfig::for_testing(),
        ));
        (store, outbox, engine)
    }

    fn create_test_request(quantity: u32, location: &str) -> BloodRequest {
        BloodRequest {
            id: 0,
            user_id: Some(11),
            blood_type_id: 1,
            blood_component_id: 1,
            quantity,
            location: location.to_string(),
            status: RequestStatus::Successful,
            emergency: false,
            fulfilled: false,
            fulfilled_source: None,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        }
    }

    fn create_test_inventory(quantity: u32, location: &str, updated_day: u32) -> BloodInventory {
        BloodInventory {
            id: 0,
            blood_type_id: 1,
            blood_component_id: 1,
            quantity,
            unit: "mL".to_string(),
            location: location.to_string(),
            last_updated: Utc.with_ymd_and_hms(2024, 4, updated_day, 0, 0, 0).unwrap(),
        }
    }

    fn create_test_donation(quantity: u32, status: DonationStatus) -> DonationRequest {
        DonationRequest {
            id: 0,
            user_id: Some(21),
            blood_type_id: 1,
            blood_component_id: 1,
            quantity,
            status,
        }
    }

    // =============================================================================
    // LOCATION SCORING REFERENCE VECTORS
    // =============================================================================

    #[test]
    fn test_scoring_reference_vectors() {
        assert_eq!(location_score("hanoi_dongda_", "123 Dong Da, Hanoi"), 2);
        assert_eq!(location_score("", "123 Dong Da, Hanoi"), 0);
        assert_eq!(location_score("", ""), 0);
    }

    // =============================================================================
    // INVENTORY ALLOCATION
    // =============================================================================

    #[test]
    fn test_allocation_decrements_exactly_and_never_negative() {
        let (store, _outbox, engine) = create_test_engine();
        let request_id = store.seed_request(create_test_request(4, ""));
        let inventory_id = store.seed_inventory(create_test_inventory(4, "depot", 1));

        let outcome = engine.fulfill_request(request_id).unwrap();

        assert_eq!(
            outcome,
            FulfillmentOutcome::FromInventory {
                inventory_id,
                quantity: 4
            }
        );
        // quantity_after = quantity_before - request.quantity, down to zero.
        assert_eq!(store.inventory(inventory_id).unwrap().quantity, 0);
        let ledger = store.allocations();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].quantity, 4);
        assert_eq!(ledger[0].inventory_id, inventory_id);
        assert_eq!(ledger[0].blood_request_id, request_id);
    }

    #[test]
    fn test_tie_break_selects_earlier_last_updated() {
        let (store, _outbox, engine) = create_test_engine();
        let request_id = store.seed_request(create_test_request(2, "hanoi_dongda_"));
        let newer = store.seed_inventory(create_test_inventory(5, "Hanoi east", 20));
        let older = store.seed_inventory(create_test_inventory(5, "Hanoi west", 5));

        let outcome = engine.fulfill_request(request_id).unwrap();

        assert_eq!(
            outcome,
            FulfillmentOutcome::FromInventory {
                inventory_id: older,
                quantity: 2
            }
        );
        assert_eq!(store.inventory(newer).unwrap().quantity, 5);
    }

    #[test]
    fn test_undersized_rows_are_not_split() {
        let (store, _outbox, engine) = create_test_engine();
        let request_id = store.seed_request(create_test_request(9, ""));
        store.seed_inventory(create_test_inventory(5, "A", 1));
        store.seed_inventory(create_test_inventory(5, "B", 2));

        let outcome = engine.fulfill_request(request_id).unwrap();

        assert_eq!(outcome, FulfillmentOutcome::NoMatch);
        assert_eq!(store.inventory_rows().iter().map(|r| r.quantity).sum::<u32>(), 10);
    }

    // =============================================================================
    // DONOR MATCHING AND IDEMPOTENT SWEEPS
    // =============================================================================

    #[test]
    fn test_sweep_twice_adds_nothing_new() {
        let (store, outbox, engine) = create_test_engine();
        store.seed_request(create_test_request(4, "hanoi_dongda_"));
        store.seed_request(create_test_request(6, ""));
        store.seed_inventory(create_test_inventory(5, "Dong Da, Hanoi", 1));
        store.seed_donation(create_test_donation(6, DonationStatus::Confirmed));

        let first = engine.run_sweep();
        assert_eq!(first.fulfilled_from_inventory, 1);
        assert_eq!(first.donor_matches_created, 1);
        assert_eq!(first.failures, 0);

        let matches = store.matches().len();
        let allocations = store.allocations().len();
        let notifications = outbox.len();

        let second = engine.run_sweep();

        assert!(second.is_quiet());
        assert_eq!(store.matches().len(), matches);
        assert_eq!(store.allocations().len(), allocations);
        assert_eq!(outbox.len(), notifications);
    }

    #[test]
    fn test_no_inventory_no_donor_leaves_no_trace() {
        let (store, outbox, engine) = create_test_engine();
        let request_id = store.seed_request(create_test_request(4, "hanoi_dongda_"));

        let outcome = engine.fulfill_request(request_id).unwrap();

        assert_eq!(outcome, FulfillmentOutcome::NoMatch);
        let request = store.request(request_id).unwrap();
        assert!(!request.fulfilled);
        assert_eq!(request.status, RequestStatus::Successful);
        assert!(store.matches().is_empty());
        assert!(store.allocations().is_empty());
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_unmatched_donation_completion_fulfills_waiting_request() {
        let (store, outbox, engine) = create_test_engine();
        let request_id = store.seed_request(create_test_request(6, ""));
        let donation_id = store.seed_donation(create_test_donation(8, DonationStatus::Completed));

        let outcome = engine.process_completed_donation(donation_id).unwrap();

        match outcome {
            IntakeOutcome::Stocked {
                requests_fulfilled, ..
            } => assert_eq!(requests_fulfilled, 1),
            other => panic!("expected Stocked, got {:?}", other),
        }
        let request = store.request(request_id).unwrap();
        assert!(request.fulfilled);
        assert_eq!(request.fulfilled_source, Some(FulfillmentSource::Donation));
        assert!(store
            .matches()
            .iter()
            .any(|m| m.status == MatchStatus::Completed));
        assert!(outbox
            .delivered()
            .iter()
            .any(|n| n.kind == NotificationKind::RequestFulfilled));
    }

    #[test]
    fn test_recruited_donation_completion_trips_the_match_guard() {
        let (store, _outbox, engine) = create_test_engine();
        let request_id = store.seed_request(create_test_request(6, ""));
        let donation_id = store.seed_donation(create_test_donation(6, DonationStatus::Confirmed));

        // First sweep recruits the donor.
        let recruit = engine.run_sweep();
        assert_eq!(recruit.donor_matches_created, 1);

        // Staff complete the donation out of band; the pending recruitment
        // row now references it, so the coarse guard skips intake and the
        // request stays open.
        let mut txn = store.begin().unwrap();
        txn.set_donation_status(donation_id, DonationStatus::Completed)
            .unwrap();
        txn.commit().unwrap();

        let outcome = engine.process_completed_donation(donation_id).unwrap();

        assert_eq!(outcome, IntakeOutcome::Skipped(SkipReason::AlreadyMatched));
        assert!(!store.request(request_id).unwrap().fulfilled);
        assert!(store
            .matches()
            .iter()
            .all(|m| m.status == MatchStatus::Pending));
    }

    // =============================================================================
    // DONATION INTAKE
    // =============================================================================

    #[test]
    fn test_intake_first_fit_skips_oversized_middle_request() {
        let (store, _outbox, engine) = create_test_engine();
        let first = store.seed_request(create_test_request(7, ""));
        let middle = store.seed_request(create_test_request(5, ""));
        let last = store.seed_request(create_test_request(2, ""));
        let donation_id = store.seed_donation(create_test_donation(10, DonationStatus::Completed));

        let outcome = engine.process_completed_donation(donation_id).unwrap();

        // 10 - 7 = 3; 5 does not fit and is skipped in place; 2 fits.
        match outcome {
            IntakeOutcome::Stocked {
                requests_fulfilled,
                remaining,
                stocked,
                ..
            } => {
                assert_eq!(stocked, 10);
                assert_eq!(requests_fulfilled, 2);
                assert_eq!(remaining, 1);
            }
            other => panic!("expected Stocked, got {:?}", other),
        }
        assert!(store.request(first).unwrap().fulfilled);
        assert!(!store.request(middle).unwrap().fulfilled);
        assert!(store.request(last).unwrap().fulfilled);
    }

    #[test]
    fn test_intake_guard_skips_when_spec_already_stocked() {
        let (store, _outbox, engine) = create_test_engine();
        let inventory_id = store.seed_inventory(create_test_inventory(3, "existing", 1));
        let donation_id = store.seed_donation(create_test_donation(10, DonationStatus::Completed));

        let outcome = engine.process_completed_donation(donation_id).unwrap();

        assert!(matches!(outcome, IntakeOutcome::Skipped(_)));
        assert_eq!(store.inventory(inventory_id).unwrap().quantity, 3);
        assert_eq!(
            store.donation(donation_id).unwrap().status,
            DonationStatus::Completed
        );
    }

    // =============================================================================
    // CONCURRENT ALLOCATION
    // =============================================================================

    #[test]
    fn test_race_two_requests_one_row_fulfills_exactly_one() {
        let (store, _outbox, engine) = create_test_engine();
        // One row sufficient for either request, not both.
        let inventory_id = store.seed_inventory(create_test_inventory(10, "depot", 1));
        let first = store.seed_request(create_test_request(8, ""));
        let second = store.seed_request(create_test_request(7, ""));

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [first, second]
            .into_iter()
            .map(|request_id| {
                let engine = engine.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    engine.fulfill_request(request_id)
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        let first_fulfilled = store.request(first).unwrap().fulfilled;
        let second_fulfilled = store.request(second).unwrap().fulfilled;
        assert!(
            first_fulfilled ^ second_fulfilled,
            "exactly one request must win the row"
        );
        let row = store.inventory(inventory_id).unwrap();
        let expected = if first_fulfilled { 10 - 8 } else { 10 - 7 };
        assert_eq!(row.quantity, expected);
        assert_eq!(store.allocations().len(), 1);
    }

    #[test]
    fn test_double_trigger_on_one_request_allocates_once() {
        let (store, _outbox, engine) = create_test_engine();
        let inventory_id = store.seed_inventory(create_test_inventory(10, "depot", 1));
        let request_id = store.seed_request(create_test_request(4, ""));

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let engine = engine.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    engine.fulfill_request(request_id)
                })
            })
            .collect();
        let outcomes: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();

        // One trigger allocates, the other resolves as a benign no-op.
        assert_eq!(store.inventory(inventory_id).unwrap().quantity, 6);
        assert_eq!(store.allocations().len(), 1);
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, FulfillmentOutcome::FromInventory { .. })));
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, FulfillmentOutcome::NotEligible)));
    }
}
