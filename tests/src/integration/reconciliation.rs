//! # Integration Test: Reconciliation Lifecycle
//!
//! Exercises the background scheduler against the real engine and the
//! in-memory adapters: periodic sweeps, graceful shutdown, and the
//! synchronous trigger running alongside the scheduled one.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;

    use hemoflow_allocation::adapters::{InMemoryNotificationOutbox, InMemoryStore};
    use hemoflow_allocation::{
        AllocationConfig, AllocationEngine, BloodInventory, BloodRequest, FulfillmentApi,
        FulfillmentOutcome, ReconciliationScheduler, RequestStatus, SystemTimeSource,
    };

    fn create_test_engine() -> (
        Arc<InMemoryStore>,
        Arc<InMemoryNotificationOutbox>,
        Arc<AllocationEngine>,
    ) {
        let store = Arc::new(InMemoryStore::new());
        let outbox = Arc::new(InMemoryNotificationOutbox::new());
        let engine = Arc::new(AllocationEngine::new(
            store.clone(),
            outbox.clone(),
            Arc::new(SystemTimeSource),
            AllocationConfig::for_testing(),
        ));
        (store, outbox, engine)
    }

    fn create_test_request(quantity: u32) -> BloodRequest {
        BloodRequest {
            id: 0,
            user_id: Some(5),
            blood_type_id: 1,
            blood_component_id: 1,
            quantity,
            location: String::new(),
            status: RequestStatus::Successful,
            emergency: false,
            fulfilled: false,
            fulfilled_source: None,
            created_at: Utc::now(),
        }
    }

    fn create_test_inventory(quantity: u32) -> BloodInventory {
        BloodInventory {
            id: 0,
            blood_type_id: 1,
            blood_component_id: 1,
            quantity,
            unit: "mL".to_string(),
            location: "depot".to_string(),
            last_updated: Utc::now(),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scheduler_fulfills_pending_request() {
        let (store, outbox, engine) = create_test_engine();
        let request_id = store.seed_request(create_test_request(4));
        store.seed_inventory(create_test_inventory(10));

        let scheduler = ReconciliationScheduler::new(engine, Duration::from_millis(20));
        scheduler.start();

        // Allow a few sweep intervals to elapse.
        tokio::time::sleep(Duration::from_millis(200)).await;
        scheduler.stop().await;

        assert!(store.request(request_id).unwrap().fulfilled);
        assert_eq!(outbox.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stopped_scheduler_sweeps_no_further() {
        let (store, _outbox, engine) = create_test_engine();

        let scheduler = ReconciliationScheduler::new(engine, Duration::from_millis(20));
        scheduler.start();
        scheduler.stop().await;
        assert!(!scheduler.is_running());

        // Work arriving after shutdown stays untouched.
        let request_id = store.seed_request(create_test_request(4));
        store.seed_inventory(create_test_inventory(10));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!store.request(request_id).unwrap().fulfilled);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_direct_trigger_alongside_running_scheduler() {
        let (store, _outbox, engine) = create_test_engine();
        store.seed_inventory(create_test_inventory(10));

        // Long interval: the direct call must not wait for a sweep.
        let scheduler = ReconciliationScheduler::new(engine.clone(), Duration::from_secs(3600));
        scheduler.start();

        let request_id = store.seed_request(create_test_request(4));
        let outcome = engine.fulfill_request(request_id).unwrap();

        assert!(matches!(
            outcome,
            FulfillmentOutcome::FromInventory { quantity: 4, .. }
        ));
        assert!(store.request(request_id).unwrap().fulfilled);

        scheduler.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scheduler_stocks_completed_donations() {
        use hemoflow_allocation::{DonationRequest, DonationStatus};

        let (store, _outbox, engine) = create_test_engine();
        let request_id = store.seed_request(create_test_request(6));
        let donation_id = store.seed_donation(DonationRequest {
            id: 0,
            user_id: None,
            blood_type_id: 1,
            blood_component_id: 1,
            quantity: 10,
            status: DonationStatus::Completed,
        });

        let scheduler = ReconciliationScheduler::new(engine, Duration::from_millis(20));
        scheduler.start();
        tokio::time::sleep(Duration::from_millis(200)).await;
        scheduler.stop().await;

        assert!(store.request(request_id).unwrap().fulfilled);
        assert_eq!(
            store.donation(donation_id).unwrap().status,
            DonationStatus::Stocked
        );
    }
}
