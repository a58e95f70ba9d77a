//! # Hemoflow Reconciliation Daemon
//!
//! Wires the allocation engine to the reference adapters, starts the
//! background reconciliation scheduler, and shuts it down cleanly on
//! ctrl-c. An in-flight sweep always finishes before the process exits.
//!
//! ## Startup Sequence
//!
//! 1. Initialize tracing
//! 2. Load configuration (optional JSON file as the first argument)
//! 3. Wire store, outbox, clock, engine, scheduler
//! 4. Seed the demo dataset and run one immediate sweep
//! 5. Start the scheduler and wait for ctrl-c

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use hemoflow_allocation::adapters::{InMemoryNotificationOutbox, InMemoryStore};
use hemoflow_allocation::{
    AllocationConfig, AllocationEngine, BloodInventory, BloodRequest, DonationRequest,
    DonationStatus, FulfillmentApi, ReconciliationScheduler, RequestStatus, SystemTimeSource,
};

fn load_config() -> Result<AllocationConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {path}"))?;
            serde_json::from_str(&raw).with_context(|| format!("Failed to parse config {path}"))
        }
        None => Ok(AllocationConfig::default()),
    }
}

/// Seeds a small dataset so the daemon has work to reconcile.
fn seed_demo_data(store: &InMemoryStore) {
    let now = Utc::now();

    store.seed_inventory(BloodInventory {
        id: 0,
        blood_type_id: 1,
        blood_component_id: 1,
        quantity: 12,
        unit: "mL".to_string(),
        location: "Dong Da, Hanoi".to_string(),
        last_updated: now - chrono::Duration::days(3),
    });
    store.seed_request(BloodRequest {
        id: 0,
        user_id: Some(1),
        blood_type_id: 1,
        blood_component_id: 1,
        quantity: 4,
        location: "hanoi_dongda_".to_string(),
        status: RequestStatus::Successful,
        emergency: false,
        fulfilled: false,
        fulfilled_source: None,
        created_at: now - chrono::Duration::hours(2),
    });
    store.seed_request(BloodRequest {
        id: 0,
        user_id: Some(2),
        blood_type_id: 2,
        blood_component_id: 1,
        quantity: 6,
        location: "hanoi_hoankiem_".to_string(),
        status: RequestStatus::Successful,
        emergency: true,
        fulfilled: false,
        fulfilled_source: None,
        created_at: now - chrono::Duration::hours(1),
    });
    store.seed_donation(DonationRequest {
        id: 0,
        user_id: Some(3),
        blood_type_id: 2,
        blood_component_id: 1,
        quantity: 8,
        status: DonationStatus::Confirmed,
    });

    info!("seeded demo dataset: 1 inventory row, 2 requests, 1 confirmed donation");
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;

    let config = load_config()?;

    info!("===========================================");
    info!("  Hemoflow Reconciliation Daemon v0.1.0");
    info!("===========================================");
    info!(
        sweep_interval_secs = config.sweep_interval_secs,
        "configuration loaded"
    );

    let store = Arc::new(InMemoryStore::new());
    let outbox = Arc::new(InMemoryNotificationOutbox::new());
    let clock = Arc::new(SystemTimeSource);

    seed_demo_data(&store);

    let interval = config.sweep_interval();
    let engine = Arc::new(AllocationEngine::new(
        store.clone(),
        outbox.clone(),
        clock,
        config,
    ));

    // First pass up front so state is current before the interval kicks in.
    let report = engine.run_sweep();
    info!(
        fulfilled_from_inventory = report.fulfilled_from_inventory,
        donor_matches_created = report.donor_matches_created,
        "initial sweep complete"
    );

    let scheduler = ReconciliationScheduler::new(engine, interval);
    scheduler.start();

    info!("daemon running; press ctrl-c to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("shutdown signal received");
    scheduler.stop().await;

    info!(
        notifications_delivered = outbox.len(),
        open_matches = store.matches().len(),
        allocations = store.allocations().len(),
        "daemon stopped"
    );
    Ok(())
}
