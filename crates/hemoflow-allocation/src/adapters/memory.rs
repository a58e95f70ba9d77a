//! In-memory reference implementation of the fulfillment store.
//!
//! Transactions work on a snapshot and are validated optimistically at
//! commit: every row a transaction read carries the version observed at
//! begin, and a commit fails with [`StoreError::Conflict`] when any of
//! those versions moved underneath it. Match-existence queries are
//! validated against a whole-table version, a conservative guard against
//! phantom inserts of the same pairing.
//!
//! This is the adapter production tests and the demo daemon run against;
//! a relational adapter would satisfy the same contract with row locks.

use crate::domain::entities::{
    AllocationRecord, BloodInventory, BloodRequest, DonationRequest, DonationStatus, EntityId,
    FulfillmentSource, MatchStatus, RequestMatch,
};
use crate::domain::value_objects::BloodSpec;
use crate::ports::outbound::{FulfillmentStore, StoreError, StoreTxn};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};

/// Which versioned table a row key points into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum TableKind {
    Request,
    Donation,
    Inventory,
}

impl TableKind {
    fn name(self) -> &'static str {
        match self {
            Self::Request => "blood_request",
            Self::Donation => "donation_request",
            Self::Inventory => "blood_inventory",
        }
    }
}

type RowKey = (TableKind, EntityId);

#[derive(Clone, Debug)]
struct Versioned<T> {
    row: T,
    version: u64,
}

#[derive(Clone, Debug, Default)]
struct Tables {
    requests: BTreeMap<EntityId, Versioned<BloodRequest>>,
    donations: BTreeMap<EntityId, Versioned<DonationRequest>>,
    inventory: BTreeMap<EntityId, Versioned<BloodInventory>>,
    matches: BTreeMap<EntityId, RequestMatch>,
    allocations: BTreeMap<EntityId, AllocationRecord>,
    /// Bumped on every match insert; guards existence queries.
    match_table_version: u64,
}

impl Tables {
    fn version_of(&self, key: RowKey) -> Option<u64> {
        match key.0 {
            TableKind::Request => self.requests.get(&key.1).map(|v| v.version),
            TableKind::Donation => self.donations.get(&key.1).map(|v| v.version),
            TableKind::Inventory => self.inventory.get(&key.1).map(|v| v.version),
        }
    }
}

/// In-memory transactional store with per-row optimistic versioning.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    next_id: AtomicI64,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self) -> EntityId {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    // ---- seeding helpers (ids are assigned, the input id is ignored) ----

    /// Inserts a blood request and returns its assigned id.
    pub fn seed_request(&self, mut row: BloodRequest) -> EntityId {
        let id = self.allocate_id();
        row.id = id;
        self.tables
            .lock()
            .requests
            .insert(id, Versioned { row, version: 1 });
        id
    }

    /// Inserts a donation request and returns its assigned id.
    pub fn seed_donation(&self, mut row: DonationRequest) -> EntityId {
        let id = self.allocate_id();
        row.id = id;
        self.tables
            .lock()
            .donations
            .insert(id, Versioned { row, version: 1 });
        id
    }

    /// Inserts an inventory row and returns its assigned id.
    pub fn seed_inventory(&self, mut row: BloodInventory) -> EntityId {
        let id = self.allocate_id();
        row.id = id;
        self.tables
            .lock()
            .inventory
            .insert(id, Versioned { row, version: 1 });
        id
    }

    // ---- inspection helpers ----

    /// Reads a blood request outside any transaction.
    pub fn request(&self, id: EntityId) -> Option<BloodRequest> {
        self.tables.lock().requests.get(&id).map(|v| v.row.clone())
    }

    /// Reads a donation request outside any transaction.
    pub fn donation(&self, id: EntityId) -> Option<DonationRequest> {
        self.tables.lock().donations.get(&id).map(|v| v.row.clone())
    }

    /// Reads an inventory row outside any transaction.
    pub fn inventory(&self, id: EntityId) -> Option<BloodInventory> {
        self.tables.lock().inventory.get(&id).map(|v| v.row.clone())
    }

    /// All inventory rows in id order.
    pub fn inventory_rows(&self) -> Vec<BloodInventory> {
        self.tables
            .lock()
            .inventory
            .values()
            .map(|v| v.row.clone())
            .collect()
    }

    /// All match rows in id order.
    pub fn matches(&self) -> Vec<RequestMatch> {
        self.tables.lock().matches.values().cloned().collect()
    }

    /// All allocation ledger rows in id order.
    pub fn allocations(&self) -> Vec<AllocationRecord> {
        self.tables.lock().allocations.values().cloned().collect()
    }
}

impl FulfillmentStore for InMemoryStore {
    fn begin(&self) -> Result<Box<dyn StoreTxn + '_>, StoreError> {
        let snapshot = self.tables.lock().clone();
        Ok(Box::new(MemoryTxn {
            store: self,
            snapshot,
            reads: HashMap::new(),
            dirty: HashSet::new(),
            inserted: HashSet::new(),
            inserted_matches: Vec::new(),
            inserted_allocations: Vec::new(),
            match_version_seen: None,
        }))
    }
}

/// One optimistic transaction over [`InMemoryStore`].
struct MemoryTxn<'a> {
    store: &'a InMemoryStore,
    snapshot: Tables,
    /// Row versions observed at begin, validated at commit.
    reads: HashMap<RowKey, u64>,
    /// Rows this transaction updated.
    dirty: HashSet<RowKey>,
    /// Rows this transaction created; excluded from read validation.
    inserted: HashSet<RowKey>,
    inserted_matches: Vec<EntityId>,
    inserted_allocations: Vec<EntityId>,
    /// Match-table version observed by the first existence query.
    match_version_seen: Option<u64>,
}

impl MemoryTxn<'_> {
    fn record_read(&mut self, key: RowKey) {
        if self.inserted.contains(&key) {
            return;
        }
        if let Some(version) = self.snapshot.version_of(key) {
            self.reads.entry(key).or_insert(version);
        }
    }

    fn record_match_scan(&mut self) {
        if self.match_version_seen.is_none() {
            self.match_version_seen = Some(self.snapshot.match_table_version);
        }
    }

    fn ordered_eligible(&self, spec: Option<BloodSpec>) -> Vec<BloodRequest> {
        let mut rows: Vec<BloodRequest> = self
            .snapshot
            .requests
            .values()
            .map(|v| v.row.clone())
            .filter(|r| r.is_eligible())
            .filter(|r| spec.map_or(true, |s| r.spec() == s))
            .collect();
        rows.sort_by_key(|r| (Reverse(r.emergency), r.created_at, r.id));
        rows
    }
}

impl StoreTxn for MemoryTxn<'_> {
    fn blood_request(&mut self, id: EntityId) -> Result<BloodRequest, StoreError> {
        self.record_read((TableKind::Request, id));
        self.snapshot
            .requests
            .get(&id)
            .map(|v| v.row.clone())
            .ok_or(StoreError::NotFound {
                entity: TableKind::Request.name(),
                id,
            })
    }

    fn eligible_requests(&mut self) -> Result<Vec<BloodRequest>, StoreError> {
        let rows = self.ordered_eligible(None);
        for row in &rows {
            self.record_read((TableKind::Request, row.id));
        }
        Ok(rows)
    }

    fn eligible_requests_for(&mut self, spec: BloodSpec) -> Result<Vec<BloodRequest>, StoreError> {
        let rows = self.ordered_eligible(Some(spec));
        for row in &rows {
            self.record_read((TableKind::Request, row.id));
        }
        Ok(rows)
    }

    fn mark_fulfilled(
        &mut self,
        id: EntityId,
        source: FulfillmentSource,
    ) -> Result<(), StoreError> {
        let key = (TableKind::Request, id);
        self.record_read(key);
        let entry = self
            .snapshot
            .requests
            .get_mut(&id)
            .ok_or(StoreError::NotFound {
                entity: TableKind::Request.name(),
                id,
            })?;
        // A row already fulfilled in our own snapshot means a concurrent
        // fulfiller won before we began.
        entry
            .row
            .mark_fulfilled(source)
            .map_err(|_| StoreError::Conflict {
                entity: TableKind::Request.name(),
                id,
            })?;
        self.dirty.insert(key);
        Ok(())
    }

    fn donation_request(&mut self, id: EntityId) -> Result<DonationRequest, StoreError> {
        self.record_read((TableKind::Donation, id));
        self.snapshot
            .donations
            .get(&id)
            .map(|v| v.row.clone())
            .ok_or(StoreError::NotFound {
                entity: TableKind::Donation.name(),
                id,
            })
    }

    fn confirmed_donations(&mut self, spec: BloodSpec) -> Result<Vec<DonationRequest>, StoreError> {
        let rows: Vec<DonationRequest> = self
            .snapshot
            .donations
            .values()
            .map(|v| v.row.clone())
            .filter(|d| d.is_match_candidate() && d.spec() == spec)
            .collect();
        for row in &rows {
            self.record_read((TableKind::Donation, row.id));
        }
        Ok(rows)
    }

    fn completed_donations(&mut self) -> Result<Vec<DonationRequest>, StoreError> {
        let rows: Vec<DonationRequest> = self
            .snapshot
            .donations
            .values()
            .map(|v| v.row.clone())
            .filter(|d| d.status == DonationStatus::Completed)
            .collect();
        for row in &rows {
            self.record_read((TableKind::Donation, row.id));
        }
        Ok(rows)
    }

    fn set_donation_status(
        &mut self,
        id: EntityId,
        status: DonationStatus,
    ) -> Result<(), StoreError> {
        let key = (TableKind::Donation, id);
        self.record_read(key);
        let entry = self
            .snapshot
            .donations
            .get_mut(&id)
            .ok_or(StoreError::NotFound {
                entity: TableKind::Donation.name(),
                id,
            })?;
        entry.row.status = status;
        self.dirty.insert(key);
        Ok(())
    }

    fn available_inventory(
        &mut self,
        spec: BloodSpec,
        min_quantity: u32,
    ) -> Result<Vec<BloodInventory>, StoreError> {
        let rows: Vec<BloodInventory> = self
            .snapshot
            .inventory
            .values()
            .map(|v| v.row.clone())
            .filter(|i| i.spec() == spec && i.can_supply(min_quantity))
            .collect();
        for row in &rows {
            self.record_read((TableKind::Inventory, row.id));
        }
        Ok(rows)
    }

    fn inventory_for(&mut self, spec: BloodSpec) -> Result<Vec<BloodInventory>, StoreError> {
        let rows: Vec<BloodInventory> = self
            .snapshot
            .inventory
            .values()
            .map(|v| v.row.clone())
            .filter(|i| i.spec() == spec)
            .collect();
        for row in &rows {
            self.record_read((TableKind::Inventory, row.id));
        }
        Ok(rows)
    }

    fn withdraw_inventory(
        &mut self,
        id: EntityId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let key = (TableKind::Inventory, id);
        self.record_read(key);
        let entry = self
            .snapshot
            .inventory
            .get_mut(&id)
            .ok_or(StoreError::NotFound {
                entity: TableKind::Inventory.name(),
                id,
            })?;
        let available = entry.row.quantity;
        entry
            .row
            .withdraw(quantity, now)
            .map_err(|_| StoreError::Underflow {
                id,
                available,
                requested: quantity,
            })?;
        self.dirty.insert(key);
        Ok(())
    }

    fn deposit_inventory(
        &mut self,
        id: EntityId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let key = (TableKind::Inventory, id);
        self.record_read(key);
        let entry = self
            .snapshot
            .inventory
            .get_mut(&id)
            .ok_or(StoreError::NotFound {
                entity: TableKind::Inventory.name(),
                id,
            })?;
        entry.row.deposit(quantity, now);
        self.dirty.insert(key);
        Ok(())
    }

    fn create_inventory(&mut self, mut row: BloodInventory) -> Result<EntityId, StoreError> {
        let id = self.store.allocate_id();
        row.id = id;
        self.snapshot
            .inventory
            .insert(id, Versioned { row, version: 0 });
        self.inserted.insert((TableKind::Inventory, id));
        Ok(id)
    }

    fn has_pending_match(
        &mut self,
        blood_request_id: EntityId,
        donation_request_id: EntityId,
    ) -> Result<bool, StoreError> {
        self.record_match_scan();
        Ok(self.snapshot.matches.values().any(|m| {
            m.blood_request_id == blood_request_id
                && m.donation_request_id == donation_request_id
                && m.status == MatchStatus::Pending
        }))
    }

    fn references_donation(&mut self, donation_request_id: EntityId) -> Result<bool, StoreError> {
        self.record_match_scan();
        Ok(self
            .snapshot
            .matches
            .values()
            .any(|m| m.donation_request_id == donation_request_id))
    }

    fn insert_match(&mut self, mut row: RequestMatch) -> Result<EntityId, StoreError> {
        let id = self.store.allocate_id();
        row.id = id;
        self.snapshot.matches.insert(id, row);
        self.inserted_matches.push(id);
        Ok(id)
    }

    fn insert_allocation(&mut self, mut row: AllocationRecord) -> Result<EntityId, StoreError> {
        let id = self.store.allocate_id();
        row.id = id;
        self.snapshot.allocations.insert(id, row);
        self.inserted_allocations.push(id);
        Ok(id)
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut live = self.store.tables.lock();

        // Validate every observed row version.
        for (&key, &seen) in &self.reads {
            if live.version_of(key) != Some(seen) {
                return Err(StoreError::Conflict {
                    entity: key.0.name(),
                    id: key.1,
                });
            }
        }
        // Validate existence queries against the match table as a whole.
        if let Some(seen) = self.match_version_seen {
            if live.match_table_version != seen {
                return Err(StoreError::Conflict {
                    entity: "request_match",
                    id: 0,
                });
            }
        }

        // Apply updates, bumping each row's version.
        for &key in &self.dirty {
            if self.inserted.contains(&key) {
                continue;
            }
            let next_version = live.version_of(key).unwrap_or(0) + 1;
            match key.0 {
                TableKind::Request => {
                    if let Some(v) = self.snapshot.requests.get(&key.1) {
                        live.requests.insert(
                            key.1,
                            Versioned {
                                row: v.row.clone(),
                                version: next_version,
                            },
                        );
                    }
                }
                TableKind::Donation => {
                    if let Some(v) = self.snapshot.donations.get(&key.1) {
                        live.donations.insert(
                            key.1,
                            Versioned {
                                row: v.row.clone(),
                                version: next_version,
                            },
                        );
                    }
                }
                TableKind::Inventory => {
                    if let Some(v) = self.snapshot.inventory.get(&key.1) {
                        live.inventory.insert(
                            key.1,
                            Versioned {
                                row: v.row.clone(),
                                version: next_version,
                            },
                        );
                    }
                }
            }
        }

        // Apply inserts.
        for &(kind, id) in &self.inserted {
            if kind == TableKind::Inventory {
                if let Some(v) = self.snapshot.inventory.get(&id) {
                    live.inventory.insert(
                        id,
                        Versioned {
                            row: v.row.clone(),
                            version: 1,
                        },
                    );
                }
            }
        }
        for id in &self.inserted_matches {
            if let Some(row) = self.snapshot.matches.get(id) {
                live.matches.insert(*id, row.clone());
            }
        }
        if !self.inserted_matches.is_empty() {
            live.match_table_version += 1;
        }
        for id in &self.inserted_allocations {
            if let Some(row) = self.snapshot.allocations.get(id) {
                live.allocations.insert(*id, row.clone());
            }
        }

        Ok(())
    }
}
