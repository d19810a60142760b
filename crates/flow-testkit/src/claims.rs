//! An in-memory stand-in for the work-claim layer (spec §4.1), mirroring
//! `flow_db::claim`'s claim/release/mark_failed semantics without a Postgres
//! connection — for unit tests in crates that only need "some process holds
//! this row's lease" bookkeeping, not real persistence.

use std::collections::HashMap;
use std::sync::Mutex;

use flow_schemas::StrategyStatus;
use uuid::Uuid;

struct Row {
    status: StrategyStatus,
    held_by: Option<String>,
}

#[derive(Default)]
pub struct InMemoryClaimStore {
    rows: Mutex<HashMap<Uuid, Row>>,
}

impl InMemoryClaimStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: Uuid, status: StrategyStatus) {
        self.rows.lock().unwrap().insert(id, Row { status, held_by: None });
    }

    /// Claim the oldest-inserted unclaimed row in `status` — FIFO by
    /// insertion order within the backing `HashMap`'s iteration is not
    /// guaranteed, so callers that care about order should drive this
    /// through a small number of rows, matching test usage.
    pub fn claim(&self, status: StrategyStatus, process_id: &str) -> Option<Uuid> {
        let mut rows = self.rows.lock().unwrap();
        let id = rows
            .iter()
            .find(|(_, row)| row.status == status && row.held_by.is_none())
            .map(|(id, _)| *id)?;
        rows.get_mut(&id).unwrap().held_by = Some(process_id.to_string());
        Some(id)
    }

    pub fn release(&self, id: Uuid, next_status: StrategyStatus) {
        if let Some(row) = self.rows.lock().unwrap().get_mut(&id) {
            row.status = next_status;
            row.held_by = None;
        }
    }

    pub fn status(&self, id: Uuid) -> Option<StrategyStatus> {
        self.rows.lock().unwrap().get(&id).map(|r| r.status)
    }

    pub fn is_held(&self, id: Uuid) -> bool {
        self.rows
            .lock()
            .unwrap()
            .get(&id)
            .map(|r| r.held_by.is_some())
            .unwrap_or(false)
    }
}
