//! Transactions and the row/table lock surface used by the record layer.
//!
//! The storage operations take locks at fixed points (shared on read,
//! exclusive on mutation, table-level on insert) and are otherwise agnostic
//! to the locking discipline. The manager here is a no-wait lock table: a
//! conflicting request fails immediately with `TransactionAborted` instead
//! of blocking, which keeps the core free of deadlocks by construction.

use common::{DbError, DbResult, FileId, Rid};
use hashbrown::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

pub type TxnId = u64;

/// A transaction identity. The start timestamp orders transactions for
/// snapshot-style consumers; the core only threads it through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transaction {
    id: TxnId,
    start_ts: u64,
}

impl Transaction {
    pub fn new(id: TxnId, start_ts: u64) -> Self {
        Self { id, start_ts }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn get_start_ts(&self) -> u64 {
        self.start_ts
    }
}

/// Per-operation bundle threaded through storage calls that need locking.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub lock_mgr: &'a LockManager,
    pub txn: &'a Transaction,
}

impl<'a> Context<'a> {
    pub fn new(lock_mgr: &'a LockManager, txn: &'a Transaction) -> Self {
        Self { lock_mgr, txn }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum LockTarget {
    Table(FileId),
    Record(FileId, Rid),
}

#[derive(Debug, PartialEq, Eq)]
enum LockMode {
    Shared,
    Exclusive,
}

struct LockState {
    mode: LockMode,
    holders: HashSet<TxnId>,
}

/// No-wait shared/exclusive lock table keyed by table and record targets.
pub struct LockManager {
    table: Mutex<HashMap<LockTarget, LockState>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
        }
    }

    pub fn lock_shared_on_record(&self, txn: &Transaction, rid: Rid, fd: FileId) -> DbResult<()> {
        self.acquire(LockTarget::Record(fd, rid), LockMode::Shared, txn.id)
    }

    pub fn lock_exclusive_on_record(
        &self,
        txn: &Transaction,
        rid: Rid,
        fd: FileId,
    ) -> DbResult<()> {
        self.acquire(LockTarget::Record(fd, rid), LockMode::Exclusive, txn.id)
    }

    pub fn lock_exclusive_on_table(&self, txn: &Transaction, fd: FileId) -> DbResult<()> {
        self.acquire(LockTarget::Table(fd), LockMode::Exclusive, txn.id)
    }

    /// Drop every lock held by the transaction (commit or abort).
    pub fn release_all(&self, txn: &Transaction) {
        let mut table = self.lock_table();
        table.retain(|_, state| {
            state.holders.remove(&txn.id);
            !state.holders.is_empty()
        });
    }

    fn acquire(&self, target: LockTarget, mode: LockMode, txn_id: TxnId) -> DbResult<()> {
        let mut table = self.lock_table();
        match table.get_mut(&target) {
            None => {
                let mut holders = HashSet::new();
                holders.insert(txn_id);
                table.insert(target, LockState { mode, holders });
                Ok(())
            }
            Some(state) => {
                let sole_holder = state.holders.len() == 1 && state.holders.contains(&txn_id);
                match mode {
                    // Shared joins shared; an exclusive holder already covers
                    // its own reads.
                    LockMode::Shared if state.mode == LockMode::Shared => {
                        state.holders.insert(txn_id);
                        Ok(())
                    }
                    LockMode::Shared if sole_holder => Ok(()),
                    // Exclusive needs sole ownership; upgrading one's own
                    // shared lock is allowed.
                    LockMode::Exclusive if sole_holder => {
                        state.mode = LockMode::Exclusive;
                        Ok(())
                    }
                    _ => Err(DbError::TransactionAborted),
                }
            }
        }
    }

    fn lock_table(&self) -> MutexGuard<'_, HashMap<LockTarget, LockState>> {
        self.table.lock().expect("lock table poisoned")
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
