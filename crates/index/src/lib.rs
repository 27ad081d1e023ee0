//! Secondary-index surface used by the executor for index maintenance.
//!
//! The engine core is agnostic to the index structure behind this trait; the
//! bundled [`MemIndex`] keeps an ordered in-memory map and is rebuilt from
//! the heap when its table is opened.

use common::{DbResult, Rid};
use std::collections::BTreeMap;
use txn::Transaction;

/// Naming convention for a secondary index over `cols` of `table`.
pub fn index_name(table: &str, cols: &[&str]) -> String {
    format!("{}_{}.idx", table, cols.join("_"))
}

/// Entry maintenance surface. Keys are the concatenated encoded column
/// values of the indexed columns, in index-column order.
pub trait Index {
    fn insert_entry(&mut self, key: &[u8], rid: Rid, txn: Option<&Transaction>) -> DbResult<()>;
    fn delete_entry(&mut self, key: &[u8], rid: Rid, txn: Option<&Transaction>) -> DbResult<()>;
    fn search(&self, key: &[u8]) -> Vec<Rid>;
}

/// Memory-resident index: ordered key → posting list.
#[derive(Debug, Default)]
pub struct MemIndex {
    entries: BTreeMap<Vec<u8>, Vec<Rid>>,
}

impl MemIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Index for MemIndex {
    fn insert_entry(&mut self, key: &[u8], rid: Rid, _txn: Option<&Transaction>) -> DbResult<()> {
        self.entries.entry(key.to_vec()).or_default().push(rid);
        Ok(())
    }

    fn delete_entry(&mut self, key: &[u8], rid: Rid, _txn: Option<&Transaction>) -> DbResult<()> {
        if let Some(postings) = self.entries.get_mut(key) {
            postings.retain(|&r| r != rid);
            if postings.is_empty() {
                self.entries.remove(key);
            }
        }
        Ok(())
    }

    fn search(&self, key: &[u8]) -> Vec<Rid> {
        self.entries.get(key).cloned().unwrap_or_default()
    }
}
