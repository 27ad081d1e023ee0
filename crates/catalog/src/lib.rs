//! Catalog metadata: columns, tables, and the serialized database snapshot.
//!
//! The on-disk form is a single pretty-JSON `DbMeta` file inside the
//! database directory, rewritten in full whenever the catalog mutates.

mod engine;


pub use engine::{DB_META_FILE, LOG_FILE, StorageEngine};

use ahash::RandomState;
use common::{DbError, DbResult};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use types::ColType;

pub type Map<K, V> = HashMap<K, V, RandomState>;

/// A column definition as supplied to `create_table`.
#[derive(Clone, Debug)]
pub struct ColDef {
    pub name: String,
    pub col_type: ColType,
}

impl ColDef {
    pub fn new(name: impl Into<String>, col_type: ColType) -> Self {
        Self {
            name: name.into(),
            col_type,
        }
    }
}

/// A column bound into a table's record layout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColMeta {
    /// Owning table.
    pub table: String,
    pub name: String,
    pub col_type: ColType,
    /// Width of the encoded field in bytes.
    pub len: usize,
    /// Byte offset of the field inside the record.
    pub offset: usize,
    /// Whether some secondary index covers this column.
    pub indexed: bool,
}

/// A secondary index declared over a table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub table: String,
    pub cols: Vec<String>,
}

impl IndexMeta {
    pub fn name(&self) -> String {
        let cols: Vec<&str> = self.cols.iter().map(String::as_str).collect();
        index::index_name(&self.table, &cols)
    }
}

/// Schema of one table: its columns in declaration order plus any indexes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TabMeta {
    pub name: String,
    pub cols: Vec<ColMeta>,
    pub indexes: Vec<IndexMeta>,
}

impl TabMeta {
    /// Records are the columns tightly packed in declaration order.
    pub fn record_size(&self) -> usize {
        self.cols.iter().map(|c| c.len).sum()
    }

    pub fn col(&self, name: &str) -> DbResult<&ColMeta> {
        self.cols
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| DbError::ColumnNotFound(format!("{}.{}", self.name, name)))
    }

    pub fn has_index(&self, cols: &[String]) -> bool {
        self.indexes.iter().any(|ix| ix.cols == cols)
    }

    /// Concatenated encoded field bytes of `cols`, the key an index over
    /// those columns files a record under.
    pub fn index_key(&self, cols: &[String], record: &[u8]) -> DbResult<Vec<u8>> {
        let mut key = Vec::new();
        for name in cols {
            let col = self.col(name)?;
            key.extend_from_slice(&record[col.offset..col.offset + col.len]);
        }
        Ok(key)
    }
}

/// The whole catalog of one database, as persisted in `DB_META`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DbMeta {
    pub name: String,
    pub tables: Map<String, TabMeta>,
}
