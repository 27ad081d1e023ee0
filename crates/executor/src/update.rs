//! Update: apply set clauses to chosen rows, maintaining secondary indexes.

use crate::{ExecContext, Operator};
use catalog::ColMeta;
use common::{DbError, DbResult, Record, Rid};
use index::Index;
use types::Value;

/// One column assignment of an update.
#[derive(Clone, Debug)]
pub struct SetClause {
    pub col: String,
    pub value: Value,
}

impl SetClause {
    pub fn new(col: impl Into<String>, value: Value) -> Self {
        Self {
            col: col.into(),
            value,
        }
    }
}

/// Side-effect-only operator: rewrites each target row in place and keeps
/// every secondary index of the table in step. Yields no tuples; driving it
/// once performs all the work.
pub struct Update {
    table: String,
    sets: Vec<SetClause>,
    rids: Vec<Rid>,
    cols: Vec<ColMeta>,
    done: bool,
}

impl Update {
    pub fn new(table: impl Into<String>, sets: Vec<SetClause>, rids: Vec<Rid>) -> Self {
        Self {
            table: table.into(),
            sets,
            rids,
            cols: Vec::new(),
            done: false,
        }
    }

    fn run(&self, ctx: &mut ExecContext) -> DbResult<()> {
        let tab = ctx.engine.table_meta(&self.table)?.clone();

        // Resolve each assignment to (offset, encoded bytes) once. A value
        // must fit its column's type; Int and Float convert into each other,
        // string conversions do not exist.
        let mut patches = Vec::with_capacity(self.sets.len());
        for set in &self.sets {
            let col = tab.col(&set.col)?;
            let mismatch = || DbError::IncompatibleType {
                lhs: col.col_type.to_string(),
                rhs: set.value.col_type().to_string(),
            };
            let coerced = set
                .value
                .clone()
                .coerce_to(col.col_type)
                .ok_or_else(mismatch)?;
            let bytes = coerced.encode(col.col_type).ok_or_else(mismatch)?;
            patches.push((col.offset, bytes));
        }

        let txn = ctx.txn.map(|c| c.txn);
        for &rid in &self.rids {
            let old = ctx
                .engine
                .record_file(&self.table)?
                .get_record(rid, ctx.txn)?;

            // Old keys leave every index before the new image goes in.
            for ix in &tab.indexes {
                let key = tab.index_key(&ix.cols, &old.data)?;
                ctx.engine
                    .index_handle_mut(&self.table, &ix.cols)?
                    .delete_entry(&key, rid, txn)?;
            }

            let mut new = old.clone();
            for (offset, bytes) in &patches {
                new.data[*offset..*offset + bytes.len()].copy_from_slice(bytes);
            }

            for ix in &tab.indexes {
                let key = tab.index_key(&ix.cols, &new.data)?;
                ctx.engine
                    .index_handle_mut(&self.table, &ix.cols)?
                    .insert_entry(&key, rid, txn)?;
            }

            ctx.engine
                .record_file_mut(&self.table)?
                .update_record(rid, &new.data, ctx.txn)?;
        }
        log::debug!("updated {} rows of '{}'", self.rids.len(), self.table);
        Ok(())
    }
}

impl Operator for Update {
    fn begin(&mut self, ctx: &mut ExecContext) -> DbResult<()> {
        ctx.engine.table_meta(&self.table)?;
        self.done = false;
        Ok(())
    }

    fn advance(&mut self, _ctx: &mut ExecContext) -> DbResult<()> {
        self.done = true;
        Ok(())
    }

    fn is_end(&self) -> bool {
        self.done
    }

    /// Drives all side effects to completion; there is no tuple to yield.
    fn next_record(&mut self, ctx: &mut ExecContext) -> DbResult<Option<Record>> {
        if !self.done {
            self.run(ctx)?;
            self.done = true;
        }
        Ok(None)
    }

    fn columns(&self) -> &[ColMeta] {
        &self.cols
    }

    fn tuple_len(&self) -> usize {
        0
    }

    fn rid(&self) -> Rid {
        Rid::INVALID
    }
}
