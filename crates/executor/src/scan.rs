//! Sequential scan with predicate evaluation.

use crate::predicate::{self, BoundCondition, Condition};
use crate::{ExecContext, Operator};
use catalog::ColMeta;
use common::{DbResult, FIRST_RECORD_PAGE, NO_PAGE, NO_SLOT, Record, Rid};

/// Full scan of one table, yielding the records that satisfy a conjunction.
///
/// The operator keeps only a Rid cursor; each step probes the heap through
/// the context, so a restart is a fresh `begin` and nothing else.
pub struct SeqScan {
    table: String,
    conds: Vec<Condition>,
    cols: Vec<ColMeta>,
    bound: Vec<BoundCondition>,
    rid: Rid,
}

impl SeqScan {
    pub fn new(table: impl Into<String>, conds: Vec<Condition>) -> Self {
        Self {
            table: table.into(),
            conds,
            cols: Vec::new(),
            bound: Vec::new(),
            rid: Rid::INVALID,
        }
    }

    /// Move the cursor forward until it rests on a record satisfying the
    /// conjunction, or past the last page.
    fn seek_match(&mut self, ctx: &mut ExecContext) -> DbResult<()> {
        loop {
            let file = ctx.engine.record_file(&self.table)?;
            self.rid = file.next_live_rid(self.rid)?;
            if self.rid.page_no == NO_PAGE {
                return Ok(());
            }
            // Predicate probes read without locking; the locked read happens
            // in next_record once the row is actually handed out.
            let record = file.get_record(self.rid, None)?;
            if predicate::eval_all(&self.bound, &record.data) {
                return Ok(());
            }
        }
    }
}

impl Operator for SeqScan {
    fn begin(&mut self, ctx: &mut ExecContext) -> DbResult<()> {
        let tab = ctx.engine.table_meta(&self.table)?;
        self.cols = tab.cols.clone();
        self.bound = predicate::bind(&self.conds, &self.cols)?;
        self.rid = Rid::new(FIRST_RECORD_PAGE, NO_SLOT);
        self.seek_match(ctx)
    }

    fn advance(&mut self, ctx: &mut ExecContext) -> DbResult<()> {
        if self.is_end() {
            return Ok(());
        }
        self.seek_match(ctx)
    }

    fn is_end(&self) -> bool {
        self.rid.page_no == NO_PAGE
    }

    fn next_record(&mut self, ctx: &mut ExecContext) -> DbResult<Option<Record>> {
        if self.is_end() {
            return Ok(None);
        }
        let record = ctx
            .engine
            .record_file(&self.table)?
            .get_record(self.rid, ctx.txn)?;
        Ok(Some(record))
    }

    fn columns(&self) -> &[ColMeta] {
        &self.cols
    }

    fn tuple_len(&self) -> usize {
        self.cols.iter().map(|c| c.len).sum()
    }

    fn rid(&self) -> Rid {
        self.rid
    }
}
