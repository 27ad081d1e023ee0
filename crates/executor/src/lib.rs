//! Pull-model query operators over the record layer.
//!
//! Every operator implements [`Operator`]: `begin` positions the cursor on
//! the first qualifying tuple, `advance` steps it, `next_record` hands out an
//! owned copy of the current tuple, and `is_end` reports exhaustion. A tree
//! of operators is driven from the root; operators hold no borrows into the
//! engine and instead receive an [`ExecContext`] on every call, which is what
//! lets an inner join child be rewound with a fresh `begin`.

mod join;
mod predicate;
mod project;
mod scan;
mod sort;
pub mod tuple;
mod update;


pub use join::NestedLoopJoin;
pub use predicate::{ColRef, CompOp, Condition, Operand};
pub use project::Projection;
pub use scan::SeqScan;
pub use sort::Sort;
pub use update::{SetClause, Update};

use catalog::{ColMeta, StorageEngine};
use common::{DbResult, Record, Rid};
use txn::Context;

/// Shared execution state threaded through every operator call: the storage
/// engine owning all handles, and the transaction context (if any) whose
/// locks the storage layer should take.
pub struct ExecContext<'a> {
    pub engine: &'a mut StorageEngine,
    pub txn: Option<&'a Context<'a>>,
}

impl<'a> ExecContext<'a> {
    pub fn new(engine: &'a mut StorageEngine, txn: Option<&'a Context<'a>>) -> Self {
        Self { engine, txn }
    }
}

/// Uniform pull interface over the executor tree.
pub trait Operator {
    /// Reset the operator and position it on its first tuple. Must be
    /// callable again to restart the operator from the top.
    fn begin(&mut self, ctx: &mut ExecContext) -> DbResult<()>;

    /// Step to the next tuple. Past the last one the operator is at end.
    fn advance(&mut self, ctx: &mut ExecContext) -> DbResult<()>;

    fn is_end(&self) -> bool;

    /// An owned copy of the current tuple, or `None` when the operator
    /// yields nothing (at end, or a side-effect-only operator).
    fn next_record(&mut self, ctx: &mut ExecContext) -> DbResult<Option<Record>>;

    /// Layout of produced tuples: column metadata with output offsets.
    fn columns(&self) -> &[ColMeta];

    /// Width of produced tuples in bytes.
    fn tuple_len(&self) -> usize;

    /// Identity of the current tuple where one exists (`Rid::INVALID` for
    /// derived tuples).
    fn rid(&self) -> Rid;
}

/// Drive an operator tree to completion and collect every produced record.
pub fn execute(op: &mut dyn Operator, ctx: &mut ExecContext) -> DbResult<Vec<Record>> {
    op.begin(ctx)?;
    let mut out = Vec::new();
    while !op.is_end() {
        if let Some(record) = op.next_record(ctx)? {
            out.push(record);
        }
        op.advance(ctx)?;
    }
    Ok(out)
}
