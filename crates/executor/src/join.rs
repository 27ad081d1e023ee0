//! Nested-loop join.

use crate::predicate::{self, BoundCondition, Condition};
use crate::{ExecContext, Operator};
use catalog::ColMeta;
use common::{DbError, DbResult, Record, Rid};

/// Inner join of two children by nested iteration, outer-major order.
///
/// The output layout is the left columns followed by the right columns with
/// their offsets shifted past the left tuple. The inner child is rewound
/// with `begin` every time the outer child steps, so both children must be
/// restartable.
pub struct NestedLoopJoin {
    left: Box<dyn Operator>,
    right: Box<dyn Operator>,
    conds: Vec<Condition>,
    cols: Vec<ColMeta>,
    bound: Vec<BoundCondition>,
    current: Option<Record>,
    ended: bool,
}

impl NestedLoopJoin {
    pub fn new(left: Box<dyn Operator>, right: Box<dyn Operator>, conds: Vec<Condition>) -> Self {
        Self {
            left,
            right,
            conds,
            cols: Vec::new(),
            bound: Vec::new(),
            current: None,
            ended: false,
        }
    }

    /// Walk (outer, inner) pairs from the current position until one passes
    /// the conjunction; materializes the concatenated record.
    fn find_match(&mut self, ctx: &mut ExecContext) -> DbResult<()> {
        self.current = None;
        loop {
            if self.left.is_end() {
                self.ended = true;
                return Ok(());
            }
            if self.right.is_end() {
                self.left.advance(ctx)?;
                self.right.begin(ctx)?;
                continue;
            }
            let left = take_child_record(&mut *self.left, ctx)?;
            let right = take_child_record(&mut *self.right, ctx)?;
            let mut data = left.data;
            data.extend_from_slice(&right.data);
            if predicate::eval_all(&self.bound, &data) {
                self.current = Some(Record::new(data));
                return Ok(());
            }
            self.right.advance(ctx)?;
        }
    }
}

impl Operator for NestedLoopJoin {
    fn begin(&mut self, ctx: &mut ExecContext) -> DbResult<()> {
        self.left.begin(ctx)?;
        self.right.begin(ctx)?;

        let left_len = self.left.tuple_len();
        self.cols = self.left.columns().to_vec();
        self.cols.extend(self.right.columns().iter().map(|col| {
            let mut col = col.clone();
            col.offset += left_len;
            col
        }));
        self.bound = predicate::bind(&self.conds, &self.cols)?;

        self.ended = false;
        self.find_match(ctx)
    }

    fn advance(&mut self, ctx: &mut ExecContext) -> DbResult<()> {
        if self.ended {
            return Ok(());
        }
        self.right.advance(ctx)?;
        self.find_match(ctx)
    }

    fn is_end(&self) -> bool {
        self.ended
    }

    fn next_record(&mut self, _ctx: &mut ExecContext) -> DbResult<Option<Record>> {
        Ok(self.current.clone())
    }

    fn columns(&self) -> &[ColMeta] {
        &self.cols
    }

    fn tuple_len(&self) -> usize {
        self.cols.iter().map(|c| c.len).sum()
    }

    /// Joined tuples are derived; they have no heap identity.
    fn rid(&self) -> Rid {
        Rid::INVALID
    }
}

fn take_child_record(child: &mut dyn Operator, ctx: &mut ExecContext) -> DbResult<Record> {
    child
        .next_record(ctx)?
        .ok_or_else(|| DbError::Internal("join child yielded no record at cursor".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::{ColRef, CompOp, Operand};
    use crate::tests::helpers::{
        MockOperator, col_meta, drain, insert_values, int_record, setup_people,
    };
    use crate::{SeqScan, execute, tuple};
    use pretty_assertions::assert_eq;
    use types::{ColType, Value};

    fn left() -> Box<MockOperator> {
        Box::new(MockOperator::new(
            vec![col_meta("L", "x", ColType::Int, 0)],
            vec![int_record(&[1]), int_record(&[2])],
        ))
    }

    fn right() -> Box<MockOperator> {
        Box::new(MockOperator::new(
            vec![
                col_meta("R", "y", ColType::Int, 0),
                col_meta("R", "key", ColType::Int, 4),
            ],
            vec![int_record(&[10, 1]), int_record(&[20, 2])],
        ))
    }

    #[test]
    fn equi_join_pairs_in_outer_major_order() {
        let (mut engine, _dir) = setup_people();
        let mut join = NestedLoopJoin::new(
            left(),
            right(),
            vec![Condition::new(
                ColRef::new("L", "x"),
                CompOp::Eq,
                Operand::Col(ColRef::new("R", "key")),
            )],
        );

        let mut ctx = ExecContext::new(&mut engine, None);
        let records = drain(&mut join, &mut ctx);
        let rows: Vec<Vec<Value>> = records
            .iter()
            .map(|r| tuple::decode_values(join.columns(), &r.data))
            .collect();
        assert_eq!(
            rows,
            vec![
                vec![Value::Int(1), Value::Int(10), Value::Int(1)],
                vec![Value::Int(2), Value::Int(20), Value::Int(2)],
            ]
        );
    }

    #[test]
    fn cross_join_enumerates_outer_major() {
        let (mut engine, _dir) = setup_people();
        let mut join = NestedLoopJoin::new(left(), right(), vec![]);

        let mut ctx = ExecContext::new(&mut engine, None);
        let records = drain(&mut join, &mut ctx);
        let first: Vec<Value> = records
            .iter()
            .map(|r| tuple::decode_values(join.columns(), &r.data)[0].clone())
            .collect();
        assert_eq!(
            first,
            vec![Value::Int(1), Value::Int(1), Value::Int(2), Value::Int(2)]
        );
    }

    #[test]
    fn output_layout_shifts_right_offsets() {
        let (mut engine, _dir) = setup_people();
        let mut join = NestedLoopJoin::new(left(), right(), vec![]);
        let mut ctx = ExecContext::new(&mut engine, None);
        join.begin(&mut ctx).unwrap();

        let offsets: Vec<(String, usize)> = join
            .columns()
            .iter()
            .map(|c| (format!("{}.{}", c.table, c.name), c.offset))
            .collect();
        assert_eq!(
            offsets,
            vec![
                ("L.x".into(), 0),
                ("R.y".into(), 4),
                ("R.key".into(), 8)
            ]
        );
        assert_eq!(join.tuple_len(), 12);
    }

    #[test]
    fn empty_children_end_immediately() {
        let (mut engine, _dir) = setup_people();

        let empty = || {
            Box::new(MockOperator::new(
                vec![col_meta("E", "x", ColType::Int, 0)],
                vec![],
            ))
        };

        for (l, r) in [
            (empty() as Box<dyn Operator>, right() as Box<dyn Operator>),
            (left(), empty()),
        ] {
            let mut join = NestedLoopJoin::new(l, r, vec![]);
            let mut ctx = ExecContext::new(&mut engine, None);
            assert!(execute(&mut join, &mut ctx).unwrap().is_empty());
        }
    }

    #[test]
    fn join_over_heap_scans_rewinds_the_inner_table() {
        let (mut engine, _dir) = setup_people();
        engine
            .create_table(
                "depts",
                &[
                    catalog::ColDef::new("owner", ColType::Int),
                    catalog::ColDef::new("dept", ColType::Str(4)),
                ],
            )
            .unwrap();
        for (id, name) in [(1, "ada"), (2, "bob")] {
            insert_values(
                &mut engine,
                "people",
                &[
                    Value::Int(id),
                    Value::Str(name.into()),
                    Value::Float(0.0),
                ],
            );
        }
        for (owner, dept) in [(1, "eng"), (2, "ops"), (1, "qa")] {
            insert_values(
                &mut engine,
                "depts",
                &[Value::Int(owner), Value::Str(dept.into())],
            );
        }

        let mut join = NestedLoopJoin::new(
            Box::new(SeqScan::new("people", vec![])),
            Box::new(SeqScan::new("depts", vec![])),
            vec![Condition::new(
                ColRef::new("people", "id"),
                CompOp::Eq,
                Operand::Col(ColRef::new("depts", "owner")),
            )],
        );
        let mut ctx = ExecContext::new(&mut engine, None);
        let records = drain(&mut join, &mut ctx);

        let pairs: Vec<(Value, Value)> = records
            .iter()
            .map(|r| {
                let row = tuple::decode_values(join.columns(), &r.data);
                (row[0].clone(), row[4].clone())
            })
            .collect();
        assert_eq!(
            pairs,
            vec![
                (Value::Int(1), Value::Str("eng".into())),
                (Value::Int(1), Value::Str("qa".into())),
                (Value::Int(2), Value::Str("ops".into())),
            ]
        );
    }
}
