//! Projection: gather-copy of selected columns.

use crate::predicate::{self, ColRef};
use crate::{ExecContext, Operator};
use catalog::ColMeta;
use common::{DbResult, Record, Rid};

/// Narrow a child's tuples to the requested columns, in the requested
/// order, with output offsets repacked tightly from zero.
pub struct Projection {
    child: Box<dyn Operator>,
    sel: Vec<ColRef>,
    cols: Vec<ColMeta>,
    /// (offset, len) of each selected field inside the child tuple.
    src: Vec<(usize, usize)>,
}

impl Projection {
    pub fn new(child: Box<dyn Operator>, sel: Vec<ColRef>) -> Self {
        Self {
            child,
            sel,
            cols: Vec::new(),
            src: Vec::new(),
        }
    }
}

impl Operator for Projection {
    fn begin(&mut self, ctx: &mut ExecContext) -> DbResult<()> {
        self.child.begin(ctx)?;
        self.cols.clear();
        self.src.clear();
        let mut offset = 0;
        for want in &self.sel {
            let col = predicate::resolve_col(self.child.columns(), want)?;
            self.src.push((col.offset, col.len));
            self.cols.push(ColMeta {
                offset,
                ..col.clone()
            });
            offset += col.len;
        }
        Ok(())
    }

    fn advance(&mut self, ctx: &mut ExecContext) -> DbResult<()> {
        self.child.advance(ctx)
    }

    fn is_end(&self) -> bool {
        self.child.is_end()
    }

    fn next_record(&mut self, ctx: &mut ExecContext) -> DbResult<Option<Record>> {
        let Some(record) = self.child.next_record(ctx)? else {
            return Ok(None);
        };
        let mut data = Vec::with_capacity(self.tuple_len());
        for &(offset, len) in &self.src {
            data.extend_from_slice(&record.data[offset..offset + len]);
        }
        Ok(Some(Record::new(data)))
    }

    fn columns(&self) -> &[ColMeta] {
        &self.cols
    }

    fn tuple_len(&self) -> usize {
        self.cols.iter().map(|c| c.len).sum()
    }

    fn rid(&self) -> Rid {
        self.child.rid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::helpers::{MockOperator, col_meta, drain, setup_people};
    use crate::tuple;
    use common::DbError;
    use pretty_assertions::assert_eq;
    use types::{ColType, Value};

    fn child() -> Box<MockOperator> {
        let cols = vec![
            col_meta("t", "a", ColType::Int, 0),
            col_meta("t", "b", ColType::Str(2), 4),
            col_meta("t", "c", ColType::Float, 6),
        ];
        let rows = vec![
            row(&cols, 1, "x", 3.5),
            row(&cols, 2, "y", 4.5),
        ];
        Box::new(MockOperator::new(cols, rows))
    }

    fn row(cols: &[ColMeta], a: i32, b: &str, c: f32) -> Record {
        let mut data = vec![0u8; 10];
        data[cols[0].offset..cols[0].offset + 4]
            .copy_from_slice(&Value::Int(a).encode(ColType::Int).unwrap());
        data[cols[1].offset..cols[1].offset + 2]
            .copy_from_slice(&Value::Str(b.into()).encode(ColType::Str(2)).unwrap());
        data[cols[2].offset..cols[2].offset + 4]
            .copy_from_slice(&Value::Float(c).encode(ColType::Float).unwrap());
        Record::new(data)
    }

    #[test]
    fn gather_reorders_and_repacks() {
        let (mut engine, _dir) = setup_people();
        let mut project = Projection::new(child(), vec![ColRef::bare("c"), ColRef::bare("a")]);

        let mut ctx = ExecContext::new(&mut engine, None);
        let records = drain(&mut project, &mut ctx);

        // Output layout: FLOAT at 0, INT at 4.
        let layout: Vec<(usize, ColType)> = project
            .columns()
            .iter()
            .map(|c| (c.offset, c.col_type))
            .collect();
        assert_eq!(layout, vec![(0, ColType::Float), (4, ColType::Int)]);
        assert_eq!(project.tuple_len(), 8);

        let rows: Vec<Vec<Value>> = records
            .iter()
            .map(|r| tuple::decode_values(project.columns(), &r.data))
            .collect();
        assert_eq!(
            rows,
            vec![
                vec![Value::Float(3.5), Value::Int(1)],
                vec![Value::Float(4.5), Value::Int(2)],
            ]
        );
    }

    #[test]
    fn selecting_a_column_twice_duplicates_it() {
        let (mut engine, _dir) = setup_people();
        let mut project = Projection::new(child(), vec![ColRef::bare("a"), ColRef::bare("a")]);

        let mut ctx = ExecContext::new(&mut engine, None);
        let records = drain(&mut project, &mut ctx);
        assert_eq!(
            tuple::decode_values(project.columns(), &records[0].data),
            vec![Value::Int(1), Value::Int(1)]
        );
    }

    #[test]
    fn unknown_columns_fail_at_begin() {
        let (mut engine, _dir) = setup_people();
        let mut project = Projection::new(child(), vec![ColRef::bare("ghost")]);
        let mut ctx = ExecContext::new(&mut engine, None);
        assert!(matches!(
            project.begin(&mut ctx),
            Err(DbError::ColumnNotFound(_))
        ));
    }
}
