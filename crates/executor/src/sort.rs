//! Sort: materialize the child, order by one key.

use crate::predicate::{self, ColRef};
use crate::{ExecContext, Operator};
use catalog::ColMeta;
use common::{DbError, DbResult, Record, Rid};
use std::cmp::Ordering;
use types::{ColType, compare_encoded};

/// Blocking sort over one key column. `begin` drains the child into memory
/// and sorts stably, so equal keys keep the child's order; the cursor then
/// plays the sorted run back.
pub struct Sort {
    child: Box<dyn Operator>,
    key: ColRef,
    descending: bool,
    cols: Vec<ColMeta>,
    rows: Vec<(Record, Rid)>,
    cursor: usize,
}

impl Sort {
    pub fn new(child: Box<dyn Operator>, key: ColRef, descending: bool) -> Self {
        Self {
            child,
            key,
            descending,
            cols: Vec::new(),
            rows: Vec::new(),
            cursor: 0,
        }
    }
}

impl Operator for Sort {
    fn begin(&mut self, ctx: &mut ExecContext) -> DbResult<()> {
        self.child.begin(ctx)?;
        self.cols = self.child.columns().to_vec();
        let key = predicate::resolve_col(&self.cols, &self.key)?;
        let (ty, offset, len): (ColType, usize, usize) = (key.col_type, key.offset, key.len);

        self.rows.clear();
        while !self.child.is_end() {
            let record = self.child.next_record(ctx)?.ok_or_else(|| {
                DbError::Internal("sort child yielded no record at cursor".into())
            })?;
            self.rows.push((record, self.child.rid()));
            self.child.advance(ctx)?;
        }

        let descending = self.descending;
        self.rows.sort_by(|(a, _), (b, _)| {
            let ord = compare_encoded(
                ty,
                &a.data[offset..offset + len],
                ty,
                &b.data[offset..offset + len],
            )
            .unwrap_or(Ordering::Equal);
            if descending { ord.reverse() } else { ord }
        });
        self.cursor = 0;
        Ok(())
    }

    fn advance(&mut self, _ctx: &mut ExecContext) -> DbResult<()> {
        if self.cursor < self.rows.len() {
            self.cursor += 1;
        }
        Ok(())
    }

    fn is_end(&self) -> bool {
        self.cursor >= self.rows.len()
    }

    fn next_record(&mut self, _ctx: &mut ExecContext) -> DbResult<Option<Record>> {
        Ok(self.rows.get(self.cursor).map(|(record, _)| record.clone()))
    }

    fn columns(&self) -> &[ColMeta] {
        &self.cols
    }

    fn tuple_len(&self) -> usize {
        self.cols.iter().map(|c| c.len).sum()
    }

    fn rid(&self) -> Rid {
        self.rows
            .get(self.cursor)
            .map_or(Rid::INVALID, |&(_, rid)| rid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::helpers::{
        MockOperator, col_meta, drain, insert_values, setup_people,
    };
    use crate::{SeqScan, tuple};
    use pretty_assertions::assert_eq;
    use types::Value;

    fn keyed_child(keys: &[i32]) -> Box<MockOperator> {
        let cols = vec![
            col_meta("t", "k", ColType::Int, 0),
            col_meta("t", "seq", ColType::Int, 4),
        ];
        let rows = keys
            .iter()
            .enumerate()
            .map(|(i, &k)| {
                let mut data = Value::Int(k).encode(ColType::Int).unwrap();
                data.extend(Value::Int(i as i32).encode(ColType::Int).unwrap());
                Record::new(data)
            })
            .collect();
        Box::new(MockOperator::new(cols, rows))
    }

    fn key_column(sort: &Sort, records: &[Record]) -> Vec<i32> {
        records
            .iter()
            .map(
                |r| match tuple::decode_values(sort.columns(), &r.data)[0] {
                    Value::Int(v) => v,
                    ref other => panic!("unexpected key {other:?}"),
                },
            )
            .collect()
    }

    #[test]
    fn ascending_and_descending_orders() {
        let (mut engine, _dir) = setup_people();

        let mut sort = Sort::new(keyed_child(&[3, 1, 2]), ColRef::bare("k"), false);
        let mut ctx = ExecContext::new(&mut engine, None);
        let records = drain(&mut sort, &mut ctx);
        assert_eq!(key_column(&sort, &records), vec![1, 2, 3]);

        let mut sort = Sort::new(keyed_child(&[3, 1, 2]), ColRef::bare("k"), true);
        let mut ctx = ExecContext::new(&mut engine, None);
        let records = drain(&mut sort, &mut ctx);
        assert_eq!(key_column(&sort, &records), vec![3, 2, 1]);
    }

    #[test]
    fn equal_keys_keep_child_order() {
        let (mut engine, _dir) = setup_people();

        let mut sort = Sort::new(keyed_child(&[2, 1, 2, 1]), ColRef::bare("k"), false);
        let mut ctx = ExecContext::new(&mut engine, None);
        let records = drain(&mut sort, &mut ctx);

        let rows: Vec<Vec<Value>> = records
            .iter()
            .map(|r| tuple::decode_values(sort.columns(), &r.data))
            .collect();
        // seq numbers within each key group stay in arrival order.
        assert_eq!(
            rows,
            vec![
                vec![Value::Int(1), Value::Int(1)],
                vec![Value::Int(1), Value::Int(3)],
                vec![Value::Int(2), Value::Int(0)],
                vec![Value::Int(2), Value::Int(2)],
            ]
        );
    }

    #[test]
    fn string_keys_use_storage_comparison() {
        let (mut engine, _dir) = setup_people();
        for name in ["bb", "a", "ab"] {
            insert_values(
                &mut engine,
                "people",
                &[Value::Int(0), Value::Str(name.into()), Value::Float(0.0)],
            );
        }

        let mut sort = Sort::new(
            Box::new(SeqScan::new("people", vec![])),
            ColRef::bare("name"),
            false,
        );
        let mut ctx = ExecContext::new(&mut engine, None);
        let records = drain(&mut sort, &mut ctx);
        let names: Vec<Value> = records
            .iter()
            .map(|r| tuple::decode_values(sort.columns(), &r.data)[1].clone())
            .collect();
        assert_eq!(
            names,
            vec![
                Value::Str("a".into()),
                Value::Str("ab".into()),
                Value::Str("bb".into()),
            ]
        );
    }

    #[test]
    fn sorted_rows_keep_their_heap_identity() {
        let (mut engine, _dir) = setup_people();
        let rid_b = insert_values(
            &mut engine,
            "people",
            &[Value::Int(2), Value::Str("b".into()), Value::Float(0.0)],
        );
        let rid_a = insert_values(
            &mut engine,
            "people",
            &[Value::Int(1), Value::Str("a".into()), Value::Float(0.0)],
        );

        let mut sort = Sort::new(
            Box::new(SeqScan::new("people", vec![])),
            ColRef::bare("id"),
            false,
        );
        let mut ctx = ExecContext::new(&mut engine, None);
        sort.begin(&mut ctx).unwrap();

        let mut rids = Vec::new();
        while !sort.is_end() {
            rids.push(sort.rid());
            sort.advance(&mut ctx).unwrap();
        }
        assert_eq!(rids, vec![rid_a, rid_b]);
    }
}
