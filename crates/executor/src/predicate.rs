//! Conjunction predicates over encoded tuples.
//!
//! A condition compares a column against another column or a constant.
//! Binding resolves names against a tuple layout once, up front; evaluation
//! is then plain byte slicing plus [`types::compare_encoded`].

use catalog::ColMeta;
use common::{DbError, DbResult};
use std::cmp::Ordering;
use std::fmt;
use types::{ColType, Value, compare_encoded};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CompOp {
    fn matches(self, ord: Ordering) -> bool {
        match self {
            CompOp::Eq => ord == Ordering::Equal,
            CompOp::Ne => ord != Ordering::Equal,
            CompOp::Lt => ord == Ordering::Less,
            CompOp::Gt => ord == Ordering::Greater,
            CompOp::Le => ord != Ordering::Greater,
            CompOp::Ge => ord != Ordering::Less,
        }
    }
}

/// Reference to a column, optionally qualified by table name. Unqualified
/// references match the first column of that name in the tuple layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColRef {
    pub table: Option<String>,
    pub col: String,
}

impl ColRef {
    pub fn new(table: impl Into<String>, col: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            col: col.into(),
        }
    }

    pub fn bare(col: impl Into<String>) -> Self {
        Self {
            table: None,
            col: col.into(),
        }
    }
}

impl fmt::Display for ColRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{table}.{}", self.col),
            None => write!(f, "{}", self.col),
        }
    }
}

/// Right-hand side of a condition.
#[derive(Clone, Debug)]
pub enum Operand {
    Col(ColRef),
    Const(Value),
}

/// One comparison inside a conjunction.
#[derive(Clone, Debug)]
pub struct Condition {
    pub lhs: ColRef,
    pub op: CompOp,
    pub rhs: Operand,
}

impl Condition {
    pub fn new(lhs: ColRef, op: CompOp, rhs: Operand) -> Self {
        Self { lhs, op, rhs }
    }
}

#[derive(Clone, Copy, Debug)]
struct FieldAt {
    ty: ColType,
    offset: usize,
    len: usize,
}

impl From<&ColMeta> for FieldAt {
    fn from(col: &ColMeta) -> Self {
        Self {
            ty: col.col_type,
            offset: col.offset,
            len: col.len,
        }
    }
}

#[derive(Clone, Debug)]
enum BoundOperand {
    Field(FieldAt),
    Const { ty: ColType, bytes: Vec<u8> },
}

/// A condition with operand offsets and types bound to one tuple layout.
#[derive(Clone, Debug)]
pub(crate) struct BoundCondition {
    op: CompOp,
    lhs: FieldAt,
    rhs: BoundOperand,
}

/// Find `want` in a tuple layout.
pub(crate) fn resolve_col<'a>(cols: &'a [ColMeta], want: &ColRef) -> DbResult<&'a ColMeta> {
    cols.iter()
        .find(|c| c.name == want.col && want.table.as_deref().is_none_or(|t| t == c.table))
        .ok_or_else(|| DbError::ColumnNotFound(want.to_string()))
}

/// Bind every condition of a conjunction against a tuple layout, checking
/// the operand types are mutually comparable.
pub(crate) fn bind(conds: &[Condition], cols: &[ColMeta]) -> DbResult<Vec<BoundCondition>> {
    conds
        .iter()
        .map(|cond| {
            let lhs = FieldAt::from(resolve_col(cols, &cond.lhs)?);
            let (rhs_ty, rhs) = match &cond.rhs {
                Operand::Col(want) => {
                    let field = FieldAt::from(resolve_col(cols, want)?);
                    (field.ty, BoundOperand::Field(field))
                }
                Operand::Const(value) => {
                    let ty = value.col_type();
                    let bytes = value.encode(ty).ok_or_else(|| DbError::IncompatibleType {
                        lhs: lhs.ty.to_string(),
                        rhs: ty.to_string(),
                    })?;
                    (ty, BoundOperand::Const { ty, bytes })
                }
            };
            if !lhs.ty.comparable_with(rhs_ty) {
                return Err(DbError::IncompatibleType {
                    lhs: lhs.ty.to_string(),
                    rhs: rhs_ty.to_string(),
                });
            }
            Ok(BoundCondition {
                op: cond.op,
                lhs,
                rhs,
            })
        })
        .collect()
}

/// Whether a tuple satisfies the whole conjunction.
pub(crate) fn eval_all(bound: &[BoundCondition], tuple: &[u8]) -> bool {
    bound.iter().all(|cond| {
        let lhs = &tuple[cond.lhs.offset..cond.lhs.offset + cond.lhs.len];
        let (rhs_ty, rhs) = match &cond.rhs {
            BoundOperand::Field(field) => {
                (field.ty, &tuple[field.offset..field.offset + field.len])
            }
            BoundOperand::Const { ty, bytes } => (*ty, bytes.as_slice()),
        };
        // Comparability was checked at bind time.
        match compare_encoded(cond.lhs.ty, lhs, rhs_ty, rhs) {
            Some(ord) => cond.op.matches(ord),
            None => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::helpers::col_meta;

    fn layout() -> Vec<ColMeta> {
        vec![
            col_meta("t", "a", ColType::Int, 0),
            col_meta("t", "b", ColType::Str(4), 4),
            col_meta("t", "c", ColType::Float, 8),
        ]
    }

    fn tuple(a: i32, b: &str, c: f32) -> Vec<u8> {
        let mut out = Value::Int(a).encode(ColType::Int).unwrap();
        out.extend(Value::Str(b.into()).encode(ColType::Str(4)).unwrap());
        out.extend(Value::Float(c).encode(ColType::Float).unwrap());
        out
    }

    #[test]
    fn every_operator_matches_as_expected() {
        let cols = layout();
        let data = tuple(5, "mm", 1.0);
        for (op, expected) in [
            (CompOp::Eq, false),
            (CompOp::Ne, true),
            (CompOp::Lt, true),
            (CompOp::Gt, false),
            (CompOp::Le, true),
            (CompOp::Ge, false),
        ] {
            let bound = bind(
                &[Condition::new(
                    ColRef::bare("a"),
                    op,
                    Operand::Const(Value::Int(9)),
                )],
                &cols,
            )
            .unwrap();
            assert_eq!(eval_all(&bound, &data), expected, "{op:?}");
        }
    }

    #[test]
    fn conjunction_requires_every_condition() {
        let cols = layout();
        let bound = bind(
            &[
                Condition::new(ColRef::bare("a"), CompOp::Eq, Operand::Const(Value::Int(5))),
                Condition::new(
                    ColRef::bare("b"),
                    CompOp::Eq,
                    Operand::Const(Value::Str("mm".into())),
                ),
            ],
            &cols,
        )
        .unwrap();

        assert!(eval_all(&bound, &tuple(5, "mm", 0.0)));
        assert!(!eval_all(&bound, &tuple(5, "xx", 0.0)));
        assert!(!eval_all(&bound, &tuple(6, "mm", 0.0)));
    }

    #[test]
    fn column_to_column_comparison_promotes_numerics() {
        let cols = layout();
        let bound = bind(
            &[Condition::new(
                ColRef::new("t", "a"),
                CompOp::Lt,
                Operand::Col(ColRef::new("t", "c")),
            )],
            &cols,
        )
        .unwrap();

        assert!(eval_all(&bound, &tuple(1, "zz", 1.5)));
        assert!(!eval_all(&bound, &tuple(2, "zz", 1.5)));
    }

    #[test]
    fn string_constants_of_other_lengths_compare() {
        let cols = layout();
        // Constant is CHAR(3) against a CHAR(4) column: prefix rule applies.
        let bound = bind(
            &[Condition::new(
                ColRef::bare("b"),
                CompOp::Gt,
                Operand::Const(Value::Str("mmm".into())),
            )],
            &cols,
        )
        .unwrap();

        assert!(!eval_all(&bound, &tuple(0, "mm", 0.0)), "shorter is smaller");
        assert!(eval_all(&bound, &tuple(0, "mmmm", 0.0)));
    }

    #[test]
    fn unknown_columns_are_reported() {
        let err = bind(
            &[Condition::new(
                ColRef::bare("ghost"),
                CompOp::Eq,
                Operand::Const(Value::Int(0)),
            )],
            &layout(),
        )
        .unwrap_err();
        assert!(matches!(err, DbError::ColumnNotFound(_)));

        let err = bind(
            &[Condition::new(
                ColRef::new("other", "a"),
                CompOp::Eq,
                Operand::Const(Value::Int(0)),
            )],
            &layout(),
        )
        .unwrap_err();
        assert!(matches!(err, DbError::ColumnNotFound(_)));
    }

    #[test]
    fn type_mismatch_is_rejected_at_bind() {
        let err = bind(
            &[Condition::new(
                ColRef::bare("a"),
                CompOp::Eq,
                Operand::Const(Value::Str("1".into())),
            )],
            &layout(),
        )
        .unwrap_err();
        assert!(matches!(err, DbError::IncompatibleType { .. }));

        let err = bind(
            &[Condition::new(
                ColRef::bare("b"),
                CompOp::Lt,
                Operand::Col(ColRef::bare("c")),
            )],
            &layout(),
        )
        .unwrap_err();
        assert!(matches!(err, DbError::IncompatibleType { .. }));
    }
}
