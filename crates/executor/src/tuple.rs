//! Building and reading fixed-width records against a column layout.

use catalog::{ColMeta, TabMeta};
use common::{DbError, DbResult, Record};
use types::Value;

/// Assemble a record from one value per column, in declaration order.
/// Values are implicitly converted where the column type allows it.
pub fn encode_record(tab: &TabMeta, values: &[Value]) -> DbResult<Record> {
    if values.len() != tab.cols.len() {
        return Err(DbError::Internal(format!(
            "table '{}' has {} columns, got {} values",
            tab.name,
            tab.cols.len(),
            values.len()
        )));
    }
    let mut data = vec![0u8; tab.record_size()];
    for (col, value) in tab.cols.iter().zip(values) {
        let mismatch = || DbError::IncompatibleType {
            lhs: col.col_type.to_string(),
            rhs: value.col_type().to_string(),
        };
        let coerced = value.clone().coerce_to(col.col_type).ok_or_else(mismatch)?;
        let bytes = coerced.encode(col.col_type).ok_or_else(mismatch)?;
        data[col.offset..col.offset + col.len].copy_from_slice(&bytes);
    }
    Ok(Record::new(data))
}

/// Read one value per column out of an encoded tuple.
pub fn decode_values(cols: &[ColMeta], data: &[u8]) -> Vec<Value> {
    cols.iter()
        .map(|col| Value::decode(&data[col.offset..col.offset + col.len], col.col_type))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::{ColMeta, TabMeta};
    use types::ColType;

    fn tab() -> TabMeta {
        let cols = vec![
            ColMeta {
                table: "t".into(),
                name: "a".into(),
                col_type: ColType::Int,
                len: 4,
                offset: 0,
                indexed: false,
            },
            ColMeta {
                table: "t".into(),
                name: "b".into(),
                col_type: ColType::Str(4),
                len: 4,
                offset: 4,
                indexed: false,
            },
        ];
        TabMeta {
            name: "t".into(),
            cols,
            indexes: vec![],
        }
    }

    #[test]
    fn encode_pads_and_decode_trims() {
        let tab = tab();
        let record =
            encode_record(&tab, &[Value::Int(1), Value::Str("ab".into())]).unwrap();
        assert_eq!(record.data, [1, 0, 0, 0, b'a', b'b', 0, 0]);
        assert_eq!(
            decode_values(&tab.cols, &record.data),
            vec![Value::Int(1), Value::Str("ab".into())]
        );
    }

    #[test]
    fn encode_applies_numeric_conversion() {
        let tab = tab();
        let record =
            encode_record(&tab, &[Value::Float(6.9), Value::Str("x".into())]).unwrap();
        assert_eq!(
            decode_values(&tab.cols, &record.data)[0],
            Value::Int(6),
            "float assigned to INT truncates"
        );
    }

    #[test]
    fn encode_rejects_bad_shapes() {
        let tab = tab();
        assert!(matches!(
            encode_record(&tab, &[Value::Int(1)]),
            Err(DbError::Internal(_))
        ));
        assert!(matches!(
            encode_record(&tab, &[Value::Str("no".into()), Value::Str("x".into())]),
            Err(DbError::IncompatibleType { .. })
        ));
        assert!(matches!(
            encode_record(&tab, &[Value::Int(1), Value::Str("toolong".into())]),
            Err(DbError::IncompatibleType { .. })
        ));
    }
}
