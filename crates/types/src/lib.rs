use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Column type tag. Strings carry their declared byte length; all types are
/// fixed-width in the record layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColType {
    Int,
    Float,
    Str(u16),
}

impl ColType {
    /// Width of an encoded value of this type, in bytes.
    pub fn byte_len(self) -> usize {
        match self {
            ColType::Int | ColType::Float => 4,
            ColType::Str(n) => n as usize,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ColType::Int | ColType::Float)
    }

    /// Whether values of the two types may appear on the two sides of a
    /// comparison: numeric types compare against each other, strings only
    /// against strings.
    pub fn comparable_with(self, other: ColType) -> bool {
        match (self, other) {
            (ColType::Str(_), ColType::Str(_)) => true,
            (a, b) => a.is_numeric() && b.is_numeric(),
        }
    }
}

impl fmt::Display for ColType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColType::Int => write!(f, "INT"),
            ColType::Float => write!(f, "FLOAT"),
            ColType::Str(n) => write!(f, "CHAR({n})"),
        }
    }
}

/// A typed value, the unit the executor hands across operator boundaries
/// when building or patching records.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i32),
    Float(f32),
    Str(String),
}

impl Value {
    /// The natural column type of this value. A string's declared length is
    /// its own byte length.
    pub fn col_type(&self) -> ColType {
        match self {
            Value::Int(_) => ColType::Int,
            Value::Float(_) => ColType::Float,
            Value::Str(s) => ColType::Str(s.len() as u16),
        }
    }

    /// Implicit conversion applied on assignment: Int and Float convert into
    /// each other; a string fits any declared length it does not exceed.
    /// Anything else is not convertible.
    pub fn coerce_to(self, ty: ColType) -> Option<Value> {
        match (self, ty) {
            (Value::Int(v), ColType::Int) => Some(Value::Int(v)),
            (Value::Int(v), ColType::Float) => Some(Value::Float(v as f32)),
            (Value::Float(v), ColType::Float) => Some(Value::Float(v)),
            (Value::Float(v), ColType::Int) => Some(Value::Int(v as i32)),
            (Value::Str(s), ColType::Str(n)) if s.len() <= n as usize => Some(Value::Str(s)),
            _ => None,
        }
    }

    /// Serialize to exactly `ty.byte_len()` bytes. Strings are NUL-padded to
    /// the declared length. Returns `None` when the value does not fit the
    /// type (no implicit conversion here; see [`Value::coerce_to`]).
    pub fn encode(&self, ty: ColType) -> Option<Vec<u8>> {
        match (self, ty) {
            (Value::Int(v), ColType::Int) => Some(v.to_le_bytes().to_vec()),
            (Value::Float(v), ColType::Float) => Some(v.to_le_bytes().to_vec()),
            (Value::Str(s), ColType::Str(n)) if s.len() <= n as usize => {
                let mut out = vec![0u8; n as usize];
                out[..s.len()].copy_from_slice(s.as_bytes());
                Some(out)
            }
            _ => None,
        }
    }

    /// Read a value back out of `ty.byte_len()` encoded bytes. String
    /// values stop at the first NUL.
    pub fn decode(bytes: &[u8], ty: ColType) -> Value {
        match ty {
            ColType::Int => Value::Int(i32::from_le_bytes(four(bytes))),
            ColType::Float => Value::Float(f32::from_le_bytes(four(bytes))),
            ColType::Str(_) => {
                let end = effective_len(bytes);
                Value::Str(String::from_utf8_lossy(&bytes[..end]).into_owned())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "'{s}'"),
        }
    }
}

fn four(bytes: &[u8]) -> [u8; 4] {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    buf
}

/// Effective length of an encoded string: the offset of the first NUL, or
/// the declared length when none is present.
pub fn effective_len(bytes: &[u8]) -> usize {
    bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len())
}

/// Compare two encoded column values under the engine's comparison rules.
///
/// Numeric types are mutually comparable (the Int operand is promoted to
/// Float); strings compare byte-wise over their effective lengths, with the
/// shorter string smaller on a common-prefix tie. Returns `None` when the
/// types are not mutually comparable.
pub fn compare_encoded(lt: ColType, l: &[u8], rt: ColType, r: &[u8]) -> Option<Ordering> {
    match (lt, rt) {
        (ColType::Int, ColType::Int) => {
            Some(i32::from_le_bytes(four(l)).cmp(&i32::from_le_bytes(four(r))))
        }
        (ColType::Int, ColType::Float) => Some(cmp_f32(
            i32::from_le_bytes(four(l)) as f32,
            f32::from_le_bytes(four(r)),
        )),
        (ColType::Float, ColType::Int) => Some(cmp_f32(
            f32::from_le_bytes(four(l)),
            i32::from_le_bytes(four(r)) as f32,
        )),
        (ColType::Float, ColType::Float) => Some(cmp_f32(
            f32::from_le_bytes(four(l)),
            f32::from_le_bytes(four(r)),
        )),
        (ColType::Str(_), ColType::Str(_)) => {
            Some(l[..effective_len(l)].cmp(&r[..effective_len(r)]))
        }
        _ => None,
    }
}

/// Float ordering: IEEE comparison where defined, `total_cmp` as the NaN
/// fallback so the result is always a total order and `x == x` holds for
/// every non-NaN x.
fn cmp_f32(a: f32, b: f32) -> Ordering {
    a.partial_cmp(&b).unwrap_or_else(|| a.total_cmp(&b))
}
