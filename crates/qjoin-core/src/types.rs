//! Lightweight row values used for sampling and reference execution.
//!
//! Join keys need `Eq + Hash`, so floats compare by bit pattern and `Null`
//! never equals anything when used as a key (see [`Scalar::is_join_key`]).

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::schema::DataType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Str(String),
}

impl Scalar {
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(_) => Some(DataType::Boolean),
            Scalar::I64(_) => Some(DataType::Int64),
            Scalar::F64(_) => Some(DataType::Float64),
            Scalar::Str(_) => Some(DataType::Utf8),
        }
    }

    /// Nulls are excluded from equi-join matching and from unique indexes.
    pub fn is_join_key(&self) -> bool {
        !matches!(self, Scalar::Null)
    }

    /// Parse a text cell, preferring the narrowest type that fits.
    pub fn parse(cell: &str) -> Self {
        let t = cell.trim();
        if t.is_empty() || t.eq_ignore_ascii_case("null") {
            Scalar::Null
        } else if let Ok(v) = t.parse::<i64>() {
            Scalar::I64(v)
        } else if let Ok(v) = t.parse::<f64>() {
            Scalar::F64(v)
        } else if let Ok(v) = t.parse::<bool>() {
            Scalar::Bool(v)
        } else {
            Scalar::Str(t.to_string())
        }
    }

    fn type_order(&self) -> u8 {
        match self {
            Scalar::Null => 0,
            Scalar::Bool(_) => 1,
            Scalar::I64(_) => 2,
            Scalar::F64(_) => 3,
            Scalar::Str(_) => 4,
        }
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        use Scalar::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (I64(a), I64(b)) => a == b,
            (F64(a), F64(b)) => a.to_bits() == b.to_bits(),
            (Str(a), Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Scalar {}

impl Hash for Scalar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u8(self.type_order());
        match self {
            Scalar::Null => {}
            Scalar::Bool(b) => b.hash(state),
            Scalar::I64(i) => i.hash(state),
            Scalar::F64(f) => f.to_bits().hash(state),
            Scalar::Str(s) => s.hash(state),
        }
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::I64(i) => write!(f, "{i}"),
            Scalar::F64(x) => write!(f, "{x}"),
            Scalar::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// One row, positionally aligned with the owning relation's `Schema`.
pub type Row = Vec<Scalar>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn parse_prefers_integers() {
        assert_eq!(Scalar::parse("42"), Scalar::I64(42));
        assert_eq!(Scalar::parse("4.5"), Scalar::F64(4.5));
        assert_eq!(Scalar::parse(""), Scalar::Null);
        assert_eq!(Scalar::parse("abc"), Scalar::Str("abc".into()));
    }

    #[test]
    fn integer_and_float_keys_do_not_collide() {
        let mut keys = HashSet::new();
        keys.insert(Scalar::I64(1));
        keys.insert(Scalar::F64(1.0));
        assert_eq!(keys.len(), 2);
        assert!(!Scalar::Null.is_join_key());
    }
}
