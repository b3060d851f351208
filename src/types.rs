//! Logical data types and the native-type predicate (spec §4.1).
//!
//! `DataType` stands in for the columnar type system, which `spec.md` §1
//! keeps external to this core. It carries just enough structure — a fixed
//! set of machine-representable scalar kinds, nullability, and a few
//! composite shapes that must *not* be native — to make `is_native_type`
//! meaningful and testable.

use std::fmt;

/// The fixed set of machine-representable scalar kinds. Fixed-point
/// date/time values are exposed as plain integer widths, matching how the
/// original treats date/time columns as integer-backed for JIT purposes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum NativeKind {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
}

impl NativeKind {
    /// Width of this kind's machine representation, in bytes.
    pub fn byte_size(self) -> usize {
        match self {
            NativeKind::Int8 | NativeKind::UInt8 => 1,
            NativeKind::Int16 | NativeKind::UInt16 => 2,
            NativeKind::Int32 | NativeKind::UInt32 | NativeKind::Float32 => 4,
            NativeKind::Int64 | NativeKind::UInt64 | NativeKind::Float64 => 8,
        }
    }
}

impl fmt::Display for NativeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NativeKind::Int8 => "Int8",
            NativeKind::Int16 => "Int16",
            NativeKind::Int32 => "Int32",
            NativeKind::Int64 => "Int64",
            NativeKind::UInt8 => "UInt8",
            NativeKind::UInt16 => "UInt16",
            NativeKind::UInt32 => "UInt32",
            NativeKind::UInt64 => "UInt64",
            NativeKind::Float32 => "Float32",
            NativeKind::Float64 => "Float64",
        };
        f.write_str(s)
    }
}

/// A logical data type as seen by the actions graph. Composite shapes
/// (`Array`, `Tuple`, `String`) are represented so that `is_native_type`
/// has something concrete to reject.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum DataType {
    Native(NativeKind),
    Nullable(Box<DataType>),
    String,
    Array(Box<DataType>),
    Tuple(Vec<DataType>),
}

impl DataType {
    pub fn native(kind: NativeKind) -> Self {
        DataType::Native(kind)
    }

    pub fn nullable(self) -> Self {
        DataType::Nullable(Box::new(self))
    }

    /// The non-nullable kernel of this type, if it has one.
    pub fn strip_nullable(&self) -> &DataType {
        match self {
            DataType::Nullable(inner) => inner.strip_nullable(),
            other => other,
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, DataType::Nullable(_))
    }

    /// Byte width of one element's native representation. Only meaningful
    /// for native (possibly nullable) types.
    pub fn element_size(&self) -> usize {
        match self.strip_nullable() {
            DataType::Native(kind) => kind.byte_size(),
            other => panic!("element_size() called on non-native type {other}"),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Native(k) => write!(f, "{k}"),
            DataType::Nullable(inner) => write!(f, "Nullable({inner})"),
            DataType::String => write!(f, "String"),
            DataType::Array(inner) => write!(f, "Array({inner})"),
            DataType::Tuple(items) => {
                write!(f, "Tuple(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// True iff `t` (or its non-nullable kernel) has a direct machine
/// representation. Pure and total: never consults global state.
pub fn is_native_type(t: &DataType) -> bool {
    matches!(t.strip_nullable(), DataType::Native(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_scalars_are_native() {
        assert!(is_native_type(&DataType::native(NativeKind::Int32)));
        assert!(is_native_type(&DataType::native(NativeKind::Float64).nullable()));
    }

    #[test]
    fn composites_are_not_native() {
        assert!(!is_native_type(&DataType::String));
        assert!(!is_native_type(&DataType::Array(Box::new(DataType::native(NativeKind::Int32)))));
        assert!(!is_native_type(&DataType::Tuple(vec![DataType::native(NativeKind::Int8)])));
    }
}
