//! IR value types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of IR value types
///
/// `Bool1` is produced only by comparisons and consumed only by conditional
/// branches. It never lives in a slot and never feeds arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// 64-bit signed integer, two's-complement wrapping
    Int64,
    /// IEEE-754 double
    Float64,
    /// Comparison result
    Bool1,
    /// Pointer to a caller-owned buffer of the pointee type
    Ptr(Box<Type>),
}

impl Type {
    /// Pointer to `pointee`
    pub fn ptr_to(pointee: Type) -> Self {
        Type::Ptr(Box::new(pointee))
    }

    /// Size in bytes of a value of this type stored in memory
    pub fn size_bytes(&self) -> i64 {
        match self {
            Type::Int64 | Type::Float64 | Type::Ptr(_) => 8,
            Type::Bool1 => 1,
        }
    }

    /// Types a slot may hold
    pub fn is_storable(&self) -> bool {
        !matches!(self, Type::Bool1)
    }

    /// Types `+` and `-` accept
    pub fn is_arithmetic(&self) -> bool {
        matches!(self, Type::Int64 | Type::Float64)
    }

    /// Element type if this is a pointer
    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Ptr(inner) => Some(inner),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::Int64 => write!(f, "i64"),
            Type::Float64 => write!(f, "f64"),
            Type::Bool1 => write!(f, "i1"),
            Type::Ptr(inner) => write!(f, "ptr<{}>", inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Type::ptr_to(Type::Float64).to_string(), "ptr<f64>");
        assert_eq!(Type::Bool1.to_string(), "i1");
    }

    #[test]
    fn test_storable() {
        assert!(Type::Int64.is_storable());
        assert!(Type::ptr_to(Type::Int64).is_storable());
        assert!(!Type::Bool1.is_storable());
        assert!(!Type::ptr_to(Type::Int64).is_arithmetic());
    }
}
