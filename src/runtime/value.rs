use std::fmt;

use crate::compiler::ir::Type;
use crate::error::{Error, Result};

/// Argument or return value of a compiled function
///
/// Buffers are borrowed from the caller for the duration of the call; the
/// compiled code reads them in place and never frees or resizes them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    /// 64-bit integer value
    Int(i64),
    /// 64-bit floating-point value
    Float(f64),
    /// Caller-owned buffer passed as `list[int]`
    IntBuffer(&'a [i64]),
    /// Caller-owned buffer passed as `list[float]`
    FloatBuffer(&'a [f64]),
}

impl<'a> Value<'a> {
    /// IR type this value is passed as
    pub fn ty(&self) -> Type {
        match self {
            Value::Int(_) => Type::Int64,
            Value::Float(_) => Type::Float64,
            Value::IntBuffer(_) => Type::ptr_to(Type::Int64),
            Value::FloatBuffer(_) => Type::ptr_to(Type::Float64),
        }
    }

    /// Returns the type name as a string
    pub fn type_name(&self) -> String {
        self.ty().to_string()
    }

    /// Converts value to a 64-bit integer
    pub fn as_int(&self) -> Result<i64> {
        match self {
            Value::Int(n) => Ok(*n),
            _ => Err(Error::type_mismatch("value", Type::Int64, self.ty())),
        }
    }

    /// Converts value to a 64-bit floating-point number
    pub fn as_float(&self) -> Result<f64> {
        match self {
            Value::Float(f) => Ok(*f),
            _ => Err(Error::type_mismatch("value", Type::Float64, self.ty())),
        }
    }

    /// Raw 64-bit word passed through the invocation trampoline
    pub(crate) fn to_bits(self) -> u64 {
        match self {
            Value::Int(n) => n as u64,
            Value::Float(f) => f.to_bits(),
            Value::IntBuffer(data) => data.as_ptr() as usize as u64,
            Value::FloatBuffer(data) => data.as_ptr() as usize as u64,
        }
    }

    /// Decode a returned word; only scalars come back from compiled code
    pub(crate) fn from_bits(ty: &Type, bits: u64) -> Result<Value<'static>> {
        match ty {
            Type::Int64 => Ok(Value::Int(bits as i64)),
            Type::Float64 => Ok(Value::Float(f64::from_bits(bits))),
            other => Err(Error::type_mismatch("return value", "i64 or f64", other)),
        }
    }
}

impl From<i64> for Value<'_> {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value<'_> {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl<'a> From<&'a [i64]> for Value<'a> {
    fn from(data: &'a [i64]) -> Self {
        Value::IntBuffer(data)
    }
}

impl<'a> From<&'a [f64]> for Value<'a> {
    fn from(data: &'a [f64]) -> Self {
        Value::FloatBuffer(data)
    }
}

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(fl) => write!(f, "{:?}", fl),
            Value::IntBuffer(data) => write!(f, "<list[int] of {}>", data.len()),
            Value::FloatBuffer(data) => write!(f, "<list[float] of {}>", data.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Int(42).type_name(), "i64");
        assert_eq!(Value::Float(2.5).type_name(), "f64");
        let data = [1.0, 2.0];
        assert_eq!(Value::from(&data[..]).type_name(), "ptr<f64>");
    }

    #[test]
    fn test_conversions() {
        assert_eq!(Value::Int(42).as_int().unwrap(), 42);
        assert!(Value::Int(42).as_float().is_err());
        assert_eq!(Value::Float(0.5).as_float().unwrap(), 0.5);
    }

    #[test]
    fn test_bits() {
        assert_eq!(Value::Int(-1).to_bits(), u64::MAX);
        assert_eq!(
            Value::from_bits(&Type::Float64, 1.5f64.to_bits()).unwrap(),
            Value::Float(1.5)
        );
        assert_eq!(
            Value::from_bits(&Type::Int64, u64::MAX).unwrap(),
            Value::Int(-1)
        );
        assert!(Value::from_bits(&Type::Bool1, 1).is_err());
    }
}
