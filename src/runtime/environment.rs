use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::runtime::Value;

/// Locals of one interpreted call
///
/// Every local has function scope, mirroring the hoisted slots of the
/// compiled code. A name is absent until its first assignment executes.
#[derive(Debug, Clone, Default)]
pub struct Environment<'a> {
    variables: HashMap<String, Value<'a>>,
}

impl<'a> Environment<'a> {
    /// Creates an empty environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds parameters positionally
    pub fn with_params<'n>(
        names: impl IntoIterator<Item = &'n str>,
        args: &[Value<'a>],
    ) -> Self {
        let variables = names
            .into_iter()
            .zip(args.iter().copied())
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        Environment { variables }
    }

    /// Assigns a local, replacing any previous value
    pub fn set(&mut self, name: &str, value: Value<'a>) {
        self.variables.insert(name.to_string(), value);
    }

    /// Reads a local
    ///
    /// Reading before the first assignment is a runtime error; compiled code
    /// would read an uninitialized slot instead.
    pub fn get(&self, name: &str) -> Result<Value<'a>> {
        self.variables.get(name).copied().ok_or_else(|| {
            Error::runtime(format!("local `{}` read before assignment", name))
        })
    }

    /// Whether a local has been assigned
    pub fn is_assigned(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_and_assignment() {
        let mut env = Environment::with_params(["a", "b"], &[Value::Int(1), Value::Float(2.0)]);
        assert_eq!(env.get("a").unwrap(), Value::Int(1));
        assert_eq!(env.get("b").unwrap(), Value::Float(2.0));

        env.set("a", Value::Int(5));
        assert_eq!(env.get("a").unwrap(), Value::Int(5));
    }

    #[test]
    fn test_unassigned_read() {
        let env = Environment::new();
        assert!(!env.is_assigned("x"));
        assert!(matches!(env.get("x"), Err(Error::RuntimeError(_))));
    }
}
