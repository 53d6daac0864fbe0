//! # Local Type Inference
//!
//! Every local lives in one hoisted slot with a single fixed type. Parameters
//! take their declared type; every other local takes the type of the first
//! assignment (in source order) whose right-hand side can be typed from names
//! already known. Passes repeat until nothing changes, so a local may be
//! typed from a local assigned later in the source.

use super::ir::Type;
use super::signature::ResolvedSignature;
use crate::error::{Error, Result};
use crate::parser::{Expression, FunctionDef, Statement};
use std::collections::{HashMap, HashSet};

/// Slot types in slot order: parameters first, then locals by first assignment
#[derive(Debug, Clone, Default)]
pub struct TypeEnv {
    types: HashMap<String, Type>,
    order: Vec<String>,
}

impl TypeEnv {
    /// Creates an empty environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a name; redefinitions keep the first type
    pub fn define(&mut self, name: &str, ty: Type) {
        if !self.types.contains_key(name) {
            self.types.insert(name.to_string(), ty);
            self.order.push(name.to_string());
        }
    }

    /// Look up a name's type
    pub fn lookup(&self, name: &str) -> Option<&Type> {
        self.types.get(name)
    }

    /// Number of defined names
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True when nothing is defined
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Names and types in definition order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Type)> {
        self.order
            .iter()
            .filter_map(|name| self.types.get(name).map(|ty| (name.as_str(), ty)))
    }
}

/// Infers slot types for one function
pub struct TypeChecker<'a> {
    def: &'a FunctionDef,
    sig: &'a ResolvedSignature,
    assigned: HashSet<String>,
}

impl<'a> TypeChecker<'a> {
    /// Creates a checker for `def` with its resolved signature
    pub fn new(def: &'a FunctionDef, sig: &'a ResolvedSignature) -> Self {
        Self {
            def,
            sig,
            assigned: def.assigned_names().into_iter().collect(),
        }
    }

    /// Compute the type of every slot
    pub fn infer_slots(&self) -> Result<TypeEnv> {
        let mut env = TypeEnv::new();
        for (name, ty) in &self.sig.params {
            env.define(name, ty.clone());
        }

        let mut assignments = Vec::new();
        collect_assignments(&self.def.body, &mut assignments);

        loop {
            let mut changed = false;
            for (name, value) in &assignments {
                if env.lookup(name).is_some() {
                    continue;
                }
                if let Some(ty) = self.expr_type(value, &env)? {
                    if !ty.is_storable() {
                        return Err(Error::type_mismatch(
                            format!("assignment to `{}`", name),
                            "i64, f64 or pointer",
                            ty,
                        ));
                    }
                    env.define(name, ty);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        for name in self.def.assigned_names() {
            if env.lookup(&name).is_none() {
                return Err(Error::type_mismatch(
                    format!("local `{}`", name),
                    "an assignment with an inferable type",
                    "only self-referential assignments",
                ));
            }
        }

        tracing::trace!(
            function = %self.def.name,
            slots = env.len(),
            "inferred slot types"
        );
        Ok(env)
    }

    /// Type of an expression, or `None` when it depends on an untyped local
    pub fn expr_type(&self, expr: &Expression, env: &TypeEnv) -> Result<Option<Type>> {
        match expr {
            Expression::Name(name) => match env.lookup(name) {
                Some(ty) => Ok(Some(ty.clone())),
                None if self.assigned.contains(name) => Ok(None),
                None => Err(Error::UnboundName { name: name.clone() }),
            },
            Expression::IntLiteral(_) => Ok(Some(Type::Int64)),
            Expression::FloatLiteral(_) => Ok(Some(Type::Float64)),
            Expression::Binary { op, left, right } => {
                let lhs = self.expr_type(left, env)?;
                let rhs = self.expr_type(right, env)?;
                match (lhs, rhs) {
                    (Some(l), Some(r)) if l != r => Err(Error::type_mismatch(
                        format!("operands of `{}`", op),
                        l,
                        r,
                    )),
                    (Some(ty), _) | (None, Some(ty)) => {
                        if ty.is_arithmetic() {
                            Ok(Some(ty))
                        } else {
                            Err(Error::type_mismatch(
                                format!("operand of `{}`", op),
                                "i64 or f64",
                                ty,
                            ))
                        }
                    }
                    (None, None) => Ok(None),
                }
            }
            Expression::Compare { .. } => Ok(Some(Type::Bool1)),
            Expression::Call { callee, .. } => {
                if *callee == self.def.name {
                    Ok(Some(self.sig.ret.clone()))
                } else {
                    Err(Error::UnboundName {
                        name: callee.clone(),
                    })
                }
            }
            Expression::Subscript { base, .. } => match self.expr_type(base, env)? {
                Some(Type::Ptr(elem)) => Ok(Some(*elem)),
                Some(other) => Err(Error::type_mismatch("subscript base", "pointer", other)),
                None => Ok(None),
            },
        }
    }
}

fn collect_assignments<'s>(stmts: &'s [Statement], out: &mut Vec<(&'s str, &'s Expression)>) {
    for stmt in stmts {
        match stmt {
            Statement::Assign { name, value, .. } => out.push((name.as_str(), value)),
            Statement::Return { .. } => {}
            Statement::While { body, .. } => collect_assignments(body, out),
            Statement::If {
                then_branch,
                else_branch,
                ..
            } => {
                collect_assignments(then_branch, out);
                collect_assignments(else_branch, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_function;

    fn infer(source: &str, params: &[(&str, Type)], ret: Type) -> Result<TypeEnv> {
        let def = parse_function(source)?;
        let sig = ResolvedSignature {
            params: params
                .iter()
                .map(|(n, t)| (n.to_string(), t.clone()))
                .collect(),
            ret,
        };
        TypeChecker::new(&def, &sig).infer_slots()
    }

    #[test]
    fn test_slot_order_and_types() {
        let env = infer(
            "def f(n: int, x: float) -> float:\n    acc = x\n    i = 0\n    return acc\n",
            &[("n", Type::Int64), ("x", Type::Float64)],
            Type::Float64,
        )
        .unwrap();
        let slots: Vec<_> = env.iter().map(|(n, t)| (n.to_string(), t.clone())).collect();
        assert_eq!(
            slots,
            vec![
                ("n".to_string(), Type::Int64),
                ("x".to_string(), Type::Float64),
                ("acc".to_string(), Type::Float64),
                ("i".to_string(), Type::Int64),
            ]
        );
    }

    #[test]
    fn test_forward_reference_reaches_fixpoint() {
        let source = "def f(n: int) -> int:\n    while n > 0:\n        a = b\n        b = n\n        n = n - 1\n    return n\n";
        let env = infer(source, &[("n", Type::Int64)], Type::Int64).unwrap();
        assert_eq!(env.lookup("a"), Some(&Type::Int64));
        assert_eq!(env.lookup("b"), Some(&Type::Int64));
    }

    #[test]
    fn test_self_reference_with_literal() {
        let env = infer(
            "def f(n: int) -> int:\n    s = s + 1\n    return s\n",
            &[("n", Type::Int64)],
            Type::Int64,
        )
        .unwrap();
        assert_eq!(env.lookup("s"), Some(&Type::Int64));
    }

    #[test]
    fn test_uninferable_local() {
        let err = infer(
            "def f(n: int) -> int:\n    s = s\n    return n\n",
            &[("n", Type::Int64)],
            Type::Int64,
        )
        .unwrap_err();
        assert!(matches!(err, Error::TypeError { .. }));
    }

    #[test]
    fn test_comparison_cannot_be_stored() {
        let err = infer(
            "def f(n: int) -> int:\n    c = n < 1\n    return n\n",
            &[("n", Type::Int64)],
            Type::Int64,
        )
        .unwrap_err();
        assert!(matches!(err, Error::TypeError { ref got, .. } if got == "i1"));
    }

    #[test]
    fn test_subscript_element_type() {
        let env = infer(
            "def f(xs: list[float]) -> float:\n    y = xs[0]\n    return y\n",
            &[("xs", Type::ptr_to(Type::Float64))],
            Type::Float64,
        )
        .unwrap();
        assert_eq!(env.lookup("y"), Some(&Type::Float64));
    }

    #[test]
    fn test_unbound_callee() {
        let err = infer(
            "def f(n: int) -> int:\n    y = g(n)\n    return y\n",
            &[("n", Type::Int64)],
            Type::Int64,
        )
        .unwrap_err();
        assert_eq!(
            err,
            Error::UnboundName {
                name: "g".to_string()
            }
        );
    }
}
