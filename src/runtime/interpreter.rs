//! Reference interpreter
//!
//! Walks the AST of a function that the compiler accepts, with the same
//! semantics as the native code: wrapping `Int64` arithmetic, IEEE `Float64`
//! arithmetic, signed integer and ordered float comparisons, self-recursion
//! and buffer reads. Unlike native code it bounds-checks subscripts and
//! reports reads of unassigned locals.

use crate::compiler::signature::{self, ResolvedSignature};
use crate::compiler::{CompileOptions, Compiler, FunctionDescriptor};
use crate::error::{Error, Result};
use crate::parser::{self, BinaryOp, CompareOp, Expression, FunctionDef, Statement};
use crate::runtime::{Environment, Value};
use tracing::trace;

/// Default bound on executed statements and calls
pub const DEFAULT_STEP_LIMIT: usize = 10_000_000;

/// Default bound on self-recursion depth
pub const DEFAULT_DEPTH_LIMIT: usize = 256;

enum Flow {
    Next,
    Return(Value<'static>),
}

struct Budget {
    steps: usize,
    limit: usize,
}

impl Budget {
    fn tick(&mut self) -> Result<()> {
        self.steps += 1;
        if self.steps > self.limit {
            return Err(Error::ExecutionLimitExceeded { limit: self.limit });
        }
        Ok(())
    }
}

/// Evaluates one function directly from its AST
#[derive(Debug, Clone)]
pub struct Interpreter {
    def: FunctionDef,
    sig: ResolvedSignature,
    step_limit: usize,
    depth_limit: usize,
}

impl Interpreter {
    /// Creates an interpreter for an already checked function
    pub fn new(def: FunctionDef, sig: ResolvedSignature) -> Self {
        Self {
            def,
            sig,
            step_limit: DEFAULT_STEP_LIMIT,
            depth_limit: DEFAULT_DEPTH_LIMIT,
        }
    }

    /// Creates an interpreter for exactly the functions the compiler accepts
    pub fn from_descriptor(desc: &FunctionDescriptor) -> Result<Self> {
        Compiler::new(CompileOptions::default()).lower(desc)?;
        let sig = signature::resolve(desc)?;
        let def = parser::parse_function(&desc.source)?;
        Ok(Self::new(def, sig))
    }

    /// Sets the step limit
    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit;
        self
    }

    /// Sets the recursion depth limit
    pub fn with_depth_limit(mut self, limit: usize) -> Self {
        self.depth_limit = limit;
        self
    }

    /// Evaluate the function for positional arguments
    pub fn call(&self, args: &[Value<'_>]) -> Result<Value<'static>> {
        if args.len() != self.sig.arity() {
            return Err(Error::ArityError {
                context: format!("call to `{}`", self.def.name),
                expected: self.sig.arity(),
                got: args.len(),
            });
        }
        for (index, (arg, (_, ty))) in args.iter().zip(&self.sig.params).enumerate() {
            if arg.ty() != *ty {
                return Err(Error::type_mismatch(
                    format!("argument {} of `{}`", index, self.def.name),
                    ty,
                    arg.ty(),
                ));
            }
        }

        let mut budget = Budget {
            steps: 0,
            limit: self.step_limit,
        };
        let result = self.call_frame(args, &mut budget, 0)?;
        trace!(function = %self.def.name, steps = budget.steps, "interpreted call");
        Ok(result)
    }

    fn call_frame<'a>(
        &self,
        args: &[Value<'a>],
        budget: &mut Budget,
        depth: usize,
    ) -> Result<Value<'static>> {
        if depth > self.depth_limit {
            return Err(Error::runtime(format!(
                "recursion depth limit {} exceeded in `{}`",
                self.depth_limit, self.def.name
            )));
        }
        budget.tick()?;

        let names = self.sig.params.iter().map(|(name, _)| name.as_str());
        let mut env = Environment::with_params(names, args);
        match self.exec_block(&self.def.body, &mut env, budget, depth)? {
            Flow::Return(value) => Ok(value),
            Flow::Next => Err(Error::runtime(format!(
                "`{}` reached the end of its body without returning",
                self.def.name
            ))),
        }
    }

    fn exec_block<'a>(
        &self,
        stmts: &[Statement],
        env: &mut Environment<'a>,
        budget: &mut Budget,
        depth: usize,
    ) -> Result<Flow> {
        for stmt in stmts {
            if let Flow::Return(value) = self.exec(stmt, env, budget, depth)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Next)
    }

    fn exec<'a>(
        &self,
        stmt: &Statement,
        env: &mut Environment<'a>,
        budget: &mut Budget,
        depth: usize,
    ) -> Result<Flow> {
        budget.tick()?;
        match stmt {
            Statement::Assign { name, value, .. } => {
                let value = self.eval(value, env, budget, depth)?;
                env.set(name, value);
                Ok(Flow::Next)
            }
            Statement::Return { value: Some(value), .. } => {
                let value = self.eval(value, env, budget, depth)?;
                Ok(Flow::Return(scalar(value)?))
            }
            Statement::Return { value: None, .. } => Err(Error::type_mismatch(
                format!("return of `{}`", self.def.name),
                &self.sig.ret,
                "nothing",
            )),
            Statement::While { condition, body } => {
                while self.eval_condition(condition, env, budget, depth)? {
                    if let Flow::Return(value) = self.exec_block(body, env, budget, depth)? {
                        return Ok(Flow::Return(value));
                    }
                    budget.tick()?;
                }
                Ok(Flow::Next)
            }
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval_condition(condition, env, budget, depth)? {
                    self.exec_block(then_branch, env, budget, depth)
                } else {
                    self.exec_block(else_branch, env, budget, depth)
                }
            }
        }
    }

    fn eval_condition<'a>(
        &self,
        expr: &Expression,
        env: &mut Environment<'a>,
        budget: &mut Budget,
        depth: usize,
    ) -> Result<bool> {
        let Expression::Compare { op, left, right } = expr else {
            let value = self.eval(expr, env, budget, depth)?;
            return Err(Error::type_mismatch("condition", "i1", value.ty()));
        };
        let lhs = self.eval(left, env, budget, depth)?;
        let rhs = self.eval(right, env, budget, depth)?;
        match (lhs, rhs) {
            (Value::Int(l), Value::Int(r)) => Ok(match op {
                CompareOp::Lt => l < r,
                CompareOp::Le => l <= r,
                CompareOp::Gt => l > r,
                CompareOp::Ge => l >= r,
                CompareOp::Eq => l == r,
                CompareOp::Ne => l != r,
            }),
            // NaN compares false except under `!=`
            (Value::Float(l), Value::Float(r)) => Ok(match op {
                CompareOp::Lt => l < r,
                CompareOp::Le => l <= r,
                CompareOp::Gt => l > r,
                CompareOp::Ge => l >= r,
                CompareOp::Eq => l == r,
                CompareOp::Ne => l != r,
            }),
            (l, r) => Err(Error::type_mismatch(
                format!("operands of `{}`", op),
                l.ty(),
                r.ty(),
            )),
        }
    }

    fn eval<'a>(
        &self,
        expr: &Expression,
        env: &mut Environment<'a>,
        budget: &mut Budget,
        depth: usize,
    ) -> Result<Value<'a>> {
        match expr {
            Expression::Name(name) => env.get(name),
            Expression::IntLiteral(n) => Ok(Value::Int(*n)),
            Expression::FloatLiteral(f) => Ok(Value::Float(*f)),
            Expression::Binary { op, left, right } => {
                let lhs = self.eval(left, env, budget, depth)?;
                let rhs = self.eval(right, env, budget, depth)?;
                match (op, lhs, rhs) {
                    (BinaryOp::Add, Value::Int(l), Value::Int(r)) => Ok(Value::Int(l.wrapping_add(r))),
                    (BinaryOp::Sub, Value::Int(l), Value::Int(r)) => Ok(Value::Int(l.wrapping_sub(r))),
                    (BinaryOp::Add, Value::Float(l), Value::Float(r)) => Ok(Value::Float(l + r)),
                    (BinaryOp::Sub, Value::Float(l), Value::Float(r)) => Ok(Value::Float(l - r)),
                    (_, l, r) => Err(Error::type_mismatch(
                        format!("operands of `{}`", op),
                        l.ty(),
                        r.ty(),
                    )),
                }
            }
            Expression::Compare { .. } => Err(Error::type_mismatch("value", "i64 or f64", "i1")),
            Expression::Call { callee, args } => {
                if *callee != self.def.name {
                    return Err(Error::UnboundName {
                        name: callee.clone(),
                    });
                }
                if args.len() != self.sig.arity() {
                    return Err(Error::ArityError {
                        context: format!("call to `{}`", callee),
                        expected: self.sig.arity(),
                        got: args.len(),
                    });
                }
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, env, budget, depth)?);
                }
                let result = self.call_frame(&values, budget, depth + 1)?;
                Ok(result)
            }
            Expression::Subscript { base, index } => {
                let base = self.eval(base, env, budget, depth)?;
                let index = self.eval(index, env, budget, depth)?.as_int()?;
                match base {
                    Value::IntBuffer(data) => element(data, index).map(Value::Int),
                    Value::FloatBuffer(data) => element(data, index).map(Value::Float),
                    other => Err(Error::type_mismatch("subscript base", "pointer", other.ty())),
                }
            }
        }
    }
}

fn element<T: Copy>(data: &[T], index: i64) -> Result<T> {
    usize::try_from(index)
        .ok()
        .and_then(|i| data.get(i).copied())
        .ok_or_else(|| {
            Error::runtime(format!(
                "index {} out of bounds for buffer of length {}",
                index,
                data.len()
            ))
        })
}

fn scalar(value: Value<'_>) -> Result<Value<'static>> {
    match value {
        Value::Int(n) => Ok(Value::Int(n)),
        Value::Float(f) => Ok(Value::Float(f)),
        other => Err(Error::type_mismatch("return value", "i64 or f64", other.ty())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interp(source: &str) -> Interpreter {
        let desc = FunctionDescriptor::from_source(source).unwrap();
        Interpreter::from_descriptor(&desc).unwrap()
    }

    #[test]
    fn test_iterative_fib() {
        let fib = interp(
            "def fib(n: int) -> int:\n    a = 1\n    b = 1\n    while n > 0:\n        tmp = a + b\n        a = b\n        b = tmp\n        n = n - 1\n    return b\n",
        );
        let got: Vec<i64> = (0..10)
            .map(|n| fib.call(&[Value::Int(n)]).unwrap().as_int().unwrap())
            .collect();
        assert_eq!(got, vec![1, 2, 3, 5, 8, 13, 21, 34, 55, 89]);
    }

    #[test]
    fn test_wrapping_add() {
        let add = interp("def add(a: int, b: int) -> int:\n    return a + b\n");
        assert_eq!(
            add.call(&[Value::Int(i64::MAX), Value::Int(1)]).unwrap(),
            Value::Int(i64::MIN)
        );
    }

    #[test]
    fn test_buffer_reads() {
        let sum = interp(
            "def sum(n: int, data: list[float]) -> float:\n    i = 0\n    acc = 0.0\n    while i < n:\n        acc = acc + data[i]\n        i = i + 1\n    return acc\n",
        );
        let data = [1.5, 2.5, 4.0];
        assert_eq!(
            sum.call(&[Value::Int(3), Value::from(&data[..])]).unwrap(),
            Value::Float(8.0)
        );
        assert!(matches!(
            sum.call(&[Value::Int(4), Value::from(&data[..])]),
            Err(Error::RuntimeError(_))
        ));
    }

    #[test]
    fn test_unassigned_local_is_runtime_error() {
        let f = interp(
            "def f(n: int) -> int:\n    if n > 0:\n        x = 1\n    return x\n",
        );
        assert_eq!(f.call(&[Value::Int(1)]).unwrap(), Value::Int(1));
        assert!(matches!(f.call(&[Value::Int(0)]), Err(Error::RuntimeError(_))));
    }

    #[test]
    fn test_reaching_the_end_is_runtime_error() {
        let f = interp("def f(n: int) -> int:\n    while 1 > 0:\n        if n > 3:\n            return n\n        n = n + 1\n");
        assert_eq!(f.call(&[Value::Int(0)]).unwrap(), Value::Int(4));

        let g = interp("def g(n: int) -> int:\n    if n > 0:\n        return n\n");
        assert!(matches!(g.call(&[Value::Int(0)]), Err(Error::RuntimeError(_))));
    }

    #[test]
    fn test_step_limit() {
        let spin = interp(
            "def spin(n: int) -> int:\n    while n == n:\n        n = n + 1\n    return n\n",
        )
        .with_step_limit(1_000);
        assert_eq!(
            spin.call(&[Value::Int(0)]),
            Err(Error::ExecutionLimitExceeded { limit: 1_000 })
        );
    }

    #[test]
    fn test_argument_checks() {
        let add = interp("def add(a: int, b: int) -> int:\n    return a + b\n");
        assert!(matches!(
            add.call(&[Value::Int(1)]),
            Err(Error::ArityError { expected: 2, got: 1, .. })
        ));
        assert!(matches!(
            add.call(&[Value::Int(1), Value::Float(1.0)]),
            Err(Error::TypeError { .. })
        ));
    }
}
