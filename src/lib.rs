//! # snakejit - a JIT compiler for annotated numeric functions
//!
//! Compiles the source text of a single annotated function (integer and
//! float arithmetic, `while`, `if`/`elif`/`else`, self-recursion, reads from
//! caller-owned buffers) to native code through a verified basic-block IR
//! and the Cranelift JIT.
//!
//! ## Quick Start
//!
//! ```no_run
//! use snakejit::{CompileOptions, FunctionDescriptor, Jit, Value};
//!
//! # fn main() -> snakejit::Result<()> {
//! let source = r#"
//! def fib(n: int) -> int:
//!     a = 1
//!     b = 1
//!     while n > 0:
//!         tmp = a + b
//!         a = b
//!         b = tmp
//!         n = n - 1
//!     return b
//! "#;
//!
//! let jit = Jit::new(CompileOptions::default())?;
//! let fib = jit.compile(&FunctionDescriptor::from_source(source)?)?;
//! assert_eq!(fib.invoke(&[Value::Int(9)])?, Value::Int(89));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Descriptor → Signature → AST → Slot Types → IR → Verify → Backend → CompiledEntry
//! ```
//!
//! ### Main Components
//!
//! - [`FunctionDescriptor`] - Name, annotated parameters and source of one function
//! - [`parser`] - Indentation-aware scanner and recursive-descent parser
//! - [`compiler::signature`] - Annotation text to IR types
//! - [`compiler::types`] - Slot type inference
//! - [`compiler::ir`] - Basic-block IR and the AST lowering
//! - [`compiler::verifier`] - Structural IR checks
//! - [`compiler::backend`] - Backend trait and the Cranelift implementation
//! - [`Interpreter`] - Reference evaluator with the same semantics
//!
//! ## Supported Types
//!
//! | Annotation | IR type | Passed as |
//! |------------|---------|-----------|
//! | `int` | `i64` | [`Value::Int`] |
//! | `float` | `f64` | [`Value::Float`] |
//! | `list[int]` | `ptr<i64>` | [`Value::IntBuffer`] |
//! | `list[float]` | `ptr<f64>` | [`Value::FloatBuffer`] |
//!
//! Buffers are parameters only; return types are `int` or `float`.
//!
//! ## Error Handling
//!
//! Every phase returns a typed [`Error`]; nothing partial or ill-typed ever
//! reaches the backend:
//!
//! ```
//! use snakejit::{Compiler, Error, FunctionDescriptor};
//!
//! let desc = FunctionDescriptor::new("f", "def f(a: int) -> int:\n    return a + 1.0\n")
//!     .param("a", "int")
//!     .returns("int");
//! let err = Compiler::default().lower(&desc).unwrap_err();
//! assert!(matches!(err, Error::TypeError { .. }));
//! ```
//!
//! ## Logging
//!
//! Phases emit `tracing` events (`debug` per phase, `trace` for IR text).
//! The library installs no subscriber.

#![warn(missing_docs)]

/// Version of the snakejit compiler
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod compiler;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod runtime;

// Re-export main types
pub use compiler::ir::{Module, Type};
pub use compiler::{
    invoke, Backend, CompileOptions, CompiledEntry, Compiler, CraneliftBackend,
    FunctionDescriptor, Jit, ParameterDescriptor,
};
pub use error::{Error, ErrorSeverity, Result};
pub use runtime::{Interpreter, Value};
