//! # snakejit Compiler - annotated functions to native code
//!
//! This module compiles the source text of one annotated function into a
//! verified basic-block IR module and hands it to a native backend.
//!
//! ## Architecture
//!
//! ```text
//! Descriptor → Signature → AST → Slot Types → IR → Verify → Backend → CompiledEntry
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use snakejit::{CompileOptions, FunctionDescriptor, Jit, Value};
//!
//! # fn main() -> snakejit::Result<()> {
//! let jit = Jit::new(CompileOptions::default())?;
//! let add = FunctionDescriptor::from_source("def add(a: int, b: int) -> int:\n    return a + b\n")?;
//! let entry = jit.compile(&add)?;
//! assert_eq!(entry.invoke(&[Value::Int(1), Value::Int(2)])?, Value::Int(3));
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod descriptor;
pub mod ir;
pub mod signature;
pub mod types;
pub mod verifier;

pub use backend::{invoke, Backend, CodeRegion, CompiledEntry, CraneliftBackend, ModuleHandle};
pub use descriptor::{FunctionDescriptor, ParameterDescriptor};
pub use ir::{IrBuilder, Module};
pub use signature::{AnnotationPosition, ResolvedSignature};
pub use types::{TypeChecker, TypeEnv};
pub use verifier::{ModuleStats, Verifier, VerifyError, VerifyResult};

use crate::error::Result;
use crate::parser;
use parking_lot::Mutex;
use tracing::{debug, trace};

/// Compilation options
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Optimization level forwarded to the backend (0 = none, 1 = speed, 2+ = speed and size)
    pub opt_level: u8,
    /// Log the IR text and keep it on the compiled entry
    pub dump_ir: bool,
    /// Run the backend's own IR verifier
    pub verify_backend_ir: bool,
    /// Reject functions whose body can reach its end without a `return`
    ///
    /// Off by default: a reachable end traps at run time, which admits
    /// loops that only exit through `return`.
    pub require_return: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            opt_level: 2,
            dump_ir: false,
            verify_backend_ir: true,
            require_return: false,
        }
    }
}

/// Front end and middle end: descriptor to verified IR
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: CompileOptions,
}

impl Compiler {
    /// Create a new compiler with options
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    /// Options this compiler was built with
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Run every phase up to and including verification
    ///
    /// An ill-typed or malformed function never yields a module, so nothing
    /// partial can reach a backend.
    pub fn lower(&self, desc: &FunctionDescriptor) -> Result<Module> {
        // Phase 1: Resolve the signature
        let sig = signature::resolve(desc)?;
        debug!(function = %desc.name, arity = sig.arity(), "resolved signature");

        // Phase 2: Parse
        let def = parser::parse_function(&desc.source)?;
        signature::check_header(&def, &desc.name, &sig)?;
        debug!(function = %def.name, statements = def.body.len(), "parsed function");

        // Phase 3: Infer slot types
        let env = TypeChecker::new(&def, &sig).infer_slots()?;

        // Phase 4: Lower to IR
        let module = IrBuilder::new(&def, &sig)
            .require_return(self.options.require_return)
            .build(&env)?;

        // Phase 5: Verify
        Verifier::new().check(&module)?;
        trace!(ir = %module, "verified IR");

        Ok(module)
    }
}

/// Compiler plus a backend context
///
/// The backend is shared state, so every `compile` call takes its lock.
/// Entries it returns are independent of it and may be invoked from any
/// thread while further functions compile.
pub struct Jit<B: Backend = CraneliftBackend> {
    compiler: Compiler,
    backend: Mutex<B>,
}

impl Jit<CraneliftBackend> {
    /// Create a JIT targeting the host machine through Cranelift
    pub fn new(options: CompileOptions) -> Result<Self> {
        let backend = CraneliftBackend::new(&options)?;
        Ok(Self::with_backend(options, backend))
    }
}

impl<B: Backend> Jit<B> {
    /// Create a JIT around an existing backend
    pub fn with_backend(options: CompileOptions, backend: B) -> Self {
        Self {
            compiler: Compiler::new(options),
            backend: Mutex::new(backend),
        }
    }

    /// The front end in use
    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }

    /// Compile one function to native code
    pub fn compile(&self, desc: &FunctionDescriptor) -> Result<CompiledEntry> {
        let module = self.compiler.lower(desc)?;

        let ir_text = if self.compiler.options.dump_ir {
            let text = module.to_string();
            debug!(module = %module.name, ir = %text, "IR dump");
            Some(text)
        } else {
            None
        };

        let entry = self.backend.lock().compile(module)?;
        Ok(match ir_text {
            Some(text) => entry.with_ir_text(text),
            None => entry,
        })
    }

    /// Compile a function whose descriptor is taken from its own `def` header
    pub fn compile_source(&self, source: &str) -> Result<CompiledEntry> {
        let desc = FunctionDescriptor::from_source(source)?;
        self.compile(&desc)
    }

    /// Consume the JIT and return its backend
    pub fn into_backend(self) -> B {
        self.backend.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn desc(source: &str) -> FunctionDescriptor {
        FunctionDescriptor::from_source(source).unwrap()
    }

    #[test]
    fn test_lower_produces_verified_module() {
        let module = Compiler::default()
            .lower(&desc("def add(a: int, b: int) -> int:\n    return a + b\n"))
            .unwrap();
        assert_eq!(module.function.name, "add");
        assert!(Verifier::new().strict().verify(&module).valid);
    }

    #[test]
    fn test_phase_errors_surface_typed() {
        let compiler = Compiler::default();
        let cases = [
            (
                "def f(a: int) -> int:\n    for i in a:\n        return i\n",
                "unsupported",
            ),
            ("def f(a: int) -> int:\n    return a + 1.0\n", "type"),
            ("def f(a: int) -> int:\n    return g(a)\n", "unbound"),
            ("def f(a: int) -> int:\n    return f(a, a)\n", "arity"),
            ("def f(a: int) -> int\n    return a\n", "parse"),
        ];
        for (source, kind) in cases {
            let err = compiler
                .lower(&FunctionDescriptor::new("f", source).param("a", "int").returns("int"))
                .unwrap_err();
            let matched = match kind {
                "unsupported" => matches!(err, Error::UnsupportedConstruct { .. }),
                "type" => matches!(err, Error::TypeError { .. }),
                "unbound" => matches!(err, Error::UnboundName { .. }),
                "arity" => matches!(err, Error::ArityError { .. }),
                _ => matches!(err, Error::ParseError { .. }),
            };
            assert!(matched, "{}: unexpected {:?}", kind, err);
        }
    }

    #[test]
    fn test_default_options() {
        let options = CompileOptions::default();
        assert_eq!(options.opt_level, 2);
        assert!(!options.dump_ir);
        assert!(!options.require_return);
    }

    #[test]
    fn test_require_return_option() {
        let source = "def f(n: int) -> int:\n    while n > 0:\n        return n\n";
        assert!(Compiler::default().lower(&desc(source)).is_ok());

        let strict = Compiler::new(CompileOptions {
            require_return: true,
            ..CompileOptions::default()
        });
        assert!(matches!(
            strict.lower(&desc(source)),
            Err(Error::TypeError { .. })
        ));
    }
}
