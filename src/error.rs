//! Error types for the snakejit pipeline

use thiserror::Error;

/// Compilation and invocation errors
///
/// Every phase returns one of these instead of panicking. Only
/// [`Error::VerifierError`] signals a defect inside the compiler itself.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Front end
    /// Malformed source text
    ///
    /// **Triggered by:** bad indentation, an unexpected token, an unterminated
    /// bracket, an integer literal outside the `Int64` range
    /// **Example:** `def f(n: int) -> int` (missing `:` after the header)
    #[error("Parse error at line {line}, column {col}: {message}")]
    ParseError {
        /// Line number where error occurred (1-indexed)
        line: usize,
        /// Column number where error occurred (1-indexed)
        col: usize,
        /// Error description
        message: String,
    },

    /// Construct outside the compilable grammar
    ///
    /// **Triggered by:** `for` loops, comprehensions, keyword/default
    /// arguments, multiple assignment targets, nested definitions
    /// **Example:** `for i in range(n): ...`
    #[error("Unsupported construct at line {line}: {construct}")]
    UnsupportedConstruct {
        /// Description of the rejected construct
        construct: String,
        /// Line number where the construct starts
        line: usize,
    },

    /// Type mismatch or unsupported type annotation
    ///
    /// **Triggered by:** `1 + 1.0`, `def f(s: str)`, assigning a comparison
    /// **Prevention:** there is no implicit widening; convert operands explicitly
    #[error("Type error in {context}: expected {expected}, got {got}")]
    TypeError {
        /// Where the mismatch was found
        context: String,
        /// Expected type
        expected: String,
        /// Actual type
        got: String,
    },

    /// Reference to a name that is neither a local nor the function itself
    #[error("Unbound name: {name}")]
    UnboundName {
        /// The unresolved name
        name: String,
    },

    /// Wrong number of arguments
    ///
    /// Raised at compile time for self-calls and header mismatches, and at
    /// call time by [`crate::CompiledEntry::invoke`].
    #[error("Arity error in {context}: expected {expected} argument(s), got {got}")]
    ArityError {
        /// Call site or signature being checked
        context: String,
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        got: usize,
    },

    // Internal
    /// IR failed structural verification
    ///
    /// This is a defect in the IR builder, never a caller error.
    #[error("IR verification failed for module {module}: {errors}")]
    VerifierError {
        /// Module that failed verification
        module: String,
        /// Joined verifier diagnostics
        errors: String,
    },

    // Backend
    /// Native code generation or linking failed
    #[error("Backend error in module {module}: {message}")]
    BackendError {
        /// Module being compiled
        module: String,
        /// Message from the code generator, verbatim
        message: String,
    },

    // Reference interpreter
    /// Evaluation failed in the reference interpreter
    #[error("Runtime error: {0}")]
    RuntimeError(String),

    /// Evaluation step limit exceeded
    #[error("Execution limit exceeded (max: {limit} steps)")]
    ExecutionLimitExceeded {
        /// Maximum allowed steps
        limit: usize,
    },
}

/// Error severity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Internal invariant break; treat as an assertion failure
    Fatal,
    /// The request failed but the process may fix the input and retry
    Recoverable,
}

impl Error {
    /// Create a runtime error with a message
    pub fn runtime(msg: impl Into<String>) -> Self {
        Error::RuntimeError(msg.into())
    }

    /// Create an unsupported-construct error
    pub fn unsupported(construct: impl Into<String>, line: usize) -> Self {
        Error::UnsupportedConstruct {
            construct: construct.into(),
            line,
        }
    }

    /// Create a type error
    pub fn type_mismatch(
        context: impl Into<String>,
        expected: impl ToString,
        got: impl ToString,
    ) -> Self {
        Error::TypeError {
            context: context.into(),
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }

    /// Create a backend error for the named module
    pub fn backend(module: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Error::BackendError {
            module: module.into(),
            message: err.to_string(),
        }
    }

    /// Classify error severity
    pub fn classify(&self) -> ErrorSeverity {
        match self {
            Error::VerifierError { .. } => ErrorSeverity::Fatal,
            _ => ErrorSeverity::Recoverable,
        }
    }

    /// True when the error points at a compiler defect rather than the input
    pub fn is_internal(&self) -> bool {
        self.classify() == ErrorSeverity::Fatal
    }
}

/// Result type for snakejit operations
pub type Result<T> = std::result::Result<T, Error>;
