//! Runtime values and the reference interpreter

mod environment;
pub mod interpreter;
mod value;

pub use environment::Environment;
pub use interpreter::Interpreter;
pub use value::Value;
