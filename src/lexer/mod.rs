//! Lexical analysis for function source text
//!
//! Converts source text into a stream of tokens with explicit layout
//! (`Newline`, `Indent`, `Dedent`) so the parser never looks at whitespace.

mod scanner;
mod token;

pub use scanner::Scanner;
pub use token::{Token, TokenKind};
