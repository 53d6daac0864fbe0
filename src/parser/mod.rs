//! Function parser
//!
//! Parses one annotated function definition into an abstract syntax tree.

mod ast;
mod function_parser;

pub use ast::{Annotation, BinaryOp, CompareOp, Expression, FunctionDef, Param, Statement};
pub use function_parser::FunctionParser;

use crate::error::Result;
use crate::lexer::Scanner;

/// Scan and parse a complete function definition
pub fn parse_function(source: &str) -> Result<FunctionDef> {
    let tokens = Scanner::new(source).scan_tokens()?;
    FunctionParser::new(tokens).parse()
}

/// Scan and parse only the `def` header of a function
pub fn parse_header(source: &str) -> Result<FunctionDef> {
    let tokens = Scanner::new(source).scan_tokens()?;
    FunctionParser::new(tokens).parse_header()
}

/// Parse annotation text such as `int` or `list[float]`
pub fn parse_annotation(text: &str) -> Result<Annotation> {
    let tokens = Scanner::new(text).scan_tokens()?;
    FunctionParser::new(tokens).parse_annotation_only()
}
