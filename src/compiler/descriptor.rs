//! Function descriptors supplied by the host

use crate::error::Result;
use crate::parser;
use serde::{Deserialize, Serialize};

/// One positional parameter as described by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    /// Parameter name
    pub name: String,
    /// Annotation text (`int`, `list[float]`, ...); `None` when unannotated
    pub annotation: Option<String>,
}

/// Everything the compiler needs to know about one function
///
/// # Examples
///
/// ```
/// use snakejit::FunctionDescriptor;
///
/// let desc = FunctionDescriptor::new("add", "def add(a: int, b: int) -> int:\n    return a + b\n")
///     .param("a", "int")
///     .param("b", "int")
///     .returns("int");
/// assert_eq!(desc.parameters.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    /// Function name
    pub name: String,
    /// Parameters in declaration order
    pub parameters: Vec<ParameterDescriptor>,
    /// Return annotation text
    pub return_annotation: Option<String>,
    /// Complete source text of the function definition
    pub source: String,
}

impl FunctionDescriptor {
    /// Create a descriptor with no parameters and no return annotation
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            return_annotation: None,
            source: source.into(),
        }
    }

    /// Append an annotated parameter
    pub fn param(mut self, name: impl Into<String>, annotation: impl Into<String>) -> Self {
        self.parameters.push(ParameterDescriptor {
            name: name.into(),
            annotation: Some(annotation.into()),
        });
        self
    }

    /// Append a parameter without an annotation
    pub fn untyped_param(mut self, name: impl Into<String>) -> Self {
        self.parameters.push(ParameterDescriptor {
            name: name.into(),
            annotation: None,
        });
        self
    }

    /// Set the return annotation
    pub fn returns(mut self, annotation: impl Into<String>) -> Self {
        self.return_annotation = Some(annotation.into());
        self
    }

    /// Derive a descriptor from the `def` header of `source`
    ///
    /// Only the header is parsed; the body is validated when compiling.
    pub fn from_source(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let header = parser::parse_header(&source)?;

        Ok(Self {
            name: header.name,
            parameters: header
                .params
                .into_iter()
                .map(|p| ParameterDescriptor {
                    name: p.name,
                    annotation: p.annotation.map(|a| a.to_string()),
                })
                .collect(),
            return_annotation: header.returns.map(|a| a.to_string()),
            source,
        })
    }

    /// Number of declared parameters
    pub fn arity(&self) -> usize {
        self.parameters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_source() {
        let desc = FunctionDescriptor::from_source(
            "def dot(xs: list[float], n: int) -> float:\n    return xs[n]\n",
        )
        .unwrap();
        assert_eq!(desc.name, "dot");
        assert_eq!(desc.arity(), 2);
        assert_eq!(desc.parameters[0].annotation.as_deref(), Some("list[float]"));
        assert_eq!(desc.return_annotation.as_deref(), Some("float"));
    }

    #[test]
    fn test_from_source_keeps_missing_annotations() {
        let desc = FunctionDescriptor::from_source("def f(a):\n    return a\n").unwrap();
        assert_eq!(desc.parameters[0].annotation, None);
        assert_eq!(desc.return_annotation, None);
    }

    #[test]
    fn test_builder() {
        let desc = FunctionDescriptor::new("f", "")
            .param("a", "int")
            .untyped_param("b")
            .returns("float");
        assert_eq!(desc.parameters[1].annotation, None);
        assert_eq!(desc.return_annotation.as_deref(), Some("float"));
    }
}
