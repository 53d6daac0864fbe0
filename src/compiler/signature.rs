//! Signature resolution: annotation text to IR types

use super::descriptor::FunctionDescriptor;
use super::ir::Type;
use crate::error::{Error, Result};
use crate::parser::{self, Annotation, FunctionDef};

const SUPPORTED: &str = "int, float, list[int] or list[float]";

/// Where an annotation appears; pointers are only legal on parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationPosition {
    /// Positional parameter
    Parameter,
    /// Return value
    Return,
}

/// Parameter and return types of one function
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSignature {
    /// Parameter names and types in positional order
    pub params: Vec<(String, Type)>,
    /// Return type
    pub ret: Type,
}

impl ResolvedSignature {
    /// Parameter types in positional order
    pub fn param_types(&self) -> Vec<Type> {
        self.params.iter().map(|(_, ty)| ty.clone()).collect()
    }

    /// Number of parameters
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Resolve one parsed annotation
pub fn resolve_annotation(annotation: &Annotation, position: AnnotationPosition) -> Result<Type> {
    match annotation {
        Annotation::Name(name) => match name.as_str() {
            "int" => Ok(Type::Int64),
            "float" => Ok(Type::Float64),
            _ => Err(Error::type_mismatch("annotation", SUPPORTED, name)),
        },
        Annotation::Generic { base, arg } if base == "list" => {
            if position == AnnotationPosition::Return {
                return Err(Error::type_mismatch(
                    "return annotation",
                    "int or float",
                    format!("pointer type `{}`", annotation),
                ));
            }
            match resolve_annotation(arg, AnnotationPosition::Return) {
                Ok(elem) if elem.is_arithmetic() => Ok(Type::ptr_to(elem)),
                _ => Err(Error::type_mismatch(
                    "pointer element annotation",
                    "int or float",
                    arg,
                )),
            }
        }
        Annotation::Generic { .. } => Err(Error::type_mismatch("annotation", SUPPORTED, annotation)),
        Annotation::Ellipsis => Err(Error::type_mismatch(
            "annotation",
            SUPPORTED,
            "`...` (variadic form)",
        )),
    }
}

/// Resolve annotation text
pub fn resolve_annotation_text(text: &str, position: AnnotationPosition) -> Result<Type> {
    // Text that is not even an annotation is still a type error
    let annotation = parser::parse_annotation(text)
        .map_err(|_| Error::type_mismatch("annotation", SUPPORTED, text))?;
    resolve_annotation(&annotation, position)
}

/// Resolve every annotation in a descriptor
pub fn resolve(desc: &FunctionDescriptor) -> Result<ResolvedSignature> {
    let mut params: Vec<(String, Type)> = Vec::with_capacity(desc.parameters.len());

    for param in &desc.parameters {
        let context = format!("parameter `{}` of `{}`", param.name, desc.name);
        if param.name.starts_with('*') {
            return Err(Error::type_mismatch(
                context,
                "positional parameter",
                "variadic parameter",
            ));
        }
        if params.iter().any(|(name, _)| *name == param.name) {
            return Err(Error::type_mismatch(
                context,
                "distinct parameter names",
                "duplicate name",
            ));
        }
        let Some(text) = &param.annotation else {
            return Err(Error::type_mismatch(context, SUPPORTED, "no annotation"));
        };
        let ty = resolve_annotation_text(text, AnnotationPosition::Parameter)?;
        params.push((param.name.clone(), ty));
    }

    let Some(text) = &desc.return_annotation else {
        return Err(Error::type_mismatch(
            format!("return of `{}`", desc.name),
            "int or float",
            "no annotation",
        ));
    };
    let ret = resolve_annotation_text(text, AnnotationPosition::Return)?;

    Ok(ResolvedSignature { params, ret })
}

/// Check that a parsed header agrees with the resolved descriptor
///
/// Name and parameter list mismatches are parse errors; an annotation
/// written in the source that resolves differently is a type error.
pub fn check_header(def: &FunctionDef, desc_name: &str, sig: &ResolvedSignature) -> Result<()> {
    let header_error = |message: String| Error::ParseError {
        line: def.line,
        col: 1,
        message,
    };

    if def.name != desc_name {
        return Err(header_error(format!(
            "source defines `{}` but the descriptor names `{}`",
            def.name, desc_name
        )));
    }
    if def.params.len() != sig.arity() {
        return Err(header_error(format!(
            "source declares {} parameter(s) but the descriptor lists {}",
            def.params.len(),
            sig.arity()
        )));
    }

    for (param, (name, ty)) in def.params.iter().zip(&sig.params) {
        if param.name != *name {
            return Err(header_error(format!(
                "source parameter `{}` does not match descriptor parameter `{}`",
                param.name, name
            )));
        }
        if let Some(annotation) = &param.annotation {
            let source_ty = resolve_annotation(annotation, AnnotationPosition::Parameter)?;
            if source_ty != *ty {
                return Err(Error::type_mismatch(
                    format!("parameter `{}`", name),
                    ty,
                    source_ty,
                ));
            }
        }
    }

    if let Some(annotation) = &def.returns {
        let source_ty = resolve_annotation(annotation, AnnotationPosition::Return)?;
        if source_ty != sig.ret {
            return Err(Error::type_mismatch(
                format!("return of `{}`", def.name),
                &sig.ret,
                source_ty,
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Result<Type> {
        resolve_annotation_text(s, AnnotationPosition::Parameter)
    }

    #[test]
    fn test_scalars_and_pointers() {
        assert_eq!(text("int").unwrap(), Type::Int64);
        assert_eq!(text("float").unwrap(), Type::Float64);
        assert_eq!(text("list[int]").unwrap(), Type::ptr_to(Type::Int64));
        assert_eq!(text("list[float]").unwrap(), Type::ptr_to(Type::Float64));
    }

    #[test]
    fn test_rejected_annotations() {
        for bad in ["bool", "str", "list[list[int]]", "dict[int]", "...", "None", "int int"] {
            assert!(
                matches!(text(bad), Err(Error::TypeError { .. })),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_pointer_return_rejected() {
        let err = resolve_annotation_text("list[int]", AnnotationPosition::Return).unwrap_err();
        assert!(matches!(err, Error::TypeError { .. }));
    }

    #[test]
    fn test_resolve_descriptor() {
        let desc = FunctionDescriptor::new("f", "")
            .param("xs", "list[float]")
            .param("n", "int")
            .returns("float");
        let sig = resolve(&desc).unwrap();
        assert_eq!(sig.param_types(), vec![Type::ptr_to(Type::Float64), Type::Int64]);
        assert_eq!(sig.ret, Type::Float64);
    }

    #[test]
    fn test_descriptor_errors() {
        let missing = FunctionDescriptor::new("f", "").untyped_param("a").returns("int");
        let variadic = FunctionDescriptor::new("f", "").param("*args", "int").returns("int");
        let duplicate = FunctionDescriptor::new("f", "")
            .param("a", "int")
            .param("a", "int")
            .returns("int");
        let no_return = FunctionDescriptor::new("f", "").param("a", "int");

        for desc in [missing, variadic, duplicate, no_return] {
            assert!(matches!(resolve(&desc), Err(Error::TypeError { .. })));
        }
    }

    #[test]
    fn test_check_header() {
        let def = parser::parse_function("def f(a: int, b) -> int:\n    return a\n").unwrap();
        let sig = ResolvedSignature {
            params: vec![("a".to_string(), Type::Int64), ("b".to_string(), Type::Float64)],
            ret: Type::Int64,
        };
        check_header(&def, "f", &sig).unwrap();

        assert!(matches!(
            check_header(&def, "g", &sig),
            Err(Error::ParseError { .. })
        ));

        let wrong = ResolvedSignature {
            params: vec![("a".to_string(), Type::Float64), ("b".to_string(), Type::Float64)],
            ret: Type::Int64,
        };
        assert!(matches!(
            check_header(&def, "f", &wrong),
            Err(Error::TypeError { .. })
        ));
    }
}
