use serde::{Deserialize, Serialize};
use std::fmt;

/// A parsed function definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    /// Function name
    pub name: String,
    /// Positional parameters in declaration order
    pub params: Vec<Param>,
    /// Return annotation, if written
    pub returns: Option<Annotation>,
    /// Body statements
    pub body: Vec<Statement>,
    /// Line of the `def` keyword
    pub line: usize,
}

/// A single positional parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    /// Parameter name
    pub name: String,
    /// Type annotation, if written
    pub annotation: Option<Annotation>,
}

/// Textual type annotation, resolved later by the signature resolver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Annotation {
    /// Plain name: `int`, `float`, ...
    Name(String),
    /// Subscripted name: `list[int]`
    Generic {
        /// Container name
        base: String,
        /// Element annotation
        arg: Box<Annotation>,
    },
    /// `...`
    Ellipsis,
}

/// Statements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    /// Assignment to a local: `name = value`
    Assign {
        /// Target local
        name: String,
        /// Assigned expression
        value: Expression,
        /// Source line
        line: usize,
    },

    /// Return statement
    Return {
        /// Returned value, if any
        value: Option<Expression>,
        /// Source line
        line: usize,
    },

    /// While loop
    While {
        /// Loop condition
        condition: Expression,
        /// Loop body
        body: Vec<Statement>,
    },

    /// If statement; `elif` chains nest in `else_branch`
    If {
        /// Condition expression to evaluate
        condition: Expression,
        /// Statements run when the condition holds
        then_branch: Vec<Statement>,
        /// Statements run otherwise (empty when no `else`)
        else_branch: Vec<Statement>,
    },
}

/// Expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    /// Local or parameter reference
    Name(String),
    /// Integer literal
    IntLiteral(i64),
    /// Float literal
    FloatLiteral(f64),

    /// `+` or `-`
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expression>,
        /// Right operand
        right: Box<Expression>,
    },

    /// Single comparison
    Compare {
        /// Operator
        op: CompareOp,
        /// Left operand
        left: Box<Expression>,
        /// Right operand
        right: Box<Expression>,
    },

    /// Call by name; only the enclosing function itself resolves
    Call {
        /// Called name
        callee: String,
        /// Positional arguments
        args: Vec<Expression>,
    },

    /// Element read through a pointer parameter: `base[index]`
    Subscript {
        /// Pointer expression
        base: Box<Expression>,
        /// Element index
        index: Box<Expression>,
    },
}

/// Arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    /// Addition (+)
    Add,
    /// Subtraction (-)
    Sub,
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Le,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Ge,
    /// Equal (==)
    Eq,
    /// Not equal (!=)
    Ne,
}

impl FunctionDef {
    /// Names assigned anywhere in the body, in first-assignment order
    ///
    /// Nested suites are included; a name assigned only inside a loop or
    /// branch is still function-wide.
    pub fn assigned_names(&self) -> Vec<String> {
        fn walk(stmts: &[Statement], out: &mut Vec<String>) {
            for stmt in stmts {
                match stmt {
                    Statement::Assign { name, .. } => {
                        if !out.contains(name) {
                            out.push(name.clone());
                        }
                    }
                    Statement::Return { .. } => {}
                    Statement::While { body, .. } => walk(body, out),
                    Statement::If {
                        then_branch,
                        else_branch,
                        ..
                    } => {
                        walk(then_branch, out);
                        walk(else_branch, out);
                    }
                }
            }
        }

        let mut names = Vec::new();
        walk(&self.body, &mut names);
        names
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Annotation::Name(name) => write!(f, "{}", name),
            Annotation::Generic { base, arg } => write!(f, "{}[{}]", base, arg),
            Annotation::Ellipsis => write!(f, "..."),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expression::Name(name) => write!(f, "{}", name),
            Expression::IntLiteral(n) => write!(f, "{}", n),
            Expression::FloatLiteral(x) => write!(f, "{:?}", x),
            Expression::Binary { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Expression::Compare { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Expression::Call { callee, args } => {
                write!(f, "{}(", callee)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expression::Subscript { base, index } => write!(f, "{}[{}]", base, index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expression_display() {
        let expr = Expression::Compare {
            op: CompareOp::Le,
            left: Box::new(Expression::Binary {
                op: BinaryOp::Sub,
                left: Box::new(Expression::Name("n".to_string())),
                right: Box::new(Expression::IntLiteral(1)),
            }),
            right: Box::new(Expression::Call {
                callee: "f".to_string(),
                args: vec![Expression::FloatLiteral(2.0)],
            }),
        };
        assert_eq!(expr.to_string(), "((n - 1) <= f(2.0))");
    }

    #[test]
    fn test_annotation_display() {
        let ann = Annotation::Generic {
            base: "list".to_string(),
            arg: Box::new(Annotation::Name("float".to_string())),
        };
        assert_eq!(ann.to_string(), "list[float]");
    }

    #[test]
    fn test_assigned_names_cover_nested_suites() {
        let def = FunctionDef {
            name: "f".to_string(),
            params: vec![],
            returns: None,
            body: vec![
                Statement::While {
                    condition: Expression::Name("c".to_string()),
                    body: vec![Statement::Assign {
                        name: "inner".to_string(),
                        value: Expression::IntLiteral(1),
                        line: 3,
                    }],
                },
                Statement::Assign {
                    name: "outer".to_string(),
                    value: Expression::IntLiteral(2),
                    line: 4,
                },
                Statement::Assign {
                    name: "inner".to_string(),
                    value: Expression::IntLiteral(3),
                    line: 5,
                },
            ],
            line: 1,
        };
        assert_eq!(def.assigned_names(), vec!["inner", "outer"]);
    }
}
