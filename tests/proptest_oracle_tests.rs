//! Property-based tests: native code agrees with the reference interpreter
//!
//! These tests use proptest to generate random Int64 programs and verify that:
//! 1. Every generated program compiles
//! 2. Native results match the interpreter for arbitrary inputs, overflow included
//! 3. Nested control flow, early returns and self-recursion agree as well
//! 4. The scanner and parser never panic or hang on arbitrary input

use proptest::prelude::*;
use snakejit::{CompileOptions, FunctionDescriptor, Interpreter, Jit, Value};

// =============================================================================
// STRATEGY GENERATORS
// =============================================================================

/// Integer expression over the given names
fn int_expr(names: &'static [&'static str]) -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        prop::sample::select(names).prop_map(|n| n.to_string()),
        (-1000i64..1000i64).prop_map(|n| if n < 0 {
            format!("({})", n)
        } else {
            n.to_string()
        }),
        Just(i64::MAX.to_string()),
    ];
    leaf.prop_recursive(4, 16, 2, |inner| {
        (inner.clone(), prop_oneof![Just("+"), Just("-")], inner)
            .prop_map(|(l, op, r)| format!("({} {} {})", l, op, r))
    })
}

fn compare_op() -> impl Strategy<Value = &'static str> {
    prop::sample::select(&["<", "<=", ">", ">=", "==", "!="][..])
}

/// A function of `a` and `b` with a branch and a bounded loop
fn int_program() -> impl Strategy<Value = String> {
    const PARAMS: &[&str] = &["a", "b"];
    const LOCALS: &[&str] = &["a", "b", "x"];
    (
        int_expr(PARAMS),
        int_expr(LOCALS),
        compare_op(),
        int_expr(LOCALS),
        int_expr(LOCALS),
        int_expr(LOCALS),
        0i64..6,
        int_expr(LOCALS),
    )
        .prop_map(|(init, lhs, op, rhs, then_e, else_e, trips, step)| {
            format!(
                "def f(a: int, b: int) -> int:\n    x = {init}\n    if {lhs} {op} {rhs}:\n        x = x - {then_e}\n    else:\n        x = x + {else_e}\n    i = 0\n    while i < {trips}:\n        x = x + {step}\n        i = i + 1\n    return x\n"
            )
        })
}

/// Statement tree rendered into an indented body
#[derive(Debug, Clone)]
enum Stmt {
    Assign(&'static str, String),
    /// `target = target + f(d - 1, ..)` guarded by `d > 0`
    Recurse(&'static str, String, String),
    Return(String),
    If(String, Vec<Stmt>, Vec<Stmt>),
    Loop(i64, Vec<Stmt>),
}

const VARS: &[&str] = &["d", "a", "b", "x", "y"];

fn condition() -> impl Strategy<Value = String> {
    (int_expr(VARS), compare_op(), int_expr(VARS))
        .prop_map(|(lhs, op, rhs)| format!("{} {} {}", lhs, op, rhs))
}

fn stmt() -> impl Strategy<Value = Stmt> {
    let target = || prop::sample::select(&["x", "y"][..]);
    let leaf = prop_oneof![
        4 => (target(), int_expr(VARS)).prop_map(|(t, e)| Stmt::Assign(t, e)),
        2 => (target(), int_expr(VARS), int_expr(VARS))
            .prop_map(|(t, a, b)| Stmt::Recurse(t, a, b)),
        1 => int_expr(VARS).prop_map(Stmt::Return),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            (
                condition(),
                prop::collection::vec(inner.clone(), 1..4),
                prop::collection::vec(inner.clone(), 0..3),
            )
                .prop_map(|(c, then, other)| Stmt::If(c, then, other)),
            (0i64..3, prop::collection::vec(inner, 1..4))
                .prop_map(|(trips, body)| Stmt::Loop(trips, body)),
        ]
    })
}

/// Renders at `level` indentation; `loops` names the next free loop counter
fn render(stmts: &[Stmt], level: usize, loops: usize, out: &mut String) {
    let pad = "    ".repeat(level);
    for stmt in stmts {
        match stmt {
            Stmt::Assign(target, expr) => {
                out.push_str(&format!("{pad}{target} = {expr}\n"));
            }
            Stmt::Recurse(target, a, b) => {
                out.push_str(&format!("{pad}if d > 0:\n"));
                out.push_str(&format!("{pad}    {target} = {target} + f(d - 1, {a}, {b})\n"));
            }
            Stmt::Return(expr) => out.push_str(&format!("{pad}return {expr}\n")),
            Stmt::If(cond, then, other) => {
                out.push_str(&format!("{pad}if {cond}:\n"));
                render(then, level + 1, loops, out);
                if !other.is_empty() {
                    out.push_str(&format!("{pad}else:\n"));
                    render(other, level + 1, loops, out);
                }
            }
            Stmt::Loop(trips, body) => {
                let counter = format!("i{}", loops);
                out.push_str(&format!("{pad}{counter} = 0\n"));
                out.push_str(&format!("{pad}while {counter} < {trips}:\n"));
                render(body, level + 1, loops + 1, out);
                out.push_str(&format!("{pad}    {counter} = {counter} + 1\n"));
            }
        }
    }
}

/// A self-recursive function whose recursion is bounded by `d`
fn nested_program() -> impl Strategy<Value = String> {
    prop::collection::vec(stmt(), 1..5).prop_map(|body| {
        let mut source = String::from("def f(d: int, a: int, b: int) -> int:\n    x = a\n    y = b\n");
        render(&body, 1, 0, &mut source);
        source.push_str("    return x + y\n");
        source
    })
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn native_matches_interpreter(
        source in int_program(),
        inputs in prop::collection::vec((any::<i64>(), any::<i64>()), 1..8),
    ) {
        let desc = FunctionDescriptor::from_source(&source).unwrap();
        let jit = Jit::new(CompileOptions::default()).unwrap();
        let entry = jit.compile(&desc).unwrap();
        let oracle = Interpreter::from_descriptor(&desc).unwrap();

        for (a, b) in inputs {
            let args = [Value::Int(a), Value::Int(b)];
            prop_assert_eq!(entry.invoke(&args).unwrap(), oracle.call(&args).unwrap(), "{}", source);
        }
    }

    #[test]
    fn nested_and_recursive_programs_match_interpreter(
        source in nested_program(),
        inputs in prop::collection::vec((0i64..2, any::<i64>(), any::<i64>()), 1..6),
    ) {
        let desc = FunctionDescriptor::from_source(&source).unwrap();
        let jit = Jit::new(CompileOptions::default()).unwrap();
        let entry = jit.compile(&desc).unwrap();
        let oracle = Interpreter::from_descriptor(&desc).unwrap();

        for (d, a, b) in inputs {
            let args = [Value::Int(d), Value::Int(a), Value::Int(b)];
            prop_assert_eq!(entry.invoke(&args).unwrap(), oracle.call(&args).unwrap(), "{}", source);
        }
    }

    #[test]
    fn scanner_and_parser_never_panic(source in r"[\x00-\x7F]{0,200}") {
        let _ = snakejit::parser::parse_function(&source);
    }

    #[test]
    fn scanner_and_parser_never_panic_on_any_text(source in r"(?s).{0,120}") {
        let _ = snakejit::parser::parse_function(&source);
    }

    #[test]
    fn line_prefixed_garbage_never_panics(
        prefix in r"[\x00-\x1F\x7F]{1,4}",
        indent in 0usize..9,
    ) {
        let source = format!(
            "def f(a: int) -> int:\n{}{}\n    return a\n",
            " ".repeat(indent),
            prefix
        );
        let _ = snakejit::parser::parse_function(&source);
    }

    #[test]
    fn header_variants_never_panic(
        name in "[a-z_][a-z0-9_]{0,8}",
        annotation in prop::sample::select(&["int", "float", "list[int]", "bool", "...", "list[list[int]]"][..]),
    ) {
        let source = format!("def {}(x: {}) -> int:\n    return 1\n", name, annotation);
        let _ = FunctionDescriptor::from_source(&source)
            .and_then(|desc| snakejit::Compiler::default().lower(&desc));
    }
}
