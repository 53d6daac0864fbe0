//! Shape of the lowered IR: slot hoisting, block structure, terminators

use snakejit::compiler::ir::{Instruction, Terminator};
use snakejit::compiler::{Verifier, VerifyError};
use snakejit::{Compiler, FunctionDescriptor, Module, Type};

fn lower(source: &str) -> Module {
    let desc = FunctionDescriptor::from_source(source).unwrap();
    Compiler::default().lower(&desc).unwrap()
}

fn labels(module: &Module) -> Vec<&str> {
    module
        .function
        .blocks
        .iter()
        .map(|b| b.label.as_str())
        .collect()
}

const FIB: &str = r#"
def fib(n: int) -> int:
    a = 1
    b = 1
    while n > 0:
        tmp = a + b
        a = b
        b = tmp
        n = n - 1
    return b
"#;

#[test]
fn test_slots_hoisted_into_entry() {
    let module = lower(FIB);
    let func = &module.function;

    let names: Vec<&str> = func.slots.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["n", "a", "b", "tmp"]);
    assert!(func.slots.iter().all(|s| s.ty == Type::Int64));

    let entry = func.block(func.entry).unwrap();
    let allocs = entry
        .instructions
        .iter()
        .take_while(|inst| matches!(inst, Instruction::AllocSlot(_)))
        .count();
    assert_eq!(allocs, func.slots.len());

    // No allocation anywhere else
    for block in func.blocks.iter().filter(|b| b.id != func.entry) {
        assert!(!block
            .instructions
            .iter()
            .any(|inst| matches!(inst, Instruction::AllocSlot(_))));
    }
}

#[test]
fn test_while_block_structure() {
    let module = lower(FIB);
    assert_eq!(
        labels(&module),
        vec!["entry", "body", "while.cond", "while.body", "while.end"]
    );

    let func = &module.function;
    let cond = &func.blocks[2];
    assert!(matches!(cond.terminator, Some(Terminator::CondBranch { .. })));
    let body = &func.blocks[3];
    assert_eq!(body.terminator, Some(Terminator::Branch(cond.id)));
    let end = &func.blocks[4];
    assert!(matches!(end.terminator, Some(Terminator::Return(Some(_)))));
}

#[test]
fn test_single_terminator_after_return() {
    let source = r#"
def f(n: int) -> int:
    while n > 0:
        return n
        n = n - 1
    return 0
"#;
    let module = lower(source);
    let func = &module.function;

    for block in &func.blocks {
        assert!(block.is_terminated(), "{} unterminated", block.id);
    }

    // The returning loop body keeps its `return`, the trailing assignment
    // lands in a fresh unreachable block
    let body = func.blocks.iter().find(|b| b.label == "while.body").unwrap();
    assert!(matches!(body.terminator, Some(Terminator::Return(Some(_)))));
    let dead = func
        .blocks
        .iter()
        .find(|b| b.label == "already.returned")
        .unwrap();
    assert!(!func.reachable_blocks().contains(&dead.id));
    assert!(dead
        .instructions
        .iter()
        .any(|inst| matches!(inst, Instruction::Store { .. })));

    let result = Verifier::new().verify(&module);
    assert!(result.valid, "{:?}", result.errors);
    assert!(!result.warnings.is_empty());
    assert!(!Verifier::new().strict().verify(&module).valid);
}

#[test]
fn test_if_else_both_return() {
    let source = r#"
def fib(n: int) -> int:
    if n < 1:
        return 1
    else:
        return fib(n - 1) + fib(n - 2)
"#;
    let module = lower(source);
    let func = &module.function;
    assert_eq!(
        labels(&module),
        vec!["entry", "body", "if.then", "if.else", "if.end"]
    );

    let end = func.blocks.iter().find(|b| b.label == "if.end").unwrap();
    assert_eq!(end.terminator, Some(Terminator::Unreachable));
    assert!(!func.reachable_blocks().contains(&end.id));

    let calls = func
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .filter(|inst| matches!(inst, Instruction::Call { .. }))
        .count();
    assert_eq!(calls, 2);
    assert_eq!(Verifier::new().verify(&module).stats.call_count, 2);
}

#[test]
fn test_float_and_pointer_slots() {
    let source = r#"
def sum(n: int, data: list[float]) -> float:
    i = 0
    acc = 0.0
    while i < n:
        acc = acc + data[i]
        i = i + 1
    return acc
"#;
    let module = lower(source);
    let func = &module.function;
    assert_eq!(
        func.param_types(),
        vec![Type::Int64, Type::ptr_to(Type::Float64)]
    );
    assert_eq!(func.slot_named("acc").unwrap().ty, Type::Float64);
    assert_eq!(func.slot_named("i").unwrap().ty, Type::Int64);

    let element_loads = func
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .filter(|inst| {
            matches!(
                inst,
                Instruction::LoadElement {
                    elem_ty: Type::Float64,
                    ..
                }
            )
        })
        .count();
    assert_eq!(element_loads, 1);
}

#[test]
fn test_tampered_module_fails_verification() {
    let mut module = lower("def f(a: int) -> int:\n    return a\n");
    let last = module.function.blocks.len() - 1;
    module.function.blocks[last].terminator = None;

    let result = Verifier::new().verify(&module);
    assert!(!result.valid);
    assert!(result
        .errors
        .iter()
        .any(|e| matches!(e, VerifyError::MissingTerminator { .. })));
    assert!(Verifier::new().check(&module).unwrap_err().is_internal());
}

#[test]
fn test_text_and_json_forms() {
    let module = lower("def add(a: int, b: int) -> int:\n    return a + b\n");
    let text = module.to_string();
    assert!(text.starts_with("module add\nfunction add(a: i64, b: i64) -> i64 {"));
    assert!(text.contains("= add.i64"));

    let json = module.to_json().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed["name"], "add");
    assert_eq!(parsed["function"]["slots"].as_array().unwrap().len(), 2);
}
