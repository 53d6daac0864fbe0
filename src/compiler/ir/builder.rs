//! AST to IR lowering
//!
//! The block under construction is threaded explicitly through every
//! statement: `lower_stmt` takes the current block and returns the block
//! that follows the statement. A block that already ends in a terminator is
//! never given a second one; see [`IrBuilder::terminate`].

use super::instruction::{BlockId, Instruction, SlotId, Terminator, ValueId};
use super::program::{BasicBlock, Function, Module, Slot};
use super::types::Type;
use crate::compiler::signature::ResolvedSignature;
use crate::compiler::types::TypeEnv;
use crate::error::{Error, Result};
use crate::parser::{Expression, FunctionDef, Statement};
use std::collections::HashMap;

/// Lowers one parsed function into a single-function [`Module`]
pub struct IrBuilder<'a> {
    def: &'a FunctionDef,
    sig: &'a ResolvedSignature,
    function: Function,
    slots: HashMap<String, SlotId>,
    require_return: bool,
}

impl<'a> IrBuilder<'a> {
    /// Creates a builder for `def` with its resolved signature
    pub fn new(def: &'a FunctionDef, sig: &'a ResolvedSignature) -> Self {
        Self {
            def,
            sig,
            function: Function::new(&def.name, sig.ret.clone()),
            slots: HashMap::new(),
            require_return: false,
        }
    }

    /// Reject bodies whose end is reachable instead of ending them in a trap
    ///
    /// Reachability is structural, so a loop that never exits still counts
    /// as reaching the end.
    pub fn require_return(mut self, on: bool) -> Self {
        self.require_return = on;
        self
    }

    /// Lower the whole function
    ///
    /// `env` holds every slot, parameters first. All slots are allocated at
    /// the top of the entry block before anything else, wherever the local is
    /// first assigned in the source.
    pub fn build(mut self, env: &TypeEnv) -> Result<Module> {
        for (index, (name, ty)) in env.iter().enumerate() {
            let id = SlotId(index as u32);
            self.function.slots.push(Slot {
                id,
                name: name.to_string(),
                ty: ty.clone(),
            });
            self.slots.insert(name.to_string(), id);
        }

        for (name, _) in &self.sig.params {
            let id = self.slot_id(name)?;
            self.function.params.push(id);
        }

        let entry = self.new_block("entry");
        self.function.entry = entry;
        for slot in 0..self.function.slots.len() {
            self.emit(entry, Instruction::AllocSlot(SlotId(slot as u32)));
        }
        let params: Vec<(SlotId, Type)> = self
            .function
            .params
            .iter()
            .filter_map(|id| self.function.slot(*id).map(|s| (s.id, s.ty.clone())))
            .collect();
        for (index, (slot, ty)) in params.into_iter().enumerate() {
            let value = self.new_value(ty);
            self.emit(entry, Instruction::Param { dst: value, index });
            self.emit(entry, Instruction::Store { slot, value });
        }

        let body = self.new_block("body");
        self.terminate(entry, Terminator::Branch(body));

        let def = self.def;
        let last = self.lower_block(body, &def.body)?;
        if self.terminate(last, Terminator::Unreachable)
            && self.function.reachable_blocks().contains(&last)
        {
            if self.require_return {
                return Err(Error::type_mismatch(
                    format!("end of `{}`", def.name),
                    "a return on every path",
                    "fall-through",
                ));
            }
            tracing::debug!(
                function = %def.name,
                block = %last,
                "end of body is reachable and traps"
            );
        }

        tracing::debug!(
            function = %self.function.name,
            blocks = self.function.blocks.len(),
            slots = self.function.slots.len(),
            instructions = self.function.instruction_count(),
            "lowered function"
        );

        Ok(Module::new(&def.name, self.function))
    }

    /// Append a new, unterminated block
    pub fn new_block(&mut self, label: &str) -> BlockId {
        let id = BlockId(self.function.blocks.len() as u32);
        self.function.blocks.push(BasicBlock::new(id, label));
        id
    }

    /// Set the terminator of `block` unless it already has one
    ///
    /// Returns `false` when the block was already terminated, in which case
    /// the existing terminator is kept.
    pub fn terminate(&mut self, block: BlockId, term: Terminator) -> bool {
        match self.function.block_mut(block) {
            Some(b) if b.terminator.is_none() => {
                b.terminator = Some(term);
                true
            }
            _ => false,
        }
    }

    fn is_terminated(&self, block: BlockId) -> bool {
        self.function
            .block(block)
            .map_or(false, BasicBlock::is_terminated)
    }

    fn new_value(&mut self, ty: Type) -> ValueId {
        let id = ValueId(self.function.value_types.len() as u32);
        self.function.value_types.push(ty);
        id
    }

    fn emit(&mut self, block: BlockId, inst: Instruction) {
        if let Some(b) = self.function.block_mut(block) {
            b.instructions.push(inst);
        }
    }

    fn slot_id(&self, name: &str) -> Result<SlotId> {
        self.slots
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnboundName {
                name: name.to_string(),
            })
    }

    fn slot_type(&self, slot: SlotId) -> Result<Type> {
        self.function
            .slot(slot)
            .map(|s| s.ty.clone())
            .ok_or_else(|| Error::runtime(format!("slot {} has no declaration", slot)))
    }

    fn lower_block(&mut self, mut block: BlockId, stmts: &[Statement]) -> Result<BlockId> {
        for stmt in stmts {
            block = self.lower_stmt(block, stmt)?;
        }
        Ok(block)
    }

    /// Lower one statement starting in `block`; returns the block that follows
    fn lower_stmt(&mut self, block: BlockId, stmt: &Statement) -> Result<BlockId> {
        // Code after a return still needs a home, but nothing branches to it
        let block = if self.is_terminated(block) {
            self.new_block("already.returned")
        } else {
            block
        };

        match stmt {
            Statement::Assign { name, value, .. } => {
                let (value, ty) = self.lower_expr(block, value)?;
                let slot = self.slot_id(name)?;
                let slot_ty = self.slot_type(slot)?;
                if ty != slot_ty {
                    return Err(Error::type_mismatch(
                        format!("assignment to `{}`", name),
                        slot_ty,
                        ty,
                    ));
                }
                self.emit(block, Instruction::Store { slot, value });
                Ok(block)
            }

            Statement::Return { value, .. } => {
                let context = format!("return value of `{}`", self.def.name);
                let Some(expr) = value else {
                    return Err(Error::type_mismatch(context, &self.sig.ret, "nothing"));
                };
                let (value, ty) = self.lower_expr(block, expr)?;
                if ty != self.sig.ret {
                    return Err(Error::type_mismatch(context, &self.sig.ret, ty));
                }
                self.terminate(block, Terminator::Return(Some(value)));
                Ok(block)
            }

            Statement::While { condition, body } => {
                let cond_block = self.new_block("while.cond");
                let body_block = self.new_block("while.body");
                let end_block = self.new_block("while.end");

                self.terminate(block, Terminator::Branch(cond_block));

                let cond = self.lower_condition(cond_block, condition, "while condition")?;
                self.terminate(
                    cond_block,
                    Terminator::CondBranch {
                        cond,
                        then_block: body_block,
                        else_block: end_block,
                    },
                );

                let last = self.lower_block(body_block, body)?;
                self.terminate(last, Terminator::Branch(cond_block));

                Ok(end_block)
            }

            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let then_block = self.new_block("if.then");
                let else_block = self.new_block("if.else");
                let end_block = self.new_block("if.end");

                let cond = self.lower_condition(block, condition, "if condition")?;
                self.terminate(
                    block,
                    Terminator::CondBranch {
                        cond,
                        then_block,
                        else_block,
                    },
                );

                let last = self.lower_block(then_block, then_branch)?;
                self.terminate(last, Terminator::Branch(end_block));

                let last = self.lower_block(else_block, else_branch)?;
                self.terminate(last, Terminator::Branch(end_block));

                Ok(end_block)
            }
        }
    }

    fn lower_condition(
        &mut self,
        block: BlockId,
        condition: &Expression,
        context: &str,
    ) -> Result<ValueId> {
        let (value, ty) = self.lower_expr(block, condition)?;
        if ty != Type::Bool1 {
            return Err(Error::type_mismatch(context, "a comparison (i1)", ty));
        }
        Ok(value)
    }

    fn lower_expr(&mut self, block: BlockId, expr: &Expression) -> Result<(ValueId, Type)> {
        match expr {
            Expression::Name(name) => {
                let slot = self.slot_id(name)?;
                let ty = self.slot_type(slot)?;
                let dst = self.new_value(ty.clone());
                self.emit(block, Instruction::Load { dst, slot });
                Ok((dst, ty))
            }

            Expression::IntLiteral(value) => {
                let dst = self.new_value(Type::Int64);
                self.emit(block, Instruction::ConstInt { dst, value: *value });
                Ok((dst, Type::Int64))
            }

            Expression::FloatLiteral(value) => {
                let dst = self.new_value(Type::Float64);
                self.emit(block, Instruction::ConstFloat { dst, value: *value });
                Ok((dst, Type::Float64))
            }

            Expression::Binary { op, left, right } => {
                let (lhs, lty) = self.lower_expr(block, left)?;
                let (rhs, rty) = self.lower_expr(block, right)?;
                if lty != rty {
                    return Err(Error::type_mismatch(format!("operands of `{}`", op), lty, rty));
                }
                if !lty.is_arithmetic() {
                    return Err(Error::type_mismatch(
                        format!("operand of `{}`", op),
                        "i64 or f64",
                        lty,
                    ));
                }
                let dst = self.new_value(lty.clone());
                self.emit(
                    block,
                    Instruction::Binary {
                        dst,
                        op: (*op).into(),
                        ty: lty.clone(),
                        lhs,
                        rhs,
                    },
                );
                Ok((dst, lty))
            }

            Expression::Compare { op, left, right } => {
                let (lhs, lty) = self.lower_expr(block, left)?;
                let (rhs, rty) = self.lower_expr(block, right)?;
                if lty != rty {
                    return Err(Error::type_mismatch(format!("operands of `{}`", op), lty, rty));
                }
                if !lty.is_arithmetic() {
                    return Err(Error::type_mismatch(
                        format!("operand of `{}`", op),
                        "i64 or f64",
                        lty,
                    ));
                }
                let dst = self.new_value(Type::Bool1);
                self.emit(
                    block,
                    Instruction::Compare {
                        dst,
                        op: (*op).into(),
                        ty: lty,
                        lhs,
                        rhs,
                    },
                );
                Ok((dst, Type::Bool1))
            }

            Expression::Call { callee, args } => {
                if *callee != self.def.name {
                    return Err(Error::UnboundName {
                        name: callee.clone(),
                    });
                }
                if args.len() != self.sig.arity() {
                    return Err(Error::ArityError {
                        context: format!("call to `{}`", callee),
                        expected: self.sig.arity(),
                        got: args.len(),
                    });
                }

                let mut values = Vec::with_capacity(args.len());
                for (index, arg) in args.iter().enumerate() {
                    let (value, ty) = self.lower_expr(block, arg)?;
                    let expected = &self.sig.params[index].1;
                    if ty != *expected {
                        return Err(Error::type_mismatch(
                            format!("argument {} of `{}`", index + 1, callee),
                            expected,
                            ty,
                        ));
                    }
                    values.push(value);
                }

                let ret = self.sig.ret.clone();
                let dst = self.new_value(ret.clone());
                self.emit(
                    block,
                    Instruction::Call {
                        dst,
                        callee: callee.clone(),
                        args: values,
                    },
                );
                Ok((dst, ret))
            }

            Expression::Subscript { base, index } => {
                let (base, base_ty) = self.lower_expr(block, base)?;
                let Some(elem) = base_ty.pointee().cloned() else {
                    return Err(Error::type_mismatch("subscript base", "pointer", base_ty));
                };
                let (index, index_ty) = self.lower_expr(block, index)?;
                if index_ty != Type::Int64 {
                    return Err(Error::type_mismatch("subscript index", Type::Int64, index_ty));
                }
                let dst = self.new_value(elem.clone());
                self.emit(
                    block,
                    Instruction::LoadElement {
                        dst,
                        elem_ty: elem.clone(),
                        base,
                        index,
                    },
                );
                Ok((dst, elem))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::types::TypeChecker;
    use crate::parser::parse_function;

    fn lower(source: &str, params: &[(&str, Type)], ret: Type) -> Result<Module> {
        let def = parse_function(source)?;
        let sig = ResolvedSignature {
            params: params
                .iter()
                .map(|(n, t)| (n.to_string(), t.clone()))
                .collect(),
            ret,
        };
        let env = TypeChecker::new(&def, &sig).infer_slots()?;
        IrBuilder::new(&def, &sig).build(&env)
    }

    fn int_fn(source: &str) -> Result<Module> {
        lower(source, &[("n", Type::Int64)], Type::Int64)
    }

    fn labels(module: &Module) -> Vec<&str> {
        module
            .function
            .blocks
            .iter()
            .map(|b| b.label.as_str())
            .collect()
    }

    #[test]
    fn test_add_layout() {
        let module = lower(
            "def add(a: int, b: int) -> int:\n    return a + b\n",
            &[("a", Type::Int64), ("b", Type::Int64)],
            Type::Int64,
        )
        .unwrap();
        let f = &module.function;
        assert_eq!(labels(&module), vec!["entry", "body"]);
        assert_eq!(
            f.blocks[0].instructions[..2],
            [Instruction::AllocSlot(SlotId(0)), Instruction::AllocSlot(SlotId(1))]
        );
        assert_eq!(f.blocks[0].terminator, Some(Terminator::Branch(BlockId(1))));
        assert!(matches!(
            f.blocks[1].terminator,
            Some(Terminator::Return(Some(_)))
        ));
        assert_eq!(f.params, vec![SlotId(0), SlotId(1)]);
    }

    #[test]
    fn test_slots_hoisted_to_entry() {
        let module = int_fn(
            "def f(n: int) -> int:\n    while n > 0:\n        inner = n\n        n = n - 1\n    return n\n",
        )
        .unwrap();
        let f = &module.function;
        assert_eq!(f.slots.len(), 2);
        assert_eq!(f.slots[1].name, "inner");
        assert!(f.blocks[0]
            .instructions
            .contains(&Instruction::AllocSlot(SlotId(1))));
        for block in &f.blocks[1..] {
            assert!(!block
                .instructions
                .iter()
                .any(|i| matches!(i, Instruction::AllocSlot(_))));
        }
    }

    #[test]
    fn test_while_blocks() {
        let module = int_fn(
            "def f(n: int) -> int:\n    while n > 0:\n        n = n - 1\n    return n\n",
        )
        .unwrap();
        let f = &module.function;
        assert_eq!(
            labels(&module),
            vec!["entry", "body", "while.cond", "while.body", "while.end"]
        );
        assert_eq!(f.blocks[1].terminator, Some(Terminator::Branch(BlockId(2))));
        assert!(matches!(
            f.blocks[2].terminator,
            Some(Terminator::CondBranch { then_block: BlockId(3), else_block: BlockId(4), .. })
        ));
        assert_eq!(f.blocks[3].terminator, Some(Terminator::Branch(BlockId(2))));
    }

    #[test]
    fn test_returning_branches_keep_single_terminator() {
        let module = int_fn(
            "def f(n: int) -> int:\n    if n < 1:\n        return 1\n    else:\n        return f(n - 1) + f(n - 2)\n",
        )
        .unwrap();
        let f = &module.function;
        let then_block = &f.blocks[2];
        let else_block = &f.blocks[3];
        assert_eq!(then_block.label, "if.then");
        assert!(matches!(then_block.terminator, Some(Terminator::Return(_))));
        assert!(matches!(else_block.terminator, Some(Terminator::Return(_))));
        // Nothing reaches if.end, and it is closed off
        assert_eq!(f.blocks[4].terminator, Some(Terminator::Unreachable));
        assert!(f.blocks.iter().all(BasicBlock::is_terminated));
    }

    #[test]
    fn test_return_in_loop_body_has_no_back_edge() {
        let module = int_fn(
            "def f(n: int) -> int:\n    while n > 0:\n        return n\n    return 0\n",
        )
        .unwrap();
        let body = &module.function.blocks[3];
        assert_eq!(body.label, "while.body");
        assert!(matches!(body.terminator, Some(Terminator::Return(_))));
    }

    #[test]
    fn test_code_after_return_is_detached() {
        let module = int_fn("def f(n: int) -> int:\n    return n\n    n = 2\n    return n\n").unwrap();
        let f = &module.function;
        assert_eq!(labels(&module), vec!["entry", "body", "already.returned"]);
        let targets: Vec<BlockId> = f
            .blocks
            .iter()
            .filter_map(|b| b.terminator.as_ref())
            .flat_map(Terminator::successors)
            .collect();
        assert!(!targets.contains(&BlockId(2)));
    }

    #[test]
    fn test_terminate_twice_keeps_first() {
        let def = parse_function("def f(n: int) -> int:\n    return n\n").unwrap();
        let sig = ResolvedSignature {
            params: vec![("n".to_string(), Type::Int64)],
            ret: Type::Int64,
        };
        let mut builder = IrBuilder::new(&def, &sig);
        let block = builder.new_block("b");
        assert!(builder.terminate(block, Terminator::Return(None)));
        assert!(!builder.terminate(block, Terminator::Branch(block)));
        assert_eq!(
            builder.function.blocks[0].terminator,
            Some(Terminator::Return(None))
        );
    }

    #[test]
    fn test_reachable_end_traps() {
        let module = int_fn("def f(n: int) -> int:\n    if n > 0:\n        return n\n").unwrap();
        let func = &module.function;
        let last = func.blocks.last().unwrap();
        assert_eq!(last.label, "if.end");
        assert_eq!(last.terminator, Some(Terminator::Unreachable));
        assert!(func.reachable_blocks().contains(&last.id));
    }

    #[test]
    fn test_endless_loop_needs_no_trailing_return() {
        let source = "def f(n: int) -> int:\n    while 1 > 0:\n        if n > 5:\n            return n\n        n = n + 1\n";
        let module = int_fn(source).unwrap();
        let end = module
            .function
            .blocks
            .iter()
            .find(|b| b.label == "while.end")
            .unwrap();
        assert_eq!(end.terminator, Some(Terminator::Unreachable));
    }

    #[test]
    fn test_missing_return_rejected_when_required() {
        let sig = ResolvedSignature {
            params: vec![("n".to_string(), Type::Int64)],
            ret: Type::Int64,
        };
        let strict = |source: &str| -> Result<Module> {
            let def = parse_function(source).unwrap();
            let env = TypeChecker::new(&def, &sig).infer_slots()?;
            IrBuilder::new(&def, &sig).require_return(true).build(&env)
        };

        let err = strict("def f(n: int) -> int:\n    while n > 0:\n        n = n - 1\n")
            .unwrap_err();
        assert!(matches!(err, Error::TypeError { ref got, .. } if got == "fall-through"));

        let err = strict("def f(n: int) -> int:\n    if n > 0:\n        return n\n").unwrap_err();
        assert!(matches!(err, Error::TypeError { .. }));

        assert!(strict("def f(n: int) -> int:\n    if n > 0:\n        return n\n    return 0\n").is_ok());
    }

    #[test]
    fn test_mixed_operands_rejected() {
        let err = lower(
            "def f(a: int, b: float) -> float:\n    return a + b\n",
            &[("a", Type::Int64), ("b", Type::Float64)],
            Type::Float64,
        )
        .unwrap_err();
        assert!(matches!(err, Error::TypeError { .. }));
    }

    #[test]
    fn test_condition_must_be_comparison() {
        let err = int_fn("def f(n: int) -> int:\n    while n:\n        n = n - 1\n    return n\n")
            .unwrap_err();
        assert!(matches!(err, Error::TypeError { ref context, .. } if context == "while condition"));
    }

    #[test]
    fn test_self_call_checks() {
        let err = int_fn("def f(n: int) -> int:\n    return f(n, n)\n").unwrap_err();
        assert!(matches!(err, Error::ArityError { expected: 1, got: 2, .. }));

        let err = int_fn("def f(n: int) -> int:\n    return f(1.5)\n").unwrap_err();
        assert!(matches!(err, Error::TypeError { .. }));

        let err = int_fn("def f(n: int) -> int:\n    return g(n)\n").unwrap_err();
        assert!(matches!(err, Error::UnboundName { ref name } if name == "g"));
    }

    #[test]
    fn test_return_type_checked() {
        let err = int_fn("def f(n: int) -> int:\n    return 1.0\n").unwrap_err();
        assert!(matches!(err, Error::TypeError { .. }));

        let err = int_fn("def f(n: int) -> int:\n    return\n").unwrap_err();
        assert!(matches!(err, Error::TypeError { ref got, .. } if got == "nothing"));
    }

    #[test]
    fn test_subscript_lowering() {
        let module = lower(
            "def f(xs: list[float], i: int) -> float:\n    return xs[i]\n",
            &[("xs", Type::ptr_to(Type::Float64)), ("i", Type::Int64)],
            Type::Float64,
        )
        .unwrap();
        assert!(module.function.blocks[1]
            .instructions
            .iter()
            .any(|i| matches!(i, Instruction::LoadElement { elem_ty: Type::Float64, .. })));

        let err = lower(
            "def f(xs: list[float], i: int) -> float:\n    return i[0]\n",
            &[("xs", Type::ptr_to(Type::Float64)), ("i", Type::Int64)],
            Type::Float64,
        )
        .unwrap_err();
        assert!(matches!(err, Error::TypeError { .. }));
    }
}
