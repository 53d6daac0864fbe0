//! Text form of the IR
//!
//! ```text
//! module add
//! function add(a: i64, b: i64) -> i64 {
//!   slot s0 a: i64
//!   slot s1 b: i64
//! block0 (entry):
//!   alloc s0
//!   ...
//!   br block1
//! }
//! ```

use super::instruction::{BlockId, Instruction, SlotId, Terminator, ValueId};
use super::program::{BasicBlock, Function, Module};
use std::fmt;

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "block{}", self.0)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Instruction::AllocSlot(slot) => write!(f, "alloc {}", slot),
            Instruction::Param { dst, index } => write!(f, "{} = param {}", dst, index),
            Instruction::ConstInt { dst, value } => write!(f, "{} = iconst {}", dst, value),
            Instruction::ConstFloat { dst, value } => write!(f, "{} = fconst {:?}", dst, value),
            Instruction::Load { dst, slot } => write!(f, "{} = load {}", dst, slot),
            Instruction::Store { slot, value } => write!(f, "store {}, {}", slot, value),
            Instruction::Binary {
                dst,
                op,
                ty,
                lhs,
                rhs,
            } => write!(f, "{} = {}.{} {}, {}", dst, op.mnemonic(), ty, lhs, rhs),
            Instruction::Compare {
                dst,
                op,
                ty,
                lhs,
                rhs,
            } => write!(f, "{} = cmp.{}.{} {}, {}", dst, op.mnemonic(), ty, lhs, rhs),
            Instruction::Call { dst, callee, args } => {
                write!(f, "{} = call {}(", dst, callee)?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Instruction::LoadElement {
                dst,
                elem_ty,
                base,
                index,
            } => write!(f, "{} = load.{} {}[{}]", dst, elem_ty, base, index),
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Terminator::Branch(target) => write!(f, "br {}", target),
            Terminator::CondBranch {
                cond,
                then_block,
                else_block,
            } => write!(f, "condbr {}, {}, {}", cond, then_block, else_block),
            Terminator::Return(Some(value)) => write!(f, "ret {}", value),
            Terminator::Return(None) => write!(f, "ret"),
            Terminator::Unreachable => write!(f, "unreachable"),
        }
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{} ({}):", self.id, self.label)?;
        for inst in &self.instructions {
            writeln!(f, "  {}", inst)?;
        }
        match &self.terminator {
            Some(term) => writeln!(f, "  {}", term),
            None => writeln!(f, "  <unterminated>"),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "function {}(", self.name)?;
        for (i, id) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match self.slot(*id) {
                Some(slot) => write!(f, "{}: {}", slot.name, slot.ty)?,
                None => write!(f, "{}: ?", id)?,
            }
        }
        writeln!(f, ") -> {} {{", self.return_type)?;
        for slot in &self.slots {
            writeln!(f, "  slot {} {}: {}", slot.id, slot.name, slot.ty)?;
        }
        for block in &self.blocks {
            write!(f, "{}", block)?;
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "module {}", self.name)?;
        write!(f, "{}", self.function)
    }
}

fn write_list(f: &mut fmt::Formatter, values: &[ValueId]) -> fmt::Result {
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", value)?;
    }
    Ok(())
}
