//! IR instruction definitions

use crate::parser::{BinaryOp, CompareOp};
use serde::{Deserialize, Serialize};

/// Stack slot holding one local variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotId(pub u32);

/// SSA value produced by an instruction; local to its block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub u32);

/// Basic block identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u32);

/// Arithmetic operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    /// Wrapping integer add or float add
    Add,
    /// Wrapping integer subtract or float subtract
    Sub,
}

/// Ordering comparison; signed for integers, ordered for floats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `==`
    Eq,
    /// `!=` (unordered-or-not-equal for floats)
    Ne,
}

/// IR instruction
///
/// Every instruction that produces a value names its destination; the type
/// of each destination is recorded in [`super::Function::value_types`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    /// Reserve storage for a slot; only in the entry block, before anything else
    AllocSlot(SlotId),
    /// dst = incoming parameter `index`
    Param {
        /// Destination value
        dst: ValueId,
        /// Positional parameter index
        index: usize,
    },
    /// dst = integer constant
    ConstInt {
        /// Destination value
        dst: ValueId,
        /// Constant
        value: i64,
    },
    /// dst = float constant
    ConstFloat {
        /// Destination value
        dst: ValueId,
        /// Constant
        value: f64,
    },
    /// dst = *slot
    Load {
        /// Destination value
        dst: ValueId,
        /// Source slot
        slot: SlotId,
    },
    /// *slot = value
    Store {
        /// Target slot
        slot: SlotId,
        /// Stored value
        value: ValueId,
    },
    /// dst = lhs op rhs
    Binary {
        /// Destination value
        dst: ValueId,
        /// Operation
        op: BinOp,
        /// Operand type (also the result type)
        ty: super::Type,
        /// Left operand
        lhs: ValueId,
        /// Right operand
        rhs: ValueId,
    },
    /// dst: i1 = lhs op rhs
    Compare {
        /// Destination value
        dst: ValueId,
        /// Comparison
        op: CmpOp,
        /// Operand type
        ty: super::Type,
        /// Left operand
        lhs: ValueId,
        /// Right operand
        rhs: ValueId,
    },
    /// dst = callee(args...); the callee is always the enclosing function
    Call {
        /// Destination value
        dst: ValueId,
        /// Called function name
        callee: String,
        /// Positional arguments
        args: Vec<ValueId>,
    },
    /// dst = base[index], loading `elem_ty` at byte offset `index * size`
    LoadElement {
        /// Destination value
        dst: ValueId,
        /// Element type
        elem_ty: super::Type,
        /// Pointer operand
        base: ValueId,
        /// Int64 index operand
        index: ValueId,
    },
}

/// Block terminator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Terminator {
    /// Unconditional jump
    Branch(BlockId),
    /// Two-way branch on an i1 value
    CondBranch {
        /// Bool1 condition
        cond: ValueId,
        /// Target when the condition holds
        then_block: BlockId,
        /// Target otherwise
        else_block: BlockId,
    },
    /// Return from the function
    Return(Option<ValueId>),
    /// Control never reaches the end of this block
    Unreachable,
}

impl Instruction {
    /// Value defined by this instruction, if any
    pub fn dst(&self) -> Option<ValueId> {
        match self {
            Instruction::AllocSlot(_) | Instruction::Store { .. } => None,
            Instruction::Param { dst, .. }
            | Instruction::ConstInt { dst, .. }
            | Instruction::ConstFloat { dst, .. }
            | Instruction::Load { dst, .. }
            | Instruction::Binary { dst, .. }
            | Instruction::Compare { dst, .. }
            | Instruction::Call { dst, .. }
            | Instruction::LoadElement { dst, .. } => Some(*dst),
        }
    }

    /// Values read by this instruction
    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            Instruction::AllocSlot(_)
            | Instruction::Param { .. }
            | Instruction::ConstInt { .. }
            | Instruction::ConstFloat { .. }
            | Instruction::Load { .. } => Vec::new(),
            Instruction::Store { value, .. } => vec![*value],
            Instruction::Binary { lhs, rhs, .. } | Instruction::Compare { lhs, rhs, .. } => {
                vec![*lhs, *rhs]
            }
            Instruction::Call { args, .. } => args.clone(),
            Instruction::LoadElement { base, index, .. } => vec![*base, *index],
        }
    }

    /// Slot touched by this instruction, if any
    pub fn slot(&self) -> Option<SlotId> {
        match self {
            Instruction::AllocSlot(slot)
            | Instruction::Load { slot, .. }
            | Instruction::Store { slot, .. } => Some(*slot),
            _ => None,
        }
    }
}

impl Terminator {
    /// Successor blocks in branch order
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Branch(target) => vec![*target],
            Terminator::CondBranch {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            Terminator::Return(_) | Terminator::Unreachable => Vec::new(),
        }
    }

    /// Values read by this terminator
    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            Terminator::CondBranch { cond, .. } => vec![*cond],
            Terminator::Return(Some(value)) => vec![*value],
            _ => Vec::new(),
        }
    }
}

impl From<BinaryOp> for BinOp {
    fn from(op: BinaryOp) -> Self {
        match op {
            BinaryOp::Add => BinOp::Add,
            BinaryOp::Sub => BinOp::Sub,
        }
    }
}

impl From<CompareOp> for CmpOp {
    fn from(op: CompareOp) -> Self {
        match op {
            CompareOp::Lt => CmpOp::Lt,
            CompareOp::Le => CmpOp::Le,
            CompareOp::Gt => CmpOp::Gt,
            CompareOp::Ge => CmpOp::Ge,
            CompareOp::Eq => CmpOp::Eq,
            CompareOp::Ne => CmpOp::Ne,
        }
    }
}

impl BinOp {
    /// Mnemonic used in the text form
    pub fn mnemonic(&self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
        }
    }
}

impl CmpOp {
    /// Mnemonic used in the text form
    pub fn mnemonic(&self) -> &'static str {
        match self {
            CmpOp::Lt => "lt",
            CmpOp::Le => "le",
            CmpOp::Gt => "gt",
            CmpOp::Ge => "ge",
            CmpOp::Eq => "eq",
            CmpOp::Ne => "ne",
        }
    }
}
