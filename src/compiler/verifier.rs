//! # IR Verifier
//!
//! Checks the structural invariants of a [`Module`] before it is handed to a
//! backend. A failure here means the IR builder produced something it should
//! not have; valid source never trips it.

use super::ir::{BlockId, Instruction, Module, SlotId, Terminator, Type, ValueId};
use crate::{Error, Result};
use std::collections::HashSet;

/// Verification result with warnings
#[derive(Debug)]
pub struct VerifyResult {
    /// Module may be handed to a backend
    pub valid: bool,
    /// Invariant violations
    pub errors: Vec<VerifyError>,
    /// Warnings (non-fatal)
    pub warnings: Vec<String>,
    /// Statistics
    pub stats: ModuleStats,
}

/// Module statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ModuleStats {
    /// Total block count
    pub block_count: usize,
    /// Blocks reachable from entry
    pub reachable_blocks: usize,
    /// Total instruction count, terminators excluded
    pub instruction_count: usize,
    /// Declared slots
    pub slot_count: usize,
    /// Defined values
    pub value_count: usize,
    /// Self-calls
    pub call_count: usize,
}

/// Verification error types
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyError {
    /// The function has no entry block
    MissingEntry {
        /// Declared entry
        entry: BlockId,
    },

    /// A block's id does not match its position
    MisnumberedBlock {
        /// Position in the block list
        index: usize,
        /// Recorded id
        id: BlockId,
    },

    /// A block has no terminator
    MissingTerminator {
        /// Offending block
        block: BlockId,
    },

    /// A branch names a block that does not exist
    UnknownBlock {
        /// Branching block
        block: BlockId,
        /// Missing target
        target: BlockId,
    },

    /// A branch targets the entry block
    BranchToEntry {
        /// Branching block
        block: BlockId,
    },

    /// An instruction references an undeclared slot
    UnknownSlot {
        /// Block containing the reference
        block: BlockId,
        /// Undeclared slot
        slot: SlotId,
    },

    /// A slot is declared with a type slots cannot hold
    UnstorableSlot {
        /// Offending slot
        slot: SlotId,
        /// Declared type
        ty: Type,
    },

    /// A slot allocation appears after other instructions or outside entry
    MisplacedAlloc {
        /// Block containing the allocation
        block: BlockId,
        /// Allocated slot
        slot: SlotId,
    },

    /// A slot is allocated more than once
    DuplicateAlloc {
        /// Offending slot
        slot: SlotId,
    },

    /// A declared slot is never allocated
    MissingAlloc {
        /// Offending slot
        slot: SlotId,
    },

    /// A parameter read outside the entry block or out of range
    InvalidParam {
        /// Block containing the read
        block: BlockId,
        /// Parameter index
        index: usize,
    },

    /// A value is defined twice
    DuplicateDefinition {
        /// Offending value
        value: ValueId,
    },

    /// A value is used before its definition in the same block
    UndefinedValue {
        /// Block containing the use
        block: BlockId,
        /// Undefined value
        value: ValueId,
    },

    /// Operand or result type differs from what the instruction requires
    TypeMismatch {
        /// Block containing the instruction
        block: BlockId,
        /// Instruction text
        instruction: String,
        /// Required type
        expected: Type,
        /// Actual type (`None` when the value has no recorded type)
        got: Option<Type>,
    },

    /// A call to anything but the function itself
    ForeignCall {
        /// Block containing the call
        block: BlockId,
        /// Called name
        callee: String,
    },

    /// A self-call with the wrong argument count
    CallArity {
        /// Block containing the call
        block: BlockId,
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        got: usize,
    },

    /// A return without a value in a function that returns one
    MissingReturnValue {
        /// Returning block
        block: BlockId,
    },
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyError::MissingEntry { entry } => write!(f, "entry block {} does not exist", entry),
            VerifyError::MisnumberedBlock { index, id } => {
                write!(f, "block at position {} is numbered {}", index, id)
            }
            VerifyError::MissingTerminator { block } => {
                write!(f, "{} has no terminator", block)
            }
            VerifyError::UnknownBlock { block, target } => {
                write!(f, "{} branches to unknown {}", block, target)
            }
            VerifyError::BranchToEntry { block } => {
                write!(f, "{} branches to the entry block", block)
            }
            VerifyError::UnknownSlot { block, slot } => {
                write!(f, "{} references undeclared slot {}", block, slot)
            }
            VerifyError::UnstorableSlot { slot, ty } => {
                write!(f, "slot {} declared with unstorable type {}", slot, ty)
            }
            VerifyError::MisplacedAlloc { block, slot } => {
                write!(f, "allocation of {} in {} is not in the entry prologue", slot, block)
            }
            VerifyError::DuplicateAlloc { slot } => write!(f, "slot {} allocated twice", slot),
            VerifyError::MissingAlloc { slot } => write!(f, "slot {} is never allocated", slot),
            VerifyError::InvalidParam { block, index } => {
                write!(f, "invalid read of parameter {} in {}", index, block)
            }
            VerifyError::DuplicateDefinition { value } => {
                write!(f, "value {} defined more than once", value)
            }
            VerifyError::UndefinedValue { block, value } => {
                write!(f, "{} uses {} before it is defined in that block", block, value)
            }
            VerifyError::TypeMismatch {
                block,
                instruction,
                expected,
                got,
            } => match got {
                Some(got) => write!(
                    f,
                    "`{}` in {}: expected {}, got {}",
                    instruction, block, expected, got
                ),
                None => write!(
                    f,
                    "`{}` in {}: expected {}, got an untyped value",
                    instruction, block, expected
                ),
            },
            VerifyError::ForeignCall { block, callee } => {
                write!(f, "{} calls `{}`, which is not the function itself", block, callee)
            }
            VerifyError::CallArity {
                block,
                expected,
                got,
            } => write!(
                f,
                "self-call in {} passes {} argument(s), expected {}",
                block, got, expected
            ),
            VerifyError::MissingReturnValue { block } => {
                write!(f, "{} returns without a value", block)
            }
        }
    }
}

/// IR module verifier
pub struct Verifier {
    /// Strict mode (treat warnings as errors)
    strict: bool,
}

impl Verifier {
    /// Creates a new verifier; warnings do not fail verification
    pub fn new() -> Self {
        Self { strict: false }
    }

    /// Enable strict mode
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Verify a module, logging the outcome and converting failure to an error
    pub fn check(&self, module: &Module) -> Result<VerifyResult> {
        let result = self.verify(module);

        for warning in &result.warnings {
            tracing::warn!(module = %module.name, "{}", warning);
        }

        if !result.valid {
            let mut messages: Vec<String> = result.errors.iter().map(|e| e.to_string()).collect();
            if self.strict {
                messages.extend(result.warnings.iter().cloned());
            }
            let errors = messages.join("; ");
            tracing::error!(module = %module.name, %errors, "IR verification failed");
            return Err(Error::VerifierError {
                module: module.name.clone(),
                errors,
            });
        }

        tracing::debug!(
            module = %module.name,
            blocks = result.stats.block_count,
            instructions = result.stats.instruction_count,
            "verified module"
        );
        Ok(result)
    }

    /// Verify a module
    pub fn verify(&self, module: &Module) -> VerifyResult {
        let func = &module.function;
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let reachable = func.reachable_blocks();
        let mut stats = ModuleStats {
            block_count: func.blocks.len(),
            reachable_blocks: reachable.len(),
            instruction_count: func.instruction_count(),
            slot_count: func.slots.len(),
            value_count: func.value_types.len(),
            ..ModuleStats::default()
        };

        if func.block(func.entry).is_none() {
            errors.push(VerifyError::MissingEntry { entry: func.entry });
        }

        for (index, slot) in func.slots.iter().enumerate() {
            if slot.id != SlotId(index as u32) {
                errors.push(VerifyError::UnknownSlot {
                    block: func.entry,
                    slot: slot.id,
                });
            }
            if !slot.ty.is_storable() {
                errors.push(VerifyError::UnstorableSlot {
                    slot: slot.id,
                    ty: slot.ty.clone(),
                });
            }
        }
        for param in &func.params {
            if func.slot(*param).is_none() {
                errors.push(VerifyError::UnknownSlot {
                    block: func.entry,
                    slot: *param,
                });
            }
        }

        let param_types = func.param_types();
        let mut allocated: HashSet<SlotId> = HashSet::new();
        let mut defined_anywhere: HashSet<ValueId> = HashSet::new();

        for (index, block) in func.blocks.iter().enumerate() {
            let id = block.id;
            if id != BlockId(index as u32) {
                errors.push(VerifyError::MisnumberedBlock { index, id });
            }

            let is_entry = id == func.entry;
            let mut in_prologue = is_entry;
            let mut defined: HashSet<ValueId> = HashSet::new();

            for inst in &block.instructions {
                let mismatch = |expected: &Type, value: &ValueId| -> Option<VerifyError> {
                    let got = func.value_type(*value);
                    if got == Some(expected) {
                        None
                    } else {
                        Some(VerifyError::TypeMismatch {
                            block: id,
                            instruction: inst.to_string(),
                            expected: expected.clone(),
                            got: got.cloned(),
                        })
                    }
                };

                // Slot allocation: entry prologue only, once per slot
                if let Instruction::AllocSlot(slot) = inst {
                    if !in_prologue {
                        errors.push(VerifyError::MisplacedAlloc { block: id, slot: *slot });
                    }
                    if !allocated.insert(*slot) {
                        errors.push(VerifyError::DuplicateAlloc { slot: *slot });
                    }
                } else {
                    in_prologue = false;
                }

                if let Some(slot) = inst.slot() {
                    if func.slot(slot).is_none() {
                        errors.push(VerifyError::UnknownSlot { block: id, slot });
                    }
                }

                for operand in inst.operands() {
                    if !defined.contains(&operand) {
                        errors.push(VerifyError::UndefinedValue {
                            block: id,
                            value: operand,
                        });
                    }
                }

                match inst {
                    Instruction::AllocSlot(_) => {}
                    Instruction::Param { dst, index } => {
                        match param_types.get(*index) {
                            Some(ty) if is_entry => errors.extend(mismatch(ty, dst)),
                            _ => errors.push(VerifyError::InvalidParam {
                                block: id,
                                index: *index,
                            }),
                        }
                    }
                    Instruction::ConstInt { dst, .. } => {
                        errors.extend(mismatch(&Type::Int64, dst));
                    }
                    Instruction::ConstFloat { dst, .. } => {
                        errors.extend(mismatch(&Type::Float64, dst));
                    }
                    Instruction::Load { dst, slot } => {
                        if let Some(slot) = func.slot(*slot) {
                            errors.extend(mismatch(&slot.ty, dst));
                        }
                    }
                    Instruction::Store { slot, value } => {
                        if let Some(slot) = func.slot(*slot) {
                            errors.extend(mismatch(&slot.ty, value));
                        }
                    }
                    Instruction::Binary {
                        dst, ty, lhs, rhs, ..
                    } => {
                        if !ty.is_arithmetic() {
                            errors.push(VerifyError::TypeMismatch {
                                block: id,
                                instruction: inst.to_string(),
                                expected: Type::Int64,
                                got: Some(ty.clone()),
                            });
                        }
                        errors.extend(mismatch(ty, lhs));
                        errors.extend(mismatch(ty, rhs));
                        errors.extend(mismatch(ty, dst));
                    }
                    Instruction::Compare {
                        dst, ty, lhs, rhs, ..
                    } => {
                        if !ty.is_arithmetic() {
                            errors.push(VerifyError::TypeMismatch {
                                block: id,
                                instruction: inst.to_string(),
                                expected: Type::Int64,
                                got: Some(ty.clone()),
                            });
                        }
                        errors.extend(mismatch(ty, lhs));
                        errors.extend(mismatch(ty, rhs));
                        errors.extend(mismatch(&Type::Bool1, dst));
                    }
                    Instruction::Call { dst, callee, args } => {
                        stats.call_count += 1;
                        if *callee != func.name {
                            errors.push(VerifyError::ForeignCall {
                                block: id,
                                callee: callee.clone(),
                            });
                        }
                        if args.len() != param_types.len() {
                            errors.push(VerifyError::CallArity {
                                block: id,
                                expected: param_types.len(),
                                got: args.len(),
                            });
                        }
                        for (arg, ty) in args.iter().zip(&param_types) {
                            errors.extend(mismatch(ty, arg));
                        }
                        errors.extend(mismatch(&func.return_type, dst));
                    }
                    Instruction::LoadElement {
                        dst,
                        elem_ty,
                        base,
                        index,
                    } => {
                        errors.extend(mismatch(&Type::ptr_to(elem_ty.clone()), base));
                        errors.extend(mismatch(&Type::Int64, index));
                        errors.extend(mismatch(elem_ty, dst));
                    }
                }

                if let Some(dst) = inst.dst() {
                    if !defined_anywhere.insert(dst) {
                        errors.push(VerifyError::DuplicateDefinition { value: dst });
                    }
                    defined.insert(dst);
                }
            }

            let Some(term) = &block.terminator else {
                errors.push(VerifyError::MissingTerminator { block: id });
                continue;
            };

            for operand in term.operands() {
                if !defined.contains(&operand) {
                    errors.push(VerifyError::UndefinedValue {
                        block: id,
                        value: operand,
                    });
                }
            }

            for target in term.successors() {
                if func.block(target).is_none() {
                    errors.push(VerifyError::UnknownBlock { block: id, target });
                } else if target == func.entry {
                    errors.push(VerifyError::BranchToEntry { block: id });
                }
            }

            let term_mismatch = |expected: &Type, value: &ValueId| -> Option<VerifyError> {
                let got = func.value_type(*value);
                (got != Some(expected)).then(|| VerifyError::TypeMismatch {
                    block: id,
                    instruction: term.to_string(),
                    expected: expected.clone(),
                    got: got.cloned(),
                })
            };
            match term {
                Terminator::CondBranch { cond, .. } => {
                    errors.extend(term_mismatch(&Type::Bool1, cond));
                }
                Terminator::Return(Some(value)) => {
                    errors.extend(term_mismatch(&func.return_type, value));
                }
                Terminator::Return(None) => {
                    errors.push(VerifyError::MissingReturnValue { block: id });
                }
                Terminator::Branch(_) | Terminator::Unreachable => {}
            }

            if !reachable.contains(&id) {
                warnings.push(format!("{} ({}) is unreachable", id, block.label));
            }
        }

        for slot in &func.slots {
            if !allocated.contains(&slot.id) {
                errors.push(VerifyError::MissingAlloc { slot: slot.id });
            }
        }

        let valid = errors.is_empty() && (!self.strict || warnings.is_empty());

        VerifyResult {
            valid,
            errors,
            warnings,
            stats,
        }
    }
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new()
    }
}
