//! # Basic-Block Intermediate Representation
//!
//! The IR handed to the native backend: one function per module, every local
//! hoisted into a typed stack slot, control flow expressed as labelled basic
//! blocks that each end in exactly one terminator.
//!
//! ## Module Structure
//!
//! ```text
//! ir/
//! ├── mod.rs          # This file - module definition and re-exports
//! ├── types.rs        # Type (Int64, Float64, Bool1, Ptr)
//! ├── instruction.rs  # SlotId, ValueId, BlockId, Instruction, Terminator
//! ├── program.rs      # BasicBlock, Slot, Function, Module
//! ├── printer.rs      # Stable text form
//! └── builder.rs      # IrBuilder: AST to IR lowering
//! ```
//!
//! ## Text Form
//!
//! ```text
//! module add
//! function add(a: i64, b: i64) -> i64 {
//!   slot s0 a: i64
//!   slot s1 b: i64
//! block0 (entry):
//!   alloc s0
//!   alloc s1
//!   v0 = param 0
//!   store s0, v0
//!   ...
//! ```

mod builder;
mod instruction;
mod printer;
mod program;
mod types;

pub use builder::IrBuilder;
pub use instruction::{BinOp, BlockId, CmpOp, Instruction, SlotId, Terminator, ValueId};
pub use program::{BasicBlock, Function, Module, Slot};
pub use types::Type;
