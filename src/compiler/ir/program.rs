//! IR module, function and basic block definitions

use super::instruction::{BlockId, Instruction, SlotId, Terminator, ValueId};
use super::types::Type;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Straight-line instruction sequence ending in one terminator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicBlock {
    /// Block identifier, equal to its index in [`Function::blocks`]
    pub id: BlockId,
    /// Label used in the text form (`entry`, `while.cond`, ...)
    pub label: String,
    /// Instructions in execution order
    pub instructions: Vec<Instruction>,
    /// Terminator; `None` only while the block is under construction
    pub terminator: Option<Terminator>,
}

impl BasicBlock {
    /// Create an empty, unterminated block
    pub fn new(id: BlockId, label: &str) -> Self {
        Self {
            id,
            label: label.to_string(),
            instructions: Vec::new(),
            terminator: None,
        }
    }

    /// Whether a terminator has been emitted
    pub fn is_terminated(&self) -> bool {
        self.terminator.is_some()
    }
}

/// Named storage for one local variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    /// Slot identifier, equal to its index in [`Function::slots`]
    pub id: SlotId,
    /// Source variable name
    pub name: String,
    /// Stored type; never `Bool1`
    pub ty: Type,
}

/// One function in basic-block form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    /// Exported symbol name
    pub name: String,
    /// Slots of the parameters, in positional order
    pub params: Vec<SlotId>,
    /// Declared return type
    pub return_type: Type,
    /// Every slot, parameters first
    pub slots: Vec<Slot>,
    /// Entry block
    pub entry: BlockId,
    /// All blocks in creation order
    pub blocks: Vec<BasicBlock>,
    /// Type of every value, indexed by [`ValueId`]
    pub value_types: Vec<Type>,
}

impl Function {
    /// Create a function with no slots or blocks
    pub fn new(name: &str, return_type: Type) -> Self {
        Self {
            name: name.to_string(),
            params: Vec::new(),
            return_type,
            slots: Vec::new(),
            entry: BlockId(0),
            blocks: Vec::new(),
            value_types: Vec::new(),
        }
    }

    /// Block by id
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.0 as usize)
    }

    /// Mutable block by id
    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(id.0 as usize)
    }

    /// Slot by id
    pub fn slot(&self, id: SlotId) -> Option<&Slot> {
        self.slots.get(id.0 as usize)
    }

    /// Slot by source name
    pub fn slot_named(&self, name: &str) -> Option<&Slot> {
        self.slots.iter().find(|slot| slot.name == name)
    }

    /// Type of a value
    pub fn value_type(&self, value: ValueId) -> Option<&Type> {
        self.value_types.get(value.0 as usize)
    }

    /// Types of the parameters, in positional order
    pub fn param_types(&self) -> Vec<Type> {
        self.params
            .iter()
            .filter_map(|id| self.slot(*id).map(|slot| slot.ty.clone()))
            .collect()
    }

    /// Blocks reachable from the entry block
    pub fn reachable_blocks(&self) -> HashSet<BlockId> {
        let mut seen = HashSet::new();
        let mut stack = vec![self.entry];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(term) = self.block(id).and_then(|b| b.terminator.as_ref()) {
                stack.extend(term.successors().into_iter().filter(|s| !seen.contains(s)));
            }
        }
        seen
    }

    /// Total instruction count, terminators excluded
    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.instructions.len()).sum()
    }
}

/// A single-function compilation unit handed to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Module name, used for diagnostics and backend bookkeeping
    pub name: String,
    /// The exported function
    pub function: Function,
}

impl Module {
    /// Wrap a function in a module
    pub fn new(name: &str, function: Function) -> Self {
        Self {
            name: name.to_string(),
            function,
        }
    }

    /// Serialize the module for external tooling
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::runtime(format!("failed to serialize module {}: {}", self.name, e)))
    }
}
