//! Cranelift JIT backend
//!
//! Each registered module is lowered into its own `JITModule`, so every
//! compiled entry owns an independent code region. Slots become explicit
//! stack slots and IR values map one-to-one onto Cranelift values; the
//! Cranelift optimizer does the rest.

use std::collections::HashMap;

use cranelift_codegen::ir::condcodes::{FloatCC, IntCC};
use cranelift_codegen::ir::types::{F64, I64, I8};
use cranelift_codegen::ir::{
    AbiParam, Block, FuncRef, InstBuilder, MemFlags, Signature, StackSlot, StackSlotData,
    StackSlotKind, TrapCode, UserFuncName,
};
use cranelift_codegen::isa::OwnedTargetIsa;
use cranelift_codegen::settings::{self, Configurable};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{FuncId, FuncOrDataId, Linkage, Module as _};
use tracing::{debug, trace};

use super::code::{CodeRegion, ModuleHolder};
use super::{trampoline_symbol, Backend, ModuleHandle};
use crate::compiler::ir::{
    BinOp, BlockId, CmpOp, Function, Instruction, Module, SlotId, Terminator, Type, ValueId,
};
use crate::compiler::CompileOptions;
use crate::error::{Error, Result};

/// Trap code for blocks the IR marks unreachable
const UNREACHABLE_TRAP: u8 = 1;

/// Module name used for errors raised before any module exists
const HOST_CONTEXT: &str = "<host>";

struct Registered {
    name: String,
    code: ModuleHolder,
    finalized: bool,
}

/// Native backend built on the Cranelift JIT
pub struct CraneliftBackend {
    isa: OwnedTargetIsa,
    next_handle: u64,
    modules: HashMap<ModuleHandle, Registered>,
}

impl CraneliftBackend {
    /// Create a backend for the host machine
    pub fn new(options: &CompileOptions) -> Result<Self> {
        let host_error = |e: &dyn std::fmt::Display| Error::backend(HOST_CONTEXT, e);

        let mut flag_builder = settings::builder();
        flag_builder
            .set("use_colocated_libcalls", "false")
            .map_err(|e| host_error(&e))?;
        flag_builder
            .set("is_pic", "false")
            .map_err(|e| host_error(&e))?;
        flag_builder
            .set("opt_level", opt_level_name(options.opt_level))
            .map_err(|e| host_error(&e))?;
        flag_builder
            .set(
                "enable_verifier",
                if options.verify_backend_ir { "true" } else { "false" },
            )
            .map_err(|e| host_error(&e))?;

        let isa_builder = cranelift_native::builder().map_err(|e| host_error(&e))?;
        let isa = isa_builder
            .finish(settings::Flags::new(flag_builder))
            .map_err(|e| host_error(&e))?;

        // Arguments travel through the trampoline as 64-bit words
        if isa.pointer_type() != I64 {
            return Err(Error::backend(
                HOST_CONTEXT,
                format!("unsupported pointer width on {}", isa.triple()),
            ));
        }

        debug!(triple = %isa.triple(), opt_level = options.opt_level, "created cranelift backend");
        Ok(Self {
            isa,
            next_handle: 0,
            modules: HashMap::new(),
        })
    }

    /// Number of modules registered and not yet detached
    pub fn pending_modules(&self) -> usize {
        self.modules.len()
    }

    fn registered(&self, handle: ModuleHandle) -> Result<&Registered> {
        self.modules
            .get(&handle)
            .ok_or_else(|| Error::backend(HOST_CONTEXT, format!("unknown module handle {}", handle.0)))
    }
}

impl Backend for CraneliftBackend {
    fn name(&self) -> &'static str {
        "cranelift"
    }

    fn register(&mut self, module: Module) -> Result<ModuleHandle> {
        let builder = JITBuilder::with_isa(self.isa.clone(), cranelift_module::default_libcall_names());
        let mut jit = JITModule::new(builder);

        {
            let mut lowering = Lowering::new(&module.name);
            let func_id = lowering.define_function(&mut jit, &module.function)?;
            lowering.define_trampoline(&mut jit, &module.function, func_id)?;
        }
        debug!(module = %module.name, "registered module");

        let handle = ModuleHandle(self.next_handle);
        self.next_handle += 1;
        self.modules.insert(
            handle,
            Registered {
                name: module.name,
                code: ModuleHolder::new(jit),
                finalized: false,
            },
        );
        Ok(handle)
    }

    fn finalize(&mut self, handle: ModuleHandle) -> Result<()> {
        let entry = self
            .modules
            .get_mut(&handle)
            .ok_or_else(|| Error::backend(HOST_CONTEXT, format!("unknown module handle {}", handle.0)))?;
        if entry.finalized {
            return Ok(());
        }
        let jit = entry
            .code
            .get_mut()
            .ok_or_else(|| Error::backend(&entry.name, "code region already released"))?;
        jit.finalize_definitions()
            .map_err(|e| Error::backend(&entry.name, e))?;
        entry.finalized = true;
        Ok(())
    }

    fn resolve_symbol(&self, handle: ModuleHandle, name: &str) -> Result<Option<*const u8>> {
        let entry = self.registered(handle)?;
        if !entry.finalized {
            return Err(Error::backend(&entry.name, "module is not finalized"));
        }
        let jit = entry
            .code
            .get()
            .ok_or_else(|| Error::backend(&entry.name, "code region already released"))?;
        match jit.get_name(name) {
            Some(FuncOrDataId::Func(id)) => Ok(Some(jit.get_finalized_function(id))),
            _ => Ok(None),
        }
    }

    fn detach(&mut self, handle: ModuleHandle) -> Result<CodeRegion> {
        let entry = self
            .modules
            .remove(&handle)
            .ok_or_else(|| Error::backend(HOST_CONTEXT, format!("unknown module handle {}", handle.0)))?;
        Ok(std::sync::Arc::new(entry.code))
    }
}

fn opt_level_name(level: u8) -> &'static str {
    match level {
        0 => "none",
        1 => "speed",
        _ => "speed_and_size",
    }
}

fn clif_type(ty: &Type) -> cranelift_codegen::ir::Type {
    match ty {
        Type::Int64 | Type::Ptr(_) => I64,
        Type::Float64 => F64,
        Type::Bool1 => I8,
    }
}

/// Per-module lowering state
struct Lowering<'m> {
    module: &'m str,
    ctx: Option<cranelift_codegen::Context>,
    builder_ctx: FunctionBuilderContext,
}

impl<'m> Lowering<'m> {
    fn new(module: &'m str) -> Self {
        Self {
            module,
            ctx: None,
            builder_ctx: FunctionBuilderContext::new(),
        }
    }

    fn error(&self, message: impl std::fmt::Display) -> Error {
        Error::backend(self.module, message)
    }

    fn signature(jit: &JITModule, function: &Function) -> Signature {
        let mut sig = jit.make_signature();
        for ty in function.param_types() {
            sig.params.push(AbiParam::new(clif_type(&ty)));
        }
        sig.returns.push(AbiParam::new(clif_type(&function.return_type)));
        sig
    }

    fn define_function(&mut self, jit: &mut JITModule, function: &Function) -> Result<FuncId> {
        let sig = Self::signature(jit, function);
        let func_id = jit
            .declare_function(&function.name, Linkage::Export, &sig)
            .map_err(|e| self.error(e))?;

        let mut ctx = self.ctx.take().unwrap_or_else(|| jit.make_context());
        ctx.func.signature = sig;
        ctx.func.name = UserFuncName::user(0, func_id.as_u32());

        {
            let mut builder = FunctionBuilder::new(&mut ctx.func, &mut self.builder_ctx);
            let self_ref = jit.declare_func_in_func(func_id, builder.func);
            let mut translator = Translator {
                module: self.module,
                function,
                self_ref,
                blocks: Vec::with_capacity(function.blocks.len()),
                slots: HashMap::new(),
                values: HashMap::new(),
            };
            translator.translate(&mut builder)?;
            builder.seal_all_blocks();
            builder.finalize();
        }

        trace!(module = self.module, clif = %ctx.func, "cranelift function");
        jit.define_function(func_id, &mut ctx)
            .map_err(|e| self.error(e))?;
        jit.clear_context(&mut ctx);
        self.ctx = Some(ctx);
        Ok(func_id)
    }

    /// `__invoke_<name>(args: *const u64, ret: *mut u64)`
    fn define_trampoline(
        &mut self,
        jit: &mut JITModule,
        function: &Function,
        target: FuncId,
    ) -> Result<FuncId> {
        let module = self.module;
        let mut sig = jit.make_signature();
        sig.params.push(AbiParam::new(I64));
        sig.params.push(AbiParam::new(I64));
        let func_id = jit
            .declare_function(&trampoline_symbol(&function.name), Linkage::Export, &sig)
            .map_err(|e| self.error(e))?;

        let mut ctx = self.ctx.take().unwrap_or_else(|| jit.make_context());
        ctx.func.signature = sig;
        ctx.func.name = UserFuncName::user(0, func_id.as_u32());

        {
            let mut builder = FunctionBuilder::new(&mut ctx.func, &mut self.builder_ctx);
            let block = builder.create_block();
            builder.append_block_params_for_function_params(block);
            builder.switch_to_block(block);
            builder.seal_block(block);

            let params = builder.block_params(block).to_vec();
            let (args_ptr, ret_ptr) = match params.as_slice() {
                [args_ptr, ret_ptr] => (*args_ptr, *ret_ptr),
                _ => return Err(Error::backend(module, "trampoline signature mismatch")),
            };

            let mut args = Vec::with_capacity(function.params.len());
            for (index, ty) in function.param_types().iter().enumerate() {
                let offset = (index * 8) as i32;
                args.push(
                    builder
                        .ins()
                        .load(clif_type(ty), MemFlags::trusted(), args_ptr, offset),
                );
            }

            let callee = jit.declare_func_in_func(target, builder.func);
            let call = builder.ins().call(callee, &args);
            let result = builder
                .inst_results(call)
                .first()
                .copied()
                .ok_or_else(|| Error::backend(module, "call produced no result"))?;
            builder.ins().store(MemFlags::trusted(), result, ret_ptr, 0);
            builder.ins().return_(&[]);
            builder.finalize();
        }

        jit.define_function(func_id, &mut ctx)
            .map_err(|e| self.error(e))?;
        jit.clear_context(&mut ctx);
        self.ctx = Some(ctx);
        Ok(func_id)
    }
}

/// Translates one IR function body
struct Translator<'a> {
    module: &'a str,
    function: &'a Function,
    self_ref: FuncRef,
    blocks: Vec<Block>,
    slots: HashMap<SlotId, StackSlot>,
    values: HashMap<ValueId, cranelift_codegen::ir::Value>,
}

impl Translator<'_> {
    fn error(&self, message: impl std::fmt::Display) -> Error {
        Error::backend(self.module, message)
    }

    fn block(&self, id: BlockId) -> Result<Block> {
        self.blocks
            .get(id.0 as usize)
            .copied()
            .ok_or_else(|| self.error(format!("unknown block {}", id)))
    }

    fn slot(&self, id: SlotId) -> Result<(StackSlot, cranelift_codegen::ir::Type)> {
        let stack_slot = self
            .slots
            .get(&id)
            .copied()
            .ok_or_else(|| self.error(format!("slot {} used before alloc", id)))?;
        let ty = self
            .function
            .slot(id)
            .map(|slot| clif_type(&slot.ty))
            .ok_or_else(|| self.error(format!("unknown slot {}", id)))?;
        Ok((stack_slot, ty))
    }

    fn value(&self, id: ValueId) -> Result<cranelift_codegen::ir::Value> {
        self.values
            .get(&id)
            .copied()
            .ok_or_else(|| self.error(format!("undefined value {}", id)))
    }

    fn translate(&mut self, builder: &mut FunctionBuilder) -> Result<()> {
        let function = self.function;
        for _ in &function.blocks {
            self.blocks.push(builder.create_block());
        }
        let entry = self.block(function.entry)?;
        builder.append_block_params_for_function_params(entry);

        // The entry block goes first in the layout
        let order = std::iter::once(function.entry).chain(
            function
                .blocks
                .iter()
                .map(|b| b.id)
                .filter(|id| *id != function.entry),
        );
        for id in order {
            let ir_block = function
                .block(id)
                .ok_or_else(|| self.error(format!("unknown block {}", id)))?;
            builder.switch_to_block(self.block(id)?);
            for inst in &ir_block.instructions {
                self.translate_instr(builder, entry, inst)?;
            }
            match &ir_block.terminator {
                Some(term) => self.translate_terminator(builder, term)?,
                None => return Err(self.error(format!("{} has no terminator", id))),
            }
        }
        Ok(())
    }

    fn translate_instr(
        &mut self,
        builder: &mut FunctionBuilder,
        entry: Block,
        inst: &Instruction,
    ) -> Result<()> {
        let result = match inst {
            Instruction::AllocSlot(id) => {
                let size = self
                    .function
                    .slot(*id)
                    .map(|slot| slot.ty.size_bytes() as u32)
                    .ok_or_else(|| self.error(format!("unknown slot {}", id)))?;
                let stack_slot = builder.create_sized_stack_slot(StackSlotData::new(
                    StackSlotKind::ExplicitSlot,
                    size,
                    3,
                ));
                self.slots.insert(*id, stack_slot);
                return Ok(());
            }
            Instruction::Param { index, .. } => builder
                .block_params(entry)
                .get(*index)
                .copied()
                .ok_or_else(|| self.error(format!("no parameter {}", index)))?,
            Instruction::ConstInt { value, .. } => builder.ins().iconst(I64, *value),
            Instruction::ConstFloat { value, .. } => builder.ins().f64const(*value),
            Instruction::Load { slot, .. } => {
                let (stack_slot, ty) = self.slot(*slot)?;
                builder.ins().stack_load(ty, stack_slot, 0)
            }
            Instruction::Store { slot, value } => {
                let (stack_slot, _) = self.slot(*slot)?;
                let value = self.value(*value)?;
                builder.ins().stack_store(value, stack_slot, 0);
                return Ok(());
            }
            Instruction::Binary {
                op, ty, lhs, rhs, ..
            } => {
                let (lhs, rhs) = (self.value(*lhs)?, self.value(*rhs)?);
                match (op, ty) {
                    (BinOp::Add, Type::Float64) => builder.ins().fadd(lhs, rhs),
                    (BinOp::Sub, Type::Float64) => builder.ins().fsub(lhs, rhs),
                    (BinOp::Add, _) => builder.ins().iadd(lhs, rhs),
                    (BinOp::Sub, _) => builder.ins().isub(lhs, rhs),
                }
            }
            Instruction::Compare {
                op, ty, lhs, rhs, ..
            } => {
                let (lhs, rhs) = (self.value(*lhs)?, self.value(*rhs)?);
                match ty {
                    Type::Float64 => builder.ins().fcmp(float_cc(*op), lhs, rhs),
                    _ => builder.ins().icmp(int_cc(*op), lhs, rhs),
                }
            }
            Instruction::Call { callee, args, .. } => {
                if *callee != self.function.name {
                    return Err(self.error(format!("call to foreign function `{}`", callee)));
                }
                let args = args
                    .iter()
                    .map(|arg| self.value(*arg))
                    .collect::<Result<Vec<_>>>()?;
                let call = builder.ins().call(self.self_ref, &args);
                builder
                    .inst_results(call)
                    .first()
                    .copied()
                    .ok_or_else(|| self.error("call produced no result"))?
            }
            Instruction::LoadElement {
                elem_ty,
                base,
                index,
                ..
            } => {
                let (base, index) = (self.value(*base)?, self.value(*index)?);
                let offset = builder.ins().imul_imm(index, elem_ty.size_bytes());
                let addr = builder.ins().iadd(base, offset);
                builder
                    .ins()
                    .load(clif_type(elem_ty), MemFlags::trusted(), addr, 0)
            }
        };

        if let Some(dst) = inst.dst() {
            self.values.insert(dst, result);
        }
        Ok(())
    }

    fn translate_terminator(&mut self, builder: &mut FunctionBuilder, term: &Terminator) -> Result<()> {
        match term {
            Terminator::Branch(target) => {
                let target = self.block(*target)?;
                builder.ins().jump(target, &[]);
            }
            Terminator::CondBranch {
                cond,
                then_block,
                else_block,
            } => {
                let cond = self.value(*cond)?;
                let (then_block, else_block) = (self.block(*then_block)?, self.block(*else_block)?);
                builder.ins().brif(cond, then_block, &[], else_block, &[]);
            }
            Terminator::Return(Some(value)) => {
                let value = self.value(*value)?;
                builder.ins().return_(&[value]);
            }
            Terminator::Return(None) => {
                return Err(self.error("return without a value"));
            }
            Terminator::Unreachable => {
                builder.ins().trap(TrapCode::unwrap_user(UNREACHABLE_TRAP));
            }
        }
        Ok(())
    }
}

fn int_cc(op: CmpOp) -> IntCC {
    match op {
        CmpOp::Lt => IntCC::SignedLessThan,
        CmpOp::Le => IntCC::SignedLessThanOrEqual,
        CmpOp::Gt => IntCC::SignedGreaterThan,
        CmpOp::Ge => IntCC::SignedGreaterThanOrEqual,
        CmpOp::Eq => IntCC::Equal,
        CmpOp::Ne => IntCC::NotEqual,
    }
}

fn float_cc(op: CmpOp) -> FloatCC {
    match op {
        CmpOp::Lt => FloatCC::LessThan,
        CmpOp::Le => FloatCC::LessThanOrEqual,
        CmpOp::Gt => FloatCC::GreaterThan,
        CmpOp::Ge => FloatCC::GreaterThanOrEqual,
        CmpOp::Eq => FloatCC::Equal,
        CmpOp::Ne => FloatCC::NotEqual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opt_level_names() {
        assert_eq!(opt_level_name(0), "none");
        assert_eq!(opt_level_name(1), "speed");
        assert_eq!(opt_level_name(3), "speed_and_size");
    }

    #[test]
    fn test_comparisons_are_signed() {
        assert_eq!(int_cc(CmpOp::Lt), IntCC::SignedLessThan);
        assert_eq!(float_cc(CmpOp::Ne), FloatCC::NotEqual);
    }

    #[test]
    fn test_unknown_handle() {
        let mut backend = CraneliftBackend::new(&CompileOptions::default()).unwrap();
        assert!(backend.finalize(ModuleHandle(7)).is_err());
        assert!(backend.resolve_symbol(ModuleHandle(7), "f").is_err());
        assert!(backend.detach(ModuleHandle(7)).is_err());
    }
}
