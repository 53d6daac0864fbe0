//! JIT-compiled code wrapper
//!
//! [`CompiledEntry`] wraps the native function pointer and its invocation
//! trampoline, and keeps the owning code region alive so the code is not
//! freed while the entry is in use.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::compiler::ir::Type;
use crate::error::{Error, Result};
use crate::runtime::Value;

/// Owner of executable memory; dropping the last reference frees the code
pub type CodeRegion = Arc<dyn Any + Send + Sync>;

/// Wrapper to make JITModule Send + Sync
///
/// # Safety
/// The JITModule contains raw pointers to executable code. Once detached
/// from the backend it is never modified again, only freed on drop.
pub(crate) struct ModuleHolder(Option<cranelift_jit::JITModule>);

// Safety: a detached module is immutable; its code references no
// thread-local state.
unsafe impl Send for ModuleHolder {}
unsafe impl Sync for ModuleHolder {}

impl ModuleHolder {
    pub(crate) fn new(module: cranelift_jit::JITModule) -> Self {
        ModuleHolder(Some(module))
    }

    pub(crate) fn get(&self) -> Option<&cranelift_jit::JITModule> {
        self.0.as_ref()
    }

    pub(crate) fn get_mut(&mut self) -> Option<&mut cranelift_jit::JITModule> {
        self.0.as_mut()
    }
}

impl Drop for ModuleHolder {
    fn drop(&mut self) {
        if let Some(module) = self.0.take() {
            // Safety: every pointer into this module was handed out together
            // with an Arc to this holder, and that Arc is now gone.
            unsafe { module.free_memory() };
        }
    }
}

/// Natively compiled function
///
/// Immutable once built and shares nothing with the compiler, so one entry
/// may be invoked from any number of threads at once.
pub struct CompiledEntry {
    name: String,
    params: Vec<Type>,
    ret: Type,
    fn_ptr: *const u8,
    trampoline: *const u8,
    ir_text: Option<String>,
    _region: CodeRegion,
}

// Safety: both pointers point to immutable code that touches only its
// arguments. The region is kept alive by the Arc.
unsafe impl Send for CompiledEntry {}
unsafe impl Sync for CompiledEntry {}

impl CompiledEntry {
    pub(crate) fn new(
        name: String,
        params: Vec<Type>,
        ret: Type,
        fn_ptr: *const u8,
        trampoline: *const u8,
        region: CodeRegion,
    ) -> Self {
        CompiledEntry {
            name,
            params,
            ret,
            fn_ptr,
            trampoline,
            ir_text: None,
            _region: region,
        }
    }

    pub(crate) fn with_ir_text(mut self, text: String) -> Self {
        self.ir_text = Some(text);
        self
    }

    /// Function name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameter types in positional order
    pub fn param_types(&self) -> &[Type] {
        &self.params
    }

    /// Return type
    pub fn return_type(&self) -> &Type {
        &self.ret
    }

    /// Number of parameters
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// IR text, kept when compiled with `dump_ir`
    pub fn ir_text(&self) -> Option<&str> {
        self.ir_text.as_deref()
    }

    /// Get the native function pointer
    ///
    /// The function follows the host C calling convention with the declared
    /// parameter and return types. It stays valid while `self` is alive.
    pub fn fn_ptr(&self) -> *const u8 {
        self.fn_ptr
    }

    /// Call the compiled function with positional arguments
    ///
    /// Arguments are checked against the signature before any native code
    /// runs: a wrong count is an [`Error::ArityError`], a wrong argument type
    /// an [`Error::TypeError`]. Buffer arguments are read in place; indices
    /// are not bounds-checked by the compiled code.
    pub fn invoke(&self, args: &[Value<'_>]) -> Result<Value<'static>> {
        if args.len() != self.params.len() {
            return Err(Error::ArityError {
                context: format!("call to `{}`", self.name),
                expected: self.params.len(),
                got: args.len(),
            });
        }
        for (index, (arg, ty)) in args.iter().zip(&self.params).enumerate() {
            if arg.ty() != *ty {
                return Err(Error::type_mismatch(
                    format!("argument {} of `{}`", index, self.name),
                    ty,
                    arg.ty(),
                ));
            }
        }

        let words: Vec<u64> = args.iter().map(|arg| arg.to_bits()).collect();
        let mut ret: u64 = 0;
        // Safety: the trampoline was generated for exactly this signature and
        // reads one word per parameter; `ret` is a valid out slot.
        unsafe {
            let f: unsafe extern "C" fn(*const u64, *mut u64) =
                std::mem::transmute(self.trampoline);
            f(words.as_ptr(), &mut ret);
        }
        Value::from_bits(&self.ret, ret)
    }
}

/// Call `entry` with positional arguments; see [`CompiledEntry::invoke`]
pub fn invoke(entry: &CompiledEntry, args: &[Value<'_>]) -> Result<Value<'static>> {
    entry.invoke(args)
}

impl fmt::Debug for CompiledEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledEntry")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("ret", &self.ret)
            .field("fn_ptr", &self.fn_ptr)
            .finish()
    }
}
