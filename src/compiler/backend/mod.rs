//! # Backend Bridge
//!
//! A verified [`Module`] goes in, an invocable [`CompiledEntry`] comes out.
//! Native code generators plug in through the [`Backend`] trait:
//!
//! ```text
//! register(module) -> handle
//! finalize(handle)
//! resolve_symbol(handle, name) -> address | None
//! detach(handle) -> code region
//! ```
//!
//! The provided [`Backend::compile`] drives those four steps in order. Every
//! backend must export, next to the function itself, an invocation
//! trampoline named by [`trampoline_symbol`] with the C signature
//! `fn(args: *const u64, ret: *mut u64)`: one 64-bit word per parameter in,
//! one word out.
//!
//! A backend is shared state. Callers serialize access to it; [`crate::Jit`]
//! keeps its backend behind a mutex.

mod code;
mod cranelift;

pub use self::code::{invoke, CodeRegion, CompiledEntry};
pub use self::cranelift::CraneliftBackend;

use super::ir::Module;
use crate::error::{Error, Result};
use tracing::debug;

/// Identifies one registered module inside a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleHandle(
    /// Backend-assigned sequence number
    pub u64,
);

/// Name of the uniform invocation trampoline exported for `function`
pub fn trampoline_symbol(function: &str) -> String {
    format!("__invoke_{}", function)
}

/// Native code generator consuming verified modules
pub trait Backend: Send {
    /// Short backend name for diagnostics
    fn name(&self) -> &'static str;

    /// Lower `module` into the backend's code context
    fn register(&mut self, module: Module) -> Result<ModuleHandle>;

    /// Make a registered module's code executable; idempotent
    fn finalize(&mut self, handle: ModuleHandle) -> Result<()>;

    /// Address of an exported symbol of a finalized module
    ///
    /// `Ok(None)` when the module exports no such symbol.
    fn resolve_symbol(&self, handle: ModuleHandle, name: &str) -> Result<Option<*const u8>>;

    /// Remove a module from the backend and hand over ownership of its code
    ///
    /// Addresses resolved from the module stay valid for as long as the
    /// returned region is alive.
    fn detach(&mut self, handle: ModuleHandle) -> Result<CodeRegion>;

    /// Register, finalize and resolve `module`, producing a standalone entry
    fn compile(&mut self, module: Module) -> Result<CompiledEntry> {
        let module_name = module.name.clone();
        let function = module.function.name.clone();
        let params = module.function.param_types();
        let ret = module.function.return_type.clone();

        let handle = self.register(module)?;
        let resolved = self.finalize(handle).and_then(|()| {
            let fn_ptr = self.resolve_symbol(handle, &function)?;
            let trampoline = self.resolve_symbol(handle, &trampoline_symbol(&function))?;
            Ok((fn_ptr, trampoline))
        });
        let region = self.detach(handle)?;

        let (fn_ptr, trampoline) = match resolved? {
            (Some(fn_ptr), Some(trampoline)) => (fn_ptr, trampoline),
            (None, _) => {
                return Err(Error::backend(
                    &module_name,
                    format!("symbol `{}` not found", function),
                ))
            }
            (_, None) => {
                return Err(Error::backend(
                    &module_name,
                    format!("symbol `{}` not found", trampoline_symbol(&function)),
                ))
            }
        };

        debug!(
            backend = self.name(),
            module = %module_name,
            function = %function,
            "compiled module"
        );
        Ok(CompiledEntry::new(
            function, params, ret, fn_ptr, trampoline, region,
        ))
    }
}
