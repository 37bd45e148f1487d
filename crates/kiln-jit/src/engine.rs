//! The process-wide execution engine.
//!
//! The first successful call to [`ExecutionEngine::get`] compiles a module and
//! binds it for the rest of the process. Later calls return the same engine
//! whatever module they pass.

use std::collections::HashMap;
use std::sync::Arc;

use cranelift_jit::JITModule;
use kiln_ir::{Function, Module};
use log::{debug, error, info};
use once_cell::sync::OnceCell;

use crate::config::EngineConfig;
use crate::error::{EngineError, InvokeError};
use crate::invoke;
use crate::translator::compile_module;
use crate::translator::trampoline::Trampoline;
use crate::value::Value;

static ENGINE: OnceCell<ExecutionEngine> = OnceCell::new();

/// Owner of the finalized machine code.
struct CodeMemory(#[allow(dead_code)] JITModule);

// SAFETY: the JIT module is only mutated while the engine is built. Afterwards
// it only keeps the executable memory alive and is never accessed again.
unsafe impl Send for CodeMemory {}
unsafe impl Sync for CodeMemory {}

/// A compiled module and the entry points of its functions.
pub struct ExecutionEngine {
    module: Arc<Module>,
    config: EngineConfig,
    entries: HashMap<String, usize>,
    _code: CodeMemory,
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("module", &self.module.name())
            .field("config", &self.config)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl ExecutionEngine {
    /// Returns the process-wide engine, building it for `module` with the
    /// default configuration if none exists yet.
    pub fn get(module: &Arc<Module>) -> Result<&'static ExecutionEngine, EngineError> {
        Self::get_with_config(module, &EngineConfig::default())
    }

    /// Like [`ExecutionEngine::get`] with an explicit configuration. Once an
    /// engine is bound, both `module` and `config` are ignored.
    ///
    /// A failed build is returned and not remembered, so a later call may
    /// try again.
    pub fn get_with_config(
        module: &Arc<Module>,
        config: &EngineConfig,
    ) -> Result<&'static ExecutionEngine, EngineError> {
        let engine = ENGINE.get_or_try_init(|| {
            Self::build(Arc::clone(module), config).map_err(|e| {
                error!("failed to build execution engine for '{}': {}", module.name(), e);
                e
            })
        })?;

        if !Arc::ptr_eq(&engine.module, module) {
            debug!(
                "execution engine already bound to '{}'; ignoring module '{}'",
                engine.module.name(),
                module.name()
            );
        }
        Ok(engine)
    }

    /// Compiles `module` into an engine that is not registered globally.
    pub(crate) fn build(module: Arc<Module>, config: &EngineConfig) -> Result<Self, EngineError> {
        debug!("building execution engine for '{}'", module.name());
        let compiled = compile_module(&module, config)?;
        info!(
            "execution engine bound to '{}' ({} callable functions)",
            module.name(),
            compiled.entries.len()
        );
        Ok(Self {
            module,
            config: config.clone(),
            entries: compiled.entries,
            _code: CodeMemory(compiled.jit),
        })
    }

    /// The module this engine was built for.
    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Calls `function` with host values. See [`invoke::invoke`].
    pub fn run_function(&self, function: &Function, args: &[Value]) -> Result<Value, InvokeError> {
        invoke::invoke(self, function, args)
    }

    /// Calls `function` with raw machine integers. See [`invoke::invoke_raw`].
    pub fn run_function_raw(&self, function: &Function, args: &[i64]) -> Result<i64, InvokeError> {
        invoke::invoke_raw(self, function, args)
    }

    /// Calls the trampoline of `name` with one encoded slot per parameter.
    ///
    /// The caller guarantees that `slots` holds exactly as many entries as the
    /// function has parameters, each encoded for its declared type.
    pub(crate) fn call_slots(&self, name: &str, slots: &[u64]) -> Result<u64, InvokeError> {
        let addr = *self
            .entries
            .get(name)
            .ok_or_else(|| InvokeError::Unresolved(name.to_string()))?;
        let mut ret = 0u64;
        // SAFETY: `addr` is a finalized trampoline with the `Trampoline`
        // signature, kept alive by `_code`. It reads one slot per parameter of
        // the function it was built for and writes at most one slot to `ret`.
        unsafe {
            let entry: Trampoline = std::mem::transmute::<usize, Trampoline>(addr);
            entry(slots.as_ptr(), &mut ret);
        }
        Ok(ret)
    }
}
