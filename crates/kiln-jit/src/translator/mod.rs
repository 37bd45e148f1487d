//! Lowering of verified kiln modules to machine code with cranelift-jit.

pub(crate) mod func;
pub(crate) mod trampoline;
pub(crate) mod types;

use std::collections::HashMap;

use cranelift_codegen::settings::{self, Configurable};
use cranelift_frontend::FunctionBuilderContext;
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{default_libcall_names, DataDescription, Init, Linkage, Module as _};
use kiln_ir::{verify_module, Constant, GlobalVariable, InstKind, Module, Type};
use log::debug;

use self::func::{translate_function, Symbols};
use self::trampoline::{build_trampoline, trampoline_name, trampoline_signature};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::symbols::SymbolResolver;

/// Machine code for a module plus the trampoline address of every callable
/// function.
pub(crate) struct CompiledModule {
    pub(crate) jit: JITModule,
    pub(crate) entries: HashMap<String, usize>,
}

/// Verifies and compiles `module`.
///
/// Declarations are resolved up front. A declaration that does not resolve is
/// only an error when a definition calls it; otherwise it is left without an
/// entry point.
pub(crate) fn compile_module(
    module: &Module,
    config: &EngineConfig,
) -> Result<CompiledModule, EngineError> {
    verify_module(module)?;

    let mut flag_builder = settings::builder();
    flag_builder.set("use_colocated_libcalls", "false")?;
    flag_builder.set("is_pic", "false")?;
    flag_builder.set("opt_level", config.opt_level.as_setting())?;
    flag_builder.set("enable_verifier", if config.verify { "true" } else { "false" })?;
    let flags = settings::Flags::new(flag_builder);

    let isa_builder = cranelift_native::builder()
        .map_err(|e| EngineError::IsaSetup(format!("Host target lookup failed: {}", e)))?;
    let isa = isa_builder
        .finish(flags)
        .map_err(|e| EngineError::IsaSetup(format!("ISA construction failed: {}", e)))?;
    debug!("compiling for {} at opt level {}", isa.triple(), config.opt_level);

    let mut builder = JITBuilder::with_isa(isa, default_libcall_names());
    let resolver = SymbolResolver::new(config);
    let mut resolved = Vec::new();
    for function in module.functions().iter().filter(|f| f.is_declaration()) {
        match resolver.resolve(function.name()) {
            Some(ptr) => {
                debug!("resolved '@{}' at {:p}", function.name(), ptr);
                builder.symbol(function.name(), ptr);
                resolved.push(function.name());
            }
            None => debug!("'@{}' has no definition in the process", function.name()),
        }
    }
    check_calls_resolve(module, &resolved)?;

    let mut jit = JITModule::new(builder);
    let mut symbols = Symbols::default();

    for global in module.globals() {
        let data_id = jit.declare_data(&global.name, Linkage::Export, !global.constant, false)?;
        let mut data = DataDescription::new();
        data.init = initializer(global);
        data.align = Some(u64::from(global.ty.store_size().max(1)));
        jit.define_data(data_id, &data)?;
        symbols.data.insert(global.name.clone(), data_id);
    }

    let pointer_type = jit.isa().pointer_type();
    let call_conv = jit.isa().default_call_conv();
    for function in module.functions() {
        let linkage = if function.is_declaration() {
            if !resolved.contains(&function.name()) {
                continue;
            }
            Linkage::Import
        } else {
            Linkage::Export
        };
        let sig = types::lower_signature(&function.ty(), call_conv, pointer_type);
        let func_id = jit.declare_function(function.name(), linkage, &sig)?;
        symbols.functions.insert(function.name().to_string(), func_id);
    }

    let mut builder_ctx = FunctionBuilderContext::new();
    let mut ctx = jit.make_context();
    for function in module.functions().iter().filter(|f| !f.is_declaration()) {
        let func_id = symbols.functions[function.name()];
        ctx.func = translate_function(function, func_id, &symbols, &mut jit, &mut builder_ctx)?;
        jit.define_function(func_id, &mut ctx)?;
        jit.clear_context(&mut ctx);
        debug!("compiled '@{}'", function.name());
    }

    let tramp_sig = trampoline_signature(&jit);
    let mut trampolines = Vec::new();
    for function in module.functions() {
        let Some(&target) = symbols.functions.get(function.name()) else {
            continue;
        };
        let tramp_id =
            jit.declare_function(&trampoline_name(function.name()), Linkage::Local, &tramp_sig)?;
        ctx.func = build_trampoline(&mut jit, &mut builder_ctx, tramp_id, target, &function.ty());
        jit.define_function(tramp_id, &mut ctx)?;
        jit.clear_context(&mut ctx);
        trampolines.push((function.name().to_string(), tramp_id));
    }

    jit.finalize_definitions()?;

    let entries = trampolines
        .into_iter()
        .map(|(name, id)| (name, jit.get_finalized_function(id) as usize))
        .collect();

    Ok(CompiledModule { jit, entries })
}

fn check_calls_resolve(module: &Module, resolved: &[&str]) -> Result<(), EngineError> {
    for caller in module.functions() {
        for block in caller.blocks() {
            for inst in &block.insts {
                let InstKind::Call { callee, .. } = &inst.kind else {
                    continue;
                };
                let is_unresolved = module
                    .get_function(callee)
                    .is_some_and(|f| f.is_declaration() && !resolved.contains(&f.name()));
                if is_unresolved {
                    return Err(EngineError::UnresolvedSymbol {
                        callee: callee.clone(),
                        caller: caller.name().to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Little-endian image of a global's initial value.
fn initializer(global: &GlobalVariable) -> Init {
    let size = global.ty.store_size() as usize;
    let contents: Vec<u8> = match (global.init, global.ty) {
        (Constant::Zero | Constant::Null, _) => return Init::Zeros { size },
        (Constant::Bool(b), _) => vec![b as u8],
        (Constant::Int(n), Type::I1) => vec![(n & 1) as u8],
        (Constant::Int(n), _) => n.to_le_bytes()[..size.min(8)].to_vec(),
        (Constant::Float(x), Type::Float) => (x as f32).to_le_bytes().to_vec(),
        (Constant::Float(x), _) => x.to_le_bytes().to_vec(),
    };
    Init::Bytes {
        contents: contents.into_boxed_slice(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global(ty: Type, init: Constant) -> GlobalVariable {
        GlobalVariable {
            name: "g".to_string(),
            ty,
            init,
            constant: false,
        }
    }

    fn bytes(init: Init) -> Vec<u8> {
        match init {
            Init::Bytes { contents } => contents.to_vec(),
            Init::Zeros { size } => vec![0; size],
            Init::Uninitialized => panic!("globals are always initialised"),
        }
    }

    #[test]
    fn test_initializers_are_little_endian() {
        assert_eq!(bytes(initializer(&global(Type::I32, Constant::Int(-2)))), vec![0xFE, 0xFF, 0xFF, 0xFF]);
        assert_eq!(bytes(initializer(&global(Type::I16, Constant::Int(0x1234)))), vec![0x34, 0x12]);
        assert_eq!(bytes(initializer(&global(Type::I1, Constant::Bool(true)))), vec![1]);
        assert_eq!(
            bytes(initializer(&global(Type::Float, Constant::Float(1.5)))),
            1.5f32.to_le_bytes().to_vec()
        );
        assert_eq!(bytes(initializer(&global(Type::Double, Constant::Zero))), vec![0; 8]);
    }

    #[test]
    fn test_uncalled_unresolved_declaration_is_allowed() {
        let module = kiln_ir::parse_text(
            "declare i32 @missing(i32)\n\
             define i32 @main() {\nentry:\n  ret i32 0\n}\n",
        )
        .unwrap();
        assert!(check_calls_resolve(&module, &[]).is_ok());
    }

    #[test]
    fn test_called_unresolved_declaration_is_reported() {
        let module = kiln_ir::parse_text(
            "declare i32 @missing(i32)\n\
             define i32 @main() {\nentry:\n  %r = call i32 @missing(i32 1)\n  ret i32 %r\n}\n",
        )
        .unwrap();
        match check_calls_resolve(&module, &[]) {
            Err(EngineError::UnresolvedSymbol { callee, caller }) => {
                assert_eq!(callee, "missing");
                assert_eq!(caller, "main");
            }
            other => panic!("expected an unresolved symbol, got {:?}", other.err()),
        }
        assert!(check_calls_resolve(&module, &["missing"]).is_ok());
    }
}
