//! Uniform entry points for calling compiled code from the host.
//!
//! Every trampoline has the native signature `fn(args: *const u64, ret: *mut u64)`.
//! Argument `i` is read from `args[i]`; floats sit in the low 32 bits of their
//! slot, doubles use the whole slot. The result is written zero-extended to
//! `ret[0]`; nothing is written for `void`.

use cranelift_codegen::ir::{self, types, AbiParam, InstBuilder, MemFlags, Signature, UserFuncName};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::JITModule;
use cranelift_module::{FuncId, Module as _};
use kiln_ir::{FunctionType, Type};

use super::types::lower_type;

/// Native type of a finalized trampoline.
pub(crate) type Trampoline = unsafe extern "C" fn(*const u64, *mut u64);

pub(crate) const SLOT_SIZE: i32 = 8;

pub(crate) fn trampoline_name(function: &str) -> String {
    format!("__kiln_trampoline.{}", function)
}

pub(crate) fn trampoline_signature(jit: &JITModule) -> Signature {
    let pointer_type = jit.isa().pointer_type();
    let mut sig = Signature::new(jit.isa().default_call_conv());
    sig.params.push(AbiParam::new(pointer_type));
    sig.params.push(AbiParam::new(pointer_type));
    sig
}

/// Builds the trampoline `tramp_id` forwarding to `target`.
pub(crate) fn build_trampoline(
    jit: &mut JITModule,
    builder_ctx: &mut FunctionBuilderContext,
    tramp_id: FuncId,
    target: FuncId,
    ty: &FunctionType,
) -> ir::Function {
    let pointer_type = jit.isa().pointer_type();
    let mut func = ir::Function::with_name_signature(
        UserFuncName::user(0, tramp_id.as_u32()),
        trampoline_signature(jit),
    );
    let callee = jit.declare_func_in_func(target, &mut func);

    let mut builder = FunctionBuilder::new(&mut func, builder_ctx);
    let entry = builder.create_block();
    builder.append_block_params_for_function_params(entry);
    builder.switch_to_block(entry);
    builder.seal_block(entry);

    let params = builder.block_params(entry);
    let (args_ptr, ret_ptr) = (params[0], params[1]);

    let flags = MemFlags::trusted();
    let mut args = Vec::with_capacity(ty.params.len());
    for (index, param) in ty.params.iter().enumerate() {
        let offset = index as i32 * SLOT_SIZE;
        let Some(cl_ty) = lower_type(*param, pointer_type) else {
            continue;
        };
        let arg = match param {
            Type::Double => builder.ins().load(types::F64, flags, args_ptr, offset),
            Type::Float => {
                let bits = builder.ins().load(types::I32, flags, args_ptr, offset);
                builder.ins().bitcast(types::F32, MemFlags::new(), bits)
            }
            _ => {
                let slot = builder.ins().load(types::I64, flags, args_ptr, offset);
                let arg = if cl_ty == types::I64 {
                    slot
                } else {
                    builder.ins().ireduce(cl_ty, slot)
                };
                if *param == Type::I1 {
                    builder.ins().band_imm(arg, 1)
                } else {
                    arg
                }
            }
        };
        args.push(arg);
    }

    let call = builder.ins().call(callee, &args);
    if let Some(result) = builder.inst_results(call).first().copied() {
        let stored = match ty.ret {
            Type::Double => result,
            Type::Float => {
                let bits = builder.ins().bitcast(types::I32, MemFlags::new(), result);
                builder.ins().uextend(types::I64, bits)
            }
            _ if builder.func.dfg.value_type(result) == types::I64 => result,
            _ => builder.ins().uextend(types::I64, result),
        };
        builder.ins().store(flags, stored, ret_ptr, 0);
    }
    builder.ins().return_(&[]);
    builder.finalize();

    func
}
