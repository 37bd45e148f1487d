use cranelift_codegen::ir::{types, AbiParam, Signature};
use cranelift_codegen::isa::CallConv;
use kiln_ir::{FunctionType, Type};

/// Lowers an IR type to the Cranelift type that carries it.
///
/// `i1` lives in an `I8` holding 0 or 1. Returns `None` for `void`.
pub(crate) fn lower_type(ty: Type, pointer_type: types::Type) -> Option<types::Type> {
    match ty {
        Type::Void => None,
        Type::Float => Some(types::F32),
        Type::Double => Some(types::F64),
        Type::Int(1) | Type::Int(8) => Some(types::I8),
        Type::Int(16) => Some(types::I16),
        Type::Int(32) => Some(types::I32),
        Type::Int(_) => Some(types::I64),
        Type::Ptr => Some(pointer_type),
    }
}

/// Builds the native signature of a function type.
pub(crate) fn lower_signature(
    ty: &FunctionType,
    call_conv: CallConv,
    pointer_type: types::Type,
) -> Signature {
    let mut sig = Signature::new(call_conv);
    for param in &ty.params {
        if let Some(cl_ty) = lower_type(*param, pointer_type) {
            sig.params.push(AbiParam::new(cl_ty));
        }
    }
    if let Some(ret) = lower_type(ty.ret, pointer_type) {
        sig.returns.push(AbiParam::new(ret));
    }
    sig
}

/// Mask selecting the low `bits` of a 64-bit value.
pub(crate) fn width_mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}
