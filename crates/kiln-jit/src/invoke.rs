//! Calling compiled functions with host values.

use kiln_ir::Function;
use log::debug;

use crate::engine::ExecutionEngine;
use crate::error::InvokeError;
use crate::marshal::{host_to_native, native_to_host, NativeValue};
use crate::value::{HandleOrigin, Value};

/// Calls `function` with `args`, converting each argument by the category of
/// its declared parameter type and the result by the declared return type.
///
/// A pointer result equal to the address of one of the arguments is
/// returned as a handle tagged with that argument's origin.
pub fn invoke(
    engine: &ExecutionEngine,
    function: &Function,
    args: &[Value],
) -> Result<Value, InvokeError> {
    check_call(engine, function, args.len())?;

    let mut slots = Vec::with_capacity(args.len());
    for (index, (param, arg)) in function.params().iter().zip(args).enumerate() {
        let native = host_to_native(arg, param.ty.category())
            .map_err(|source| InvokeError::Argument { index, source })?;
        debug!("'@{}' arg {}: {:?} -> {:?}", function.name(), index, arg, native);
        slots.push(native.to_slot());
    }

    let bits = engine.call_slots(function.name(), &slots)?;
    let native = match NativeValue::from_slot(bits, function.return_type()) {
        NativeValue::Pointer(mut ptr) => {
            if let Some(origin) = argument_origin(args, ptr.addr) {
                ptr.origin = origin;
            }
            NativeValue::Pointer(ptr)
        }
        other => other,
    };
    let result =
        native_to_host(native, function.return_type().category()).map_err(InvokeError::Return)?;
    debug!("'@{}' returned {:?}", function.name(), result);
    Ok(result)
}

/// Calls `function` treating every argument and the result as a raw machine
/// integer. The result holds the zero-extended return bits.
///
/// Only meaningful for functions whose parameters and return are integers
/// or pointers; anything else reads back as unrelated bits.
pub fn invoke_raw(
    engine: &ExecutionEngine,
    function: &Function,
    args: &[i64],
) -> Result<i64, InvokeError> {
    check_call(engine, function, args.len())?;
    let slots: Vec<u64> = args.iter().map(|arg| *arg as u64).collect();
    let bits = engine.call_slots(function.name(), &slots)?;
    debug!("'@{}' raw call returned {:#x}", function.name(), bits);
    Ok(bits as i64)
}

fn check_call(engine: &ExecutionEngine, function: &Function, found: usize) -> Result<(), InvokeError> {
    if engine.module().get_function(function.name()) != Some(function) {
        return Err(InvokeError::ForeignFunction(function.name().to_string()));
    }
    let expected = function.param_count();
    if expected != found {
        return Err(InvokeError::Arity { expected, found });
    }
    Ok(())
}

fn argument_origin(args: &[Value], addr: usize) -> Option<HandleOrigin> {
    args.iter().find_map(|arg| match arg {
        Value::Handle(handle) if handle.addr() == addr => Some(handle.origin()),
        other => other
            .container()
            .filter(|(_, at)| *at == addr)
            .map(|(category, _)| HandleOrigin::Host(category)),
    })
}
