//! Conversion between host [`Value`]s and native call-boundary values.
//!
//! Every conversion is driven by the declared category of the parameter or
//! return slot, never by inspecting the value.

use kiln_ir::{NativeTypeCategory, Type};

use crate::error::MarshalError;
use crate::translator::types::width_mask;
use crate::value::{HandleOrigin, OpaqueHandle, Value};

/// An integer at the call boundary: the low `width` bits of `bits`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeInt {
    pub width: u32,
    pub bits: u64,
}

impl NativeInt {
    pub fn new(width: u32, bits: u64) -> Self {
        Self {
            width,
            bits: bits & width_mask(width),
        }
    }

    /// Machine word sized integer.
    pub fn word(value: i64) -> Self {
        Self::new(usize::BITS, value as u64)
    }

    pub fn sign_extended(&self) -> i64 {
        if self.width >= 64 {
            return self.bits as i64;
        }
        let shift = 64 - self.width;
        ((self.bits << shift) as i64) >> shift
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativePtr {
    pub addr: usize,
    pub origin: HandleOrigin,
}

/// A value in the representation the compiled calling convention expects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NativeValue {
    Float(f32),
    Double(f64),
    Int(NativeInt),
    Pointer(NativePtr),
    Void,
}

impl NativeValue {
    fn kind(&self) -> &'static str {
        match self {
            NativeValue::Float(_) => "float",
            NativeValue::Double(_) => "double",
            NativeValue::Int(_) => "integer",
            NativeValue::Pointer(_) => "pointer",
            NativeValue::Void => "void",
        }
    }

    /// Encodes the value into one 64-bit argument slot of a trampoline.
    pub(crate) fn to_slot(self) -> u64 {
        match self {
            NativeValue::Float(f) => f.to_bits() as u64,
            NativeValue::Double(d) => d.to_bits(),
            NativeValue::Int(n) => n.bits,
            NativeValue::Pointer(p) => p.addr as u64,
            NativeValue::Void => 0,
        }
    }

    /// Decodes a trampoline return slot according to the declared type.
    pub(crate) fn from_slot(slot: u64, ty: Type) -> NativeValue {
        match ty {
            Type::Void => NativeValue::Void,
            Type::Float => NativeValue::Float(f32::from_bits(slot as u32)),
            Type::Double => NativeValue::Double(f64::from_bits(slot)),
            Type::Int(width) => NativeValue::Int(NativeInt::new(width, slot)),
            Type::Ptr => NativeValue::Pointer(NativePtr {
                addr: slot as usize,
                origin: HandleOrigin::Native,
            }),
        }
    }
}

/// Converts `value` for a slot of the given category.
pub fn host_to_native(
    value: &Value,
    category: NativeTypeCategory,
) -> Result<NativeValue, MarshalError> {
    let unsupported = || MarshalError::ArgumentType {
        value: value.type_name(),
        category,
    };

    match category {
        NativeTypeCategory::Void => Err(MarshalError::Unconvertible { category }),
        NativeTypeCategory::Float32 => match value {
            Value::Int(n) => Ok(NativeValue::Float(*n as f32)),
            Value::Float(x) => Ok(NativeValue::Float(*x as f32)),
            _ => Err(unsupported()),
        },
        NativeTypeCategory::Float64 => match value {
            Value::Int(n) => Ok(NativeValue::Double(*n as f64)),
            Value::Float(x) => Ok(NativeValue::Double(*x)),
            _ => Err(unsupported()),
        },
        // Integers travel at machine word width whatever the declared width;
        // the callee only reads the low bits it needs.
        NativeTypeCategory::Integer => match value {
            Value::Bool(b) => Ok(NativeValue::Int(NativeInt::word(*b as i64))),
            Value::Nil => Ok(NativeValue::Int(NativeInt::word(0))),
            Value::Int(n) => Ok(NativeValue::Int(NativeInt::word(*n))),
            Value::Float(x) => Ok(NativeValue::Int(NativeInt::word(float_to_int(*x)?))),
            _ => Err(unsupported()),
        },
        NativeTypeCategory::Pointer => {
            let ptr = match value {
                Value::Nil => NativePtr {
                    addr: 0,
                    origin: HandleOrigin::Native,
                },
                Value::Handle(handle) => NativePtr {
                    addr: handle.addr(),
                    origin: handle.origin(),
                },
                // An empty buffer has no allocation to point at.
                Value::Str(bytes) if bytes.borrow().is_empty() => {
                    return Err(MarshalError::ArgumentType {
                        value: "empty string",
                        category,
                    })
                }
                other => match other.container() {
                    Some((host, addr)) => NativePtr {
                        addr,
                        origin: HandleOrigin::Host(host),
                    },
                    None => return Err(unsupported()),
                },
            };
            Ok(NativeValue::Pointer(ptr))
        }
    }
}

/// Truncates toward zero, rejecting values with no `i64` representation.
fn float_to_int(x: f64) -> Result<i64, MarshalError> {
    // 2^63 is the first value past i64::MAX that an f64 can hold exactly.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    let t = x.trunc();
    if !x.is_finite() || t >= LIMIT || t < -LIMIT {
        return Err(MarshalError::OutOfRange(x));
    }
    Ok(t as i64)
}

/// Converts a native result back into a host value.
///
/// Integers are sign-extended from their width, so a set `i1` reads as -1.
/// Pointers come back as opaque handles and a null pointer as `nil`.
pub fn native_to_host(
    native: NativeValue,
    category: NativeTypeCategory,
) -> Result<Value, MarshalError> {
    let value = match (category, native) {
        (NativeTypeCategory::Void, NativeValue::Void) => Value::Nil,
        (NativeTypeCategory::Float32, NativeValue::Float(f)) => Value::Float(f as f64),
        (NativeTypeCategory::Float64, NativeValue::Double(d)) => Value::Float(d),
        (NativeTypeCategory::Integer, NativeValue::Int(n)) => Value::Int(n.sign_extended()),
        (NativeTypeCategory::Pointer, NativeValue::Pointer(p)) if p.addr == 0 => Value::Nil,
        (NativeTypeCategory::Pointer, NativeValue::Pointer(p)) => {
            Value::Handle(OpaqueHandle::new(p.addr, p.origin))
        }
        (category, other) => {
            return Err(MarshalError::Mismatch {
                found: other.kind(),
                category,
            })
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::HostCategory;

    fn int_bits(value: &Value) -> u64 {
        match host_to_native(value, NativeTypeCategory::Integer).unwrap() {
            NativeValue::Int(n) => n.bits,
            other => panic!("expected integer, got {:?}", other),
        }
    }

    #[test]
    fn test_bool_and_nil_coerce_to_integers() {
        assert_eq!(int_bits(&Value::Bool(true)), 1);
        assert_eq!(int_bits(&Value::Bool(false)), 0);
        assert_eq!(int_bits(&Value::Nil), 0);
    }

    #[test]
    fn test_integers_use_machine_word_width() {
        match host_to_native(&Value::Int(-1), NativeTypeCategory::Integer).unwrap() {
            NativeValue::Int(n) => {
                assert_eq!(n.width, usize::BITS);
                assert_eq!(n.sign_extended(), -1);
            }
            other => panic!("expected integer, got {:?}", other),
        }
    }

    #[test]
    fn test_float_to_integer_truncates() {
        assert_eq!(int_bits(&Value::Float(3.9)) as i64, 3);
        assert_eq!(int_bits(&Value::Float(-3.9)) as i64, -3);
        assert!(matches!(
            host_to_native(&Value::Float(f64::NAN), NativeTypeCategory::Integer),
            Err(MarshalError::OutOfRange(x)) if x.is_nan()
        ));
        assert!(host_to_native(&Value::Float(1e19), NativeTypeCategory::Integer).is_err());
    }

    #[test]
    fn test_double_round_trip() {
        for x in [0.0, -0.0, 1.5, -2.25e-300, f64::MAX, f64::MIN_POSITIVE, 123456.789] {
            let native = host_to_native(&Value::Float(x), NativeTypeCategory::Float64).unwrap();
            let back = native_to_host(native, NativeTypeCategory::Float64).unwrap();
            assert_eq!(back.as_float().map(f64::to_bits), Some(x.to_bits()));
        }
    }

    #[test]
    fn test_float32_narrows() {
        let native = host_to_native(&Value::Float(0.1), NativeTypeCategory::Float32).unwrap();
        assert_eq!(native, NativeValue::Float(0.1f32));
        assert_eq!(
            native_to_host(native, NativeTypeCategory::Float32).unwrap(),
            Value::Float(0.1f32 as f64)
        );
    }

    #[test]
    fn test_pointer_marshaling() {
        let nil = host_to_native(&Value::Nil, NativeTypeCategory::Pointer).unwrap();
        assert_eq!(nil.to_slot(), 0);

        let err = host_to_native(&Value::Int(42), NativeTypeCategory::Pointer).unwrap_err();
        assert_eq!(
            err,
            MarshalError::ArgumentType {
                value: "integer",
                category: NativeTypeCategory::Pointer
            }
        );

        let array = Value::array(vec![Value::Int(1)]);
        match host_to_native(&array, NativeTypeCategory::Pointer).unwrap() {
            NativeValue::Pointer(p) => {
                assert_ne!(p.addr, 0);
                assert_eq!(p.origin, HandleOrigin::Host(HostCategory::Array));
            }
            other => panic!("expected pointer, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_string_has_no_address() {
        assert_eq!(
            host_to_native(&Value::str(""), NativeTypeCategory::Pointer),
            Err(MarshalError::ArgumentType {
                value: "empty string",
                category: NativeTypeCategory::Pointer
            })
        );
        match host_to_native(&Value::c_str(""), NativeTypeCategory::Pointer).unwrap() {
            NativeValue::Pointer(p) => assert_eq!(p.origin, HandleOrigin::Host(HostCategory::Str)),
            other => panic!("expected pointer, got {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_float_inputs() {
        for v in [Value::Nil, Value::Bool(true), Value::str("1.0")] {
            assert!(matches!(
                host_to_native(&v, NativeTypeCategory::Float64),
                Err(MarshalError::ArgumentType { .. })
            ));
        }
        assert!(matches!(
            host_to_native(&Value::Int(1), NativeTypeCategory::Void),
            Err(MarshalError::Unconvertible { .. })
        ));
    }

    #[test]
    fn test_native_integers_sign_extend() {
        let byte = NativeValue::Int(NativeInt::new(8, 0xFF));
        assert_eq!(native_to_host(byte, NativeTypeCategory::Integer).unwrap(), Value::Int(-1));
        let flag = NativeValue::Int(NativeInt::new(1, 1));
        assert_eq!(native_to_host(flag, NativeTypeCategory::Integer).unwrap(), Value::Int(-1));
        let clear = NativeValue::Int(NativeInt::new(1, 0));
        assert_eq!(native_to_host(clear, NativeTypeCategory::Integer).unwrap(), Value::Int(0));
    }

    #[test]
    fn test_pointer_results() {
        let null = NativeValue::from_slot(0, Type::Ptr);
        assert_eq!(native_to_host(null, NativeTypeCategory::Pointer).unwrap(), Value::Nil);

        let some = NativeValue::from_slot(0x1000, Type::Ptr);
        let handle = native_to_host(some, NativeTypeCategory::Pointer)
            .unwrap()
            .as_handle()
            .unwrap();
        assert_eq!(handle.addr(), 0x1000);
        assert_eq!(handle.origin(), HandleOrigin::Native);
    }

    #[test]
    fn test_void_result_is_nil() {
        assert_eq!(
            native_to_host(NativeValue::Void, NativeTypeCategory::Void).unwrap(),
            Value::Nil
        );
        assert!(native_to_host(NativeValue::Void, NativeTypeCategory::Integer).is_err());
    }
}
