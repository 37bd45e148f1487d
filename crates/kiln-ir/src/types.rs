use std::fmt;

/// The closed set of categories that drive every marshaling decision at the
/// call boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeTypeCategory {
    Void,
    Float32,
    Float64,
    Integer,
    Pointer,
}

impl fmt::Display for NativeTypeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NativeTypeCategory::Void => "void",
            NativeTypeCategory::Float32 => "float",
            NativeTypeCategory::Float64 => "double",
            NativeTypeCategory::Integer => "integer",
            NativeTypeCategory::Pointer => "pointer",
        };
        f.write_str(name)
    }
}

/// A first-class IR type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Float,
    Double,
    /// Integer of the given bit width. Only the widths in [`Type::INT_WIDTHS`]
    /// are constructed by the parser and the bitcode reader.
    Int(u32),
    Ptr,
}

impl Type {
    pub const INT_WIDTHS: [u32; 5] = [1, 8, 16, 32, 64];

    pub const I1: Type = Type::Int(1);
    pub const I8: Type = Type::Int(8);
    pub const I16: Type = Type::Int(16);
    pub const I32: Type = Type::Int(32);
    pub const I64: Type = Type::Int(64);

    /// Returns the integer type of `bits` width if that width is supported.
    pub fn int(bits: u32) -> Option<Type> {
        Self::INT_WIDTHS.contains(&bits).then_some(Type::Int(bits))
    }

    pub fn category(&self) -> NativeTypeCategory {
        match self {
            Type::Void => NativeTypeCategory::Void,
            Type::Float => NativeTypeCategory::Float32,
            Type::Double => NativeTypeCategory::Float64,
            Type::Int(_) => NativeTypeCategory::Integer,
            Type::Ptr => NativeTypeCategory::Pointer,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Int(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float | Type::Double)
    }

    /// Bit width of the type's value representation; pointers use the host
    /// pointer width.
    pub fn bit_width(&self) -> u32 {
        match self {
            Type::Void => 0,
            Type::Float => 32,
            Type::Double => 64,
            Type::Int(bits) => *bits,
            Type::Ptr => usize::BITS,
        }
    }

    /// Size in bytes when stored in memory. `i1` occupies one byte.
    pub fn store_size(&self) -> u32 {
        self.bit_width().div_ceil(8)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => f.write_str("void"),
            Type::Float => f.write_str("float"),
            Type::Double => f.write_str("double"),
            Type::Int(bits) => write!(f, "i{}", bits),
            Type::Ptr => f.write_str("ptr"),
        }
    }
}

/// The signature of a function: one return type and a fixed, ordered list of
/// parameter types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub ret: Type,
    pub params: Vec<Type>,
}

impl FunctionType {
    pub fn new(ret: Type, params: Vec<Type>) -> Self {
        Self { ret, params }
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (", self.ret)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", param)?;
        }
        f.write_str(")")
    }
}
