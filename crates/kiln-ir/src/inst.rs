use crate::types::Type;

/// A literal operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    /// All-zero value of whatever type the operand slot has.
    Zero,
}

/// An instruction operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// `%name`: a parameter or instruction result of the enclosing function.
    Local(String),
    /// `@name`: the address of a global variable.
    Global(String),
    Const(Constant),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SRem,
    URem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
    FAdd,
    FSub,
    FMul,
    FDiv,
}

impl BinaryOp {
    pub const ALL: [BinaryOp; 17] = [
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::SDiv,
        BinaryOp::UDiv,
        BinaryOp::SRem,
        BinaryOp::URem,
        BinaryOp::And,
        BinaryOp::Or,
        BinaryOp::Xor,
        BinaryOp::Shl,
        BinaryOp::LShr,
        BinaryOp::AShr,
        BinaryOp::FAdd,
        BinaryOp::FSub,
        BinaryOp::FMul,
        BinaryOp::FDiv,
    ];

    pub fn mnemonic(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::SDiv => "sdiv",
            BinaryOp::UDiv => "udiv",
            BinaryOp::SRem => "srem",
            BinaryOp::URem => "urem",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Shl => "shl",
            BinaryOp::LShr => "lshr",
            BinaryOp::AShr => "ashr",
            BinaryOp::FAdd => "fadd",
            BinaryOp::FSub => "fsub",
            BinaryOp::FMul => "fmul",
            BinaryOp::FDiv => "fdiv",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.mnemonic() == s)
    }

    pub fn is_float(&self) -> bool {
        matches!(
            self,
            BinaryOp::FAdd | BinaryOp::FSub | BinaryOp::FMul | BinaryOp::FDiv
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntPredicate {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

impl IntPredicate {
    pub const ALL: [IntPredicate; 10] = [
        IntPredicate::Eq,
        IntPredicate::Ne,
        IntPredicate::Slt,
        IntPredicate::Sle,
        IntPredicate::Sgt,
        IntPredicate::Sge,
        IntPredicate::Ult,
        IntPredicate::Ule,
        IntPredicate::Ugt,
        IntPredicate::Uge,
    ];

    pub fn mnemonic(&self) -> &'static str {
        match self {
            IntPredicate::Eq => "eq",
            IntPredicate::Ne => "ne",
            IntPredicate::Slt => "slt",
            IntPredicate::Sle => "sle",
            IntPredicate::Sgt => "sgt",
            IntPredicate::Sge => "sge",
            IntPredicate::Ult => "ult",
            IntPredicate::Ule => "ule",
            IntPredicate::Ugt => "ugt",
            IntPredicate::Uge => "uge",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.mnemonic() == s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatPredicate {
    Oeq,
    One,
    Olt,
    Ole,
    Ogt,
    Oge,
    Ord,
    Ueq,
    Une,
    Ult,
    Ule,
    Ugt,
    Uge,
    Uno,
}

impl FloatPredicate {
    pub const ALL: [FloatPredicate; 14] = [
        FloatPredicate::Oeq,
        FloatPredicate::One,
        FloatPredicate::Olt,
        FloatPredicate::Ole,
        FloatPredicate::Ogt,
        FloatPredicate::Oge,
        FloatPredicate::Ord,
        FloatPredicate::Ueq,
        FloatPredicate::Une,
        FloatPredicate::Ult,
        FloatPredicate::Ule,
        FloatPredicate::Ugt,
        FloatPredicate::Uge,
        FloatPredicate::Uno,
    ];

    pub fn mnemonic(&self) -> &'static str {
        match self {
            FloatPredicate::Oeq => "oeq",
            FloatPredicate::One => "one",
            FloatPredicate::Olt => "olt",
            FloatPredicate::Ole => "ole",
            FloatPredicate::Ogt => "ogt",
            FloatPredicate::Oge => "oge",
            FloatPredicate::Ord => "ord",
            FloatPredicate::Ueq => "ueq",
            FloatPredicate::Une => "une",
            FloatPredicate::Ult => "ult",
            FloatPredicate::Ule => "ule",
            FloatPredicate::Ugt => "ugt",
            FloatPredicate::Uge => "uge",
            FloatPredicate::Uno => "uno",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.mnemonic() == s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastOp {
    Trunc,
    ZExt,
    SExt,
    FPTrunc,
    FPExt,
    FPToSI,
    FPToUI,
    SIToFP,
    UIToFP,
    PtrToInt,
    IntToPtr,
}

impl CastOp {
    pub const ALL: [CastOp; 11] = [
        CastOp::Trunc,
        CastOp::ZExt,
        CastOp::SExt,
        CastOp::FPTrunc,
        CastOp::FPExt,
        CastOp::FPToSI,
        CastOp::FPToUI,
        CastOp::SIToFP,
        CastOp::UIToFP,
        CastOp::PtrToInt,
        CastOp::IntToPtr,
    ];

    pub fn mnemonic(&self) -> &'static str {
        match self {
            CastOp::Trunc => "trunc",
            CastOp::ZExt => "zext",
            CastOp::SExt => "sext",
            CastOp::FPTrunc => "fptrunc",
            CastOp::FPExt => "fpext",
            CastOp::FPToSI => "fptosi",
            CastOp::FPToUI => "fptoui",
            CastOp::SIToFP => "sitofp",
            CastOp::UIToFP => "uitofp",
            CastOp::PtrToInt => "ptrtoint",
            CastOp::IntToPtr => "inttoptr",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.mnemonic() == s)
    }

    /// Whether converting `from` into `to` is a legal use of this cast.
    pub fn accepts(&self, from: Type, to: Type) -> bool {
        match (self, from, to) {
            (CastOp::Trunc, Type::Int(a), Type::Int(b)) => a > b,
            (CastOp::ZExt | CastOp::SExt, Type::Int(a), Type::Int(b)) => a < b,
            (CastOp::FPTrunc, Type::Double, Type::Float) => true,
            (CastOp::FPExt, Type::Float, Type::Double) => true,
            (CastOp::FPToSI | CastOp::FPToUI, f, Type::Int(_)) => f.is_float(),
            (CastOp::SIToFP | CastOp::UIToFP, Type::Int(_), f) => f.is_float(),
            (CastOp::PtrToInt, Type::Ptr, Type::Int(_)) => true,
            (CastOp::IntToPtr, Type::Int(_), Type::Ptr) => true,
            _ => false,
        }
    }
}

/// A non-terminator instruction together with the local it defines, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Inst {
    pub result: Option<String>,
    pub kind: InstKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstKind {
    Binary {
        op: BinaryOp,
        ty: Type,
        lhs: Operand,
        rhs: Operand,
    },
    ICmp {
        pred: IntPredicate,
        ty: Type,
        lhs: Operand,
        rhs: Operand,
    },
    FCmp {
        pred: FloatPredicate,
        ty: Type,
        lhs: Operand,
        rhs: Operand,
    },
    Cast {
        op: CastOp,
        from: Type,
        value: Operand,
        to: Type,
    },
    Select {
        cond: Operand,
        ty: Type,
        on_true: Operand,
        on_false: Operand,
    },
    Phi {
        ty: Type,
        incoming: Vec<(Operand, String)>,
    },
    Call {
        ret: Type,
        callee: String,
        args: Vec<(Type, Operand)>,
    },
    Alloca {
        ty: Type,
    },
    Load {
        ty: Type,
        ptr: Operand,
    },
    Store {
        ty: Type,
        value: Operand,
        ptr: Operand,
    },
}

impl InstKind {
    /// The type of the value this instruction produces, or `Void`.
    pub fn result_type(&self) -> Type {
        match self {
            InstKind::Binary { ty, .. } => *ty,
            InstKind::ICmp { .. } | InstKind::FCmp { .. } => Type::I1,
            InstKind::Cast { to, .. } => *to,
            InstKind::Select { ty, .. } => *ty,
            InstKind::Phi { ty, .. } => *ty,
            InstKind::Call { ret, .. } => *ret,
            InstKind::Alloca { .. } => Type::Ptr,
            InstKind::Load { ty, .. } => *ty,
            InstKind::Store { .. } => Type::Void,
        }
    }
}

/// The single control-flow instruction that ends every block.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Ret(Option<(Type, Operand)>),
    Br(String),
    CondBr {
        cond: Operand,
        on_true: String,
        on_false: String,
    },
    Unreachable,
}

impl Terminator {
    pub fn successors(&self) -> Vec<&str> {
        match self {
            Terminator::Br(target) => vec![target.as_str()],
            Terminator::CondBr {
                on_true, on_false, ..
            } => vec![on_true.as_str(), on_false.as_str()],
            Terminator::Ret(_) | Terminator::Unreachable => Vec::new(),
        }
    }
}
