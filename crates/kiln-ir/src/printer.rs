//! Textual rendering of modules. The output is accepted by the parser, so
//! `parse(print(m))` reproduces `m` up to the module name.

use std::fmt::{self, Display, Formatter};

use crate::inst::{Constant, Inst, InstKind, Operand, Terminator};
use crate::module::{Block, Function, GlobalVariable, Module};

impl Display for Constant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(value) => write!(f, "{}", value),
            Constant::Float(value) if value.is_finite() => write!(f, "{:?}", value),
            Constant::Float(value) => write!(f, "0x{:016X}", value.to_bits()),
            Constant::Bool(value) => write!(f, "{}", value),
            Constant::Null => f.write_str("null"),
            Constant::Zero => f.write_str("zeroinitializer"),
        }
    }
}

impl Display for Operand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Local(name) => write!(f, "%{}", name),
            Operand::Global(name) => write!(f, "@{}", name),
            Operand::Const(constant) => write!(f, "{}", constant),
        }
    }
}

impl Display for InstKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            InstKind::Binary { op, ty, lhs, rhs } => {
                write!(f, "{} {} {}, {}", op.mnemonic(), ty, lhs, rhs)
            }
            InstKind::ICmp { pred, ty, lhs, rhs } => {
                write!(f, "icmp {} {} {}, {}", pred.mnemonic(), ty, lhs, rhs)
            }
            InstKind::FCmp { pred, ty, lhs, rhs } => {
                write!(f, "fcmp {} {} {}, {}", pred.mnemonic(), ty, lhs, rhs)
            }
            InstKind::Cast {
                op,
                from,
                value,
                to,
            } => write!(f, "{} {} {} to {}", op.mnemonic(), from, value, to),
            InstKind::Select {
                cond,
                ty,
                on_true,
                on_false,
            } => write!(f, "select i1 {}, {} {}, {} {}", cond, ty, on_true, ty, on_false),
            InstKind::Phi { ty, incoming } => {
                write!(f, "phi {} ", ty)?;
                for (i, (value, label)) in incoming.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "[ {}, %{} ]", value, label)?;
                }
                Ok(())
            }
            InstKind::Call { ret, callee, args } => {
                write!(f, "call {} @{}(", ret, callee)?;
                for (i, (ty, value)) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} {}", ty, value)?;
                }
                f.write_str(")")
            }
            InstKind::Alloca { ty } => write!(f, "alloca {}", ty),
            InstKind::Load { ty, ptr } => write!(f, "load {}, ptr {}", ty, ptr),
            InstKind::Store { ty, value, ptr } => write!(f, "store {} {}, ptr {}", ty, value, ptr),
        }
    }
}

impl Display for Inst {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.result {
            write!(f, "%{} = ", name)?;
        }
        write!(f, "{}", self.kind)
    }
}

impl Display for Terminator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Ret(None) => f.write_str("ret void"),
            Terminator::Ret(Some((ty, value))) => write!(f, "ret {} {}", ty, value),
            Terminator::Br(target) => write!(f, "br label %{}", target),
            Terminator::CondBr {
                cond,
                on_true,
                on_false,
            } => write!(f, "br i1 {}, label %{}, label %{}", cond, on_true, on_false),
            Terminator::Unreachable => f.write_str("unreachable"),
        }
    }
}

impl Display for Block {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.label)?;
        for inst in &self.insts {
            writeln!(f, "  {}", inst)?;
        }
        writeln!(f, "  {}", self.terminator)
    }
}

impl Display for Function {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_declaration() {
            write!(f, "declare {} @{}(", self.return_type(), self.name())?;
            for (i, param) in self.params().iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", param.ty)?;
            }
            return writeln!(f, ")");
        }

        write!(f, "define {} @{}(", self.return_type(), self.name())?;
        for (i, param) in self.params().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} %{}", param.ty, param.name)?;
        }
        writeln!(f, ") {{")?;
        for block in self.blocks() {
            write!(f, "{}", block)?;
        }
        writeln!(f, "}}")
    }
}

impl Display for GlobalVariable {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let kind = if self.constant { "constant" } else { "global" };
        write!(f, "@{} = {} {} {}", self.name, kind, self.ty, self.init)
    }
}

impl Display for Module {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name())?;
        if !self.globals().is_empty() {
            writeln!(f)?;
            for global in self.globals() {
                writeln!(f, "{}", global)?;
            }
        }
        for function in self.functions() {
            writeln!(f)?;
            write!(f, "{}", function)?;
        }
        Ok(())
    }
}
