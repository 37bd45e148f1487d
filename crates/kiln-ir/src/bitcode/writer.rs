use std::io::{self, Write};

use super::{tag, MAGIC, VERSION};
use crate::inst::{BinaryOp, CastOp, Constant, FloatPredicate, Inst, InstKind, IntPredicate, Operand, Terminator};
use crate::module::{Function, Module};
use crate::types::Type;

/// Encodes `module` into `out`.
pub fn write_module<W: Write>(module: &Module, out: &mut W) -> io::Result<()> {
    let mut w = Writer { out };
    w.out.write_all(&MAGIC)?;
    w.out.write_all(&[VERSION])?;
    w.str(module.name())?;

    w.uint(module.globals().len() as u64)?;
    for global in module.globals() {
        w.str(&global.name)?;
        w.ty(global.ty)?;
        w.out.write_all(&[global.constant as u8])?;
        w.constant(&global.init)?;
    }

    w.uint(module.functions().len() as u64)?;
    for function in module.functions() {
        w.function(function)?;
    }
    w.out.flush()
}

struct Writer<'w, W: Write> {
    out: &'w mut W,
}

impl<W: Write> Writer<'_, W> {
    fn uint(&mut self, value: u64) -> io::Result<()> {
        leb128::write::unsigned(self.out, value).map(|_| ())
    }

    fn sint(&mut self, value: i64) -> io::Result<()> {
        leb128::write::signed(self.out, value).map(|_| ())
    }

    fn index<T: PartialEq>(&mut self, all: &[T], item: &T) -> io::Result<()> {
        let position = all.iter().position(|x| x == item).unwrap_or_default();
        self.uint(position as u64)
    }

    fn str(&mut self, s: &str) -> io::Result<()> {
        self.uint(s.len() as u64)?;
        self.out.write_all(s.as_bytes())
    }

    fn ty(&mut self, ty: Type) -> io::Result<()> {
        match ty {
            Type::Void => self.uint(tag::TYPE_VOID),
            Type::Float => self.uint(tag::TYPE_FLOAT),
            Type::Double => self.uint(tag::TYPE_DOUBLE),
            Type::Int(bits) => {
                self.uint(tag::TYPE_INT)?;
                self.uint(bits as u64)
            }
            Type::Ptr => self.uint(tag::TYPE_PTR),
        }
    }

    fn constant(&mut self, constant: &Constant) -> io::Result<()> {
        match constant {
            Constant::Int(value) => {
                self.uint(tag::CONST_INT)?;
                self.sint(*value)
            }
            Constant::Float(value) => {
                self.uint(tag::CONST_FLOAT)?;
                self.uint(value.to_bits())
            }
            Constant::Bool(value) => {
                self.uint(tag::CONST_BOOL)?;
                self.out.write_all(&[*value as u8])
            }
            Constant::Null => self.uint(tag::CONST_NULL),
            Constant::Zero => self.uint(tag::CONST_ZERO),
        }
    }

    fn operand(&mut self, operand: &Operand) -> io::Result<()> {
        match operand {
            Operand::Local(name) => {
                self.uint(tag::OPERAND_LOCAL)?;
                self.str(name)
            }
            Operand::Global(name) => {
                self.uint(tag::OPERAND_GLOBAL)?;
                self.str(name)
            }
            Operand::Const(constant) => {
                self.uint(tag::OPERAND_CONST)?;
                self.constant(constant)
            }
        }
    }

    fn function(&mut self, function: &Function) -> io::Result<()> {
        self.str(function.name())?;
        self.ty(function.return_type())?;
        self.uint(function.param_count() as u64)?;
        for param in function.params() {
            self.str(&param.name)?;
            self.ty(param.ty)?;
        }

        self.uint(function.blocks().len() as u64)?;
        for block in function.blocks() {
            self.str(&block.label)?;
            self.uint(block.insts.len() as u64)?;
            for inst in &block.insts {
                self.inst(inst)?;
            }
            self.terminator(&block.terminator)?;
        }
        Ok(())
    }

    fn inst(&mut self, inst: &Inst) -> io::Result<()> {
        match &inst.result {
            Some(name) => {
                self.out.write_all(&[1])?;
                self.str(name)?;
            }
            None => self.out.write_all(&[0])?,
        }

        match &inst.kind {
            InstKind::Binary { op, ty, lhs, rhs } => {
                self.uint(tag::INST_BINARY)?;
                self.index(&BinaryOp::ALL, op)?;
                self.ty(*ty)?;
                self.operand(lhs)?;
                self.operand(rhs)
            }
            InstKind::ICmp { pred, ty, lhs, rhs } => {
                self.uint(tag::INST_ICMP)?;
                self.index(&IntPredicate::ALL, pred)?;
                self.ty(*ty)?;
                self.operand(lhs)?;
                self.operand(rhs)
            }
            InstKind::FCmp { pred, ty, lhs, rhs } => {
                self.uint(tag::INST_FCMP)?;
                self.index(&FloatPredicate::ALL, pred)?;
                self.ty(*ty)?;
                self.operand(lhs)?;
                self.operand(rhs)
            }
            InstKind::Cast {
                op,
                from,
                value,
                to,
            } => {
                self.uint(tag::INST_CAST)?;
                self.index(&CastOp::ALL, op)?;
                self.ty(*from)?;
                self.operand(value)?;
                self.ty(*to)
            }
            InstKind::Select {
                cond,
                ty,
                on_true,
                on_false,
            } => {
                self.uint(tag::INST_SELECT)?;
                self.operand(cond)?;
                self.ty(*ty)?;
                self.operand(on_true)?;
                self.operand(on_false)
            }
            InstKind::Phi { ty, incoming } => {
                self.uint(tag::INST_PHI)?;
                self.ty(*ty)?;
                self.uint(incoming.len() as u64)?;
                for (value, label) in incoming {
                    self.operand(value)?;
                    self.str(label)?;
                }
                Ok(())
            }
            InstKind::Call { ret, callee, args } => {
                self.uint(tag::INST_CALL)?;
                self.ty(*ret)?;
                self.str(callee)?;
                self.uint(args.len() as u64)?;
                for (ty, value) in args {
                    self.ty(*ty)?;
                    self.operand(value)?;
                }
                Ok(())
            }
            InstKind::Alloca { ty } => {
                self.uint(tag::INST_ALLOCA)?;
                self.ty(*ty)
            }
            InstKind::Load { ty, ptr } => {
                self.uint(tag::INST_LOAD)?;
                self.ty(*ty)?;
                self.operand(ptr)
            }
            InstKind::Store { ty, value, ptr } => {
                self.uint(tag::INST_STORE)?;
                self.ty(*ty)?;
                self.operand(value)?;
                self.operand(ptr)
            }
        }
    }

    fn terminator(&mut self, terminator: &Terminator) -> io::Result<()> {
        match terminator {
            Terminator::Ret(None) => self.uint(tag::TERM_RET_VOID),
            Terminator::Ret(Some((ty, value))) => {
                self.uint(tag::TERM_RET)?;
                self.ty(*ty)?;
                self.operand(value)
            }
            Terminator::Br(target) => {
                self.uint(tag::TERM_BR)?;
                self.str(target)
            }
            Terminator::CondBr {
                cond,
                on_true,
                on_false,
            } => {
                self.uint(tag::TERM_COND_BR)?;
                self.operand(cond)?;
                self.str(on_true)?;
                self.str(on_false)
            }
            Terminator::Unreachable => self.uint(tag::TERM_UNREACHABLE),
        }
    }
}
