use super::{tag, MAGIC, VERSION};
use crate::error::BitcodeError;
use crate::inst::{BinaryOp, CastOp, Constant, FloatPredicate, Inst, InstKind, IntPredicate, Operand, Terminator};
use crate::module::{Block, Function, Module, Param};
use crate::types::Type;
use crate::verify::verify_module;

type Result<T> = std::result::Result<T, BitcodeError>;

/// Decodes and verifies a module from `bytes`.
pub fn read_module(bytes: &[u8]) -> Result<Module> {
    let mut r = Reader { input: bytes };
    let magic = r.bytes(MAGIC.len())?;
    if magic != MAGIC {
        return Err(BitcodeError::new("invalid bitcode magic"));
    }
    let version = r.byte()?;
    if version != VERSION {
        return Err(BitcodeError::new(format!(
            "unsupported bitcode version {} (expected {})",
            version, VERSION
        )));
    }

    let mut module = Module::new(r.str()?);

    let globals = r.uint()?;
    for _ in 0..globals {
        let name = r.str()?;
        let ty = r.ty()?;
        let constant = r.flag()?;
        let init = r.constant()?;
        module
            .add_global(name, ty, init, constant)
            .map_err(|e| BitcodeError::new(e.to_string()))?;
    }

    let functions = r.uint()?;
    for _ in 0..functions {
        let function = r.function()?;
        module
            .add_function(function)
            .map_err(|e| BitcodeError::new(e.to_string()))?;
    }

    if !r.input.is_empty() {
        return Err(BitcodeError::new(format!(
            "{} trailing bytes after module",
            r.input.len()
        )));
    }

    verify_module(&module)?;
    log::debug!(
        "decoded bitcode module '{}' ({} functions, {} globals)",
        module.name(),
        module.functions().len(),
        module.globals().len()
    );
    Ok(module)
}

fn eof() -> BitcodeError {
    BitcodeError::new("unexpected end of bitcode")
}

struct Reader<'a> {
    input: &'a [u8],
}

impl<'a> Reader<'a> {
    fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.input.len() < len {
            return Err(eof());
        }
        let (head, rest) = self.input.split_at(len);
        self.input = rest;
        Ok(head)
    }

    fn byte(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    fn flag(&mut self) -> Result<bool> {
        match self.byte()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(BitcodeError::new(format!("invalid flag byte {}", other))),
        }
    }

    fn uint(&mut self) -> Result<u64> {
        leb128::read::unsigned(&mut self.input).map_err(leb_error)
    }

    fn sint(&mut self) -> Result<i64> {
        leb128::read::signed(&mut self.input).map_err(leb_error)
    }

    fn len(&mut self) -> Result<usize> {
        let value = self.uint()?;
        usize::try_from(value).map_err(|_| BitcodeError::new(format!("length {} is too large", value)))
    }

    fn str(&mut self) -> Result<String> {
        let len = self.len()?;
        let bytes = self.bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| BitcodeError::new("string is not valid UTF-8"))
    }

    fn pick<T: Copy>(&mut self, all: &[T], what: &str) -> Result<T> {
        let index = self.uint()?;
        usize::try_from(index)
            .ok()
            .and_then(|i| all.get(i).copied())
            .ok_or_else(|| BitcodeError::new(format!("invalid {} index {}", what, index)))
    }

    fn ty(&mut self) -> Result<Type> {
        match self.uint()? {
            tag::TYPE_VOID => Ok(Type::Void),
            tag::TYPE_FLOAT => Ok(Type::Float),
            tag::TYPE_DOUBLE => Ok(Type::Double),
            tag::TYPE_INT => {
                let bits = self.uint()?;
                u32::try_from(bits)
                    .ok()
                    .and_then(Type::int)
                    .ok_or_else(|| BitcodeError::new(format!("unsupported integer width {}", bits)))
            }
            tag::TYPE_PTR => Ok(Type::Ptr),
            other => Err(BitcodeError::new(format!("invalid type tag {}", other))),
        }
    }

    fn constant(&mut self) -> Result<Constant> {
        match self.uint()? {
            tag::CONST_INT => Ok(Constant::Int(self.sint()?)),
            tag::CONST_FLOAT => Ok(Constant::Float(f64::from_bits(self.uint()?))),
            tag::CONST_BOOL => Ok(Constant::Bool(self.flag()?)),
            tag::CONST_NULL => Ok(Constant::Null),
            tag::CONST_ZERO => Ok(Constant::Zero),
            other => Err(BitcodeError::new(format!("invalid constant tag {}", other))),
        }
    }

    fn operand(&mut self) -> Result<Operand> {
        match self.uint()? {
            tag::OPERAND_LOCAL => Ok(Operand::Local(self.str()?)),
            tag::OPERAND_GLOBAL => Ok(Operand::Global(self.str()?)),
            tag::OPERAND_CONST => Ok(Operand::Const(self.constant()?)),
            other => Err(BitcodeError::new(format!("invalid operand tag {}", other))),
        }
    }

    fn function(&mut self) -> Result<Function> {
        let name = self.str()?;
        let ret = self.ty()?;

        let param_count = self.uint()?;
        let mut params = Vec::new();
        for _ in 0..param_count {
            let name = self.str()?;
            let ty = self.ty()?;
            params.push(Param { name, ty });
        }

        let block_count = self.uint()?;
        let mut blocks = Vec::new();
        for _ in 0..block_count {
            let label = self.str()?;
            let inst_count = self.uint()?;
            let mut insts = Vec::new();
            for _ in 0..inst_count {
                insts.push(self.inst()?);
            }
            let terminator = self.terminator()?;
            blocks.push(Block {
                label,
                insts,
                terminator,
            });
        }

        Ok(Function::definition(name, ret, params, blocks))
    }

    fn inst(&mut self) -> Result<Inst> {
        let result = if self.flag()? { Some(self.str()?) } else { None };

        let kind = match self.uint()? {
            tag::INST_BINARY => InstKind::Binary {
                op: self.pick(&BinaryOp::ALL, "binary operator")?,
                ty: self.ty()?,
                lhs: self.operand()?,
                rhs: self.operand()?,
            },
            tag::INST_ICMP => InstKind::ICmp {
                pred: self.pick(&IntPredicate::ALL, "icmp predicate")?,
                ty: self.ty()?,
                lhs: self.operand()?,
                rhs: self.operand()?,
            },
            tag::INST_FCMP => InstKind::FCmp {
                pred: self.pick(&FloatPredicate::ALL, "fcmp predicate")?,
                ty: self.ty()?,
                lhs: self.operand()?,
                rhs: self.operand()?,
            },
            tag::INST_CAST => InstKind::Cast {
                op: self.pick(&CastOp::ALL, "cast operator")?,
                from: self.ty()?,
                value: self.operand()?,
                to: self.ty()?,
            },
            tag::INST_SELECT => InstKind::Select {
                cond: self.operand()?,
                ty: self.ty()?,
                on_true: self.operand()?,
                on_false: self.operand()?,
            },
            tag::INST_PHI => {
                let ty = self.ty()?;
                let count = self.uint()?;
                let mut incoming = Vec::new();
                for _ in 0..count {
                    let value = self.operand()?;
                    let label = self.str()?;
                    incoming.push((value, label));
                }
                InstKind::Phi { ty, incoming }
            }
            tag::INST_CALL => {
                let ret = self.ty()?;
                let callee = self.str()?;
                let count = self.uint()?;
                let mut args = Vec::new();
                for _ in 0..count {
                    let ty = self.ty()?;
                    let value = self.operand()?;
                    args.push((ty, value));
                }
                InstKind::Call { ret, callee, args }
            }
            tag::INST_ALLOCA => InstKind::Alloca { ty: self.ty()? },
            tag::INST_LOAD => InstKind::Load {
                ty: self.ty()?,
                ptr: self.operand()?,
            },
            tag::INST_STORE => InstKind::Store {
                ty: self.ty()?,
                value: self.operand()?,
                ptr: self.operand()?,
            },
            other => return Err(BitcodeError::new(format!("invalid instruction tag {}", other))),
        };

        Ok(Inst { result, kind })
    }

    fn terminator(&mut self) -> Result<Terminator> {
        match self.uint()? {
            tag::TERM_RET_VOID => Ok(Terminator::Ret(None)),
            tag::TERM_RET => {
                let ty = self.ty()?;
                let value = self.operand()?;
                Ok(Terminator::Ret(Some((ty, value))))
            }
            tag::TERM_BR => Ok(Terminator::Br(self.str()?)),
            tag::TERM_COND_BR => Ok(Terminator::CondBr {
                cond: self.operand()?,
                on_true: self.str()?,
                on_false: self.str()?,
            }),
            tag::TERM_UNREACHABLE => Ok(Terminator::Unreachable),
            other => Err(BitcodeError::new(format!("invalid terminator tag {}", other))),
        }
    }
}

fn leb_error(error: leb128::read::Error) -> BitcodeError {
    match error {
        leb128::read::Error::IoError(_) => eof(),
        leb128::read::Error::Overflow => BitcodeError::new("LEB128 value overflows 64 bits"),
    }
}
