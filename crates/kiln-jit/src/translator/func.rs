use std::collections::HashMap;

use cranelift_codegen::ir::condcodes::{FloatCC, IntCC};
use cranelift_codegen::ir::{
    self, types, Block, FuncRef, GlobalValue, InstBuilder, MemFlags, StackSlotData,
    StackSlotKind, TrapCode, UserFuncName, Value,
};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext, Variable};
use cranelift_jit::JITModule;
use cranelift_module::{DataId, FuncId, Module as _};
use kiln_ir::{
    BinaryOp, CastOp, Constant, FloatPredicate, Function, Inst, InstKind, IntPredicate, Operand,
    Terminator, Type,
};
use log::trace;

use super::types::{lower_signature, lower_type, width_mask};
use crate::error::EngineError;

/// Module-level ids a function body can refer to.
#[derive(Debug, Default)]
pub(crate) struct Symbols {
    pub functions: HashMap<String, FuncId>,
    pub data: HashMap<String, DataId>,
}

/// Translates the body of a defined function into Cranelift IR.
pub(crate) fn translate_function(
    function: &Function,
    func_id: FuncId,
    symbols: &Symbols,
    jit: &mut JITModule,
    builder_ctx: &mut FunctionBuilderContext,
) -> Result<ir::Function, EngineError> {
    let pointer_type = jit.isa().pointer_type();
    let signature = lower_signature(&function.ty(), jit.isa().default_call_conv(), pointer_type);
    let mut func =
        ir::Function::with_name_signature(UserFuncName::user(0, func_id.as_u32()), signature);

    let builder = FunctionBuilder::new(&mut func, builder_ctx);
    FunctionTranslator {
        builder,
        jit,
        symbols,
        function,
        pointer_type,
        locals: HashMap::new(),
        blocks: HashMap::new(),
        func_refs: HashMap::new(),
        globals: HashMap::new(),
    }
    .translate()?;

    trace!("Cranelift IR for '@{}':\n{}", function.name(), func.display());
    Ok(func)
}

struct FunctionTranslator<'a, 'b> {
    builder: FunctionBuilder<'b>,
    jit: &'a mut JITModule,
    symbols: &'a Symbols,
    function: &'a Function,
    pointer_type: types::Type,
    /// Every parameter and instruction result is a frontend variable.
    locals: HashMap<&'a str, Variable>,
    /// IR label -> (Cranelift block, index of the IR block).
    blocks: HashMap<&'a str, (Block, usize)>,
    func_refs: HashMap<&'a str, FuncRef>,
    globals: HashMap<&'a str, GlobalValue>,
}

impl<'a, 'b> FunctionTranslator<'a, 'b> {
    fn translate(mut self) -> Result<(), EngineError> {
        let function = self.function;
        let ir_blocks = function.blocks();

        // Phis become explicit block parameters, appended before anything else
        // can add parameters of its own.
        for (index, block) in ir_blocks.iter().enumerate() {
            let cl_block = self.builder.create_block();
            if index == 0 {
                self.builder.append_block_params_for_function_params(cl_block);
            } else {
                for (_, ty) in phis(block) {
                    let cl_ty = self.lower(ty)?;
                    self.builder.append_block_param(cl_block, cl_ty);
                }
            }
            self.blocks.insert(block.label.as_str(), (cl_block, index));
        }

        let mut next_var = 0u32;
        for param in function.params() {
            self.declare_local(&param.name, param.ty, &mut next_var)?;
        }
        for inst in ir_blocks.iter().flat_map(|b| b.insts.iter()) {
            if let Some(name) = &inst.result {
                let ty = inst.kind.result_type();
                if !ty.is_void() {
                    self.declare_local(name, ty, &mut next_var)?;
                }
            }
        }

        for (index, block) in ir_blocks.iter().enumerate() {
            let (cl_block, _) = self.block(&block.label)?;
            self.builder.switch_to_block(cl_block);
            let params = self.builder.block_params(cl_block).to_vec();

            if index == 0 {
                for (param, value) in function.params().iter().zip(params) {
                    self.define(&param.name, value)?;
                }
                // The entry block has no predecessors, so its phis have no
                // incoming values.
                for (name, ty) in phis(block) {
                    let zero = self.zero(ty)?;
                    self.define(name, zero)?;
                }
            } else {
                for ((name, _), value) in phis(block).zip(params) {
                    self.define(name, value)?;
                }
            }

            for inst in &block.insts {
                self.translate_inst(inst)?;
            }
            self.translate_terminator(&block.label, &block.terminator)?;
        }

        self.builder.seal_all_blocks();
        self.builder.finalize();
        Ok(())
    }

    fn error(&self, message: impl Into<String>) -> EngineError {
        EngineError::Translation {
            function: self.function.name().to_string(),
            message: message.into(),
        }
    }

    fn lower(&self, ty: Type) -> Result<types::Type, EngineError> {
        lower_type(ty, self.pointer_type)
            .ok_or_else(|| self.error("void has no value representation"))
    }

    fn declare_local(&mut self, name: &'a str, ty: Type, next: &mut u32) -> Result<(), EngineError> {
        let cl_ty = self.lower(ty)?;
        let var = Variable::from_u32(*next);
        *next += 1;
        self.builder.declare_var(var, cl_ty);
        self.locals.insert(name, var);
        Ok(())
    }

    fn define(&mut self, name: &str, value: Value) -> Result<(), EngineError> {
        let var = self
            .locals
            .get(name)
            .copied()
            .ok_or_else(|| self.error(format!("undeclared value '%{}'", name)))?;
        self.builder.def_var(var, value);
        Ok(())
    }

    fn block(&self, label: &str) -> Result<(Block, usize), EngineError> {
        self.blocks
            .get(label)
            .copied()
            .ok_or_else(|| self.error(format!("unknown block '%{}'", label)))
    }

    fn func_ref(&mut self, name: &'a str) -> Result<FuncRef, EngineError> {
        if let Some(func_ref) = self.func_refs.get(name) {
            return Ok(*func_ref);
        }
        let func_id = *self
            .symbols
            .functions
            .get(name)
            .ok_or_else(|| self.error(format!("call to undeclared function '@{}'", name)))?;
        let func_ref = self.jit.declare_func_in_func(func_id, self.builder.func);
        self.func_refs.insert(name, func_ref);
        Ok(func_ref)
    }

    fn global(&mut self, name: &'a str) -> Result<GlobalValue, EngineError> {
        if let Some(gv) = self.globals.get(name) {
            return Ok(*gv);
        }
        let data_id = *self
            .symbols
            .data
            .get(name)
            .ok_or_else(|| self.error(format!("use of undeclared global '@{}'", name)))?;
        let gv = self.jit.declare_data_in_func(data_id, self.builder.func);
        self.globals.insert(name, gv);
        Ok(gv)
    }

    fn operand(&mut self, operand: &'a Operand, ty: Type) -> Result<Value, EngineError> {
        match operand {
            Operand::Local(name) => {
                let var = self
                    .locals
                    .get(name.as_str())
                    .copied()
                    .ok_or_else(|| self.error(format!("use of undefined value '%{}'", name)))?;
                Ok(self.builder.use_var(var))
            }
            Operand::Global(name) => {
                let gv = self.global(name)?;
                Ok(self.builder.ins().global_value(self.pointer_type, gv))
            }
            Operand::Const(constant) => self.constant(*constant, ty),
        }
    }

    fn constant(&mut self, constant: Constant, ty: Type) -> Result<Value, EngineError> {
        let cl_ty = self.lower(ty)?;
        let value = match (constant, ty) {
            (Constant::Int(n), Type::Int(bits)) => {
                // Immediates of narrow types must not carry high bits.
                let imm = (n as u64 & width_mask(bits)) as i64;
                self.builder.ins().iconst(cl_ty, imm)
            }
            (Constant::Bool(b), Type::Int(1)) => self.builder.ins().iconst(cl_ty, b as i64),
            (Constant::Float(x), Type::Float) => self.builder.ins().f32const(x as f32),
            (Constant::Float(x), Type::Double) => self.builder.ins().f64const(x),
            (Constant::Null, Type::Ptr) | (Constant::Zero, _) => self.zero(ty)?,
            (constant, ty) => {
                return Err(self.error(format!("constant {} is invalid for type '{}'", constant, ty)))
            }
        };
        Ok(value)
    }

    fn zero(&mut self, ty: Type) -> Result<Value, EngineError> {
        let cl_ty = self.lower(ty)?;
        let value = match ty {
            Type::Float => self.builder.ins().f32const(0.0f32),
            Type::Double => self.builder.ins().f64const(0.0f64),
            _ => self.builder.ins().iconst(cl_ty, 0),
        };
        Ok(value)
    }

    /// Keeps `i1` values in their 0/1 form after arithmetic or truncation.
    fn normalize(&mut self, value: Value, ty: Type) -> Value {
        if ty == Type::I1 {
            self.builder.ins().band_imm(value, 1)
        } else {
            value
        }
    }

    fn resize(&mut self, value: Value, from: types::Type, to: types::Type, signed: bool) -> Value {
        if from.bits() > to.bits() {
            self.builder.ins().ireduce(to, value)
        } else if from.bits() < to.bits() && signed {
            self.builder.ins().sextend(to, value)
        } else if from.bits() < to.bits() {
            self.builder.ins().uextend(to, value)
        } else {
            value
        }
    }

    fn translate_inst(&mut self, inst: &'a Inst) -> Result<(), EngineError> {
        let value = match &inst.kind {
            InstKind::Binary { op, ty, lhs, rhs } => {
                let a = self.operand(lhs, *ty)?;
                let b = self.operand(rhs, *ty)?;
                let value = self.binary(*op, a, b);
                Some(self.normalize(value, *ty))
            }
            InstKind::ICmp { pred, ty, lhs, rhs } => {
                let a = self.operand(lhs, *ty)?;
                let b = self.operand(rhs, *ty)?;
                Some(self.builder.ins().icmp(int_cc(*pred), a, b))
            }
            InstKind::FCmp { pred, ty, lhs, rhs } => {
                let a = self.operand(lhs, *ty)?;
                let b = self.operand(rhs, *ty)?;
                Some(self.builder.ins().fcmp(float_cc(*pred), a, b))
            }
            InstKind::Cast {
                op,
                from,
                value,
                to,
            } => {
                let value = self.operand(value, *from)?;
                Some(self.cast(*op, *from, value, *to)?)
            }
            InstKind::Select {
                cond,
                ty,
                on_true,
                on_false,
            } => {
                let cond = self.operand(cond, Type::I1)?;
                let a = self.operand(on_true, *ty)?;
                let b = self.operand(on_false, *ty)?;
                Some(self.builder.ins().select(cond, a, b))
            }
            // Defined from block parameters when the block is entered.
            InstKind::Phi { .. } => None,
            InstKind::Call { callee, args, .. } => {
                let mut values = Vec::with_capacity(args.len());
                for (ty, arg) in args {
                    values.push(self.operand(arg, *ty)?);
                }
                let func_ref = self.func_ref(callee)?;
                let call = self.builder.ins().call(func_ref, &values);
                self.builder.inst_results(call).first().copied()
            }
            InstKind::Alloca { ty } => {
                let size = ty.store_size().max(1);
                let slot = self.builder.create_sized_stack_slot(StackSlotData::new(
                    StackSlotKind::ExplicitSlot,
                    size,
                    size.trailing_zeros() as u8,
                ));
                Some(self.builder.ins().stack_addr(self.pointer_type, slot, 0))
            }
            InstKind::Load { ty, ptr } => {
                let cl_ty = self.lower(*ty)?;
                let addr = self.operand(ptr, Type::Ptr)?;
                let value = self.builder.ins().load(cl_ty, MemFlags::new(), addr, 0);
                Some(self.normalize(value, *ty))
            }
            InstKind::Store { ty, value, ptr } => {
                let value = self.operand(value, *ty)?;
                let addr = self.operand(ptr, Type::Ptr)?;
                self.builder.ins().store(MemFlags::new(), value, addr, 0);
                None
            }
        };

        if let (Some(name), Some(value)) = (&inst.result, value) {
            self.define(name, value)?;
        }
        Ok(())
    }

    fn binary(&mut self, op: BinaryOp, a: Value, b: Value) -> Value {
        let ins = self.builder.ins();
        match op {
            BinaryOp::Add => ins.iadd(a, b),
            BinaryOp::Sub => ins.isub(a, b),
            BinaryOp::Mul => ins.imul(a, b),
            BinaryOp::SDiv => ins.sdiv(a, b),
            BinaryOp::UDiv => ins.udiv(a, b),
            BinaryOp::SRem => ins.srem(a, b),
            BinaryOp::URem => ins.urem(a, b),
            BinaryOp::And => ins.band(a, b),
            BinaryOp::Or => ins.bor(a, b),
            BinaryOp::Xor => ins.bxor(a, b),
            BinaryOp::Shl => ins.ishl(a, b),
            BinaryOp::LShr => ins.ushr(a, b),
            BinaryOp::AShr => ins.sshr(a, b),
            BinaryOp::FAdd => ins.fadd(a, b),
            BinaryOp::FSub => ins.fsub(a, b),
            BinaryOp::FMul => ins.fmul(a, b),
            BinaryOp::FDiv => ins.fdiv(a, b),
        }
    }

    fn cast(&mut self, op: CastOp, from: Type, value: Value, to: Type) -> Result<Value, EngineError> {
        let from_cl = self.lower(from)?;
        let to_cl = self.lower(to)?;
        let value = match op {
            CastOp::Trunc | CastOp::PtrToInt => {
                let value = self.resize(value, from_cl, to_cl, false);
                self.normalize(value, to)
            }
            CastOp::ZExt | CastOp::IntToPtr => self.resize(value, from_cl, to_cl, false),
            CastOp::SExt => {
                // A set i1 is all ones once sign-extended.
                let value = if from == Type::I1 {
                    self.builder.ins().ineg(value)
                } else {
                    value
                };
                self.resize(value, from_cl, to_cl, true)
            }
            CastOp::FPTrunc => self.builder.ins().fdemote(types::F32, value),
            CastOp::FPExt => self.builder.ins().fpromote(types::F64, value),
            CastOp::FPToSI | CastOp::FPToUI => {
                let wide = if to_cl == types::I64 { types::I64 } else { types::I32 };
                let converted = if op == CastOp::FPToSI {
                    self.builder.ins().fcvt_to_sint_sat(wide, value)
                } else {
                    self.builder.ins().fcvt_to_uint_sat(wide, value)
                };
                let value = self.resize(converted, wide, to_cl, false);
                self.normalize(value, to)
            }
            CastOp::SIToFP | CastOp::UIToFP => {
                let signed = op == CastOp::SIToFP;
                let value = if signed && from == Type::I1 {
                    self.builder.ins().ineg(value)
                } else {
                    value
                };
                let wide = if from_cl == types::I64 { types::I64 } else { types::I32 };
                let value = self.resize(value, from_cl, wide, signed);
                if signed {
                    self.builder.ins().fcvt_from_sint(to_cl, value)
                } else {
                    self.builder.ins().fcvt_from_uint(to_cl, value)
                }
            }
        };
        Ok(value)
    }

    /// Values passed along the edge `from -> to` for the phis of `to`.
    fn edge_args(&mut self, from: &str, to: &str) -> Result<(Block, Vec<Value>), EngineError> {
        let (block, index) = self.block(to)?;
        let function = self.function;
        let target = &function.blocks()[index];
        let mut args = Vec::new();
        for inst in &target.insts {
            let InstKind::Phi { ty, incoming } = &inst.kind else {
                break;
            };
            let (value, _) = incoming
                .iter()
                .find(|(_, label)| label == from)
                .ok_or_else(|| {
                    self.error(format!("phi in '%{}' has no entry for '%{}'", to, from))
                })?;
            args.push(self.operand(value, *ty)?);
        }
        Ok((block, args))
    }

    fn translate_terminator(&mut self, label: &str, terminator: &'a Terminator) -> Result<(), EngineError> {
        match terminator {
            Terminator::Ret(None) => {
                self.builder.ins().return_(&[]);
            }
            Terminator::Ret(Some((ty, value))) => {
                let value = self.operand(value, *ty)?;
                self.builder.ins().return_(&[value]);
            }
            Terminator::Br(target) => {
                let (block, args) = self.edge_args(label, target)?;
                self.builder.ins().jump(block, &args);
            }
            Terminator::CondBr {
                cond,
                on_true,
                on_false,
            } => {
                let cond = self.operand(cond, Type::I1)?;
                let (then_block, then_args) = self.edge_args(label, on_true)?;
                let (else_block, else_args) = self.edge_args(label, on_false)?;
                self.builder
                    .ins()
                    .brif(cond, then_block, &then_args, else_block, &else_args);
            }
            Terminator::Unreachable => {
                self.builder.ins().trap(TrapCode::unwrap_user(1));
            }
        }
        Ok(())
    }
}

/// The phi results at the top of a block, in order.
fn phis(block: &kiln_ir::Block) -> impl Iterator<Item = (&str, Type)> {
    block.insts.iter().map_while(|inst| match (&inst.kind, &inst.result) {
        (InstKind::Phi { ty, .. }, Some(name)) => Some((name.as_str(), *ty)),
        _ => None,
    })
}

fn int_cc(pred: IntPredicate) -> IntCC {
    match pred {
        IntPredicate::Eq => IntCC::Equal,
        IntPredicate::Ne => IntCC::NotEqual,
        IntPredicate::Slt => IntCC::SignedLessThan,
        IntPredicate::Sle => IntCC::SignedLessThanOrEqual,
        IntPredicate::Sgt => IntCC::SignedGreaterThan,
        IntPredicate::Sge => IntCC::SignedGreaterThanOrEqual,
        IntPredicate::Ult => IntCC::UnsignedLessThan,
        IntPredicate::Ule => IntCC::UnsignedLessThanOrEqual,
        IntPredicate::Ugt => IntCC::UnsignedGreaterThan,
        IntPredicate::Uge => IntCC::UnsignedGreaterThanOrEqual,
    }
}

fn float_cc(pred: FloatPredicate) -> FloatCC {
    match pred {
        FloatPredicate::Oeq => FloatCC::Equal,
        FloatPredicate::One => FloatCC::OrderedNotEqual,
        FloatPredicate::Olt => FloatCC::LessThan,
        FloatPredicate::Ole => FloatCC::LessThanOrEqual,
        FloatPredicate::Ogt => FloatCC::GreaterThan,
        FloatPredicate::Oge => FloatCC::GreaterThanOrEqual,
        FloatPredicate::Ord => FloatCC::Ordered,
        FloatPredicate::Ueq => FloatCC::UnorderedOrEqual,
        FloatPredicate::Une => FloatCC::NotEqual,
        FloatPredicate::Ult => FloatCC::UnorderedOrLessThan,
        FloatPredicate::Ule => FloatCC::UnorderedOrLessThanOrEqual,
        FloatPredicate::Ugt => FloatCC::UnorderedOrGreaterThan,
        FloatPredicate::Uge => FloatCC::UnorderedOrGreaterThanOrEqual,
        FloatPredicate::Uno => FloatCC::Unordered,
    }
}
