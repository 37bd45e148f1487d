//! Semantic checks shared by the text parser, the bitcode reader and the
//! execution engine. A module that passes is safe to lower: every operand has
//! a known type matching its slot, every branch target exists and every phi
//! covers exactly its block's predecessors.

use std::collections::{HashMap, HashSet};

use crate::error::{InstLocation, VerifyError};
use crate::inst::{Constant, InstKind, Operand, Terminator};
use crate::module::{Function, Module};
use crate::types::Type;

pub fn verify_module(module: &Module) -> Result<(), VerifyError> {
    let mut names = HashSet::new();
    for global in module.globals() {
        if !names.insert(global.name.as_str()) {
            return Err(VerifyError::new(format!(
                "redefinition of '@{}'",
                global.name
            )));
        }
        if global.ty.is_void() {
            return Err(VerifyError::new(format!(
                "global '@{}' cannot have type void",
                global.name
            )));
        }
        if !constant_fits(&global.init, global.ty) {
            return Err(VerifyError::new(format!(
                "initializer of '@{}' is invalid for type '{}'",
                global.name, global.ty
            )));
        }
    }
    for function in module.functions() {
        if !names.insert(function.name()) {
            return Err(VerifyError::new(format!(
                "redefinition of '@{}'",
                function.name()
            )));
        }
    }

    for (index, function) in module.functions().iter().enumerate() {
        FunctionVerifier::new(module, function, index)?.run()?;
    }
    Ok(())
}

/// Whether a literal can initialise or be used in a slot of type `ty`.
pub fn constant_fits(constant: &Constant, ty: Type) -> bool {
    match constant {
        Constant::Int(value) => match ty {
            Type::Int(64) => true,
            Type::Int(bits) => {
                let min = -(1i64 << (bits - 1));
                let max = (1i64 << bits) - 1;
                (min..=max).contains(value)
            }
            _ => false,
        },
        Constant::Float(_) => ty.is_float(),
        Constant::Bool(_) => ty == Type::I1,
        Constant::Null => ty == Type::Ptr,
        Constant::Zero => !ty.is_void(),
    }
}

struct FunctionVerifier<'m> {
    module: &'m Module,
    function: &'m Function,
    index: usize,
    locals: HashMap<&'m str, Type>,
    labels: HashMap<&'m str, usize>,
    preds: Vec<Vec<usize>>,
}

impl<'m> FunctionVerifier<'m> {
    fn new(module: &'m Module, function: &'m Function, index: usize) -> Result<Self, VerifyError> {
        let mut verifier = Self {
            module,
            function,
            index,
            locals: HashMap::new(),
            labels: HashMap::new(),
            preds: vec![Vec::new(); function.blocks().len()],
        };

        for param in function.params() {
            if param.ty.is_void() {
                return Err(verifier.function_error(format!(
                    "parameter '%{}' cannot have type void",
                    param.name
                )));
            }
            if verifier.locals.insert(&param.name, param.ty).is_some() {
                return Err(verifier.function_error(format!(
                    "redefinition of parameter '%{}'",
                    param.name
                )));
            }
        }

        for (b, block) in function.blocks().iter().enumerate() {
            if verifier.labels.insert(&block.label, b).is_some() {
                return Err(verifier.function_error(format!(
                    "redefinition of block '%{}'",
                    block.label
                )));
            }
            for (i, inst) in block.insts.iter().enumerate() {
                let Some(name) = &inst.result else { continue };
                let ty = inst.kind.result_type();
                if ty.is_void() {
                    return Err(verifier.inst_error(
                        b,
                        Some(i),
                        format!("cannot assign a name to void value '%{}'", name),
                    ));
                }
                if verifier.locals.insert(name, ty).is_some() {
                    return Err(verifier.inst_error(
                        b,
                        Some(i),
                        format!("redefinition of value '%{}'", name),
                    ));
                }
            }
        }

        Ok(verifier)
    }

    fn location(&self, block: usize, inst: Option<usize>) -> InstLocation {
        InstLocation {
            function: self.index,
            block,
            inst,
        }
    }

    fn inst_error(&self, block: usize, inst: Option<usize>, message: String) -> VerifyError {
        VerifyError::at(
            format!("in function '@{}': {}", self.function.name(), message),
            self.location(block, inst),
        )
    }

    fn function_error(&self, message: String) -> VerifyError {
        VerifyError::at(
            format!("in function '@{}': {}", self.function.name(), message),
            self.location(0, None),
        )
    }

    fn run(mut self) -> Result<(), VerifyError> {
        self.check_control_flow()?;
        for b in 0..self.function.blocks().len() {
            self.check_block(b)?;
        }
        Ok(())
    }

    fn check_control_flow(&mut self) -> Result<(), VerifyError> {
        for (b, block) in self.function.blocks().iter().enumerate() {
            for target in block.terminator.successors() {
                let Some(&t) = self.labels.get(target) else {
                    return Err(self.inst_error(
                        b,
                        None,
                        format!("branch to undefined block '%{}'", target),
                    ));
                };
                if t == 0 {
                    return Err(self.inst_error(
                        b,
                        None,
                        "entry block cannot be a branch target".to_string(),
                    ));
                }
                if !self.preds[t].contains(&b) {
                    self.preds[t].push(b);
                }
            }
        }
        Ok(())
    }

    fn check_operand(
        &self,
        operand: &Operand,
        expected: Type,
        block: usize,
        inst: Option<usize>,
    ) -> Result<(), VerifyError> {
        match operand {
            Operand::Local(name) => match self.locals.get(name.as_str()) {
                None => Err(self.inst_error(
                    block,
                    inst,
                    format!("use of undefined value '%{}'", name),
                )),
                Some(ty) if *ty != expected => Err(self.inst_error(
                    block,
                    inst,
                    format!(
                        "'%{}' defined with type '{}' but expected '{}'",
                        name, ty, expected
                    ),
                )),
                Some(_) => Ok(()),
            },
            Operand::Global(name) => {
                if self.module.get_global(name).is_none() {
                    return Err(self.inst_error(
                        block,
                        inst,
                        format!("use of undefined global '@{}'", name),
                    ));
                }
                if expected != Type::Ptr {
                    return Err(self.inst_error(
                        block,
                        inst,
                        format!("'@{}' is a pointer but expected '{}'", name, expected),
                    ));
                }
                Ok(())
            }
            Operand::Const(constant) => {
                if constant_fits(constant, expected) {
                    Ok(())
                } else {
                    Err(self.inst_error(
                        block,
                        inst,
                        format!("constant is invalid for type '{}'", expected),
                    ))
                }
            }
        }
    }

    fn check_block(&self, b: usize) -> Result<(), VerifyError> {
        let block = &self.function.blocks()[b];
        let mut seen_non_phi = false;

        for (i, inst) in block.insts.iter().enumerate() {
            let at = Some(i);
            let fail = |message: String| Err(self.inst_error(b, at, message));
            match &inst.kind {
                InstKind::Binary { op, ty, lhs, rhs } => {
                    if op.is_float() && !ty.is_float() {
                        return fail(format!("'{}' requires a floating point type", op.mnemonic()));
                    }
                    if !op.is_float() && !ty.is_integer() {
                        return fail(format!("'{}' requires an integer type", op.mnemonic()));
                    }
                    self.check_operand(lhs, *ty, b, at)?;
                    self.check_operand(rhs, *ty, b, at)?;
                }
                InstKind::ICmp { ty, lhs, rhs, .. } => {
                    if !ty.is_integer() && *ty != Type::Ptr {
                        return fail("icmp requires integer or pointer operands".to_string());
                    }
                    self.check_operand(lhs, *ty, b, at)?;
                    self.check_operand(rhs, *ty, b, at)?;
                }
                InstKind::FCmp { ty, lhs, rhs, .. } => {
                    if !ty.is_float() {
                        return fail("fcmp requires floating point operands".to_string());
                    }
                    self.check_operand(lhs, *ty, b, at)?;
                    self.check_operand(rhs, *ty, b, at)?;
                }
                InstKind::Cast {
                    op,
                    from,
                    value,
                    to,
                } => {
                    if !op.accepts(*from, *to) {
                        return fail(format!(
                            "invalid cast '{}' from '{}' to '{}'",
                            op.mnemonic(),
                            from,
                            to
                        ));
                    }
                    self.check_operand(value, *from, b, at)?;
                }
                InstKind::Select {
                    cond,
                    ty,
                    on_true,
                    on_false,
                } => {
                    if ty.is_void() {
                        return fail("select cannot produce void".to_string());
                    }
                    self.check_operand(cond, Type::I1, b, at)?;
                    self.check_operand(on_true, *ty, b, at)?;
                    self.check_operand(on_false, *ty, b, at)?;
                }
                InstKind::Phi { ty, incoming } => {
                    if seen_non_phi {
                        return fail("phi nodes must be grouped at the top of a block".to_string());
                    }
                    if ty.is_void() {
                        return fail("phi cannot produce void".to_string());
                    }
                    self.check_phi(b, i, *ty, incoming)?;
                }
                InstKind::Call { ret, callee, args } => {
                    let Some(target) = self.module.get_function(callee) else {
                        return fail(format!("call to undefined function '@{}'", callee));
                    };
                    if target.return_type() != *ret {
                        return fail(format!(
                            "call to '@{}' expects return type '{}', found '{}'",
                            callee,
                            target.return_type(),
                            ret
                        ));
                    }
                    if target.param_count() != args.len() {
                        return fail(format!(
                            "call to '@{}' expects {} arguments, found {}",
                            callee,
                            target.param_count(),
                            args.len()
                        ));
                    }
                    for (param, (ty, value)) in target.params().iter().zip(args) {
                        if param.ty != *ty {
                            return fail(format!(
                                "argument of type '{}' passed to parameter of type '{}' of '@{}'",
                                ty, param.ty, callee
                            ));
                        }
                        self.check_operand(value, *ty, b, at)?;
                    }
                }
                InstKind::Alloca { ty } => {
                    if ty.is_void() {
                        return fail("cannot allocate void".to_string());
                    }
                }
                InstKind::Load { ty, ptr } => {
                    if ty.is_void() {
                        return fail("cannot load void".to_string());
                    }
                    self.check_operand(ptr, Type::Ptr, b, at)?;
                }
                InstKind::Store { ty, value, ptr } => {
                    if ty.is_void() {
                        return fail("cannot store void".to_string());
                    }
                    self.check_operand(value, *ty, b, at)?;
                    self.check_operand(ptr, Type::Ptr, b, at)?;
                }
            }
            if !matches!(inst.kind, InstKind::Phi { .. }) {
                seen_non_phi = true;
            }
        }

        self.check_terminator(b)
    }

    fn check_phi(
        &self,
        b: usize,
        i: usize,
        ty: Type,
        incoming: &[(Operand, String)],
    ) -> Result<(), VerifyError> {
        let at = Some(i);
        let mut covered = Vec::new();
        for (value, label) in incoming {
            let Some(&pred) = self.labels.get(label.as_str()) else {
                return Err(self.inst_error(b, at, format!("phi refers to undefined block '%{}'", label)));
            };
            if !self.preds[b].contains(&pred) {
                return Err(self.inst_error(
                    b,
                    at,
                    format!("phi entry for '%{}' which is not a predecessor", label),
                ));
            }
            if covered.contains(&pred) {
                return Err(self.inst_error(b, at, format!("duplicate phi entry for '%{}'", label)));
            }
            covered.push(pred);
            self.check_operand(value, ty, b, at)?;
        }
        if let Some(missing) = self.preds[b].iter().find(|p| !covered.contains(p)) {
            return Err(self.inst_error(
                b,
                at,
                format!(
                    "phi node lacks an entry for predecessor '%{}'",
                    self.function.blocks()[*missing].label
                ),
            ));
        }
        Ok(())
    }

    fn check_terminator(&self, b: usize) -> Result<(), VerifyError> {
        let ret = self.function.return_type();
        match &self.function.blocks()[b].terminator {
            Terminator::Ret(None) if !ret.is_void() => Err(self.inst_error(
                b,
                None,
                format!("function returns '{}' but 'ret void' found", ret),
            )),
            Terminator::Ret(Some((ty, value))) => {
                if *ty != ret {
                    return Err(self.inst_error(
                        b,
                        None,
                        format!("function returns '{}' but 'ret {}' found", ret, ty),
                    ));
                }
                self.check_operand(value, *ty, b, None)
            }
            Terminator::CondBr { cond, .. } => self.check_operand(cond, Type::I1, b, None),
            Terminator::Ret(None) | Terminator::Br(_) | Terminator::Unreachable => Ok(()),
        }
    }
}
