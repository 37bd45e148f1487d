use crate::error::ModuleError;
use crate::inst::{Constant, Inst, Terminator};
use crate::types::{FunctionType, Type};

/// A named, typed function parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

/// A labelled straight-line sequence of instructions ending in a terminator.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub label: String,
    pub insts: Vec<Inst>,
    pub terminator: Terminator,
}

/// A function declaration or definition.
///
/// The parameter list is fixed at construction; nothing in the crate mutates
/// it afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    name: String,
    ret: Type,
    params: Vec<Param>,
    blocks: Vec<Block>,
}

impl Function {
    /// A body-less declaration. Parameters are named by position.
    pub fn declaration(name: impl Into<String>, ty: FunctionType) -> Self {
        let params = ty
            .params
            .into_iter()
            .enumerate()
            .map(|(i, ty)| Param {
                name: i.to_string(),
                ty,
            })
            .collect();
        Self {
            name: name.into(),
            ret: ty.ret,
            params,
            blocks: Vec::new(),
        }
    }

    /// A definition. `blocks` must be non-empty; the first block is the entry.
    pub fn definition(
        name: impl Into<String>,
        ret: Type,
        params: Vec<Param>,
        blocks: Vec<Block>,
    ) -> Self {
        Self {
            name: name.into(),
            ret,
            params,
            blocks,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn return_type(&self) -> Type {
        self.ret
    }

    pub fn ty(&self) -> FunctionType {
        FunctionType::new(self.ret, self.params.iter().map(|p| p.ty).collect())
    }

    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn entry_block(&self) -> Option<&Block> {
        self.blocks.first()
    }
}

/// A module-level variable. Operands name it as `@name` and get its address.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalVariable {
    pub name: String,
    pub ty: Type,
    pub init: Constant,
    pub constant: bool,
}

/// An in-memory program: globals and functions with module-unique names.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    name: String,
    globals: Vec<GlobalVariable>,
    functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            globals: Vec::new(),
            functions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn globals(&self) -> &[GlobalVariable] {
        &self.globals
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn get_global(&self, name: &str) -> Option<&GlobalVariable> {
        self.globals.iter().find(|g| g.name == name)
    }

    fn is_defined(&self, name: &str) -> bool {
        self.get_function(name).is_some() || self.get_global(name).is_some()
    }

    /// Adds a function, rejecting names already taken by a function or global.
    pub fn add_function(&mut self, function: Function) -> Result<&Function, ModuleError> {
        if self.is_defined(&function.name) {
            return Err(ModuleError::DuplicateSymbol(function.name));
        }
        self.functions.push(function);
        Ok(&self.functions[self.functions.len() - 1])
    }

    /// Returns the function called `name`, adding an external declaration of
    /// type `ty` if none exists yet. An existing function is returned as is,
    /// whatever its type.
    pub fn get_or_insert_function(
        &mut self,
        name: &str,
        ty: FunctionType,
    ) -> Result<&Function, ModuleError> {
        match self.functions.iter().position(|f| f.name == name) {
            Some(index) => Ok(&self.functions[index]),
            None => self.add_function(Function::declaration(name, ty)),
        }
    }

    /// Declares a function resolved outside the module when the engine binds.
    pub fn add_external_function(
        &mut self,
        name: &str,
        ty: FunctionType,
    ) -> Result<&Function, ModuleError> {
        self.add_function(Function::declaration(name, ty))
    }

    pub fn add_global(
        &mut self,
        name: impl Into<String>,
        ty: Type,
        init: Constant,
        constant: bool,
    ) -> Result<&GlobalVariable, ModuleError> {
        let name = name.into();
        if ty.is_void() {
            return Err(ModuleError::VoidGlobal(name));
        }
        if self.is_defined(&name) {
            return Err(ModuleError::DuplicateSymbol(name));
        }
        self.globals.push(GlobalVariable {
            name,
            ty,
            init,
            constant,
        });
        Ok(&self.globals[self.globals.len() - 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_insert_function_is_idempotent() {
        let mut module = Module::new("m");
        let ty = FunctionType::new(Type::I32, vec![Type::I32]);
        module.get_or_insert_function("abs", ty.clone()).unwrap();
        let other = FunctionType::new(Type::Double, vec![]);
        let f = module.get_or_insert_function("abs", other).unwrap();
        assert_eq!(f.ty(), ty);
        assert!(f.is_declaration());
        assert_eq!(module.functions().len(), 1);
    }

    #[test]
    fn test_names_are_unique_across_globals_and_functions() {
        let mut module = Module::new("m");
        module
            .add_global("counter", Type::I64, Constant::Int(0), false)
            .unwrap();
        let err = module
            .add_external_function("counter", FunctionType::new(Type::Void, vec![]))
            .unwrap_err();
        assert!(matches!(err, ModuleError::DuplicateSymbol(name) if name == "counter"));
    }

    #[test]
    fn test_declaration_params_are_positional() {
        let f = Function::declaration("f", FunctionType::new(Type::Void, vec![Type::Ptr, Type::I8]));
        let names: Vec<_> = f.params().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["0", "1"]);
        assert_eq!(f.param_count(), 2);
    }

    #[test]
    fn test_void_global_rejected() {
        let mut module = Module::new("m");
        assert!(matches!(
            module.add_global("g", Type::Void, Constant::Zero, true),
            Err(ModuleError::VoidGlobal(_))
        ));
    }
}
