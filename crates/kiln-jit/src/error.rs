use cranelift_codegen::settings::SetError;
use kiln_ir::{NativeTypeCategory, VerifyError};
use thiserror::Error;

/// A host value could not be converted to or from a native value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarshalError {
    #[error("cannot convert {value} to native {category}")]
    ArgumentType {
        value: &'static str,
        category: NativeTypeCategory,
    },

    #[error("values cannot be converted to or from native {category}")]
    Unconvertible { category: NativeTypeCategory },

    #[error("float {0} is out of range for a native integer")]
    OutOfRange(f64),

    #[error("native {found} value does not match declared {category}")]
    Mismatch {
        found: &'static str,
        category: NativeTypeCategory,
    },
}

/// Building the execution engine failed.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("module failed verification: {0}")]
    Verify(#[from] VerifyError),

    #[error("ISA setup failed: {0}")]
    IsaSetup(String),

    #[error("failed to configure Cranelift settings: {0}")]
    Settings(#[from] SetError),

    #[error("failed during module processing: {0}")]
    Module(#[from] cranelift_module::ModuleError),

    #[error("function '@{callee}' called from '@{caller}' could not be resolved")]
    UnresolvedSymbol { callee: String, caller: String },

    #[error("translation of '@{function}' failed: {message}")]
    Translation { function: String, message: String },
}

/// Calling a compiled function failed before or after the call itself.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvokeError {
    #[error("function '@{0}' does not belong to the module bound to the execution engine")]
    ForeignFunction(String),

    #[error("Function expects {expected} arguments, but found: {found}")]
    Arity { expected: usize, found: usize },

    #[error("argument {index}: {source}")]
    Argument {
        index: usize,
        #[source]
        source: MarshalError,
    },

    #[error("return value: {0}")]
    Return(#[source] MarshalError),

    #[error("function '@{0}' is declared but could not be resolved")]
    Unresolved(String),
}
