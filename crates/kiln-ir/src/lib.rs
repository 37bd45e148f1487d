//! In-memory IR for the kiln JIT: types, modules, a textual parser and
//! printer, a verifier and a compact bitcode encoding.

pub mod bitcode;
pub mod diagnostic;
pub mod error;
pub mod inst;
pub mod lexer;
pub mod loader;
pub mod module;
pub mod parser;
mod printer;
pub mod types;
pub mod verify;

pub use diagnostic::ParseDiagnostic;
pub use error::{BitcodeError, InstLocation, LoadError, ModuleError, VerifyError, WriteError};
pub use inst::{
    BinaryOp, CastOp, Constant, FloatPredicate, Inst, InstKind, IntPredicate, Operand, Terminator,
};
pub use loader::{
    encode_bitcode, is_bitcode, load_file, parse_bitcode, parse_text, parse_text_named,
    write_bitcode,
};
pub use module::{Block, Function, GlobalVariable, Module, Param};
pub use types::{FunctionType, NativeTypeCategory, Type};
pub use verify::verify_module;
