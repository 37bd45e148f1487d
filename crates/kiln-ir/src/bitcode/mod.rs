//! Compact binary encoding of modules.
//!
//! A file starts with the four magic bytes `BC C0 DE` followed by a format
//! version byte. Counts, lengths and tags are unsigned LEB128; integer
//! constants are signed LEB128 and float constants carry their IEEE bits.

mod reader;
mod writer;

pub use reader::read_module;
pub use writer::write_module;

pub const MAGIC: [u8; 4] = [b'B', b'C', 0xC0, 0xDE];
pub const VERSION: u8 = 1;

/// Whether `bytes` start with the bitcode magic.
pub fn has_magic(bytes: &[u8]) -> bool {
    bytes.starts_with(&MAGIC)
}

pub(crate) mod tag {
    pub const TYPE_VOID: u64 = 0;
    pub const TYPE_FLOAT: u64 = 1;
    pub const TYPE_DOUBLE: u64 = 2;
    pub const TYPE_INT: u64 = 3;
    pub const TYPE_PTR: u64 = 4;

    pub const CONST_INT: u64 = 0;
    pub const CONST_FLOAT: u64 = 1;
    pub const CONST_BOOL: u64 = 2;
    pub const CONST_NULL: u64 = 3;
    pub const CONST_ZERO: u64 = 4;

    pub const OPERAND_LOCAL: u64 = 0;
    pub const OPERAND_GLOBAL: u64 = 1;
    pub const OPERAND_CONST: u64 = 2;

    pub const INST_BINARY: u64 = 0;
    pub const INST_ICMP: u64 = 1;
    pub const INST_FCMP: u64 = 2;
    pub const INST_CAST: u64 = 3;
    pub const INST_SELECT: u64 = 4;
    pub const INST_PHI: u64 = 5;
    pub const INST_CALL: u64 = 6;
    pub const INST_ALLOCA: u64 = 7;
    pub const INST_LOAD: u64 = 8;
    pub const INST_STORE: u64 = 9;

    pub const TERM_RET_VOID: u64 = 0;
    pub const TERM_RET: u64 = 1;
    pub const TERM_BR: u64 = 2;
    pub const TERM_COND_BR: u64 = 3;
    pub const TERM_UNREACHABLE: u64 = 4;
}
