//! Entry points for turning text or bitcode into a [`Module`] and back.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;

use crate::bitcode;
use crate::diagnostic::ParseDiagnostic;
use crate::error::{BitcodeError, LoadError, WriteError};
use crate::module::Module;
use crate::parser::parse_module;

/// Parses textual IR held in memory. Diagnostics carry an empty filename.
pub fn parse_text(source: &str) -> Result<Module, ParseDiagnostic> {
    parse_module(source, "")
}

/// Parses textual IR, naming the source `name` in diagnostics.
pub fn parse_text_named(source: &str, name: &str) -> Result<Module, ParseDiagnostic> {
    parse_module(source, name)
}

pub fn parse_bitcode(bytes: &[u8]) -> Result<Module, BitcodeError> {
    bitcode::read_module(bytes)
}

pub fn is_bitcode(bytes: &[u8]) -> bool {
    bitcode::has_magic(bytes)
}

pub fn encode_bitcode(module: &Module) -> io::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    bitcode::write_module(module, &mut bytes)?;
    Ok(bytes)
}

/// Writes `module` as bitcode to `path`, replacing any existing file. Parent
/// directories are not created.
pub fn write_bitcode(module: &Module, path: impl AsRef<Path>) -> Result<(), WriteError> {
    let path = path.as_ref();
    let wrap = |source| WriteError {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(wrap)?;
    let mut out = BufWriter::new(file);
    bitcode::write_module(module, &mut out).map_err(wrap)?;
    log::debug!("wrote bitcode for '{}' to {}", module.name(), path.display());
    Ok(())
}

/// Reads a module from disk, choosing the decoder by content: bitcode when the
/// file starts with the bitcode magic, textual IR otherwise.
pub fn load_file(path: impl AsRef<Path>) -> Result<Module, LoadError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if is_bitcode(&bytes) {
        return Ok(parse_bitcode(&bytes)?);
    }

    let source = String::from_utf8(bytes).map_err(|e| LoadError::Io {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::InvalidData, e),
    })?;
    Ok(parse_text_named(&source, &path.display().to_string())?)
}
