use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::diagnostic::ParseDiagnostic;

/// Errors raised by the module construction API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModuleError {
    #[error("symbol '@{0}' is already defined in this module")]
    DuplicateSymbol(String),

    #[error("global '@{0}' cannot have type void")]
    VoidGlobal(String),
}

/// Where inside a module a verification failure was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstLocation {
    pub function: usize,
    pub block: usize,
    /// `None` points at the block's terminator.
    pub inst: Option<usize>,
}

/// A module failed its semantic checks.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub struct VerifyError {
    pub message: String,
    pub location: Option<InstLocation>,
}

impl VerifyError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    pub(crate) fn at(message: impl Into<String>, location: InstLocation) -> Self {
        Self {
            message: message.into(),
            location: Some(location),
        }
    }
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Decoding bitcode failed. Binary input has no lines, so only a message is
/// carried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct BitcodeError {
    pub message: String,
}

impl BitcodeError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<VerifyError> for BitcodeError {
    fn from(error: VerifyError) -> Self {
        BitcodeError::new(format!("invalid module: {}", error.message))
    }
}

/// Writing bitcode to the filesystem failed.
#[derive(Debug, Error)]
#[error("could not write bitcode to '{}': {source}", path.display())]
pub struct WriteError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Errors from [`crate::loader::load_file`].
#[derive(Debug, Error, Diagnostic)]
pub enum LoadError {
    #[error("failed to read '{}'", path.display())]
    #[diagnostic(code(kiln::ir::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseDiagnostic),

    #[error(transparent)]
    #[diagnostic(code(kiln::ir::bitcode))]
    Bitcode(#[from] BitcodeError),
}
