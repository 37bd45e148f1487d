use miette::Diagnostic;
use thiserror::Error;

use kiln_ir::{LoadError, WriteError};
use kiln_jit::{EngineError, InvokeError};

/// Errors reported by the `kiln` command line.
#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    #[diagnostic(code(kiln::cli::write))]
    Write(#[from] WriteError),

    #[error("could not build the execution engine")]
    #[diagnostic(code(kiln::cli::engine))]
    Engine(#[from] EngineError),

    #[error("module has no function '@{name}'")]
    #[diagnostic(code(kiln::cli::unknown_function))]
    UnknownFunction {
        name: String,
        #[help]
        help: Option<String>,
    },

    #[error("call to '@{function}' failed")]
    #[diagnostic(code(kiln::cli::invoke))]
    Invoke {
        function: String,
        #[source]
        source: InvokeError,
    },

    #[error("'{value}' is not a machine integer")]
    #[diagnostic(
        code(kiln::cli::raw_argument),
        help("--raw passes every argument as a 64-bit integer")
    )]
    RawArgument { value: String },
}
