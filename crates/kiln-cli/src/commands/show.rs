use std::path::Path;

use kiln_ir::load_file;

use crate::error::CliError;

/// Prints a text or bitcode module as textual IR.
pub fn handle_show(file: &Path) -> Result<(), CliError> {
    let module = load_file(file)?;
    print!("{}", module);
    Ok(())
}
