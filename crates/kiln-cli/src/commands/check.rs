use std::path::Path;

use kiln_ir::load_file;
use log::debug;

use crate::error::CliError;

/// Parses and verifies `file` without compiling it.
pub fn handle_check(file: &Path) -> Result<(), CliError> {
    debug!("checking {}", file.display());
    let module = load_file(file)?;
    let defined = module.functions().iter().filter(|f| !f.is_declaration()).count();
    println!(
        "{}: ok ({} functions, {} declarations, {} globals)",
        file.display(),
        defined,
        module.functions().len() - defined,
        module.globals().len()
    );
    Ok(())
}
