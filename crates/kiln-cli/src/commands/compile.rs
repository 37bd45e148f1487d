use std::path::{Path, PathBuf};

use kiln_ir::{load_file, write_bitcode};
use log::info;

use crate::error::CliError;

/// Writes `file` as bitcode to `output`, or next to it with a `.bc`
/// extension. Returns the path written.
pub fn handle_compile(file: &Path, output: Option<PathBuf>) -> Result<PathBuf, CliError> {
    let module = load_file(file)?;
    let output = output.unwrap_or_else(|| file.with_extension("bc"));
    write_bitcode(&module, &output)?;
    info!("wrote {} functions to {}", module.functions().len(), output.display());
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "define i64 @seven() {\nentry:\n  ret i64 7\n}\n";

    #[test]
    fn test_default_output_path() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("seven.ll");
        std::fs::write(&input, SOURCE).unwrap();

        let written = handle_compile(&input, None).unwrap();
        assert_eq!(written, dir.path().join("seven.bc"));

        let text = kiln_ir::parse_text(SOURCE).unwrap();
        let loaded = load_file(&written).unwrap();
        assert_eq!(loaded.functions(), text.functions());
    }

    #[test]
    fn test_explicit_output_path() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("seven.ll");
        std::fs::write(&input, SOURCE).unwrap();
        let output = dir.path().join("out.bitcode");

        assert_eq!(handle_compile(&input, Some(output.clone())).unwrap(), output);
        assert!(kiln_ir::is_bitcode(&std::fs::read(&output).unwrap()));
    }

    #[test]
    fn test_parse_errors_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.ll");
        std::fs::write(&input, "define i64 @f( {\n").unwrap();
        assert!(matches!(handle_compile(&input, None), Err(CliError::Load(_))));
        assert!(!dir.path().join("broken.bc").exists());
    }
}
