//! Lookup of external functions for module declarations.

use libloading::Library;
use log::debug;

use crate::config::EngineConfig;

/// Resolves declaration names, first against addresses registered in the
/// [`EngineConfig`] and then against the symbols of the running process.
pub(crate) struct SymbolResolver<'a> {
    config: &'a EngineConfig,
    process: Option<Library>,
}

impl<'a> SymbolResolver<'a> {
    pub(crate) fn new(config: &'a EngineConfig) -> Self {
        let process = process_library();
        if process.is_none() {
            debug!("process symbol table unavailable; only configured symbols resolve");
        }
        Self { config, process }
    }

    pub(crate) fn resolve(&self, name: &str) -> Option<*const u8> {
        if let Some(ptr) = self.config.symbol(name) {
            return Some(ptr);
        }
        let library = self.process.as_ref()?;
        // SAFETY: the symbol is only read as an address, never called here.
        let ptr = unsafe { library.get::<*const u8>(name.as_bytes()) }
            .ok()
            .map(|symbol| *symbol)?;
        (!ptr.is_null()).then_some(ptr)
    }
}

#[cfg(unix)]
fn process_library() -> Option<Library> {
    Some(libloading::os::unix::Library::this().into())
}

#[cfg(windows)]
fn process_library() -> Option<Library> {
    libloading::os::windows::Library::this().ok().map(Into::into)
}

#[cfg(not(any(unix, windows)))]
fn process_library() -> Option<Library> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_symbols_take_precedence() {
        extern "C" fn fake_abs(x: i32) -> i32 {
            x
        }
        let config = EngineConfig::new().with_symbol("abs", fake_abs as *const u8);
        let resolver = SymbolResolver::new(&config);
        assert_eq!(resolver.resolve("abs"), Some(fake_abs as *const u8));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_symbols_resolve() {
        let config = EngineConfig::new();
        let resolver = SymbolResolver::new(&config);
        assert!(resolver.resolve("abs").is_some());
        assert!(resolver.resolve("kiln_no_such_symbol_anywhere").is_none());
    }
}
