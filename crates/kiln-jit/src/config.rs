use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Cranelift optimization level used for every compiled function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptLevel {
    #[default]
    None,
    Speed,
    SpeedAndSize,
}

impl OptLevel {
    /// The value of Cranelift's `opt_level` setting.
    pub fn as_setting(&self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

impl fmt::Display for OptLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_setting())
    }
}

impl FromStr for OptLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(OptLevel::None),
            "speed" => Ok(OptLevel::Speed),
            "speed_and_size" | "speed-and-size" => Ok(OptLevel::SpeedAndSize),
            other => Err(format!(
                "unknown optimization level '{}' (expected none, speed or speed_and_size)",
                other
            )),
        }
    }
}

/// Settings applied when the execution engine is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub opt_level: OptLevel,
    /// Run the Cranelift IR verifier on every compiled function.
    pub verify: bool,
    /// Addresses for external declarations, consulted before the process
    /// symbol table.
    symbols: HashMap<String, usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            opt_level: OptLevel::None,
            verify: cfg!(debug_assertions),
            symbols: HashMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_opt_level(mut self, opt_level: OptLevel) -> Self {
        self.opt_level = opt_level;
        self
    }

    pub fn with_verifier(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Binds the external function `name` to `ptr`.
    ///
    /// The pointer must stay valid for the rest of the process and point to
    /// code whose signature matches the declaration.
    pub fn with_symbol(mut self, name: impl Into<String>, ptr: *const u8) -> Self {
        self.symbols.insert(name.into(), ptr as usize);
        self
    }

    pub fn symbol(&self, name: &str) -> Option<*const u8> {
        self.symbols.get(name).map(|addr| *addr as *const u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opt_level_parsing() {
        assert_eq!("speed".parse::<OptLevel>(), Ok(OptLevel::Speed));
        assert_eq!("speed-and-size".parse::<OptLevel>(), Ok(OptLevel::SpeedAndSize));
        assert!("fast".parse::<OptLevel>().is_err());
        assert_eq!(OptLevel::default().as_setting(), "none");
    }

    #[test]
    fn test_symbols() {
        extern "C" fn nop() {}
        let config = EngineConfig::new().with_symbol("nop", nop as *const u8);
        assert_eq!(config.symbol("nop"), Some(nop as *const u8));
        assert_eq!(config.symbol("missing"), None);
    }
}
