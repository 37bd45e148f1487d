use std::path::Path;
use std::sync::Arc;

use kiln_ir::{load_file, Module};
use kiln_jit::{EngineConfig, ExecutionEngine, OptLevel, Value};
use log::debug;

use crate::error::CliError;

/// Loads `file`, binds the execution engine to it and calls `function`.
pub fn handle_run(
    file: &Path,
    function: &str,
    args: &[String],
    raw: bool,
    opt_level: OptLevel,
) -> Result<(), CliError> {
    let module = Arc::new(load_file(file)?);
    let target = module
        .get_function(function)
        .ok_or_else(|| unknown_function(&module, function))?;

    let config = EngineConfig::new().with_opt_level(opt_level);
    let engine = ExecutionEngine::get_with_config(&module, &config)?;
    let invoke_error = |source| CliError::Invoke {
        function: function.to_string(),
        source,
    };

    if raw {
        let ints = args
            .iter()
            .map(|arg| parse_raw(arg))
            .collect::<Result<Vec<_>, _>>()?;
        let result = engine.run_function_raw(target, &ints).map_err(invoke_error)?;
        println!("{}", result);
    } else {
        let values: Vec<Value> = args.iter().map(|arg| parse_value(arg)).collect();
        debug!("calling '@{}' with {:?}", function, values);
        let result = engine.run_function(target, &values).map_err(invoke_error)?;
        println!("{}", result);
    }
    Ok(())
}

fn unknown_function(module: &Module, name: &str) -> CliError {
    let defined: Vec<&str> = module
        .functions()
        .iter()
        .filter(|f| !f.is_declaration())
        .map(|f| f.name())
        .collect();
    let help = (!defined.is_empty()).then(|| format!("defined functions: {}", defined.join(", ")));
    CliError::UnknownFunction {
        name: name.to_string(),
        help,
    }
}

/// Reads a command line argument as a host value.
///
/// `nil`, `true` and `false` are keywords; integers (decimal or `0x` hex)
/// and floats are numbers. Anything else, with surrounding double quotes
/// removed, is a NUL-terminated string buffer.
pub fn parse_value(arg: &str) -> Value {
    match arg {
        "nil" => return Value::Nil,
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Some(n) = parse_int(arg) {
        return Value::Int(n);
    }
    if let Ok(x) = arg.parse::<f64>() {
        return Value::Float(x);
    }
    let text = arg
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(arg);
    Value::c_str(text)
}

fn parse_int(arg: &str) -> Option<i64> {
    let (negative, digits) = match arg.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, arg),
    };
    let magnitude = match digits.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok()?,
        None => return arg.parse().ok(),
    };
    if negative {
        // i64::MIN has no positive counterpart.
        0i64.checked_sub_unsigned(magnitude)
    } else {
        i64::try_from(magnitude).ok()
    }
}

fn parse_raw(arg: &str) -> Result<i64, CliError> {
    match arg {
        "true" => Ok(1),
        "false" | "nil" => Ok(0),
        _ => parse_int(arg).ok_or_else(|| CliError::RawArgument {
            value: arg.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keywords_and_numbers() {
        assert_eq!(parse_value("nil"), Value::Nil);
        assert_eq!(parse_value("true"), Value::Bool(true));
        assert_eq!(parse_value("-42"), Value::Int(-42));
        assert_eq!(parse_value("0x1f"), Value::Int(31));
        assert_eq!(parse_value("-0x10"), Value::Int(-16));
        assert_eq!(parse_value("2.5"), Value::Float(2.5));
    }

    #[test]
    fn test_parse_hex_limits() {
        assert_eq!(parse_value("-0x8000000000000000"), Value::Int(i64::MIN));
        assert_eq!(parse_value("0x7fffffffffffffff"), Value::Int(i64::MAX));
        assert_eq!(parse_raw("-0x8000000000000000").unwrap(), i64::MIN);
        assert!(matches!(parse_raw("0x8000000000000000"), Err(CliError::RawArgument { .. })));
    }

    #[test]
    fn test_parse_strings() {
        for (arg, expected) in [("hello", &b"hello\0"[..]), ("\"42\"", &b"42\0"[..])] {
            match parse_value(arg) {
                Value::Str(bytes) => assert_eq!(&bytes.borrow()[..], expected),
                other => panic!("expected a string, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_parse_raw() {
        assert_eq!(parse_raw("7").unwrap(), 7);
        assert_eq!(parse_raw("true").unwrap(), 1);
        assert!(matches!(parse_raw("2.5"), Err(CliError::RawArgument { .. })));
    }

    #[test]
    fn test_unknown_function_lists_definitions() {
        let module = kiln_ir::parse_text(
            "declare i32 @abs(i32)\ndefine void @main() {\n  ret void\n}\n",
        )
        .unwrap();
        match unknown_function(&module, "mian") {
            CliError::UnknownFunction { name, help } => {
                assert_eq!(name, "mian");
                assert_eq!(help.as_deref(), Some("defined functions: main"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
