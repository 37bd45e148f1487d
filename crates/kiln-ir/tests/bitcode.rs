use kiln_ir::{
    encode_bitcode, load_file, parse_bitcode, parse_text, write_bitcode, Constant, FunctionType,
    LoadError, Module, Type,
};

const SOURCE: &str = r#"
; arithmetic helpers
@scale = constant double 1.5
@hits = global i64 0

declare double @pow(double, double)

define double @scaled(double %x) {
entry:
  %s = load double, ptr @scale
  %r = fmul double %x, %s
  ret double %r
}

define i64 @clamp(i64 %v, i64 %lo, i64 %hi) {
entry:
  %below = icmp slt i64 %v, %lo
  br i1 %below, label %low, label %check_high
check_high:
  %above = icmp sgt i64 %v, %hi
  %r = select i1 %above, i64 %hi, i64 %v
  ret i64 %r
low:
  ret i64 %lo
}

define void @nothing() {
  ret void
}
"#;

fn signatures(module: &Module) -> Vec<(String, FunctionType)> {
    module
        .functions()
        .iter()
        .map(|f| (f.name().to_string(), f.ty()))
        .collect()
}

#[test]
fn test_bitcode_file_round_trip() {
    let module = parse_text(SOURCE).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("helpers.bc");

    write_bitcode(&module, &path).unwrap();
    let bytes = std::fs::read(&path).unwrap();
    let decoded = parse_bitcode(&bytes).unwrap();

    assert_eq!(signatures(&decoded), signatures(&module));
    assert_eq!(decoded, module);
}

#[test]
fn test_write_overwrites_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bc");
    std::fs::write(&path, vec![0xAA; 4096]).unwrap();

    let module = parse_text("declare void @f()").unwrap();
    write_bitcode(&module, &path).unwrap();

    let written = std::fs::read(&path).unwrap();
    assert_eq!(written, encode_bitcode(&module).unwrap());
}

#[test]
fn test_write_into_missing_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no").join("such").join("dir.bc");
    let err = write_bitcode(&Module::new("m"), &path).unwrap_err();
    assert_eq!(err.path, path);
}

#[test]
fn test_load_file_detects_format() {
    let dir = tempfile::tempdir().unwrap();
    let text_path = dir.path().join("helpers.ll");
    let bc_path = dir.path().join("helpers.bc");

    std::fs::write(&text_path, SOURCE).unwrap();
    let from_text = load_file(&text_path).unwrap();
    assert_eq!(from_text.name(), text_path.display().to_string());

    write_bitcode(&from_text, &bc_path).unwrap();
    let from_bitcode = load_file(&bc_path).unwrap();
    assert_eq!(from_bitcode, from_text);
}

#[test]
fn test_load_file_reports_located_parse_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.ll");
    std::fs::write(&path, "declare void @ok()\ndefine i32 @f( {\n").unwrap();

    match load_file(&path) {
        Err(LoadError::Parse(diag)) => {
            assert_eq!(diag.line, 2);
            assert_eq!(diag.filename, path.display().to_string());
        }
        other => panic!("expected a parse error, got {:?}", other),
    }
}

#[test]
fn test_load_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_file(dir.path().join("absent.ll")).unwrap_err();
    assert!(matches!(err, LoadError::Io { .. }));
}

#[test]
fn test_constructed_module_round_trips() {
    let mut module = Module::new("built");
    module
        .add_global("limit", Type::I32, Constant::Int(10), true)
        .unwrap();
    module
        .add_external_function("puts", FunctionType::new(Type::I32, vec![Type::Ptr]))
        .unwrap();
    module
        .get_or_insert_function("abs", FunctionType::new(Type::I64, vec![Type::I64]))
        .unwrap();

    let bytes = encode_bitcode(&module).unwrap();
    assert_eq!(parse_bitcode(&bytes).unwrap(), module);
}

#[test]
fn test_corrupted_bitcode_is_message_only() {
    let module = parse_text(SOURCE).unwrap();
    let mut bytes = encode_bitcode(&module).unwrap();
    bytes.push(0x00);
    let err = parse_bitcode(&bytes).unwrap_err();
    assert!(err.to_string().contains("trailing"), "{}", err);
}
