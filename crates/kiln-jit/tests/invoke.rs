use std::sync::Arc;

use kiln_ir::{parse_text, Function, Module};
use kiln_jit::{
    EngineConfig, ExecutionEngine, HandleOrigin, HostCategory, InvokeError, MarshalError, Value,
};
use once_cell::sync::Lazy;

const FIXTURE: &str = r#"
@counter = global i64 41
@ratio = constant double 0.5

declare i32 @abs(i32)
declare i64 @host_triple(i64)
declare i32 @kiln_not_linked(i32)

define i64 @add(i64 %a, i64 %b) {
entry:
  %sum = add i64 %a, %b
  ret i64 %sum
}

define double @half(double %x) {
entry:
  %r = load double, ptr @ratio
  %h = fmul double %x, %r
  ret double %h
}

define double @same_double(double %x) {
entry:
  ret double %x
}

define float @scale_f(float %x) {
entry:
  %r = fmul float %x, 2.0
  ret float %r
}

define i64 @bump() {
entry:
  %old = load i64, ptr @counter
  %new = add i64 %old, 1
  store i64 %new, ptr @counter
  ret i64 %new
}

define i64 @fib(i64 %n) {
entry:
  br label %loop
loop:
  %a = phi i64 [ 0, %entry ], [ %b, %body ]
  %b = phi i64 [ 1, %entry ], [ %sum, %body ]
  %i = phi i64 [ 0, %entry ], [ %i.next, %body ]
  %done = icmp sge i64 %i, %n
  br i1 %done, label %exit, label %body
body:
  %sum = add i64 %a, %b
  %i.next = add i64 %i, 1
  br label %loop
exit:
  ret i64 %a
}

define i32 @magnitude(i32 %x) {
entry:
  %r = call i32 @abs(i32 %x)
  ret i32 %r
}

define i64 @triple(i64 %x) {
entry:
  %r = call i64 @host_triple(i64 %x)
  ret i64 %r
}

define i1 @is_neg(i64 %x) {
entry:
  %r = icmp slt i64 %x, 0
  ret i1 %r
}

define i8 @low_byte(i64 %x) {
entry:
  %r = trunc i64 %x to i8
  ret i8 %r
}

define i32 @sext_flag(i1 %b) {
entry:
  %r = sext i1 %b to i32
  ret i32 %r
}

define double @to_double(i32 %x) {
entry:
  %r = sitofp i32 %x to double
  ret double %r
}

define i32 @to_int(double %x) {
entry:
  %r = fptosi double %x to i32
  ret i32 %r
}

define double @max(double %a, double %b) {
entry:
  %gt = fcmp ogt double %a, %b
  %r = select i1 %gt, double %a, double %b
  ret double %r
}

define i64 @via_stack(i64 %x) {
entry:
  %p = alloca i64
  store i64 %x, ptr %p
  %v = load i64, ptr %p
  ret i64 %v
}

define ptr @identity(ptr %p) {
entry:
  ret ptr %p
}

define ptr @null_ptr() {
entry:
  ret ptr null
}

define i8 @first_byte(ptr %s) {
entry:
  %c = load i8, ptr %s
  ret i8 %c
}

define void @noop() {
entry:
  ret void
}
"#;

static MODULE: Lazy<Arc<Module>> = Lazy::new(|| Arc::new(parse_text(FIXTURE).unwrap()));

extern "C" fn host_triple(x: i64) -> i64 {
    x * 3
}

fn engine() -> &'static ExecutionEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = EngineConfig::new().with_symbol("host_triple", host_triple as *const u8);
    ExecutionEngine::get_with_config(&MODULE, &config).unwrap()
}

fn function(name: &str) -> &'static Function {
    MODULE.get_function(name).unwrap()
}

fn call(name: &str, args: &[Value]) -> Result<Value, InvokeError> {
    engine().run_function(function(name), args)
}

#[test]
fn test_integer_arguments() {
    assert_eq!(call("add", &[Value::Int(2), Value::Int(40)]), Ok(Value::Int(42)));
    assert_eq!(call("add", &[Value::Int(-5), Value::Int(3)]), Ok(Value::Int(-2)));
}

#[test]
fn test_arity_mismatch() {
    let err = call("add", &[Value::Int(1)]).unwrap_err();
    assert_eq!(err, InvokeError::Arity { expected: 2, found: 1 });
    assert_eq!(err.to_string(), "Function expects 2 arguments, but found: 1");

    let err = call("add", &[Value::Int(1), Value::Int(2), Value::Int(3)]).unwrap_err();
    assert_eq!(err, InvokeError::Arity { expected: 2, found: 3 });
    assert_eq!(err.to_string(), "Function expects 2 arguments, but found: 3");

    let err = engine().run_function_raw(function("add"), &[1, 2, 3]).unwrap_err();
    assert_eq!(err.to_string(), "Function expects 2 arguments, but found: 3");
}

#[test]
fn test_bool_nil_and_float_coerce_to_integers() {
    assert_eq!(call("add", &[Value::Bool(true), Value::Nil]), Ok(Value::Int(1)));
    assert_eq!(call("add", &[Value::Float(2.9), Value::Int(1)]), Ok(Value::Int(3)));
}

#[test]
fn test_unsupported_argument_is_reported_by_position() {
    let err = call("add", &[Value::Int(1), Value::symbol("two")]).unwrap_err();
    match err {
        InvokeError::Argument { index, source } => {
            assert_eq!(index, 1);
            assert!(matches!(source, MarshalError::ArgumentType { value: "symbol", .. }));
        }
        other => panic!("expected an argument error, got {:?}", other),
    }
}

#[test]
fn test_doubles_round_trip_exactly() {
    for x in [0.1, -0.0, 1e300, f64::MIN_POSITIVE, -123.456] {
        let result = call("same_double", &[Value::Float(x)]).unwrap();
        assert_eq!(result.as_float().map(f64::to_bits), Some(x.to_bits()));
    }
    assert_eq!(call("same_double", &[Value::Int(7)]), Ok(Value::Float(7.0)));
}

#[test]
fn test_float_arithmetic() {
    assert_eq!(call("half", &[Value::Float(3.0)]), Ok(Value::Float(1.5)));
    assert_eq!(call("scale_f", &[Value::Float(1.25)]), Ok(Value::Float(2.5)));
    assert_eq!(
        call("max", &[Value::Float(-1.0), Value::Float(2.0)]),
        Ok(Value::Float(2.0))
    );
}

#[test]
fn test_narrow_results_are_sign_extended() {
    assert_eq!(call("low_byte", &[Value::Int(0x1FF)]), Ok(Value::Int(-1)));
    assert_eq!(call("low_byte", &[Value::Int(0x7F)]), Ok(Value::Int(127)));
    assert_eq!(call("sext_flag", &[Value::Bool(true)]), Ok(Value::Int(-1)));
    assert_eq!(call("sext_flag", &[Value::Bool(false)]), Ok(Value::Int(0)));
}

#[test]
fn test_i1_results_are_sign_extended() {
    assert_eq!(call("is_neg", &[Value::Int(-5)]), Ok(Value::Int(-1)));
    assert_eq!(call("is_neg", &[Value::Int(5)]), Ok(Value::Int(0)));
}

#[test]
fn test_conversions() {
    assert_eq!(call("to_double", &[Value::Int(-3)]), Ok(Value::Float(-3.0)));
    assert_eq!(call("to_int", &[Value::Float(-2.7)]), Ok(Value::Int(-2)));
}

#[test]
fn test_phi_loop() {
    assert_eq!(call("fib", &[Value::Int(0)]), Ok(Value::Int(0)));
    assert_eq!(call("fib", &[Value::Int(1)]), Ok(Value::Int(1)));
    assert_eq!(call("fib", &[Value::Int(10)]), Ok(Value::Int(55)));
}

#[test]
fn test_stack_slots() {
    assert_eq!(call("via_stack", &[Value::Int(-99)]), Ok(Value::Int(-99)));
}

#[test]
fn test_mutable_global() {
    let first = call("bump", &[]).unwrap().as_int().unwrap();
    let second = call("bump", &[]).unwrap().as_int().unwrap();
    assert!(first >= 42);
    assert_eq!(second, first + 1);
}

#[test]
fn test_void_result_is_nil() {
    assert_eq!(call("noop", &[]), Ok(Value::Nil));
}

#[test]
fn test_pointer_arguments() {
    assert_eq!(call("identity", &[Value::Nil]), Ok(Value::Nil));
    assert_eq!(call("null_ptr", &[]), Ok(Value::Nil));

    let err = call("identity", &[Value::Int(3)]).unwrap_err();
    assert!(matches!(
        err,
        InvokeError::Argument {
            index: 0,
            source: MarshalError::ArgumentType { value: "integer", .. }
        }
    ));
}

#[test]
fn test_pointer_results_are_tagged_handles() {
    let text = Value::str("hi");
    let (_, addr) = text.container().unwrap();
    let handle = call("identity", &[text.clone()]).unwrap().as_handle().unwrap();
    assert_eq!(handle.addr(), addr);
    assert_eq!(handle.origin(), HandleOrigin::Host(HostCategory::Str));

    // A handle can be passed back in and comes out unchanged.
    let again = call("identity", &[Value::Handle(handle)]).unwrap();
    assert_eq!(again, Value::Handle(handle));
}

#[test]
fn test_every_container_category_passes_as_pointer() {
    let class = Value::class("Point", &["x", "y"]);
    let object = match &class {
        Value::Class(info) => Value::object(info),
        other => panic!("expected a class, got {:?}", other),
    };
    let cases = [
        (Value::str("hi"), HostCategory::Str),
        (Value::record(vec![("x", Value::Int(1))]), HostCategory::Struct),
        (Value::array(vec![Value::Int(1)]), HostCategory::Array),
        (Value::hash(vec![(Value::symbol("k"), Value::Int(2))]), HostCategory::Hash),
        (class, HostCategory::Class),
        (object, HostCategory::Object),
        (Value::data(vec![1u8, 2, 3]), HostCategory::Data),
    ];
    for (value, category) in cases {
        let (_, addr) = value.container().unwrap();
        let handle = call("identity", &[value]).unwrap().as_handle().unwrap();
        assert_eq!(handle.addr(), addr);
        assert_eq!(handle.origin(), HandleOrigin::Host(category));
    }

    for (value, name) in [(Value::symbol("sym"), "symbol"), (Value::Bool(true), "boolean")] {
        assert!(matches!(
            call("identity", &[value]),
            Err(InvokeError::Argument {
                index: 0,
                source: MarshalError::ArgumentType { value, .. }
            }) if value == name
        ));
    }
}

#[test]
fn test_empty_string_is_rejected_for_pointers() {
    assert!(matches!(
        call("identity", &[Value::str("")]),
        Err(InvokeError::Argument {
            index: 0,
            source: MarshalError::ArgumentType { value: "empty string", .. }
        })
    ));
    assert!(call("identity", &[Value::c_str("")]).unwrap().as_handle().is_some());
}

#[test]
fn test_string_buffers_are_readable() {
    assert_eq!(call("first_byte", &[Value::str("hi")]), Ok(Value::Int(104)));
}

#[cfg(unix)]
#[test]
fn test_declarations_resolve_from_process() {
    assert_eq!(call("magnitude", &[Value::Int(-7)]), Ok(Value::Int(7)));
}

#[test]
fn test_configured_host_symbol() {
    assert_eq!(call("triple", &[Value::Int(14)]), Ok(Value::Int(42)));
}

#[test]
fn test_unresolved_declaration() {
    assert_eq!(
        call("kiln_not_linked", &[Value::Int(1)]),
        Err(InvokeError::Unresolved("kiln_not_linked".to_string()))
    );
}

#[test]
fn test_raw_calls() {
    let engine = engine();
    assert_eq!(engine.run_function_raw(function("add"), &[2, 3]), Ok(5));
    assert_eq!(engine.run_function_raw(function("fib"), &[10]), Ok(55));
    // Raw results are the zero-extended return bits.
    assert_eq!(engine.run_function_raw(function("low_byte"), &[0x1FF]), Ok(0xFF));
}

#[test]
fn test_functions_from_other_modules_are_rejected() {
    let other = parse_text("define i64 @add(i64 %a, i64 %b) {\nentry:\n  ret i64 %a\n}\n").unwrap();
    let err = engine()
        .run_function(other.get_function("add").unwrap(), &[Value::Int(1), Value::Int(2)])
        .unwrap_err();
    assert_eq!(err, InvokeError::ForeignFunction("add".to_string()));

    let stranger = parse_text("define void @stranger() {\n  ret void\n}\n").unwrap();
    assert!(matches!(
        engine().run_function(stranger.get_function("stranger").unwrap(), &[]),
        Err(InvokeError::ForeignFunction(_))
    ));
}

#[test]
fn test_structurally_equal_function_is_accepted() {
    let copy = MODULE.get_function("add").unwrap().clone();
    assert_eq!(
        kiln_jit::invoke(engine(), &copy, &[Value::Int(1), Value::Int(2)]),
        Ok(Value::Int(3))
    );
}
