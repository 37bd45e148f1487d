use std::sync::Arc;

use kiln_ir::parse_text;
use kiln_jit::{EngineError, ExecutionEngine, Value};

// The engine is process-wide, so the whole binding sequence lives in a single
// test to keep its order fixed.
#[test]
fn test_first_successful_caller_wins() {
    let _ = env_logger::builder().is_test(true).try_init();

    let broken = Arc::new(
        parse_text(
            "declare i64 @kiln_never_defined(i64)\n\
             define i64 @f(i64 %x) {\nentry:\n  %r = call i64 @kiln_never_defined(i64 %x)\n  ret i64 %r\n}\n",
        )
        .unwrap(),
    );
    let err = ExecutionEngine::get(&broken).unwrap_err();
    assert!(
        matches!(&err, EngineError::UnresolvedSymbol { callee, caller } if callee == "kiln_never_defined" && caller == "f"),
        "{}",
        err
    );

    // A failed build is not remembered.
    let first = Arc::new(parse_text("define i64 @answer() {\nentry:\n  ret i64 42\n}\n").unwrap());
    let engine = ExecutionEngine::get(&first).unwrap();
    assert!(Arc::ptr_eq(engine.module(), &first));

    let second = Arc::new(parse_text("define i64 @answer() {\nentry:\n  ret i64 7\n}\n").unwrap());
    let again = ExecutionEngine::get(&second).unwrap();
    assert!(std::ptr::eq(engine, again));
    assert!(Arc::ptr_eq(again.module(), &first));

    let answer = first.get_function("answer").unwrap();
    assert_eq!(again.run_function(answer, &[]), Ok(Value::Int(42)));

    // Functions of the ignored module do not belong to the engine.
    let ignored = second.get_function("answer").unwrap();
    assert!(again.run_function(ignored, &[]).is_err());
}
