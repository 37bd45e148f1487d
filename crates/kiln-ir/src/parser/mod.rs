pub mod parser;

pub use parser::*;

use miette::SourceSpan;

use crate::diagnostic::ParseDiagnostic;
use crate::error::VerifyError;
use crate::lexer::lex;
use crate::module::Module;
use crate::verify::verify_module;

/// Parses and verifies textual IR. `filename` names the source in
/// diagnostics and becomes the module name.
pub fn parse_module(source: &str, filename: &str) -> Result<Module, ParseDiagnostic> {
    let diagnostic = |span: SourceSpan, message: String| {
        ParseDiagnostic::new(source, filename, span.offset(), span.len(), message)
    };

    let tokens = lex(source).map_err(|e| diagnostic(e.span, e.message))?;
    let mut parser = Parser::new(&tokens, source.len());
    let module = parser
        .parse_module(filename)
        .map_err(|e| diagnostic(e.span, e.message))?;
    let spans = parser.into_spans();

    if let Err(error) = verify_module(&module) {
        let span = locate(&spans, &error);
        return Err(diagnostic(span, error.message));
    }

    log::debug!(
        "parsed module '{}' ({} functions, {} globals)",
        filename,
        module.functions().len(),
        module.globals().len()
    );
    Ok(module)
}

fn locate(spans: &SpanTable, error: &VerifyError) -> SourceSpan {
    let fallback = SourceSpan::new(0.into(), 0usize);
    let Some(loc) = &error.location else {
        return fallback;
    };
    let span = match loc.inst {
        Some(inst) => spans
            .insts
            .get(loc.function)
            .and_then(|f| f.get(loc.block))
            .and_then(|b| b.get(inst)),
        None => spans
            .terminators
            .get(loc.function)
            .and_then(|f| f.get(loc.block)),
    };
    span.or_else(|| spans.functions.get(loc.function))
        .copied()
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inst::{BinaryOp, Constant, InstKind, Operand, Terminator};
    use crate::types::Type;

    #[test]
    fn test_parse_empty_module() {
        let module = parse_module("", "").unwrap();
        assert!(module.functions().is_empty());
        assert!(module.globals().is_empty());
    }

    #[test]
    fn test_parse_single_definition() {
        let source = r#"
            define i64 @add(i64 %a, i64 %b) {
            entry:
              %sum = add nsw i64 %a, %b
              ret i64 %sum
            }
        "#;
        let module = parse_module(source, "").unwrap();
        let add = module.get_function("add").unwrap();
        assert_eq!(add.param_count(), 2);
        assert_eq!(add.return_type(), Type::I64);
        assert!(!add.is_declaration());

        let entry = &add.blocks()[0];
        assert_eq!(entry.label, "entry");
        assert_eq!(
            entry.insts[0].kind,
            InstKind::Binary {
                op: BinaryOp::Add,
                ty: Type::I64,
                lhs: Operand::Local("a".into()),
                rhs: Operand::Local("b".into()),
            }
        );
        assert_eq!(
            entry.terminator,
            Terminator::Ret(Some((Type::I64, Operand::Local("sum".into()))))
        );
    }

    #[test]
    fn test_unlabelled_entry_and_unnamed_params() {
        let source = "define i32 @id(i32) {\n  ret i32 %0\n}\n";
        let module = parse_module(source, "").unwrap();
        let id = module.get_function("id").unwrap();
        assert_eq!(id.blocks()[0].label, "entry");
        assert_eq!(id.params()[0].name, "0");
    }

    #[test]
    fn test_parse_declarations_and_globals() {
        let source = r#"
            @counter = global i64 7
            @scale = constant double 2.5
            @name = global ptr null
            declare double @sqrt(double)
            declare void @puts(i8* %s)
        "#;
        let module = parse_module(source, "").unwrap();
        assert_eq!(module.get_global("counter").unwrap().init, Constant::Int(7));
        assert!(module.get_global("scale").unwrap().constant);
        assert_eq!(module.get_global("name").unwrap().init, Constant::Null);

        let puts = module.get_function("puts").unwrap();
        assert!(puts.is_declaration());
        assert_eq!(puts.ty().params, vec![Type::Ptr]);
        assert_eq!(module.get_function("sqrt").unwrap().return_type(), Type::Double);
    }

    #[test]
    fn test_parse_loop_with_phi() {
        let source = r#"
            define i64 @sum_to(i64 %n) {
            entry:
              br label %loop
            loop:
              %i = phi i64 [ 0, %entry ], [ %next, %loop ]
              %acc = phi i64 [ 0, %entry ], [ %acc.next, %loop ]
              %acc.next = add i64 %acc, %i
              %next = add i64 %i, 1
              %done = icmp sgt i64 %next, %n
              br i1 %done, label %exit, label %loop
            exit:
              ret i64 %acc.next
            }
        "#;
        let module = parse_module(source, "").unwrap();
        let f = module.get_function("sum_to").unwrap();
        assert_eq!(f.blocks().len(), 3);
        match &f.blocks()[1].insts[0].kind {
            InstKind::Phi { ty, incoming } => {
                assert_eq!(*ty, Type::I64);
                assert_eq!(incoming.len(), 2);
                assert_eq!(incoming[1].1, "loop");
            }
            other => panic!("expected phi, got {:?}", other),
        }
    }

    #[test]
    fn test_error_on_second_line() {
        let source = "declare i32 @f(i32)\ndeclare i32 @g(i32 garbage\n";
        let err = parse_module(source, "").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.line_contents, "declare i32 @g(i32 garbage");
        assert_eq!(err.column, 20);
        assert_eq!(err.filename, "");
    }

    #[test]
    fn test_unsupported_integer_width() {
        let err = parse_module("declare i7 @f()", "").unwrap_err();
        assert!(err.message.contains("integer width 7"));
        assert_eq!(err.column, 9);
    }

    #[test]
    fn test_type_mismatch_points_at_instruction() {
        let source = "define i64 @f(i32 %a) {\nentry:\n  %b = add i64 %a, 1\n  ret i64 %b\n}\n";
        let err = parse_module(source, "bad.ll").unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.column, 3);
        assert_eq!(err.line_contents, "  %b = add i64 %a, 1");
        assert_eq!(err.filename, "bad.ll");
        assert!(err.message.contains("'%a'"), "{}", err.message);
    }

    #[test]
    fn test_unterminated_function_reports_end_of_input() {
        let source = "define void @f() {\nentry:\n";
        let err = parse_module(source, "").unwrap_err();
        assert!(err.message.contains("end of input"), "{}", err.message);
    }

    #[test]
    fn test_duplicate_function() {
        let source = "declare void @f()\ndeclare void @f()\n";
        let err = parse_module(source, "").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("already defined"));
    }

    #[test]
    fn test_literal_out_of_range() {
        let err = parse_module("@g = global i8 300", "").unwrap_err();
        assert!(err.message.contains("does not fit in i8"));
    }
}
