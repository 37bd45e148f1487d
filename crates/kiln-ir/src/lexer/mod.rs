pub mod token;

use logos::Logos;
use miette::SourceSpan;

pub use token::*;

/// An input byte sequence that is not a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub span: SourceSpan,
    pub message: String,
}

/// Lexes the input string into a vector of tokens.
pub fn lex(input: &str) -> Result<Vec<Token<'_>>, LexError> {
    let mut lexer = TokenKind::lexer(input);
    let mut tokens = Vec::new();

    while let Some(kind) = lexer.next() {
        let range = lexer.span();
        let lexeme = &input[range.clone()];
        let span = SourceSpan::new(range.start.into(), range.len());

        if kind == TokenKind::Error {
            return Err(LexError {
                span,
                message: format!("unrecognized token '{}'", lexeme),
            });
        }
        tokens.push(Token { kind, lexeme, span });
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        lex(input).unwrap().iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_lex_define_header() {
        assert_eq!(
            kinds("define i64 @add(i64 %a, i64 %b) {"),
            vec![
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::Global,
                TokenKind::LParen,
                TokenKind::Ident,
                TokenKind::Local,
                TokenKind::Comma,
                TokenKind::Ident,
                TokenKind::Local,
                TokenKind::RParen,
                TokenKind::LBrace,
            ]
        );
    }

    #[test]
    fn test_lex_numbers() {
        assert_eq!(
            kinds("42 -7 1.5 -2.0e3 1e10 0x3FF0000000000000"),
            vec![
                TokenKind::Int,
                TokenKind::Int,
                TokenKind::Float,
                TokenKind::Float,
                TokenKind::Float,
                TokenKind::HexFloat,
            ]
        );
    }

    #[test]
    fn test_lex_skips_comments() {
        let tokens = lex("; leading comment\nret void ; trailing\n").unwrap();
        let lexemes: Vec<_> = tokens.iter().map(|t| t.lexeme).collect();
        assert_eq!(lexemes, vec!["ret", "void"]);
    }

    #[test]
    fn test_lex_label_and_phi() {
        assert_eq!(
            kinds("loop: %i = phi i64 [0, %entry]"),
            vec![
                TokenKind::Ident,
                TokenKind::Colon,
                TokenKind::Local,
                TokenKind::Eq,
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::LBracket,
                TokenKind::Int,
                TokenKind::Comma,
                TokenKind::Local,
                TokenKind::RBracket,
            ]
        );
    }

    #[test]
    fn test_lex_invalid_token() {
        let err = lex("ret i32 #5").unwrap_err();
        assert_eq!(err.span.offset(), 8);
        assert!(err.message.contains('#'));
    }

    #[test]
    fn test_lex_empty_input() {
        assert!(lex("").unwrap().is_empty());
    }
}
