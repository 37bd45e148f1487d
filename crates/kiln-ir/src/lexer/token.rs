use logos::Logos;
use miette::SourceSpan;

/// A token spans from `start` to `end` within the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub span: SourceSpan,
}

impl Token<'_> {
    pub fn end(&self) -> usize {
        self.span.offset() + self.span.len()
    }
}

/// All tokens of the textual IR. Keywords, type names and labels all lex as
/// [`TokenKind::Ident`] and are told apart by the parser.
#[derive(Debug, Logos, PartialEq, Eq, Clone, Copy)]
pub enum TokenKind {
    #[token("=")]
    Eq,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token("*")]
    Star,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,

    /// `@name`
    #[regex(r"@[A-Za-z0-9_.$\-]+")]
    Global,

    /// `%name`
    #[regex(r"%[A-Za-z0-9_.$\-]+")]
    Local,

    #[regex(r"[A-Za-z_][A-Za-z0-9_.]*")]
    Ident,

    #[regex(r"-?[0-9]+")]
    Int,

    #[regex(r"-?[0-9]+\.[0-9]*([eE][-+]?[0-9]+)?")]
    #[regex(r"-?[0-9]+[eE][-+]?[0-9]+")]
    Float,

    /// IEEE bit pattern of a floating constant, e.g. `0x7FF0000000000000`.
    #[regex(r"0x[0-9A-Fa-f]+")]
    HexFloat,

    #[regex(r";[^\n]*", logos::skip)]
    Comment,

    #[regex(r"[ \t\r\n\f]+", logos::skip)]
    Whitespace,

    #[error]
    Error,
}

impl TokenKind {
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::Eq => "'='",
            TokenKind::Comma => "','",
            TokenKind::Colon => "':'",
            TokenKind::Star => "'*'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::Global => "global name",
            TokenKind::Local => "local name",
            TokenKind::Ident => "identifier",
            TokenKind::Int => "integer",
            TokenKind::Float => "floating point literal",
            TokenKind::HexFloat => "hexadecimal literal",
            TokenKind::Comment => "comment",
            TokenKind::Whitespace => "whitespace",
            TokenKind::Error => "invalid token",
        }
    }
}
