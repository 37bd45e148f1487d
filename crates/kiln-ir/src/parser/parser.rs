use miette::SourceSpan;

use crate::inst::{
    BinaryOp, CastOp, Constant, FloatPredicate, Inst, InstKind, IntPredicate, Operand, Terminator,
};
use crate::lexer::{Token, TokenKind};
use crate::module::{Block, Function, Module, Param};
use crate::types::{FunctionType, Type};

/// A syntax error before it is turned into a located diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub span: SourceSpan,
    pub message: String,
}

pub type SyntaxResult<T> = Result<T, SyntaxError>;

/// Source spans of every instruction and terminator, indexed like the
/// module's functions and blocks. Used to locate verifier failures.
#[derive(Debug, Default)]
pub struct SpanTable {
    pub functions: Vec<SourceSpan>,
    pub insts: Vec<Vec<Vec<SourceSpan>>>,
    pub terminators: Vec<Vec<SourceSpan>>,
}

/// Hand-rolled recursive descent parser over the token stream.
pub struct Parser<'a> {
    tokens: &'a [Token<'a>],
    pos: usize,
    /// Offset reported for errors at end of input.
    eof: usize,
    spans: SpanTable,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token<'a>], source_len: usize) -> Self {
        let eof = tokens.last().map_or(source_len, |t| t.end());
        Self {
            tokens,
            pos: 0,
            eof,
            spans: SpanTable::default(),
        }
    }

    pub fn into_spans(self) -> SpanTable {
        self.spans
    }

    /// Peek at the current token without consuming it.
    fn peek(&self) -> Option<&'a Token<'a>> {
        self.tokens.get(self.pos)
    }

    fn peek_nth(&self, n: usize) -> Option<&'a Token<'a>> {
        self.tokens.get(self.pos + n)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn peek_ident(&self, word: &str) -> bool {
        matches!(self.peek(), Some(t) if t.kind == TokenKind::Ident && t.lexeme == word)
    }

    /// Consume and return the current token.
    fn next(&mut self) -> SyntaxResult<&'a Token<'a>> {
        let tok = self.tokens.get(self.pos).ok_or_else(|| self.eof_error("token"))?;
        self.pos += 1;
        Ok(tok)
    }

    fn eof_error(&self, expected: &str) -> SyntaxError {
        SyntaxError {
            span: SourceSpan::new(self.eof.into(), 0usize),
            message: format!("unexpected end of input; expected {}", expected),
        }
    }

    fn error_at(&self, tok: &Token<'_>, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            span: tok.span,
            message: message.into(),
        }
    }

    /// Expect the next token to be of a specific kind.
    fn expect(&mut self, expected: TokenKind) -> SyntaxResult<&'a Token<'a>> {
        match self.peek() {
            Some(t) if t.kind == expected => {
                self.pos += 1;
                Ok(t)
            }
            Some(t) => Err(self.error_at(
                t,
                format!("expected {}, found '{}'", expected.describe(), t.lexeme),
            )),
            None => Err(self.eof_error(expected.describe())),
        }
    }

    fn expect_ident(&mut self, word: &str) -> SyntaxResult<&'a Token<'a>> {
        match self.peek() {
            Some(t) if t.kind == TokenKind::Ident && t.lexeme == word => {
                self.pos += 1;
                Ok(t)
            }
            Some(t) => Err(self.error_at(t, format!("expected '{}', found '{}'", word, t.lexeme))),
            None => Err(self.eof_error(&format!("'{}'", word))),
        }
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Span from `start` to the end of the most recently consumed token.
    fn span_from(&self, start: &Token<'_>) -> SourceSpan {
        let end = self.tokens[self.pos - 1].end();
        let offset = start.span.offset();
        SourceSpan::new(offset.into(), end - offset)
    }

    //--------------------------------------------------------------------------
    // <Module> ::= (<Global> | <Declare> | <Define>)*
    //--------------------------------------------------------------------------

    pub fn parse_module(&mut self, name: &str) -> SyntaxResult<Module> {
        let mut module = Module::new(name);

        while let Some(tok) = self.peek() {
            match tok.kind {
                TokenKind::Global => self.parse_global(&mut module)?,
                TokenKind::Ident if tok.lexeme == "declare" => self.parse_declare(&mut module)?,
                TokenKind::Ident if tok.lexeme == "define" => self.parse_define(&mut module)?,
                _ => {
                    return Err(self.error_at(
                        tok,
                        format!("expected top-level entity, found '{}'", tok.lexeme),
                    ))
                }
            }
        }

        Ok(module)
    }

    /// <Global> ::= "@" <name> "=" ("global" | "constant") <Type> <Constant>
    fn parse_global(&mut self, module: &mut Module) -> SyntaxResult<()> {
        let name_tok = self.expect(TokenKind::Global)?;
        self.expect(TokenKind::Eq)?;
        let kind = self.next()?;
        let constant = match kind.lexeme {
            "global" => false,
            "constant" => true,
            other => {
                return Err(self.error_at(
                    kind,
                    format!("expected 'global' or 'constant', found '{}'", other),
                ))
            }
        };
        let ty_tok = self.peek();
        let ty = self.parse_type()?;
        if ty.is_void() {
            let tok = ty_tok.unwrap_or(name_tok);
            return Err(self.error_at(tok, "global variables cannot have type void"));
        }
        let init = match self.parse_value(ty)? {
            Operand::Const(c) => c,
            _ => {
                return Err(self.error_at(
                    &self.tokens[self.pos - 1],
                    "global initializer must be a constant",
                ))
            }
        };
        module
            .add_global(&name_tok.lexeme[1..], ty, init, constant)
            .map_err(|e| self.error_at(name_tok, e.to_string()))?;
        Ok(())
    }

    /// <Declare> ::= "declare" <Type> "@" <name> "(" (<Type> <local>?),* ")"
    fn parse_declare(&mut self, module: &mut Module) -> SyntaxResult<()> {
        let start = self.expect_ident("declare")?;
        let ret = self.parse_type()?;
        let name_tok = self.expect(TokenKind::Global)?;
        let params = self.parse_params(false)?;
        let ty = FunctionType::new(ret, params.into_iter().map(|p| p.ty).collect());
        module
            .add_external_function(&name_tok.lexeme[1..], ty)
            .map_err(|e| self.error_at(name_tok, e.to_string()))?;

        self.spans.functions.push(self.span_from(start));
        self.spans.insts.push(Vec::new());
        self.spans.terminators.push(Vec::new());
        Ok(())
    }

    /// <Define> ::= "define" <Type> "@" <name> "(" (<Type> <local>),* ")" "{" <Block>+ "}"
    fn parse_define(&mut self, module: &mut Module) -> SyntaxResult<()> {
        let start = self.expect_ident("define")?;
        let ret = self.parse_type()?;
        let name_tok = self.expect(TokenKind::Global)?;
        let params = self.parse_params(true)?;
        let header = self.span_from(start);
        self.expect(TokenKind::LBrace)?;

        let mut blocks = Vec::new();
        let mut inst_spans = Vec::new();
        let mut term_spans = Vec::new();
        while !self.eat(TokenKind::RBrace) {
            let (block, spans, term_span) = self.parse_block(blocks.is_empty())?;
            blocks.push(block);
            inst_spans.push(spans);
            term_spans.push(term_span);
        }
        if blocks.is_empty() {
            return Err(self.error_at(
                &self.tokens[self.pos - 1],
                "function body requires at least one basic block",
            ));
        }

        let function = Function::definition(&name_tok.lexeme[1..], ret, params, blocks);
        module
            .add_function(function)
            .map_err(|e| self.error_at(name_tok, e.to_string()))?;

        self.spans.functions.push(header);
        self.spans.insts.push(inst_spans);
        self.spans.terminators.push(term_spans);
        Ok(())
    }

    fn parse_params(&mut self, named: bool) -> SyntaxResult<Vec<Param>> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if self.eat(TokenKind::RParen) {
            return Ok(params);
        }
        loop {
            let ty_tok = self.peek();
            let ty = self.parse_type()?;
            if ty.is_void() {
                if let Some(tok) = ty_tok {
                    return Err(self.error_at(tok, "parameters cannot have type void"));
                }
            }
            let name = if self.peek_kind() == Some(TokenKind::Local) {
                let tok = self.next()?;
                if !named {
                    // Names in declarations are accepted and dropped.
                    params.len().to_string()
                } else {
                    tok.lexeme[1..].to_string()
                }
            } else {
                params.len().to_string()
            };
            params.push(Param { name, ty });

            if self.eat(TokenKind::RParen) {
                return Ok(params);
            }
            self.expect(TokenKind::Comma)?;
        }
    }

    //--------------------------------------------------------------------------
    // <Type> ::= "void" | "float" | "double" | "ptr" | "i"<N> | <Type> "*"
    //--------------------------------------------------------------------------

    pub fn parse_type(&mut self) -> SyntaxResult<Type> {
        let tok = self.next()?;
        if tok.kind != TokenKind::Ident {
            return Err(self.error_at(tok, format!("expected type, found '{}'", tok.lexeme)));
        }
        let mut ty = match tok.lexeme {
            "void" => Type::Void,
            "float" => Type::Float,
            "double" => Type::Double,
            "ptr" => Type::Ptr,
            word => match word.strip_prefix('i').and_then(|w| w.parse::<u32>().ok()) {
                Some(bits) => Type::int(bits).ok_or_else(|| {
                    self.error_at(
                        tok,
                        format!(
                            "integer width {} is not supported (expected 1, 8, 16, 32 or 64)",
                            bits
                        ),
                    )
                })?,
                None => {
                    return Err(self.error_at(tok, format!("expected type, found '{}'", word)))
                }
            },
        };
        while self.eat(TokenKind::Star) {
            ty = Type::Ptr;
        }
        Ok(ty)
    }

    //--------------------------------------------------------------------------
    // <Block> ::= (<label> ":")? <Inst>* <Terminator>
    //--------------------------------------------------------------------------

    fn parse_block(
        &mut self,
        is_entry: bool,
    ) -> SyntaxResult<(Block, Vec<SourceSpan>, SourceSpan)> {
        let has_label = matches!(self.peek_kind(), Some(TokenKind::Ident | TokenKind::Int))
            && matches!(self.peek_nth(1), Some(t) if t.kind == TokenKind::Colon);
        let label = if has_label {
            let tok = self.next()?;
            self.expect(TokenKind::Colon)?;
            tok.lexeme.to_string()
        } else if is_entry {
            "entry".to_string()
        } else {
            let tok = self.peek().ok_or_else(|| self.eof_error("block label"))?;
            return Err(self.error_at(tok, format!("expected block label, found '{}'", tok.lexeme)));
        };

        let mut insts = Vec::new();
        let mut spans = Vec::new();
        loop {
            let start = self.peek().ok_or_else(|| self.eof_error("instruction"))?;
            if let Some(terminator) = self.parse_terminator()? {
                let span = self.span_from(start);
                let block = Block {
                    label,
                    insts,
                    terminator,
                };
                return Ok((block, spans, span));
            }
            insts.push(self.parse_inst()?);
            spans.push(self.span_from(start));
        }
    }

    fn parse_terminator(&mut self) -> SyntaxResult<Option<Terminator>> {
        let Some(tok) = self.peek() else {
            return Ok(None);
        };
        if tok.kind != TokenKind::Ident {
            return Ok(None);
        }
        let terminator = match tok.lexeme {
            "ret" => {
                self.pos += 1;
                let ty = self.parse_type()?;
                if ty.is_void() {
                    Terminator::Ret(None)
                } else {
                    let value = self.parse_value(ty)?;
                    Terminator::Ret(Some((ty, value)))
                }
            }
            "br" => {
                self.pos += 1;
                if self.peek_ident("label") {
                    Terminator::Br(self.parse_label_ref()?)
                } else {
                    let ty_tok = self.peek();
                    let ty = self.parse_type()?;
                    if ty != Type::I1 {
                        if let Some(tok) = ty_tok {
                            return Err(self.error_at(tok, "branch condition must have type i1"));
                        }
                    }
                    let cond = self.parse_value(Type::I1)?;
                    self.expect(TokenKind::Comma)?;
                    let on_true = self.parse_label_ref()?;
                    self.expect(TokenKind::Comma)?;
                    let on_false = self.parse_label_ref()?;
                    Terminator::CondBr {
                        cond,
                        on_true,
                        on_false,
                    }
                }
            }
            "unreachable" => {
                self.pos += 1;
                Terminator::Unreachable
            }
            _ => return Ok(None),
        };
        Ok(Some(terminator))
    }

    /// "label" "%" <name>
    fn parse_label_ref(&mut self) -> SyntaxResult<String> {
        self.expect_ident("label")?;
        let tok = self.expect(TokenKind::Local)?;
        Ok(tok.lexeme[1..].to_string())
    }

    //--------------------------------------------------------------------------
    // <Inst> ::= ("%" <name> "=")? <opcode> ...
    //--------------------------------------------------------------------------

    fn parse_inst(&mut self) -> SyntaxResult<Inst> {
        let result = if self.peek_kind() == Some(TokenKind::Local)
            && matches!(self.peek_nth(1), Some(t) if t.kind == TokenKind::Eq)
        {
            let tok = self.next()?;
            self.pos += 1;
            Some((tok, tok.lexeme[1..].to_string()))
        } else {
            None
        };

        let op_tok = self.next()?;
        if op_tok.kind != TokenKind::Ident {
            return Err(self.error_at(
                op_tok,
                format!("expected instruction opcode, found '{}'", op_tok.lexeme),
            ));
        }
        let kind = self.parse_inst_kind(op_tok)?;

        let ty = kind.result_type();
        match (&result, ty.is_void()) {
            (Some((tok, name)), true) => {
                return Err(self.error_at(
                    tok,
                    format!("cannot assign a name to void value '%{}'", name),
                ))
            }
            (None, false) if !matches!(kind, InstKind::Call { .. }) => {
                return Err(self.error_at(op_tok, "instruction result must be named"))
            }
            _ => {}
        }

        Ok(Inst {
            result: result.map(|(_, name)| name),
            kind,
        })
    }

    fn parse_inst_kind(&mut self, op_tok: &'a Token<'a>) -> SyntaxResult<InstKind> {
        let opcode = op_tok.lexeme;

        if let Some(op) = BinaryOp::from_mnemonic(opcode) {
            self.skip_flags(&["nsw", "nuw", "exact"]);
            let ty = self.parse_type()?;
            let lhs = self.parse_value(ty)?;
            self.expect(TokenKind::Comma)?;
            let rhs = self.parse_value(ty)?;
            return Ok(InstKind::Binary { op, ty, lhs, rhs });
        }

        if let Some(op) = CastOp::from_mnemonic(opcode) {
            let from = self.parse_type()?;
            let value = self.parse_value(from)?;
            self.expect_ident("to")?;
            let to = self.parse_type()?;
            return Ok(InstKind::Cast {
                op,
                from,
                value,
                to,
            });
        }

        match opcode {
            "icmp" => {
                let pred_tok = self.expect(TokenKind::Ident)?;
                let pred = IntPredicate::from_mnemonic(pred_tok.lexeme).ok_or_else(|| {
                    self.error_at(pred_tok, format!("unknown icmp predicate '{}'", pred_tok.lexeme))
                })?;
                let ty = self.parse_type()?;
                let lhs = self.parse_value(ty)?;
                self.expect(TokenKind::Comma)?;
                let rhs = self.parse_value(ty)?;
                Ok(InstKind::ICmp { pred, ty, lhs, rhs })
            }
            "fcmp" => {
                let pred_tok = self.expect(TokenKind::Ident)?;
                let pred = FloatPredicate::from_mnemonic(pred_tok.lexeme).ok_or_else(|| {
                    self.error_at(pred_tok, format!("unknown fcmp predicate '{}'", pred_tok.lexeme))
                })?;
                let ty = self.parse_type()?;
                let lhs = self.parse_value(ty)?;
                self.expect(TokenKind::Comma)?;
                let rhs = self.parse_value(ty)?;
                Ok(InstKind::FCmp { pred, ty, lhs, rhs })
            }
            "select" => {
                let cond_ty = self.parse_type()?;
                let cond = self.parse_value(cond_ty)?;
                self.expect(TokenKind::Comma)?;
                let ty_tok = self.peek();
                let ty = self.parse_type()?;
                let on_true = self.parse_value(ty)?;
                self.expect(TokenKind::Comma)?;
                let else_ty = self.parse_type()?;
                if else_ty != ty {
                    if let Some(tok) = ty_tok {
                        return Err(self.error_at(tok, "select operands must have the same type"));
                    }
                }
                let on_false = self.parse_value(ty)?;
                if cond_ty != Type::I1 {
                    return Err(self.error_at(op_tok, "select condition must have type i1"));
                }
                Ok(InstKind::Select {
                    cond,
                    ty,
                    on_true,
                    on_false,
                })
            }
            "phi" => {
                let ty = self.parse_type()?;
                let mut incoming = Vec::new();
                loop {
                    self.expect(TokenKind::LBracket)?;
                    let value = self.parse_value(ty)?;
                    self.expect(TokenKind::Comma)?;
                    let label = self.expect(TokenKind::Local)?.lexeme[1..].to_string();
                    self.expect(TokenKind::RBracket)?;
                    incoming.push((value, label));
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                Ok(InstKind::Phi { ty, incoming })
            }
            "call" | "tail" => {
                if opcode == "tail" {
                    self.expect_ident("call")?;
                }
                let ret = self.parse_type()?;
                let callee = self.expect(TokenKind::Global)?.lexeme[1..].to_string();
                self.expect(TokenKind::LParen)?;
                let mut args = Vec::new();
                if !self.eat(TokenKind::RParen) {
                    loop {
                        let ty = self.parse_type()?;
                        let value = self.parse_value(ty)?;
                        args.push((ty, value));
                        if self.eat(TokenKind::RParen) {
                            break;
                        }
                        self.expect(TokenKind::Comma)?;
                    }
                }
                Ok(InstKind::Call { ret, callee, args })
            }
            "alloca" => {
                let ty = self.parse_type()?;
                self.skip_align()?;
                Ok(InstKind::Alloca { ty })
            }
            "load" => {
                let ty = self.parse_type()?;
                self.expect(TokenKind::Comma)?;
                let ptr = self.parse_pointer_operand()?;
                self.skip_align()?;
                Ok(InstKind::Load { ty, ptr })
            }
            "store" => {
                let ty = self.parse_type()?;
                let value = self.parse_value(ty)?;
                self.expect(TokenKind::Comma)?;
                let ptr = self.parse_pointer_operand()?;
                self.skip_align()?;
                Ok(InstKind::Store { ty, value, ptr })
            }
            other => Err(self.error_at(op_tok, format!("unknown instruction opcode '{}'", other))),
        }
    }

    fn parse_pointer_operand(&mut self) -> SyntaxResult<Operand> {
        let ty_tok = self.peek();
        let ty = self.parse_type()?;
        if ty != Type::Ptr {
            if let Some(tok) = ty_tok {
                return Err(self.error_at(tok, "expected a pointer operand"));
            }
        }
        self.parse_value(Type::Ptr)
    }

    fn skip_flags(&mut self, flags: &[&str]) {
        while matches!(self.peek(), Some(t) if t.kind == TokenKind::Ident && flags.contains(&t.lexeme))
        {
            self.pos += 1;
        }
    }

    /// Optional `, align N` suffix; alignment is not modelled.
    fn skip_align(&mut self) -> SyntaxResult<()> {
        if self.peek_kind() == Some(TokenKind::Comma)
            && matches!(self.peek_nth(1), Some(t) if t.kind == TokenKind::Ident && t.lexeme == "align")
        {
            self.pos += 2;
            self.expect(TokenKind::Int)?;
        }
        Ok(())
    }

    //--------------------------------------------------------------------------
    // <Value> ::= <local> | <global> | <Constant>
    //--------------------------------------------------------------------------

    /// Parses an operand used in a slot of type `ty`. Literal constants are
    /// checked against `ty` here; named values are checked by the verifier.
    pub fn parse_value(&mut self, ty: Type) -> SyntaxResult<Operand> {
        let tok = self.next()?;
        let mismatch = |what: &str| SyntaxError {
            span: tok.span,
            message: format!("{} is invalid for type '{}'", what, ty),
        };

        let constant = match tok.kind {
            TokenKind::Local => return Ok(Operand::Local(tok.lexeme[1..].to_string())),
            TokenKind::Global => return Ok(Operand::Global(tok.lexeme[1..].to_string())),
            TokenKind::Int => match ty {
                Type::Int(bits) => Constant::Int(parse_int_literal(tok, bits)?),
                Type::Float | Type::Double => {
                    let value = tok.lexeme.parse::<f64>().map_err(|_| mismatch("integer constant"))?;
                    Constant::Float(value)
                }
                _ => return Err(mismatch("integer constant")),
            },
            TokenKind::Float => match ty {
                Type::Float | Type::Double => {
                    let value = tok
                        .lexeme
                        .parse::<f64>()
                        .map_err(|_| mismatch("floating point constant"))?;
                    Constant::Float(value)
                }
                _ => return Err(mismatch("floating point constant")),
            },
            TokenKind::HexFloat => match ty {
                Type::Float | Type::Double => {
                    let bits = u64::from_str_radix(&tok.lexeme[2..], 16)
                        .map_err(|_| mismatch("hexadecimal constant"))?;
                    Constant::Float(f64::from_bits(bits))
                }
                _ => return Err(mismatch("hexadecimal constant")),
            },
            TokenKind::Ident => match tok.lexeme {
                "true" | "false" if ty == Type::I1 => Constant::Bool(tok.lexeme == "true"),
                "true" | "false" => return Err(mismatch("boolean constant")),
                "null" if ty == Type::Ptr => Constant::Null,
                "null" => return Err(mismatch("null constant")),
                "zeroinitializer" | "undef" | "poison" if !ty.is_void() => Constant::Zero,
                other => {
                    return Err(self.error_at(tok, format!("expected value, found '{}'", other)))
                }
            },
            _ => {
                return Err(self.error_at(tok, format!("expected value, found '{}'", tok.lexeme)))
            }
        };
        Ok(Operand::Const(constant))
    }
}

/// Parses an integer literal that must fit `bits` as either a signed or an
/// unsigned value. The result keeps the two's complement bit pattern.
fn parse_int_literal(tok: &Token<'_>, bits: u32) -> SyntaxResult<i64> {
    let out_of_range = || SyntaxError {
        span: tok.span,
        message: format!("integer constant '{}' does not fit in i{}", tok.lexeme, bits),
    };
    let value = tok.lexeme.parse::<i128>().map_err(|_| out_of_range())?;
    let min = -(1i128 << (bits - 1));
    let max = (1i128 << bits) - 1;
    if value < min || value > max {
        return Err(out_of_range());
    }
    Ok(value as i64)
}
