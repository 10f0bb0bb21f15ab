//! The recursive-descent parser.
//!
//! Produces the sugared tree the desugarer consumes. Error recovery is
//! statement-level: a malformed statement reports one diagnostic, the
//! parser skips to the next separator, and the statement becomes
//! `EmptyTree`.

use beryl_ast::{ClassDefKind, Expr, ExprKind, IdentKind, MethodDefFlags, SendFlags};
use beryl_core::GlobalState;
use beryl_core::loc::LocOffsets;
use beryl_core::names::NameRef;
use beryl_core::types::LitKind;
use ecow::EcoString;

use crate::lexer::{self, Keyword, Op, StrPart, Token, TokenKind};

/// A syntax problem found while parsing.
#[derive(Clone, Debug)]
pub struct ParseDiagnostic {
    /// Where.
    pub loc: LocOffsets,
    /// What.
    pub message: String,
}

/// The recovered tree plus every syntax problem found.
#[derive(Debug)]
pub struct ParseResult {
    /// The tree; error statements are elided to `EmptyTree`.
    pub tree: Expr,
    /// Syntax diagnostics, in source order.
    pub errors: Vec<ParseDiagnostic>,
}

/// Parses a whole file.
pub fn parse(gs: &mut GlobalState, source: &str) -> ParseResult {
    let (tokens, lex_errors) = lexer::lex(source, 0);
    let mut errors: Vec<ParseDiagnostic> = lex_errors
        .into_iter()
        .map(|e| ParseDiagnostic {
            loc: LocOffsets::new(e.begin, e.end),
            message: e.message,
        })
        .collect();
    let mut parser = Parser {
        gs,
        tokens,
        pos: 0,
        last_end: 0,
        errors: Vec::new(),
    };
    let tree = parser.parse_program();
    errors.append(&mut parser.errors);
    ParseResult { tree, errors }
}

struct Parser<'gs> {
    gs: &'gs mut GlobalState,
    tokens: Vec<Token>,
    pos: usize,
    last_end: u32,
    errors: Vec<ParseDiagnostic>,
}

impl Parser<'_> {
    // === Cursor ==========================================================

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn peek_at(&self, ahead: usize) -> &TokenKind {
        &self.tokens[(self.pos + ahead).min(self.tokens.len() - 1)].kind
    }

    fn start(&self) -> u32 {
        self.tokens[self.pos.min(self.tokens.len() - 1)].begin
    }

    fn span_from(&self, start: u32) -> LocOffsets {
        LocOffsets::new(start, self.last_end.max(start))
    }

    fn bump(&mut self) -> TokenKind {
        let idx = self.pos.min(self.tokens.len() - 1);
        let token = self.tokens[idx].clone();
        self.last_end = token.end;
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token.kind
    }

    fn at_op(&self, op: Op) -> bool {
        matches!(self.peek(), TokenKind::Op(o) if *o == op)
    }

    fn at_kw(&self, kw: Keyword) -> bool {
        matches!(self.peek(), TokenKind::Keyword(k) if *k == kw)
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn eat_op(&mut self, op: Op) -> bool {
        if self.at_op(op) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_kw(&mut self, kw: Keyword) -> bool {
        if self.at_kw(kw) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: Op, what: &str) {
        if !self.eat_op(op) {
            self.error_here(&format!("expected {what}"));
        }
    }

    fn expect_kw(&mut self, kw: Keyword, what: &str) {
        if !self.eat_kw(kw) {
            self.error_here(&format!("expected {what}"));
        }
    }

    fn error_here(&mut self, message: &str) {
        let start = self.start();
        self.errors.push(ParseDiagnostic {
            loc: LocOffsets::new(start, start.max(self.last_end)),
            message: message.to_string(),
        });
    }

    fn name(&mut self, text: &str) -> NameRef {
        self.gs.enter_name_utf8(text)
    }

    fn const_name(&mut self, text: &str) -> NameRef {
        self.gs.enter_name_constant(text)
    }

    fn at_separator(&self) -> bool {
        matches!(self.peek(), TokenKind::Newline | TokenKind::Op(Op::Semi))
    }

    fn skip_separators(&mut self) {
        while self.at_separator() {
            self.bump();
        }
    }

    /// Whether the current token ends a statement list.
    fn at_stmts_stop(&self) -> bool {
        self.at_eof()
            || matches!(
                self.peek(),
                TokenKind::Keyword(
                    Keyword::End
                        | Keyword::Else
                        | Keyword::Elsif
                        | Keyword::Rescue
                        | Keyword::Ensure
                ) | TokenKind::Op(Op::RParen | Op::RBrace)
            )
    }

    // === Statements ======================================================

    fn parse_program(&mut self) -> Expr {
        let start = self.start();
        let tree = self.parse_stmts(start);
        if !self.at_eof() {
            self.error_here("unexpected trailing input");
        }
        tree
    }

    /// Parses statements until a stop token, folding them into an `InsSeq`.
    fn parse_stmts(&mut self, start: u32) -> Expr {
        let mut stats: Vec<Expr> = Vec::new();
        loop {
            self.skip_separators();
            if self.at_stmts_stop() {
                break;
            }
            let stmt = self.parse_expr();
            stats.push(stmt);
            if !self.at_separator() && !self.at_stmts_stop() {
                self.error_here("expected a statement separator");
                // Recover to the next statement boundary.
                while !self.at_separator() && !self.at_stmts_stop() {
                    self.bump();
                }
            }
        }
        match stats.len() {
            0 => Expr::empty(self.span_from(start)),
            1 => stats.pop().unwrap(),
            _ => {
                let expr = Box::new(stats.pop().unwrap());
                Expr::new(self.span_from(start), ExprKind::InsSeq { stats, expr })
            }
        }
    }

    // === Expressions =====================================================

    fn parse_expr(&mut self) -> Expr {
        let start = self.start();
        let first = self.parse_equality();

        if self.at_op(Op::Assign) {
            self.bump();
            let rhs = self.parse_expr();
            return self.make_assign(start, first, rhs);
        }
        if let TokenKind::Op(Op::OpAssign(op)) = *self.peek() {
            self.bump();
            let rhs = self.parse_expr();
            let op = self.name(op.method_name());
            return Expr::new(
                self.span_from(start),
                ExprKind::OpAssign {
                    lhs: Box::new(first),
                    op,
                    rhs: Box::new(rhs),
                },
            );
        }
        if self.at_op(Op::Comma) && is_assign_target(&first) {
            // Multi-assignment: `a, b = rhs`.
            let mut lhs = vec![first];
            while self.eat_op(Op::Comma) {
                lhs.push(self.parse_equality());
            }
            self.expect_op(Op::Assign, "`=` after multi-assignment targets");
            let rhs = self.parse_expr();
            return Expr::new(
                self.span_from(start),
                ExprKind::MultiAssign {
                    lhs,
                    rhs: Box::new(rhs),
                },
            );
        }
        first
    }

    /// Turns `lhs = rhs` into the right node for the target form.
    fn make_assign(&mut self, start: u32, lhs: Expr, rhs: Expr) -> Expr {
        let loc = self.span_from(start);
        match lhs.kind {
            ExprKind::UnresolvedIdent { .. } | ExprKind::UnresolvedConstant { .. } => Expr::new(
                loc,
                ExprKind::Assign {
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
            ),
            ExprKind::Send {
                recv,
                method,
                flags,
                num_pos_args,
                mut args,
            } => {
                // `a[i] = v` and `a.x = v` are writer sends.
                let method_text = self.gs.show_name(method);
                let writer: EcoString = if method_text == "[]" {
                    "[]=".into()
                } else {
                    let mut text = method_text.clone();
                    text.push('=');
                    text
                };
                let writer = self.name(&writer);
                args.push(rhs);
                Expr::new(
                    loc,
                    ExprKind::Send {
                        recv,
                        method: writer,
                        flags,
                        num_pos_args: num_pos_args + 1,
                        args,
                    },
                )
            }
            _ => {
                self.error_here("cannot assign to this expression");
                Expr::empty(loc)
            }
        }
    }

    fn parse_equality(&mut self) -> Expr {
        let start = self.start();
        let mut lhs = self.parse_comparison();
        loop {
            let method = match self.peek() {
                TokenKind::Op(Op::EqEq) => "==",
                TokenKind::Op(Op::NotEq) => "!=",
                _ => break,
            };
            self.bump();
            let rhs = self.parse_comparison();
            lhs = self.binary(start, lhs, method, rhs);
        }
        lhs
    }

    fn parse_comparison(&mut self) -> Expr {
        let start = self.start();
        let mut lhs = self.parse_bitwise();
        loop {
            let method = match self.peek() {
                TokenKind::Op(Op::Lt) => "<",
                TokenKind::Op(Op::LtEq) => "<=",
                TokenKind::Op(Op::Gt) => ">",
                TokenKind::Op(Op::GtEq) => ">=",
                _ => break,
            };
            self.bump();
            let rhs = self.parse_bitwise();
            lhs = self.binary(start, lhs, method, rhs);
        }
        lhs
    }

    fn parse_bitwise(&mut self) -> Expr {
        let start = self.start();
        let mut lhs = self.parse_additive();
        loop {
            let method = match self.peek() {
                TokenKind::Op(Op::Shl) => "<<",
                TokenKind::Op(Op::Amp) => "&",
                TokenKind::Op(Op::Pipe) => "|",
                _ => break,
            };
            self.bump();
            let rhs = self.parse_additive();
            lhs = self.binary(start, lhs, method, rhs);
        }
        lhs
    }

    fn parse_additive(&mut self) -> Expr {
        let start = self.start();
        let mut lhs = self.parse_multiplicative();
        loop {
            let method = match self.peek() {
                TokenKind::Op(Op::Plus) => "+",
                TokenKind::Op(Op::Minus) => "-",
                _ => break,
            };
            self.bump();
            let rhs = self.parse_multiplicative();
            lhs = self.binary(start, lhs, method, rhs);
        }
        lhs
    }

    fn parse_multiplicative(&mut self) -> Expr {
        let start = self.start();
        let mut lhs = self.parse_unary();
        loop {
            let method = match self.peek() {
                TokenKind::Op(Op::Star) => "*",
                TokenKind::Op(Op::Slash) => "/",
                TokenKind::Op(Op::Percent) => "%",
                _ => break,
            };
            self.bump();
            let rhs = self.parse_unary();
            lhs = self.binary(start, lhs, method, rhs);
        }
        lhs
    }

    fn binary(&mut self, start: u32, lhs: Expr, method: &str, rhs: Expr) -> Expr {
        let method = self.name(method);
        Expr::new(
            self.span_from(start),
            ExprKind::Send {
                recv: Box::new(lhs),
                method,
                flags: SendFlags::default(),
                num_pos_args: 1,
                args: vec![rhs],
            },
        )
    }

    fn parse_unary(&mut self) -> Expr {
        let start = self.start();
        if self.at_op(Op::Bang) {
            self.bump();
            let operand = self.parse_unary();
            let method = self.name("!");
            return Expr::new(
                self.span_from(start),
                ExprKind::Send {
                    recv: Box::new(operand),
                    method,
                    flags: SendFlags::default(),
                    num_pos_args: 0,
                    args: vec![],
                },
            );
        }
        if self.at_op(Op::Minus) {
            // Negative numeric literals fold; anything else is a `-@` send.
            match self.peek_at(1) {
                TokenKind::Int(value) => {
                    let value = *value;
                    self.bump();
                    self.bump();
                    return Expr::new(
                        self.span_from(start),
                        ExprKind::Literal {
                            value: LitKind::Int(-value),
                        },
                    );
                }
                TokenKind::Float(value) => {
                    let value = *value;
                    self.bump();
                    self.bump();
                    return Expr::new(
                        self.span_from(start),
                        ExprKind::Literal {
                            value: LitKind::Float((-value).to_bits()),
                        },
                    );
                }
                _ => {
                    self.bump();
                    let operand = self.parse_unary();
                    let method = self.name("-@");
                    return Expr::new(
                        self.span_from(start),
                        ExprKind::Send {
                            recv: Box::new(operand),
                            method,
                            flags: SendFlags::default(),
                            num_pos_args: 0,
                            args: vec![],
                        },
                    );
                }
            }
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Expr {
        let start = self.start();
        let mut expr = self.parse_primary();
        loop {
            if self.at_op(Op::Dot) {
                self.bump();
                let method = match self.bump() {
                    TokenKind::Ident(text) => self.name(&text),
                    TokenKind::Const(text) => self.name(&text),
                    other => {
                        self.error_here(&format!("expected a method name, got {other:?}"));
                        return expr;
                    }
                };
                let (num_pos_args, mut args) = if self.at_op(Op::LParen) {
                    self.bump();
                    self.parse_call_args(Op::RParen)
                } else {
                    (0, vec![])
                };
                if let Some(block) = self.parse_optional_block() {
                    args.push(block);
                }
                expr = Expr::new(
                    self.span_from(start),
                    ExprKind::Send {
                        recv: Box::new(expr),
                        method,
                        flags: SendFlags::default(),
                        num_pos_args,
                        args,
                    },
                );
            } else if self.at_op(Op::ColonColon) {
                self.bump();
                match self.bump() {
                    TokenKind::Const(text) => {
                        let name = self.const_name(&text);
                        expr = Expr::new(
                            self.span_from(start),
                            ExprKind::UnresolvedConstant {
                                scope: Box::new(expr),
                                name,
                            },
                        );
                    }
                    other => {
                        self.error_here(&format!("expected a constant name, got {other:?}"));
                        return expr;
                    }
                }
            } else if self.at_op(Op::LBracket) {
                self.bump();
                let (num_pos_args, args) = self.parse_call_args(Op::RBracket);
                let method = self.name("[]");
                expr = Expr::new(
                    self.span_from(start),
                    ExprKind::Send {
                        recv: Box::new(expr),
                        method,
                        flags: SendFlags::default(),
                        num_pos_args,
                        args,
                    },
                );
            } else {
                break;
            }
        }
        expr
    }

    fn parse_primary(&mut self) -> Expr {
        let start = self.start();
        match self.peek().clone() {
            TokenKind::Int(value) => {
                self.bump();
                Expr::new(
                    self.span_from(start),
                    ExprKind::Literal {
                        value: LitKind::Int(value),
                    },
                )
            }
            TokenKind::Float(value) => {
                self.bump();
                Expr::new(
                    self.span_from(start),
                    ExprKind::Literal {
                        value: LitKind::Float(value.to_bits()),
                    },
                )
            }
            TokenKind::Symbol(text) => {
                self.bump();
                let name = self.name(&text);
                Expr::new(
                    self.span_from(start),
                    ExprKind::Literal {
                        value: LitKind::Sym(name),
                    },
                )
            }
            TokenKind::Str(parts) => {
                self.bump();
                self.string_expr(start, parts)
            }
            TokenKind::Keyword(Keyword::True) => {
                self.bump();
                Expr::new(
                    self.span_from(start),
                    ExprKind::Literal {
                        value: LitKind::True,
                    },
                )
            }
            TokenKind::Keyword(Keyword::False) => {
                self.bump();
                Expr::new(
                    self.span_from(start),
                    ExprKind::Literal {
                        value: LitKind::False,
                    },
                )
            }
            TokenKind::Keyword(Keyword::Nil) => {
                self.bump();
                Expr::new(
                    self.span_from(start),
                    ExprKind::Literal {
                        value: LitKind::Nil,
                    },
                )
            }
            TokenKind::Keyword(Keyword::SelfKw) => {
                self.bump();
                Expr::new(self.span_from(start), ExprKind::SelfExpr)
            }
            TokenKind::Keyword(Keyword::Super) => {
                self.bump();
                Expr::new(self.span_from(start), ExprKind::ZSuperArgs)
            }
            TokenKind::Keyword(Keyword::Yield) => {
                self.bump();
                let (num_pos_args, args) = if self.at_op(Op::LParen) {
                    self.bump();
                    self.parse_call_args(Op::RParen)
                } else {
                    (0, vec![])
                };
                let method = self.name("yield");
                Expr::new(
                    self.span_from(start),
                    ExprKind::Send {
                        recv: Box::new(Expr::empty(self.span_from(start))),
                        method,
                        flags: SendFlags {
                            is_private_ok: true,
                        },
                        num_pos_args,
                        args,
                    },
                )
            }
            TokenKind::Ident(text) => {
                self.bump();
                let name = self.name(&text);
                let has_parens = self.at_op(Op::LParen);
                let (num_pos_args, mut args) = if has_parens {
                    self.bump();
                    self.parse_call_args(Op::RParen)
                } else if self.at_command_arg_start() {
                    // Paren-less command call: `include Greets`,
                    // `attr_accessor :name`, `puts "hi"`.
                    self.parse_command_args()
                } else {
                    (0, vec![])
                };
                let made_call = has_parens || !args.is_empty();
                // A `do` after a bare name belongs to an enclosing `while`
                // or `for`, so only calls may take a `do` block.
                let block = if made_call || self.at_op(Op::LBrace) {
                    self.parse_optional_block()
                } else {
                    None
                };
                if !made_call && block.is_none() {
                    return Expr::new(
                        self.span_from(start),
                        ExprKind::UnresolvedIdent {
                            name,
                            kind: IdentKind::Local,
                        },
                    );
                }
                if let Some(block) = block {
                    args.push(block);
                }
                Expr::new(
                    self.span_from(start),
                    ExprKind::Send {
                        recv: Box::new(Expr::empty(LocOffsets::new(start, start))),
                        method: name,
                        flags: SendFlags {
                            is_private_ok: true,
                        },
                        num_pos_args,
                        args,
                    },
                )
            }
            TokenKind::IVar(text) => {
                self.bump();
                let name = self.name(&text);
                Expr::new(
                    self.span_from(start),
                    ExprKind::UnresolvedIdent {
                        name,
                        kind: IdentKind::Instance,
                    },
                )
            }
            TokenKind::GVar(text) => {
                self.bump();
                let name = self.name(&text);
                Expr::new(
                    self.span_from(start),
                    ExprKind::UnresolvedIdent {
                        name,
                        kind: IdentKind::Global,
                    },
                )
            }
            TokenKind::Const(text) => {
                self.bump();
                let name = self.const_name(&text);
                Expr::new(
                    self.span_from(start),
                    ExprKind::UnresolvedConstant {
                        scope: Box::new(Expr::empty(LocOffsets::new(start, start))),
                        name,
                    },
                )
            }
            TokenKind::Op(Op::ColonColon) => {
                self.bump();
                match self.bump() {
                    TokenKind::Const(text) => {
                        let name = self.const_name(&text);
                        Expr::new(
                            self.span_from(start),
                            ExprKind::UnresolvedConstant {
                                scope: Box::new(Expr::new(
                                    LocOffsets::new(start, start),
                                    ExprKind::ConstantRoot,
                                )),
                                name,
                            },
                        )
                    }
                    _ => {
                        self.error_here("expected a constant after `::`");
                        Expr::empty(self.span_from(start))
                    }
                }
            }
            TokenKind::Op(Op::LParen) => {
                self.bump();
                let inner = self.parse_stmts(start);
                self.expect_op(Op::RParen, "`)`");
                inner
            }
            TokenKind::Op(Op::LBracket) => {
                self.bump();
                let mut elems = Vec::new();
                self.skip_separators();
                while !self.at_op(Op::RBracket) && !self.at_eof() {
                    elems.push(self.parse_expr());
                    self.skip_separators();
                    if !self.eat_op(Op::Comma) {
                        break;
                    }
                    self.skip_separators();
                }
                self.expect_op(Op::RBracket, "`]`");
                Expr::new(self.span_from(start), ExprKind::Array { elems })
            }
            TokenKind::Op(Op::LBrace) => {
                self.bump();
                self.parse_hash(start)
            }
            TokenKind::Keyword(Keyword::If) => {
                self.bump();
                let expr = self.parse_if_tail(start, false);
                self.expect_kw(Keyword::End, "`end` closing `if`");
                expr
            }
            TokenKind::Keyword(Keyword::Unless) => {
                self.bump();
                let expr = self.parse_if_tail(start, true);
                self.expect_kw(Keyword::End, "`end` closing `unless`");
                expr
            }
            TokenKind::Keyword(Keyword::While) => {
                self.bump();
                self.parse_while(start, false)
            }
            TokenKind::Keyword(Keyword::Until) => {
                self.bump();
                self.parse_while(start, true)
            }
            TokenKind::Keyword(Keyword::For) => {
                self.bump();
                self.parse_for(start)
            }
            TokenKind::Keyword(Keyword::Begin) => {
                self.bump();
                self.parse_begin(start)
            }
            TokenKind::Keyword(Keyword::Class) => {
                self.bump();
                self.parse_class(start, ClassDefKind::Class)
            }
            TokenKind::Keyword(Keyword::Module) => {
                self.bump();
                self.parse_class(start, ClassDefKind::Module)
            }
            TokenKind::Keyword(Keyword::Def) => {
                self.bump();
                self.parse_def(start)
            }
            TokenKind::Keyword(Keyword::Return) => {
                self.bump();
                let expr = self.parse_jump_value(start);
                Expr::new(self.span_from(start), ExprKind::Return { expr })
            }
            TokenKind::Keyword(Keyword::Break) => {
                self.bump();
                let expr = self.parse_jump_value(start);
                Expr::new(self.span_from(start), ExprKind::Break { expr })
            }
            TokenKind::Keyword(Keyword::Next) => {
                self.bump();
                let expr = self.parse_jump_value(start);
                Expr::new(self.span_from(start), ExprKind::Next { expr })
            }
            other => {
                self.error_here(&format!("unexpected token {other:?}"));
                self.bump();
                Expr::empty(self.span_from(start))
            }
        }
    }

    fn parse_jump_value(&mut self, start: u32) -> Box<Expr> {
        if self.at_separator() || self.at_stmts_stop() {
            Box::new(Expr::empty(LocOffsets::new(start, start)))
        } else {
            Box::new(self.parse_expr())
        }
    }

    fn string_expr(&mut self, start: u32, parts: Vec<StrPart>) -> Expr {
        let loc = self.span_from(start);
        let has_interp = parts.iter().any(|p| matches!(p, StrPart::Interp(..)));
        if !has_interp {
            let text = match parts.first() {
                Some(StrPart::Lit(text)) => text.clone(),
                _ => EcoString::new(),
            };
            let name = self.name(&text);
            return Expr::new(
                loc,
                ExprKind::Literal {
                    value: LitKind::Str(name),
                },
            );
        }
        let mut exprs = Vec::new();
        for part in parts {
            match part {
                StrPart::Lit(text) => {
                    let name = self.name(&text);
                    exprs.push(Expr::new(
                        loc,
                        ExprKind::Literal {
                            value: LitKind::Str(name),
                        },
                    ));
                }
                StrPart::Interp(text, base) => {
                    let (tokens, lex_errors) = lexer::lex(&text, base);
                    for e in lex_errors {
                        self.errors.push(ParseDiagnostic {
                            loc: LocOffsets::new(e.begin, e.end),
                            message: e.message,
                        });
                    }
                    let mut sub = Parser {
                        gs: &mut *self.gs,
                        tokens,
                        pos: 0,
                        last_end: base,
                        errors: Vec::new(),
                    };
                    let expr = sub.parse_stmts(base);
                    self.errors.append(&mut sub.errors);
                    exprs.push(expr);
                }
            }
        }
        Expr::new(loc, ExprKind::DString { parts: exprs })
    }

    fn parse_hash(&mut self, start: u32) -> Expr {
        let mut keys = Vec::new();
        let mut values = Vec::new();
        self.skip_separators();
        while !self.at_op(Op::RBrace) && !self.at_eof() {
            // `key: value` label form sugar for a symbol key.
            if let TokenKind::Ident(text) = self.peek().clone() {
                if matches!(self.peek_at(1), TokenKind::Op(Op::Colon)) {
                    let key_start = self.start();
                    self.bump();
                    self.bump();
                    let name = self.name(&text);
                    keys.push(Expr::new(
                        self.span_from(key_start),
                        ExprKind::Literal {
                            value: LitKind::Sym(name),
                        },
                    ));
                    values.push(self.parse_expr());
                    self.skip_separators();
                    if !self.eat_op(Op::Comma) {
                        break;
                    }
                    self.skip_separators();
                    continue;
                }
            }
            keys.push(self.parse_expr());
            self.expect_op(Op::FatArrow, "`=>` in hash literal");
            values.push(self.parse_expr());
            self.skip_separators();
            if !self.eat_op(Op::Comma) {
                break;
            }
            self.skip_separators();
        }
        self.expect_op(Op::RBrace, "`}`");
        Expr::new(self.span_from(start), ExprKind::Hash { keys, values })
    }

    /// Parses call arguments up to `close` (consumed). Returns the
    /// positional count and the raw argument list (keyword pairs flattened
    /// after the positionals).
    fn parse_call_args(&mut self, close: Op) -> (u16, Vec<Expr>) {
        let mut num_pos: u16 = 0;
        let mut args = Vec::new();
        let mut seen_kwarg = false;
        self.skip_separators();
        while !self.at_op(close) && !self.at_eof() {
            if let TokenKind::Ident(text) = self.peek().clone() {
                if matches!(self.peek_at(1), TokenKind::Op(Op::Colon)) {
                    let key_start = self.start();
                    self.bump();
                    self.bump();
                    let name = self.name(&text);
                    args.push(Expr::new(
                        self.span_from(key_start),
                        ExprKind::Literal {
                            value: LitKind::Sym(name),
                        },
                    ));
                    args.push(self.parse_expr());
                    seen_kwarg = true;
                    self.skip_separators();
                    if !self.eat_op(Op::Comma) {
                        break;
                    }
                    self.skip_separators();
                    continue;
                }
            }
            if seen_kwarg {
                self.error_here("positional argument after keyword argument");
            }
            args.push(self.parse_expr());
            if !seen_kwarg {
                num_pos += 1;
            }
            self.skip_separators();
            if !self.eat_op(Op::Comma) {
                break;
            }
            self.skip_separators();
        }
        let close_name = if close == Op::RParen { "`)`" } else { "`]`" };
        self.expect_op(close, close_name);
        (num_pos, args)
    }

    /// Whether the current token can begin a paren-less command argument.
    /// Bare identifiers are excluded: `a b` stays two statements' worth of
    /// ambiguity the grammar does not take on.
    fn at_command_arg_start(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::Const(_)
                | TokenKind::Symbol(_)
                | TokenKind::Str(_)
                | TokenKind::Int(_)
                | TokenKind::Float(_)
                | TokenKind::IVar(_)
                | TokenKind::GVar(_)
                | TokenKind::Keyword(
                    Keyword::True | Keyword::False | Keyword::Nil | Keyword::SelfKw
                )
        )
    }

    /// Parses comma-separated command arguments up to the end of the
    /// statement.
    fn parse_command_args(&mut self) -> (u16, Vec<Expr>) {
        let mut num_pos: u16 = 0;
        let mut args = Vec::new();
        loop {
            args.push(self.parse_expr());
            num_pos += 1;
            if !self.eat_op(Op::Comma) {
                break;
            }
        }
        (num_pos, args)
    }

    fn parse_optional_block(&mut self) -> Option<Expr> {
        let start = self.start();
        if self.eat_op(Op::LBrace) {
            let args = self.parse_block_params();
            let body = self.parse_stmts(self.start());
            self.expect_op(Op::RBrace, "`}` closing block");
            return Some(Expr::new(
                self.span_from(start),
                ExprKind::Block {
                    args,
                    body: Box::new(body),
                },
            ));
        }
        if self.eat_kw(Keyword::Do) {
            let args = self.parse_block_params();
            let body = self.parse_stmts(self.start());
            self.expect_kw(Keyword::End, "`end` closing block");
            return Some(Expr::new(
                self.span_from(start),
                ExprKind::Block {
                    args,
                    body: Box::new(body),
                },
            ));
        }
        None
    }

    fn parse_block_params(&mut self) -> Vec<Expr> {
        self.skip_separators();
        if !self.eat_op(Op::Pipe) {
            return vec![];
        }
        let mut params = self.parse_params(Op::Pipe, /* allow_shadow */ true);
        self.expect_op(Op::Pipe, "`|` closing block parameters");
        // Move shadow params after the block parameter list proper, which
        // the grammar already guarantees; keep source order otherwise.
        params.shrink_to_fit();
        params
    }

    /// Parses a parameter list up to (not consuming) `close`.
    fn parse_params(&mut self, close: Op, allow_shadow: bool) -> Vec<Expr> {
        let mut params = Vec::new();
        let mut in_shadow = false;
        loop {
            // Newlines may split a parameter list; `;` is the shadow-param
            // divider, so it is not skipped here.
            while matches!(self.peek(), TokenKind::Newline) {
                self.bump();
            }
            if self.at_op(close) || self.at_eof() {
                break;
            }
            let start = self.start();
            if allow_shadow && self.eat_op(Op::Semi) {
                in_shadow = true;
                continue;
            }
            if self.eat_op(Op::Star) {
                let name = self.parse_param_name(start);
                params.push(Expr::new(
                    self.span_from(start),
                    ExprKind::RestArg {
                        name: Box::new(name),
                    },
                ));
            } else if self.eat_op(Op::Amp) {
                let name = self.parse_param_name(start);
                params.push(Expr::new(
                    self.span_from(start),
                    ExprKind::BlockArg {
                        name: Box::new(name),
                    },
                ));
            } else {
                let name = self.parse_param_name(start);
                if in_shadow {
                    params.push(Expr::new(
                        self.span_from(start),
                        ExprKind::ShadowArg {
                            name: Box::new(name),
                        },
                    ));
                } else if self.eat_op(Op::Colon) {
                    let default = if self.at_op(Op::Comma) || self.at_op(close) {
                        Expr::empty(self.span_from(start))
                    } else {
                        self.parse_expr()
                    };
                    params.push(Expr::new(
                        self.span_from(start),
                        ExprKind::KeywordArg {
                            name: Box::new(name),
                            default: Box::new(default),
                        },
                    ));
                } else if self.eat_op(Op::Assign) {
                    let default = self.parse_expr();
                    params.push(Expr::new(
                        self.span_from(start),
                        ExprKind::OptionalArg {
                            name: Box::new(name),
                            default: Box::new(default),
                        },
                    ));
                } else {
                    params.push(name);
                }
            }
            if !self.eat_op(Op::Comma) && !(allow_shadow && self.at_op(Op::Semi)) {
                break;
            }
        }
        params
    }

    fn parse_param_name(&mut self, start: u32) -> Expr {
        match self.bump() {
            TokenKind::Ident(text) => {
                let name = self.name(&text);
                Expr::new(
                    self.span_from(start),
                    ExprKind::UnresolvedIdent {
                        name,
                        kind: IdentKind::Local,
                    },
                )
            }
            other => {
                self.error_here(&format!("expected a parameter name, got {other:?}"));
                Expr::empty(self.span_from(start))
            }
        }
    }

    // === Compound statements =============================================

    /// Parses `cond … [elsif …] [else …]` without consuming the final
    /// `end`. With `negated`, branches swap (`unless`).
    fn parse_if_tail(&mut self, start: u32, negated: bool) -> Expr {
        let cond = self.parse_expr();
        if !self.eat_kw(Keyword::Then) {
            self.skip_separators();
        }
        let body = self.parse_stmts(self.start());
        let else_branch = if self.at_kw(Keyword::Elsif) {
            let elsif_start = self.start();
            self.bump();
            self.parse_if_tail(elsif_start, false)
        } else if self.eat_kw(Keyword::Else) {
            self.parse_stmts(self.start())
        } else {
            Expr::empty(LocOffsets::new(self.last_end, self.last_end))
        };
        let (then_branch, else_branch) = if negated {
            (else_branch, body)
        } else {
            (body, else_branch)
        };
        Expr::new(
            self.span_from(start),
            ExprKind::If {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
        )
    }

    fn parse_while(&mut self, start: u32, negated: bool) -> Expr {
        let cond = self.parse_expr();
        let cond = if negated {
            let method = self.name("!");
            Expr::new(
                cond.loc,
                ExprKind::Send {
                    recv: Box::new(cond),
                    method,
                    flags: SendFlags::default(),
                    num_pos_args: 0,
                    args: vec![],
                },
            )
        } else {
            cond
        };
        if !self.eat_kw(Keyword::Do) {
            self.skip_separators();
        }
        let body = self.parse_stmts(self.start());
        self.expect_kw(Keyword::End, "`end` closing loop");
        Expr::new(
            self.span_from(start),
            ExprKind::While {
                cond: Box::new(cond),
                body: Box::new(body),
            },
        )
    }

    fn parse_for(&mut self, start: u32) -> Expr {
        let var_start = self.start();
        let var = self.parse_param_name(var_start);
        self.expect_kw(Keyword::In, "`in`");
        let iterable = self.parse_expr();
        if !self.eat_kw(Keyword::Do) {
            self.skip_separators();
        }
        let body = self.parse_stmts(self.start());
        self.expect_kw(Keyword::End, "`end` closing `for`");
        Expr::new(
            self.span_from(start),
            ExprKind::For {
                var: Box::new(var),
                iterable: Box::new(iterable),
                body: Box::new(body),
            },
        )
    }

    fn parse_begin(&mut self, start: u32) -> Expr {
        let body = self.parse_stmts(self.start());
        let mut cases = Vec::new();
        while self.at_kw(Keyword::Rescue) {
            let case_start = self.start();
            self.bump();
            let mut exceptions = Vec::new();
            while matches!(self.peek(), TokenKind::Const(_))
                || self.at_op(Op::ColonColon)
            {
                exceptions.push(self.parse_postfix());
                if !self.eat_op(Op::Comma) {
                    break;
                }
            }
            let var = if self.eat_op(Op::FatArrow) {
                let var_start = self.start();
                self.parse_param_name(var_start)
            } else {
                Expr::empty(LocOffsets::new(self.last_end, self.last_end))
            };
            self.skip_separators();
            let case_body = self.parse_stmts(self.start());
            cases.push(Expr::new(
                self.span_from(case_start),
                ExprKind::RescueCase {
                    exceptions,
                    var: Box::new(var),
                    body: Box::new(case_body),
                },
            ));
        }
        let else_branch = if self.eat_kw(Keyword::Else) {
            self.parse_stmts(self.start())
        } else {
            Expr::empty(LocOffsets::new(self.last_end, self.last_end))
        };
        let ensure = if self.eat_kw(Keyword::Ensure) {
            self.parse_stmts(self.start())
        } else {
            Expr::empty(LocOffsets::new(self.last_end, self.last_end))
        };
        self.expect_kw(Keyword::End, "`end` closing `begin`");
        if cases.is_empty() && else_branch.is_empty_tree() && ensure.is_empty_tree() {
            return body;
        }
        Expr::new(
            self.span_from(start),
            ExprKind::Rescue {
                body: Box::new(body),
                cases,
                else_branch: Box::new(else_branch),
                ensure: Box::new(ensure),
            },
        )
    }

    fn parse_class(&mut self, start: u32, declared_kind: ClassDefKind) -> Expr {
        let name = self.parse_constant_path();
        let superclass = if declared_kind == ClassDefKind::Class && self.eat_op(Op::Lt) {
            self.parse_constant_path()
        } else {
            Expr::empty(LocOffsets::new(self.last_end, self.last_end))
        };
        self.skip_separators();
        let body = self.parse_stmts(self.start());
        self.expect_kw(Keyword::End, "`end` closing definition");
        Expr::new(
            self.span_from(start),
            ExprKind::ClassDef {
                declared_kind,
                name: Box::new(name),
                superclass: Box::new(superclass),
                body: Box::new(body),
            },
        )
    }

    fn parse_constant_path(&mut self) -> Expr {
        let start = self.start();
        let mut expr = match self.peek().clone() {
            TokenKind::Const(text) => {
                self.bump();
                let name = self.const_name(&text);
                Expr::new(
                    self.span_from(start),
                    ExprKind::UnresolvedConstant {
                        scope: Box::new(Expr::empty(LocOffsets::new(start, start))),
                        name,
                    },
                )
            }
            TokenKind::Op(Op::ColonColon) => {
                self.bump();
                match self.bump() {
                    TokenKind::Const(text) => {
                        let name = self.const_name(&text);
                        Expr::new(
                            self.span_from(start),
                            ExprKind::UnresolvedConstant {
                                scope: Box::new(Expr::new(
                                    LocOffsets::new(start, start),
                                    ExprKind::ConstantRoot,
                                )),
                                name,
                            },
                        )
                    }
                    _ => {
                        self.error_here("expected a constant after `::`");
                        return Expr::empty(self.span_from(start));
                    }
                }
            }
            other => {
                self.error_here(&format!("expected a constant, got {other:?}"));
                self.bump();
                return Expr::empty(self.span_from(start));
            }
        };
        while self.at_op(Op::ColonColon) {
            self.bump();
            match self.bump() {
                TokenKind::Const(text) => {
                    let name = self.const_name(&text);
                    expr = Expr::new(
                        self.span_from(start),
                        ExprKind::UnresolvedConstant {
                            scope: Box::new(expr),
                            name,
                        },
                    );
                }
                _ => {
                    self.error_here("expected a constant after `::`");
                    break;
                }
            }
        }
        expr
    }

    fn parse_def(&mut self, start: u32) -> Expr {
        let is_self_method = if self.at_kw(Keyword::SelfKw)
            && matches!(self.peek_at(1), TokenKind::Op(Op::Dot))
        {
            self.bump();
            self.bump();
            true
        } else {
            false
        };
        let name = match self.bump() {
            TokenKind::Ident(text) => self.name(&text),
            TokenKind::Op(Op::Plus) => self.name("+"),
            TokenKind::Op(Op::Minus) => self.name("-"),
            TokenKind::Op(Op::Star) => self.name("*"),
            TokenKind::Op(Op::Slash) => self.name("/"),
            TokenKind::Op(Op::Percent) => self.name("%"),
            TokenKind::Op(Op::EqEq) => self.name("=="),
            TokenKind::Op(Op::NotEq) => self.name("!="),
            TokenKind::Op(Op::Lt) => self.name("<"),
            TokenKind::Op(Op::LtEq) => self.name("<="),
            TokenKind::Op(Op::Gt) => self.name(">"),
            TokenKind::Op(Op::GtEq) => self.name(">="),
            TokenKind::Op(Op::Shl) => self.name("<<"),
            TokenKind::Op(Op::Bang) => self.name("!"),
            other => {
                self.error_here(&format!("expected a method name, got {other:?}"));
                self.name("<error>")
            }
        };
        let args = if self.eat_op(Op::LParen) {
            let params = self.parse_params(Op::RParen, /* allow_shadow */ false);
            self.expect_op(Op::RParen, "`)` closing parameters");
            params
        } else {
            vec![]
        };
        self.skip_separators();
        let body = self.parse_stmts(self.start());
        self.expect_kw(Keyword::End, "`end` closing `def`");
        Expr::new(
            self.span_from(start),
            ExprKind::MethodDef {
                name,
                args,
                body: Box::new(body),
                sig: Box::new(Expr::empty(LocOffsets::new(start, start))),
                flags: MethodDefFlags {
                    is_self_method,
                    is_rewriter_synthesized: false,
                },
            },
        )
    }
}

/// Whether an expression can appear as a multi-assignment target.
fn is_assign_target(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::UnresolvedIdent { .. } | ExprKind::UnresolvedConstant { .. }
    )
}
