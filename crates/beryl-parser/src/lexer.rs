//! The lexer.
//!
//! Newlines are significant (they separate statements), so they are emitted
//! as tokens rather than skipped. String literals are scanned whole; each
//! `#{…}` interpolation is captured as raw text plus its offset and lexed
//! recursively by the parser.

use ecow::EcoString;

/// One part of a string literal.
#[derive(Clone, Debug, PartialEq)]
pub enum StrPart {
    /// Literal text, escapes already applied.
    Lit(EcoString),
    /// The raw source of a `#{…}` interpolation, with the byte offset of
    /// its first character.
    Interp(EcoString, u32),
}

/// A token kind.
#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    /// A lowercase identifier (possibly with a trailing `?` or `!`).
    Ident(EcoString),
    /// An uppercase-initial constant name.
    Const(EcoString),
    /// An `@ivar` (the text includes the sigil).
    IVar(EcoString),
    /// A `$global` (the text includes the sigil).
    GVar(EcoString),
    /// An integer literal.
    Int(i64),
    /// A float literal.
    Float(f64),
    /// A string literal, possibly interpolated.
    Str(Vec<StrPart>),
    /// A `:symbol` literal.
    Symbol(EcoString),
    /// A keyword.
    Keyword(Keyword),
    /// An operator or punctuation token.
    Op(Op),
    /// A statement-separating newline.
    Newline,
    /// End of input.
    Eof,
}

/// Reserved words.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Keyword {
    Class,
    Module,
    Def,
    End,
    If,
    Elsif,
    Else,
    Unless,
    While,
    Until,
    For,
    In,
    Do,
    Then,
    Begin,
    Rescue,
    Ensure,
    Return,
    Break,
    Next,
    SelfKw,
    True,
    False,
    Nil,
    Super,
    Yield,
}

/// Operators and punctuation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Op {
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    ColonColon,
    Colon,
    Semi,
    FatArrow,
    Assign,
    OpAssign(BinOp),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Shl,
    Amp,
    Pipe,
    Bang,
}

/// Binary operators usable in `op=` compound assignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BinOp {
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Shl,
}

impl BinOp {
    /// The operator's method name.
    pub fn method_name(self) -> &'static str {
        match self {
            BinOp::Plus => "+",
            BinOp::Minus => "-",
            BinOp::Star => "*",
            BinOp::Slash => "/",
            BinOp::Percent => "%",
            BinOp::Shl => "<<",
        }
    }
}

/// A token with its byte range.
#[derive(Clone, Debug)]
pub struct Token {
    /// The kind.
    pub kind: TokenKind,
    /// Byte offset of the first character.
    pub begin: u32,
    /// Byte offset one past the last character.
    pub end: u32,
}

/// A lexer error, recovered by skipping the offending character.
#[derive(Clone, Debug)]
pub struct LexError {
    /// Where the error occurred.
    pub begin: u32,
    /// One past the error.
    pub end: u32,
    /// What went wrong.
    pub message: String,
}

/// Lexes `source` (a whole file or an interpolation fragment). `base`
/// offsets every token, so fragments report positions in the outer file.
pub fn lex(source: &str, base: u32) -> (Vec<Token>, Vec<LexError>) {
    let mut lexer = Lexer {
        src: source.as_bytes(),
        pos: 0,
        base,
        tokens: Vec::new(),
        errors: Vec::new(),
    };
    lexer.run();
    (lexer.tokens, lexer.errors)
}

struct Lexer<'s> {
    src: &'s [u8],
    pos: usize,
    base: u32,
    tokens: Vec<Token>,
    errors: Vec<LexError>,
}

impl Lexer<'_> {
    fn peek(&self) -> u8 {
        self.src.get(self.pos).copied().unwrap_or(0)
    }

    fn peek_at(&self, ahead: usize) -> u8 {
        self.src.get(self.pos + ahead).copied().unwrap_or(0)
    }

    fn bump(&mut self) -> u8 {
        let byte = self.peek();
        self.pos += 1;
        byte
    }

    fn push(&mut self, begin: usize, kind: TokenKind) {
        self.tokens.push(Token {
            kind,
            begin: self.base + begin as u32,
            end: self.base + self.pos as u32,
        });
    }

    fn run(&mut self) {
        while self.pos < self.src.len() {
            let begin = self.pos;
            let byte = self.bump();
            match byte {
                b' ' | b'\t' | b'\r' => {}
                b'\n' => self.push(begin, TokenKind::Newline),
                b'#' => {
                    while self.pos < self.src.len() && self.peek() != b'\n' {
                        self.pos += 1;
                    }
                }
                b'(' => self.push(begin, TokenKind::Op(Op::LParen)),
                b')' => self.push(begin, TokenKind::Op(Op::RParen)),
                b'[' => self.push(begin, TokenKind::Op(Op::LBracket)),
                b']' => self.push(begin, TokenKind::Op(Op::RBracket)),
                b'{' => self.push(begin, TokenKind::Op(Op::LBrace)),
                b'}' => self.push(begin, TokenKind::Op(Op::RBrace)),
                b',' => self.push(begin, TokenKind::Op(Op::Comma)),
                b'.' => self.push(begin, TokenKind::Op(Op::Dot)),
                b';' => self.push(begin, TokenKind::Op(Op::Semi)),
                b'+' if self.peek() == b'=' => {
                    self.pos += 1;
                    self.push(begin, TokenKind::Op(Op::OpAssign(BinOp::Plus)));
                }
                b'+' => self.push(begin, TokenKind::Op(Op::Plus)),
                b'-' if self.peek() == b'=' => {
                    self.pos += 1;
                    self.push(begin, TokenKind::Op(Op::OpAssign(BinOp::Minus)));
                }
                b'-' => self.push(begin, TokenKind::Op(Op::Minus)),
                b'*' if self.peek() == b'=' => {
                    self.pos += 1;
                    self.push(begin, TokenKind::Op(Op::OpAssign(BinOp::Star)));
                }
                b'*' => self.push(begin, TokenKind::Op(Op::Star)),
                b'/' if self.peek() == b'=' => {
                    self.pos += 1;
                    self.push(begin, TokenKind::Op(Op::OpAssign(BinOp::Slash)));
                }
                b'/' => self.push(begin, TokenKind::Op(Op::Slash)),
                b'%' if self.peek() == b'=' => {
                    self.pos += 1;
                    self.push(begin, TokenKind::Op(Op::OpAssign(BinOp::Percent)));
                }
                b'%' => self.push(begin, TokenKind::Op(Op::Percent)),
                b'=' => match self.peek() {
                    b'=' => {
                        self.pos += 1;
                        self.push(begin, TokenKind::Op(Op::EqEq));
                    }
                    b'>' => {
                        self.pos += 1;
                        self.push(begin, TokenKind::Op(Op::FatArrow));
                    }
                    _ => self.push(begin, TokenKind::Op(Op::Assign)),
                },
                b'!' if self.peek() == b'=' => {
                    self.pos += 1;
                    self.push(begin, TokenKind::Op(Op::NotEq));
                }
                b'!' => self.push(begin, TokenKind::Op(Op::Bang)),
                b'<' => match self.peek() {
                    b'=' => {
                        self.pos += 1;
                        self.push(begin, TokenKind::Op(Op::LtEq));
                    }
                    b'<' => {
                        self.pos += 1;
                        if self.peek() == b'=' {
                            self.pos += 1;
                            self.push(begin, TokenKind::Op(Op::OpAssign(BinOp::Shl)));
                        } else {
                            self.push(begin, TokenKind::Op(Op::Shl));
                        }
                    }
                    _ => self.push(begin, TokenKind::Op(Op::Lt)),
                },
                b'>' if self.peek() == b'=' => {
                    self.pos += 1;
                    self.push(begin, TokenKind::Op(Op::GtEq));
                }
                b'>' => self.push(begin, TokenKind::Op(Op::Gt)),
                b'&' => self.push(begin, TokenKind::Op(Op::Amp)),
                b'|' => self.push(begin, TokenKind::Op(Op::Pipe)),
                b':' => match self.peek() {
                    b':' => {
                        self.pos += 1;
                        self.push(begin, TokenKind::Op(Op::ColonColon));
                    }
                    b if b.is_ascii_alphabetic() || b == b'_' => {
                        let name = self.ident_text();
                        self.push(begin, TokenKind::Symbol(name));
                    }
                    _ => self.push(begin, TokenKind::Op(Op::Colon)),
                },
                b'"' => self.string(begin),
                b'@' => {
                    if self.peek().is_ascii_alphabetic() || self.peek() == b'_' {
                        let name = self.ident_text();
                        let mut text = EcoString::from("@");
                        text.push_str(&name);
                        self.push(begin, TokenKind::IVar(text));
                    } else {
                        self.error(begin, "unexpected `@`");
                    }
                }
                b'$' => {
                    if self.peek().is_ascii_alphabetic() || self.peek() == b'_' {
                        let name = self.ident_text();
                        let mut text = EcoString::from("$");
                        text.push_str(&name);
                        self.push(begin, TokenKind::GVar(text));
                    } else {
                        self.error(begin, "unexpected `$`");
                    }
                }
                b if b.is_ascii_digit() => self.number(begin),
                b if b.is_ascii_lowercase() || b == b'_' => {
                    self.pos -= 1;
                    let text = self.ident_text();
                    let kind = match keyword(&text) {
                        Some(kw) => TokenKind::Keyword(kw),
                        None => TokenKind::Ident(text),
                    };
                    self.push(begin, kind);
                }
                b if b.is_ascii_uppercase() => {
                    self.pos -= 1;
                    let text = self.ident_text();
                    self.push(begin, TokenKind::Const(text));
                }
                other => {
                    self.error(begin, &format!("unexpected character `{}`", other as char));
                }
            }
        }
        self.tokens.push(Token {
            kind: TokenKind::Eof,
            begin: self.base + self.pos as u32,
            end: self.base + self.pos as u32,
        });
    }

    fn error(&mut self, begin: usize, message: &str) {
        self.errors.push(LexError {
            begin: self.base + begin as u32,
            end: self.base + self.pos as u32,
            message: message.to_string(),
        });
    }

    /// Scans an identifier continuing at `self.pos`, including a trailing
    /// `?` or `!`.
    fn ident_text(&mut self) -> EcoString {
        let start = self.pos;
        while self.peek().is_ascii_alphanumeric() || self.peek() == b'_' {
            self.pos += 1;
        }
        if self.peek() == b'?' || (self.peek() == b'!' && self.peek_at(1) != b'=') {
            self.pos += 1;
        }
        EcoString::from(std::str::from_utf8(&self.src[start..self.pos]).unwrap_or(""))
    }

    fn number(&mut self, begin: usize) {
        while self.peek().is_ascii_digit() || self.peek() == b'_' {
            self.pos += 1;
        }
        let mut is_float = false;
        if self.peek() == b'.' && self.peek_at(1).is_ascii_digit() {
            is_float = true;
            self.pos += 1;
            while self.peek().is_ascii_digit() || self.peek() == b'_' {
                self.pos += 1;
            }
        }
        if self.peek() == b'e' || self.peek() == b'E' {
            let mut ahead = 1;
            if self.peek_at(ahead) == b'+' || self.peek_at(ahead) == b'-' {
                ahead += 1;
            }
            if self.peek_at(ahead).is_ascii_digit() {
                is_float = true;
                self.pos += ahead;
                while self.peek().is_ascii_digit() {
                    self.pos += 1;
                }
            }
        }
        let text: String = std::str::from_utf8(&self.src[begin..self.pos])
            .unwrap_or("")
            .chars()
            .filter(|c| *c != '_')
            .collect();
        if is_float {
            match text.parse::<f64>() {
                Ok(value) => self.push(begin, TokenKind::Float(value)),
                Err(_) => self.error(begin, "malformed float literal"),
            }
        } else {
            match text.parse::<i64>() {
                Ok(value) => self.push(begin, TokenKind::Int(value)),
                Err(_) => self.error(begin, "integer literal out of range"),
            }
        }
    }

    fn string(&mut self, begin: usize) {
        let mut parts = Vec::new();
        let mut current = EcoString::new();
        loop {
            if self.pos >= self.src.len() {
                self.error(begin, "unterminated string literal");
                break;
            }
            match self.bump() {
                b'"' => break,
                b'\\' => match self.bump() {
                    b'n' => current.push('\n'),
                    b't' => current.push('\t'),
                    b'0' => current.push('\0'),
                    b'\\' => current.push('\\'),
                    b'"' => current.push('"'),
                    b'#' => current.push('#'),
                    other => {
                        current.push('\\');
                        current.push(other as char);
                    }
                },
                b'#' if self.peek() == b'{' => {
                    self.pos += 1;
                    if !current.is_empty() {
                        parts.push(StrPart::Lit(std::mem::take(&mut current)));
                    }
                    let interp_begin = self.pos;
                    let mut depth = 1usize;
                    while self.pos < self.src.len() && depth > 0 {
                        match self.bump() {
                            b'{' => depth += 1,
                            b'}' => depth -= 1,
                            _ => {}
                        }
                    }
                    if depth > 0 {
                        self.error(begin, "unterminated string interpolation");
                        break;
                    }
                    let text = std::str::from_utf8(&self.src[interp_begin..self.pos - 1])
                        .unwrap_or("");
                    parts.push(StrPart::Interp(
                        EcoString::from(text),
                        self.base + interp_begin as u32,
                    ));
                }
                other if other >= 0x80 => {
                    // Multibyte UTF-8 character: copy it whole.
                    let start = self.pos - 1;
                    let len = match other {
                        b if b >= 0xf0 => 4,
                        b if b >= 0xe0 => 3,
                        _ => 2,
                    };
                    self.pos = (start + len).min(self.src.len());
                    if let Ok(text) = std::str::from_utf8(&self.src[start..self.pos]) {
                        current.push_str(text);
                    }
                }
                other => current.push(other as char),
            }
        }
        if !current.is_empty() || parts.is_empty() {
            parts.push(StrPart::Lit(current));
        }
        self.push(begin, TokenKind::Str(parts));
    }
}

fn keyword(text: &str) -> Option<Keyword> {
    Some(match text {
        "class" => Keyword::Class,
        "module" => Keyword::Module,
        "def" => Keyword::Def,
        "end" => Keyword::End,
        "if" => Keyword::If,
        "elsif" => Keyword::Elsif,
        "else" => Keyword::Else,
        "unless" => Keyword::Unless,
        "while" => Keyword::While,
        "until" => Keyword::Until,
        "for" => Keyword::For,
        "in" => Keyword::In,
        "do" => Keyword::Do,
        "then" => Keyword::Then,
        "begin" => Keyword::Begin,
        "rescue" => Keyword::Rescue,
        "ensure" => Keyword::Ensure,
        "return" => Keyword::Return,
        "break" => Keyword::Break,
        "next" => Keyword::Next,
        "self" => Keyword::SelfKw,
        "true" => Keyword::True,
        "false" => Keyword::False,
        "nil" => Keyword::Nil,
        "super" => Keyword::Super,
        "yield" => Keyword::Yield,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source, 0).0.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_idents_keywords_and_operators() {
        let toks = kinds("def foo?(x); x + 1; end");
        assert_eq!(toks[0], TokenKind::Keyword(Keyword::Def));
        assert_eq!(toks[1], TokenKind::Ident("foo?".into()));
        assert!(toks.contains(&TokenKind::Op(Op::Plus)));
        assert_eq!(toks.last(), Some(&TokenKind::Eof));
    }

    #[test]
    fn lexes_numbers() {
        assert_eq!(kinds("42")[0], TokenKind::Int(42));
        assert_eq!(kinds("1_000")[0], TokenKind::Int(1000));
        assert_eq!(kinds("1.5")[0], TokenKind::Float(1.5));
        assert_eq!(kinds("1e3")[0], TokenKind::Float(1000.0));
        // A trailing dot is a method call, not a float.
        let toks = kinds("1.abs");
        assert_eq!(toks[0], TokenKind::Int(1));
        assert_eq!(toks[1], TokenKind::Op(Op::Dot));
    }

    #[test]
    fn lexes_interpolated_strings() {
        let toks = kinds("\"a#{b}c\"");
        let TokenKind::Str(parts) = &toks[0] else {
            panic!("expected string, got {toks:?}");
        };
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], StrPart::Lit("a".into()));
        assert_eq!(parts[1], StrPart::Interp("b".into(), 4));
        assert_eq!(parts[2], StrPart::Lit("c".into()));
    }

    #[test]
    fn escapes_apply_in_strings() {
        let toks = kinds(r#""a\n\#{x}""#);
        let TokenKind::Str(parts) = &toks[0] else {
            panic!("expected string");
        };
        assert_eq!(parts, &[StrPart::Lit("a\n#{x}".into())]);
    }

    #[test]
    fn comments_run_to_end_of_line() {
        let toks = kinds("a # trailing\nb");
        assert_eq!(toks[0], TokenKind::Ident("a".into()));
        assert_eq!(toks[1], TokenKind::Newline);
        assert_eq!(toks[2], TokenKind::Ident("b".into()));
    }
}
