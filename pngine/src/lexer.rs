//! The lexer.
//!
//! A single forward pass over the UTF-8 source bytes with no lookahead
//! beyond the current byte. The classifier dispatches on the first byte of
//! each token: whitespace and `//` comments are skipped, `"` opens a
//! string (escapes allowed, may span lines), digits open a number
//! (optional `0x` prefix and decimal point), `#` opens a macro keyword,
//! and identifier-start bytes open an identifier or reserved word.

use crate::token::{MacroKind, Span, Token, TokenKind};
use thiserror::Error;

/// A byte the lexer could not turn into a token.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum LexError {
    #[error("error[E101]: string starting at byte {0} is never terminated")]
    UnterminatedString(usize),
    #[error("error[E102]: malformed number at byte {0}")]
    InvalidNumber(usize),
    #[error("error[E103]: unexpected character at byte {0}")]
    UnknownChar(usize),
}

impl LexError {
    /// The byte offset the error points at.
    pub fn offset(&self) -> usize {
        match *self {
            LexError::UnterminatedString(at)
            | LexError::InvalidNumber(at)
            | LexError::UnknownChar(at) => at,
        }
    }
}

/// Lexes one source file. Finite and not restartable: after the first
/// `Eof` every further `next` returns `Eof` again.
pub struct Lexer<'s> {
    src: &'s str,
    bytes: &'s [u8],
    pos: usize,
}

impl<'s> Lexer<'s> {
    pub fn new(src: &'s str) -> Lexer<'s> {
        Lexer {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    /// The next token, or `Eof` once the input is exhausted.
    pub fn next(&mut self) -> Result<Token, LexError> {
        self.skip_trivia();
        let start = self.pos;
        let byte = match self.bytes.get(self.pos) {
            None => {
                return Ok(Token {
                    kind: TokenKind::Eof,
                    span: Span::new(start, start),
                })
            }
            Some(&b) => b,
        };
        match byte {
            b'{' => Ok(self.punct(TokenKind::LBrace)),
            b'}' => Ok(self.punct(TokenKind::RBrace)),
            b'[' => Ok(self.punct(TokenKind::LBracket)),
            b']' => Ok(self.punct(TokenKind::RBracket)),
            b'=' => Ok(self.punct(TokenKind::Equals)),
            b'.' => Ok(self.punct(TokenKind::Dot)),
            b'"' => self.string(start),
            b'#' => self.macro_keyword(start),
            b'-' => {
                if self.bytes.get(self.pos + 1).map_or(false, u8::is_ascii_digit) {
                    self.number(start)
                } else {
                    Err(LexError::UnknownChar(start))
                }
            }
            b if b.is_ascii_digit() => self.number(start),
            b if is_ident_start(b) => Ok(self.ident(start)),
            _ => Err(LexError::UnknownChar(start)),
        }
    }

    /// Drain the lexer into a token vector ending with `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.bytes.get(self.pos) {
                Some(b) if b.is_ascii_whitespace() => self.pos += 1,
                Some(b'/') if self.bytes.get(self.pos + 1) == Some(&b'/') => {
                    while let Some(&b) = self.bytes.get(self.pos) {
                        self.pos += 1;
                        if b == b'\n' {
                            break;
                        }
                    }
                }
                _ => return,
            }
        }
    }

    fn punct(&mut self, kind: TokenKind) -> Token {
        let start = self.pos;
        self.pos += 1;
        Token {
            kind,
            span: Span::new(start, self.pos),
        }
    }

    fn string(&mut self, start: usize) -> Result<Token, LexError> {
        self.pos += 1;
        loop {
            match self.bytes.get(self.pos) {
                None => return Err(LexError::UnterminatedString(start)),
                Some(b'\\') => {
                    // An escape consumes the next byte whatever it is; a
                    // trailing backslash leaves the string open.
                    if self.pos + 1 >= self.bytes.len() {
                        return Err(LexError::UnterminatedString(start));
                    }
                    self.pos += 2;
                }
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(Token {
                        kind: TokenKind::Str,
                        span: Span::new(start, self.pos),
                    });
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn number(&mut self, start: usize) -> Result<Token, LexError> {
        if self.bytes[self.pos] == b'-' {
            self.pos += 1;
        }
        let digits_start = self.pos;
        if self.bytes.get(self.pos) == Some(&b'0')
            && matches!(self.bytes.get(self.pos + 1), Some(b'x') | Some(b'X'))
        {
            self.pos += 2;
            let hex_start = self.pos;
            while self.bytes.get(self.pos).map_or(false, u8::is_ascii_hexdigit) {
                self.pos += 1;
            }
            if self.pos == hex_start || self.next_is_ident_byte() {
                return Err(LexError::InvalidNumber(start));
            }
            return Ok(Token {
                kind: TokenKind::Hex,
                span: Span::new(start, self.pos),
            });
        }
        while self.bytes.get(self.pos).map_or(false, u8::is_ascii_digit) {
            self.pos += 1;
        }
        if self.pos == digits_start {
            return Err(LexError::InvalidNumber(start));
        }
        let mut kind = TokenKind::Int;
        // A decimal point makes it a float, but only when digits follow;
        // `1.x` is an integer and a dotted reference.
        if self.bytes.get(self.pos) == Some(&b'.')
            && self.bytes.get(self.pos + 1).map_or(false, u8::is_ascii_digit)
        {
            self.pos += 1;
            while self.bytes.get(self.pos).map_or(false, u8::is_ascii_digit) {
                self.pos += 1;
            }
            kind = TokenKind::Float;
        }
        if self.next_is_ident_byte() {
            return Err(LexError::InvalidNumber(start));
        }
        Ok(Token {
            kind,
            span: Span::new(start, self.pos),
        })
    }

    fn next_is_ident_byte(&self) -> bool {
        self.bytes
            .get(self.pos)
            .map_or(false, |&b| is_ident_start(b))
    }

    fn macro_keyword(&mut self, start: usize) -> Result<Token, LexError> {
        self.pos += 1;
        let word_start = self.pos;
        if !self.next_is_ident_byte() {
            return Err(LexError::UnknownChar(start));
        }
        while self
            .bytes
            .get(self.pos)
            .map_or(false, |&b| is_ident_continue(b))
        {
            self.pos += 1;
        }
        let word = &self.src[word_start..self.pos];
        match MacroKind::from_keyword(word) {
            Some(kind) => Ok(Token {
                kind: TokenKind::Macro(kind),
                span: Span::new(start, self.pos),
            }),
            // A `#` opening something outside the keyword set is as
            // unexpected as any stray byte.
            None => Err(LexError::UnknownChar(start)),
        }
    }

    fn ident(&mut self, start: usize) -> Token {
        while self
            .bytes
            .get(self.pos)
            .map_or(false, |&b| is_ident_continue(b))
        {
            self.pos += 1;
        }
        let word = &self.src[start..self.pos];
        let kind = match word {
            "true" | "false" => TokenKind::Bool,
            _ => TokenKind::Ident,
        };
        Token {
            kind,
            span: Span::new(start, self.pos),
        }
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// The characters of a string token with its quotes stripped and escapes
/// collapsed.
pub fn string_value(src: &str, span: Span) -> String {
    let inner = &src[span.start + 1..span.end - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn classifies_a_small_declaration() {
        let src = "#buffer b { size=48 usage=[UNIFORM] }";
        assert_eq!(
            kinds(src),
            vec![
                TokenKind::Macro(MacroKind::Buffer),
                TokenKind::Ident,
                TokenKind::LBrace,
                TokenKind::Ident,
                TokenKind::Equals,
                TokenKind::Int,
                TokenKind::Ident,
                TokenKind::Equals,
                TokenKind::LBracket,
                TokenKind::Ident,
                TokenKind::RBracket,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn numbers_come_in_three_shapes() {
        assert_eq!(
            kinds("3 -7 0x10 1.25 -0.5"),
            vec![
                TokenKind::Int,
                TokenKind::Int,
                TokenKind::Hex,
                TokenKind::Float,
                TokenKind::Float,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn dotted_references_stay_three_tokens() {
        assert_eq!(
            kinds("canvas.width"),
            vec![TokenKind::Ident, TokenKind::Dot, TokenKind::Ident, TokenKind::Eof]
        );
    }

    #[test]
    fn comments_and_whitespace_vanish() {
        assert_eq!(
            kinds("// a comment\ntrue // another\n"),
            vec![TokenKind::Bool, TokenKind::Eof]
        );
    }

    #[test]
    fn strings_may_span_lines_and_escape_quotes() {
        let src = "\"line one\nline \\\"two\\\"\"";
        let tokens = Lexer::new(src).tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(tokens[0].span, Span::new(0, src.len()));
        assert_eq!(string_value(src, tokens[0].span), "line one\nline \"two\"");
    }

    #[test]
    fn unterminated_string_reports_its_start() {
        let mut lexer = Lexer::new("  \"oops");
        assert_eq!(lexer.next(), Err(LexError::UnterminatedString(2)));
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        assert_eq!(Lexer::new("0x").next(), Err(LexError::InvalidNumber(0)));
        assert_eq!(Lexer::new("12abc").next(), Err(LexError::InvalidNumber(0)));
    }

    #[test]
    fn stray_bytes_are_rejected() {
        assert_eq!(Lexer::new("%").next(), Err(LexError::UnknownChar(0)));
        assert_eq!(Lexer::new("#nope x").next(), Err(LexError::UnknownChar(0)));
    }

    #[test]
    fn spans_tile_the_interesting_bytes_in_order() {
        let src = "#frame main { perform=[r] }";
        let tokens = Lexer::new(src).tokenize().unwrap();
        let mut last_end = 0;
        for token in &tokens {
            assert!(token.span.start >= last_end, "tokens must not overlap");
            assert!(token.span.end <= src.len());
            assert_eq!(token.span.text(src), &src[token.span.start..token.span.end]);
            last_end = token.span.end;
        }
    }
}
