//! The parser.
//!
//! Builds the flat [`Ast`] from the token stream. Nesting is handled with
//! an explicit frame stack capped at [`MAX_PARSE_DEPTH`] — there is no
//! call-stack recursion, so pathological input cannot overflow the host
//! stack. Errors inside an object body recover to the next property so a
//! compile can report more than one mistake; everything else fails fast.

use crate::ast::{Ast, NodeId, NodeTag};
use crate::token::{MacroKind, Span, Token, TokenKind};
use thiserror::Error;

/// Deepest allowed nesting of objects, arrays and property values.
pub const MAX_PARSE_DEPTH: usize = 64;

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ParseErrorKind {
    #[error("error[E201]: expected {expected}, found {found}")]
    UnexpectedToken {
        expected: &'static str,
        found: &'static str,
    },
    #[error("error[E202]: nesting deeper than {MAX_PARSE_DEPTH} levels")]
    NestingTooDeep,
    #[error("error[E203]: macro body is never closed")]
    UnterminatedMacro,
    #[error("error[E204]: malformed array item")]
    MalformedArray,
    #[error("error[E205]: malformed property")]
    MalformedObject,
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("{kind}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Span,
}

enum Frame {
    Object { open: Span, entries: Vec<NodeId> },
    Array { open: Span, items: Vec<NodeId> },
    Property { key: NodeId },
}

/// Parse one file's tokens into a tree.
///
/// On failure every collected error is returned; the recovered ones come
/// first, the one that stopped the parse last.
pub fn parse(tokens: &[Token]) -> Result<Ast, Vec<ParseError>> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        ast: Ast::default(),
        errors: Vec::new(),
    };
    match parser.run() {
        Ok(()) if parser.errors.is_empty() => Ok(parser.ast),
        Ok(()) => Err(parser.errors),
        Err(fatal) => {
            parser.errors.push(fatal);
            Err(parser.errors)
        }
    }
}

struct Parser<'s> {
    tokens: &'s [Token],
    pos: usize,
    ast: Ast,
    errors: Vec<ParseError>,
}

impl<'s> Parser<'s> {
    fn run(&mut self) -> Result<(), ParseError> {
        loop {
            let token = self.peek();
            match token.kind {
                TokenKind::Eof => return Ok(()),
                TokenKind::Macro(kind) => {
                    self.bump();
                    self.declaration(kind, token.span)?;
                }
                other => {
                    return Err(self.unexpected("a macro declaration", other, token.span));
                }
            }
        }
    }

    fn declaration(&mut self, kind: MacroKind, start: Span) -> Result<(), ParseError> {
        match kind {
            MacroKind::Define => {
                let name = self.expect_ident("a constant name")?;
                self.expect(TokenKind::Equals, "'='")?;
                let value = self.value()?;
                let span = start.to(self.ast.node(value).span);
                let decl = self.ast.push(NodeTag::MacroDecl(kind), span, &[name, value]);
                self.ast.push_root(decl);
            }
            MacroKind::Import => {
                let token = self.peek();
                if token.kind != TokenKind::Str {
                    return Err(self.unexpected("an import path string", token.kind, token.span));
                }
                self.bump();
                let path = self.ast.push(NodeTag::LitStr, token.span, &[]);
                let decl = self
                    .ast
                    .push(NodeTag::MacroDecl(kind), start.to(token.span), &[path]);
                self.ast.push_root(decl);
            }
            _ => {
                let name = match self.peek().kind {
                    TokenKind::Ident => Some(self.expect_ident("a name")?),
                    _ => None,
                };
                let open = self.peek();
                if open.kind != TokenKind::LBrace {
                    return Err(self.unexpected("'{'", open.kind, open.span));
                }
                let body = self.value()?;
                let span = start.to(self.ast.node(body).span);
                let decl = match name {
                    Some(name) => self.ast.push(NodeTag::MacroDecl(kind), span, &[name, body]),
                    None => self.ast.push(NodeTag::MacroDecl(kind), span, &[body]),
                };
                self.ast.push_root(decl);
            }
        }
        Ok(())
    }

    /// Parse one value — possibly an arbitrarily nested object/array —
    /// with the explicit frame stack.
    fn value(&mut self) -> Result<NodeId, ParseError> {
        let mut stack: Vec<Frame> = Vec::new();
        loop {
            // Object frames expect `key=value` or `}`; everything else
            // expects a value to start (or an array to close).
            if let Some(Frame::Object { .. }) = stack.last() {
                let token = self.peek();
                match token.kind {
                    TokenKind::RBrace => {
                        self.bump();
                        let (open, entries) = match stack.pop() {
                            Some(Frame::Object { open, entries }) => (open, entries),
                            _ => unreachable!("matched an object frame above"),
                        };
                        let node =
                            self.ast
                                .push(NodeTag::Object, open.to(token.span), &entries);
                        match self.complete(&mut stack, node)? {
                            Some(done) => return Ok(done),
                            None => continue,
                        }
                    }
                    TokenKind::Ident if self.peek_at(1).kind == TokenKind::Equals => {
                        let key = self.ast.push(NodeTag::Ident, token.span, &[]);
                        self.bump();
                        self.bump();
                        self.push_frame(&mut stack, Frame::Property { key }, token.span)?;
                        continue;
                    }
                    TokenKind::Eof | TokenKind::Macro(_) => {
                        return Err(ParseError {
                            kind: ParseErrorKind::UnterminatedMacro,
                            span: token.span,
                        });
                    }
                    // A braced body holding a single expression instead of
                    // properties: `#wgsl s { "…" }`.
                    TokenKind::Int
                    | TokenKind::Hex
                    | TokenKind::Float
                    | TokenKind::Str
                    | TokenKind::Bool
                    | TokenKind::Ident
                        if stack.len() == 1 && self.object_is_empty_so_far(&stack) =>
                    {
                        let value = self
                            .start_value(&mut stack)?
                            .expect("leaf tokens always finish in one step");
                        let close = self.peek();
                        if close.kind != TokenKind::RBrace {
                            return Err(self.unexpected("'}'", close.kind, close.span));
                        }
                        self.bump();
                        stack.pop();
                        return Ok(value);
                    }
                    _ => {
                        // Recover to the next property or the closing
                        // brace so later mistakes still get reported.
                        self.errors.push(ParseError {
                            kind: ParseErrorKind::MalformedObject,
                            span: token.span,
                        });
                        self.skip_to_property_boundary();
                        continue;
                    }
                }
            }

            if let Some(Frame::Array { .. }) = stack.last() {
                let token = self.peek();
                if token.kind == TokenKind::RBracket {
                    self.bump();
                    let (open, items) = match stack.pop() {
                        Some(Frame::Array { open, items }) => (open, items),
                        _ => unreachable!("matched an array frame above"),
                    };
                    let node = self.ast.push(NodeTag::Array, open.to(token.span), &items);
                    match self.complete(&mut stack, node)? {
                        Some(done) => return Ok(done),
                        None => continue,
                    }
                }
            }

            match self.start_value(&mut stack)? {
                Some(value) => match self.complete(&mut stack, value)? {
                    Some(done) => return Ok(done),
                    None => continue,
                },
                None => continue,
            }
        }
    }

    /// Begin one value. Returns the finished node for leaves, or `None`
    /// after pushing a frame for `{`/`[`.
    fn start_value(&mut self, stack: &mut Vec<Frame>) -> Result<Option<NodeId>, ParseError> {
        let token = self.peek();
        let leaf = match token.kind {
            TokenKind::Int => NodeTag::LitInt,
            TokenKind::Hex => NodeTag::LitHex,
            TokenKind::Float => NodeTag::LitFloat,
            TokenKind::Str => NodeTag::LitStr,
            TokenKind::Bool => NodeTag::LitBool,
            TokenKind::Ident => {
                self.bump();
                return Ok(Some(self.ident_or_dotted(token.span)?));
            }
            TokenKind::LBrace => {
                self.bump();
                self.push_frame(
                    stack,
                    Frame::Object {
                        open: token.span,
                        entries: Vec::new(),
                    },
                    token.span,
                )?;
                return Ok(None);
            }
            TokenKind::LBracket => {
                self.bump();
                self.push_frame(
                    stack,
                    Frame::Array {
                        open: token.span,
                        items: Vec::new(),
                    },
                    token.span,
                )?;
                return Ok(None);
            }
            other => {
                let kind = if matches!(stack.last(), Some(Frame::Array { .. })) {
                    ParseErrorKind::MalformedArray
                } else {
                    return Err(self.unexpected("a value", other, token.span));
                };
                return Err(ParseError {
                    kind,
                    span: token.span,
                });
            }
        };
        self.bump();
        Ok(Some(self.ast.push(leaf, token.span, &[])))
    }

    /// `a` or `a.b.c`.
    fn ident_or_dotted(&mut self, first: Span) -> Result<NodeId, ParseError> {
        if self.peek().kind != TokenKind::Dot {
            return Ok(self.ast.push(NodeTag::Ident, first, &[]));
        }
        let mut segments = vec![self.ast.push(NodeTag::Ident, first, &[])];
        let mut span = first;
        while self.peek().kind == TokenKind::Dot {
            self.bump();
            let seg = self.peek();
            if seg.kind != TokenKind::Ident {
                return Err(self.unexpected("an identifier after '.'", seg.kind, seg.span));
            }
            self.bump();
            segments.push(self.ast.push(NodeTag::Ident, seg.span, &[]));
            span = span.to(seg.span);
        }
        Ok(self.ast.push(NodeTag::DottedRef, span, &segments))
    }

    /// Feed a finished value upward through property frames. Returns the
    /// final node once the stack is empty.
    fn complete(
        &mut self,
        stack: &mut Vec<Frame>,
        mut value: NodeId,
    ) -> Result<Option<NodeId>, ParseError> {
        loop {
            match stack.last_mut() {
                None => return Ok(Some(value)),
                Some(Frame::Property { .. }) => {
                    let key = match stack.pop() {
                        Some(Frame::Property { key }) => key,
                        _ => unreachable!("matched a property frame above"),
                    };
                    let span = self.ast.node(key).span.to(self.ast.node(value).span);
                    let property = self.ast.push(NodeTag::Property, span, &[key, value]);
                    match stack.last_mut() {
                        Some(Frame::Object { entries, .. }) => {
                            entries.push(property);
                            return Ok(None);
                        }
                        _ => {
                            value = property;
                            continue;
                        }
                    }
                }
                Some(Frame::Array { items, .. }) => {
                    items.push(value);
                    return Ok(None);
                }
                Some(Frame::Object { .. }) => {
                    // Objects only receive finished property nodes, which
                    // the property arm above already attached.
                    return Ok(None);
                }
            }
        }
    }

    fn object_is_empty_so_far(&self, stack: &[Frame]) -> bool {
        match stack.last() {
            Some(Frame::Object { entries, .. }) => entries.is_empty(),
            _ => false,
        }
    }

    fn skip_to_property_boundary(&mut self) {
        loop {
            let token = self.peek();
            match token.kind {
                TokenKind::RBrace | TokenKind::Eof | TokenKind::Macro(_) => return,
                TokenKind::Ident if self.peek_at(1).kind == TokenKind::Equals => return,
                _ => self.bump(),
            }
        }
    }

    fn push_frame(
        &mut self,
        stack: &mut Vec<Frame>,
        frame: Frame,
        span: Span,
    ) -> Result<(), ParseError> {
        if stack.len() >= MAX_PARSE_DEPTH {
            return Err(ParseError {
                kind: ParseErrorKind::NestingTooDeep,
                span,
            });
        }
        stack.push(frame);
        Ok(())
    }

    fn peek(&self) -> Token {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> Token {
        let last = self.tokens.len() - 1;
        self.tokens[(self.pos + ahead).min(last)]
    }

    fn bump(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> Result<Token, ParseError> {
        let token = self.peek();
        if token.kind != kind {
            return Err(self.unexpected(expected, token.kind, token.span));
        }
        self.bump();
        Ok(token)
    }

    fn expect_ident(&mut self, expected: &'static str) -> Result<NodeId, ParseError> {
        let token = self.expect(TokenKind::Ident, expected)?;
        Ok(self.ast.push(NodeTag::Ident, token.span, &[]))
    }

    fn unexpected(
        &self,
        expected: &'static str,
        found: TokenKind,
        span: Span,
    ) -> ParseError {
        ParseError {
            kind: ParseErrorKind::UnexpectedToken {
                expected,
                found: found.describe(),
            },
            span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse_str(src: &str) -> Result<Ast, Vec<ParseError>> {
        let tokens = Lexer::new(src).tokenize().expect("lexes");
        parse(&tokens)
    }

    fn first_decl(ast: &Ast) -> (&crate::ast::Node, &[NodeId]) {
        let root = ast.roots()[0];
        (ast.node(root), ast.children(root))
    }

    #[test]
    fn parses_a_named_declaration_with_properties() {
        let src = "#buffer b { size=48 usage=[UNIFORM STORAGE] }";
        let ast = parse_str(src).unwrap();
        let (decl, children) = first_decl(&ast);
        assert_eq!(decl.tag, NodeTag::MacroDecl(MacroKind::Buffer));
        assert_eq!(children.len(), 2);
        assert_eq!(ast.node(children[0]).tag, NodeTag::Ident);
        assert_eq!(ast.node(children[0]).span.text(src), "b");
        let body = ast.node(children[1]);
        assert_eq!(body.tag, NodeTag::Object);
        assert_eq!(ast.children(children[1]).len(), 2);
    }

    #[test]
    fn parses_define_and_import() {
        let src = "#define N=3\n#import \"other.pngn\"";
        let ast = parse_str(src).unwrap();
        assert_eq!(ast.roots().len(), 2);
        let define = ast.node(ast.roots()[0]);
        assert_eq!(define.tag, NodeTag::MacroDecl(MacroKind::Define));
        let import = ast.node(ast.roots()[1]);
        assert_eq!(import.tag, NodeTag::MacroDecl(MacroKind::Import));
    }

    #[test]
    fn parses_nested_objects_and_arrays() {
        let src = "#renderPass r { colorAttachments=[{ view=contextCurrentTexture \
                   clearValue=[0 0 0 1] loadOp=clear }] draw=3 }";
        let ast = parse_str(src).unwrap();
        let (_, children) = first_decl(&ast);
        let body = ast.children(children[1]);
        assert_eq!(body.len(), 2);
        let attachments_prop = ast.children(body[0]);
        let attachments = ast.node(attachments_prop[1]);
        assert_eq!(attachments.tag, NodeTag::Array);
    }

    #[test]
    fn parses_dotted_references() {
        let src = "#buffer b { size=w.d usage=[STORAGE] }";
        let ast = parse_str(src).unwrap();
        let (_, children) = first_decl(&ast);
        let body = ast.children(children[1]);
        let size_value = ast.children(body[0])[1];
        assert_eq!(ast.node(size_value).tag, NodeTag::DottedRef);
        assert_eq!(ast.children(size_value).len(), 2);
    }

    #[test]
    fn single_expression_body_becomes_a_literal() {
        let src = "#wgsl s { \"@vertex fn v() {}\" }";
        let ast = parse_str(src).unwrap();
        let (_, children) = first_decl(&ast);
        assert_eq!(ast.node(children[1]).tag, NodeTag::LitStr);
    }

    #[test]
    fn depth_limit_is_exact() {
        // The body object costs one frame, its property a second, and
        // each `[` one more. The deepest accepted tree therefore nests
        // MAX_PARSE_DEPTH - 2 arrays; one more is rejected.
        let deepest = MAX_PARSE_DEPTH - 2;
        let nested_ok = format!(
            "#frame f {{ a={}0{} }}",
            "[".repeat(deepest),
            "]".repeat(deepest)
        );
        assert!(parse_str(&nested_ok).is_ok(), "depth at the limit parses");

        let nested_deep = format!(
            "#frame f {{ a={}0{} }}",
            "[".repeat(deepest + 1),
            "]".repeat(deepest + 1)
        );
        let errors = parse_str(&nested_deep).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.kind == ParseErrorKind::NestingTooDeep));
    }

    #[test]
    fn recovers_inside_an_object_for_multiple_errors() {
        let src = "#frame f { = broken more=1 }";
        let errors = parse_str(src).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.kind == ParseErrorKind::MalformedObject));
    }

    #[test]
    fn unterminated_body_is_reported() {
        let src = "#frame f { a=1";
        let errors = parse_str(src).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.kind == ParseErrorKind::UnterminatedMacro));
    }

    #[test]
    fn stray_top_level_token_is_rejected() {
        let errors = parse_str("42").unwrap_err();
        assert!(matches!(
            errors[0].kind,
            ParseErrorKind::UnexpectedToken { .. }
        ));
    }
}
