//! Recursive descent parser for shapeql requests.
//!
//! ```text
//! operation := ('query'|'mutation'|'subscription') name? variables? '{' field+ '}'
//!            | '{' field+ '}'
//! field     := alias? name arguments? directives? selection?
//! arguments := '(' (name ':' value) (','? name ':' value)* ')'
//! selection := '{' field+ '}'
//! value     := scalar | '$' name | '[' value* ']' | '{' (name ':' value)* '}'
//! ```
//!
//! The parser stops at the first error; there is no recovery. Selection
//! sets, list and object values, and list types nest at most
//! [`DEFAULT_MAX_DEPTH`] levels unless [`Parser::with_max_depth`] says
//! otherwise.

use crate::ast::*;
use crate::error::SyntaxError;
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};
use shapeql_core::Span;

type ParseResult<T> = Result<T, SyntaxError>;

/// Nesting limit used by [`parse`].
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Parses request text into an [`Operation`].
pub fn parse(source: &str) -> Result<Operation, SyntaxError> {
    Parser::new(source).parse_request()
}

/// Parser for shapeql requests.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    depth: usize,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    /// Creates a new parser.
    pub fn new(source: &'a str) -> Self {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token();
        Self {
            lexer,
            current,
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Limits how deeply selections and values may nest.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Runs `parse` one nesting level deeper.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        if self.depth >= self.max_depth {
            return Err(self.error_expected(&format!("nesting depth <= {}", self.max_depth)));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    #[inline]
    fn at(&self) -> TokenKind {
        self.current.kind
    }

    #[inline]
    fn at_kind(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn advance(&mut self) {
        self.current = self.lexer.next_token();
    }

    /// Consumes the current token if it is `kind`.
    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at_kind(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_commas(&mut self) {
        while self.eat(TokenKind::Comma) {}
    }

    /// Expects a specific token kind.
    fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if self.at_kind(kind) {
            let token = self.current;
            self.advance();
            Ok(token)
        } else {
            Err(self.error_expected(&format!("`{kind}`")))
        }
    }

    fn current_text(&self) -> &'a str {
        self.lexer.span_text(self.current.span)
    }

    fn found(&self) -> String {
        match self.at() {
            TokenKind::Eof => TokenKind::Eof.as_str().to_string(),
            _ => format!("`{}`", self.current_text()),
        }
    }

    fn error_expected(&self, expected: &str) -> SyntaxError {
        SyntaxError::new(self.current.span, expected, self.found())
    }

    /// Parses a complete request: exactly one operation, then end of input.
    pub fn parse_request(&mut self) -> ParseResult<Operation> {
        let operation = self.parse_operation()?;
        if !self.at_kind(TokenKind::Eof) {
            return Err(self.error_expected("end of request"));
        }
        Ok(operation)
    }

    fn parse_operation(&mut self) -> ParseResult<Operation> {
        let start = self.current.span.start;

        let (kind, name, variables) = if self.at_kind(TokenKind::LBrace) {
            (OperationKind::Query, None, Vec::new())
        } else {
            let kind = match self.at() {
                TokenKind::Query => OperationKind::Query,
                TokenKind::Mutation => OperationKind::Mutation,
                TokenKind::Subscription => OperationKind::Subscription,
                _ => return Err(self.error_expected("`query`, `mutation`, `subscription` or `{`")),
            };
            self.advance();

            let name = if self.at_kind(TokenKind::Ident) {
                Some(self.parse_name("operation name")?)
            } else {
                None
            };

            let variables = if self.at_kind(TokenKind::LParen) {
                self.parse_variable_definitions()?
            } else {
                Vec::new()
            };

            (kind, name, variables)
        };

        let (selection, end) = self.parse_selection_set()?;

        Ok(Operation {
            kind,
            name,
            variables,
            selection,
            span: Span::new(start, end),
        })
    }

    fn parse_variable_definitions(&mut self) -> ParseResult<Vec<VariableDefinition>> {
        self.expect(TokenKind::LParen)?;
        let mut vars = vec![self.parse_variable_definition()?];
        loop {
            self.skip_commas();
            if self.eat(TokenKind::RParen) {
                return Ok(vars);
            }
            vars.push(self.parse_variable_definition()?);
        }
    }

    fn parse_variable_definition(&mut self) -> ParseResult<VariableDefinition> {
        let start = self.current.span.start;
        self.expect(TokenKind::Dollar)?;
        let name = self.parse_name("variable name")?;
        self.expect(TokenKind::Colon)?;
        let ty = self.parse_type_annotation()?;

        let default_value = if self.eat(TokenKind::Eq) {
            Some(self.parse_value(true)?)
        } else {
            None
        };

        Ok(VariableDefinition {
            name,
            ty,
            default_value,
            span: Span::new(start, self.current.span.start),
        })
    }

    fn parse_type_annotation(&mut self) -> ParseResult<TypeAnnotation> {
        let start = self.current.span.start;
        let inner = if self.eat(TokenKind::LBracket) {
            let element = self.nested(Self::parse_type_annotation)?;
            let close = self.expect(TokenKind::RBracket)?;
            TypeAnnotation::List(Box::new(element), Span::new(start, close.span.end))
        } else {
            TypeAnnotation::Named(self.parse_name("type name")?)
        };

        if self.at_kind(TokenKind::Bang) {
            let bang = self.current.span;
            self.advance();
            Ok(TypeAnnotation::NonNull(
                Box::new(inner),
                Span::new(start, bang.end),
            ))
        } else {
            Ok(inner)
        }
    }

    /// Parses `{ field+ }`, returning the fields and the end offset.
    fn parse_selection_set(&mut self) -> ParseResult<(Vec<RequestedField>, u32)> {
        self.nested(Self::parse_selection_body)
    }

    fn parse_selection_body(&mut self) -> ParseResult<(Vec<RequestedField>, u32)> {
        self.expect(TokenKind::LBrace)?;

        let mut fields = vec![self.parse_field()?];
        loop {
            self.skip_commas();
            match self.at() {
                TokenKind::RBrace => break,
                TokenKind::Eof => return Err(self.error_expected("`}`")),
                _ => fields.push(self.parse_field()?),
            }
        }

        let close = self.expect(TokenKind::RBrace)?;
        Ok((fields, close.span.end))
    }

    fn parse_field(&mut self) -> ParseResult<RequestedField> {
        let start = self.current.span.start;

        let first = self.parse_name("field name")?;
        let (alias, name) = if self.eat(TokenKind::Colon) {
            (Some(first), self.parse_name("field name")?)
        } else {
            (None, first)
        };

        let arguments = if self.at_kind(TokenKind::LParen) {
            self.parse_arguments()?
        } else {
            Vec::new()
        };

        let directives = self.parse_directives()?;

        let mut end = self.current.span.start;
        let selection = if self.at_kind(TokenKind::LBrace) {
            let (selection, close) = self.parse_selection_set()?;
            end = close;
            selection
        } else {
            Vec::new()
        };

        Ok(RequestedField {
            alias,
            name,
            arguments,
            directives,
            selection,
            span: Span::new(start, end),
        })
    }

    fn parse_arguments(&mut self) -> ParseResult<Vec<Argument>> {
        self.expect(TokenKind::LParen)?;
        let mut args = vec![self.parse_argument()?];
        loop {
            self.skip_commas();
            if self.eat(TokenKind::RParen) {
                return Ok(args);
            }
            if self.at_kind(TokenKind::Eof) {
                return Err(self.error_expected("`)`"));
            }
            args.push(self.parse_argument()?);
        }
    }

    fn parse_argument(&mut self) -> ParseResult<Argument> {
        let start = self.current.span.start;
        let name = self.parse_name("argument name")?;
        self.expect(TokenKind::Colon)?;
        let value = self.parse_value(false)?;
        let end = value.span().end;
        Ok(Argument {
            name,
            value,
            span: Span::new(start, end),
        })
    }

    fn parse_directives(&mut self) -> ParseResult<Vec<Directive>> {
        let mut directives = Vec::new();
        while self.at_kind(TokenKind::At) {
            let start = self.current.span.start;
            self.advance();
            let name = self.parse_name("directive name")?;
            let arguments = if self.at_kind(TokenKind::LParen) {
                self.parse_arguments()?
            } else {
                Vec::new()
            };
            directives.push(Directive {
                name,
                arguments,
                span: Span::new(start, self.current.span.start),
            });
        }
        Ok(directives)
    }

    /// Parses a value. Variable references are rejected when `constant`.
    fn parse_value(&mut self, constant: bool) -> ParseResult<Value> {
        let span = self.current.span;

        let value = match self.at() {
            TokenKind::Dollar if !constant => {
                self.advance();
                return Ok(Value::Variable(self.parse_name("variable name")?));
            }
            TokenKind::IntLiteral => {
                let value = self
                    .current_text()
                    .parse()
                    .map_err(|_| self.error_expected("integer within 64-bit range"))?;
                Value::Int(value, span)
            }
            TokenKind::FloatLiteral => {
                let value = self
                    .current_text()
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .ok_or_else(|| self.error_expected("finite float literal"))?;
                Value::Float(value, span)
            }
            TokenKind::StringLiteral => {
                let text = self.current_text();
                let value = unescape(&text[1..text.len() - 1])
                    .ok_or_else(|| self.error_expected("valid escape sequence"))?;
                Value::String(value, span)
            }
            TokenKind::BlockStringLiteral => {
                let text = self.current_text();
                Value::String(block_string_value(&text[3..text.len() - 3]), span)
            }
            TokenKind::True => Value::Boolean(true, span),
            TokenKind::False => Value::Boolean(false, span),
            TokenKind::Null => Value::Null(span),
            TokenKind::Ident => return Ok(Value::Enum(self.parse_name("value")?)),
            TokenKind::LBracket => return self.nested(|p| p.parse_list(constant)),
            TokenKind::LBrace => return self.nested(|p| p.parse_object(constant)),
            _ => return Err(self.error_expected("value")),
        };

        self.advance();
        Ok(value)
    }

    fn parse_list(&mut self, constant: bool) -> ParseResult<Value> {
        let start = self.current.span.start;
        self.expect(TokenKind::LBracket)?;
        let mut values = Vec::new();
        loop {
            self.skip_commas();
            match self.at() {
                TokenKind::RBracket => break,
                TokenKind::Eof => return Err(self.error_expected("`]`")),
                _ => values.push(self.parse_value(constant)?),
            }
        }
        let close = self.expect(TokenKind::RBracket)?;
        Ok(Value::List(values, Span::new(start, close.span.end)))
    }

    fn parse_object(&mut self, constant: bool) -> ParseResult<Value> {
        let start = self.current.span.start;
        self.expect(TokenKind::LBrace)?;
        let mut fields = Vec::new();
        loop {
            self.skip_commas();
            match self.at() {
                TokenKind::RBrace => break,
                TokenKind::Eof => return Err(self.error_expected("`}`")),
                _ => {
                    let name = self.parse_name("object field name")?;
                    self.expect(TokenKind::Colon)?;
                    let value = self.parse_value(constant)?;
                    fields.push((name, value));
                }
            }
        }
        let close = self.expect(TokenKind::RBrace)?;
        Ok(Value::Object(fields, Span::new(start, close.span.end)))
    }

    fn parse_name(&mut self, expected: &str) -> ParseResult<Name> {
        if self.at().is_name() {
            let name = Name::new(self.current_text(), self.current.span);
            self.advance();
            Ok(name)
        } else {
            Err(self.error_expected(expected))
        }
    }
}

/// Decodes the escape sequences of a quoted string body.
fn unescape(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let decoded = match chars.next()? {
            '"' => '"',
            '\\' => '\\',
            '/' => '/',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'u' => {
                let hex: String = chars.by_ref().take(4).collect();
                if hex.len() != 4 {
                    return None;
                }
                char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?
            }
            _ => return None,
        };
        out.push(decoded);
    }
    Some(out)
}

/// Strips common indentation and blank edge lines from a block string body.
fn block_string_value(raw: &str) -> String {
    let raw = raw.replace("\\\"\"\"", "\"\"\"");
    let lines: Vec<&str> = raw.lines().collect();

    let indent = lines
        .iter()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);

    let mut out: Vec<&str> = lines
        .iter()
        .enumerate()
        .map(|(i, l)| if i == 0 { l } else { l.get(indent..).unwrap_or("") })
        .collect();

    while out.first().is_some_and(|l| l.trim().is_empty()) {
        out.remove(0);
    }
    while out.last().is_some_and(|l| l.trim().is_empty()) {
        out.pop();
    }
    out.join("\n")
}
