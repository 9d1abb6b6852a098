#![forbid(unsafe_code)]

//! Text-to-expression parsing.
//!
//! The grammar is deliberately small: literals (numbers, quoted strings,
//! `true`/`false`), dotted property chains, and signal invocations with
//! an optional `::detail` qualifier. Names may contain hyphens the way
//! toolkit property names do (`margin-top`).
//!
//! Every node and every error carries a [`SourceLocation`] computed by
//! offsetting the caller's base location with the lines and columns
//! consumed so far, so diagnostics point into the original source text
//! even when the expression sits inside a larger binding string.

use graft_core::value::Value;
use graft_core::SourceLocation;

use crate::error::ParseError;
use crate::expression::Expression;

/// Parse a complete expression; trailing input is an error.
pub fn parse_expression(text: &str, location: &SourceLocation) -> Result<Expression, ParseError> {
    let mut cursor = Cursor::new(text, location);
    cursor.skip_ws();
    let expression = cursor.parse_expr()?;
    cursor.skip_ws();
    match cursor.peek() {
        None => Ok(expression),
        Some(_) => Err(ParseError::Expected {
            what: "end of expression",
            location: cursor.location(),
        }),
    }
}

struct Cursor<'a> {
    chars: Vec<char>,
    pos: usize,
    base: &'a SourceLocation,
    line: u32,
    col: u32,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str, base: &'a SourceLocation) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            base,
            line: 0,
            col: 0,
        }
    }

    fn location(&self) -> SourceLocation {
        self.base.offset(self.line, self.col)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn parse_expr(&mut self) -> Result<Expression, ParseError> {
        let mut node = self.parse_primary()?;
        loop {
            self.skip_ws();
            if self.peek() == Some('.') {
                self.bump();
                self.skip_ws();
                node = self.parse_member(node)?;
            } else {
                return Ok(node);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        let location = self.location();
        match self.peek() {
            None => Err(ParseError::UnexpectedEnd { location }),
            Some(c) if c.is_ascii_digit() || c == '-' => self.parse_number(),
            Some(c) if c == '\'' || c == '"' => self.parse_string(),
            Some(c) if is_ident_start(c) => {
                let name = self.parse_ident();
                match name.as_str() {
                    "true" => Ok(Expression::constant(location, Value::Bool(true))),
                    "false" => Ok(Expression::constant(location, Value::Bool(false))),
                    _ => self.parse_name_suffix(None, &name, location),
                }
            }
            Some(found) => Err(ParseError::UnexpectedChar { found, location }),
        }
    }

    fn parse_member(&mut self, receiver: Expression) -> Result<Expression, ParseError> {
        let location = self.location();
        if !self.peek().is_some_and(is_ident_start) {
            return Err(ParseError::Expected {
                what: "a name after '.'",
                location,
            });
        }
        let name = self.parse_ident();
        self.parse_name_suffix(Some(receiver), &name, location)
    }

    /// A bare name becomes a property access; `(` or `::detail(` turns it
    /// into a signal invocation.
    fn parse_name_suffix(
        &mut self,
        object: Option<Expression>,
        name: &str,
        location: SourceLocation,
    ) -> Result<Expression, ParseError> {
        self.skip_ws();
        if self.peek() == Some(':') && self.peek2() == Some(':') {
            self.bump();
            self.bump();
            self.skip_ws();
            let detail_location = self.location();
            if !self.peek().is_some_and(is_ident_start) {
                return Err(ParseError::Expected {
                    what: "a signal detail after '::'",
                    location: detail_location,
                });
            }
            let detail = self.parse_ident();
            self.skip_ws();
            if self.peek() != Some('(') {
                return Err(ParseError::Expected {
                    what: "'(' after a signal detail",
                    location: self.location(),
                });
            }
            let args = self.parse_args()?;
            return Ok(Expression::signal(
                location,
                object,
                name,
                Some(&detail),
                args,
            ));
        }
        if self.peek() == Some('(') {
            let args = self.parse_args()?;
            return Ok(Expression::signal(location, object, name, None, args));
        }
        Ok(Expression::property(location, object, name))
    }

    fn parse_args(&mut self) -> Result<Vec<Expression>, ParseError> {
        self.bump();
        let mut args = Vec::new();
        self.skip_ws();
        if self.peek() == Some(')') {
            self.bump();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.bump();
                    self.skip_ws();
                }
                Some(')') => {
                    self.bump();
                    return Ok(args);
                }
                None => {
                    return Err(ParseError::UnexpectedEnd {
                        location: self.location(),
                    });
                }
                Some(_) => {
                    return Err(ParseError::Expected {
                        what: "',' or ')'",
                        location: self.location(),
                    });
                }
            }
        }
    }

    fn parse_ident(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                name.push(c);
                self.bump();
            } else if c == '-' && self.peek2().is_some_and(is_ident_continue) {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        name
    }

    fn parse_number(&mut self) -> Result<Expression, ParseError> {
        let location = self.location();
        let mut text = String::new();
        if self.peek() == Some('-') {
            text.push('-');
            self.bump();
        }
        if self.peek() == Some('0') && matches!(self.peek2(), Some('x' | 'X')) {
            return self.parse_hex_number(text, location);
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else if c == '.' && !is_float && self.peek2().is_some_and(|d| d.is_ascii_digit()) {
                is_float = true;
                text.push(c);
                self.bump();
            } else if c == '.' && !is_float && !self.peek2().is_some_and(is_ident_start) {
                // A dot not starting a member access, with no digits after.
                text.push(c);
                self.bump();
                return Err(ParseError::BadNumber { text, location });
            } else {
                break;
            }
        }
        if text.is_empty() || text == "-" {
            return Err(ParseError::BadNumber { text, location });
        }
        let value = if is_float {
            text.parse::<f64>().map(Value::Float).map_err(|_| ())
        } else {
            text.parse::<i64>().map(Value::Int).map_err(|_| ())
        };
        match value {
            Ok(value) => Ok(Expression::constant(location, value)),
            Err(()) => Err(ParseError::BadNumber { text, location }),
        }
    }

    /// `text` holds the sign, if any; the cursor sits on the `0` of a
    /// `0x` prefix. The whole alphanumeric run lands in the error text so
    /// `0xy` reports itself, not a dangling `y`.
    fn parse_hex_number(
        &mut self,
        mut text: String,
        location: SourceLocation,
    ) -> Result<Expression, ParseError> {
        for _ in 0..2 {
            if let Some(c) = self.bump() {
                text.push(c);
            }
        }
        let mut digits = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() {
                digits.push(c);
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseError::BadNumber { text, location });
        }
        let negative = text.starts_with('-');
        match i64::from_str_radix(&digits, 16) {
            Ok(magnitude) => Ok(Expression::constant(
                location,
                Value::Int(if negative { -magnitude } else { magnitude }),
            )),
            Err(_) => Err(ParseError::BadNumber { text, location }),
        }
    }

    fn parse_string(&mut self) -> Result<Expression, ParseError> {
        let location = self.location();
        let Some(quote) = self.bump() else {
            return Err(ParseError::UnexpectedEnd { location });
        };
        let mut text = String::new();
        loop {
            let escape_location = self.location();
            match self.bump() {
                None => return Err(ParseError::UnterminatedString { location }),
                Some(c) if c == quote => {
                    return Ok(Expression::constant(location, Value::from(text)));
                }
                Some('\\') => match self.bump() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some(c @ ('\\' | '\'' | '"')) => text.push(c),
                    Some(found) => {
                        return Err(ParseError::UnexpectedChar {
                            found,
                            location: escape_location,
                        });
                    }
                    None => return Err(ParseError::UnterminatedString { location }),
                },
                Some(c) => text.push(c),
            }
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}
