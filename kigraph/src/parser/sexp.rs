//! S-expression reader for KiCad netlist and schematic files.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Unexpected end of input")]
    UnexpectedEof,
    #[error("Unexpected token at line {line}: {found}")]
    UnexpectedToken { line: usize, found: String },
    #[error("Trailing input at line {0}")]
    TrailingInput(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SExp {
    Atom(String),
    List(Vec<SExp>),
}

impl SExp {
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            SExp::Atom(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[SExp]> {
        match self {
            SExp::List(items) => Some(items),
            _ => None,
        }
    }

    /// The leading atom of a list, e.g. `comp` for `(comp (ref "R1"))`.
    pub fn head(&self) -> Option<&str> {
        self.as_list()
            .and_then(|items| items.first())
            .and_then(SExp::as_atom)
    }

    /// Everything after the head of a list.
    pub fn args(&self) -> &[SExp] {
        match self {
            SExp::List(items) if !items.is_empty() => &items[1..],
            _ => &[],
        }
    }

    /// First child list whose head is `key`.
    pub fn child(&self, key: &str) -> Option<&SExp> {
        self.args().iter().find(|item| item.head() == Some(key))
    }

    /// All child lists whose head is `key`, in source order.
    pub fn children<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a SExp> + 'a {
        self.args().iter().filter(move |item| item.head() == Some(key))
    }

    /// The first atom argument of the child list `key`: `(key "value")` -> `value`.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.child(key)
            .and_then(|c| c.args().first())
            .and_then(SExp::as_atom)
    }

    /// Depth-first walk over this expression and every nested list.
    pub fn walk(&self) -> Walk<'_> {
        Walk { stack: vec![self] }
    }
}

pub struct Walk<'a> {
    stack: Vec<&'a SExp>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a SExp;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        if let SExp::List(items) = node {
            // reversed so siblings come out in source order
            self.stack
                .extend(items.iter().rev().filter(|i| matches!(i, SExp::List(_))));
        }
        Some(node)
    }
}

impl fmt::Display for SExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SExp::Atom(s) => {
                if s.is_empty() || s.contains(|c: char| c.is_whitespace() || c == '(' || c == ')' || c == '"') {
                    write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
                } else {
                    write!(f, "{}", s)
                }
            }
            SExp::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}

pub struct SExpParser {
    input: Vec<char>,
    pos: usize,
    line: usize,
}

impl SExpParser {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    /// Parse exactly one top-level expression; anything but whitespace after it is an error.
    pub fn parse(&mut self) -> Result<SExp, ParseError> {
        self.skip_whitespace();
        if self.is_eof() {
            return Err(ParseError::UnexpectedEof);
        }
        let root = self.parse_sexp()?;
        self.skip_whitespace();
        if !self.is_eof() {
            return Err(ParseError::TrailingInput(self.line));
        }
        Ok(root)
    }

    fn parse_sexp(&mut self) -> Result<SExp, ParseError> {
        self.skip_whitespace();

        if self.is_eof() {
            return Err(ParseError::UnexpectedEof);
        }

        match self.peek() {
            '(' => self.parse_list(),
            ')' => Err(self.unexpected(")")),
            '"' => self.parse_string(),
            _ => self.parse_symbol(),
        }
    }

    fn parse_list(&mut self) -> Result<SExp, ParseError> {
        self.advance();
        let mut items = Vec::new();

        loop {
            self.skip_whitespace();

            if self.is_eof() {
                return Err(ParseError::UnexpectedEof);
            }

            if self.peek() == ')' {
                self.advance();
                break;
            }

            items.push(self.parse_sexp()?);
        }

        Ok(SExp::List(items))
    }

    fn parse_string(&mut self) -> Result<SExp, ParseError> {
        self.advance();
        let mut s = String::new();

        loop {
            if self.is_eof() {
                return Err(ParseError::UnexpectedEof);
            }
            let ch = self.peek();
            self.advance();
            match ch {
                '"' => break,
                '\\' => {
                    if self.is_eof() {
                        return Err(ParseError::UnexpectedEof);
                    }
                    let escaped = self.peek();
                    self.advance();
                    s.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        other => other,
                    });
                }
                _ => s.push(ch),
            }
        }

        Ok(SExp::Atom(s))
    }

    fn parse_symbol(&mut self) -> Result<SExp, ParseError> {
        let mut s = String::new();

        while !self.is_eof() {
            let ch = self.peek();
            if ch.is_whitespace() || ch == '(' || ch == ')' || ch == '"' {
                break;
            }
            s.push(ch);
            self.advance();
        }

        if s.is_empty() {
            Err(self.unexpected("empty symbol"))
        } else {
            Ok(SExp::Atom(s))
        }
    }

    fn skip_whitespace(&mut self) {
        while !self.is_eof() && self.peek().is_whitespace() {
            self.advance();
        }
    }

    fn peek(&self) -> char {
        self.input.get(self.pos).copied().unwrap_or('\0')
    }

    fn advance(&mut self) {
        if let Some(&ch) = self.input.get(self.pos) {
            if ch == '\n' {
                self.line += 1;
            }
            self.pos += 1;
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn unexpected(&self, found: &str) -> ParseError {
        ParseError::UnexpectedToken {
            line: self.line,
            found: found.to_string(),
        }
    }
}

/// Parse a complete document holding a single root expression.
pub fn parse_str(input: &str) -> Result<SExp, ParseError> {
    SExpParser::new(input).parse()
}
