// FHIRPath Lexer
//
// This module implements the lexical analysis for FHIRPath expressions.

use crate::errors::FhirPathError;
use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;

/// Token types for FHIRPath expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    // Literals
    Identifier,
    DelimitedIdentifier,
    StringLiteral,
    NumberLiteral,
    BooleanLiteral,
    DateLiteral,
    DateTimeLiteral,
    TimeLiteral,

    /// `$this`, `$index`, `$total`
    Variable,
    /// `%name` or `%'quoted name'`
    EnvVariable,

    // Operators
    Dot,            // .
    Equal,          // =
    NotEqual,       // !=
    Equivalent,     // ~
    NotEquivalent,  // !~
    LessThan,       // <
    LessOrEqual,    // <=
    GreaterThan,    // >
    GreaterOrEqual, // >=
    Plus,           // +
    Minus,          // -
    Multiply,       // *
    Divide,         // /
    Ampersand,      // &

    // Delimiters
    LeftParen,    // (
    RightParen,   // )
    LeftBracket,  // [
    RightBracket, // ]
    LeftBrace,    // {
    RightBrace,   // }
    Comma,        // ,
    Pipe,         // |

    // Keywords
    And,      // and
    Or,       // or
    Xor,      // xor
    Implies,  // implies
    In,       // in
    Contains, // contains
    Div,      // div
    Mod,      // mod
    Is,       // is
    As,       // as

    // End of input
    Eof,
}

/// A token in a FHIRPath expression
#[derive(Debug, Clone)]
pub struct Token {
    pub token_type: TokenType,
    /// Token text with quoting and escapes already resolved
    pub lexeme: String,
    pub position: usize,
    pub line: usize,
    pub column: usize,
}

/// Lexer for FHIRPath expressions
pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<Chars<'a>>,
    position: usize,
    line: usize,
    column: usize,
    keywords: HashMap<&'static str, TokenType>,
}

/// Position snapshot taken before a token is scanned
#[derive(Clone, Copy)]
struct Mark {
    position: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given input
    pub fn new(input: &'a str) -> Self {
        let keywords = HashMap::from([
            ("and", TokenType::And),
            ("or", TokenType::Or),
            ("xor", TokenType::Xor),
            ("implies", TokenType::Implies),
            ("in", TokenType::In),
            ("contains", TokenType::Contains),
            ("div", TokenType::Div),
            ("mod", TokenType::Mod),
            ("is", TokenType::Is),
            ("as", TokenType::As),
            ("true", TokenType::BooleanLiteral),
            ("false", TokenType::BooleanLiteral),
        ]);

        Lexer {
            input,
            chars: input.chars().peekable(),
            position: 0,
            line: 1,
            column: 1,
            keywords,
        }
    }

    fn mark(&self) -> Mark {
        Mark {
            position: self.position,
            line: self.line,
            column: self.column,
        }
    }

    fn token_at(&self, mark: Mark, token_type: TokenType, lexeme: impl Into<String>) -> Token {
        Token {
            token_type,
            lexeme: lexeme.into(),
            position: mark.position,
            line: mark.line,
            column: mark.column,
        }
    }

    fn error_here(&self, message: impl Into<String>) -> FhirPathError {
        FhirPathError::parse(
            self.position,
            format!(
                "{} (line {}, column {})",
                message.into(),
                self.line,
                self.column
            ),
        )
    }

    /// Advances the lexer by one character
    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next();
        if let Some(ch) = c {
            self.position += ch.len_utf8();
            self.column += 1;
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            }
        }
        c
    }

    /// Peeks at the next character without advancing
    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    /// Peeks one character past the next one
    fn peek_second(&self) -> Option<char> {
        self.input[self.position..].chars().nth(1)
    }

    /// Skips whitespace and comments
    fn skip_trivia(&mut self) -> Result<(), FhirPathError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_second() == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('/') if self.peek_second() == Some('*') => {
                    let mark = self.mark();
                    self.advance();
                    self.advance();
                    loop {
                        match self.advance() {
                            Some('*') if self.peek() == Some('/') => {
                                self.advance();
                                break;
                            }
                            Some(_) => {}
                            None => {
                                return Err(FhirPathError::parse(
                                    mark.position,
                                    "unterminated block comment",
                                ));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// Scans an identifier or keyword
    fn identifier(&mut self) -> Token {
        let mark = self.mark();
        let mut identifier = String::new();

        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                identifier.push(c);
                self.advance();
            } else {
                break;
            }
        }

        let token_type = self
            .keywords
            .get(identifier.as_str())
            .copied()
            .unwrap_or(TokenType::Identifier);

        self.token_at(mark, token_type, identifier)
    }

    /// Scans a number literal; the decimal dot is only consumed when
    /// followed by a digit so that `1.round()` stays a method call
    fn number(&mut self) -> Token {
        let mark = self.mark();
        let mut number = String::new();

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                number.push(c);
                self.advance();
            } else if c == '.' && !number.contains('.') {
                match self.peek_second() {
                    Some(d) if d.is_ascii_digit() => {
                        number.push(c);
                        self.advance();
                    }
                    _ => break,
                }
            } else {
                break;
            }
        }

        self.token_at(mark, TokenType::NumberLiteral, number)
    }

    /// Resolves one backslash escape inside a quoted token
    fn escape_sequence(&mut self) -> Result<char, FhirPathError> {
        match self.advance() {
            Some('\'') => Ok('\''),
            Some('"') => Ok('"'),
            Some('`') => Ok('`'),
            Some('\\') => Ok('\\'),
            Some('/') => Ok('/'),
            Some('f') => Ok('\x0C'),
            Some('n') => Ok('\n'),
            Some('r') => Ok('\r'),
            Some('t') => Ok('\t'),
            Some('u') => {
                let mut value = 0u32;
                for _ in 0..4 {
                    match self.peek() {
                        Some(hex) if hex.is_ascii_hexdigit() => {
                            value = value * 16 + hex.to_digit(16).unwrap_or(0);
                            self.advance();
                        }
                        _ => {
                            return Err(self.error_here("incomplete unicode escape sequence"));
                        }
                    }
                }
                char::from_u32(value)
                    .ok_or_else(|| self.error_here("invalid unicode escape sequence"))
            }
            Some(other) => Err(self.error_here(format!("invalid escape sequence '\\{}'", other))),
            None => Err(self.error_here("incomplete escape sequence")),
        }
    }

    /// Scans a quoted run terminated by `quote`, resolving escapes
    fn quoted(&mut self, quote: char, what: &str) -> Result<String, FhirPathError> {
        let mark = self.mark();
        self.advance(); // opening quote

        let mut value = String::new();
        loop {
            match self.peek() {
                Some(c) if c == quote => {
                    self.advance();
                    return Ok(value);
                }
                Some('\\') => {
                    self.advance();
                    value.push(self.escape_sequence()?);
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
                None => {
                    return Err(FhirPathError::parse(
                        mark.position,
                        format!("unterminated {}", what),
                    ));
                }
            }
        }
    }

    /// Scans a string literal
    fn string(&mut self) -> Result<Token, FhirPathError> {
        let mark = self.mark();
        let value = self.quoted('\'', "string literal")?;
        Ok(self.token_at(mark, TokenType::StringLiteral, value))
    }

    /// Scans a backtick-delimited identifier
    fn delimited_identifier(&mut self) -> Result<Token, FhirPathError> {
        let mark = self.mark();
        let value = self.quoted('`', "delimited identifier")?;
        Ok(self.token_at(mark, TokenType::DelimitedIdentifier, value))
    }

    /// Scans `$this`, `$index` or `$total`
    fn dollar_variable(&mut self) -> Result<Token, FhirPathError> {
        let mark = self.mark();
        self.advance(); // $

        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }

        match name.as_str() {
            "this" | "index" | "total" => Ok(self.token_at(mark, TokenType::Variable, name)),
            _ => Err(FhirPathError::parse(
                mark.position,
                format!("unknown variable '${}'", name),
            )),
        }
    }

    /// Scans `%name` or `%'quoted name'`
    fn env_variable(&mut self) -> Result<Token, FhirPathError> {
        let mark = self.mark();
        self.advance(); // %

        match self.peek() {
            Some('\'') => {
                let name = self.quoted('\'', "environment variable name")?;
                Ok(self.token_at(mark, TokenType::EnvVariable, name))
            }
            Some(c) if c.is_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(c) = self.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        name.push(c);
                        self.advance();
                    } else {
                        break;
                    }
                }
                Ok(self.token_at(mark, TokenType::EnvVariable, name))
            }
            _ => Err(FhirPathError::parse(
                mark.position,
                "expected a name after '%'",
            )),
        }
    }

    /// Scans a date, datetime or time literal starting with @
    fn date_time_literal(&mut self) -> Result<Token, FhirPathError> {
        let mark = self.mark();
        self.advance(); // @

        // @T... is a time-of-day literal
        if self.peek() == Some('T') {
            self.advance();
            let time = self
                .scan_time_format()
                .ok_or_else(|| FhirPathError::parse(mark.position, "invalid time literal"))?;
            return Ok(self.token_at(mark, TokenType::TimeLiteral, time));
        }

        let mut value = self
            .scan_date_format()
            .ok_or_else(|| FhirPathError::parse(mark.position, "invalid date literal"))?;

        if self.peek() == Some('T') {
            self.advance();
            value.push('T');
            if let Some(time) = self.scan_time_format() {
                value.push_str(&time);
                if let Some(tz) = self.scan_timezone_format() {
                    value.push_str(&tz);
                }
            }
            return Ok(self.token_at(mark, TokenType::DateTimeLiteral, value));
        }

        Ok(self.token_at(mark, TokenType::DateLiteral, value))
    }

    fn scan_digits(&mut self, count: usize, into: &mut String) -> bool {
        for _ in 0..count {
            match self.peek() {
                Some(c) if c.is_ascii_digit() => {
                    into.push(c);
                    self.advance();
                }
                _ => return false,
            }
        }
        true
    }

    /// Scans YYYY[-MM[-DD]]
    fn scan_date_format(&mut self) -> Option<String> {
        let mut result = String::new();
        if !self.scan_digits(4, &mut result) {
            return None;
        }

        for _ in 0..2 {
            if self.peek() != Some('-') {
                break;
            }
            // only consume the dash when digits follow (subtraction otherwise)
            match self.peek_second() {
                Some(d) if d.is_ascii_digit() => {}
                _ => break,
            }
            result.push('-');
            self.advance();
            if !self.scan_digits(2, &mut result) {
                return None;
            }
        }

        Some(result)
    }

    /// Scans hh[:mm[:ss[.fff]]]
    fn scan_time_format(&mut self) -> Option<String> {
        let mut result = String::new();
        if !self.scan_digits(2, &mut result) {
            return None;
        }

        if self.peek() == Some(':') {
            result.push(':');
            self.advance();
            if !self.scan_digits(2, &mut result) {
                return None;
            }

            if self.peek() == Some(':') {
                result.push(':');
                self.advance();
                if !self.scan_digits(2, &mut result) {
                    return None;
                }

                if self.peek() == Some('.') {
                    match self.peek_second() {
                        Some(d) if d.is_ascii_digit() => {
                            result.push('.');
                            self.advance();
                            while let Some(c) = self.peek() {
                                if c.is_ascii_digit() {
                                    result.push(c);
                                    self.advance();
                                } else {
                                    break;
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        Some(result)
    }

    /// Scans Z, +hh:mm or -hh:mm
    fn scan_timezone_format(&mut self) -> Option<String> {
        match self.peek() {
            Some('Z') => {
                self.advance();
                Some("Z".to_string())
            }
            Some(sign @ ('+' | '-')) => {
                let mut result = String::from(sign);
                self.advance();
                if !self.scan_digits(2, &mut result) {
                    return None;
                }
                if self.peek() != Some(':') {
                    return None;
                }
                result.push(':');
                self.advance();
                if !self.scan_digits(2, &mut result) {
                    return None;
                }
                Some(result)
            }
            _ => None,
        }
    }

    /// Scans the next token
    pub fn scan_token(&mut self) -> Result<Token, FhirPathError> {
        self.skip_trivia()?;
        let mark = self.mark();

        let Some(c) = self.peek() else {
            return Ok(self.token_at(mark, TokenType::Eof, ""));
        };

        let simple = |lexer: &mut Self, token_type: TokenType, text: &str| {
            lexer.advance();
            Ok(lexer.token_at(mark, token_type, text))
        };

        match c {
            '(' => simple(self, TokenType::LeftParen, "("),
            ')' => simple(self, TokenType::RightParen, ")"),
            '[' => simple(self, TokenType::LeftBracket, "["),
            ']' => simple(self, TokenType::RightBracket, "]"),
            '{' => simple(self, TokenType::LeftBrace, "{"),
            '}' => simple(self, TokenType::RightBrace, "}"),
            ',' => simple(self, TokenType::Comma, ","),
            '|' => simple(self, TokenType::Pipe, "|"),
            '.' => simple(self, TokenType::Dot, "."),
            '+' => simple(self, TokenType::Plus, "+"),
            '-' => simple(self, TokenType::Minus, "-"),
            '*' => simple(self, TokenType::Multiply, "*"),
            '/' => simple(self, TokenType::Divide, "/"),
            '&' => simple(self, TokenType::Ampersand, "&"),
            '=' => simple(self, TokenType::Equal, "="),
            '~' => simple(self, TokenType::Equivalent, "~"),
            '!' => {
                self.advance();
                match self.peek() {
                    Some('=') => {
                        self.advance();
                        Ok(self.token_at(mark, TokenType::NotEqual, "!="))
                    }
                    Some('~') => {
                        self.advance();
                        Ok(self.token_at(mark, TokenType::NotEquivalent, "!~"))
                    }
                    _ => Err(FhirPathError::parse(mark.position, "unexpected character '!'")),
                }
            }
            '<' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    Ok(self.token_at(mark, TokenType::LessOrEqual, "<="))
                } else {
                    Ok(self.token_at(mark, TokenType::LessThan, "<"))
                }
            }
            '>' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    Ok(self.token_at(mark, TokenType::GreaterOrEqual, ">="))
                } else {
                    Ok(self.token_at(mark, TokenType::GreaterThan, ">"))
                }
            }
            '\'' => self.string(),
            '`' => self.delimited_identifier(),
            '$' => self.dollar_variable(),
            '%' => self.env_variable(),
            '@' => self.date_time_literal(),
            '0'..='9' => Ok(self.number()),
            c if c.is_alphabetic() || c == '_' => Ok(self.identifier()),
            other => Err(FhirPathError::parse(
                mark.position,
                format!("unexpected character '{}'", other),
            )),
        }
    }
}

/// Tokenizes a FHIRPath expression
pub fn tokenize(input: &str) -> Result<Vec<Token>, FhirPathError> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();

    loop {
        let token = lexer.scan_token()?;
        let is_eof = token.token_type == TokenType::Eof;
        tokens.push(token);

        if is_eof {
            return Ok(tokens);
        }
    }
}
