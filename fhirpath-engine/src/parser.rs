// FHIRPath Parser
//
// This module implements the parser for FHIRPath expressions: a
// recursive-descent parser following the FHIRPath precedence table, from
// lowest `implies` down to member access. All operators are
// left-associative except `implies`.

use crate::datetime::{PrecisionDate, PrecisionDateTime, PrecisionTime};
use crate::errors::FhirPathError;
use crate::lexer::{Token, TokenType};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Literal values appearing in an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// The empty collection literal `{}`
    Empty,
    Boolean(bool),
    Integer(i32),
    Decimal(Decimal),
    String(String),
    Date(PrecisionDate),
    DateTime(PrecisionDateTime),
    Time(PrecisionTime),
    /// A number with a unit, `5 'mg'` or `4 days`
    Quantity(Decimal, String),
}

/// Type name used by `is`/`as`, optionally qualified with `FHIR` or
/// `System`
#[derive(Debug, Clone, PartialEq)]
pub struct TypeSpecifier {
    pub qualifier: Option<String>,
    pub name: String,
}

/// AST node types for FHIRPath expressions
#[derive(Debug, Clone, PartialEq)]
pub enum AstNode {
    Literal(Literal),

    /// Bare name, resolved against `$this` or the root resource type
    Identifier(String),

    /// Member access `parent.name`
    Path {
        parent: Box<AstNode>,
        name: String,
    },

    /// Indexer `parent[index]`
    Index {
        parent: Box<AstNode>,
        index: Box<AstNode>,
    },

    /// Method-style function call `parent.name(arguments)`; a bare call
    /// has `This` as its parent
    Invoke {
        parent: Box<AstNode>,
        name: String,
        arguments: Vec<AstNode>,
    },

    BinaryOp {
        op: BinaryOperator,
        left: Box<AstNode>,
        right: Box<AstNode>,
    },

    UnaryOp {
        op: UnaryOperator,
        operand: Box<AstNode>,
    },

    /// `operand as Type`
    TypeCast {
        operand: Box<AstNode>,
        type_spec: TypeSpecifier,
    },

    /// `operand is Type`
    TypeTest {
        operand: Box<AstNode>,
        type_spec: TypeSpecifier,
    },

    /// `%name`
    EnvVariable(String),

    /// `$this`
    This,
    /// `$index`
    DollarIndex,
    /// `$total`
    DollarTotal,
}

/// Binary operators in FHIRPath
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Equals,
    NotEquals,
    Equivalent,
    NotEquivalent,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    Addition,
    Subtraction,
    Multiplication,
    Division,
    IntegerDivision,
    Modulo,
    Concatenate,
    Union,
    And,
    Or,
    Xor,
    Implies,
    In,
    Contains,
}

/// Unary operators in FHIRPath. `Not` has no surface syntax; it is the
/// internal form of the `not()` function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Plus,
    Negate,
    Not,
}

/// Parser for FHIRPath expressions
pub struct Parser<'a> {
    tokens: &'a [Token],
    current: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, current: 0 }
    }

    /// Parses a complete expression; trailing tokens are an error.
    pub fn parse(&mut self) -> Result<AstNode, FhirPathError> {
        let expr = self.expression()?;
        if !self.is_at_end() {
            let token = self.peek();
            return Err(FhirPathError::parse(
                token.position,
                format!("unexpected token '{}'", token.lexeme),
            ));
        }
        Ok(expr)
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.tokens.len() || self.peek().token_type == TokenType::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn check(&self, token_type: TokenType) -> bool {
        !self.is_at_end() && self.peek().token_type == token_type
    }

    fn match_token(&mut self, token_type: TokenType) -> bool {
        if self.check(token_type) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_any(&mut self, token_types: &[TokenType]) -> bool {
        for token_type in token_types {
            if self.match_token(*token_type) {
                return true;
            }
        }
        false
    }

    fn consume(&mut self, token_type: TokenType, message: &str) -> Result<&Token, FhirPathError> {
        if self.check(token_type) {
            Ok(self.advance())
        } else {
            let token = self.peek();
            Err(FhirPathError::parse(
                token.position,
                format!("{}, got '{}'", message, token.lexeme),
            ))
        }
    }

    fn binary(op: BinaryOperator, left: AstNode, right: AstNode) -> AstNode {
        AstNode::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn expression(&mut self) -> Result<AstNode, FhirPathError> {
        self.implies_expr()
    }

    /// `implies` is right-associative
    fn implies_expr(&mut self) -> Result<AstNode, FhirPathError> {
        let left = self.or_expr()?;
        if self.match_token(TokenType::Implies) {
            let right = self.implies_expr()?;
            return Ok(Self::binary(BinaryOperator::Implies, left, right));
        }
        Ok(left)
    }

    fn or_expr(&mut self) -> Result<AstNode, FhirPathError> {
        let mut expr = self.and_expr()?;
        while self.match_any(&[TokenType::Or, TokenType::Xor]) {
            let op = match self.previous().token_type {
                TokenType::Or => BinaryOperator::Or,
                _ => BinaryOperator::Xor,
            };
            let right = self.and_expr()?;
            expr = Self::binary(op, expr, right);
        }
        Ok(expr)
    }

    fn and_expr(&mut self) -> Result<AstNode, FhirPathError> {
        let mut expr = self.membership_expr()?;
        while self.match_token(TokenType::And) {
            let right = self.membership_expr()?;
            expr = Self::binary(BinaryOperator::And, expr, right);
        }
        Ok(expr)
    }

    fn membership_expr(&mut self) -> Result<AstNode, FhirPathError> {
        let mut expr = self.equality_expr()?;
        while self.match_any(&[TokenType::In, TokenType::Contains]) {
            let op = match self.previous().token_type {
                TokenType::In => BinaryOperator::In,
                _ => BinaryOperator::Contains,
            };
            let right = self.equality_expr()?;
            expr = Self::binary(op, expr, right);
        }
        Ok(expr)
    }

    fn equality_expr(&mut self) -> Result<AstNode, FhirPathError> {
        let mut expr = self.comparison_expr()?;
        while self.match_any(&[
            TokenType::Equal,
            TokenType::NotEqual,
            TokenType::Equivalent,
            TokenType::NotEquivalent,
        ]) {
            let op = match self.previous().token_type {
                TokenType::Equal => BinaryOperator::Equals,
                TokenType::NotEqual => BinaryOperator::NotEquals,
                TokenType::Equivalent => BinaryOperator::Equivalent,
                _ => BinaryOperator::NotEquivalent,
            };
            let right = self.comparison_expr()?;
            expr = Self::binary(op, expr, right);
        }
        Ok(expr)
    }

    fn comparison_expr(&mut self) -> Result<AstNode, FhirPathError> {
        let mut expr = self.union_expr()?;
        while self.match_any(&[
            TokenType::LessThan,
            TokenType::LessOrEqual,
            TokenType::GreaterThan,
            TokenType::GreaterOrEqual,
        ]) {
            let op = match self.previous().token_type {
                TokenType::LessThan => BinaryOperator::LessThan,
                TokenType::LessOrEqual => BinaryOperator::LessOrEqual,
                TokenType::GreaterThan => BinaryOperator::GreaterThan,
                _ => BinaryOperator::GreaterOrEqual,
            };
            let right = self.union_expr()?;
            expr = Self::binary(op, expr, right);
        }
        Ok(expr)
    }

    fn union_expr(&mut self) -> Result<AstNode, FhirPathError> {
        let mut expr = self.additive_expr()?;
        while self.match_token(TokenType::Pipe) {
            let right = self.additive_expr()?;
            expr = Self::binary(BinaryOperator::Union, expr, right);
        }
        Ok(expr)
    }

    fn additive_expr(&mut self) -> Result<AstNode, FhirPathError> {
        let mut expr = self.multiplicative_expr()?;
        while self.match_any(&[TokenType::Plus, TokenType::Minus, TokenType::Ampersand]) {
            let op = match self.previous().token_type {
                TokenType::Plus => BinaryOperator::Addition,
                TokenType::Minus => BinaryOperator::Subtraction,
                _ => BinaryOperator::Concatenate,
            };
            let right = self.multiplicative_expr()?;
            expr = Self::binary(op, expr, right);
        }
        Ok(expr)
    }

    fn multiplicative_expr(&mut self) -> Result<AstNode, FhirPathError> {
        let mut expr = self.type_expr()?;
        while self.match_any(&[
            TokenType::Multiply,
            TokenType::Divide,
            TokenType::Div,
            TokenType::Mod,
        ]) {
            let op = match self.previous().token_type {
                TokenType::Multiply => BinaryOperator::Multiplication,
                TokenType::Divide => BinaryOperator::Division,
                TokenType::Div => BinaryOperator::IntegerDivision,
                _ => BinaryOperator::Modulo,
            };
            let right = self.type_expr()?;
            expr = Self::binary(op, expr, right);
        }
        Ok(expr)
    }

    fn type_expr(&mut self) -> Result<AstNode, FhirPathError> {
        let mut expr = self.unary_expr()?;
        while self.match_any(&[TokenType::Is, TokenType::As]) {
            let is_test = self.previous().token_type == TokenType::Is;
            let type_spec = self.type_specifier()?;
            expr = if is_test {
                AstNode::TypeTest {
                    operand: Box::new(expr),
                    type_spec,
                }
            } else {
                AstNode::TypeCast {
                    operand: Box::new(expr),
                    type_spec,
                }
            };
        }
        Ok(expr)
    }

    fn type_specifier(&mut self) -> Result<TypeSpecifier, FhirPathError> {
        let first = self
            .consume(TokenType::Identifier, "expected a type name")?
            .lexeme
            .clone();

        if (first == "FHIR" || first == "System") && self.check(TokenType::Dot) {
            self.advance();
            let name = self
                .consume(TokenType::Identifier, "expected a type name")?
                .lexeme
                .clone();
            return Ok(TypeSpecifier {
                qualifier: Some(first),
                name,
            });
        }

        Ok(TypeSpecifier {
            qualifier: None,
            name: first,
        })
    }

    fn unary_expr(&mut self) -> Result<AstNode, FhirPathError> {
        if self.match_token(TokenType::Minus) {
            let operand = self.unary_expr()?;
            return Ok(AstNode::UnaryOp {
                op: UnaryOperator::Negate,
                operand: Box::new(operand),
            });
        }
        if self.match_token(TokenType::Plus) {
            let operand = self.unary_expr()?;
            return Ok(AstNode::UnaryOp {
                op: UnaryOperator::Plus,
                operand: Box::new(operand),
            });
        }
        self.postfix_expr()
    }

    fn postfix_expr(&mut self) -> Result<AstNode, FhirPathError> {
        let mut expr = self.primary()?;

        loop {
            if self.match_token(TokenType::Dot) {
                let name = self.member_name()?;
                if self.match_token(TokenType::LeftParen) {
                    let arguments = self.argument_list()?;
                    expr = AstNode::Invoke {
                        parent: Box::new(expr),
                        name,
                        arguments,
                    };
                } else {
                    expr = AstNode::Path {
                        parent: Box::new(expr),
                        name,
                    };
                }
            } else if self.match_token(TokenType::LeftBracket) {
                let index = self.expression()?;
                self.consume(TokenType::RightBracket, "expected ']' after index")?;
                expr = AstNode::Index {
                    parent: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    /// A member name after `.`; keywords double as plain names here
    /// (`value.contains('x')`, `type().is(...)`).
    fn member_name(&mut self) -> Result<String, FhirPathError> {
        let token = self.peek();
        match token.token_type {
            TokenType::Identifier
            | TokenType::DelimitedIdentifier
            | TokenType::And
            | TokenType::Or
            | TokenType::Xor
            | TokenType::Implies
            | TokenType::In
            | TokenType::Contains
            | TokenType::Div
            | TokenType::Mod
            | TokenType::Is
            | TokenType::As => Ok(self.advance().lexeme.clone()),
            _ => Err(FhirPathError::parse(
                token.position,
                format!("expected a member name, got '{}'", token.lexeme),
            )),
        }
    }

    fn argument_list(&mut self) -> Result<Vec<AstNode>, FhirPathError> {
        let mut arguments = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                arguments.push(self.expression()?);
                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "expected ')' after arguments")?;
        Ok(arguments)
    }

    fn primary(&mut self) -> Result<AstNode, FhirPathError> {
        if self.match_token(TokenType::Identifier)
            || self.match_token(TokenType::DelimitedIdentifier)
        {
            let name = self.previous().lexeme.clone();
            if self.match_token(TokenType::LeftParen) {
                let arguments = self.argument_list()?;
                return Ok(AstNode::Invoke {
                    parent: Box::new(AstNode::This),
                    name,
                    arguments,
                });
            }
            return Ok(AstNode::Identifier(name));
        }

        if self.match_token(TokenType::Variable) {
            return Ok(match self.previous().lexeme.as_str() {
                "this" => AstNode::This,
                "index" => AstNode::DollarIndex,
                _ => AstNode::DollarTotal,
            });
        }

        if self.match_token(TokenType::EnvVariable) {
            return Ok(AstNode::EnvVariable(self.previous().lexeme.clone()));
        }

        if self.match_token(TokenType::StringLiteral) {
            return Ok(AstNode::Literal(Literal::String(
                self.previous().lexeme.clone(),
            )));
        }

        if self.match_token(TokenType::NumberLiteral) {
            return self.number_literal();
        }

        if self.match_token(TokenType::BooleanLiteral) {
            let value = self.previous().lexeme == "true";
            return Ok(AstNode::Literal(Literal::Boolean(value)));
        }

        if self.match_token(TokenType::DateLiteral) {
            let token = self.previous();
            let date = PrecisionDate::parse(&token.lexeme)
                .map_err(|_| FhirPathError::parse(token.position, "invalid date literal"))?;
            return Ok(AstNode::Literal(Literal::Date(date)));
        }

        if self.match_token(TokenType::DateTimeLiteral) {
            let token = self.previous();
            let datetime = PrecisionDateTime::parse(&token.lexeme)
                .map_err(|_| FhirPathError::parse(token.position, "invalid dateTime literal"))?;
            return Ok(AstNode::Literal(Literal::DateTime(datetime)));
        }

        if self.match_token(TokenType::TimeLiteral) {
            let token = self.previous();
            let time = PrecisionTime::parse(&token.lexeme)
                .map_err(|_| FhirPathError::parse(token.position, "invalid time literal"))?;
            return Ok(AstNode::Literal(Literal::Time(time)));
        }

        if self.match_token(TokenType::LeftBrace) {
            self.consume(TokenType::RightBrace, "expected '}' in empty literal")?;
            return Ok(AstNode::Literal(Literal::Empty));
        }

        if self.match_token(TokenType::LeftParen) {
            let expr = self.expression()?;
            self.consume(TokenType::RightParen, "expected ')' after expression")?;
            return Ok(expr);
        }

        let token = self.peek();
        Err(FhirPathError::parse(
            token.position,
            format!("expected an expression, got '{}'", token.lexeme),
        ))
    }

    /// A number, optionally followed by a unit to form a quantity.
    fn number_literal(&mut self) -> Result<AstNode, FhirPathError> {
        let token = self.previous();
        let position = token.position;
        let text = token.lexeme.clone();

        let literal = if text.contains('.') {
            Literal::Decimal(
                Decimal::from_str(&text)
                    .map_err(|_| FhirPathError::parse(position, "invalid decimal literal"))?,
            )
        } else {
            Literal::Integer(
                text.parse::<i32>()
                    .map_err(|_| FhirPathError::parse(position, "integer literal out of range"))?,
            )
        };

        // quantity literal: `5 'mg'` or `4 days`
        let unit = if self.check(TokenType::StringLiteral) {
            Some(self.advance().lexeme.clone())
        } else if self.check(TokenType::Identifier) && is_calendar_word(&self.peek().lexeme) {
            Some(self.advance().lexeme.clone())
        } else {
            None
        };

        if let Some(unit) = unit {
            let value = match literal {
                Literal::Decimal(d) => d,
                Literal::Integer(i) => Decimal::from(i),
                _ => unreachable!("number literal is integer or decimal"),
            };
            return Ok(AstNode::Literal(Literal::Quantity(value, unit)));
        }

        Ok(AstNode::Literal(literal))
    }
}

fn is_calendar_word(word: &str) -> bool {
    matches!(
        word,
        "year"
            | "years"
            | "month"
            | "months"
            | "week"
            | "weeks"
            | "day"
            | "days"
            | "hour"
            | "hours"
            | "minute"
            | "minutes"
            | "second"
            | "seconds"
            | "millisecond"
            | "milliseconds"
    )
}

/// Parses a FHIRPath expression from tokens
pub fn parse(tokens: &[Token]) -> Result<AstNode, FhirPathError> {
    let mut parser = Parser::new(tokens);
    parser.parse()
}
