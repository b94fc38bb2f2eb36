// FHIRPath Lexer Tests

use fhirpath_engine::errors::FhirPathError;
use fhirpath_engine::lexer::{tokenize, TokenType};

#[test]
fn test_empty_input() {
    let tokens = tokenize("").unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].token_type, TokenType::Eof);
}

#[test]
fn test_whitespace_only() {
    let tokens = tokenize("   \t\n  ").unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].token_type, TokenType::Eof);
}

#[test]
fn test_identifiers() {
    let tokens = tokenize("name _id identifier123").unwrap();
    assert_eq!(tokens.len(), 4);

    assert_eq!(tokens[0].token_type, TokenType::Identifier);
    assert_eq!(tokens[0].lexeme, "name");
    assert_eq!(tokens[1].token_type, TokenType::Identifier);
    assert_eq!(tokens[1].lexeme, "_id");
    assert_eq!(tokens[2].token_type, TokenType::Identifier);
    assert_eq!(tokens[2].lexeme, "identifier123");
}

#[test]
fn test_keywords() {
    let tokens = tokenize("and or xor implies in contains div mod is as").unwrap();
    let types: Vec<TokenType> = tokens.iter().map(|t| t.token_type).collect();
    assert_eq!(
        types,
        vec![
            TokenType::And,
            TokenType::Or,
            TokenType::Xor,
            TokenType::Implies,
            TokenType::In,
            TokenType::Contains,
            TokenType::Div,
            TokenType::Mod,
            TokenType::Is,
            TokenType::As,
            TokenType::Eof,
        ]
    );
}

#[test]
fn test_boolean_literals() {
    let tokens = tokenize("true false").unwrap();
    assert_eq!(tokens[0].token_type, TokenType::BooleanLiteral);
    assert_eq!(tokens[0].lexeme, "true");
    assert_eq!(tokens[1].token_type, TokenType::BooleanLiteral);
    assert_eq!(tokens[1].lexeme, "false");
}

#[test]
fn test_numbers() {
    let tokens = tokenize("42 3.14").unwrap();
    assert_eq!(tokens[0].token_type, TokenType::NumberLiteral);
    assert_eq!(tokens[0].lexeme, "42");
    assert_eq!(tokens[1].token_type, TokenType::NumberLiteral);
    assert_eq!(tokens[1].lexeme, "3.14");
}

#[test]
fn test_number_followed_by_method_call() {
    // the dot belongs to the invocation, not the number
    let tokens = tokenize("1.round()").unwrap();
    let types: Vec<TokenType> = tokens.iter().map(|t| t.token_type).collect();
    assert_eq!(
        types,
        vec![
            TokenType::NumberLiteral,
            TokenType::Dot,
            TokenType::Identifier,
            TokenType::LeftParen,
            TokenType::RightParen,
            TokenType::Eof,
        ]
    );
}

#[test]
fn test_string_literals_with_escapes() {
    let tokens = tokenize(r"'it\'s \\ \/ \f \n \r \t'").unwrap();
    assert_eq!(tokens[0].token_type, TokenType::StringLiteral);
    assert_eq!(tokens[0].lexeme, "it's \\ / \x0C \n \r \t");
}

#[test]
fn test_unicode_escape() {
    let tokens = tokenize(r"'\u0041\u00e9'").unwrap();
    assert_eq!(tokens[0].lexeme, "A\u{e9}");
}

#[test]
fn test_unterminated_string_fails() {
    assert!(matches!(
        tokenize("'unterminated"),
        Err(FhirPathError::ParseError { .. })
    ));
}

#[test]
fn test_invalid_escape_fails() {
    assert!(matches!(
        tokenize(r"'\q'"),
        Err(FhirPathError::ParseError { .. })
    ));
}

#[test]
fn test_delimited_identifier() {
    let tokens = tokenize("`div`").unwrap();
    assert_eq!(tokens[0].token_type, TokenType::DelimitedIdentifier);
    assert_eq!(tokens[0].lexeme, "div");
}

#[test]
fn test_operators() {
    let tokens = tokenize("= != ~ !~ < <= > >= + - * / & |").unwrap();
    let types: Vec<TokenType> = tokens.iter().map(|t| t.token_type).collect();
    assert_eq!(
        types,
        vec![
            TokenType::Equal,
            TokenType::NotEqual,
            TokenType::Equivalent,
            TokenType::NotEquivalent,
            TokenType::LessThan,
            TokenType::LessOrEqual,
            TokenType::GreaterThan,
            TokenType::GreaterOrEqual,
            TokenType::Plus,
            TokenType::Minus,
            TokenType::Multiply,
            TokenType::Divide,
            TokenType::Ampersand,
            TokenType::Pipe,
            TokenType::Eof,
        ]
    );
}

#[test]
fn test_date_literal() {
    let tokens = tokenize("@2015-02-04").unwrap();
    assert_eq!(tokens[0].token_type, TokenType::DateLiteral);
    assert_eq!(tokens[0].lexeme, "2015-02-04");

    let tokens = tokenize("@2015-02").unwrap();
    assert_eq!(tokens[0].token_type, TokenType::DateLiteral);
    assert_eq!(tokens[0].lexeme, "2015-02");

    let tokens = tokenize("@2015").unwrap();
    assert_eq!(tokens[0].token_type, TokenType::DateLiteral);
    assert_eq!(tokens[0].lexeme, "2015");
}

#[test]
fn test_datetime_literal() {
    let tokens = tokenize("@2015-02-04T14:34:28.123Z").unwrap();
    assert_eq!(tokens[0].token_type, TokenType::DateTimeLiteral);
    assert_eq!(tokens[0].lexeme, "2015-02-04T14:34:28.123Z");

    let tokens = tokenize("@2015-02-04T14:34:28+09:00").unwrap();
    assert_eq!(tokens[0].token_type, TokenType::DateTimeLiteral);
    assert_eq!(tokens[0].lexeme, "2015-02-04T14:34:28+09:00");
}

#[test]
fn test_time_literal() {
    let tokens = tokenize("@T14:34:28").unwrap();
    assert_eq!(tokens[0].token_type, TokenType::TimeLiteral);
    assert_eq!(tokens[0].lexeme, "14:34:28");
}

#[test]
fn test_variables() {
    let tokens = tokenize("$this $index $total").unwrap();
    assert_eq!(tokens[0].token_type, TokenType::Variable);
    assert_eq!(tokens[0].lexeme, "this");
    assert_eq!(tokens[1].lexeme, "index");
    assert_eq!(tokens[2].lexeme, "total");
}

#[test]
fn test_unknown_variable_fails() {
    assert!(tokenize("$nope").is_err());
}

#[test]
fn test_env_variables() {
    let tokens = tokenize("%context %'us-zip'").unwrap();
    assert_eq!(tokens[0].token_type, TokenType::EnvVariable);
    assert_eq!(tokens[0].lexeme, "context");
    assert_eq!(tokens[1].token_type, TokenType::EnvVariable);
    assert_eq!(tokens[1].lexeme, "us-zip");
}

#[test]
fn test_comments_are_skipped() {
    let tokens = tokenize("name // trailing comment\n.family").unwrap();
    let types: Vec<TokenType> = tokens.iter().map(|t| t.token_type).collect();
    assert_eq!(
        types,
        vec![
            TokenType::Identifier,
            TokenType::Dot,
            TokenType::Identifier,
            TokenType::Eof,
        ]
    );

    let tokens = tokenize("name /* block\ncomment */ .family").unwrap();
    assert_eq!(tokens.len(), 4);
}

#[test]
fn test_unterminated_block_comment_fails() {
    assert!(tokenize("name /* open").is_err());
}

#[test]
fn test_positions() {
    let tokens = tokenize("a = b").unwrap();
    assert_eq!(tokens[0].position, 0);
    assert_eq!(tokens[1].position, 2);
    assert_eq!(tokens[2].position, 4);
    assert_eq!(tokens[0].line, 1);
    assert_eq!(tokens[0].column, 1);
}
