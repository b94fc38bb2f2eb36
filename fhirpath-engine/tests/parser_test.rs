// FHIRPath Parser Tests

use fhirpath_engine::errors::FhirPathError;
use fhirpath_engine::lexer::tokenize;
use fhirpath_engine::parser::{parse, AstNode, BinaryOperator, Literal, UnaryOperator};
use rust_decimal::Decimal;

fn parse_expr(source: &str) -> AstNode {
    let tokens = tokenize(source).unwrap();
    parse(&tokens).unwrap()
}

#[test]
fn test_identifier() {
    assert_eq!(parse_expr("name"), AstNode::Identifier("name".to_string()));
}

#[test]
fn test_path_navigation() {
    let ast = parse_expr("Patient.name.family");
    let AstNode::Path { parent, name } = ast else {
        panic!("expected path");
    };
    assert_eq!(name, "family");
    let AstNode::Path { parent, name } = *parent else {
        panic!("expected path");
    };
    assert_eq!(name, "name");
    assert_eq!(*parent, AstNode::Identifier("Patient".to_string()));
}

#[test]
fn test_literals() {
    assert_eq!(parse_expr("true"), AstNode::Literal(Literal::Boolean(true)));
    assert_eq!(parse_expr("42"), AstNode::Literal(Literal::Integer(42)));
    assert_eq!(
        parse_expr("3.14"),
        AstNode::Literal(Literal::Decimal("3.14".parse().unwrap()))
    );
    assert_eq!(
        parse_expr("'text'"),
        AstNode::Literal(Literal::String("text".to_string()))
    );
    assert_eq!(parse_expr("{}"), AstNode::Literal(Literal::Empty));
}

#[test]
fn test_quantity_literals() {
    assert_eq!(
        parse_expr("5 'mg'"),
        AstNode::Literal(Literal::Quantity(Decimal::from(5), "mg".to_string()))
    );
    assert_eq!(
        parse_expr("4 days"),
        AstNode::Literal(Literal::Quantity(Decimal::from(4), "days".to_string()))
    );
}

#[test]
fn test_multiplicative_binds_tighter_than_additive() {
    let ast = parse_expr("1 + 2 * 3");
    let AstNode::BinaryOp { op, left, right } = ast else {
        panic!("expected binary op");
    };
    assert_eq!(op, BinaryOperator::Addition);
    assert_eq!(*left, AstNode::Literal(Literal::Integer(1)));
    let AstNode::BinaryOp { op, .. } = *right else {
        panic!("expected binary op");
    };
    assert_eq!(op, BinaryOperator::Multiplication);
}

#[test]
fn test_parentheses_override_precedence() {
    let ast = parse_expr("(1 + 2) * 3");
    let AstNode::BinaryOp { op, left, .. } = ast else {
        panic!("expected binary op");
    };
    assert_eq!(op, BinaryOperator::Multiplication);
    assert!(matches!(
        *left,
        AstNode::BinaryOp {
            op: BinaryOperator::Addition,
            ..
        }
    ));
}

#[test]
fn test_comparison_binds_tighter_than_logical() {
    let ast = parse_expr("a < 1 and b > 2");
    let AstNode::BinaryOp { op, left, right } = ast else {
        panic!("expected binary op");
    };
    assert_eq!(op, BinaryOperator::And);
    assert!(matches!(
        *left,
        AstNode::BinaryOp {
            op: BinaryOperator::LessThan,
            ..
        }
    ));
    assert!(matches!(
        *right,
        AstNode::BinaryOp {
            op: BinaryOperator::GreaterThan,
            ..
        }
    ));
}

#[test]
fn test_implies_is_right_associative() {
    let ast = parse_expr("a implies b implies c");
    let AstNode::BinaryOp { op, left, right } = ast else {
        panic!("expected binary op");
    };
    assert_eq!(op, BinaryOperator::Implies);
    assert_eq!(*left, AstNode::Identifier("a".to_string()));
    assert!(matches!(
        *right,
        AstNode::BinaryOp {
            op: BinaryOperator::Implies,
            ..
        }
    ));
}

#[test]
fn test_and_is_left_associative() {
    let ast = parse_expr("a and b and c");
    let AstNode::BinaryOp { op, left, right } = ast else {
        panic!("expected binary op");
    };
    assert_eq!(op, BinaryOperator::And);
    assert!(matches!(
        *left,
        AstNode::BinaryOp {
            op: BinaryOperator::And,
            ..
        }
    ));
    assert_eq!(*right, AstNode::Identifier("c".to_string()));
}

#[test]
fn test_union_operator() {
    let ast = parse_expr("name.given | name.family");
    assert!(matches!(
        ast,
        AstNode::BinaryOp {
            op: BinaryOperator::Union,
            ..
        }
    ));
}

#[test]
fn test_membership_operators() {
    assert!(matches!(
        parse_expr("'a' in name.given"),
        AstNode::BinaryOp {
            op: BinaryOperator::In,
            ..
        }
    ));
    assert!(matches!(
        parse_expr("name.given contains 'a'"),
        AstNode::BinaryOp {
            op: BinaryOperator::Contains,
            ..
        }
    ));
}

#[test]
fn test_div_mod_concat() {
    assert!(matches!(
        parse_expr("7 div 2"),
        AstNode::BinaryOp {
            op: BinaryOperator::IntegerDivision,
            ..
        }
    ));
    assert!(matches!(
        parse_expr("7 mod 2"),
        AstNode::BinaryOp {
            op: BinaryOperator::Modulo,
            ..
        }
    ));
    assert!(matches!(
        parse_expr("'a' & 'b'"),
        AstNode::BinaryOp {
            op: BinaryOperator::Concatenate,
            ..
        }
    ));
}

#[test]
fn test_unary_minus() {
    let ast = parse_expr("-5");
    let AstNode::UnaryOp { op, operand } = ast else {
        panic!("expected unary op");
    };
    assert_eq!(op, UnaryOperator::Negate);
    assert_eq!(*operand, AstNode::Literal(Literal::Integer(5)));
}

#[test]
fn test_method_invocation() {
    let ast = parse_expr("name.given.first()");
    let AstNode::Invoke {
        parent,
        name,
        arguments,
    } = ast
    else {
        panic!("expected invoke");
    };
    assert_eq!(name, "first");
    assert!(arguments.is_empty());
    assert!(matches!(*parent, AstNode::Path { .. }));
}

#[test]
fn test_bare_invocation_gets_this_parent() {
    let ast = parse_expr("exists()");
    let AstNode::Invoke { parent, name, .. } = ast else {
        panic!("expected invoke");
    };
    assert_eq!(name, "exists");
    assert_eq!(*parent, AstNode::This);
}

#[test]
fn test_invocation_with_arguments() {
    let ast = parse_expr("telecom.where(system = 'phone')");
    let AstNode::Invoke {
        name, arguments, ..
    } = ast
    else {
        panic!("expected invoke");
    };
    assert_eq!(name, "where");
    assert_eq!(arguments.len(), 1);
    assert!(matches!(
        arguments[0],
        AstNode::BinaryOp {
            op: BinaryOperator::Equals,
            ..
        }
    ));
}

#[test]
fn test_keyword_as_member_name() {
    let ast = parse_expr("'abc'.contains('b')");
    let AstNode::Invoke { name, .. } = ast else {
        panic!("expected invoke");
    };
    assert_eq!(name, "contains");
}

#[test]
fn test_indexer() {
    let ast = parse_expr("name[0]");
    let AstNode::Index { parent, index } = ast else {
        panic!("expected indexer");
    };
    assert_eq!(*parent, AstNode::Identifier("name".to_string()));
    assert_eq!(*index, AstNode::Literal(Literal::Integer(0)));
}

#[test]
fn test_type_operators() {
    let ast = parse_expr("value is Quantity");
    let AstNode::TypeTest { type_spec, .. } = ast else {
        panic!("expected type test");
    };
    assert_eq!(type_spec.qualifier, None);
    assert_eq!(type_spec.name, "Quantity");

    let ast = parse_expr("value as FHIR.Period");
    let AstNode::TypeCast { type_spec, .. } = ast else {
        panic!("expected type cast");
    };
    assert_eq!(type_spec.qualifier.as_deref(), Some("FHIR"));
    assert_eq!(type_spec.name, "Period");
}

#[test]
fn test_variables_and_env_vars() {
    assert_eq!(parse_expr("$this"), AstNode::This);
    assert_eq!(parse_expr("$index"), AstNode::DollarIndex);
    assert_eq!(parse_expr("$total"), AstNode::DollarTotal);
    assert_eq!(
        parse_expr("%context"),
        AstNode::EnvVariable("context".to_string())
    );
}

#[test]
fn test_temporal_literals() {
    assert!(matches!(
        parse_expr("@2015-02-04"),
        AstNode::Literal(Literal::Date(_))
    ));
    assert!(matches!(
        parse_expr("@2015-02-04T14:34:28Z"),
        AstNode::Literal(Literal::DateTime(_))
    ));
    assert!(matches!(
        parse_expr("@T14:34:28"),
        AstNode::Literal(Literal::Time(_))
    ));
}

#[test]
fn test_parse_errors() {
    let bad = ["name.", "1 +", "(a", "name[0", "where(", "a ="];
    for source in bad {
        let result = tokenize(source).and_then(|tokens| parse(&tokens));
        assert!(
            matches!(result, Err(FhirPathError::ParseError { .. })),
            "expected parse error for '{}'",
            source
        );
    }
}

#[test]
fn test_trailing_tokens_are_rejected() {
    let tokens = tokenize("name name").unwrap();
    assert!(matches!(
        parse(&tokens),
        Err(FhirPathError::ParseError { .. })
    ));
}

#[test]
fn test_integer_literal_out_of_range() {
    let tokens = tokenize("2147483648").unwrap();
    assert!(matches!(
        parse(&tokens),
        Err(FhirPathError::ParseError { .. })
    ));
}
