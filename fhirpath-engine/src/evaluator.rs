// FHIRPath Evaluator
//
// Walks an AST against an input collection and a context. Every result
// is a collection; an empty collection is the FHIRPath empty value and
// is not an error.

use crate::context::EvaluationContext;
use crate::errors::FhirPathError;
use crate::model::{self, Collection, FhirPathValue, Quantity};
use crate::navigator;
use crate::parser::{AstNode, BinaryOperator, Literal, TypeSpecifier, UnaryOperator};
use crate::registry;
use crate::schema;
use std::cmp::Ordering;

/// Wraps a three-valued boolean: unknown is the empty collection.
pub(crate) fn boolean_collection(value: Option<bool>) -> Collection {
    match value {
        Some(b) => Collection::singleton(FhirPathValue::Boolean(b)),
        None => Collection::new(),
    }
}

/// Evaluates an AST node against an input collection.
pub fn evaluate(
    node: &AstNode,
    input: &Collection,
    ctx: &EvaluationContext,
) -> Result<Collection, FhirPathError> {
    match node {
        AstNode::Literal(literal) => Ok(literal_collection(literal)),

        AstNode::This => Ok(input.clone()),

        AstNode::DollarIndex => Ok(ctx
            .index
            .map(|i| Collection::singleton(FhirPathValue::Integer(i)))
            .unwrap_or_default()),

        AstNode::DollarTotal => Ok(ctx.total.clone().unwrap_or_default()),

        AstNode::EnvVariable(name) => ctx.env_var(name),

        AstNode::Identifier(name) => resolve_name(input, name),

        AstNode::Path { parent, name } => {
            let parent = evaluate(parent, input, ctx)?;
            resolve_name(&parent, name)
        }

        AstNode::Index { parent, index } => {
            let collection = evaluate(parent, input, ctx)?;
            let index = evaluate(index, input, ctx)?;
            let Some(index) = index.as_singleton()? else {
                return Ok(Collection::new());
            };
            let index = match model::normalize(index) {
                FhirPathValue::Integer(i) => i,
                other => {
                    return Err(FhirPathError::TypeMismatch(format!(
                        "indexer expects an Integer, got {}",
                        other.type_name()
                    )))
                }
            };
            if index < 0 {
                return Ok(Collection::new());
            }
            Ok(collection
                .get(index as usize)
                .cloned()
                .map(Collection::singleton)
                .unwrap_or_default())
        }

        AstNode::Invoke {
            parent,
            name,
            arguments,
        } => {
            let function_input = evaluate(parent, input, ctx)?;
            // eager arguments see the scope's $this, not the piped input
            registry::dispatch(ctx, name, function_input, arguments, input)
        }

        AstNode::BinaryOp { op, left, right } => {
            let left = evaluate(left, input, ctx)?;
            let right = evaluate(right, input, ctx)?;
            binary_op(*op, left, right)
        }

        AstNode::UnaryOp { op, operand } => {
            let operand = evaluate(operand, input, ctx)?;
            unary_op(*op, operand)
        }

        AstNode::TypeTest { operand, type_spec } => {
            let operand = evaluate(operand, input, ctx)?;
            match operand.as_singleton()? {
                None => Ok(Collection::new()),
                Some(value) => Ok(Collection::singleton(FhirPathValue::Boolean(
                    value_matches_type(value, type_spec),
                ))),
            }
        }

        AstNode::TypeCast { operand, type_spec } => {
            let operand = evaluate(operand, input, ctx)?;
            match operand.as_singleton()? {
                None => Ok(Collection::new()),
                Some(value) if value_matches_type(value, type_spec) => {
                    Ok(Collection::singleton(value.clone()))
                }
                Some(_) => Ok(Collection::new()),
            }
        }
    }
}

fn literal_collection(literal: &Literal) -> Collection {
    match literal {
        Literal::Empty => Collection::new(),
        Literal::Boolean(b) => Collection::singleton(FhirPathValue::Boolean(*b)),
        Literal::Integer(i) => Collection::singleton(FhirPathValue::Integer(*i)),
        Literal::Decimal(d) => Collection::singleton(FhirPathValue::Decimal(*d)),
        Literal::String(s) => Collection::singleton(FhirPathValue::String(s.clone())),
        Literal::Date(d) => Collection::singleton(FhirPathValue::Date(*d)),
        Literal::DateTime(d) => Collection::singleton(FhirPathValue::DateTime(*d)),
        Literal::Time(t) => Collection::singleton(FhirPathValue::Time(*t)),
        Literal::Quantity(value, unit) => {
            Collection::singleton(FhirPathValue::Quantity(Quantity::new(*value, unit)))
        }
    }
}

/// Resolves a bare name: an uppercase name matching a known resource
/// type filters by type; anything else is a schema field read on each
/// element of the input.
fn resolve_name(input: &Collection, name: &str) -> Result<Collection, FhirPathError> {
    let is_type_filter = name
        .chars()
        .next()
        .map(char::is_uppercase)
        .unwrap_or(false)
        && schema::is_resource_type(name);

    if is_type_filter {
        return Ok(input
            .iter()
            .filter(|value| {
                matches!(value, FhirPathValue::Element(element) if element.type_name() == name)
            })
            .cloned()
            .collect());
    }

    let mut result = Collection::new();
    for value in input {
        if let FhirPathValue::Element(element) = value {
            for child in navigator::read(element, name)? {
                result.push(child);
            }
        }
    }
    Ok(result)
}

fn binary_op(
    op: BinaryOperator,
    left: Collection,
    right: Collection,
) -> Result<Collection, FhirPathError> {
    use BinaryOperator::*;

    match op {
        And => Ok(boolean_collection(model::and3(
            left.to_boolean()?,
            right.to_boolean()?,
        ))),
        Or => Ok(boolean_collection(model::or3(
            left.to_boolean()?,
            right.to_boolean()?,
        ))),
        Xor => Ok(boolean_collection(model::xor3(
            left.to_boolean()?,
            right.to_boolean()?,
        ))),
        Implies => Ok(boolean_collection(model::implies3(
            left.to_boolean()?,
            right.to_boolean()?,
        ))),

        Equals => Ok(boolean_collection(left.equals(&right))),
        NotEquals => Ok(boolean_collection(model::not3(left.equals(&right)))),
        Equivalent => Ok(Collection::singleton(FhirPathValue::Boolean(
            left.equivalent(&right),
        ))),
        NotEquivalent => Ok(Collection::singleton(FhirPathValue::Boolean(
            !left.equivalent(&right),
        ))),

        LessThan | LessOrEqual | GreaterThan | GreaterOrEqual => {
            let (Some(l), Some(r)) = (left.as_singleton()?, right.as_singleton()?) else {
                return Ok(Collection::new());
            };
            let ordering = model::compare(l, r)?;
            Ok(boolean_collection(ordering.map(|ordering| match op {
                LessThan => ordering == Ordering::Less,
                LessOrEqual => ordering != Ordering::Greater,
                GreaterThan => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })))
        }

        Union => {
            let mut distinct = Collection::new();
            for value in left.into_iter().chain(right) {
                if !distinct.contains_value(&value) {
                    distinct.push(value);
                }
            }
            Ok(distinct)
        }

        In => {
            let Some(needle) = left.as_singleton()? else {
                return Ok(Collection::new());
            };
            Ok(Collection::singleton(FhirPathValue::Boolean(
                right.contains_value(needle),
            )))
        }
        Contains => {
            let Some(needle) = right.as_singleton()? else {
                return Ok(Collection::new());
            };
            Ok(Collection::singleton(FhirPathValue::Boolean(
                left.contains_value(needle),
            )))
        }

        Concatenate => {
            let left = string_operand(&left)?;
            let right = string_operand(&right)?;
            Ok(Collection::singleton(model::concat(
                left.as_deref(),
                right.as_deref(),
            )))
        }

        Addition | Subtraction | Multiplication | Division | IntegerDivision | Modulo => {
            let (Some(l), Some(r)) = (left.as_singleton()?, right.as_singleton()?) else {
                return Ok(Collection::new());
            };
            let result = match op {
                Addition => model::add(l, r)?,
                Subtraction => model::subtract(l, r)?,
                Multiplication => model::multiply(l, r)?,
                Division => model::divide(l, r)?,
                IntegerDivision => model::integer_divide(l, r)?,
                _ => model::modulo(l, r)?,
            };
            Ok(result.map(Collection::singleton).unwrap_or_default())
        }
    }
}

/// Coerces a `&` operand: empty reads as absent, a singleton must be a
/// string.
fn string_operand(collection: &Collection) -> Result<Option<String>, FhirPathError> {
    match collection.as_singleton()? {
        None => Ok(None),
        Some(value) => match model::normalize(value) {
            FhirPathValue::String(s) => Ok(Some(s)),
            other => Err(FhirPathError::TypeMismatch(format!(
                "'&' expects String operands, got {}",
                other.type_name()
            ))),
        },
    }
}

fn unary_op(op: UnaryOperator, operand: Collection) -> Result<Collection, FhirPathError> {
    match op {
        UnaryOperator::Not => Ok(boolean_collection(model::not3(operand.to_boolean()?))),
        UnaryOperator::Plus | UnaryOperator::Negate => {
            let Some(value) = operand.as_singleton()? else {
                return Ok(Collection::new());
            };
            let negate = op == UnaryOperator::Negate;
            let result = match model::normalize(value) {
                FhirPathValue::Integer(i) => FhirPathValue::Integer(if negate {
                    i.checked_neg().ok_or(FhirPathError::Overflow("-"))?
                } else {
                    i
                }),
                FhirPathValue::Decimal(d) => {
                    FhirPathValue::Decimal(if negate { -d } else { d })
                }
                FhirPathValue::Quantity(q) => FhirPathValue::Quantity(if negate {
                    Quantity::new(-q.value, &q.unit)
                } else {
                    q
                }),
                other => {
                    return Err(FhirPathError::TypeMismatch(format!(
                        "unary '{}' expects a number, got {}",
                        if negate { "-" } else { "+" },
                        other.type_name()
                    )))
                }
            };
            Ok(Collection::singleton(result))
        }
    }
}

/// FHIR primitive types read as their system counterparts for unqualified
/// type tests.
fn system_equivalent(fhir_type: &str) -> Option<&'static str> {
    let system = match fhir_type {
        "boolean" => "Boolean",
        "integer" | "positiveInt" | "unsignedInt" => "Integer",
        "decimal" => "Decimal",
        "date" => "Date",
        "dateTime" | "instant" => "DateTime",
        "time" => "Time",
        t if schema::is_primitive_type(t) => "String",
        _ => return None,
    };
    Some(system)
}

/// Type test used by `is`, `as`, `ofType()`: qualified names pin the
/// namespace, unqualified names match either.
pub(crate) fn value_matches_type(value: &FhirPathValue, spec: &TypeSpecifier) -> bool {
    match spec.qualifier.as_deref() {
        Some("System") => value.is_system() && value.type_name() == spec.name,
        Some("FHIR") => {
            matches!(value, FhirPathValue::Element(element) if element.type_name() == spec.name)
        }
        _ => match value {
            FhirPathValue::Element(element) => {
                let type_name = element.type_name();
                type_name == spec.name
                    || system_equivalent(&type_name)
                        .is_some_and(|system| system == spec.name)
            }
            system => system.type_name() == spec.name,
        },
    }
}
