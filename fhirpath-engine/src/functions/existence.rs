// Existence functions: empty, exists, all, the boolean collection
// tests, subset tests, count, distinct and isDistinct.

use super::{items, push_distinct};
use crate::context::EvaluationContext;
use crate::errors::FhirPathError;
use crate::evaluator::{boolean_collection, evaluate};
use crate::model::{normalize, Collection, FhirPathValue};
use crate::parser::AstNode;
use crate::registry::Builtin;
use std::collections::HashMap;

pub(super) fn register(map: &mut HashMap<&'static str, Builtin>) {
    map.insert("empty", Builtin::Eager { min_args: 0, max_args: 0, func: empty });
    map.insert("exists", Builtin::Lazy { min_args: 0, max_args: 1, func: exists });
    map.insert("all", Builtin::Lazy { min_args: 1, max_args: 1, func: all });
    map.insert("allTrue", Builtin::Eager { min_args: 0, max_args: 0, func: all_true });
    map.insert("anyTrue", Builtin::Eager { min_args: 0, max_args: 0, func: any_true });
    map.insert("allFalse", Builtin::Eager { min_args: 0, max_args: 0, func: all_false });
    map.insert("anyFalse", Builtin::Eager { min_args: 0, max_args: 0, func: any_false });
    map.insert("subsetOf", Builtin::Eager { min_args: 1, max_args: 1, func: subset_of });
    map.insert("supersetOf", Builtin::Eager { min_args: 1, max_args: 1, func: superset_of });
    map.insert("count", Builtin::Eager { min_args: 0, max_args: 0, func: count });
    map.insert("distinct", Builtin::Eager { min_args: 0, max_args: 0, func: distinct });
    map.insert("isDistinct", Builtin::Eager { min_args: 0, max_args: 0, func: is_distinct });
}

fn empty(
    _ctx: &EvaluationContext,
    input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    Ok(Collection::singleton(FhirPathValue::Boolean(
        input.is_empty(),
    )))
}

fn exists(
    ctx: &EvaluationContext,
    input: Collection,
    args: &[AstNode],
) -> Result<Collection, FhirPathError> {
    if args.is_empty() {
        return Ok(Collection::singleton(FhirPathValue::Boolean(
            !input.is_empty(),
        )));
    }
    for (index, item) in items(&input) {
        let ctx = ctx.with_index(index);
        if evaluate(&args[0], &item, &ctx)?.to_boolean()? == Some(true) {
            return Ok(Collection::singleton(FhirPathValue::Boolean(true)));
        }
    }
    Ok(Collection::singleton(FhirPathValue::Boolean(false)))
}

fn all(
    ctx: &EvaluationContext,
    input: Collection,
    args: &[AstNode],
) -> Result<Collection, FhirPathError> {
    for (index, item) in items(&input) {
        let ctx = ctx.with_index(index);
        if evaluate(&args[0], &item, &ctx)?.to_boolean()? != Some(true) {
            return Ok(Collection::singleton(FhirPathValue::Boolean(false)));
        }
    }
    Ok(Collection::singleton(FhirPathValue::Boolean(true)))
}

fn input_booleans(input: &Collection, function: &str) -> Result<Vec<bool>, FhirPathError> {
    input
        .iter()
        .map(|value| match normalize(value) {
            FhirPathValue::Boolean(b) => Ok(b),
            other => Err(FhirPathError::TypeMismatch(format!(
                "{}() expects Boolean items, got {}",
                function,
                other.type_name()
            ))),
        })
        .collect()
}

fn all_true(
    _ctx: &EvaluationContext,
    input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let booleans = input_booleans(&input, "allTrue")?;
    Ok(boolean_collection(Some(booleans.iter().all(|b| *b))))
}

fn any_true(
    _ctx: &EvaluationContext,
    input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let booleans = input_booleans(&input, "anyTrue")?;
    Ok(boolean_collection(Some(booleans.iter().any(|b| *b))))
}

fn all_false(
    _ctx: &EvaluationContext,
    input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let booleans = input_booleans(&input, "allFalse")?;
    Ok(boolean_collection(Some(booleans.iter().all(|b| !b))))
}

fn any_false(
    _ctx: &EvaluationContext,
    input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let booleans = input_booleans(&input, "anyFalse")?;
    Ok(boolean_collection(Some(booleans.iter().any(|b| !b))))
}

fn subset_of(
    _ctx: &EvaluationContext,
    input: Collection,
    args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let other = &args[0];
    let result = input.iter().all(|value| other.contains_value(value));
    Ok(Collection::singleton(FhirPathValue::Boolean(result)))
}

fn superset_of(
    _ctx: &EvaluationContext,
    input: Collection,
    args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let other = &args[0];
    let result = other.iter().all(|value| input.contains_value(value));
    Ok(Collection::singleton(FhirPathValue::Boolean(result)))
}

fn count(
    _ctx: &EvaluationContext,
    input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    Ok(Collection::singleton(FhirPathValue::Integer(
        i32::try_from(input.len()).map_err(|_| FhirPathError::Overflow("count"))?,
    )))
}

fn distinct(
    _ctx: &EvaluationContext,
    input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let mut result = Collection::new();
    for value in input {
        push_distinct(&mut result, value);
    }
    Ok(result)
}

fn is_distinct(
    _ctx: &EvaluationContext,
    input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let mut seen = Collection::new();
    for value in input.iter() {
        if !push_distinct(&mut seen, value.clone()) {
            return Ok(Collection::singleton(FhirPathValue::Boolean(false)));
        }
    }
    Ok(Collection::singleton(FhirPathValue::Boolean(true)))
}
