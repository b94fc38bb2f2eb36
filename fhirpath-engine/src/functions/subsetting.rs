// Subsetting: single, first, last, tail, skip, take, intersect, exclude.

use super::{arg_integer, push_distinct};
use crate::context::EvaluationContext;
use crate::errors::FhirPathError;
use crate::model::Collection;
use crate::registry::Builtin;
use std::collections::HashMap;

pub(super) fn register(map: &mut HashMap<&'static str, Builtin>) {
    map.insert("single", Builtin::Eager { min_args: 0, max_args: 0, func: single });
    map.insert("first", Builtin::Eager { min_args: 0, max_args: 0, func: first });
    map.insert("last", Builtin::Eager { min_args: 0, max_args: 0, func: last });
    map.insert("tail", Builtin::Eager { min_args: 0, max_args: 0, func: tail });
    map.insert("skip", Builtin::Eager { min_args: 1, max_args: 1, func: skip });
    map.insert("take", Builtin::Eager { min_args: 1, max_args: 1, func: take });
    map.insert("intersect", Builtin::Eager { min_args: 1, max_args: 1, func: intersect });
    map.insert("exclude", Builtin::Eager { min_args: 1, max_args: 1, func: exclude });
}

fn single(
    _ctx: &EvaluationContext,
    input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    match input.len() {
        0 | 1 => Ok(input),
        n => Err(FhirPathError::NotSingleton(n)),
    }
}

fn first(
    _ctx: &EvaluationContext,
    input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    Ok(input.into_iter().take(1).collect())
}

fn last(
    _ctx: &EvaluationContext,
    input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    Ok(input.into_vec().pop().into_iter().collect())
}

fn tail(
    _ctx: &EvaluationContext,
    input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    Ok(input.into_iter().skip(1).collect())
}

fn skip(
    _ctx: &EvaluationContext,
    input: Collection,
    args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let count = arg_integer(&args[0], "skip")?.max(0) as usize;
    Ok(input.into_iter().skip(count).collect())
}

fn take(
    _ctx: &EvaluationContext,
    input: Collection,
    args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let count = arg_integer(&args[0], "take")?.max(0) as usize;
    Ok(input.into_iter().take(count).collect())
}

fn intersect(
    _ctx: &EvaluationContext,
    input: Collection,
    args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let other = &args[0];
    let mut result = Collection::new();
    for value in input {
        if other.contains_value(&value) {
            push_distinct(&mut result, value);
        }
    }
    Ok(result)
}

fn exclude(
    _ctx: &EvaluationContext,
    input: Collection,
    args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let other = &args[0];
    Ok(input
        .into_iter()
        .filter(|value| !other.contains_value(value))
        .collect())
}
