// Combining: union (deduplicating) and combine (preserving duplicates).

use super::push_distinct;
use crate::context::EvaluationContext;
use crate::errors::FhirPathError;
use crate::model::Collection;
use crate::registry::Builtin;
use std::collections::HashMap;

pub(super) fn register(map: &mut HashMap<&'static str, Builtin>) {
    map.insert("union", Builtin::Eager { min_args: 1, max_args: 1, func: union });
    map.insert("combine", Builtin::Eager { min_args: 1, max_args: 1, func: combine });
}

fn union(
    _ctx: &EvaluationContext,
    input: Collection,
    args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let mut result = Collection::new();
    for value in input.into_iter().chain(args[0].clone()) {
        push_distinct(&mut result, value);
    }
    Ok(result)
}

fn combine(
    _ctx: &EvaluationContext,
    input: Collection,
    args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let mut result = input;
    result.extend(args[0].clone());
    Ok(result)
}
