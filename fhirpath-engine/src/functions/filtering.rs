// Filtering and projection: where, select, repeat, ofType.

use super::{items, push_distinct, type_spec_argument};
use crate::context::EvaluationContext;
use crate::errors::FhirPathError;
use crate::evaluator::{evaluate, value_matches_type};
use crate::model::Collection;
use crate::parser::AstNode;
use crate::registry::Builtin;
use std::collections::HashMap;

pub(super) fn register(map: &mut HashMap<&'static str, Builtin>) {
    map.insert("where", Builtin::Lazy { min_args: 1, max_args: 1, func: where_fn });
    map.insert("select", Builtin::Lazy { min_args: 1, max_args: 1, func: select });
    map.insert("repeat", Builtin::Lazy { min_args: 1, max_args: 1, func: repeat });
    map.insert("ofType", Builtin::Lazy { min_args: 1, max_args: 1, func: of_type });
}

fn where_fn(
    ctx: &EvaluationContext,
    input: Collection,
    args: &[AstNode],
) -> Result<Collection, FhirPathError> {
    let mut result = Collection::new();
    for (index, item) in items(&input) {
        let ctx = ctx.with_index(index);
        if evaluate(&args[0], &item, &ctx)?.to_boolean()? == Some(true) {
            result.extend(item);
        }
    }
    Ok(result)
}

fn select(
    ctx: &EvaluationContext,
    input: Collection,
    args: &[AstNode],
) -> Result<Collection, FhirPathError> {
    let mut result = Collection::new();
    for (index, item) in items(&input) {
        let ctx = ctx.with_index(index);
        result.extend(evaluate(&args[0], &item, &ctx)?);
    }
    Ok(result)
}

/// Transitive closure of the projection: keeps applying the expression
/// to newly produced items until nothing new appears.
fn repeat(
    ctx: &EvaluationContext,
    input: Collection,
    args: &[AstNode],
) -> Result<Collection, FhirPathError> {
    let mut result = Collection::new();
    let mut frontier = input;

    while !frontier.is_empty() {
        let mut next = Collection::new();
        for (index, item) in items(&frontier) {
            let ctx = ctx.with_index(index);
            for value in evaluate(&args[0], &item, &ctx)? {
                if push_distinct(&mut result, value.clone()) {
                    next.push(value);
                }
            }
        }
        frontier = next;
    }

    Ok(result)
}

fn of_type(
    _ctx: &EvaluationContext,
    input: Collection,
    args: &[AstNode],
) -> Result<Collection, FhirPathError> {
    let spec = type_spec_argument(&args[0])?;
    Ok(input
        .into_iter()
        .filter(|value| value_matches_type(value, &spec))
        .collect())
}
