// Utility functions: trace, the clock functions, not, aggregate and the
// function forms of the type operators.

use super::{items, type_spec_argument};
use crate::context::EvaluationContext;
use crate::datetime::{DateTimePrecision, PrecisionDate, PrecisionDateTime, PrecisionTime};
use crate::datetime::{DatePrecision, TimePrecision};
use crate::errors::FhirPathError;
use crate::evaluator::{boolean_collection, evaluate, value_matches_type};
use crate::model::{not3, Collection, FhirPathValue};
use crate::parser::AstNode;
use crate::registry::Builtin;
use chrono::Timelike;
use std::collections::HashMap;

pub(super) fn register(map: &mut HashMap<&'static str, Builtin>) {
    map.insert("trace", Builtin::Lazy { min_args: 1, max_args: 2, func: trace });
    map.insert("now", Builtin::Eager { min_args: 0, max_args: 0, func: now });
    map.insert("today", Builtin::Eager { min_args: 0, max_args: 0, func: today });
    map.insert("timeOfDay", Builtin::Eager { min_args: 0, max_args: 0, func: time_of_day });
    map.insert("not", Builtin::Eager { min_args: 0, max_args: 0, func: not });
    map.insert("aggregate", Builtin::Lazy { min_args: 1, max_args: 2, func: aggregate });
    map.insert("is", Builtin::Lazy { min_args: 1, max_args: 1, func: is_fn });
    map.insert("as", Builtin::Lazy { min_args: 1, max_args: 1, func: as_fn });
}

/// trace(name[, projection]): emits to the observer, returns the input
/// unchanged.
fn trace(
    ctx: &EvaluationContext,
    input: Collection,
    args: &[AstNode],
) -> Result<Collection, FhirPathError> {
    let name = match evaluate(&args[0], &input, ctx)?.as_singleton()? {
        Some(FhirPathValue::String(s)) => s.clone(),
        _ => {
            return Err(FhirPathError::TypeMismatch(
                "trace() expects a String name".to_string(),
            ))
        }
    };
    match args.get(1) {
        Some(projection) => {
            let projected = evaluate(projection, &input, ctx)?;
            ctx.trace(&name, &projected);
        }
        None => ctx.trace(&name, &input),
    }
    Ok(input)
}

fn now(
    ctx: &EvaluationContext,
    _input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    Ok(Collection::singleton(FhirPathValue::DateTime(
        PrecisionDateTime::new(ctx.now, DateTimePrecision::Millisecond),
    )))
}

fn today(
    ctx: &EvaluationContext,
    _input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    Ok(Collection::singleton(FhirPathValue::Date(
        PrecisionDate::new(ctx.now.date_naive(), DatePrecision::Day),
    )))
}

fn time_of_day(
    ctx: &EvaluationContext,
    _input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let time = ctx.now.time();
    let truncated = chrono::NaiveTime::from_hms_milli_opt(
        time.hour(),
        time.minute(),
        time.second(),
        time.nanosecond() / 1_000_000,
    )
    .unwrap_or(time);
    Ok(Collection::singleton(FhirPathValue::Time(
        PrecisionTime::new(truncated, TimePrecision::Millisecond),
    )))
}

fn not(
    _ctx: &EvaluationContext,
    input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    Ok(boolean_collection(not3(input.to_boolean()?)))
}

/// aggregate(aggregator[, init]): folds the input, exposing the running
/// value as $total and the position as $index.
fn aggregate(
    ctx: &EvaluationContext,
    input: Collection,
    args: &[AstNode],
) -> Result<Collection, FhirPathError> {
    let mut total = match args.get(1) {
        Some(init) => evaluate(init, &input, ctx)?,
        None => Collection::new(),
    };
    for (index, item) in items(&input) {
        let ctx = ctx.with_index(index).with_total(total.clone());
        total = evaluate(&args[0], &item, &ctx)?;
    }
    Ok(total)
}

fn is_fn(
    _ctx: &EvaluationContext,
    input: Collection,
    args: &[AstNode],
) -> Result<Collection, FhirPathError> {
    let spec = type_spec_argument(&args[0])?;
    match input.as_singleton()? {
        None => Ok(Collection::new()),
        Some(value) => Ok(Collection::singleton(FhirPathValue::Boolean(
            value_matches_type(value, &spec),
        ))),
    }
}

fn as_fn(
    _ctx: &EvaluationContext,
    input: Collection,
    args: &[AstNode],
) -> Result<Collection, FhirPathError> {
    let spec = type_spec_argument(&args[0])?;
    match input.as_singleton()? {
        None => Ok(Collection::new()),
        Some(value) if value_matches_type(value, &spec) => {
            Ok(Collection::singleton(value.clone()))
        }
        Some(_) => Ok(Collection::new()),
    }
}
