// Math functions over the singleton numeric input. Results follow the
// FHIRPath conventions: sqrt/ln/log of out-of-domain inputs are empty,
// integer overflow is an error.

use super::arg_integer;
use crate::context::EvaluationContext;
use crate::errors::FhirPathError;
use crate::model::{as_decimal, normalize, Collection, FhirPathValue, Quantity};
use crate::registry::Builtin;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps};
use std::collections::HashMap;

pub(super) fn register(map: &mut HashMap<&'static str, Builtin>) {
    map.insert("abs", Builtin::Eager { min_args: 0, max_args: 0, func: abs });
    map.insert("ceiling", Builtin::Eager { min_args: 0, max_args: 0, func: ceiling });
    map.insert("exp", Builtin::Eager { min_args: 0, max_args: 0, func: exp });
    map.insert("floor", Builtin::Eager { min_args: 0, max_args: 0, func: floor });
    map.insert("ln", Builtin::Eager { min_args: 0, max_args: 0, func: ln });
    map.insert("log", Builtin::Eager { min_args: 1, max_args: 1, func: log });
    map.insert("power", Builtin::Eager { min_args: 1, max_args: 1, func: power });
    map.insert("round", Builtin::Eager { min_args: 0, max_args: 1, func: round });
    map.insert("sqrt", Builtin::Eager { min_args: 0, max_args: 0, func: sqrt });
    map.insert("truncate", Builtin::Eager { min_args: 0, max_args: 0, func: truncate });
}

fn decimal_result(value: Option<Decimal>) -> Collection {
    value
        .map(|d| Collection::singleton(FhirPathValue::Decimal(d)))
        .unwrap_or_default()
}

fn integer_result(value: Option<Decimal>, function: &'static str) -> Result<Collection, FhirPathError> {
    match value {
        None => Ok(Collection::new()),
        Some(d) => Ok(Collection::singleton(FhirPathValue::Integer(
            d.to_i32().ok_or(FhirPathError::Overflow(function))?,
        ))),
    }
}

fn abs(
    _ctx: &EvaluationContext,
    input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let Some(value) = input.as_singleton()? else {
        return Ok(Collection::new());
    };
    let result = match normalize(value) {
        FhirPathValue::Integer(i) => {
            FhirPathValue::Integer(i.checked_abs().ok_or(FhirPathError::Overflow("abs"))?)
        }
        FhirPathValue::Decimal(d) => FhirPathValue::Decimal(d.abs()),
        FhirPathValue::Quantity(q) => {
            FhirPathValue::Quantity(Quantity::new(q.value.abs(), &q.unit))
        }
        other => {
            return Err(FhirPathError::TypeMismatch(format!(
                "abs() expects a number, got {}",
                other.type_name()
            )))
        }
    };
    Ok(Collection::singleton(result))
}

fn ceiling(
    _ctx: &EvaluationContext,
    input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let Some(value) = input.as_singleton()? else {
        return Ok(Collection::new());
    };
    integer_result(Some(as_decimal(value)?.ceil()), "ceiling")
}

fn floor(
    _ctx: &EvaluationContext,
    input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let Some(value) = input.as_singleton()? else {
        return Ok(Collection::new());
    };
    integer_result(Some(as_decimal(value)?.floor()), "floor")
}

fn exp(
    _ctx: &EvaluationContext,
    input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let Some(value) = input.as_singleton()? else {
        return Ok(Collection::new());
    };
    Ok(decimal_result(as_decimal(value)?.checked_exp()))
}

fn ln(
    _ctx: &EvaluationContext,
    input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let Some(value) = input.as_singleton()? else {
        return Ok(Collection::new());
    };
    Ok(decimal_result(as_decimal(value)?.checked_ln()))
}

fn log(
    _ctx: &EvaluationContext,
    input: Collection,
    args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let Some(value) = input.as_singleton()? else {
        return Ok(Collection::new());
    };
    let Some(base) = args[0].as_singleton()? else {
        return Ok(Collection::new());
    };
    let value = as_decimal(value)?;
    let base = as_decimal(base)?;
    let result = match (value.checked_ln(), base.checked_ln()) {
        (Some(numerator), Some(denominator)) if !denominator.is_zero() => {
            Some(numerator / denominator)
        }
        _ => None,
    };
    Ok(decimal_result(result))
}

fn power(
    _ctx: &EvaluationContext,
    input: Collection,
    args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let Some(base) = input.as_singleton()? else {
        return Ok(Collection::new());
    };
    let Some(exponent) = args[0].as_singleton()? else {
        return Ok(Collection::new());
    };

    // integer base with non-negative integer exponent stays an integer
    if let (FhirPathValue::Integer(b), FhirPathValue::Integer(e)) =
        (normalize(base), normalize(exponent))
    {
        if e >= 0 {
            let result = b
                .checked_pow(u32::try_from(e).map_err(|_| FhirPathError::Overflow("power"))?)
                .ok_or(FhirPathError::Overflow("power"))?;
            return Ok(Collection::singleton(FhirPathValue::Integer(result)));
        }
    }

    let base = as_decimal(base)?;
    let exponent = as_decimal(exponent)?;
    Ok(decimal_result(base.checked_powd(exponent)))
}

fn round(
    _ctx: &EvaluationContext,
    input: Collection,
    args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let Some(value) = input.as_singleton()? else {
        return Ok(Collection::new());
    };
    let precision = match args.first() {
        Some(arg) => {
            let p = arg_integer(arg, "round")?;
            u32::try_from(p).map_err(|_| {
                FhirPathError::TypeMismatch("round() precision must be non-negative".to_string())
            })?
        }
        None => 0,
    };
    Ok(Collection::singleton(FhirPathValue::Decimal(
        as_decimal(value)?.round_dp(precision),
    )))
}

fn sqrt(
    _ctx: &EvaluationContext,
    input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let Some(value) = input.as_singleton()? else {
        return Ok(Collection::new());
    };
    Ok(decimal_result(as_decimal(value)?.sqrt()))
}

fn truncate(
    _ctx: &EvaluationContext,
    input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let Some(value) = input.as_singleton()? else {
        return Ok(Collection::new());
    };
    integer_result(Some(as_decimal(value)?.trunc()), "truncate")
}
