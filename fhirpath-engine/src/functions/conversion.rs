// Conversion functions: iif plus the to*/convertsTo* pairs from the
// FHIRPath conversion table.

use super::arg_string;
use crate::context::EvaluationContext;
use crate::datetime::{PrecisionDate, PrecisionDateTime, PrecisionTime};
use crate::errors::FhirPathError;
use crate::evaluator::evaluate;
use crate::model::{normalize, Collection, FhirPathValue, Quantity};
use crate::parser::AstNode;
use crate::registry::Builtin;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

pub(super) fn register(map: &mut HashMap<&'static str, Builtin>) {
    map.insert("iif", Builtin::Lazy { min_args: 2, max_args: 3, func: iif });

    map.insert("toBoolean", Builtin::Eager { min_args: 0, max_args: 0, func: to_boolean });
    map.insert("convertsToBoolean", Builtin::Eager { min_args: 0, max_args: 0, func: converts_to_boolean });
    map.insert("toInteger", Builtin::Eager { min_args: 0, max_args: 0, func: to_integer });
    map.insert("convertsToInteger", Builtin::Eager { min_args: 0, max_args: 0, func: converts_to_integer });
    map.insert("toDecimal", Builtin::Eager { min_args: 0, max_args: 0, func: to_decimal });
    map.insert("convertsToDecimal", Builtin::Eager { min_args: 0, max_args: 0, func: converts_to_decimal });
    map.insert("toString", Builtin::Eager { min_args: 0, max_args: 0, func: to_string });
    map.insert("convertsToString", Builtin::Eager { min_args: 0, max_args: 0, func: converts_to_string });
    map.insert("toDate", Builtin::Eager { min_args: 0, max_args: 0, func: to_date });
    map.insert("convertsToDate", Builtin::Eager { min_args: 0, max_args: 0, func: converts_to_date });
    map.insert("toDateTime", Builtin::Eager { min_args: 0, max_args: 0, func: to_date_time });
    map.insert("convertsToDateTime", Builtin::Eager { min_args: 0, max_args: 0, func: converts_to_date_time });
    map.insert("toTime", Builtin::Eager { min_args: 0, max_args: 0, func: to_time });
    map.insert("convertsToTime", Builtin::Eager { min_args: 0, max_args: 0, func: converts_to_time });
    map.insert("toQuantity", Builtin::Eager { min_args: 0, max_args: 1, func: to_quantity });
    map.insert("convertsToQuantity", Builtin::Eager { min_args: 0, max_args: 1, func: converts_to_quantity });
}

/// iif(criterion, true-result[, otherwise]): only the selected branch is
/// evaluated.
fn iif(
    ctx: &EvaluationContext,
    input: Collection,
    args: &[AstNode],
) -> Result<Collection, FhirPathError> {
    let criterion = evaluate(&args[0], &input, ctx)?.to_boolean()?;
    if criterion == Some(true) {
        evaluate(&args[1], &input, ctx)
    } else if let Some(otherwise) = args.get(2) {
        evaluate(otherwise, &input, ctx)
    } else {
        Ok(Collection::new())
    }
}

type Converter = fn(&FhirPathValue) -> Option<FhirPathValue>;

/// Applies a conversion to the singleton input; empty propagates.
fn convert_input(
    input: &Collection,
    converter: Converter,
) -> Result<Collection, FhirPathError> {
    match input.as_singleton()? {
        None => Ok(Collection::new()),
        Some(value) => Ok(converter(&normalize(value))
            .map(Collection::singleton)
            .unwrap_or_default()),
    }
}

/// The convertsTo* counterpart: true/false for a singleton, empty for an
/// empty input.
fn converts_input(
    input: &Collection,
    converter: Converter,
) -> Result<Collection, FhirPathError> {
    match input.as_singleton()? {
        None => Ok(Collection::new()),
        Some(value) => Ok(Collection::singleton(FhirPathValue::Boolean(
            converter(&normalize(value)).is_some(),
        ))),
    }
}

fn boolean_converter(value: &FhirPathValue) -> Option<FhirPathValue> {
    let result = match value {
        FhirPathValue::Boolean(b) => *b,
        FhirPathValue::Integer(1) => true,
        FhirPathValue::Integer(0) => false,
        FhirPathValue::Decimal(d) if *d == Decimal::ONE => true,
        FhirPathValue::Decimal(d) if d.is_zero() => false,
        FhirPathValue::String(s) => match s.to_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" | "1.0" => true,
            "false" | "f" | "no" | "n" | "0" | "0.0" => false,
            _ => return None,
        },
        _ => return None,
    };
    Some(FhirPathValue::Boolean(result))
}

fn integer_converter(value: &FhirPathValue) -> Option<FhirPathValue> {
    let result = match value {
        FhirPathValue::Integer(i) => *i,
        FhirPathValue::Boolean(b) => *b as i32,
        FhirPathValue::String(s) => s.parse::<i32>().ok()?,
        _ => return None,
    };
    Some(FhirPathValue::Integer(result))
}

fn decimal_converter(value: &FhirPathValue) -> Option<FhirPathValue> {
    let result = match value {
        FhirPathValue::Decimal(d) => *d,
        FhirPathValue::Integer(i) => Decimal::from(*i),
        FhirPathValue::Boolean(b) => Decimal::from(*b as i32),
        FhirPathValue::String(s) => Decimal::from_str(s).ok()?,
        _ => return None,
    };
    Some(FhirPathValue::Decimal(result))
}

fn string_converter(value: &FhirPathValue) -> Option<FhirPathValue> {
    match value {
        FhirPathValue::Element(_) => None,
        other => Some(FhirPathValue::String(other.to_string())),
    }
}

fn date_converter(value: &FhirPathValue) -> Option<FhirPathValue> {
    let result = match value {
        FhirPathValue::Date(d) => *d,
        FhirPathValue::DateTime(d) => d.to_date(),
        FhirPathValue::String(s) => PrecisionDate::parse(s).ok()?,
        _ => return None,
    };
    Some(FhirPathValue::Date(result))
}

fn date_time_converter(value: &FhirPathValue) -> Option<FhirPathValue> {
    let result = match value {
        FhirPathValue::DateTime(d) => *d,
        FhirPathValue::Date(d) => d.to_datetime(),
        FhirPathValue::String(s) => PrecisionDateTime::parse(s)
            .ok()
            .or_else(|| PrecisionDate::parse(s).ok().map(PrecisionDate::to_datetime))?,
        _ => return None,
    };
    Some(FhirPathValue::DateTime(result))
}

fn time_converter(value: &FhirPathValue) -> Option<FhirPathValue> {
    let result = match value {
        FhirPathValue::Time(t) => *t,
        FhirPathValue::String(s) => PrecisionTime::parse(s).ok()?,
        _ => return None,
    };
    Some(FhirPathValue::Time(result))
}

fn quantity_converter(value: &FhirPathValue) -> Option<FhirPathValue> {
    let result = match value {
        FhirPathValue::Quantity(q) => q.clone(),
        FhirPathValue::Integer(i) => Quantity::new(Decimal::from(*i), "1"),
        FhirPathValue::Decimal(d) => Quantity::new(*d, "1"),
        FhirPathValue::Boolean(b) => Quantity::new(Decimal::from(*b as i32), "1"),
        FhirPathValue::String(s) => parse_quantity(s)?,
        _ => return None,
    };
    Some(FhirPathValue::Quantity(result))
}

/// Parses `5`, `5.5`, `5 'mg'` and `4 days`.
fn parse_quantity(text: &str) -> Option<Quantity> {
    let text = text.trim();
    let (number, unit) = match text.split_once(char::is_whitespace) {
        None => (text, None),
        Some((number, unit)) => (number, Some(unit.trim())),
    };
    let value = Decimal::from_str(number).ok()?;
    let unit = match unit {
        None => "1".to_string(),
        Some(quoted) if quoted.starts_with('\'') && quoted.ends_with('\'') && quoted.len() >= 2 => {
            quoted[1..quoted.len() - 1].to_string()
        }
        Some(word) => {
            crate::datetime::CalendarUnit::parse(word)?;
            word.to_string()
        }
    };
    Some(Quantity::new(value, &unit))
}

fn to_boolean(_ctx: &EvaluationContext, input: Collection, _args: &[Collection]) -> Result<Collection, FhirPathError> {
    convert_input(&input, boolean_converter)
}

fn converts_to_boolean(_ctx: &EvaluationContext, input: Collection, _args: &[Collection]) -> Result<Collection, FhirPathError> {
    converts_input(&input, boolean_converter)
}

fn to_integer(_ctx: &EvaluationContext, input: Collection, _args: &[Collection]) -> Result<Collection, FhirPathError> {
    convert_input(&input, integer_converter)
}

fn converts_to_integer(_ctx: &EvaluationContext, input: Collection, _args: &[Collection]) -> Result<Collection, FhirPathError> {
    converts_input(&input, integer_converter)
}

fn to_decimal(_ctx: &EvaluationContext, input: Collection, _args: &[Collection]) -> Result<Collection, FhirPathError> {
    convert_input(&input, decimal_converter)
}

fn converts_to_decimal(_ctx: &EvaluationContext, input: Collection, _args: &[Collection]) -> Result<Collection, FhirPathError> {
    converts_input(&input, decimal_converter)
}

fn to_string(_ctx: &EvaluationContext, input: Collection, _args: &[Collection]) -> Result<Collection, FhirPathError> {
    convert_input(&input, string_converter)
}

fn converts_to_string(_ctx: &EvaluationContext, input: Collection, _args: &[Collection]) -> Result<Collection, FhirPathError> {
    converts_input(&input, string_converter)
}

fn to_date(_ctx: &EvaluationContext, input: Collection, _args: &[Collection]) -> Result<Collection, FhirPathError> {
    convert_input(&input, date_converter)
}

fn converts_to_date(_ctx: &EvaluationContext, input: Collection, _args: &[Collection]) -> Result<Collection, FhirPathError> {
    converts_input(&input, date_converter)
}

fn to_date_time(_ctx: &EvaluationContext, input: Collection, _args: &[Collection]) -> Result<Collection, FhirPathError> {
    convert_input(&input, date_time_converter)
}

fn converts_to_date_time(_ctx: &EvaluationContext, input: Collection, _args: &[Collection]) -> Result<Collection, FhirPathError> {
    converts_input(&input, date_time_converter)
}

fn to_time(_ctx: &EvaluationContext, input: Collection, _args: &[Collection]) -> Result<Collection, FhirPathError> {
    convert_input(&input, time_converter)
}

fn converts_to_time(_ctx: &EvaluationContext, input: Collection, _args: &[Collection]) -> Result<Collection, FhirPathError> {
    converts_input(&input, time_converter)
}

/// With a unit argument, the conversion only succeeds when the unit
/// already matches; no unit conversion is attempted.
fn requested_unit(args: &[Collection]) -> Result<Option<String>, FhirPathError> {
    match args.first() {
        None => Ok(None),
        Some(arg) => Ok(Some(arg_string(arg, "toQuantity")?)),
    }
}

fn to_quantity(_ctx: &EvaluationContext, input: Collection, args: &[Collection]) -> Result<Collection, FhirPathError> {
    let unit = requested_unit(args)?;
    let converted = convert_input(&input, quantity_converter)?;
    if let Some(unit) = unit {
        let expected = Quantity::new(Decimal::ZERO, &unit).unit;
        if let Some(FhirPathValue::Quantity(q)) = converted.get(0) {
            if q.unit != expected {
                return Ok(Collection::new());
            }
        }
    }
    Ok(converted)
}

fn converts_to_quantity(_ctx: &EvaluationContext, input: Collection, args: &[Collection]) -> Result<Collection, FhirPathError> {
    let converted = to_quantity(_ctx, input.clone(), args)?;
    match input.as_singleton()? {
        None => Ok(Collection::new()),
        Some(_) => Ok(Collection::singleton(FhirPathValue::Boolean(
            !converted.is_empty(),
        ))),
    }
}
