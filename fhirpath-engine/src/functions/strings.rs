// String manipulation functions. The input must be a singleton string
// (or a string-valued FHIR primitive); empty input propagates as empty.

use super::{arg_integer, arg_string, input_string};
use crate::context::EvaluationContext;
use crate::errors::FhirPathError;
use crate::model::{normalize, Collection, FhirPathValue};
use crate::registry::Builtin;
use regex::Regex;
use std::collections::HashMap;

pub(super) fn register(map: &mut HashMap<&'static str, Builtin>) {
    map.insert("indexOf", Builtin::Eager { min_args: 1, max_args: 1, func: index_of });
    map.insert("substring", Builtin::Eager { min_args: 1, max_args: 2, func: substring });
    map.insert("startsWith", Builtin::Eager { min_args: 1, max_args: 1, func: starts_with });
    map.insert("endsWith", Builtin::Eager { min_args: 1, max_args: 1, func: ends_with });
    map.insert("contains", Builtin::Eager { min_args: 1, max_args: 1, func: contains });
    map.insert("upper", Builtin::Eager { min_args: 0, max_args: 0, func: upper });
    map.insert("lower", Builtin::Eager { min_args: 0, max_args: 0, func: lower });
    map.insert("replace", Builtin::Eager { min_args: 2, max_args: 2, func: replace });
    map.insert("matches", Builtin::Eager { min_args: 1, max_args: 1, func: matches });
    map.insert("replaceMatches", Builtin::Eager { min_args: 2, max_args: 2, func: replace_matches });
    map.insert("length", Builtin::Eager { min_args: 0, max_args: 0, func: length });
    map.insert("toChars", Builtin::Eager { min_args: 0, max_args: 0, func: to_chars });
    map.insert("split", Builtin::Eager { min_args: 1, max_args: 1, func: split });
    map.insert("join", Builtin::Eager { min_args: 0, max_args: 1, func: join });
    map.insert("trim", Builtin::Eager { min_args: 0, max_args: 0, func: trim });
}

fn string_result(value: String) -> Result<Collection, FhirPathError> {
    Ok(Collection::singleton(FhirPathValue::String(value)))
}

fn compile_regex(pattern: &str) -> Result<Regex, FhirPathError> {
    Regex::new(pattern)
        .map_err(|e| FhirPathError::InvalidInput(format!("invalid regular expression: {}", e)))
}

fn index_of(
    _ctx: &EvaluationContext,
    input: Collection,
    args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let Some(s) = input_string(&input, "indexOf")? else {
        return Ok(Collection::new());
    };
    let substring = arg_string(&args[0], "indexOf")?;
    let index = match s.find(&substring) {
        Some(byte_index) => s[..byte_index].chars().count() as i32,
        None => -1,
    };
    Ok(Collection::singleton(FhirPathValue::Integer(index)))
}

fn substring(
    _ctx: &EvaluationContext,
    input: Collection,
    args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let Some(s) = input_string(&input, "substring")? else {
        return Ok(Collection::new());
    };
    let start = arg_integer(&args[0], "substring")?;
    let total = s.chars().count() as i32;
    if start < 0 || start >= total {
        return Ok(Collection::new());
    }

    let rest = s.chars().skip(start as usize);
    let result: String = match args.get(1) {
        Some(length) => {
            let length = arg_integer(length, "substring")?;
            if length <= 0 {
                return Ok(Collection::new());
            }
            rest.take(length as usize).collect()
        }
        None => rest.collect(),
    };
    string_result(result)
}

fn starts_with(
    _ctx: &EvaluationContext,
    input: Collection,
    args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let Some(s) = input_string(&input, "startsWith")? else {
        return Ok(Collection::new());
    };
    let prefix = arg_string(&args[0], "startsWith")?;
    Ok(Collection::singleton(FhirPathValue::Boolean(
        s.starts_with(&prefix),
    )))
}

fn ends_with(
    _ctx: &EvaluationContext,
    input: Collection,
    args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let Some(s) = input_string(&input, "endsWith")? else {
        return Ok(Collection::new());
    };
    let suffix = arg_string(&args[0], "endsWith")?;
    Ok(Collection::singleton(FhirPathValue::Boolean(
        s.ends_with(&suffix),
    )))
}

fn contains(
    _ctx: &EvaluationContext,
    input: Collection,
    args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let Some(s) = input_string(&input, "contains")? else {
        return Ok(Collection::new());
    };
    let substring = arg_string(&args[0], "contains")?;
    Ok(Collection::singleton(FhirPathValue::Boolean(
        s.contains(&substring),
    )))
}

fn upper(
    _ctx: &EvaluationContext,
    input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    match input_string(&input, "upper")? {
        None => Ok(Collection::new()),
        Some(s) => string_result(s.to_uppercase()),
    }
}

fn lower(
    _ctx: &EvaluationContext,
    input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    match input_string(&input, "lower")? {
        None => Ok(Collection::new()),
        Some(s) => string_result(s.to_lowercase()),
    }
}

fn replace(
    _ctx: &EvaluationContext,
    input: Collection,
    args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let Some(s) = input_string(&input, "replace")? else {
        return Ok(Collection::new());
    };
    let pattern = arg_string(&args[0], "replace")?;
    let substitution = arg_string(&args[1], "replace")?;
    string_result(s.replace(&pattern, &substitution))
}

fn matches(
    _ctx: &EvaluationContext,
    input: Collection,
    args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let Some(s) = input_string(&input, "matches")? else {
        return Ok(Collection::new());
    };
    let regex = compile_regex(&arg_string(&args[0], "matches")?)?;
    Ok(Collection::singleton(FhirPathValue::Boolean(
        regex.is_match(&s),
    )))
}

fn replace_matches(
    _ctx: &EvaluationContext,
    input: Collection,
    args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let Some(s) = input_string(&input, "replaceMatches")? else {
        return Ok(Collection::new());
    };
    let regex = compile_regex(&arg_string(&args[0], "replaceMatches")?)?;
    let substitution = arg_string(&args[1], "replaceMatches")?;
    string_result(regex.replace_all(&s, substitution.as_str()).into_owned())
}

fn length(
    _ctx: &EvaluationContext,
    input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    match input_string(&input, "length")? {
        None => Ok(Collection::new()),
        Some(s) => Ok(Collection::singleton(FhirPathValue::Integer(
            s.chars().count() as i32,
        ))),
    }
}

fn to_chars(
    _ctx: &EvaluationContext,
    input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    match input_string(&input, "toChars")? {
        None => Ok(Collection::new()),
        Some(s) => Ok(s
            .chars()
            .map(|c| FhirPathValue::String(c.to_string()))
            .collect()),
    }
}

fn split(
    _ctx: &EvaluationContext,
    input: Collection,
    args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let Some(s) = input_string(&input, "split")? else {
        return Ok(Collection::new());
    };
    let separator = arg_string(&args[0], "split")?;
    Ok(s.split(separator.as_str())
        .map(|part| FhirPathValue::String(part.to_string()))
        .collect())
}

fn join(
    _ctx: &EvaluationContext,
    input: Collection,
    args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let separator = match args.first() {
        Some(arg) => arg_string(arg, "join")?,
        None => String::new(),
    };
    let mut parts = Vec::with_capacity(input.len());
    for value in input.iter() {
        match normalize(value) {
            FhirPathValue::String(s) => parts.push(s),
            other => {
                return Err(FhirPathError::TypeMismatch(format!(
                    "join() expects String items, got {}",
                    other.type_name()
                )))
            }
        }
    }
    string_result(parts.join(&separator))
}

fn trim(
    _ctx: &EvaluationContext,
    input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    match input_string(&input, "trim")? {
        None => Ok(Collection::new()),
        Some(s) => string_result(s.trim().to_string()),
    }
}
