// Tree navigation: children, descendants, extension, hasValue, resolve.

use super::arg_string;
use crate::context::EvaluationContext;
use crate::errors::FhirPathError;
use crate::model::{Collection, FhirPathValue};
use crate::navigator;
use crate::registry::Builtin;
use std::collections::HashMap;

pub(super) fn register(map: &mut HashMap<&'static str, Builtin>) {
    map.insert("children", Builtin::Eager { min_args: 0, max_args: 0, func: children });
    map.insert("descendants", Builtin::Eager { min_args: 0, max_args: 0, func: descendants });
    map.insert("extension", Builtin::Eager { min_args: 1, max_args: 1, func: extension });
    map.insert("hasValue", Builtin::Eager { min_args: 0, max_args: 0, func: has_value });
    map.insert("resolve", Builtin::Eager { min_args: 0, max_args: 0, func: resolve });
}

fn element_children(input: &Collection) -> Collection {
    let mut result = Collection::new();
    for value in input {
        if let FhirPathValue::Element(element) = value {
            for child in navigator::children(element) {
                result.push(child);
            }
        }
    }
    result
}

fn children(
    _ctx: &EvaluationContext,
    input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    Ok(element_children(&input))
}

/// All descendants, breadth-first, excluding the input items themselves.
fn descendants(
    _ctx: &EvaluationContext,
    input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let mut result = Collection::new();
    let mut frontier = element_children(&input);
    while !frontier.is_empty() {
        let next = element_children(&frontier);
        result.extend(frontier);
        frontier = next;
    }
    Ok(result)
}

/// Extensions with a matching url; elements without an extension field
/// contribute nothing.
fn extension(
    _ctx: &EvaluationContext,
    input: Collection,
    args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let url = arg_string(&args[0], "extension")?;
    let mut result = Collection::new();

    for value in input.iter() {
        let FhirPathValue::Element(element) = value else {
            continue;
        };
        let Ok(extensions) = navigator::read(element, "extension") else {
            continue;
        };
        for extension in extensions {
            let FhirPathValue::Element(candidate) = &extension else {
                continue;
            };
            let matches = navigator::read(candidate, "url")?
                .first()
                .and_then(|url_element| match url_element {
                    FhirPathValue::Element(e) => e.primitive_value(),
                    other => Some(other.clone()),
                })
                .is_some_and(|v| v == FhirPathValue::String(url.clone()));
            if matches {
                result.push(extension.clone());
            }
        }
    }
    Ok(result)
}

/// True when the input is a single FHIR primitive carrying a value.
fn has_value(
    _ctx: &EvaluationContext,
    input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let result = match input.values() {
        [FhirPathValue::Element(element)] => {
            element.is_primitive() && element.primitive_value().is_some()
        }
        _ => false,
    };
    Ok(Collection::singleton(FhirPathValue::Boolean(result)))
}

/// Follows Reference elements through the caller-provided resolver;
/// without a resolver every reference resolves to nothing.
fn resolve(
    ctx: &EvaluationContext,
    input: Collection,
    _args: &[Collection],
) -> Result<Collection, FhirPathError> {
    let mut result = Collection::new();
    for value in input.iter() {
        let reference = match value {
            FhirPathValue::String(s) => Some(s.clone()),
            FhirPathValue::Element(element) if element.type_name() == "Reference" => {
                navigator::read(element, "reference")?
                    .first()
                    .and_then(|v| match v {
                        FhirPathValue::Element(e) => match e.primitive_value() {
                            Some(FhirPathValue::String(s)) => Some(s),
                            _ => None,
                        },
                        FhirPathValue::String(s) => Some(s.clone()),
                        _ => None,
                    })
            }
            _ => None,
        };
        if let Some(reference) = reference {
            if let Some(resolved) = ctx.resolve_reference(&reference) {
                result.push(FhirPathValue::Element(resolved));
            }
        }
    }
    Ok(result)
}
