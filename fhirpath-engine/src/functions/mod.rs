// Built-in function library
//
// One module per function category, mirroring the sections of the
// FHIRPath specification. Each module registers its entries into the
// shared table; the registry decides eager vs lazy argument handling
// from the entry kind.

use crate::errors::FhirPathError;
use crate::model::{normalize, Collection, FhirPathValue};
use crate::parser::{AstNode, TypeSpecifier};
use crate::registry::Builtin;
use std::collections::HashMap;

mod combining;
mod conversion;
mod existence;
mod filtering;
mod math;
mod navigation;
mod strings;
mod subsetting;
mod utility;

/// Assembles the process-wide built-in table.
pub(crate) fn builtins() -> HashMap<&'static str, Builtin> {
    let mut map = HashMap::new();
    combining::register(&mut map);
    conversion::register(&mut map);
    existence::register(&mut map);
    filtering::register(&mut map);
    math::register(&mut map);
    navigation::register(&mut map);
    strings::register(&mut map);
    subsetting::register(&mut map);
    utility::register(&mut map);
    map
}

// Shared argument and input coercions

/// Iterates the input as (index, singleton) pairs for lazy arguments.
pub(super) fn items(input: &Collection) -> impl Iterator<Item = (usize, Collection)> + '_ {
    input
        .iter()
        .enumerate()
        .map(|(index, value)| (index, Collection::singleton(value.clone())))
}

/// Singleton string input; empty propagates as `None`.
pub(super) fn input_string(
    input: &Collection,
    function: &str,
) -> Result<Option<String>, FhirPathError> {
    match input.as_singleton()? {
        None => Ok(None),
        Some(value) => match normalize(value) {
            FhirPathValue::String(s) => Ok(Some(s)),
            other => Err(FhirPathError::TypeMismatch(format!(
                "{}() expects a String input, got {}",
                function,
                other.type_name()
            ))),
        },
    }
}

/// Required singleton string argument.
pub(super) fn arg_string(argument: &Collection, function: &str) -> Result<String, FhirPathError> {
    match argument.as_singleton()? {
        Some(value) => match normalize(value) {
            FhirPathValue::String(s) => Ok(s),
            other => Err(FhirPathError::TypeMismatch(format!(
                "{}() expects a String argument, got {}",
                function,
                other.type_name()
            ))),
        },
        None => Err(FhirPathError::TypeMismatch(format!(
            "{}() expects a String argument, got empty",
            function
        ))),
    }
}

/// Required singleton integer argument.
pub(super) fn arg_integer(argument: &Collection, function: &str) -> Result<i32, FhirPathError> {
    match argument.as_singleton()? {
        Some(value) => match normalize(value) {
            FhirPathValue::Integer(i) => Ok(i),
            other => Err(FhirPathError::TypeMismatch(format!(
                "{}() expects an Integer argument, got {}",
                function,
                other.type_name()
            ))),
        },
        None => Err(FhirPathError::TypeMismatch(format!(
            "{}() expects an Integer argument, got empty",
            function
        ))),
    }
}

/// Interprets a lazy argument as a type specifier (`ofType(Quantity)`,
/// `is(System.Integer)`).
pub(super) fn type_spec_argument(node: &AstNode) -> Result<TypeSpecifier, FhirPathError> {
    match node {
        AstNode::Identifier(name) => Ok(TypeSpecifier {
            qualifier: None,
            name: name.clone(),
        }),
        AstNode::Path { parent, name } => match parent.as_ref() {
            AstNode::Identifier(qualifier) if qualifier == "FHIR" || qualifier == "System" => {
                Ok(TypeSpecifier {
                    qualifier: Some(qualifier.clone()),
                    name: name.clone(),
                })
            }
            _ => Err(FhirPathError::SignatureError(
                "expected a type name".to_string(),
            )),
        },
        _ => Err(FhirPathError::SignatureError(
            "expected a type name".to_string(),
        )),
    }
}

/// Equality-based dedup used by distinct(), union() and repeat().
pub(super) fn push_distinct(collection: &mut Collection, value: FhirPathValue) -> bool {
    if collection.contains_value(&value) {
        false
    } else {
        collection.push(value);
        true
    }
}
