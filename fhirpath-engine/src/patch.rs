// FHIRPath Patch
//
// Structural mutation of resources at locations identified by FHIRPath
// expressions. The path is parsed with the regular parser; everything up
// to the last member-access step is resolved with the regular evaluator,
// and the final step goes through the navigator's write surface. Every
// operation validates completely before touching the resource, so a
// failed patch leaves it unchanged.

use crate::context::EvaluationContext;
use crate::element::Element;
use crate::errors::FhirPathError;
use crate::evaluator;
use crate::lexer::tokenize;
use crate::model::{normalize, Collection, FhirPathValue};
use crate::navigator::{self, Location};
use crate::parser::{parse, AstNode};
use crate::schema::{self, Cardinality, FieldDef};
use chrono::Utc;
use std::collections::HashMap;

/// Options for patch operations. No options are currently defined; the
/// struct reserves the surface for future ones (force-replace,
/// ignore-missing).
#[derive(Debug, Clone, Default)]
pub struct Options {}

/// Adds `value` under the declared field `field` of the element that
/// `path` resolves to: appended for repeated fields, set for unset
/// scalars, arm-selected for choice groups.
pub fn add(
    resource: &Element,
    path: &str,
    field: &str,
    value: &FhirPathValue,
    _options: &Options,
) -> Result<(), FhirPathError> {
    let ast = compile_path(path)?;
    let target = eval_path(resource, &ast)?;
    let parent = match target.as_singleton()? {
        None => return Err(FhirPathError::NotSingleton(0)),
        Some(FhirPathValue::Element(element)) => element.clone(),
        Some(_) => {
            return Err(FhirPathError::NotPatchable(format!(
                "'{}' does not resolve to a FHIR element",
                path
            )))
        }
    };

    match navigator::locate(&parent, field)? {
        Location::Choice { parent, field } => {
            if navigator::is_set(&parent, field) {
                return Err(already_set(field));
            }
            let arm_type = value_type_name(value);
            if navigator::choice_arm_for(field, &arm_type).is_none() {
                return Err(FhirPathError::InvalidInput(format!(
                    "no arm of '{}' accepts {}",
                    field.name, arm_type
                )));
            }
            navigator::write_scalar(&parent, field, element_of_type(value, &arm_type)?);
        }
        Location::Contained { parent, field } => {
            if navigator::is_set(&parent, field) {
                return Err(already_set(field));
            }
            let FhirPathValue::Element(element) = value else {
                return Err(FhirPathError::InvalidInput(
                    "contained slot expects a resource".to_string(),
                ));
            };
            if !element.is_resource() {
                return Err(FhirPathError::InvalidInput(format!(
                    "'{}' is not a resource",
                    element.type_name()
                )));
            }
            navigator::write_scalar(&parent, field, element.clone());
        }
        Location::Repeated { parent, field } => {
            navigator::append(&parent, field, element_for_field(field, value)?);
        }
        Location::Scalar { parent, field } => {
            if navigator::is_set(&parent, field) {
                return Err(already_set(field));
            }
            navigator::write_scalar(&parent, field, element_for_field(field, value)?);
        }
        Location::Index { .. } => unreachable!("navigator::locate never returns Location::Index"),
    }
    Ok(())
}

/// Deletes the value that `path` resolves to: list elements are removed
/// with a shift, scalar fields are cleared, an already-empty scalar is a
/// no-op.
pub fn delete(resource: &Element, path: &str) -> Result<(), FhirPathError> {
    let ast = compile_path(path)?;
    match ast {
        AstNode::Path { parent, name } => delete_field(resource, &parent, &name),
        AstNode::Index { parent, index } => delete_index(resource, &parent, &index),
        _ => Err(FhirPathError::NotPatchable(format!(
            "'{}' does not denote an assignable location",
            path
        ))),
    }
}

/// Inserts `value` at `index` into the repeated field that `path`
/// resolves to; existing entries from `index` on shift right.
pub fn insert(
    resource: &Element,
    path: &str,
    value: &FhirPathValue,
    index: i32,
) -> Result<(), FhirPathError> {
    let ast = compile_path(path)?;
    let AstNode::Path { parent, name } = ast else {
        return Err(FhirPathError::NotPatchable(format!(
            "'{}' does not denote a list field",
            path
        )));
    };

    let parents = eval_path(resource, &parent)?;
    let parent = match parents.as_singleton()? {
        None => return Err(FhirPathError::NotSingleton(0)),
        Some(FhirPathValue::Element(element)) => element.clone(),
        Some(_) => {
            return Err(FhirPathError::NotPatchable(
                "path does not resolve to a FHIR element".to_string(),
            ))
        }
    };
    if parent.is_primitive() {
        return Err(FhirPathError::NotPatchable(format!(
            "'{}' is not a list field",
            name
        )));
    }

    let field = schema::field_def(&parent.type_name(), &name)?;
    if field.cardinality != Cardinality::Repeated {
        return Err(FhirPathError::NotPatchable(format!(
            "'{}' is not a repeated field",
            field.name
        )));
    }

    let len = navigator::list_len(&parent, field);
    if index < 0 || index as usize > len {
        return Err(FhirPathError::NotPatchable(format!(
            "index {} out of bounds for length {}",
            index, len
        )));
    }

    let element = element_for_field(field, value).map_err(|err| match err {
        FhirPathError::InvalidInput(message) => FhirPathError::NotPatchable(message),
        other => other,
    })?;
    navigator::insert_at(&parent, field, index as usize, element);
    Ok(())
}

/// Reorders entries of a repeated field. Declared by the FHIR Patch
/// specification; intentionally unimplemented here.
pub fn move_entry(
    _resource: &Element,
    _path: &str,
    _source_index: i32,
    _destination_index: i32,
) -> Result<(), FhirPathError> {
    Err(FhirPathError::NotImplemented("Move"))
}

/// Replaces the value at a location. Declared by the FHIR Patch
/// specification; intentionally unimplemented here.
pub fn replace(
    _resource: &Element,
    _path: &str,
    _value: &FhirPathValue,
) -> Result<(), FhirPathError> {
    Err(FhirPathError::NotImplemented("Replace"))
}

// ---------------------------------------------------------------------------

/// Parse failures inside patch paths surface as `InvalidField` for
/// compatibility with callers that treat any bad path uniformly.
fn compile_path(path: &str) -> Result<AstNode, FhirPathError> {
    let coarsen = |err: FhirPathError| match err {
        FhirPathError::ParseError { .. } => FhirPathError::InvalidField(path.to_string()),
        other => other,
    };
    let tokens = tokenize(path).map_err(coarsen)?;
    parse(&tokens).map_err(coarsen)
}

fn eval_path(resource: &Element, node: &AstNode) -> Result<Collection, FhirPathError> {
    let input = Collection::singleton(FhirPathValue::Element(resource.clone()));
    let ctx = EvaluationContext::new(
        input.clone(),
        HashMap::new(),
        Utc::now().fixed_offset(),
        HashMap::new(),
        None,
        None,
    );
    evaluator::evaluate(node, &input, &ctx)
}

fn already_set(field: &FieldDef) -> FhirPathError {
    FhirPathError::NotPatchable(format!(
        "'{}' is already set; Replace is not implemented",
        field.name
    ))
}

fn delete_field(
    resource: &Element,
    parent_ast: &AstNode,
    name: &str,
) -> Result<(), FhirPathError> {
    let parents = eval_path(resource, parent_ast)?;

    let mut owner: Option<Element> = None;
    let mut total = 0usize;
    for value in parents.iter() {
        let FhirPathValue::Element(element) = value else {
            continue;
        };
        if element.is_primitive() {
            return Err(FhirPathError::NotPatchable(
                "a primitive's value cannot be deleted on its own".to_string(),
            ));
        }
        let found = navigator::read(element, name)?.len();
        if found > 0 {
            total += found;
            owner.get_or_insert(element.clone());
        }
    }

    if total > 1 {
        return Err(FhirPathError::NotSingleton(total));
    }
    let Some(owner) = owner else {
        // valid but empty field: deleting nothing succeeds
        return Ok(());
    };

    match schema::resolve_field(&owner.type_name(), name)? {
        schema::FieldRef::Field(field) => navigator::clear(&owner, field),
        schema::FieldRef::Arm(field, _) => navigator::clear(&owner, field),
    }
    Ok(())
}

fn delete_index(
    resource: &Element,
    parent_ast: &AstNode,
    index_ast: &AstNode,
) -> Result<(), FhirPathError> {
    let AstNode::Path {
        parent: owners_ast,
        name,
    } = parent_ast
    else {
        return Err(FhirPathError::NotPatchable(
            "indexed delete requires a field path".to_string(),
        ));
    };

    let index = eval_index(resource, index_ast)?;
    let owners = eval_path(resource, owners_ast)?;

    // the index addresses the concatenated collection across owners
    let mut remaining = index;
    for value in owners.iter() {
        let FhirPathValue::Element(element) = value else {
            continue;
        };
        if element.is_primitive() {
            return Err(FhirPathError::NotPatchable(
                "a primitive's value cannot be deleted on its own".to_string(),
            ));
        }
        let field = schema::field_def(&element.type_name(), name)?;
        let len = navigator::list_len(element, field);
        if remaining < len {
            if field.cardinality != Cardinality::Repeated {
                return Err(FhirPathError::NotPatchable(format!(
                    "'{}' is not a repeated field",
                    name
                )));
            }
            let Location::Index {
                parent,
                field,
                index,
            } = navigator::locate_item(element, name, remaining)?
            else {
                return Err(FhirPathError::NotPatchable(format!(
                    "'{}' is not a list element",
                    name
                )));
            };
            navigator::remove_at(&parent, field, index);
            return Ok(());
        }
        remaining -= len;
    }

    Err(FhirPathError::NotPatchable(format!(
        "index {} out of range",
        index
    )))
}

fn eval_index(resource: &Element, index_ast: &AstNode) -> Result<usize, FhirPathError> {
    let index = eval_path(resource, index_ast)?;
    match index.as_singleton()? {
        Some(value) => match normalize(value) {
            FhirPathValue::Integer(i) if i >= 0 => Ok(i as usize),
            FhirPathValue::Integer(i) => Err(FhirPathError::NotPatchable(format!(
                "negative index {}",
                i
            ))),
            other => Err(FhirPathError::TypeMismatch(format!(
                "indexer expects an Integer, got {}",
                other.type_name()
            ))),
        },
        None => Err(FhirPathError::NotPatchable("empty index".to_string())),
    }
}

/// The FHIR type a patch value carries: an element's own type, or the
/// canonical primitive type of a system value.
fn value_type_name(value: &FhirPathValue) -> String {
    match value {
        FhirPathValue::Element(element) => element.type_name(),
        FhirPathValue::Boolean(_) => "boolean".to_string(),
        FhirPathValue::Integer(_) => "integer".to_string(),
        FhirPathValue::Decimal(_) => "decimal".to_string(),
        FhirPathValue::String(_) => "string".to_string(),
        FhirPathValue::Date(_) => "date".to_string(),
        FhirPathValue::DateTime(_) => "dateTime".to_string(),
        FhirPathValue::Time(_) => "time".to_string(),
        FhirPathValue::Quantity(_) => "Quantity".to_string(),
    }
}

/// Materialises `value` as an element of exactly `type_name`.
fn element_of_type(value: &FhirPathValue, type_name: &str) -> Result<Element, FhirPathError> {
    match value {
        FhirPathValue::Element(element) => Ok(element.clone()),
        system => Ok(Element::with_value(type_name, system.clone())),
    }
}

/// Validates and converts a patch value against a declared field:
/// enum bindings only accept canonical codes, sized integers are bounds
/// checked, and element types must line up with the field type.
fn element_for_field(
    field: &'static FieldDef,
    value: &FhirPathValue,
) -> Result<Element, FhirPathError> {
    let target = field.element_type;

    if let Some(binding) = field.enum_binding {
        let code = match normalize(value) {
            FhirPathValue::String(s) => s,
            other => {
                return Err(FhirPathError::InvalidInput(format!(
                    "enum field '{}' expects a String code, got {}",
                    field.name,
                    other.type_name()
                )))
            }
        };
        schema::enum_canonicalize(binding, &code)?;
        return Ok(Element::with_value(target, FhirPathValue::String(code)));
    }

    // complex fields take an element of the declared type
    if !schema::is_primitive_type(target) {
        return match value {
            FhirPathValue::Element(element) if element.type_name() == target => {
                Ok(element.clone())
            }
            FhirPathValue::Element(element) => Err(FhirPathError::InvalidInput(format!(
                "field '{}' expects {}, got {}",
                field.name,
                target,
                element.type_name()
            ))),
            other => Err(FhirPathError::InvalidInput(format!(
                "field '{}' expects {}, got {}",
                field.name,
                target,
                other.type_name()
            ))),
        };
    }

    // primitive fields: an element must carry the exact type, with the
    // single widening of integer into the sized integer types; a system
    // value must be kind compatible
    let underlying = match value {
        FhirPathValue::Element(element) => {
            let element_type = element.type_name();
            let compatible = element_type == target
                || (element_type == "integer"
                    && matches!(target, "positiveInt" | "unsignedInt"));
            if !compatible {
                return Err(FhirPathError::InvalidInput(format!(
                    "field '{}' expects {}, got {}",
                    field.name, target, element_type
                )));
            }
            element.primitive_value().ok_or_else(|| {
                FhirPathError::InvalidInput(format!("element for '{}' has no value", field.name))
            })?
        }
        system => system.clone(),
    };

    let kind_matches = matches!(
        (target, &underlying),
        ("boolean", FhirPathValue::Boolean(_))
            | ("integer" | "positiveInt" | "unsignedInt", FhirPathValue::Integer(_))
            | ("decimal", FhirPathValue::Decimal(_) | FhirPathValue::Integer(_))
            | ("date", FhirPathValue::Date(_))
            | ("dateTime" | "instant", FhirPathValue::DateTime(_) | FhirPathValue::Date(_))
            | ("time", FhirPathValue::Time(_))
    ) || (matches!(underlying, FhirPathValue::String(_))
        && matches!(
            target,
            "string"
                | "code"
                | "uri"
                | "url"
                | "canonical"
                | "id"
                | "markdown"
                | "oid"
                | "uuid"
                | "base64Binary"
                | "xhtml"
        ));
    if !kind_matches {
        return Err(FhirPathError::InvalidInput(format!(
            "field '{}' expects {}, got {}",
            field.name,
            target,
            underlying.type_name()
        )));
    }

    if let FhirPathValue::Integer(i) = underlying {
        if !schema::integer_in_bounds(target, i) {
            return Err(FhirPathError::InvalidUnsignedInt {
                type_name: target.to_string(),
                value: i,
            });
        }
    }

    Ok(Element::with_value(target, underlying))
}
