// Schema navigator
//
// Reflective field access over schema-typed elements. Reads flatten
// choice groups to the active arm and unwrap primitive `.value` and
// contained resources; the write surface is used only by the patch layer.

use crate::element::Element;
use crate::errors::FhirPathError;
use crate::model::FhirPathValue;
use crate::schema::{self, Cardinality, ChoiceArm, FieldDef, FieldKind, FieldRef};

/// An assignable slot in a resource tree
pub enum Location {
    /// Singleton field (primitive or complex)
    Scalar {
        parent: Element,
        field: &'static FieldDef,
    },
    /// Repeated field
    Repeated {
        parent: Element,
        field: &'static FieldDef,
    },
    /// Choice group; the arm is selected by the incoming value type
    Choice {
        parent: Element,
        field: &'static FieldDef,
    },
    /// Contained-resource slot
    Contained {
        parent: Element,
        field: &'static FieldDef,
    },
    /// One element of a repeated field
    Index {
        parent: Element,
        field: &'static FieldDef,
        index: usize,
    },
}

/// Reads a named field of an element, in declaration order.
///
/// Choice groups flatten to the active arm; the type-suffixed spelling
/// (`valueString`) matches only when the active arm has that type.
/// Primitive elements expose `value` and `id`. A name outside the schema
/// of the element's type is an error, never a silent empty.
pub fn read(element: &Element, name: &str) -> Result<Vec<FhirPathValue>, FhirPathError> {
    let type_name = element.type_name();

    if schema::is_primitive_type(&type_name) {
        return match name {
            "value" => Ok(element.primitive_value().into_iter().collect()),
            "id" => Ok(element
                .element_id()
                .map(FhirPathValue::String)
                .into_iter()
                .collect()),
            "extension" => Ok(Vec::new()),
            _ => Err(FhirPathError::InvalidField(format!(
                "{}.{}",
                type_name, name
            ))),
        };
    }

    match schema::resolve_field(&type_name, name)? {
        FieldRef::Field(field) => Ok(element
            .field(field.storage)
            .into_iter()
            .map(FhirPathValue::Element)
            .collect()),
        FieldRef::Arm(field, arm) => Ok(element
            .field(field.storage)
            .into_iter()
            .filter(|child| child.type_name() == arm.type_name)
            .map(FhirPathValue::Element)
            .collect()),
    }
}

/// All child elements of an element, in schema declaration order.
pub fn children(element: &Element) -> Vec<FhirPathValue> {
    let type_name = element.type_name();
    let Some(def) = schema::type_def(&type_name) else {
        return Vec::new();
    };
    def.fields
        .iter()
        .flat_map(|field| element.field(field.storage))
        .map(FhirPathValue::Element)
        .collect()
}

/// Resolves a declared field of `parent` to an assignable location.
pub fn locate(parent: &Element, name: &str) -> Result<Location, FhirPathError> {
    let type_name = parent.type_name();
    let field = schema::field_def(&type_name, name)?;

    let parent = parent.clone();
    Ok(match field.kind {
        FieldKind::Choice => Location::Choice { parent, field },
        FieldKind::ContainedResource => Location::Contained { parent, field },
        _ => match field.cardinality {
            Cardinality::Repeated => Location::Repeated { parent, field },
            Cardinality::Singleton => Location::Scalar { parent, field },
        },
    })
}

/// Resolves one element of a repeated field of `parent`.
pub fn locate_item(
    parent: &Element,
    name: &str,
    index: usize,
) -> Result<Location, FhirPathError> {
    let field = schema::field_def(&parent.type_name(), name)?;
    Ok(Location::Index {
        parent: parent.clone(),
        field,
        index,
    })
}

/// Picks the choice arm whose type matches an incoming value type.
pub fn choice_arm_for(
    field: &'static FieldDef,
    value_type: &str,
) -> Option<&'static ChoiceArm> {
    field.choice_arms.iter().find(|arm| arm.type_name == value_type)
}

// Write surface (patch only)

pub fn write_scalar(parent: &Element, field: &FieldDef, child: Element) {
    parent.set_field(field.storage, vec![child]);
}

pub fn append(parent: &Element, field: &FieldDef, child: Element) {
    parent.push_field(field.storage, child);
}

pub fn insert_at(parent: &Element, field: &FieldDef, index: usize, child: Element) {
    parent.insert_in_field(field.storage, index, child);
}

pub fn remove_at(parent: &Element, field: &FieldDef, index: usize) {
    parent.remove_from_field(field.storage, index);
}

pub fn clear(parent: &Element, field: &FieldDef) {
    parent.clear_field(field.storage);
}

pub fn is_set(parent: &Element, field: &FieldDef) -> bool {
    parent.has_field(field.storage)
}

pub fn list_len(parent: &Element, field: &FieldDef) -> usize {
    parent.field(field.storage).len()
}
