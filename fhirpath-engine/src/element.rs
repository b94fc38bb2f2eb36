// Schema-typed resource tree
//
// An `Element` is a cheap handle to one node of a FHIR resource tree.
// Handles share the underlying node, so evaluation results keep pointing
// into the resource they came from and the patch layer can mutate through
// them. Field storage is keyed by the schema storage name; JSON input and
// output use the FHIR-visible names.

use crate::datetime::{PrecisionDate, PrecisionDateTime, PrecisionTime};
use crate::errors::FhirPathError;
use crate::model::{FhirPathValue, Quantity};
use crate::schema::{self, Cardinality, FieldDef, FieldKind, FieldRef};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Element {
    node: Rc<RefCell<ElementNode>>,
}

#[derive(Debug)]
struct ElementNode {
    type_name: String,
    /// Underlying system value; set only for primitive types
    value: Option<FhirPathValue>,
    /// Element id (`Element.id` in FHIR, `Resource.id` for resources)
    id: Option<String>,
    /// Children keyed by schema storage name
    fields: BTreeMap<String, Vec<Element>>,
}

impl PartialEq for Element {
    fn eq(&self, other: &Element) -> bool {
        if Rc::ptr_eq(&self.node, &other.node) {
            return true;
        }
        let a = self.node.borrow();
        let b = other.node.borrow();
        a.type_name == b.type_name && a.value == b.value && a.id == b.id && a.fields == b.fields
    }
}

impl Element {
    fn from_node(node: ElementNode) -> Element {
        Element {
            node: Rc::new(RefCell::new(node)),
        }
    }

    /// Creates an empty element of the given type.
    pub fn new(type_name: &str) -> Result<Element, FhirPathError> {
        if schema::type_def(type_name).is_none() && !schema::is_primitive_type(type_name) {
            return Err(FhirPathError::InvalidInput(format!(
                "unknown type '{}'",
                type_name
            )));
        }
        Ok(Element::from_node(ElementNode {
            type_name: type_name.to_string(),
            value: None,
            id: None,
            fields: BTreeMap::new(),
        }))
    }

    /// A primitive element of an explicit type around a system value.
    pub(crate) fn with_value(type_name: &str, value: FhirPathValue) -> Element {
        Element::primitive(type_name, value)
    }

    fn primitive(type_name: &str, value: FhirPathValue) -> Element {
        Element::from_node(ElementNode {
            type_name: type_name.to_string(),
            value: Some(value),
            id: None,
            fields: BTreeMap::new(),
        })
    }

    // Primitive constructors

    pub fn string(value: impl Into<String>) -> Element {
        Element::primitive("string", FhirPathValue::String(value.into()))
    }

    pub fn code(value: impl Into<String>) -> Element {
        Element::primitive("code", FhirPathValue::String(value.into()))
    }

    pub fn uri(value: impl Into<String>) -> Element {
        Element::primitive("uri", FhirPathValue::String(value.into()))
    }

    pub fn id_value(value: impl Into<String>) -> Element {
        Element::primitive("id", FhirPathValue::String(value.into()))
    }

    pub fn markdown(value: impl Into<String>) -> Element {
        Element::primitive("markdown", FhirPathValue::String(value.into()))
    }

    pub fn boolean(value: bool) -> Element {
        Element::primitive("boolean", FhirPathValue::Boolean(value))
    }

    pub fn integer(value: i32) -> Element {
        Element::primitive("integer", FhirPathValue::Integer(value))
    }

    pub fn positive_int(value: i32) -> Element {
        Element::primitive("positiveInt", FhirPathValue::Integer(value))
    }

    pub fn unsigned_int(value: i32) -> Element {
        Element::primitive("unsignedInt", FhirPathValue::Integer(value))
    }

    pub fn decimal(value: Decimal) -> Element {
        Element::primitive("decimal", FhirPathValue::Decimal(value))
    }

    pub fn date(value: PrecisionDate) -> Element {
        Element::primitive("date", FhirPathValue::Date(value))
    }

    pub fn date_time(value: PrecisionDateTime) -> Element {
        Element::primitive("dateTime", FhirPathValue::DateTime(value))
    }

    pub fn instant(value: PrecisionDateTime) -> Element {
        Element::primitive("instant", FhirPathValue::DateTime(value))
    }

    pub fn time(value: PrecisionTime) -> Element {
        Element::primitive("time", FhirPathValue::Time(value))
    }

    /// Wraps a raw XHTML string; the content is not validated.
    pub fn xhtml(value: impl Into<String>) -> Element {
        Element::primitive("xhtml", FhirPathValue::String(value.into()))
    }

    /// Builds a Narrative with `generated` status around raw XHTML.
    pub fn narrative(div: impl Into<String>) -> Element {
        let narrative = Element::from_node(ElementNode {
            type_name: "Narrative".to_string(),
            value: None,
            id: None,
            fields: BTreeMap::new(),
        });
        narrative.set_field("status", vec![Element::code("generated")]);
        narrative.set_field("div", vec![Element::xhtml(div)]);
        narrative
    }

    // Accessors

    pub fn type_name(&self) -> String {
        self.node.borrow().type_name.clone()
    }

    pub fn is_primitive(&self) -> bool {
        schema::is_primitive_type(&self.node.borrow().type_name)
    }

    pub fn is_resource(&self) -> bool {
        schema::is_resource_type(&self.node.borrow().type_name)
    }

    /// The wrapped system value of a primitive element.
    pub fn primitive_value(&self) -> Option<FhirPathValue> {
        self.node.borrow().value.clone()
    }

    /// The system Quantity of a FHIR Quantity element, preferring the
    /// UCUM `code` over the display `unit`.
    pub fn quantity_value(&self) -> Option<Quantity> {
        if self.node.borrow().type_name != "Quantity" {
            return None;
        }
        let value = match self.field("value").first()?.primitive_value()? {
            FhirPathValue::Decimal(d) => d,
            FhirPathValue::Integer(i) => Decimal::from(i),
            _ => return None,
        };
        let unit = ["code", "unit"]
            .iter()
            .find_map(|name| match self.field(name).first()?.primitive_value()? {
                FhirPathValue::String(s) => Some(s),
                _ => None,
            })
            .unwrap_or_else(|| "1".to_string());
        Some(Quantity::new(value, &unit))
    }

    pub fn element_id(&self) -> Option<String> {
        self.node.borrow().id.clone()
    }

    pub fn set_element_id(&self, id: impl Into<String>) {
        self.node.borrow_mut().id = Some(id.into());
    }

    // Field storage, keyed by storage name. Used by the navigator and the
    // JSON codec; everything else goes through the navigator.

    pub(crate) fn field(&self, storage: &str) -> Vec<Element> {
        self.node
            .borrow()
            .fields
            .get(storage)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn has_field(&self, storage: &str) -> bool {
        self.node
            .borrow()
            .fields
            .get(storage)
            .is_some_and(|v| !v.is_empty())
    }

    pub(crate) fn set_field(&self, storage: &str, elements: Vec<Element>) {
        self.node
            .borrow_mut()
            .fields
            .insert(storage.to_string(), elements);
    }

    pub(crate) fn push_field(&self, storage: &str, element: Element) {
        self.node
            .borrow_mut()
            .fields
            .entry(storage.to_string())
            .or_default()
            .push(element);
    }

    pub(crate) fn insert_in_field(&self, storage: &str, index: usize, element: Element) {
        self.node
            .borrow_mut()
            .fields
            .entry(storage.to_string())
            .or_default()
            .insert(index, element);
    }

    pub(crate) fn remove_from_field(&self, storage: &str, index: usize) {
        let mut node = self.node.borrow_mut();
        if let Some(list) = node.fields.get_mut(storage) {
            list.remove(index);
            if list.is_empty() {
                node.fields.remove(storage);
            }
        }
    }

    pub(crate) fn clear_field(&self, storage: &str) {
        self.node.borrow_mut().fields.remove(storage);
    }

    // JSON codec

    /// Builds a schema-typed element tree from FHIR JSON.
    pub fn from_json(type_name: &str, json: &Value) -> Result<Element, FhirPathError> {
        if schema::is_primitive_type(type_name) {
            return primitive_from_json(type_name, json);
        }

        let def = schema::type_def(type_name).ok_or_else(|| {
            FhirPathError::InvalidInput(format!("unknown type '{}'", type_name))
        })?;

        let Value::Object(map) = json else {
            return Err(FhirPathError::InvalidInput(format!(
                "expected a JSON object for {}",
                type_name
            )));
        };

        let element = Element::new(type_name)?;
        for (key, value) in map {
            if key == "resourceType" {
                match value.as_str() {
                    Some(rt) if rt == type_name => continue,
                    _ => {
                        return Err(FhirPathError::InvalidInput(format!(
                            "resourceType does not match {}",
                            type_name
                        )))
                    }
                }
            }
            // primitive-extension siblings (`_birthDate`) are not modelled
            if key.starts_with('_') {
                continue;
            }
            if key == "id" && !def.is_resource {
                if let Some(id) = value.as_str() {
                    element.set_element_id(id);
                    continue;
                }
            }

            match schema::resolve_field(type_name, key)? {
                FieldRef::Field(field) => {
                    let children = field_from_json(field, field.element_type, value)?;
                    element.set_field(field.storage, children);
                }
                FieldRef::Arm(field, arm) => {
                    let child = Element::from_json(arm.type_name, value)?;
                    element.set_field(field.storage, vec![child]);
                }
            }
        }
        Ok(element)
    }

    /// Parses a JSON object carrying its own `resourceType`.
    pub fn resource_from_json(json: &Value) -> Result<Element, FhirPathError> {
        let type_name = json
            .get("resourceType")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                FhirPathError::InvalidInput("missing resourceType".to_string())
            })?;
        if !schema::is_resource_type(type_name) {
            return Err(FhirPathError::InvalidInput(format!(
                "unknown resource type '{}'",
                type_name
            )));
        }
        Element::from_json(type_name, json)
    }

    /// Renders the element back to FHIR JSON.
    pub fn to_json(&self) -> Value {
        let node = self.node.borrow();

        if schema::is_primitive_type(&node.type_name) {
            return match &node.value {
                Some(value) => primitive_to_json(&node.type_name, value),
                None => Value::Null,
            };
        }

        let mut map = Map::new();
        let def = match schema::type_def(&node.type_name) {
            Some(def) => def,
            None => return Value::Null,
        };
        if def.is_resource {
            map.insert(
                "resourceType".to_string(),
                Value::String(node.type_name.clone()),
            );
        } else if let Some(id) = &node.id {
            map.insert("id".to_string(), Value::String(id.clone()));
        }

        for field in def.fields {
            let Some(children) = node.fields.get(field.storage) else {
                continue;
            };
            if children.is_empty() {
                continue;
            }
            let key = match field.kind {
                FieldKind::Choice => {
                    let child_type = children[0].type_name();
                    match field
                        .choice_arms
                        .iter()
                        .find(|arm| arm.type_name == child_type)
                    {
                        Some(arm) => format!("{}{}", field.name, arm.suffix),
                        None => field.name.to_string(),
                    }
                }
                _ => field.name.to_string(),
            };
            let value = match field.cardinality {
                Cardinality::Repeated => {
                    Value::Array(children.iter().map(Element::to_json).collect())
                }
                Cardinality::Singleton => children[0].to_json(),
            };
            map.insert(key, value);
        }

        Value::Object(map)
    }
}

fn field_from_json(
    field: &FieldDef,
    element_type: &str,
    value: &Value,
) -> Result<Vec<Element>, FhirPathError> {
    let one = |value: &Value| -> Result<Element, FhirPathError> {
        match field.kind {
            FieldKind::ContainedResource => Element::resource_from_json(value),
            _ => Element::from_json(element_type, value),
        }
    };

    match (field.cardinality, value) {
        (Cardinality::Repeated, Value::Array(items)) => items.iter().map(one).collect(),
        (Cardinality::Repeated, _) => Err(FhirPathError::InvalidInput(format!(
            "field '{}' expects an array",
            field.name
        ))),
        (Cardinality::Singleton, Value::Array(_)) => Err(FhirPathError::InvalidInput(format!(
            "field '{}' is not repeated",
            field.name
        ))),
        (Cardinality::Singleton, value) => Ok(vec![one(value)?]),
    }
}

fn primitive_from_json(type_name: &str, json: &Value) -> Result<Element, FhirPathError> {
    let mismatch = || {
        FhirPathError::InvalidInput(format!(
            "JSON value {} does not fit primitive type '{}'",
            json, type_name
        ))
    };

    let value = match type_name {
        "boolean" => FhirPathValue::Boolean(json.as_bool().ok_or_else(mismatch)?),
        "integer" | "positiveInt" | "unsignedInt" => {
            let n = json.as_i64().ok_or_else(mismatch)?;
            let n = i32::try_from(n).map_err(|_| mismatch())?;
            if !schema::integer_in_bounds(type_name, n) {
                return Err(FhirPathError::InvalidUnsignedInt {
                    type_name: type_name.to_string(),
                    value: n,
                });
            }
            FhirPathValue::Integer(n)
        }
        "decimal" => {
            let text = match json {
                Value::Number(n) => n.to_string(),
                _ => return Err(mismatch()),
            };
            FhirPathValue::Decimal(Decimal::from_str(&text).map_err(|_| mismatch())?)
        }
        "date" => FhirPathValue::Date(PrecisionDate::parse(json.as_str().ok_or_else(mismatch)?)?),
        "dateTime" | "instant" => {
            let text = json.as_str().ok_or_else(mismatch)?;
            // a dateTime may carry only a date part
            match PrecisionDateTime::parse(text) {
                Ok(datetime) => FhirPathValue::DateTime(datetime),
                Err(_) => FhirPathValue::Date(PrecisionDate::parse(text)?),
            }
        }
        "time" => FhirPathValue::Time(PrecisionTime::parse(json.as_str().ok_or_else(mismatch)?)?),
        _ => FhirPathValue::String(json.as_str().ok_or_else(mismatch)?.to_string()),
    };

    Ok(Element::primitive(type_name, value))
}

fn primitive_to_json(type_name: &str, value: &FhirPathValue) -> Value {
    match value {
        FhirPathValue::Boolean(b) => Value::Bool(*b),
        FhirPathValue::Integer(i) => Value::Number((*i).into()),
        FhirPathValue::Decimal(d) => match d.to_i64() {
            Some(i) if d.fract().is_zero() => Value::Number(i.into()),
            _ => serde_json::Number::from_str(&d.to_string())
                .map(Value::Number)
                .unwrap_or_else(|_| Value::String(d.to_string())),
        },
        FhirPathValue::String(s) => Value::String(s.clone()),
        FhirPathValue::Date(d) => Value::String(d.to_string()),
        FhirPathValue::DateTime(d) => Value::String(d.to_string()),
        FhirPathValue::Time(t) => Value::String(t.to_string()),
        other => Value::String(format!("{} ({})", other, type_name)),
    }
}
