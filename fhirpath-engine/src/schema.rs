// FHIR R4 schema descriptors
//
// A descriptor table keyed by type name stands in for the full R4
// structure definitions: each type lists its fields with kind,
// cardinality, element type, choice arms and enum binding. The engine
// only ever talks to this facade, so swapping in a table generated from
// the official definitions is a local change.

use crate::errors::FhirPathError;
use std::collections::HashMap;
use std::sync::LazyLock;

/// What a field holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A primitive element (`string`, `positiveInt`, `date`, ...)
    Primitive,
    /// A complex element with its own fields
    Complex,
    /// A one-of group (`value[x]`); the active arm is one of `choice_arms`
    Choice,
    /// A contained resource slot (`Bundle.entry.resource`)
    ContainedResource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Singleton,
    Repeated,
}

/// One arm of a choice group. The FHIRPath-visible name of the arm is the
/// group name followed by the capitalised suffix (`value` + `String`).
#[derive(Debug)]
pub struct ChoiceArm {
    pub suffix: &'static str,
    pub type_name: &'static str,
}

/// A bound value set. Codes are stored in canonical form: lowercase,
/// dash-separated.
#[derive(Debug)]
pub struct EnumBinding {
    pub value_set: &'static str,
    pub codes: &'static [&'static str],
}

#[derive(Debug)]
pub struct FieldDef {
    /// FHIRPath-visible field name
    pub name: &'static str,
    /// Underlying storage name; differs from `name` only for the entries
    /// of the reserved-name alias table below
    pub storage: &'static str,
    pub kind: FieldKind,
    pub cardinality: Cardinality,
    /// Element type name; empty for choice groups
    pub element_type: &'static str,
    pub choice_arms: &'static [ChoiceArm],
    pub enum_binding: Option<&'static EnumBinding>,
}

#[derive(Debug)]
pub struct TypeDef {
    pub name: &'static str,
    pub is_resource: bool,
    pub fields: &'static [FieldDef],
}

/// Result of resolving a FHIRPath field name against a type
pub enum FieldRef {
    /// Direct field match
    Field(&'static FieldDef),
    /// Type-suffixed access to a choice arm (`valueString`)
    Arm(&'static FieldDef, &'static ChoiceArm),
}

// ---------------------------------------------------------------------------
// Value set bindings

pub static ADMINISTRATIVE_GENDER: EnumBinding = EnumBinding {
    value_set: "administrative-gender",
    codes: &["male", "female", "other", "unknown"],
};

static NAME_USE: EnumBinding = EnumBinding {
    value_set: "name-use",
    codes: &["usual", "official", "temp", "nickname", "anonymous", "old", "maiden"],
};

static CONTACT_POINT_SYSTEM: EnumBinding = EnumBinding {
    value_set: "contact-point-system",
    codes: &["phone", "fax", "email", "pager", "url", "sms", "other"],
};

static CONTACT_POINT_USE: EnumBinding = EnumBinding {
    value_set: "contact-point-use",
    codes: &["home", "work", "temp", "old", "mobile"],
};

static IDENTIFIER_USE: EnumBinding = EnumBinding {
    value_set: "identifier-use",
    codes: &["usual", "official", "temp", "secondary", "old"],
};

static OBSERVATION_STATUS: EnumBinding = EnumBinding {
    value_set: "observation-status",
    codes: &[
        "registered",
        "preliminary",
        "final",
        "amended",
        "corrected",
        "cancelled",
        "entered-in-error",
        "unknown",
    ],
};

static ENCOUNTER_STATUS: EnumBinding = EnumBinding {
    value_set: "encounter-status",
    codes: &[
        "planned",
        "arrived",
        "triaged",
        "in-progress",
        "onleave",
        "finished",
        "cancelled",
        "entered-in-error",
        "unknown",
    ],
};

static BUNDLE_TYPE: EnumBinding = EnumBinding {
    value_set: "bundle-type",
    codes: &[
        "document",
        "message",
        "transaction",
        "transaction-response",
        "batch",
        "batch-response",
        "history",
        "searchset",
        "collection",
    ],
};

static NARRATIVE_STATUS: EnumBinding = EnumBinding {
    value_set: "narrative-status",
    codes: &["generated", "extensions", "additional", "empty"],
};

static IMAGINGSTUDY_STATUS: EnumBinding = EnumBinding {
    value_set: "imagingstudy-status",
    codes: &["registered", "available", "cancelled", "entered-in-error", "unknown"],
};

static ADDRESS_USE: EnumBinding = EnumBinding {
    value_set: "address-use",
    codes: &["home", "work", "temp", "old", "billing"],
};

static ADDRESS_TYPE: EnumBinding = EnumBinding {
    value_set: "address-type",
    codes: &["postal", "physical", "both"],
};

static REQUEST_STATUS: EnumBinding = EnumBinding {
    value_set: "request-status",
    codes: &["draft", "active", "on-hold", "revoked", "completed", "entered-in-error", "unknown"],
};

static REQUEST_INTENT: EnumBinding = EnumBinding {
    value_set: "request-intent",
    codes: &[
        "proposal",
        "plan",
        "directive",
        "order",
        "original-order",
        "reflex-order",
        "filler-order",
        "instance-order",
        "option",
    ],
};

// ---------------------------------------------------------------------------
// Field constructors

const fn field(
    name: &'static str,
    kind: FieldKind,
    cardinality: Cardinality,
    element_type: &'static str,
) -> FieldDef {
    FieldDef {
        name,
        storage: name,
        kind,
        cardinality,
        element_type,
        choice_arms: &[],
        enum_binding: None,
    }
}

const fn prim(name: &'static str, element_type: &'static str) -> FieldDef {
    field(name, FieldKind::Primitive, Cardinality::Singleton, element_type)
}

const fn prim_list(name: &'static str, element_type: &'static str) -> FieldDef {
    field(name, FieldKind::Primitive, Cardinality::Repeated, element_type)
}

const fn code(name: &'static str, binding: &'static EnumBinding) -> FieldDef {
    FieldDef {
        name,
        storage: name,
        kind: FieldKind::Primitive,
        cardinality: Cardinality::Singleton,
        element_type: "code",
        choice_arms: &[],
        enum_binding: Some(binding),
    }
}

const fn complex(name: &'static str, element_type: &'static str) -> FieldDef {
    field(name, FieldKind::Complex, Cardinality::Singleton, element_type)
}

const fn complex_list(name: &'static str, element_type: &'static str) -> FieldDef {
    field(name, FieldKind::Complex, Cardinality::Repeated, element_type)
}

const fn choice(name: &'static str, arms: &'static [ChoiceArm]) -> FieldDef {
    FieldDef {
        name,
        storage: name,
        kind: FieldKind::Choice,
        cardinality: Cardinality::Singleton,
        element_type: "",
        choice_arms: arms,
        enum_binding: None,
    }
}

const fn arm(suffix: &'static str, type_name: &'static str) -> ChoiceArm {
    ChoiceArm { suffix, type_name }
}

// ---------------------------------------------------------------------------
// Primitive types

const PRIMITIVE_TYPES: &[&str] = &[
    "base64Binary",
    "boolean",
    "canonical",
    "code",
    "date",
    "dateTime",
    "decimal",
    "id",
    "instant",
    "integer",
    "markdown",
    "oid",
    "positiveInt",
    "string",
    "time",
    "unsignedInt",
    "uri",
    "url",
    "uuid",
    "xhtml",
];

// ---------------------------------------------------------------------------
// Datatypes

const META: TypeDef = TypeDef {
    name: "Meta",
    is_resource: false,
    fields: &[
        prim("versionId", "id"),
        prim("lastUpdated", "instant"),
        prim("source", "uri"),
        prim_list("profile", "canonical"),
        complex_list("security", "Coding"),
        complex_list("tag", "Coding"),
    ],
};

const NARRATIVE: TypeDef = TypeDef {
    name: "Narrative",
    is_resource: false,
    fields: &[code("status", &NARRATIVE_STATUS), prim("div", "xhtml")],
};

static EXTENSION_VALUE_ARMS: &[ChoiceArm] = &[
    arm("Boolean", "boolean"),
    arm("Canonical", "canonical"),
    arm("Code", "code"),
    arm("Date", "date"),
    arm("DateTime", "dateTime"),
    arm("Decimal", "decimal"),
    arm("Id", "id"),
    arm("Instant", "instant"),
    arm("Integer", "integer"),
    arm("Markdown", "markdown"),
    arm("Oid", "oid"),
    arm("PositiveInt", "positiveInt"),
    arm("String", "string"),
    arm("Time", "time"),
    arm("UnsignedInt", "unsignedInt"),
    arm("Uri", "uri"),
    arm("Url", "url"),
    arm("Uuid", "uuid"),
    arm("Address", "Address"),
    arm("Annotation", "Annotation"),
    arm("CodeableConcept", "CodeableConcept"),
    arm("Coding", "Coding"),
    arm("ContactPoint", "ContactPoint"),
    arm("HumanName", "HumanName"),
    arm("Identifier", "Identifier"),
    arm("Period", "Period"),
    arm("Quantity", "Quantity"),
    arm("Reference", "Reference"),
];

const EXTENSION: TypeDef = TypeDef {
    name: "Extension",
    is_resource: false,
    fields: &[prim("url", "uri"), choice("value", EXTENSION_VALUE_ARMS)],
};

const CODING: TypeDef = TypeDef {
    name: "Coding",
    is_resource: false,
    fields: &[
        complex_list("extension", "Extension"),
        prim("system", "uri"),
        prim("version", "string"),
        prim("code", "code"),
        prim("display", "string"),
        prim("userSelected", "boolean"),
    ],
};

const CODEABLE_CONCEPT: TypeDef = TypeDef {
    name: "CodeableConcept",
    is_resource: false,
    fields: &[
        complex_list("extension", "Extension"),
        complex_list("coding", "Coding"),
        prim("text", "string"),
    ],
};

const IDENTIFIER: TypeDef = TypeDef {
    name: "Identifier",
    is_resource: false,
    fields: &[
        complex_list("extension", "Extension"),
        code("use", &IDENTIFIER_USE),
        complex("type", "CodeableConcept"),
        prim("system", "uri"),
        prim("value", "string"),
        complex("period", "Period"),
        complex("assigner", "Reference"),
    ],
};

const HUMAN_NAME: TypeDef = TypeDef {
    name: "HumanName",
    is_resource: false,
    fields: &[
        complex_list("extension", "Extension"),
        code("use", &NAME_USE),
        prim("text", "string"),
        prim("family", "string"),
        prim_list("given", "string"),
        prim_list("prefix", "string"),
        prim_list("suffix", "string"),
        complex("period", "Period"),
    ],
};

const CONTACT_POINT: TypeDef = TypeDef {
    name: "ContactPoint",
    is_resource: false,
    fields: &[
        complex_list("extension", "Extension"),
        code("system", &CONTACT_POINT_SYSTEM),
        prim("value", "string"),
        code("use", &CONTACT_POINT_USE),
        prim("rank", "positiveInt"),
        complex("period", "Period"),
    ],
};

const ADDRESS: TypeDef = TypeDef {
    name: "Address",
    is_resource: false,
    fields: &[
        complex_list("extension", "Extension"),
        code("use", &ADDRESS_USE),
        code("type", &ADDRESS_TYPE),
        prim("text", "string"),
        prim_list("line", "string"),
        prim("city", "string"),
        prim("district", "string"),
        prim("state", "string"),
        prim("postalCode", "string"),
        prim("country", "string"),
        complex("period", "Period"),
    ],
};

const PERIOD: TypeDef = TypeDef {
    name: "Period",
    is_resource: false,
    fields: &[
        complex_list("extension", "Extension"),
        prim("start", "dateTime"),
        prim("end", "dateTime"),
    ],
};

const QUANTITY: TypeDef = TypeDef {
    name: "Quantity",
    is_resource: false,
    fields: &[
        complex_list("extension", "Extension"),
        prim("value", "decimal"),
        prim("comparator", "code"),
        prim("unit", "string"),
        prim("system", "uri"),
        prim("code", "code"),
    ],
};

const REFERENCE: TypeDef = TypeDef {
    name: "Reference",
    is_resource: false,
    fields: &[
        complex_list("extension", "Extension"),
        prim("reference", "string"),
        prim("type", "uri"),
        complex("identifier", "Identifier"),
        prim("display", "string"),
    ],
};

static ANNOTATION_AUTHOR_ARMS: &[ChoiceArm] =
    &[arm("Reference", "Reference"), arm("String", "string")];

const ANNOTATION: TypeDef = TypeDef {
    name: "Annotation",
    is_resource: false,
    fields: &[
        complex_list("extension", "Extension"),
        choice("author", ANNOTATION_AUTHOR_ARMS),
        prim("time", "dateTime"),
        prim("text", "markdown"),
    ],
};

// ---------------------------------------------------------------------------
// Resources

fn domain_resource_fields() -> Vec<FieldDef> {
    vec![
        prim("id", "id"),
        complex("meta", "Meta"),
        complex("text", "Narrative"),
        complex_list("extension", "Extension"),
        complex_list("modifierExtension", "Extension"),
    ]
}

static PATIENT_DECEASED_ARMS: &[ChoiceArm] =
    &[arm("Boolean", "boolean"), arm("DateTime", "dateTime")];
static PATIENT_MULTIPLE_BIRTH_ARMS: &[ChoiceArm] =
    &[arm("Boolean", "boolean"), arm("Integer", "integer")];

static PATIENT_FIELDS: LazyLock<Vec<FieldDef>> = LazyLock::new(|| {
    let mut fields = domain_resource_fields();
    fields.extend([
        complex_list("identifier", "Identifier"),
        prim("active", "boolean"),
        complex_list("name", "HumanName"),
        complex_list("telecom", "ContactPoint"),
        code("gender", &ADMINISTRATIVE_GENDER),
        prim("birthDate", "date"),
        choice("deceased", PATIENT_DECEASED_ARMS),
        complex_list("address", "Address"),
        complex("maritalStatus", "CodeableConcept"),
        choice("multipleBirth", PATIENT_MULTIPLE_BIRTH_ARMS),
        complex_list("generalPractitioner", "Reference"),
        complex("managingOrganization", "Reference"),
    ]);
    fields
});

static OBSERVATION_EFFECTIVE_ARMS: &[ChoiceArm] = &[
    arm("DateTime", "dateTime"),
    arm("Period", "Period"),
    arm("Instant", "instant"),
];
static OBSERVATION_VALUE_ARMS: &[ChoiceArm] = &[
    arm("Quantity", "Quantity"),
    arm("CodeableConcept", "CodeableConcept"),
    arm("String", "string"),
    arm("Boolean", "boolean"),
    arm("Integer", "integer"),
    arm("Period", "Period"),
    arm("DateTime", "dateTime"),
    arm("Time", "time"),
];

static OBSERVATION_FIELDS: LazyLock<Vec<FieldDef>> = LazyLock::new(|| {
    let mut fields = domain_resource_fields();
    fields.extend([
        complex_list("identifier", "Identifier"),
        code("status", &OBSERVATION_STATUS),
        complex_list("category", "CodeableConcept"),
        complex("code", "CodeableConcept"),
        complex("subject", "Reference"),
        complex("encounter", "Reference"),
        choice("effective", OBSERVATION_EFFECTIVE_ARMS),
        prim("issued", "instant"),
        complex_list("performer", "Reference"),
        choice("value", OBSERVATION_VALUE_ARMS),
        complex("dataAbsentReason", "CodeableConcept"),
        complex_list("interpretation", "CodeableConcept"),
        complex_list("note", "Annotation"),
        complex("bodySite", "CodeableConcept"),
        complex("method", "CodeableConcept"),
    ]);
    fields
});

static ENCOUNTER_FIELDS: LazyLock<Vec<FieldDef>> = LazyLock::new(|| {
    let mut fields = domain_resource_fields();
    fields.extend([
        complex_list("identifier", "Identifier"),
        code("status", &ENCOUNTER_STATUS),
        // reserved-name alias: FHIRPath `class`, storage `classValue`
        FieldDef {
            storage: "classValue",
            ..complex("class", "Coding")
        },
        complex_list("type", "CodeableConcept"),
        complex("priority", "CodeableConcept"),
        complex("subject", "Reference"),
        complex("period", "Period"),
        complex_list("reasonCode", "CodeableConcept"),
    ]);
    fields
});

const BUNDLE_ENTRY: TypeDef = TypeDef {
    name: "Bundle.entry",
    is_resource: false,
    fields: &[
        complex_list("extension", "Extension"),
        prim("fullUrl", "uri"),
        FieldDef {
            name: "resource",
            storage: "resource",
            kind: FieldKind::ContainedResource,
            cardinality: Cardinality::Singleton,
            element_type: "Resource",
            choice_arms: &[],
            enum_binding: None,
        },
    ],
};

const BUNDLE: TypeDef = TypeDef {
    name: "Bundle",
    is_resource: true,
    fields: &[
        prim("id", "id"),
        complex("meta", "Meta"),
        complex("identifier", "Identifier"),
        code("type", &BUNDLE_TYPE),
        prim("timestamp", "instant"),
        prim("total", "unsignedInt"),
        complex_list("entry", "Bundle.entry"),
    ],
};

static IMAGING_STUDY_FIELDS: LazyLock<Vec<FieldDef>> = LazyLock::new(|| {
    let mut fields = domain_resource_fields();
    fields.extend([
        complex_list("identifier", "Identifier"),
        code("status", &IMAGINGSTUDY_STATUS),
        complex("subject", "Reference"),
        prim("started", "dateTime"),
        prim("numberOfSeries", "unsignedInt"),
        prim("numberOfInstances", "unsignedInt"),
        prim("description", "string"),
    ]);
    fields
});

static REQUEST_GROUP_FIELDS: LazyLock<Vec<FieldDef>> = LazyLock::new(|| {
    let mut fields = domain_resource_fields();
    fields.extend([
        complex_list("identifier", "Identifier"),
        code("status", &REQUEST_STATUS),
        code("intent", &REQUEST_INTENT),
        complex("code", "CodeableConcept"),
        complex("subject", "Reference"),
        prim("authoredOn", "dateTime"),
    ]);
    fields
});

// ---------------------------------------------------------------------------
// Index

static DATATYPES: &[&TypeDef] = &[
    &META,
    &NARRATIVE,
    &EXTENSION,
    &CODING,
    &CODEABLE_CONCEPT,
    &IDENTIFIER,
    &HUMAN_NAME,
    &CONTACT_POINT,
    &ADDRESS,
    &PERIOD,
    &QUANTITY,
    &REFERENCE,
    &ANNOTATION,
    &BUNDLE_ENTRY,
    &BUNDLE,
];

static TYPE_INDEX: LazyLock<HashMap<&'static str, TypeDef>> = LazyLock::new(|| {
    let mut index: HashMap<&'static str, TypeDef> = HashMap::new();

    for def in DATATYPES {
        index.insert(
            def.name,
            TypeDef {
                name: def.name,
                is_resource: def.is_resource,
                fields: def.fields,
            },
        );
    }

    let resources: [(&'static str, &'static [FieldDef]); 5] = [
        ("Patient", PATIENT_FIELDS.as_slice()),
        ("Observation", OBSERVATION_FIELDS.as_slice()),
        ("Encounter", ENCOUNTER_FIELDS.as_slice()),
        ("ImagingStudy", IMAGING_STUDY_FIELDS.as_slice()),
        ("RequestGroup", REQUEST_GROUP_FIELDS.as_slice()),
    ];
    for (name, fields) in resources {
        index.insert(
            name,
            TypeDef {
                name,
                is_resource: true,
                fields,
            },
        );
    }

    index
});

/// Looks up a type descriptor by name.
pub fn type_def(name: &str) -> Option<&'static TypeDef> {
    TYPE_INDEX.get(name)
}

pub fn is_primitive_type(name: &str) -> bool {
    PRIMITIVE_TYPES.contains(&name)
}

pub fn is_resource_type(name: &str) -> bool {
    type_def(name).is_some_and(|def| def.is_resource)
}

/// Resolves a FHIRPath field name against a type: direct fields first,
/// then type-suffixed choice arms (`valueString`).
pub fn resolve_field(type_name: &str, field: &str) -> Result<FieldRef, FhirPathError> {
    let def = type_def(type_name).ok_or_else(|| FhirPathError::InvalidField(field.to_string()))?;

    if let Some(field_def) = def.fields.iter().find(|f| f.name == field) {
        return Ok(FieldRef::Field(field_def));
    }

    for field_def in def.fields.iter().filter(|f| f.kind == FieldKind::Choice) {
        for arm in field_def.choice_arms {
            if field.len() == field_def.name.len() + arm.suffix.len()
                && field.starts_with(field_def.name)
                && field.ends_with(arm.suffix)
            {
                return Ok(FieldRef::Arm(field_def, arm));
            }
        }
    }

    Err(FhirPathError::InvalidField(format!("{}.{}", type_name, field)))
}

/// Looks up a direct field (no choice-arm resolution).
pub fn field_def(type_name: &str, field: &str) -> Result<&'static FieldDef, FhirPathError> {
    match resolve_field(type_name, field)? {
        FieldRef::Field(def) => Ok(def),
        FieldRef::Arm(..) => Err(FhirPathError::InvalidField(format!(
            "{}.{}",
            type_name, field
        ))),
    }
}

/// Validates a code against a binding. Only the canonical form
/// (lowercase, dash-separated) is accepted.
pub fn enum_canonicalize<'a>(
    binding: &'static EnumBinding,
    input: &'a str,
) -> Result<&'a str, FhirPathError> {
    if binding.codes.contains(&input) {
        Ok(input)
    } else {
        Err(FhirPathError::InvalidEnum {
            code: input.to_string(),
            value_set: binding.value_set,
        })
    }
}

/// Checks the value bounds of the sized integer primitives.
pub fn integer_in_bounds(type_name: &str, value: i32) -> bool {
    match type_name {
        "positiveInt" => value >= 1,
        "unsignedInt" => value >= 0,
        _ => true,
    }
}

impl Clone for FieldDef {
    fn clone(&self) -> Self {
        FieldDef {
            name: self.name,
            storage: self.storage,
            kind: self.kind,
            cardinality: self.cardinality,
            element_type: self.element_type,
            choice_arms: self.choice_arms,
            enum_binding: self.enum_binding,
        }
    }
}
