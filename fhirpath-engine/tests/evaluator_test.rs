// FHIRPath Evaluator Tests
//
// Operator semantics, path navigation, three-valued logic and the
// environment variable surface.

use fhirpath_engine::errors::FhirPathError;
use fhirpath_engine::model::normalize;
use fhirpath_engine::{compile, evaluate, Collection, Element, EvaluateOptions, FhirPathValue};
use serde_json::json;

fn patient() -> Element {
    Element::resource_from_json(&json!({
        "resourceType": "Patient",
        "id": "example",
        "active": true,
        "gender": "male",
        "birthDate": "1993-05-16",
        "name": [
            {"family": "Jones", "given": ["Betty", "Sue"]}
        ],
        "telecom": [
            {"system": "phone", "value": "555-1234", "rank": 2},
            {"system": "email", "value": "betty@example.com"}
        ]
    }))
    .unwrap()
}

fn eval(source: &str, resource: &Element) -> Collection {
    evaluate(source, &[resource.clone()]).unwrap()
}

/// Normalized values, with FHIR primitives unwrapped for assertions.
fn values(collection: &Collection) -> Vec<FhirPathValue> {
    collection.iter().map(normalize).collect()
}

fn strings(collection: &Collection) -> Vec<String> {
    values(collection)
        .into_iter()
        .map(|value| match value {
            FhirPathValue::String(s) => s,
            other => panic!("expected string, got {:?}", other),
        })
        .collect()
}

#[test]
fn test_field_navigation() {
    let patient = patient();
    let result = eval("Patient.name.family", &patient);
    assert_eq!(strings(&result), vec!["Jones"]);

    let result = eval("Patient.name.given", &patient);
    assert_eq!(strings(&result), vec!["Betty", "Sue"]);
}

#[test]
fn test_resource_type_filter() {
    let patient = patient();
    assert_eq!(eval("Patient", &patient).len(), 1);
    // a different resource type filters everything out
    assert!(eval("Observation", &patient).is_empty());
}

#[test]
fn test_unknown_field_is_an_error() {
    let patient = patient();
    assert!(matches!(
        evaluate("Patient.notAField", &[patient]),
        Err(FhirPathError::InvalidField(_))
    ));
}

#[test]
fn test_unset_field_is_empty() {
    let patient = patient();
    assert!(eval("Patient.maritalStatus", &patient).is_empty());
}

#[test]
fn test_literals() {
    let patient = patient();
    assert_eq!(
        values(&eval("42", &patient)),
        vec![FhirPathValue::Integer(42)]
    );
    assert_eq!(
        values(&eval("'text'", &patient)),
        vec![FhirPathValue::String("text".to_string())]
    );
    assert!(eval("{}", &patient).is_empty());
}

#[test]
fn test_indexing() {
    let patient = patient();
    assert_eq!(strings(&eval("Patient.name.given[0]", &patient)), vec!["Betty"]);
    assert_eq!(strings(&eval("Patient.name.given[1]", &patient)), vec!["Sue"]);
    assert!(eval("Patient.name.given[2]", &patient).is_empty());
    assert!(eval("Patient.name.given[-1]", &patient).is_empty());
}

#[test]
fn test_arithmetic() {
    let patient = patient();
    assert_eq!(values(&eval("1 + 2 * 3", &patient)), vec![FhirPathValue::Integer(7)]);
    assert_eq!(values(&eval("7 div 2", &patient)), vec![FhirPathValue::Integer(3)]);
    assert_eq!(values(&eval("7 mod 2", &patient)), vec![FhirPathValue::Integer(1)]);
    assert_eq!(
        values(&eval("7 / 2", &patient)),
        vec![FhirPathValue::Decimal("3.5".parse().unwrap())]
    );
    assert_eq!(
        strings(&eval("'foo' + 'bar'", &patient)),
        vec!["foobar"]
    );
}

#[test]
fn test_division_by_zero_is_empty() {
    let patient = patient();
    assert!(eval("1 / 0", &patient).is_empty());
    assert!(eval("1 mod 0", &patient).is_empty());
    assert!(matches!(
        evaluate("1 div 0", &[patient]),
        Err(FhirPathError::DivideByZero)
    ));
}

#[test]
fn test_empty_propagation_through_operators() {
    let patient = patient();
    for source in ["1 + {}", "{} + 1", "{} = 1", "1 != {}", "{} < 1", "1 >= {}", "-{}"] {
        assert!(
            eval(source, &patient).is_empty(),
            "expected empty for '{}'",
            source
        );
    }
}

#[test]
fn test_three_valued_logic_tables() {
    let patient = patient();
    let truth = |source: &str| -> Option<bool> {
        let result = eval(source, &patient);
        match values(&result).first() {
            Some(FhirPathValue::Boolean(b)) => Some(*b),
            None => None,
            other => panic!("expected boolean, got {:?}", other),
        }
    };

    // and
    assert_eq!(truth("true and true"), Some(true));
    assert_eq!(truth("true and false"), Some(false));
    assert_eq!(truth("true and {}"), None);
    assert_eq!(truth("false and {}"), Some(false));
    assert_eq!(truth("{} and {}"), None);

    // or
    assert_eq!(truth("false or false"), Some(false));
    assert_eq!(truth("true or {}"), Some(true));
    assert_eq!(truth("false or {}"), None);

    // xor
    assert_eq!(truth("true xor false"), Some(true));
    assert_eq!(truth("true xor true"), Some(false));
    assert_eq!(truth("true xor {}"), None);
    assert_eq!(truth("{} xor false"), None);

    // implies
    assert_eq!(truth("false implies {}"), Some(true));
    assert_eq!(truth("true implies true"), Some(true));
    assert_eq!(truth("true implies false"), Some(false));
    assert_eq!(truth("true implies {}"), None);
    assert_eq!(truth("{} implies true"), Some(true));
    assert_eq!(truth("{} implies false"), None);
}

#[test]
fn test_equality_over_elements() {
    let patient = patient();
    assert_eq!(
        values(&eval("Patient.active = true", &patient)),
        vec![FhirPathValue::Boolean(true)]
    );
    assert_eq!(
        values(&eval("Patient.gender = 'male'", &patient)),
        vec![FhirPathValue::Boolean(true)]
    );
}

#[test]
fn test_equivalence() {
    let patient = patient();
    assert_eq!(
        values(&eval("'Hello   World' ~ 'hello world'", &patient)),
        vec![FhirPathValue::Boolean(true)]
    );
    assert_eq!(
        values(&eval("{} ~ {}", &patient)),
        vec![FhirPathValue::Boolean(true)]
    );
    assert_eq!(
        values(&eval("'a' !~ 'b'", &patient)),
        vec![FhirPathValue::Boolean(true)]
    );
}

#[test]
fn test_temporal_comparison_with_precision() {
    let patient = patient();
    assert_eq!(
        values(&eval("@2012 < @2013", &patient)),
        vec![FhirPathValue::Boolean(true)]
    );
    // same prefix, different precision: indeterminate
    assert!(eval("@2012 = @2012-04", &patient).is_empty());
    assert!(eval("@2012 < @2012-04", &patient).is_empty());
}

#[test]
fn test_date_arithmetic() {
    let patient = patient();
    let result = eval("@1993-05-16 + 7 days", &patient);
    assert_eq!(
        values(&result),
        vec![FhirPathValue::Date(
            fhirpath_engine::datetime::PrecisionDate::parse("1993-05-23").unwrap()
        )]
    );
}

#[test]
fn test_membership() {
    let patient = patient();
    assert_eq!(
        values(&eval("'Betty' in Patient.name.given", &patient)),
        vec![FhirPathValue::Boolean(true)]
    );
    assert_eq!(
        values(&eval("Patient.name.given contains 'Sue'", &patient)),
        vec![FhirPathValue::Boolean(true)]
    );
    assert_eq!(
        values(&eval("'Bob' in Patient.name.given", &patient)),
        vec![FhirPathValue::Boolean(false)]
    );
}

#[test]
fn test_union_deduplicates() {
    let patient = patient();
    let result = eval("Patient.name.given | Patient.name.given", &patient);
    assert_eq!(result.len(), 2);
}

#[test]
fn test_comparison_requires_singletons() {
    let patient = patient();
    assert!(matches!(
        evaluate("Patient.name.given < 'a'", &[patient]),
        Err(FhirPathError::NotSingleton(2))
    ));
}

#[test]
fn test_type_operators() {
    let patient = patient();
    assert_eq!(
        values(&eval("Patient.birthDate is Date", &patient)),
        vec![FhirPathValue::Boolean(true)]
    );
    assert_eq!(
        values(&eval("Patient.birthDate is FHIR.date", &patient)),
        vec![FhirPathValue::Boolean(true)]
    );
    assert_eq!(
        values(&eval("1 is System.Integer", &patient)),
        vec![FhirPathValue::Boolean(true)]
    );
    assert_eq!(
        values(&eval("1 is String", &patient)),
        vec![FhirPathValue::Boolean(false)]
    );
    assert_eq!(eval("Patient.name[0] as HumanName", &patient).len(), 1);
    assert!(eval("Patient.name[0] as Period", &patient).is_empty());
}

#[test]
fn test_env_variables() {
    let patient = patient();
    let expr = compile("%context.name.given").unwrap();
    let result = expr.evaluate(&[patient.clone()]).unwrap();
    assert_eq!(result.len(), 2);

    let expr = compile("%threshold").unwrap();
    let options = EvaluateOptions::new()
        .with_env_variable("threshold", FhirPathValue::Integer(5))
        .unwrap();
    let result = expr.evaluate_with_options(&[patient.clone()], &options).unwrap();
    assert_eq!(values(&result), vec![FhirPathValue::Integer(5)]);

    assert!(matches!(
        evaluate("%unbound", &[patient]),
        Err(FhirPathError::UndefinedEnvVar(name)) if name == "unbound"
    ));
}

#[test]
fn test_ucum_constant() {
    let patient = patient();
    assert_eq!(
        strings(&eval("%ucum", &patient)),
        vec!["http://unitsofmeasure.org"]
    );
}

#[test]
fn test_evaluation_is_pure() {
    let patient = patient();
    let before = patient.to_json();

    let expr = compile("Patient.telecom.where(system = 'phone').rank").unwrap();
    let first = expr.evaluate(&[patient.clone()]).unwrap();
    let second = expr.evaluate(&[patient.clone()]).unwrap();

    assert_eq!(first, second);
    assert_eq!(patient.to_json(), before);
}

#[test]
fn test_this_variable() {
    let patient = patient();
    let result = eval("Patient.name.given.where($this = 'Sue')", &patient);
    assert_eq!(strings(&result), vec!["Sue"]);
}

#[test]
fn test_string_concatenation_treats_empty_as_blank() {
    let patient = patient();
    assert_eq!(strings(&eval("'a' & {}", &patient)), vec!["a"]);
    assert_eq!(strings(&eval("{} & 'b'", &patient)), vec!["b"]);
    assert_eq!(strings(&eval("'a' & 'b'", &patient)), vec!["ab"]);
}
