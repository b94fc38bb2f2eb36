// End-to-end scenarios: compile-once/evaluate-many, the fixed clock,
// search parameter escaping and the patch round trips.

use chrono::{FixedOffset, TimeZone};
use fhirpath_engine::model::normalize;
use fhirpath_engine::patch::{self, Options};
use fhirpath_engine::{compile, search_param, Collection, Element, EvaluateOptions, FhirPathValue};
use fhirpath_engine::datetime::PrecisionDate;
use serde_json::json;

fn strings(collection: &Collection) -> Vec<String> {
    collection
        .iter()
        .map(normalize)
        .map(|value| match value {
            FhirPathValue::String(s) => s,
            other => panic!("expected string, got {:?}", other),
        })
        .collect()
}

#[test]
fn test_first_given_name() {
    let patient = Element::resource_from_json(&json!({
        "resourceType": "Patient",
        "name": [{"given": ["Betty", "Sue"]}]
    }))
    .unwrap();

    let expr = compile("Patient.name.given.first()").unwrap();
    let result = expr.evaluate(&[patient]).unwrap();
    assert_eq!(strings(&result), vec!["Betty"]);
}

#[test]
fn test_filtered_telecom_rank() {
    let patient = Element::resource_from_json(&json!({
        "resourceType": "Patient",
        "telecom": [
            {"system": "phone", "rank": 2},
            {"system": "email"}
        ]
    }))
    .unwrap();

    let expr = compile("Patient.telecom.where(system = 'phone').rank").unwrap();
    let result = expr.evaluate(&[patient]).unwrap();
    let values: Vec<FhirPathValue> = result.iter().map(normalize).collect();
    assert_eq!(values, vec![FhirPathValue::Integer(2)]);
}

#[test]
fn test_now_uses_the_context_clock() {
    let patient = Element::resource_from_json(&json!({"resourceType": "Patient"})).unwrap();

    let now = FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2010, 2, 12, 12, 30, 34)
        .unwrap()
        + chrono::Duration::milliseconds(2);
    let options = EvaluateOptions::new().with_now(now);

    let expr = compile("now()").unwrap();
    let result = expr.evaluate_with_options(&[patient], &options).unwrap();

    assert_eq!(result.len(), 1);
    let FhirPathValue::DateTime(datetime) = result.get(0).unwrap() else {
        panic!("expected dateTime");
    };
    assert_eq!(datetime.to_string(), "2010-02-12T12:30:34.002Z");
}

#[test]
fn test_search_param_escaping() {
    assert_eq!(
        search_param::escape(r"C:\bin\go foo, bar, baz | omg $500!"),
        r"C:\\bin\\go foo\, bar\, baz \| omg \$500!"
    );
}

#[test]
fn test_add_birth_date_to_empty_patient() {
    let patient = Element::resource_from_json(&json!({"resourceType": "Patient"})).unwrap();
    let value = FhirPathValue::Element(Element::date(PrecisionDate::parse("1993-05-16").unwrap()));

    patch::add(&patient, "Patient", "birthDate", &value, &Options::default()).unwrap();

    assert_eq!(
        patient.to_json(),
        json!({"resourceType": "Patient", "birthDate": "1993-05-16"})
    );
}

#[test]
fn test_add_refuses_to_overwrite_active() {
    let patient = Element::resource_from_json(&json!({
        "resourceType": "Patient",
        "active": true
    }))
    .unwrap();

    let err = patch::add(
        &patient,
        "Patient",
        "active",
        &FhirPathValue::Boolean(false),
        &Options::default(),
    )
    .unwrap_err();
    assert!(matches!(err, fhirpath_engine::FhirPathError::NotPatchable(_)));
}

#[test]
fn test_delete_second_given_name() {
    let patient = Element::resource_from_json(&json!({
        "resourceType": "Patient",
        "name": [{"given": ["Betty", "Sue"]}]
    }))
    .unwrap();

    patch::delete(&patient, "Patient.name.given[1]").unwrap();

    assert_eq!(
        patient.to_json(),
        json!({"resourceType": "Patient", "name": [{"given": ["Betty"]}]})
    );
}

#[test]
fn test_insert_given_name_at_front() {
    let patient = Element::resource_from_json(&json!({
        "resourceType": "Patient",
        "name": [{"given": ["IU"]}]
    }))
    .unwrap();

    let value = FhirPathValue::Element(Element::string("Jieun"));
    patch::insert(&patient, "Patient.name[0].given", &value, 0).unwrap();
    assert_eq!(
        patient.to_json(),
        json!({"resourceType": "Patient", "name": [{"given": ["Jieun", "IU"]}]})
    );

    let err = patch::insert(&patient, "Patient.name[0].given", &value, 42).unwrap_err();
    assert!(matches!(err, fhirpath_engine::FhirPathError::NotPatchable(_)));
}

#[test]
fn test_enum_codes_must_be_canonical() {
    let patient = Element::resource_from_json(&json!({"resourceType": "Patient"})).unwrap();
    let male = FhirPathValue::String("male".to_string());
    let shouting = FhirPathValue::String("MALE".to_string());

    patch::add(&patient, "Patient", "gender", &male, &Options::default()).unwrap();

    let patient = Element::resource_from_json(&json!({"resourceType": "Patient"})).unwrap();
    assert!(matches!(
        patch::add(&patient, "Patient", "gender", &shouting, &Options::default()),
        Err(fhirpath_engine::FhirPathError::InvalidEnum { .. })
    ));
}

#[test]
fn test_compiled_expression_is_reusable() {
    let expr = compile("Patient.name.given.count()").unwrap();
    assert_eq!(expr.source(), "Patient.name.given.count()");

    for count in 1..=3 {
        let given: Vec<String> = (0..count).map(|i| format!("name{}", i)).collect();
        let patient = Element::resource_from_json(&json!({
            "resourceType": "Patient",
            "name": [{"given": given}]
        }))
        .unwrap();
        let result = expr.evaluate(&[patient]).unwrap();
        let values: Vec<FhirPathValue> = result.iter().map(normalize).collect();
        assert_eq!(values, vec![FhirPathValue::Integer(count)]);
    }
}

#[test]
fn test_bundle_contained_resources_unwrap() {
    let bundle = Element::resource_from_json(&json!({
        "resourceType": "Bundle",
        "type": "searchset",
        "entry": [
            {"resource": {"resourceType": "Patient", "name": [{"given": ["Ada"]}]}},
            {"resource": {"resourceType": "Observation", "status": "final", "code": {"text": "x"}}}
        ]
    }))
    .unwrap();

    let expr = compile("Bundle.entry.resource.ofType(Patient).name.given").unwrap();
    let result = expr.evaluate(&[bundle]).unwrap();
    assert_eq!(strings(&result), vec!["Ada"]);
}

#[test]
fn test_narrative_wraps_raw_xhtml() {
    let narrative = Element::narrative("<div>hello</div>");
    assert_eq!(
        narrative.to_json(),
        json!({"status": "generated", "div": "<div>hello</div>"})
    );
}
