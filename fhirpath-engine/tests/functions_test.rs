// FHIRPath Function Library Tests

use fhirpath_engine::errors::FhirPathError;
use fhirpath_engine::model::normalize;
use fhirpath_engine::{compile, evaluate, Collection, Element, EvaluateOptions, FhirPathValue};
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;

fn patient() -> Element {
    Element::resource_from_json(&json!({
        "resourceType": "Patient",
        "id": "example",
        "active": true,
        "gender": "male",
        "name": [
            {"family": "Jones", "given": ["Betty", "Sue", "Betty"]}
        ],
        "telecom": [
            {"system": "phone", "value": "555-1234", "rank": 2},
            {"system": "email", "value": "betty@example.com"}
        ],
        "extension": [
            {"url": "http://example.org/birthPlace", "valueString": "Winnipeg"},
            {"url": "http://example.org/other", "valueInteger": 4}
        ]
    }))
    .unwrap()
}

fn eval(source: &str, resource: &Element) -> Collection {
    evaluate(source, &[resource.clone()]).unwrap()
}

fn values(collection: &Collection) -> Vec<FhirPathValue> {
    collection.iter().map(normalize).collect()
}

fn boolean(collection: &Collection) -> bool {
    match values(collection).as_slice() {
        [FhirPathValue::Boolean(b)] => *b,
        other => panic!("expected a boolean singleton, got {:?}", other),
    }
}

fn integer(collection: &Collection) -> i32 {
    match values(collection).as_slice() {
        [FhirPathValue::Integer(i)] => *i,
        other => panic!("expected an integer singleton, got {:?}", other),
    }
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
fn test_existence_functions() {
    let patient = patient();
    assert!(boolean(&eval("Patient.name.exists()", &patient)));
    assert!(boolean(&eval("Patient.maritalStatus.empty()", &patient)));
    assert!(!boolean(&eval("Patient.name.empty()", &patient)));
    assert!(boolean(&eval(
        "Patient.telecom.exists(system = 'email')",
        &patient
    )));
    assert!(!boolean(&eval(
        "Patient.telecom.exists(system = 'fax')",
        &patient
    )));
    assert!(boolean(&eval(
        "Patient.name.given.all($this.length() >= 3)",
        &patient
    )));
    assert_eq!(integer(&eval("Patient.name.given.count()", &patient)), 3);
}

#[test]
fn test_boolean_collection_functions() {
    let patient = patient();
    assert!(boolean(&eval("(true | false).anyTrue()", &patient)));
    assert!(!boolean(&eval("(true.combine(false)).allTrue()", &patient)));
    assert!(boolean(&eval("{}.allTrue()", &patient)));
    assert!(boolean(&eval("(true.combine(false)).anyFalse()", &patient)));
}

#[test]
fn test_subset_functions() {
    let patient = patient();
    assert!(boolean(&eval(
        "Patient.name.given.first().subsetOf(Patient.name.given)",
        &patient
    )));
    assert!(boolean(&eval(
        "Patient.name.given.supersetOf(Patient.name.given.first())",
        &patient
    )));
}

#[test]
fn test_distinct() {
    let patient = patient();
    assert_eq!(eval("Patient.name.given.distinct()", &patient).len(), 2);
    assert!(!boolean(&eval("Patient.name.given.isDistinct()", &patient)));
    assert!(boolean(&eval("Patient.telecom.isDistinct()", &patient)));
}

#[test]
fn test_where_and_select() {
    let patient = patient();
    let result = eval("Patient.telecom.where(system = 'phone').value", &patient);
    assert_eq!(strings(&result), vec!["555-1234"]);

    let result = eval("Patient.name.select(given.count())", &patient);
    assert_eq!(values(&result), vec![FhirPathValue::Integer(3)]);
}

#[test]
fn test_subsetting_functions() {
    let patient = patient();
    assert_eq!(strings(&eval("Patient.name.given.first()", &patient)), vec!["Betty"]);
    assert_eq!(strings(&eval("Patient.name.given.last()", &patient)), vec!["Betty"]);
    assert_eq!(
        strings(&eval("Patient.name.given.tail()", &patient)),
        vec!["Sue", "Betty"]
    );
    assert_eq!(
        strings(&eval("Patient.name.given.skip(1)", &patient)),
        vec!["Sue", "Betty"]
    );
    assert_eq!(strings(&eval("Patient.name.given.take(1)", &patient)), vec!["Betty"]);
    assert!(eval("{}.first()", &patient).is_empty());
}

#[test]
fn test_single_requires_one_item() {
    let patient = patient();
    assert_eq!(eval("Patient.name.single()", &patient).len(), 1);
    assert!(eval("{}.single()", &patient).is_empty());
    assert!(matches!(
        evaluate("Patient.name.given.single()", &[patient]),
        Err(FhirPathError::NotSingleton(3))
    ));
}

#[test]
fn test_combining_functions() {
    let patient = patient();
    // union deduplicates, combine does not
    assert_eq!(
        eval("Patient.name.given.union(Patient.name.given)", &patient).len(),
        2
    );
    assert_eq!(
        eval("Patient.name.given.combine(Patient.name.given)", &patient).len(),
        6
    );
    assert_eq!(
        strings(&eval("Patient.name.given.intersect('Sue')", &patient)),
        vec!["Sue"]
    );
    assert_eq!(
        strings(&eval("Patient.name.given.exclude('Betty')", &patient)),
        vec!["Sue"]
    );
}

#[test]
fn test_iif_evaluates_one_branch() {
    let patient = patient();
    assert_eq!(
        strings(&eval("iif(Patient.active, 'on', 'off')", &patient)),
        vec!["on"]
    );
    assert_eq!(
        strings(&eval("iif(Patient.active.not(), 'on', 'off')", &patient)),
        vec!["off"]
    );
    assert!(eval("iif({}, 'on')", &patient).is_empty());
    // the untaken branch must not run: 1/0 would be empty, not an error,
    // but an unknown field would fail if evaluated
    assert_eq!(
        strings(&eval("iif(true, 'on', Patient.notAField)", &patient)),
        vec!["on"]
    );
}

#[test]
fn test_conversions() {
    let patient = patient();
    assert!(boolean(&eval("'true'.toBoolean()", &patient)));
    assert!(boolean(&eval("1.toBoolean()", &patient)));
    assert!(eval("'maybe'.toBoolean()", &patient).is_empty());
    assert!(boolean(&eval("'1'.convertsToInteger()", &patient)));
    assert!(!boolean(&eval("'one'.convertsToInteger()", &patient)));
    assert_eq!(integer(&eval("'42'.toInteger()", &patient)), 42);
    assert_eq!(
        values(&eval("'3.14'.toDecimal()", &patient)),
        vec![FhirPathValue::Decimal("3.14".parse().unwrap())]
    );
    assert_eq!(strings(&eval("42.toString()", &patient)), vec!["42"]);
    assert_eq!(strings(&eval("true.toString()", &patient)), vec!["true"]);
    assert!(boolean(&eval("'2012-04-15'.convertsToDate()", &patient)));
    assert!(boolean(&eval("'14:34:28'.convertsToTime()", &patient)));
    assert!(boolean(&eval("@2012-04-15 = '2012-04-15'.toDate()", &patient)));
    assert!(boolean(&eval("1.convertsToQuantity()", &patient)));
    assert!(boolean(&eval("(4 days).toQuantity() = 4 'day'", &patient)));
}

#[test]
fn test_of_type() {
    let patient = patient();
    let result = eval("Patient.extension.value.ofType(String)", &patient);
    assert_eq!(strings(&result), vec!["Winnipeg"]);
    let result = eval("Patient.extension.value.ofType(Integer)", &patient);
    assert_eq!(values(&result), vec![FhirPathValue::Integer(4)]);
}

#[test]
fn test_string_functions() {
    let patient = patient();
    assert_eq!(integer(&eval("'hello'.length()", &patient)), 5);
    assert_eq!(integer(&eval("'hello'.indexOf('ll')", &patient)), 2);
    assert_eq!(integer(&eval("'hello'.indexOf('x')", &patient)), -1);
    assert_eq!(strings(&eval("'hello'.substring(1)", &patient)), vec!["ello"]);
    assert_eq!(strings(&eval("'hello'.substring(1, 3)", &patient)), vec!["ell"]);
    assert!(eval("'hello'.substring(9)", &patient).is_empty());
    assert!(boolean(&eval("'hello'.startsWith('he')", &patient)));
    assert!(boolean(&eval("'hello'.endsWith('lo')", &patient)));
    assert!(boolean(&eval("'hello'.contains('ell')", &patient)));
    assert_eq!(strings(&eval("'hello'.upper()", &patient)), vec!["HELLO"]);
    assert_eq!(strings(&eval("'HELLO'.lower()", &patient)), vec!["hello"]);
    assert_eq!(
        strings(&eval("'banana'.replace('an', 'o')", &patient)),
        vec!["boa"]
    );
    assert!(boolean(&eval("'555-1234'.matches('^[0-9-]+$')", &patient)));
    assert_eq!(
        strings(&eval(r"'abc123'.replaceMatches('[0-9]+', '#')", &patient)),
        vec!["abc#"]
    );
    assert_eq!(eval("'abc'.toChars()", &patient).len(), 3);
    assert_eq!(
        strings(&eval("'a,b,c'.split(',')", &patient)),
        vec!["a", "b", "c"]
    );
    assert_eq!(
        strings(&eval("Patient.name.given.distinct().join(', ')", &patient)),
        vec!["Betty, Sue"]
    );
    assert_eq!(strings(&eval("'  pad  '.trim()", &patient)), vec!["pad"]);
    // empty input propagates
    assert!(eval("{}.length()", &patient).is_empty());
}

#[test]
fn test_math_functions() {
    let patient = patient();
    assert_eq!(integer(&eval("(-5).abs()", &patient)), 5);
    assert_eq!(integer(&eval("2.5.ceiling()", &patient)), 3);
    assert_eq!(integer(&eval("2.5.floor()", &patient)), 2);
    assert_eq!(integer(&eval("2.5.truncate()", &patient)), 2);
    assert_eq!(
        values(&eval("3.14159.round(2)", &patient)),
        vec![FhirPathValue::Decimal("3.14".parse().unwrap())]
    );
    assert_eq!(
        values(&eval("9.sqrt().round(6)", &patient)),
        vec![FhirPathValue::Decimal("3".parse().unwrap())]
    );
    assert!(eval("(-1).sqrt()", &patient).is_empty());
    assert_eq!(integer(&eval("2.power(10)", &patient)), 1024);
    assert!(eval("(-1).ln()", &patient).is_empty());
    assert_eq!(
        values(&eval("100.log(10).round(6)", &patient)),
        vec![FhirPathValue::Decimal("2".parse().unwrap())]
    );
}

#[test]
fn test_children_and_descendants() {
    let patient = patient();
    let children = eval("Patient.name.children()", &patient);
    // family + three given
    assert_eq!(children.len(), 4);

    let descendants = eval("Patient.descendants()", &patient);
    let children = eval("Patient.children()", &patient);
    assert!(descendants.len() > children.len());
}

#[test]
fn test_extension_function() {
    let patient = patient();
    let result = eval(
        "Patient.extension('http://example.org/birthPlace').value",
        &patient,
    );
    assert_eq!(strings(&result), vec!["Winnipeg"]);
    assert!(eval("Patient.extension('http://example.org/none')", &patient).is_empty());
}

#[test]
fn test_has_value() {
    let patient = patient();
    assert!(boolean(&eval("Patient.active.hasValue()", &patient)));
    assert!(!boolean(&eval("Patient.name.hasValue()", &patient)));
    assert!(!boolean(&eval("{}.hasValue()", &patient)));
}

#[test]
fn test_repeat() {
    let observation = Element::resource_from_json(&json!({
        "resourceType": "Observation",
        "status": "final",
        "code": {
            "coding": [{"system": "http://loinc.org", "code": "1234-5"}],
            "text": "test"
        }
    }))
    .unwrap();
    // repeat(children()) reaches every node under code
    let result = eval("Observation.code.repeat(children())", &observation);
    assert!(result.len() >= 4);
}

#[test]
fn test_aggregate() {
    let patient = patient();
    let result = eval(
        "Patient.name.given.aggregate($total & $this, '')",
        &patient,
    );
    assert_eq!(strings(&result), vec!["BettySueBetty"]);
}

#[test]
fn test_trace_observer() {
    let patient = patient();
    let seen: Rc<RefCell<Vec<(String, usize)>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);

    let expr = compile("Patient.name.given.trace('given').count()").unwrap();
    let options = EvaluateOptions::new().with_tracer(move |name, collection| {
        sink.borrow_mut().push((name.to_string(), collection.len()));
    });
    let result = expr.evaluate_with_options(&[patient], &options).unwrap();

    assert_eq!(integer(&result), 3);
    assert_eq!(seen.borrow().as_slice(), &[("given".to_string(), 3)]);
}

#[test]
fn test_resolve_with_resolver() {
    let observation = Element::resource_from_json(&json!({
        "resourceType": "Observation",
        "status": "final",
        "code": {"text": "test"},
        "subject": {"reference": "Patient/123"}
    }))
    .unwrap();

    let expr = compile("Observation.subject.resolve()").unwrap();

    // without a resolver nothing resolves
    let result = expr.evaluate(&[observation.clone()]).unwrap();
    assert!(result.is_empty());

    let options = EvaluateOptions::new().with_resolver(|reference| {
        if reference == "Patient/123" {
            Some(
                Element::resource_from_json(&json!({
                    "resourceType": "Patient",
                    "id": "123"
                }))
                .unwrap(),
            )
        } else {
            None
        }
    });
    let result = expr.evaluate_with_options(&[observation], &options).unwrap();
    assert_eq!(result.len(), 1);
}

#[test]
fn test_user_function_registration() {
    let patient = patient();

    // a custom take: the closure's parameter list is its signature
    let expr = compile("Patient.name.given.pick(2)").unwrap();
    let options = EvaluateOptions::new()
        .with_function("pick", |input: Collection, count: i32| {
            Ok(input.into_iter().take(count.max(0) as usize).collect())
        })
        .unwrap();
    let result = expr.evaluate_with_options(&[patient.clone()], &options).unwrap();
    assert_eq!(strings(&result), vec!["Betty", "Sue"]);

    // a user function shadows a builtin of the same name
    let expr = compile("Patient.name.given.count()").unwrap();
    let options = EvaluateOptions::new()
        .with_function("count", |_input: Collection| {
            Ok(Collection::singleton(FhirPathValue::Integer(-1)))
        })
        .unwrap();
    let result = expr.evaluate_with_options(&[patient], &options).unwrap();
    assert_eq!(integer(&result), -1);
}

#[test]
fn test_user_function_signature_errors() {
    let patient = patient();

    let expr = compile("Patient.name.given.pick('two')").unwrap();
    let options = EvaluateOptions::new()
        .with_function("pick", |input: Collection, count: i32| {
            Ok(input.into_iter().take(count.max(0) as usize).collect())
        })
        .unwrap();
    assert!(matches!(
        expr.evaluate_with_options(&[patient.clone()], &options),
        Err(FhirPathError::SignatureError(_))
    ));

    let expr = compile("Patient.name.given.pick()").unwrap();
    let options = EvaluateOptions::new()
        .with_function("pick", |input: Collection, count: i32| {
            Ok(input.into_iter().take(count.max(0) as usize).collect())
        })
        .unwrap();
    assert!(matches!(
        expr.evaluate_with_options(&[patient], &options),
        Err(FhirPathError::SignatureError(_))
    ));
}

#[test]
fn test_invalid_registration() {
    assert!(matches!(
        EvaluateOptions::new().with_function("not a name", |input: Collection| Ok(input)),
        Err(FhirPathError::InvalidSignature(_))
    ));
    assert!(matches!(
        EvaluateOptions::new()
            .with_function("dup", |input: Collection| Ok(input))
            .unwrap()
            .with_function("dup", |input: Collection| Ok(input)),
        Err(FhirPathError::InvalidSignature(_))
    ));
}

#[test]
fn test_unknown_function() {
    let patient = patient();
    assert!(matches!(
        evaluate("Patient.name.frobnicate()", &[patient]),
        Err(FhirPathError::SignatureError(_))
    ));
}

#[test]
fn test_clock_functions_agree() {
    let patient = patient();
    // now(), today() and timeOfDay() read the same captured clock
    let result = eval("now().toDate() = today()", &patient);
    assert!(boolean(&result));
}
