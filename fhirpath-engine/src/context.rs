// Evaluation context
//
// Per-evaluation state: the root resource, bound environment variables,
// the wall clock captured once so that now()/today()/timeOfDay() agree,
// the user-function overlay and the optional trace observer and
// reference resolver. Contexts clone cheaply; lazy arguments derive
// per-item contexts carrying `$index` and `$total`.

use crate::element::Element;
use crate::errors::FhirPathError;
use crate::model::{Collection, FhirPathValue};
use crate::registry::UserFunction;
use chrono::{DateTime, FixedOffset};
use std::collections::HashMap;
use std::rc::Rc;

pub type TraceObserver = dyn Fn(&str, &Collection);
pub type ReferenceResolver = dyn Fn(&str) -> Option<Element>;

#[derive(Clone)]
pub struct EvaluationContext {
    /// `%context` / `%resource`: the root input collection
    pub root: Collection,
    env: Rc<HashMap<String, Collection>>,
    pub now: DateTime<FixedOffset>,
    user_functions: Rc<HashMap<String, UserFunction>>,
    tracer: Option<Rc<TraceObserver>>,
    resolver: Option<Rc<ReferenceResolver>>,
    /// `$index` inside lazy iteration
    pub index: Option<i32>,
    /// `$total` inside aggregate()
    pub total: Option<Collection>,
}

impl EvaluationContext {
    pub fn new(
        root: Collection,
        env: HashMap<String, Collection>,
        now: DateTime<FixedOffset>,
        user_functions: HashMap<String, UserFunction>,
        tracer: Option<Rc<TraceObserver>>,
        resolver: Option<Rc<ReferenceResolver>>,
    ) -> Self {
        EvaluationContext {
            root,
            env: Rc::new(env),
            now,
            user_functions: Rc::new(user_functions),
            tracer,
            resolver,
            index: None,
            total: None,
        }
    }

    /// Resolves `%name`; `%context`, `%resource`, `%rootResource` and the
    /// well-known terminology URLs are always bound.
    pub fn env_var(&self, name: &str) -> Result<Collection, FhirPathError> {
        match name {
            "context" | "resource" | "rootResource" => Ok(self.root.clone()),
            "ucum" => Ok(Collection::singleton(FhirPathValue::String(
                "http://unitsofmeasure.org".to_string(),
            ))),
            "sct" => Ok(Collection::singleton(FhirPathValue::String(
                "http://snomed.info/sct".to_string(),
            ))),
            "loinc" => Ok(Collection::singleton(FhirPathValue::String(
                "http://loinc.org".to_string(),
            ))),
            _ => self
                .env
                .get(name)
                .cloned()
                .ok_or_else(|| FhirPathError::UndefinedEnvVar(name.to_string())),
        }
    }

    pub fn user_function(&self, name: &str) -> Option<&UserFunction> {
        self.user_functions.get(name)
    }

    /// Emits a trace event to the configured observer, falling back to
    /// the log facade.
    pub fn trace(&self, name: &str, collection: &Collection) {
        match &self.tracer {
            Some(tracer) => tracer(name, collection),
            None => log::info!("trace[{}]: {} item(s)", name, collection.len()),
        }
    }

    pub fn resolve_reference(&self, reference: &str) -> Option<Element> {
        self.resolver.as_ref().and_then(|resolver| resolver(reference))
    }

    /// Derived context for one iteration step of a lazy argument.
    pub fn with_index(&self, index: usize) -> Self {
        let mut ctx = self.clone();
        ctx.index = i32::try_from(index).ok();
        ctx
    }

    /// Derived context carrying the aggregate() accumulator.
    pub fn with_total(&self, total: Collection) -> Self {
        let mut ctx = self.clone();
        ctx.total = Some(total);
        ctx
    }
}
