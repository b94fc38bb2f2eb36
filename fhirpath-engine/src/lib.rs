// FHIRPath engine
//
// This crate implements the FHIRPath expression language over
// schema-typed FHIR R4 resources, together with a structural patch layer
// that mutates resources at locations identified by FHIRPath
// expressions. Expressions are compiled once and evaluated repeatedly;
// per-evaluation state (environment variables, user functions, the
// wall clock) travels in `EvaluateOptions`.

pub mod context;
pub mod datetime;
pub mod element;
pub mod errors;
pub mod evaluator;
mod functions;
pub mod lexer;
pub mod model;
pub mod navigator;
pub mod parser;
pub mod patch;
pub mod registry;
pub mod schema;
pub mod search_param;

pub use context::EvaluationContext;
pub use element::Element;
pub use errors::FhirPathError;
pub use model::{Collection, FhirPathValue, Quantity};

use chrono::{DateTime, FixedOffset, Utc};
use context::{ReferenceResolver, TraceObserver};
use registry::{IntoUserFunction, UserFunction};
use std::collections::HashMap;
use std::rc::Rc;

/// A compiled FHIRPath expression. Compilation happens once; the
/// expression itself is immutable and can be evaluated against any
/// number of resources.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    ast: parser::AstNode,
}

/// Compiles FHIRPath source into an `Expression`.
pub fn compile(source: &str) -> Result<Expression, FhirPathError> {
    let tokens = lexer::tokenize(source)?;
    let ast = parser::parse(&tokens)?;
    Ok(Expression {
        source: source.to_string(),
        ast,
    })
}

impl Expression {
    /// The original expression text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates against the given resources with default options.
    pub fn evaluate(&self, input: &[Element]) -> Result<Collection, FhirPathError> {
        self.evaluate_with_options(input, &EvaluateOptions::new())
    }

    /// Evaluates against the given resources. The input collection is
    /// the initial `$this`; `%context` is the input unless overridden
    /// with `with_context`.
    pub fn evaluate_with_options(
        &self,
        input: &[Element],
        options: &EvaluateOptions,
    ) -> Result<Collection, FhirPathError> {
        let input: Collection = input
            .iter()
            .cloned()
            .map(FhirPathValue::Element)
            .collect();
        let root = match &options.context {
            Some(resource) => Collection::singleton(FhirPathValue::Element(resource.clone())),
            None => input.clone(),
        };
        let ctx = EvaluationContext::new(
            root,
            options.env_vars.clone(),
            options.now,
            options.functions.clone(),
            options.tracer.clone(),
            options.resolver.clone(),
        );
        evaluator::evaluate(&self.ast, &input, &ctx)
    }
}

/// Compiles and evaluates in one step.
pub fn evaluate(source: &str, input: &[Element]) -> Result<Collection, FhirPathError> {
    compile(source)?.evaluate(input)
}

/// Per-evaluation options: the `%context` root, environment variables,
/// user functions, a fixed clock, a trace observer and a reference
/// resolver.
#[derive(Clone)]
pub struct EvaluateOptions {
    context: Option<Element>,
    env_vars: HashMap<String, Collection>,
    functions: HashMap<String, UserFunction>,
    now: DateTime<FixedOffset>,
    tracer: Option<Rc<TraceObserver>>,
    resolver: Option<Rc<ReferenceResolver>>,
}

impl Default for EvaluateOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl EvaluateOptions {
    pub fn new() -> Self {
        EvaluateOptions {
            context: None,
            env_vars: HashMap::new(),
            functions: HashMap::new(),
            now: Utc::now().fixed_offset(),
            tracer: None,
            resolver: None,
        }
    }

    /// Overrides the `%context`/`%resource` root resource.
    pub fn with_context(mut self, resource: Element) -> Self {
        self.context = Some(resource);
        self
    }

    /// Binds an environment variable. Unquoted names must look like
    /// identifiers; anything else needs the quoted `%'...'` form in the
    /// expression, but is accepted here as-is.
    pub fn with_env_variable(
        mut self,
        name: &str,
        value: impl Into<Collection>,
    ) -> Result<Self, FhirPathError> {
        if name.is_empty() {
            return Err(FhirPathError::InvalidInput(
                "environment variable name must not be empty".to_string(),
            ));
        }
        self.env_vars.insert(name.to_string(), value.into());
        Ok(self)
    }

    /// Registers a user function for this evaluation. The closure's
    /// first parameter is the input collection; the remaining parameters
    /// are reflected into the call-site signature.
    pub fn with_function<Args>(
        mut self,
        name: &str,
        function: impl IntoUserFunction<Args>,
    ) -> Result<Self, FhirPathError> {
        registry::validate_function_name(name)?;
        if self.functions.contains_key(name) {
            return Err(FhirPathError::InvalidSignature(format!(
                "function '{}' is already registered",
                name
            )));
        }
        self.functions
            .insert(name.to_string(), function.into_user_function());
        Ok(self)
    }

    /// Fixes the clock used by now(), today() and timeOfDay().
    pub fn with_now(mut self, now: DateTime<FixedOffset>) -> Self {
        self.now = now;
        self
    }

    /// Observer for the trace() function.
    pub fn with_tracer(mut self, tracer: impl Fn(&str, &Collection) + 'static) -> Self {
        self.tracer = Some(Rc::new(tracer));
        self
    }

    /// Resolver backing the resolve() function.
    pub fn with_resolver(mut self, resolver: impl Fn(&str) -> Option<Element> + 'static) -> Self {
        self.resolver = Some(Rc::new(resolver));
        self
    }
}
