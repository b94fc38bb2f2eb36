// Function registry
//
// Built-in functions live in a process-wide immutable table; user
// functions are a per-evaluation overlay consulted first. Built-ins
// declare which parameters are evaluated eagerly and which are passed
// through as expressions (where, select, iif and friends). User
// functions are registered from plain closures; the closure's parameter
// list is its signature, with each argument extracted from the evaluated
// collection by the `ArgumentValue` trait.

use crate::context::EvaluationContext;
use crate::element::Element;
use crate::errors::FhirPathError;
use crate::evaluator;
use crate::functions;
use crate::model::{normalize, Collection, FhirPathValue};
use crate::parser::AstNode;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::LazyLock;

pub type EagerFn =
    fn(&EvaluationContext, Collection, &[Collection]) -> Result<Collection, FhirPathError>;
pub type LazyFn =
    fn(&EvaluationContext, Collection, &[AstNode]) -> Result<Collection, FhirPathError>;

/// A built-in function entry
pub enum Builtin {
    /// Arguments are evaluated before the call
    Eager {
        min_args: usize,
        max_args: usize,
        func: EagerFn,
    },
    /// Arguments are passed through as expressions
    Lazy {
        min_args: usize,
        max_args: usize,
        func: LazyFn,
    },
}

static BUILTINS: LazyLock<HashMap<&'static str, Builtin>> = LazyLock::new(functions::builtins);

/// A user-registered function; always eager.
#[derive(Clone)]
pub struct UserFunction {
    pub arity: usize,
    #[allow(clippy::type_complexity)]
    pub func: Rc<dyn Fn(&EvaluationContext, Collection, &[Collection]) -> Result<Collection, FhirPathError>>,
}

/// Validates a function name at registration time.
pub fn validate_function_name(name: &str) -> Result<(), FhirPathError> {
    let mut chars = name.chars();
    let valid_head = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if !valid_head || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(FhirPathError::InvalidSignature(format!(
            "'{}' is not a valid function name",
            name
        )));
    }
    Ok(())
}

/// Looks up and invokes a function: user overlay first, then built-ins.
/// Eager arguments are evaluated against `scope`, the `$this` in effect
/// where the invocation appears; lazy functions receive the raw
/// expressions and set up their own per-item context.
pub fn dispatch(
    ctx: &EvaluationContext,
    name: &str,
    input: Collection,
    arguments: &[AstNode],
    scope: &Collection,
) -> Result<Collection, FhirPathError> {
    if let Some(user) = ctx.user_function(name) {
        if arguments.len() != user.arity {
            return Err(FhirPathError::SignatureError(format!(
                "{}() expects {} argument(s), got {}",
                name,
                user.arity,
                arguments.len()
            )));
        }
        let evaluated = eval_arguments(ctx, scope, arguments)?;
        return (user.func)(ctx, input, &evaluated);
    }

    let Some(builtin) = BUILTINS.get(name) else {
        return Err(FhirPathError::SignatureError(format!(
            "unknown function '{}'",
            name
        )));
    };

    match builtin {
        Builtin::Eager {
            min_args,
            max_args,
            func,
        } => {
            check_arity(name, arguments.len(), *min_args, *max_args)?;
            let evaluated = eval_arguments(ctx, scope, arguments)?;
            func(ctx, input, &evaluated)
        }
        Builtin::Lazy {
            min_args,
            max_args,
            func,
        } => {
            check_arity(name, arguments.len(), *min_args, *max_args)?;
            func(ctx, input, arguments)
        }
    }
}

fn check_arity(name: &str, got: usize, min: usize, max: usize) -> Result<(), FhirPathError> {
    if got < min || got > max {
        return Err(FhirPathError::SignatureError(format!(
            "{}() expects {} argument(s), got {}",
            name,
            if min == max {
                min.to_string()
            } else {
                format!("{} to {}", min, max)
            },
            got
        )));
    }
    Ok(())
}

/// Evaluates eager arguments against the enclosing scope, stopping at
/// the first error.
fn eval_arguments(
    ctx: &EvaluationContext,
    scope: &Collection,
    arguments: &[AstNode],
) -> Result<Vec<Collection>, FhirPathError> {
    arguments
        .iter()
        .map(|argument| evaluator::evaluate(argument, scope, ctx))
        .collect()
}

// ---------------------------------------------------------------------------
// Signature reflection for user functions

/// Extraction of one typed argument from an evaluated collection.
/// A cardinality or type mismatch is a `SignatureError` at call time.
pub trait ArgumentValue: Sized {
    fn type_word() -> &'static str;

    fn from_collection(collection: Collection) -> Result<Self, FhirPathError>;
}

fn singleton(collection: Collection, expected: &'static str) -> Result<FhirPathValue, FhirPathError> {
    let len = collection.len();
    match collection.into_vec().pop() {
        Some(value) if len == 1 => Ok(value),
        _ => Err(FhirPathError::SignatureError(format!(
            "expected a single {}, got {} item(s)",
            expected, len
        ))),
    }
}

fn mismatch(expected: &'static str, got: &FhirPathValue) -> FhirPathError {
    FhirPathError::SignatureError(format!(
        "expected {}, got {}",
        expected,
        got.type_name()
    ))
}

impl ArgumentValue for Collection {
    fn type_word() -> &'static str {
        "Collection"
    }

    fn from_collection(collection: Collection) -> Result<Self, FhirPathError> {
        Ok(collection)
    }
}

impl ArgumentValue for FhirPathValue {
    fn type_word() -> &'static str {
        "value"
    }

    fn from_collection(collection: Collection) -> Result<Self, FhirPathError> {
        singleton(collection, Self::type_word())
    }
}

impl ArgumentValue for bool {
    fn type_word() -> &'static str {
        "Boolean"
    }

    fn from_collection(collection: Collection) -> Result<Self, FhirPathError> {
        let value = singleton(collection, Self::type_word())?;
        match normalize(&value) {
            FhirPathValue::Boolean(b) => Ok(b),
            other => Err(mismatch(Self::type_word(), &other)),
        }
    }
}

impl ArgumentValue for i32 {
    fn type_word() -> &'static str {
        "Integer"
    }

    fn from_collection(collection: Collection) -> Result<Self, FhirPathError> {
        let value = singleton(collection, Self::type_word())?;
        match normalize(&value) {
            FhirPathValue::Integer(i) => Ok(i),
            other => Err(mismatch(Self::type_word(), &other)),
        }
    }
}

impl ArgumentValue for Decimal {
    fn type_word() -> &'static str {
        "Decimal"
    }

    fn from_collection(collection: Collection) -> Result<Self, FhirPathError> {
        let value = singleton(collection, Self::type_word())?;
        match normalize(&value) {
            FhirPathValue::Decimal(d) => Ok(d),
            FhirPathValue::Integer(i) => Ok(Decimal::from(i)),
            other => Err(mismatch(Self::type_word(), &other)),
        }
    }
}

impl ArgumentValue for String {
    fn type_word() -> &'static str {
        "String"
    }

    fn from_collection(collection: Collection) -> Result<Self, FhirPathError> {
        let value = singleton(collection, Self::type_word())?;
        match normalize(&value) {
            FhirPathValue::String(s) => Ok(s),
            other => Err(mismatch(Self::type_word(), &other)),
        }
    }
}

impl ArgumentValue for Element {
    fn type_word() -> &'static str {
        "Element"
    }

    fn from_collection(collection: Collection) -> Result<Self, FhirPathError> {
        let value = singleton(collection, Self::type_word())?;
        match value {
            FhirPathValue::Element(element) => Ok(element),
            other => Err(mismatch(Self::type_word(), &other)),
        }
    }
}

/// Conversion from a closure into a registered function. The first
/// closure parameter is always the input collection; the remaining
/// parameters form the call-site signature.
pub trait IntoUserFunction<Args> {
    fn into_user_function(self) -> UserFunction;
}

impl<F> IntoUserFunction<()> for F
where
    F: Fn(Collection) -> Result<Collection, FhirPathError> + 'static,
{
    fn into_user_function(self) -> UserFunction {
        UserFunction {
            arity: 0,
            func: Rc::new(move |_ctx, input, _args| self(input)),
        }
    }
}

impl<F, A> IntoUserFunction<(A,)> for F
where
    F: Fn(Collection, A) -> Result<Collection, FhirPathError> + 'static,
    A: ArgumentValue,
{
    fn into_user_function(self) -> UserFunction {
        UserFunction {
            arity: 1,
            func: Rc::new(move |_ctx, input, args| {
                let a = A::from_collection(args[0].clone())?;
                self(input, a)
            }),
        }
    }
}

impl<F, A, B> IntoUserFunction<(A, B)> for F
where
    F: Fn(Collection, A, B) -> Result<Collection, FhirPathError> + 'static,
    A: ArgumentValue,
    B: ArgumentValue,
{
    fn into_user_function(self) -> UserFunction {
        UserFunction {
            arity: 2,
            func: Rc::new(move |_ctx, input, args| {
                let a = A::from_collection(args[0].clone())?;
                let b = B::from_collection(args[1].clone())?;
                self(input, a, b)
            }),
        }
    }
}

impl<F, A, B, C> IntoUserFunction<(A, B, C)> for F
where
    F: Fn(Collection, A, B, C) -> Result<Collection, FhirPathError> + 'static,
    A: ArgumentValue,
    B: ArgumentValue,
    C: ArgumentValue,
{
    fn into_user_function(self) -> UserFunction {
        UserFunction {
            arity: 3,
            func: Rc::new(move |_ctx, input, args| {
                let a = A::from_collection(args[0].clone())?;
                let b = B::from_collection(args[1].clone())?;
                let c = C::from_collection(args[2].clone())?;
                self(input, a, b, c)
            }),
        }
    }
}
