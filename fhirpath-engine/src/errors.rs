// FHIRPath Error Types
//
// This module defines the error types used throughout the FHIRPath
// implementation and the patch layer built on top of it.

use thiserror::Error;

/// Errors that can occur during FHIRPath parsing, evaluation and patching
#[derive(Error, Debug)]
pub enum FhirPathError {
    /// Error during lexical analysis or parsing
    #[error("parse error at position {position}: {message}")]
    ParseError { position: usize, message: String },

    /// Reference to an environment variable that is not bound in the context
    #[error("undefined environment variable %{0}")]
    UndefinedEnvVar(String),

    /// Field name not present in the schema of the current element
    #[error("invalid field '{0}'")]
    InvalidField(String),

    /// Operator or function applied to incompatible types
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Operation required exactly one value, got zero or many
    #[error("expected a single value, got {0}")]
    NotSingleton(usize),

    /// Enum assignment with a code outside the bound value set
    #[error("invalid code '{code}' for value set {value_set}")]
    InvalidEnum { code: String, value_set: &'static str },

    /// Integer outside positive/unsigned bounds
    #[error("value {value} out of bounds for {type_name}")]
    InvalidUnsignedInt { type_name: String, value: i32 },

    /// Patch target does not denote an assignable location
    #[error("not patchable: {0}")]
    NotPatchable(String),

    /// Missing resource, missing value, or value of an unexpected type
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Call-site arguments do not match the function signature
    #[error("function signature mismatch: {0}")]
    SignatureError(String),

    /// Function registration with an unusable signature or name
    #[error("invalid function signature: {0}")]
    InvalidSignature(String),

    /// Operation intentionally left unimplemented
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// Integer arithmetic exceeded the 32-bit range
    #[error("integer overflow in '{0}'")]
    Overflow(&'static str),

    /// Integer `div` with a zero divisor
    #[error("division by zero")]
    DivideByZero,
}

impl FhirPathError {
    /// Shorthand for a parse error at a known source position.
    pub(crate) fn parse(position: usize, message: impl Into<String>) -> Self {
        FhirPathError::ParseError {
            position,
            message: message.into(),
        }
    }
}
