//! Error types for the guidance layer.
//!
//! Sanitizer errors are case- or batch-level and always map to exactly one
//! [`RejectionKind`]. Feedback issues are attempt-level: they are rendered into
//! the reminder that is sent back to the model on the next attempt.

use crate::stats::RejectionKind;

#[derive(Debug, thiserror::Error)]
pub enum AbiError {
    #[error("invalid ABI JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ABI JSON must be an array of entries or an object with an `abi` array")]
    Shape,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("`{0}` is neither a 4-byte selector nor a known pseudo-function")]
pub struct FunctionKeyError(pub String);

/// Why a value could not be converted to its declared ABI type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoercionError {
    #[error("cannot parse {value} as an integer for `{ty}`")]
    Integer { ty: String, value: String },

    #[error("cannot interpret {value} as a boolean for `{ty}`")]
    Boolean { ty: String, value: String },

    #[error("expected a JSON array for `{ty}`, got {value}")]
    Array { ty: String, value: String },

    #[error("integer {value} is out of range for `{field}`")]
    OutOfRange { field: String, value: String },
}

/// A rejected generated test case, or a rejected batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SanitizeError {
    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    #[error("invalid test case format: {0}")]
    InvalidFormat(String),

    #[error("unknown function identifier `{identifier}`")]
    UnknownSelector { identifier: String },

    #[error("function `{identifier}` is overloaded and {arity} argument(s) match {candidates:?}")]
    AmbiguousFunction {
        identifier: String,
        arity: usize,
        candidates: Vec<String>,
    },

    #[error("argument count mismatch for `{function}`: expected {expected}, got {received}")]
    ArgumentCount {
        function: String,
        expected: usize,
        received: usize,
    },

    #[error("no overload of `{function}` takes {received} argument(s); overloads take {arities:?}")]
    OverloadArity {
        function: String,
        arities: Vec<usize>,
        received: usize,
    },

    #[error("failed to sanitize {field} of `{function}`: {source}")]
    TypeCoercion {
        function: String,
        field: String,
        #[source]
        source: CoercionError,
    },
}

impl SanitizeError {
    /// The statistics bucket this error is counted under.
    pub fn kind(&self) -> RejectionKind {
        match self {
            SanitizeError::MalformedResponse(_) => RejectionKind::JsonParseFail,
            SanitizeError::InvalidFormat(_) => RejectionKind::InvalidFormat,
            SanitizeError::UnknownSelector { .. } | SanitizeError::AmbiguousFunction { .. } => {
                RejectionKind::AbiMismatch
            }
            SanitizeError::ArgumentCount { .. } | SanitizeError::OverloadArity { .. } => {
                RejectionKind::ArgCountMismatch
            }
            SanitizeError::TypeCoercion { .. } => RejectionKind::TypeSanitizeFail,
        }
    }
}

/// One problem found in a model's mutation-strategy feedback.
///
/// The `Display` text is addressed to the model: it is what ends up in the
/// reminder appended to the next prompt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedbackIssue {
    #[error("The feedback did not contain a valid JSON object.")]
    NoJsonObject,

    #[error("The feedback was not in a valid JSON format.")]
    InvalidJson,

    #[error("The JSON object is empty or invalid. Please provide suggestions for all functions.")]
    EmptyObject,

    #[error("The function '{function}' is missing from your JSON response.")]
    MissingFunction { function: String },

    #[error(
        "For function '{function}', the value must be a list of parameter names, but I received a {received}."
    )]
    NotAList { function: String, received: String },

    #[error(
        "In function '{function}', you suggested mutating a parameter named '{parameter}', but this parameter does not exist. The available parameters are: {available:?}."
    )]
    UnknownParameter {
        function: String,
        parameter: String,
        available: Vec<String>,
    },

    #[error("Some functions were missing from the final validated strategy. Please regenerate the full list.")]
    Incomplete,

    #[error("An exception occurred: {0}. Please ensure the output is a single, valid JSON object.")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} is out of range: {value}")]
    InvalidProbability { name: &'static str, value: f64 },

    #[error("max_retries must be at least 1")]
    ZeroRetries,

    #[error("{name} must be a finite non-negative temperature, got {value}")]
    InvalidTemperature { name: &'static str, value: f32 },

    #[error("unknown fuzzing mode `{0}`")]
    UnknownMode(String),
}
