use datafusion::error::DataFusionError;
use thiserror::Error;

/// Errors raised by the extension functions and their host.
///
/// Every variant aborts the call that raised it; functions never return
/// partial output alongside an error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid label name in {func}(): {name:?}")]
    InvalidLabelName { func: &'static str, name: String },

    #[error("invalid params in {func}(): {reason}")]
    InvalidParams { func: &'static str, reason: String },

    #[error("not a ternary operator: {0:?}")]
    TernaryFormat(String),

    #[error("{func}: expected {expected} argument #{index}, got {actual}")]
    ArgumentType {
        func: String,
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("{func}: expected {expected} arguments, got {actual}")]
    ArgumentCount {
        func: String,
        expected: String,
        actual: usize,
    },

    #[error("invalid recording rule: {0}")]
    InvalidRule(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("unsupported expression: {0}")]
    Unsupported(String),

    #[error("failed to parse {expr:?}: {reason}")]
    Parse { expr: String, reason: String },

    #[error(transparent)]
    DataFusion(#[from] DataFusionError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn invalid_params(func: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParams {
            func,
            reason: reason.into(),
        }
    }
}
