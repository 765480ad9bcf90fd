use thiserror::Error;

/// Errors raised around the engine: model wiring, configuration and gradient checking.
///
/// The arithmetic itself never fails. Invalid numeric domains propagate as NaN or
/// infinity through `data` and `grad`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("cannot set the value of a derived node (op: {op}); only leaves are mutable")]
    NotALeaf { op: String },

    #[error("input size mismatch: expected {expected} values, got {actual}")]
    InputSize { expected: usize, actual: usize },

    #[error("expected a single output, network produces {actual}")]
    OutputSize { actual: usize },

    #[error("a network needs at least one layer")]
    EmptyNetwork,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("environment variable {key}: {message}")]
    EnvVar { key: String, message: String },

    #[error("failed to parse {key}={value:?}: {message}")]
    Parse {
        key: String,
        value: String,
        message: String,
    },

    #[error("gradient mismatch for input {input_index}: analytic {analytic}, numeric {numeric} (difference {difference})")]
    GradientMismatch {
        input_index: usize,
        analytic: f64,
        numeric: f64,
        difference: f64,
    },

    #[error("non-finite gradient for input {input_index}: analytic {analytic}, numeric {numeric}")]
    NonFinite {
        input_index: usize,
        analytic: f64,
        numeric: f64,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
