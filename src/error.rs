// src/error.rs
// Error taxonomy for the pendulum core: malformed requests are rejected before any
// integration step, integration failures carry the last grid index that was produced,
// and derivation failures abort start-up of the offending model.

use thiserror::Error;

/// Errors returned to callers of `simulate`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    /// Request could not be understood (bad initial-condition text, mismatched sequences).
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A physical parameter is non-finite or outside its allowed range.
    #[error("invalid parameter {name} = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    /// Initial-condition vector does not match the dimensionality's state layout.
    #[error("initial conditions need {expected} values, got {actual}")]
    StateLength { expected: usize, actual: usize },

    /// The adaptive solver could not advance past grid index `index`.
    #[error("integration failed after sample {index} (t = {time}): {reason}")]
    IntegrationFailed {
        index: usize,
        time: f64,
        reason: String,
    },

    /// Caller raised the cancellation flag.
    #[error("integration cancelled after sample {index}")]
    Cancelled { index: usize },

    /// Wall-clock deadline passed before the grid was completed.
    #[error("integration timed out after sample {index}")]
    TimedOut { index: usize },
}

impl SimError {
    /// Whether the request was refused before integration started.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            SimError::MalformedInput(_)
                | SimError::InvalidParameter { .. }
                | SimError::StateLength { .. }
        )
    }
}

/// Failure while evaluating an equations-of-motion object at one state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("singular mass matrix (pivot {pivot:e} in column {column})")]
    SingularMatrix { column: usize, pivot: f64 },

    #[error("non-finite acceleration")]
    NonFinite,

    /// The implicit stepper's iteration matrix `I − hγJ` could not be factored.
    #[error("singular iteration matrix")]
    SingularIteration,
}

/// The derived model failed its self-check; fatal for that dimensionality.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{model} equations failed derivation check: {detail}")]
pub struct DerivationError {
    pub model: &'static str,
    pub detail: String,
}
