//! Error taxonomy for validation and evaluation.
//!
//! All fallible kernel operations return discriminated results; nothing
//! escapes as a panic. Errors stay attributable to a specific gate or wire
//! so the host UI can highlight the offending element.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::circuit::GateKind;
use crate::types::{GateId, WireId};

/// A per-gate evaluation failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    /// Strict-mode input count mismatch against the gate's fixed arity.
    #[error("gate `{gate_id}` ({kind:?}): expected {expected} inputs, got {actual}")]
    InputArityMismatch {
        gate_id: GateId,
        kind: GateKind,
        expected: usize,
        actual: usize,
    },

    /// A `Custom` gate was evaluated without a definition attached.
    #[error("gate `{gate_id}`: custom gate has no definition")]
    MissingCustomDefinition { gate_id: GateId },

    /// The input combination has no entry in the gate's truth table.
    #[error("gate `{gate_id}`: no truth table entry for input combination `{key}`")]
    TruthTableMiss { gate_id: GateId, key: String },

    /// A truth table row's output width disagrees with the definition.
    #[error(
        "gate `{gate_id}`: truth table row `{key}` has {actual} output bits, \
         definition declares {expected} output pins"
    )]
    TruthTableWidthMismatch {
        gate_id: GateId,
        key: String,
        expected: usize,
        actual: usize,
    },

    /// An internal-circuit custom gate reached a context that cannot
    /// recurse (the standalone gate evaluator).
    #[error("gate `{gate_id}`: internal-circuit evaluation is unavailable in this context")]
    InternalCircuitUnimplemented { gate_id: GateId },

    /// Custom gate nesting exceeded the configured recursion limit.
    #[error("gate `{gate_id}`: recursion depth {depth} exceeds the maximum of {max}")]
    RecursionDepthExceeded {
        gate_id: GateId,
        depth: usize,
        max: usize,
    },

    /// The injected time provider produced an unusable timestamp.
    #[error("gate `{gate_id}` ({kind:?}): time provider returned a non-finite timestamp")]
    TimeProvider { gate_id: GateId, kind: GateKind },

    /// A clock gate was configured with a non-positive frequency.
    #[error("gate `{gate_id}`: clock frequency must be positive, got {frequency_hz}")]
    InvalidClockFrequency { gate_id: GateId, frequency_hz: f64 },

    /// The gate's retained state shape does not match its kind.
    #[error("gate `{gate_id}` ({kind:?}): retained state does not match gate kind")]
    StateKindMismatch { gate_id: GateId, kind: GateKind },
}

impl EvalError {
    /// The gate this error is attributable to.
    pub fn gate_id(&self) -> &str {
        match self {
            EvalError::InputArityMismatch { gate_id, .. }
            | EvalError::MissingCustomDefinition { gate_id }
            | EvalError::TruthTableMiss { gate_id, .. }
            | EvalError::TruthTableWidthMismatch { gate_id, .. }
            | EvalError::InternalCircuitUnimplemented { gate_id }
            | EvalError::RecursionDepthExceeded { gate_id, .. }
            | EvalError::TimeProvider { gate_id, .. }
            | EvalError::InvalidClockFrequency { gate_id, .. }
            | EvalError::StateKindMismatch { gate_id, .. } => gate_id,
        }
    }
}

/// One structural or semantic problem found by validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Human-readable, stable description of the problem.
    pub message: String,
    /// The gate at fault, when attributable to one.
    pub gate_id: Option<GateId>,
    /// The wire at fault, when attributable to one.
    pub wire_id: Option<WireId>,
}

impl Violation {
    /// A violation attributed to a gate.
    pub fn gate(gate_id: impl Into<GateId>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            gate_id: Some(gate_id.into()),
            wire_id: None,
        }
    }

    /// A violation attributed to a wire.
    pub fn wire(wire_id: impl Into<WireId>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            gate_id: None,
            wire_id: Some(wire_id.into()),
        }
    }

    /// A circuit-level violation not tied to a single element.
    pub fn circuit(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            gate_id: None,
            wire_id: None,
        }
    }
}

/// The pipeline stage at which a failure occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Structural/semantic validation before any evaluation.
    Validation,
    /// Per-gate or whole-circuit evaluation.
    Evaluation,
    /// A configured size limit was exceeded.
    Capacity,
}

/// Severity of a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Recoverable by fixing the circuit or configuration.
    Error,
    /// Unexpected internal failure.
    Fatal,
}

/// The boundary error type returned by the circuit evaluator and validator.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{stage:?} failed: {message}")]
pub struct ApiError {
    /// Stable, attributable description of the failure.
    pub message: String,
    /// Where in the pipeline the failure occurred.
    pub stage: Stage,
    /// How bad it is.
    pub severity: Severity,
    /// Individual violations, populated for validation failures.
    pub violations: Vec<Violation>,
}

impl ApiError {
    /// A validation failure carrying the full violation list.
    pub fn validation(violations: Vec<Violation>) -> Self {
        let message = match violations.first() {
            Some(first) if violations.len() == 1 => first.message.clone(),
            Some(first) => format!(
                "{} (and {} more violations)",
                first.message,
                violations.len() - 1
            ),
            None => "validation failed".to_string(),
        };
        Self {
            message,
            stage: Stage::Validation,
            severity: Severity::Error,
            violations,
        }
    }

    /// A capacity failure (circuit exceeds configured limits).
    pub fn capacity(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stage: Stage::Capacity,
            severity: Severity::Error,
            violations: Vec::new(),
        }
    }

    /// An evaluation failure wrapping a per-gate error.
    pub fn evaluation(err: EvalError) -> Self {
        Self {
            message: err.to_string(),
            stage: Stage::Evaluation,
            severity: Severity::Error,
            violations: Vec::new(),
        }
    }

    /// A wrapped unexpected internal failure.
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stage: Stage::Evaluation,
            severity: Severity::Fatal,
            violations: Vec::new(),
        }
    }
}
