//! Core type definitions for the circuit kernel.
//!
//! This module defines the fundamental types shared by the gate evaluator,
//! the circuit evaluator and the timing capture subsystem.

use serde::{Deserialize, Serialize};

/// A logic level on a wire or pin.
///
/// Tri-state levels (`unknown`, `high-z`) are reserved for a future bus
/// model; the kernel currently evaluates strictly two-valued logic.
pub type Signal = bool;

/// Simulation time in milliseconds.
///
/// All timestamps produced by the kernel are relative to an injected time
/// origin (see [`crate::time::TimeProvider`]), never wall-clock absolute.
pub type TimeMs = f64;

/// Unique identifier for a gate.
///
/// Legal ids are non-empty, at most [`MAX_GATE_ID_LEN`] characters, and
/// restricted to ASCII alphanumerics plus `_`, `-` and `.`.
pub type GateId = String;

/// Unique identifier for a wire.
pub type WireId = String;

/// Maximum length of a gate or wire identifier.
pub const MAX_GATE_ID_LEN: usize = 100;

/// Which side of a gate a pin sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinDirection {
    /// An input pin, consuming a signal.
    Input,
    /// An output pin, driving a signal.
    Output,
}

/// An explicit reference to one pin of a gate.
///
/// Replaces the legacy convention of encoding output pins as transformed
/// negative indices; direction is always spelled out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PinRef {
    /// Input or output side of the gate.
    pub direction: PinDirection,
    /// Zero-based pin index on that side.
    pub index: usize,
}

impl PinRef {
    /// Creates a reference to an input pin.
    pub fn input(index: usize) -> Self {
        Self {
            direction: PinDirection::Input,
            index,
        }
    }

    /// Creates a reference to an output pin.
    pub fn output(index: usize) -> Self {
        Self {
            direction: PinDirection::Output,
            index,
        }
    }
}

/// Returns `true` if `id` is a legal gate/wire identifier.
pub fn is_legal_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_GATE_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}
