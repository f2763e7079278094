//! Evaluation configuration and declarative circuit files.
//!
//! [`EvaluationConfig`] carries the host-tunable knobs for validation and
//! evaluation. Circuits can additionally be described declaratively in
//! YAML or JSON and loaded for tests and demos.
//!
//! # Circuit File Structure
//!
//! ```yaml
//! gates:
//!   - id: a
//!     kind: input
//!     outputs: [true]
//!     state: { kind: combinational }
//!   - id: and-1
//!     kind: and
//!     state: { kind: combinational }
//! wires:
//!   - id: w1
//!     from: { gate_id: a, pin: { direction: output, index: 0 } }
//!     to: { gate_id: and-1, pin: { direction: input, index: 0 } }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::circuit::Circuit;

/// Errors that can occur while loading a circuit file.
#[derive(Error, Debug)]
pub enum CircuitFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),
}

/// Result type for circuit file operations.
pub type CircuitFileResult<T> = Result<T, CircuitFileError>;

/// Host-tunable knobs for validation and evaluation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// When true, run full semantic validation before every evaluation and
    /// enforce exact input arities; when false, use light validation and
    /// pad short input arrays with low signals.
    #[serde(default = "default_strict_validation")]
    pub strict_validation: bool,

    /// Attach per-gate debug snapshots to evaluation results.
    #[serde(default)]
    pub enable_debug: bool,

    /// Permit cycles that pass through at least one sequential gate
    /// (latch-like feedback). Purely combinational cycles are always
    /// rejected.
    #[serde(default)]
    pub allow_circular_dependencies: bool,

    /// Maximum number of gates a circuit may contain.
    #[serde(default = "default_max_gate_count")]
    pub max_gate_count: usize,

    /// Maximum nesting depth for custom gates evaluated by internal
    /// circuit.
    #[serde(default = "default_max_recursion_depth")]
    pub max_recursion_depth: usize,
}

fn default_strict_validation() -> bool {
    true
}

fn default_max_gate_count() -> usize {
    1000
}

fn default_max_recursion_depth() -> usize {
    10
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            strict_validation: default_strict_validation(),
            enable_debug: false,
            allow_circular_dependencies: false,
            max_gate_count: default_max_gate_count(),
            max_recursion_depth: default_max_recursion_depth(),
        }
    }
}

impl EvaluationConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets strict validation.
    pub fn with_strict_validation(mut self, strict: bool) -> Self {
        self.strict_validation = strict;
        self
    }

    /// Enables per-gate debug snapshots.
    pub fn with_debug(mut self, enable: bool) -> Self {
        self.enable_debug = enable;
        self
    }

    /// Permits sequential feedback cycles.
    pub fn with_circular_dependencies(mut self, allow: bool) -> Self {
        self.allow_circular_dependencies = allow;
        self
    }

    /// Sets the gate-count limit.
    pub fn with_max_gate_count(mut self, max: usize) -> Self {
        self.max_gate_count = max;
        self
    }

    /// Sets the custom-gate recursion limit.
    pub fn with_max_recursion_depth(mut self, max: usize) -> Self {
        self.max_recursion_depth = max;
        self
    }
}

impl Circuit {
    /// Loads a circuit from a YAML string.
    pub fn from_yaml(yaml: &str) -> CircuitFileResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Loads a circuit from a JSON string.
    pub fn from_json(json: &str) -> CircuitFileResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a circuit from a file, dispatching on the extension
    /// (`.yaml`/`.yml` or `.json`).
    pub fn from_file(path: impl AsRef<Path>) -> CircuitFileResult<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&std::fs::read_to_string(path)?),
            Some("json") => Self::from_json(&std::fs::read_to_string(path)?),
            other => Err(CircuitFileError::UnknownFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }

    /// Serializes the circuit to a JSON string.
    pub fn to_json(&self) -> CircuitFileResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::GateKind;

    #[test]
    fn test_default_config() {
        let config = EvaluationConfig::default();
        assert!(config.strict_validation);
        assert!(!config.enable_debug);
        assert!(!config.allow_circular_dependencies);
        assert_eq!(config.max_gate_count, 1000);
        assert_eq!(config.max_recursion_depth, 10);
    }

    #[test]
    fn test_config_builder() {
        let config = EvaluationConfig::new()
            .with_strict_validation(false)
            .with_debug(true)
            .with_max_gate_count(50);
        assert!(!config.strict_validation);
        assert!(config.enable_debug);
        assert_eq!(config.max_gate_count, 50);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: EvaluationConfig = serde_yaml::from_str("enable_debug: true").unwrap();
        assert!(config.enable_debug);
        assert!(config.strict_validation);
        assert_eq!(config.max_recursion_depth, 10);
    }

    #[test]
    fn test_circuit_from_yaml() {
        let yaml = r#"
gates:
  - id: a
    kind: input
    outputs: [true]
    state: { kind: combinational }
  - id: inv
    kind: not
    inputs: [false]
    state: { kind: combinational }
wires:
  - id: w1
    from: { gate_id: a, pin: { direction: output, index: 0 } }
    to: { gate_id: inv, pin: { direction: input, index: 0 } }
"#;
        let circuit = Circuit::from_yaml(yaml).unwrap();
        assert_eq!(circuit.gates.len(), 2);
        assert_eq!(circuit.wires.len(), 1);
        assert_eq!(circuit.gate("a").unwrap().kind, GateKind::Input);
        assert!(circuit.gate("a").unwrap().output());
    }

    #[test]
    fn test_circuit_json_round_trip() {
        let circuit = Circuit::new().with_gate(crate::circuit::Gate::new("x", GateKind::Xor));
        let json = circuit.to_json().unwrap();
        let back = Circuit::from_json(&json).unwrap();
        assert_eq!(circuit, back);
    }

    #[test]
    fn test_unknown_format_rejected() {
        let err = Circuit::from_file("circuit.toml").unwrap_err();
        assert!(matches!(err, CircuitFileError::UnknownFormat(_)));
    }
}
