//! Circuit data model: gates, wires and custom gate definitions.
//!
//! A [`Circuit`] is the snapshot shape exchanged between the host, the
//! evaluator and the timing capture subsystem. Evaluation never mutates a
//! snapshot in place; it always returns a new one.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{GateId, PinRef, Signal, TimeMs, WireId};

/// The closed set of gate types the kernel can evaluate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GateKind {
    /// Externally driven source; its output is set by the host.
    Input,
    /// Sink that mirrors its single input.
    Output,
    And,
    Or,
    Not,
    Xor,
    Nand,
    Nor,
    /// 2-to-1 multiplexer: inputs are (data0, data1, select).
    Mux,
    /// Free-running square-wave source.
    Clock,
    /// Rising-edge-triggered D flip-flop: inputs are (data, clock).
    DFlipFlop,
    /// Set/reset latch: inputs are (set, reset).
    SrLatch,
    /// User-defined composite gate backed by a [`CustomGateDefinition`].
    Custom,
}

impl GateKind {
    /// Fixed input arity for this kind.
    ///
    /// Custom gates take their arity from their definition; this returns
    /// `None` for them.
    pub fn input_arity(&self) -> Option<usize> {
        match self {
            GateKind::Input | GateKind::Clock => Some(0),
            GateKind::Output | GateKind::Not => Some(1),
            GateKind::And
            | GateKind::Or
            | GateKind::Xor
            | GateKind::Nand
            | GateKind::Nor
            | GateKind::SrLatch => Some(2),
            GateKind::Mux => Some(3),
            GateKind::DFlipFlop => Some(2),
            GateKind::Custom => None,
        }
    }

    /// Number of output pins for this kind (custom gates: from definition).
    pub fn output_arity(&self) -> Option<usize> {
        match self {
            GateKind::Custom => None,
            _ => Some(1),
        }
    }

    /// Returns `true` if this kind retains state between ticks.
    pub fn is_sequential(&self) -> bool {
        matches!(
            self,
            GateKind::Clock | GateKind::DFlipFlop | GateKind::SrLatch
        )
    }

    /// Returns `true` if the output depends only on current inputs.
    pub fn is_combinational(&self) -> bool {
        !self.is_sequential() && !matches!(self, GateKind::Input | GateKind::Custom)
    }

    /// Returns `true` if the gate is a source (no wired inputs expected).
    pub fn is_source(&self) -> bool {
        matches!(self, GateKind::Input | GateKind::Clock)
    }
}

/// Per-kind retained state, as a tagged union.
///
/// Keeping the state shape tied to the gate kind makes invalid field
/// combinations unrepresentable and lets evaluation dispatch exhaustively.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum GateState {
    /// No retained state.
    Combinational,
    /// Square-wave clock parameters.
    Clock {
        /// Output frequency in hertz; must be positive.
        frequency_hz: f64,
        /// Provider timestamp at which the wave starts, in milliseconds.
        start_time_ms: TimeMs,
        /// When false the output is forced low regardless of time.
        is_running: bool,
    },
    /// D flip-flop retained state.
    DFlipFlop {
        /// Latched Q output.
        q_output: Signal,
        /// Clock level observed on the previous evaluation.
        previous_clock_state: Signal,
    },
    /// SR latch retained state.
    SrLatch {
        /// Latched Q output.
        q_output: Signal,
    },
    /// Custom gate runtime state.
    Custom {
        /// Snapshot of the internal sub-circuit after the last tick, for
        /// definitions evaluated by internal circuit. `None` before the
        /// first evaluation or for truth-table definitions.
        internal: Option<Box<Circuit>>,
    },
}

impl GateState {
    /// The default state for a freshly placed gate of `kind`.
    pub fn initial_for(kind: GateKind) -> Self {
        match kind {
            GateKind::Clock => GateState::Clock {
                frequency_hz: 1.0,
                start_time_ms: 0.0,
                is_running: true,
            },
            GateKind::DFlipFlop => GateState::DFlipFlop {
                q_output: false,
                previous_clock_state: false,
            },
            GateKind::SrLatch => GateState::SrLatch { q_output: false },
            GateKind::Custom => GateState::Custom { internal: None },
            _ => GateState::Combinational,
        }
    }

    /// Returns `true` if this state shape matches the given gate kind.
    pub fn matches_kind(&self, kind: GateKind) -> bool {
        matches!(
            (self, kind),
            (GateState::Clock { .. }, GateKind::Clock)
                | (GateState::DFlipFlop { .. }, GateKind::DFlipFlop)
                | (GateState::SrLatch { .. }, GateKind::SrLatch)
                | (GateState::Custom { .. }, GateKind::Custom)
        ) || (matches!(self, GateState::Combinational)
            && !kind.is_sequential()
            && kind != GateKind::Custom)
    }
}

/// Canvas position of a gate. Carried through evaluation, never read by it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    /// Creates a new position.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Returns `true` if both coordinates are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// How a custom gate computes its outputs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum CustomGateStrategy {
    /// Exact lookup from an input bitstring (e.g. `"10"`) to an output
    /// bitstring. Missing combinations are an evaluation error, never a
    /// silent default.
    TruthTable {
        table: HashMap<String, String>,
    },
    /// A nested circuit whose `Input`/`Output` gates, in pin declaration
    /// order, are the custom gate's pins. Evaluated by re-entering the
    /// circuit evaluator, bounded by the configured recursion depth.
    InternalCircuit {
        circuit: Box<Circuit>,
    },
}

/// Definition of a user-built composite gate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomGateDefinition {
    /// Display name of the definition.
    pub name: String,
    /// Input pin names, in order.
    pub input_pins: Vec<String>,
    /// Output pin names, in order.
    pub output_pins: Vec<String>,
    /// The evaluation strategy.
    #[serde(flatten)]
    pub strategy: CustomGateStrategy,
}

impl CustomGateDefinition {
    /// Creates a truth-table definition.
    pub fn truth_table(
        name: impl Into<String>,
        input_pins: Vec<String>,
        output_pins: Vec<String>,
        table: HashMap<String, String>,
    ) -> Self {
        Self {
            name: name.into(),
            input_pins,
            output_pins,
            strategy: CustomGateStrategy::TruthTable { table },
        }
    }

    /// Creates an internal-circuit definition.
    pub fn internal_circuit(
        name: impl Into<String>,
        input_pins: Vec<String>,
        output_pins: Vec<String>,
        circuit: Circuit,
    ) -> Self {
        Self {
            name: name.into(),
            input_pins,
            output_pins,
            strategy: CustomGateStrategy::InternalCircuit {
                circuit: Box::new(circuit),
            },
        }
    }
}

/// A placed gate: identity, kind, pins and retained state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Gate {
    /// Unique identifier within the circuit.
    pub id: GateId,
    /// The gate type.
    pub kind: GateKind,
    /// Canvas position (not evaluation-relevant).
    #[serde(default)]
    pub position: Position,
    /// Current input signal values, one per input pin.
    #[serde(default)]
    pub inputs: Vec<Signal>,
    /// Current output signal values, one per output pin.
    #[serde(default)]
    pub outputs: Vec<Signal>,
    /// Retained per-kind state, updated only by evaluation.
    pub state: GateState,
    /// Present for `Custom` gates only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<CustomGateDefinition>,
}

impl Gate {
    /// Creates a gate of the given kind with default state and low pins.
    pub fn new(id: impl Into<GateId>, kind: GateKind) -> Self {
        let input_len = kind.input_arity().unwrap_or(0);
        let output_len = kind.output_arity().unwrap_or(1);
        Self {
            id: id.into(),
            kind,
            position: Position::default(),
            inputs: vec![false; input_len],
            outputs: vec![false; output_len],
            state: GateState::initial_for(kind),
            definition: None,
        }
    }

    /// Creates a custom gate from a definition, sizing pins accordingly.
    pub fn custom(id: impl Into<GateId>, definition: CustomGateDefinition) -> Self {
        let mut gate = Self::new(id, GateKind::Custom);
        gate.inputs = vec![false; definition.input_pins.len()];
        gate.outputs = vec![false; definition.output_pins.len()];
        gate.definition = Some(definition);
        gate
    }

    /// Sets the position.
    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Position::new(x, y);
        self
    }

    /// Sets the primary output, for `Input` gates driven by the host.
    pub fn with_output(mut self, value: Signal) -> Self {
        if self.outputs.is_empty() {
            self.outputs.push(value);
        } else {
            self.outputs[0] = value;
        }
        self
    }

    /// Replaces the retained state.
    pub fn with_state(mut self, state: GateState) -> Self {
        self.state = state;
        self
    }

    /// The primary (first) output value, low if the gate has none.
    pub fn output(&self) -> Signal {
        self.outputs.first().copied().unwrap_or(false)
    }

    /// Number of input pins this gate exposes.
    pub fn input_pin_count(&self) -> usize {
        match self.kind.input_arity() {
            Some(n) => n,
            None => self
                .definition
                .as_ref()
                .map(|d| d.input_pins.len())
                .unwrap_or(0),
        }
    }

    /// Number of output pins this gate exposes.
    pub fn output_pin_count(&self) -> usize {
        match self.kind.output_arity() {
            Some(n) => n,
            None => self
                .definition
                .as_ref()
                .map(|d| d.output_pins.len())
                .unwrap_or(1),
        }
    }
}

/// One end of a wire: a gate and a pin on it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WireEndpoint {
    /// The gate this endpoint attaches to.
    pub gate_id: GateId,
    /// The pin on that gate.
    pub pin: PinRef,
}

impl WireEndpoint {
    /// Creates a new endpoint.
    pub fn new(gate_id: impl Into<GateId>, pin: PinRef) -> Self {
        Self {
            gate_id: gate_id.into(),
            pin,
        }
    }
}

/// A directed connection from an output pin to an input pin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Wire {
    /// Unique identifier within the circuit.
    pub id: WireId,
    /// Driving endpoint; must reference an output pin.
    pub from: WireEndpoint,
    /// Driven endpoint; must reference an input pin.
    pub to: WireEndpoint,
    /// Whether the wire currently carries a high signal (for rendering).
    #[serde(default)]
    pub is_active: bool,
}

impl Wire {
    /// Creates a wire from an output pin to an input pin.
    pub fn new(
        id: impl Into<WireId>,
        from_gate: impl Into<GateId>,
        from_pin: usize,
        to_gate: impl Into<GateId>,
        to_pin: usize,
    ) -> Self {
        Self {
            id: id.into(),
            from: WireEndpoint::new(from_gate, PinRef::output(from_pin)),
            to: WireEndpoint::new(to_gate, PinRef::input(to_pin)),
            is_active: false,
        }
    }
}

/// A full circuit snapshot: gates plus the wires connecting them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Circuit {
    /// All gates in the circuit.
    #[serde(default)]
    pub gates: Vec<Gate>,
    /// All wires in the circuit.
    #[serde(default)]
    pub wires: Vec<Wire>,
}

impl Circuit {
    /// Creates an empty circuit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a gate, builder-style.
    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gates.push(gate);
        self
    }

    /// Adds a wire, builder-style.
    pub fn with_wire(mut self, wire: Wire) -> Self {
        self.wires.push(wire);
        self
    }

    /// Looks up a gate by id.
    pub fn gate(&self, id: &str) -> Option<&Gate> {
        self.gates.iter().find(|g| g.id == id)
    }

    /// Looks up a gate mutably by id.
    pub fn gate_mut(&mut self, id: &str) -> Option<&mut Gate> {
        self.gates.iter_mut().find(|g| g.id == id)
    }

    /// Index of gate ids to positions in `gates`, for O(1) resolution.
    pub fn gate_index(&self) -> HashMap<&str, usize> {
        self.gates
            .iter()
            .enumerate()
            .map(|(i, g)| (g.id.as_str(), i))
            .collect()
    }

    /// Sets the output of an `Input` gate, returning whether it was found.
    pub fn set_input(&mut self, id: &str, value: Signal) -> bool {
        match self.gate_mut(id) {
            Some(gate) if gate.kind == GateKind::Input => {
                if gate.outputs.is_empty() {
                    gate.outputs.push(value);
                } else {
                    gate.outputs[0] = value;
                }
                true
            }
            _ => false,
        }
    }
}
