//! Pure per-gate evaluation.
//!
//! [`evaluate_gate`] maps one gate plus its resolved input signals to its
//! output signals and next retained state. It never mutates its arguments;
//! sequential state changes are returned in [`GateOutputs::state`] and only
//! become visible when the circuit evaluator writes them onto the next
//! snapshot.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::circuit::{CustomGateStrategy, Gate, GateKind, GateState};
use crate::config::EvaluationConfig;
use crate::error::EvalError;
use crate::time::TimeProvider;
use crate::types::Signal;

/// Shared context threaded through gate and circuit evaluation.
pub struct EvalContext<'a> {
    /// Evaluation knobs.
    pub config: &'a EvaluationConfig,
    /// Injected time source for clock phase.
    pub time: &'a dyn TimeProvider,
    /// Current custom-gate nesting depth.
    pub depth: usize,
}

impl<'a> EvalContext<'a> {
    /// Creates a top-level context.
    pub fn new(config: &'a EvaluationConfig, time: &'a dyn TimeProvider) -> Self {
        Self {
            config,
            time,
            depth: 0,
        }
    }

    /// A context one nesting level deeper, for custom-gate recursion.
    pub fn descend(&self) -> EvalContext<'a> {
        EvalContext {
            config: self.config,
            time: self.time,
            depth: self.depth + 1,
        }
    }
}

/// Debug snapshot attached to a result when `enable_debug` is set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GateDebugInfo {
    /// The resolved input signals the gate saw.
    pub inputs: Vec<Signal>,
    /// Wall time spent evaluating this gate, in milliseconds.
    pub duration_ms: f64,
    /// Kind-specific intermediate values, when any exist.
    pub note: Option<String>,
}

/// The result of evaluating a single gate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GateOutputs {
    /// All output pin values, in pin order.
    pub outputs: Vec<Signal>,
    /// The first output value.
    pub primary_output: Signal,
    /// True when the gate has exactly one output pin.
    pub is_single_output: bool,
    /// The gate's retained state after this evaluation.
    pub state: GateState,
    /// Present only when debug capture is enabled.
    pub debug: Option<GateDebugInfo>,
}

impl GateOutputs {
    fn single(output: Signal, state: GateState) -> Self {
        Self {
            outputs: vec![output],
            primary_output: output,
            is_single_output: true,
            state,
            debug: None,
        }
    }

    fn multi(outputs: Vec<Signal>, state: GateState) -> Self {
        let primary_output = outputs.first().copied().unwrap_or(false);
        let is_single_output = outputs.len() == 1;
        Self {
            outputs,
            primary_output,
            is_single_output,
            state,
            debug: None,
        }
    }
}

/// Evaluates one gate against the given input signals.
///
/// In strict mode the input count must match the gate's arity exactly;
/// otherwise short input arrays are padded with low signals and extras are
/// ignored.
///
/// Custom gates with an internal-circuit definition cannot be evaluated
/// standalone and return [`EvalError::InternalCircuitUnimplemented`]; the
/// circuit evaluator intercepts that variant and recurses instead.
pub fn evaluate_gate(
    gate: &Gate,
    inputs: &[Signal],
    ctx: &EvalContext<'_>,
) -> Result<GateOutputs, EvalError> {
    let started = Instant::now();

    if !gate.state.matches_kind(gate.kind) {
        return Err(EvalError::StateKindMismatch {
            gate_id: gate.id.clone(),
            kind: gate.kind,
        });
    }

    let expected = if gate.kind == GateKind::Custom {
        match &gate.definition {
            Some(def) => def.input_pins.len(),
            None => {
                return Err(EvalError::MissingCustomDefinition {
                    gate_id: gate.id.clone(),
                })
            }
        }
    } else {
        gate.kind.input_arity().unwrap_or(0)
    };

    if ctx.config.strict_validation && inputs.len() != expected {
        return Err(EvalError::InputArityMismatch {
            gate_id: gate.id.clone(),
            kind: gate.kind,
            expected,
            actual: inputs.len(),
        });
    }

    // Missing inputs read low; surplus inputs are ignored.
    let pin = |i: usize| inputs.get(i).copied().unwrap_or(false);
    let resolved: Vec<Signal> = (0..expected).map(pin).collect();

    let mut result = match gate.kind {
        GateKind::Input => GateOutputs::single(gate.output(), gate.state.clone()),
        GateKind::Output => GateOutputs::single(pin(0), gate.state.clone()),
        GateKind::And => GateOutputs::single(pin(0) && pin(1), gate.state.clone()),
        GateKind::Or => GateOutputs::single(pin(0) || pin(1), gate.state.clone()),
        GateKind::Not => GateOutputs::single(!pin(0), gate.state.clone()),
        GateKind::Xor => GateOutputs::single(pin(0) != pin(1), gate.state.clone()),
        GateKind::Nand => GateOutputs::single(!(pin(0) && pin(1)), gate.state.clone()),
        GateKind::Nor => GateOutputs::single(!(pin(0) || pin(1)), gate.state.clone()),
        GateKind::Mux => {
            // Inputs: (data0, data1, select).
            let output = if pin(2) { pin(1) } else { pin(0) };
            GateOutputs::single(output, gate.state.clone())
        }
        GateKind::Clock => evaluate_clock(gate, ctx)?,
        GateKind::DFlipFlop => evaluate_d_flip_flop(gate, pin(0), pin(1)),
        GateKind::SrLatch => evaluate_sr_latch(gate, pin(0), pin(1)),
        GateKind::Custom => evaluate_custom(gate, &resolved)?,
    };

    if ctx.config.enable_debug {
        result.debug = Some(GateDebugInfo {
            inputs: resolved,
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            note: debug_note(gate),
        });
    }

    Ok(result)
}

/// Square wave: high during the second half of each period.
fn evaluate_clock(gate: &Gate, ctx: &EvalContext<'_>) -> Result<GateOutputs, EvalError> {
    let GateState::Clock {
        frequency_hz,
        start_time_ms,
        is_running,
    } = gate.state
    else {
        // matches_kind already screened this.
        return Err(EvalError::StateKindMismatch {
            gate_id: gate.id.clone(),
            kind: gate.kind,
        });
    };

    if !(frequency_hz > 0.0) {
        return Err(EvalError::InvalidClockFrequency {
            gate_id: gate.id.clone(),
            frequency_hz,
        });
    }

    if !is_running {
        return Ok(GateOutputs::single(false, gate.state.clone()));
    }

    let now = ctx.time.now_ms();
    if !now.is_finite() {
        return Err(EvalError::TimeProvider {
            gate_id: gate.id.clone(),
            kind: gate.kind,
        });
    }

    let period = 1000.0 / frequency_hz;
    let phase = (now - start_time_ms).rem_euclid(period);
    Ok(GateOutputs::single(phase >= period / 2.0, gate.state.clone()))
}

/// Rising-edge-triggered capture of D into Q.
fn evaluate_d_flip_flop(gate: &Gate, data: Signal, clk: Signal) -> GateOutputs {
    let (q_output, previous_clock_state) = match gate.state {
        GateState::DFlipFlop {
            q_output,
            previous_clock_state,
        } => (q_output, previous_clock_state),
        _ => (false, false),
    };

    let rising_edge = !previous_clock_state && clk;
    let next_q = if rising_edge { data } else { q_output };

    GateOutputs::single(
        next_q,
        GateState::DFlipFlop {
            q_output: next_q,
            previous_clock_state: clk,
        },
    )
}

/// Set/reset latch. S and R both high is reset-dominant: Q is forced low.
fn evaluate_sr_latch(gate: &Gate, set: Signal, reset: Signal) -> GateOutputs {
    let q_output = match gate.state {
        GateState::SrLatch { q_output } => q_output,
        _ => false,
    };

    let next_q = match (set, reset) {
        (true, false) => true,
        (_, true) => false,
        (false, false) => q_output,
    };

    GateOutputs::single(next_q, GateState::SrLatch { q_output: next_q })
}

/// Truth-table lookup; internal-circuit definitions are deferred to the
/// circuit evaluator.
fn evaluate_custom(gate: &Gate, inputs: &[Signal]) -> Result<GateOutputs, EvalError> {
    let def = gate
        .definition
        .as_ref()
        .ok_or_else(|| EvalError::MissingCustomDefinition {
            gate_id: gate.id.clone(),
        })?;

    match &def.strategy {
        CustomGateStrategy::TruthTable { table } => {
            let key = truth_table_key(inputs);
            let row = table.get(&key).ok_or_else(|| EvalError::TruthTableMiss {
                gate_id: gate.id.clone(),
                key: key.clone(),
            })?;

            if row.len() != def.output_pins.len() {
                return Err(EvalError::TruthTableWidthMismatch {
                    gate_id: gate.id.clone(),
                    key,
                    expected: def.output_pins.len(),
                    actual: row.len(),
                });
            }

            let outputs: Vec<Signal> = row.chars().map(|c| c == '1').collect();
            Ok(GateOutputs::multi(outputs, gate.state.clone()))
        }
        CustomGateStrategy::InternalCircuit { .. } => Err(EvalError::InternalCircuitUnimplemented {
            gate_id: gate.id.clone(),
        }),
    }
}

/// Encodes input signals as a truth-table key, e.g. `[true, false]` → `"10"`.
pub fn truth_table_key(inputs: &[Signal]) -> String {
    inputs.iter().map(|&b| if b { '1' } else { '0' }).collect()
}

fn debug_note(gate: &Gate) -> Option<String> {
    match &gate.state {
        GateState::Clock {
            frequency_hz,
            is_running,
            ..
        } => Some(format!(
            "clock frequency_hz={frequency_hz} is_running={is_running}"
        )),
        GateState::DFlipFlop {
            previous_clock_state,
            ..
        } => Some(format!("previous_clock_state={previous_clock_state}")),
        _ => None,
    }
}
