//! Whole-circuit evaluation: one synchronous tick.
//!
//! The evaluator validates the snapshot, derives evaluation layers from the
//! wire graph, then invokes the gate evaluator once per gate in dependency
//! order, recursing into custom gates that embed internal circuits. It
//! returns a new snapshot; the input circuit is never mutated.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Instant;

use tracing::{debug, trace};

use crate::circuit::{Circuit, CustomGateStrategy, Gate, GateKind, GateState};
use crate::config::EvaluationConfig;
use crate::error::{ApiError, EvalError, Violation};
use crate::gate::{evaluate_gate, EvalContext, GateOutputs};
use crate::time::{SystemTimeProvider, TimeProvider};
use crate::types::{GateId, Signal};
use crate::validator;

/// The outcome of one evaluation tick.
#[derive(Clone, Debug)]
pub struct EvaluationResult {
    /// The new circuit snapshot with updated outputs and sequential state.
    pub circuit: Circuit,
    /// Non-fatal observations, e.g. isolated gates.
    pub warnings: Vec<String>,
}

/// Counters exposed through [`CircuitEvaluator::export_stats`].
#[derive(Clone, Debug, Default)]
struct EvaluatorStats {
    evaluations: u64,
    gates_evaluated: u64,
    last_duration_ms: f64,
    last_layer_count: usize,
    deepest_recursion: usize,
}

/// Orchestrates full-circuit evaluation ticks.
///
/// Construct one per host simulation loop and call [`evaluate`] with the
/// authoritative snapshot each frame:
///
/// ```
/// use breadboard::{Circuit, CircuitEvaluator, EvaluationConfig, Gate, GateKind, Wire};
///
/// let circuit = Circuit::new()
///     .with_gate(Gate::new("a", GateKind::Input).with_output(true))
///     .with_gate(Gate::new("inv", GateKind::Not))
///     .with_wire(Wire::new("w1", "a", 0, "inv", 0));
///
/// let mut evaluator = CircuitEvaluator::with_system_time(EvaluationConfig::default());
/// let result = evaluator.evaluate(&circuit).unwrap();
/// assert!(!result.circuit.gate("inv").unwrap().output());
/// ```
///
/// [`evaluate`]: CircuitEvaluator::evaluate
pub struct CircuitEvaluator {
    config: EvaluationConfig,
    time: Rc<dyn TimeProvider>,
    stats: EvaluatorStats,
}

impl CircuitEvaluator {
    /// Creates an evaluator with an injected time source.
    pub fn new(config: EvaluationConfig, time: Rc<dyn TimeProvider>) -> Self {
        Self {
            config,
            time,
            stats: EvaluatorStats::default(),
        }
    }

    /// Creates an evaluator backed by the monotonic system clock.
    pub fn with_system_time(config: EvaluationConfig) -> Self {
        Self::new(config, Rc::new(SystemTimeProvider::new()))
    }

    /// The active configuration.
    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Runs one evaluation tick over the circuit.
    ///
    /// Validation runs first (full in strict mode, light otherwise) and a
    /// failed validation blocks evaluation entirely. A single gate failure
    /// fails the whole tick; there are no partial results.
    pub fn evaluate(&mut self, circuit: &Circuit) -> Result<EvaluationResult, ApiError> {
        let started = Instant::now();

        let mut warnings = if self.config.strict_validation {
            validator::validate(circuit, &self.config)?.warnings
        } else {
            validator::validate_light(circuit, &self.config)?;
            Vec::new()
        };

        let ctx = EvalContext::new(&self.config, self.time.as_ref());
        let outcome = evaluate_inner(circuit, &ctx)?;
        // Strict validation already reports isolated gates; keep one copy.
        for warning in outcome.warnings {
            if !warnings.contains(&warning) {
                warnings.push(warning);
            }
        }

        self.stats.evaluations += 1;
        self.stats.gates_evaluated += outcome.gates_evaluated;
        self.stats.last_duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.stats.last_layer_count = outcome.layer_count;
        self.stats.deepest_recursion = self.stats.deepest_recursion.max(outcome.deepest_recursion);

        debug!(
            gates = circuit.gates.len(),
            layers = outcome.layer_count,
            duration_ms = self.stats.last_duration_ms,
            "evaluation tick complete"
        );

        Ok(EvaluationResult {
            circuit: outcome.circuit,
            warnings,
        })
    }

    /// Exports evaluator counters as JSON.
    pub fn export_stats(&self) -> serde_json::Value {
        serde_json::json!({
            "evaluations": self.stats.evaluations,
            "gates_evaluated": self.stats.gates_evaluated,
            "last_duration_ms": self.stats.last_duration_ms,
            "last_layer_count": self.stats.last_layer_count,
            "deepest_recursion": self.stats.deepest_recursion,
        })
    }
}

/// Computes the evaluation layers of a circuit as gate ids.
///
/// Layer 0 holds gates with no driving wire; every other gate sits one
/// layer past its deepest driver. Gates caught in (permitted) cycles form
/// a single trailing layer sorted by id, and isolated gates form the final
/// trailing layer, also sorted by id.
pub fn evaluation_layers(
    circuit: &Circuit,
    allow_circular_dependencies: bool,
) -> Result<Vec<Vec<GateId>>, ApiError> {
    let layers = layer_indices(circuit, allow_circular_dependencies)?;
    Ok(layers
        .into_iter()
        .map(|layer| {
            layer
                .into_iter()
                .map(|i| circuit.gates[i].id.clone())
                .collect()
        })
        .collect())
}

struct InnerOutcome {
    circuit: Circuit,
    warnings: Vec<String>,
    gates_evaluated: u64,
    layer_count: usize,
    deepest_recursion: usize,
}

/// One tick over `circuit`, re-entered recursively for custom gates.
fn evaluate_inner(circuit: &Circuit, ctx: &EvalContext<'_>) -> Result<InnerOutcome, ApiError> {
    let layers = layer_indices(circuit, ctx.config.allow_circular_dependencies)?;
    let wire_map = input_wire_map(circuit);

    let mut new_gates: Vec<Gate> = circuit.gates.to_vec();
    let mut evaluated = vec![false; circuit.gates.len()];
    let mut warnings = Vec::new();
    let mut gates_evaluated = 0u64;
    let mut deepest_recursion = ctx.depth;

    for layer in &layers {
        for &idx in layer {
            let gate = &circuit.gates[idx];

            let inputs: Vec<Signal> = (0..gate.input_pin_count())
                .map(|pin| match wire_map.get(&(idx, pin)) {
                    // A driver evaluated earlier this tick supplies its
                    // fresh output; cycle members still waiting read the
                    // previous snapshot.
                    Some(&(driver, driver_pin)) => {
                        let source = if evaluated[driver] {
                            &new_gates[driver]
                        } else {
                            &circuit.gates[driver]
                        };
                        source.outputs.get(driver_pin).copied().unwrap_or(false)
                    }
                    None => false,
                })
                .collect();

            let result = evaluate_one(gate, &inputs, ctx, &mut deepest_recursion)?;

            if let Some(debug_info) = &result.debug {
                trace!(gate = %gate.id, ?debug_info, "gate evaluated");
            }

            let slot = &mut new_gates[idx];
            slot.inputs = inputs;
            slot.outputs = result.outputs;
            slot.state = result.state;
            evaluated[idx] = true;
            gates_evaluated += 1;
        }
    }

    // Wire activity mirrors the driving gate's fresh output.
    let index = circuit.gate_index();
    let mut new_wires = circuit.wires.to_vec();
    for wire in &mut new_wires {
        if let Some(&driver) = index.get(wire.from.gate_id.as_str()) {
            wire.is_active = new_gates[driver]
                .outputs
                .get(wire.from.pin.index)
                .copied()
                .unwrap_or(false);
        }
    }

    if let Some(isolated) = layers.last() {
        let connected: HashSet<usize> = wire_map
            .keys()
            .map(|&(g, _)| g)
            .chain(wire_map.values().map(|&(d, _)| d))
            .collect();
        if circuit.gates.len() > 1 {
            for &idx in isolated {
                if !connected.contains(&idx) && !has_outgoing(circuit, idx) {
                    warnings.push(format!(
                        "gate `{}` is isolated (no wires attached)",
                        circuit.gates[idx].id
                    ));
                }
            }
        }
    }

    Ok(InnerOutcome {
        circuit: Circuit {
            gates: new_gates,
            wires: new_wires,
        },
        warnings,
        gates_evaluated,
        layer_count: layers.len(),
        deepest_recursion,
    })
}

fn has_outgoing(circuit: &Circuit, idx: usize) -> bool {
    let id = circuit.gates[idx].id.as_str();
    circuit.wires.iter().any(|w| w.from.gate_id == id)
}

/// Dispatches one gate, intercepting internal-circuit custom gates so they
/// re-enter the circuit evaluator instead of the standalone gate path.
fn evaluate_one(
    gate: &Gate,
    inputs: &[Signal],
    ctx: &EvalContext<'_>,
    deepest_recursion: &mut usize,
) -> Result<GateOutputs, ApiError> {
    let is_internal_circuit = matches!(
        gate.definition.as_ref().map(|d| &d.strategy),
        Some(CustomGateStrategy::InternalCircuit { .. })
    );

    if gate.kind == GateKind::Custom && is_internal_circuit {
        evaluate_custom_internal(gate, inputs, ctx, deepest_recursion)
    } else {
        evaluate_gate(gate, inputs, ctx).map_err(ApiError::evaluation)
    }
}

/// Evaluates a custom gate by recursing into its internal circuit.
///
/// Parent inputs map onto the sub-circuit's `Input` gates in declaration
/// order; `Output` gates read back as the parent's outputs in declaration
/// order. The sub-circuit snapshot survives between ticks inside
/// [`GateState::Custom`], so nested sequential gates keep their state.
fn evaluate_custom_internal(
    gate: &Gate,
    inputs: &[Signal],
    ctx: &EvalContext<'_>,
    deepest_recursion: &mut usize,
) -> Result<GateOutputs, ApiError> {
    let def = gate
        .definition
        .as_ref()
        .ok_or_else(|| {
            ApiError::evaluation(EvalError::MissingCustomDefinition {
                gate_id: gate.id.clone(),
            })
        })?;

    let depth = ctx.depth + 1;
    if depth > ctx.config.max_recursion_depth {
        return Err(ApiError::evaluation(EvalError::RecursionDepthExceeded {
            gate_id: gate.id.clone(),
            depth,
            max: ctx.config.max_recursion_depth,
        }));
    }

    let CustomGateStrategy::InternalCircuit { circuit: template } = &def.strategy else {
        return Err(ApiError::evaluation(EvalError::InternalCircuitUnimplemented {
            gate_id: gate.id.clone(),
        }));
    };

    // Resume from the surviving sub-circuit snapshot when there is one.
    let mut sub = match &gate.state {
        GateState::Custom {
            internal: Some(snapshot),
        } => (**snapshot).clone(),
        _ => (**template).clone(),
    };

    let mut pin = 0usize;
    for sub_gate in sub.gates.iter_mut() {
        if sub_gate.kind == GateKind::Input {
            let value = inputs.get(pin).copied().unwrap_or(false);
            if sub_gate.outputs.is_empty() {
                sub_gate.outputs.push(value);
            } else {
                sub_gate.outputs[0] = value;
            }
            pin += 1;
        }
    }

    let child_ctx = ctx.descend();
    let outcome = evaluate_inner(&sub, &child_ctx).map_err(|e| ApiError {
        message: format!("in custom gate `{}`: {}", gate.id, e.message),
        ..e
    })?;
    *deepest_recursion = (*deepest_recursion).max(outcome.deepest_recursion.max(depth));

    let outputs: Vec<Signal> = outcome
        .circuit
        .gates
        .iter()
        .filter(|g| g.kind == GateKind::Output)
        .map(|g| g.output())
        .chain(std::iter::repeat(false))
        .take(def.output_pins.len())
        .collect();

    let primary_output = outputs.first().copied().unwrap_or(false);
    let is_single_output = outputs.len() == 1;
    Ok(GateOutputs {
        outputs,
        primary_output,
        is_single_output,
        state: GateState::Custom {
            internal: Some(Box::new(outcome.circuit)),
        },
        debug: None,
    })
}

/// Maps each wired input pin to its driving gate and output pin.
fn input_wire_map(circuit: &Circuit) -> HashMap<(usize, usize), (usize, usize)> {
    let index = circuit.gate_index();
    let mut map = HashMap::new();
    for wire in &circuit.wires {
        if let (Some(&driver), Some(&driven)) = (
            index.get(wire.from.gate_id.as_str()),
            index.get(wire.to.gate_id.as_str()),
        ) {
            map.insert((driven, wire.to.pin.index), (driver, wire.from.pin.index));
        }
    }
    map
}

/// Kahn layering over the wire graph; see [`evaluation_layers`].
fn layer_indices(
    circuit: &Circuit,
    allow_circular_dependencies: bool,
) -> Result<Vec<Vec<usize>>, ApiError> {
    let n = circuit.gates.len();
    let index = circuit.gate_index();

    let mut incident = vec![false; n];
    let mut edges: HashSet<(usize, usize)> = HashSet::new();
    for wire in &circuit.wires {
        if let (Some(&from), Some(&to)) = (
            index.get(wire.from.gate_id.as_str()),
            index.get(wire.to.gate_id.as_str()),
        ) {
            incident[from] = true;
            incident[to] = true;
            edges.insert((from, to));
        }
    }

    let isolated: Vec<usize> = if n > 1 {
        (0..n).filter(|&i| !incident[i]).collect()
    } else {
        Vec::new()
    };
    let in_graph: Vec<usize> = (0..n).filter(|&i| n == 1 || incident[i]).collect();

    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut in_degree = vec![0usize; n];
    for &(from, to) in &edges {
        adjacency[from].push(to);
        in_degree[to] += 1;
    }
    for list in &mut adjacency {
        list.sort_unstable();
    }

    let mut layers: Vec<Vec<usize>> = Vec::new();
    let mut placed = vec![false; n];
    let mut wave: Vec<usize> = in_graph
        .iter()
        .copied()
        .filter(|&i| in_degree[i] == 0)
        .collect();
    let mut placed_count = 0usize;

    while !wave.is_empty() {
        wave.sort_unstable();
        let mut next_wave = Vec::new();
        for &node in &wave {
            placed[node] = true;
            placed_count += 1;
            for &next in &adjacency[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    next_wave.push(next);
                }
            }
        }
        layers.push(std::mem::take(&mut wave));
        wave = next_wave;
    }

    // Anything Kahn could not place sits on a cycle.
    if placed_count < in_graph.len() {
        let mut leftover: Vec<usize> = in_graph.iter().copied().filter(|&i| !placed[i]).collect();

        // A cycle made entirely of combinational gates would oscillate
        // within one tick; it is fatal even when circular dependencies are
        // permitted (and even when light validation skipped cycle checks).
        for component in validator::strongly_connected_components(&adjacency) {
            let cyclic = component.len() > 1
                || (component.len() == 1 && edges.contains(&(component[0], component[0])));
            if cyclic
                && component
                    .iter()
                    .all(|&i| !circuit.gates[i].kind.is_sequential())
            {
                let mut ids: Vec<&str> = component
                    .iter()
                    .map(|&i| circuit.gates[i].id.as_str())
                    .collect();
                ids.sort_unstable();
                return Err(ApiError::validation(vec![Violation::circuit(format!(
                    "combinational cycle (infinite loop) through gates: {}",
                    ids.join(", ")
                ))]));
            }
        }

        if !allow_circular_dependencies {
            let mut ids: Vec<&str> = leftover
                .iter()
                .map(|&i| circuit.gates[i].id.as_str())
                .collect();
            ids.sort_unstable();
            return Err(ApiError::validation(vec![Violation::circuit(format!(
                "cycle detected through gates: {}",
                ids.join(", ")
            ))]));
        }
        leftover.sort_by(|&a, &b| circuit.gates[a].id.cmp(&circuit.gates[b].id));
        layers.push(leftover);
    }

    if !isolated.is_empty() {
        let mut trailing = isolated;
        trailing.sort_by(|&a, &b| circuit.gates[a].id.cmp(&circuit.gates[b].id));
        layers.push(trailing);
    }

    Ok(layers)
}
