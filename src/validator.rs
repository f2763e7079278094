//! Structural and semantic validation of circuit snapshots.
//!
//! Full validation checks gate identities, arities, state shapes, wire
//! endpoints and graph cycles, collecting every violation rather than
//! stopping at the first. Light validation is the cheap shape-only subset
//! for hot paths that run every frame.

use std::collections::HashSet;

use tracing::debug;

use crate::circuit::{Circuit, CustomGateStrategy, Gate, GateKind};
use crate::config::EvaluationConfig;
use crate::error::{ApiError, Violation};
use crate::types::{is_legal_id, PinDirection, MAX_GATE_ID_LEN};

/// Advisory output of a successful validation pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationReport {
    /// Non-fatal observations, e.g. isolated gates.
    pub warnings: Vec<String>,
    /// UX hints, populated only in non-strict mode. Never affect pass/fail.
    pub suggestions: Vec<String>,
}

/// Runs full semantic validation over a circuit.
///
/// The gate-count limit is checked first and fails fast with a capacity
/// error; all other problems are collected into a single
/// [`ApiError::validation`] so the host can report them together.
pub fn validate(circuit: &Circuit, config: &EvaluationConfig) -> Result<ValidationReport, ApiError> {
    check_capacity(circuit, config)?;

    let mut violations = Vec::new();

    let mut seen_ids: HashSet<&str> = HashSet::new();
    for gate in &circuit.gates {
        if !seen_ids.insert(gate.id.as_str()) {
            violations.push(Violation::gate(
                gate.id.clone(),
                format!("duplicate gate id `{}`", gate.id),
            ));
        }
        validate_gate(gate, &mut violations);
    }

    validate_wires(circuit, &mut violations);
    validate_cycles(circuit, config, &mut violations);

    // Custom definitions with internal circuits are validated recursively,
    // under the same configuration.
    for gate in &circuit.gates {
        if let Some(def) = &gate.definition {
            if let CustomGateStrategy::InternalCircuit { circuit: inner } = &def.strategy {
                if let Err(err) = validate(inner, config) {
                    for inner_violation in &err.violations {
                        violations.push(Violation::gate(
                            gate.id.clone(),
                            format!(
                                "internal circuit of `{}`: {}",
                                def.name, inner_violation.message
                            ),
                        ));
                    }
                    if err.violations.is_empty() {
                        violations.push(Violation::gate(gate.id.clone(), err.message));
                    }
                }
            }
        }
    }

    if !violations.is_empty() {
        debug!(count = violations.len(), "validation failed");
        return Err(ApiError::validation(violations));
    }

    let mut report = ValidationReport::default();
    collect_warnings(circuit, &mut report);
    if !config.strict_validation {
        collect_suggestions(circuit, &mut report);
    }
    Ok(report)
}

/// Cheap shape-only validation for per-frame hot paths.
///
/// Checks only the gate-count limit, id non-emptiness and wire endpoint
/// existence.
pub fn validate_light(circuit: &Circuit, config: &EvaluationConfig) -> Result<(), ApiError> {
    check_capacity(circuit, config)?;

    let mut violations = Vec::new();
    let ids: HashSet<&str> = circuit.gates.iter().map(|g| g.id.as_str()).collect();

    for gate in &circuit.gates {
        if gate.id.is_empty() {
            violations.push(Violation::circuit("gate with empty id"));
        }
    }
    for wire in &circuit.wires {
        if !ids.contains(wire.from.gate_id.as_str()) || !ids.contains(wire.to.gate_id.as_str()) {
            violations.push(Violation::wire(
                wire.id.clone(),
                format!("wire `{}` references a missing gate", wire.id),
            ));
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ApiError::validation(violations))
    }
}

fn check_capacity(circuit: &Circuit, config: &EvaluationConfig) -> Result<(), ApiError> {
    if circuit.gates.len() > config.max_gate_count {
        return Err(ApiError::capacity(format!(
            "circuit too complex: {} gates exceeds the limit of {}",
            circuit.gates.len(),
            config.max_gate_count
        )));
    }
    Ok(())
}

fn validate_gate(gate: &Gate, violations: &mut Vec<Violation>) {
    if !is_legal_id(&gate.id) {
        violations.push(Violation::gate(
            gate.id.clone(),
            format!(
                "illegal gate id `{}`: must be 1-{} characters of [A-Za-z0-9_.-]",
                gate.id, MAX_GATE_ID_LEN
            ),
        ));
    }

    if !gate.position.is_finite() {
        violations.push(Violation::gate(
            gate.id.clone(),
            format!("gate `{}` has a non-finite position", gate.id),
        ));
    }

    if !gate.state.matches_kind(gate.kind) {
        violations.push(Violation::gate(
            gate.id.clone(),
            format!(
                "gate `{}` carries state that does not match kind {:?}",
                gate.id, gate.kind
            ),
        ));
    }

    match gate.kind {
        GateKind::Custom => match &gate.definition {
            None => violations.push(Violation::gate(
                gate.id.clone(),
                format!("custom gate `{}` has no definition", gate.id),
            )),
            Some(def) => {
                if def.input_pins.is_empty() || def.output_pins.is_empty() {
                    violations.push(Violation::gate(
                        gate.id.clone(),
                        format!(
                            "custom gate `{}` definition `{}` must declare at least one \
                             input and one output pin",
                            gate.id, def.name
                        ),
                    ));
                }
                if gate.inputs.len() != def.input_pins.len() {
                    violations.push(Violation::gate(
                        gate.id.clone(),
                        format!(
                            "custom gate `{}` stores {} inputs, definition declares {}",
                            gate.id,
                            gate.inputs.len(),
                            def.input_pins.len()
                        ),
                    ));
                }
                if let CustomGateStrategy::TruthTable { table } = &def.strategy {
                    for (key, row) in table {
                        if key.len() != def.input_pins.len()
                            || !key.chars().all(|c| c == '0' || c == '1')
                        {
                            violations.push(Violation::gate(
                                gate.id.clone(),
                                format!(
                                    "custom gate `{}`: malformed truth table key `{}`",
                                    gate.id, key
                                ),
                            ));
                        }
                        if row.len() != def.output_pins.len()
                            || !row.chars().all(|c| c == '0' || c == '1')
                        {
                            violations.push(Violation::gate(
                                gate.id.clone(),
                                format!(
                                    "custom gate `{}`: malformed truth table row `{}` for \
                                     key `{}`",
                                    gate.id, row, key
                                ),
                            ));
                        }
                    }
                }
            }
        },
        _ => {
            let expected = gate.kind.input_arity().unwrap_or(0);
            if gate.inputs.len() != expected {
                violations.push(Violation::gate(
                    gate.id.clone(),
                    format!(
                        "gate `{}` ({:?}) stores {} inputs, expected {}",
                        gate.id,
                        gate.kind,
                        gate.inputs.len(),
                        expected
                    ),
                ));
            }
        }
    }
}

fn validate_wires(circuit: &Circuit, violations: &mut Vec<Violation>) {
    let index = circuit.gate_index();
    let mut seen_wire_ids: HashSet<&str> = HashSet::new();

    for wire in &circuit.wires {
        if !seen_wire_ids.insert(wire.id.as_str()) {
            violations.push(Violation::wire(
                wire.id.clone(),
                format!("duplicate wire id `{}`", wire.id),
            ));
        }

        if wire.from.pin.direction != PinDirection::Output {
            violations.push(Violation::wire(
                wire.id.clone(),
                format!("wire `{}` must start at an output pin", wire.id),
            ));
        }
        if wire.to.pin.direction != PinDirection::Input {
            violations.push(Violation::wire(
                wire.id.clone(),
                format!("wire `{}` must end at an input pin", wire.id),
            ));
        }

        match index.get(wire.from.gate_id.as_str()) {
            None => violations.push(Violation::wire(
                wire.id.clone(),
                format!(
                    "wire `{}` starts at missing gate `{}`",
                    wire.id, wire.from.gate_id
                ),
            )),
            Some(&i) => {
                let driver = &circuit.gates[i];
                if wire.from.pin.index >= driver.output_pin_count() {
                    violations.push(Violation::wire(
                        wire.id.clone(),
                        format!(
                            "wire `{}` references output pin {} of gate `{}`, which has \
                             {} output pins",
                            wire.id,
                            wire.from.pin.index,
                            driver.id,
                            driver.output_pin_count()
                        ),
                    ));
                }
            }
        }

        match index.get(wire.to.gate_id.as_str()) {
            None => violations.push(Violation::wire(
                wire.id.clone(),
                format!(
                    "wire `{}` ends at missing gate `{}`",
                    wire.id, wire.to.gate_id
                ),
            )),
            Some(&i) => {
                let driven = &circuit.gates[i];
                if wire.to.pin.index >= driven.input_pin_count() {
                    violations.push(Violation::wire(
                        wire.id.clone(),
                        format!(
                            "wire `{}` references input pin {} of gate `{}`, which has \
                             {} input pins",
                            wire.id,
                            wire.to.pin.index,
                            driven.id,
                            driven.input_pin_count()
                        ),
                    ));
                }
            }
        }
    }
}

/// Classifies every strongly connected component of the wire graph.
///
/// A cycle made entirely of combinational gates is always fatal (it would
/// oscillate forever within one tick). Cycles passing through a sequential
/// gate are tolerated only under `allow_circular_dependencies`.
fn validate_cycles(circuit: &Circuit, config: &EvaluationConfig, violations: &mut Vec<Violation>) {
    let index = circuit.gate_index();
    let n = circuit.gates.len();

    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut self_loops: HashSet<usize> = HashSet::new();
    for wire in &circuit.wires {
        if let (Some(&from), Some(&to)) = (
            index.get(wire.from.gate_id.as_str()),
            index.get(wire.to.gate_id.as_str()),
        ) {
            if from == to {
                self_loops.insert(from);
            }
            adjacency[from].push(to);
        }
    }

    for component in strongly_connected_components(&adjacency) {
        let cyclic = component.len() > 1
            || (component.len() == 1 && self_loops.contains(&component[0]));
        if !cyclic {
            continue;
        }

        let mut member_ids: Vec<&str> = component
            .iter()
            .map(|&i| circuit.gates[i].id.as_str())
            .collect();
        member_ids.sort_unstable();
        let members = member_ids.join(", ");

        let all_combinational = component
            .iter()
            .all(|&i| !circuit.gates[i].kind.is_sequential());

        if all_combinational {
            violations.push(Violation::circuit(format!(
                "combinational cycle (infinite loop) through gates: {members}"
            )));
        } else if !config.allow_circular_dependencies {
            violations.push(Violation::circuit(format!(
                "cycle through gates: {members}; sequential feedback requires \
                 allow_circular_dependencies"
            )));
        }
    }
}

/// Iterative Tarjan SCC over an adjacency list.
pub(crate) fn strongly_connected_components(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let n = adjacency.len();
    let mut indices = vec![usize::MAX; n];
    let mut lowlinks = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut components = Vec::new();
    let mut counter = 0usize;

    // Explicit call stack: (node, next child position).
    let mut call_stack: Vec<(usize, usize)> = Vec::new();

    for start in 0..n {
        if indices[start] != usize::MAX {
            continue;
        }
        call_stack.push((start, 0));
        while let Some(&mut (node, ref mut child_pos)) = call_stack.last_mut() {
            if *child_pos == 0 {
                indices[node] = counter;
                lowlinks[node] = counter;
                counter += 1;
                stack.push(node);
                on_stack[node] = true;
            }

            if let Some(&next) = adjacency[node].get(*child_pos) {
                *child_pos += 1;
                if indices[next] == usize::MAX {
                    call_stack.push((next, 0));
                } else if on_stack[next] {
                    lowlinks[node] = lowlinks[node].min(indices[next]);
                }
            } else {
                call_stack.pop();
                if let Some(&(parent, _)) = call_stack.last() {
                    lowlinks[parent] = lowlinks[parent].min(lowlinks[node]);
                }
                if lowlinks[node] == indices[node] {
                    let mut component = Vec::new();
                    loop {
                        let popped = match stack.pop() {
                            Some(v) => v,
                            None => break,
                        };
                        on_stack[popped] = false;
                        component.push(popped);
                        if popped == node {
                            break;
                        }
                    }
                    components.push(component);
                }
            }
        }
    }

    components
}

fn collect_warnings(circuit: &Circuit, report: &mut ValidationReport) {
    if circuit.gates.len() < 2 {
        return;
    }
    let mut connected: HashSet<&str> = HashSet::new();
    for wire in &circuit.wires {
        connected.insert(wire.from.gate_id.as_str());
        connected.insert(wire.to.gate_id.as_str());
    }
    for gate in &circuit.gates {
        if !connected.contains(gate.id.as_str()) {
            report
                .warnings
                .push(format!("gate `{}` is isolated (no wires attached)", gate.id));
        }
    }
}

fn collect_suggestions(circuit: &Circuit, report: &mut ValidationReport) {
    if !circuit.gates.iter().any(|g| g.kind == GateKind::Input) {
        report
            .suggestions
            .push("add an INPUT gate to drive the circuit".to_string());
    }
    if !circuit.gates.iter().any(|g| g.kind == GateKind::Output) {
        report
            .suggestions
            .push("add an OUTPUT gate to observe results".to_string());
    }
    if circuit.gates.len() >= 2 && circuit.wires.is_empty() {
        report
            .suggestions
            .push("connect gates with wires to build a circuit".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{GateState, Wire};
    use crate::error::Stage;
    use std::collections::HashMap;

    fn and_pair() -> Circuit {
        Circuit::new()
            .with_gate(Gate::new("a", GateKind::Input))
            .with_gate(Gate::new("and", GateKind::And))
            .with_wire(Wire::new("w1", "a", 0, "and", 0))
    }

    #[test]
    fn test_valid_circuit_passes() {
        let report = validate(&and_pair(), &EvaluationConfig::default()).unwrap();
        assert!(report.warnings.is_empty());
        assert!(report.suggestions.is_empty());
    }

    #[test]
    fn test_duplicate_gate_ids() {
        let circuit = Circuit::new()
            .with_gate(Gate::new("g", GateKind::Input))
            .with_gate(Gate::new("g", GateKind::Input));
        let err = validate(&circuit, &EvaluationConfig::default()).unwrap_err();
        assert_eq!(err.stage, Stage::Validation);
        assert!(err.violations.iter().any(|v| v.message.contains("duplicate")));
    }

    #[test]
    fn test_illegal_id_rejected() {
        let circuit = Circuit::new().with_gate(Gate::new("bad id!", GateKind::Input));
        let err = validate(&circuit, &EvaluationConfig::default()).unwrap_err();
        assert!(err.violations.iter().any(|v| v.message.contains("illegal")));
    }

    #[test]
    fn test_non_finite_position_rejected() {
        let circuit =
            Circuit::new().with_gate(Gate::new("g", GateKind::Input).with_position(f64::NAN, 0.0));
        let err = validate(&circuit, &EvaluationConfig::default()).unwrap_err();
        assert!(err
            .violations
            .iter()
            .any(|v| v.message.contains("non-finite position")));
    }

    #[test]
    fn test_wire_to_missing_gate() {
        let circuit = Circuit::new()
            .with_gate(Gate::new("a", GateKind::Input))
            .with_wire(Wire::new("w1", "a", 0, "ghost", 0));
        let err = validate(&circuit, &EvaluationConfig::default()).unwrap_err();
        assert!(err
            .violations
            .iter()
            .any(|v| v.message.contains("missing gate `ghost`")));
    }

    #[test]
    fn test_wire_pin_out_of_range() {
        let circuit = Circuit::new()
            .with_gate(Gate::new("a", GateKind::Input))
            .with_gate(Gate::new("inv", GateKind::Not))
            .with_wire(Wire::new("w1", "a", 0, "inv", 5));
        let err = validate(&circuit, &EvaluationConfig::default()).unwrap_err();
        assert!(err
            .violations
            .iter()
            .any(|v| v.message.contains("input pin 5")));
    }

    #[test]
    fn test_combinational_cycle_rejected() {
        // NOT ring beside an unrelated acyclic gate.
        let circuit = Circuit::new()
            .with_gate(Gate::new("n1", GateKind::Not))
            .with_gate(Gate::new("n2", GateKind::Not))
            .with_gate(Gate::new("n3", GateKind::Not))
            .with_gate(Gate::new("lonely-in", GateKind::Input))
            .with_gate(Gate::new("lonely-out", GateKind::Output))
            .with_wire(Wire::new("w1", "n1", 0, "n2", 0))
            .with_wire(Wire::new("w2", "n2", 0, "n3", 0))
            .with_wire(Wire::new("w3", "n3", 0, "n1", 0))
            .with_wire(Wire::new("w4", "lonely-in", 0, "lonely-out", 0));

        let err = validate(&circuit, &EvaluationConfig::default()).unwrap_err();
        let cycle = err
            .violations
            .iter()
            .find(|v| v.message.contains("infinite loop"))
            .expect("cycle violation");
        assert!(cycle.message.contains("n1, n2, n3"));
    }

    #[test]
    fn test_combinational_cycle_rejected_even_when_circular_allowed() {
        let circuit = Circuit::new()
            .with_gate(Gate::new("n1", GateKind::Not))
            .with_gate(Gate::new("n2", GateKind::Not))
            .with_wire(Wire::new("w1", "n1", 0, "n2", 0))
            .with_wire(Wire::new("w2", "n2", 0, "n1", 0));

        let config = EvaluationConfig::new().with_circular_dependencies(true);
        let err = validate(&circuit, &config).unwrap_err();
        assert!(err.message.contains("infinite loop"));
    }

    #[test]
    fn test_sequential_cycle_needs_opt_in() {
        // SR-latch style feedback through a sequential gate.
        let mut sr = Gate::new("sr", GateKind::SrLatch);
        sr.state = GateState::SrLatch { q_output: false };
        let circuit = Circuit::new()
            .with_gate(sr)
            .with_gate(Gate::new("inv", GateKind::Not))
            .with_wire(Wire::new("w1", "sr", 0, "inv", 0))
            .with_wire(Wire::new("w2", "inv", 0, "sr", 1));

        let strict = EvaluationConfig::default();
        let err = validate(&circuit, &strict).unwrap_err();
        assert!(err.message.contains("allow_circular_dependencies"));

        let relaxed = EvaluationConfig::new().with_circular_dependencies(true);
        assert!(validate(&circuit, &relaxed).is_ok());
    }

    #[test]
    fn test_capacity_limit_fails_fast() {
        let mut circuit = Circuit::new();
        for i in 0..11 {
            circuit.gates.push(Gate::new(format!("g{i}"), GateKind::Input));
        }
        let config = EvaluationConfig::new().with_max_gate_count(10);
        let err = validate(&circuit, &config).unwrap_err();
        assert_eq!(err.stage, Stage::Capacity);
        assert!(err.message.contains("too complex"));
    }

    #[test]
    fn test_isolated_gate_warning() {
        let circuit = and_pair().with_gate(Gate::new("floater", GateKind::Or).with_state(
            GateState::Combinational,
        ));
        let report = validate(&circuit, &EvaluationConfig::default()).unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("floater"));
    }

    #[test]
    fn test_suggestions_only_in_non_strict_mode() {
        let circuit = Circuit::new().with_gate(Gate::new("inv", GateKind::Not));

        let strict = validate(&circuit, &EvaluationConfig::default()).unwrap();
        assert!(strict.suggestions.is_empty());

        let relaxed_config = EvaluationConfig::new().with_strict_validation(false);
        let relaxed = validate(&circuit, &relaxed_config).unwrap();
        assert!(relaxed
            .suggestions
            .iter()
            .any(|s| s.contains("add an INPUT gate")));
    }

    #[test]
    fn test_malformed_truth_table_rejected() {
        let mut table = HashMap::new();
        table.insert("0x".to_string(), "1".to_string());
        let def = crate::circuit::CustomGateDefinition::truth_table(
            "bad",
            vec!["a".into(), "b".into()],
            vec!["q".into()],
            table,
        );
        let circuit = Circuit::new().with_gate(Gate::custom("c", def));
        let err = validate(&circuit, &EvaluationConfig::default()).unwrap_err();
        assert!(err
            .violations
            .iter()
            .any(|v| v.message.contains("malformed truth table key")));
    }

    #[test]
    fn test_internal_circuit_validated_recursively() {
        let inner = Circuit::new()
            .with_gate(Gate::new("in", GateKind::Input))
            .with_gate(Gate::new("in", GateKind::Input)); // duplicate inside
        let def = crate::circuit::CustomGateDefinition::internal_circuit(
            "sub",
            vec!["a".into()],
            vec!["q".into()],
            inner,
        );
        let mut gate = Gate::custom("outer", def);
        gate.inputs = vec![false];
        let circuit = Circuit::new().with_gate(gate);
        let err = validate(&circuit, &EvaluationConfig::default()).unwrap_err();
        assert!(err
            .violations
            .iter()
            .any(|v| v.message.contains("internal circuit") && v.message.contains("duplicate")));
    }

    #[test]
    fn test_internal_circuit_capacity_error_surfaces() {
        // The inner circuit alone exceeds the gate limit; the resulting
        // capacity error carries no violation list, so the outer pass
        // reports its message directly.
        let inner = Circuit::new()
            .with_gate(Gate::new("in", GateKind::Input))
            .with_gate(Gate::new("inv", GateKind::Not))
            .with_gate(Gate::new("q", GateKind::Output));
        let def = crate::circuit::CustomGateDefinition::internal_circuit(
            "sub",
            vec!["a".into()],
            vec!["q".into()],
            inner,
        );
        let mut gate = Gate::custom("outer", def);
        gate.inputs = vec![false];
        let circuit = Circuit::new().with_gate(gate);

        let config = EvaluationConfig::new().with_max_gate_count(2);
        let err = validate(&circuit, &config).unwrap_err();
        assert!(err
            .violations
            .iter()
            .any(|v| v.gate_id.as_deref() == Some("outer") && v.message.contains("too complex")));
    }

    #[test]
    fn test_light_validation() {
        assert!(validate_light(&and_pair(), &EvaluationConfig::default()).is_ok());

        let broken = Circuit::new()
            .with_gate(Gate::new("a", GateKind::Input))
            .with_wire(Wire::new("w", "a", 0, "ghost", 0));
        assert!(validate_light(&broken, &EvaluationConfig::default()).is_err());

        // Light validation does not run cycle detection.
        let ring = Circuit::new()
            .with_gate(Gate::new("n1", GateKind::Not))
            .with_gate(Gate::new("n2", GateKind::Not))
            .with_wire(Wire::new("w1", "n1", 0, "n2", 0))
            .with_wire(Wire::new("w2", "n2", 0, "n1", 0));
        assert!(validate_light(&ring, &EvaluationConfig::default()).is_ok());
    }
}
