//! Integration tests for whole-circuit evaluation.
//!
//! These tests verify end-to-end scenarios including:
//! - Combinational propagation through multi-layer circuits
//! - Sequential gates holding state across ticks
//! - Custom gates (truth table and internal circuit)
//! - Declaratively loaded circuits
//! - Evaluation throughput on long chains

use std::rc::Rc;
use std::time::Instant;

use breadboard::{
    Circuit, CircuitEvaluator, CustomGateDefinition, EvaluationConfig, FixedTimeProvider, Gate,
    GateKind, GateState, TimeProvider, Wire,
};

fn evaluator() -> CircuitEvaluator {
    CircuitEvaluator::new(
        EvaluationConfig::default(),
        Rc::new(FixedTimeProvider::new(0.0)),
    )
}

// ============================================================================
// Combinational circuits
// ============================================================================

#[test]
fn half_adder_from_primitive_gates() {
    // sum = a XOR b, carry = a AND b
    let build = |a: bool, b: bool| {
        Circuit::new()
            .with_gate(Gate::new("a", GateKind::Input).with_output(a))
            .with_gate(Gate::new("b", GateKind::Input).with_output(b))
            .with_gate(Gate::new("xor", GateKind::Xor))
            .with_gate(Gate::new("and", GateKind::And))
            .with_gate(Gate::new("sum", GateKind::Output))
            .with_gate(Gate::new("carry", GateKind::Output))
            .with_wire(Wire::new("w1", "a", 0, "xor", 0))
            .with_wire(Wire::new("w2", "b", 0, "xor", 1))
            .with_wire(Wire::new("w3", "a", 0, "and", 0))
            .with_wire(Wire::new("w4", "b", 0, "and", 1))
            .with_wire(Wire::new("w5", "xor", 0, "sum", 0))
            .with_wire(Wire::new("w6", "and", 0, "carry", 0))
    };

    let mut evaluator = evaluator();
    for (a, b, sum, carry) in [
        (false, false, false, false),
        (false, true, true, false),
        (true, false, true, false),
        (true, true, false, true),
    ] {
        let result = evaluator.evaluate(&build(a, b)).unwrap();
        assert_eq!(result.circuit.gate("sum").unwrap().output(), sum);
        assert_eq!(result.circuit.gate("carry").unwrap().output(), carry);
    }
}

#[test]
fn mux_routes_selected_line() {
    let build = |select: bool| {
        Circuit::new()
            .with_gate(Gate::new("d0", GateKind::Input).with_output(false))
            .with_gate(Gate::new("d1", GateKind::Input).with_output(true))
            .with_gate(Gate::new("sel", GateKind::Input).with_output(select))
            .with_gate(Gate::new("mux", GateKind::Mux))
            .with_wire(Wire::new("w1", "d0", 0, "mux", 0))
            .with_wire(Wire::new("w2", "d1", 0, "mux", 1))
            .with_wire(Wire::new("w3", "sel", 0, "mux", 2))
    };

    let mut evaluator = evaluator();
    let low = evaluator.evaluate(&build(false)).unwrap();
    assert!(!low.circuit.gate("mux").unwrap().output());

    let high = evaluator.evaluate(&build(true)).unwrap();
    assert!(high.circuit.gate("mux").unwrap().output());
}

#[test]
fn reevaluation_is_stable_for_combinational_circuits() {
    let circuit = Circuit::new()
        .with_gate(Gate::new("a", GateKind::Input).with_output(true))
        .with_gate(Gate::new("inv", GateKind::Not))
        .with_wire(Wire::new("w1", "a", 0, "inv", 0));

    let mut evaluator = evaluator();
    let first = evaluator.evaluate(&circuit).unwrap().circuit;
    let second = evaluator.evaluate(&first).unwrap().circuit;
    assert_eq!(first, second);
}

// ============================================================================
// Sequential circuits
// ============================================================================

#[test]
fn chained_flip_flops_see_fresh_upstream_values_within_a_tick() {
    // Two D flip-flops in series sharing one clock input. Evaluation is
    // layered, so on a shared edge the downstream flip-flop reads the
    // upstream Q computed earlier in the same tick.
    let mut circuit = Circuit::new()
        .with_gate(Gate::new("data", GateKind::Input).with_output(true))
        .with_gate(Gate::new("clk", GateKind::Input).with_output(false))
        .with_gate(Gate::new("ff0", GateKind::DFlipFlop))
        .with_gate(Gate::new("ff1", GateKind::DFlipFlop))
        .with_wire(Wire::new("w1", "data", 0, "ff0", 0))
        .with_wire(Wire::new("w2", "clk", 0, "ff0", 1))
        .with_wire(Wire::new("w3", "ff0", 0, "ff1", 0))
        .with_wire(Wire::new("w4", "clk", 0, "ff1", 1));

    let mut evaluator = evaluator();

    circuit.set_input("clk", true);
    circuit = evaluator.evaluate(&circuit).unwrap().circuit;
    assert!(circuit.gate("ff0").unwrap().output());
    assert!(circuit.gate("ff1").unwrap().output());

    // Clock low, data low: no edge, both hold their captured bit.
    circuit.set_input("clk", false);
    circuit.set_input("data", false);
    circuit = evaluator.evaluate(&circuit).unwrap().circuit;
    assert!(circuit.gate("ff0").unwrap().output());
    assert!(circuit.gate("ff1").unwrap().output());

    // Next edge: the low data bit is captured by ff0 and, within the same
    // layered tick, by ff1.
    circuit.set_input("clk", true);
    circuit = evaluator.evaluate(&circuit).unwrap().circuit;
    assert!(!circuit.gate("ff0").unwrap().output());
    assert!(!circuit.gate("ff1").unwrap().output());
}

#[test]
fn sr_latch_remembers_between_ticks() {
    let build = |s: bool, r: bool, prior: &Circuit| {
        let mut circuit = prior.clone();
        circuit.set_input("s", s);
        circuit.set_input("r", r);
        circuit
    };

    let initial = Circuit::new()
        .with_gate(Gate::new("s", GateKind::Input))
        .with_gate(Gate::new("r", GateKind::Input))
        .with_gate(Gate::new("sr", GateKind::SrLatch))
        .with_wire(Wire::new("w1", "s", 0, "sr", 0))
        .with_wire(Wire::new("w2", "r", 0, "sr", 1));

    let mut evaluator = evaluator();

    let set = evaluator.evaluate(&build(true, false, &initial)).unwrap();
    assert!(set.circuit.gate("sr").unwrap().output());

    let hold = evaluator
        .evaluate(&build(false, false, &set.circuit))
        .unwrap();
    assert!(hold.circuit.gate("sr").unwrap().output());

    let reset = evaluator
        .evaluate(&build(false, true, &hold.circuit))
        .unwrap();
    assert!(!reset.circuit.gate("sr").unwrap().output());
}

#[test]
fn clock_gate_phase_follows_injected_time() {
    let clock = Rc::new(FixedTimeProvider::new(0.0));
    let mut evaluator = CircuitEvaluator::new(
        EvaluationConfig::default(),
        Rc::clone(&clock) as Rc<dyn TimeProvider>,
    );

    let circuit = Circuit::new().with_gate(Gate::new("clk", GateKind::Clock).with_state(
        GateState::Clock {
            frequency_hz: 2.0, // 500ms period
            start_time_ms: 0.0,
            is_running: true,
        },
    ));

    let mut levels = Vec::new();
    for step in 0..8 {
        clock.set(step as f64 * 125.0);
        let result = evaluator.evaluate(&circuit).unwrap();
        levels.push(result.circuit.gate("clk").unwrap().output());
    }
    // 500ms period sampled every 125ms: low, low, high, high, repeating.
    assert_eq!(
        levels,
        vec![false, false, true, true, false, false, true, true]
    );
}

// ============================================================================
// Custom gates
// ============================================================================

#[test]
fn truth_table_full_adder() {
    let mut table = std::collections::HashMap::new();
    for a in 0..2u8 {
        for b in 0..2u8 {
            for cin in 0..2u8 {
                let total = a + b + cin;
                table.insert(
                    format!("{a}{b}{cin}"),
                    format!("{}{}", total % 2, total / 2),
                );
            }
        }
    }
    let def = CustomGateDefinition::truth_table(
        "full-adder",
        vec!["a".into(), "b".into(), "cin".into()],
        vec!["sum".into(), "cout".into()],
        table,
    );

    let circuit = Circuit::new()
        .with_gate(Gate::new("a", GateKind::Input).with_output(true))
        .with_gate(Gate::new("b", GateKind::Input).with_output(true))
        .with_gate(Gate::new("cin", GateKind::Input).with_output(true))
        .with_gate(Gate::custom("adder", def))
        .with_wire(Wire::new("w1", "a", 0, "adder", 0))
        .with_wire(Wire::new("w2", "b", 0, "adder", 1))
        .with_wire(Wire::new("w3", "cin", 0, "adder", 2))
        .with_gate(Gate::new("sum", GateKind::Output))
        .with_gate(Gate::new("cout", GateKind::Output))
        .with_wire(Wire::new("w4", "adder", 0, "sum", 0))
        .with_wire(Wire::new("w5", "adder", 1, "cout", 0));

    // 1 + 1 + 1 = 0b11: sum high, carry high.
    let result = evaluator().evaluate(&circuit).unwrap();
    assert!(result.circuit.gate("sum").unwrap().output());
    assert!(result.circuit.gate("cout").unwrap().output());
}

#[test]
fn internal_circuit_gate_with_nested_flip_flop() {
    // A custom gate wrapping a D flip-flop: nested sequential state must
    // survive across parent ticks.
    let inner = Circuit::new()
        .with_gate(Gate::new("d", GateKind::Input))
        .with_gate(Gate::new("c", GateKind::Input))
        .with_gate(Gate::new("ff", GateKind::DFlipFlop))
        .with_gate(Gate::new("q", GateKind::Output))
        .with_wire(Wire::new("w1", "d", 0, "ff", 0))
        .with_wire(Wire::new("w2", "c", 0, "ff", 1))
        .with_wire(Wire::new("w3", "ff", 0, "q", 0));
    let def = CustomGateDefinition::internal_circuit(
        "registered-bit",
        vec!["d".into(), "clk".into()],
        vec!["q".into()],
        inner,
    );

    let mut circuit = Circuit::new()
        .with_gate(Gate::new("data", GateKind::Input).with_output(true))
        .with_gate(Gate::new("clk", GateKind::Input).with_output(false))
        .with_gate(Gate::custom("reg", def))
        .with_wire(Wire::new("w1", "data", 0, "reg", 0))
        .with_wire(Wire::new("w2", "clk", 0, "reg", 1));

    let mut evaluator = evaluator();

    // Clock low: nothing captured yet.
    circuit = evaluator.evaluate(&circuit).unwrap().circuit;
    assert!(!circuit.gate("reg").unwrap().output());

    // Rising edge: the nested flip-flop captures the data bit.
    circuit.set_input("clk", true);
    circuit = evaluator.evaluate(&circuit).unwrap().circuit;
    assert!(circuit.gate("reg").unwrap().output());

    // Data drops, clock stays high: nested state holds.
    circuit.set_input("data", false);
    circuit = evaluator.evaluate(&circuit).unwrap().circuit;
    assert!(circuit.gate("reg").unwrap().output());
}

// ============================================================================
// Declarative circuits
// ============================================================================

#[test]
fn yaml_circuit_evaluates() {
    let yaml = r#"
gates:
  - id: a
    kind: input
    outputs: [true]
    state: { kind: combinational }
  - id: b
    kind: input
    outputs: [false]
    state: { kind: combinational }
  - id: nor-1
    kind: nor
    inputs: [false, false]
    state: { kind: combinational }
wires:
  - id: w1
    from: { gate_id: a, pin: { direction: output, index: 0 } }
    to: { gate_id: nor-1, pin: { direction: input, index: 0 } }
  - id: w2
    from: { gate_id: b, pin: { direction: output, index: 0 } }
    to: { gate_id: nor-1, pin: { direction: input, index: 1 } }
"#;
    let circuit = Circuit::from_yaml(yaml).unwrap();
    let result = evaluator().evaluate(&circuit).unwrap();
    assert!(!result.circuit.gate("nor-1").unwrap().output());
}

// ============================================================================
// Throughput
// ============================================================================

#[test]
fn thousand_gate_chain_evaluates_quickly() {
    let mut circuit = Circuit::new().with_gate(Gate::new("in", GateKind::Input).with_output(true));
    let mut prev = "in".to_string();
    for i in 0..999 {
        let id = format!("buf{i}");
        circuit.gates.push(Gate::new(&id, GateKind::Not));
        circuit
            .wires
            .push(Wire::new(format!("w{i}"), prev.as_str(), 0, id.as_str(), 0));
        prev = id;
    }

    let mut evaluator = evaluator();
    let started = Instant::now();
    let result = evaluator.evaluate(&circuit).unwrap();
    let elapsed = started.elapsed();

    // 999 inverters: the parity of the chain end is known.
    assert!(!result.circuit.gate("buf998").unwrap().output());
    assert!(
        elapsed.as_millis() < 1000,
        "1000-gate chain took {elapsed:?}"
    );
}
