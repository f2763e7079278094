//! # Breadboard Circuit Kernel
//!
//! A simulation kernel for interactive logic-circuit playgrounds: pure
//! gate evaluation, dependency-ordered whole-circuit ticks, recursive
//! custom (composite) gates, and a timing-event capture subsystem that
//! turns snapshot history into waveform data.
//!
//! ## Design Principles
//!
//! - **Snapshot in, snapshot out**: evaluation never mutates the circuit it
//!   is given; each tick returns a new snapshot, which keeps undo/redo and
//!   timing replay trivial for the host.
//! - **Validate before evaluate**: structural problems (bad ids, dangling
//!   wires, combinational cycles, oversized circuits) are rejected before
//!   a single gate runs.
//! - **Injected time**: clock-gate phase and event timestamps come from a
//!   [`TimeProvider`], so tests and replays run under a fake clock.
//! - **Bounded capture**: only watched signals persist events, batches
//!   flush on size or age, and history eviction sheds the oldest detail
//!   first.
//!
//! ## Quick Start
//!
//! ```rust
//! use breadboard::{
//!     Circuit, CircuitEvaluator, EvaluationConfig, Gate, GateKind, PinRef,
//!     TimingCapture, Wire,
//! };
//! use breadboard::{CaptureConfig, FixedTimeProvider, TimeProvider};
//! use std::rc::Rc;
//!
//! // INPUT(a) AND INPUT(b) -> OUTPUT
//! let circuit = Circuit::new()
//!     .with_gate(Gate::new("a", GateKind::Input).with_output(true))
//!     .with_gate(Gate::new("b", GateKind::Input).with_output(true))
//!     .with_gate(Gate::new("and", GateKind::And))
//!     .with_gate(Gate::new("out", GateKind::Output))
//!     .with_wire(Wire::new("w1", "a", 0, "and", 0))
//!     .with_wire(Wire::new("w2", "b", 0, "and", 1))
//!     .with_wire(Wire::new("w3", "and", 0, "out", 0));
//!
//! let clock = Rc::new(FixedTimeProvider::new(0.0));
//! let mut evaluator = CircuitEvaluator::new(
//!     EvaluationConfig::default(),
//!     Rc::clone(&clock) as Rc<dyn TimeProvider>,
//! );
//! let mut capture = TimingCapture::new(CaptureConfig::default(), clock);
//! capture.watch_gate("out", PinRef::output(0));
//!
//! let result = evaluator.evaluate(&circuit).unwrap();
//! capture.capture_from_evaluation(&result.circuit, None);
//! assert!(result.circuit.gate("out").unwrap().output());
//! ```

pub mod circuit;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod gate;
pub mod time;
pub mod timing;
pub mod types;
pub mod validator;

// Re-export commonly used types
pub use circuit::{
    Circuit, CustomGateDefinition, CustomGateStrategy, Gate, GateKind, GateState, Position, Wire,
    WireEndpoint,
};
pub use config::{CircuitFileError, CircuitFileResult, EvaluationConfig};
pub use error::{ApiError, EvalError, Severity, Stage, Violation};
pub use evaluator::{evaluation_layers, CircuitEvaluator, EvaluationResult};
pub use gate::{evaluate_gate, EvalContext, GateDebugInfo, GateOutputs};
pub use time::{FixedTimeProvider, SystemTimeProvider, TimeProvider};
pub use timing::{
    CaptureConfig, CaptureStats, EventSource, FlushCallback, TimingCapture, TimingEvent,
    TimingTrace,
};
pub use types::{GateId, PinDirection, PinRef, Signal, TimeMs, WireId};
pub use validator::{validate, validate_light, ValidationReport};

/// Initialize the tracing subscriber for logging.
///
/// Call this at the start of your program to enable logging.
///
/// # Example
///
/// ```rust,ignore
/// breadboard::init_logging("info");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
