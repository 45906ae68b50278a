//! Per-loop runtime state, step contexts/results, cross-loop meta-state,
//! and the flat engine snapshot used for export/import.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{ArcOutcome, MetaLevel};

/// One protagonist action fed to the engine for a single step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionInput {
    pub action: String,
    pub time_slot: String,
    pub location: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Everything a trigger may inspect when one arc is stepped. Built fresh
/// per arc; `other_arc_states` never contains the stepped arc itself.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepContext {
    pub action: String,
    pub time_slot: String,
    pub location: String,
    pub knowledge_flags: BTreeSet<String>,
    /// Meta level of every registered arc, keyed by arc id.
    pub meta_levels: BTreeMap<String, MetaLevel>,
    /// Current state of every *other* arc in the active loop.
    pub other_arc_states: BTreeMap<String, String>,
    pub confidence: Option<f64>,
}

/// Why a step did or did not advance the arc.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepDisposition {
    /// A transition fired.
    Advanced,
    /// Transitions exist but none was satisfied by the context.
    NoSatisfiedTransition,
    /// The arc's current state is terminal.
    TerminalState,
    /// The arc id is not in the registry.
    NotRegistered,
    /// The arc is not part of the active loop.
    NotActive,
}

/// Outcome of evaluating one arc against one step context. Pure data;
/// committing it to runtime state is a separate apply phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepResult {
    pub arc_id: String,
    pub changed: bool,
    pub disposition: StepDisposition,
    pub from_state: Option<String>,
    pub new_state: Option<String>,
    /// Index of the fired transition in the definition's declaration order.
    pub transition_index: Option<usize>,
    /// Flags granted by the fired transition.
    pub discovered_flags: Vec<String>,
    /// Slot the arc engaged, when it advanced.
    pub engaged_slot: Option<String>,
}

impl StepResult {
    pub fn no_op(arc_id: &str, disposition: StepDisposition) -> Self {
        Self {
            arc_id: arc_id.to_string(),
            changed: false,
            disposition,
            from_state: None,
            new_state: None,
            transition_index: None,
            discovered_flags: Vec::new(),
            engaged_slot: None,
        }
    }
}

/// Per-loop, per-arc mutable state. Created at loop start from the
/// definition's initial state, discarded after finalization folds it into
/// [`ArcLoopMeta`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArcRuntimeState {
    pub arc_id: String,
    pub initial_state: String,
    pub current_state: String,
    pub previous_state: Option<String>,
    /// Transition indices taken this loop, in order.
    pub transitions_taken: Vec<usize>,
    pub engaged_slots: BTreeSet<String>,
    pub terminal: bool,
    pub outcome: Option<ArcOutcome>,
}

impl ArcRuntimeState {
    pub fn seeded(arc_id: &str, initial_state: &str) -> Self {
        Self {
            arc_id: arc_id.to_string(),
            initial_state: initial_state.to_string(),
            current_state: initial_state.to_string(),
            previous_state: None,
            transitions_taken: Vec::new(),
            engaged_slots: BTreeSet::new(),
            terminal: false,
            outcome: None,
        }
    }

    /// Whether the arc moved at all this loop: final state differs from the
    /// initial state and at least one transition was taken.
    pub fn engaged(&self) -> bool {
        self.current_state != self.initial_state && !self.transitions_taken.is_empty()
    }
}

/// Cross-loop accumulated understanding of one arc. Counters and flag sets
/// only ever grow; the meta level never regresses without an explicit reset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ArcLoopMeta {
    pub observations: u32,
    pub interventions: u32,
    pub meta_level: MetaLevel,
    pub discovered_flags: BTreeSet<String>,
    pub best_outcome: Option<ArcOutcome>,
    pub first_engaged_loop: Option<String>,
    pub last_engaged_loop: Option<String>,
}

impl ArcLoopMeta {
    /// Fold a better outcome in, keeping the best by the fixed ranking.
    pub fn record_outcome(&mut self, outcome: ArcOutcome) {
        match self.best_outcome {
            Some(best) if best.rank() >= outcome.rank() => {}
            _ => self.best_outcome = Some(outcome),
        }
    }
}

/// Structured result of finalizing one loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoopReport {
    pub loop_id: String,
    /// Arc id -> final state id.
    pub final_states: BTreeMap<String, String>,
    /// Arc id -> outcome for arcs that reached a terminal state.
    pub outcomes: BTreeMap<String, ArcOutcome>,
    /// Flags discovered for the first time this loop.
    pub new_flags: BTreeSet<String>,
    /// Arc id -> transition indices taken, in order.
    pub transitions_taken: BTreeMap<String, Vec<usize>>,
}

/// Combined per-arc status: in-loop position (when a loop is active),
/// cross-loop meta, and resolution standing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArcStatusView {
    pub arc_id: String,
    pub runtime: Option<ArcRuntimeState>,
    pub meta: ArcLoopMeta,
    pub best_mode: Option<String>,
    pub trivialization_progress: i64,
    pub is_trivial: bool,
}

/// Flat, JSON-compatible export of all cross-loop state. Round-trips
/// losslessly through `serde_json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineStateSnapshot {
    pub schema_version: String,
    pub loop_counter: u64,
    pub knowledge_flags: BTreeSet<String>,
    pub arc_meta: BTreeMap<String, ArcLoopMeta>,
}
