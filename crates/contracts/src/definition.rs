//! Author-authored arc definition types. Definitions are immutable
//! templates; runtime state lives in [`crate::runtime`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{ArcOutcome, ArcTier, LooperClass, MetaLevel, Resolubility};

/// One state of an arc's state machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArcStateDef {
    pub state_id: String,
    #[serde(default)]
    pub terminal: bool,
    /// Required narrative category when `terminal`; warned about if absent.
    #[serde(default)]
    pub outcome: Option<ArcOutcome>,
}

/// Whether the trigger's conditions combine as a conjunction or disjunction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    #[default]
    All,
    Any,
}

/// Compound trigger predicate for a transition. Every field is optional;
/// a trigger with no conditions at all is unconditionally satisfied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TriggerSpec {
    #[serde(default)]
    pub mode: TriggerMode,
    /// Action taken must be one of these (when non-empty).
    #[serde(default)]
    pub actions: BTreeSet<String>,
    /// All of these flags must be in the global knowledge set.
    #[serde(default)]
    pub required_flags: BTreeSet<String>,
    /// Satisfied when *any* arc in the step context has reached this level.
    /// This mirrors the documented engine behavior; whether it should be
    /// scoped to the owning arc is an open design question, so a change
    /// here needs explicit sign-off rather than a quiet fix.
    #[serde(default)]
    pub min_meta_level: Option<MetaLevel>,
    #[serde(default)]
    pub required_slots: BTreeSet<String>,
    #[serde(default)]
    pub forbidden_slots: BTreeSet<String>,
    #[serde(default)]
    pub required_locations: BTreeSet<String>,
    #[serde(default)]
    pub forbidden_locations: BTreeSet<String>,
    /// Other arc id -> state id that arc must currently be in.
    #[serde(default)]
    pub required_arc_states: std::collections::BTreeMap<String, String>,
    /// Other arc id -> state id that arc must *not* currently be in.
    #[serde(default)]
    pub forbidden_arc_states: std::collections::BTreeMap<String, String>,
    /// Context confidence must be at least this (0..=1).
    #[serde(default)]
    pub min_confidence: Option<f64>,
    /// Uniform draw must land below this probability (0..=1).
    #[serde(default)]
    pub probability: Option<f64>,
}

impl TriggerSpec {
    /// True when no condition is specified at all.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
            && self.required_flags.is_empty()
            && self.min_meta_level.is_none()
            && self.required_slots.is_empty()
            && self.forbidden_slots.is_empty()
            && self.required_locations.is_empty()
            && self.forbidden_locations.is_empty()
            && self.required_arc_states.is_empty()
            && self.forbidden_arc_states.is_empty()
            && self.min_confidence.is_none()
            && self.probability.is_none()
    }
}

/// A directed transition between two declared states.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransitionDef {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub trigger: TriggerSpec,
    /// Higher wins among simultaneously satisfied transitions; ties break
    /// by declaration order.
    #[serde(default)]
    pub priority: i64,
    /// Knowledge flags granted when this transition fires.
    #[serde(default)]
    pub grants_flags: Vec<String>,
}

/// A named span of slots during which interventions are valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub window_id: String,
    pub slots: Vec<String>,
    #[serde(default)]
    pub locations: Vec<String>,
}

/// One way of resolving the arc, unlocked by meta level and knowledge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolutionModeDef {
    pub mode_id: String,
    #[serde(default)]
    pub min_meta_level: MetaLevel,
    #[serde(default)]
    pub required_flags: BTreeSet<String>,
    pub base_cost: i64,
    /// 0..=100.
    pub base_risk: i64,
    #[serde(default)]
    pub time_slots: BTreeSet<String>,
    #[serde(default)]
    pub locations: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolutionProfile {
    pub modes: Vec<ResolutionModeDef>,
    pub default_mode: String,
}

/// Declares why an arc cannot be resolved within a single loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LooperConstraint {
    /// Observation ids that must all be collected across loops.
    pub required_observations: Vec<String>,
    /// Author's claim for how many can be collected in one loop.
    pub declared_cap: usize,
    /// Flags that must be in the global set before resolution is possible.
    #[serde(default)]
    pub resolution_flags: BTreeSet<String>,
}

/// Immutable template for a secondary narrative thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArcDefinition {
    pub arc_id: String,
    pub title: String,
    pub tier: ArcTier,
    /// Author-assigned scheduling weight.
    #[serde(default)]
    pub importance: i64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub looper_class: LooperClass,
    pub resolubility: Resolubility,
    pub states: Vec<ArcStateDef>,
    pub initial_state: String,
    pub transitions: Vec<TransitionDef>,
    #[serde(default)]
    pub time_windows: Vec<TimeWindow>,
    pub resolution: ResolutionProfile,
    #[serde(default)]
    pub looper: Option<LooperConstraint>,
    /// Every knowledge flag the arc can emit.
    #[serde(default)]
    pub knowledge_flags: Vec<String>,
}

impl ArcDefinition {
    pub fn state(&self, state_id: &str) -> Option<&ArcStateDef> {
        self.states.iter().find(|s| s.state_id == state_id)
    }

    pub fn mode(&self, mode_id: &str) -> Option<&ResolutionModeDef> {
        self.resolution.modes.iter().find(|m| m.mode_id == mode_id)
    }

    /// Transitions leaving the given state, in declaration order.
    pub fn transitions_from<'a>(
        &'a self,
        state_id: &'a str,
    ) -> impl Iterator<Item = (usize, &'a TransitionDef)> {
        self.transitions
            .iter()
            .enumerate()
            .filter(move |(_, t)| t.from == state_id)
    }
}

/// Author-supplied incompatibility between two arcs, independent of
/// runtime state. The pair is unordered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConflictRule {
    pub first_arc: String,
    pub second_arc: String,
    pub category: String,
    #[serde(default)]
    pub mutually_exclusive: bool,
}

impl ConflictRule {
    pub fn covers(&self, a: &str, b: &str) -> bool {
        (self.first_arc == a && self.second_arc == b)
            || (self.first_arc == b && self.second_arc == a)
    }
}
