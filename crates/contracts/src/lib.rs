//! Cross-boundary contracts for the side-arc engine: arc definitions,
//! step contexts and results, cross-loop meta-state, scheduling views,
//! and engine configuration.

use serde::{Deserialize, Serialize};

pub mod definition;
pub mod runtime;
pub mod scheduling;

pub use definition::{
    ArcDefinition, ArcStateDef, ConflictRule, LooperConstraint, ResolutionModeDef,
    ResolutionProfile, TimeWindow, TransitionDef, TriggerMode, TriggerSpec,
};
pub use runtime::{
    ActionInput, ArcLoopMeta, ArcRuntimeState, ArcStatusView, EngineStateSnapshot, LoopReport,
    StepContext, StepDisposition, StepResult,
};
pub use scheduling::{
    ConflictKind, ConflictSeverity, ExcludedArc, FeasibilityReport, LooperStatus, LoopSchedule,
    OptimalArcSet, ResolutionOption, ScheduleConflict, ScheduleEntry, MAIN_ARC,
};

pub const SCHEMA_VERSION_V1: &str = "1.0";

/// Every time slot on the day grid is this long.
pub const SLOT_DURATION_MINUTES: i64 = 30;

/// Parse a `"HH:MM"` time slot into minutes since midnight.
/// Returns `None` for anything that is not a well-formed slot label.
pub fn slot_minutes(slot: &str) -> Option<i64> {
    let (hours, minutes) = slot.split_once(':')?;
    let hours: i64 = hours.parse().ok()?;
    let minutes: i64 = minutes.parse().ok()?;
    if !(0..24).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    Some(hours * 60 + minutes)
}

/// Whether two slots are distinct but within one slot-duration of each other.
pub fn slots_adjacent(a: &str, b: &str) -> bool {
    match (slot_minutes(a), slot_minutes(b)) {
        (Some(ma), Some(mb)) => ma != mb && (ma - mb).abs() <= SLOT_DURATION_MINUTES,
        _ => false,
    }
}

/// Cross-loop understanding of an arc, from never-touched to solved.
/// The derived ordering is the progression order.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum MetaLevel {
    #[default]
    Untouched,
    Noticed,
    Explored,
    MechanicKnown,
    OptimalPlanFound,
}

impl MetaLevel {
    pub fn rank(self) -> u8 {
        match self {
            Self::Untouched => 0,
            Self::Noticed => 1,
            Self::Explored => 2,
            Self::MechanicKnown => 3,
            Self::OptimalPlanFound => 4,
        }
    }
}

/// Terminal outcome category of an arc within one loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ArcOutcome {
    Good,
    Neutral,
    InProgress,
    Bad,
    LockedOut,
}

impl ArcOutcome {
    /// Fixed ranking for best-outcome tracking: Good > Neutral > InProgress
    /// > Bad > LockedOut.
    pub fn rank(self) -> u8 {
        match self {
            Self::Good => 4,
            Self::Neutral => 3,
            Self::InProgress => 2,
            Self::Bad => 1,
            Self::LockedOut => 0,
        }
    }
}

/// Narrative weight class of an arc.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ArcTier {
    Core,
    Major,
    Minor,
    Ambient,
}

impl ArcTier {
    pub fn priority(self) -> i64 {
        match self {
            Self::Core => 4,
            Self::Major => 3,
            Self::Minor => 2,
            Self::Ambient => 1,
        }
    }
}

/// How many loops the arc is designed to span.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LooperClass {
    SingleLoop,
    MultiLoop,
    LooperOnly,
}

/// Whether the arc can be brought to a terminal resolution at all.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Resolubility {
    Resolvable,
    Conditional,
    Unresolvable,
}

/// Engine-wide tuning knobs. All behavior that is a policy choice rather
/// than a contract lives here so tests can pin it down.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    pub schema_version: String,
    /// Seed for the default stochastic-trigger source.
    pub seed: u64,
    /// Observation-count cutoffs for Noticed, Explored, MechanicKnown,
    /// OptimalPlanFound, in that order.
    pub meta_observation_cutoffs: [u32; 4],
    /// MechanicKnown additionally requires a discovered flag containing one
    /// of these substrings.
    pub mechanic_flag_patterns: Vec<String>,
    /// OptimalPlanFound additionally requires a discovered flag containing
    /// one of these substrings.
    pub optimal_flag_patterns: Vec<String>,
    /// Treat observations in adjacent slots as conflicting in the
    /// looper-only verifier.
    pub adjacent_slots_conflict: bool,
    /// When set, SOFT conflicts also make a proposal infeasible.
    pub strict_soft_conflicts: bool,
    /// Cap on side arcs pursued in one loop.
    pub max_arcs_per_loop: usize,
    /// Costs strictly below this count as trivialized.
    pub trivial_cost_threshold: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            seed: 1337,
            meta_observation_cutoffs: [1, 3, 6, 10],
            mechanic_flag_patterns: vec!["mechanic".to_string(), "cause".to_string()],
            optimal_flag_patterns: vec!["optimal".to_string(), "plan".to_string()],
            adjacent_slots_conflict: true,
            strict_soft_conflicts: false,
            max_arcs_per_loop: 3,
            trivial_cost_threshold: 10,
        }
    }
}
