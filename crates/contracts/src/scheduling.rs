//! Derived scheduling and feasibility views. Everything here is recomputed
//! on demand from a proposal plus cross-loop state; none of it is
//! authoritative.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::MetaLevel;

/// A resolution mode currently unlocked for an arc, with its effective
/// scores after trivialization discounts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolutionOption {
    pub arc_id: String,
    pub mode_id: String,
    pub cost: i64,
    /// 0..=100.
    pub risk: i64,
    pub time_slots: BTreeSet<String>,
    pub locations: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Exact slot collision (side arc vs side arc, or vs the main arc).
    Time,
    /// Adjacent slots at different locations, travel time unmodeled.
    Travel,
    /// An explicit author conflict rule.
    Rule,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    Hard,
    Soft,
}

/// Reserved name for the main story arc in conflict reports.
pub const MAIN_ARC: &str = "__main__";

/// One detected pairwise conflict. Detection is symmetric: swapping the
/// two arcs yields the same conflict with roles swapped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleConflict {
    pub first_arc: String,
    pub second_arc: String,
    pub kind: ConflictKind,
    pub severity: ConflictSeverity,
    pub slot: Option<String>,
    pub detail: String,
}

/// Result of checking a proposed arc -> mode mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeasibilityReport {
    pub feasible: bool,
    pub conflicts: Vec<ScheduleConflict>,
    /// Slot -> arcs occupying it (main arc included).
    pub slot_load: BTreeMap<String, Vec<String>>,
}

impl FeasibilityReport {
    pub fn hard_conflicts(&self) -> impl Iterator<Item = &ScheduleConflict> {
        self.conflicts
            .iter()
            .filter(|c| c.severity == ConflictSeverity::Hard)
    }
}

/// An arc the greedy solver left out, with the first blocking reason.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExcludedArc {
    pub arc_id: String,
    pub reason: String,
}

/// Greedy, value-ranked feasible subset of candidate arcs. Not globally
/// optimal; the solver trades optimality for tractability and explainable
/// exclusion reasons.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OptimalArcSet {
    /// Arc id -> chosen mode id.
    pub selected: BTreeMap<String, String>,
    pub excluded: Vec<ExcludedArc>,
    pub total_cost: i64,
    pub feasibility: FeasibilityReport,
}

/// One row of a rendered loop schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub slot: String,
    pub arc_id: String,
    pub mode_id: Option<String>,
    pub location: Option<String>,
    pub main_arc: bool,
}

/// A selected mapping rendered onto the slot grid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoopSchedule {
    pub entries: Vec<ScheduleEntry>,
    /// 30 minutes per occupied slot.
    pub total_minutes: i64,
    /// Average risk across scheduled side-arc modes, 0 when none.
    pub average_risk: i64,
}

/// Full looper-only standing for one arc.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LooperStatus {
    pub arc_id: String,
    pub required_observations: Vec<String>,
    pub acquired_observations: BTreeSet<String>,
    pub missing_resolution_flags: BTreeSet<String>,
    /// Exhaustively verified maximum observations collectible in one loop.
    pub true_max_per_loop: usize,
    pub declared_cap: usize,
    /// Conservative estimate of loops still needed.
    pub min_loops_to_resolve: u32,
    pub resolvable_this_loop: bool,
    pub meta_level: MetaLevel,
}
