//! Looper-only design verification.
//!
//! For an arc that claims to need multiple loops, this module derives
//! where each required observation can be collected, builds the pairwise
//! conflict graph between observations, and exhaustively enumerates
//! maximal compatible subsets to find the *true* single-loop cap. The
//! search is exponential in the observation count, which is fine: the
//! input is a small author-declared set, never runtime-scale data.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use contracts::{
    slot_minutes, slots_adjacent, ArcDefinition, ArcLoopMeta, EngineConfig, LooperConstraint,
    LooperStatus, SLOT_DURATION_MINUTES,
};

use crate::error::EngineError;

/// Slots and locations at which one observation can be collected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ObservationSources {
    pub observation_id: String,
    pub slots: BTreeSet<String>,
    pub locations: BTreeSet<String>,
}

/// Result of verifying one arc's looper-only design.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LooperVerification {
    pub arc_id: String,
    /// Largest maximal compatible observation subset found.
    pub true_max_per_loop: usize,
    pub declared_cap: usize,
    /// Every maximal compatible subset, for author inspection.
    pub maximal_sets: Vec<BTreeSet<String>>,
    /// Number of conflicting observation pairs.
    pub conflict_count: usize,
    /// True when the observations genuinely cannot all fit in one loop.
    pub enforced: bool,
    pub warnings: Vec<String>,
}

/// Map each required observation to the slots/locations that can produce
/// it: time windows whose identifier references the observation, and
/// transitions that grant the observation as a flag.
pub fn observation_sources(def: &ArcDefinition, observation_id: &str) -> ObservationSources {
    let mut sources = ObservationSources {
        observation_id: observation_id.to_string(),
        ..ObservationSources::default()
    };

    for window in &def.time_windows {
        if window.window_id.contains(observation_id)
            || observation_id.contains(window.window_id.as_str())
        {
            sources.slots.extend(window.slots.iter().cloned());
            sources.locations.extend(window.locations.iter().cloned());
        }
    }
    for transition in &def.transitions {
        if transition.grants_flags.iter().any(|f| f == observation_id) {
            sources
                .slots
                .extend(transition.trigger.required_slots.iter().cloned());
            sources
                .locations
                .extend(transition.trigger.required_locations.iter().cloned());
        }
    }
    sources
}

fn spans_overlap(a: &BTreeSet<String>, b: &BTreeSet<String>) -> bool {
    let minutes = |set: &BTreeSet<String>| {
        let parsed: Vec<i64> = set.iter().filter_map(|s| slot_minutes(s)).collect();
        parsed
            .iter()
            .min()
            .copied()
            .zip(parsed.iter().max().copied())
    };
    match (minutes(a), minutes(b)) {
        (Some((a_min, a_max)), Some((b_min, b_max))) => {
            a_min < b_max + SLOT_DURATION_MINUTES && b_min < a_max + SLOT_DURATION_MINUTES
        }
        _ => false,
    }
}

/// Whether two observations cannot both be collected in one loop.
pub fn observations_conflict(
    a: &ObservationSources,
    b: &ObservationSources,
    adjacent_slots_conflict: bool,
) -> bool {
    if a.slots.intersection(&b.slots).next().is_some() {
        return true;
    }
    if adjacent_slots_conflict
        && a.slots
            .iter()
            .any(|sa| b.slots.iter().any(|sb| slots_adjacent(sa, sb)))
    {
        return true;
    }
    // Overlapping spans at mutually exclusive locations: being in one
    // place rules the other observation out.
    if !a.locations.is_empty()
        && !b.locations.is_empty()
        && a.locations.intersection(&b.locations).next().is_none()
        && spans_overlap(&a.slots, &b.slots)
    {
        return true;
    }
    false
}

/// Adjacency-set conflict graph keyed by observation id.
pub fn conflict_graph(
    def: &ArcDefinition,
    constraint: &LooperConstraint,
    adjacent_slots_conflict: bool,
) -> BTreeMap<String, BTreeSet<String>> {
    let sources: Vec<ObservationSources> = constraint
        .required_observations
        .iter()
        .map(|obs| observation_sources(def, obs))
        .collect();

    let mut graph: BTreeMap<String, BTreeSet<String>> = constraint
        .required_observations
        .iter()
        .map(|obs| (obs.clone(), BTreeSet::new()))
        .collect();

    for i in 0..sources.len() {
        for j in (i + 1)..sources.len() {
            if observations_conflict(&sources[i], &sources[j], adjacent_slots_conflict) {
                if let Some(edges) = graph.get_mut(&sources[i].observation_id) {
                    edges.insert(sources[j].observation_id.clone());
                }
                if let Some(edges) = graph.get_mut(&sources[j].observation_id) {
                    edges.insert(sources[i].observation_id.clone());
                }
            }
        }
    }
    graph
}

/// Exhaustive backtracking enumeration of every *maximal* independent
/// (mutually compatible) subset of the observation set.
pub fn maximal_compatible_sets(
    graph: &BTreeMap<String, BTreeSet<String>>,
) -> Vec<BTreeSet<String>> {
    let ids: Vec<&String> = graph.keys().collect();
    let mut out: Vec<BTreeSet<String>> = Vec::new();
    let mut current: Vec<&String> = Vec::new();

    fn is_independent_with(
        graph: &BTreeMap<String, BTreeSet<String>>,
        current: &[&String],
        candidate: &String,
    ) -> bool {
        current
            .iter()
            .all(|chosen| !graph[candidate.as_str()].contains(*chosen))
    }

    fn backtrack<'a>(
        graph: &BTreeMap<String, BTreeSet<String>>,
        ids: &[&'a String],
        idx: usize,
        current: &mut Vec<&'a String>,
        out: &mut Vec<BTreeSet<String>>,
    ) {
        if idx == ids.len() {
            // Maximal iff no excluded observation is compatible with all
            // chosen ones.
            let maximal = ids.iter().all(|id| {
                current.contains(id) || !is_independent_with(graph, current, *id)
            });
            if maximal {
                out.push(current.iter().map(|s| s.to_string()).collect());
            }
            return;
        }
        let candidate = ids[idx];
        if is_independent_with(graph, current, candidate) {
            current.push(candidate);
            backtrack(graph, ids, idx + 1, current, out);
            current.pop();
        }
        backtrack(graph, ids, idx + 1, current, out);
    }

    backtrack(graph, &ids, 0, &mut current, &mut out);
    out.sort();
    out.dedup();
    out
}

/// Verify one arc's looper-only design end to end.
pub fn verify_arc(def: &ArcDefinition, config: &EngineConfig) -> Result<LooperVerification, EngineError> {
    let constraint = def
        .looper
        .as_ref()
        .ok_or_else(|| EngineError::NoLooperConstraint(def.arc_id.clone()))?;

    let graph = conflict_graph(def, constraint, config.adjacent_slots_conflict);
    let conflict_count = graph.values().map(BTreeSet::len).sum::<usize>() / 2;
    let maximal_sets = maximal_compatible_sets(&graph);
    let true_max = maximal_sets.iter().map(BTreeSet::len).max().unwrap_or(0);
    let required = constraint.required_observations.len();
    let enforced = true_max < required;

    let mut warnings = Vec::new();
    if constraint.declared_cap < true_max {
        warnings.push(format!(
            "declared per-loop cap {} understates the true cap {}",
            constraint.declared_cap, true_max
        ));
    }
    if !enforced {
        warnings.push(format!(
            "all {required} required observations fit in one loop; the arc is not \
             actually looper-only"
        ));
    }
    if conflict_count == 0 {
        warnings.push("no observation conflicts found; nothing enforces the constraint".into());
    }

    debug!(
        arc_id = %def.arc_id,
        true_max,
        conflict_count,
        enforced,
        "looper-only verification complete"
    );

    Ok(LooperVerification {
        arc_id: def.arc_id.clone(),
        true_max_per_loop: true_max,
        declared_cap: constraint.declared_cap,
        maximal_sets,
        conflict_count,
        enforced,
        warnings,
    })
}

/// Conservative estimate of loops still needed: ceiling of unmet
/// observations over the true per-loop cap, doubled when the design is
/// genuinely looper-only (observation order rarely cooperates).
pub fn min_loops_to_resolve(unmet: usize, true_max: usize, enforced: bool) -> u32 {
    if unmet == 0 {
        return 0;
    }
    let per_loop = true_max.max(1);
    let base = unmet.div_ceil(per_loop) as u32;
    if enforced {
        base * 2
    } else {
        base
    }
}

/// Full looper standing for one arc given its cross-loop meta-state.
pub fn looper_status(
    def: &ArcDefinition,
    meta: &ArcLoopMeta,
    global_flags: &BTreeSet<String>,
    config: &EngineConfig,
) -> Result<LooperStatus, EngineError> {
    let constraint = def
        .looper
        .as_ref()
        .ok_or_else(|| EngineError::NoLooperConstraint(def.arc_id.clone()))?;
    let verification = verify_arc(def, config)?;

    let acquired: BTreeSet<String> = constraint
        .required_observations
        .iter()
        .filter(|obs| meta.discovered_flags.contains(*obs))
        .cloned()
        .collect();
    let missing_flags: BTreeSet<String> = constraint
        .resolution_flags
        .difference(global_flags)
        .cloned()
        .collect();
    let unmet = constraint.required_observations.len() - acquired.len();
    let resolvable_this_loop = unmet == 0 && missing_flags.is_empty();

    Ok(LooperStatus {
        arc_id: def.arc_id.clone(),
        required_observations: constraint.required_observations.clone(),
        acquired_observations: acquired,
        missing_resolution_flags: missing_flags,
        true_max_per_loop: verification.true_max_per_loop,
        declared_cap: constraint.declared_cap,
        min_loops_to_resolve: min_loops_to_resolve(
            unmet,
            verification.true_max_per_loop,
            verification.enforced,
        ),
        resolvable_this_loop,
        meta_level: meta.meta_level,
    })
}
