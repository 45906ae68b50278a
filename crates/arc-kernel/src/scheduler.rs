//! Conflict detection, greedy optimal-arc-set selection, and schedule
//! rendering.
//!
//! The solver is greedy by design: candidates are ranked by value density
//! and added one at a time, re-checking feasibility after every addition.
//! That forfeits global optimality in exchange for tractability and an
//! explainable exclusion reason per rejected arc.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use contracts::{
    slot_minutes, slots_adjacent, ArcLoopMeta, ConflictKind, ConflictRule, ConflictSeverity,
    EngineConfig, ExcludedArc, FeasibilityReport, LoopSchedule, OptimalArcSet, ResolutionOption,
    ScheduleConflict, ScheduleEntry, MAIN_ARC, SLOT_DURATION_MINUTES,
};

use crate::error::EngineError;
use crate::registry::ArcRegistry;
use crate::resolution::CostModel;

/// Resolve a proposed arc -> mode mapping into concrete slot/location/cost
/// usage through the cost model. A mode not yet unlocked falls back to its
/// declared base values; feasibility is about physical collisions, not
/// about whether the protagonist is ready.
pub fn resolve_proposal(
    proposal: &BTreeMap<String, String>,
    registry: &ArcRegistry,
    cost_model: &dyn CostModel,
    meta: &BTreeMap<String, ArcLoopMeta>,
    global_flags: &BTreeSet<String>,
) -> Result<BTreeMap<String, ResolutionOption>, EngineError> {
    let mut resolved = BTreeMap::new();
    for (arc_id, mode_id) in proposal {
        let def = registry
            .get(arc_id)
            .ok_or_else(|| EngineError::UnknownArc(arc_id.clone()))?;
        let mode = def.mode(mode_id).ok_or_else(|| EngineError::UnknownMode {
            arc_id: arc_id.clone(),
            mode_id: mode_id.clone(),
        })?;

        let arc_meta = meta.get(arc_id).cloned().unwrap_or_default();
        let option = cost_model
            .options(def, &arc_meta, global_flags)
            .into_iter()
            .find(|o| o.mode_id == *mode_id)
            .unwrap_or_else(|| ResolutionOption {
                arc_id: arc_id.clone(),
                mode_id: mode_id.clone(),
                cost: mode.base_cost,
                risk: mode.base_risk,
                time_slots: mode.time_slots.clone(),
                locations: mode.locations.clone(),
            });
        resolved.insert(arc_id.clone(), option);
    }
    Ok(resolved)
}

fn shared_slot(a: &ResolutionOption, b: &ResolutionOption) -> Option<String> {
    a.time_slots.intersection(&b.time_slots).next().cloned()
}

fn travel_pair(a: &ResolutionOption, b: &ResolutionOption) -> Option<(String, String)> {
    if a.locations.is_empty()
        || b.locations.is_empty()
        || a.locations.intersection(&b.locations).next().is_some()
    {
        return None;
    }
    for sa in &a.time_slots {
        for sb in &b.time_slots {
            if slots_adjacent(sa, sb) {
                return Some((sa.clone(), sb.clone()));
            }
        }
    }
    None
}

/// Check a resolved proposal against the main arc's reserved slots and the
/// explicit conflict rules. Detection is symmetric in the pair order.
pub fn check_feasibility(
    resolved: &BTreeMap<String, ResolutionOption>,
    main_slots: &BTreeSet<String>,
    rules: &[ConflictRule],
    config: &EngineConfig,
) -> FeasibilityReport {
    let mut conflicts = Vec::new();
    let mut slot_load: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for slot in main_slots {
        slot_load
            .entry(slot.clone())
            .or_default()
            .push(MAIN_ARC.to_string());
    }
    for (arc_id, option) in resolved {
        for slot in &option.time_slots {
            slot_load
                .entry(slot.clone())
                .or_default()
                .push(arc_id.clone());
        }
    }

    // Main-arc collisions.
    for (arc_id, option) in resolved {
        for slot in option.time_slots.intersection(main_slots) {
            conflicts.push(ScheduleConflict {
                first_arc: arc_id.clone(),
                second_arc: MAIN_ARC.to_string(),
                kind: ConflictKind::Time,
                severity: ConflictSeverity::Hard,
                slot: Some(slot.clone()),
                detail: format!("slot {slot} is reserved by the main arc"),
            });
        }
    }

    // Pairwise side-arc conflicts.
    let entries: Vec<(&String, &ResolutionOption)> = resolved.iter().collect();
    for i in 0..entries.len() {
        for j in (i + 1)..entries.len() {
            let (first, a) = entries[i];
            let (second, b) = entries[j];

            if let Some(slot) = shared_slot(a, b) {
                conflicts.push(ScheduleConflict {
                    first_arc: first.clone(),
                    second_arc: second.clone(),
                    kind: ConflictKind::Time,
                    severity: ConflictSeverity::Hard,
                    slot: Some(slot.clone()),
                    detail: format!("both arcs require slot {slot}"),
                });
            }
            for rule in rules.iter().filter(|r| r.covers(first, second)) {
                conflicts.push(ScheduleConflict {
                    first_arc: first.clone(),
                    second_arc: second.clone(),
                    kind: ConflictKind::Rule,
                    severity: if rule.mutually_exclusive {
                        ConflictSeverity::Hard
                    } else {
                        ConflictSeverity::Soft
                    },
                    slot: None,
                    detail: format!("conflict rule: {}", rule.category),
                });
            }
            if let Some((sa, sb)) = travel_pair(a, b) {
                conflicts.push(ScheduleConflict {
                    first_arc: first.clone(),
                    second_arc: second.clone(),
                    kind: ConflictKind::Travel,
                    severity: ConflictSeverity::Soft,
                    slot: Some(sa.clone()),
                    detail: format!(
                        "adjacent slots {sa}/{sb} at different locations leave no travel time"
                    ),
                });
            }
        }
    }

    let any_hard = conflicts
        .iter()
        .any(|c| c.severity == ConflictSeverity::Hard);
    let any_soft = conflicts
        .iter()
        .any(|c| c.severity == ConflictSeverity::Soft);
    let feasible = !any_hard && (!config.strict_soft_conflicts || !any_soft);

    FeasibilityReport {
        feasible,
        conflicts,
        slot_load,
    }
}

fn value_score(tier_priority: i64, importance: i64, cost: i64) -> i64 {
    // Scaled integer form of (tier * 10 + importance) / max(1, cost).
    (tier_priority * 10 + importance) * 1000 / cost.max(1)
}

/// Greedily build a feasible, value-ranked subset of the candidate arcs.
/// An arc is excluded, with the first blocking reason recorded, the moment
/// it would break feasibility or the per-loop arc cap is reached.
pub fn compute_optimal_arc_set(
    candidates: &BTreeMap<String, String>,
    registry: &ArcRegistry,
    cost_model: &dyn CostModel,
    meta: &BTreeMap<String, ArcLoopMeta>,
    global_flags: &BTreeSet<String>,
    main_slots: &BTreeSet<String>,
    rules: &[ConflictRule],
    config: &EngineConfig,
) -> Result<OptimalArcSet, EngineError> {
    let resolved = resolve_proposal(candidates, registry, cost_model, meta, global_flags)?;

    let mut ranked: Vec<(&String, i64)> = resolved
        .iter()
        .filter_map(|(arc_id, option)| {
            // resolve_proposal already guaranteed the definition exists.
            registry.get(arc_id).map(|def| {
                (
                    arc_id,
                    value_score(def.tier.priority(), def.importance, option.cost),
                )
            })
        })
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let mut selected: BTreeMap<String, ResolutionOption> = BTreeMap::new();
    let mut excluded: Vec<ExcludedArc> = Vec::new();

    for (arc_id, _) in ranked {
        if selected.len() >= config.max_arcs_per_loop {
            excluded.push(ExcludedArc {
                arc_id: arc_id.clone(),
                reason: format!("max arc count {} reached", config.max_arcs_per_loop),
            });
            continue;
        }
        let option = resolved[arc_id].clone();
        selected.insert(arc_id.clone(), option);
        let report = check_feasibility(&selected, main_slots, rules, config);
        if !report.feasible {
            let reason = report
                .conflicts
                .iter()
                .find(|c| {
                    (c.first_arc == *arc_id || c.second_arc == *arc_id)
                        && (c.severity == ConflictSeverity::Hard || config.strict_soft_conflicts)
                })
                .map(|c| c.detail.clone())
                .unwrap_or_else(|| "would make the selection infeasible".to_string());
            selected.remove(arc_id);
            debug!(arc_id = %arc_id, reason, "arc excluded from optimal set");
            excluded.push(ExcludedArc {
                arc_id: arc_id.clone(),
                reason,
            });
        }
    }

    let feasibility = check_feasibility(&selected, main_slots, rules, config);
    let total_cost = selected.values().map(|o| o.cost).sum();
    let selected = selected
        .into_iter()
        .map(|(arc_id, option)| (arc_id, option.mode_id))
        .collect();

    Ok(OptimalArcSet {
        selected,
        excluded,
        total_cost,
        feasibility,
    })
}

/// Render a resolved selection onto the slot grid.
pub fn build_schedule(
    resolved: &BTreeMap<String, ResolutionOption>,
    main_slots: &BTreeSet<String>,
) -> LoopSchedule {
    let mut entries: Vec<ScheduleEntry> = Vec::new();
    for slot in main_slots {
        entries.push(ScheduleEntry {
            slot: slot.clone(),
            arc_id: MAIN_ARC.to_string(),
            mode_id: None,
            location: None,
            main_arc: true,
        });
    }
    for (arc_id, option) in resolved {
        for slot in &option.time_slots {
            entries.push(ScheduleEntry {
                slot: slot.clone(),
                arc_id: arc_id.clone(),
                mode_id: Some(option.mode_id.clone()),
                location: option.locations.iter().next().cloned(),
                main_arc: false,
            });
        }
    }
    entries.sort_by_key(|e| (slot_minutes(&e.slot).unwrap_or(i64::MAX), e.arc_id.clone()));

    let occupied: BTreeSet<&String> = entries.iter().map(|e| &e.slot).collect();
    let total_minutes = occupied.len() as i64 * SLOT_DURATION_MINUTES;
    let risks: Vec<i64> = resolved.values().map(|o| o.risk).collect();
    let average_risk = if risks.is_empty() {
        0
    } else {
        risks.iter().sum::<i64>() / risks.len() as i64
    };

    LoopSchedule {
        entries,
        total_minutes,
        average_risk,
    }
}
