//! In-loop state-machine stepper: trigger evaluation and single-arc
//! advancement.
//!
//! Evaluation is split from application so callers can preview a step
//! (what-if) without committing it: [`evaluate_step`] is pure apart from
//! the injected random source, and [`apply_step`] folds a result into the
//! per-loop runtime state.

use std::cmp::Reverse;

use contracts::{
    ArcDefinition, ArcRuntimeState, StepContext, StepDisposition, StepResult, TriggerMode,
    TriggerSpec,
};

use crate::rng::RandomSource;

/// Evaluate one trigger against a step context.
///
/// Each specified condition yields a boolean; `All` mode requires every
/// one, `Any` mode requires at least one. A trigger with no conditions is
/// unconditionally satisfied.
pub fn evaluate_trigger(
    trigger: &TriggerSpec,
    ctx: &StepContext,
    rng: &mut dyn RandomSource,
) -> bool {
    if trigger.is_empty() {
        return true;
    }

    let mut checks: Vec<bool> = Vec::new();

    if !trigger.actions.is_empty() {
        checks.push(trigger.actions.contains(&ctx.action));
    }
    if !trigger.required_flags.is_empty() {
        checks.push(trigger.required_flags.is_subset(&ctx.knowledge_flags));
    }
    if let Some(level) = trigger.min_meta_level {
        // Satisfied by *any* arc's level in context, not only the owning
        // arc's. See the TriggerSpec docs; changing this scope is a
        // behavior change, not a bug fix.
        checks.push(ctx.meta_levels.values().any(|l| *l >= level));
    }
    if !trigger.required_slots.is_empty() {
        checks.push(trigger.required_slots.contains(&ctx.time_slot));
    }
    if !trigger.forbidden_slots.is_empty() {
        checks.push(!trigger.forbidden_slots.contains(&ctx.time_slot));
    }
    if !trigger.required_locations.is_empty() {
        checks.push(trigger.required_locations.contains(&ctx.location));
    }
    if !trigger.forbidden_locations.is_empty() {
        checks.push(!trigger.forbidden_locations.contains(&ctx.location));
    }
    if !trigger.required_arc_states.is_empty() {
        checks.push(
            trigger
                .required_arc_states
                .iter()
                .all(|(arc, state)| ctx.other_arc_states.get(arc) == Some(state)),
        );
    }
    if !trigger.forbidden_arc_states.is_empty() {
        checks.push(
            !trigger
                .forbidden_arc_states
                .iter()
                .any(|(arc, state)| ctx.other_arc_states.get(arc) == Some(state)),
        );
    }
    if let Some(threshold) = trigger.min_confidence {
        checks.push(ctx.confidence.is_some_and(|c| c >= threshold));
    }
    if let Some(probability) = trigger.probability {
        checks.push(rng.draw() < probability);
    }

    match trigger.mode {
        TriggerMode::All => checks.iter().all(|c| *c),
        TriggerMode::Any => checks.iter().any(|c| *c),
    }
}

/// Evaluate every transition leaving `current_state` and pick the winner:
/// highest explicit priority among the satisfied ones, declaration order
/// breaking ties. Never mutates anything.
pub fn evaluate_step(
    def: &ArcDefinition,
    current_state: &str,
    ctx: &StepContext,
    rng: &mut dyn RandomSource,
) -> StepResult {
    let Some(state) = def.state(current_state) else {
        // A runtime state pointing at an undeclared state only happens with
        // skip-validation definitions; report it as unsatisfiable.
        return StepResult::no_op(&def.arc_id, StepDisposition::NoSatisfiedTransition);
    };
    if state.terminal {
        return StepResult::no_op(&def.arc_id, StepDisposition::TerminalState);
    }

    let winner = def
        .transitions_from(current_state)
        .filter(|(_, t)| evaluate_trigger(&t.trigger, ctx, rng))
        .max_by_key(|(idx, t)| (t.priority, Reverse(*idx)));

    match winner {
        Some((idx, transition)) => StepResult {
            arc_id: def.arc_id.clone(),
            changed: true,
            disposition: StepDisposition::Advanced,
            from_state: Some(current_state.to_string()),
            new_state: Some(transition.to.clone()),
            transition_index: Some(idx),
            discovered_flags: transition.grants_flags.clone(),
            engaged_slot: Some(ctx.time_slot.clone()),
        },
        None => StepResult::no_op(&def.arc_id, StepDisposition::NoSatisfiedTransition),
    }
}

/// Commit an evaluated step to the per-loop runtime state. A no-op result
/// leaves the state untouched.
pub fn apply_step(def: &ArcDefinition, runtime: &mut ArcRuntimeState, result: &StepResult) {
    if !result.changed {
        return;
    }
    let Some(new_state) = result.new_state.as_deref() else {
        return;
    };
    runtime.previous_state = Some(runtime.current_state.clone());
    runtime.current_state = new_state.to_string();
    if let Some(idx) = result.transition_index {
        runtime.transitions_taken.push(idx);
    }
    if let Some(slot) = result.engaged_slot.as_deref() {
        runtime.engaged_slots.insert(slot.to_string());
    }
    if let Some(state) = def.state(new_state) {
        runtime.terminal = state.terminal;
        runtime.outcome = state.outcome;
    }
}
