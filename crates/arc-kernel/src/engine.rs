//! The `LoopEngine` facade: sequences the loop lifecycle and exposes the
//! cross-loop state, verification, and scheduling surfaces.
//!
//! One loop is active at a time per engine instance. All shared state
//! (knowledge flags, per-arc meta) is owned by the instance; two engines
//! share nothing, so concurrent simulations use one instance each.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use contracts::{
    ActionInput, ArcDefinition, ArcRuntimeState, ArcStatusView, ConflictRule, EngineConfig,
    EngineStateSnapshot, FeasibilityReport, LoopReport, LoopSchedule, LooperStatus, OptimalArcSet,
    ResolutionOption, StepContext, StepDisposition, StepResult,
};

use crate::error::{EngineError, ValidationReport};
use crate::progression::ProgressionTracker;
use crate::registry::ArcRegistry;
use crate::resolution::{CostModel, DefaultCostModel};
use crate::rng::{RandomSource, SeededRandom};
use crate::scheduler;
use crate::stepper;
use crate::verifier::{self, LooperVerification};

struct ActiveLoop {
    loop_id: String,
    runtimes: BTreeMap<String, ArcRuntimeState>,
    /// Flags granted by fired transitions this loop, per arc.
    granted_flags: BTreeMap<String, BTreeSet<String>>,
}

/// Engine facade. Construct with [`LoopEngine::new`]; substitute the cost
/// oracle or random source through the `with_*` builders.
pub struct LoopEngine {
    registry: ArcRegistry,
    tracker: ProgressionTracker,
    rules: Vec<ConflictRule>,
    cost_model: Box<dyn CostModel>,
    rng: Box<dyn RandomSource>,
    active: Option<ActiveLoop>,
}

impl LoopEngine {
    pub fn new(config: EngineConfig) -> Self {
        let rng = SeededRandom::new(config.seed);
        Self {
            registry: ArcRegistry::new(),
            tracker: ProgressionTracker::new(config),
            rules: Vec::new(),
            cost_model: Box::new(DefaultCostModel::default()),
            rng: Box::new(rng),
            active: None,
        }
    }

    pub fn with_cost_model(mut self, cost_model: Box<dyn CostModel>) -> Self {
        self.cost_model = cost_model;
        self
    }

    pub fn with_random_source(mut self, rng: Box<dyn RandomSource>) -> Self {
        self.rng = rng;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        self.tracker.config()
    }

    pub fn registry(&self) -> &ArcRegistry {
        &self.registry
    }

    pub fn knowledge_flags(&self) -> &BTreeSet<String> {
        self.tracker.knowledge_flags()
    }

    pub fn loop_counter(&self) -> u64 {
        self.tracker.loop_counter()
    }

    pub fn has_active_loop(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_loop_id(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.loop_id.as_str())
    }

    // -- registration -------------------------------------------------------

    pub fn register_arc(&mut self, def: ArcDefinition) -> Result<ValidationReport, EngineError> {
        self.registry.register(def, false)
    }

    pub fn register_arcs(
        &mut self,
        defs: Vec<ArcDefinition>,
    ) -> Result<Vec<ValidationReport>, EngineError> {
        let mut reports = Vec::with_capacity(defs.len());
        for def in defs {
            reports.push(self.registry.register(def, false)?);
        }
        Ok(reports)
    }

    pub fn unregister_arc(&mut self, arc_id: &str) -> Result<ArcDefinition, EngineError> {
        self.registry.unregister(arc_id)
    }

    pub fn add_conflict_rule(&mut self, rule: ConflictRule) {
        self.rules.push(rule);
    }

    // -- loop lifecycle -----------------------------------------------------

    /// Seed fresh per-arc runtime state and open a loop. `subset` limits
    /// the loop to the named arcs; by default every registered arc takes
    /// part.
    pub fn initialize_loop(
        &mut self,
        loop_id: &str,
        subset: Option<&[String]>,
    ) -> Result<Vec<String>, EngineError> {
        if let Some(active) = &self.active {
            return Err(EngineError::LoopAlreadyActive(active.loop_id.clone()));
        }

        let arc_ids: Vec<String> = match subset {
            Some(ids) => {
                for id in ids {
                    if !self.registry.contains(id) {
                        return Err(EngineError::UnknownArc(id.clone()));
                    }
                }
                ids.to_vec()
            }
            None => self.registry.arc_ids().map(str::to_string).collect(),
        };

        let mut runtimes = BTreeMap::new();
        for arc_id in &arc_ids {
            // Presence checked above; registry owns the definition.
            if let Some(def) = self.registry.get(arc_id) {
                runtimes.insert(
                    arc_id.clone(),
                    ArcRuntimeState::seeded(arc_id, &def.initial_state),
                );
            }
        }

        info!(loop_id, arcs = runtimes.len(), "loop initialized");
        self.active = Some(ActiveLoop {
            loop_id: loop_id.to_string(),
            runtimes,
            granted_flags: BTreeMap::new(),
        });
        Ok(arc_ids)
    }

    fn context_for(&self, arc_id: &str, input: &ActionInput) -> StepContext {
        let mut meta_levels = BTreeMap::new();
        for id in self.registry.arc_ids() {
            meta_levels.insert(id.to_string(), self.tracker.meta_or_default(id).meta_level);
        }
        let other_arc_states = self
            .active
            .as_ref()
            .map(|active| {
                active
                    .runtimes
                    .iter()
                    .filter(|(id, _)| id.as_str() != arc_id)
                    .map(|(id, rt)| (id.clone(), rt.current_state.clone()))
                    .collect()
            })
            .unwrap_or_default();

        StepContext {
            action: input.action.clone(),
            time_slot: input.time_slot.clone(),
            location: input.location.clone(),
            knowledge_flags: self.tracker.knowledge_flags().clone(),
            meta_levels,
            other_arc_states,
            confidence: input.confidence,
        }
    }

    /// Step every arc in the active loop against one action and commit the
    /// results. Returns one result per arc, in arc-id order.
    pub fn step_arcs(&mut self, input: &ActionInput) -> Result<Vec<StepResult>, EngineError> {
        if self.active.is_none() {
            return Err(EngineError::NoActiveLoop);
        }

        let arc_ids: Vec<String> = self
            .active
            .as_ref()
            .map(|a| a.runtimes.keys().cloned().collect())
            .unwrap_or_default();

        let mut results = Vec::with_capacity(arc_ids.len());
        for arc_id in arc_ids {
            let context = self.context_for(&arc_id, input);
            let result = match self.registry.get(&arc_id) {
                None => StepResult::no_op(&arc_id, StepDisposition::NotRegistered),
                Some(def) => {
                    let current = self
                        .active
                        .as_ref()
                        .and_then(|a| a.runtimes.get(&arc_id))
                        .map(|rt| rt.current_state.clone())
                        .unwrap_or_else(|| def.initial_state.clone());
                    stepper::evaluate_step(def, &current, &context, self.rng.as_mut())
                }
            };

            if result.changed {
                if let (Some(def), Some(active)) =
                    (self.registry.get(&arc_id), self.active.as_mut())
                {
                    if let Some(runtime) = active.runtimes.get_mut(&arc_id) {
                        stepper::apply_step(def, runtime, &result);
                    }
                    active
                        .granted_flags
                        .entry(arc_id.clone())
                        .or_default()
                        .extend(result.discovered_flags.iter().cloned());
                }
                debug!(
                    arc_id = %arc_id,
                    to = result.new_state.as_deref().unwrap_or_default(),
                    "arc advanced"
                );
            }
            results.push(result);
        }
        Ok(results)
    }

    /// Evaluate one arc against an action without committing anything.
    pub fn preview_arc(
        &mut self,
        arc_id: &str,
        input: &ActionInput,
    ) -> Result<StepResult, EngineError> {
        let active = self.active.as_ref().ok_or(EngineError::NoActiveLoop)?;
        let Some(runtime) = active.runtimes.get(arc_id) else {
            return Ok(StepResult::no_op(arc_id, StepDisposition::NotActive));
        };
        let current = runtime.current_state.clone();
        let context = self.context_for(arc_id, input);
        match self.registry.get(arc_id) {
            None => Ok(StepResult::no_op(arc_id, StepDisposition::NotRegistered)),
            Some(def) => Ok(stepper::evaluate_step(
                def,
                &current,
                &context,
                self.rng.as_mut(),
            )),
        }
    }

    /// Fold the active loop into cross-loop state and close it.
    pub fn finalize_loop(&mut self) -> Result<LoopReport, EngineError> {
        let active = self.active.take().ok_or(EngineError::NoActiveLoop)?;

        let new_flags =
            self.tracker
                .fold_loop(&active.loop_id, &active.runtimes, &active.granted_flags);

        let mut final_states = BTreeMap::new();
        let mut outcomes = BTreeMap::new();
        let mut transitions_taken = BTreeMap::new();
        for (arc_id, runtime) in &active.runtimes {
            final_states.insert(arc_id.clone(), runtime.current_state.clone());
            if let Some(outcome) = runtime.outcome {
                outcomes.insert(arc_id.clone(), outcome);
            }
            transitions_taken.insert(arc_id.clone(), runtime.transitions_taken.clone());
        }

        info!(
            loop_id = %active.loop_id,
            new_flags = new_flags.len(),
            "loop finalized"
        );
        Ok(LoopReport {
            loop_id: active.loop_id,
            final_states,
            outcomes,
            new_flags,
            transitions_taken,
        })
    }

    // -- queries ------------------------------------------------------------

    pub fn arc_status(&self, arc_id: &str) -> Result<ArcStatusView, EngineError> {
        let def = self
            .registry
            .get(arc_id)
            .ok_or_else(|| EngineError::UnknownArc(arc_id.to_string()))?;
        let meta = self.tracker.meta_or_default(arc_id);
        let flags = self.tracker.knowledge_flags();
        let runtime = self
            .active
            .as_ref()
            .and_then(|a| a.runtimes.get(arc_id))
            .cloned();

        Ok(ArcStatusView {
            arc_id: arc_id.to_string(),
            runtime,
            best_mode: self
                .cost_model
                .best_option(def, &meta, flags)
                .map(|o| o.mode_id),
            trivialization_progress: self.cost_model.trivialization_progress(def, &meta, flags),
            is_trivial: self.cost_model.is_trivial(
                def,
                &meta,
                flags,
                self.config().trivial_cost_threshold,
            ),
            meta,
        })
    }

    /// Resolution modes currently unlocked for one arc, cheapest first.
    pub fn resolution_options(&self, arc_id: &str) -> Result<Vec<ResolutionOption>, EngineError> {
        let def = self
            .registry
            .get(arc_id)
            .ok_or_else(|| EngineError::UnknownArc(arc_id.to_string()))?;
        let meta = self.tracker.meta_or_default(arc_id);
        Ok(self
            .cost_model
            .options(def, &meta, self.tracker.knowledge_flags()))
    }

    /// Verify the looper-only design of one arc.
    pub fn verify_looper_only(&self, arc_id: &str) -> Result<LooperVerification, EngineError> {
        let def = self
            .registry
            .get(arc_id)
            .ok_or_else(|| EngineError::UnknownArc(arc_id.to_string()))?;
        verifier::verify_arc(def, self.config())
    }

    /// Looper standing of every arc that declares a constraint.
    pub fn looper_status_all(&self) -> Vec<LooperStatus> {
        self.registry
            .definitions()
            .filter(|def| def.looper.is_some())
            .filter_map(|def| {
                verifier::looper_status(
                    def,
                    &self.tracker.meta_or_default(&def.arc_id),
                    self.tracker.knowledge_flags(),
                    self.config(),
                )
                .ok()
            })
            .collect()
    }

    pub fn check_feasibility(
        &self,
        proposal: &BTreeMap<String, String>,
        main_slots: &BTreeSet<String>,
    ) -> Result<FeasibilityReport, EngineError> {
        let resolved = scheduler::resolve_proposal(
            proposal,
            &self.registry,
            self.cost_model.as_ref(),
            self.tracker.all_meta(),
            self.tracker.knowledge_flags(),
        )?;
        Ok(scheduler::check_feasibility(
            &resolved,
            main_slots,
            &self.rules,
            self.config(),
        ))
    }

    pub fn compute_optimal_arc_set(
        &self,
        candidates: &BTreeMap<String, String>,
        main_slots: &BTreeSet<String>,
    ) -> Result<OptimalArcSet, EngineError> {
        scheduler::compute_optimal_arc_set(
            candidates,
            &self.registry,
            self.cost_model.as_ref(),
            self.tracker.all_meta(),
            self.tracker.knowledge_flags(),
            main_slots,
            &self.rules,
            self.config(),
        )
    }

    pub fn build_schedule(
        &self,
        proposal: &BTreeMap<String, String>,
        main_slots: &BTreeSet<String>,
    ) -> Result<LoopSchedule, EngineError> {
        let resolved = scheduler::resolve_proposal(
            proposal,
            &self.registry,
            self.cost_model.as_ref(),
            self.tracker.all_meta(),
            self.tracker.knowledge_flags(),
        )?;
        Ok(scheduler::build_schedule(&resolved, main_slots))
    }

    // -- persistence --------------------------------------------------------

    pub fn export_state(&self) -> EngineStateSnapshot {
        self.tracker.to_snapshot()
    }

    /// Replace cross-loop state wholesale. Refused while a loop is active:
    /// the active loop's runtime references the state being swapped out.
    pub fn import_state(&mut self, snapshot: EngineStateSnapshot) -> Result<(), EngineError> {
        if let Some(active) = &self.active {
            return Err(EngineError::LoopAlreadyActive(active.loop_id.clone()));
        }
        self.tracker.restore(snapshot)
    }
}
