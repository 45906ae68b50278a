//! Cross-loop progression: folds per-loop engagement into monotonically
//! growing meta-state and the global knowledge-flag set.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use contracts::{
    ArcLoopMeta, ArcRuntimeState, EngineConfig, EngineStateSnapshot, MetaLevel, SCHEMA_VERSION_V1,
};

use crate::error::EngineError;

/// Pure meta-level computation from (observation count, discovered flags,
/// config). The two top levels require both repetition and matching
/// discovered knowledge; repetition alone cannot reach them.
pub fn meta_level_for(
    observations: u32,
    discovered_flags: &BTreeSet<String>,
    config: &EngineConfig,
) -> MetaLevel {
    let cutoffs = &config.meta_observation_cutoffs;
    let matches_any = |patterns: &[String]| {
        discovered_flags
            .iter()
            .any(|flag| patterns.iter().any(|p| flag.contains(p.as_str())))
    };

    let mut level = MetaLevel::Untouched;
    if observations >= cutoffs[0] {
        level = MetaLevel::Noticed;
    }
    if observations >= cutoffs[1] {
        level = MetaLevel::Explored;
    }
    if observations >= cutoffs[2] && matches_any(&config.mechanic_flag_patterns) {
        level = MetaLevel::MechanicKnown;
    }
    if observations >= cutoffs[3]
        && matches_any(&config.mechanic_flag_patterns)
        && matches_any(&config.optimal_flag_patterns)
    {
        level = MetaLevel::OptimalPlanFound;
    }
    level
}

/// Owns all cross-loop state: per-arc meta, the global knowledge-flag set,
/// and the loop counter. Counters and sets only grow; meta levels never
/// regress except through [`ProgressionTracker::reset_arc`].
#[derive(Debug, Clone)]
pub struct ProgressionTracker {
    config: EngineConfig,
    loop_counter: u64,
    knowledge_flags: BTreeSet<String>,
    meta: BTreeMap<String, ArcLoopMeta>,
}

impl ProgressionTracker {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            loop_counter: 0,
            knowledge_flags: BTreeSet::new(),
            meta: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn loop_counter(&self) -> u64 {
        self.loop_counter
    }

    pub fn knowledge_flags(&self) -> &BTreeSet<String> {
        &self.knowledge_flags
    }

    pub fn meta(&self, arc_id: &str) -> Option<&ArcLoopMeta> {
        self.meta.get(arc_id)
    }

    pub fn meta_or_default(&self, arc_id: &str) -> ArcLoopMeta {
        self.meta.get(arc_id).cloned().unwrap_or_default()
    }

    pub fn all_meta(&self) -> &BTreeMap<String, ArcLoopMeta> {
        &self.meta
    }

    /// Meta level of every tracked arc; untracked arcs read as Untouched.
    pub fn meta_levels(&self) -> BTreeMap<String, MetaLevel> {
        self.meta
            .iter()
            .map(|(id, m)| (id.clone(), m.meta_level))
            .collect()
    }

    /// Fold one finished loop into cross-loop state. `flags_by_arc` holds
    /// the flags each arc's fired transitions granted this loop. Returns
    /// the flags that entered the global set for the first time.
    pub fn fold_loop(
        &mut self,
        loop_id: &str,
        runtimes: &BTreeMap<String, ArcRuntimeState>,
        flags_by_arc: &BTreeMap<String, BTreeSet<String>>,
    ) -> BTreeSet<String> {
        self.loop_counter += 1;
        let mut new_flags = BTreeSet::new();

        for (arc_id, runtime) in runtimes {
            if !runtime.engaged() {
                continue;
            }
            let meta = self.meta.entry(arc_id.clone()).or_default();
            meta.observations += 1;
            meta.interventions += 1;
            if meta.first_engaged_loop.is_none() {
                meta.first_engaged_loop = Some(loop_id.to_string());
            }
            meta.last_engaged_loop = Some(loop_id.to_string());

            if let Some(flags) = flags_by_arc.get(arc_id) {
                for flag in flags {
                    meta.discovered_flags.insert(flag.clone());
                    if self.knowledge_flags.insert(flag.clone()) {
                        new_flags.insert(flag.clone());
                    }
                }
            }
            if let Some(outcome) = runtime.outcome {
                meta.record_outcome(outcome);
            }

            let computed = meta_level_for(meta.observations, &meta.discovered_flags, &self.config);
            if computed > meta.meta_level {
                debug!(arc_id = %arc_id, level = ?computed, "meta level advanced");
                meta.meta_level = computed;
            }
        }

        new_flags
    }

    /// Explicit reset of one arc's accumulated understanding. The global
    /// flag set is intentionally left alone; knowledge, once shared, stays.
    pub fn reset_arc(&mut self, arc_id: &str) {
        self.meta.remove(arc_id);
    }

    pub fn to_snapshot(&self) -> EngineStateSnapshot {
        EngineStateSnapshot {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            loop_counter: self.loop_counter,
            knowledge_flags: self.knowledge_flags.clone(),
            arc_meta: self.meta.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: EngineStateSnapshot) -> Result<(), EngineError> {
        if snapshot.schema_version != SCHEMA_VERSION_V1 {
            return Err(EngineError::UnsupportedSnapshot(snapshot.schema_version));
        }
        self.loop_counter = snapshot.loop_counter;
        self.knowledge_flags = snapshot.knowledge_flags;
        self.meta = snapshot.arc_meta;
        Ok(())
    }
}
