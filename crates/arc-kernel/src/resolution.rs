//! Resolution-mode unlocking and the trivialization cost model.
//!
//! The scheduler and facade only ever see the [`CostModel`] trait: an
//! injected oracle mapping (arc, meta-state, global flags) to the modes
//! currently unlocked and their effective scores. [`DefaultCostModel`]
//! implements the standard trivialization curve, where cost and risk fall
//! as meta level and discovered knowledge accumulate.

use std::collections::BTreeSet;

use contracts::{ArcDefinition, ArcLoopMeta, ResolutionModeDef, ResolutionOption};

/// Injected cost oracle. `options` must return only modes whose
/// minimum-meta-level and required-flag gates are satisfied, ranked by
/// effective cost ascending (mode id breaking ties).
pub trait CostModel {
    fn options(
        &self,
        def: &ArcDefinition,
        meta: &ArcLoopMeta,
        global_flags: &BTreeSet<String>,
    ) -> Vec<ResolutionOption>;

    /// Cheapest currently unlocked mode, if any.
    fn best_option(
        &self,
        def: &ArcDefinition,
        meta: &ArcLoopMeta,
        global_flags: &BTreeSet<String>,
    ) -> Option<ResolutionOption> {
        self.options(def, meta, global_flags).into_iter().next()
    }

    /// Percentage of the trivialization journey travelled: 100 when the
    /// current best cost has reached the cheapest declared base cost, 0
    /// when no mode is unlocked yet.
    fn trivialization_progress(
        &self,
        def: &ArcDefinition,
        meta: &ArcLoopMeta,
        global_flags: &BTreeSet<String>,
    ) -> i64 {
        let Some(best) = self.best_option(def, meta, global_flags) else {
            return 0;
        };
        let Some(cheapest_declared) = def.resolution.modes.iter().map(|m| m.base_cost).min()
        else {
            return 0;
        };
        if best.cost <= cheapest_declared.max(1) {
            return 100;
        }
        (cheapest_declared.max(1) * 100 / best.cost.max(1)).clamp(0, 100)
    }

    /// Whether the arc has become trivial: best cost below the threshold.
    fn is_trivial(
        &self,
        def: &ArcDefinition,
        meta: &ArcLoopMeta,
        global_flags: &BTreeSet<String>,
        threshold: i64,
    ) -> bool {
        self.best_option(def, meta, global_flags)
            .is_some_and(|o| o.cost < threshold)
    }
}

/// Standard trivialization curve. Discounts are deliberately coarse
/// integer percentages so scores stay deterministic and explainable.
#[derive(Debug, Clone)]
pub struct DefaultCostModel {
    /// Cost discount percent per meta-level rank.
    pub meta_discount_pct: i64,
    /// Cost discount percent per arc knowledge flag present globally.
    pub flag_discount_pct: i64,
    /// Total discount never exceeds this.
    pub max_discount_pct: i64,
    /// Risk reduction per meta-level rank.
    pub risk_relief_per_rank: i64,
}

impl Default for DefaultCostModel {
    fn default() -> Self {
        Self {
            meta_discount_pct: 12,
            flag_discount_pct: 5,
            max_discount_pct: 80,
            risk_relief_per_rank: 10,
        }
    }
}

impl DefaultCostModel {
    fn unlocked(
        mode: &ResolutionModeDef,
        meta: &ArcLoopMeta,
        global_flags: &BTreeSet<String>,
    ) -> bool {
        meta.meta_level >= mode.min_meta_level && mode.required_flags.is_subset(global_flags)
    }

    fn effective(
        &self,
        def: &ArcDefinition,
        mode: &ResolutionModeDef,
        meta: &ArcLoopMeta,
        global_flags: &BTreeSet<String>,
    ) -> ResolutionOption {
        let known_arc_flags = def
            .knowledge_flags
            .iter()
            .filter(|f| global_flags.contains(*f))
            .count() as i64;
        let discount = (i64::from(meta.meta_level.rank()) * self.meta_discount_pct
            + known_arc_flags * self.flag_discount_pct)
            .min(self.max_discount_pct);
        let cost = (mode.base_cost * (100 - discount) / 100).max(1);
        let risk = (mode.base_risk
            - i64::from(meta.meta_level.rank()) * self.risk_relief_per_rank
            - known_arc_flags)
            .clamp(0, 100);

        ResolutionOption {
            arc_id: def.arc_id.clone(),
            mode_id: mode.mode_id.clone(),
            cost,
            risk,
            time_slots: mode.time_slots.clone(),
            locations: mode.locations.clone(),
        }
    }
}

impl CostModel for DefaultCostModel {
    fn options(
        &self,
        def: &ArcDefinition,
        meta: &ArcLoopMeta,
        global_flags: &BTreeSet<String>,
    ) -> Vec<ResolutionOption> {
        let mut options: Vec<ResolutionOption> = def
            .resolution
            .modes
            .iter()
            .filter(|mode| Self::unlocked(mode, meta, global_flags))
            .map(|mode| self.effective(def, mode, meta, global_flags))
            .collect();
        options.sort_by(|a, b| a.cost.cmp(&b.cost).then_with(|| a.mode_id.cmp(&b.mode_id)));
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::cafe_arc;
    use contracts::MetaLevel;

    fn meta_at(level: MetaLevel) -> ArcLoopMeta {
        ArcLoopMeta {
            meta_level: level,
            ..ArcLoopMeta::default()
        }
    }

    #[test]
    fn locked_modes_are_not_offered() {
        let def = cafe_arc("arc_cafe");
        let model = DefaultCostModel::default();
        let options = model.options(&def, &meta_at(MetaLevel::Untouched), &BTreeSet::new());
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].mode_id, "befriend");
    }

    #[test]
    fn flag_gate_holds_even_at_high_meta_level() {
        let def = cafe_arc("arc_cafe");
        let model = DefaultCostModel::default();
        // MechanicKnown but the required flag is missing globally.
        let options = model.options(&def, &meta_at(MetaLevel::MechanicKnown), &BTreeSet::new());
        assert!(options.iter().all(|o| o.mode_id != "shortcut"));

        let flags: BTreeSet<String> = ["cafe_mechanic_understood".to_string()].into();
        let options = model.options(&def, &meta_at(MetaLevel::MechanicKnown), &flags);
        assert!(options.iter().any(|o| o.mode_id == "shortcut"));
    }

    #[test]
    fn cost_falls_as_meta_level_rises() {
        let def = cafe_arc("arc_cafe");
        let model = DefaultCostModel::default();
        let flags = BTreeSet::new();
        let mut previous = i64::MAX;
        for level in [
            MetaLevel::Untouched,
            MetaLevel::Noticed,
            MetaLevel::Explored,
            MetaLevel::MechanicKnown,
            MetaLevel::OptimalPlanFound,
        ] {
            let best = model.best_option(&def, &meta_at(level), &flags).unwrap();
            assert!(best.cost <= previous, "cost rose at {level:?}");
            previous = best.cost;
        }
    }

    #[test]
    fn risk_is_clamped_to_valid_range() {
        let def = cafe_arc("arc_cafe");
        let model = DefaultCostModel::default();
        let flags: BTreeSet<String> = def.knowledge_flags.iter().cloned().collect();
        for level in [MetaLevel::Untouched, MetaLevel::OptimalPlanFound] {
            for option in model.options(&def, &meta_at(level), &flags) {
                assert!((0..=100).contains(&option.risk));
            }
        }
    }

    #[test]
    fn trivialization_progress_reaches_100_at_the_declared_optimum() {
        let def = cafe_arc("arc_cafe");
        let model = DefaultCostModel::default();
        let flags: BTreeSet<String> = def.knowledge_flags.iter().cloned().collect();

        let early = model.trivialization_progress(&def, &meta_at(MetaLevel::Untouched), &flags);
        let late =
            model.trivialization_progress(&def, &meta_at(MetaLevel::OptimalPlanFound), &flags);
        assert!(late >= early);
        assert_eq!(late, 100);
    }

    #[test]
    fn is_trivial_uses_the_threshold() {
        let def = cafe_arc("arc_cafe");
        let model = DefaultCostModel::default();
        let flags: BTreeSet<String> = def.knowledge_flags.iter().cloned().collect();
        assert!(!model.is_trivial(&def, &meta_at(MetaLevel::Untouched), &BTreeSet::new(), 10));
        assert!(model.is_trivial(&def, &meta_at(MetaLevel::OptimalPlanFound), &flags, 10));
    }

    #[test]
    fn options_are_ranked_by_cost() {
        let def = cafe_arc("arc_cafe");
        let model = DefaultCostModel::default();
        let flags: BTreeSet<String> = def.knowledge_flags.iter().cloned().collect();
        let options = model.options(&def, &meta_at(MetaLevel::OptimalPlanFound), &flags);
        assert_eq!(options.len(), 2);
        assert!(options[0].cost <= options[1].cost);
        assert_eq!(options[0].mode_id, "shortcut");
    }
}
