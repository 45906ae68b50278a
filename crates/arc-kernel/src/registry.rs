//! Definition store: registration with structural validation, removal,
//! and indexed/compound lookup over immutable arc definitions.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use contracts::{ArcDefinition, ArcTier, LooperClass, Resolubility};

use crate::error::{EngineError, ValidationReport};

/// Compound lookup filter. Filters combine with AND; the multi-value
/// `tags` filter matches when any listed tag is present (OR within).
#[derive(Debug, Clone, Default)]
pub struct ArcQuery {
    pub tier: Option<ArcTier>,
    pub looper_class: Option<LooperClass>,
    pub resolubility: Option<Resolubility>,
    pub tags: Vec<String>,
}

impl ArcQuery {
    fn matches(&self, def: &ArcDefinition) -> bool {
        if let Some(tier) = self.tier {
            if def.tier != tier {
                return false;
            }
        }
        if let Some(class) = self.looper_class {
            if def.looper_class != class {
                return false;
            }
        }
        if let Some(res) = self.resolubility {
            if def.resolubility != res {
                return false;
            }
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| def.tags.contains(t)) {
            return false;
        }
        true
    }
}

/// Holds every registered arc definition. Registration is all-or-nothing
/// per arc: a definition with any validation error is not stored.
#[derive(Debug, Default)]
pub struct ArcRegistry {
    arcs: BTreeMap<String, ArcDefinition>,
}

impl ArcRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store a definition. Returns the validation report so
    /// callers see warnings even on success. `skip_validation` stores the
    /// definition as-is (author tooling that validates separately).
    pub fn register(
        &mut self,
        def: ArcDefinition,
        skip_validation: bool,
    ) -> Result<ValidationReport, EngineError> {
        if self.arcs.contains_key(&def.arc_id) {
            return Err(EngineError::DuplicateArc(def.arc_id));
        }
        let report = if skip_validation {
            ValidationReport::new(&def.arc_id)
        } else {
            let report = validate_definition(&def);
            if !report.is_valid() {
                return Err(EngineError::ValidationFailed(report));
            }
            report
        };
        for warning in &report.warnings {
            warn!(arc_id = %def.arc_id, warning, "arc registered with warning");
        }
        debug!(arc_id = %def.arc_id, "arc registered");
        self.arcs.insert(def.arc_id.clone(), def);
        Ok(report)
    }

    pub fn unregister(&mut self, arc_id: &str) -> Result<ArcDefinition, EngineError> {
        self.arcs
            .remove(arc_id)
            .ok_or_else(|| EngineError::UnknownArc(arc_id.to_string()))
    }

    pub fn get(&self, arc_id: &str) -> Option<&ArcDefinition> {
        self.arcs.get(arc_id)
    }

    pub fn contains(&self, arc_id: &str) -> bool {
        self.arcs.contains_key(arc_id)
    }

    pub fn len(&self) -> usize {
        self.arcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arcs.is_empty()
    }

    pub fn arc_ids(&self) -> impl Iterator<Item = &str> {
        self.arcs.keys().map(String::as_str)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ArcDefinition> {
        self.arcs.values()
    }

    pub fn by_tier(&self, tier: ArcTier) -> Vec<&ArcDefinition> {
        self.arcs.values().filter(|d| d.tier == tier).collect()
    }

    pub fn by_looper_class(&self, class: LooperClass) -> Vec<&ArcDefinition> {
        self.arcs
            .values()
            .filter(|d| d.looper_class == class)
            .collect()
    }

    pub fn by_resolubility(&self, res: Resolubility) -> Vec<&ArcDefinition> {
        self.arcs
            .values()
            .filter(|d| d.resolubility == res)
            .collect()
    }

    pub fn by_tag(&self, tag: &str) -> Vec<&ArcDefinition> {
        self.arcs
            .values()
            .filter(|d| d.tags.iter().any(|t| t == tag))
            .collect()
    }

    pub fn query(&self, query: &ArcQuery) -> Vec<&ArcDefinition> {
        self.arcs.values().filter(|d| query.matches(d)).collect()
    }
}

/// Structural validation of one definition. Collects *every* violation
/// rather than stopping at the first.
pub fn validate_definition(def: &ArcDefinition) -> ValidationReport {
    let mut report = ValidationReport::new(&def.arc_id);

    if def.arc_id.is_empty() {
        report.error("arc_id must not be empty");
    }
    if def.states.is_empty() {
        report.error("arc declares no states");
    }

    let mut seen = std::collections::BTreeSet::new();
    for state in &def.states {
        if !seen.insert(state.state_id.as_str()) {
            report.error(format!("state {} declared more than once", state.state_id));
        }
        if state.terminal && state.outcome.is_none() {
            report.warning(format!(
                "terminal state {} has no outcome category",
                state.state_id
            ));
        }
        if !state.terminal && state.outcome.is_some() {
            report.warning(format!(
                "non-terminal state {} carries an outcome category",
                state.state_id
            ));
        }
    }

    if def.state(&def.initial_state).is_none() {
        report.error(format!(
            "initial state {} is not a declared state",
            def.initial_state
        ));
    }
    if !def.states.iter().any(|s| s.terminal) {
        report.warning("arc has no terminal state; it can never resolve");
    }

    for (idx, transition) in def.transitions.iter().enumerate() {
        if def.state(&transition.from).is_none() {
            report.error(format!(
                "transition {idx} starts at undeclared state {}",
                transition.from
            ));
        }
        if def.state(&transition.to).is_none() {
            report.error(format!(
                "transition {idx} targets undeclared state {}",
                transition.to
            ));
        }
        if let Some(p) = transition.trigger.probability {
            if !(0.0..=1.0).contains(&p) {
                report.error(format!(
                    "transition {idx} probability {p} is outside [0, 1]"
                ));
            }
        }
        if let Some(c) = transition.trigger.min_confidence {
            if !(0.0..=1.0).contains(&c) {
                report.error(format!(
                    "transition {idx} confidence threshold {c} is outside [0, 1]"
                ));
            }
        }
        for flag in &transition.grants_flags {
            if !def.knowledge_flags.contains(flag) {
                report.warning(format!(
                    "transition {idx} grants flag {flag} not listed in knowledge_flags"
                ));
            }
        }
    }

    if def.resolution.modes.is_empty() {
        report.error("resolution profile declares no modes");
    }
    if def.mode(&def.resolution.default_mode).is_none() {
        report.error(format!(
            "default resolution mode {} is not declared",
            def.resolution.default_mode
        ));
    }
    let mut mode_ids = std::collections::BTreeSet::new();
    for mode in &def.resolution.modes {
        if !mode_ids.insert(mode.mode_id.as_str()) {
            report.error(format!("resolution mode {} declared twice", mode.mode_id));
        }
        if !(0..=100).contains(&mode.base_risk) {
            report.error(format!(
                "resolution mode {} risk {} is outside [0, 100]",
                mode.mode_id, mode.base_risk
            ));
        }
        if mode.base_cost < 0 {
            report.error(format!(
                "resolution mode {} has negative cost {}",
                mode.mode_id, mode.base_cost
            ));
        }
        if mode.time_slots.is_empty() {
            report.warning(format!(
                "resolution mode {} occupies no time slots",
                mode.mode_id
            ));
        }
    }

    match (&def.looper, def.looper_class) {
        (Some(constraint), _) => {
            if constraint.required_observations.is_empty() {
                report.error("looper constraint requires no observations");
            } else if constraint.declared_cap >= constraint.required_observations.len() {
                report.error(format!(
                    "declared per-loop cap {} must be below the {} required observations \
                     for the arc to be looper-only",
                    constraint.declared_cap,
                    constraint.required_observations.len()
                ));
            }
        }
        (None, LooperClass::LooperOnly) => {
            report.warning("arc is classed looper-only but declares no looper constraint");
        }
        (None, _) => {}
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{cafe_arc, looper_arc};
    use contracts::{ArcStateDef, LooperConstraint, TransitionDef, TriggerSpec};

    #[test]
    fn register_and_lookup_round_trip() {
        let mut registry = ArcRegistry::new();
        let report = registry.register(cafe_arc("arc_cafe"), false).unwrap();
        assert!(report.is_valid());
        assert!(registry.contains("arc_cafe"));
        assert_eq!(registry.get("arc_cafe").unwrap().arc_id, "arc_cafe");
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = ArcRegistry::new();
        registry.register(cafe_arc("arc_cafe"), false).unwrap();
        let err = registry.register(cafe_arc("arc_cafe"), false).unwrap_err();
        assert_eq!(err, EngineError::DuplicateArc("arc_cafe".to_string()));
    }

    #[test]
    fn validation_lists_every_error_not_just_the_first() {
        let mut def = cafe_arc("arc_broken");
        def.initial_state = "NOWHERE".to_string();
        def.transitions.push(TransitionDef {
            from: "GHOST".to_string(),
            to: "ALSO_GHOST".to_string(),
            trigger: TriggerSpec {
                probability: Some(1.5),
                ..TriggerSpec::default()
            },
            priority: 0,
            grants_flags: vec![],
        });
        def.resolution.default_mode = "missing_mode".to_string();

        let mut registry = ArcRegistry::new();
        let err = registry.register(def, false).unwrap_err();
        match err {
            EngineError::ValidationFailed(report) => {
                assert!(report.errors.len() >= 4, "got: {:?}", report.errors);
            }
            other => panic!("expected ValidationFailed, got {other:?}"),
        }
    }

    #[test]
    fn skip_validation_stores_a_broken_definition() {
        let mut def = cafe_arc("arc_broken");
        def.initial_state = "NOWHERE".to_string();
        let mut registry = ArcRegistry::new();
        registry.register(def, true).unwrap();
        assert!(registry.contains("arc_broken"));
    }

    #[test]
    fn looper_cap_must_understate_required_observations() {
        let mut def = looper_arc("arc_looper");
        if let Some(constraint) = def.looper.as_mut() {
            constraint.declared_cap = constraint.required_observations.len();
        }
        let report = validate_definition(&def);
        assert!(!report.is_valid());
    }

    #[test]
    fn looper_only_class_without_constraint_warns() {
        let mut def = cafe_arc("arc_tagged");
        def.looper_class = contracts::LooperClass::LooperOnly;
        def.looper = None;
        let report = validate_definition(&def);
        assert!(report.is_valid());
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("looper constraint")));
    }

    #[test]
    fn terminal_state_without_outcome_warns() {
        let mut def = cafe_arc("arc_warned");
        def.states.push(ArcStateDef {
            state_id: "DANGLING".to_string(),
            terminal: true,
            outcome: None,
        });
        let report = validate_definition(&def);
        assert!(report.is_valid());
        assert!(report.warnings.iter().any(|w| w.contains("DANGLING")));
    }

    #[test]
    fn compound_query_ands_filters_and_ors_tags() {
        let mut registry = ArcRegistry::new();
        let mut a = cafe_arc("arc_a");
        a.tags = vec!["romance".to_string()];
        let mut b = looper_arc("arc_b");
        b.tags = vec!["mystery".to_string(), "romance".to_string()];
        registry.register(a, false).unwrap();
        registry.register(b, false).unwrap();

        let query = ArcQuery {
            looper_class: Some(contracts::LooperClass::LooperOnly),
            tags: vec!["romance".to_string(), "heist".to_string()],
            ..ArcQuery::default()
        };
        let hits = registry.query(&query);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].arc_id, "arc_b");
    }

    #[test]
    fn unregister_unknown_arc_fails() {
        let mut registry = ArcRegistry::new();
        assert_eq!(
            registry.unregister("nope").unwrap_err(),
            EngineError::UnknownArc("nope".to_string())
        );
    }

    #[test]
    fn empty_looper_observations_is_an_error() {
        let mut def = looper_arc("arc_looper");
        def.looper = Some(LooperConstraint {
            required_observations: vec![],
            declared_cap: 0,
            resolution_flags: Default::default(),
        });
        assert!(!validate_definition(&def).is_valid());
    }
}
