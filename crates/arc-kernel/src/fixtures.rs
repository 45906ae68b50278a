//! Shared test fixtures: small hand-built arc definitions used across the
//! kernel's unit tests.

use std::collections::BTreeSet;

use contracts::{
    ArcDefinition, ArcOutcome, ArcStateDef, ArcTier, LooperClass, LooperConstraint, MetaLevel,
    Resolubility, ResolutionModeDef, ResolutionProfile, TimeWindow, TransitionDef, TriggerSpec,
};

fn slots(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub(crate) fn state(id: &str) -> ArcStateDef {
    ArcStateDef {
        state_id: id.to_string(),
        terminal: false,
        outcome: None,
    }
}

pub(crate) fn terminal_state(id: &str, outcome: ArcOutcome) -> ArcStateDef {
    ArcStateDef {
        state_id: id.to_string(),
        terminal: true,
        outcome: Some(outcome),
    }
}

/// A small social arc: notice someone at the cafe at 08:00, then either
/// befriend or alienate them.
pub(crate) fn cafe_arc(arc_id: &str) -> ArcDefinition {
    ArcDefinition {
        arc_id: arc_id.to_string(),
        title: "Stranger at the cafe".to_string(),
        tier: ArcTier::Minor,
        importance: 5,
        tags: vec![],
        looper_class: LooperClass::SingleLoop,
        resolubility: Resolubility::Resolvable,
        states: vec![
            state("UNSEEN"),
            state("NOTICED"),
            terminal_state("GOOD", ArcOutcome::Good),
            terminal_state("AWKWARD", ArcOutcome::Bad),
        ],
        initial_state: "UNSEEN".to_string(),
        transitions: vec![
            TransitionDef {
                from: "UNSEEN".to_string(),
                to: "NOTICED".to_string(),
                trigger: TriggerSpec {
                    required_slots: slots(&["08:00"]),
                    required_locations: slots(&["CAFE"]),
                    ..TriggerSpec::default()
                },
                priority: 0,
                grants_flags: vec!["cafe_meeting_seen".to_string()],
            },
            TransitionDef {
                from: "NOTICED".to_string(),
                to: "GOOD".to_string(),
                trigger: TriggerSpec {
                    actions: slots(&["talk"]),
                    ..TriggerSpec::default()
                },
                priority: 0,
                grants_flags: vec!["cafe_friend_made".to_string()],
            },
            TransitionDef {
                from: "NOTICED".to_string(),
                to: "AWKWARD".to_string(),
                trigger: TriggerSpec {
                    actions: slots(&["insult"]),
                    ..TriggerSpec::default()
                },
                priority: 0,
                grants_flags: vec![],
            },
        ],
        time_windows: vec![TimeWindow {
            window_id: "morning_cafe".to_string(),
            slots: vec!["08:00".to_string(), "08:30".to_string()],
            locations: vec!["CAFE".to_string()],
        }],
        resolution: ResolutionProfile {
            modes: vec![
                ResolutionModeDef {
                    mode_id: "befriend".to_string(),
                    min_meta_level: MetaLevel::Untouched,
                    required_flags: BTreeSet::new(),
                    base_cost: 40,
                    base_risk: 30,
                    time_slots: slots(&["08:00", "08:30"]),
                    locations: slots(&["CAFE"]),
                },
                ResolutionModeDef {
                    mode_id: "shortcut".to_string(),
                    min_meta_level: MetaLevel::MechanicKnown,
                    required_flags: slots(&["cafe_mechanic_understood"]),
                    base_cost: 10,
                    base_risk: 5,
                    time_slots: slots(&["08:00"]),
                    locations: slots(&["CAFE"]),
                },
            ],
            default_mode: "befriend".to_string(),
        },
        looper: None,
        knowledge_flags: vec![
            "cafe_meeting_seen".to_string(),
            "cafe_friend_made".to_string(),
            "cafe_mechanic_understood".to_string(),
        ],
    }
}

/// A looper-only vault arc: three observations whose slots all collide
/// within one loop, so at most one is collectible per pass.
pub(crate) fn looper_arc(arc_id: &str) -> ArcDefinition {
    ArcDefinition {
        arc_id: arc_id.to_string(),
        title: "The vault combination".to_string(),
        tier: ArcTier::Major,
        importance: 8,
        tags: vec![],
        looper_class: LooperClass::LooperOnly,
        resolubility: Resolubility::Conditional,
        states: vec![
            state("HIDDEN"),
            state("PARTIAL"),
            terminal_state("SOLVED", ArcOutcome::Good),
        ],
        initial_state: "HIDDEN".to_string(),
        transitions: vec![
            TransitionDef {
                from: "HIDDEN".to_string(),
                to: "PARTIAL".to_string(),
                trigger: TriggerSpec {
                    actions: slots(&["observe"]),
                    ..TriggerSpec::default()
                },
                priority: 0,
                grants_flags: vec!["obs_dial_left".to_string()],
            },
            TransitionDef {
                from: "PARTIAL".to_string(),
                to: "SOLVED".to_string(),
                trigger: TriggerSpec {
                    required_flags: slots(&["vault_combo_known"]),
                    ..TriggerSpec::default()
                },
                priority: 0,
                grants_flags: vec![],
            },
        ],
        time_windows: vec![
            TimeWindow {
                window_id: "obs_dial_left".to_string(),
                slots: vec!["08:00".to_string()],
                locations: vec!["BANK".to_string()],
            },
            TimeWindow {
                window_id: "obs_dial_right".to_string(),
                slots: vec!["08:00".to_string()],
                locations: vec!["BANK".to_string()],
            },
            TimeWindow {
                window_id: "obs_guard_rota".to_string(),
                slots: vec!["08:30".to_string()],
                locations: vec!["BANK".to_string()],
            },
        ],
        resolution: ResolutionProfile {
            modes: vec![ResolutionModeDef {
                mode_id: "crack".to_string(),
                min_meta_level: MetaLevel::Explored,
                required_flags: slots(&["vault_combo_known"]),
                base_cost: 60,
                base_risk: 70,
                time_slots: slots(&["08:00"]),
                locations: slots(&["BANK"]),
            }],
            default_mode: "crack".to_string(),
        },
        looper: Some(LooperConstraint {
            required_observations: vec![
                "obs_dial_left".to_string(),
                "obs_dial_right".to_string(),
                "obs_guard_rota".to_string(),
            ],
            declared_cap: 1,
            resolution_flags: slots(&["vault_combo_known"]),
        }),
        knowledge_flags: vec![
            "obs_dial_left".to_string(),
            "obs_dial_right".to_string(),
            "obs_guard_rota".to_string(),
            "vault_combo_known".to_string(),
        ],
    }
}

/// A schedulable arc with one mode pinned to the given slots and location.
pub(crate) fn slotted_arc(
    arc_id: &str,
    tier: ArcTier,
    importance: i64,
    base_cost: i64,
    mode_slots: &[&str],
    location: &str,
) -> ArcDefinition {
    let mut def = cafe_arc(arc_id);
    def.tier = tier;
    def.importance = importance;
    def.resolution = ResolutionProfile {
        modes: vec![ResolutionModeDef {
            mode_id: "direct".to_string(),
            min_meta_level: MetaLevel::Untouched,
            required_flags: BTreeSet::new(),
            base_cost,
            base_risk: 20,
            time_slots: slots(mode_slots),
            locations: slots(&[location]),
        }],
        default_mode: "direct".to_string(),
    };
    def
}
