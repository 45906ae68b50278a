//! End-to-end scenarios through the public `LoopEngine` surface.

use std::collections::{BTreeMap, BTreeSet};

use contracts::{
    ActionInput, ArcDefinition, ArcOutcome, ArcStateDef, ArcTier, ConflictKind, ConflictRule,
    EngineConfig, LooperClass, LooperConstraint, MetaLevel, Resolubility, ResolutionModeDef,
    ResolutionProfile, TimeWindow, TransitionDef, TriggerSpec,
};
use arc_kernel::LoopEngine;

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn action(action: &str, slot: &str, location: &str) -> ActionInput {
    ActionInput {
        action: action.to_string(),
        time_slot: slot.to_string(),
        location: location.to_string(),
        confidence: None,
    }
}

/// Arc from the engine's canonical scenario: UNSEEN -> NOTICED at exactly
/// 08:00/CAFE, then NOTICED -> GOOD/AWKWARD on talk/insult.
fn cafe_arc(arc_id: &str) -> ArcDefinition {
    ArcDefinition {
        arc_id: arc_id.to_string(),
        title: "Stranger at the cafe".to_string(),
        tier: ArcTier::Minor,
        importance: 5,
        tags: vec![],
        looper_class: LooperClass::SingleLoop,
        resolubility: Resolubility::Resolvable,
        states: vec![
            ArcStateDef {
                state_id: "UNSEEN".to_string(),
                terminal: false,
                outcome: None,
            },
            ArcStateDef {
                state_id: "NOTICED".to_string(),
                terminal: false,
                outcome: None,
            },
            ArcStateDef {
                state_id: "GOOD".to_string(),
                terminal: true,
                outcome: Some(ArcOutcome::Good),
            },
            ArcStateDef {
                state_id: "AWKWARD".to_string(),
                terminal: true,
                outcome: Some(ArcOutcome::Bad),
            },
        ],
        initial_state: "UNSEEN".to_string(),
        transitions: vec![
            TransitionDef {
                from: "UNSEEN".to_string(),
                to: "NOTICED".to_string(),
                trigger: TriggerSpec {
                    required_slots: set(&["08:00"]),
                    required_locations: set(&["CAFE"]),
                    ..TriggerSpec::default()
                },
                priority: 0,
                grants_flags: vec!["cafe_meeting_seen".to_string()],
            },
            TransitionDef {
                from: "NOTICED".to_string(),
                to: "GOOD".to_string(),
                trigger: TriggerSpec {
                    actions: set(&["talk"]),
                    ..TriggerSpec::default()
                },
                priority: 0,
                grants_flags: vec!["cafe_friend_made".to_string()],
            },
            TransitionDef {
                from: "NOTICED".to_string(),
                to: "AWKWARD".to_string(),
                trigger: TriggerSpec {
                    actions: set(&["insult"]),
                    ..TriggerSpec::default()
                },
                priority: 0,
                grants_flags: vec![],
            },
        ],
        time_windows: vec![],
        resolution: ResolutionProfile {
            modes: vec![ResolutionModeDef {
                mode_id: "befriend".to_string(),
                min_meta_level: MetaLevel::Untouched,
                required_flags: BTreeSet::new(),
                base_cost: 40,
                base_risk: 30,
                time_slots: set(&["08:00"]),
                locations: set(&["CAFE"]),
            }],
            default_mode: "befriend".to_string(),
        },
        looper: None,
        knowledge_flags: vec![
            "cafe_meeting_seen".to_string(),
            "cafe_friend_made".to_string(),
        ],
    }
}

/// Looper-only arc: three observations all pinned to 08:00 at mutually
/// exclusive spots, so at most one is collectible per loop.
fn vault_arc(arc_id: &str) -> ArcDefinition {
    ArcDefinition {
        arc_id: arc_id.to_string(),
        title: "The vault combination".to_string(),
        tier: ArcTier::Major,
        importance: 8,
        tags: vec![],
        looper_class: LooperClass::LooperOnly,
        resolubility: Resolubility::Conditional,
        states: vec![
            ArcStateDef {
                state_id: "HIDDEN".to_string(),
                terminal: false,
                outcome: None,
            },
            ArcStateDef {
                state_id: "SOLVED".to_string(),
                terminal: true,
                outcome: Some(ArcOutcome::Good),
            },
        ],
        initial_state: "HIDDEN".to_string(),
        transitions: vec![TransitionDef {
            from: "HIDDEN".to_string(),
            to: "SOLVED".to_string(),
            trigger: TriggerSpec {
                required_flags: set(&["vault_combo_known"]),
                ..TriggerSpec::default()
            },
            priority: 0,
            grants_flags: vec![],
        }],
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
                slots: vec!["08:00".to_string()],
                locations: vec!["BANK".to_string()],
            },
        ],
        resolution: ResolutionProfile {
            modes: vec![ResolutionModeDef {
                mode_id: "crack".to_string(),
                min_meta_level: MetaLevel::Explored,
                required_flags: set(&["vault_combo_known"]),
                base_cost: 60,
                base_risk: 70,
                time_slots: set(&["08:00"]),
                locations: set(&["BANK"]),
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
            resolution_flags: set(&["vault_combo_known"]),
        }),
        knowledge_flags: vec!["vault_combo_known".to_string()],
    }
}

/// Arc with one mode pinned to the given slots.
fn slotted_arc(
    arc_id: &str,
    tier: ArcTier,
    importance: i64,
    cost: i64,
    slots: &[&str],
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
            base_cost: cost,
            base_risk: 20,
            time_slots: set(slots),
            locations: set(&[location]),
        }],
        default_mode: "direct".to_string(),
    };
    def
}

#[test]
fn scenario_cafe_arc_advances_only_on_the_exact_context() {
    let mut engine = LoopEngine::new(EngineConfig::default());
    engine.register_arc(cafe_arc("arc_cafe")).unwrap();
    engine.initialize_loop("loop_1", None).unwrap();

    // Wrong slot: no movement.
    let results = engine.step_arcs(&action("wander", "09:00", "CAFE")).unwrap();
    assert!(!results[0].changed);

    // Exact slot and location: UNSEEN -> NOTICED.
    let results = engine.step_arcs(&action("wander", "08:00", "CAFE")).unwrap();
    assert!(results[0].changed);
    assert_eq!(results[0].new_state.as_deref(), Some("NOTICED"));
}

#[test]
fn scenario_looper_only_vault_needs_at_least_three_loops() {
    let mut engine = LoopEngine::new(EngineConfig::default());
    engine.register_arc(vault_arc("arc_vault")).unwrap();

    let verification = engine.verify_looper_only("arc_vault").unwrap();
    assert_eq!(verification.true_max_per_loop, 1);
    assert!(verification.enforced);

    let statuses = engine.looper_status_all();
    assert_eq!(statuses.len(), 1);
    let status = &statuses[0];
    assert_eq!(status.true_max_per_loop, 1);
    assert!(status.min_loops_to_resolve >= 3);
    assert!(!status.resolvable_this_loop);
}

#[test]
fn scenario_same_slot_proposal_is_infeasible_with_a_time_conflict() {
    let mut engine = LoopEngine::new(EngineConfig::default());
    engine
        .register_arc(slotted_arc(
            "arc_a",
            ArcTier::Minor,
            5,
            20,
            &["08:00"],
            "CAFE",
        ))
        .unwrap();
    engine
        .register_arc(slotted_arc(
            "arc_b",
            ArcTier::Minor,
            5,
            20,
            &["08:00"],
            "PLAZA",
        ))
        .unwrap();

    let proposal: BTreeMap<String, String> = [
        ("arc_a".to_string(), "direct".to_string()),
        ("arc_b".to_string(), "direct".to_string()),
    ]
    .into();
    let report = engine
        .check_feasibility(&proposal, &BTreeSet::new())
        .unwrap();

    assert!(!report.feasible);
    assert!(report
        .hard_conflicts()
        .any(|c| c.kind == ConflictKind::Time));
}

#[test]
fn scenario_greedy_solver_picks_the_three_compatible_arcs() {
    let mut engine = LoopEngine::new(EngineConfig {
        max_arcs_per_loop: 5,
        ..EngineConfig::default()
    });
    engine
        .register_arc(slotted_arc("arc_a", ArcTier::Core, 9, 10, &["08:00"], "CAFE"))
        .unwrap();
    engine
        .register_arc(slotted_arc("arc_b", ArcTier::Core, 9, 10, &["10:00"], "PLAZA"))
        .unwrap();
    engine
        .register_arc(slotted_arc("arc_c", ArcTier::Core, 9, 10, &["14:00"], "DOCKS"))
        .unwrap();
    engine
        .register_arc(slotted_arc("arc_d", ArcTier::Ambient, 1, 90, &["16:00"], "BANK"))
        .unwrap();
    engine
        .register_arc(slotted_arc("arc_e", ArcTier::Ambient, 1, 90, &["18:00"], "BANK"))
        .unwrap();
    engine.add_conflict_rule(ConflictRule {
        first_arc: "arc_d".to_string(),
        second_arc: "arc_a".to_string(),
        category: "same_npc".to_string(),
        mutually_exclusive: true,
    });
    engine.add_conflict_rule(ConflictRule {
        first_arc: "arc_e".to_string(),
        second_arc: "arc_c".to_string(),
        category: "same_npc".to_string(),
        mutually_exclusive: true,
    });

    let candidates: BTreeMap<String, String> = ["arc_a", "arc_b", "arc_c", "arc_d", "arc_e"]
        .iter()
        .map(|a| (a.to_string(), "direct".to_string()))
        .collect();
    let result = engine
        .compute_optimal_arc_set(&candidates, &BTreeSet::new())
        .unwrap();

    let selected: Vec<&String> = result.selected.keys().collect();
    assert_eq!(selected, vec!["arc_a", "arc_b", "arc_c"]);
    assert_eq!(result.excluded.len(), 2);
    assert!(result.excluded.iter().all(|e| !e.reason.is_empty()));
}

#[test]
fn vault_arc_resolves_only_once_the_combo_flag_is_known() {
    let mut engine = LoopEngine::new(EngineConfig::default());
    engine.register_arc(vault_arc("arc_vault")).unwrap();

    // The combo is unknown: the arc never advances.
    engine.initialize_loop("loop_1", None).unwrap();
    let results = engine.step_arcs(&action("observe", "08:00", "BANK")).unwrap();
    assert!(!results[0].changed);
    let report = engine.finalize_loop().unwrap();
    assert_eq!(report.final_states["arc_vault"], "HIDDEN");
    assert!(report.outcomes.is_empty());

    // Earlier loops discovered the combo elsewhere; restore that state.
    let mut snapshot = engine.export_state();
    snapshot.knowledge_flags.insert("vault_combo_known".to_string());
    engine.import_state(snapshot).unwrap();

    engine.initialize_loop("loop_2", None).unwrap();
    let results = engine.step_arcs(&action("observe", "08:00", "BANK")).unwrap();
    assert!(results[0].changed);
    let report = engine.finalize_loop().unwrap();
    assert_eq!(report.final_states["arc_vault"], "SOLVED");
    assert_eq!(report.outcomes["arc_vault"], ArcOutcome::Good);
}

#[test]
fn schedule_marks_main_arc_slots() {
    let mut engine = LoopEngine::new(EngineConfig::default());
    engine
        .register_arc(slotted_arc(
            "arc_a",
            ArcTier::Minor,
            5,
            20,
            &["14:00"],
            "CAFE",
        ))
        .unwrap();

    let proposal: BTreeMap<String, String> =
        [("arc_a".to_string(), "direct".to_string())].into();
    let main = set(&["09:00", "09:30"]);
    let schedule = engine.build_schedule(&proposal, &main).unwrap();

    assert_eq!(schedule.entries.len(), 3);
    assert!(schedule.entries[0].main_arc);
    assert!(schedule.entries[1].main_arc);
    assert!(!schedule.entries[2].main_arc);
    assert_eq!(schedule.total_minutes, 90);
}

#[test]
fn registration_warnings_are_data_not_errors() {
    let mut engine = LoopEngine::new(EngineConfig::default());
    let mut def = cafe_arc("arc_warned");
    def.looper_class = LooperClass::LooperOnly; // no constraint object
    let report = engine.register_arc(def).unwrap();
    assert!(report.is_valid());
    assert!(!report.warnings.is_empty());
    assert!(engine.registry().contains("arc_warned"));
}
