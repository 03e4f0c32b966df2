//! Tests for cache boundary planning across turns.

use pretty_assertions::assert_eq;

use tachi::cache::CachePointPlanner;

const CLAUDE: &str = "claude-sonnet-4-20250514";
const LOCAL: &str = "some-local-model";

#[test]
fn boundary_is_monotonic_for_a_supporting_model() {
    let mut planner = CachePointPlanner::new();
    let mut last = 0;
    // History grows turn over turn, then plateaus at the context window.
    for len in [1, 3, 5, 7, 7, 7] {
        let plan = planner.plan(len, CLAUDE);
        let boundary = plan.message_boundary.unwrap();
        assert!(boundary >= last, "boundary {boundary} regressed below {last}");
        last = boundary;
    }
}

#[test]
fn switch_to_unsupported_model_resets_to_none() {
    let mut planner = CachePointPlanner::new();
    planner.plan(5, CLAUDE);
    assert_eq!(planner.last_boundary(), Some(4));

    let plan = planner.plan(6, LOCAL);
    assert_eq!(plan.message_boundary, None);
    assert_eq!(planner.last_boundary(), None);

    // Coming back to a supporting model starts from scratch.
    let plan = planner.plan(7, CLAUDE);
    assert_eq!(plan.message_boundary, Some(6));
}

#[test]
fn field_eligibility_is_independent() {
    let mut planner = CachePointPlanner::new();
    // Nova caches messages and system but not the tool catalog.
    let plan = planner.plan(4, "nova-pro-v1");
    assert_eq!(plan.message_boundary, Some(3));
    assert!(plan.cache_system);
    assert!(!plan.cache_tools);
}

#[test]
fn unsupported_model_still_reports_field_flags() {
    let mut planner = CachePointPlanner::new();
    let plan = planner.plan(4, LOCAL);
    assert_eq!(plan.message_boundary, None);
    assert!(!plan.cache_system);
    assert!(!plan.cache_tools);
}
