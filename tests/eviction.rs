//! Integration tests for bounded key tracking.

use slack_patrol::infrastructure::mocks::MockClock;
use slack_patrol::{
    ActivityKey, CooldownKind, Identity, MessageEvent, RuleEngineBuilder, RuleName, RuleToggles,
};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_cooldown_map_stays_bounded() {
    let clock = MockClock::new(0);
    let engine = RuleEngineBuilder::new()
        .with_clock(Arc::new(clock.clone()))
        .with_max_entries(10)
        .build()
        .unwrap();

    for i in 0..50 {
        clock.advance(Duration::from_millis(1));
        engine.evaluate(&MessageEvent::new(format!("U{}", i), format!("C{}", i), "hello"));
    }

    assert!(engine.cooldowns().len() <= 10);
    assert!(engine.metrics().entries_evicted() >= 40);
}

#[test]
fn test_evicted_cooldown_reads_as_never_warned() {
    let clock = MockClock::new(0);
    let engine = RuleEngineBuilder::new()
        .with_clock(Arc::new(clock.clone()))
        .with_max_entries(2)
        .build()
        .unwrap();

    engine.evaluate(&MessageEvent::new("U1", "C1", "hello"));
    for i in 2..6 {
        clock.advance(Duration::from_millis(1));
        engine.evaluate(&MessageEvent::new(format!("U{}", i), format!("C{}", i), "hello"));
    }

    let u1 = Identity::from("U1");
    assert_eq!(engine.cooldowns().last_warned_at(CooldownKind::User, &u1), None);

    // U1 gets warned again well inside the original cooldown
    clock.advance(Duration::from_secs(1));
    let outcome = engine.evaluate(&MessageEvent::new("U1", "C1", "hello"));
    assert_eq!(outcome.warnings().count(), 1);
}

#[test]
fn test_activity_windows_bounded_and_swept() {
    let clock = MockClock::new(0);
    let engine = RuleEngineBuilder::new()
        .with_clock(Arc::new(clock.clone()))
        .with_rules(RuleToggles {
            flood: true,
            ..RuleToggles::none()
        })
        .with_flood_window(Duration::from_secs(10))
        .with_max_entries(5)
        .build()
        .unwrap();

    for i in 0..20 {
        clock.advance(Duration::from_millis(1));
        let outcome = engine.evaluate(&MessageEvent::new(format!("U{}", i), "C1", "x"));
        assert!(!outcome.decision(RuleName::Flood).unwrap().matched);
    }
    assert!(engine.windows().len() <= 5);

    clock.advance(Duration::from_secs(11));
    engine.sweep_windows();
    assert!(engine.windows().is_empty());
    assert_eq!(engine.windows().count(&ActivityKey::new("U19", "C1")), 0);
}
