//! Integration tests for warning delivery and its log output.

use slack_patrol::infrastructure::builder::{ActivityStorage, CooldownStorage};
use slack_patrol::infrastructure::mocks::{
    MockCaptureLayer, MockClock, RecordingAuditSink, RecordingNotifier,
};
use slack_patrol::{MessageEvent, Moderator, RuleEngineBuilder, RuleName, RuleToggles};
use std::sync::Arc;
use std::time::Duration;
use tracing::subscriber::DefaultGuard;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

fn setup(
    clock: &MockClock,
    notifier: &RecordingNotifier,
    audit: &RecordingAuditSink,
    rules: RuleToggles,
) -> Moderator<CooldownStorage, ActivityStorage> {
    let engine = RuleEngineBuilder::new()
        .with_clock(Arc::new(clock.clone()))
        .with_rules(rules)
        .with_flood_threshold(2)
        .build()
        .unwrap();
    Moderator::new(
        Arc::new(engine),
        Arc::new(notifier.clone()),
        Arc::new(audit.clone()),
    )
}

fn capture_logs(capture: &MockCaptureLayer) -> DefaultGuard {
    tracing::subscriber::set_default(tracing_subscriber::registry().with(capture.clone()))
}

#[tokio::test]
async fn test_warning_sent_is_logged_with_context() {
    let capture = MockCaptureLayer::new();
    let _guard = capture_logs(&capture);

    let clock = MockClock::new(0);
    let notifier = RecordingNotifier::new();
    let audit = RecordingAuditSink::new();
    let moderator = setup(&clock, &notifier, &audit, RuleToggles::all());

    moderator
        .handle(&MessageEvent::new("U1", "C1", "hello").with_ts("1.000100"))
        .await;

    let sent = capture.find(Level::INFO, "warning sent");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].field("rule"), Some("no_mention"));
    assert_eq!(sent[0].field("user"), Some("U1"));
    assert_eq!(sent[0].field("channel"), Some("C1"));
    assert_eq!(sent[0].field("ts"), Some("1.000100"));
}

#[tokio::test]
async fn test_delivery_failure_is_logged_and_not_audited() {
    let capture = MockCaptureLayer::new();
    let _guard = capture_logs(&capture);

    let clock = MockClock::new(0);
    let notifier = RecordingNotifier::failing();
    let audit = RecordingAuditSink::new();
    let moderator = setup(&clock, &notifier, &audit, RuleToggles::all());

    moderator.handle(&MessageEvent::new("U1", "C1", "hello")).await;

    assert_eq!(notifier.posts().len(), 1);
    assert!(audit.records().is_empty());
    assert!(capture.find(Level::INFO, "warning sent").is_empty());
    assert_eq!(capture.find(Level::WARN, "warning not delivered").len(), 1);
    assert_eq!(moderator.engine().metrics().delivery_failures(), 1);
}

#[tokio::test]
async fn test_flood_audit_carries_count() {
    let clock = MockClock::new(1_714_521_600_000);
    let notifier = RecordingNotifier::new();
    let audit = RecordingAuditSink::new();
    let moderator = setup(
        &clock,
        &notifier,
        &audit,
        RuleToggles {
            flood: true,
            ..RuleToggles::none()
        },
    );

    let post = MessageEvent::new("U1", "C1", "x".repeat(600)).with_ts("1714521600.000200");
    moderator.handle(&post).await;
    clock.advance(Duration::from_secs(1));
    moderator.handle(&post).await;

    let records = audit.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.rule, RuleName::Flood);
    assert_eq!(record.text.len(), 500);

    let json = serde_json::to_value(record).unwrap();
    assert_eq!(json["count"], 2);
    assert_eq!(json["user"], "U1");
    assert_eq!(json["channel"], "C1");
    assert_eq!(json["ts"], "1714521600.000200");
    assert_eq!(json["timestamp"], "2024-05-01T00:00:01.000Z");
    assert!(json.get("window_ms").is_none());
}

#[tokio::test]
async fn test_multiple_rules_deliver_in_order() {
    let notifier = RecordingNotifier::new();
    let audit = RecordingAuditSink::new();
    let engine = RuleEngineBuilder::new()
        .with_clock(Arc::new(MockClock::new(0)))
        .with_rules(RuleToggles {
            no_mention: false,
            ..RuleToggles::all()
        })
        .with_user_cooldown(Duration::ZERO)
        .with_channel_cooldown(Duration::ZERO)
        .with_flood_threshold(2)
        .build()
        .unwrap();
    let moderator = Moderator::new(
        Arc::new(engine),
        Arc::new(notifier.clone()),
        Arc::new(audit.clone()),
    );

    let reply = MessageEvent::new("U1", "C1", "re: agreed");
    moderator.handle(&reply).await;
    moderator.handle(&reply).await;

    let keys: Vec<_> = notifier.posts().into_iter().map(|p| p.key).collect();
    assert_eq!(
        keys,
        vec![RuleName::NonThreadReply, RuleName::NonThreadReply, RuleName::Flood]
    );
    let audited: Vec<_> = audit.records().into_iter().map(|r| r.rule).collect();
    assert_eq!(audited, keys);
}
