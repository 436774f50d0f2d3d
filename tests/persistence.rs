//! Integration tests for cooldown persistence: the state file and the
//! coalescing worker.

use slack_patrol::infrastructure::cooldown_file::{parse_table, render_table};
use slack_patrol::infrastructure::mocks::{MemoryCooldownStore, MockClock};
use slack_patrol::{
    CooldownEntry, CooldownFile, CooldownKind, CooldownStore, FlushConfig, Identity, MessageEvent,
    ModerationEngine, PersistenceWorker, RuleEngineBuilder,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn engine(clock: &MockClock) -> ModerationEngine {
    RuleEngineBuilder::new()
        .with_clock(Arc::new(clock.clone()))
        .build()
        .unwrap()
}

fn sorted(mut entries: Vec<CooldownEntry>) -> Vec<CooldownEntry> {
    entries.sort_by(|a, b| (a.kind, &a.identity).cmp(&(b.kind, &b.identity)));
    entries
}

#[test]
fn test_file_round_trip_ignores_line_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state").join("cooldown_state.csv");
    let file = CooldownFile::new(&path);

    let entries = vec![
        CooldownEntry::new(CooldownKind::Channel, "C1", 1_714_521_600_000),
        CooldownEntry::new(CooldownKind::User, "U9", 42),
        CooldownEntry::new(CooldownKind::User, "U1", 1_714_521_660_000),
    ];
    file.save(&entries).unwrap();

    let mut reversed = std::fs::read_to_string(&path)
        .unwrap()
        .lines()
        .rev()
        .collect::<Vec<_>>()
        .join("\n");
    reversed.push('\n');
    std::fs::write(&path, reversed).unwrap();

    assert_eq!(sorted(file.load().unwrap()), sorted(entries));
}

#[test]
fn test_missing_file_loads_empty() {
    let dir = TempDir::new().unwrap();
    let file = CooldownFile::new(dir.path().join("absent.csv"));
    assert!(file.load().unwrap().is_empty());
}

#[test]
fn test_malformed_lines_are_skipped() {
    let contents = "\
# kind,identity,timestampMillis
user,U1,1000

bogus,U2,2000
channel,,3000
channel,C1,not-a-number
user,U3
channel,C1,4000
";
    let entries = parse_table(contents);
    assert_eq!(
        entries,
        vec![
            CooldownEntry::new(CooldownKind::User, "U1", 1000),
            CooldownEntry::new(CooldownKind::Channel, "C1", 4000),
        ]
    );
    assert_eq!(render_table(&entries), "user,U1,1000\nchannel,C1,4000\n");
}

#[test]
fn test_save_replaces_previous_snapshot() {
    let dir = TempDir::new().unwrap();
    let file = CooldownFile::new(dir.path().join("cooldown_state.csv"));

    file.save(&[CooldownEntry::new(CooldownKind::User, "U1", 1)]).unwrap();
    file.save(&[CooldownEntry::new(CooldownKind::User, "U2", 2)]).unwrap();

    assert_eq!(
        file.load().unwrap(),
        vec![CooldownEntry::new(CooldownKind::User, "U2", 2)]
    );
    let files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(files, vec!["cooldown_state.csv"]);
}

#[test]
fn test_identities_with_separators_are_not_saved() {
    let dir = TempDir::new().unwrap();
    let file = CooldownFile::new(dir.path().join("cooldown_state.csv"));

    file.save(&[
        CooldownEntry::new(CooldownKind::User, "U1,team", 42),
        CooldownEntry::new(CooldownKind::User, "U1\nchannel,C9,99999999999999\nuser,U2", 42),
        CooldownEntry::new(CooldownKind::User, "U3", 7),
    ])
    .unwrap();

    // Nothing smuggled in through an identity shows up on reload
    assert_eq!(
        file.load().unwrap(),
        vec![CooldownEntry::new(CooldownKind::User, "U3", 7)]
    );
}

#[test]
fn test_concurrent_saves_to_one_file() {
    let dir = TempDir::new().unwrap();
    let file = Arc::new(CooldownFile::new(dir.path().join("cooldown_state.csv")));

    let handles: Vec<_> = ["U1", "U2"]
        .into_iter()
        .map(|user| {
            let file = Arc::clone(&file);
            std::thread::spawn(move || {
                let entries = vec![CooldownEntry::new(CooldownKind::User, user, 1)];
                (0..300).map(|_| file.save(&entries)).filter(Result::is_err).count()
            })
        })
        .collect();
    let failures: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(failures, 0);
    let loaded = file.load().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn test_restored_cooldowns_survive_restart() {
    let dir = TempDir::new().unwrap();
    let file = CooldownFile::new(dir.path().join("cooldown_state.csv"));
    let clock = MockClock::new(1_000_000);

    let before = engine(&clock);
    assert_eq!(before.evaluate(&MessageEvent::new("U1", "C1", "hello")).warnings().count(), 1);
    file.save(&before.cooldowns().snapshot()).unwrap();

    clock.advance(Duration::from_secs(5));
    let after = engine(&clock);
    assert_eq!(after.cooldowns().restore(file.load().unwrap()), 2);
    assert!(!after.cooldowns().signal().is_dirty());

    let outcome = after.evaluate(&MessageEvent::new("U1", "C1", "hello"));
    assert_eq!(outcome.warnings().count(), 0);
    assert_eq!(
        after
            .cooldowns()
            .last_warned_at(CooldownKind::User, &Identity::from("U1")),
        Some(1_000_000)
    );
}

#[tokio::test]
async fn test_worker_coalesces_a_burst_into_one_save() {
    let clock = MockClock::new(0);
    let engine = engine(&clock);
    let store = Arc::new(MemoryCooldownStore::new());
    let handle = PersistenceWorker::spawn(
        Arc::clone(engine.cooldowns()),
        store.clone(),
        FlushConfig::new(Duration::from_millis(20)),
    );

    for i in 0..10 {
        engine.evaluate(&MessageEvent::new(format!("U{}", i), format!("C{}", i), "hello"));
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(store.save_count(), 1);
    assert_eq!(store.saved().len(), 20);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_writes_pending_state() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cooldown_state.csv");
    let clock = MockClock::new(7_000);
    let engine = engine(&clock);
    let handle = PersistenceWorker::spawn(
        Arc::clone(engine.cooldowns()),
        Arc::new(CooldownFile::new(&path)),
        FlushConfig::new(Duration::from_secs(3600)),
    );

    engine.evaluate(&MessageEvent::new("U1", "C1", "hello"));
    assert_eq!(handle.shutdown().await.unwrap(), 2);

    let saved = CooldownFile::new(&path).load().unwrap();
    assert_eq!(
        saved,
        vec![
            CooldownEntry::new(CooldownKind::User, "U1", 7_000),
            CooldownEntry::new(CooldownKind::Channel, "C1", 7_000),
        ]
    );
}

#[tokio::test]
async fn test_failed_save_keeps_worker_running() {
    let clock = MockClock::new(0);
    let engine = engine(&clock);
    let handle = PersistenceWorker::spawn(
        Arc::clone(engine.cooldowns()),
        Arc::new(MemoryCooldownStore::failing()),
        FlushConfig::new(Duration::from_millis(5)),
    );

    engine.evaluate(&MessageEvent::new("U1", "C1", "hello"));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!handle.is_finished());
    assert!(handle.flush_now().await.is_err());
    // In-memory state is unaffected by the failed writes
    assert_eq!(engine.cooldowns().len(), 2);
}
