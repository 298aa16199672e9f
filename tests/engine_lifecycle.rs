use mining_session_engine::bonus::FixedBonus;
use mining_session_engine::clock::ManualClock;
use mining_session_engine::store::{MemoryStore, SessionStore};
use mining_session_engine::{EngineConfig, MiningEngine, MiningSession, SessionTable};
use serde::Serialize;
use std::collections::BTreeMap;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};
use tokio::sync::broadcast::error::TryRecvError;

const EPSILON: f64 = 1e-6;

fn clan_bonus() -> FixedBonus {
    FixedBonus::new(1.0).with_account("user-1", 1.2)
}

fn engine(store: &MemoryStore, bonus: FixedBonus, clock: &ManualClock) -> MiningEngine {
    MiningEngine::builder(store.clone(), bonus)
        .with_clock(clock.clone())
        .build()
}

#[tokio::test(start_paused = true)]
async fn eight_hour_session_with_clan_bonus() {
    let clock = ManualClock::new(datetime!(2024-06-01 12:00 UTC));
    let engine = engine(&MemoryStore::new(), clan_bonus(), &clock);
    let mut events = engine.subscribe();

    assert!(engine.start("main", 1000.0, Some("user-1")).await.unwrap());

    clock.advance(Duration::hours(1));
    let status = engine.status("main").await;
    assert!(status.is_active);
    assert!((status.accrued_estimate - 1200.0).abs() < EPSILON);
    assert!((status.time_remaining_secs - 25_200.0).abs() < EPSILON);

    clock.advance(Duration::hours(7));
    let status = engine.status("main").await;
    assert!(!status.is_active);

    let event = events.try_recv().unwrap();
    assert_eq!(event.entity_id, "main");
    assert!((event.reward_amount - 9600.0).abs() < EPSILON);

    assert_eq!(engine.collect("main").await, 0.0);
}

#[tokio::test(start_paused = true)]
async fn repeated_queries_after_deadline_fire_one_event() {
    let clock = ManualClock::new(datetime!(2024-06-01 12:00 UTC));
    let engine = engine(&MemoryStore::new(), FixedBonus::default(), &clock);
    let mut events = engine.subscribe();
    engine.start("main", 1000.0, None).await.unwrap();

    clock.advance(Duration::hours(10));
    for _ in 0..3 {
        assert!(!engine.status("main").await.is_active);
        assert!(engine.status_all().await.is_empty());
    }

    assert!(events.try_recv().is_ok());
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test(start_paused = true)]
async fn no_time_lost_across_restart() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(datetime!(2024-06-01 12:00 UTC));

    let first = engine(&store, clan_bonus(), &clock);
    first.start("main", 1000.0, Some("user-1")).await.unwrap();
    let start_time = first.session("main").await.unwrap().start_time;

    // process dies two hours in
    clock.advance(Duration::hours(2));
    first.shutdown().await;
    drop(first);

    // and comes back an hour and a half later
    clock.advance(Duration::minutes(90));
    let second = engine(&store, clan_bonus(), &clock);
    let report = second.recover_on_startup().await;
    assert_eq!(report.resumed, vec!["main".to_string()]);
    assert!(report.expired.is_empty());

    clock.advance(Duration::minutes(30));
    let now = datetime!(2024-06-01 16:00 UTC);
    let expected = (now - start_time).as_seconds_f64() * 1200.0 / 3600.0;

    let status = second.status("main").await;
    assert!(status.is_active);
    assert!((status.accrued_estimate - expected).abs() < EPSILON);
    assert!((second.collect("main").await - 4800.0).abs() < EPSILON);
}

#[tokio::test(start_paused = true)]
async fn sessions_due_during_downtime_expire_on_recovery() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(datetime!(2024-06-01 12:00 UTC));

    let first = engine(&store, FixedBonus::default(), &clock);
    first.start("main", 1000.0, None).await.unwrap();
    clock.advance(Duration::hours(4));
    first.start("miner-7", 600.0, None).await.unwrap();
    first.shutdown().await;
    drop(first);

    clock.advance(Duration::hours(5));
    let second = engine(&store, FixedBonus::default(), &clock);
    let mut events = second.subscribe();
    let report = second.recover_on_startup().await;

    assert_eq!(report.expired.len(), 1);
    assert_eq!(report.expired[0].entity_id, "main");
    assert!((report.expired[0].reward_amount - 8000.0).abs() < EPSILON);
    assert_eq!(report.resumed, vec!["miner-7".to_string()]);
    assert_eq!(events.try_recv().unwrap().entity_id, "main");

    let persisted = store.load().await.unwrap();
    assert_eq!(persisted.keys().collect::<Vec<_>>(), vec!["miner-7"]);
}

#[tokio::test(start_paused = true)]
async fn corrupted_store_recovers_to_empty_table() {
    let store = MemoryStore::from_bytes(vec![0xc1, 0xff, 0x00, 0x13]);
    let clock = ManualClock::new(datetime!(2024-06-01 12:00 UTC));
    let engine = engine(&store, FixedBonus::default(), &clock);

    let report = engine.recover_on_startup().await;

    assert_eq!(report, Default::default());
    assert!(engine.status_all().await.is_empty());
    // the garbage is replaced by a clean table
    assert!(store.load().await.unwrap().is_empty());
    assert!(engine.start("main", 1000.0, None).await.unwrap());
}

/// A record written by an older build that still kept a separate ledger.
#[derive(Serialize)]
struct LegacySession {
    entity_id: String,
    start_time: OffsetDateTime,
    total_duration_secs: u64,
    end_time: OffsetDateTime,
    effective_rate: f64,
    is_active: bool,
    accrued_estimate: f64,
    collected_so_far: f64,
}

#[tokio::test(start_paused = true)]
async fn records_with_unknown_fields_are_discarded() {
    let start_time = datetime!(2024-06-01 12:00 UTC);
    let legacy = BTreeMap::from([(
        "main".to_string(),
        LegacySession {
            entity_id: "main".into(),
            start_time,
            total_duration_secs: 28_800,
            end_time: start_time + Duration::hours(8),
            effective_rate: 1000.0,
            is_active: true,
            accrued_estimate: 0.0,
            collected_so_far: 250.0,
        },
    )]);
    let store = MemoryStore::from_bytes(rmp_serde::to_vec_named(&legacy).unwrap());
    let clock = ManualClock::new(start_time + Duration::hours(1));
    let engine = engine(&store, FixedBonus::default(), &clock);

    let report = engine.recover_on_startup().await;

    assert_eq!(report, Default::default());
    assert!(engine.status_all().await.is_empty());
    assert!(store.load().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn untrustworthy_records_are_dropped_without_events() {
    let start_time = datetime!(2024-06-01 12:00 UTC);
    let fresh = |id: &str| MiningSession::new(id, start_time, Duration::hours(8), 1000.0);

    let mut finished_but_inactive = fresh("finished");
    finished_but_inactive.is_active = false;
    let mut running_but_inactive = fresh("paused");
    running_but_inactive.start_time = start_time + Duration::hours(9);
    running_but_inactive.end_time = running_but_inactive.start_time + Duration::hours(8);
    running_but_inactive.is_active = false;
    let mut stretched = fresh("stretched");
    stretched.end_time += Duration::hours(48);
    let mut nan_rate = fresh("nan-rate");
    nan_rate.effective_rate = f64::NAN;

    let table: SessionTable = [
        finished_but_inactive,
        running_but_inactive,
        stretched,
        nan_rate,
        fresh("main"),
    ]
    .into_iter()
    .map(|session| (session.entity_id.clone(), session))
    .collect();
    let store = MemoryStore::new();
    store.save_all(&table).await.unwrap();

    let clock = ManualClock::new(start_time + Duration::hours(10));
    let engine = engine(&store, FixedBonus::default(), &clock);
    let mut events = engine.subscribe();

    let report = engine.recover_on_startup().await;

    // only the well-formed record is finalized
    assert_eq!(report.expired.len(), 1);
    assert_eq!(report.expired[0].entity_id, "main");
    assert!(report.resumed.is_empty());
    assert_eq!(events.try_recv().unwrap().entity_id, "main");
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    assert!(store.load().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn bonus_change_does_not_touch_running_session() {
    let bonus = clan_bonus();
    let clock = ManualClock::new(datetime!(2024-06-01 12:00 UTC));
    let engine = engine(&MemoryStore::new(), bonus.clone(), &clock);

    engine.start("main", 1000.0, Some("user-1")).await.unwrap();
    bonus.set("user-1", 2.0);

    clock.advance(Duration::hours(2));
    assert_eq!(engine.session("main").await.unwrap().effective_rate, 1200.0);
    assert!((engine.collect("main").await - 2400.0).abs() < EPSILON);

    engine.start("main", 1000.0, Some("user-1")).await.unwrap();
    assert_eq!(engine.session("main").await.unwrap().effective_rate, 2000.0);
}

#[tokio::test(start_paused = true)]
async fn collection_is_monotonic_and_clamped() {
    let clock = ManualClock::new(datetime!(2024-06-01 12:00 UTC));
    let engine = engine(&MemoryStore::new(), FixedBonus::default(), &clock);

    let mut previous = 0.0;
    for hours in [1, 3, 8, 12] {
        engine.start("main", 900.0, None).await.unwrap();
        clock.advance(Duration::hours(hours));
        let reward = engine.collect("main").await;

        let expected = 900.0 * hours.min(8) as f64;
        assert!((reward - expected).abs() < EPSILON);
        assert!(reward >= previous);
        previous = reward;
    }
}

#[tokio::test(start_paused = true)]
async fn ticker_completes_unattended_sessions() {
    let clock = ManualClock::new(datetime!(2024-06-01 12:00 UTC));
    let config = EngineConfig::default()
        .with_session_duration(Duration::minutes(30))
        .with_tick_interval(std::time::Duration::from_millis(250));
    let engine = MiningEngine::builder(MemoryStore::new(), FixedBonus::default())
        .with_clock(clock.clone())
        .with_config(config)
        .build();
    let mut events = engine.subscribe();

    engine.start("main", 600.0, None).await.unwrap();
    clock.advance(Duration::minutes(45));

    // nobody queries: the ticker has to notice on its own
    let event = events.recv().await.unwrap();
    assert_eq!(event.entity_id, "main");
    assert!((event.reward_amount - 300.0).abs() < EPSILON);
    assert!(engine.active_entities().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn concurrent_starts_create_one_session() {
    let clock = ManualClock::new(datetime!(2024-06-01 12:00 UTC));
    let engine = engine(&MemoryStore::new(), clan_bonus(), &clock);

    let (a, b) = tokio::join!(
        engine.start("main", 1000.0, Some("user-1")),
        engine.start("main", 1000.0, Some("user-1")),
    );

    assert_eq!([a.unwrap(), b.unwrap()].iter().filter(|ok| **ok).count(), 1);
    assert_eq!(engine.active_entities().await, vec!["main".to_string()]);
}
