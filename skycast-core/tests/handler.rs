mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use common::{Call, ScriptedFetcher, Step, berlin, hamburg, network_error, ok, settings};
use skycast_core::{
    CacheStore, HandlerSettings, Location, NormalizeContext, ProviderKind, ResetCallback,
    SessionContext, UnitSystem, ValidityState, WeatherHandler, WeatherSnapshot, WindUnit,
};
use tempfile::{TempDir, tempdir};
use tokio::sync::{mpsc, oneshot};

const MINUTE: Duration = Duration::from_secs(60);

struct Harness {
    handler: WeatherHandler,
    calls: mpsc::UnboundedReceiver<Call>,
    cache: CacheStore,
    _dir: TempDir,
}

fn harness(settings: HandlerSettings, script: Vec<Step>, cache_minutes: u32) -> Harness {
    let dir = tempdir().unwrap();
    let cache = CacheStore::new(dir.path().join("snapshot.json"), cache_minutes);
    let (fetcher, calls) = ScriptedFetcher::new(script);
    let handler = WeatherHandler::spawn(settings, Arc::new(fetcher), cache.clone());
    Harness {
        handler,
        calls,
        cache,
        _dir: dir,
    }
}

fn completion() -> (ResetCallback, oneshot::Receiver<ValidityState>) {
    let (tx, rx) = oneshot::channel();
    let callback: ResetCallback = Box::new(move |state| {
        let _ = tx.send(state);
    });
    (callback, rx)
}

async fn wait_for_validity(handler: &WeatherHandler, state: ValidityState) {
    let mut validity = handler.watch_validity();
    validity.wait_for(|current| *current == state).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn six_failures_follow_the_retry_ladder() {
    let mut h = harness(settings(), vec![], 0);
    h.handler.start(SessionContext::new());

    let mut times = vec![h.calls.recv().await.unwrap().at];
    wait_for_validity(&h.handler, ValidityState::Pending).await;
    for _ in 0..6 {
        times.push(h.calls.recv().await.unwrap().at);
    }

    let delays: Vec<u64> = times.windows(2).map(|w| (w[1] - w[0]).as_secs()).collect();
    assert_eq!(delays, vec![10, 300, 300, 300, 300, 3600]);
    assert_eq!(h.handler.current_validity(), ValidityState::Unavailable);
    assert!(h.handler.current_snapshot().is_none());

    h.handler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn first_run_defers_ticks_in_ten_minute_steps() {
    let mut h = harness(settings(), vec![ok()], 0);
    let session = SessionContext::first_run();
    let begin = tokio::time::Instant::now();
    h.handler.start(session.clone());

    tokio::time::sleep(15 * MINUTE).await;
    assert!(h.calls.try_recv().is_err());
    assert_eq!(h.handler.current_validity(), ValidityState::Startup);

    session.finish_first_run();
    let call = h.calls.recv().await.unwrap();
    assert_eq!(call.at - begin, 20 * MINUTE);

    wait_for_validity(&h.handler, ValidityState::Valid).await;
    h.handler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn subscribers_are_notified_in_order_with_converted_units() {
    let handler_settings = HandlerSettings {
        wind_unit: WindUnit::MetersPerSecond,
        ..settings()
    };
    let h = harness(handler_settings, vec![ok(), ok()], 0);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let first = Arc::clone(&seen);
    h.handler.subscribe(move |snapshot: &WeatherSnapshot| {
        assert_eq!(snapshot.units.wind, WindUnit::MetersPerSecond);
        first.lock().unwrap().push("first");
    });
    let second = Arc::clone(&seen);
    let second_id = h.handler.subscribe(move |_: &WeatherSnapshot| {
        second.lock().unwrap().push("second");
    });

    h.handler.start(SessionContext::new());
    wait_for_validity(&h.handler, ValidityState::Valid).await;
    assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);

    let snapshot = h.handler.current_snapshot().unwrap();
    let wind = snapshot.days[0].wind_speed.unwrap();
    assert!((wind - 6.0).abs() < 1e-9, "wind {wind}");

    h.handler.unsubscribe(second_id);
    let (done, finished) = completion();
    h.handler.reset(None, Some(done));
    assert_eq!(finished.await.unwrap(), ValidityState::Valid);
    assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "first"]);

    h.handler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn superseded_fetches_are_discarded() {
    let slow = Step::Slow(MINUTE, Ok(common::OPEN_METEO.to_string()));
    let mut h = harness(settings(), vec![slow, ok()], 0);

    let published = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&published);
    h.handler.subscribe(move |snapshot: &WeatherSnapshot| {
        sink.lock().unwrap().push(snapshot.location.clone());
    });

    h.handler.start(SessionContext::new());
    let first = h.calls.recv().await.unwrap();
    assert_eq!(first.request.location, hamburg());

    let (done, finished) = completion();
    h.handler.reset(Some(berlin()), Some(done));
    assert_eq!(finished.await.unwrap(), ValidityState::Valid);

    // let the slow hamburg answer arrive
    tokio::time::sleep(2 * MINUTE).await;

    assert_eq!(*published.lock().unwrap(), vec![berlin()]);
    assert_eq!(h.handler.current_snapshot().unwrap().location, berlin());
    h.handler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn only_the_configured_location_is_cached() {
    let h = harness(settings(), vec![ok(), ok(), ok()], 30);

    h.handler.start(SessionContext::new());
    wait_for_validity(&h.handler, ValidityState::Valid).await;
    assert!(h.cache.path().exists());

    // Same place by distance, but other coordinates: the cache stays untouched.
    let nearby = Location::new("Hamburg, DE", 10.0007, 53.5503);
    let (done, finished) = completion();
    h.handler.reset(Some(nearby.clone()), Some(done));
    assert_eq!(finished.await.unwrap(), ValidityState::Valid);
    assert!(!h.cache.path().exists());
    assert_eq!(h.handler.current_snapshot().unwrap().location, nearby);

    let (done, finished) = completion();
    h.handler.reset(None, Some(done));
    assert_eq!(finished.await.unwrap(), ValidityState::Valid);
    assert_eq!(h.cache.read().unwrap().location, hamburg());

    h.handler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn renamed_configured_location_is_still_cached() {
    let h = harness(settings(), vec![ok()], 30);

    let home = hamburg();
    let renamed = Location::new("Home", home.lon, home.lat);
    let (done, finished) = completion();
    h.handler.reset(Some(renamed), Some(done));
    assert_eq!(finished.await.unwrap(), ValidityState::Valid);

    let cached = h.cache.read().unwrap();
    assert_eq!(cached.location.name, "Home");
    assert_eq!(cached.location, home);

    h.handler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn late_subscribers_wait_for_the_next_publish() {
    let h = harness(settings(), vec![ok(), ok()], 0);
    h.handler.start(SessionContext::new());
    wait_for_validity(&h.handler, ValidityState::Valid).await;

    let count = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&count);
    h.handler.subscribe(move |_: &WeatherSnapshot| *counter.lock().unwrap() += 1);
    let mut snapshots = h.handler.watch_snapshot();
    snapshots.borrow_and_update();

    tokio::time::sleep(60 * MINUTE).await;
    assert_eq!(*count.lock().unwrap(), 0);

    snapshots.changed().await.unwrap();
    assert_eq!(*count.lock().unwrap(), 1);

    h.handler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reset_callback_fires_once_retries_run_out() {
    let h = harness(settings(), vec![network_error()], 0);
    h.handler.start(SessionContext::new());

    let (done, finished) = completion();
    h.handler.reset(None, Some(done));
    assert_eq!(finished.await.unwrap(), ValidityState::Unavailable);
    assert_eq!(h.handler.current_validity(), ValidityState::Unavailable);

    h.handler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn missing_location_is_terminal() {
    let handler_settings = HandlerSettings {
        location: None,
        ..settings()
    };
    let mut h = harness(handler_settings, vec![ok()], 0);
    h.handler.start(SessionContext::new());
    wait_for_validity(&h.handler, ValidityState::Unavailable).await;

    tokio::time::sleep(180 * MINUTE).await;
    assert!(h.calls.try_recv().is_err());

    h.handler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn short_openweather_key_is_terminal() {
    let handler_settings = HandlerSettings {
        provider: ProviderKind::OpenWeather,
        api_key: Some("short".to_string()),
        ..settings()
    };
    let mut h = harness(handler_settings, vec![ok()], 0);

    let (done, finished) = completion();
    h.handler.reset(None, Some(done));
    assert_eq!(finished.await.unwrap(), ValidityState::Unavailable);
    assert!(h.calls.try_recv().is_err());

    h.handler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn start_is_idempotent_and_refreshes_on_interval() {
    let mut h = harness(settings(), vec![ok()], 0);
    h.handler.start(SessionContext::new());
    h.handler.start(SessionContext::new());

    let first = h.calls.recv().await.unwrap();
    wait_for_validity(&h.handler, ValidityState::Valid).await;

    tokio::time::sleep(60 * MINUTE).await;
    assert!(h.calls.try_recv().is_err());

    let refresh = h.calls.recv().await.unwrap();
    assert_eq!(refresh.at - first.at, 120 * MINUTE);

    h.handler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn zero_refresh_interval_fetches_once() {
    let handler_settings = HandlerSettings {
        refresh_interval: 0,
        ..settings()
    };
    let mut h = harness(handler_settings, vec![ok()], 0);
    h.handler.start(SessionContext::new());
    h.calls.recv().await.unwrap();
    wait_for_validity(&h.handler, ValidityState::Valid).await;

    tokio::time::sleep(24 * 60 * MINUTE).await;
    assert!(h.calls.try_recv().is_err());

    h.handler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn fresh_cache_is_published_without_fetching() {
    let mut h = harness(settings(), vec![ok()], 30);
    let ctx = NormalizeContext {
        units: UnitSystem::Metric,
        night_icons: true,
        now: Utc::now(),
        location: hamburg(),
    };
    let cached = ProviderKind::OpenMeteo.normalize(common::OPEN_METEO, &ctx).unwrap();
    h.cache.write(&cached).unwrap();

    let count = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&count);
    h.handler.subscribe(move |_: &WeatherSnapshot| *counter.lock().unwrap() += 1);

    h.handler.start(SessionContext::new());
    wait_for_validity(&h.handler, ValidityState::Valid).await;
    assert_eq!(*h.handler.current_snapshot().unwrap(), cached);
    assert_eq!(*count.lock().unwrap(), 1);

    tokio::time::sleep(MINUTE).await;
    assert!(h.calls.try_recv().is_err());

    h.handler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn disabled_handler_never_fetches() {
    let handler_settings = HandlerSettings {
        enabled: false,
        ..settings()
    };
    let mut h = harness(handler_settings, vec![ok()], 0);
    h.handler.start(SessionContext::new());

    tokio::time::sleep(180 * MINUTE).await;
    assert!(h.calls.try_recv().is_err());
    assert_eq!(h.handler.current_validity(), ValidityState::Startup);

    h.handler.shutdown().await;
}
