//! The fetch scheduler.
//!
//! All state lives in one control task. Public calls are messages to that
//! task; fetches run in their own tasks and report back through a second
//! channel, tagged with the generation that issued them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::cache::CacheStore;
use crate::error::WeatherError;
use crate::model::{FetchConfig, Location, ValidityState, WeatherSnapshot, is_different_location};
use crate::normalize::NormalizeContext;
use crate::provider::{ProviderKind, WeatherFetcher};
use crate::units::{UnitConverter, UnitSystem, WindUnit};

/// Ticks are postponed by this much while the host is still in its first run.
pub const FIRST_RUN_DEFERRAL: Duration = Duration::from_secs(600);

const SHORT_RETRY: Duration = Duration::from_secs(10);
const MEDIUM_RETRY: Duration = Duration::from_secs(300);
const LONG_RETRY: Duration = Duration::from_secs(3600);

/// Validity and retry delay after the `trials`-th consecutive failure (1-based).
pub fn retry_policy(trials: u32) -> (ValidityState, Duration) {
    if trials < 2 {
        (ValidityState::Pending, SHORT_RETRY)
    } else if trials <= 5 {
        (ValidityState::Unavailable, MEDIUM_RETRY)
    } else {
        (ValidityState::Unavailable, LONG_RETRY)
    }
}

/// What the scheduler fetches and how it presents it.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerSettings {
    pub provider: ProviderKind,
    pub api_key: Option<String>,
    /// `None` is a configuration error.
    pub location: Option<Location>,
    pub units: UnitSystem,
    pub wind_unit: WindUnit,
    pub language: String,
    pub reduced: bool,
    pub night_icons: bool,
    /// Minutes between successful fetches; 0 turns automatic refresh off.
    pub refresh_interval: u32,
    pub enabled: bool,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            api_key: None,
            location: Some(Location::default()),
            units: UnitSystem::default(),
            wind_unit: WindUnit::default(),
            language: "en-us".to_string(),
            reduced: true,
            night_icons: true,
            refresh_interval: 120,
            enabled: true,
        }
    }
}

/// Host-process state the scheduler consults on every tick.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    first_run: Arc<AtomicBool>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session whose first run is still in progress.
    pub fn first_run() -> Self {
        Self {
            first_run: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_first_run(&self) -> bool {
        self.first_run.load(Ordering::SeqCst)
    }

    pub fn finish_first_run(&self) {
        self.first_run.store(false, Ordering::SeqCst);
    }
}

/// Receives every published snapshot, in subscription order.
pub trait SnapshotObserver: Send + Sync {
    fn on_snapshot(&self, snapshot: &WeatherSnapshot);
}

impl<F> SnapshotObserver for F
where
    F: Fn(&WeatherSnapshot) + Send + Sync,
{
    fn on_snapshot(&self, snapshot: &WeatherSnapshot) {
        self(snapshot)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Called once with the validity reached by the attempt following a `reset`.
pub type ResetCallback = Box<dyn FnOnce(ValidityState) + Send>;

enum Command {
    Start(SessionContext),
    Subscribe(SubscriptionId, Arc<dyn SnapshotObserver>),
    Unsubscribe(SubscriptionId),
    Reset {
        location: Option<Location>,
        on_complete: Option<ResetCallback>,
    },
    Shutdown,
}

struct FetchOutcome {
    generation: u64,
    request: FetchConfig,
    result: Result<String, WeatherError>,
}

/// Handle to the scheduler's control task.
pub struct WeatherHandler {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<Option<Arc<WeatherSnapshot>>>,
    validity: watch::Receiver<ValidityState>,
    next_subscription: AtomicU64,
    task: JoinHandle<()>,
}

impl WeatherHandler {
    /// Spawns the control task. Nothing is fetched until [`WeatherHandler::start`].
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        settings: HandlerSettings,
        fetcher: Arc<dyn WeatherFetcher>,
        cache: CacheStore,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(None);
        let (validity_tx, validity_rx) = watch::channel(ValidityState::Startup);

        let control = Control {
            active_location: settings.location.clone(),
            converter: UnitConverter::new(settings.units, settings.wind_unit),
            settings,
            fetcher,
            cache,
            session: None,
            trials: 0,
            generation: 0,
            deadline: None,
            observers: Vec::new(),
            on_complete: Vec::new(),
            snapshot_tx,
            validity_tx,
            outcome_tx,
        };
        let task = tokio::spawn(control.run(commands_rx, outcome_rx));

        Self {
            commands: commands_tx,
            snapshot: snapshot_rx,
            validity: validity_rx,
            next_subscription: AtomicU64::new(1),
            task,
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::warn!("weather handler control task is gone");
        }
    }

    /// Loads a fresh cached snapshot, or schedules an immediate fetch. Idempotent.
    pub fn start(&self, session: SessionContext) {
        self.send(Command::Start(session));
    }

    pub fn subscribe(&self, observer: impl SnapshotObserver + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.send(Command::Subscribe(id, Arc::new(observer)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.send(Command::Unsubscribe(id));
    }

    /// Cancels the pending timer, clears the cache and fetches right away,
    /// for `location` if given, else for the configured location.
    pub fn reset(&self, location: Option<Location>, on_complete: Option<ResetCallback>) {
        self.send(Command::Reset { location, on_complete });
    }

    pub fn current_snapshot(&self) -> Option<Arc<WeatherSnapshot>> {
        self.snapshot.borrow().clone()
    }

    pub fn current_validity(&self) -> ValidityState {
        *self.validity.borrow()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<Option<Arc<WeatherSnapshot>>> {
        self.snapshot.clone()
    }

    pub fn watch_validity(&self) -> watch::Receiver<ValidityState> {
        self.validity.clone()
    }

    /// Stops the control task; a fetch still in flight is dropped on arrival.
    pub async fn shutdown(self) {
        self.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "weather handler control task failed");
        }
    }
}

struct Control {
    settings: HandlerSettings,
    /// Location fetched on each tick; differs from the configured one after `reset(Some(..))`.
    active_location: Option<Location>,
    converter: UnitConverter,
    fetcher: Arc<dyn WeatherFetcher>,
    cache: CacheStore,
    session: Option<SessionContext>,
    trials: u32,
    generation: u64,
    /// The one pending tick, if any.
    deadline: Option<Instant>,
    observers: Vec<(SubscriptionId, Arc<dyn SnapshotObserver>)>,
    on_complete: Vec<ResetCallback>,
    snapshot_tx: watch::Sender<Option<Arc<WeatherSnapshot>>>,
    validity_tx: watch::Sender<ValidityState>,
    outcome_tx: mpsc::UnboundedSender<FetchOutcome>,
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl Control {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut outcomes: mpsc::UnboundedReceiver<FetchOutcome>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
                Some(outcome) = outcomes.recv() => self.complete(outcome),
                () = wait_until(self.deadline) => {
                    self.deadline = None;
                    self.tick();
                }
            }
        }
        tracing::debug!("weather handler stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Start(session) => self.start(session),
            Command::Subscribe(id, observer) => self.observers.push((id, observer)),
            Command::Unsubscribe(id) => self.observers.retain(|(other, _)| *other != id),
            Command::Reset { location, on_complete } => self.reset(location, on_complete),
            Command::Shutdown => {}
        }
    }

    fn arm(&mut self, delay: Duration) {
        self.deadline = Some(Instant::now() + delay);
    }

    fn set_validity(&self, state: ValidityState) {
        let previous = self.validity_tx.send_replace(state);
        if previous != state {
            tracing::debug!(from = ?previous, to = ?state, "validity changed");
        }
    }

    fn start(&mut self, session: SessionContext) {
        if self.session.is_some() {
            tracing::debug!("weather handler already started");
            return;
        }
        self.session = Some(session);

        match self.cache.read() {
            Some(snapshot) => {
                tracing::info!(path = %self.cache.path().display(), "using cached snapshot");
                self.publish(snapshot);
                self.arm_refresh();
            }
            None => self.arm(Duration::ZERO),
        }
    }

    fn reset(&mut self, location: Option<Location>, on_complete: Option<ResetCallback>) {
        self.deadline = None;
        if let Err(e) = self.cache.clear() {
            tracing::warn!(error = %e, "failed to clear snapshot cache");
        }

        let target = location.or_else(|| self.settings.location.clone());
        let moved = match (&self.active_location, &target) {
            (Some(old), Some(new)) => is_different_location(old, new),
            (None, None) => false,
            _ => true,
        };
        if moved {
            self.snapshot_tx.send_replace(None);
            self.set_validity(ValidityState::Startup);
        }
        self.active_location = target;
        self.trials = 0;
        self.on_complete.extend(on_complete);

        tracing::debug!(location = ?self.active_location, "weather handler reset");
        self.tick();
    }

    fn tick(&mut self) {
        if !self.settings.enabled {
            tracing::debug!("weather updates disabled");
            return;
        }
        if self.session.as_ref().is_some_and(SessionContext::is_first_run) {
            tracing::debug!("first run in progress, deferring weather update");
            self.arm(FIRST_RUN_DEFERRAL);
            return;
        }

        let request = match self.request() {
            Ok(request) => request,
            Err(e) => {
                self.fail_terminally(e);
                return;
            }
        };

        self.generation += 1;
        let generation = self.generation;
        let fetcher = Arc::clone(&self.fetcher);
        let outcomes = self.outcome_tx.clone();
        tracing::debug!(generation, provider = %request.provider, "fetching weather");

        tokio::spawn(async move {
            let result = fetcher.fetch(&request).await;
            // the control task may already be gone
            let _ = outcomes.send(FetchOutcome {
                generation,
                request,
                result,
            });
        });
    }

    fn request(&self) -> Result<FetchConfig, WeatherError> {
        let location = self
            .active_location
            .clone()
            .ok_or_else(|| WeatherError::Config("no location configured".to_string()))?;
        self.settings.provider.check_api_key(self.settings.api_key.as_deref())?;

        Ok(FetchConfig {
            provider: self.settings.provider,
            api_key: self.settings.api_key.clone(),
            units: self.settings.units,
            language: self.settings.language.clone(),
            location,
            reduced: self.settings.reduced,
        })
    }

    fn complete(&mut self, outcome: FetchOutcome) {
        if outcome.generation != self.generation {
            tracing::debug!(
                generation = outcome.generation,
                current = self.generation,
                "discarding superseded fetch result"
            );
            return;
        }

        let request = outcome.request;
        let ctx = NormalizeContext {
            units: request.units,
            night_icons: self.settings.night_icons,
            now: Utc::now(),
            location: request.location.clone(),
        };
        let normalized = outcome
            .result
            .and_then(|raw| request.provider.normalize(&raw, &ctx));

        match normalized {
            Ok(snapshot) => {
                self.trials = 0;
                let snapshot = self.converter.apply(snapshot);
                // only the configured location may overwrite the cache
                let cacheable = self.cache.is_enabled()
                    && self.settings.location.as_ref() == Some(&request.location);
                if cacheable && let Err(e) = self.cache.write(&snapshot) {
                    tracing::warn!(error = %e, "failed to write snapshot cache");
                }
                self.publish(snapshot);
                self.arm_refresh();
                self.finish_reset(ValidityState::Valid);
            }
            Err(e) if e.is_retryable() => self.fail(e),
            Err(e) => self.fail_terminally(e),
        }
    }

    fn publish(&mut self, snapshot: WeatherSnapshot) {
        let snapshot = Arc::new(snapshot);
        tracing::info!(
            provider = snapshot.provider_name(),
            location = %snapshot.location.name,
            "weather snapshot published"
        );
        self.snapshot_tx.send_replace(Some(Arc::clone(&snapshot)));
        self.set_validity(ValidityState::Valid);
        for (_, observer) in &self.observers {
            observer.on_snapshot(&snapshot);
        }
    }

    fn arm_refresh(&mut self) {
        if self.settings.refresh_interval > 0 {
            self.arm(Duration::from_secs(u64::from(self.settings.refresh_interval) * 60));
        }
    }

    fn fail(&mut self, error: WeatherError) {
        self.trials += 1;
        let (state, delay) = retry_policy(self.trials);
        tracing::warn!(
            error = %error,
            trials = self.trials,
            retry_in_secs = delay.as_secs(),
            "weather update failed"
        );
        self.set_validity(state);
        self.arm(delay);
        if state == ValidityState::Unavailable {
            self.finish_reset(state);
        }
    }

    fn fail_terminally(&mut self, error: WeatherError) {
        tracing::warn!(error = %error, "weather update impossible with the current configuration");
        self.deadline = None;
        self.set_validity(ValidityState::Unavailable);
        self.finish_reset(ValidityState::Unavailable);
    }

    fn finish_reset(&mut self, state: ValidityState) {
        for callback in self.on_complete.drain(..) {
            callback(state);
        }
    }
}
