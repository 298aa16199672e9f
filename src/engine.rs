//! The mining engine: session lifecycle, accrual and expiry.
//!
//! Per entity the lifecycle is `Idle -> Active -> {Collected | Expired}`.
//! `Idle` is the absence of a table entry and the terminal states are never
//! stored: reaching them removes the entry.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bonus::{validate_multiplier, BonusProvider};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::notifier::{CompletionEvent, CompletionNotifier};
use crate::scheduler::{spawn_ticker, TickOutcome};
use crate::session::{MiningSession, SessionStatus, SessionTable};
use crate::store::SessionStore;

/// Outcome of [`MiningEngine::recover_on_startup`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecoveryReport {
    /// Sessions whose deadline passed while the process was down.
    pub expired: Vec<CompletionEvent>,
    /// Entities whose tickers were relaunched.
    pub resumed: Vec<String>,
}

/// Handle to a mining engine.
///
/// The engine owns the session table and one ticker per active session. It is
/// constructed once per process with [`EngineBuilder`] and shared by cloning
/// the handle.
///
/// ```no_run
/// use mining_session_engine::{bonus::FixedBonus, store::MemoryStore, MiningEngine};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bonus = FixedBonus::new(1.0).with_account("user-1", 1.2);
/// let engine = MiningEngine::builder(MemoryStore::new(), bonus).build();
/// engine.recover_on_startup().await;
///
/// let mut completions = engine.subscribe();
/// engine.start("main", 1000.0, Some("user-1")).await?;
///
/// let event = completions.recv().await?;
/// println!("{} finished with {}", event.entity_id, event.reward_amount);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MiningEngine {
    inner: Arc<EngineInner>,
}

/// Builder for [`MiningEngine`].
#[derive(Debug)]
pub struct EngineBuilder {
    store: Arc<dyn SessionStore>,
    bonus: Arc<dyn BonusProvider>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Builds the engine with an empty table. Call
    /// [`MiningEngine::recover_on_startup`] to load persisted sessions.
    pub fn build(self) -> MiningEngine {
        MiningEngine {
            inner: Arc::new(EngineInner {
                notifier: CompletionNotifier::new(self.config.event_capacity),
                config: self.config,
                store: self.store,
                bonus: self.bonus,
                clock: self.clock,
                state: Mutex::new(EngineState::default()),
            }),
        }
    }
}

impl MiningEngine {
    pub fn builder(store: impl SessionStore, bonus: impl BonusProvider) -> EngineBuilder {
        EngineBuilder {
            store: Arc::new(store),
            bonus: Arc::new(bonus),
            clock: Arc::new(SystemClock),
            config: EngineConfig::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Subscribes to unattended completion events.
    pub fn subscribe(&self) -> broadcast::Receiver<CompletionEvent> {
        self.inner.notifier.subscribe()
    }

    pub fn notifier(&self) -> &CompletionNotifier {
        &self.inner.notifier
    }

    /// Starts a session for `entity_id` at `base_rate` units per hour.
    ///
    /// When `account_id` is given the bonus multiplier is resolved from the
    /// engine's [`BonusProvider`] before the session is created; otherwise no
    /// bonus applies. Returns `Ok(false)` without side effects if the entity
    /// already has an unexpired session. A stale session past its deadline is
    /// finalized as expired first.
    ///
    /// # Errors
    ///
    /// Fails closed, creating nothing, when the base rate is invalid or the
    /// bonus lookup fails or returns a multiplier below 1.0.
    pub async fn start(
        &self,
        entity_id: &str,
        base_rate: f64,
        account_id: Option<&str>,
    ) -> Result<bool> {
        validate_rate(base_rate)?;

        if !self.inner.prepare_start(entity_id).await {
            return Ok(false);
        }

        let multiplier = match account_id {
            Some(account_id) => {
                let multiplier = self
                    .inner
                    .bonus
                    .bonus_multiplier(account_id)
                    .await
                    .and_then(validate_multiplier);
                match multiplier {
                    Ok(multiplier) => multiplier,
                    Err(e) => {
                        warn!(
                            entity_id,
                            account_id,
                            error = %e,
                            "bonus lookup failed, session not started"
                        );
                        return Err(e.into());
                    }
                }
            }
            None => 1.0,
        };

        Ok(self.inner.create_session(entity_id, base_rate, multiplier).await)
    }

    /// Starts a session with a multiplier the caller already resolved.
    pub async fn start_with_multiplier(
        &self,
        entity_id: &str,
        base_rate: f64,
        multiplier: f64,
    ) -> Result<bool> {
        validate_rate(base_rate)?;
        let multiplier = validate_multiplier(multiplier)?;
        Ok(self.inner.create_session(entity_id, base_rate, multiplier).await)
    }

    /// Ends the session for `entity_id` and returns what it earned.
    ///
    /// Collecting before the deadline yields the prorated amount. Returns 0
    /// when there is no session.
    pub async fn collect(&self, entity_id: &str) -> f64 {
        self.inner.collect(entity_id).await
    }

    /// Current status of one entity. Sessions past their deadline are
    /// finalized as expired before answering.
    pub async fn status(&self, entity_id: &str) -> SessionStatus {
        self.inner.status(entity_id).await
    }

    /// Current status of every entity with a session.
    pub async fn status_all(&self) -> BTreeMap<String, SessionStatus> {
        self.inner.status_all().await
    }

    /// Drops the session for `entity_id` without paying out anything.
    pub async fn reset(&self, entity_id: &str) {
        self.inner.reset(Some(entity_id)).await
    }

    /// Drops every session without paying out anything.
    pub async fn reset_all(&self) {
        self.inner.reset(None).await
    }

    /// Loads the persisted table, expires sessions whose deadline passed while
    /// the process was down and relaunches tickers for the rest.
    ///
    /// A corrupted or unreadable store yields an empty table. Any in-memory
    /// state is replaced.
    pub async fn recover_on_startup(&self) -> RecoveryReport {
        self.inner.recover().await
    }

    /// Stops every ticker while keeping sessions in memory and in the store.
    pub async fn shutdown(&self) {
        let mut state = self.inner.state.lock().await;
        for (_, token) in state.tickers.drain() {
            token.cancel();
        }
        debug!("engine tickers stopped");
    }

    /// Entities with a session that is still running.
    pub async fn active_entities(&self) -> Vec<String> {
        let now = self.inner.clock.now();
        let state = self.inner.state.lock().await;
        state
            .sessions
            .values()
            .filter(|session| session.is_active && !session.is_expired(now))
            .map(|session| session.entity_id.clone())
            .collect()
    }

    /// Raw session record, mostly useful for inspection and tests.
    pub async fn session(&self, entity_id: &str) -> Option<MiningSession> {
        self.inner.state.lock().await.sessions.get(entity_id).cloned()
    }

    #[cfg(test)]
    pub(crate) async fn ticker_count(&self) -> usize {
        self.inner.state.lock().await.tickers.len()
    }
}

fn validate_rate(base_rate: f64) -> Result<()> {
    if base_rate.is_finite() && base_rate >= 0.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidRate(base_rate))
    }
}

#[derive(Debug, Default)]
struct EngineState {
    sessions: SessionTable,
    tickers: HashMap<String, CancellationToken>,
}

impl EngineState {
    fn cancel_ticker(&mut self, entity_id: &str) {
        if let Some(token) = self.tickers.remove(entity_id) {
            token.cancel();
        }
    }

    /// Removes the session if its deadline has passed and builds its
    /// completion event.
    fn expire_if_due(&mut self, entity_id: &str, now: OffsetDateTime) -> Option<CompletionEvent> {
        if !self.sessions.get(entity_id)?.is_expired(now) {
            return None;
        }
        let session = self.sessions.remove(entity_id)?;
        self.cancel_ticker(entity_id);

        Some(CompletionEvent {
            reward_amount: session.accrued_at(now),
            completed_at: session.end_time,
            entity_id: session.entity_id,
        })
    }

    fn expire_all_due(&mut self, now: OffsetDateTime) -> Vec<CompletionEvent> {
        let due: Vec<String> = self
            .sessions
            .values()
            .filter(|session| session.is_expired(now))
            .map(|session| session.entity_id.clone())
            .collect();

        due.iter()
            .filter_map(|entity_id| self.expire_if_due(entity_id, now))
            .collect()
    }
}

#[derive(Debug)]
pub(crate) struct EngineInner {
    config: EngineConfig,
    store: Arc<dyn SessionStore>,
    bonus: Arc<dyn BonusProvider>,
    clock: Arc<dyn Clock>,
    notifier: CompletionNotifier,
    state: Mutex<EngineState>,
}

impl EngineInner {
    async fn persist(&self, sessions: &SessionTable) {
        if let Err(e) = self.store.save_all(sessions).await {
            warn!(error = %e, "failed to persist session table");
        }
    }

    fn announce(&self, events: Vec<CompletionEvent>) {
        for event in events {
            info!(
                entity_id = %event.entity_id,
                reward = event.reward_amount,
                "mining session expired"
            );
            self.notifier.notify(event);
        }
    }

    fn launch_ticker(self: &Arc<Self>, state: &mut EngineState, entity_id: &str) {
        state.cancel_ticker(entity_id);
        let token = CancellationToken::new();
        state.tickers.insert(entity_id.to_string(), token.clone());
        spawn_ticker(
            Arc::downgrade(self),
            entity_id.to_string(),
            self.config.tick_interval,
            token,
        );
    }

    /// Expires a stale record and reports whether the slot is free.
    async fn prepare_start(&self, entity_id: &str) -> bool {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        if let Some(event) = state.expire_if_due(entity_id, now) {
            self.persist(&state.sessions).await;
            self.announce(vec![event]);
        }

        let free = !state.sessions.contains_key(entity_id);
        if !free {
            debug!(entity_id, "session already running");
        }
        free
    }

    async fn create_session(
        self: &Arc<Self>,
        entity_id: &str,
        base_rate: f64,
        multiplier: f64,
    ) -> bool {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        let expired = state.expire_if_due(entity_id, now);
        if state.sessions.contains_key(entity_id) {
            debug!(entity_id, "session already running");
            return false;
        }

        let session = MiningSession::new(
            entity_id,
            now,
            self.config.session_duration,
            base_rate * multiplier,
        );
        info!(
            entity_id,
            rate = session.effective_rate,
            ends_at = %session.end_time,
            "mining session started"
        );
        state.sessions.insert(entity_id.to_string(), session);
        self.launch_ticker(&mut state, entity_id);
        self.persist(&state.sessions).await;

        self.announce(expired.into_iter().collect());
        true
    }

    async fn collect(&self, entity_id: &str) -> f64 {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        let Some(session) = state.sessions.remove(entity_id) else {
            return 0.0;
        };
        state.cancel_ticker(entity_id);
        self.persist(&state.sessions).await;

        let reward = session.accrued_at(now);
        info!(entity_id, reward, "mining session collected");
        reward
    }

    async fn status(&self, entity_id: &str) -> SessionStatus {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        if let Some(event) = state.expire_if_due(entity_id, now) {
            self.persist(&state.sessions).await;
            self.announce(vec![event]);
            return SessionStatus::idle();
        }

        match state.sessions.get_mut(entity_id) {
            Some(session) => {
                session.refresh_estimate(now);
                session.status(now)
            }
            None => SessionStatus::idle(),
        }
    }

    async fn status_all(&self) -> BTreeMap<String, SessionStatus> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        let expired = state.expire_all_due(now);
        if !expired.is_empty() {
            self.persist(&state.sessions).await;
            self.announce(expired);
        }

        state
            .sessions
            .iter_mut()
            .map(|(entity_id, session)| {
                session.refresh_estimate(now);
                (entity_id.clone(), session.status(now))
            })
            .collect()
    }

    async fn reset(&self, entity_id: Option<&str>) {
        let mut state = self.state.lock().await;

        match entity_id {
            Some(entity_id) => {
                if state.sessions.remove(entity_id).is_none() {
                    return;
                }
                state.cancel_ticker(entity_id);
                info!(entity_id, "mining session reset");
            }
            None => {
                for (_, token) in state.tickers.drain() {
                    token.cancel();
                }
                let dropped = std::mem::take(&mut state.sessions).len();
                info!(dropped, "all mining sessions reset");
            }
        }

        self.persist(&state.sessions).await;
    }

    async fn recover(self: &Arc<Self>) -> RecoveryReport {
        let loaded = match self.store.load().await {
            Ok(table) => table,
            Err(e) => {
                warn!(error = %e, "discarding unreadable session table");
                SessionTable::new()
            }
        };

        let mut state = self.state.lock().await;
        for (_, token) in state.tickers.drain() {
            token.cancel();
        }
        let now = self.clock.now();

        let mut sessions = SessionTable::new();
        for (entity_id, mut session) in loaded {
            if entity_id != session.entity_id {
                warn!(entity_id = %entity_id, "dropping session stored under a mismatched key");
                continue;
            }
            if !session.is_active {
                warn!(entity_id = %entity_id, "dropping inactive session record");
                continue;
            }
            if !session.is_consistent() {
                warn!(entity_id = %entity_id, "dropping inconsistent session record");
                continue;
            }
            session.refresh_estimate(now);
            sessions.insert(entity_id, session);
        }
        state.sessions = sessions;

        let expired = state.expire_all_due(now);
        let resumed: Vec<String> = state.sessions.keys().cloned().collect();
        for entity_id in &resumed {
            self.launch_ticker(&mut state, entity_id);
        }
        self.persist(&state.sessions).await;

        info!(
            expired = expired.len(),
            resumed = resumed.len(),
            "mining sessions recovered"
        );
        self.announce(expired.clone());

        RecoveryReport { expired, resumed }
    }

    /// One scheduler tick for `entity_id`.
    pub(crate) async fn tick(&self, entity_id: &str, token: &CancellationToken) -> TickOutcome {
        let mut state = self.state.lock().await;
        if token.is_cancelled() {
            return TickOutcome::Stop;
        }
        let now = self.clock.now();

        if let Some(event) = state.expire_if_due(entity_id, now) {
            self.persist(&state.sessions).await;
            self.announce(vec![event]);
            return TickOutcome::Stop;
        }

        match state.sessions.get_mut(entity_id) {
            Some(session) => {
                session.refresh_estimate(now);
                self.persist(&state.sessions).await;
                TickOutcome::Continue
            }
            None => TickOutcome::Stop,
        }
    }
}
