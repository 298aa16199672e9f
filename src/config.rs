//! Engine configuration.

/// Tunables for a [`MiningEngine`](crate::MiningEngine).
///
/// Defaults match the reference game behaviour: eight hour sessions refreshed
/// once per second.
///
/// ```
/// use mining_session_engine::EngineConfig;
///
/// let config = EngineConfig::default()
///     .with_session_duration(time::Duration::hours(4))
///     .with_tick_interval(std::time::Duration::from_millis(500));
/// assert_eq!(config.session_duration, time::Duration::hours(4));
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fixed length of every session started by the engine.
    pub session_duration: time::Duration,
    /// How often each session's ticker refreshes its cached estimate.
    pub tick_interval: std::time::Duration,
    /// Capacity of the completion broadcast channel.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_duration: time::Duration::hours(8),
            tick_interval: std::time::Duration::from_secs(1),
            event_capacity: 256,
        }
    }
}

impl EngineConfig {
    pub fn with_session_duration(mut self, duration: time::Duration) -> Self {
        self.session_duration = duration;
        self
    }

    pub fn with_tick_interval(mut self, interval: std::time::Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Sets the completion channel capacity. Zero is bumped to one since
    /// tokio broadcast channels cannot be empty.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}
