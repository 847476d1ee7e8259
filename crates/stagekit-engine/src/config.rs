//! Engine configuration

use chrono::Duration as TtlDuration;
use std::time::Duration;

/// Configuration for the staging engine and its concurrent front-end.
///
/// Supplied at construction and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a pending stage stays eligible for application.
    pub staging_ttl: TtlDuration,
    /// Whether embedders should auto-apply high-confidence stages. The
    /// engine stores the setting for the protocol layer; it never decides
    /// auto-application itself.
    pub auto_apply_enabled: bool,
    /// Minimum confidence score for auto-application.
    pub auto_apply_threshold: f64,
    /// Maximum pending stages per session; `0` disables the limit.
    pub max_stages_per_session: u64,
    /// Maximum applies per session; `0` disables the limit.
    pub max_applies_per_session: u64,
    /// Worker tasks in the staging pool. Should not exceed the persistence
    /// layer's connection budget.
    pub workers: usize,
    /// Capacity of the bounded staging queue.
    pub queue_capacity: usize,
    /// How long an enqueue waits for queue space before falling back to
    /// synchronous execution.
    pub enqueue_wait: Duration,
    /// Interval between metrics summary emissions.
    pub metrics_interval: Duration,
    /// Emit metrics summaries at `info` instead of `debug` level.
    pub debug: bool,
}

impl EngineConfig {
    /// Create the default configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With a staging TTL.
    #[inline]
    #[must_use]
    pub fn with_ttl(mut self, ttl: TtlDuration) -> Self {
        self.staging_ttl = ttl;
        self
    }

    /// With a worker pool size.
    #[inline]
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// With a staging queue capacity.
    #[inline]
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// With per-session stage and apply ceilings.
    #[inline]
    #[must_use]
    pub fn with_session_limits(mut self, max_stages: u64, max_applies: u64) -> Self {
        self.max_stages_per_session = max_stages;
        self.max_applies_per_session = max_applies;
        self
    }

    /// With a metrics emission interval.
    #[inline]
    #[must_use]
    pub fn with_metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = interval;
        self
    }

    /// With debug-level metrics logging promoted to `info`.
    #[inline]
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Whether a stage with `score` qualifies for automatic application
    /// under this configuration. Helper for the policy layer; the engine
    /// itself never calls it.
    #[inline]
    #[must_use]
    pub fn should_auto_apply(&self, score: f64) -> bool {
        self.auto_apply_enabled && score >= self.auto_apply_threshold
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            staging_ttl: TtlDuration::minutes(15),
            auto_apply_enabled: true,
            auto_apply_threshold: 0.85,
            max_stages_per_session: 100,
            max_applies_per_session: 10,
            workers: 10,
            queue_capacity: 100,
            enqueue_wait: Duration::from_millis(100),
            metrics_interval: Duration::from_secs(30),
            debug: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_behavior() {
        let config = EngineConfig::new();
        assert_eq!(config.staging_ttl, TtlDuration::minutes(15));
        assert_eq!(config.workers, 10);
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.max_stages_per_session, 100);
        assert_eq!(config.max_applies_per_session, 10);
        assert_eq!(config.enqueue_wait, Duration::from_millis(100));
    }

    #[test]
    fn builder_clamps_degenerate_sizes() {
        let config = EngineConfig::new().with_workers(0).with_queue_capacity(0);
        assert_eq!(config.workers, 1);
        assert_eq!(config.queue_capacity, 1);
    }

    #[test]
    fn auto_apply_threshold_gate() {
        let config = EngineConfig::new();
        assert!(config.should_auto_apply(0.9));
        assert!(!config.should_auto_apply(0.5));
        let disabled = EngineConfig {
            auto_apply_enabled: false,
            ..EngineConfig::new()
        };
        assert!(!disabled.should_auto_apply(0.99));
    }
}
