//! Time-windowed duplicate suppression for device report topics.
//!
//! Devices on flaky links re-send the same report several times in quick
//! succession; everything after the first sighting inside the window is
//! dropped before it reaches subscribers or persistence. Classification is
//! fail-open: a report that cannot be parsed or is missing its origin
//! identifier passes through untouched.

use crate::core::config::DedupeConfig;
use crate::core::time::Clock;
use crate::hooks::{ClientInfo, Hook, HookError, HookEvent, PublishAction};
use bytes::Bytes;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Entries idle longer than this are evicted by the sweep.
const EXPIRE_AFTER_SECS: i64 = 3600;

/// Classification of a qualifying report against the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupeDecision {
    /// First sighting, or the window has elapsed: accept and record.
    Fresh,
    /// Restart signal: accept unconditionally and re-arm the window.
    Reset,
    /// Same origin already accepted within the window: suppress.
    Duplicate,
}

/// Rejected runtime reconfiguration input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconfigureError {
    #[error("target topic may not be empty")]
    EmptyTopic,
    #[error("origin field may not be empty")]
    EmptyOriginField,
    #[error("time window must be positive, got {0}")]
    InvalidWindow(i64),
}

/// Origin identifier mapped to the unix timestamp of its last accepted report.
///
/// Pure state machine: callers supply timestamps, so classification and
/// eviction are deterministic under test. All access is serialized by the
/// owning hook's lock.
#[derive(Debug, Default)]
pub struct DedupeCache {
    entries: HashMap<String, i64>,
}

impl DedupeCache {
    /// Record one qualifying report and classify it.
    ///
    /// `restart` marks the count-zero case: the report is accepted no
    /// matter what the cache holds, and the stored timestamp is re-armed.
    /// Otherwise a stored timestamp within `window` seconds of `now` makes
    /// the report a duplicate, and the stored timestamp is deliberately
    /// left alone: refreshing it would let a sustained duplicate stream
    /// postpone the window's decay indefinitely. A negative delta (clock
    /// stepped backward, or near-simultaneous arrivals) is accepted.
    pub fn observe(&mut self, origin: &str, now: i64, window: i64, restart: bool) -> DedupeDecision {
        if restart {
            self.entries.insert(origin.to_string(), now);
            return DedupeDecision::Reset;
        }
        if let Some(&stored) = self.entries.get(origin) {
            let delta = now - stored;
            if (0..=window).contains(&delta) {
                return DedupeDecision::Duplicate;
            }
        }
        self.entries.insert(origin.to_string(), now);
        DedupeDecision::Fresh
    }

    /// Timestamp of the last accepted report for an origin, if cached.
    pub fn last_seen(&self, origin: &str) -> Option<i64> {
        self.entries.get(origin).copied()
    }

    /// Drop entries whose last acceptance is strictly older than the
    /// expiry horizon. Returns the surviving entry count.
    pub fn sweep(&mut self, now: i64) -> usize {
        let threshold = now - EXPIRE_AFTER_SECS;
        self.entries.retain(|_, stored| *stored >= threshold);
        self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Introspection snapshot of the dedupe stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupeStats {
    pub cache_size: usize,
    pub target_topic: String,
    pub window_seconds: i64,
}

/// Typed view of the report fields duplicate suppression cares about.
///
/// `count` distinguishes "field absent" from "field present with value 0";
/// the two must never be conflated because exactly-zero is the restart
/// signal.
#[derive(Debug, Default, PartialEq, Eq)]
struct ReportFields {
    origin: Option<String>,
    count: Option<i64>,
}

fn decode_report(payload: &[u8], origin_field: &str, count_field: &str) -> Option<ReportFields> {
    let doc: Value = serde_json::from_slice(payload).ok()?;
    let map = doc.as_object()?;
    let origin = map
        .get(origin_field)
        .and_then(Value::as_str)
        .map(str::to_string);
    let count = map.get(count_field).and_then(numeric_value);
    Some(ReportFields { origin, count })
}

fn numeric_value(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|float| float as i64))
}

/// Publish-interception hook applying time-windowed duplicate suppression.
///
/// Only the configured target topic is examined; every other topic passes
/// through with no parsing. The cache is shared by all concurrent publish
/// events and the check-then-record step runs as one critical section, so
/// two racing reports for the same origin are strictly ordered and only one
/// wins as non-duplicate.
pub struct DedupeHook<C: Clock> {
    clock: C,
    config: RwLock<DedupeConfig>,
    cache: RwLock<DedupeCache>,
}

impl<C: Clock> DedupeHook<C> {
    pub fn new(config: DedupeConfig, clock: C) -> Self {
        Self {
            clock,
            config: RwLock::new(config),
            cache: RwLock::new(DedupeCache::default()),
        }
    }

    /// Atomically replace the matching parameters.
    ///
    /// Existing cache entries are kept; in-flight classifications finish
    /// against whichever configuration they snapshotted.
    pub fn reconfigure(
        &self,
        target_topic: &str,
        origin_field: &str,
        timestamp_field: &str,
        window_seconds: i64,
    ) -> Result<(), ReconfigureError> {
        if target_topic.is_empty() {
            return Err(ReconfigureError::EmptyTopic);
        }
        if origin_field.is_empty() {
            return Err(ReconfigureError::EmptyOriginField);
        }
        if window_seconds <= 0 {
            return Err(ReconfigureError::InvalidWindow(window_seconds));
        }
        let mut cfg = self.config.write();
        cfg.target_topic = target_topic.to_string();
        cfg.origin_field = origin_field.to_string();
        cfg.timestamp_field = timestamp_field.to_string();
        cfg.window_seconds = window_seconds;
        tracing::info!(topic = target_topic, window_seconds, "dedupe reconfigured");
        Ok(())
    }

    /// Current cache size and matching parameters, for observability.
    pub fn stats(&self) -> DedupeStats {
        let cfg = self.config.read();
        DedupeStats {
            cache_size: self.cache.read().len(),
            target_topic: cfg.target_topic.clone(),
            window_seconds: cfg.window_seconds,
        }
    }

    /// Evict entries idle past the expiry horizon, as of `now`.
    ///
    /// The sweeper task calls this on its timer; tests call it directly.
    pub fn sweep_at(&self, now: i64) -> usize {
        let remaining = self.cache.write().sweep(now);
        tracing::debug!(cache_size = remaining, "dedupe sweep complete");
        remaining
    }

    /// Spawn the periodic sweeper.
    ///
    /// The task wakes on the configured interval and exits when `shutdown`
    /// flips to true or its sender is dropped.
    pub fn spawn_sweeper(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let interval = Duration::from_secs(self.config.read().sweep_interval_seconds);
            loop {
                tokio::select! {
                    _ = self.clock.sleep(interval) => {
                        self.sweep_at(self.clock.unix_now());
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::debug!("dedupe sweeper stopping");
                            break;
                        }
                    }
                }
            }
        })
    }
}

impl<C: Clock> Hook for DedupeHook<C> {
    fn id(&self) -> &'static str {
        "dedupe"
    }

    fn provides(&self, event: HookEvent) -> bool {
        event == HookEvent::Publish
    }

    fn on_publish(
        &self,
        _client: &ClientInfo,
        topic: &str,
        payload: Bytes,
    ) -> Result<PublishAction, HookError> {
        let (origin_field, count_field, window) = {
            let cfg = self.config.read();
            if topic != cfg.target_topic {
                return Ok(PublishAction::Deliver(payload));
            }
            (
                cfg.origin_field.clone(),
                cfg.count_field.clone(),
                cfg.window_seconds,
            )
        };

        let Some(fields) = decode_report(&payload, &origin_field, &count_field) else {
            tracing::debug!(topic, "unparseable report payload, passing through");
            return Ok(PublishAction::Deliver(payload));
        };
        let Some(origin) = fields.origin else {
            tracing::debug!(topic, field = %origin_field, "report missing origin identifier, passing through");
            return Ok(PublishAction::Deliver(payload));
        };

        // Server clock, never the payload timestamp: a skewed device must
        // not be able to slip past the window.
        let now = self.clock.unix_now();
        let restart = fields.count == Some(0);

        let mut cache = self.cache.write();
        let last = cache.last_seen(&origin);
        match cache.observe(&origin, now, window, restart) {
            DedupeDecision::Duplicate => {
                let delta = last.map_or(0, |stored| now - stored);
                tracing::debug!(%origin, delta, "suppressing duplicate report");
                Ok(PublishAction::Reject)
            }
            DedupeDecision::Reset => {
                tracing::debug!(%origin, "restart report, re-arming window");
                Ok(PublishAction::Deliver(payload))
            }
            DedupeDecision::Fresh => Ok(PublishAction::Deliver(payload)),
        }
    }
}
