//! Common test harness utilities for integration tests.
//!
//! Provides the recording publish sink shared by the pipeline and notifier
//! suites, plus a logging bootstrap.

// Not all test files use all helpers; silence dead_code warnings for unused exports.
#![allow(dead_code)]

use bytes::Bytes;
use parking_lot::Mutex;
use prism::hooks::{PublishError, PublishSink};
use std::sync::atomic::{AtomicBool, Ordering};

/// Install a compact subscriber so traced paths are visible under
/// `--nocapture`. Safe to call from every test.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// One outbound publish captured by [`RecordingSink`].
#[derive(Debug, Clone)]
pub struct PublishRecord {
    pub topic: String,
    pub payload: Bytes,
    pub qos: u8,
    pub retain: bool,
}

/// In-memory publish sink standing in for the host broker.
///
/// Records every accepted publish; can be switched into a failing mode to
/// exercise the swallow-and-log paths.
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<PublishRecord>>,
    fail: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish fail.
    pub fn fail_all(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<PublishRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl PublishSink for RecordingSink {
    fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        qos: u8,
        retain: bool,
    ) -> Result<(), PublishError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PublishError::new(topic, "sink offline"));
        }
        self.records.lock().push(PublishRecord {
            topic: topic.to_string(),
            payload,
            qos,
            retain,
        });
        Ok(())
    }
}
