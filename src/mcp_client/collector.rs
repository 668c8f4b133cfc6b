//! Error collector — an append-only sink of per-server connection failures.
//!
//! The client never reads collected errors back; callers inspect them (for
//! example to surface "server X failed to start" in a UI).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::config::ServerKind;

/// One recorded failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub server_name: String,
    pub server_type: ServerKind,
    pub error_message: String,
    pub exception_details: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(
        server_name: impl Into<String>,
        server_type: ServerKind,
        error_message: impl Into<String>,
        exception_details: impl Into<String>,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            server_type,
            error_message: error_message.into(),
            exception_details: exception_details.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Sink for connection failures, injected into each client.
pub trait ErrorCollector: Send + Sync {
    fn add_error(&self, record: ErrorRecord);
}

/// Collector that keeps records in memory.
#[derive(Debug)]
pub struct InMemoryErrorCollector {
    errors: Mutex<Vec<ErrorRecord>>,
    enabled: AtomicBool,
}

impl Default for InMemoryErrorCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryErrorCollector {
    pub fn new() -> Self {
        Self {
            errors: Mutex::new(Vec::new()),
            enabled: AtomicBool::new(true),
        }
    }

    /// Snapshot of all collected records, oldest first.
    pub fn errors(&self) -> Vec<ErrorRecord> {
        self.lock().clone()
    }

    pub fn error_count(&self) -> usize {
        self.lock().len()
    }

    pub fn has_errors(&self) -> bool {
        !self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Stop recording; `add_error` becomes a no-op until re-enabled.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ErrorRecord>> {
        // A panic while pushing cannot leave the Vec inconsistent.
        self.errors.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ErrorCollector for InMemoryErrorCollector {
    fn add_error(&self, record: ErrorRecord) {
        if !self.enabled.load(Ordering::Relaxed) {
            return;
        }
        self.lock().push(record);
    }
}
