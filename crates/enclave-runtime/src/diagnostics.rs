//! Load diagnostics: one record per materialization, share, miss, or failure.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadKind {
    Managed,
    Native,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum LoadOutcome {
    /// The requesting domain materialized the library itself.
    Materialized,
    /// The request was answered with an instance owned by another domain.
    Shared { from: String },
    NotFound,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadRecord {
    pub library: String,
    pub kind: LoadKind,
    pub location: Option<PathBuf>,
    pub domain: String,
    #[serde(flatten)]
    pub outcome: LoadOutcome,
    pub recorded_at: DateTime<Utc>,
}

impl LoadRecord {
    pub fn new(
        library: impl Into<String>,
        kind: LoadKind,
        location: Option<PathBuf>,
        domain: impl Into<String>,
        outcome: LoadOutcome,
    ) -> Self {
        Self {
            library: library.into(),
            kind,
            location,
            domain: domain.into(),
            outcome,
            recorded_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl std::fmt::Display for LoadRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            LoadKind::Managed => "managed",
            LoadKind::Native => "native",
        };
        match &self.outcome {
            LoadOutcome::Materialized => write!(
                f,
                "{}: materialized {kind} {} from {}",
                self.domain,
                self.library,
                self.location
                    .as_deref()
                    .map_or_else(|| "?".to_owned(), |p| p.display().to_string())
            ),
            LoadOutcome::Shared { from } => {
                write!(f, "{}: shared {kind} {} from {from}", self.domain, self.library)
            }
            LoadOutcome::NotFound => {
                write!(f, "{}: {kind} {} not found", self.domain, self.library)
            }
            LoadOutcome::Failed { reason } => write!(
                f,
                "{}: failed to load {kind} {}: {reason}",
                self.domain, self.library
            ),
        }
    }
}

/// Receives every load record a domain emits.
pub trait LoadObserver: Send + Sync {
    fn on_load(&self, record: &LoadRecord);
}

/// Keeps load records in memory.
#[derive(Default)]
pub struct RecordingObserver {
    records: Mutex<Vec<LoadRecord>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LoadRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, outcome: &LoadOutcome) -> usize {
        self.records
            .lock()
            .map(|records| records.iter().filter(|r| &r.outcome == outcome).count())
            .unwrap_or(0)
    }
}

impl LoadObserver for RecordingObserver {
    fn on_load(&self, record: &LoadRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }
}
