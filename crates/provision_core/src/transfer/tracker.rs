//! Transfer result records and summary.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::device::{classify_text, Classification};

/// Payload sub-component tracked per device run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferCategory {
    Sdcard,
    AppFiles,
    Database,
    Preferences,
    Ownership,
}

impl TransferCategory {
    /// All categories in run order.
    pub const ALL: [TransferCategory; 5] = [
        TransferCategory::Sdcard,
        TransferCategory::AppFiles,
        TransferCategory::Database,
        TransferCategory::Preferences,
        TransferCategory::Ownership,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            TransferCategory::Sdcard => "sdcard",
            TransferCategory::AppFiles => "app_files",
            TransferCategory::Database => "database",
            TransferCategory::Preferences => "preferences",
            TransferCategory::Ownership => "ownership",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            TransferCategory::Sdcard => "SD card",
            TransferCategory::AppFiles => "App files",
            TransferCategory::Database => "Database",
            TransferCategory::Preferences => "Preferences",
            TransferCategory::Ownership => "Ownership",
        }
    }
}

impl fmt::Display for TransferCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    #[default]
    Pending,
    Success,
    Failed,
}

/// Outcome of one transfer category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub category: TransferCategory,
    pub status: TransferStatus,
    /// Number of files pushed, where that is meaningful.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    /// Last error text when failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Resolved app owner (ownership only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl TransferResult {
    fn pending(category: TransferCategory) -> Self {
        Self {
            category,
            status: TransferStatus::Pending,
            count: None,
            error: None,
            owner: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != TransferStatus::Pending
    }
}

/// Per-run record of all transfer categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTracker {
    results: Vec<TransferResult>,
}

impl Default for TransferTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferTracker {
    pub fn new() -> Self {
        Self {
            results: TransferCategory::ALL
                .iter()
                .map(|c| TransferResult::pending(*c))
                .collect(),
        }
    }

    pub fn get(&self, category: TransferCategory) -> &TransferResult {
        // results always holds every category, in ALL order
        &self.results[Self::index(category)]
    }

    pub fn results(&self) -> &[TransferResult] {
        &self.results
    }

    fn index(category: TransferCategory) -> usize {
        TransferCategory::ALL
            .iter()
            .position(|c| *c == category)
            .unwrap_or_default()
    }

    /// Terminal slot for `category`, or `None` if it already left `Pending`.
    fn pending_slot(&mut self, category: TransferCategory) -> Option<&mut TransferResult> {
        let slot = &mut self.results[Self::index(category)];
        if slot.is_terminal() {
            tracing::debug!("Transfer '{}' already recorded, ignoring", category);
            None
        } else {
            Some(slot)
        }
    }

    /// Record success. Returns `false` if the category was already terminal.
    pub fn record_success(&mut self, category: TransferCategory, count: Option<usize>) -> bool {
        match self.pending_slot(category) {
            Some(slot) => {
                slot.status = TransferStatus::Success;
                slot.count = count;
                true
            }
            None => false,
        }
    }

    /// Record a successful ownership fix with the resolved owner.
    pub fn record_owner(&mut self, owner: impl Into<String>) -> bool {
        match self.pending_slot(TransferCategory::Ownership) {
            Some(slot) => {
                slot.status = TransferStatus::Success;
                slot.owner = Some(owner.into());
                true
            }
            None => false,
        }
    }

    /// Record failure. Returns `false` if the category was already terminal.
    pub fn record_failure(&mut self, category: TransferCategory, error: impl Into<String>) -> bool {
        match self.pending_slot(category) {
            Some(slot) => {
                slot.status = TransferStatus::Failed;
                if category != TransferCategory::Ownership {
                    slot.count = Some(0);
                }
                slot.error = Some(error.into());
                true
            }
            None => false,
        }
    }

    /// Fail every category that never ran.
    pub fn fail_pending(&mut self, reason: &str) -> usize {
        let mut failed = 0;
        for category in TransferCategory::ALL {
            if !self.get(category).is_terminal() && self.record_failure(category, reason) {
                failed += 1;
            }
        }
        failed
    }

    pub fn count(&self, status: TransferStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn success_count(&self) -> usize {
        self.count(TransferStatus::Success)
    }

    pub fn failed_count(&self) -> usize {
        self.count(TransferStatus::Failed)
    }

    /// Build the end-of-run summary.
    pub fn summary(&self) -> TransferSummary {
        let failures = self
            .results
            .iter()
            .filter(|r| r.status == TransferStatus::Failed)
            .map(|r| {
                let error = r.error.clone().unwrap_or_default();
                TransferFailure {
                    category: r.category,
                    classification: classify_text(&error),
                    error,
                }
            })
            .collect();

        TransferSummary {
            success: self.success_count(),
            failed: self.failed_count(),
            failures,
        }
    }
}

/// A failed category with its classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFailure {
    pub category: TransferCategory,
    pub classification: Classification,
    pub error: String,
}

/// Success / failure counts over the tracked categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSummary {
    pub success: usize,
    pub failed: usize,
    pub failures: Vec<TransferFailure>,
}

impl TransferSummary {
    pub fn total(&self) -> usize {
        self.success + self.failed
    }

    /// `success / (success + failed)`; 1.0 when nothing was recorded.
    pub fn ratio(&self) -> f64 {
        if self.total() == 0 {
            1.0
        } else {
            self.success as f64 / self.total() as f64
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for TransferSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Transfer result: {}/{} succeeded", self.success, self.total())?;
        if !self.failures.is_empty() {
            let parts: Vec<String> = self
                .failures
                .iter()
                .map(|fail| {
                    format!(
                        "{} [{}] {}",
                        fail.category,
                        fail.classification.kind.label(),
                        fail.classification
                    )
                })
                .collect();
            write!(f, "; failed: {}", parts.join(", "))?;
        }
        Ok(())
    }
}
