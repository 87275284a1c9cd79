use std::{any::Any, fmt::Display, future::Future, panic::AssertUnwindSafe};

use futures_util::FutureExt;
use serde::Serialize;

use crate::ledger_api::errors::ReconcileError;

/// What happened to a single row during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    /// The row was written to
    Updated,
    /// Nothing to do yet; try again next tick
    Unchanged,
    /// The row cannot be processed by this worker and was passed over
    Skipped,
    /// The row has a data-integrity problem. An alert was raised and the row left as it was.
    Alerted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    pub examined: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub alerts: usize,
}

impl TickSummary {
    pub fn record(&mut self, outcome: RowOutcome) {
        match outcome {
            RowOutcome::Updated => self.updated += 1,
            RowOutcome::Unchanged => {},
            RowOutcome::Skipped => self.skipped += 1,
            RowOutcome::Alerted => self.alerts += 1,
        }
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    pub fn is_idle(&self) -> bool {
        self.examined == 0
    }
}

impl Display for TickSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "examined {}, updated {}, skipped {}, failed {}, alerts {}",
            self.examined, self.updated, self.skipped, self.failed, self.alerts
        )
    }
}

/// Awaits the handling of a single row. A panic becomes a [`ReconcileError::RowPanicked`] for that row, and the
/// worker moves on to the next one.
pub async fn contain_row<F>(row: F) -> Result<RowOutcome, ReconcileError>
where F: Future<Output = Result<RowOutcome, ReconcileError>> {
    match AssertUnwindSafe(row).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(ReconcileError::RowPanicked(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "no message".to_string()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn summary_counts() {
        let mut summary = TickSummary { examined: 4, ..Default::default() };
        summary.record(RowOutcome::Updated);
        summary.record(RowOutcome::Unchanged);
        summary.record(RowOutcome::Alerted);
        summary.record_failure();
        assert_eq!(summary.to_string(), "examined 4, updated 1, skipped 0, failed 1, alerts 1");
        assert!(!summary.is_idle());
        assert!(TickSummary::default().is_idle());
    }
}
