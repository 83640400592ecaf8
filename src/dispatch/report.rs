//! Aggregation of a batch's outcomes for user-facing reporting.

use serde::Serialize;

use super::DispatchOutcome;

/// Aggregated result of one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Per-target outcomes, in dispatch order.
    pub outcomes: Vec<DispatchOutcome>,
    /// Number of targets the message reached.
    pub successful: usize,
    /// Number of targets that failed.
    pub failed: usize,
}

impl BatchReport {
    /// Aggregate outcomes into counts.
    pub fn from_outcomes(outcomes: Vec<DispatchOutcome>) -> Self {
        let successful = outcomes.iter().filter(|o| o.success).count();
        let failed = outcomes.len().saturating_sub(successful);
        Self {
            outcomes,
            successful,
            failed,
        }
    }

    /// Every target succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// Some, but not all, targets failed.
    pub fn is_partial_failure(&self) -> bool {
        self.failed > 0 && self.successful > 0
    }

    /// Every target failed (and there was at least one).
    pub fn all_failed(&self) -> bool {
        self.failed > 0 && self.successful == 0
    }

    /// One `• name: reason` line per failed target.
    pub fn failure_details(&self) -> String {
        self.outcomes
            .iter()
            .filter(|o| !o.success)
            .map(|o| {
                let reason = o
                    .error
                    .as_ref()
                    .map_or_else(|| "unknown error".to_owned(), ToString::to_string);
                format!("• {}: {reason}", o.contact_name)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// One-line summary, e.g. `Sent to 2 contact(s), failed for 1 contact(s)`.
    pub fn summary(&self) -> String {
        if self.all_succeeded() {
            format!("Sent to {} contact(s)", self.successful)
        } else {
            format!(
                "Sent to {} contact(s), failed for {} contact(s)",
                self.successful, self.failed
            )
        }
    }
}
