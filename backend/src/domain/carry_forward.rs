use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use shared::DailySummary;
use tracing::debug;

use crate::storage::SummaryStorage;

/// Resolves a day's opening balance from the closest earlier persisted summary.
///
/// Always reads the store. During a repair each step depends on the row the
/// previous step just wrote, so nothing here may be cached.
#[derive(Clone)]
pub struct CarryForwardResolver<S: SummaryStorage> {
    summaries: S,
}

impl<S: SummaryStorage> CarryForwardResolver<S> {
    pub fn new(summaries: S) -> Self {
        Self { summaries }
    }

    /// Remaining balance of the latest summary before `date`, or zero when there is none.
    ///
    /// Read failures propagate: a zero opening balance persisted by mistake
    /// would corrupt every later day.
    pub async fn resolve_opening_balance(&self, project_id: &str, date: NaiveDate) -> Result<Decimal> {
        match self.previous_summary(project_id, date).await? {
            Some(previous) => {
                debug!(
                    "Opening balance for project {} on {} carried from {}: {}",
                    project_id, date, previous.date, previous.remaining_balance
                );
                Ok(previous.remaining_balance)
            }
            None => {
                debug!("No summary before {} for project {}, opening balance is 0", date, project_id);
                Ok(Decimal::ZERO)
            }
        }
    }

    pub async fn previous_summary(&self, project_id: &str, date: NaiveDate) -> Result<Option<DailySummary>> {
        self.summaries.get_latest_summary_before(project_id, date).await
    }
}
