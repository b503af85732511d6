use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use shared::DailySummary;
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqliteConnection};
use tracing::{debug, warn};

use super::{date_column, date_param, decimal_column};
use crate::storage::connection::DbConnection;
use crate::storage::traits::SummaryStorage;

/// Repository for the `daily_summaries` table
#[derive(Clone)]
pub struct SummaryRepository {
    db: DbConnection,
}

impl SummaryRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Insert a row without the upsert's uniqueness check
    #[cfg(test)]
    pub async fn insert_raw_summary(&self, summary: &DailySummary) -> Result<()> {
        insert_summary(self.db.pool(), summary).await
    }

    /// Drop the unique day index, as in databases created before it existed.
    /// Lets tests reproduce duplicate rows left behind by older writers.
    #[cfg(test)]
    pub async fn drop_unique_day_index(&self) -> Result<()> {
        sqlx::query("DROP INDEX IF EXISTS idx_daily_summaries_project_day")
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    /// Number of physical rows for (project, date), duplicates included
    #[cfg(test)]
    pub async fn count_rows(&self, project_id: &str, date: NaiveDate) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM daily_summaries WHERE project_id = ? AND date = ?")
            .bind(project_id)
            .bind(date_param(date))
            .fetch_one(self.db.pool())
            .await?;
        Ok(row.try_get("n")?)
    }
}

fn timestamp_param(timestamp: &DateTime<Utc>) -> String {
    // Fixed precision keeps the text column ordered like the instant it encodes
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn timestamp_column(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let raw: String = row.try_get(column)?;
    let parsed = DateTime::parse_from_rfc3339(&raw)
        .with_context(|| format!("Invalid timestamp in column {}: {}", column, raw))?;
    Ok(parsed.with_timezone(&Utc))
}

fn summary_from_row(row: &SqliteRow) -> Result<DailySummary> {
    Ok(DailySummary {
        project_id: row.try_get("project_id")?,
        date: date_column(row, "date")?,
        carried_forward_amount: decimal_column(row, "carried_forward_amount")?,
        total_fund_transfers: decimal_column(row, "total_fund_transfers")?,
        total_worker_wages: decimal_column(row, "total_worker_wages")?,
        total_material_costs: decimal_column(row, "total_material_costs")?,
        total_transportation_costs: decimal_column(row, "total_transportation_costs")?,
        total_worker_transfers: decimal_column(row, "total_worker_transfers")?,
        total_worker_misc_expenses: decimal_column(row, "total_worker_misc_expenses")?,
        total_incoming_project_transfers: decimal_column(row, "total_incoming_project_transfers")?,
        total_outgoing_project_transfers: decimal_column(row, "total_outgoing_project_transfers")?,
        total_income: decimal_column(row, "total_income")?,
        total_expenses: decimal_column(row, "total_expenses")?,
        remaining_balance: decimal_column(row, "remaining_balance")?,
        created_at: timestamp_column(row, "created_at")?,
    })
}

async fn insert_summary<'e, E>(executor: E, summary: &DailySummary) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO daily_summaries (
            project_id, date, carried_forward_amount,
            total_fund_transfers, total_worker_wages, total_material_costs,
            total_transportation_costs, total_worker_transfers, total_worker_misc_expenses,
            total_incoming_project_transfers, total_outgoing_project_transfers,
            total_income, total_expenses, remaining_balance, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&summary.project_id)
    .bind(date_param(summary.date))
    .bind(summary.carried_forward_amount.to_string())
    .bind(summary.total_fund_transfers.to_string())
    .bind(summary.total_worker_wages.to_string())
    .bind(summary.total_material_costs.to_string())
    .bind(summary.total_transportation_costs.to_string())
    .bind(summary.total_worker_transfers.to_string())
    .bind(summary.total_worker_misc_expenses.to_string())
    .bind(summary.total_incoming_project_transfers.to_string())
    .bind(summary.total_outgoing_project_transfers.to_string())
    .bind(summary.total_income.to_string())
    .bind(summary.total_expenses.to_string())
    .bind(summary.remaining_balance.to_string())
    .bind(timestamp_param(&summary.created_at))
    .execute(executor)
    .await?;
    Ok(())
}

/// Overwrite the newest row for the summary's day, or insert one. Extra rows are removed.
async fn write_summary(conn: &mut SqliteConnection, summary: &DailySummary) -> Result<()> {
    let date = date_param(summary.date);

    let existing_ids: Vec<i64> = sqlx::query(
        r#"
        SELECT id FROM daily_summaries
        WHERE project_id = ? AND date = ?
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(&summary.project_id)
    .bind(&date)
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(|row| row.try_get("id"))
    .collect::<Result<_, _>>()?;

    match existing_ids.first() {
        Some(&keep_id) => {
            sqlx::query(
                r#"
                UPDATE daily_summaries SET
                    carried_forward_amount = ?,
                    total_fund_transfers = ?,
                    total_worker_wages = ?,
                    total_material_costs = ?,
                    total_transportation_costs = ?,
                    total_worker_transfers = ?,
                    total_worker_misc_expenses = ?,
                    total_incoming_project_transfers = ?,
                    total_outgoing_project_transfers = ?,
                    total_income = ?,
                    total_expenses = ?,
                    remaining_balance = ?
                WHERE id = ?
                "#,
            )
            .bind(summary.carried_forward_amount.to_string())
            .bind(summary.total_fund_transfers.to_string())
            .bind(summary.total_worker_wages.to_string())
            .bind(summary.total_material_costs.to_string())
            .bind(summary.total_transportation_costs.to_string())
            .bind(summary.total_worker_transfers.to_string())
            .bind(summary.total_worker_misc_expenses.to_string())
            .bind(summary.total_incoming_project_transfers.to_string())
            .bind(summary.total_outgoing_project_transfers.to_string())
            .bind(summary.total_income.to_string())
            .bind(summary.total_expenses.to_string())
            .bind(summary.remaining_balance.to_string())
            .bind(keep_id)
            .execute(&mut *conn)
            .await?;

            if existing_ids.len() > 1 {
                warn!(
                    "Found {} rows for project {} on {}, keeping the newest",
                    existing_ids.len(),
                    summary.project_id,
                    date
                );
                sqlx::query("DELETE FROM daily_summaries WHERE project_id = ? AND date = ? AND id != ?")
                    .bind(&summary.project_id)
                    .bind(&date)
                    .bind(keep_id)
                    .execute(&mut *conn)
                    .await?;
            }
        }
        None => insert_summary(&mut *conn, summary).await?,
    }
    Ok(())
}

#[async_trait]
impl SummaryStorage for SummaryRepository {
    async fn upsert_summary(&self, summary: &DailySummary) -> Result<DailySummary> {
        let mut tx = self.db.begin_write().await?;
        let result = write_summary(tx.connection()?, summary).await;
        tx.finish(result).await?;
        debug!("Upserted summary for project {} on {}", summary.project_id, summary.date);

        self.get_summary(&summary.project_id, summary.date)
            .await?
            .ok_or_else(|| {
                anyhow!(
                    "Summary for project {} on {} missing after upsert",
                    summary.project_id,
                    summary.date
                )
            })
    }

    async fn get_summary(&self, project_id: &str, date: NaiveDate) -> Result<Option<DailySummary>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM daily_summaries
            WHERE project_id = ? AND date = ?
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(project_id)
        .bind(date_param(date))
        .fetch_optional(self.db.pool())
        .await?;

        row.as_ref().map(summary_from_row).transpose()
    }

    async fn get_latest_summary_before(&self, project_id: &str, date: NaiveDate) -> Result<Option<DailySummary>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM daily_summaries
            WHERE project_id = ? AND date < ?
            ORDER BY date DESC, created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(project_id)
        .bind(date_param(date))
        .fetch_optional(self.db.pool())
        .await?;

        row.as_ref().map(summary_from_row).transpose()
    }

    async fn list_summary_dates(&self, project_id: &str) -> Result<Vec<NaiveDate>> {
        let rows = sqlx::query("SELECT DISTINCT date FROM daily_summaries WHERE project_id = ? ORDER BY date ASC")
            .bind(project_id)
            .fetch_all(self.db.pool())
            .await?;

        rows.iter().map(|row| date_column(row, "date")).collect()
    }

    async fn list_summaries(
        &self,
        project_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<DailySummary>> {
        let start = start_date.map(date_param);
        let end = end_date.map(date_param);

        let rows = sqlx::query(
            r#"
            SELECT * FROM daily_summaries
            WHERE project_id = ?
              AND (? IS NULL OR date >= ?)
              AND (? IS NULL OR date <= ?)
            ORDER BY date ASC, created_at ASC, id ASC
            "#,
        )
        .bind(project_id)
        .bind(start.as_deref())
        .bind(start.as_deref())
        .bind(end.as_deref())
        .bind(end.as_deref())
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(summary_from_row).collect()
    }

    async fn delete_project_summaries(&self, project_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM daily_summaries WHERE project_id = ?")
            .bind(project_id)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected())
    }

    async fn collapse_duplicate_summaries(&self, project_id: &str) -> Result<u64> {
        // A row goes if another row for the same day is newer, ties broken by row id
        let result = sqlx::query(
            r#"
            DELETE FROM daily_summaries
            WHERE project_id = ?
              AND EXISTS (
                SELECT 1 FROM daily_summaries AS newer
                WHERE newer.project_id = daily_summaries.project_id
                  AND newer.date = daily_summaries.date
                  AND (newer.created_at > daily_summaries.created_at
                       OR (newer.created_at = daily_summaries.created_at AND newer.id > daily_summaries.id))
              )
            "#,
        )
        .bind(project_id)
        .execute(self.db.pool())
        .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            warn!("Collapsed {} duplicate summary rows for project {}", removed, project_id);
        }
        Ok(removed)
    }

    async fn list_projects(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT project_id FROM daily_summaries ORDER BY project_id")
            .fetch_all(self.db.pool())
            .await?;

        rows.iter()
            .map(|row| Ok(row.try_get::<String, _>("project_id")?))
            .collect()
    }
}
