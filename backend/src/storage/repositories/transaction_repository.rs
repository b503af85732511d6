use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use shared::{
    FundTransfer, InterProjectTransfer, MaterialPurchase, TransactionKind, TransactionRecord,
    TransportationExpense, WorkerAttendance, WorkerMiscExpense, WorkerTransfer,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqliteConnection};
use tracing::debug;

use super::{date_column, date_param, decimal_column};
use crate::storage::connection::DbConnection;
use crate::storage::traits::TransactionStorage;

/// Repository for the seven transaction tables
#[derive(Clone)]
pub struct TransactionRepository {
    db: DbConnection,
}

impl TransactionRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Get the underlying database connection for testing purposes
    pub fn get_db_connection(&self) -> &DbConnection {
        &self.db
    }

    fn table_name(kind: TransactionKind) -> &'static str {
        match kind {
            TransactionKind::FundTransfer => "fund_transfers",
            TransactionKind::WorkerAttendance => "worker_attendance",
            TransactionKind::MaterialPurchase => "material_purchases",
            TransactionKind::TransportationExpense => "transportation_expenses",
            TransactionKind::WorkerTransfer => "worker_transfers",
            TransactionKind::WorkerMiscExpense => "worker_misc_expenses",
            TransactionKind::InterProjectTransfer => "project_fund_transfers",
        }
    }

    async fn list_for_day<T: Send>(
        &self,
        kind: TransactionKind,
        project_id: &str,
        date: NaiveDate,
        map_row: fn(&SqliteRow) -> Result<T>,
    ) -> Result<Vec<T>> {
        let sql = format!(
            "SELECT * FROM {} WHERE project_id = ? AND date = ? ORDER BY created_at, id",
            Self::table_name(kind)
        );
        let rows = sqlx::query(&sql)
            .bind(project_id)
            .bind(date_param(date))
            .fetch_all(self.db.pool())
            .await?;

        rows.iter().map(map_row).collect()
    }
}

async fn insert_record<'e, E>(executor: E, record: &TransactionRecord) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    match record {
        TransactionRecord::FundTransfer(r) => {
            sqlx::query(
                r#"
                INSERT INTO fund_transfers (id, project_id, date, amount, sender_name, transfer_type, notes)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&r.id)
            .bind(&r.project_id)
            .bind(date_param(r.date))
            .bind(r.amount.to_string())
            .bind(&r.sender_name)
            .bind(&r.transfer_type)
            .bind(r.notes.as_deref())
            .execute(executor)
            .await?;
        }
        TransactionRecord::WorkerAttendance(r) => {
            sqlx::query(
                r#"
                INSERT INTO worker_attendance (id, project_id, worker_id, date, daily_wage, work_days, paid_amount)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&r.id)
            .bind(&r.project_id)
            .bind(&r.worker_id)
            .bind(date_param(r.date))
            .bind(r.daily_wage.to_string())
            .bind(r.work_days.to_string())
            .bind(r.paid_amount.to_string())
            .execute(executor)
            .await?;
        }
        TransactionRecord::MaterialPurchase(r) => {
            sqlx::query(
                r#"
                INSERT INTO material_purchases
                    (id, project_id, date, material_name, quantity, unit_price, total_amount, purchase_type, supplier_name)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&r.id)
            .bind(&r.project_id)
            .bind(date_param(r.date))
            .bind(&r.material_name)
            .bind(r.quantity.to_string())
            .bind(r.unit_price.to_string())
            .bind(r.total_amount.to_string())
            .bind(r.purchase_type.as_str())
            .bind(r.supplier_name.as_deref())
            .execute(executor)
            .await?;
        }
        TransactionRecord::TransportationExpense(r) => {
            sqlx::query(
                r#"
                INSERT INTO transportation_expenses (id, project_id, date, amount, description)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&r.id)
            .bind(&r.project_id)
            .bind(date_param(r.date))
            .bind(r.amount.to_string())
            .bind(&r.description)
            .execute(executor)
            .await?;
        }
        TransactionRecord::WorkerTransfer(r) => {
            sqlx::query(
                r#"
                INSERT INTO worker_transfers (id, project_id, worker_id, date, amount, recipient_name)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&r.id)
            .bind(&r.project_id)
            .bind(&r.worker_id)
            .bind(date_param(r.date))
            .bind(r.amount.to_string())
            .bind(&r.recipient_name)
            .execute(executor)
            .await?;
        }
        TransactionRecord::WorkerMiscExpense(r) => {
            sqlx::query(
                r#"
                INSERT INTO worker_misc_expenses (id, project_id, worker_id, date, amount, description)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&r.id)
            .bind(&r.project_id)
            .bind(&r.worker_id)
            .bind(date_param(r.date))
            .bind(r.amount.to_string())
            .bind(&r.description)
            .execute(executor)
            .await?;
        }
        TransactionRecord::InterProjectTransfer(r) => {
            sqlx::query(
                r#"
                INSERT INTO project_fund_transfers (id, from_project_id, to_project_id, date, amount, description)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&r.id)
            .bind(&r.from_project_id)
            .bind(&r.to_project_id)
            .bind(date_param(r.date))
            .bind(r.amount.to_string())
            .bind(&r.description)
            .execute(executor)
            .await?;
        }
    }
    Ok(())
}

/// Rewrite every column of an existing row except `id` and `created_at`
async fn update_record<'e, E>(executor: E, record: &TransactionRecord) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    match record {
        TransactionRecord::FundTransfer(r) => {
            sqlx::query(
                r#"
                UPDATE fund_transfers
                SET project_id = ?, date = ?, amount = ?, sender_name = ?, transfer_type = ?, notes = ?
                WHERE id = ?
                "#,
            )
            .bind(&r.project_id)
            .bind(date_param(r.date))
            .bind(r.amount.to_string())
            .bind(&r.sender_name)
            .bind(&r.transfer_type)
            .bind(r.notes.as_deref())
            .bind(&r.id)
            .execute(executor)
            .await?;
        }
        TransactionRecord::WorkerAttendance(r) => {
            sqlx::query(
                r#"
                UPDATE worker_attendance
                SET project_id = ?, worker_id = ?, date = ?, daily_wage = ?, work_days = ?, paid_amount = ?
                WHERE id = ?
                "#,
            )
            .bind(&r.project_id)
            .bind(&r.worker_id)
            .bind(date_param(r.date))
            .bind(r.daily_wage.to_string())
            .bind(r.work_days.to_string())
            .bind(r.paid_amount.to_string())
            .bind(&r.id)
            .execute(executor)
            .await?;
        }
        TransactionRecord::MaterialPurchase(r) => {
            sqlx::query(
                r#"
                UPDATE material_purchases
                SET project_id = ?, date = ?, material_name = ?, quantity = ?, unit_price = ?,
                    total_amount = ?, purchase_type = ?, supplier_name = ?
                WHERE id = ?
                "#,
            )
            .bind(&r.project_id)
            .bind(date_param(r.date))
            .bind(&r.material_name)
            .bind(r.quantity.to_string())
            .bind(r.unit_price.to_string())
            .bind(r.total_amount.to_string())
            .bind(r.purchase_type.as_str())
            .bind(r.supplier_name.as_deref())
            .bind(&r.id)
            .execute(executor)
            .await?;
        }
        TransactionRecord::TransportationExpense(r) => {
            sqlx::query(
                r#"
                UPDATE transportation_expenses
                SET project_id = ?, date = ?, amount = ?, description = ?
                WHERE id = ?
                "#,
            )
            .bind(&r.project_id)
            .bind(date_param(r.date))
            .bind(r.amount.to_string())
            .bind(&r.description)
            .bind(&r.id)
            .execute(executor)
            .await?;
        }
        TransactionRecord::WorkerTransfer(r) => {
            sqlx::query(
                r#"
                UPDATE worker_transfers
                SET project_id = ?, worker_id = ?, date = ?, amount = ?, recipient_name = ?
                WHERE id = ?
                "#,
            )
            .bind(&r.project_id)
            .bind(&r.worker_id)
            .bind(date_param(r.date))
            .bind(r.amount.to_string())
            .bind(&r.recipient_name)
            .bind(&r.id)
            .execute(executor)
            .await?;
        }
        TransactionRecord::WorkerMiscExpense(r) => {
            sqlx::query(
                r#"
                UPDATE worker_misc_expenses
                SET project_id = ?, worker_id = ?, date = ?, amount = ?, description = ?
                WHERE id = ?
                "#,
            )
            .bind(&r.project_id)
            .bind(&r.worker_id)
            .bind(date_param(r.date))
            .bind(r.amount.to_string())
            .bind(&r.description)
            .bind(&r.id)
            .execute(executor)
            .await?;
        }
        TransactionRecord::InterProjectTransfer(r) => {
            sqlx::query(
                r#"
                UPDATE project_fund_transfers
                SET from_project_id = ?, to_project_id = ?, date = ?, amount = ?, description = ?
                WHERE id = ?
                "#,
            )
            .bind(&r.from_project_id)
            .bind(&r.to_project_id)
            .bind(date_param(r.date))
            .bind(r.amount.to_string())
            .bind(&r.description)
            .bind(&r.id)
            .execute(executor)
            .await?;
        }
    }
    Ok(())
}

async fn update_existing(conn: &mut SqliteConnection, record: &TransactionRecord) -> Result<Option<TransactionRecord>> {
    let previous = fetch_record(&mut *conn, record.kind(), record.id()).await?;
    if previous.is_some() {
        update_record(&mut *conn, record).await?;
    }
    Ok(previous)
}

async fn delete_existing(conn: &mut SqliteConnection, kind: TransactionKind, id: &str) -> Result<Option<TransactionRecord>> {
    let existing = fetch_record(&mut *conn, kind, id).await?;
    if existing.is_some() {
        let sql = format!("DELETE FROM {} WHERE id = ?", TransactionRepository::table_name(kind));
        sqlx::query(&sql).bind(id).execute(&mut *conn).await?;
    }
    Ok(existing)
}

async fn fetch_record<'e, E>(executor: E, kind: TransactionKind, id: &str) -> Result<Option<TransactionRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT * FROM {} WHERE id = ?", TransactionRepository::table_name(kind));
    let row = sqlx::query(&sql).bind(id).fetch_optional(executor).await?;
    row.map(|row| record_from_row(kind, &row)).transpose()
}

fn record_from_row(kind: TransactionKind, row: &SqliteRow) -> Result<TransactionRecord> {
    Ok(match kind {
        TransactionKind::FundTransfer => TransactionRecord::FundTransfer(fund_transfer_from_row(row)?),
        TransactionKind::WorkerAttendance => TransactionRecord::WorkerAttendance(attendance_from_row(row)?),
        TransactionKind::MaterialPurchase => TransactionRecord::MaterialPurchase(purchase_from_row(row)?),
        TransactionKind::TransportationExpense => {
            TransactionRecord::TransportationExpense(transportation_from_row(row)?)
        }
        TransactionKind::WorkerTransfer => TransactionRecord::WorkerTransfer(worker_transfer_from_row(row)?),
        TransactionKind::WorkerMiscExpense => TransactionRecord::WorkerMiscExpense(misc_expense_from_row(row)?),
        TransactionKind::InterProjectTransfer => {
            TransactionRecord::InterProjectTransfer(project_transfer_from_row(row)?)
        }
    })
}

fn fund_transfer_from_row(row: &SqliteRow) -> Result<FundTransfer> {
    Ok(FundTransfer {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        date: date_column(row, "date")?,
        amount: decimal_column(row, "amount")?,
        sender_name: row.try_get("sender_name")?,
        transfer_type: row.try_get("transfer_type")?,
        notes: row.try_get("notes")?,
    })
}

fn attendance_from_row(row: &SqliteRow) -> Result<WorkerAttendance> {
    Ok(WorkerAttendance {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        worker_id: row.try_get("worker_id")?,
        date: date_column(row, "date")?,
        daily_wage: decimal_column(row, "daily_wage")?,
        work_days: decimal_column(row, "work_days")?,
        paid_amount: decimal_column(row, "paid_amount")?,
    })
}

fn purchase_from_row(row: &SqliteRow) -> Result<MaterialPurchase> {
    let purchase_type: String = row.try_get("purchase_type")?;
    Ok(MaterialPurchase {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        date: date_column(row, "date")?,
        material_name: row.try_get("material_name")?,
        quantity: decimal_column(row, "quantity")?,
        unit_price: decimal_column(row, "unit_price")?,
        total_amount: decimal_column(row, "total_amount")?,
        purchase_type: purchase_type.parse().map_err(anyhow::Error::msg)?,
        supplier_name: row.try_get("supplier_name")?,
    })
}

fn transportation_from_row(row: &SqliteRow) -> Result<TransportationExpense> {
    Ok(TransportationExpense {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        date: date_column(row, "date")?,
        amount: decimal_column(row, "amount")?,
        description: row.try_get("description")?,
    })
}

fn worker_transfer_from_row(row: &SqliteRow) -> Result<WorkerTransfer> {
    Ok(WorkerTransfer {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        worker_id: row.try_get("worker_id")?,
        date: date_column(row, "date")?,
        amount: decimal_column(row, "amount")?,
        recipient_name: row.try_get("recipient_name")?,
    })
}

fn misc_expense_from_row(row: &SqliteRow) -> Result<WorkerMiscExpense> {
    Ok(WorkerMiscExpense {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        worker_id: row.try_get("worker_id")?,
        date: date_column(row, "date")?,
        amount: decimal_column(row, "amount")?,
        description: row.try_get("description")?,
    })
}

fn project_transfer_from_row(row: &SqliteRow) -> Result<InterProjectTransfer> {
    Ok(InterProjectTransfer {
        id: row.try_get("id")?,
        from_project_id: row.try_get("from_project_id")?,
        to_project_id: row.try_get("to_project_id")?,
        date: date_column(row, "date")?,
        amount: decimal_column(row, "amount")?,
        description: row.try_get("description")?,
    })
}

#[async_trait]
impl TransactionStorage for TransactionRepository {
    async fn store_transaction(&self, record: &TransactionRecord) -> Result<()> {
        insert_record(self.db.pool(), record).await?;
        debug!("Stored {} {}", record.kind(), record.id());
        Ok(())
    }

    async fn get_transaction(&self, kind: TransactionKind, id: &str) -> Result<Option<TransactionRecord>> {
        fetch_record(self.db.pool(), kind, id).await
    }

    async fn update_transaction(&self, record: &TransactionRecord) -> Result<Option<TransactionRecord>> {
        let mut tx = self.db.begin_write().await?;
        let result = update_existing(tx.connection()?, record).await;
        let previous = tx.finish(result).await?;

        if previous.is_some() {
            debug!("Updated {} {}", record.kind(), record.id());
        }
        Ok(previous)
    }

    async fn delete_transaction(&self, kind: TransactionKind, id: &str) -> Result<Option<TransactionRecord>> {
        let mut tx = self.db.begin_write().await?;
        let result = delete_existing(tx.connection()?, kind, id).await;
        tx.finish(result).await
    }

    async fn list_fund_transfers(&self, project_id: &str, date: NaiveDate) -> Result<Vec<FundTransfer>> {
        self.list_for_day(TransactionKind::FundTransfer, project_id, date, fund_transfer_from_row)
            .await
    }

    async fn list_attendance(&self, project_id: &str, date: NaiveDate) -> Result<Vec<WorkerAttendance>> {
        self.list_for_day(TransactionKind::WorkerAttendance, project_id, date, attendance_from_row)
            .await
    }

    async fn list_material_purchases(&self, project_id: &str, date: NaiveDate) -> Result<Vec<MaterialPurchase>> {
        self.list_for_day(TransactionKind::MaterialPurchase, project_id, date, purchase_from_row)
            .await
    }

    async fn list_transportation_expenses(&self, project_id: &str, date: NaiveDate) -> Result<Vec<TransportationExpense>> {
        self.list_for_day(TransactionKind::TransportationExpense, project_id, date, transportation_from_row)
            .await
    }

    async fn list_worker_transfers(&self, project_id: &str, date: NaiveDate) -> Result<Vec<WorkerTransfer>> {
        self.list_for_day(TransactionKind::WorkerTransfer, project_id, date, worker_transfer_from_row)
            .await
    }

    async fn list_worker_misc_expenses(&self, project_id: &str, date: NaiveDate) -> Result<Vec<WorkerMiscExpense>> {
        self.list_for_day(TransactionKind::WorkerMiscExpense, project_id, date, misc_expense_from_row)
            .await
    }

    async fn list_project_transfers(&self, project_id: &str, date: NaiveDate) -> Result<Vec<InterProjectTransfer>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM project_fund_transfers
            WHERE (from_project_id = ? OR to_project_id = ?) AND date = ?
            ORDER BY created_at, id
            "#,
        )
        .bind(project_id)
        .bind(project_id)
        .bind(date_param(date))
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(project_transfer_from_row).collect()
    }

    async fn list_worker_attendance_history(&self, worker_id: &str, project_id: &str) -> Result<Vec<WorkerAttendance>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM worker_attendance
            WHERE worker_id = ? AND project_id = ?
            ORDER BY date, created_at, id
            "#,
        )
        .bind(worker_id)
        .bind(project_id)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(attendance_from_row).collect()
    }

    async fn list_worker_transfer_history(&self, worker_id: &str, project_id: &str) -> Result<Vec<WorkerTransfer>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM worker_transfers
            WHERE worker_id = ? AND project_id = ?
            ORDER BY date, created_at, id
            "#,
        )
        .bind(worker_id)
        .bind(project_id)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(worker_transfer_from_row).collect()
    }

    async fn list_project_workers(&self, project_id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT worker_id FROM worker_attendance WHERE project_id = ?
            UNION
            SELECT worker_id FROM worker_transfers WHERE project_id = ?
            ORDER BY worker_id
            "#,
        )
        .bind(project_id)
        .bind(project_id)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter()
            .map(|row| Ok(row.try_get::<String, _>("worker_id")?))
            .collect()
    }

    async fn list_transaction_dates(&self, project_id: &str) -> Result<Vec<NaiveDate>> {
        let rows = sqlx::query(
            r#"
            SELECT date FROM fund_transfers WHERE project_id = ?
            UNION SELECT date FROM worker_attendance WHERE project_id = ?
            UNION SELECT date FROM material_purchases WHERE project_id = ?
            UNION SELECT date FROM transportation_expenses WHERE project_id = ?
            UNION SELECT date FROM worker_transfers WHERE project_id = ?
            UNION SELECT date FROM worker_misc_expenses WHERE project_id = ?
            UNION SELECT date FROM project_fund_transfers WHERE from_project_id = ? OR to_project_id = ?
            ORDER BY date
            "#,
        )
        .bind(project_id)
        .bind(project_id)
        .bind(project_id)
        .bind(project_id)
        .bind(project_id)
        .bind(project_id)
        .bind(project_id)
        .bind(project_id)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(|row| date_column(row, "date")).collect()
    }
}
