//! Builders shared by the storage and domain tests.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use shared::{
    DailySummary, FundTransfer, InterProjectTransfer, MaterialPurchase, PurchaseType,
    TransactionKind, TransactionRecord, TransportationExpense, WorkerAttendance,
    WorkerMiscExpense, WorkerTransfer,
};
use std::str::FromStr;

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("test date must be YYYY-MM-DD")
}

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).expect("test amount must be a decimal")
}

pub fn fund_transfer(project_id: &str, day: NaiveDate, amount: &str) -> TransactionRecord {
    TransactionRecord::FundTransfer(FundTransfer {
        id: TransactionKind::FundTransfer.generate_id(),
        project_id: project_id.to_string(),
        date: day,
        amount: dec(amount),
        sender_name: "Head office".to_string(),
        transfer_type: "bank".to_string(),
        notes: None,
    })
}

pub fn attendance(
    project_id: &str,
    worker_id: &str,
    day: NaiveDate,
    daily_wage: &str,
    work_days: &str,
    paid_amount: &str,
) -> TransactionRecord {
    TransactionRecord::WorkerAttendance(WorkerAttendance {
        id: TransactionKind::WorkerAttendance.generate_id(),
        project_id: project_id.to_string(),
        worker_id: worker_id.to_string(),
        date: day,
        daily_wage: dec(daily_wage),
        work_days: dec(work_days),
        paid_amount: dec(paid_amount),
    })
}

fn purchase(project_id: &str, day: NaiveDate, amount: &str, purchase_type: PurchaseType) -> TransactionRecord {
    TransactionRecord::MaterialPurchase(MaterialPurchase {
        id: TransactionKind::MaterialPurchase.generate_id(),
        project_id: project_id.to_string(),
        date: day,
        material_name: "Cement".to_string(),
        quantity: Decimal::ONE,
        unit_price: dec(amount),
        total_amount: dec(amount),
        purchase_type,
        supplier_name: Some("Builders Depot".to_string()),
    })
}

pub fn cash_purchase(project_id: &str, day: NaiveDate, amount: &str) -> TransactionRecord {
    purchase(project_id, day, amount, PurchaseType::Cash)
}

pub fn credit_purchase(project_id: &str, day: NaiveDate, amount: &str) -> TransactionRecord {
    purchase(project_id, day, amount, PurchaseType::Credit)
}

pub fn transportation(project_id: &str, day: NaiveDate, amount: &str) -> TransactionRecord {
    TransactionRecord::TransportationExpense(TransportationExpense {
        id: TransactionKind::TransportationExpense.generate_id(),
        project_id: project_id.to_string(),
        date: day,
        amount: dec(amount),
        description: "Truck hire".to_string(),
    })
}

pub fn worker_transfer(project_id: &str, worker_id: &str, day: NaiveDate, amount: &str) -> TransactionRecord {
    TransactionRecord::WorkerTransfer(WorkerTransfer {
        id: TransactionKind::WorkerTransfer.generate_id(),
        project_id: project_id.to_string(),
        worker_id: worker_id.to_string(),
        date: day,
        amount: dec(amount),
        recipient_name: "Family".to_string(),
    })
}

pub fn misc_expense(project_id: &str, worker_id: &str, day: NaiveDate, amount: &str) -> TransactionRecord {
    TransactionRecord::WorkerMiscExpense(WorkerMiscExpense {
        id: TransactionKind::WorkerMiscExpense.generate_id(),
        project_id: project_id.to_string(),
        worker_id: worker_id.to_string(),
        date: day,
        amount: dec(amount),
        description: "Meals".to_string(),
    })
}

pub fn project_transfer(from_project_id: &str, to_project_id: &str, day: NaiveDate, amount: &str) -> TransactionRecord {
    TransactionRecord::InterProjectTransfer(InterProjectTransfer {
        id: TransactionKind::InterProjectTransfer.generate_id(),
        from_project_id: from_project_id.to_string(),
        to_project_id: to_project_id.to_string(),
        date: day,
        amount: dec(amount),
        description: "Float".to_string(),
    })
}

/// A summary row whose only non-zero figures are the carry-forward and the totals
pub fn summary_row(project_id: &str, day: NaiveDate, carried: &str, income: &str, expenses: &str) -> DailySummary {
    DailySummary {
        project_id: project_id.to_string(),
        date: day,
        carried_forward_amount: dec(carried),
        total_fund_transfers: Decimal::ZERO,
        total_worker_wages: Decimal::ZERO,
        total_material_costs: Decimal::ZERO,
        total_transportation_costs: Decimal::ZERO,
        total_worker_transfers: Decimal::ZERO,
        total_worker_misc_expenses: Decimal::ZERO,
        total_incoming_project_transfers: Decimal::ZERO,
        total_outgoing_project_transfers: Decimal::ZERO,
        total_income: dec(income),
        total_expenses: dec(expenses),
        remaining_balance: dec(income) - dec(expenses),
        created_at: Utc::now(),
    }
}
