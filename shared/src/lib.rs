use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category of a transaction record. Also used as the prefix of record IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    FundTransfer,
    WorkerAttendance,
    MaterialPurchase,
    TransportationExpense,
    WorkerTransfer,
    WorkerMiscExpense,
    InterProjectTransfer,
}

impl TransactionKind {
    pub const ALL: [TransactionKind; 7] = [
        TransactionKind::FundTransfer,
        TransactionKind::WorkerAttendance,
        TransactionKind::MaterialPurchase,
        TransactionKind::TransportationExpense,
        TransactionKind::WorkerTransfer,
        TransactionKind::WorkerMiscExpense,
        TransactionKind::InterProjectTransfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::FundTransfer => "fund_transfer",
            TransactionKind::WorkerAttendance => "worker_attendance",
            TransactionKind::MaterialPurchase => "material_purchase",
            TransactionKind::TransportationExpense => "transportation_expense",
            TransactionKind::WorkerTransfer => "worker_transfer",
            TransactionKind::WorkerMiscExpense => "worker_misc_expense",
            TransactionKind::InterProjectTransfer => "inter_project_transfer",
        }
    }

    /// Generate a record ID in format: "<kind>::<uuid>"
    pub fn generate_id(&self) -> String {
        format!("{}::{}", self.as_str(), uuid::Uuid::new_v4())
    }

    /// Recover the kind from a record ID produced by [`TransactionKind::generate_id`]
    pub fn from_id(id: &str) -> Result<Self, RecordIdError> {
        let (prefix, suffix) = id.split_once("::").ok_or(RecordIdError::InvalidFormat)?;
        if suffix.is_empty() {
            return Err(RecordIdError::InvalidFormat);
        }
        prefix.parse()
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = RecordIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| RecordIdError::UnknownKind(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordIdError {
    InvalidFormat,
    UnknownKind(String),
}

impl fmt::Display for RecordIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordIdError::InvalidFormat => write!(f, "Invalid record ID format"),
            RecordIdError::UnknownKind(kind) => write!(f, "Unknown transaction kind: {}", kind),
        }
    }
}

impl std::error::Error for RecordIdError {}

/// Cash injected into a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundTransfer {
    pub id: String,
    pub project_id: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub sender_name: String,
    pub transfer_type: String,
    pub notes: Option<String>,
}

/// One attendance entry for a worker on a given day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerAttendance {
    pub id: String,
    pub project_id: String,
    pub worker_id: String,
    pub date: NaiveDate,
    pub daily_wage: Decimal,
    /// Fraction of a day worked, e.g. 0.5 for a half day
    pub work_days: Decimal,
    /// Amount actually paid out for this entry (may be less than earned)
    pub paid_amount: Decimal,
}

impl WorkerAttendance {
    /// Wage earned for this entry: daily wage times days worked.
    /// `None` if the product leaves the decimal range.
    pub fn actual_wage(&self) -> Option<Decimal> {
        self.daily_wage.checked_mul(self.work_days)
    }

    /// What is still owed to the worker for this entry
    pub fn outstanding(&self) -> Option<Decimal> {
        self.actual_wage()?.checked_sub(self.paid_amount)
    }
}

/// How a material purchase was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseType {
    /// Paid on the spot
    Cash,
    /// Deferred payment, recorded as a payable
    Credit,
}

impl PurchaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseType::Cash => "cash",
            PurchaseType::Credit => "credit",
        }
    }
}

impl FromStr for PurchaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PurchaseType::Cash),
            "credit" | "deferred" => Ok(PurchaseType::Credit),
            other => Err(format!("Unknown purchase type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialPurchase {
    pub id: String,
    pub project_id: String,
    pub date: NaiveDate,
    pub material_name: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total_amount: Decimal,
    pub purchase_type: PurchaseType,
    pub supplier_name: Option<String>,
}

impl MaterialPurchase {
    pub fn is_cash_settled(&self) -> bool {
        self.purchase_type == PurchaseType::Cash
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportationExpense {
    pub id: String,
    pub project_id: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub description: String,
}

/// Money sent by a worker to their family, paid out of project cash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerTransfer {
    pub id: String,
    pub project_id: String,
    pub worker_id: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub recipient_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerMiscExpense {
    pub id: String,
    pub project_id: String,
    pub worker_id: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub description: String,
}

/// Funds moved from one project to another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterProjectTransfer {
    pub id: String,
    pub from_project_id: String,
    pub to_project_id: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub description: String,
}

/// Any transaction fact the ledger aggregates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransactionRecord {
    FundTransfer(FundTransfer),
    WorkerAttendance(WorkerAttendance),
    MaterialPurchase(MaterialPurchase),
    TransportationExpense(TransportationExpense),
    WorkerTransfer(WorkerTransfer),
    WorkerMiscExpense(WorkerMiscExpense),
    InterProjectTransfer(InterProjectTransfer),
}

impl TransactionRecord {
    pub fn kind(&self) -> TransactionKind {
        match self {
            TransactionRecord::FundTransfer(_) => TransactionKind::FundTransfer,
            TransactionRecord::WorkerAttendance(_) => TransactionKind::WorkerAttendance,
            TransactionRecord::MaterialPurchase(_) => TransactionKind::MaterialPurchase,
            TransactionRecord::TransportationExpense(_) => TransactionKind::TransportationExpense,
            TransactionRecord::WorkerTransfer(_) => TransactionKind::WorkerTransfer,
            TransactionRecord::WorkerMiscExpense(_) => TransactionKind::WorkerMiscExpense,
            TransactionRecord::InterProjectTransfer(_) => TransactionKind::InterProjectTransfer,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            TransactionRecord::FundTransfer(r) => &r.id,
            TransactionRecord::WorkerAttendance(r) => &r.id,
            TransactionRecord::MaterialPurchase(r) => &r.id,
            TransactionRecord::TransportationExpense(r) => &r.id,
            TransactionRecord::WorkerTransfer(r) => &r.id,
            TransactionRecord::WorkerMiscExpense(r) => &r.id,
            TransactionRecord::InterProjectTransfer(r) => &r.id,
        }
    }

    pub fn date(&self) -> NaiveDate {
        match self {
            TransactionRecord::FundTransfer(r) => r.date,
            TransactionRecord::WorkerAttendance(r) => r.date,
            TransactionRecord::MaterialPurchase(r) => r.date,
            TransactionRecord::TransportationExpense(r) => r.date,
            TransactionRecord::WorkerTransfer(r) => r.date,
            TransactionRecord::WorkerMiscExpense(r) => r.date,
            TransactionRecord::InterProjectTransfer(r) => r.date,
        }
    }

    /// Projects whose ledger this record touches. Inter-project transfers touch two.
    pub fn project_ids(&self) -> Vec<&str> {
        match self {
            TransactionRecord::FundTransfer(r) => vec![r.project_id.as_str()],
            TransactionRecord::WorkerAttendance(r) => vec![r.project_id.as_str()],
            TransactionRecord::MaterialPurchase(r) => vec![r.project_id.as_str()],
            TransactionRecord::TransportationExpense(r) => vec![r.project_id.as_str()],
            TransactionRecord::WorkerTransfer(r) => vec![r.project_id.as_str()],
            TransactionRecord::WorkerMiscExpense(r) => vec![r.project_id.as_str()],
            TransactionRecord::InterProjectTransfer(r) => {
                if r.from_project_id == r.to_project_id {
                    vec![r.from_project_id.as_str()]
                } else {
                    vec![r.from_project_id.as_str(), r.to_project_id.as_str()]
                }
            }
        }
    }

    /// Every (project, date) ledger day this record contributes to
    pub fn ledger_days(&self) -> Vec<(String, NaiveDate)> {
        let date = self.date();
        self.project_ids()
            .into_iter()
            .map(|project_id| (project_id.to_string(), date))
            .collect()
    }
}

/// Per-category sums for one project on one calendar day
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotals {
    pub fund_transfers: Decimal,
    /// Wages actually paid that day, not wages earned
    pub worker_wages: Decimal,
    /// Cash-settled purchases only
    pub material_costs: Decimal,
    pub transportation: Decimal,
    pub worker_transfers: Decimal,
    pub worker_misc_expenses: Decimal,
    pub incoming_project_transfers: Decimal,
    pub outgoing_project_transfers: Decimal,
}

impl CategoryTotals {
    /// Incoming minus outgoing inter-project transfers
    pub fn net_project_transfers(&self) -> Option<Decimal> {
        self.incoming_project_transfers
            .checked_sub(self.outgoing_project_transfers)
    }

    /// `None` if the sum leaves the decimal range
    pub fn total_expenses(&self) -> Option<Decimal> {
        [
            self.material_costs,
            self.transportation,
            self.worker_transfers,
            self.worker_misc_expenses,
        ]
        .into_iter()
        .try_fold(self.worker_wages, Decimal::checked_add)
    }
}

/// The persisted balance summary of one project on one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub project_id: String,
    pub date: NaiveDate,
    /// Remaining balance of the closest earlier day
    pub carried_forward_amount: Decimal,
    pub total_fund_transfers: Decimal,
    pub total_worker_wages: Decimal,
    pub total_material_costs: Decimal,
    pub total_transportation_costs: Decimal,
    pub total_worker_transfers: Decimal,
    pub total_worker_misc_expenses: Decimal,
    pub total_incoming_project_transfers: Decimal,
    pub total_outgoing_project_transfers: Decimal,
    pub total_income: Decimal,
    pub total_expenses: Decimal,
    pub remaining_balance: Decimal,
    pub created_at: DateTime<Utc>,
}

impl DailySummary {
    /// How far `income - expenses` is from the recorded remaining balance
    pub fn imbalance(&self) -> Option<Decimal> {
        let gap = self
            .total_income
            .checked_sub(self.total_expenses)?
            .checked_sub(self.remaining_balance)?;
        Some(gap.abs())
    }

    /// Same figures, ignoring when the row was created
    pub fn same_figures(&self, other: &DailySummary) -> bool {
        DailySummary {
            created_at: other.created_at,
            ..self.clone()
        } == *other
    }
}

/// A worker's lifetime position on one project. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerBalance {
    pub worker_id: String,
    pub project_id: String,
    pub total_earned: Decimal,
    pub total_paid: Decimal,
    pub total_transferred: Decimal,
    /// Positive means the project owes the worker, negative means overpaid
    pub current_balance: Decimal,
}

/// Why one date of a repair did not produce a summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateFailure {
    pub date: NaiveDate,
    pub reason: String,
}

/// Outcome of a full-history repair of one project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairReport {
    pub project_id: String,
    pub duplicates_removed: u64,
    pub recomputed: Vec<NaiveDate>,
    pub failures: Vec<DateFailure>,
}

impl RepairReport {
    pub fn new(project_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            duplicates_removed: 0,
            recomputed: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_half_day_attendance_wage() {
        let attendance = WorkerAttendance {
            id: "worker_attendance::1".to_string(),
            project_id: "site-a".to_string(),
            worker_id: "w1".to_string(),
            date: date("2025-03-01"),
            daily_wage: Decimal::from(200),
            work_days: Decimal::from_str("0.5").unwrap(),
            paid_amount: Decimal::from(100),
        };

        assert_eq!(attendance.actual_wage(), Some(Decimal::from(100)));
        assert_eq!(attendance.outstanding(), Some(Decimal::ZERO));
    }

    #[test]
    fn test_record_id_roundtrip() {
        let id = TransactionKind::MaterialPurchase.generate_id();
        assert!(id.starts_with("material_purchase::"));
        assert_eq!(TransactionKind::from_id(&id).unwrap(), TransactionKind::MaterialPurchase);

        assert_eq!(TransactionKind::from_id("no-separator"), Err(RecordIdError::InvalidFormat));
        assert_eq!(TransactionKind::from_id("fund_transfer::"), Err(RecordIdError::InvalidFormat));
        assert!(matches!(
            TransactionKind::from_id("payroll::123"),
            Err(RecordIdError::UnknownKind(_))
        ));
    }

    #[test]
    fn test_purchase_type_accepts_deferred_alias() {
        assert_eq!("cash".parse::<PurchaseType>().unwrap(), PurchaseType::Cash);
        assert_eq!("credit".parse::<PurchaseType>().unwrap(), PurchaseType::Credit);
        assert_eq!("deferred".parse::<PurchaseType>().unwrap(), PurchaseType::Credit);
        assert!("barter".parse::<PurchaseType>().is_err());
    }

    #[test]
    fn test_inter_project_transfer_touches_both_projects() {
        let record = TransactionRecord::InterProjectTransfer(InterProjectTransfer {
            id: "inter_project_transfer::1".to_string(),
            from_project_id: "site-a".to_string(),
            to_project_id: "site-b".to_string(),
            date: date("2025-03-02"),
            amount: Decimal::from(750),
            description: "Cement float".to_string(),
        });

        assert_eq!(
            record.ledger_days(),
            vec![
                ("site-a".to_string(), date("2025-03-02")),
                ("site-b".to_string(), date("2025-03-02")),
            ]
        );
    }

    #[test]
    fn test_category_totals_expenses_exclude_income_lines() {
        let totals = CategoryTotals {
            fund_transfers: Decimal::from(10_000),
            worker_wages: Decimal::from(2_000),
            material_costs: Decimal::from(1_500),
            transportation: Decimal::from(300),
            worker_transfers: Decimal::from(100),
            worker_misc_expenses: Decimal::from(50),
            incoming_project_transfers: Decimal::from(400),
            outgoing_project_transfers: Decimal::from(150),
        };

        assert_eq!(totals.total_expenses(), Some(Decimal::from(3_950)));
        assert_eq!(totals.net_project_transfers(), Some(Decimal::from(250)));
    }

    #[test]
    fn test_arithmetic_past_decimal_range_is_none() {
        let totals = CategoryTotals {
            worker_wages: Decimal::MAX,
            transportation: Decimal::ONE,
            ..CategoryTotals::default()
        };
        assert_eq!(totals.total_expenses(), None);

        let attendance = WorkerAttendance {
            id: "worker_attendance::1".to_string(),
            project_id: "site-a".to_string(),
            worker_id: "w1".to_string(),
            date: date("2025-03-01"),
            daily_wage: Decimal::MAX,
            work_days: Decimal::from(2),
            paid_amount: Decimal::ZERO,
        };
        assert_eq!(attendance.actual_wage(), None);
        assert_eq!(attendance.outstanding(), None);
    }

    #[test]
    fn test_record_serializes_with_kind_tag() {
        let record = TransactionRecord::TransportationExpense(TransportationExpense {
            id: "transportation_expense::1".to_string(),
            project_id: "site-a".to_string(),
            date: date("2025-03-02"),
            amount: Decimal::from(300),
            description: "Truck hire".to_string(),
        });

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "transportation_expense");
        assert_eq!(json["date"], "2025-03-02");

        let back: TransactionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
