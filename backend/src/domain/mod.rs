//! # Domain Module
//!
//! The ledger engine. Everything here is generic over
//! [`Connection`](crate::storage::Connection) and talks to storage only
//! through its repositories.
//!
//! - [`BalanceCalculator`]: per-category totals of one project day
//! - [`CarryForwardResolver`]: opening balance from the previous persisted day
//! - [`RecomputeService`]: single-day recompute, full-history repair, reporting reads
//! - [`RecomputeQueue`]: coalescing fire-and-forget recomputes
//! - [`TransactionService`]: mutations that schedule recomputes
//! - [`WorkerBalanceService`]: what each worker is owed

pub mod balance_calculator;
pub mod carry_forward;
pub mod errors;
pub mod recompute_queue;
pub mod recompute_service;
pub mod transaction_service;
pub mod worker_balance_service;
pub mod write_locks;

pub use balance_calculator::BalanceCalculator;
pub use carry_forward::CarryForwardResolver;
pub use errors::{LedgerError, LedgerResult, RecordValidationError};
pub use recompute_queue::RecomputeQueue;
pub use recompute_service::RecomputeService;
pub use transaction_service::TransactionService;
pub use worker_balance_service::WorkerBalanceService;
pub use write_locks::{ProjectWriteGuard, ProjectWriteLocks};
