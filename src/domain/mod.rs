//! Typed views over the persisted state layout (§6 of the design docs).
//!
//! Each entity here is a thin `sqlx::FromRow` wrapper around one table;
//! business logic lives in the components that consume these, not on the
//! structs themselves.

pub mod expense;
pub mod job;
pub mod payment;
pub mod seller;
pub mod sync_state;

pub use expense::{Expense, ExpenseBatch, ExpenseBatchItem, ExpenseDirection, ExpenseSource, ExpenseStatus};
pub use job::{Job, JobKind, JobStatus};
pub use payment::{Payment, PaymentProcessingStatus};
pub use seller::{BackfillStatus, IntegrationMode, OnboardingStatus, Seller};
pub use sync_state::SyncState;
