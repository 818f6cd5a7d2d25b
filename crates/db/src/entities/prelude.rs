//! Entity re-exports.

pub use super::account_balances::Entity as AccountBalances;
pub use super::fiscal_periods::Entity as FiscalPeriods;
pub use super::journal_entries::Entity as JournalEntries;
pub use super::journal_postings::Entity as JournalPostings;
pub use super::outbox_events::Entity as OutboxEvents;
