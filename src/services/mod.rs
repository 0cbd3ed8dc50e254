// src/services/mod.rs
pub mod accounts;
pub mod allowance;
pub mod billing;
pub mod credit_sweeper;
pub mod deduction;
pub mod failed_events;

pub use accounts::{AccountService, LedgerResourceCounter, ResourceCounter};
pub use allowance::AllowanceEngine;
pub use billing::BillingService;
pub use credit_sweeper::CreditSweeper;
pub use failed_events::FailedEventService;
