//! Business logic services

pub mod analytics;
pub mod clock;
pub mod inventory;
pub mod ledger;
pub mod loan_state;
pub mod stats;
pub mod sweeper;

use crate::{config::AppConfig, repository::SharedStore};

use self::{
    clock::SharedClock,
    ledger::{LedgerSettings, LendingLedger},
    loan_state::{FinePolicy, LoanStateMachine},
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub ledger: ledger::LendingLedger,
    pub analytics: analytics::AnalyticsService,
    pub stats: stats::StatsService,
}

impl Services {
    /// Create all services over the given store
    pub fn new(store: SharedStore, clock: SharedClock, config: &AppConfig) -> Self {
        let machine = LoanStateMachine::new(FinePolicy::new(config.lending.fine_per_day));
        Self {
            ledger: LendingLedger::new(
                store.clone(),
                machine,
                clock.clone(),
                LedgerSettings::from(&config.lending),
            ),
            analytics: analytics::AnalyticsService::new(
                store.clone(),
                clock,
                config.analytics.clone(),
            ),
            stats: stats::StatsService::new(store),
        }
    }
}
