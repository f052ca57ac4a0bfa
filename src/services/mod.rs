pub mod auth;
pub mod ledger;
pub mod notifier;
pub mod outcome;
pub mod policy_store;
pub mod price_feed;
pub mod scheduler;
pub mod trading;

pub use auth::{AuthError, AuthService, Identity, Role};
pub use ledger::{LedgerError, SettledTrade, TradeLedger};
pub use notifier::NotificationBus;
pub use outcome::Settlement;
pub use policy_store::PolicyStore;
pub use price_feed::PriceFeed;
pub use scheduler::SettlementScheduler;
pub use trading::{TradeError, TradeService};
