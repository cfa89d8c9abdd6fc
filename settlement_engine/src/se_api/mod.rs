//! # Settlement engine public API
//!
//! The `se_api` module exposes the programmatic API for the settlement engine. The API is
//! modular, so clients can pick and choose the functionality they need, or run different parts
//! (say, auth and order flow) on different machines.
//!
//! * [`order_flow_api`] handles marketplace order events: placement, payment outcomes, delivery
//!   progress, returns and disputes.
//! * [`release_api`] drives the fund release lifecycle, from condition evaluation through payout
//!   and reversal, including the scheduled sweep.
//! * [`wallet_api`] reads store wallets, applies manual adjustments and reconciles the ledger.
//! * [`withdrawal_api`] creates and adjudicates withdrawal requests.
//! * [`ledger_api`] is the read-only query surface for admin tooling.
//! * [`auth_api`] verifies admin API keys and manages role assignments.
//!
//! # API usage
//!
//! The pattern is the same for all of them: construct the API with a storage backend that
//! implements the traits the API needs.
//!
//! ```rust,ignore
//! use settlement_engine::{ReleaseApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/ledger.db", 5).await?;
//! let api = ReleaseApi::new(db, producers);
//! let outcome = api.release(&sub_order_id, "cron").await?;
//! ```

pub mod auth_api;
pub mod ledger_api;
pub mod objects;
pub mod order_flow_api;
pub mod release_api;
pub mod wallet_api;
pub mod withdrawal_api;

pub use auth_api::AuthApi;
pub use ledger_api::LedgerApi;
pub use objects::{
    FullOrder,
    FullSubOrder,
    OrderQueryFilter,
    ReleaseQueryFilter,
    SweepSummary,
    WalletReconciliation,
    WithdrawalQueryFilter,
};
pub use order_flow_api::OrderFlowApi;
pub use release_api::ReleaseApi;
pub use wallet_api::WalletApi;
pub use withdrawal_api::WithdrawalApi;
