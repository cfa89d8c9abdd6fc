//! Marketplace Settlement Engine
//!
//! The settlement engine is the ledger of record for a multi-vendor marketplace. It tracks every
//! store's money from the moment a buyer pays until the store withdraws it: order capture,
//! escrowed fund releases with per-tier settlement policies, store wallets with an append-only
//! transaction ledger, and the withdrawal request flow.
//!
//! The library is divided into two main sections:
//! 1. Database management and control ([`mod@sqlite`]). Sqlite is the supported backend. You
//!    should never need to access the database directly. Instead, use the public API provided by
//!    the engine. The exception is the data types used in the database. These are defined in the
//!    `db_types` module and are public.
//! 2. The settlement engine public API ([`mod@se_api`]). This provides the public-facing
//!    functionality of the engine. It is responsible for orders, fund releases, wallets,
//!    withdrawals and authentication. Specific backends need to implement the traits in
//!    [`mod@traits`] in order to act as a backend for the settlement server.
//!
//! The engine also provides a set of events that can be subscribed to. These events are emitted
//! when certain actions occur within the engine. For example, when a sub-order's funds are paid
//! out to the store wallet, a `FundsReleasedEvent` is emitted. A simple actor framework is used
//! so that you can easily hook into these events and perform custom actions.
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod policies;
mod se_api;
#[cfg(feature = "sqlite")]
pub mod sqlite;
mod traits;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use se_api::{
    auth_api::AuthApi,
    ledger_api::LedgerApi,
    objects,
    order_flow_api::OrderFlowApi,
    release_api::ReleaseApi,
    wallet_api::WalletApi,
    withdrawal_api::WithdrawalApi,
};
pub use traits::{
    AuthApiError,
    AuthManagement,
    EvaluationOutcome,
    LedgerManagement,
    LedgerQueryError,
    ReleaseOutcome,
    ReturnUpdate,
    SettlementDatabase,
    SettlementError,
    WalletLedger,
    WalletLedgerError,
    WithdrawalError,
    WithdrawalManagement,
};
