use chrono::{DateTime, Utc};
use mockall::mock;
use msl_common::Money;
use settlement_engine::{
    db_types::{
        AdminUser,
        Dispute,
        FundRelease,
        Order,
        OrderId,
        RelatedDocument,
        ReturnRequest,
        Role,
        Roles,
        Store,
        StoreTier,
        SubOrder,
        SubOrderId,
        SubOrderStatusEntry,
        TransactionSource,
        Wallet,
        WalletTransaction,
        WithdrawalRequest,
        WithdrawalStatusEntry,
    },
    objects::{FullOrder, OrderQueryFilter, ReleaseQueryFilter, WithdrawalQueryFilter},
    policies::ReleasePolicy,
    AuthApiError,
    AuthManagement,
    LedgerManagement,
    LedgerQueryError,
    WalletLedger,
    WalletLedgerError,
};

mock! {
    pub AuthManager {}
    impl AuthManagement for AuthManager {
        async fn fetch_admin_user(&self, username: &str) -> Result<Option<AdminUser>, AuthApiError>;
        async fn create_admin_user(&self, username: &str, api_key_hash: &str, roles: &[Role]) -> Result<AdminUser, AuthApiError>;
        async fn fetch_roles_for_user(&self, username: &str) -> Result<Roles, AuthApiError>;
        async fn assign_roles(&self, username: &str, roles: &[Role]) -> Result<(), AuthApiError>;
        async fn revoke_roles(&self, username: &str, roles: &[Role]) -> Result<(), AuthApiError>;
        async fn admin_user_count(&self) -> Result<i64, AuthApiError>;
    }
    impl Clone for AuthManager {
        fn clone(&self) -> Self;
    }
}

mock! {
    pub LedgerManager {}
    impl LedgerManagement for LedgerManager {
        async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, LedgerQueryError>;
        async fn fetch_order_by_idempotency_key(&self, key: &str) -> Result<Option<Order>, LedgerQueryError>;
        async fn fetch_full_order(&self, order_id: &OrderId) -> Result<Option<FullOrder>, LedgerQueryError>;
        async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, LedgerQueryError>;
        async fn fetch_sub_order(&self, sub_order_id: &SubOrderId) -> Result<Option<SubOrder>, LedgerQueryError>;
        async fn sub_order_history(&self, sub_order_id: &SubOrderId) -> Result<Vec<SubOrderStatusEntry>, LedgerQueryError>;
        async fn fetch_release(&self, sub_order_id: &SubOrderId) -> Result<Option<FundRelease>, LedgerQueryError>;
        async fn search_releases(&self, query: ReleaseQueryFilter) -> Result<Vec<FundRelease>, LedgerQueryError>;
        async fn ready_releases(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<FundRelease>, LedgerQueryError>;
        async fn due_pending_releases(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<FundRelease>, LedgerQueryError>;
        async fn fetch_withdrawal(&self, request_ref: &str) -> Result<Option<WithdrawalRequest>, LedgerQueryError>;
        async fn withdrawal_history(&self, withdrawal_id: i64) -> Result<Vec<WithdrawalStatusEntry>, LedgerQueryError>;
        async fn search_withdrawals(&self, query: WithdrawalQueryFilter) -> Result<Vec<WithdrawalRequest>, LedgerQueryError>;
        async fn fetch_store(&self, store_id: &str) -> Result<Option<Store>, LedgerQueryError>;
        async fn fetch_policy(&self, tier: StoreTier) -> Result<ReleasePolicy, LedgerQueryError>;
        async fn returns_for_sub_order(&self, sub_order_id: &SubOrderId) -> Result<Vec<ReturnRequest>, LedgerQueryError>;
        async fn disputes_for_sub_order(&self, sub_order_id: &SubOrderId) -> Result<Vec<Dispute>, LedgerQueryError>;
    }
    impl Clone for LedgerManager {
        fn clone(&self) -> Self;
    }
}

mock! {
    pub WalletManager {}
    impl WalletLedger for WalletManager {
        async fn fetch_wallet(&self, store_id: &str) -> Result<Option<Wallet>, WalletLedgerError>;
        async fn fetch_or_create_wallet(&self, store_id: &str) -> Result<Wallet, WalletLedgerError>;
        async fn credit_wallet(
            &self,
            store_id: &str,
            amount: Money,
            source: TransactionSource,
            related: Option<RelatedDocument>,
            note: Option<String>,
        ) -> Result<(Wallet, WalletTransaction), WalletLedgerError>;
        async fn debit_wallet(
            &self,
            store_id: &str,
            amount: Money,
            source: TransactionSource,
            related: Option<RelatedDocument>,
            note: Option<String>,
        ) -> Result<(Wallet, WalletTransaction), WalletLedgerError>;
        async fn wallet_history(&self, store_id: &str) -> Result<Vec<WalletTransaction>, WalletLedgerError>;
        async fn replay_balance(&self, store_id: &str) -> Result<Money, WalletLedgerError>;
    }
    impl Clone for WalletManager {
        fn clone(&self) -> Self;
    }
}
