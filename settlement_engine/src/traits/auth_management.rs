use thiserror::Error;

use crate::db_types::{AdminUser, Role, Roles};

#[derive(Debug, Clone, Error)]
pub enum AuthApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("No admin user named {0}")]
    UnknownAdmin(String),
    #[error("The provided API key is not valid")]
    InvalidApiKey,
    #[error("Admin user {0} already exists")]
    AdminAlreadyExists(String),
    #[error("Role has not been seeded in the database: {0}")]
    RoleNotFound(Role),
    #[error("Invalid request: {0}")]
    ValidationError(String),
}

impl From<sqlx::Error> for AuthApiError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}

/// Storage for admin users and their role assignments. API keys are stored as SHA-256 digests;
/// verification happens in the auth API, not here.
#[allow(async_fn_in_trait)]
pub trait AuthManagement: Clone {
    async fn fetch_admin_user(&self, username: &str) -> Result<Option<AdminUser>, AuthApiError>;

    async fn create_admin_user(&self, username: &str, api_key_hash: &str, roles: &[Role])
        -> Result<AdminUser, AuthApiError>;

    async fn fetch_roles_for_user(&self, username: &str) -> Result<Roles, AuthApiError>;

    /// Grants roles, ignoring any the user already holds.
    async fn assign_roles(&self, username: &str, roles: &[Role]) -> Result<(), AuthApiError>;

    async fn revoke_roles(&self, username: &str, roles: &[Role]) -> Result<(), AuthApiError>;

    async fn admin_user_count(&self) -> Result<i64, AuthApiError>;
}
