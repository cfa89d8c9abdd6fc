use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{AdminUser, Role, Roles},
    helpers::hash_api_key,
    traits::{AuthApiError, AuthManagement},
};

const MIN_API_KEY_LEN: usize = 24;

/// `AuthApi` verifies admin API keys and manages admin accounts and their roles.
///
/// Keys are never stored or compared in the clear. The database holds a SHA-256 digest, the
/// caller presents the raw key, and [`AuthApi::authenticate_api_key`] compares digests.
pub struct AuthApi<B> {
    db: B,
}

impl<B> Debug for AuthApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuthApi")
    }
}

impl<B> AuthApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> AuthApi<B>
where B: AuthManagement
{
    /// Checks `api_key` against the stored digest for `username` and returns the user's roles on
    /// success. Unknown users and bad keys are reported as distinct errors so callers can log
    /// them differently, but route handlers should collapse both into a 401.
    pub async fn authenticate_api_key(&self, username: &str, api_key: &str) -> Result<Roles, AuthApiError> {
        let user = self
            .db
            .fetch_admin_user(username)
            .await?
            .ok_or_else(|| AuthApiError::UnknownAdmin(username.to_string()))?;
        if hash_api_key(api_key) != user.api_key_hash {
            warn!("🧑️ Failed API key authentication attempt for {username}");
            return Err(AuthApiError::InvalidApiKey);
        }
        self.db.fetch_roles_for_user(username).await
    }

    /// Creates an admin user, storing only the digest of the API key.
    pub async fn create_admin_user(
        &self,
        username: &str,
        api_key: &str,
        roles: &[Role],
    ) -> Result<AdminUser, AuthApiError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AuthApiError::ValidationError("Username must not be empty".to_string()));
        }
        if api_key.len() < MIN_API_KEY_LEN {
            return Err(AuthApiError::ValidationError(format!(
                "API keys must be at least {MIN_API_KEY_LEN} characters long"
            )));
        }
        let hash = hash_api_key(api_key);
        self.db.create_admin_user(username, &hash, roles).await
    }

    pub async fn fetch_admin_user(&self, username: &str) -> Result<Option<AdminUser>, AuthApiError> {
        self.db.fetch_admin_user(username).await
    }

    pub async fn roles_for_user(&self, username: &str) -> Result<Roles, AuthApiError> {
        self.db.fetch_roles_for_user(username).await
    }

    pub async fn assign_roles(&self, username: &str, roles: &[Role]) -> Result<(), AuthApiError> {
        info!("🧑️ Granting {username} the roles {roles:?}");
        self.db.assign_roles(username, roles).await
    }

    pub async fn revoke_roles(&self, username: &str, roles: &[Role]) -> Result<(), AuthApiError> {
        info!("🧑️ Revoking the roles {roles:?} from {username}");
        self.db.revoke_roles(username, roles).await
    }

    pub async fn admin_user_count(&self) -> Result<i64, AuthApiError> {
        self.db.admin_user_count().await
    }
}
