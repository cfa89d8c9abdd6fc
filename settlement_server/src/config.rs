use std::{env, fmt::Display, io::Write, net::IpAddr};

use log::*;
use msl_common::{parse_boolean_flag, Secret};
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use serde_json::json;
use tempfile::NamedTempFile;

use crate::errors::ServerError;

const DEFAULT_MSL_HOST: &str = "127.0.0.1";
const DEFAULT_MSL_PORT: u16 = 8360;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
const DEFAULT_AUTO_CONFIRM_GRACE_DAYS: i64 = 7;
pub const DEFAULT_SWEEP_LIMIT: i64 = 100;
const DEFAULT_TOKEN_LIFETIME_HOURS: i64 = 24;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub auth: AuthConfig,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address,
    /// rather than the connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address, rather
    /// than the connection's remote address.
    pub use_forwarded: bool,
    /// Storefront webhook configuration.
    pub storefront: StorefrontConfig,
    /// Background sweeper configuration.
    pub sweeper: SweeperConfig,
    /// Credentials for an admin account to create on a fresh database, so that the very first
    /// login is possible without poking at SQLite by hand.
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_MSL_HOST.to_string(),
            port: DEFAULT_MSL_PORT,
            database_url: String::default(),
            auth: AuthConfig::default(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            storefront: StorefrontConfig::default(),
            sweeper: SweeperConfig::default(),
            bootstrap_admin: None,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("MSL_HOST").ok().unwrap_or_else(|| DEFAULT_MSL_HOST.into());
        let port = env::var("MSL_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for MSL_PORT. {e} Using the default, {DEFAULT_MSL_PORT}, instead."
                    );
                    DEFAULT_MSL_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_MSL_PORT);
        let database_url = env::var("MSL_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ MSL_DATABASE_URL is not set. Please set it to the URL for the settlement ledger database.");
            String::default()
        });
        let auth = AuthConfig::try_from_env().unwrap_or_else(|e| {
            warn!(
                "🪛️ Could not load the authentication configuration from environment variables. {e}. Reverting to the \
                 default configuration."
            );
            AuthConfig::default()
        });
        let storefront = StorefrontConfig::from_env_or_default();
        let sweeper = SweeperConfig::from_env_or_default();
        let use_x_forwarded_for = parse_boolean_flag(env::var("MSL_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("MSL_USE_FORWARDED").ok(), false);
        let bootstrap_admin = BootstrapAdmin::from_env();
        Self { host, port, database_url, auth, use_x_forwarded_for, use_forwarded, storefront, sweeper, bootstrap_admin }
    }
}

//----------------------------------------  BootstrapAdmin  -----------------------------------------------------------

/// Seed credentials for the first admin account. Only used when the database has no admin users
/// at all; an existing installation ignores these entirely.
#[derive(Clone, Debug)]
pub struct BootstrapAdmin {
    pub username: String,
    pub api_key: Secret<String>,
}

impl BootstrapAdmin {
    pub fn from_env() -> Option<Self> {
        let username = env::var("MSL_BOOTSTRAP_ADMIN_USERNAME").ok();
        let api_key = env::var("MSL_BOOTSTRAP_ADMIN_API_KEY").ok();
        match (username, api_key) {
            (Some(username), Some(api_key)) => Some(Self { username, api_key: Secret::new(api_key) }),
            (None, None) => None,
            _ => {
                warn!(
                    "🪛️ Both MSL_BOOTSTRAP_ADMIN_USERNAME and MSL_BOOTSTRAP_ADMIN_API_KEY must be set to seed a \
                     bootstrap admin. Ignoring the one that was provided."
                );
                None
            },
        }
    }
}

//----------------------------------------  StorefrontConfig  ---------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct StorefrontConfig {
    /// The shared secret used to verify HMAC signatures on storefront webhook calls.
    pub hmac_secret: Secret<String>,
    /// When false, HMAC signatures on storefront calls are not checked. **DANGER**
    pub hmac_checks: bool,
    /// If supplied, requests against /storefront endpoints will be checked against a whitelist of
    /// IP addresses. To explicitly disable the whitelist, set this to "false", "none", or "0".
    pub whitelist: Option<Vec<IpAddr>>,
}

impl StorefrontConfig {
    pub fn from_env_or_default() -> Self {
        let hmac_secret = env::var("MSL_STOREFRONT_HMAC_SECRET").ok().unwrap_or_else(|| {
            error!(
                "🪛️ MSL_STOREFRONT_HMAC_SECRET is not set. Please set it to the shared secret for your storefront \
                 integration."
            );
            String::default()
        });
        let hmac_secret = Secret::new(hmac_secret);
        let hmac_checks = parse_boolean_flag(env::var("MSL_STOREFRONT_HMAC_CHECKS").ok(), true);
        if !hmac_checks {
            warn!("🚨️ Storefront HMAC checks are disabled. Do not run like this in production.");
        }
        let whitelist = env::var("MSL_STOREFRONT_IP_WHITELIST").ok().and_then(|s| {
            if ["none", "false", "0"].contains(&s.to_lowercase().as_str()) {
                info!(
                    "🪛️ The storefront IP whitelist is disabled. If this is not what you want, set \
                     MSL_STOREFRONT_IP_WHITELIST to a comma-separated list of IP addresses to enable it."
                );
                return None;
            }
            let ip_addrs = s
                .split(',')
                .filter_map(|s| {
                    s.trim()
                        .parse()
                        .map_err(|e| {
                            warn!("🪛️ Ignoring invalid IP address ({s}) in MSL_STOREFRONT_IP_WHITELIST: {e}");
                            None::<IpAddr>
                        })
                        .ok()
                })
                .collect::<Vec<IpAddr>>();
            Some(ip_addrs)
        });
        match &whitelist {
            Some(whitelist) if whitelist.is_empty() => {
                warn!(
                    "🚨️ The storefront IP whitelist was configured, but is empty. The server will run, but won't \
                     authorise any incoming storefront requests."
                );
            },
            None => {
                info!("🪛️ No storefront IP whitelist is set. Only HMAC validation will be used.");
            },
            Some(v) => {
                let addrs = v.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ");
                info!("🪛️ Storefront IP whitelist: {addrs}");
            },
        }
        Self { hmac_secret, hmac_checks, whitelist }
    }
}

//----------------------------------------  SweeperConfig  ------------------------------------------------------------

/// Settings for the background job that auto-confirms stale deliveries and pays out due releases.
#[derive(Clone, Copy, Debug)]
pub struct SweeperConfig {
    pub interval_secs: u64,
    pub auto_confirm_grace_days: i64,
    pub limit: i64,
    /// When false, the sweeper still evaluates due releases but leaves the payouts for an
    /// operator to approve one by one.
    pub auto_release: bool,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            auto_confirm_grace_days: DEFAULT_AUTO_CONFIRM_GRACE_DAYS,
            limit: DEFAULT_SWEEP_LIMIT,
            auto_release: true,
        }
    }
}

impl SweeperConfig {
    pub fn from_env_or_default() -> Self {
        let interval_secs = parse_env_int("MSL_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS);
        let auto_confirm_grace_days = parse_env_int("MSL_AUTO_CONFIRM_GRACE_DAYS", DEFAULT_AUTO_CONFIRM_GRACE_DAYS);
        let limit = parse_env_int("MSL_SWEEP_LIMIT", DEFAULT_SWEEP_LIMIT);
        let auto_release = parse_boolean_flag(env::var("MSL_AUTO_RELEASE").ok(), true);
        if !auto_release {
            info!("🪛️ Automatic payouts are disabled. Ready releases will wait for an operator.");
        }
        Self { interval_secs, auto_confirm_grace_days, limit, auto_release }
    }
}

fn parse_env_int<T: std::str::FromStr + Display>(var: &str, default: T) -> T
where T::Err: Display {
    match env::var(var) {
        Ok(s) => s.parse::<T>().unwrap_or_else(|e| {
            warn!("🪛️ Invalid configuration value for {var}: {e}. Using the default, {default}.");
            default
        }),
        Err(_) => default,
    }
}

//-------------------------------------------  AuthConfig  ------------------------------------------------------------

/// The minimum length for the JWT signing secret. Anything shorter is trivially brute-forceable.
pub const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// The secret used to sign and verify JWT access tokens (HMAC-SHA256).
    pub jwt_secret: Secret<String>,
    /// How long issued access tokens remain valid.
    pub token_lifetime_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        let mut tmpfile = NamedTempFile::new().ok().and_then(|f| f.keep().ok());
        warn!(
            "🚨️🚨️🚨️ The JWT signing secret has not been set. I'm using a random value for this session. DO NOT \
             operate on production like this since all access tokens will be invalidated when the server restarts. \
             🚨️🚨️🚨️"
        );
        let secret = thread_rng().sample_iter(&Alphanumeric).take(48).map(char::from).collect::<String>();
        match &mut tmpfile {
            Some((f, p)) => {
                let key_data = json!({ "jwt_secret": secret }).to_string();
                match writeln!(f, "{key_data}") {
                    Ok(()) => warn!(
                        "🚨️🚨️🚨️ The JWT signing secret for this session was written to {}. If this is a production \
                         instance, you are doing it wrong! Set the MSL_JWT_SECRET environment variable instead. \
                         🚨️🚨️🚨️",
                        p.to_str().unwrap_or("???")
                    ),
                    Err(e) => warn!("🪛️ Could not write the JWT signing secret to the temporary file. {e}"),
                }
            },
            None => {
                warn!("🪛️ Could not create a temporary file to store the JWT signing secret.");
            },
        }
        Self { jwt_secret: Secret::new(secret), token_lifetime_hours: DEFAULT_TOKEN_LIFETIME_HOURS }
    }
}

impl AuthConfig {
    pub fn new(secret: &str) -> Self {
        Self { jwt_secret: Secret::new(secret.to_string()), token_lifetime_hours: DEFAULT_TOKEN_LIFETIME_HOURS }
    }

    pub fn try_from_env() -> Result<Self, ServerError> {
        let secret =
            env::var("MSL_JWT_SECRET").map_err(|e| ServerError::ConfigurationError(format!("{e} [MSL_JWT_SECRET]")))?;
        if secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ServerError::ConfigurationError(format!(
                "MSL_JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} characters long"
            )));
        }
        let token_lifetime_hours = parse_env_int("MSL_TOKEN_LIFETIME_HOURS", DEFAULT_TOKEN_LIFETIME_HOURS);
        if token_lifetime_hours <= 0 {
            return Err(ServerError::ConfigurationError(
                "MSL_TOKEN_LIFETIME_HOURS must be a positive number of hours".to_string(),
            ));
        }
        Ok(Self { jwt_secret: Secret::new(secret), token_lifetime_hours })
    }
}
