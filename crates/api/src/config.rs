//! Process configuration, read once from the environment at startup.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};

use bankapi_auth::{AuthMode, Permission, password};
use bankapi_infra::DEFAULT_STORE_TIMEOUT;

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Clone)]
pub struct ApiConfig {
    /// Deployment environment name (`development`, `staging`, `production`).
    pub env: String,
    pub addr: SocketAddr,
    /// Postgres DSN. `None` runs against the in-memory store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub auth_mode: AuthMode,
    pub store_timeout: Duration,
    pub bcrypt_cost: u32,
    pub activation_ttl: chrono::Duration,
    pub auth_token_ttl: chrono::Duration,
    pub default_permissions: Vec<Permission>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            env: "development".to_string(),
            addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            database_url: None,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            jwt_issuer: "bankapi".to_string(),
            auth_mode: AuthMode::Opaque,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            bcrypt_cost: 12,
            activation_ttl: chrono::Duration::hours(72),
            auth_token_ttl: chrono::Duration::hours(24),
            default_permissions: vec![bankapi_auth::permissions::ACCOUNTS_READ],
        }
    }
}

impl core::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("env", &self.env)
            .field("addr", &self.addr)
            .field("database", &self.database_url.as_ref().map(|_| "postgres"))
            .field("jwt_issuer", &self.jwt_issuer)
            .field("auth_mode", &self.auth_mode)
            .field("store_timeout", &self.store_timeout)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .finish_non_exhaustive()
    }
}

impl ApiConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let env = get("BANKAPI_ENV").unwrap_or(defaults.env);

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None if env == "production" => bail!("JWT_SECRET must be set in production"),
            None => {
                tracing::warn!("JWT_SECRET not set; using insecure dev default");
                defaults.jwt_secret
            }
        };

        let bcrypt_cost = parse_or(&get, "BCRYPT_COST", defaults.bcrypt_cost)?;
        if !(password::MIN_COST..=password::MAX_COST).contains(&bcrypt_cost) {
            bail!(
                "BCRYPT_COST must be within {}..={}",
                password::MIN_COST,
                password::MAX_COST
            );
        }

        let auth_mode = match get("AUTH_MODE") {
            Some(raw) => AuthMode::from_str(&raw).map_err(anyhow::Error::msg)?,
            None => defaults.auth_mode,
        };

        let default_permissions = match get("DEFAULT_PERMISSIONS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|code| !code.is_empty())
                .map(|code| Permission::new(code.to_string()))
                .collect(),
            None => defaults.default_permissions,
        };

        Ok(Self {
            env,
            addr: parse_or(&get, "BANKAPI_ADDR", defaults.addr)?,
            database_url: get("DATABASE_URL"),
            jwt_secret,
            jwt_issuer: get("JWT_ISSUER").unwrap_or(defaults.jwt_issuer),
            auth_mode,
            store_timeout: Duration::from_secs(parse_or(
                &get,
                "STORE_TIMEOUT_SECS",
                defaults.store_timeout.as_secs(),
            )?),
            bcrypt_cost,
            activation_ttl: chrono::Duration::hours(parse_or(
                &get,
                "ACTIVATION_TOKEN_TTL_HOURS",
                defaults.activation_ttl.num_hours(),
            )?),
            auth_token_ttl: chrono::Duration::hours(parse_or(
                &get,
                "AUTH_TOKEN_TTL_HOURS",
                defaults.auth_token_ttl.num_hours(),
            )?),
            default_permissions,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}
