//! Service wiring: store selection, account flows and the request
//! authenticator, all built from one [`ApiConfig`].

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use bankapi_auth::{
    AccountService, AccountStore, ActivationNotifier, AuthMode, Authenticator, Hs256Jwt,
    InMemoryAccountStore, PasswordHasher, Registration, TokenPolicy,
};
use bankapi_infra::{PostgresAccountStore, TimeoutStore};

use crate::config::ApiConfig;

pub struct AppServices {
    pub environment: String,
    pub store: Arc<dyn AccountStore>,
    pub accounts: AccountService,
    pub authenticator: Authenticator,
    pub notifier: Arc<dyn ActivationNotifier>,
}

impl AppServices {
    /// Fire-and-forget delivery; a failure is logged and never reaches the
    /// client.
    pub fn notify_activation(&self, registration: Registration) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            let Registration { user, activation } = registration;
            if let Err(e) = notifier.send_activation(&user, &activation).await {
                tracing::error!(user_id = %user.id, error = %e, "failed to send activation token");
            }
        });
    }
}

/// Connect to Postgres when `DATABASE_URL` is set, otherwise fall back to the
/// in-memory store. Either way every call is bounded by the store timeout.
pub async fn build_store(config: &ApiConfig) -> anyhow::Result<Arc<dyn AccountStore>> {
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(25)
                .acquire_timeout(config.store_timeout)
                .connect(url)
                .await
                .context("failed to connect to postgres")?;
            let store = PostgresAccountStore::new(pool);
            store.migrate().await.context("failed to apply schema")?;
            tracing::info!("using postgres account store");
            Ok(Arc::new(TimeoutStore::new(store, config.store_timeout)))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; accounts are kept in memory");
            Ok(Arc::new(TimeoutStore::new(
                InMemoryAccountStore::new(),
                config.store_timeout,
            )))
        }
    }
}

pub fn build_services(
    config: &ApiConfig,
    store: Arc<dyn AccountStore>,
    notifier: Arc<dyn ActivationNotifier>,
) -> anyhow::Result<AppServices> {
    let hasher = PasswordHasher::new(config.bcrypt_cost).context("invalid bcrypt cost")?;
    let signer = Arc::new(Hs256Jwt::new(
        config.jwt_secret.as_bytes(),
        config.jwt_issuer.clone(),
        config.auth_token_ttl,
    ));

    let accounts = AccountService::new(store.clone(), signer.clone())
        .with_hasher(hasher)
        .with_token_policy(TokenPolicy {
            activation_ttl: config.activation_ttl,
            authentication_ttl: config.auth_token_ttl,
        })
        .with_default_permissions(config.default_permissions.clone());

    let authenticator = match config.auth_mode {
        AuthMode::Opaque => Authenticator::opaque(store.clone()),
        AuthMode::SignedClaims => Authenticator::signed_claims(store.clone(), signer),
    };

    Ok(AppServices {
        environment: config.env.clone(),
        store,
        accounts,
        authenticator,
        notifier,
    })
}
