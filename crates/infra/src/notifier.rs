use async_trait::async_trait;

use bankapi_auth::{ActivationNotifier, Token, User};

/// Stand-in mailer: records the activation notice through `tracing`.
///
/// Only the recipient and the token's expiry are logged, never the token.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl ActivationNotifier for LogNotifier {
    async fn send_activation(&self, user: &User, token: &Token) -> anyhow::Result<()> {
        tracing::info!(
            user_id = %user.id,
            email = %user.email,
            expiry = %token.expiry,
            "activation notice sent"
        );
        Ok(())
    }
}
