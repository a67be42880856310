use async_trait::async_trait;

use crate::token::Token;
use crate::user::User;

/// Delivers a freshly issued activation token to its owner.
///
/// Called in the background after registration; a failure is logged by the
/// caller and never fails the request.
#[async_trait]
pub trait ActivationNotifier: Send + Sync {
    async fn send_activation(&self, user: &User, token: &Token) -> anyhow::Result<()>;
}
