use thiserror::Error;

use crate::identity::Identity;
use crate::permissions::{Permission, Permissions};
use crate::store::{AccountStore, StoreError};
use crate::user::User;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("you must be authenticated to access this resource")]
    AuthenticationRequired,

    #[error("your user account must be activated to access this resource")]
    NotActivated,

    #[error("forbidden: missing permission '{0}'")]
    NotPermitted(Permission),

    /// Permission lookup failed. Never treated as a denial.
    #[error(transparent)]
    Store(StoreError),
}

/// Pure permission check against an already resolved set.
pub fn authorize(permissions: &Permissions, required: &Permission) -> Result<(), AuthzError> {
    if permissions.include(required) {
        Ok(())
    } else {
        Err(AuthzError::NotPermitted(required.clone()))
    }
}

/// A single capability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    Authenticated,
    Activated,
    Permission(Permission),
}

impl Gate {
    async fn check(&self, identity: &Identity, store: &dyn AccountStore) -> Result<(), AuthzError> {
        match self {
            Gate::Authenticated => required_user(identity).map(|_| ()),
            Gate::Activated => {
                if required_user(identity)?.activated {
                    Ok(())
                } else {
                    Err(AuthzError::NotActivated)
                }
            }
            Gate::Permission(code) => {
                let user = required_user(identity)?;
                let permissions = store
                    .get_permissions_for_user(user.id)
                    .await
                    .map_err(AuthzError::Store)?;
                authorize(&permissions, code)
            }
        }
    }
}

fn required_user(identity: &Identity) -> Result<&User, AuthzError> {
    identity.user().ok_or(AuthzError::AuthenticationRequired)
}

/// Ordered gates, evaluated front to back, stopping at the first failure.
///
/// Every outer gate relies on the postcondition of the ones before it, so
/// chains are only built through the constructors below:
///
/// | constructor     | gates                                   |
/// |-----------------|-----------------------------------------|
/// | `anonymous`     | (none)                                  |
/// | `authenticated` | Authenticated                           |
/// | `activated`     | Authenticated, Activated                |
/// | `permission`    | Authenticated, Activated, Permission(c) |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateChain(Vec<Gate>);

impl GateChain {
    pub fn anonymous() -> Self {
        Self(Vec::new())
    }

    pub fn authenticated() -> Self {
        Self(vec![Gate::Authenticated])
    }

    pub fn activated() -> Self {
        Self(vec![Gate::Authenticated, Gate::Activated])
    }

    pub fn permission(code: Permission) -> Self {
        Self(vec![
            Gate::Authenticated,
            Gate::Activated,
            Gate::Permission(code),
        ])
    }

    pub fn gates(&self) -> &[Gate] {
        &self.0
    }

    pub async fn check(&self, identity: &Identity, store: &dyn AccountStore) -> Result<(), AuthzError> {
        for gate in &self.0 {
            gate.check(identity, store).await?;
        }
        Ok(())
    }
}
