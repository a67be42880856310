use bankapi_auth::{Identity, User};

/// Identity resolved for a request by the authenticate middleware.
///
/// Present on every request that passed authentication, including anonymous
/// ones.
#[derive(Debug, Clone)]
pub struct IdentityContext {
    identity: Identity,
}

impl IdentityContext {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }
}

/// The authenticated user, inserted only after a gate chain that includes the
/// authenticated gate has passed.
#[derive(Debug, Clone)]
pub struct UserContext {
    user: User,
}

impl UserContext {
    pub fn new(user: User) -> Self {
        Self { user }
    }

    pub fn user(&self) -> &User {
        &self.user
    }
}
