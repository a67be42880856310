use crate::user::User;

/// The identity attached to a request once authentication has run.
///
/// Anonymous is an explicit variant, checked by tag. It carries no user id
/// and never satisfies an authenticated check.
#[derive(Debug, Clone)]
pub enum Identity {
    Anonymous,
    Authenticated(User),
}

impl Identity {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous)
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Identity::Anonymous => None,
            Identity::Authenticated(user) => Some(user),
        }
    }

    pub fn into_user(self) -> Option<User> {
        match self {
            Identity::Anonymous => None,
            Identity::Authenticated(user) => Some(user),
        }
    }
}

impl From<User> for Identity {
    fn from(value: User) -> Self {
        Identity::Authenticated(value)
    }
}
