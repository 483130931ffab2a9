//! The verified caller identity.
//!
//! Token validation happens outside this workspace. What comes out of it is a
//! [`Principal`], and every operation that acts on behalf of a caller, or
//! forwards the caller's credentials to a peer service, takes the principal
//! as an argument. Nothing reads credentials from ambient state.

use serde::{Deserialize, Serialize};

use crate::UserId;

/// A role granted to a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }

    /// Parses a role name, accepting an optional `ROLE_` prefix.
    pub fn parse(value: &str) -> Option<Role> {
        let name = value.trim();
        let name = name.strip_prefix("ROLE_").unwrap_or(name);
        match name.to_ascii_uppercase().as_str() {
            "USER" => Some(Role::User),
            "ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A verified caller: who they are, what they may do, and the bearer token to
/// forward when a peer call is made on their behalf.
#[derive(Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub roles: Vec<Role>,
    pub email: Option<String>,
    token: String,
}

impl Principal {
    pub fn new(user_id: UserId, roles: Vec<Role>, token: impl Into<String>) -> Self {
        Self {
            user_id,
            roles,
            email: None,
            token: token.into(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// The raw bearer token, for forwarding to peer services.
    pub fn bearer_token(&self) -> &str {
        &self.token
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    /// Returns true if this principal may read or mutate data owned by `owner`.
    pub fn can_act_for(&self, owner: UserId) -> bool {
        self.user_id == owner || self.is_admin()
    }
}

impl std::fmt::Debug for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Principal")
            .field("user_id", &self.user_id)
            .field("roles", &self.roles)
            .field("email", &self.email)
            .field("token", &"<redacted>")
            .finish()
    }
}
