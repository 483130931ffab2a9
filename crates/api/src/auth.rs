//! Bearer-token authentication.
//!
//! Handlers that act for a caller take an [`Authenticated`] extractor; the
//! resulting [`Principal`] is passed explicitly into every service call.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use common::{Principal, Role, UserId};

use crate::error::ApiError;
use crate::state::AppState;

/// Turns a bearer token into a verified principal.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Option<Principal>;
}

/// A fixed token table for development and tests.
///
/// Parsed from `token=userId:ROLE|ROLE:email;...`; the email is optional.
#[derive(Debug, Default, Clone)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, (UserId, Vec<Role>, Option<String>)>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(
        mut self,
        token: impl Into<String>,
        user_id: UserId,
        roles: Vec<Role>,
        email: Option<&str>,
    ) -> Self {
        self.tokens
            .insert(token.into(), (user_id, roles, email.map(str::to_string)));
        self
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl FromStr for StaticTokenVerifier {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let mut verifier = Self::new();
        for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let (token, identity) = entry
                .split_once('=')
                .ok_or_else(|| format!("token entry without '=': {entry}"))?;

            let mut parts = identity.splitn(3, ':');
            let user_id: UserId = parts
                .next()
                .unwrap_or_default()
                .trim()
                .parse()
                .map_err(|_| format!("invalid user id in token entry {token}"))?;
            let roles = parts
                .next()
                .unwrap_or("USER")
                .split('|')
                .map(|r| Role::parse(r).ok_or_else(|| format!("unknown role {r}")))
                .collect::<Result<Vec<_>, _>>()?;
            let email = parts.next().map(str::trim).filter(|e| !e.is_empty());

            verifier = verifier.with_token(token.trim(), user_id, roles, email);
        }
        Ok(verifier)
    }
}

impl TokenVerifier for StaticTokenVerifier {
    fn verify(&self, token: &str) -> Option<Principal> {
        let (user_id, roles, email) = self.tokens.get(token)?;
        let principal = Principal::new(*user_id, roles.clone(), token);
        Some(match email {
            Some(email) => principal.with_email(email.clone()),
            None => principal,
        })
    }
}

/// The caller, verified from the `Authorization: Bearer` header.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Principal);

impl Authenticated {
    /// Fails with 403 unless the caller is an admin.
    pub fn require_admin(&self) -> Result<&Principal, ApiError> {
        if self.0.is_admin() {
            Ok(&self.0)
        } else {
            Err(ApiError::Forbidden("admin role required".to_string()))
        }
    }
}

impl FromRequestParts<Arc<AppState>> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("malformed authorization header".to_string()))?;

        state
            .verifier
            .verify(token)
            .map(Authenticated)
            .ok_or_else(|| {
                tracing::warn!("rejected unknown bearer token");
                ApiError::Unauthorized("invalid bearer token".to_string())
            })
    }
}
