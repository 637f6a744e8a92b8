//! Caller identity.
//!
//! The edge never issues or stores credentials. It asks an
//! [`IdentityProvider`] to validate the bearer token on each request and
//! acts on the returned user id and role.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use common::UserId;
use thiserror::Error;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
}

impl std::str::FromStr for Role {
    type Err = IdentityConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(IdentityConfigError::UnknownRole(other.to_string())),
        }
    }
}

/// Who is calling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: UserId,
    pub role: Role,
}

impl CallerIdentity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Admins may act on anything; users only on what they own.
    pub fn ensure_owner(&self, owner: UserId) -> Result<(), ApiError> {
        if self.is_admin() || self.user_id == owner {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "resource belongs to another user".to_string(),
            ))
        }
    }

    pub fn ensure_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("admin role required".to_string()))
        }
    }
}

/// Validates caller credentials.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Returns the identity behind `credential`, or `None` if it is invalid.
    async fn validate(&self, credential: &str) -> Option<CallerIdentity>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityConfigError {
    #[error("token entry must be token:user-uuid:role, got {0:?}")]
    MalformedEntry(String),
    #[error("invalid user id in token entry: {0}")]
    InvalidUserId(String),
    #[error("unknown role: {0}")]
    UnknownRole(String),
}

/// Fixed token table, configured from `API_TOKENS`.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenIdentity {
    tokens: HashMap<String, CallerIdentity>,
}

impl StaticTokenIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, identity: CallerIdentity) -> Self {
        self.tokens.insert(token.into(), identity);
        self
    }

    /// Parses `token:user-uuid:role` entries separated by commas.
    pub fn parse(tokens: &str) -> Result<Self, IdentityConfigError> {
        let mut identity = Self::new();
        for entry in tokens.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let mut parts = entry.splitn(3, ':');
            let (Some(token), Some(user), Some(role)) = (parts.next(), parts.next(), parts.next())
            else {
                return Err(IdentityConfigError::MalformedEntry(entry.to_string()));
            };
            if token.is_empty() {
                return Err(IdentityConfigError::MalformedEntry(entry.to_string()));
            }
            let user_id = user
                .parse::<UserId>()
                .map_err(|_| IdentityConfigError::InvalidUserId(user.to_string()))?;
            identity = identity.with_token(
                token,
                CallerIdentity {
                    user_id,
                    role: role.parse()?,
                },
            );
        }
        Ok(identity)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenIdentity {
    async fn validate(&self, credential: &str) -> Option<CallerIdentity> {
        self.tokens.get(credential).copied()
    }
}

/// Extracts the caller from `Authorization: Bearer <token>`.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub CallerIdentity);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
    Arc<dyn IdentityProvider>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .ok_or(ApiError::Unauthorized)?;

        let provider = <Arc<dyn IdentityProvider>>::from_ref(state);
        provider
            .validate(&token)
            .await
            .map(Caller)
            .ok_or(ApiError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_parse_token_table() {
        let alice = UserId::new();
        let root = UserId::new();
        let tokens = format!("alice-token:{alice}:user, root-token:{root}:admin");
        let identity = StaticTokenIdentity::parse(&tokens).unwrap();

        assert_eq!(identity.len(), 2);
        let caller = identity.validate("alice-token").await.unwrap();
        assert_eq!(caller.user_id, alice);
        assert!(!caller.is_admin());
        assert!(identity.validate("root-token").await.unwrap().is_admin());
        assert!(identity.validate("nobody").await.is_none());
    }

    #[test]
    fn test_parse_rejects_bad_entries() {
        assert!(matches!(
            StaticTokenIdentity::parse("just-a-token"),
            Err(IdentityConfigError::MalformedEntry(_))
        ));
        assert!(matches!(
            StaticTokenIdentity::parse("t:not-a-uuid:user"),
            Err(IdentityConfigError::InvalidUserId(_))
        ));
        let user = UserId::new();
        assert!(matches!(
            StaticTokenIdentity::parse(&format!("t:{user}:root")),
            Err(IdentityConfigError::UnknownRole(_))
        ));
    }

    #[test]
    fn test_ownership_rules() {
        let owner = UserId::new();
        let user = CallerIdentity {
            user_id: owner,
            role: Role::User,
        };
        let stranger = CallerIdentity {
            user_id: UserId::new(),
            role: Role::User,
        };
        let admin = CallerIdentity {
            user_id: UserId::new(),
            role: Role::Admin,
        };

        assert!(user.ensure_owner(owner).is_ok());
        assert!(stranger.ensure_owner(owner).is_err());
        assert!(admin.ensure_owner(owner).is_ok());
        assert!(user.ensure_admin().is_err());
    }
}
