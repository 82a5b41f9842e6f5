//! Resolving the caller of a request into a [`Principal`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use stockroom_core::UserId;
use thiserror::Error;

use crate::{JwtValidator, Principal, Role};

/// Per-request identity inputs, independent of the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub bearer_token: Option<String>,
}

impl RequestContext {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            bearer_token: Some(token.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("role directory unavailable: {0}")]
pub struct DirectoryError(pub String);

/// Source of truth for a user's role (the profiles table).
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    async fn role_of(&self, user: UserId) -> Result<Option<Role>, DirectoryError>;
}

#[async_trait]
impl<T> RoleDirectory for Arc<T>
where
    T: RoleDirectory + ?Sized,
{
    async fn role_of(&self, user: UserId) -> Result<Option<Role>, DirectoryError> {
        (**self).role_of(user).await
    }
}

/// Maps an inbound request context to a principal.
///
/// `Ok(None)` means "nobody": no token, or a token that does not verify.
/// `Err` is reserved for a failing directory.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve_principal(
        &self,
        ctx: &RequestContext,
    ) -> Result<Option<Principal>, DirectoryError>;
}

/// Bearer-token provider: verify the JWT, then look the subject's role up.
pub struct TokenIdentityProvider<V, D> {
    validator: V,
    directory: D,
}

impl<V, D> TokenIdentityProvider<V, D> {
    pub fn new(validator: V, directory: D) -> Self {
        Self {
            validator,
            directory,
        }
    }
}

#[async_trait]
impl<V, D> IdentityProvider for TokenIdentityProvider<V, D>
where
    V: JwtValidator,
    D: RoleDirectory,
{
    async fn resolve_principal(
        &self,
        ctx: &RequestContext,
    ) -> Result<Option<Principal>, DirectoryError> {
        let Some(token) = ctx.bearer_token.as_deref() else {
            return Ok(None);
        };

        let claims = match self.validator.validate(token, Utc::now()) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!(error = %e, "bearer token rejected");
                return Ok(None);
            }
        };

        let role = self.directory.role_of(claims.sub).await?;
        Ok(Some(Principal::new(claims.sub, role)))
    }
}
