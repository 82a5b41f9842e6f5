//! `stockroom-auth`: the authorization gate in front of every mutation.
//!
//! Decoupled from HTTP and storage: the API layer resolves a [`Principal`]
//! through an [`IdentityProvider`], and services call [`authorize`] with the
//! role set their operation allows.

pub mod authorize;
pub mod claims;
pub mod identity;
pub mod jwt;
pub mod principal;
pub mod roles;

pub use authorize::{
    authorize, explain_authorization, require_principal, AuthorizationDecision, AuthzError, AUDIT_TARGET,
    DenialKind,
};
pub use claims::{validate_claims, JwtClaims, TokenValidationError};
pub use identity::{DirectoryError, IdentityProvider, RequestContext, RoleDirectory, TokenIdentityProvider};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use principal::Principal;
pub use roles::{Role, RoleSet};
