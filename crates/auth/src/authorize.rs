use serde::Serialize;
use stockroom_core::{ErrorKind, UserId};
use thiserror::Error;

use crate::{Principal, Role, RoleSet};

/// Tracing target for authorization decisions.
pub const AUDIT_TARGET: &str = "stockroom::audit";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("forbidden: {0}")]
    Forbidden(String),
}

impl AuthzError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthzError::Unauthenticated => ErrorKind::Unauthenticated,
            AuthzError::Forbidden(_) => ErrorKind::Forbidden,
        }
    }
}

/// Authorize a caller against the roles an operation admits.
///
/// - No IO
/// - No panics
/// - Every decision is emitted on [`AUDIT_TARGET`]
pub fn authorize(principal: Option<&Principal>, allowed: RoleSet) -> Result<(), AuthzError> {
    let decision = explain_authorization(principal, allowed);
    let required = decision.required.join(",");

    if decision.granted {
        tracing::info!(
            target: AUDIT_TARGET,
            decision = "allow",
            principal = ?decision.principal,
            role = decision.role.map(Role::as_str),
            required = %required,
            "authorization granted"
        );
        return Ok(());
    }

    tracing::info!(
        target: AUDIT_TARGET,
        decision = "deny",
        principal = ?decision.principal,
        role = decision.role.map(Role::as_str),
        required = %required,
        reason = %decision.reason,
        "authorization denied"
    );

    match decision.denial {
        Some(DenialKind::Unauthenticated) => Err(AuthzError::Unauthenticated),
        _ => Err(AuthzError::Forbidden(decision.reason)),
    }
}

/// Turn an optional principal into a present one, or `Unauthenticated`.
pub fn require_principal(principal: Option<Principal>) -> Result<Principal, AuthzError> {
    match principal {
        Some(p) => Ok(p),
        None => {
            authorize(None, RoleSet::ANY_ROLE)?;
            Err(AuthzError::Unauthenticated)
        }
    }
}

/// Auditable record of one authorization decision.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationDecision {
    pub granted: bool,
    pub principal: Option<UserId>,
    pub role: Option<Role>,
    pub required: Vec<&'static str>,
    pub reason: String,
    pub denial: Option<DenialKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    Unauthenticated,
    NoRole,
    RoleNotAllowed,
}

/// Explain why an authorization decision was made (or would be made).
pub fn explain_authorization(
    principal: Option<&Principal>,
    allowed: RoleSet,
) -> AuthorizationDecision {
    let required = allowed.names();

    let Some(principal) = principal else {
        return AuthorizationDecision {
            granted: false,
            principal: None,
            role: None,
            required,
            reason: "no authenticated principal".to_string(),
            denial: Some(DenialKind::Unauthenticated),
        };
    };

    let Some(role) = principal.role else {
        return AuthorizationDecision {
            granted: false,
            principal: Some(principal.id),
            role: None,
            required,
            reason: "user has no role assigned".to_string(),
            denial: Some(DenialKind::NoRole),
        };
    };

    if allowed.contains(role) {
        AuthorizationDecision {
            granted: true,
            principal: Some(principal.id),
            role: Some(role),
            required,
            reason: format!("role '{role}' is permitted"),
            denial: None,
        }
    } else {
        AuthorizationDecision {
            granted: false,
            principal: Some(principal.id),
            role: Some(role),
            reason: format!(
                "role '{role}' is not permitted (requires one of: {})",
                required.join(", ")
            ),
            required,
            denial: Some(DenialKind::RoleNotAllowed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Option<Role>) -> Principal {
        Principal::new(UserId::new(), role)
    }

    #[test]
    fn missing_principal_is_unauthenticated() {
        assert_eq!(
            authorize(None, RoleSet::REPORT_READERS),
            Err(AuthzError::Unauthenticated)
        );
        assert!(matches!(
            require_principal(None),
            Err(AuthzError::Unauthenticated)
        ));
    }

    #[test]
    fn user_without_role_is_forbidden_everywhere() {
        let p = principal(None);
        for set in [
            RoleSet::ADMINISTRATION,
            RoleSet::CATALOG_EDITORS,
            RoleSet::STOCK_KEEPERS,
            RoleSet::REPORT_READERS,
            RoleSet::ANY_ROLE,
        ] {
            assert!(matches!(authorize(Some(&p), set), Err(AuthzError::Forbidden(_))));
        }
    }

    #[test]
    fn viewer_reads_reports_but_cannot_record_stock() {
        let p = principal(Some(Role::Viewer));
        assert_eq!(authorize(Some(&p), RoleSet::REPORT_READERS), Ok(()));
        let err = authorize(Some(&p), RoleSet::STOCK_KEEPERS).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn stock_controller_records_movements_only() {
        let p = principal(Some(Role::StockController));
        assert!(authorize(Some(&p), RoleSet::STOCK_KEEPERS).is_ok());
        assert!(authorize(Some(&p), RoleSet::CATALOG_EDITORS).is_err());
        assert!(authorize(Some(&p), RoleSet::REPORT_READERS).is_err());
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn allow_and_deny_are_both_audited_at_the_default_level() {
        let out = Captured::default();
        let writer = out.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("info"))
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let viewer = principal(Some(Role::Viewer));
        tracing::subscriber::with_default(subscriber, || {
            let _ = authorize(Some(&viewer), RoleSet::REPORT_READERS);
            let _ = authorize(Some(&viewer), RoleSet::STOCK_KEEPERS);
        });

        let logged = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("authorization granted"), "{logged}");
        assert!(logged.contains("authorization denied"), "{logged}");
        assert!(logged.contains(AUDIT_TARGET), "{logged}");
    }

    #[test]
    fn explanation_names_required_roles_on_denial() {
        let p = principal(Some(Role::Viewer));
        let d = explain_authorization(Some(&p), RoleSet::CATALOG_EDITORS);
        assert!(!d.granted);
        assert_eq!(d.denial, Some(DenialKind::RoleNotAllowed));
        assert_eq!(d.required, vec!["admin", "manager"]);
        assert!(d.reason.contains("viewer"));
    }
}
