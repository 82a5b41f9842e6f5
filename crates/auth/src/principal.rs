use serde::Serialize;
use stockroom_core::UserId;

use crate::Role;

/// The resolved identity of a caller.
///
/// `role` is `None` for an authenticated user that has no profile row yet;
/// such a principal passes authentication but fails every authorization.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: UserId,
    pub role: Option<Role>,
}

impl Principal {
    pub fn new(id: UserId, role: Option<Role>) -> Self {
        Self { id, role }
    }

    pub fn with_role(id: UserId, role: Role) -> Self {
        Self { id, role: Some(role) }
    }
}
