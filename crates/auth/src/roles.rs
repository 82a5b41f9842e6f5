use core::str::FromStr;

use serde::{Deserialize, Serialize};
use stockroom_core::DomainError;

/// The closed set of roles a user may hold.
///
/// A user holds at most one role; a user with none is denied everything.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    StockController,
    Viewer,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Manager, Role::StockController, Role::Viewer];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::StockController => "stock_controller",
            Role::Viewer => "viewer",
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Role::Admin => 1,
            Role::Manager => 1 << 1,
            Role::StockController => 1 << 2,
            Role::Viewer => 1 << 3,
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown role '{s}'")))
    }
}

/// Set of roles an operation admits.
///
/// The per-operation sets are declared here as constants so that services and
/// the HTTP layer agree on one table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct RoleSet(u8);

impl RoleSet {
    pub const EMPTY: RoleSet = RoleSet(0);

    /// User/role administration.
    pub const ADMINISTRATION: RoleSet = RoleSet::of(&[Role::Admin]);

    /// Create and edit products and suppliers; place and progress orders.
    pub const CATALOG_EDITORS: RoleSet = RoleSet::of(&[Role::Admin, Role::Manager]);

    /// Record stock movements and browse the catalog for that purpose.
    pub const STOCK_KEEPERS: RoleSet =
        RoleSet::of(&[Role::Admin, Role::Manager, Role::StockController]);

    /// Read the aggregated reporting views.
    pub const REPORT_READERS: RoleSet = RoleSet::of(&[Role::Admin, Role::Manager, Role::Viewer]);

    /// Every role; only the "has a role at all" check applies.
    pub const ANY_ROLE: RoleSet = RoleSet::of(&Role::ALL);

    pub const fn of(roles: &[Role]) -> RoleSet {
        let mut bits = 0u8;
        let mut i = 0;
        while i < roles.len() {
            bits |= roles[i].bit();
            i += 1;
        }
        RoleSet(bits)
    }

    pub const fn contains(self, role: Role) -> bool {
        self.0 & role.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Role> {
        Role::ALL.into_iter().filter(move |r| self.contains(*r))
    }

    /// Role names, in declaration order, for audit output.
    pub fn names(self) -> Vec<&'static str> {
        self.iter().map(Role::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_names_round_trip() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("auditor".parse::<Role>().is_err());
    }

    #[test]
    fn stock_controller_serializes_snake_case() {
        let json = serde_json::to_string(&Role::StockController).unwrap();
        assert_eq!(json, "\"stock_controller\"");
    }

    #[test]
    fn operation_sets_match_the_role_table() {
        assert!(RoleSet::STOCK_KEEPERS.contains(Role::StockController));
        assert!(!RoleSet::STOCK_KEEPERS.contains(Role::Viewer));
        assert!(!RoleSet::CATALOG_EDITORS.contains(Role::StockController));
        assert!(RoleSet::REPORT_READERS.contains(Role::Viewer));
        assert!(!RoleSet::REPORT_READERS.contains(Role::StockController));
        assert_eq!(RoleSet::ADMINISTRATION.names(), vec!["admin"]);
        assert!(RoleSet::EMPTY.is_empty());
    }
}
