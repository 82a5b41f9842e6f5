//! Role assignments and the store-backed [`RoleDirectory`].

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use stockroom_auth::{authorize, DirectoryError, Principal, Role, RoleDirectory, RoleSet};
use stockroom_core::UserId;

use super::ServiceContext;
use crate::error::ServiceResult;
use crate::retry::ReadRetry;
use crate::store::InventoryStore;

/// Administrative role management.
#[derive(Clone)]
pub struct RoleAdmin {
    ctx: Arc<ServiceContext>,
}

impl RoleAdmin {
    pub(crate) fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    pub(crate) fn reads(&self) -> ReadRetry {
        self.ctx.reads
    }

    #[instrument(skip_all, fields(actor = %principal.id, user = %user, role = %role), err)]
    pub async fn assign_role(
        &self,
        principal: &Principal,
        user: UserId,
        role: Role,
    ) -> ServiceResult<()> {
        authorize(Some(principal), RoleSet::ADMINISTRATION)?;
        self.ctx.store.assign_role(user, role).await?;
        info!(%user, ?role, "role assigned");
        Ok(())
    }

    pub async fn role_of(&self, principal: &Principal, user: UserId) -> ServiceResult<Option<Role>> {
        authorize(Some(principal), RoleSet::ADMINISTRATION)?;
        let store = &self.ctx.store;
        Ok(self.ctx.reads.run("role_of", || store.role_of(user)).await?)
    }
}

/// Resolves roles from the profiles kept by an [`InventoryStore`].
#[derive(Clone)]
pub struct StoreRoleDirectory {
    store: Arc<dyn InventoryStore>,
    reads: ReadRetry,
}

impl StoreRoleDirectory {
    pub fn new(store: Arc<dyn InventoryStore>, reads: ReadRetry) -> Self {
        Self { store, reads }
    }
}

#[async_trait]
impl RoleDirectory for StoreRoleDirectory {
    async fn role_of(&self, user: UserId) -> Result<Option<Role>, DirectoryError> {
        let store = &self.store;
        self.reads
            .run("role_of", || store.role_of(user))
            .await
            .map_err(|e| DirectoryError(e.to_string()))
    }
}

/// Makes sure `user` holds the admin role. Used once at startup so a fresh
/// deployment has someone able to hand out roles.
pub async fn seed_admin(store: &dyn InventoryStore, user: UserId) -> ServiceResult<()> {
    if store.role_of(user).await? == Some(Role::Admin) {
        return Ok(());
    }
    store.assign_role(user, Role::Admin).await?;
    info!(%user, "bootstrap admin seeded");
    Ok(())
}
