//! Application services.
//!
//! Each operation takes the calling [`Principal`](stockroom_auth::Principal)
//! explicitly, runs the authorization gate first, then delegates to the pure
//! domain crates and the [`InventoryStore`]. No ambient request state is read.
//!
//! ```text
//! principal ─► authorize ─► validate (domain) ─► store (one atomic unit) ─► log
//! ```

use std::sync::Arc;

use chrono::Duration;

use stockroom_ledger::NegativeStockPolicy;
use stockroom_purchasing::PricingPolicy;
use stockroom_reporting::DEFAULT_MAX_SERIES_DAYS;

use crate::clock::{Clock, SystemClock};
use crate::config::Settings;
use crate::retry::ReadRetry;
use crate::store::{InMemoryStore, InventoryStore};

mod catalog;
mod directory;
mod ledger;
mod purchasing;
mod reporting;

pub use catalog::ProductCatalog;
pub use directory::{seed_admin, RoleAdmin, StoreRoleDirectory};
pub use ledger::StockLedger;
pub use purchasing::{PurchaseOrderEngine, TransitionOutcome};
pub use reporting::ReportingView;

/// Business rules that are configuration rather than code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policies {
    pub negative_stock: NegativeStockPolicy,
    /// Movements younger than this keep a product from being disabled.
    pub disable_guard: Duration,
    pub pricing: PricingPolicy,
    pub max_series_days: u32,
}

impl Default for Policies {
    fn default() -> Self {
        Self {
            negative_stock: NegativeStockPolicy::Reject,
            disable_guard: Duration::days(30),
            pricing: PricingPolicy::Catalog,
            max_series_days: DEFAULT_MAX_SERIES_DAYS,
        }
    }
}

impl From<&Settings> for Policies {
    fn from(s: &Settings) -> Self {
        Self {
            negative_stock: s.ledger.negative_stock,
            disable_guard: Duration::days(i64::from(s.ledger.disable_guard_days)),
            pricing: s.purchasing.pricing,
            max_series_days: s.reporting.max_series_days,
        }
    }
}

/// What every service shares.
pub(crate) struct ServiceContext {
    pub(crate) store: Arc<dyn InventoryStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) reads: ReadRetry,
    pub(crate) policies: Policies,
}

/// The full set of services over one store.
#[derive(Clone)]
pub struct Services {
    pub catalog: ProductCatalog,
    pub ledger: StockLedger,
    pub purchasing: PurchaseOrderEngine,
    pub reporting: ReportingView,
    pub roles: RoleAdmin,
    store: Arc<dyn InventoryStore>,
}

impl Services {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        clock: Arc<dyn Clock>,
        reads: ReadRetry,
        policies: Policies,
    ) -> Self {
        let ctx = Arc::new(ServiceContext {
            store: store.clone(),
            clock,
            reads,
            policies,
        });
        Self {
            catalog: ProductCatalog::new(ctx.clone()),
            ledger: StockLedger::new(ctx.clone()),
            purchasing: PurchaseOrderEngine::new(ctx.clone()),
            reporting: ReportingView::new(ctx.clone()),
            roles: RoleAdmin::new(ctx),
            store,
        }
    }

    pub fn from_settings(store: Arc<dyn InventoryStore>, settings: &Settings) -> Self {
        Self::new(
            store,
            Arc::new(SystemClock),
            ReadRetry::new(settings.store.read_retries),
            Policies::from(settings),
        )
    }

    /// In-memory store, system clock, default policies.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(SystemClock),
            ReadRetry::default(),
            Policies::default(),
        )
    }

    pub fn store(&self) -> Arc<dyn InventoryStore> {
        self.store.clone()
    }

    /// Role lookups for the identity provider, backed by the same store.
    pub fn role_directory(&self) -> StoreRoleDirectory {
        StoreRoleDirectory::new(self.store.clone(), self.roles.reads())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};

    use stockroom_auth::{Principal, Role};
    use stockroom_catalog::{ContactInfo, NewProduct, NewSupplier, Product, Supplier};
    use stockroom_core::{Money, UserId};

    use super::*;
    use crate::clock::ManualClock;

    pub(crate) struct Harness {
        pub services: Services,
        pub clock: Arc<ManualClock>,
        pub store: Arc<InMemoryStore>,
    }

    pub(crate) fn harness() -> Harness {
        harness_with(Policies::default())
    }

    pub(crate) fn harness_with(policies: Policies) -> Harness {
        let clock = Arc::new(ManualClock::at(
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).single().unwrap(),
        ));
        let store = Arc::new(InMemoryStore::new());
        let services = Services::new(store.clone(), clock.clone(), ReadRetry::none(), policies);
        Harness {
            services,
            clock,
            store,
        }
    }

    pub(crate) fn principal(role: Role) -> Principal {
        Principal::with_role(UserId::new(), role)
    }

    pub(crate) fn admin() -> Principal {
        principal(Role::Admin)
    }

    pub(crate) fn new_product(sku: &str, cents: i64, reorder_level: i64) -> NewProduct {
        NewProduct {
            sku: sku.to_string(),
            name: format!("{sku} name"),
            description: None,
            unit_price: Money::from_cents(cents),
            reorder_level,
            unit: None,
        }
    }

    pub(crate) fn new_supplier(name: &str) -> NewSupplier {
        NewSupplier {
            name: name.to_string(),
            contact: ContactInfo {
                contact_person: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                phone: "+1 555 0100".to_string(),
                address: "1 Dock Road".to_string(),
                city: "Springfield".to_string(),
                country: "US".to_string(),
            },
        }
    }

    impl Harness {
        pub(crate) fn clock_now(&self) -> DateTime<Utc> {
            self.clock.now()
        }

        pub(crate) fn clock_today(&self) -> NaiveDate {
            self.clock.now().date_naive()
        }

        pub(crate) async fn product(&self, sku: &str, cents: i64, reorder_level: i64) -> Product {
            self.services
                .catalog
                .create_product(&admin(), new_product(sku, cents, reorder_level))
                .await
                .unwrap()
        }

        pub(crate) async fn supplier(&self, name: &str) -> Supplier {
            self.services
                .catalog
                .create_supplier(&admin(), new_supplier(name))
                .await
                .unwrap()
        }
    }
}
