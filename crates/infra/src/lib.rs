//! Infrastructure layer: persistence, configuration, and the application
//! services that tie the pure domain crates to a store.

pub mod clock;
pub mod config;
pub mod error;
pub mod retry;
pub mod services;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Settings, StoreBackend};
pub use error::{ServiceError, ServiceResult};
pub use retry::ReadRetry;
pub use services::{
    seed_admin, Policies, ProductCatalog, PurchaseOrderEngine, ReportingView, RoleAdmin,
    Services, StockLedger, StoreRoleDirectory, TransitionOutcome,
};
pub use store::{InMemoryStore, InventoryStore, PostgresStore, StoreError, StoreResult};
