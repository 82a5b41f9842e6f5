//! Catalog domain module: products and suppliers.
//!
//! Pure validation and state rules (no IO, no HTTP, no storage). Uniqueness
//! of SKUs and referential guards are enforced by the store.

pub mod product;
pub mod supplier;

pub use product::{NewProduct, Product, ProductId, ProductPatch, ProductStatus, DEFAULT_UNIT};
pub use supplier::{ContactInfo, NewSupplier, Supplier, SupplierId};
