//! Purchasing domain module: purchase orders and their lifecycle.
//!
//! ```text
//! pending --confirm--> confirmed --deliver--> delivered
//! pending|confirmed --cancel--> cancelled
//! ```
//!
//! Delivery is the only transition with a side effect on stock: it yields one
//! stock-in receipt per line, which the store appends in the same transaction
//! as the status change.

pub mod order;
pub mod pricing;

pub use order::{
    OrderAction, OrderEvent, OrderFilter, OrderHeader, OrderId, OrderItem, OrderStatus,
    PurchaseOrder, TransitionOrder,
};
pub use pricing::{NewOrder, NewOrderItem, PricedLine, PricingPolicy};
