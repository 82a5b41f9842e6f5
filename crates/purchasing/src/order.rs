use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockroom_catalog::{ProductId, SupplierId};
use stockroom_core::{
    typed_id, Aggregate, AggregateRoot, DomainError, DomainResult, Event, Money, UserId,
};
use stockroom_ledger::NewMovement;

use crate::PricedLine;

typed_id!(
    /// Purchase order identifier.
    OrderId
);

/// Purchase order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// The transition table. Anything not listed is rejected.
    pub fn next(self, action: OrderAction) -> DomainResult<OrderStatus> {
        match (self, action) {
            (OrderStatus::Pending, OrderAction::Confirm) => Ok(OrderStatus::Confirmed),
            (OrderStatus::Confirmed, OrderAction::Deliver) => Ok(OrderStatus::Delivered),
            (OrderStatus::Pending | OrderStatus::Confirmed, OrderAction::Cancel) => {
                Ok(OrderStatus::Cancelled)
            }
            (from, action) => Err(DomainError::InvalidTransition {
                from: from.as_str(),
                action: action.as_str(),
            }),
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown order status '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderAction {
    Confirm,
    Deliver,
    Cancel,
}

impl OrderAction {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderAction::Confirm => "confirm",
            OrderAction::Deliver => "deliver",
            OrderAction::Cancel => "cancel",
        }
    }
}

impl core::str::FromStr for OrderAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirm" => Ok(OrderAction::Confirm),
            "deliver" => Ok(OrderAction::Deliver),
            "cancel" => Ok(OrderAction::Cancel),
            other => Err(DomainError::validation(format!("unknown order action '{other}'"))),
        }
    }
}

/// Purchase order line item. Immutable once the order exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Money,
    pub line_total: Money,
}

/// Persisted order header, used to rebuild an order from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderHeader {
    pub id: OrderId,
    pub supplier_id: SupplierId,
    pub status: OrderStatus,
    pub order_date: NaiveDate,
    pub expected_delivery: Option<NaiveDate>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

/// Aggregate root: PurchaseOrder.
///
/// `total_amount` is only ever computed from the items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseOrder {
    id: OrderId,
    supplier_id: SupplierId,
    status: OrderStatus,
    order_date: NaiveDate,
    expected_delivery: Option<NaiveDate>,
    total_amount: Money,
    items: Vec<OrderItem>,
    created_by: UserId,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

/// Listing filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub supplier_id: Option<SupplierId>,
}

impl OrderFilter {
    pub fn matches(&self, order: &PurchaseOrder) -> bool {
        self.status.is_none_or(|s| s == order.status)
            && self.supplier_id.is_none_or(|s| s == order.supplier_id)
    }
}

impl PurchaseOrder {
    /// Place a new `pending` order from priced lines.
    pub fn place(
        id: OrderId,
        supplier_id: SupplierId,
        lines: Vec<PricedLine>,
        order_date: NaiveDate,
        expected_delivery: Option<NaiveDate>,
        created_by: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if lines.is_empty() {
            return Err(DomainError::validation("order must contain at least one item"));
        }
        if let Some(expected) = expected_delivery {
            if expected < order_date {
                return Err(DomainError::validation(
                    "expected delivery cannot be before the order date",
                ));
            }
        }

        let items = lines
            .into_iter()
            .enumerate()
            .map(|(i, line)| price_line(i as u32 + 1, line))
            .collect::<DomainResult<Vec<_>>>()?;

        let header = OrderHeader {
            id,
            supplier_id,
            status: OrderStatus::Pending,
            order_date,
            expected_delivery,
            created_by,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        Self::restore(header, items)
    }

    /// Rebuild from storage; the total is recomputed, never read back.
    pub fn restore(header: OrderHeader, mut items: Vec<OrderItem>) -> DomainResult<Self> {
        if items.is_empty() {
            return Err(DomainError::invariant("order has no items"));
        }
        items.sort_by_key(|i| i.line_no);
        for item in &mut items {
            item.line_total = item
                .unit_price
                .checked_mul(item.quantity)
                .ok_or_else(|| DomainError::validation("line total out of range"))?;
        }
        let total_amount = Money::checked_sum(items.iter().map(|i| i.line_total))
            .ok_or_else(|| DomainError::validation("order total out of range"))?;

        Ok(Self {
            id: header.id,
            supplier_id: header.supplier_id,
            status: header.status,
            order_date: header.order_date,
            expected_delivery: header.expected_delivery,
            total_amount,
            items,
            created_by: header.created_by,
            created_at: header.created_at,
            updated_at: header.updated_at,
            version: header.version,
        })
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn supplier_id(&self) -> SupplierId {
        self.supplier_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn order_date(&self) -> NaiveDate {
        self.order_date
    }

    pub fn expected_delivery(&self) -> Option<NaiveDate> {
        self.expected_delivery
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn created_by(&self) -> UserId {
        self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Open orders still pin their products (see product disabling).
    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn references_product(&self, product_id: ProductId) -> bool {
        self.items.iter().any(|i| i.product_id == product_id)
    }

    /// Stock-in requests for every line, as produced by delivery.
    pub fn receipts(&self) -> Vec<NewMovement> {
        self.items
            .iter()
            .map(|item| {
                NewMovement::receipt(
                    item.product_id,
                    item.quantity,
                    self.id.0,
                    format!("Received on purchase order {} line {}", self.id, item.line_no),
                )
            })
            .collect()
    }
}

fn price_line(line_no: u32, line: PricedLine) -> DomainResult<OrderItem> {
    if line.quantity <= 0 {
        return Err(DomainError::validation(format!(
            "line {line_no}: quantity must be positive"
        )));
    }
    if line.unit_price.is_negative() {
        return Err(DomainError::validation(format!(
            "line {line_no}: unit price cannot be negative"
        )));
    }
    let line_total = line
        .unit_price
        .checked_mul(line.quantity)
        .ok_or_else(|| DomainError::validation(format!("line {line_no}: total out of range")))?;
    Ok(OrderItem {
        line_no,
        product_id: line.product_id,
        quantity: line.quantity,
        unit_price: line.unit_price,
        line_total,
    })
}

impl AggregateRoot for PurchaseOrder {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: move an order through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionOrder {
    pub action: OrderAction,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEvent {
    Confirmed {
        occurred_at: DateTime<Utc>,
    },
    /// Carries one stock-in per line; persisted atomically with the status.
    Delivered {
        receipts: Vec<NewMovement>,
        occurred_at: DateTime<Utc>,
    },
    Cancelled {
        occurred_at: DateTime<Utc>,
    },
}

impl OrderEvent {
    pub fn status(&self) -> OrderStatus {
        match self {
            OrderEvent::Confirmed { .. } => OrderStatus::Confirmed,
            OrderEvent::Delivered { .. } => OrderStatus::Delivered,
            OrderEvent::Cancelled { .. } => OrderStatus::Cancelled,
        }
    }

    pub fn receipts(&self) -> &[NewMovement] {
        match self {
            OrderEvent::Delivered { receipts, .. } => receipts,
            _ => &[],
        }
    }
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Confirmed { .. } => "purchasing.order.confirmed",
            OrderEvent::Delivered { .. } => "purchasing.order.delivered",
            OrderEvent::Cancelled { .. } => "purchasing.order.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::Confirmed { occurred_at }
            | OrderEvent::Delivered { occurred_at, .. }
            | OrderEvent::Cancelled { occurred_at } => *occurred_at,
        }
    }
}

impl Aggregate for PurchaseOrder {
    type Command = TransitionOrder;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        self.status = event.status();
        self.updated_at = event.occurred_at();
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let next = self.status.next(command.action)?;
        let occurred_at = command.occurred_at;
        let event = match next {
            OrderStatus::Confirmed => OrderEvent::Confirmed { occurred_at },
            OrderStatus::Delivered => OrderEvent::Delivered {
                receipts: self.receipts(),
                occurred_at,
            },
            OrderStatus::Cancelled => OrderEvent::Cancelled { occurred_at },
            OrderStatus::Pending => {
                return Err(DomainError::invariant("no transition leads back to pending"));
            }
        };
        Ok(vec![event])
    }
}
