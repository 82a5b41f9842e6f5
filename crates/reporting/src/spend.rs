//! Spend per supplier.

use std::collections::HashMap;

use serde::Serialize;

use stockroom_catalog::{Supplier, SupplierId};
use stockroom_core::{DomainError, DomainResult, Money};
use stockroom_purchasing::{OrderStatus, PurchaseOrder};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupplierSpend {
    pub supplier_id: SupplierId,
    pub name: String,
    pub total_orders: u64,
    pub pending: u64,
    pub confirmed: u64,
    pub delivered: u64,
    pub cancelled: u64,
    /// Sum over non-cancelled orders.
    pub total_spent: Money,
    /// `total_spent` divided by non-cancelled orders, rounded toward zero.
    pub average_order_value: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpendReport {
    pub suppliers: Vec<SupplierSpend>,
    pub total_suppliers: u64,
    pub total_orders: u64,
    pub total_spent: Money,
}

/// Orders grouped by supplier; suppliers without orders are listed with
/// zeros. Highest spend first.
pub fn supplier_spend(suppliers: &[Supplier], orders: &[PurchaseOrder]) -> DomainResult<SpendReport> {
    let overflow = || DomainError::validation("supplier spend out of range");

    let mut by_supplier: HashMap<SupplierId, Vec<&PurchaseOrder>> = HashMap::new();
    for o in orders {
        by_supplier.entry(o.supplier_id()).or_default().push(o);
    }

    let mut rows = Vec::with_capacity(suppliers.len());
    for s in suppliers {
        let orders = by_supplier.remove(&s.id).unwrap_or_default();
        let count = |status| orders.iter().filter(|o| o.status() == status).count() as u64;

        let billable: Vec<_> = orders
            .iter()
            .filter(|o| o.status() != OrderStatus::Cancelled)
            .collect();
        let total_spent =
            Money::checked_sum(billable.iter().map(|o| o.total_amount())).ok_or_else(overflow)?;
        let average_order_value = if billable.is_empty() {
            Money::ZERO
        } else {
            Money::from_cents(total_spent.cents() / billable.len() as i64)
        };

        rows.push(SupplierSpend {
            supplier_id: s.id,
            name: s.name.clone(),
            total_orders: orders.len() as u64,
            pending: count(OrderStatus::Pending),
            confirmed: count(OrderStatus::Confirmed),
            delivered: count(OrderStatus::Delivered),
            cancelled: count(OrderStatus::Cancelled),
            total_spent,
            average_order_value,
        });
    }
    rows.sort_by(|a, b| {
        b.total_spent
            .cmp(&a.total_spent)
            .then_with(|| a.name.cmp(&b.name))
    });

    let total_spent = Money::checked_sum(rows.iter().map(|r| r.total_spent)).ok_or_else(overflow)?;
    Ok(SpendReport {
        total_suppliers: rows.len() as u64,
        total_orders: rows.iter().map(|r| r.total_orders).sum(),
        total_spent,
        suppliers: rows,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use stockroom_catalog::{ContactInfo, NewSupplier, ProductId};
    use stockroom_core::{Aggregate, UserId};
    use stockroom_purchasing::{OrderAction, OrderId, PricedLine, TransitionOrder};

    use super::*;

    fn supplier(name: &str) -> Supplier {
        Supplier::create(
            SupplierId::new(),
            NewSupplier {
                name: name.to_string(),
                contact: ContactInfo {
                    contact_person: "c".to_string(),
                    email: "c@x".to_string(),
                    phone: "1".to_string(),
                    address: "a".to_string(),
                    city: "c".to_string(),
                    country: "n".to_string(),
                },
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn order(supplier_id: SupplierId, cents: i64, actions: &[OrderAction]) -> PurchaseOrder {
        let mut o = PurchaseOrder::place(
            OrderId::new(),
            supplier_id,
            vec![PricedLine {
                product_id: ProductId::new(),
                quantity: 1,
                unit_price: Money::from_cents(cents),
            }],
            Utc::now().date_naive(),
            None,
            UserId::new(),
            Utc::now(),
        )
        .unwrap();
        for action in actions {
            let events = o
                .handle(&TransitionOrder { action: *action, occurred_at: Utc::now() })
                .unwrap();
            for e in &events {
                o.apply(e);
            }
        }
        o
    }

    #[test]
    fn cancelled_orders_are_counted_but_not_spent() {
        let acme = supplier("Acme");
        let idle = supplier("Idle");
        let orders = vec![
            order(acme.id, 1000, &[]),
            order(acme.id, 3000, &[OrderAction::Confirm, OrderAction::Deliver]),
            order(acme.id, 9999, &[OrderAction::Cancel]),
        ];
        let report = supplier_spend(&[idle.clone(), acme.clone()], &orders).unwrap();

        let top = &report.suppliers[0];
        assert_eq!(top.supplier_id, acme.id);
        assert_eq!(top.total_orders, 3);
        assert_eq!((top.pending, top.delivered, top.cancelled), (1, 1, 1));
        assert_eq!(top.total_spent, Money::from_cents(4000));
        assert_eq!(top.average_order_value, Money::from_cents(2000));

        let none = &report.suppliers[1];
        assert_eq!(none.supplier_id, idle.id);
        assert_eq!(none.total_spent, Money::ZERO);
        assert_eq!(none.average_order_value, Money::ZERO);

        assert_eq!(report.total_suppliers, 2);
        assert_eq!(report.total_orders, 3);
        assert_eq!(report.total_spent, Money::from_cents(4000));
    }
}
