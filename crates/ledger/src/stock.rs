use serde::{Deserialize, Serialize};

use stockroom_catalog::ProductId;
use stockroom_core::{Aggregate, AggregateRoot, DomainError, DomainResult};

use crate::{MovementKind, NewMovement, StockMovement};

/// What to do when a decrease would take on-hand quantity below zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NegativeStockPolicy {
    /// Fail with `InsufficientStock`.
    #[default]
    Reject,
    /// Record the movement; the quantity goes negative (backorder).
    Allow,
}

/// Derived on-hand state of one product: the fold of its movements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductStock {
    product_id: ProductId,
    on_hand: i64,
    version: u64,
}

/// Signed change applied by one movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockDelta {
    pub kind: MovementKind,
    pub delta: i64,
}

impl From<&StockMovement> for StockDelta {
    fn from(m: &StockMovement) -> Self {
        Self {
            kind: m.kind,
            delta: m.signed_quantity(),
        }
    }
}

/// Command: append a validated movement under a stock policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMovement {
    pub movement: NewMovement,
    pub policy: NegativeStockPolicy,
}

impl ProductStock {
    pub fn empty(product_id: ProductId) -> Self {
        Self {
            product_id,
            on_hand: 0,
            version: 0,
        }
    }

    /// Start from a known running total (e.g. a store-maintained balance).
    pub fn at(product_id: ProductId, on_hand: i64, version: u64) -> Self {
        Self {
            product_id,
            on_hand,
            version,
        }
    }

    /// Fold a product's movements. Foreign movements are ignored.
    ///
    /// Fails with `Validation` if the running total leaves the `i64` range.
    pub fn from_movements<'a, I>(product_id: ProductId, movements: I) -> DomainResult<Self>
    where
        I: IntoIterator<Item = &'a StockMovement>,
    {
        let mut version = 0u64;
        let on_hand = checked_total(
            movements
                .into_iter()
                .filter(|m| m.product_id == product_id)
                .inspect(|_| version += 1)
                .map(StockMovement::signed_quantity),
        )?;
        Ok(Self::at(product_id, on_hand, version))
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn on_hand(&self) -> i64 {
        self.on_hand
    }
}

impl AggregateRoot for ProductStock {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.product_id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for ProductStock {
    type Command = RecordMovement;
    type Event = StockDelta;
    type Error = DomainError;

    // `handle` has already rejected deltas that overflow.
    fn apply(&mut self, event: &Self::Event) {
        self.on_hand = self.on_hand.saturating_add(event.delta);
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let movement = &command.movement;
        if movement.product_id != self.product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }

        let delta = movement.signed_quantity();
        let after = self
            .on_hand
            .checked_add(delta)
            .ok_or_else(|| DomainError::validation("quantity out of range"))?;

        if delta < 0 && after < 0 && command.policy == NegativeStockPolicy::Reject {
            return Err(DomainError::InsufficientStock {
                available: self.on_hand,
                requested: -delta,
            });
        }

        Ok(vec![StockDelta {
            kind: movement.kind,
            delta,
        }])
    }
}

/// Signed sum of movement deltas; `Validation` when it overflows.
pub fn checked_total<I>(deltas: I) -> DomainResult<i64>
where
    I: IntoIterator<Item = i64>,
{
    deltas
        .into_iter()
        .try_fold(0i64, i64::checked_add)
        .ok_or_else(|| DomainError::validation("quantity out of range"))
}

/// On-hand quantity of `product_id` given its movements, in any order.
pub fn current_quantity<'a, I>(product_id: ProductId, movements: I) -> DomainResult<i64>
where
    I: IntoIterator<Item = &'a StockMovement>,
{
    Ok(ProductStock::from_movements(product_id, movements)?.on_hand())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use stockroom_core::UserId;

    use super::*;
    use crate::MovementId;

    fn movement(product_id: ProductId, kind: MovementKind, quantity: i64, seq: u64) -> StockMovement {
        StockMovement::record(
            MovementId::new(),
            NewMovement::new(product_id, kind, quantity),
            UserId::new(),
            Utc::now(),
            seq,
        )
    }

    fn record(stock: &mut ProductStock, kind: MovementKind, qty: i64, policy: NegativeStockPolicy) -> Result<(), DomainError> {
        let cmd = RecordMovement {
            movement: NewMovement::new(stock.product_id(), kind, qty),
            policy,
        };
        for e in stock.handle(&cmd)? {
            stock.apply(&e);
        }
        Ok(())
    }

    #[test]
    fn widget_scenario_in_out_adjust() {
        let mut stock = ProductStock::empty(ProductId::new());
        assert_eq!(stock.on_hand(), 0);
        record(&mut stock, MovementKind::StockIn, 50, NegativeStockPolicy::Reject).unwrap();
        assert_eq!(stock.on_hand(), 50);
        record(&mut stock, MovementKind::StockOut, 20, NegativeStockPolicy::Reject).unwrap();
        assert_eq!(stock.on_hand(), 30);
        record(&mut stock, MovementKind::Adjustment, -5, NegativeStockPolicy::Reject).unwrap();
        assert_eq!(stock.on_hand(), 25);
        assert_eq!(stock.version(), 3);
    }

    #[test]
    fn reject_policy_refuses_overdraw() {
        let mut stock = ProductStock::empty(ProductId::new());
        record(&mut stock, MovementKind::StockIn, 3, NegativeStockPolicy::Reject).unwrap();
        let err = record(&mut stock, MovementKind::StockOut, 4, NegativeStockPolicy::Reject)
            .unwrap_err();
        assert_eq!(err, DomainError::InsufficientStock { available: 3, requested: 4 });
        assert_eq!(stock.on_hand(), 3);
    }

    #[test]
    fn allow_policy_records_backorders() {
        let mut stock = ProductStock::empty(ProductId::new());
        record(&mut stock, MovementKind::StockOut, 4, NegativeStockPolicy::Allow).unwrap();
        assert_eq!(stock.on_hand(), -4);
    }

    #[test]
    fn increases_are_accepted_even_when_already_negative() {
        let mut stock = ProductStock::at(ProductId::new(), -10, 1);
        record(&mut stock, MovementKind::StockIn, 2, NegativeStockPolicy::Reject).unwrap();
        assert_eq!(stock.on_hand(), -8);
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let stock = ProductStock::at(ProductId::new(), 7, 2);
        let before = stock.clone();
        let cmd = RecordMovement {
            movement: NewMovement::new(stock.product_id(), MovementKind::StockOut, 1),
            policy: NegativeStockPolicy::Reject,
        };
        let _ = stock.handle(&cmd);
        assert_eq!(stock, before);
    }

    #[test]
    fn fold_ignores_other_products() {
        let a = ProductId::new();
        let b = ProductId::new();
        let log = vec![
            movement(a, MovementKind::StockIn, 10, 1),
            movement(b, MovementKind::StockIn, 99, 2),
            movement(a, MovementKind::StockOut, 4, 3),
        ];
        assert_eq!(current_quantity(a, &log).unwrap(), 6);
        assert_eq!(current_quantity(b, &log).unwrap(), 99);
        assert_eq!(ProductStock::from_movements(a, &log).unwrap().version(), 2);
    }

    #[test]
    fn fold_reports_overflow_instead_of_wrapping() {
        let a = ProductId::new();
        let log = vec![
            movement(a, MovementKind::StockIn, i64::MAX, 1),
            movement(a, MovementKind::StockIn, 1, 2),
        ];
        assert!(matches!(current_quantity(a, &log), Err(DomainError::Validation(_))));
        assert!(checked_total([i64::MIN, -1]).is_err());
        assert_eq!(checked_total([i64::MAX, -1, 1]).unwrap(), i64::MAX);
    }

    #[test]
    fn handle_rejects_an_increase_past_the_maximum() {
        let stock = ProductStock::at(ProductId::new(), 1, 1);
        let cmd = RecordMovement {
            movement: NewMovement::new(stock.product_id(), MovementKind::StockIn, i64::MAX),
            policy: NegativeStockPolicy::Allow,
        };
        assert!(matches!(stock.handle(&cmd), Err(DomainError::Validation(_))));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_movement() -> impl Strategy<Value = (MovementKind, i64)> {
            prop_oneof![
                (1i64..10_000).prop_map(|q| (MovementKind::StockIn, q)),
                (1i64..10_000).prop_map(|q| (MovementKind::StockOut, q)),
                (-10_000i64..10_000)
                    .prop_filter("non-zero", |q| *q != 0)
                    .prop_map(|q| (MovementKind::Adjustment, q)),
            ]
        }

        proptest! {
            #[test]
            fn quantity_is_the_signed_sum(entries in prop::collection::vec(arb_movement(), 0..64)) {
                let product = ProductId::new();
                let log: Vec<_> = entries
                    .iter()
                    .enumerate()
                    .map(|(i, (kind, qty))| movement(product, *kind, *qty, i as u64))
                    .collect();
                let expected: i64 = entries.iter().map(|(k, q)| k.signed(*q)).sum();
                prop_assert_eq!(current_quantity(product, &log).unwrap(), expected);
            }

            #[test]
            fn fold_is_order_independent(
                entries in prop::collection::vec(arb_movement(), 1..64),
                seed in any::<u64>(),
            ) {
                let product = ProductId::new();
                let log: Vec<_> = entries
                    .iter()
                    .enumerate()
                    .map(|(i, (kind, qty))| movement(product, *kind, *qty, i as u64))
                    .collect();
                let mut shuffled = log.clone();
                // Deterministic rotation + reversal as a cheap permutation.
                let k = (seed as usize) % shuffled.len();
                shuffled.rotate_left(k);
                if seed % 2 == 0 {
                    shuffled.reverse();
                }
                prop_assert_eq!(current_quantity(product, &log).unwrap(), current_quantity(product, &shuffled).unwrap());
            }

            #[test]
            fn reject_policy_never_goes_negative(entries in prop::collection::vec(arb_movement(), 0..64)) {
                let mut stock = ProductStock::empty(ProductId::new());
                for (kind, qty) in entries {
                    let _ = record(&mut stock, kind, qty, NegativeStockPolicy::Reject);
                    prop_assert!(stock.on_hand() >= 0);
                }
            }
        }
    }
}
