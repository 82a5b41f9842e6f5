use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_catalog::ProductId;
use stockroom_core::{typed_id, AggregateId, DomainError, DomainResult, Entity, UserId};

typed_id!(
    /// Stock movement identifier.
    MovementId
);

const MAX_NOTES_LEN: usize = 1000;
const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementKind {
    #[serde(rename = "stock-in")]
    StockIn,
    #[serde(rename = "stock-out")]
    StockOut,
    #[serde(rename = "adjustment")]
    Adjustment,
}

impl MovementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementKind::StockIn => "stock-in",
            MovementKind::StockOut => "stock-out",
            MovementKind::Adjustment => "adjustment",
        }
    }

    /// Signed effect of `quantity` (as recorded) on the on-hand quantity.
    pub fn signed(self, quantity: i64) -> i64 {
        match self {
            MovementKind::StockIn | MovementKind::Adjustment => quantity,
            MovementKind::StockOut => -quantity,
        }
    }

    fn validate_quantity(self, quantity: i64) -> DomainResult<()> {
        match self {
            MovementKind::StockIn | MovementKind::StockOut if quantity <= 0 => Err(
                DomainError::validation(format!("{} quantity must be positive", self.as_str())),
            ),
            MovementKind::Adjustment if quantity == 0 => {
                Err(DomainError::validation("adjustment quantity cannot be zero"))
            }
            _ => Ok(()),
        }
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for MovementKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stock-in" => Ok(MovementKind::StockIn),
            "stock-out" => Ok(MovementKind::StockOut),
            "adjustment" => Ok(MovementKind::Adjustment),
            other => Err(DomainError::validation(format!("unknown movement type '{other}'"))),
        }
    }
}

/// An immutable ledger entry.
///
/// `quantity` is stored as submitted: positive for stock-in/stock-out, signed
/// for adjustments. `sequence` is assigned by the store and breaks ties
/// between entries with the same `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub product_id: ProductId,
    #[serde(rename = "type")]
    pub kind: MovementKind,
    pub quantity: i64,
    pub actor_id: UserId,
    pub notes: Option<String>,
    pub source_order: Option<AggregateId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sequence: u64,
}

impl Entity for StockMovement {
    type Id = MovementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl StockMovement {
    /// Materialize a validated request as a ledger entry.
    pub fn record(
        id: MovementId,
        input: NewMovement,
        actor_id: UserId,
        created_at: DateTime<Utc>,
        sequence: u64,
    ) -> Self {
        Self {
            id,
            product_id: input.product_id,
            kind: input.kind,
            quantity: input.quantity,
            actor_id,
            notes: input.notes,
            source_order: input.source_order,
            idempotency_key: input.idempotency_key,
            created_at,
            sequence,
        }
    }

    pub fn signed_quantity(&self) -> i64 {
        self.kind.signed(self.quantity)
    }
}

/// A request to append one movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMovement {
    pub product_id: ProductId,
    #[serde(rename = "type")]
    pub kind: MovementKind,
    pub quantity: i64,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, skip_serializing)]
    pub idempotency_key: Option<String>,
    #[serde(skip)]
    pub source_order: Option<AggregateId>,
}

impl NewMovement {
    pub fn new(product_id: ProductId, kind: MovementKind, quantity: i64) -> Self {
        Self {
            product_id,
            kind,
            quantity,
            notes: None,
            idempotency_key: None,
            source_order: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// A stock-in generated by delivering a purchase order.
    pub fn receipt(product_id: ProductId, quantity: i64, order: AggregateId, note: String) -> Self {
        Self {
            product_id,
            kind: MovementKind::StockIn,
            quantity,
            notes: Some(note),
            idempotency_key: None,
            source_order: Some(order),
        }
    }

    /// Check the quantity against the kind and normalize free-text fields.
    pub fn validated(self) -> DomainResult<Self> {
        self.kind.validate_quantity(self.quantity)?;

        let notes = self
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        if notes.as_ref().is_some_and(|n| n.chars().count() > MAX_NOTES_LEN) {
            return Err(DomainError::validation(format!(
                "notes exceed {MAX_NOTES_LEN} characters"
            )));
        }

        let idempotency_key = match self.idempotency_key {
            Some(key) => {
                let key = key.trim().to_string();
                if key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
                    return Err(DomainError::validation(format!(
                        "idempotency key must be 1..={MAX_IDEMPOTENCY_KEY_LEN} characters"
                    )));
                }
                Some(key)
            }
            None => None,
        };

        Ok(Self {
            notes,
            idempotency_key,
            ..self
        })
    }

    pub fn signed_quantity(&self) -> i64 {
        self.kind.signed(self.quantity)
    }

    /// Whether `existing` records the same request (used when an idempotency
    /// key is replayed).
    pub fn matches_recorded(&self, existing: &StockMovement) -> bool {
        self.product_id == existing.product_id
            && self.kind == existing.kind
            && self.quantity == existing.quantity
    }
}
