use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use stockroom_core::{typed_id, DomainError, DomainResult, Entity, Money};

typed_id!(
    /// Product identifier.
    ProductId
);

pub const DEFAULT_UNIT: &str = "unit";

const MAX_SKU_LEN: usize = 64;
const MAX_NAME_LEN: usize = 200;
const MAX_UNIT_LEN: usize = 32;

/// Product status lifecycle.
///
/// Products are never deleted; `Disabled` hides them from listings and from
/// new movements and orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Disabled,
}

impl ProductStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProductStatus::Active => "active",
            ProductStatus::Disabled => "disabled",
        }
    }
}

impl core::str::FromStr for ProductStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ProductStatus::Active),
            "disabled" => Ok(ProductStatus::Disabled),
            other => Err(DomainError::validation(format!("unknown product status '{other}'"))),
        }
    }
}

/// A catalog product as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub unit_price: Money,
    pub reorder_level: i64,
    pub unit: String,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Product {
    /// Build a new active product from validated input.
    pub fn create(id: ProductId, input: NewProduct, now: DateTime<Utc>) -> DomainResult<Self> {
        let input = input.normalized()?;
        Ok(Self {
            id,
            sku: input.sku,
            name: input.name,
            description: input.description,
            unit_price: input.unit_price,
            reorder_level: input.reorder_level,
            unit: input.unit.unwrap_or_else(|| DEFAULT_UNIT.to_string()),
            status: ProductStatus::Active,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == ProductStatus::Active
    }

    /// Movements and order lines may only reference active products.
    pub fn ensure_active(&self) -> DomainResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(DomainError::validation(format!(
                "product {} is disabled",
                self.sku
            )))
        }
    }

    /// Apply an edit. The SKU cannot change; nothing is written unless every
    /// field validates.
    pub fn apply_patch(&mut self, patch: ProductPatch, now: DateTime<Utc>) -> DomainResult<()> {
        if patch.is_empty() {
            return Err(DomainError::validation("patch contains no changes"));
        }
        let name = patch.name.as_deref().map(validate_name).transpose()?;
        let unit_price = patch.unit_price.map(validate_price).transpose()?;
        let reorder_level = patch.reorder_level.map(validate_reorder_level).transpose()?;
        let unit = patch.unit.as_deref().map(validate_unit).transpose()?;

        if let Some(name) = name {
            self.name = name;
        }
        if let Some(description) = patch.description {
            self.description = normalize_description(description);
        }
        if let Some(price) = unit_price {
            self.unit_price = price;
        }
        if let Some(level) = reorder_level {
            self.reorder_level = level;
        }
        if let Some(unit) = unit {
            self.unit = unit;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Soft-delete. Reference guards are checked by the caller's store.
    pub fn disable(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status == ProductStatus::Disabled {
            return Err(DomainError::conflict("product is already disabled"));
        }
        self.status = ProductStatus::Disabled;
        self.updated_at = now;
        Ok(())
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub unit_price: Money,
    pub reorder_level: i64,
    #[serde(default)]
    pub unit: Option<String>,
}

impl NewProduct {
    /// Trim and validate every field.
    pub fn normalized(self) -> DomainResult<Self> {
        Ok(Self {
            sku: validate_sku(&self.sku)?,
            name: validate_name(&self.name)?,
            description: self.description.and_then(|d| normalize_description(Some(d))),
            unit_price: validate_price(self.unit_price)?,
            reorder_level: validate_reorder_level(self.reorder_level)?,
            unit: self.unit.as_deref().map(validate_unit).transpose()?,
        })
    }
}

/// Partial update of a product. `description: Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present_or_null")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub unit_price: Option<Money>,
    #[serde(default)]
    pub reorder_level: Option<i64>,
    #[serde(default)]
    pub unit: Option<String>,
}

impl ProductPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.unit_price.is_none()
            && self.reorder_level.is_none()
            && self.unit.is_none()
    }
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn validate_sku(raw: &str) -> DomainResult<String> {
    let sku = raw.trim();
    if sku.is_empty() {
        return Err(DomainError::validation("SKU cannot be empty"));
    }
    if sku.len() > MAX_SKU_LEN {
        return Err(DomainError::validation(format!(
            "SKU exceeds {MAX_SKU_LEN} characters"
        )));
    }
    if sku.chars().any(char::is_whitespace) {
        return Err(DomainError::validation("SKU cannot contain whitespace"));
    }
    Ok(sku.to_string())
}

fn validate_name(raw: &str) -> DomainResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(DomainError::validation(format!(
            "name exceeds {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

fn validate_unit(raw: &str) -> DomainResult<String> {
    let unit = raw.trim();
    if unit.is_empty() || unit.len() > MAX_UNIT_LEN {
        return Err(DomainError::validation(format!(
            "unit must be 1..={MAX_UNIT_LEN} characters"
        )));
    }
    Ok(unit.to_string())
}

fn validate_price(price: Money) -> DomainResult<Money> {
    if price.is_negative() {
        return Err(DomainError::validation("unit price cannot be negative"));
    }
    Ok(price)
}

fn validate_reorder_level(level: i64) -> DomainResult<i64> {
    if level < 0 {
        return Err(DomainError::validation("reorder level cannot be negative"));
    }
    Ok(level)
}

fn normalize_description(raw: Option<String>) -> Option<String> {
    raw.map(|d| d.trim().to_string()).filter(|d| !d.is_empty())
}
