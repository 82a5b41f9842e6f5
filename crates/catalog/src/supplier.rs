use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{typed_id, DomainError, DomainResult, Entity};

typed_id!(
    /// Supplier identifier.
    SupplierId
);

/// Contact details for a supplier. Every field is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub contact_person: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub country: String,
}

impl ContactInfo {
    fn normalized(self) -> DomainResult<Self> {
        let email = required("email", &self.email)?;
        if !email.contains('@') {
            return Err(DomainError::validation("email must contain '@'"));
        }
        Ok(Self {
            contact_person: required("contact_person", &self.contact_person)?,
            email,
            phone: required("phone", &self.phone)?,
            address: required("address", &self.address)?,
            city: required("city", &self.city)?,
            country: required("country", &self.country)?,
        })
    }
}

/// A supplier as persisted. Deletion is refused while orders reference it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: SupplierId,
    pub name: String,
    #[serde(flatten)]
    pub contact: ContactInfo,
    pub created_at: DateTime<Utc>,
}

impl Entity for Supplier {
    type Id = SupplierId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSupplier {
    pub name: String,
    #[serde(flatten)]
    pub contact: ContactInfo,
}

impl Supplier {
    pub fn create(id: SupplierId, input: NewSupplier, now: DateTime<Utc>) -> DomainResult<Self> {
        Ok(Self {
            id,
            name: required("name", &input.name)?,
            contact: input.contact.normalized()?,
            created_at: now,
        })
    }
}

fn required(field: &str, raw: &str) -> DomainResult<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(DomainError::validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}
