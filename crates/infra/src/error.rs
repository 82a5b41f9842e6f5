//! Boundary error taxonomy returned by every service call.

use thiserror::Error;

use stockroom_auth::AuthzError;
use stockroom_catalog::{ProductId, SupplierId};
use stockroom_core::{DomainError, ErrorKind};
use stockroom_purchasing::OrderId;

use crate::store::StoreError;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error("an order must contain at least one item")]
    EmptyOrder,

    #[error("{0} not found")]
    NotFound(String),

    #[error("product {0} does not exist")]
    UnknownProduct(ProductId),

    #[error("supplier {0} does not exist")]
    UnknownSupplier(SupplierId),

    #[error("sku {0} is already in use")]
    DuplicateSku(String),

    #[error("cannot {action} an order that is {from}")]
    InvalidTransition {
        from: &'static str,
        action: &'static str,
    },

    #[error("order {0} has already been delivered")]
    AlreadyDelivered(OrderId),

    #[error("insufficient stock: {available} on hand, {requested} requested")]
    InsufficientStock { available: i64, requested: i64 },

    #[error("{0}")]
    Referenced(String),

    #[error("{0}")]
    Conflict(String),

    #[error("concurrent update: {0}")]
    Concurrency(String),

    #[error("storage failure: {0}")]
    Storage(StoreError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Unauthenticated => ErrorKind::Unauthenticated,
            ServiceError::Forbidden(_) => ErrorKind::Forbidden,
            ServiceError::Validation(_) | ServiceError::EmptyOrder => ErrorKind::Validation,
            ServiceError::NotFound(_)
            | ServiceError::UnknownProduct(_)
            | ServiceError::UnknownSupplier(_) => ErrorKind::NotFound,
            ServiceError::DuplicateSku(_)
            | ServiceError::InvalidTransition { .. }
            | ServiceError::AlreadyDelivered(_)
            | ServiceError::InsufficientStock { .. }
            | ServiceError::Referenced(_)
            | ServiceError::Conflict(_)
            | ServiceError::Concurrency(_) => ErrorKind::Conflict,
            ServiceError::Storage(_) => ErrorKind::StorageFailure,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Unauthenticated => "unauthenticated",
            ServiceError::Forbidden(_) => "forbidden",
            ServiceError::Validation(_) => "validation_error",
            ServiceError::EmptyOrder => "empty_order",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::UnknownProduct(_) => "unknown_product",
            ServiceError::UnknownSupplier(_) => "unknown_supplier",
            ServiceError::DuplicateSku(_) => "duplicate_sku",
            ServiceError::InvalidTransition { .. } => "invalid_transition",
            ServiceError::AlreadyDelivered(_) => "already_delivered",
            ServiceError::InsufficientStock { .. } => "insufficient_stock",
            ServiceError::Referenced(_) => "referenced_entity",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::Concurrency(_) => "concurrency_conflict",
            ServiceError::Storage(_) => "storage_failure",
        }
    }
}

impl From<AuthzError> for ServiceError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::Unauthenticated => ServiceError::Unauthenticated,
            AuthzError::Forbidden(reason) => ServiceError::Forbidden(reason),
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => ServiceError::Validation(msg),
            DomainError::InvariantViolation(msg) | DomainError::Conflict(msg) => {
                ServiceError::Conflict(msg)
            }
            DomainError::NotFound => ServiceError::NotFound("resource".to_string()),
            DomainError::InvalidTransition { from, action } => {
                ServiceError::InvalidTransition { from, action }
            }
            DomainError::InsufficientStock {
                available,
                requested,
            } => ServiceError::InsufficientStock {
                available,
                requested,
            },
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Rejected(err) => err.into(),
            StoreError::NotFound(what) => ServiceError::NotFound(what),
            StoreError::Referenced(msg) => ServiceError::Referenced(msg),
            StoreError::Concurrency(msg) => ServiceError::Concurrency(msg),
            StoreError::UniqueViolation(what) => {
                ServiceError::Conflict(format!("duplicate value: {what}"))
            }
            other @ (StoreError::Transient(_) | StoreError::Backend(_)) => {
                ServiceError::Storage(other)
            }
        }
    }
}
