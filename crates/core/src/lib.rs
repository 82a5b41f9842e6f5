//! `stockroom-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod error;
pub mod event;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, Entity, ExpectedVersion};
pub use error::{DomainError, DomainResult, ErrorKind};
pub use event::Event;
pub use id::{AggregateId, UserId};
pub use value_object::{Money, ValueObject};

/// Re-exported for [`typed_id!`] expansions in downstream crates.
pub use uuid;
