//! `portcullis-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod details;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use details::ObjectDetails;
pub use error::{DomainError, DomainResult, ErrorKind};
pub use id::{AggregateId, InstanceId, OrgId, UserId};
