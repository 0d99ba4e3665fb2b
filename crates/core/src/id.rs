//! Strongly-typed identifiers used across the domain.
//!
//! Identifiers are opaque strings handed out by an external id generator (or
//! supplied by the caller). An identifier is considered missing when it is
//! empty after trimming.

use serde::{Deserialize, Serialize};

/// Identifier of an instance (multi-tenant boundary).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

/// Identifier of an organization (resource owner).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrgId(String);

/// Identifier of a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

/// Identifier of an aggregate stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(String);

macro_rules! impl_string_newtype {
    ($t:ty) => {
        impl $t {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True when the identifier is empty or whitespace only.
            pub fn is_missing(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $t {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $t {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }
    };
}

impl_string_newtype!(InstanceId);
impl_string_newtype!(OrgId);
impl_string_newtype!(UserId);
impl_string_newtype!(AggregateId);

macro_rules! impl_into_aggregate_id {
    ($t:ty) => {
        impl From<&$t> for AggregateId {
            fn from(value: &$t) -> Self {
                AggregateId(value.0.clone())
            }
        }
    };
}

// Users, orgs and instances are each the root of their own stream.
impl_into_aggregate_id!(UserId);
impl_into_aggregate_id!(OrgId);
impl_into_aggregate_id!(InstanceId);
