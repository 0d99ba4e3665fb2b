//! Filtered reads across the streams of one instance.
//!
//! Used for cross-aggregate lookups (e.g. which org verified a domain) without
//! a dedicated read model.

use serde::{Deserialize, Serialize};

use portcullis_core::AggregateId;

use crate::event_store::StoredEvent;

/// Filter criteria for [`crate::event_store::EventStore::filter`].
///
/// Empty criteria match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Filter by aggregate type (e.g. "org").
    pub aggregate_type: Option<String>,
    /// Filter by aggregate id.
    pub aggregate_id: Option<AggregateId>,
    /// Keep only these event types (e.g. "org.domain.verified").
    pub event_types: Vec<String>,
}

impl EventFilter {
    pub fn aggregate_type(aggregate_type: impl Into<String>) -> Self {
        Self {
            aggregate_type: Some(aggregate_type.into()),
            ..Default::default()
        }
    }

    pub fn with_aggregate_id(mut self, aggregate_id: AggregateId) -> Self {
        self.aggregate_id = Some(aggregate_id);
        self
    }

    pub fn with_event_types<I, T>(mut self, event_types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.event_types.extend(event_types.into_iter().map(Into::into));
        self
    }

    pub fn matches(&self, event: &StoredEvent) -> bool {
        self.aggregate_type
            .as_deref()
            .is_none_or(|t| t == event.aggregate_type)
            && self
                .aggregate_id
                .as_ref()
                .is_none_or(|id| *id == event.aggregate_id)
            && (self.event_types.is_empty() || self.event_types.iter().any(|t| *t == event.event_type))
    }
}
