use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::OrgId;

/// Outcome of a command: where the aggregate stands after it.
///
/// For a command that emitted nothing this describes the unchanged state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDetails {
    pub sequence: u64,
    pub event_date: DateTime<Utc>,
    pub resource_owner: OrgId,
}

impl ObjectDetails {
    pub fn new(sequence: u64, event_date: DateTime<Utc>, resource_owner: OrgId) -> Self {
        Self {
            sequence,
            event_date,
            resource_owner,
        }
    }
}
