//! Instance aggregate holding the default policies every org falls back to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use portcullis_core::{Aggregate, AggregateRoot, DomainError, InstanceId};
use portcullis_events::Event;

use crate::policy::{DomainPolicy, PasswordComplexityPolicy, PolicySet};

pub const AGGREGATE_TYPE: &str = "instance";

#[derive(Debug, Clone, Default)]
pub struct Instance {
    pub id: InstanceId,
    pub default_domain_policy: Option<DomainPolicy>,
    pub default_password_complexity_policy: Option<PasswordComplexityPolicy>,
    pub version: u64,
    pub last_changed: Option<DateTime<Utc>>,
}

impl Instance {
    pub fn empty(id: InstanceId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }
}

impl AggregateRoot for Instance {
    type Id = InstanceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone)]
pub enum InstanceCommand {
    SetDefaultDomainPolicy(PolicySet<DomainPolicy>),
    SetDefaultPasswordComplexityPolicy(PolicySet<PasswordComplexityPolicy>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceEvent {
    DefaultDomainPolicySet(PolicySet<DomainPolicy>),
    DefaultPasswordComplexityPolicySet(PolicySet<PasswordComplexityPolicy>),
}

impl Event for InstanceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InstanceEvent::DefaultDomainPolicySet(_) => "instance.policy.domain.set",
            InstanceEvent::DefaultPasswordComplexityPolicySet(_) => {
                "instance.policy.password.complexity.set"
            }
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InstanceEvent::DefaultDomainPolicySet(e) => e.occurred_at,
            InstanceEvent::DefaultPasswordComplexityPolicySet(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Instance {
    type Command = InstanceCommand;
    type Event = InstanceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InstanceEvent::DefaultDomainPolicySet(e) => self.default_domain_policy = Some(e.policy),
            InstanceEvent::DefaultPasswordComplexityPolicySet(e) => {
                self.default_password_complexity_policy = Some(e.policy)
            }
        }
        self.last_changed = Some(event.occurred_at());
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let event = match command {
            InstanceCommand::SetDefaultDomainPolicy(cmd) => {
                if self.default_domain_policy == Some(cmd.policy) {
                    return Ok(Vec::new());
                }
                InstanceEvent::DefaultDomainPolicySet(cmd.clone())
            }
            InstanceCommand::SetDefaultPasswordComplexityPolicy(cmd) => {
                if self.default_password_complexity_policy == Some(cmd.policy) {
                    return Ok(Vec::new());
                }
                InstanceEvent::DefaultPasswordComplexityPolicySet(cmd.clone())
            }
        };
        Ok(vec![event])
    }
}
