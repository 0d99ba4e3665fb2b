//! Organization aggregate: org-level policies and claimed domains.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use portcullis_core::{Aggregate, AggregateRoot, DomainError, OrgId};
use portcullis_events::Event;

use crate::policy::{DomainPolicy, PasswordComplexityPolicy, PolicySet};

pub const AGGREGATE_TYPE: &str = "org";

pub const DOMAIN_VERIFIED: &str = "org.domain.verified";
pub const DOMAIN_REMOVED: &str = "org.domain.removed";

/// Lower-cased, trimmed form used for every domain comparison.
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().to_lowercase()
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Org {
    pub id: OrgId,
    pub domain_policy: Option<DomainPolicy>,
    pub password_complexity_policy: Option<PasswordComplexityPolicy>,
    /// Domain name → verified.
    pub domains: BTreeMap<String, bool>,
    pub version: u64,
    pub last_changed: Option<DateTime<Utc>>,
}

impl Org {
    pub fn empty(id: OrgId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn is_domain_verified(&self, domain: &str) -> bool {
        self.domains.get(&normalize_domain(domain)).copied().unwrap_or(false)
    }
}

impl AggregateRoot for Org {
    type Id = OrgId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct VerifyDomain {
    pub domain: String,
    /// Resolved by the caller from the verified domains of the instance.
    pub verified_by_other_org: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum OrgCommand {
    SetDomainPolicy(PolicySet<DomainPolicy>),
    SetPasswordComplexityPolicy(PolicySet<PasswordComplexityPolicy>),
    AddDomain(DomainChange),
    VerifyDomain(VerifyDomain),
    RemoveDomain(DomainChange),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainChange {
    pub domain: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrgEvent {
    DomainPolicySet(PolicySet<DomainPolicy>),
    PasswordComplexityPolicySet(PolicySet<PasswordComplexityPolicy>),
    DomainAdded(DomainChange),
    DomainVerified(DomainChange),
    DomainRemoved(DomainChange),
}

impl Event for OrgEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrgEvent::DomainPolicySet(_) => "org.policy.domain.set",
            OrgEvent::PasswordComplexityPolicySet(_) => "org.policy.password.complexity.set",
            OrgEvent::DomainAdded(_) => "org.domain.added",
            OrgEvent::DomainVerified(_) => DOMAIN_VERIFIED,
            OrgEvent::DomainRemoved(_) => DOMAIN_REMOVED,
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrgEvent::DomainPolicySet(e) => e.occurred_at,
            OrgEvent::PasswordComplexityPolicySet(e) => e.occurred_at,
            OrgEvent::DomainAdded(e) | OrgEvent::DomainVerified(e) | OrgEvent::DomainRemoved(e) => {
                e.occurred_at
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for Org {
    type Command = OrgCommand;
    type Event = OrgEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrgEvent::DomainPolicySet(e) => self.domain_policy = Some(e.policy),
            OrgEvent::PasswordComplexityPolicySet(e) => self.password_complexity_policy = Some(e.policy),
            OrgEvent::DomainAdded(e) => {
                self.domains.insert(e.domain.clone(), false);
            }
            OrgEvent::DomainVerified(e) => {
                self.domains.insert(e.domain.clone(), true);
            }
            OrgEvent::DomainRemoved(e) => {
                self.domains.remove(&e.domain);
            }
        }
        self.last_changed = Some(event.occurred_at());
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrgCommand::SetDomainPolicy(cmd) => {
                if self.domain_policy == Some(cmd.policy) {
                    return Ok(Vec::new());
                }
                Ok(vec![OrgEvent::DomainPolicySet(cmd.clone())])
            }
            OrgCommand::SetPasswordComplexityPolicy(cmd) => {
                if self.password_complexity_policy == Some(cmd.policy) {
                    return Ok(Vec::new());
                }
                Ok(vec![OrgEvent::PasswordComplexityPolicySet(cmd.clone())])
            }
            OrgCommand::AddDomain(cmd) => self.handle_add_domain(cmd),
            OrgCommand::VerifyDomain(cmd) => self.handle_verify_domain(cmd),
            OrgCommand::RemoveDomain(cmd) => self.handle_remove_domain(cmd),
        }
    }
}

impl Org {
    fn handle_add_domain(&self, cmd: &DomainChange) -> Result<Vec<OrgEvent>, DomainError> {
        let domain = normalize_domain(&cmd.domain);
        if domain.is_empty() {
            return Err(DomainError::invalid_argument("ORG-R24hb", "Errors.Org.InvalidDomain"));
        }
        if self.domains.contains_key(&domain) {
            return Err(DomainError::already_exists("ORG-i2h5e", "Errors.Org.DomainAlreadyExists"));
        }
        Ok(vec![OrgEvent::DomainAdded(DomainChange {
            domain,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_verify_domain(&self, cmd: &VerifyDomain) -> Result<Vec<OrgEvent>, DomainError> {
        let domain = normalize_domain(&cmd.domain);
        match self.domains.get(&domain) {
            None => Err(DomainError::not_found("ORG-Sjdi3", "Errors.Org.DomainNotOnOrg")),
            Some(true) => Ok(Vec::new()),
            Some(false) if cmd.verified_by_other_org => Err(DomainError::already_exists(
                "ORG-Bf45h",
                "Errors.Org.Domain.AlreadyVerified",
            )),
            Some(false) => Ok(vec![OrgEvent::DomainVerified(DomainChange {
                domain,
                occurred_at: cmd.occurred_at,
            })]),
        }
    }

    fn handle_remove_domain(&self, cmd: &DomainChange) -> Result<Vec<OrgEvent>, DomainError> {
        let domain = normalize_domain(&cmd.domain);
        if !self.domains.contains_key(&domain) {
            return Err(DomainError::not_found("ORG-Sjdi3", "Errors.Org.DomainNotOnOrg"));
        }
        Ok(vec![OrgEvent::DomainRemoved(DomainChange {
            domain,
            occurred_at: cmd.occurred_at,
        })])
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Verified domain claims across orgs
// ─────────────────────────────────────────────────────────────────────────────

/// Which org currently holds a verified claim on each domain of an instance.
///
/// Built by folding the verified/removed domain events of every org stream in
/// log order.
#[derive(Debug, Clone, Default)]
pub struct DomainClaims {
    owners: HashMap<String, OrgId>,
}

impl DomainClaims {
    pub fn apply(&mut self, org_id: &OrgId, event: &OrgEvent) {
        match event {
            OrgEvent::DomainVerified(e) => {
                self.owners.insert(e.domain.clone(), org_id.clone());
            }
            OrgEvent::DomainRemoved(e) => {
                if self.owners.get(&e.domain) == Some(org_id) {
                    self.owners.remove(&e.domain);
                }
            }
            _ => {}
        }
    }

    pub fn owner(&self, domain: &str) -> Option<&OrgId> {
        self.owners.get(&normalize_domain(domain))
    }

    /// True when `domain` is verified by an org other than `org_id`.
    pub fn claimed_by_other(&self, domain: &str, org_id: &OrgId) -> bool {
        self.owner(domain).is_some_and(|owner| owner != org_id)
    }
}
