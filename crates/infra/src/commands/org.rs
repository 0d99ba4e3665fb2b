//! Org and instance administration: policies and verified domains.
//!
//! Orgs and instances have no explicit creation command here; their streams
//! start with the first policy or domain event.

use serde_json::Value as JsonValue;

use portcullis_core::{DomainResult, InstanceId, ObjectDetails, OrgId};
use portcullis_events::{EventBus, EventEnvelope};
use portcullis_identity::{
    DomainChange, DomainPolicy, InstanceCommand, OrgCommand, PasswordComplexityPolicy, PolicySet, VerifyDomain,
    instance, normalize_domain, org,
};

use super::{Commands, now, require_instance, require_scope};
use crate::command_dispatcher::StreamTarget;
use crate::event_store::EventStore;

impl<S, B> Commands<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    #[tracing::instrument(skip(self))]
    pub fn set_org_domain_policy(
        &self,
        instance_id: &InstanceId,
        org_id: &OrgId,
        policy: DomainPolicy,
    ) -> DomainResult<ObjectDetails> {
        self.execute_org(
            instance_id,
            org_id,
            OrgCommand::SetDomainPolicy(PolicySet {
                policy,
                occurred_at: now(),
            }),
        )
    }

    #[tracing::instrument(skip(self))]
    pub fn set_org_password_complexity_policy(
        &self,
        instance_id: &InstanceId,
        org_id: &OrgId,
        policy: PasswordComplexityPolicy,
    ) -> DomainResult<ObjectDetails> {
        self.execute_org(
            instance_id,
            org_id,
            OrgCommand::SetPasswordComplexityPolicy(PolicySet {
                policy,
                occurred_at: now(),
            }),
        )
    }

    #[tracing::instrument(skip(self))]
    pub fn add_org_domain(&self, instance_id: &InstanceId, org_id: &OrgId, domain: &str) -> DomainResult<ObjectDetails> {
        self.execute_org(
            instance_id,
            org_id,
            OrgCommand::AddDomain(DomainChange {
                domain: domain.to_string(),
                occurred_at: now(),
            }),
        )
    }

    /// Marks a domain of the org verified, unless another org already holds it.
    #[tracing::instrument(skip(self))]
    pub fn verify_org_domain(
        &self,
        instance_id: &InstanceId,
        org_id: &OrgId,
        domain: &str,
    ) -> DomainResult<ObjectDetails> {
        require_scope(instance_id, org_id)?;
        let verified_by_other_org = self
            .domain_claims(instance_id)?
            .claimed_by_other(&normalize_domain(domain), org_id);
        self.execute_org(
            instance_id,
            org_id,
            OrgCommand::VerifyDomain(VerifyDomain {
                domain: domain.to_string(),
                verified_by_other_org,
                occurred_at: now(),
            }),
        )
    }

    #[tracing::instrument(skip(self))]
    pub fn remove_org_domain(
        &self,
        instance_id: &InstanceId,
        org_id: &OrgId,
        domain: &str,
    ) -> DomainResult<ObjectDetails> {
        self.execute_org(
            instance_id,
            org_id,
            OrgCommand::RemoveDomain(DomainChange {
                domain: domain.to_string(),
                occurred_at: now(),
            }),
        )
    }

    #[tracing::instrument(skip(self))]
    pub fn set_default_domain_policy(
        &self,
        instance_id: &InstanceId,
        policy: DomainPolicy,
    ) -> DomainResult<ObjectDetails> {
        self.execute_instance(
            instance_id,
            InstanceCommand::SetDefaultDomainPolicy(PolicySet {
                policy,
                occurred_at: now(),
            }),
        )
    }

    #[tracing::instrument(skip(self))]
    pub fn set_default_password_complexity_policy(
        &self,
        instance_id: &InstanceId,
        policy: PasswordComplexityPolicy,
    ) -> DomainResult<ObjectDetails> {
        self.execute_instance(
            instance_id,
            InstanceCommand::SetDefaultPasswordComplexityPolicy(PolicySet {
                policy,
                occurred_at: now(),
            }),
        )
    }

    fn execute_org(&self, instance_id: &InstanceId, org_id: &OrgId, command: OrgCommand) -> DomainResult<ObjectDetails> {
        require_scope(instance_id, org_id)?;
        let loaded = self.load_org(instance_id, org_id)?;
        let target = StreamTarget::new(instance_id, org_id, org::AGGREGATE_TYPE, org_id);
        self.commit(&target, &loaded, &command)
    }

    fn execute_instance(&self, instance_id: &InstanceId, command: InstanceCommand) -> DomainResult<ObjectDetails> {
        require_instance(instance_id)?;
        let loaded = self.load_instance(instance_id)?;
        let owner = OrgId::new(instance_id.as_str());
        let target = StreamTarget::new(instance_id, instance_id, instance::AGGREGATE_TYPE, &owner);
        self.commit(&target, &loaded, &command)
    }
}

#[cfg(test)]
mod tests {
    use portcullis_core::ErrorKind;

    use super::*;
    use crate::commands::testing::commands;

    fn inst() -> InstanceId {
        InstanceId::new("instance1")
    }

    #[test]
    fn org_policy_overrides_instance_default() {
        let (cmds, _store, _bus) = commands(&[]);
        let org1 = OrgId::new("org1");

        let err = cmds.domain_policy(&inst(), &org1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

        cmds.set_default_domain_policy(&inst(), DomainPolicy::default()).unwrap();
        assert_eq!(cmds.domain_policy(&inst(), &org1).unwrap(), DomainPolicy::default());

        let strict = DomainPolicy {
            user_login_must_be_domain: true,
            validate_org_domains: true,
            smtp_sender_address_matches_instance_domain: false,
        };
        cmds.set_org_domain_policy(&inst(), &org1, strict).unwrap();
        assert_eq!(cmds.domain_policy(&inst(), &org1).unwrap(), strict);
        assert_eq!(cmds.domain_policy(&inst(), &OrgId::new("org2")).unwrap(), DomainPolicy::default());
    }

    #[test]
    fn unchanged_policy_returns_current_details() {
        let (cmds, _store, _bus) = commands(&[]);
        let first = cmds
            .set_default_password_complexity_policy(&inst(), PasswordComplexityPolicy::default())
            .unwrap();
        let second = cmds
            .set_default_password_complexity_policy(&inst(), PasswordComplexityPolicy::default())
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(second.resource_owner, OrgId::new("instance1"));
    }

    #[test]
    fn domain_verified_by_another_org_cannot_be_verified_again() {
        let (cmds, _store, _bus) = commands(&[]);
        let org1 = OrgId::new("org1");
        let org2 = OrgId::new("org2");

        cmds.add_org_domain(&inst(), &org1, "Test.ch").unwrap();
        cmds.add_org_domain(&inst(), &org2, "test.ch").unwrap();
        cmds.verify_org_domain(&inst(), &org1, "test.ch").unwrap();

        let again = cmds.verify_org_domain(&inst(), &org1, "test.ch").unwrap();
        assert_eq!(again.sequence, 2);

        let err = cmds.verify_org_domain(&inst(), &org2, "test.ch").unwrap_err();
        assert_eq!(err.message_key(), "Errors.Org.Domain.AlreadyVerified");

        cmds.remove_org_domain(&inst(), &org1, "test.ch").unwrap();
        cmds.verify_org_domain(&inst(), &org2, "TEST.ch").unwrap();
        let claims = cmds.domain_claims(&inst()).unwrap();
        assert_eq!(claims.owner("test.ch"), Some(&org2));
    }

    #[test]
    fn admin_commands_require_scope() {
        let (cmds, _store, _bus) = commands(&[]);
        let err = cmds.add_org_domain(&inst(), &OrgId::new(""), "test.ch").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = cmds
            .set_default_domain_policy(&InstanceId::new(""), DomainPolicy::default())
            .unwrap_err();
        assert_eq!(err.message_key(), "Errors.Instance.IDMissing");
    }
}
