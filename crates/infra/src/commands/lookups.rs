//! Cross-aggregate reads commands make before handing a resolved command to
//! the target aggregate.

use serde_json::Value as JsonValue;

use portcullis_core::{AggregateId, DomainError, DomainResult, InstanceId, OrgId, UserId};
use portcullis_events::{EventBus, EventEnvelope};
use portcullis_identity::org::{self, DOMAIN_REMOVED, DOMAIN_VERIFIED};
use portcullis_identity::{
    DomainClaims, DomainPolicy, HumanUser, Instance, Org, OrgEvent, PasswordComplexityPolicy, instance, user,
};

use super::Commands;
use crate::command_dispatcher::Loaded;
use crate::event_store::{EventFilter, EventStore};

impl<S, B> Commands<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub(super) fn load_org(&self, instance_id: &InstanceId, org_id: &OrgId) -> DomainResult<Loaded<Org>> {
        Ok(self.dispatcher.load(
            instance_id,
            org::AGGREGATE_TYPE,
            &AggregateId::from(org_id),
            Org::empty(org_id.clone()),
        )?)
    }

    pub(super) fn load_instance(&self, instance_id: &InstanceId) -> DomainResult<Loaded<Instance>> {
        Ok(self.dispatcher.load(
            instance_id,
            instance::AGGREGATE_TYPE,
            &AggregateId::from(instance_id),
            Instance::empty(instance_id.clone()),
        )?)
    }

    /// Replays a user and hides users of other orgs.
    pub(super) fn load_user(
        &self,
        instance_id: &InstanceId,
        org_id: &OrgId,
        user_id: &UserId,
    ) -> DomainResult<Loaded<HumanUser>> {
        let loaded = self.dispatcher.load(
            instance_id,
            user::AGGREGATE_TYPE,
            &AggregateId::from(user_id),
            HumanUser::empty(user_id.clone(), org_id.clone()),
        )?;
        if loaded.resource_owner.as_ref().is_some_and(|owner| owner != org_id) {
            return Err(DomainError::not_found("COMMAND-k2unb", "Errors.User.NotFound"));
        }
        Ok(loaded)
    }

    /// Org policy, else the instance default.
    pub(super) fn domain_policy(&self, instance_id: &InstanceId, org_id: &OrgId) -> DomainResult<DomainPolicy> {
        if let Some(policy) = self.load_org(instance_id, org_id)?.aggregate.domain_policy {
            return Ok(policy);
        }
        self.load_instance(instance_id)?
            .aggregate
            .default_domain_policy
            .ok_or_else(|| DomainError::precondition("COMMAND-38fnu", "Errors.Org.DomainPolicy.NotExisting"))
    }

    /// Org policy, else the instance default.
    pub(super) fn password_complexity_policy(
        &self,
        instance_id: &InstanceId,
        org_id: &OrgId,
    ) -> DomainResult<PasswordComplexityPolicy> {
        if let Some(policy) = self.load_org(instance_id, org_id)?.aggregate.password_complexity_policy {
            return Ok(policy);
        }
        self.load_instance(instance_id)?
            .aggregate
            .default_password_complexity_policy
            .ok_or_else(|| {
                DomainError::precondition("COMMAND-Dfg32", "Errors.Org.PasswordComplexityPolicy.NotFound")
            })
    }

    /// Verified domain claims of every org of the instance.
    pub(super) fn domain_claims(&self, instance_id: &InstanceId) -> DomainResult<DomainClaims> {
        let filter = EventFilter::aggregate_type(org::AGGREGATE_TYPE).with_event_types([DOMAIN_VERIFIED, DOMAIN_REMOVED]);
        let mut claims = DomainClaims::default();
        for stored in self.dispatcher.store().filter(instance_id, &filter)? {
            let event: OrgEvent = serde_json::from_value(stored.payload).map_err(|e| {
                DomainError::internal("COMMAND-Cl4im", "Errors.Internal", format!("{}: {e}", stored.event_type))
            })?;
            claims.apply(&OrgId::new(stored.aggregate_id.as_str()), &event);
        }
        Ok(claims)
    }

    /// Rejects a username whose `@` suffix is a domain verified by another org.
    pub(super) fn check_username_domain(
        &self,
        instance_id: &InstanceId,
        org_id: &OrgId,
        username: &str,
        policy: &DomainPolicy,
    ) -> DomainResult<()> {
        if policy.user_login_must_be_domain {
            return Ok(());
        }
        let Some((_, domain)) = username.rsplit_once('@') else {
            return Ok(());
        };
        if domain.trim().is_empty() {
            return Ok(());
        }
        if self.domain_claims(instance_id)?.claimed_by_other(domain, org_id) {
            return Err(DomainError::invalid_argument(
                "COMMAND-SFd21",
                "Errors.User.DomainNotAllowedAsUsername",
            ));
        }
        Ok(())
    }
}
