//! Command side: validates intents, resolves cross-aggregate lookups and
//! capabilities, then commits the events decided by the target aggregate.
//!
//! Every command follows the same order of checks: required identifiers,
//! aggregate existence (replay), required policies, state machine. A command
//! appends once, conditionally on the version it read; a concurrent writer
//! surfaces as [`portcullis_core::ErrorKind::Conflict`].

mod features;
mod lookups;
mod org;
mod user_human;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use portcullis_core::{Aggregate, DomainError, DomainResult, InstanceId, ObjectDetails, OrgId};
use portcullis_events::{EventBus, EventEnvelope};
use portcullis_identity::{CodeGenerator, IdGenerator, PasswordHasher};

use crate::command_dispatcher::{CommandDispatcher, Loaded, StreamTarget, committed_details};
use crate::event_store::EventStore;

pub use user_human::{AddHuman, AddMetadataEntry, ChangeHuman, Email, PasswordChange, Phone};

/// Collaborators commands need besides the store, passed in explicitly.
#[derive(Clone)]
pub struct Capabilities {
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub code_generator: Arc<dyn CodeGenerator>,
    pub id_generator: Arc<dyn IdGenerator>,
}

impl core::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Capabilities").finish_non_exhaustive()
    }
}

/// Command processor over an event store and a bus.
#[derive(Debug)]
pub struct Commands<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    caps: Capabilities,
}

impl<S, B> Commands<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(store: S, bus: B, caps: Capabilities) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            caps,
        }
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B> {
        &self.dispatcher
    }

    /// Decide against `loaded`, commit, and describe where the aggregate stands.
    fn commit<A>(
        &self,
        target: &StreamTarget,
        loaded: &Loaded<A>,
        command: &A::Command,
    ) -> DomainResult<ObjectDetails>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: portcullis_events::Event + Serialize + DeserializeOwned,
    {
        let committed = self.dispatcher.execute(target, loaded, command)?;
        match committed_details(&committed, &target.resource_owner) {
            Some(details) => {
                tracing::info!(
                    aggregate_type = target.aggregate_type,
                    aggregate_id = %target.aggregate_id,
                    events = committed.len(),
                    sequence = details.sequence,
                    "events committed"
                );
                Ok(details)
            }
            None => {
                tracing::debug!(
                    aggregate_type = target.aggregate_type,
                    aggregate_id = %target.aggregate_id,
                    "command changed nothing"
                );
                Ok(loaded.details(&target.resource_owner))
            }
        }
    }
}

fn now() -> DateTime<Utc> {
    Utc::now()
}

fn require_instance(instance_id: &InstanceId) -> DomainResult<()> {
    if instance_id.is_missing() {
        return Err(DomainError::invalid_argument("COMMAND-Inst4e", "Errors.Instance.IDMissing"));
    }
    Ok(())
}

fn require_scope(instance_id: &InstanceId, org_id: &OrgId) -> DomainResult<()> {
    require_instance(instance_id)?;
    if org_id.is_missing() {
        return Err(DomainError::invalid_argument("COMMA-5Ky74", "Errors.ResourceOwnerMissing"));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;
    use std::time::Duration;

    use portcullis_core::DomainResult;
    use portcullis_events::InMemoryEventBus;
    use portcullis_identity::{EncryptionAlgorithm, GeneratedCode, PasswordHasher, SecretKind};

    use super::*;
    use crate::event_store::InMemoryEventStore;

    pub type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
    pub type TestCommands = Commands<Arc<InMemoryEventStore>, Bus>;

    pub use portcullis_identity::crypto::testing::PlainEncryption;

    /// Encodes passwords as `$plain$x$<password>`.
    #[derive(Debug, Default)]
    pub struct PlainHasher;

    impl PasswordHasher for PlainHasher {
        fn hash(&self, password: &str) -> DomainResult<String> {
            Ok(format!("$plain$x${password}"))
        }

        fn verify(&self, password: &str, encoded: &str) -> DomainResult<bool> {
            Ok(encoded == format!("$plain$x${password}"))
        }

        fn is_supported(&self, encoded: &str) -> bool {
            encoded.starts_with("$plain$")
        }
    }

    /// Returns a fixed code per kind, valid for one hour.
    #[derive(Debug, Default)]
    pub struct FixedCodes;

    impl CodeGenerator for FixedCodes {
        fn generate(&self, kind: SecretKind, alg: &dyn EncryptionAlgorithm) -> DomainResult<GeneratedCode> {
            let plain = match kind {
                SecretKind::InitCode => "userinit",
                SecretKind::EmailVerificationCode => "emailCode",
                SecretKind::PhoneVerificationCode => "phoneCode",
                SecretKind::PasswordResetCode => "code",
            };
            Ok(GeneratedCode {
                crypted: alg.encrypt(plain.as_bytes())?,
                plain: plain.to_string(),
                expiry: Duration::from_secs(3600),
            })
        }
    }

    /// Hands out the queued ids in order.
    #[derive(Debug, Default)]
    pub struct QueuedIds(pub Mutex<Vec<String>>);

    impl IdGenerator for QueuedIds {
        fn next_id(&self) -> String {
            let mut ids = self.0.lock().unwrap();
            if ids.is_empty() { "generated".to_string() } else { ids.remove(0) }
        }
    }

    pub fn commands(ids: &[&str]) -> (TestCommands, Arc<InMemoryEventStore>, Bus) {
        let store = Arc::new(InMemoryEventStore::new());
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let caps = Capabilities {
            password_hasher: Arc::new(PlainHasher),
            code_generator: Arc::new(FixedCodes),
            id_generator: Arc::new(QueuedIds(Mutex::new(ids.iter().map(|s| s.to_string()).collect()))),
        };
        (Commands::new(store.clone(), bus.clone(), caps), store, bus)
    }
}
