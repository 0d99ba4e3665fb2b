//! Infrastructure layer: event storage, command processing, projections and
//! their read models, configuration.

pub mod command_dispatcher;
pub mod commands;
pub mod config;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod workers;


pub use command_dispatcher::{CommandDispatcher, DispatchError, Loaded, StreamTarget};
pub use commands::{Capabilities, Commands};
pub use config::IdentityConfig;
pub use event_store::{EventFilter, EventStore, EventStoreError, InMemoryEventStore};
pub use projections::InstanceFeaturesProjection;
pub use read_model::{FeatureEntry, FeatureStore, InMemoryFeatureStore, PostgresFeatureStore};
pub use workers::{ProjectionWorker, WorkerHandle};
