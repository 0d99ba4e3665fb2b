//! `portcullis-events`: event-sourcing mechanics shared by every bounded context.
//!
//! Storage-free: event and envelope shapes, pub/sub, projection replay.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;
pub mod instance;
pub mod projection;
pub mod runner;

pub use bus::{EventBus, Subscription};
pub use envelope::{EventEnvelope, StreamPosition};
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use instance::InstanceScoped;
pub use projection::Projection;
pub use runner::{ApplyOutcome, ProjectionCursor, ProjectionError, ProjectionRunner};
