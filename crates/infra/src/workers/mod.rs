//! Background workers that drive projections from the bus.

pub mod projection_worker;

pub use projection_worker::{ProjectionWorker, WorkerHandle};
