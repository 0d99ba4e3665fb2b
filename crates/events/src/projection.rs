use crate::EventEnvelope;

/// A projection builds a read model from an append-only event stream.
///
/// Read models are disposable: they can be dropped and rebuilt by replaying
/// events. Projections must be idempotent because the bus delivers
/// at-least-once; [`crate::ProjectionRunner`] additionally skips sequences it
/// has already applied.
///
/// Envelopes that the projection does not care about should be ignored
/// (`Ok(())`). Errors are reserved for data the projection cannot interpret,
/// which signals corruption rather than user error.
pub trait Projection {
    /// Envelope payload type (usually `serde_json::Value`).
    type Payload;
    type Error: core::fmt::Debug;

    /// Stable projection name (e.g. the backing table name).
    fn name(&self) -> &'static str;

    /// Apply a single envelope to the read model.
    fn apply(&self, envelope: &EventEnvelope<Self::Payload>) -> Result<(), Self::Error>;
}
