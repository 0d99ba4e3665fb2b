/// Execute an aggregate command in memory (no IO, no persistence).
///
/// Decides events with `handle`, then folds them into the aggregate with
/// `apply`. Useful for unit tests and for replaying decisions without a store;
/// the persistent pipeline lives in the infra crate's `CommandDispatcher`.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: portcullis_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
