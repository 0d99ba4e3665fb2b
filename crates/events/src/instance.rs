use portcullis_core::InstanceId;

use crate::EventEnvelope;

/// Messages that belong to exactly one instance.
///
/// Workers pinned to an instance use this to drop foreign messages.
pub trait InstanceScoped {
    fn instance_id(&self) -> &InstanceId;
}

impl<E> InstanceScoped for EventEnvelope<E> {
    fn instance_id(&self) -> &InstanceId {
        EventEnvelope::instance_id(self)
    }
}
