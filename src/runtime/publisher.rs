//! Buffered outbox for writes requested by change handlers.

use heapless::Vec;

use super::traits::PublishOutbox;
use crate::util::FieldName;
use crate::value::TopicValue;

/// Default number of writes a single handler invocation may queue.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 8;

/// A write queued by a change handler.
#[derive(Debug, Clone)]
pub struct PendingWrite {
    /// The field of the handler's owner to write to.
    pub field: FieldName,
    /// The value to publish.
    pub value: TopicValue,
}

/// A buffered outbox that collects writes during change handler calls.
///
/// This is used internally by the dispatcher to collect the writes of one
/// registrant's handler, then perform them asynchronously afterwards.
///
/// # Type Parameters
///
/// - `CAPACITY`: Maximum number of writes that can be buffered
pub struct BufferedOutbox<const CAPACITY: usize> {
    writes: Vec<PendingWrite, CAPACITY>,
    dropped: usize,
}

impl<const CAPACITY: usize> BufferedOutbox<CAPACITY> {
    /// Create a new empty buffered outbox.
    pub fn new() -> Self {
        Self {
            writes: Vec::new(),
            dropped: 0,
        }
    }

    /// Drain all buffered writes in the order they were queued.
    pub fn drain(&mut self) -> impl Iterator<Item = PendingWrite> + use<CAPACITY> {
        self.dropped = 0;
        core::mem::take(&mut self.writes).into_iter()
    }

    /// Check if the outbox is empty.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Get the number of buffered writes.
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Number of writes refused since the last drain because the outbox was
    /// full or the field name was too long.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl<const CAPACITY: usize> Default for BufferedOutbox<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAPACITY: usize> PublishOutbox for BufferedOutbox<CAPACITY> {
    fn set(&mut self, field: &str, value: TopicValue) {
        let mut name = FieldName::new();
        if name.push_str(field).is_err() {
            warn!("dropping write to {}: field name too long", field);
            self.dropped += 1;
            return;
        }

        if self.writes.push(PendingWrite { field: name, value }).is_err() {
            warn!("dropping write to {}: outbox full ({} writes)", field, CAPACITY);
            self.dropped += 1;
        }
    }
}
