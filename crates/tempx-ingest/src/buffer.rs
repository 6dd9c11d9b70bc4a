//! Record buffering between the feed and the streamer

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Append-only buffer whose contents can only leave through [`drain`].
///
/// Append and drain take the same lock, so a record is returned by exactly
/// one drain and never lost in between.
///
/// [`drain`]: RecordBuffer::drain
pub struct RecordBuffer<T> {
    records: Mutex<Vec<T>>,
}

impl<T> RecordBuffer<T> {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        // A panicking appender cannot leave the Vec half-written
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a record to the buffer
    pub fn append(&self, record: T) {
        self.lock().push(record);
    }

    /// Add several records under a single lock
    pub fn extend<I: IntoIterator<Item = T>>(&self, records: I) {
        self.lock().extend(records);
    }

    /// Take every buffered record, leaving the buffer empty
    pub fn drain(&self) -> Vec<T> {
        std::mem::take(&mut *self.lock())
    }

    /// Get current record count
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<T> Default for RecordBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}
