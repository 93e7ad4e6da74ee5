//! Fragment table: buffered fragments, newest first.

use crate::event::PhysicsEvent;
use crate::flush::FlushPolicy;
use adaq::record::{EventFragment, recency_cmp};

/// Bounded set of fragments waiting for their T3 to complete.
#[derive(Debug)]
pub struct FragmentTable {
    entries: Vec<EventFragment>,
    capacity: usize,
    unsorted: bool,
}

impl FragmentTable {
    /// Empty table holding at most `capacity` fragments.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            unsorted: false,
        }
    }

    /// Buffered fragments.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of fragments.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// No room for another fragment.
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.unsorted = false;
    }

    /// Add a fragment; hands it back when the table is full.
    pub fn push(&mut self, fragment: EventFragment) -> Result<(), EventFragment> {
        if self.is_full() {
            return Err(fragment);
        }
        self.entries.push(fragment);
        self.unsorted = true;
        Ok(())
    }

    /// Restore newest-first order if fragments were added.
    pub fn sort(&mut self) {
        if self.unsorted {
            self.entries.sort_by(recency_cmp);
            self.unsorted = false;
        }
    }

    /// Fragments, newest first once sorted.
    pub fn entries(&self) -> &[EventFragment] {
        &self.entries
    }

    /// Finalise T3s from the oldest end while `policy` allows it, or all of
    /// them when `force` is set. Events are returned oldest first.
    pub fn take_ready(&mut self, policy: &FlushPolicy, force: bool) -> Vec<PhysicsEvent> {
        self.sort();
        let mut events = Vec::new();
        while let (Some(newest), Some(oldest)) = (self.entries.first(), self.entries.last()) {
            if !force
                && !policy.should_flush(
                    newest.time.second,
                    oldest.time.second,
                    self.entries.len(),
                    self.capacity,
                )
            {
                break;
            }
            let t3_id = oldest.t3_id;
            let run = self
                .entries
                .iter()
                .rev()
                .take_while(|f| f.t3_id == t3_id)
                .count();
            let group = self.entries.split_off(self.entries.len() - run);
            events.extend(PhysicsEvent::merge(group));
        }
        events
    }
}
