//! Ordered-Delivery Buffer
//!
//! One buffer per sending member. Requests that must be answered in arrival
//! order are admitted here before they are scheduled, each receiving the next
//! process id. Completions that arrive ahead of an earlier, still running
//! request are parked in their slot; completing the request at the watermark
//! releases it together with every parked response directly behind it.
//!
//! Completing an id that was never admitted, or completing the same id twice,
//! means the protocol is corrupt and panics.

use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;

pub type ProcessId = u64;

/// Window size at which a stuck watermark starts being reported.
const WINDOW_WARN_THRESHOLD: usize = 1 << 16;

enum Slot<Q, R> {
    Pending(Q),
    Completed(R),
}

struct Window<Q, R> {
    /// First outstanding process id. Never decreases.
    first: ProcessId,
    /// Next id handed out by `admit`.
    next: ProcessId,
    slots: BTreeMap<ProcessId, Slot<Q, R>>,
}

pub struct OrderedBuffer<Q, R> {
    window: Mutex<Window<Q, R>>,
}

/// Result of [`OrderedBuffer::complete`].
pub enum Release<'a, Q, R> {
    /// Responses to hand to the transport, in order.
    SendNow(Drain<'a, Q, R>),
    /// Parked behind an earlier request; nothing to send yet.
    Deferred,
}

impl<Q, R> Release<'_, Q, R> {
    pub fn is_deferred(&self) -> bool {
        matches!(self, Release::Deferred)
    }
}

/// Released responses.
///
/// The buffer stays locked until the drain is dropped, so responses handed to
/// the transport while iterating cannot be overtaken by a concurrent
/// completion for the same sender. Do not hold it across an `.await`.
pub struct Drain<'a, Q, R> {
    responses: std::vec::IntoIter<R>,
    _window: MutexGuard<'a, Window<Q, R>>,
}

impl<Q, R> Iterator for Drain<'_, Q, R> {
    type Item = R;

    fn next(&mut self) -> Option<R> {
        self.responses.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.responses.size_hint()
    }
}

impl<Q, R> ExactSizeIterator for Drain<'_, Q, R> {}

impl<Q, R> Default for OrderedBuffer<Q, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Q, R> OrderedBuffer<Q, R> {
    pub fn new() -> Self {
        Self {
            window: Mutex::new(Window {
                first: 0,
                next: 0,
                slots: BTreeMap::new(),
            }),
        }
    }

    /// Reserves the next process id for `request`.
    pub fn admit(&self, request: Q) -> ProcessId {
        let mut window = self.window.lock();
        let process_id = window.next;
        window.next += 1;
        window.slots.insert(process_id, Slot::Pending(request));

        let size = window.slots.len();
        if size % WINDOW_WARN_THRESHOLD == 0 {
            tracing::warn!(
                "Ordered window has grown to {} entries; first outstanding id is {}",
                size,
                window.first
            );
        }

        process_id
    }

    /// Records the response for `process_id` and returns what may be sent now.
    ///
    /// # Panics
    /// If `process_id` was never admitted or has already been completed.
    pub fn complete(&self, process_id: ProcessId, response: R) -> Release<'_, Q, R> {
        let mut window = self.window.lock();

        match window.slots.get(&process_id) {
            Some(Slot::Pending(_)) => {}
            Some(Slot::Completed(_)) => {
                panic!("protocol invariant violation: process id {process_id} completed twice")
            }
            None if process_id < window.first => {
                panic!(
                    "protocol invariant violation: process id {process_id} already released (watermark {})",
                    window.first
                )
            }
            None => panic!("protocol invariant violation: process id {process_id} was never admitted"),
        }

        if process_id != window.first {
            assert!(
                process_id > window.first,
                "protocol invariant violation: process id {process_id} is below watermark {}",
                window.first
            );
            window.slots.insert(process_id, Slot::Completed(response));
            return Release::Deferred;
        }

        window.slots.remove(&process_id);
        window.first += 1;
        let mut responses = vec![response];

        loop {
            let first = window.first;
            match window.slots.get(&first) {
                Some(Slot::Completed(_)) => {}
                _ => break,
            }
            if let Some(Slot::Completed(deferred)) = window.slots.remove(&first) {
                responses.push(deferred);
            }
            window.first += 1;
        }

        Release::SendNow(Drain {
            responses: responses.into_iter(),
            _window: window,
        })
    }

    /// First outstanding process id.
    pub fn watermark(&self) -> ProcessId {
        self.window.lock().first
    }

    /// Number of admitted requests not yet released, parked responses included.
    pub fn len(&self) -> usize {
        self.window.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of parked responses waiting on an earlier request.
    pub fn deferred_count(&self) -> usize {
        self.window
            .lock()
            .slots
            .values()
            .filter(|slot| matches!(slot, Slot::Completed(_)))
            .count()
    }
}
