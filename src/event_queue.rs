// SPDX-License-Identifier: MPL-2.0
//! Timed event queue: single-threaded ordered dispatch of delayed callbacks.
//!
//! A dedicated worker thread owns a priority queue keyed by scheduled time.
//! Events with the same scheduled time fire in FIFO insertion order, and all
//! callbacks run serially on the worker thread. `cancel` removes a pending
//! event but never interrupts one already executing; a callback that was
//! dequeued before its cancellation must re-check its own pending flag.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as MemOrdering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{trace, warn};

use crate::time_units::duration_from_us;

/// Identifier for a posted event, allocated by [`TimedEventQueue::next_event_id`].
///
/// The owner of an id may post many occurrences of "its" event over time;
/// `cancel` removes every pending occurrence with that id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(u64);

type EventCallback = Box<dyn FnOnce() + Send>;

struct QueueEntry {
    due: Instant,
    seq: u64,
    id: EventId,
    callback: EventCallback,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the earliest deadline wins,
        // with the insertion sequence breaking ties FIFO.
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct QueueState {
    entries: BinaryHeap<QueueEntry>,
    next_seq: u64,
    running: bool,
}

struct QueueShared {
    state: Mutex<QueueState>,
    cond: Condvar,
}

impl QueueShared {
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Deadline-ordered event queue with a dedicated dispatch thread.
pub struct TimedEventQueue {
    shared: Arc<QueueShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl Default for TimedEventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TimedEventQueue {
    /// Creates a stopped queue. Call [`start`](Self::start) before posting.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(QueueShared {
                state: Mutex::new(QueueState {
                    entries: BinaryHeap::new(),
                    next_seq: 0,
                    running: false,
                }),
                cond: Condvar::new(),
            }),
            worker: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocates a fresh event id.
    pub fn next_event_id(&self) -> EventId {
        EventId(self.next_id.fetch_add(1, MemOrdering::Relaxed))
    }

    /// Starts the worker thread. Idempotent.
    pub fn start(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            return;
        }

        self.shared.lock_state().running = true;

        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("timed-event-queue".into())
            .spawn(move || worker_loop(&shared));
        match handle {
            Ok(handle) => *worker = Some(handle),
            Err(e) => {
                self.shared.lock_state().running = false;
                warn!("failed to spawn event queue worker: {e}");
            }
        }
    }

    /// Stops the worker, discarding all pending events and refusing further
    /// posts. Must not be called from the worker thread itself.
    pub fn stop(&self) {
        {
            let mut state = self.shared.lock_state();
            state.running = false;
            let dropped = state.entries.len();
            state.entries.clear();
            if dropped > 0 {
                trace!(dropped, "event queue stopped with pending events");
            }
        }
        self.shared.cond.notify_all();

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    /// Returns whether the worker is accepting posts.
    pub fn is_running(&self) -> bool {
        self.shared.lock_state().running
    }

    /// Posts an event for immediate dispatch.
    /// Returns false if the queue is stopped.
    pub fn post<F>(&self, id: EventId, callback: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_at(id, Instant::now(), Box::new(callback))
    }

    /// Posts an event to fire after `delay_us` microseconds.
    /// Returns false if the queue is stopped.
    pub fn post_with_delay<F>(&self, id: EventId, delay_us: i64, callback: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_at(
            id,
            Instant::now() + duration_from_us(delay_us),
            Box::new(callback),
        )
    }

    fn post_at(&self, id: EventId, due: Instant, callback: EventCallback) -> bool {
        let mut state = self.shared.lock_state();
        if !state.running {
            trace!(?id, "post refused: queue is stopped");
            return false;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.push(QueueEntry {
            due,
            seq,
            id,
            callback,
        });
        drop(state);
        self.shared.cond.notify_all();
        true
    }

    /// Removes every pending occurrence of `id`. An occurrence already
    /// dequeued for execution is not interrupted.
    pub fn cancel(&self, id: EventId) {
        let mut state = self.shared.lock_state();
        state.entries.retain(|entry| entry.id != id);
    }
}

impl Drop for TimedEventQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(shared: &QueueShared) {
    let mut state = shared.lock_state();
    loop {
        if !state.running {
            break;
        }

        let now = Instant::now();
        match state.entries.peek().map(|entry| entry.due) {
            None => {
                state = shared
                    .cond
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            Some(due) if due <= now => {
                // Entry presence was just confirmed by peek.
                if let Some(entry) = state.entries.pop() {
                    drop(state);
                    (entry.callback)();
                    state = shared.lock_state();
                }
            }
            Some(due) => {
                let (guard, _timeout) = shared
                    .cond
                    .wait_timeout(state, due - now)
                    .unwrap_or_else(PoisonError::into_inner);
                state = guard;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    fn recording_queue() -> (TimedEventQueue, Arc<Mutex<Vec<u32>>>) {
        let queue = TimedEventQueue::new();
        queue.start();
        (queue, Arc::new(Mutex::new(Vec::new())))
    }

    fn record(log: &Arc<Mutex<Vec<u32>>>, value: u32) -> impl FnOnce() + Send + 'static {
        let log = Arc::clone(log);
        move || log.lock().unwrap().push(value)
    }

    #[test]
    fn events_fire_in_deadline_order() {
        let (queue, log) = recording_queue();
        let id = queue.next_event_id();

        queue.post_with_delay(id, 80_000, record(&log, 2));
        queue.post_with_delay(id, 20_000, record(&log, 1));

        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn same_deadline_fires_fifo() {
        let (queue, log) = recording_queue();
        let id = queue.next_event_id();

        for value in 0..5 {
            queue.post_with_delay(id, 50_000, record(&log, value));
        }

        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn immediate_post_runs_promptly() {
        let (queue, log) = recording_queue();
        queue.post(queue.next_event_id(), record(&log, 7));

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(*log.lock().unwrap(), vec![7]);
    }

    #[test]
    fn cancel_removes_pending_events() {
        let (queue, log) = recording_queue();
        let cancelled = queue.next_event_id();
        let kept = queue.next_event_id();

        queue.post_with_delay(cancelled, 40_000, record(&log, 1));
        queue.post_with_delay(kept, 40_000, record(&log, 2));
        queue.cancel(cancelled);

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(*log.lock().unwrap(), vec![2]);
    }

    #[test]
    fn cancel_does_not_interrupt_running_callback() {
        let queue = TimedEventQueue::new();
        queue.start();
        let id = queue.next_event_id();
        let completed = Arc::new(AtomicBool::new(false));
        let completed_clone = Arc::clone(&completed);

        queue.post(id, move || {
            std::thread::sleep(Duration::from_millis(60));
            completed_clone.store(true, MemOrdering::SeqCst);
        });

        std::thread::sleep(Duration::from_millis(20));
        queue.cancel(id);
        std::thread::sleep(Duration::from_millis(80));
        assert!(completed.load(MemOrdering::SeqCst));
    }

    #[test]
    fn stop_refuses_further_posts() {
        let (queue, log) = recording_queue();
        queue.stop();

        assert!(!queue.post(queue.next_event_id(), record(&log, 1)));
        assert!(!queue.is_running());
        std::thread::sleep(Duration::from_millis(30));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn stop_discards_pending_events() {
        let (queue, log) = recording_queue();
        queue.post_with_delay(queue.next_event_id(), 200_000, record(&log, 1));
        queue.stop();

        std::thread::sleep(Duration::from_millis(250));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn callbacks_run_serially() {
        let queue = TimedEventQueue::new();
        queue.start();
        let in_callback = Arc::new(AtomicBool::new(false));
        let overlapped = Arc::new(AtomicBool::new(false));

        for _ in 0..4 {
            let in_callback = Arc::clone(&in_callback);
            let overlapped = Arc::clone(&overlapped);
            queue.post(queue.next_event_id(), move || {
                if in_callback.swap(true, MemOrdering::SeqCst) {
                    overlapped.store(true, MemOrdering::SeqCst);
                }
                std::thread::sleep(Duration::from_millis(10));
                in_callback.store(false, MemOrdering::SeqCst);
            });
        }

        std::thread::sleep(Duration::from_millis(120));
        assert!(!overlapped.load(MemOrdering::SeqCst));
    }

    #[test]
    fn restart_after_stop_accepts_posts() {
        let (queue, log) = recording_queue();
        queue.stop();
        queue.start();

        assert!(queue.post(queue.next_event_id(), record(&log, 3)));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(*log.lock().unwrap(), vec![3]);
    }

    #[test]
    fn event_ids_are_unique() {
        let queue = TimedEventQueue::new();
        let a = queue.next_event_id();
        let b = queue.next_event_id();
        assert_ne!(a, b);
    }
}
