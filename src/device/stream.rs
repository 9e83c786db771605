//! In-order device stream
//!
//! Operations are queued and run in issue order when the stream is waited
//! on (`wait_event` / `synchronize`), always on the thread that owns the
//! stream. Each pending operation records which buffers it holds, so the
//! issuing side can tell aliases owned by the stream from outside aliases.
//!
//! Dropping a stream discards whatever is still queued.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use log::{debug, trace};

type Op = Box<dyn FnOnce() + Send>;

struct PendingOp {
    seq: u64,
    held: Vec<usize>,
    op: Op,
}

/// Marker in the stream; complete once every operation issued before it ran
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Event {
    seq: u64,
}

pub struct DeviceStream {
    pending: VecDeque<PendingOp>,
    held: HashMap<usize, usize>,
    next_seq: u64,
    completed: u64,
}

impl DeviceStream {
    pub fn new() -> Self {
        DeviceStream {
            pending: VecDeque::new(),
            held: HashMap::new(),
            next_seq: 0,
            completed: 0,
        }
    }

    /// Queue `op`, which keeps the buffers in `held` alive until it runs
    pub fn enqueue<F>(&mut self, held: Vec<usize>, op: F) -> u64
    where
        F: FnOnce() + Send + 'static,
    {
        let seq = self.next_seq;
        self.next_seq += 1;
        for &id in &held {
            *self.held.entry(id).or_insert(0) += 1;
        }
        self.pending.push_back(PendingOp {
            seq,
            held,
            op: Box::new(op),
        });
        seq
    }

    /// Event covering every operation issued so far
    pub fn record_event(&self) -> Event {
        Event { seq: self.next_seq }
    }

    pub fn query(&self, event: Event) -> bool {
        self.completed >= event.seq
    }

    /// Run queued operations up to `event`
    pub fn wait_event(&mut self, event: Event) {
        let mut ran = 0usize;
        while self.pending.front().is_some_and(|p| p.seq < event.seq) {
            let Some(PendingOp { seq, held, op }) = self.pending.pop_front() else {
                break;
            };
            op();
            for id in held {
                if let Some(count) = self.held.get_mut(&id) {
                    *count -= 1;
                    if *count == 0 {
                        self.held.remove(&id);
                    }
                }
            }
            self.completed = seq + 1;
            ran += 1;
        }
        if ran > 0 {
            trace!("stream: ran {} ops up to event {}", ran, event.seq);
        }
    }

    /// Wait for everything issued so far
    pub fn synchronize(&mut self) {
        let event = self.record_event();
        self.wait_event(event);
    }

    pub fn pending_ops(&self) -> usize {
        self.pending.len()
    }

    /// Number of queued operations holding buffer `id`
    pub fn holds(&self, id: usize) -> usize {
        self.held.get(&id).copied().unwrap_or(0)
    }
}

impl Default for DeviceStream {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DeviceStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceStream")
            .field("pending", &self.pending.len())
            .field("completed", &self.completed)
            .finish()
    }
}

impl Drop for DeviceStream {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            debug!("stream dropped with {} pending ops discarded", self.pending.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_ops_run_in_order_at_wait() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut stream = DeviceStream::new();
        for i in 0..3 {
            let log = Arc::clone(&log);
            stream.enqueue(vec![], move || log.lock().unwrap().push(i));
        }
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(stream.pending_ops(), 3);

        stream.synchronize();
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(stream.pending_ops(), 0);
    }

    #[test]
    fn test_event_covers_earlier_ops_only() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut stream = DeviceStream::new();
        let bump = |c: &Arc<AtomicUsize>| {
            let c = Arc::clone(c);
            move || {
                c.fetch_add(1, Ordering::SeqCst);
            }
        };

        stream.enqueue(vec![], bump(&count));
        let event = stream.record_event();
        stream.enqueue(vec![], bump(&count));
        assert!(!stream.query(event));

        stream.wait_event(event);
        assert!(stream.query(event));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(stream.pending_ops(), 1);
    }

    #[test]
    fn test_held_buffers_tracked() {
        let mut stream = DeviceStream::new();
        stream.enqueue(vec![7, 9], || {});
        stream.enqueue(vec![7], || {});
        assert_eq!(stream.holds(7), 2);
        assert_eq!(stream.holds(9), 1);
        stream.synchronize();
        assert_eq!(stream.holds(7), 0);
        assert_eq!(stream.holds(9), 0);
    }

    #[test]
    fn test_drop_discards_pending() {
        let count = Arc::new(AtomicUsize::new(0));
        {
            let mut stream = DeviceStream::new();
            let c = Arc::clone(&count);
            stream.enqueue(vec![], move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(Arc::strong_count(&count), 1);
    }
}
