//! Byte-bounded ring of formatted lines for memory sinks.
//!
//! The writer thread is the producer; diagnostics and tests are the
//! consumers. When the byte budget is exhausted the oldest lines are
//! overwritten, so a memory sink holds a sliding window of the most recent
//! output.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Point-in-time copy of a ring's contents and counters.
#[derive(Debug, Clone)]
pub struct BufferSnapshot {
    pub lines: Vec<String>,
    pub evicted: u64,
}

struct RingState {
    lines: VecDeque<String>,
    bytes: usize,
    evicted: u64,
}

/// Shared line ring; clones refer to the same storage.
#[derive(Clone)]
pub struct LineRing {
    capacity_bytes: usize,
    state: Arc<Mutex<RingState>>,
}

impl LineRing {
    /// Creates a ring with the given byte budget.
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            capacity_bytes,
            state: Arc::new(Mutex::new(RingState {
                lines: VecDeque::new(),
                bytes: 0,
                evicted: 0,
            })),
        }
    }

    /// Appends a line, evicting from the front until it fits. A line larger
    /// than the whole budget is dropped and counted as evicted.
    pub fn push(&self, line: String) {
        let mut state = self.state.lock();
        if line.len() > self.capacity_bytes {
            state.evicted += 1;
            return;
        }
        while state.bytes + line.len() > self.capacity_bytes {
            if let Some(oldest) = state.lines.pop_front() {
                state.bytes -= oldest.len();
                state.evicted += 1;
            } else {
                break;
            }
        }
        state.bytes += line.len();
        state.lines.push_back(line);
    }

    /// Copies out the current contents, oldest first.
    pub fn snapshot(&self) -> BufferSnapshot {
        let state = self.state.lock();
        BufferSnapshot {
            lines: state.lines.iter().cloned().collect(),
            evicted: state.evicted,
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().lines.is_empty()
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.lines.clear();
        state.bytes = 0;
    }
}

impl std::fmt::Debug for LineRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LineRing")
            .field("capacity_bytes", &self.capacity_bytes)
            .field("lines", &state.lines.len())
            .field("bytes", &state.bytes)
            .field("evicted", &state.evicted)
            .finish()
    }
}
