//! Prioritized semaphore gating concurrent rasterizer invocations
//!
//! A fixed number of permits is shared between four priority lanes, each a
//! FIFO. Waiters resolve to [`Acquisition::Acquired`] holding an RAII
//! [`Permit`], or to [`Acquisition::NotAcquired`] when dropped from the
//! queue; only a held permit ever releases, so the permit count is conserved
//! by construction.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures::channel::oneshot;

use crate::render::types::RenderPriority;

/// Outcome of an acquire
pub enum Acquisition {
    Acquired(Permit),
    NotAcquired,
}

impl Acquisition {
    pub fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired(_))
    }
}

/// RAII permit; dropping it hands the slot to the highest-priority waiter.
pub struct Permit {
    inner: Arc<SemaphoreInner>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        SemaphoreInner::release(&self.inner);
    }
}

type Waiter = oneshot::Sender<Option<Permit>>;

struct SemState {
    available: usize,
    max_permits: usize,
    lanes: [VecDeque<Waiter>; RenderPriority::COUNT],
    max_queue_size: usize,
}

impl SemState {
    fn purge_canceled(&mut self) {
        for lane in &mut self.lanes {
            lane.retain(|waiter| !waiter.is_canceled());
        }
    }

    fn waiting(&self) -> usize {
        self.lanes.iter().map(|lane| lane.len()).sum()
    }

    /// Shed waiters from the lowest non-empty lane upward until the queue
    /// fits. The shed senders are returned so they can be resolved outside
    /// the lock.
    fn enforce_cap(&mut self) -> Vec<Waiter> {
        self.purge_canceled();
        let mut shed = Vec::new();
        while self.waiting() > self.max_queue_size {
            let lowest = self
                .lanes
                .iter_mut()
                .rev()
                .find(|lane| !lane.is_empty());
            match lowest {
                Some(lane) => {
                    if let Some(waiter) = lane.pop_back() {
                        shed.push(waiter);
                    }
                }
                None => break,
            }
        }
        shed
    }
}

struct SemaphoreInner {
    state: Mutex<SemState>,
}

impl SemaphoreInner {
    /// Hand the permit to the highest-priority live waiter, or return it to
    /// the pool. Never called without conceptually holding a permit.
    fn release(inner: &Arc<SemaphoreInner>) {
        loop {
            let waiter = {
                let mut state = inner.state.lock().expect("semaphore poisoned");
                let next = state
                    .lanes
                    .iter_mut()
                    .find_map(|lane| lane.pop_front());
                match next {
                    Some(waiter) => waiter,
                    None => {
                        state.available = (state.available + 1).min(state.max_permits);
                        return;
                    }
                }
            };

            let permit = Permit {
                inner: inner.clone(),
            };
            match waiter.send(Some(permit)) {
                Ok(()) => return,
                Err(unsent) => {
                    // Receiver is gone. Reclaim the permit without running
                    // its destructor (we still hold the slot) and offer it
                    // to the next waiter.
                    if let Some(permit) = unsent {
                        std::mem::forget(permit);
                    }
                }
            }
        }
    }
}

/// The prioritized semaphore
#[derive(Clone)]
pub struct PrioritySemaphore {
    inner: Arc<SemaphoreInner>,
}

impl PrioritySemaphore {
    pub fn new(permits: usize, max_queue_size: usize) -> Self {
        Self {
            inner: Arc::new(SemaphoreInner {
                state: Mutex::new(SemState {
                    available: permits,
                    max_permits: permits,
                    lanes: Default::default(),
                    max_queue_size,
                }),
            }),
        }
    }

    /// Acquire a permit at the given priority. Resolves immediately when a
    /// permit is free; otherwise waits in the priority's FIFO lane. A
    /// waiter shed by queue overflow resolves `NotAcquired` and must not
    /// (and structurally cannot) release.
    pub async fn acquire(&self, priority: RenderPriority) -> Acquisition {
        let receiver = {
            let mut state = self.inner.state.lock().expect("semaphore poisoned");
            if state.available > 0 {
                state.available -= 1;
                return Acquisition::Acquired(Permit {
                    inner: self.inner.clone(),
                });
            }

            let (sender, receiver) = oneshot::channel();
            state.lanes[priority.lane()].push_back(sender);
            let shed = state.enforce_cap();
            drop(state);

            for waiter in shed {
                let _ = waiter.send(None);
            }
            receiver
        };

        match receiver.await {
            Ok(Some(permit)) => Acquisition::Acquired(permit),
            _ => Acquisition::NotAcquired,
        }
    }

    /// Non-blocking acquire, bypassing the lanes.
    pub fn try_acquire(&self) -> Option<Permit> {
        let mut state = self.inner.state.lock().expect("semaphore poisoned");
        if state.available > 0 {
            state.available -= 1;
            Some(Permit {
                inner: self.inner.clone(),
            })
        } else {
            None
        }
    }

    /// Resolve every waiter as not-acquired. Used on major view changes;
    /// callers never deadlock.
    pub fn clear_queue(&self) {
        let drained: Vec<Waiter> = {
            let mut state = self.inner.state.lock().expect("semaphore poisoned");
            state.lanes.iter_mut().flat_map(|lane| lane.drain(..)).collect()
        };
        for waiter in drained {
            let _ = waiter.send(None);
        }
    }

    /// Change the queue cap. Shrinking below the current queue length sheds
    /// lowest-priority waiters immediately; calling twice with the same
    /// value drops nothing further.
    pub fn set_max_queue_size(&self, max_queue_size: usize) {
        let shed = {
            let mut state = self.inner.state.lock().expect("semaphore poisoned");
            state.max_queue_size = max_queue_size;
            state.enforce_cap()
        };
        for waiter in shed {
            let _ = waiter.send(None);
        }
    }

    pub fn max_queue_size(&self) -> usize {
        self.inner.state.lock().expect("semaphore poisoned").max_queue_size
    }

    pub fn available_permits(&self) -> usize {
        self.inner.state.lock().expect("semaphore poisoned").available
    }

    pub fn max_permits(&self) -> usize {
        self.inner.state.lock().expect("semaphore poisoned").max_permits
    }

    /// Live waiters across all lanes.
    pub fn waiting(&self) -> usize {
        let mut state = self.inner.state.lock().expect("semaphore poisoned");
        state.purge_canceled();
        state.waiting()
    }

    /// Live waiters per priority, highest first.
    pub fn waiting_by_priority(&self) -> [usize; RenderPriority::COUNT] {
        let mut state = self.inner.state.lock().expect("semaphore poisoned");
        state.purge_canceled();
        let mut counts = [0; RenderPriority::COUNT];
        for (i, lane) in state.lanes.iter().enumerate() {
            counts[i] = lane.len();
        }
        counts
    }

    /// Queue occupancy in [0, 1].
    pub fn saturation(&self) -> f64 {
        let mut state = self.inner.state.lock().expect("semaphore poisoned");
        state.purge_canceled();
        if state.max_queue_size == 0 {
            return 1.0;
        }
        state.waiting() as f64 / state.max_queue_size as f64
    }
}
