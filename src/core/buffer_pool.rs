//! Buffer pool: slot arena plus free/full index queues.
//!
//! The pool is the sole synchronization point between actor workers and
//! learner threads. All slots are allocated once at startup; only integer
//! indices travel through the queues, and receiving an index is what
//! transfers ownership of the slot it names.
//!
//! ```text
//!            acquire_free            publish_full
//!   [free] ───────────────▶ actor ───────────────▶ [full]
//!      ▲                                              │
//!      │        release                acquire_full   │
//!      └─────────────── learner ◀─────────────────────┘
//! ```
//!
//! Ownership is not merely assumed from the hand-off protocol: every slot
//! carries an atomic owner tag, and each transfer validates the expected
//! transition. A violated transition panics immediately — two concurrent
//! owners of one slot is unrecoverable corruption, not a condition to limp
//! through.
//!
//! Invariant: `free + full + in_flight == n_slots` after every completed
//! operation, where `in_flight` counts slots held by an actor or a learner.
//!
//! Shutdown uses in-band sentinels: one [`Ticket::Shutdown`] per actor is
//! pushed into the free queue (and one per learner thread into the full
//! queue), terminating each worker after its current segment. FIFO order
//! means workers drain real work queued ahead of the sentinel first.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use crate::core::slot::{SlotIndex, TrajectorySlot};

/// Owner tags for the per-slot atomic.
mod owner {
    pub const FREE: u8 = 0;
    pub const ACTOR: u8 = 1;
    pub const FULL: u8 = 2;
    pub const LEARNER: u8 = 3;

    pub fn name(tag: u8) -> &'static str {
        match tag {
            FREE => "free-queue",
            ACTOR => "actor",
            FULL => "full-queue",
            LEARNER => "learner",
            _ => "unknown",
        }
    }
}

/// Item received from a pool queue: either slot ownership or a stop signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ticket {
    /// Ownership of the slot with this index.
    Slot(SlotIndex),
    /// Terminate after the current segment.
    Shutdown,
}

/// Snapshot of the pool's ownership counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolCounts {
    /// Slots idle in the free queue.
    pub free: usize,
    /// Slots pending consumption in the full queue.
    pub full: usize,
    /// Slots currently held by an actor or a learner.
    pub in_flight: usize,
}

impl PoolCounts {
    /// Sum over all ownership classes; equals the pool size at quiescence.
    pub fn total(&self) -> usize {
        self.free + self.full + self.in_flight
    }
}

/// Arena of trajectory slots with FIFO free/full hand-off queues.
pub struct BufferPool {
    slots: Vec<Mutex<TrajectorySlot>>,
    owners: Vec<AtomicU8>,
    free_tx: Sender<Ticket>,
    free_rx: Receiver<Ticket>,
    full_tx: Sender<Ticket>,
    full_rx: Receiver<Ticket>,
    free_len: AtomicUsize,
    full_len: AtomicUsize,
    in_flight: AtomicUsize,
    /// Total ownership transfers, for instrumentation.
    handoffs: AtomicUsize,
}

impl BufferPool {
    /// Allocate `n_slots` slots and seed the free queue with all of them.
    pub fn new(
        n_slots: usize,
        unroll_length: usize,
        observation_len: usize,
        n_actions: usize,
    ) -> Self {
        assert!(n_slots >= 1, "buffer pool needs at least one slot");
        let (free_tx, free_rx) = unbounded();
        let (full_tx, full_rx) = unbounded();
        let slots = (0..n_slots)
            .map(|_| Mutex::new(TrajectorySlot::new(unroll_length, observation_len, n_actions)))
            .collect();
        let owners = (0..n_slots).map(|_| AtomicU8::new(owner::FREE)).collect();
        for idx in 0..n_slots {
            free_tx
                .send(Ticket::Slot(idx))
                .expect("buffer pool free queue disconnected");
        }
        Self {
            slots,
            owners,
            free_tx,
            free_rx,
            full_tx,
            full_rx,
            free_len: AtomicUsize::new(n_slots),
            full_len: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            handoffs: AtomicUsize::new(0),
        }
    }

    /// Number of slots in the arena.
    pub fn n_slots(&self) -> usize {
        self.slots.len()
    }

    /// Lock a slot for reading or writing.
    ///
    /// Callers must own the index (received via [`acquire_free`] or
    /// [`acquire_full`] and not yet handed off); the lock itself is
    /// uncontended in correct use.
    ///
    /// [`acquire_free`]: Self::acquire_free
    /// [`acquire_full`]: Self::acquire_full
    pub fn slot(&self, idx: SlotIndex) -> MutexGuard<'_, TrajectorySlot> {
        self.slots[idx].lock()
    }

    /// Block until a free slot index (or a shutdown sentinel) is available.
    ///
    /// This is an actor's suspension point and the system's backpressure on
    /// fast actors: when learners fall behind, the free queue runs dry and
    /// actors park here. No timeout by design.
    pub fn acquire_free(&self) -> Ticket {
        let ticket = self
            .free_rx
            .recv()
            .expect("buffer pool free queue disconnected");
        if let Ticket::Slot(idx) = ticket {
            self.transition(idx, owner::FREE, owner::ACTOR, "acquire_free");
            self.in_flight.fetch_add(1, Ordering::AcqRel);
            self.free_len.fetch_sub(1, Ordering::AcqRel);
        }
        ticket
    }

    /// Move an actor-owned slot into the full queue. Non-blocking.
    pub fn publish_full(&self, idx: SlotIndex) {
        self.transition(idx, owner::ACTOR, owner::FULL, "publish_full");
        self.full_len.fetch_add(1, Ordering::AcqRel);
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.full_tx
            .send(Ticket::Slot(idx))
            .expect("buffer pool full queue disconnected");
    }

    /// Block until a full slot index (or a shutdown sentinel) is available.
    ///
    /// This is a learner's suspension point: when actors fall behind, the
    /// full queue runs dry and learners park here. No timeout by design.
    pub fn acquire_full(&self) -> Ticket {
        let ticket = self
            .full_rx
            .recv()
            .expect("buffer pool full queue disconnected");
        if let Ticket::Slot(idx) = ticket {
            self.transition(idx, owner::FULL, owner::LEARNER, "acquire_full");
            self.in_flight.fetch_add(1, Ordering::AcqRel);
            self.full_len.fetch_sub(1, Ordering::AcqRel);
        }
        ticket
    }

    /// Return a learner-owned slot to the free queue. Non-blocking.
    pub fn release(&self, idx: SlotIndex) {
        self.transition(idx, owner::LEARNER, owner::FREE, "release");
        self.free_len.fetch_add(1, Ordering::AcqRel);
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.free_tx
            .send(Ticket::Slot(idx))
            .expect("buffer pool free queue disconnected");
    }

    /// Return an actor-owned slot to the free queue without publishing.
    ///
    /// Used when a worker dies mid-segment: the partial contents are never
    /// consumed, but the index must not leak or the conservation invariant
    /// breaks.
    pub fn abort(&self, idx: SlotIndex) {
        self.transition(idx, owner::ACTOR, owner::FREE, "abort");
        self.free_len.fetch_add(1, Ordering::AcqRel);
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.free_tx
            .send(Ticket::Slot(idx))
            .expect("buffer pool free queue disconnected");
    }

    /// Push one shutdown sentinel per actor into the free queue.
    pub fn push_actor_shutdown(&self, n_actors: usize) {
        for _ in 0..n_actors {
            self.free_tx
                .send(Ticket::Shutdown)
                .expect("buffer pool free queue disconnected");
        }
    }

    /// Push one shutdown sentinel per learner thread into the full queue.
    pub fn push_learner_shutdown(&self, n_learners: usize) {
        for _ in 0..n_learners {
            self.full_tx
                .send(Ticket::Shutdown)
                .expect("buffer pool full queue disconnected");
        }
    }

    /// Current ownership counters.
    pub fn counts(&self) -> PoolCounts {
        PoolCounts {
            free: self.free_len.load(Ordering::Acquire),
            full: self.full_len.load(Ordering::Acquire),
            in_flight: self.in_flight.load(Ordering::Acquire),
        }
    }

    /// Total ownership transfers since startup.
    pub fn handoff_count(&self) -> usize {
        self.handoffs.load(Ordering::Relaxed)
    }

    fn transition(&self, idx: SlotIndex, from: u8, to: u8, op: &str) {
        match self.owners[idx].compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => {
                self.handoffs.fetch_add(1, Ordering::Relaxed);
            }
            Err(actual) => panic!(
                "slot {} ownership violation in {}: expected owner {}, found {}",
                idx,
                op,
                owner::name(from),
                owner::name(actual),
            ),
        }
    }
}
