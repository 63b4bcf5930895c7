//! Mutual exclusion between the node's four activities.
//!
//! Mining, Transacting, BlockAssembling and Validating all mutate the
//! shared ledger; exactly one of them may be active at a time. The ledger
//! lives inside a single mutex and a phase is simply the span of holding
//! its guard. The miner's hash loop runs outside the guard and is
//! preempted through its cancellation token, so a validator never waits
//! on a search in progress.

use log::trace;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard};

use crate::core::{ChainState, Coin, Transaction};

/// The four mutually-exclusive activities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Mining,
    Transacting,
    BlockAssembling,
    Validating,
}

/// All shared mutable node state, guarded as one unit.
#[derive(Debug)]
pub struct Ledger {
    /// Current accepted block, chain length, difficulty.
    pub chain: ChainState,
    /// Coins this node mined and signed, available for sale.
    pub owned_coins: Vec<Coin>,
    /// Coins bought from peers.
    pub acquired_coins: Vec<Coin>,
    /// Transactions this node generated, awaiting block packing.
    pub pending_transactions: Vec<Transaction>,
    /// Validated transactions received from peers.
    pub received_transactions: Vec<Transaction>,
}

impl Ledger {
    pub fn new(starting_pow_difficulty: u32) -> Ledger {
        Ledger {
            chain: ChainState::new(starting_pow_difficulty),
            owned_coins: Vec::new(),
            acquired_coins: Vec::new(),
            pending_transactions: Vec::new(),
            received_transactions: Vec::new(),
        }
    }
}

struct Slot {
    active: Option<Phase>,
    ledger: Ledger,
}

/// Owner of the ledger. `enter` blocks until no other phase is active and
/// returns a guard that dereferences to the ledger; dropping the guard
/// releases the phase.
pub struct PhaseCoordinator {
    slot: Mutex<Slot>,
}

impl PhaseCoordinator {
    pub fn new(ledger: Ledger) -> PhaseCoordinator {
        PhaseCoordinator {
            slot: Mutex::new(Slot {
                active: None,
                ledger,
            }),
        }
    }

    /// Enter a phase, waiting for any active one to finish.
    pub fn enter(&self, phase: Phase) -> PhaseGuard<'_> {
        let mut slot = self
            .slot
            .lock()
            .expect("phase coordinator lock poisoned - a phase panicked mid-mutation");
        assert!(
            slot.active.is_none(),
            "phase exclusion violated: {:?} entered while {:?} active",
            phase,
            slot.active
        );
        slot.active = Some(phase);
        trace!("phase {phase:?} active");
        PhaseGuard { phase, slot }
    }

    /// Enter a phase only if none is active right now.
    pub fn try_enter(&self, phase: Phase) -> Option<PhaseGuard<'_>> {
        let mut slot = self.slot.try_lock().ok()?;
        assert!(
            slot.active.is_none(),
            "phase exclusion violated: {:?} entered while {:?} active",
            phase,
            slot.active
        );
        slot.active = Some(phase);
        trace!("phase {phase:?} active");
        Some(PhaseGuard { phase, slot })
    }
}

/// Exclusive access to the ledger for the duration of one phase.
pub struct PhaseGuard<'a> {
    phase: Phase,
    slot: MutexGuard<'a, Slot>,
}

impl PhaseGuard<'_> {
    pub fn phase(&self) -> Phase {
        self.phase
    }
}

impl Deref for PhaseGuard<'_> {
    type Target = Ledger;

    fn deref(&self) -> &Ledger {
        &self.slot.ledger
    }
}

impl DerefMut for PhaseGuard<'_> {
    fn deref_mut(&mut self) -> &mut Ledger {
        &mut self.slot.ledger
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        trace!("phase {:?} released", self.phase);
        self.slot.active = None;
    }
}
