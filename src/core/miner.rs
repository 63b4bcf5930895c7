//! Proof-of-work search.
//!
//! The search itself is a pure CPU loop over random nonces. Cancellation
//! is cooperative: the token is checked before every hash attempt, so
//! preemption latency is bounded by a single hash computation. The worker
//! thread that drives the search lives in `network::miner`; this module
//! keeps the search testable without threads or sockets.

use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::error::{NodeError, Result};
use crate::utils::{difficulty_target, rand_hex, sha256_hex, sha256_int};

/// Nonce width in bytes; the wire format renders it as 128 hex characters.
const NONCE_BYTES: usize = 64;

/// Cooperative cancellation handshake between the miner and whichever
/// phase is adopting a block.
///
/// The canceller calls [`CancelToken::cancel_and_wait`], which returns
/// only once the miner has left its search loop: either the miner
/// observed the request and acknowledged it, or it was not searching in
/// the first place. The miner marks the span of a search with
/// [`CancelToken::begin_search`] / acknowledgement happens inside
/// [`CancelToken::interrupted`]. `begin_search` must be invoked while the
/// caller still holds the phase guard it read the search parameters
/// under; that ordering is what lets the canceller assume a finished
/// `cancel_and_wait` means the miner will re-read the chain before any
/// further hashing.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

#[derive(Default)]
struct TokenInner {
    requested: AtomicBool,
    searching: Mutex<bool>,
    cond: Condvar,
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    /// Request cancellation and block until the miner is out of its
    /// search loop. Resets the request before returning, so the next
    /// search starts clean.
    pub fn cancel_and_wait(&self) {
        self.inner.requested.store(true, Ordering::SeqCst);
        let mut searching = self
            .inner
            .searching
            .lock()
            .expect("cancel token lock poisoned");
        while *searching {
            searching = self
                .inner
                .cond
                .wait(searching)
                .expect("cancel token lock poisoned");
        }
        self.inner.requested.store(false, Ordering::SeqCst);
    }

    /// Mark the start of a search span.
    pub fn begin_search(&self) {
        let mut searching = self
            .inner
            .searching
            .lock()
            .expect("cancel token lock poisoned");
        *searching = true;
    }

    /// Check for a pending cancellation request; when one is seen the
    /// search span ends and the canceller is woken.
    pub fn interrupted(&self) -> bool {
        if self.inner.requested.load(Ordering::SeqCst) {
            self.end_search();
            return true;
        }
        false
    }

    /// Mark the end of a search span and wake any waiting canceller.
    pub fn end_search(&self) {
        let mut searching = self
            .inner
            .searching
            .lock()
            .expect("cancel token lock poisoned");
        *searching = false;
        self.inner.cond.notify_all();
    }
}

/// Inputs for one search attempt, snapshotted from the chain state under
/// the phase guard.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub genesis_string: String,
    pub difficulty: u32,
    /// Debug-harness bound; exceeding it is a fatal abort, never a
    /// silent failure.
    pub max_iterations: Option<u64>,
}

/// How a search attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Found {
        nonce: String,
        hashval: String,
        iterations: u64,
    },
    Cancelled,
}

/// Draw random nonces until `H(genesis‖nonce)` drops below `2^difficulty`
/// or a cancellation request arrives.
///
/// The cancellation token is polled before every attempt. At difficulty
/// 256 the first attempt always succeeds; at difficulty 0 no attempt ever
/// does, and only the iteration cap (or cancellation) ends the search.
pub fn search(params: &SearchParams, token: &CancelToken) -> Result<SearchOutcome> {
    token.begin_search();
    let target = difficulty_target(params.difficulty);
    let mut iterations = 0u64;
    loop {
        if token.interrupted() {
            return Ok(SearchOutcome::Cancelled);
        }
        if let Some(cap) = params.max_iterations {
            if iterations >= cap {
                token.end_search();
                return Err(NodeError::Mining(format!(
                    "max iterations ({cap}) reached without finding a coin"
                )));
            }
        }
        iterations += 1;
        let nonce = rand_hex(NONCE_BYTES);
        let attempt = format!("{}{}", params.genesis_string, nonce);
        if sha256_int(&attempt) < target {
            let hashval = sha256_hex(&attempt);
            info!("coin mined on try {iterations} with hashval {hashval}");
            token.end_search();
            return Ok(SearchOutcome::Found {
                nonce,
                hashval,
                iterations,
            });
        }
        debug!("try {iterations} at mining a new coin missed the target");
    }
}
