//! Kennel store: the optimistic care-board cell shared between the
//! coordinator (writer) and the UI layer (reader), plus a builder that
//! reconstructs a board from confirmed backend events.

#![forbid(unsafe_code)]

use std::sync::Arc;

use arc_swap::ArcSwap;
use kennel_core::{CareBoard, CareCategory, CareEvent};
use rustc_hash::FxHashSet;
use tokio::sync::watch;
use tracing::debug;

/// Folds confirmed `CareEvent`s for one category into a `CareBoard`.
/// Events are applied in chronological order; duplicates collapse.
pub struct BoardBuilder {
    category: CareCategory,
    events: Vec<CareEvent>,
}

impl BoardBuilder {
    pub fn new(category: CareCategory) -> Self {
        Self { category, events: Vec::new() }
    }

    /// Accept a batch of events; entries for other categories are ignored.
    pub fn apply(&mut self, batch: Vec<CareEvent>) {
        self.events.extend(batch.into_iter().filter(|e| e.category == self.category));
    }

    pub fn freeze(&self) -> CareBoard {
        let mut sorted = self.events.clone();
        sorted.sort_by_key(|e| e.at);
        let mut seen: FxHashSet<(String, String)> = FxHashSet::default();
        let mut board = CareBoard::new();
        for e in sorted {
            if !seen.insert((e.dog_id.clone(), e.slot.clone())) {
                continue;
            }
            board.add_slot(&e.dog_id, &e.slot);
        }
        debug!(category = %self.category, dogs = board.len(), "board rebuilt from events");
        board
    }
}

struct BoardShared {
    snap: ArcSwap<CareBoard>,
    epoch_tx: watch::Sender<u64>,
    epoch_rx: watch::Receiver<u64>,
}

/// Handle for the current board: lock-free reads via `ArcSwap`, RCU
/// mutation for writers, and a watch channel carrying the epoch so the UI
/// can repaint on change. One handle per active view; cloning shares state.
#[derive(Clone)]
pub struct BoardHandle {
    inner: Arc<BoardShared>,
}

impl BoardHandle {
    pub fn new() -> Self {
        Self::from_board(CareBoard::new())
    }

    pub fn from_board(board: CareBoard) -> Self {
        let (epoch_tx, epoch_rx) = watch::channel(board.epoch);
        Self {
            inner: Arc::new(BoardShared { snap: ArcSwap::from_pointee(board), epoch_tx, epoch_rx }),
        }
    }

    pub fn current(&self) -> Arc<CareBoard> {
        self.inner.snap.load_full()
    }

    pub fn subscribe_epoch(&self) -> watch::Receiver<u64> {
        self.inner.epoch_rx.clone()
    }

    /// Apply `f` to a copy of the current board and swap it in, bumping the
    /// epoch. `f` may run more than once under contention, so it must be a
    /// pure function of the board it is given.
    pub fn mutate(&self, f: impl Fn(&mut CareBoard)) {
        let prev = self.inner.snap.rcu(|cur| {
            let mut board = (**cur).clone();
            f(&mut board);
            board.epoch = cur.epoch.saturating_add(1);
            Arc::new(board)
        });
        let _ = self.inner.epoch_tx.send(prev.epoch.saturating_add(1));
    }

    /// Wholesale replacement, used when priming from a backend fetch.
    pub fn publish(&self, mut board: CareBoard) {
        let prev = self.inner.snap.load();
        board.epoch = prev.epoch.saturating_add(1);
        let epoch = board.epoch;
        self.inner.snap.store(Arc::new(board));
        let _ = self.inner.epoch_tx.send(epoch);
    }
}

impl Default for BoardHandle {
    fn default() -> Self {
        Self::new()
    }
}
