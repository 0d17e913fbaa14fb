//! Cooperative cancellation for long-running producers.
//!
//! A [`Canceller`] owns the sending half of a channel that never carries a
//! message; dropping it (or calling [`Canceller::cancel`]) disconnects the
//! channel, which every cloned [`CancelSignal`] observes.

use crossbeam_channel::{Receiver, Sender, TryRecvError};

/// Creates a linked canceller and signal.
pub fn cancellation() -> (Canceller, CancelSignal) {
    let (tx, rx) = crossbeam_channel::bounded(0);
    (Canceller { _tx: tx }, CancelSignal { rx })
}

/// Cancels every signal cloned from its pair when cancelled or dropped.
#[derive(Debug)]
pub struct Canceller {
    _tx: Sender<()>,
}

impl Canceller {
    pub fn cancel(self) {}
}

/// Observed by producers to stop early.
#[derive(Clone, Debug)]
pub struct CancelSignal {
    rx: Receiver<()>,
}

impl CancelSignal {
    /// A signal that is never cancelled.
    pub fn never() -> Self {
        Self {
            rx: crossbeam_channel::never(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// For use in `crossbeam_channel::select!`: becomes ready on cancellation.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}
