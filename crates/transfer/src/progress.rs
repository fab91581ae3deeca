use tokio::sync::mpsc;

use crate::TransferError;
use crate::types::{ExecutorEvent, ExecutorState, TransferOutcome};

/// Reports executor progress to the owning task.
///
/// Holds the executor's [`ExecutorState`]; byte counts only grow, so the
/// `Progress` messages it sends are nondecreasing. A closed receiver is not
/// an error: the task may have been dropped while the transfer unwinds.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: mpsc::UnboundedSender<ExecutorEvent>,
    state: ExecutorState,
}

impl ProgressReporter {
    pub fn new(tx: mpsc::UnboundedSender<ExecutorEvent>) -> Self {
        Self {
            tx,
            state: ExecutorState::default(),
        }
    }

    /// Records the expected size. 0 means unknown.
    pub fn set_total(&mut self, total: u64) {
        self.state.bytes_total = total;
    }

    /// Adds `bytes` to the transferred count and notifies the task.
    pub fn advance(&mut self, bytes: u64) {
        self.state.bytes_transferred = self.state.bytes_transferred.saturating_add(bytes);
        self.emit();
    }

    /// Re-sends the current counters without advancing them.
    pub fn emit(&self) {
        let _ = self.tx.send(ExecutorEvent::Progress {
            transferred: self.state.bytes_transferred,
            total: self.state.bytes_total,
        });
    }

    pub fn mark_cancelled(&mut self) {
        self.state.canceled = true;
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    /// Sends the single terminal message, consuming the reporter.
    pub fn finish(self, result: Result<TransferOutcome, TransferError>) {
        let _ = self.tx.send(ExecutorEvent::Finished(result));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_accumulates_and_emits() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut reporter = ProgressReporter::new(tx);
        reporter.set_total(100);
        reporter.advance(40);
        reporter.advance(60);

        let mut seen = Vec::new();
        while let Ok(ExecutorEvent::Progress { transferred, total }) = rx.try_recv() {
            seen.push((transferred, total));
        }
        assert_eq!(seen, vec![(40, 100), (100, 100)]);
        assert_eq!(reporter.state().bytes_transferred, 100);
    }

    #[test]
    fn finish_is_last_message() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut reporter = ProgressReporter::new(tx);
        reporter.advance(1);
        reporter.finish(Err(TransferError::Cancelled));

        assert!(matches!(
            rx.try_recv().unwrap(),
            ExecutorEvent::Progress { .. }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            ExecutorEvent::Finished(Err(TransferError::Cancelled))
        ));
        // Reporter consumed, sender dropped.
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_receiver_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut reporter = ProgressReporter::new(tx);
        reporter.advance(10);
        reporter.mark_cancelled();
        assert!(reporter.state().canceled);
        reporter.finish(Ok(TransferOutcome::default()));
    }
}
