//! Close handshake bookkeeping.
//!
//! Once our close frame is queued, every later write fails with
//! [`WsError::ChannelClosed`]. The close completes when that frame's write
//! finishes or when the forced-close timer fires, whichever comes first; the
//! other outcome is ignored.

use std::io;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::connection::WriteId;
use crate::error::WsError;

/// Why a close did not complete cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseFailure {
    /// The forced-close timer fired before the close frame was written.
    TimedOut,
    /// Writing the close frame failed.
    WriteFailed(io::ErrorKind),
}

impl From<CloseFailure> for WsError {
    fn from(failure: CloseFailure) -> Self {
        match failure {
            CloseFailure::TimedOut => WsError::CloseTimeout,
            CloseFailure::WriteFailed(kind) => WsError::Io(io::Error::new(kind, "close frame write failed")),
        }
    }
}

/// Completion of a close initiated on this end. Clones observe the same
/// outcome, which is set exactly once.
#[derive(Debug, Clone, Default)]
pub struct CloseHandle {
    outcome: Arc<OnceLock<Result<(), CloseFailure>>>,
}

impl CloseHandle {
    /// Sets the outcome. Returns `false` if it was already set.
    fn resolve(&self, outcome: Result<(), CloseFailure>) -> bool {
        self.outcome.set(outcome).is_ok()
    }

    pub(crate) fn resolved(outcome: Result<(), CloseFailure>) -> Self {
        let handle = Self::default();
        handle.resolve(outcome);
        handle
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.outcome.get().is_some()
    }

    /// `None` while the close frame is still pending.
    #[must_use]
    pub fn outcome(&self) -> Option<Result<(), CloseFailure>> {
        self.outcome.get().copied()
    }
}

#[derive(Debug)]
struct CloseSent {
    write: WriteId,
    handle: CloseHandle,
    deadline: Option<Instant>,
}

/// Tracks the one close frame this end sends.
#[derive(Debug)]
pub struct CloseCoordinator {
    forced_close_timeout: Option<Duration>,
    sent: Option<CloseSent>,
}

impl CloseCoordinator {
    #[must_use]
    pub fn new(forced_close_timeout: Option<Duration>) -> Self {
        Self {
            forced_close_timeout,
            sent: None,
        }
    }

    #[must_use]
    pub fn is_close_sent(&self) -> bool {
        self.sent.is_some()
    }

    #[must_use]
    pub fn handle(&self) -> Option<CloseHandle> {
        self.sent.as_ref().map(|sent| sent.handle.clone())
    }

    /// Fails once a close frame has been queued.
    pub fn check_writable(&self) -> Result<(), WsError> {
        if self.sent.is_some() {
            return Err(WsError::ChannelClosed);
        }
        Ok(())
    }

    /// Records the write carrying our close frame and arms the timer.
    pub fn close_sent(&mut self, write: WriteId, now: Instant) -> CloseHandle {
        if let Some(sent) = &self.sent {
            return sent.handle.clone();
        }
        let handle = CloseHandle::default();
        let deadline = self.forced_close_timeout.map(|timeout| now + timeout);
        debug!(?write, ?deadline, "websocket close frame queued");
        self.sent = Some(CloseSent {
            write,
            handle: handle.clone(),
            deadline,
        });
        handle
    }

    /// Our close frame's write, while it has not completed yet.
    #[must_use]
    pub fn pending_write(&self) -> Option<WriteId> {
        self.sent
            .as_ref()
            .filter(|sent| !sent.handle.is_done())
            .map(|sent| sent.write)
    }

    /// When the forced-close timer fires, if armed.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.sent
            .as_ref()
            .filter(|sent| !sent.handle.is_done())
            .and_then(|sent| sent.deadline)
    }

    /// Reports a finished write. Returns `true` when it was our close frame
    /// and the transport should now be closed.
    pub fn on_write_complete(&mut self, write: WriteId, result: &io::Result<()>) -> bool {
        let Some(sent) = self.sent.as_mut().filter(|sent| sent.write == write) else {
            return false;
        };
        sent.deadline = None;
        let outcome = match result {
            Ok(()) => Ok(()),
            Err(err) => Err(CloseFailure::WriteFailed(err.kind())),
        };
        sent.handle.resolve(outcome)
    }

    /// The transport went away before our close frame was written.
    pub fn abandon(&mut self) {
        if let Some(sent) = self.sent.as_mut() {
            sent.deadline = None;
            sent.handle
                .resolve(Err(CloseFailure::WriteFailed(io::ErrorKind::ConnectionAborted)));
        }
    }

    /// Fires the forced-close timer if it is due. Returns `true` when the
    /// transport should be closed now.
    pub fn on_timeout(&mut self, now: Instant) -> bool {
        let Some(sent) = self.sent.as_mut() else {
            return false;
        };
        match sent.deadline {
            Some(deadline) if now >= deadline => {
                sent.deadline = None;
                let fired = sent.handle.resolve(Err(CloseFailure::TimedOut));
                if fired {
                    warn!("close frame not written in time, forcing the transport closed");
                }
                fired
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(id: u64) -> WriteId {
        WriteId::new(id)
    }

    #[test]
    fn test_writes_rejected_after_close() {
        let mut close = CloseCoordinator::new(None);
        assert!(close.check_writable().is_ok());
        close.close_sent(write(1), Instant::now());
        let err = close.check_writable().unwrap_err();
        assert_eq!(err.to_string(), "channel closed");
    }

    #[test]
    fn test_write_completion_resolves() {
        let now = Instant::now();
        let mut close = CloseCoordinator::new(Some(Duration::from_secs(1)));
        let handle = close.close_sent(write(7), now);
        assert_eq!(close.deadline(), Some(now + Duration::from_secs(1)));
        assert!(!close.on_write_complete(write(6), &Ok(())));
        assert!(close.on_write_complete(write(7), &Ok(())));
        assert_eq!(handle.outcome(), Some(Ok(())));
        assert_eq!(close.deadline(), None);
        assert!(!close.on_timeout(now + Duration::from_secs(5)));
    }

    #[test]
    fn test_timer_wins_over_late_write() {
        let now = Instant::now();
        let mut close = CloseCoordinator::new(Some(Duration::from_millis(10)));
        let handle = close.close_sent(write(1), now);
        assert!(!close.on_timeout(now));
        assert!(close.on_timeout(now + Duration::from_millis(10)));
        assert_eq!(handle.outcome(), Some(Err(CloseFailure::TimedOut)));
        assert!(!close.on_write_complete(write(1), &Ok(())));
        assert_eq!(handle.outcome(), Some(Err(CloseFailure::TimedOut)));
    }

    #[test]
    fn test_failed_write_reported() {
        let mut close = CloseCoordinator::new(None);
        let handle = close.close_sent(write(3), Instant::now());
        assert_eq!(close.deadline(), None);
        let err = io::Error::from(io::ErrorKind::BrokenPipe);
        assert!(close.on_write_complete(write(3), &Err(err)));
        assert_eq!(
            handle.outcome(),
            Some(Err(CloseFailure::WriteFailed(io::ErrorKind::BrokenPipe)))
        );
    }

    #[test]
    fn test_abandon_keeps_earlier_outcome() {
        let mut close = CloseCoordinator::new(Some(Duration::from_secs(1)));
        let handle = close.close_sent(write(1), Instant::now());
        close.on_write_complete(write(1), &Ok(()));
        close.abandon();
        assert_eq!(handle.outcome(), Some(Ok(())));

        let mut close = CloseCoordinator::new(Some(Duration::from_secs(1)));
        let handle = close.close_sent(write(1), Instant::now());
        close.abandon();
        assert_eq!(
            handle.outcome(),
            Some(Err(CloseFailure::WriteFailed(io::ErrorKind::ConnectionAborted)))
        );
        assert_eq!(close.deadline(), None);
    }

    #[test]
    fn test_second_close_reuses_handle() {
        let mut close = CloseCoordinator::new(None);
        let first = close.close_sent(write(1), Instant::now());
        let second = close.close_sent(write(2), Instant::now());
        close.on_write_complete(write(1), &Ok(()));
        assert!(first.is_done());
        assert!(second.is_done());
    }
}
