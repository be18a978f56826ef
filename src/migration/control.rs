//! Cooperative pause/stop signal shared by the workers of one run

use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// What the workers were asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Run,
    Pause,
    Stop,
}

/// Checked by workers before each batch, after each fetch and after each record
///
/// Raising a signal also cancels the inner token so retry backoffs wake up;
/// in-flight provider calls are left to finish.
#[derive(Debug, Clone)]
pub struct ControlToken {
    signal: Arc<AtomicU8>,
    cancel: CancellationToken,
}

const RUN: u8 = 0;
const PAUSE: u8 = 1;
const STOP: u8 = 2;

impl Default for ControlToken {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlToken {
    #[must_use]
    pub fn new() -> Self {
        Self {
            signal: Arc::new(AtomicU8::new(RUN)),
            cancel: CancellationToken::new(),
        }
    }

    pub fn pause(&self) {
        // A stop already requested is not downgraded to a pause
        let _ = self
            .signal
            .compare_exchange(RUN, PAUSE, Ordering::SeqCst, Ordering::SeqCst);
        self.cancel.cancel();
    }

    pub fn stop(&self) {
        self.signal.store(STOP, Ordering::SeqCst);
        self.cancel.cancel();
    }

    #[must_use]
    pub fn signal(&self) -> ControlSignal {
        match self.signal.load(Ordering::SeqCst) {
            RUN => ControlSignal::Run,
            PAUSE => ControlSignal::Pause,
            _ => ControlSignal::Stop,
        }
    }

    /// Whether the worker should leave its loop at this check point
    #[must_use]
    pub fn should_halt(&self) -> bool {
        self.signal() != ControlSignal::Run
    }

    /// Token cancelled as soon as any signal is raised
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signals() {
        let token = ControlToken::new();
        assert_eq!(token.signal(), ControlSignal::Run);
        assert!(!token.should_halt());
        assert!(!token.cancellation().is_cancelled());

        let worker_view = token.clone();
        token.pause();
        assert_eq!(worker_view.signal(), ControlSignal::Pause);
        assert!(worker_view.should_halt());
        assert!(worker_view.cancellation().is_cancelled());
    }

    #[test]
    fn test_stop_wins_over_pause() {
        let token = ControlToken::new();
        token.stop();
        token.pause();
        assert_eq!(token.signal(), ControlSignal::Stop);

        let other = ControlToken::new();
        other.pause();
        other.stop();
        assert_eq!(other.signal(), ControlSignal::Stop);
    }
}
