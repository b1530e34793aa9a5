//! Per-operation context, cancellation and deadlines.
//!
//! Every storage and audit await in the pipeline goes through [`bounded`],
//! which races the future against the operation deadline and the caller's
//! [`CancelSignal`].

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use vellum_core::{CorrelationId, Identity};

/// Why a bounded await did not finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Interrupt {
    TimedOut,
    Cancelled,
}

impl std::fmt::Display for Interrupt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::TimedOut => "deadline exceeded",
            Self::Cancelled => "cancelled by caller",
        })
    }
}

// ─── Cancellation ────────────────────────────────────────────────────

/// Owner side of a cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// A signal observing this handle.
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Cancel every operation holding a signal from this handle.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of a cancellation signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled. Never resolves if the handle is dropped
    /// without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

// ─── Operation Context ───────────────────────────────────────────────

/// Caller-supplied inputs that scope one operation.
#[derive(Debug, Clone)]
pub struct OperationContext {
    identity: Identity,
    correlation_id: CorrelationId,
    deadline: Option<Instant>,
    cancel: Option<CancelSignal>,
}

impl OperationContext {
    /// A context with a generated correlation id and the engine's
    /// default timeout.
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            correlation_id: CorrelationId::generate(),
            deadline: None,
            cancel: None,
        }
    }

    pub fn with_correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_id = id;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_cancel(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel_signal(&self) -> Option<&CancelSignal> {
        self.cancel.as_ref()
    }
}

/// Await `fut` unless the deadline passes or `cancel` fires first.
///
/// An already-fired signal wins over a ready future.
pub(crate) async fn bounded<F: Future>(
    deadline: Instant,
    cancel: Option<&CancelSignal>,
    fut: F,
) -> Result<F::Output, Interrupt> {
    let cancelled = async {
        match cancel {
            Some(signal) => signal.cancelled().await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        biased;
        _ = cancelled => Err(Interrupt::Cancelled),
        out = tokio::time::timeout_at(deadline, fut) => out.map_err(|_| Interrupt::TimedOut),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn far() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[tokio::test]
    async fn ready_future_passes_through() {
        assert_eq!(bounded(far(), None, async { 7 }).await, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_interrupts() {
        let deadline = Instant::now() + Duration::from_millis(10);
        let slow = tokio::time::sleep(Duration::from_secs(5));
        assert_eq!(bounded(deadline, None, slow).await, Err(Interrupt::TimedOut));
    }

    #[tokio::test]
    async fn cancel_wins_even_over_ready_future() {
        let handle = CancelHandle::new();
        let signal = handle.signal();
        handle.cancel();
        assert!(signal.is_cancelled());
        assert_eq!(
            bounded(far(), Some(&signal), async { 1 }).await,
            Err(Interrupt::Cancelled)
        );
    }

    #[tokio::test]
    async fn cancel_during_await() {
        let handle = CancelHandle::new();
        let signal = handle.signal();
        let task = tokio::spawn(async move {
            bounded(far(), Some(&signal), std::future::pending::<()>()).await
        });
        tokio::task::yield_now().await;
        handle.cancel();
        assert_eq!(task.await.unwrap(), Err(Interrupt::Cancelled));
    }

    #[tokio::test]
    async fn dropped_handle_never_cancels() {
        let signal = CancelHandle::new().signal();
        assert!(!signal.is_cancelled());
        assert_eq!(bounded(far(), Some(&signal), async { 2 }).await, Ok(2));
    }
}
