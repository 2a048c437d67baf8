use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use curhat_agent::Orchestrator;
use curhat_core::IncomingMessage;
use curhat_telegram::MessageSink;
use tokio::time::Instant;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Hands each accepted message to its own orchestration task and returns
/// immediately, so transports can acknowledge before the reply exists.
#[derive(Clone)]
pub struct OrchestratorSink {
    orchestrator: Arc<Orchestrator>,
    in_flight: Arc<AtomicUsize>,
}

impl OrchestratorSink {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator, in_flight: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Waits until every accepted message has been handled or `timeout`
    /// passes. Returns the number still running.
    pub async fn drain(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = self.in_flight();
            if remaining == 0 || Instant::now() >= deadline {
                return remaining;
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }
}

impl MessageSink for OrchestratorSink {
    fn accept(&self, message: IncomingMessage) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let handle = self.orchestrator.spawn_dispatch(message);
        let in_flight = Arc::clone(&self.in_flight);

        tokio::spawn(async move {
            let _ = handle.await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }
}
