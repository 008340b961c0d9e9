//! Interactive resolver queue.
//!
//! One driver task owns the resolver UI and shows requests strictly in
//! arrival order. Only multi-candidate intents come through here.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::{BrokerError, BrokerResult};
use crate::provider::{ResolverOutcome, ResolverRequest, ResolverUi};

struct Queued {
    request: ResolverRequest,
    reply: oneshot::Sender<ResolverOutcome>,
}

pub(crate) struct ResolverQueue {
    tx: mpsc::UnboundedSender<Queued>,
    pending: Arc<AtomicUsize>,
}

impl ResolverQueue {
    /// Start the driver task. Must be called inside a tokio runtime.
    pub(crate) fn spawn(ui: Arc<dyn ResolverUi>, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        tokio::spawn(drive(ui, rx, Arc::clone(&pending), cancel));
        Self { tx, pending }
    }

    /// Queue `request` and wait for the user's choice.
    pub(crate) async fn submit(&self, request: ResolverRequest) -> BrokerResult<ResolverOutcome> {
        let (reply, outcome) = oneshot::channel();
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(Queued { request, reply }).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(BrokerError::ShuttingDown);
        }
        outcome.await.map_err(|_| BrokerError::ShuttingDown)
    }

    /// Requests queued or on screen.
    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

async fn drive(
    ui: Arc<dyn ResolverUi>,
    mut rx: mpsc::UnboundedReceiver<Queued>,
    pending: Arc<AtomicUsize>,
    cancel: CancellationToken,
) {
    tracing::debug!("Resolver queue started");

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = rx.recv() => next,
        };
        let Some(Queued { request, mut reply }) = next else {
            break;
        };

        if reply.is_closed() {
            tracing::debug!(request = %request.id, intent = %request.intent, "Caller went away, skipping");
            pending.fetch_sub(1, Ordering::SeqCst);
            continue;
        }

        tracing::debug!(
            request = %request.id,
            intent = %request.intent,
            candidates = request.candidates.len(),
            "Showing resolver"
        );
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                pending.fetch_sub(1, Ordering::SeqCst);
                break;
            }
            _ = reply.closed() => None,
            outcome = ui.resolve(&request) => Some(outcome),
        };
        pending.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            Some(outcome) => {
                let _ = reply.send(outcome);
            }
            None => tracing::debug!(request = %request.id, "Caller went away while resolver was shown"),
        }
    }

    rx.close();
    while let Ok(_dropped) = rx.try_recv() {
        pending.fetch_sub(1, Ordering::SeqCst);
    }
    tracing::debug!("Resolver queue stopped");
}
