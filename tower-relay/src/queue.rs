use std::num::NonZeroUsize;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::record::Request;

/// Why a record could not be admitted. The record is handed back.
#[derive(Debug)]
pub enum SubmitError {
    /// The queue already holds `capacity` records.
    Overloaded(Request),
    /// The dispatch loop is gone.
    Closed(Request),
}

/// Producer half of the admission queue.
///
/// Cloned into every ingress. Submitting never waits: a full queue is
/// reported straight back to the caller.
#[derive(Clone, Debug)]
pub struct AdmissionQueue {
    tx: mpsc::Sender<Request>,
}

/// Consumer half of the admission queue, owned by the dispatch loop.
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::Receiver<Request>,
}

/// Creates a FIFO admission queue holding at most `capacity` records.
pub fn admission_queue(capacity: NonZeroUsize) -> (AdmissionQueue, QueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity.get());
    (AdmissionQueue { tx }, QueueReceiver { rx })
}

impl AdmissionQueue {
    pub fn submit(&self, request: Request) -> Result<(), SubmitError> {
        self.tx.try_send(request).map_err(|err| match err {
            TrySendError::Full(request) => SubmitError::Overloaded(request),
            TrySendError::Closed(request) => SubmitError::Closed(request),
        })
    }

    /// Number of records waiting to be dispatched.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl QueueReceiver {
    /// Waits for the oldest record.
    ///
    /// Returns `None` once every producer has been dropped and the queue is drained.
    pub async fn next(&mut self) -> Option<Request> {
        self.rx.recv().await
    }

    /// Stops admissions. Records already queued can still be taken.
    pub fn close(&mut self) {
        self.rx.close();
    }
}
