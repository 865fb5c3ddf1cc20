// crates/network/src/handle.rs
//! Request handles with at-most-once delivery
//!
//! Every request owns a single delivery slot. The pipeline takes the sender
//! out of the slot to deliver; cancelling takes it out to discard. Whichever
//! gets there first wins, so a result is delivered once or not at all.

use crate::error::NetworkResult;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

trait Suppress: Send + Sync {
    fn suppress(&self);
}

/// Sending half of a request outcome
pub(crate) struct Delivery<T> {
    slot: Mutex<Option<oneshot::Sender<NetworkResult<T>>>>,
}

impl<T: Send> Delivery<T> {
    /// Delivers `result` unless already delivered or suppressed
    pub(crate) fn deliver(&self, result: NetworkResult<T>) -> bool {
        let sender = self.slot.lock().unwrap_or_else(|e| e.into_inner()).take();
        match sender {
            Some(sender) => sender.send(result).is_ok(),
            None => false,
        }
    }
}

impl<T: Send> Suppress for Delivery<T> {
    fn suppress(&self) {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

struct CancelState {
    cancelled: AtomicBool,
    delivery: Arc<dyn Suppress>,
    task: Mutex<Option<AbortHandle>>,
}

/// Cancels one request; cheap to clone and safe to call repeatedly
#[derive(Clone)]
pub struct CancelHandle {
    state: Arc<CancelState>,
}

impl CancelHandle {
    fn new(delivery: Arc<dyn Suppress>) -> Self {
        Self {
            state: Arc::new(CancelState {
                cancelled: AtomicBool::new(false),
                delivery,
                task: Mutex::new(None),
            }),
        }
    }

    /// Suppresses the outcome and aborts the in-flight work
    pub fn cancel(&self) {
        if self.state.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.state.delivery.suppress();
        let task = self
            .state
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
        }
        log::debug!("Request cancelled");
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// Ties the spawned pipeline to this handle
    pub(crate) fn attach(&self, task: AbortHandle) {
        let mut slot = self.state.task.lock().unwrap_or_else(|e| e.into_inner());
        if self.is_cancelled() {
            task.abort();
        } else {
            *slot = Some(task);
        }
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Outcome of one request
///
/// Resolves to `Some(result)` once, or to `None` when the request was
/// cancelled. Dropping the handle does not cancel the request.
pub struct RequestHandle<T> {
    receiver: oneshot::Receiver<NetworkResult<T>>,
    cancel: CancelHandle,
    runtime: Handle,
}

impl<T: Send + 'static> RequestHandle<T> {
    /// Creates a handle plus the delivery slot the pipeline fills
    pub(crate) fn pending(runtime: Handle) -> (Self, Arc<Delivery<T>>) {
        let (sender, receiver) = oneshot::channel();
        let delivery = Arc::new(Delivery {
            slot: Mutex::new(Some(sender)),
        });
        let suppress: Arc<dyn Suppress> = delivery.clone();
        let handle = Self {
            receiver,
            cancel: CancelHandle::new(suppress),
            runtime,
        };
        (handle, delivery)
    }

    /// A handle that already holds its outcome
    pub(crate) fn resolved(runtime: Handle, result: NetworkResult<T>) -> Self {
        let (handle, delivery) = Self::pending(runtime);
        delivery.deliver(result);
        handle
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Runs `completion` with the outcome unless the request is cancelled
    ///
    /// The closure runs on a runtime worker. The returned handle can still
    /// cancel the request.
    pub fn on_complete<F>(self, completion: F) -> CancelHandle
    where
        F: FnOnce(NetworkResult<T>) + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let runtime = self.runtime.clone();
        runtime.spawn(async move {
            if let Some(result) = self.await {
                completion(result);
            }
        });
        cancel
    }
}

impl<T> Future for RequestHandle<T> {
    type Output = Option<NetworkResult<T>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.cancel.is_cancelled() {
            return Poll::Ready(None);
        }
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) if !self.cancel.is_cancelled() => Poll::Ready(Some(result)),
            Poll::Ready(_) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> std::fmt::Debug for RequestHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandle")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkError;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready};

    #[tokio::test]
    async fn test_resolved_handle() {
        let handle = RequestHandle::resolved(Handle::current(), Ok(5u32));
        assert!(matches!(handle.await, Some(Ok(5))));

        let handle: RequestHandle<u32> =
            RequestHandle::resolved(Handle::current(), Err(NetworkError::NoNetwork));
        assert!(matches!(handle.await, Some(Err(NetworkError::NoNetwork))));
    }

    #[tokio::test]
    async fn test_delivers_once() {
        let (handle, delivery) = RequestHandle::pending(Handle::current());
        let mut task = tokio_test::task::spawn(handle);
        assert_pending!(task.poll());

        assert!(delivery.deliver(Ok("first")));
        assert!(!delivery.deliver(Ok("second")));

        assert!(task.is_woken());
        let outcome = assert_ready!(task.poll());
        assert!(matches!(outcome, Some(Ok("first"))));
    }

    #[tokio::test]
    async fn test_cancel_before_delivery_suppresses() {
        let (handle, delivery) = RequestHandle::<u32>::pending(Handle::current());
        handle.cancel();
        handle.cancel();
        assert!(handle.is_cancelled());

        assert!(!delivery.deliver(Ok(1)));
        assert!(handle.await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_after_delivery_reads_as_cancelled() {
        let (handle, delivery) = RequestHandle::pending(Handle::current());
        assert!(delivery.deliver(Ok(1u8)));
        handle.cancel_handle().cancel();
        assert!(handle.await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_aborts_attached_task() {
        let (handle, delivery) = RequestHandle::<()>::pending(Handle::current());
        let work = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            delivery.deliver(Ok(()));
        });
        handle.cancel_handle().attach(work.abort_handle());

        handle.cancel();
        let joined = work.await;
        assert!(joined.unwrap_err().is_cancelled());
        assert!(handle.await.is_none());
    }

    #[tokio::test]
    async fn test_attach_after_cancel_aborts_immediately() {
        let (handle, _delivery) = RequestHandle::<()>::pending(Handle::current());
        let cancel = handle.cancel_handle();
        cancel.cancel();

        let work = tokio::spawn(tokio::time::sleep(Duration::from_secs(60)));
        cancel.attach(work.abort_handle());
        assert!(work.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_on_complete_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel();
        let (handle, delivery) = RequestHandle::pending(Handle::current());

        let counter = Arc::clone(&calls);
        handle.on_complete(move |result: NetworkResult<u32>| {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(result.ok());
        });
        delivery.deliver(Ok(9));
        delivery.deliver(Ok(10));

        assert_eq!(rx.await.unwrap(), Some(9));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_on_complete_skipped_after_cancel() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (handle, delivery) = RequestHandle::<u32>::pending(Handle::current());

        let counter = Arc::clone(&calls);
        let cancel = handle.on_complete(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        cancel.cancel();
        delivery.deliver(Ok(1));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
