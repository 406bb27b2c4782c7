//! Completion callbacks for non-blocking sends

use crate::error::{ProducerError, ProducerResult};
use crate::message::SendResult;
use tokio::sync::oneshot;

/// Receives the outcome of a non-blocking send
///
/// Exactly one of the two methods is called, once, on a background task.
/// Both consume the callback.
pub trait SendCallback: Send + 'static {
    fn on_success(self: Box<Self>, result: SendResult);

    fn on_failure(self: Box<Self>, error: ProducerError);
}

/// Callback backed by a closure over the send outcome
pub struct FnCallback<F>(F);

/// Wrap a closure as a [`SendCallback`]
pub fn callback_fn<F>(f: F) -> FnCallback<F>
where
    F: FnOnce(ProducerResult<SendResult>) + Send + 'static,
{
    FnCallback(f)
}

impl<F> SendCallback for FnCallback<F>
where
    F: FnOnce(ProducerResult<SendResult>) + Send + 'static,
{
    fn on_success(self: Box<Self>, result: SendResult) {
        (self.0)(Ok(result))
    }

    fn on_failure(self: Box<Self>, error: ProducerError) {
        (self.0)(Err(error))
    }
}

/// Callback that forwards the outcome to a oneshot channel
pub struct OneshotCallback(oneshot::Sender<ProducerResult<SendResult>>);

/// Callback plus the receiver that resolves when it fires
pub fn oneshot_callback() -> (OneshotCallback, oneshot::Receiver<ProducerResult<SendResult>>) {
    let (tx, rx) = oneshot::channel();
    (OneshotCallback(tx), rx)
}

impl SendCallback for OneshotCallback {
    fn on_success(self: Box<Self>, result: SendResult) {
        let _ = self.0.send(Ok(result));
    }

    fn on_failure(self: Box<Self>, error: ProducerError) {
        let _ = self.0.send(Err(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_oneshot_callback_forwards_failure() {
        let (callback, rx) = oneshot_callback();
        Box::new(callback).on_failure(ProducerError::NotRunning);

        assert_eq!(rx.await.unwrap(), Err(ProducerError::NotRunning));
    }

    #[test]
    fn test_fn_callback_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let callback: Box<dyn SendCallback> = Box::new(callback_fn(move |result| {
            assert!(result.is_err());
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        callback.on_failure(ProducerError::PermanentSend("rejected".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
