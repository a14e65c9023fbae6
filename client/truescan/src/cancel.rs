use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use tokio::{sync::Notify, time::sleep};

use crate::error::ServiceError;

#[derive(Clone, Debug, Default)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    // Resolves once `cancel` has been called, immediately if it already was.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before re-checking the flag so a concurrent cancel is not lost.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    // None when cancelled before `work` completed; `work` is dropped then.
    pub async fn run<F: Future>(&self, work: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancelled() => None,
            output = work => Some(output),
        }
    }

    // Returns `true` when woken by cancellation rather than the timer.
    pub async fn sleep_or_cancel(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => true,
            _ = sleep(duration) => false,
        }
    }
}

// Consumer-side await that unwinds as soon as the request is cancelled.
pub(crate) async fn guarded<T, E>(
    cancel: &CancelSignal,
    work: impl Future<Output = Result<T, E>>,
) -> Result<T, ServiceError>
where
    ServiceError: From<E>,
{
    match cancel.run(work).await {
        Some(result) => Ok(result?),
        None => Err(ServiceError::Cancelled),
    }
}

#[derive(Debug, Default)]
pub struct RequestSlot {
    current: Mutex<Option<CancelSignal>>,
}

impl RequestSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> CancelSignal {
        let signal = CancelSignal::new();
        let previous = self.replace(Some(signal.clone()));
        if let Some(previous) = previous {
            tracing::debug!("cancelling superseded request");
            previous.cancel();
        }
        signal
    }

    pub fn cancel_current(&self) {
        if let Some(current) = self.replace(None) {
            current.cancel();
        }
    }

    // Releases the slot if `signal` still owns it.
    pub fn finish(&self, signal: &CancelSignal) {
        let mut current = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if current
            .as_ref()
            .is_some_and(|held| Arc::ptr_eq(&held.flag, &signal.flag))
        {
            *current = None;
        }
    }

    fn replace(&self, next: Option<CancelSignal>) -> Option<CancelSignal> {
        let mut current = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *current, next)
    }
}
