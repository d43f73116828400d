use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{FlowLensError, Result};

#[derive(Default)]
struct Shared {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Run-wide cancellation signal with an optional deadline.
///
/// Every network call and every deliberate sleep in the fetch client goes
/// through [`CancelToken::check`] or [`CancelToken::sleep`].
#[derive(Clone, Default)]
pub struct CancelToken {
    shared: Arc<Shared>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a token that also trips once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            shared: Arc::default(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
        self.shared.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(FlowLensError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleeps for `duration` unless cancelled first.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        let notified = self.shared.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        self.check()?;

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            () = tokio::time::sleep(duration) => Ok(()),
            () = &mut notified => Err(FlowLensError::Cancelled),
            () = deadline => Err(FlowLensError::Cancelled),
        }
    }
}
