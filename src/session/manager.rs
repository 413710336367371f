use crate::config::SessionConfig;
use crate::session::{Session, SessionError, SessionFactory};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Owns the current session of one worker
///
/// Acquisition is retried up to `acquire_attempts` times with a fixed pause
/// between attempts. A recycle releases the current session, waits
/// `recycle_pause`, then acquires a replacement.
pub struct SessionManager<F: SessionFactory> {
    factory: Arc<F>,
    worker: usize,
    acquire_attempts: u32,
    acquire_backoff: Duration,
    recycle_pause: Duration,
    current: Option<F::Session>,
    acquisitions: u64,
}

impl<F: SessionFactory> SessionManager<F> {
    pub fn new(factory: Arc<F>, config: &SessionConfig, worker: usize) -> Self {
        Self {
            factory,
            worker,
            acquire_attempts: config.acquire_attempts.max(1),
            acquire_backoff: config.acquire_backoff(),
            recycle_pause: config.recycle_pause(),
            current: None,
            acquisitions: 0,
        }
    }

    /// Acquires a session, releasing any current one first
    pub async fn acquire(&mut self, cancel: &CancellationToken) -> Result<(), SessionError> {
        self.release().await;

        let mut last_error = String::new();
        for attempt in 1..=self.acquire_attempts {
            match self.factory.acquire().await {
                Ok(session) => {
                    self.acquisitions += 1;
                    tracing::debug!(
                        "Worker {} acquired session {} (attempt {})",
                        self.worker,
                        session.id(),
                        attempt
                    );
                    self.current = Some(session);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        "Worker {} session acquisition attempt {}/{} failed: {}",
                        self.worker,
                        attempt,
                        self.acquire_attempts,
                        e
                    );
                    last_error = e.to_string();
                }
            }

            if attempt < self.acquire_attempts {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                    _ = tokio::time::sleep(self.acquire_backoff) => {}
                }
            }
        }

        Err(SessionError::Exhausted {
            attempts: self.acquire_attempts,
            last_error,
        })
    }

    /// Replaces the current session with a fresh one
    ///
    /// The pause between release and acquire is not interrupted by
    /// cancellation, so the worker always leaves a recycle holding a session.
    pub async fn recycle(&mut self, cancel: &CancellationToken) -> Result<(), SessionError> {
        tracing::info!("Worker {} recycling session", self.worker);
        self.release().await;
        tokio::time::sleep(self.recycle_pause).await;
        self.acquire(cancel).await
    }

    /// Releases the current session, if any
    pub async fn release(&mut self) {
        if let Some(mut session) = self.current.take() {
            session.release().await;
            tracing::debug!("Worker {} released session {}", self.worker, session.id());
        }
    }

    pub fn session_mut(&mut self) -> Result<&mut F::Session, SessionError> {
        self.current.as_mut().ok_or(SessionError::NotAcquired)
    }

    pub fn has_session(&self) -> bool {
        self.current.is_some()
    }

    /// Sessions successfully acquired over this manager's lifetime
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions
    }
}
