//! Session module for remote connection lifecycles
//!
//! A session is one live execution context against the remote source. Each
//! worker owns exactly one at a time through a [`SessionManager`], which
//! acquires it with bounded retries and recycles it on a fixed cadence.

mod http;
mod manager;

pub use http::{HttpSession, HttpSessionFactory};
pub use manager::SessionManager;

use async_trait::async_trait;
use thiserror::Error;

/// Session lifecycle errors
///
/// Failing to obtain a session is the one condition that ends a run early,
/// once the configured acquisition attempts are spent.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session initialization failed: {0}")]
    Init(String),

    #[error("Could not acquire a session after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("No active session")]
    NotAcquired,

    #[error("Acquisition cancelled")]
    Cancelled,
}

/// One live connection to the remote source
#[async_trait]
pub trait Session: Send {
    /// Identifier for log lines
    fn id(&self) -> u64;

    /// Tears the session down
    ///
    /// Calling this on an already released session is a no-op.
    async fn release(&mut self);

    fn is_released(&self) -> bool;
}

/// Creates sessions on demand
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Session: Session + 'static;

    /// Opens a new session
    async fn acquire(&self) -> Result<Self::Session, SessionError>;
}
