//! Extractor module
//!
//! The orchestration engine knows nothing about page formats. It calls an
//! [`Extractor`] with the worker's session and a work item and receives an
//! [`ExtractionOutcome`]. [`HtmlExtractor`] is the bundled implementation for
//! pages reachable through an [`HttpSession`](crate::session::HttpSession).

mod html;

pub use html::HtmlExtractor;

use crate::session::Session;
use crate::state::{ExtractionOutcome, WorkItem};
use async_trait::async_trait;
use thiserror::Error;

/// Unexpected extraction failures
///
/// These are retried like any `Failure` outcome and, once attempts run out,
/// recorded as one.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Session is closed")]
    SessionClosed,

    #[error("Invalid item URL: {0}")]
    InvalidUrl(String),

    #[error("{0}")]
    Other(String),
}

/// Pulls the data for one work item through a live session
#[async_trait]
pub trait Extractor<S: Session>: Send + Sync {
    async fn extract(
        &self,
        session: &mut S,
        item: &WorkItem,
    ) -> Result<ExtractionOutcome, ExtractionError>;
}
