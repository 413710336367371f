//! HTTP session backed by a cookie-keeping client
//!
//! Each session gets its own `reqwest::Client` and therefore its own cookie
//! jar. Releasing the session drops the client; recycling builds a new one.

use crate::config::SessionConfig;
use crate::session::{Session, SessionError, SessionFactory};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A live HTTP session
pub struct HttpSession {
    id: u64,
    client: Option<Client>,
}

impl HttpSession {
    /// Client for this session, `None` once released
    pub fn client(&self) -> Option<&Client> {
        self.client.as_ref()
    }
}

#[async_trait]
impl Session for HttpSession {
    fn id(&self) -> u64 {
        self.id
    }

    async fn release(&mut self) {
        self.client = None;
    }

    fn is_released(&self) -> bool {
        self.client.is_none()
    }
}

/// Builds [`HttpSession`]s from the `[session]` configuration
pub struct HttpSessionFactory {
    config: SessionConfig,
    next_id: AtomicU64,
}

impl HttpSessionFactory {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            next_id: AtomicU64::new(1),
        }
    }

    fn build_client(&self) -> Result<Client, reqwest::Error> {
        Client::builder()
            .user_agent(self.config.user_agent.as_str())
            .timeout(Duration::from_secs(self.config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(self.config.connect_timeout_secs))
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .build()
    }
}

#[async_trait]
impl SessionFactory for HttpSessionFactory {
    type Session = HttpSession;

    async fn acquire(&self) -> Result<HttpSession, SessionError> {
        let client = self
            .build_client()
            .map_err(|e| SessionError::Init(format!("Failed to build HTTP client: {}", e)))?;

        // Prime the cookie jar
        if let Some(warmup) = &self.config.warmup_url {
            let response = client
                .get(warmup)
                .send()
                .await
                .map_err(|e| SessionError::Init(format!("Warm-up request failed: {}", e)))?;

            if !response.status().is_success() {
                return Err(SessionError::Init(format!(
                    "Warm-up request returned HTTP {}",
                    response.status().as_u16()
                )));
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Opened HTTP session {}", id);

        Ok(HttpSession {
            id,
            client: Some(client),
        })
    }
}
