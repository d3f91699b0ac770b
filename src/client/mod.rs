//! Client side of the update status endpoint.
//!
//! [`UpdatePoller`] polls `/api/update-status` and publishes the latest status
//! on a watch channel. A failed poll is logged and the last-known status stays
//! published, so consumers never observe an error.

/// Countdown and dismissible notification
pub mod notification;

use crate::errors::Result;
use crate::update::UpdateStatus;
use reqwest::header::COOKIE;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub use notification::{DismissalStore, countdown_seconds, restart_countdown};

/// Time between polls
pub const POLL_INTERVAL: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const STATUS_PATH: &str = "/api/update-status";

/// Polls the update status endpoint of one server.
#[derive(Debug)]
pub struct UpdatePoller {
    client: reqwest::Client,
    base_url: String,
    session_cookie: Option<String>,
    interval: Duration,
    latest: watch::Sender<Option<UpdateStatus>>,
}

impl UpdatePoller {
    /// Creates a poller for the server at `base_url`, e.g. `http://localhost:3000`.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let (latest, _) = watch::channel(None);
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session_cookie: None,
            interval: POLL_INTERVAL,
            latest,
        })
    }

    /// Sends `cookie` (e.g. `local_llm_sid=...`) with every poll.
    #[must_use]
    pub fn with_session_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.session_cookie = Some(cookie.into());
        self
    }

    /// Overrides the poll interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Receiver of every published status
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<UpdateStatus>> {
        self.latest.subscribe()
    }

    /// Last successfully fetched status
    #[must_use]
    pub fn latest(&self) -> Option<UpdateStatus> {
        self.latest.borrow().clone()
    }

    /// Fetches the status once without publishing it.
    pub async fn fetch_status(&self) -> Result<UpdateStatus> {
        let mut request = self.client.get(format!("{}{STATUS_PATH}", self.base_url));
        if let Some(cookie) = &self.session_cookie {
            request = request.header(COOKIE, cookie);
        }
        let status = request.send().await?.error_for_status()?.json().await?;
        Ok(status)
    }

    /// Polls once. Returns whether a fresh status was published.
    pub async fn poll_once(&self) -> bool {
        match self.fetch_status().await {
            Ok(status) => {
                debug!("Update status: {:?}", status);
                self.latest.send_replace(Some(status));
                true
            }
            Err(e) => {
                warn!("Error fetching update status: {}", e);
                false
            }
        }
    }

    /// Polls immediately and then once per interval until the task is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                self.poll_once().await;
            }
        })
    }
}
