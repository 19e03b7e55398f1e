use crate::error::SessionError;
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

/// A single navigable browser tab.
///
/// Every method takes `&mut self`: one session has one current page, so only
/// one operation may be in flight against it at a time.
#[async_trait]
pub trait Session: Send {
    /// Navigate to `url` and wait for the document to load
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError>;

    /// Go back one entry in the history
    async fn go_back(&mut self) -> Result<(), SessionError>;

    /// Wait `delay`, then until the document reports it is ready
    async fn wait_stable(&mut self, delay: Duration) -> Result<(), SessionError>;

    /// Wait up to `timeout` for `selector` to match. `Ok(false)` on timeout.
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<bool, SessionError>;

    /// Snapshot of the current document, for scoped selector queries
    async fn source(&mut self) -> Result<String, SessionError>;

    /// Click the first element matching `selector` if it is visible and
    /// enabled. `Ok(false)` when there is no usable control.
    async fn activate(&mut self, selector: &str) -> Result<bool, SessionError>;

    async fn current_url(&mut self) -> Result<Url, SessionError>;

    fn is_closed(&self) -> bool;
}
