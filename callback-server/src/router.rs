//! Routing of daemon callbacks
//!
//! The [`CallbackRouter`] holds the pre-shared API key and forwards the raw
//! body of every authorized callback to a channel. It knows nothing about
//! the message shapes; decoding happens in the consumer.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

/// Raw body of an authorized callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackPayload {
    pub body: String,
}

/// How a callback request was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The API key did not match; nothing was forwarded
    Unauthorized,
    /// A `test` probe with a valid key; nothing was forwarded
    TestProbe,
    /// The body was forwarded to the channel
    Routed,
    /// Empty body, or no receiver left
    Ignored,
}

/// Gatekeeper and forwarder for callback requests
#[derive(Clone)]
pub struct CallbackRouter {
    api_key: Arc<RwLock<String>>,
    sender: mpsc::UnboundedSender<CallbackPayload>,
}

impl CallbackRouter {
    /// Create a router accepting requests that carry `api_key`
    ///
    /// # Example
    ///
    /// ```
    /// use tokio::sync::mpsc;
    /// use callback_server::router::{CallbackPayload, CallbackRouter};
    ///
    /// let (tx, _rx) = mpsc::unbounded_channel::<CallbackPayload>();
    /// let router = CallbackRouter::new("secret", tx);
    /// ```
    pub fn new(api_key: impl Into<String>, sender: mpsc::UnboundedSender<CallbackPayload>) -> Self {
        Self {
            api_key: Arc::new(RwLock::new(api_key.into())),
            sender,
        }
    }

    /// Replace the accepted API key
    pub async fn set_api_key(&self, api_key: impl Into<String>) {
        *self.api_key.write().await = api_key.into();
    }

    /// Check a presented key. An empty configured key accepts nothing.
    pub async fn is_authorized(&self, presented: Option<&str>) -> bool {
        let expected = self.api_key.read().await;
        match presented {
            Some(key) => !expected.is_empty() && key == expected.as_str(),
            None => false,
        }
    }

    /// Handle one callback request
    pub async fn route(&self, api_key: Option<&str>, test: bool, body: String) -> RouteOutcome {
        if !self.is_authorized(api_key).await {
            info!("callback rejected: wrong API key");
            return RouteOutcome::Unauthorized;
        }
        if test {
            debug!("callback test probe");
            return RouteOutcome::TestProbe;
        }
        if body.trim().is_empty() {
            return RouteOutcome::Ignored;
        }

        match self.sender.send(CallbackPayload { body }) {
            Ok(()) => RouteOutcome::Routed,
            Err(_) => {
                debug!("callback receiver dropped");
                RouteOutcome::Ignored
            }
        }
    }
}
