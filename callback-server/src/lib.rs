//! HTTP endpoint for receiver daemon callbacks
//!
//! The monitoring daemon reports device events by calling back into the
//! host over HTTP with a JSON body. This crate is the thin HTTP layer for
//! that path:
//!
//! - [`CallbackServer`]: binds the endpoint and answers requests
//! - [`CallbackRouter`]: checks the pre-shared API key and forwards raw
//!   bodies to a channel
//! - [`CallbackPayload`]: the forwarded body
//!
//! The crate has no knowledge of the message shapes. Decoding and applying
//! them to device state is done by the consumer of the channel.
//!
//! # Example
//!
//! ```no_run
//! use callback_server::{CallbackPayload, CallbackServer};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), callback_server::CallbackError> {
//!     let (tx, mut rx) = mpsc::unbounded_channel::<CallbackPayload>();
//!     let server = CallbackServer::bind("0.0.0.0:55011".parse().unwrap(), "secret", tx).await?;
//!
//!     tokio::spawn(async move {
//!         while let Some(payload) = rx.recv().await {
//!             println!("daemon says: {}", payload.body);
//!         }
//!     });
//!
//!     server.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod router;
pub mod server;

pub use error::CallbackError;
pub use router::{CallbackPayload, CallbackRouter, RouteOutcome};
pub use server::CallbackServer;
