//! HTTP server receiving daemon callbacks

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};
use warp::http::StatusCode;
use warp::Filter;

use crate::error::CallbackError;
use crate::router::{CallbackPayload, CallbackRouter, RouteOutcome};

/// Largest callback body accepted
const MAX_BODY_BYTES: u64 = 256 * 1024;

/// HTTP callback endpoint for the monitoring daemon.
///
/// Every path and method is accepted. The API key is read from the
/// `apikey` query parameter or header; a `test` query parameter turns the
/// request into a connectivity probe answered with `OK`.
///
/// # Example
///
/// ```no_run
/// use tokio::sync::mpsc;
/// use callback_server::{CallbackPayload, CallbackServer};
///
/// #[tokio::main]
/// async fn main() -> Result<(), callback_server::CallbackError> {
///     let (tx, mut rx) = mpsc::unbounded_channel::<CallbackPayload>();
///     let server = CallbackServer::bind("0.0.0.0:55011".parse().unwrap(), "secret", tx).await?;
///     println!("callback endpoint: {}", server.base_url());
///
///     while let Some(payload) = rx.recv().await {
///         println!("{}", payload.body);
///     }
///     server.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct CallbackServer {
    local_addr: SocketAddr,
    base_url: String,
    router: Arc<CallbackRouter>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl CallbackServer {
    /// Bind the endpoint and start serving.
    ///
    /// Binding to port 0 picks a free port; [`CallbackServer::port`] reports it.
    pub async fn bind(
        addr: SocketAddr,
        api_key: impl Into<String>,
        sender: mpsc::UnboundedSender<CallbackPayload>,
    ) -> Result<Self, CallbackError> {
        let router = Arc::new(CallbackRouter::new(api_key, sender));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let (local_addr, server) = warp::serve(Self::routes(router.clone()))
            .try_bind_with_graceful_shutdown(addr, async move {
                let _ = shutdown_rx.await;
            })
            .map_err(|e| CallbackError::Bind(format!("{}: {}", addr, e)))?;

        let server_handle = tokio::spawn(server);
        let base_url = format!("http://{}", local_addr);
        info!("callback server listening on {}", local_addr);

        Ok(Self {
            local_addr,
            base_url,
            router,
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }

    fn routes(
        router: Arc<CallbackRouter>,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = std::convert::Infallible> + Clone {
        warp::any()
            .and(warp::query::<HashMap<String, String>>())
            .and(warp::header::optional::<String>("apikey"))
            .and(body_within_limit())
            .and_then(
                move |query: HashMap<String, String>, header_key: Option<String>, body: bytes::Bytes| {
                    let router = router.clone();
                    async move {
                        if body.len() as u64 > MAX_BODY_BYTES {
                            return Ok::<_, warp::Rejection>(warp::reply::with_status(
                                String::new(),
                                StatusCode::PAYLOAD_TOO_LARGE,
                            ));
                        }
                        let api_key = query.get("apikey").cloned().or(header_key);
                        let test = query.get("test").is_some_and(|v| !v.is_empty());
                        let body = String::from_utf8_lossy(&body).into_owned();
                        debug!("callback: {} bytes", body.len());

                        let reply = match router.route(api_key.as_deref(), test, body).await {
                            RouteOutcome::Unauthorized => {
                                ("unauthorized".to_string(), StatusCode::UNAUTHORIZED)
                            }
                            RouteOutcome::TestProbe => ("OK".to_string(), StatusCode::OK),
                            RouteOutcome::Routed | RouteOutcome::Ignored => {
                                (String::new(), StatusCode::OK)
                            }
                        };
                        Ok::<_, warp::Rejection>(warp::reply::with_status(reply.0, reply.1))
                    }
                },
            )
            .recover(handle_rejection)
            .unify()
    }

    /// `http://<addr>:<port>` of the bound endpoint
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn router(&self) -> &Arc<CallbackRouter> {
        &self.router
    }

    /// Stop accepting requests and wait for in-flight ones to finish
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.server_handle.take() {
            let _ = handle.await;
        }
        info!("callback server on {} stopped", self.local_addr);
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[derive(Debug)]
struct BodyTooLarge;

impl warp::reject::Reject for BodyTooLarge {}

/// Request body, possibly empty. A declared length above the limit is
/// rejected before the body is read; requests without a body pass.
fn body_within_limit() -> impl Filter<Extract = (bytes::Bytes,), Error = warp::Rejection> + Clone {
    warp::header::optional::<u64>("content-length")
        .and_then(|length: Option<u64>| async move {
            match length {
                Some(length) if length > MAX_BODY_BYTES => Err(warp::reject::custom(BodyTooLarge)),
                _ => Ok(()),
            }
        })
        .untuple_one()
        .and(warp::body::bytes())
}

/// Turn filter rejections (oversized or unreadable bodies) into responses
async fn handle_rejection(
    err: warp::Rejection,
) -> Result<warp::reply::WithStatus<String>, std::convert::Infallible> {
    let code = if err.find::<BodyTooLarge>().is_some()
        || err.find::<warp::reject::PayloadTooLarge>().is_some()
    {
        StatusCode::PAYLOAD_TOO_LARGE
    } else if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok(warp::reply::with_status(String::new(), code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let server = CallbackServer::bind("127.0.0.1:0".parse().unwrap(), "secret", tx)
            .await
            .unwrap();

        assert_ne!(server.port(), 0);
        assert_eq!(server.base_url(), format!("http://127.0.0.1:{}", server.port()));
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_bind_taken_port_fails() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        let result = CallbackServer::bind(addr, "secret", tx).await;
        assert!(matches!(result, Err(CallbackError::Bind(_))));
    }

    #[tokio::test]
    async fn test_routes_with_warp_test() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let router = Arc::new(CallbackRouter::new("secret", tx));
        let routes = CallbackServer::routes(router);

        let res = warp::test::request()
            .method("POST")
            .path("/plugins/avr/callback?apikey=secret")
            .body(r#"{"daemon":{"event":"Listening"}}"#)
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(rx.recv().await.unwrap().body.contains("Listening"));

        let res = warp::test::request()
            .path("/?apikey=wrong")
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = warp::test::request()
            .path("/?test=1")
            .header("apikey", "secret")
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body(), "OK");
    }

    #[tokio::test]
    async fn test_bodiless_get_reaches_router() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let router = Arc::new(CallbackRouter::new("secret", tx));
        let routes = CallbackServer::routes(router);

        let res = warp::test::request()
            .method("GET")
            .path("/?apikey=secret&test=1")
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body(), "OK");

        let res = warp::test::request()
            .method("GET")
            .path("/?apikey=wrong")
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = warp::test::request()
            .method("GET")
            .path("/?apikey=secret")
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let router = Arc::new(CallbackRouter::new("secret", tx));
        let routes = CallbackServer::routes(router);

        let res = warp::test::request()
            .method("POST")
            .path("/?apikey=secret")
            .body(vec![b'x'; MAX_BODY_BYTES as usize + 1])
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(rx.try_recv().is_err());
    }
}
