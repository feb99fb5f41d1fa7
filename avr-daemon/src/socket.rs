//! Daemon socket client
//!
//! Each request opens a fresh TCP connection, writes one JSON document and
//! closes the write side. The daemon never answers.

use std::io::Write;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

#[cfg(any(test, feature = "test-support"))]
use parking_lot::Mutex;
use tracing::debug;

use crate::config::DaemonConfig;
use crate::error::{DaemonError, Result};
use crate::message::{encode_request, DaemonRequest};

/// Something that can deliver requests to the daemon
pub trait DaemonTransport: Send + Sync {
    fn send(&self, request: &DaemonRequest) -> Result<()>;
}

/// Fire-and-forget TCP client for the daemon socket
#[derive(Debug, Clone)]
pub struct DaemonClient {
    addr: String,
    api_key: String,
    timeout: Duration,
}

impl DaemonClient {
    pub fn new(addr: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(2),
        }
    }

    pub fn from_config(config: &DaemonConfig) -> Self {
        Self::new(config.socket_addr(), config.api_key.clone()).with_timeout(config.socket_timeout())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn unreachable(&self, reason: impl ToString) -> DaemonError {
        DaemonError::Unreachable {
            addr: self.addr.clone(),
            reason: reason.to_string(),
        }
    }

    fn connect(&self) -> Result<TcpStream> {
        let addrs = self
            .addr
            .to_socket_addrs()
            .map_err(|e| self.unreachable(e))?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = Some(e),
            }
        }

        Err(match last_error {
            Some(e) => self.unreachable(e),
            None => self.unreachable("address did not resolve"),
        })
    }
}

impl DaemonTransport for DaemonClient {
    fn send(&self, request: &DaemonRequest) -> Result<()> {
        let payload = encode_request(&self.api_key, request)?;
        debug!("daemon {} -> {}", request.action(), self.addr);

        let mut stream = self.connect()?;
        stream
            .set_write_timeout(Some(self.timeout))
            .map_err(|e| self.unreachable(e))?;
        stream
            .write_all(payload.as_bytes())
            .map_err(|e| self.unreachable(e))?;
        stream
            .shutdown(Shutdown::Write)
            .map_err(|e| self.unreachable(e))?;
        Ok(())
    }
}

/// Transport that keeps every request in memory
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<DaemonRequest>>,
    fail: bool,
}

#[cfg(any(test, feature = "test-support"))]
impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose every send fails as unreachable
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<DaemonRequest> {
        self.sent.lock().clone()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl DaemonTransport for RecordingTransport {
    fn send(&self, request: &DaemonRequest) -> Result<()> {
        if self.fail {
            return Err(DaemonError::Unreachable {
                addr: "recording".to_string(),
                reason: "configured to fail".to_string(),
            });
        }
        self.sent.lock().push(request.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    #[test]
    fn test_send_writes_one_document() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let reader = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut body = String::new();
            stream.read_to_string(&mut body).unwrap();
            body
        });

        let client = DaemonClient::new(addr.to_string(), "key");
        client.send(&DaemonRequest::Unregister { serial: "abc".into() }).unwrap();

        let body: serde_json::Value = serde_json::from_str(&reader.join().unwrap()).unwrap();
        assert_eq!(body["apikey"], "key");
        assert_eq!(body["action"], "unregister");
        assert_eq!(body["serial"], "abc");
    }

    #[test]
    fn test_closed_port_is_unreachable() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };

        let client = DaemonClient::new(addr.to_string(), "key").with_timeout(Duration::from_millis(200));
        let result = client.send(&DaemonRequest::UnregisterAll);
        assert!(matches!(result, Err(DaemonError::Unreachable { .. })));
    }

    #[test]
    fn test_recording_transport() {
        let transport = RecordingTransport::new();
        transport.send(&DaemonRequest::UnregisterAll).unwrap();
        assert_eq!(transport.sent(), vec![DaemonRequest::UnregisterAll]);

        assert!(RecordingTransport::failing().send(&DaemonRequest::UnregisterAll).is_err());
    }
}
