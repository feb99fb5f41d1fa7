//! Private HTTP client for AV receiver communication
//!
//! This crate provides the minimal blocking transport both receiver
//! protocols share: a GET/POST helper with per-request timeouts, XML
//! parsing of the answer, and detection of the `Error 403` marker the
//! firmwares use for "unsupported on this endpoint".

mod error;
pub mod xml;

pub use error::HttpError;
pub use xml::{flatten, indexed_values, FieldValue, FlatFields, UNSUPPORTED_MARKER};

use std::time::Duration;

use tracing::{debug, info};
use xmltree::Element;

/// Outcome of an XML request
#[derive(Debug, Clone)]
pub enum XmlReply {
    /// A parsed XML document
    Document(Element),
    /// The receiver answered with the `Error 403` marker
    Unsupported,
}

impl XmlReply {
    /// Flatten the document, yielding an empty map for unsupported replies
    pub fn flatten(&self) -> FlatFields {
        match self {
            XmlReply::Document(root) => xml::flatten(root),
            XmlReply::Unsupported => FlatFields::new(),
        }
    }

    /// Returns true if the receiver reported the endpoint as unsupported
    pub fn is_unsupported(&self) -> bool {
        matches!(self, XmlReply::Unsupported)
    }
}

/// A minimal HTTP client for receiver control endpoints
#[derive(Debug, Clone)]
pub struct HttpClient {
    agent: ureq::Agent,
}

impl HttpClient {
    /// Create a new client with default connect timeout
    pub fn new() -> Self {
        Self::with_connect_timeout(Duration::from_secs(2))
    }

    /// Create a client with a specific connect timeout
    pub fn with_connect_timeout(connect_timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(connect_timeout)
                .build(),
        }
    }

    /// Send a GET request and return the raw body
    pub fn get_text(&self, url: &str, timeout: Duration) -> Result<String, HttpError> {
        debug!("GET {}", url);
        let result = self.agent.get(url).timeout(timeout).call();
        Self::read_body(result)
    }

    /// Send a POST request with an XML body and return the raw answer
    pub fn post_text(&self, url: &str, body: &str, timeout: Duration) -> Result<String, HttpError> {
        debug!("POST {}", url);
        let result = self
            .agent
            .post(url)
            .timeout(timeout)
            .set("Content-Type", "text/xml; charset=\"utf-8\"")
            .send_string(body);
        Self::read_body(result)
    }

    /// Send a GET request and parse the answer as XML
    pub fn get_xml(&self, url: &str, timeout: Duration) -> Result<XmlReply, HttpError> {
        let body = self.get_text(url, timeout)?;
        parse_reply(&body)
    }

    /// Send a POST request and parse the answer as XML
    pub fn post_xml(&self, url: &str, body: &str, timeout: Duration) -> Result<XmlReply, HttpError> {
        let answer = self.post_text(url, body, timeout)?;
        parse_reply(&answer)
    }

    fn read_body(result: Result<ureq::Response, ureq::Error>) -> Result<String, HttpError> {
        match result {
            Ok(response) => response
                .into_string()
                .map(|body| body.trim().to_string())
                .map_err(|e| HttpError::Network(e.to_string())),
            // A 403 status is how some firmwares report an unsupported zone;
            // surface it the same way as the in-body marker.
            Err(ureq::Error::Status(403, _)) => Ok(UNSUPPORTED_MARKER.to_string()),
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                if xml::is_unsupported(&body) {
                    Ok(body)
                } else {
                    Err(HttpError::Network(format!("HTTP {}", code)))
                }
            }
            Err(e) => Err(HttpError::Network(e.to_string())),
        }
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a receiver answer, honouring the unsupported marker
pub fn parse_reply(body: &str) -> Result<XmlReply, HttpError> {
    if xml::is_unsupported(body) {
        info!("receiver answered {}", UNSUPPORTED_MARKER);
        return Ok(XmlReply::Unsupported);
    }

    Element::parse(body.trim().as_bytes())
        .map(XmlReply::Document)
        .map_err(|e| HttpError::Parse(e.to_string()))
}
