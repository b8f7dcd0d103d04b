//! The HTTP boundary.
//!
//! [`Transport`] sends one fully-built [`HttpRequest`] and returns the
//! raw status and body. It never interprets status codes; retry and
//! classification live in [`Client`](crate::client::Client).
//! [`UreqTransport`] is the production implementation.

use std::io::Read;
use std::time::Duration;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
}

impl Method {
    /// Upper-case method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request ready to go on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: Method,
    /// Absolute URL including any query string.
    pub url: String,
    /// Header name/value pairs in insertion order.
    pub headers: Vec<(String, String)>,
    /// Request body. Empty for bodiless requests.
    pub body: Vec<u8>,
    /// Overall deadline for the exchange.
    pub timeout: Duration,
}

impl HttpRequest {
    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A raw response: status code and body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Whether the status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// A request that never produced a response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The deadline passed.
    #[error("request timed out")]
    Timeout,
    /// DNS, connect, TLS or socket failure.
    #[error("connection failed: {0}")]
    Connection(String),
    /// Anything else (malformed URL, protocol error, ...).
    #[error("transport error: {0}")]
    Other(String),
}

/// Upload byte progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    /// Bytes handed to the connection so far.
    pub sent: u64,
    /// Total body size.
    pub total: u64,
}

impl UploadProgress {
    /// Progress as a whole percentage in `[0, 100]`. An empty body is
    /// reported as complete.
    #[must_use]
    pub fn percent(self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        let pct = self.sent.min(self.total).saturating_mul(100) / self.total;
        u8::try_from(pct).unwrap_or(100)
    }
}

/// Sends HTTP requests.
pub trait Transport {
    /// Send `request` and return the response, whatever its status.
    /// `progress` is called as body bytes are written.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when no response was received.
    fn send(
        &self,
        request: &HttpRequest,
        progress: &mut dyn FnMut(UploadProgress),
    ) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(
        &self,
        request: &HttpRequest,
        progress: &mut dyn FnMut(UploadProgress),
    ) -> Result<HttpResponse, TransportError> {
        (**self).send(request, progress)
    }
}

/// Blocking transport backed by a [`ureq::Agent`].
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UreqTransport {
    /// Create a transport that reports every status code as a response
    /// instead of an error.
    #[must_use]
    pub fn new() -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into();
        Self { agent }
    }
}

impl Transport for UreqTransport {
    fn send(
        &self,
        request: &HttpRequest,
        progress: &mut dyn FnMut(UploadProgress),
    ) -> Result<HttpResponse, TransportError> {
        let url = request.url.as_str();
        let result = match request.method {
            Method::Get => self.agent.get(url).apply(request).call(),
            Method::Delete => self.agent.delete(url).apply(request).call(),
            Method::Post | Method::Put => {
                let builder = if request.method == Method::Post {
                    self.agent.post(url)
                } else {
                    self.agent.put(url)
                };
                let mut reader = ProgressReader::new(&request.body, progress);
                builder
                    .apply(request)
                    .send(ureq::SendBody::from_reader(&mut reader))
            }
        };

        let mut response = result.map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_vec()
            .map_err(transport_error)?;
        Ok(HttpResponse { status, body })
    }
}

/// Apply headers and timeout to a ureq request builder.
trait ApplyRequest: Sized {
    fn apply(self, request: &HttpRequest) -> Self;
}

impl<B> ApplyRequest for ureq::RequestBuilder<B> {
    fn apply(self, request: &HttpRequest) -> Self {
        let mut builder = self;
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
            .config()
            .timeout_global(Some(request.timeout))
            .build()
    }
}

fn transport_error(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Timeout(_) => TransportError::Timeout,
        ureq::Error::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => TransportError::Timeout,
        ureq::Error::Io(e) => TransportError::Connection(e.to_string()),
        ureq::Error::ConnectionFailed | ureq::Error::HostNotFound => {
            TransportError::Connection(err.to_string())
        }
        other => TransportError::Other(other.to_string()),
    }
}

/// A reader over a byte slice that reports how much has been read.
struct ProgressReader<'a, F: FnMut(UploadProgress) + ?Sized> {
    data: &'a [u8],
    sent: usize,
    progress: &'a mut F,
}

impl<'a, F: FnMut(UploadProgress) + ?Sized> ProgressReader<'a, F> {
    const fn new(data: &'a [u8], progress: &'a mut F) -> Self {
        Self {
            data,
            sent: 0,
            progress,
        }
    }
}

impl<F: FnMut(UploadProgress) + ?Sized> Read for ProgressReader<'_, F> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = &self.data[self.sent..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.sent += n;
        if n > 0 {
            (self.progress)(UploadProgress {
                sent: self.sent as u64,
                total: self.data.len() as u64,
            });
        }
        Ok(n)
    }
}
