//! HTTP client with authentication headers, response classification
//! and exponential-backoff retry.
//!
//! | Outcome                          | Result                      | Retried |
//! |----------------------------------|-----------------------------|---------|
//! | timeout / connection failure     | `Timeout` / `Connection`    | yes     |
//! | 5xx                              | `Server`                    | yes     |
//! | 401                              | `Unauthorized` + invalidate | no      |
//! | 429                              | `RateLimited`               | no      |
//! | other 4xx                        | `Client`                    | no      |
//! | 2xx with `{"success": false}`    | `Rejected`                  | no      |
//! | other 2xx                        | parsed JSON body            | -       |
//!
//! [`Client::download`] follows the same table except that a 2xx body
//! is returned as raw bytes and only invalidates the session on 401 when
//! the token was actually sent.

use std::rc::Rc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::NetworkError;
use crate::multipart::MultipartForm;
use crate::session::Session;
use crate::transport::{HttpRequest, HttpResponse, Method, Transport, UploadProgress};

/// Blocks the current thread between retries and polls.
pub trait Sleeper {
    /// Wait for `duration`.
    fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by [`std::thread::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A JSON request relative to the client's base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
}

impl RequestSpec {
    fn new(method: Method, path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body,
        }
    }

    /// `GET path`.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path, None)
    }

    /// `POST path` with a JSON body.
    #[must_use]
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path, Some(body))
    }

    /// `PUT path` with a JSON body.
    #[must_use]
    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Put, path, Some(body))
    }

    /// `DELETE path`. Sent without a body.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path, None)
    }

    /// Append a query parameter. Keys and values are percent-encoded
    /// when the URL is built.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// The request method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }
}

/// Network client.
///
/// Holds the transport, settings and a shared [`Session`]. Every call
/// blocks until it succeeds, fails permanently, or exhausts the retry
/// budget.
pub struct Client<T> {
    transport: T,
    config: ClientConfig,
    session: Rc<Session>,
    sleeper: Rc<dyn Sleeper>,
}

impl<T: std::fmt::Debug> std::fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("transport", &self.transport)
            .field("config", &self.config)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Client<T> {
    /// Create a client that sleeps on the current thread between
    /// retries.
    #[must_use]
    pub fn new(transport: T, config: ClientConfig, session: Rc<Session>) -> Self {
        Self {
            transport,
            config,
            session,
            sleeper: Rc::new(ThreadSleeper),
        }
    }

    /// Replace the sleeper.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Rc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Client settings.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The shared session.
    #[must_use]
    pub fn session(&self) -> &Rc<Session> {
        &self.session
    }

    /// The sleeper used between retries.
    #[must_use]
    pub fn sleeper(&self) -> &dyn Sleeper {
        self.sleeper.as_ref()
    }

    /// The underlying transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Resolve `path` against the base URL and append `query`.
    ///
    /// Absolute `http://` and `https://` URLs are used verbatim.
    #[must_use]
    pub fn url(&self, path: &str, query: &[(String, String)]) -> String {
        let mut url = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_owned()
        } else {
            let base = self.config.base_url.trim_end_matches('/');
            if path.starts_with('/') {
                format!("{base}{path}")
            } else {
                format!("{base}/{path}")
            }
        };
        for (key, value) in query {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&urlencoding::encode(key));
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }

    fn headers(&self, content_type: &str) -> Vec<(String, String)> {
        let mut headers = vec![("Content-Type".to_owned(), content_type.to_owned())];
        if let Some(token) = self.session.token() {
            headers.push(("Authorization".to_owned(), format!("Bearer {token}")));
        }
        if let Some(device) = self.session.device() {
            headers.push(("X-Device-Info".to_owned(), device.header_value()));
        }
        headers
    }

    /// Send a JSON request and return the parsed response body.
    ///
    /// A 2xx body that is not JSON is returned as a JSON string; an
    /// empty body as `null`.
    ///
    /// # Errors
    ///
    /// Returns a [`NetworkError`] as classified in the module docs.
    pub fn request(&self, spec: &RequestSpec) -> Result<Value, NetworkError> {
        let body = match &spec.body {
            Some(value) => serde_json::to_vec(value)?,
            None => Vec::new(),
        };
        let request = HttpRequest {
            method: spec.method,
            url: self.url(&spec.path, &spec.query),
            headers: self.headers("application/json"),
            body,
            timeout: self.config.request_timeout,
        };
        self.execute(&request, &mut |_| {}, Self::classify)
    }

    /// Upload a multipart form with `POST`, reporting body progress.
    ///
    /// # Errors
    ///
    /// Returns a [`NetworkError`] as classified in the module docs.
    pub fn upload(
        &self,
        path: &str,
        form: MultipartForm,
        progress: &mut dyn FnMut(UploadProgress),
    ) -> Result<Value, NetworkError> {
        let encoded = form.finish();
        let request = HttpRequest {
            method: Method::Post,
            url: self.url(path, &[]),
            headers: self.headers(&encoded.content_type),
            body: encoded.body,
            timeout: self.config.upload_timeout,
        };
        self.execute(&request, progress, Self::classify)
    }

    /// `GET` a file and return its bytes, e.g. a finished result image.
    ///
    /// Credentials are attached only when `url` points at the configured
    /// server; other hosts (asset CDNs) get a bare request.
    ///
    /// # Errors
    ///
    /// Returns a [`NetworkError`] as classified in the module docs.
    pub fn download(&self, url: &str) -> Result<Vec<u8>, NetworkError> {
        let url = self.url(url, &[]);
        let root = format!("{}/", self.config.base_url.trim_end_matches('/'));
        let own_server = url.starts_with(&root);
        let headers = if own_server {
            self.headers("application/octet-stream")
                .into_iter()
                .filter(|(name, _)| name != "Content-Type")
                .collect()
        } else {
            Vec::new()
        };
        let request = HttpRequest {
            method: Method::Get,
            url,
            headers,
            body: Vec::new(),
            timeout: self.config.upload_timeout,
        };
        let sent_token = request.header("authorization").is_some();
        let outcome = self.execute(&request, &mut |_| {}, |_, response| {
            if response.is_success() {
                Ok(response.body)
            } else {
                Err(status_error(response.status, &parse_body(&response.body)))
            }
        });
        if sent_token && matches!(outcome, Err(NetworkError::Unauthorized)) {
            self.session.invalidate();
        }
        outcome
    }

    /// `GET` with query parameters, decoding the body into `R`.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request); also [`NetworkError::Decode`].
    pub fn get<R: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<R, NetworkError> {
        let spec = query
            .iter()
            .fold(RequestSpec::get(path), |spec, (k, v)| spec.query(*k, v));
        Ok(serde_json::from_value(self.request(&spec)?)?)
    }

    /// `POST` a serializable body, decoding the response into `R`.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request); also [`NetworkError::Decode`].
    pub fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, NetworkError> {
        let spec = RequestSpec::post(path, serde_json::to_value(body)?);
        Ok(serde_json::from_value(self.request(&spec)?)?)
    }

    /// `PUT` a serializable body, decoding the response into `R`.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request); also [`NetworkError::Decode`].
    pub fn put<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, NetworkError> {
        let spec = RequestSpec::put(path, serde_json::to_value(body)?);
        Ok(serde_json::from_value(self.request(&spec)?)?)
    }

    /// `DELETE`, decoding the response into `R`.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request); also [`NetworkError::Decode`].
    pub fn delete<R: DeserializeOwned>(&self, path: &str) -> Result<R, NetworkError> {
        Ok(serde_json::from_value(
            self.request(&RequestSpec::delete(path))?,
        )?)
    }

    fn execute<V>(
        &self,
        request: &HttpRequest,
        progress: &mut dyn FnMut(UploadProgress),
        accept: impl Fn(&Self, HttpResponse) -> Result<V, NetworkError>,
    ) -> Result<V, NetworkError> {
        let policy = self.config.retry;
        let mut attempt = 0;
        loop {
            let outcome = self
                .transport
                .send(request, progress)
                .map_err(NetworkError::from)
                .and_then(|response| accept(self, response));

            match outcome {
                Err(err) if err.is_transient() && attempt < policy.max_retries => {
                    let delay = policy.delay_for(attempt);
                    attempt += 1;
                    tracing::warn!(
                        method = %request.method,
                        url = %request.url,
                        attempt,
                        max_retries = policy.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "retrying request"
                    );
                    self.sleeper.sleep(delay);
                }
                Err(err) => {
                    tracing::debug!(method = %request.method, url = %request.url, error = %err, "request failed");
                    return Err(err);
                }
                Ok(value) => return Ok(value),
            }
        }
    }

    fn classify(&self, response: HttpResponse) -> Result<Value, NetworkError> {
        let body = parse_body(&response.body);

        if response.is_success() {
            if body.get("success").and_then(Value::as_bool) == Some(false) {
                let message = body_message(&body).unwrap_or_else(|| "request failed".to_owned());
                return Err(NetworkError::Rejected(message));
            }
            return Ok(body);
        }

        let err = status_error(response.status, &body);
        if matches!(err, NetworkError::Unauthorized) {
            self.session.invalidate();
        }
        Err(err)
    }
}

/// Error for a non-2xx status.
fn status_error(status: u16, body: &Value) -> NetworkError {
    let message = body_message(body).unwrap_or_else(|| format!("HTTP {status}"));
    match status {
        401 => NetworkError::Unauthorized,
        429 => NetworkError::RateLimited,
        500..=599 => NetworkError::Server { status, message },
        400..=499 => NetworkError::Client { status, message },
        _ => NetworkError::Unknown(format!("unexpected status {status}: {message}")),
    }
}

fn parse_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

/// `message` (our envelope) or `detail` (framework errors) from a body.
fn body_message(body: &Value) -> Option<String> {
    ["message", "detail"]
        .iter()
        .find_map(|key| body.get(key).and_then(Value::as_str))
        .map(str::to_owned)
}
