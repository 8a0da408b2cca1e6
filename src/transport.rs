//! The HTTP seam.
//!
//! Everything above this module talks to the service through [`Transport`],
//! which keeps the orchestration logic testable against an in-memory
//! implementation. [`HttpTransport`] is the real, `reqwest`-backed one.

use std::fmt;
use std::io::Read;
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Error;
use crate::util::{retriable_status, urljoin};

pub const DEFAULT_BASE_URL: &str = "https://appeears.earthdatacloud.nasa.gov/api";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    None,
    Basic { username: String, password: String },
    Bearer(String),
}

// Keep secrets out of logs and panic messages.
impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::None => f.write_str("None"),
            Auth::Basic { username, .. } => write!(f, "Basic({username}, ***)"),
            Auth::Bearer(_) => f.write_str("Bearer(***)"),
        }
    }
}

/// One call against the service, relative to the transport's base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub auth: Auth,
    pub json: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            auth: Auth::None,
            json: None,
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            ..Self::get(path)
        }
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_json(mut self, json: Value) -> Self {
        self.json = Some(json);
        self
    }
}

/// Status code plus a streamed body.
pub struct ApiResponse {
    pub status: u16,
    pub body: Box<dyn Read + Send>,
}

impl fmt::Debug for ApiResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Read + Send + 'static) -> Self {
        Self {
            status,
            body: Box::new(body),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(mut self) -> Result<String, TransportError> {
        let mut text = String::new();
        self.body.read_to_string(&mut text)?;
        Ok(text)
    }

    /// Reads and decodes a JSON body. `context` names the operation for the
    /// error message.
    pub fn json<T: DeserializeOwned>(self, context: &str) -> Result<T, Error> {
        let text = self.text()?;
        serde_json::from_str(&text).map_err(|source| Error::InvalidResponse {
            context: context.to_string(),
            source,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("could not reach {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to read response body: {0}")]
    Body(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Generic "make an HTTP call" capability.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    retry_max: usize,
    retry_pause: Duration,
    http: HttpClient,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, verify: bool) -> Result<Self, TransportError> {
        Self::with_timeout(base_url, verify, Duration::from_secs(60))
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        verify: bool,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("appeears-rs/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or(HeaderValue::from_static("appeears-rs")),
        );

        let mut builder = HttpClient::builder()
            .default_headers(default_headers)
            .timeout(timeout);

        if !verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let base_url = base_url.into();
        let http = builder.build().map_err(|source| TransportError::Connect {
            url: base_url.clone(),
            source,
        })?;

        Ok(Self {
            base_url,
            retry_max: 5,
            retry_pause: Duration::from_secs(5),
            http,
        })
    }

    pub fn with_retry_max(mut self, retry_max: usize) -> Self {
        self.retry_max = retry_max.max(1);
        self
    }

    pub fn with_retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause = pause;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build(&self, request: &ApiRequest, url: &str) -> RequestBuilder {
        let mut req = match request.method {
            Method::Get => self.http.get(url),
            Method::Post => self.http.post(url),
        };
        req = match &request.auth {
            Auth::None => req,
            Auth::Basic { username, password } => req.basic_auth(username, Some(password)),
            Auth::Bearer(token) => req.bearer_auth(token),
        };
        if let Some(json) = &request.json {
            req = req.json(json);
        }
        req
    }

    fn robust_request<F>(&self, url: &str, mut f: F) -> Result<Response, TransportError>
    where
        F: FnMut() -> Result<Response, reqwest::Error>,
    {
        let mut tries = 0usize;
        loop {
            match f() {
                Ok(resp) => {
                    if retriable_status(resp.status().as_u16()) {
                        tries += 1;
                        if tries >= self.retry_max {
                            return Ok(resp);
                        }
                        log::warn!(
                            "HTTP {} from {}, retrying ({}/{})",
                            resp.status(),
                            url,
                            tries,
                            self.retry_max
                        );
                        thread::sleep(self.retry_pause);
                        continue;
                    }
                    return Ok(resp);
                }
                Err(source) => {
                    tries += 1;
                    if tries >= self.retry_max {
                        return Err(TransportError::Connect {
                            url: url.to_string(),
                            source,
                        });
                    }
                    // timeouts / transient connection errors
                    log::warn!("request to {} failed ({}), retrying", url, source);
                    thread::sleep(self.retry_pause);
                }
            }
        }
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = urljoin(&self.base_url, &request.path);
        log::debug!("{} {}", request.method, url);
        let resp = match request.method {
            Method::Get => self.robust_request(&url, || self.build(request, &url).send())?,
            // not idempotent: a repeated submission creates another task
            Method::Post => self
                .build(request, &url)
                .send()
                .map_err(|source| TransportError::Connect {
                    url: url.clone(),
                    source,
                })?,
        };
        Ok(ApiResponse::new(resp.status().as_u16(), resp))
    }
}
