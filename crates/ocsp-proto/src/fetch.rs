//! Conditional OCSP fetching over a pluggable HTTP transport.
//!
//! The [`Fetcher`] executes a prepared [`Request`] against its
//! responder, classifies the outcome (`304` short-circuits, anything
//! but `200` is an error), validates the `Content-Type`, and hands the
//! body to the OCSP parser. Conditional headers are attached for GET
//! requests so responders and intermediaries can answer from cache.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use http::header::{HeaderMap, HeaderValue, CACHE_CONTROL, CONTENT_TYPE, ETAG};
use http::{Method, StatusCode};
use tracing::debug;

use crate::error::{FetchError, TransportError};
use crate::httpcache;
use crate::request::Request;
use crate::response::Response;
use crate::verify::parse_response;

/// Responses are read up to this size; larger bodies are truncated and
/// will fail OCSP decoding.
pub const MAX_RESPONSE_BODY: usize = 1024 * 1024;

/// Injectable wall clock, for deterministic tests.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// A plain HTTP exchange, decoupled from any client implementation.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// The transport-level response to an [`HttpRequest`].
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Capability to carry out a single HTTP exchange.
///
/// Implementations are responsible for TLS verification and timeouts;
/// the fetcher imposes no deadline of its own.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Default [`HttpClient`] backed by a shared `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl From<reqwest::Client> for ReqwestClient {
    fn from(client: reqwest::Client) -> Self {
        ReqwestClient { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        let mut response = builder
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();

        // Read at most MAX_RESPONSE_BODY bytes, regardless of what the
        // Content-Length header claims.
        let mut body = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| TransportError(e.to_string()))?
        {
            let room = MAX_RESPONSE_BODY - body.len();
            if chunk.len() >= room {
                body.extend_from_slice(&chunk[..room]);
                break;
            }
            body.extend_from_slice(&chunk);
        }

        Ok(HttpResponse {
            status,
            headers,
            body: body.freeze(),
        })
    }
}

/// Fetches and validates OCSP responses for prepared [`Request`]s.
#[derive(Clone)]
pub struct Fetcher {
    client: Arc<dyn HttpClient>,
    clock: Clock,
}

impl Default for Fetcher {
    fn default() -> Self {
        Fetcher::new(Arc::new(ReqwestClient::default()))
    }
}

impl Fetcher {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Fetcher {
            client,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replaces the wall clock; scheduling decisions and expiry checks
    /// then use the injected time source.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Current time according to the fetcher's clock.
    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Fetches using the validators and `nextUpdate` of a previously
    /// fetched (or cache-loaded) response.
    pub async fn fetch_with_previous(
        &self,
        request: &Request,
        previous: Option<&Response>,
    ) -> Result<Option<Response>, FetchError> {
        let (etag, last_modified, next_update) = match previous {
            Some(prev) => (prev.etag.clone(), prev.last_modified, prev.next_update()),
            None => (None, None, None),
        };
        self.fetch(request, etag.as_deref(), last_modified, next_update)
            .await
    }

    /// Executes the query.
    ///
    /// Returns `Ok(None)` on `304 Not Modified`: the caller keeps its
    /// previous response and only the refresh schedule moves. The
    /// conditional headers prefer `If-None-Match` over
    /// `If-Modified-Since`; at most one is sent.
    ///
    /// For GET requests whose result is already stale (or whose
    /// `previous_next_update` was), the query is retried once with
    /// `Cache-Control: no-cache` to punch through overzealous
    /// intermediary caches. A retry that fails to connect or parse
    /// falls back to the first response without error.
    pub async fn fetch(
        &self,
        request: &Request,
        etag: Option<&str>,
        last_modified: Option<DateTime<Utc>>,
        previous_next_update: Option<DateTime<Utc>>,
    ) -> Result<Option<Response>, FetchError> {
        let now = self.now();
        if now > request.not_after() {
            return Err(FetchError::CertExpired);
        }

        let mut http_request = build_http_request(request, etag, last_modified);
        let is_get = http_request.method == Method::GET;

        let response = self.client.execute(http_request.clone()).await?;
        let first = parse_http_response(response, request.issuer_der(), now)?;

        if is_get {
            let next_update = match &first {
                Some(r) => r.next_update(),
                None => previous_next_update,
            };
            if next_update.is_some_and(|nu| nu < now) {
                debug!(url = %request.url(), "stale OCSP response, retrying with no-cache");
                http_request
                    .headers
                    .insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
                match self.client.execute(http_request).await {
                    Ok(retried) => match parse_http_response(retried, request.issuer_der(), now) {
                        Ok(outcome) => return Ok(outcome),
                        Err(err) => {
                            debug!(error = %err, "no-cache retry failed, keeping first response");
                            return Ok(first);
                        }
                    },
                    Err(err) => {
                        debug!(error = %err, "no-cache retry failed, keeping first response");
                        return Ok(first);
                    }
                }
            }
        }

        Ok(first)
    }
}

fn build_http_request(
    request: &Request,
    etag: Option<&str>,
    last_modified: Option<DateTime<Utc>>,
) -> HttpRequest {
    let mut headers = HeaderMap::new();
    match request.body() {
        None => {
            if let Some(etag) = etag.filter(|e| !e.is_empty()) {
                if let Ok(value) = HeaderValue::from_str(etag) {
                    headers.insert(http::header::IF_NONE_MATCH, value);
                }
            } else if let Some(lm) = last_modified {
                if let Ok(value) = HeaderValue::from_str(&httpcache::format_http_date(lm)) {
                    headers.insert(http::header::IF_MODIFIED_SINCE, value);
                }
            }
            HttpRequest {
                method: Method::GET,
                url: request.url().to_string(),
                headers,
                body: None,
            }
        }
        Some(body) => {
            headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_static("application/ocsp-request"),
            );
            HttpRequest {
                method: Method::POST,
                url: request.url().to_string(),
                headers,
                body: Some(Bytes::copy_from_slice(body)),
            }
        }
    }
}

/// Classifies an HTTP response; `None` means `304 Not Modified`.
fn parse_http_response(
    response: HttpResponse,
    issuer_der: &[u8],
    now: DateTime<Utc>,
) -> Result<Option<Response>, FetchError> {
    if response.status == StatusCode::NOT_MODIFIED {
        return Ok(None);
    }
    if response.status != StatusCode::OK {
        return Err(FetchError::BadHttpStatus(response.status.as_u16()));
    }

    let content_type = match response.headers.get(CONTENT_TYPE) {
        None => return Err(FetchError::NoContentType),
        Some(value) => value
            .to_str()
            .map_err(|_| FetchError::BadContentType(format!("{value:?}")))?,
    };
    let (media_type, has_params) = parse_media_type(content_type);
    if media_type != "application/ocsp-response" || has_params {
        return Err(FetchError::BadContentType(content_type.to_string()));
    }

    let body = &response.body[..response.body.len().min(MAX_RESPONSE_BODY)];
    let ocsp = parse_response(body, issuer_der)?;

    Ok(Some(Response {
        ocsp: Some(ocsp),
        raw: body.to_vec(),
        max_age: httpcache::max_age(&response.headers, now),
        etag: response
            .headers
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        last_modified: httpcache::last_modified(&response.headers),
    }))
}

/// Splits a `Content-Type` value into its case-folded media type and a
/// flag for the presence of parameters.
fn parse_media_type(value: &str) -> (String, bool) {
    let mut parts = value.splitn(2, ';');
    let media_type = parts.next().unwrap_or("").trim().to_ascii_lowercase();
    let has_params = parts.next().is_some_and(|p| !p.trim().is_empty());
    (media_type, has_params)
}
