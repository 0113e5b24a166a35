//! OCSP Protocol Implementation
//!
//! This crate provides the protocol half of the OCSP updater daemon:
//! building OCSP requests (RFC 6960, with the RFC 5019 lightweight
//! profile), fetching them over HTTP with full cache-validator support,
//! and parsing and verifying the responses.
//!
//! # Features
//!
//! - GET/POST selection per RFC 5019 section 5 (GET while the encoded
//!   URL stays within 255 bytes)
//! - Conditional fetches with `If-None-Match` / `If-Modified-Since`
//! - `Cache-Control` / `Expires` aware expiry metadata
//! - Response signature verification against the issuing CA, including
//!   delegated responder certificates
//! - The refresh-timing heuristic shared by the scheduler and the
//!   one-shot tools
//!
//! # Example
//!
//! ```rust,no_run
//! use ocsp_proto::{create_request, parse_certificate_bundle, Fetcher};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bundle = parse_certificate_bundle("example.com.pem".as_ref())?;
//! let request = create_request(&bundle.cert_der, &bundle.issuer_der, None)?;
//!
//! let fetcher = Fetcher::default();
//! if let Some(response) = fetcher.fetch(&request, None, None, None).await? {
//!     let ocsp = response.ocsp.expect("fetched responses are parsed");
//!     println!("status: {}", ocsp.status);
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod fetch;
pub mod httpcache;
pub mod pem;
pub mod refresh;
pub mod request;
pub mod response;
pub mod verify;

#[cfg(test)]
pub(crate) mod testdata;

pub use error::{FetchError, RequestError, TransportError, VerifyError};
pub use fetch::{Clock, Fetcher, HttpClient, HttpRequest, HttpResponse, ReqwestClient};
pub use pem::{issuer_file, parse_certificate_bundle, Bundle, BundleError};
pub use refresh::{needs_refresh, needs_refresh_at};
pub use request::{create_request, responder_url_from, Request};
pub use response::{CertificateStatus, OcspResponse, Response, RevocationReason};
pub use verify::parse_response;
