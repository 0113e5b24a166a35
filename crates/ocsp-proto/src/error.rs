//! Error types for OCSP request construction, fetching, and validation.

use thiserror::Error;

/// Errors raised while building an OCSP request from a certificate pair.
#[derive(Debug, Error)]
pub enum RequestError {
    /// Neither the certificate nor its issuer carries a usable
    /// `http(s)` OCSP responder URL in its Authority Information
    /// Access extension.
    #[error("no OCSP responder URL in certificate or issuer")]
    NoResponderUrl,

    /// The certificate or issuer could not be parsed.
    #[error("bad certificate: {0}")]
    BadCertificate(String),

    /// DER encoding of the OCSP request failed.
    #[error("failed to encode OCSP request: {0}")]
    Encode(String),
}

/// Errors raised while decoding and verifying an OCSP response.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The response is not a well-formed `OCSPResponse` /
    /// `BasicOCSPResponse` DER structure.
    #[error("malformed OCSP response: {0}")]
    Decode(String),

    /// The responder answered with a non-successful protocol status
    /// (`tryLater`, `unauthorized`, ...).
    #[error("OCSP responder status: {0}")]
    ResponderStatus(&'static str),

    /// A successful response carried no `responseBytes`.
    #[error("OCSP response has no response bytes")]
    MissingResponseBytes,

    /// `responseType` is not `id-pkix-ocsp-basic`.
    #[error("unsupported OCSP response type: {0}")]
    UnsupportedResponseType(String),

    /// The response must contain exactly one `SingleResponse`.
    #[error("OCSP response contains {0} single responses, want 1")]
    ResponseCount(usize),

    /// The delegated responder certificate is not signed by the issuer.
    #[error("OCSP responder certificate not issued by the CA")]
    UntrustedResponder,

    /// The signature algorithm is not supported for verification.
    #[error("unsupported OCSP signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The signature over `tbsResponseData` did not verify.
    #[error("OCSP response signature verification failed")]
    BadSignature,
}

/// An error reported by the HTTP transport underneath the fetcher.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Errors surfaced by [`crate::Fetcher`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// The certificate (or its issuer) is already expired; no query
    /// was attempted.
    #[error("certificate is expired")]
    CertExpired,

    /// The HTTP client failed to carry out the exchange.
    #[error("http transport: {0}")]
    Transport(#[from] TransportError),

    /// The responder answered with a status other than 200 or 304.
    #[error("bad http status: {0}")]
    BadHttpStatus(u16),

    /// The response has no `Content-Type` header.
    #[error("no response content-type")]
    NoContentType,

    /// The response `Content-Type` is not exactly
    /// `application/ocsp-response`.
    #[error("bad response content-type: {0}")]
    BadContentType(String),

    /// The body failed OCSP decoding or signature verification.
    #[error("bad OCSP response: {0}")]
    BadOcspResponse(#[from] VerifyError),
}
