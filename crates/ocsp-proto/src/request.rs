//! OCSP request construction (RFC 6960) with the lightweight profile of
//! RFC 5019.
//!
//! A [`Request`] captures everything needed to query a responder for one
//! certificate: the endpoint URL (with the DER request folded into the
//! path for the GET form), the optional POST body, the certificate pair's
//! expiry, and the issuer certificate used later to verify the response
//! signature.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use num_bigint::{BigInt, Sign};
use percent_encoding::{percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rasn::types::{Any, Integer, ObjectIdentifier, Oid};
use rasn_ocsp::{CertId, OcspRequest, Request as SingleRequest, TbsRequest};
use rasn_pkix::AlgorithmIdentifier;
use sha1::{Digest, Sha1};
use x509_parser::oid_registry::OID_PKIX_ACCESS_DESCRIPTOR_OCSP;
use x509_parser::prelude::*;

use crate::error::RequestError;

/// RFC 5019 section 5: a GET request URL may not exceed 255 bytes.
const MAX_GET_URL_LEN: usize = 255;

/// Everything except unreserved characters is percent-encoded when the
/// base64 request is folded into the GET URL.
const QUERY_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// A prepared OCSP query for a single certificate.
///
/// The query itself is immutable; two requests are interchangeable when
/// their URL and body match, which is what [`Request::is_equivalent`]
/// checks.
#[derive(Debug, Clone)]
pub struct Request {
    url: String,
    /// `Some` selects POST, `None` selects GET (the DER request is then
    /// already encoded into `url`).
    body: Option<Vec<u8>>,
    /// The earlier of the certificate's and the issuer's `notAfter`.
    not_after: DateTime<Utc>,
    /// DER of the issuer certificate, kept to verify response signatures.
    issuer_der: Vec<u8>,
}

impl Request {
    /// The responder URL; for the GET form this includes the encoded
    /// request as the final path segment.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The DER-encoded OCSP request for the POST form, `None` for GET.
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Expiry of the monitored certificate pair.
    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// DER of the issuer certificate.
    pub fn issuer_der(&self) -> &[u8] {
        &self.issuer_der
    }

    /// Whether `self` and `other` denote the same OCSP query.
    ///
    /// The issuers need not be compared: their identity is already baked
    /// into the URL or body via the `CertID` hashes.
    pub fn is_equivalent(&self, other: &Request) -> bool {
        self.url == other.url && self.body == other.body
    }
}

/// Builds the [`Request`] for `cert` issued by `issuer` (both DER).
///
/// When `responder_url` is `None` the URL is taken from the leaf's
/// Authority Information Access extension, falling back to the
/// issuer's. Fails with [`RequestError::NoResponderUrl`] when neither
/// carries one.
///
/// The GET form is preferred whenever the resulting URL fits in 255
/// bytes, per RFC 5019; larger requests fall back to POST.
pub fn create_request(
    cert_der: &[u8],
    issuer_der: &[u8],
    responder_url: Option<&str>,
) -> Result<Request, RequestError> {
    let (_, cert) = X509Certificate::from_der(cert_der)
        .map_err(|e| RequestError::BadCertificate(e.to_string()))?;
    let (_, issuer) = X509Certificate::from_der(issuer_der)
        .map_err(|e| RequestError::BadCertificate(e.to_string()))?;

    let responder = match responder_url {
        Some(u) if !u.is_empty() => u.to_string(),
        _ => responder_url_from(&cert)
            .or_else(|| responder_url_from(&issuer))
            .ok_or(RequestError::NoResponderUrl)?,
    };

    let der = encode_ocsp_request(&cert, &issuer)?;

    let not_after = {
        let cert_exp = cert.validity().not_after.timestamp();
        let issuer_exp = issuer.validity().not_after.timestamp();
        DateTime::from_timestamp(cert_exp.min(issuer_exp), 0)
            .ok_or_else(|| RequestError::BadCertificate("notAfter out of range".into()))?
    };

    let mut get_url = responder.clone();
    if !get_url.ends_with('/') {
        get_url.push('/');
    }
    get_url.push_str(&percent_encode(BASE64_STANDARD.encode(&der).as_bytes(), QUERY_ESCAPE).to_string());

    if get_url.len() <= MAX_GET_URL_LEN {
        Ok(Request {
            url: get_url,
            body: None,
            not_after,
            issuer_der: issuer_der.to_vec(),
        })
    } else {
        Ok(Request {
            url: responder,
            body: Some(der),
            not_after,
            issuer_der: issuer_der.to_vec(),
        })
    }
}

/// First `http(s)` OCSP responder URL from the certificate's Authority
/// Information Access extension, if any.
pub fn responder_url_from(cert: &X509Certificate) -> Option<String> {
    cert.extensions()
        .iter()
        .find_map(|ext| match ext.parsed_extension() {
            ParsedExtension::AuthorityInfoAccess(aia) => Some(aia),
            _ => None,
        })?
        .accessdescs
        .iter()
        .filter(|desc| desc.access_method == OID_PKIX_ACCESS_DESCRIPTOR_OCSP)
        .find_map(|desc| match desc.access_location {
            GeneralName::URI(uri)
                if has_http_scheme(uri) && url::Url::parse(uri).is_ok() =>
            {
                Some(uri.to_string())
            }
            _ => None,
        })
}

fn has_http_scheme(uri: &str) -> bool {
    let lower = uri.get(..8).map(str::to_ascii_lowercase).unwrap_or_default();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// DER-encodes an unsigned single-certificate OCSP request.
///
/// The `CertID` uses SHA-1 hashes of the issuer name and key: the
/// lightweight profile responders (notably Let's Encrypt) answer
/// pre-computed SHA-1 `CertID`s only, and the hash carries no
/// cryptographic weight here.
fn encode_ocsp_request(
    cert: &X509Certificate,
    issuer: &X509Certificate,
) -> Result<Vec<u8>, RequestError> {
    let sha1_oid = Oid::new(&[1, 3, 14, 3, 2, 26])
        .ok_or_else(|| RequestError::Encode("bad hash algorithm oid".into()))?;
    // Many responders insist on explicit NULL parameters here.
    let null_params = Any::new(
        rasn::der::encode(&()).map_err(|e| RequestError::Encode(e.to_string()))?,
    );

    let issuer_name_hash = Sha1::digest(cert.issuer().as_raw());
    let issuer_key_hash = Sha1::digest(issuer.public_key().subject_public_key.data.as_ref());

    let req_cert = CertId {
        hash_algorithm: AlgorithmIdentifier {
            algorithm: ObjectIdentifier::from(sha1_oid),
            parameters: Some(null_params),
        },
        issuer_name_hash: bytes::Bytes::copy_from_slice(&issuer_name_hash),
        issuer_key_hash: bytes::Bytes::copy_from_slice(&issuer_key_hash),
        serial_number: BigInt::from_bytes_be(Sign::Plus, cert.raw_serial()),
    };

    let request = OcspRequest {
        tbs_request: TbsRequest {
            version: Integer::from(0),
            requestor_name: None,
            request_list: vec![SingleRequest {
                req_cert,
                single_request_extensions: None,
            }],
            request_extensions: None,
        },
        optional_signature: None,
    };

    rasn::der::encode(&request).map_err(|e| RequestError::Encode(e.to_string()))
}
