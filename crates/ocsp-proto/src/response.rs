//! Parsed OCSP responses and their HTTP caching metadata.

use std::fmt;

use chrono::{DateTime, Utc};

/// Certificate status reported by an OCSP responder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateStatus {
    /// Certificate is not revoked.
    Good,
    /// Certificate has been revoked.
    Revoked {
        /// When the certificate was revoked.
        revoked_at: DateTime<Utc>,
        /// Revocation reason, if the responder supplied one.
        reason: Option<RevocationReason>,
    },
    /// The responder does not know the certificate.
    Unknown,
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertificateStatus::Good => f.write_str("good"),
            CertificateStatus::Revoked { .. } => f.write_str("revoked"),
            CertificateStatus::Unknown => f.write_str("unknown"),
        }
    }
}

/// Revocation reason codes from RFC 5280 section 5.3.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationReason {
    Unspecified,
    KeyCompromise,
    CaCompromise,
    AffiliationChanged,
    Superseded,
    CessationOfOperation,
    CertificateHold,
    RemoveFromCrl,
    PrivilegeWithdrawn,
    AaCompromise,
}

impl RevocationReason {
    /// Maps an RFC 5280 reason code; unassigned codes yield `None`.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Unspecified),
            1 => Some(Self::KeyCompromise),
            2 => Some(Self::CaCompromise),
            3 => Some(Self::AffiliationChanged),
            4 => Some(Self::Superseded),
            5 => Some(Self::CessationOfOperation),
            6 => Some(Self::CertificateHold),
            8 => Some(Self::RemoveFromCrl),
            9 => Some(Self::PrivilegeWithdrawn),
            10 => Some(Self::AaCompromise),
            _ => None,
        }
    }
}

impl fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unspecified => "unspecified",
            Self::KeyCompromise => "keyCompromise",
            Self::CaCompromise => "cACompromise",
            Self::AffiliationChanged => "affiliationChanged",
            Self::Superseded => "superseded",
            Self::CessationOfOperation => "cessationOfOperation",
            Self::CertificateHold => "certificateHold",
            Self::RemoveFromCrl => "removeFromCRL",
            Self::PrivilegeWithdrawn => "privilegeWithdrawn",
            Self::AaCompromise => "aACompromise",
        })
    }
}

/// The decoded and signature-verified content of a `BasicOCSPResponse`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcspResponse {
    /// Status of the queried certificate.
    pub status: CertificateStatus,
    /// When the responder produced this response.
    pub produced_at: DateTime<Utc>,
    /// Start of the validity window.
    pub this_update: DateTime<Utc>,
    /// End of the validity window; `None` when the responder does not
    /// commit to one.
    pub next_update: Option<DateTime<Utc>>,
}

/// A fetched OCSP response together with the HTTP caching metadata of
/// the exchange that produced it.
///
/// `ocsp` is `None` only for cache stubs built by callers (for example
/// an on-disk `.ocsp` file whose bytes no longer parse but whose mtime
/// still serves as a `Last-Modified` validator).
#[derive(Debug, Clone, Default)]
pub struct Response {
    /// Parsed and verified response content.
    pub ocsp: Option<OcspResponse>,
    /// Original DER bytes, for persistence and hook delivery.
    pub raw: Vec<u8>,
    /// Absolute instant at which the HTTP cache entry expires.
    pub max_age: Option<DateTime<Utc>>,
    /// `ETag` validator for conditional refetches.
    pub etag: Option<String>,
    /// `Last-Modified` validator for conditional refetches.
    pub last_modified: Option<DateTime<Utc>>,
}

impl Response {
    /// `nextUpdate` of the parsed response, if any.
    pub fn next_update(&self) -> Option<DateTime<Utc>> {
        self.ocsp.as_ref().and_then(|o| o.next_update)
    }
}
