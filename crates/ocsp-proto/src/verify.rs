//! OCSP response decoding and signature verification.
//!
//! A response is accepted only when its `tbsResponseData` is signed by
//! the issuing CA itself, or by a delegated responder certificate that
//! the issuing CA has signed. This is the issuer verification required
//! of an OCSP client; full chain building is a non-goal.

use chrono::Utc;
use rasn_ocsp as asn;
use ring::signature;
use x509_parser::prelude::*;

use crate::error::VerifyError;
use crate::response::{CertificateStatus, OcspResponse, RevocationReason};

/// Decodes a DER `OCSPResponse`, verifies its signature against
/// `issuer_der`, and returns the summarized single response.
pub fn parse_response(raw: &[u8], issuer_der: &[u8]) -> Result<OcspResponse, VerifyError> {
    let outer: asn::OcspResponse =
        rasn::der::decode(raw).map_err(|e| VerifyError::Decode(e.to_string()))?;

    match outer.status {
        asn::OcspResponseStatus::Successful => {}
        asn::OcspResponseStatus::MalformedRequest => {
            return Err(VerifyError::ResponderStatus("malformedRequest"))
        }
        asn::OcspResponseStatus::InternalError => {
            return Err(VerifyError::ResponderStatus("internalError"))
        }
        asn::OcspResponseStatus::TryLater => {
            return Err(VerifyError::ResponderStatus("tryLater"))
        }
        asn::OcspResponseStatus::SigRequired => {
            return Err(VerifyError::ResponderStatus("sigRequired"))
        }
        asn::OcspResponseStatus::Unauthorized => {
            return Err(VerifyError::ResponderStatus("unauthorized"))
        }
    }

    let response_bytes = outer.bytes.ok_or(VerifyError::MissingResponseBytes)?;
    // id-pkix-ocsp-basic
    if [1, 3, 6, 1, 5, 5, 7, 48, 1, 1] != response_bytes.r#type {
        return Err(VerifyError::UnsupportedResponseType(oid_to_string(
            &response_bytes.r#type,
        )));
    }

    let basic: asn::BasicOcspResponse = rasn::der::decode(&response_bytes.response)
        .map_err(|e| VerifyError::Decode(e.to_string()))?;

    verify_signature(&basic, issuer_der)?;

    let response_data = &basic.tbs_response_data;
    if response_data.responses.len() != 1 {
        return Err(VerifyError::ResponseCount(response_data.responses.len()));
    }
    let single = response_data.responses[0].clone();

    let status = match single.cert_status {
        asn::CertStatus::Good => CertificateStatus::Good,
        asn::CertStatus::Revoked(info) => CertificateStatus::Revoked {
            revoked_at: info.revocation_time.with_timezone(&Utc),
            reason: info
                .revocation_reason
                .map(|r| r as u32)
                .and_then(RevocationReason::from_code),
        },
        asn::CertStatus::Unknown(_) => CertificateStatus::Unknown,
    };

    Ok(OcspResponse {
        status,
        produced_at: response_data.produced_at.with_timezone(&Utc),
        this_update: single.this_update.with_timezone(&Utc),
        next_update: single.next_update.map(|t| t.with_timezone(&Utc)),
    })
}

/// Renders an OID's arcs as a dotted string (e.g. `1.3.6.1.5.5.7.48.1.1`).
fn oid_to_string(oid: &rasn::types::ObjectIdentifier) -> String {
    oid.iter()
        .map(|arc| arc.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

/// Verifies the `BasicOCSPResponse` signature.
///
/// When the response embeds responder certificates, the first one must
/// be signed by the issuer and becomes the signer; otherwise the issuer
/// itself must have signed the response.
fn verify_signature(basic: &asn::BasicOcspResponse, issuer_der: &[u8]) -> Result<(), VerifyError> {
    let tbs = rasn::der::encode(&basic.tbs_response_data)
        .map_err(|e| VerifyError::Decode(e.to_string()))?;
    let sig_alg = oid_to_string(&basic.signature_algorithm.algorithm);
    let sig = basic.signature.as_raw_slice();

    let (_, issuer) = X509Certificate::from_der(issuer_der)
        .map_err(|e| VerifyError::Decode(e.to_string()))?;

    match &basic.certs {
        Some(certs) if !certs.is_empty() => {
            let responder_der = rasn::der::encode(&certs[0])
                .map_err(|e| VerifyError::Decode(e.to_string()))?;
            let (_, responder) = X509Certificate::from_der(&responder_der)
                .map_err(|e| VerifyError::Decode(e.to_string()))?;
            responder
                .verify_signature(Some(issuer.public_key()))
                .map_err(|_| VerifyError::UntrustedResponder)?;
            verify_raw(
                &sig_alg,
                responder.public_key().subject_public_key.data.as_ref(),
                &tbs,
                sig,
            )
        }
        _ => verify_raw(
            &sig_alg,
            issuer.public_key().subject_public_key.data.as_ref(),
            &tbs,
            sig,
        ),
    }
}

/// Raw signature check over the DER `tbsResponseData`, dispatched on the
/// signature algorithm OID.
fn verify_raw(
    sig_alg_oid: &str,
    public_key: &[u8],
    message: &[u8],
    sig: &[u8],
) -> Result<(), VerifyError> {
    let alg: &dyn signature::VerificationAlgorithm = match sig_alg_oid {
        // sha1WithRSAEncryption: still emitted by some responders.
        "1.2.840.113549.1.1.5" => &signature::RSA_PKCS1_1024_8192_SHA1_FOR_LEGACY_USE_ONLY,
        // sha256/384/512WithRSAEncryption
        "1.2.840.113549.1.1.11" => &signature::RSA_PKCS1_2048_8192_SHA256,
        "1.2.840.113549.1.1.12" => &signature::RSA_PKCS1_2048_8192_SHA384,
        "1.2.840.113549.1.1.13" => &signature::RSA_PKCS1_2048_8192_SHA512,
        // ecdsa-with-SHA256 / ecdsa-with-SHA384
        "1.2.840.10045.4.3.2" => &signature::ECDSA_P256_SHA256_ASN1,
        "1.2.840.10045.4.3.3" => &signature::ECDSA_P384_SHA384_ASN1,
        // Ed25519
        "1.3.101.112" => &signature::ED25519,
        other => return Err(VerifyError::UnsupportedAlgorithm(other.to_string())),
    };
    signature::UnparsedPublicKey::new(alg, public_key)
        .verify(message, sig)
        .map_err(|_| VerifyError::BadSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_parse_and_verify_good_response() {
        let pki = testdata::TestPki::new();
        let this_update = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let next_update = this_update + Duration::hours(96);
        let raw = testdata::signed_ocsp_response(
            &pki,
            testdata::FixtureStatus::Good,
            this_update,
            Some(next_update),
        );

        let parsed = parse_response(&raw, &pki.ca_der).unwrap();
        assert_eq!(parsed.status, CertificateStatus::Good);
        assert_eq!(parsed.this_update, this_update);
        assert_eq!(parsed.next_update, Some(next_update));
        assert_eq!(parsed.produced_at, this_update);
    }

    #[test]
    fn test_parse_revoked_response() {
        let pki = testdata::TestPki::new();
        let this_update = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let raw = testdata::signed_ocsp_response(
            &pki,
            testdata::FixtureStatus::Revoked {
                revoked_at: this_update - Duration::hours(1),
                reason_code: 1,
            },
            this_update,
            None,
        );

        let parsed = parse_response(&raw, &pki.ca_der).unwrap();
        assert_eq!(parsed.next_update, None);
        match parsed.status {
            CertificateStatus::Revoked { revoked_at, reason } => {
                assert_eq!(revoked_at, this_update - Duration::hours(1));
                assert_eq!(reason, Some(RevocationReason::KeyCompromise));
            }
            other => panic!("want revoked, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let pki = testdata::TestPki::new();
        let other = testdata::TestPki::new_with_name("Other CA");
        let this_update = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let raw = testdata::signed_ocsp_response(
            &pki,
            testdata::FixtureStatus::Good,
            this_update,
            None,
        );

        match parse_response(&raw, &other.ca_der) {
            Err(VerifyError::BadSignature) => {}
            other => panic!("want BadSignature, got {other:?}"),
        }
    }

    #[test]
    fn test_garbage_rejected() {
        let pki = testdata::TestPki::new();
        match parse_response(b"not an ocsp response", &pki.ca_der) {
            Err(VerifyError::Decode(_)) => {}
            other => panic!("want Decode error, got {other:?}"),
        }
    }

    #[test]
    fn test_non_successful_status_rejected() {
        let pki = testdata::TestPki::new();
        let raw = testdata::try_later_response();
        match parse_response(&raw, &pki.ca_der) {
            Err(VerifyError::ResponderStatus("tryLater")) => {}
            other => panic!("want tryLater, got {other:?}"),
        }
    }
}
