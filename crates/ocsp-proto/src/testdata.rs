//! Shared fixtures for in-crate tests: a pinned public certificate
//! chain and a miniature PKI able to sign OCSP responses.

use chrono::{DateTime, FixedOffset, Utc};
use num_bigint::BigInt;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::pkcs8::DecodePrivateKey;
use rasn::types::{Any, BitString, Integer, ObjectIdentifier, OctetString, Oid};
use rasn_ocsp::{
    BasicOcspResponse, CertId, CertStatus, OcspResponse, OcspResponseStatus, ResponderId,
    ResponseBytes, ResponseData, RevokedInfo, SingleResponse,
};
use rasn_pkix::AlgorithmIdentifier;
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};
use sha1::{Digest, Sha1};
use x509_parser::prelude::*;

/// A public Let's Encrypt chain (leaf for `icp2.io` plus the R3
/// intermediate), used where tests need a certificate with a real
/// OCSP responder URL in its AIA extension.
pub(crate) const CHAIN_PEM: &[u8] = b"-----BEGIN CERTIFICATE-----
MIIEGzCCAwOgAwIBAgISA6Lvz+ctYY3QxsH2Wtl15VliMA0GCSqGSIb3DQEBCwUA
MDIxCzAJBgNVBAYTAlVTMRYwFAYDVQQKEw1MZXQncyBFbmNyeXB0MQswCQYDVQQD
EwJSMzAeFw0yNDA1MjIxODQxNTNaFw0yNDA4MjAxODQxNTJaMBIxEDAOBgNVBAMT
B2ljcDIuaW8wWTATBgcqhkjOPQIBBggqhkjOPQMBBwNCAASQ0Cs7rk/cMH9fVV1w
RWDruLIRXFunNbBt1DhEneLJyox1gViQ4PUjdclH4SjBtuM4GEYgsqtfjtVmUEZD
LjDno4ICFDCCAhAwDgYDVR0PAQH/BAQDAgeAMB0GA1UdJQQWMBQGCCsGAQUFBwMB
BggrBgEFBQcDAjAMBgNVHRMBAf8EAjAAMB0GA1UdDgQWBBT6I71UZqu4cBfDD/pw
s2RrfxFTIzAfBgNVHSMEGDAWgBQULrMXt1hWy65QCUDmH6+dixTCxjBVBggrBgEF
BQcBAQRJMEcwIQYIKwYBBQUHMAGGFWh0dHA6Ly9yMy5vLmxlbmNyLm9yZzAiBggr
BgEFBQcwAoYWaHR0cDovL3IzLmkubGVuY3Iub3JnLzAdBgNVHREEFjAUggkqLmlj
cDIuaW+CB2ljcDIuaW8wEwYDVR0gBAwwCjAIBgZngQwBAgEwggEEBgorBgEEAdZ5
AgQCBIH1BIHyAPAAdgA/F0tP1yJHWJQdZRyEvg0S7ZA3fx+FauvBvyiF7PhkbgAA
AY+h0wjrAAAEAwBHMEUCIEgf/wjunpqoG09SbIyHc4qDdMiOdAlaQkwJtUcGq85h
AiEA+3Sw0q0bayIl+Ax6+VLFWICCnqXUo6xlUvom1v4RAO8AdgB2/4g/Crb7lVHC
Ycz1h7o0tKTNuyncaEIKn+ZnTFo6dAAAAY+h0wkvAAAEAwBHMEUCIQCVHm3eG98z
H3yULVe5dp/+chkCWHP3DW4rV5RQHh2ChAIgKTv4SRNtvZsCA6/urtZeaaXmTe13
+kQW72HPScbzNSEwDQYJKoZIhvcNAQELBQADggEBAJ5jnRYWQrBz0INPtRxQ5GEJ
Sfd49/q5ybEnAKFLt1nurOgUBnEa6H3m8J8VGnuRHwHQhEwtNRgMYjkOvdhfU633
17hfr3ZizpD3S+ZHgcMeI9uzUg58GLxqD8Gj2bS4jRgjWFxVEJ71KPimRgata0iN
A0SMlr2ZwQWgccxv+jLuVbDOvPMmlhKRr9iBSeMKl7goRPl4uIcWJmhXS/8jOcGY
KzEI8pX097kn6e2kmHF8KrfH57YrJ2g2/dJ/XZA7SR6UCIFRZL83/J+WjlZKL5hO
vABp2wcEodYUslfJHEY8u6uYZNXMyUO1j3xYwWE6W7m0IMRR03xCJdeAV+kAPDA=
-----END CERTIFICATE-----
-----BEGIN CERTIFICATE-----
MIIFFjCCAv6gAwIBAgIRAJErCErPDBinU/bWLiWnX1owDQYJKoZIhvcNAQELBQAw
TzELMAkGA1UEBhMCVVMxKTAnBgNVBAoTIEludGVybmV0IFNlY3VyaXR5IFJlc2Vh
cmNoIEdyb3VwMRUwEwYDVQQDEwxJU1JHIFJvb3QgWDEwHhcNMjAwOTA0MDAwMDAw
WhcNMjUwOTE1MTYwMDAwWjAyMQswCQYDVQQGEwJVUzEWMBQGA1UEChMNTGV0J3Mg
RW5jcnlwdDELMAkGA1UEAxMCUjMwggEiMA0GCSqGSIb3DQEBAQUAA4IBDwAwggEK
AoIBAQC7AhUozPaglNMPEuyNVZLD+ILxmaZ6QoinXSaqtSu5xUyxr45r+XXIo9cP
R5QUVTVXjJ6oojkZ9YI8QqlObvU7wy7bjcCwXPNZOOftz2nwWgsbvsCUJCWH+jdx
sxPnHKzhm+/b5DtFUkWWqcFTzjTIUu61ru2P3mBw4qVUq7ZtDpelQDRrK9O8Zutm
NHz6a4uPVymZ+DAXXbpyb/uBxa3Shlg9F8fnCbvxK/eG3MHacV3URuPMrSXBiLxg
Z3Vms/EY96Jc5lP/Ooi2R6X/ExjqmAl3P51T+c8B5fWmcBcUr2Ok/5mzk53cU6cG
/kiFHaFpriV1uxPMUgP17VGhi9sVAgMBAAGjggEIMIIBBDAOBgNVHQ8BAf8EBAMC
AYYwHQYDVR0lBBYwFAYIKwYBBQUHAwIGCCsGAQUFBwMBMBIGA1UdEwEB/wQIMAYB
Af8CAQAwHQYDVR0OBBYEFBQusxe3WFbLrlAJQOYfr52LFMLGMB8GA1UdIwQYMBaA
FHm0WeZ7tuXkAXOACIjIGlj26ZtuMDIGCCsGAQUFBwEBBCYwJDAiBggrBgEFBQcw
AoYWaHR0cDovL3gxLmkubGVuY3Iub3JnLzAnBgNVHR8EIDAeMBygGqAYhhZodHRw
Oi8veDEuYy5sZW5jci5vcmcvMCIGA1UdIAQbMBkwCAYGZ4EMAQIBMA0GCysGAQQB
gt8TAQEBMA0GCSqGSIb3DQEBCwUAA4ICAQCFyk5HPqP3hUSFvNVneLKYY611TR6W
PTNlclQtgaDqw+34IL9fzLdwALduO/ZelN7kIJ+m74uyA+eitRY8kc607TkC53wl
ikfmZW4/RvTZ8M6UK+5UzhK8jCdLuMGYL6KvzXGRSgi3yLgjewQtCPkIVz6D2QQz
CkcheAmCJ8MqyJu5zlzyZMjAvnnAT45tRAxekrsu94sQ4egdRCnbWSDtY7kh+BIm
lJNXoB1lBMEKIq4QDUOXoRgffuDghje1WrG9ML+Hbisq/yFOGwXD9RiX8F6sw6W4
avAuvDszue5L3sz85K+EC4Y/wFVDNvZo4TYXao6Z0f+lQKc0t8DQYzk1OXVu8rp2
yJMC6alLbBfODALZvYH7n7do1AZls4I9d1P4jnkDrQoxB3UqQ9hVl3LEKQ73xF1O
yK5GhDDX8oVfGKF5u+decIsH4YaTw7mP3GFxJSqv3+0lUFJoi5Lc5da149p90Ids
hCExroL1+7mryIkXPeFM5TgO9r0rvZaBFOvV2z0gp35Z0+L4WPlbuEjN/lxPFin+
HlUjr8gRsI3qfJOQFy/9rKIJR0Y/8Omwt/8oTWgy1mdeHmmjk7j1nYsvC9JSQ6Zv
MldlTTKB3zhThV1+XWYp6rjd5JW1zbVWEkLNxE7GJThEUG3szgBVGP7pSWTUTsqX
nLRbwHOoq7hHwg==
-----END CERTIFICATE-----
";

/// DER certificates from [`CHAIN_PEM`], in file order (leaf first).
pub(crate) fn chain_der() -> Vec<Vec<u8>> {
    Pem::iter_from_buffer(CHAIN_PEM)
        .map(|pem| pem.expect("valid test PEM").contents)
        .collect()
}

/// A freshly minted self-signed CA certificate (DER) and its key pair.
pub(crate) fn self_signed_ca(common_name: &str) -> (Vec<u8>, KeyPair) {
    let key = KeyPair::generate().expect("generate CA key");
    let mut params = CertificateParams::new(Vec::new()).expect("CA params");
    params.distinguished_name.push(DnType::CommonName, common_name);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let cert = params.self_signed(&key).expect("self-sign CA");
    (cert.der().to_vec(), key)
}

/// A single-CA test PKI whose key can sign OCSP responses directly.
pub(crate) struct TestPki {
    pub ca_der: Vec<u8>,
    pub ca_key: SigningKey,
}

impl TestPki {
    pub fn new() -> Self {
        Self::new_with_name("OCSP Test CA")
    }

    pub fn new_with_name(common_name: &str) -> Self {
        let (ca_der, rcgen_key) = self_signed_ca(common_name);
        // rcgen's default algorithm is ECDSA P-256; reuse the same key
        // for signing response fixtures.
        let ca_key = SigningKey::from_pkcs8_der(&rcgen_key.serialize_der())
            .expect("import CA key as p256");
        TestPki { ca_der, ca_key }
    }

    fn key_hash(&self) -> Vec<u8> {
        let (_, ca) = X509Certificate::from_der(&self.ca_der).unwrap();
        Sha1::digest(ca.public_key().subject_public_key.data.as_ref()).to_vec()
    }
}

/// Certificate status to embed in a response fixture.
pub(crate) enum FixtureStatus {
    Good,
    Revoked {
        revoked_at: DateTime<Utc>,
        reason_code: u32,
    },
}

fn generalized(t: DateTime<Utc>) -> DateTime<FixedOffset> {
    t.with_timezone(&FixedOffset::east_opt(0).unwrap())
}

fn sha1_cert_id() -> CertId {
    let sha1_oid = Oid::new(&[1, 3, 14, 3, 2, 26]).unwrap();
    CertId {
        hash_algorithm: AlgorithmIdentifier {
            algorithm: ObjectIdentifier::from(sha1_oid),
            parameters: Some(Any::new(rasn::der::encode(&()).unwrap())),
        },
        issuer_name_hash: OctetString::from(vec![0u8; 20]),
        issuer_key_hash: OctetString::from(vec![0u8; 20]),
        serial_number: BigInt::from(1),
    }
}

/// Builds a DER `OCSPResponse` signed by the PKI's CA key with
/// `ecdsa-with-SHA256`. `produced_at` equals `this_update`.
pub(crate) fn signed_ocsp_response(
    pki: &TestPki,
    status: FixtureStatus,
    this_update: DateTime<Utc>,
    next_update: Option<DateTime<Utc>>,
) -> Vec<u8> {
    let cert_status = match status {
        FixtureStatus::Good => CertStatus::Good,
        FixtureStatus::Revoked {
            revoked_at,
            reason_code,
        } => CertStatus::Revoked(RevokedInfo {
            revocation_time: generalized(revoked_at),
            revocation_reason: crl_reason(reason_code),
        }),
    };

    let tbs_response_data = ResponseData {
        version: Integer::from(0),
        responder_id: ResponderId::ByKey(OctetString::from(pki.key_hash())),
        produced_at: generalized(this_update),
        responses: vec![SingleResponse {
            cert_id: sha1_cert_id(),
            cert_status,
            this_update: generalized(this_update),
            next_update: next_update.map(generalized),
            single_extensions: None,
        }],
        response_extensions: None,
    };

    let tbs = rasn::der::encode(&tbs_response_data).unwrap();
    let sig: Signature = pki.ca_key.sign(&tbs);
    let sig_der = sig.to_der();

    let ecdsa_sha256 = Oid::new(&[1, 2, 840, 10045, 4, 3, 2]).unwrap();
    let basic = BasicOcspResponse {
        tbs_response_data,
        signature_algorithm: AlgorithmIdentifier {
            algorithm: ObjectIdentifier::from(ecdsa_sha256),
            parameters: None,
        },
        signature: BitString::from_slice(sig_der.as_bytes()),
        certs: None,
    };

    wrap_basic(&basic)
}

fn wrap_basic(basic: &BasicOcspResponse) -> Vec<u8> {
    let basic_oid = Oid::new(&[1, 3, 6, 1, 5, 5, 7, 48, 1, 1]).unwrap();
    let outer = OcspResponse {
        status: OcspResponseStatus::Successful,
        bytes: Some(ResponseBytes {
            r#type: ObjectIdentifier::from(basic_oid),
            response: OctetString::from(rasn::der::encode(basic).unwrap()),
        }),
    };
    rasn::der::encode(&outer).unwrap()
}

/// A bare `tryLater` responder error.
pub(crate) fn try_later_response() -> Vec<u8> {
    let outer = OcspResponse {
        status: OcspResponseStatus::TryLater,
        bytes: None,
    };
    rasn::der::encode(&outer).unwrap()
}

fn crl_reason(code: u32) -> Option<rasn_pkix::CrlReason> {
    match code {
        0 => Some(rasn_pkix::CrlReason::Unspecified),
        1 => Some(rasn_pkix::CrlReason::KeyCompromise),
        4 => Some(rasn_pkix::CrlReason::Superseded),
        _ => None,
    }
}
