//! Certificate bundle parsing.
//!
//! Server certificate bundles commonly hold the whole chain (and often
//! the private key and DH parameters) in one PEM file. Only the first
//! certificate and its issuer matter here: the leaf is whatever
//! CERTIFICATE block comes first, the issuer is the first later block
//! whose key verifies the leaf's signature. When the bundle holds no
//! issuer, a `<bundle>.issuer` side file is consulted.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use x509_parser::pem::Pem;
use x509_parser::prelude::*;

/// Errors raised while extracting a certificate pair from a bundle.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The bundle contains no CERTIFICATE block.
    #[error("no certificate found in bundle")]
    NoCertificate,

    /// Neither the bundle nor the `.issuer` side file contains the
    /// issuing certificate of the leaf.
    #[error("no issuer certificate found")]
    NoIssuer,

    /// A CERTIFICATE block failed X.509 parsing.
    #[error("bad certificate in bundle: {0}")]
    BadCertificate(String),
}

/// The leaf certificate and its issuer, both DER.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub cert_der: Vec<u8>,
    pub issuer_der: Vec<u8>,
}

/// Parses a PEM bundle into leaf + issuer.
pub fn parse_certificate_bundle(path: &Path) -> Result<Bundle, BundleError> {
    let data = fs::read(path)?;

    let mut leaf: Option<Vec<u8>> = None;
    for der in certificate_blocks(&data)? {
        match leaf.take() {
            None => leaf = Some(der),
            Some(leaf_der) => {
                if signed_by(&leaf_der, &der)? {
                    return Ok(Bundle {
                        cert_der: leaf_der,
                        issuer_der: der,
                    });
                }
                leaf = Some(leaf_der);
            }
        }
    }
    let cert_der = leaf.ok_or(BundleError::NoCertificate)?;

    // The bundle holds no issuer; look for a side file.
    let issuer_path = issuer_file(path);
    let data = match fs::read(&issuer_path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(BundleError::NoIssuer)
        }
        Err(e) => return Err(e.into()),
    };
    for der in certificate_blocks(&data)? {
        if signed_by(&cert_der, &der)? {
            return Ok(Bundle {
                cert_der,
                issuer_der: der,
            });
        }
    }
    Err(BundleError::NoIssuer)
}

/// `<bundle>.issuer`, the conventional side file for a detached issuer
/// certificate.
pub fn issuer_file(bundle: &Path) -> PathBuf {
    let mut os = bundle.as_os_str().to_os_string();
    os.push(".issuer");
    PathBuf::from(os)
}

/// All CERTIFICATE blocks in `data`, in order. Other block types are
/// skipped; a malformed block ends the scan.
fn certificate_blocks(data: &[u8]) -> Result<Vec<Vec<u8>>, BundleError> {
    let mut blocks = Vec::new();
    for pem in Pem::iter_from_buffer(data) {
        let Ok(pem) = pem else { break };
        if pem.label == "CERTIFICATE" {
            blocks.push(pem.contents);
        }
    }
    Ok(blocks)
}

/// Whether `candidate_der` names and signs `cert_der`.
fn signed_by(cert_der: &[u8], candidate_der: &[u8]) -> Result<bool, BundleError> {
    let (_, cert) = X509Certificate::from_der(cert_der)
        .map_err(|e| BundleError::BadCertificate(e.to_string()))?;
    let Ok((_, candidate)) = X509Certificate::from_der(candidate_der) else {
        return Ok(false);
    };
    if cert.issuer().as_raw() != candidate.subject().as_raw() {
        return Ok(false);
    }
    Ok(cert
        .verify_signature(Some(candidate.public_key()))
        .is_ok())
}
