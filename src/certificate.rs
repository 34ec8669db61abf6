//! Certificate material handling.
//!
//! Just enough X.509 to name a certificate and tell the provider what it
//! covers. No chain validation, no expiry enforcement: issuance already
//! happened and the provider will reject anything broken.

use crate::error::DeployError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::BufReader;
use std::sync::atomic::{AtomicU64, Ordering};
use x509_parser::extensions::GeneralName;

/// What we learned from the leaf certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateSummary {
    /// Subject CN, or the first DNS SAN when the subject has none.
    pub common_name: String,
    pub dns_names: Vec<String>,
    /// Serial number (hex, colon-separated).
    pub serial: String,
    /// Unix timestamp (seconds).
    pub not_after: i64,
    /// SHA-256 of the leaf DER (hex).
    pub fingerprint: String,
}

/// How uploaded certificates are named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertNaming {
    /// `{prefix}-{unix_millis}`, unique per process.
    #[default]
    Timestamp,
    /// `{prefix}-{first 16 hex of sha256(leaf DER)}`, stable per certificate.
    ContentHash,
}

/// PEM pair plus everything an uploader needs to register it.
#[derive(Clone)]
pub struct CertificateBundle {
    pub cert_pem: String,
    pub key_pem: String,
    pub summary: CertificateSummary,
    /// Generated provider-side label.
    pub name: String,
}

impl std::fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("name", &self.name)
            .field("summary", &self.summary)
            .field("key_pem", &"<redacted>")
            .finish()
    }
}

impl CertificateBundle {
    /// Parse and name a PEM pair. Fails before any network call.
    pub fn prepare(
        cert_pem: &str,
        key_pem: &str,
        prefix: &str,
        naming: CertNaming,
    ) -> Result<Self, DeployError> {
        let summary = parse_certificate(cert_pem)?;
        validate_private_key(key_pem)?;
        let name = generate_cert_name(prefix, naming, &summary);

        Ok(Self {
            cert_pem: cert_pem.to_string(),
            key_pem: key_pem.to_string(),
            summary,
            name,
        })
    }
}

/// Parse the first certificate of a PEM chain.
pub fn parse_certificate(cert_pem: &str) -> Result<CertificateSummary, DeployError> {
    let mut reader = BufReader::new(cert_pem.as_bytes());
    let der = rustls_pemfile::certs(&mut reader)
        .next()
        .ok_or_else(|| DeployError::Certificate("no certificate found in PEM".into()))?
        .map_err(|e| DeployError::Certificate(format!("invalid PEM: {}", e)))?;

    let (_, cert) = x509_parser::parse_x509_certificate(der.as_ref())
        .map_err(|e| DeployError::Certificate(format!("invalid X.509: {}", e)))?;

    let dns_names: Vec<String> = match cert.subject_alternative_name() {
        Ok(Some(san)) => san
            .value
            .general_names
            .iter()
            .filter_map(|name| match name {
                GeneralName::DNSName(dns) => Some(dns.to_string()),
                _ => None,
            })
            .collect(),
        Ok(None) => Vec::new(),
        Err(e) => {
            return Err(DeployError::Certificate(format!(
                "invalid subjectAltName: {}",
                e
            )))
        }
    };

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string)
        .or_else(|| dns_names.first().cloned())
        .ok_or_else(|| {
            DeployError::Certificate("certificate has neither CN nor DNS SAN".into())
        })?;

    Ok(CertificateSummary {
        common_name,
        dns_names,
        serial: cert.raw_serial_as_string(),
        not_after: cert.validity().not_after.timestamp(),
        fingerprint: hex::encode(Sha256::digest(der.as_ref())),
    })
}

/// Make sure the key PEM actually contains a private key.
pub fn validate_private_key(key_pem: &str) -> Result<(), DeployError> {
    let mut reader = BufReader::new(key_pem.as_bytes());
    match rustls_pemfile::private_key(&mut reader) {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(DeployError::Certificate(
            "no private key found in PEM".into(),
        )),
        Err(e) => Err(DeployError::Certificate(format!(
            "invalid private key PEM: {}",
            e
        ))),
    }
}

/// Generate the provider-side certificate label.
pub fn generate_cert_name(prefix: &str, naming: CertNaming, summary: &CertificateSummary) -> String {
    match naming {
        CertNaming::Timestamp => format!("{}-{}", prefix, next_unique_millis()),
        CertNaming::ContentHash => format!("{}-{}", prefix, &summary.fingerprint[..16]),
    }
}

static LAST_NAME_MILLIS: AtomicU64 = AtomicU64::new(0);

/// Wall-clock millis, bumped so two calls never return the same value.
fn next_unique_millis() -> u64 {
    let now = crate::state::current_unix_millis();
    let mut last = LAST_NAME_MILLIS.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_NAME_MILLIS.compare_exchange_weak(last, next, Ordering::SeqCst, Ordering::Relaxed)
        {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}
