//! PEM/X.509 decoding of the certificate a device presents for enrollment.

use chrono::{DateTime, Utc};
use pem::{EncodeConfig, LineEnding, Pem};
use sha2::{Digest, Sha256};
use thiserror::Error;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;
use x509_parser::time::ASN1Time;

const CERTIFICATE_TAG: &str = "CERTIFICATE";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CertificateError {
    #[error("certificate is empty")]
    Empty,

    #[error("malformed PEM: {0}")]
    MalformedPem(String),

    #[error("expected exactly one PEM block, found {0}")]
    BlockCount(usize),

    #[error("expected a CERTIFICATE PEM block, found {0}")]
    UnexpectedLabel(String),

    #[error("malformed X.509 certificate: {0}")]
    MalformedDer(String),

    #[error("{0} trailing bytes after the X.509 structure")]
    TrailingData(usize),

    #[error("invalid subject common name: {0}")]
    InvalidCommonName(String),

    #[error("validity timestamp out of range")]
    InvalidValidity,
}

/// A decoded device certificate. Only produced whole by [`parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCertificate {
    /// First CN of the subject, empty when the subject has none.
    pub subject_common_name: String,
    pub subject: String,
    pub issuer: String,
    pub serial_number: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub fingerprint_sha256: String,
    /// The single certificate block, re-encoded with LF line endings.
    pub raw_pem: String,
}

/// Decode `raw` as exactly one PEM `CERTIFICATE` block holding an X.509 certificate.
pub fn parse(raw: &[u8]) -> Result<DeviceCertificate, CertificateError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(CertificateError::Empty);
    }

    let mut blocks =
        pem::parse_many(raw).map_err(|e| CertificateError::MalformedPem(e.to_string()))?;

    let block = match blocks.len() {
        1 => blocks.remove(0),
        0 => {
            return Err(CertificateError::MalformedPem(
                "no PEM block found".to_string(),
            ))
        }
        n => return Err(CertificateError::BlockCount(n)),
    };

    if block.tag() != CERTIFICATE_TAG {
        return Err(CertificateError::UnexpectedLabel(block.tag().to_string()));
    }

    let der = block.contents();
    let (rest, cert) =
        X509Certificate::from_der(der).map_err(|e| CertificateError::MalformedDer(e.to_string()))?;
    if !rest.is_empty() {
        return Err(CertificateError::TrailingData(rest.len()));
    }

    let subject_common_name = match cert.subject().iter_common_name().next() {
        Some(cn) => cn
            .as_str()
            .map_err(|e| CertificateError::InvalidCommonName(e.to_string()))?
            .to_string(),
        None => String::new(),
    };

    let validity = cert.validity();

    Ok(DeviceCertificate {
        subject_common_name,
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        serial_number: cert.raw_serial_as_string(),
        not_before: to_utc(validity.not_before)?,
        not_after: to_utc(validity.not_after)?,
        fingerprint_sha256: hex::encode(Sha256::digest(der)),
        raw_pem: encode_lf(&block),
    })
}

fn to_utc(time: ASN1Time) -> Result<DateTime<Utc>, CertificateError> {
    DateTime::from_timestamp(time.timestamp(), 0).ok_or(CertificateError::InvalidValidity)
}

fn encode_lf(block: &Pem) -> String {
    pem::encode_config(block, EncodeConfig::new().set_line_ending(LineEnding::LF))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

    pub(crate) fn pem_with_cn(cn: &str) -> String {
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, cn);
        dn.push(DnType::OrganizationName, "Sensor Fleet");
        params.distinguished_name = dn;

        let key_pair = KeyPair::generate().unwrap();
        params.self_signed(&key_pair).unwrap().pem()
    }

    #[test]
    fn parses_common_name_and_validity() {
        let cert = parse(pem_with_cn("sensor01").as_bytes()).unwrap();

        assert_eq!(cert.subject_common_name, "sensor01");
        assert!(cert.subject.contains("CN=sensor01"));
        assert!(cert.not_before < cert.not_after);
        assert_eq!(cert.fingerprint_sha256.len(), 64);
        assert!(cert.raw_pem.starts_with("-----BEGIN CERTIFICATE-----\n"));
        assert!(!cert.raw_pem.contains('\r'));
    }

    #[test]
    fn parsing_is_deterministic() {
        let pem = pem_with_cn("sensor01");
        assert_eq!(parse(pem.as_bytes()), parse(pem.as_bytes()));
    }

    #[test]
    fn crlf_input_normalises_to_same_certificate() {
        let pem = pem_with_cn("sensor01");
        let crlf = pem.replace('\n', "\r\n");
        assert_eq!(parse(pem.as_bytes()).unwrap(), parse(crlf.as_bytes()).unwrap());
    }

    #[test]
    fn missing_common_name_is_empty_not_an_error() {
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::OrganizationName, "No CN Inc");
        params.distinguished_name = dn;
        let key_pair = KeyPair::generate().unwrap();
        let pem = params.self_signed(&key_pair).unwrap().pem();

        assert_eq!(parse(pem.as_bytes()).unwrap().subject_common_name, "");
    }

    #[test]
    fn rejects_empty_input() {
        assert_eq!(parse(b""), Err(CertificateError::Empty));
        assert_eq!(parse(b"  \n\t"), Err(CertificateError::Empty));
    }

    #[test]
    fn rejects_text_without_pem_framing() {
        assert!(matches!(
            parse(b"definitely not a certificate"),
            Err(CertificateError::MalformedPem(_))
        ));
    }

    #[test]
    fn rejects_two_certificates() {
        let bundle = format!("{}{}", pem_with_cn("a"), pem_with_cn("b"));
        assert_eq!(parse(bundle.as_bytes()), Err(CertificateError::BlockCount(2)));
    }

    #[test]
    fn rejects_non_certificate_label() {
        let key = KeyPair::generate().unwrap().serialize_pem();
        assert_eq!(
            parse(key.as_bytes()),
            Err(CertificateError::UnexpectedLabel("PRIVATE KEY".to_string()))
        );
    }

    #[test]
    fn rejects_garbage_der() {
        let block = Pem::new(CERTIFICATE_TAG, vec![0x30, 0x03, 0x02, 0x01, 0x00]);
        let text = pem::encode(&block);
        assert!(matches!(
            parse(text.as_bytes()),
            Err(CertificateError::MalformedDer(_))
        ));
    }

    #[test]
    fn rejects_trailing_bytes_after_der() {
        let pem = pem_with_cn("sensor01");
        let mut block = pem::parse(&pem).unwrap().into_contents();
        block.extend_from_slice(&[0, 0]);
        let text = pem::encode(&Pem::new(CERTIFICATE_TAG, block));

        assert_eq!(parse(text.as_bytes()), Err(CertificateError::TrailingData(2)));
    }

    #[test]
    fn normalised_pem_decodes_to_the_fingerprinted_der() {
        let parsed = parse(pem_with_cn("sensor01").as_bytes()).unwrap();

        let block = pem::parse(&parsed.raw_pem).unwrap();
        assert_eq!(block.tag(), CERTIFICATE_TAG);
        assert!(!parsed.raw_pem.contains('\r'));
        assert_eq!(
            hex::encode(Sha256::digest(block.contents())),
            parsed.fingerprint_sha256
        );
    }
}
