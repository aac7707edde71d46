//! The set of CA certificates trusted for validating material received from
//! other federation members.

use tracing::{debug, warn};

use crate::cert::Certificate;
use crate::error::{CaError, Result};
use crate::pem_utils::pem_blocks;

/// Trusted CA certificates, deduplicated by DER encoding.
///
/// Order carries no meaning; certificates are kept in the order first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationBundle {
    certificates: Vec<Certificate>,
}

impl ValidationBundle {
    /// Adds `certificate` unless an identical one is already present.
    /// Returns whether it was added.
    pub fn insert(&mut self, certificate: Certificate) -> bool {
        if self.contains(&certificate) {
            return false;
        }
        self.certificates.push(certificate);
        true
    }

    pub fn contains(&self, certificate: &Certificate) -> bool {
        self.certificates
            .iter()
            .any(|trusted| trusted.to_der() == certificate.to_der())
    }

    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }

    pub fn iter(&self) -> impl Iterator<Item = &Certificate> {
        self.certificates.iter()
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    /// Returns the trusted CA whose key produced `certificate`'s signature.
    pub fn find_issuer(&self, certificate: &Certificate) -> Option<&Certificate> {
        let issuer_name = &certificate.inner.tbs_certificate.issuer;
        self.certificates
            .iter()
            .filter(|ca| &ca.inner.tbs_certificate.subject == issuer_name)
            .find(|ca| certificate.verify_signed_by(ca).is_ok())
    }

    /// Encodes every certificate as concatenated PEM blocks.
    pub fn to_pem(&self) -> String {
        self.certificates.iter().map(Certificate::to_pem).collect()
    }
}

impl<'a> IntoIterator for &'a ValidationBundle {
    type Item = &'a Certificate;
    type IntoIter = std::slice::Iter<'a, Certificate>;

    fn into_iter(self) -> Self::IntoIter {
        self.certificates.iter()
    }
}

/// Builds a validation bundle from successive PEM blocks.
///
/// Fails with [`CaError::Decode`] only when `input` holds no decodable PEM
/// block at all. Past that the load is best effort: blocks whose PEM armour
/// or base64 is malformed are passed over, certificates without the CA basic
/// constraint are skipped, and the first block that does not parse as a
/// certificate ends the scan. Blocks after it are dropped even when they are
/// valid.
pub fn load_validation_bundle(input: &[u8]) -> Result<ValidationBundle> {
    let mut blocks = pem_blocks(input).peekable();
    if blocks.peek().is_none() {
        return Err(CaError::Decode("no PEM block found".to_string()));
    }

    let mut bundle = ValidationBundle::default();
    for (index, block) in blocks.enumerate() {
        let certificate = match Certificate::from_der(block.contents()) {
            Ok(certificate) => certificate,
            Err(e) => {
                warn!(block = index, error = %e, "stopping validation bundle scan at unparsable block");
                break;
            }
        };

        if !certificate.is_ca() {
            debug!(block = index, subject = %certificate.subject().common_name, "skipping non-CA certificate");
            continue;
        }
        if !bundle.insert(certificate) {
            debug!(block = index, "skipping duplicate CA certificate");
        }
    }

    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;
    use crate::cert::params::DistinguishedName;
    use crate::issuer::self_signed_root;
    use crate::key::KeyPair;
    use crate::pem_utils::der_to_pem;

    fn root_ca(name: &str) -> Certificate {
        let subject = DistinguishedName::builder()
            .common_name(name.to_string())
            .build();
        self_signed_root(&KeyPair::generate_ecdsa_p256(), &subject, Duration::days(1)).unwrap()
    }

    #[test]
    fn test_scan_stops_at_first_bad_block() {
        let first = root_ca("first");
        let second = root_ca("second");
        let input = format!(
            "{}{}{}",
            first.to_pem(),
            der_to_pem(b"garbage", "CERTIFICATE"),
            second.to_pem()
        );

        let bundle = load_validation_bundle(input.as_bytes()).unwrap();
        assert_eq!(bundle.certificates(), &[first]);
    }

    #[test]
    fn test_scan_passes_over_undecodable_pem() {
        let first = root_ca("first");
        let second = root_ca("second");
        let input = format!(
            "{}-----BEGIN CERTIFICATE-----\n!!!not base64!!!\n-----END CERTIFICATE-----\n{}",
            first.to_pem(),
            second.to_pem()
        );

        let bundle = load_validation_bundle(input.as_bytes()).unwrap();
        assert_eq!(bundle.certificates(), &[first, second]);
    }

    #[test]
    fn test_duplicates_are_collapsed() {
        let ca = root_ca("dup");
        let input = format!("{}{}", ca.to_pem(), ca.to_pem());
        let bundle = load_validation_bundle(input.as_bytes()).unwrap();
        assert_eq!(bundle.len(), 1);
    }

    #[test]
    fn test_empty_input_is_decode_error() {
        let err = load_validation_bundle(b"").unwrap_err();
        assert!(matches!(err, CaError::Decode(_)));
    }

    #[test]
    fn test_bad_first_block_yields_empty_bundle() {
        let input = der_to_pem(b"garbage", "CERTIFICATE");
        let bundle = load_validation_bundle(input.as_bytes()).unwrap();
        assert!(bundle.is_empty());
    }
}
