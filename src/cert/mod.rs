pub mod extensions;
pub mod params;

use der::{Decode, Encode};
use extensions::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAltName, SubjectKeyIdentifier,
    ToAndFromX509Extension,
};
use params::DistinguishedName;
use time::OffsetDateTime;

use crate::error::{CaError, Result};
use crate::key::{PublicKey, verify_signature};
use crate::pem_utils::{der_to_pem, first_block_der};
use crate::serial::serial_from_der_bytes;

/// Represents a parsed X.509 certificate.
///
/// The DER it was parsed from is kept alongside, so the bytes handed to a
/// peer are exactly the bytes that were signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// The inner representation of the certificate.
    pub inner: x509_cert::Certificate,
    der: Vec<u8>,
}

impl Certificate {
    /// Parses a DER-encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = x509_cert::Certificate::from_der(der)?;
        Ok(Self {
            inner,
            der: der.to_vec(),
        })
    }

    /// Parses the first PEM block of `input` as a certificate.
    pub fn from_pem(input: &[u8]) -> Result<Self> {
        let der = first_block_der(input)?;
        Self::from_der(&der)
    }

    /// The DER encoding of the certificate.
    pub fn to_der(&self) -> &[u8] {
        &self.der
    }

    /// Encodes the certificate into PEM format.
    pub fn to_pem(&self) -> String {
        der_to_pem(&self.der, "CERTIFICATE")
    }

    /// Raw big-endian bytes of the serial number.
    pub fn serial_number_bytes(&self) -> &[u8] {
        self.inner.tbs_certificate.serial_number.as_bytes()
    }

    /// The serial number, when it fits in 64 bits. Serials issued by this
    /// authority always do.
    pub fn serial_number(&self) -> Option<u64> {
        serial_from_der_bytes(self.serial_number_bytes())
    }

    pub fn subject(&self) -> DistinguishedName {
        DistinguishedName::from_x509_name(&self.inner.tbs_certificate.subject)
    }

    pub fn issuer(&self) -> DistinguishedName {
        DistinguishedName::from_x509_name(&self.inner.tbs_certificate.issuer)
    }

    pub fn not_before(&self) -> OffsetDateTime {
        self.inner
            .tbs_certificate
            .validity
            .not_before
            .to_system_time()
            .into()
    }

    pub fn not_after(&self) -> OffsetDateTime {
        self.inner
            .tbs_certificate
            .validity
            .not_after
            .to_system_time()
            .into()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_spki(self.inner.tbs_certificate.subject_public_key_info.clone())
    }

    /// Decodes the extension `E`, if the certificate carries it.
    pub fn extension<E: ToAndFromX509Extension>(&self) -> Result<Option<E>> {
        self.inner
            .tbs_certificate
            .extensions
            .iter()
            .flatten()
            .find(|ext| ext.extn_id == E::OID)
            .map(|ext| E::from_x509_extension_value(ext.extn_value.as_bytes()))
            .transpose()
    }

    /// Whether the certificate has the CA basic constraint set. A missing or
    /// undecodable Basic Constraints extension counts as not a CA.
    pub fn is_ca(&self) -> bool {
        matches!(
            self.extension::<BasicConstraints>(),
            Ok(Some(BasicConstraints { is_ca: true, .. }))
        )
    }

    pub fn subject_alt_name(&self) -> Result<SubjectAltName> {
        Ok(self.extension::<SubjectAltName>()?.unwrap_or_default())
    }

    pub fn key_usage(&self) -> Result<Option<KeyUsage>> {
        self.extension::<KeyUsage>()
    }

    pub fn extended_key_usage(&self) -> Result<ExtendedKeyUsage> {
        Ok(self.extension::<ExtendedKeyUsage>()?.unwrap_or_default())
    }

    pub fn subject_key_identifier(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.extension::<SubjectKeyIdentifier>()?.map(|ski| ski.0))
    }

    /// Checks that this certificate's signature was made by `issuer`'s key.
    ///
    /// Only the signature is checked; validity windows and name chaining are
    /// left to the caller.
    pub fn verify_signed_by(&self, issuer: &Certificate) -> Result<()> {
        let tbs = self.inner.tbs_certificate.to_der()?;
        let signature = self.inner.signature.as_bytes().ok_or_else(|| {
            CaError::Verification("signature has unused bits".to_string())
        })?;
        verify_signature(
            &issuer.public_key(),
            &self.inner.signature_algorithm,
            &tbs,
            signature,
        )
    }
}

/// Loads the CA's own certificate from the first PEM block of `input`.
///
/// No chain validation happens here; the root is trusted by configuration.
pub fn load_root_certificate(input: &[u8]) -> Result<Certificate> {
    Certificate::from_pem(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_pem_is_decode_error() {
        let err = load_root_certificate(b"no certificate here").unwrap_err();
        assert!(matches!(err, CaError::Decode(_)));
    }

    #[test]
    fn test_garbage_der_is_parse_error() {
        let pem = der_to_pem(b"definitely not a certificate", "CERTIFICATE");
        let err = load_root_certificate(pem.as_bytes()).unwrap_err();
        assert!(matches!(err, CaError::Parse(_)));
    }
}
