use der::Encode;
use der::asn1::BitString;
use sha1::{Digest, Sha1};
use time::{Duration, OffsetDateTime};
use tracing::info;
use x509_cert::name::Name;

use crate::cert::Certificate;
use crate::cert::extensions::{KeyUsage, KeyUsages, SubjectAltName};
use crate::cert::params::{DistinguishedName, IssuanceRequest};
use crate::config::IssuancePolicy;
use crate::error::{CaError, IssuanceStage, Result};
use crate::key::{PublicKey, Signer};
use crate::serial::new_serial_number;
use crate::template::{CertificateTemplate, build_template, validity_window};

/// Represents an entity capable of issuing leaf certificates.
///
/// Implementors supply the root material; issuance itself is provided.
pub trait Issuer {
    /// The key whose signature goes on issued certificates.
    type Key: Signer + ?Sized;

    /// Returns the certificate of the issuer, used as the parent of every leaf.
    fn certificate(&self) -> &Certificate;

    /// Returns the signing key of the issuer.
    fn signing_key(&self) -> &Self::Key;

    /// Returns the policy stamped on every issued certificate.
    fn policy(&self) -> &IssuancePolicy;

    /// Issues a certificate for `request`, valid from now.
    fn issue(&self, request: &IssuanceRequest) -> Result<Certificate> {
        self.issue_at(request, OffsetDateTime::now_utc())
    }

    /// Issues a certificate for `request` as if the current time were `now`.
    ///
    /// Errors are wrapped in [`CaError::Issuance`] naming the stage that failed.
    fn issue_at(&self, request: &IssuanceRequest, now: OffsetDateTime) -> Result<Certificate> {
        let template = build_template(request, self.policy(), now).map_err(|e| {
            CaError::Issuance {
                stage: IssuanceStage::Template,
                source: Box::new(e),
            }
        })?;

        let certificate =
            sign(&template, self.certificate(), self.signing_key()).map_err(|e| {
                CaError::Issuance {
                    stage: IssuanceStage::Signing,
                    source: Box::new(e),
                }
            })?;

        info!(
            serial = template.serial_number,
            subject = %template.subject.common_name,
            not_before = %template.not_before,
            not_after = %template.not_after,
            "issued signing certificate"
        );
        Ok(certificate)
    }
}

/// Signs `template` with `parent_key`, naming `parent` as the issuer, and
/// returns the certificate re-parsed from the DER that was produced.
///
/// Fails with [`CaError::Signing`] when `parent_key` is not the key certified
/// by `parent`, or the signature operation fails.
pub fn sign<K>(template: &CertificateTemplate, parent: &Certificate, parent_key: &K) -> Result<Certificate>
where
    K: Signer + ?Sized,
{
    if parent_key.public_key()? != parent.public_key() {
        return Err(CaError::Signing(
            "private key does not match the parent certificate's public key".to_string(),
        ));
    }

    let authority_key_id = match parent.subject_key_identifier()? {
        Some(key_id) => key_id,
        None => key_identifier(&parent.public_key()),
    };

    sign_tbs(
        template,
        parent.inner.tbs_certificate.subject.clone(),
        parent_key,
        Some(authority_key_id),
    )
}

/// Creates a self-signed root CA certificate for `key`.
///
/// The root carries CA basic constraints, certificate and CRL signing key
/// usage and a Subject Key Identifier, which leaves issued under it copy into
/// their Authority Key Identifier.
pub fn self_signed_root<K>(key: &K, subject: &DistinguishedName, ttl: Duration) -> Result<Certificate>
where
    K: Signer + ?Sized,
{
    let (not_before, not_after) = validity_window(OffsetDateTime::now_utc(), ttl, Duration::ZERO)?;
    let public_key = key.public_key()?;

    let template = CertificateTemplate {
        serial_number: new_serial_number()?,
        subject: subject.clone(),
        subject_key_identifier: Some(key_identifier(&public_key)),
        subject_public_key: public_key,
        not_before,
        not_after,
        is_ca: true,
        subject_alt_name: SubjectAltName::default(),
        key_usage: KeyUsage(
            KeyUsages::KeyCertSign | KeyUsages::CRLSign | KeyUsages::DigitalSignature,
        ),
        extended_key_usage: Vec::new(),
    };

    sign_tbs(&template, subject.as_x509_name()?, key, None)
}

fn sign_tbs<K>(
    template: &CertificateTemplate,
    issuer: Name,
    key: &K,
    authority_key_id: Option<Vec<u8>>,
) -> Result<Certificate>
where
    K: Signer + ?Sized,
{
    let signature_algorithm = key.signature_algorithm();
    let tbs_certificate =
        template.to_tbs_certificate(issuer, signature_algorithm.clone(), authority_key_id)?;
    let tbs_der = tbs_certificate
        .to_der()
        .map_err(|e| CaError::Encoding(e.to_string()))?;

    let signature = key.sign_data(&tbs_der)?;

    let certificate = x509_cert::Certificate {
        tbs_certificate,
        signature_algorithm,
        signature: BitString::from_bytes(&signature)
            .map_err(|e| CaError::Encoding(e.to_string()))?,
    };
    let der = certificate
        .to_der()
        .map_err(|e| CaError::Encoding(e.to_string()))?;

    // Hand back what a peer will decode, not the in-memory structure.
    Certificate::from_der(&der).map_err(|e| {
        CaError::Encoding(format!("freshly signed certificate does not parse: {e}"))
    })
}

/// RFC 5280 4.2.1.2 method (1): SHA-1 of the subjectPublicKey bits.
fn key_identifier(public_key: &PublicKey) -> Vec<u8> {
    Sha1::digest(public_key.as_spki().subject_public_key.raw_bytes()).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::extensions::{AuthorityKeyIdentifier, ExtendedKeyUsageOption};
    use crate::key::KeyPair;

    fn root_subject() -> DistinguishedName {
        DistinguishedName::builder()
            .common_name("Federation Root CA".to_string())
            .organization("Example Federation".to_string())
            .build()
    }

    fn leaf_request(ttl: Duration) -> IssuanceRequest {
        let member_key = KeyPair::generate_ed25519();
        IssuanceRequest::builder()
            .public_key(member_key.public_key().unwrap())
            .subject(
                DistinguishedName::builder()
                    .common_name("member-a.example.org".to_string())
                    .build(),
            )
            .uris(vec!["spiffe://member-a.example.org".parse().unwrap()])
            .dns_names(vec!["member-a.example.org".to_string()])
            .ttl(ttl)
            .build()
    }

    #[test]
    fn test_self_signed_root_is_ca() {
        let key = KeyPair::generate_ecdsa_p384();
        let root = self_signed_root(&key, &root_subject(), Duration::days(365)).unwrap();

        assert!(root.is_ca());
        assert_eq!(root.subject(), root_subject());
        assert_eq!(root.issuer(), root_subject());
        assert_eq!(root.public_key(), key.public_key().unwrap());
        assert!(root.subject_key_identifier().unwrap().is_some());
        root.verify_signed_by(&root).unwrap();
    }

    #[test]
    fn test_signed_certificate_matches_template() {
        let key = KeyPair::generate_ecdsa_p256();
        let root = self_signed_root(&key, &root_subject(), Duration::days(365)).unwrap();
        let template = build_template(
            &leaf_request(Duration::hours(1)),
            &IssuancePolicy::default(),
            OffsetDateTime::now_utc(),
        )
        .unwrap();

        let cert = sign(&template, &root, &key).unwrap();

        assert_eq!(cert.serial_number(), Some(template.serial_number));
        assert_eq!(cert.not_before(), template.not_before);
        assert_eq!(cert.not_after(), template.not_after);
        assert_eq!(cert.subject(), template.subject);
        assert_eq!(cert.issuer(), root_subject());
        assert_eq!(cert.subject_alt_name().unwrap(), template.subject_alt_name);
        assert_eq!(cert.public_key(), template.subject_public_key);
        assert!(!cert.is_ca());
        assert_eq!(cert.key_usage().unwrap(), Some(KeyUsage::leaf()));
        assert_eq!(
            cert.extended_key_usage().unwrap().usage,
            vec![ExtendedKeyUsageOption::CodeSigning]
        );

        let aki = cert.extension::<AuthorityKeyIdentifier>().unwrap().unwrap();
        assert_eq!(
            Some(aki.key_identifier),
            root.subject_key_identifier().unwrap()
        );
        cert.verify_signed_by(&root).unwrap();
    }

    #[test]
    fn test_mismatched_parent_key_is_signing_error() {
        let root_key = KeyPair::generate_ecdsa_p256();
        let other_key = KeyPair::generate_ecdsa_p256();
        let root = self_signed_root(&root_key, &root_subject(), Duration::days(1)).unwrap();
        let template = build_template(
            &leaf_request(Duration::hours(1)),
            &IssuancePolicy::default(),
            OffsetDateTime::now_utc(),
        )
        .unwrap();

        let err = sign(&template, &root, &other_key).unwrap_err();
        assert!(matches!(err, CaError::Signing(_)));
    }
}
