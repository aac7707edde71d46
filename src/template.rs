use std::time::SystemTime;

use der::asn1::{GeneralizedTime, OctetString, UtcTime};
use time::{Duration, OffsetDateTime, UtcOffset};
use x509_cert::certificate::{TbsCertificate, Version};
use x509_cert::ext::Extension;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_cert::time::{Time, Validity};

use crate::cert::extensions::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, ExtendedKeyUsageOption, KeyUsage,
    SubjectAltName, SubjectKeyIdentifier, ToAndFromX509Extension,
};
use crate::cert::params::{DistinguishedName, IssuanceRequest};
use crate::config::IssuancePolicy;
use crate::error::{CaError, Result};
use crate::key::PublicKey;
use crate::serial::{new_serial_number, serial_to_der_bytes};

/// An unsigned certificate: everything that goes into the TBS structure
/// except what the issuer contributes (its name, signature algorithm and key
/// identifier).
///
/// # Fields
/// * `serial_number` - Random serial in [1, 2^63-1].
/// * `subject` - The distinguished name of the certificate subject.
/// * `subject_public_key` - The public key being certified.
/// * `not_before` / `not_after` - Validity window, whole seconds.
/// * `is_ca` - Basic constraints CA flag.
/// * `subject_alt_name` - URI and DNS SANs.
/// * `key_usage` - Key usage bits.
/// * `extended_key_usage` - Extended key usages; omitted when empty.
/// * `subject_key_identifier` - Written when present; leaves carry none.
#[derive(Clone, Debug)]
pub struct CertificateTemplate {
    pub serial_number: u64,
    pub subject: DistinguishedName,
    pub subject_public_key: PublicKey,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    pub is_ca: bool,
    pub subject_alt_name: SubjectAltName,
    pub key_usage: KeyUsage,
    pub extended_key_usage: Vec<ExtendedKeyUsageOption>,
    pub subject_key_identifier: Option<Vec<u8>>,
}

/// Builds the leaf template for `request`, issued at `now`.
///
/// `notBefore` is `now` minus the policy's backdate and `notAfter` is
/// `now + ttl`, both truncated to whole seconds. A non-positive TTL, a
/// validity time X.509 cannot carry, or a subject or SAN value that does not
/// fit its ASN.1 string type is an [`CaError::InvalidParameter`].
pub fn build_template(
    request: &IssuanceRequest,
    policy: &IssuancePolicy,
    now: OffsetDateTime,
) -> Result<CertificateTemplate> {
    let (not_before, not_after) = validity_window(now, request.ttl, policy.backdate())?;
    to_x509_time(not_before)?;
    to_x509_time(not_after)?;

    request
        .subject
        .as_x509_name()
        .map_err(|e| CaError::InvalidParameter(format!("subject: {e}")))?;
    let subject_alt_name = SubjectAltName {
        uris: request.uris.iter().map(|uri| uri.to_string()).collect(),
        dns_names: request.dns_names.clone(),
    };
    subject_alt_name.to_x509_extension_value()?;

    let serial_number = new_serial_number()?;

    Ok(CertificateTemplate {
        serial_number,
        subject: request.subject.clone(),
        subject_public_key: request.public_key.clone(),
        not_before,
        not_after,
        is_ca: false,
        subject_alt_name,
        key_usage: KeyUsage::leaf(),
        extended_key_usage: policy.extended_key_usage.clone(),
        subject_key_identifier: None,
    })
}

pub(crate) fn validity_window(
    now: OffsetDateTime,
    ttl: Duration,
    backdate: Duration,
) -> Result<(OffsetDateTime, OffsetDateTime)> {
    if !ttl.is_positive() {
        return Err(CaError::InvalidParameter(format!(
            "ttl must be positive, got {ttl}"
        )));
    }
    if backdate.is_negative() {
        return Err(CaError::InvalidParameter(format!(
            "backdate must not be negative, got {backdate}"
        )));
    }

    let now = now.replace_nanosecond(0).map_err(|e| CaError::InvalidParameter(e.to_string()))?;
    let not_before = now
        .checked_sub(backdate)
        .ok_or_else(|| CaError::InvalidParameter("notBefore is out of range".to_string()))?;
    let not_after = now
        .checked_add(ttl)
        .and_then(|t| t.replace_nanosecond(0).ok())
        .ok_or_else(|| CaError::InvalidParameter(format!("ttl {ttl} is out of range")))?;

    Ok((not_before, not_after))
}

impl CertificateTemplate {
    /// Converts the template into the x509-cert TBS structure for DER encoding.
    pub fn to_tbs_certificate(
        &self,
        issuer: Name,
        signature_algorithm: AlgorithmIdentifierOwned,
        authority_key_identifier: Option<Vec<u8>>,
    ) -> Result<TbsCertificate> {
        let subject = self.subject.as_x509_name()?;

        let mut extensions = vec![
            extension(
                BasicConstraints {
                    is_ca: self.is_ca,
                    max_path_length: None,
                },
                true,
            )?,
            extension(self.key_usage, true)?,
        ];

        if !self.extended_key_usage.is_empty() {
            let eku = ExtendedKeyUsage {
                usage: self.extended_key_usage.clone(),
            };
            extensions.push(extension(eku, false)?);
        }

        if !self.subject_alt_name.is_empty() {
            // RFC 5280 4.2.1.6: SAN is critical when it is the only identity.
            let critical = subject.0.is_empty();
            extensions.push(extension(self.subject_alt_name.clone(), critical)?);
        }

        if let Some(key_identifier) = &self.subject_key_identifier {
            extensions.push(extension(SubjectKeyIdentifier(key_identifier.clone()), false)?);
        }

        if let Some(key_identifier) = authority_key_identifier {
            extensions.push(extension(AuthorityKeyIdentifier { key_identifier }, false)?);
        }

        Ok(TbsCertificate {
            version: Version::V3,
            serial_number: SerialNumber::new(&serial_to_der_bytes(self.serial_number))?,
            signature: signature_algorithm,
            issuer,
            validity: Validity {
                not_before: to_x509_time(self.not_before)?,
                not_after: to_x509_time(self.not_after)?,
            },
            subject,
            subject_public_key_info: self.subject_public_key.as_spki().clone(),
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: Some(extensions),
        })
    }
}

fn extension<E: ToAndFromX509Extension>(value: E, critical: bool) -> Result<Extension> {
    Ok(Extension {
        extn_id: E::OID,
        critical,
        extn_value: OctetString::new(value.to_x509_extension_value()?)?,
    })
}

/// RFC 5280 4.1.2.5: UTCTime through 2049, GeneralizedTime from 2050.
fn to_x509_time(time: OffsetDateTime) -> Result<Time> {
    let system_time = SystemTime::from(time);
    let converted = if time.to_offset(UtcOffset::UTC).year() < 2050 {
        UtcTime::from_system_time(system_time).map(Time::UtcTime)
    } else {
        GeneralizedTime::from_system_time(system_time).map(Time::GeneralTime)
    };
    converted.map_err(|e| CaError::InvalidParameter(format!("validity time {time}: {e}")))
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::key::{KeyPair, Signer};

    fn request(ttl: Duration) -> IssuanceRequest {
        let key = KeyPair::generate_ecdsa_p256();
        IssuanceRequest::builder()
            .public_key(key.public_key().unwrap())
            .subject(
                DistinguishedName::builder()
                    .common_name("member-a.example.org".to_string())
                    .build(),
            )
            .uris(vec!["spiffe://member-a.example.org".parse().unwrap()])
            .ttl(ttl)
            .build()
    }

    #[test]
    fn test_template_applies_fixed_policy() {
        let now = datetime!(2026-10-16 12:00:00.750 UTC);
        let template =
            build_template(&request(Duration::hours(1)), &IssuancePolicy::default(), now).unwrap();

        assert_eq!(template.not_before, datetime!(2026-10-16 11:59:30 UTC));
        assert_eq!(template.not_after, datetime!(2026-10-16 13:00:00 UTC));
        assert!(!template.is_ca);
        assert_eq!(template.key_usage, KeyUsage::leaf());
        assert_eq!(
            template.extended_key_usage,
            vec![ExtendedKeyUsageOption::CodeSigning]
        );
        assert_eq!(
            template.subject_alt_name.uris,
            vec!["spiffe://member-a.example.org".to_string()]
        );
        assert!((1..=crate::serial::MAX_SERIAL).contains(&template.serial_number));
    }

    #[test]
    fn test_backdate_can_be_disabled() {
        let now = datetime!(2026-10-16 12:00:00 UTC);
        let policy = IssuancePolicy {
            backdate_seconds: 0,
            ..IssuancePolicy::default()
        };
        let template = build_template(&request(Duration::minutes(5)), &policy, now).unwrap();
        assert_eq!(template.not_before, now);
    }

    #[test]
    fn test_non_positive_ttl_is_rejected() {
        let now = OffsetDateTime::now_utc();
        for ttl in [Duration::ZERO, Duration::seconds(-1)] {
            let err = build_template(&request(ttl), &IssuancePolicy::default(), now).unwrap_err();
            assert!(matches!(err, CaError::InvalidParameter(_)));
        }
    }

    #[test]
    fn test_x509_time_switches_to_generalized_time() {
        assert!(matches!(
            to_x509_time(datetime!(2049-12-31 23:59:59 UTC)).unwrap(),
            Time::UtcTime(_)
        ));
        assert!(matches!(
            to_x509_time(datetime!(2050-01-01 00:00:00 UTC)).unwrap(),
            Time::GeneralTime(_)
        ));
    }

    #[test]
    fn test_x509_time_choice_uses_utc_year() {
        assert!(matches!(
            to_x509_time(datetime!(2049-12-31 23:30:00 -01:00)).unwrap(),
            Time::GeneralTime(_)
        ));
        assert!(matches!(
            to_x509_time(datetime!(2050-01-01 00:30:00 +01:00)).unwrap(),
            Time::UtcTime(_)
        ));
    }

    #[test]
    fn test_unencodable_san_is_rejected_at_template() {
        let mut request = request(Duration::hours(1));
        request.dns_names = vec!["bücher.example".to_string()];
        let err = build_template(&request, &IssuancePolicy::default(), OffsetDateTime::now_utc())
            .unwrap_err();
        assert!(matches!(err, CaError::InvalidParameter(_)));
    }

    #[test]
    fn test_validity_before_epoch_is_rejected_at_template() {
        let now = datetime!(1960-01-01 00:00:00 UTC);
        let err = build_template(&request(Duration::hours(1)), &IssuancePolicy::default(), now)
            .unwrap_err();
        assert!(matches!(err, CaError::InvalidParameter(_)));
    }
}
