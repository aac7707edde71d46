use bon::Builder;
use const_oid::ObjectIdentifier;
use const_oid::db::rfc4519;
use der::asn1::{Any, Ia5StringRef, PrintableStringRef, SetOfVec, Utf8StringRef};
use time::Duration;
use url::Url;
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{RdnSequence, RelativeDistinguishedName};

use crate::error::{CaError, Result};
use crate::key::PublicKey;

/// Parameters of a leaf certificate requested by a federation member.
///
/// # Fields
/// * `public_key` - The subject's public key to be certified.
/// * `subject` - The distinguished name of the certificate subject.
/// * `uris` - URI subject alternative names, typically a SPIFFE ID.
/// * `dns_names` - DNS subject alternative names.
/// * `ttl` - Requested validity duration; must be positive.
///
/// SAN values are copied into the certificate verbatim. Checking that a URI
/// is a well-formed SPIFFE ID is the caller's job.
#[derive(Clone, Debug, Builder)]
pub struct IssuanceRequest {
    pub public_key: PublicKey,
    pub subject: DistinguishedName,
    #[builder(default)]
    pub uris: Vec<Url>,
    #[builder(default)]
    pub dns_names: Vec<String>,
    pub ttl: Duration,
}

/// Distinguished name of a certificate subject or issuer.
///
/// Each attribute holds a single value. A name carrying several values for
/// one attribute, such as two OUs, cannot be issued, and decoding one keeps
/// only the first value of each attribute.
///
/// # Fields
/// * `common_name` - The common name (CN). Omitted from the encoding when empty.
/// * `country` - The country (C).
/// * `state` - The state or province (ST).
/// * `locality` - The locality or city (L).
/// * `organization` - The organization (O).
/// * `organization_unit` - The organizational unit (OU).
#[derive(Clone, Debug, Builder, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    #[builder(default)]
    pub common_name: String,
    pub country: Option<String>,
    pub state: Option<String>,
    pub locality: Option<String>,
    pub organization: Option<String>,
    pub organization_unit: Option<String>,
}

impl DistinguishedName {
    /// Converts the distinguished name to an X.509 `Name`.
    ///
    /// Attributes are emitted in the order C, O, OU, L, ST, CN, one per RDN,
    /// skipping any that are unset. Country is encoded as a PrintableString,
    /// everything else as UTF8String.
    pub fn as_x509_name(&self) -> Result<x509_cert::name::Name> {
        let mut rdns = Vec::new();

        if let Some(country) = &self.country {
            let value = PrintableStringRef::new(country)
                .map_err(|e| CaError::InvalidParameter(format!("country {country:?}: {e}")))?;
            rdns.push(rdn(rfc4519::C, Any::encode_from(&value)?)?);
        }

        let utf8_attributes = [
            (rfc4519::O, self.organization.as_deref()),
            (rfc4519::OU, self.organization_unit.as_deref()),
            (rfc4519::L, self.locality.as_deref()),
            (rfc4519::ST, self.state.as_deref()),
            (rfc4519::CN, Some(self.common_name.as_str()).filter(|cn| !cn.is_empty())),
        ];
        for (oid, value) in utf8_attributes {
            if let Some(value) = value {
                let value = Utf8StringRef::new(value)?;
                rdns.push(rdn(oid, Any::encode_from(&value)?)?);
            }
        }

        Ok(RdnSequence(rdns))
    }

    /// Creates a `DistinguishedName` from an X.509 `Name`.
    ///
    /// Attributes other than the six modelled here are ignored, as are values
    /// that are not UTF8String, PrintableString or IA5String. Repeated
    /// attributes keep their first value.
    pub fn from_x509_name(name: &x509_cert::name::Name) -> Self {
        let mut dn = DistinguishedName::default();

        for attr in name.0.iter().flat_map(|rdn| rdn.0.iter()) {
            let Some(value) = attribute_string(&attr.value) else {
                continue;
            };
            let slot = match attr.oid {
                rfc4519::CN => {
                    if dn.common_name.is_empty() {
                        dn.common_name = value;
                    }
                    continue;
                }
                rfc4519::C => &mut dn.country,
                rfc4519::ST => &mut dn.state,
                rfc4519::L => &mut dn.locality,
                rfc4519::O => &mut dn.organization,
                rfc4519::OU => &mut dn.organization_unit,
                _ => continue,
            };
            slot.get_or_insert(value);
        }

        dn
    }
}

fn rdn(oid: ObjectIdentifier, value: Any) -> Result<RelativeDistinguishedName> {
    let atv = AttributeTypeAndValue { oid, value };
    Ok(RelativeDistinguishedName(SetOfVec::try_from(vec![atv])?))
}

fn attribute_string(value: &Any) -> Option<String> {
    value
        .decode_as::<String>()
        .ok()
        .or_else(|| {
            value
                .decode_as::<PrintableStringRef<'_>>()
                .ok()
                .map(|s| s.to_string())
        })
        .or_else(|| {
            value
                .decode_as::<Ia5StringRef<'_>>()
                .ok()
                .map(|s| s.to_string())
        })
}
