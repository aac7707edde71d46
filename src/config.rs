//! Configuration for the signing authority.
//!
//! These structs are deserializable so the process that owns the config file
//! can hand them straight to [`SigningAuthority::configure`](crate::authority::SigningAuthority::configure).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use time::Duration;

use crate::cert::extensions::ExtendedKeyUsageOption;

/// Default clock-skew allowance subtracted from `notBefore`.
pub const DEFAULT_BACKDATE_SECONDS: u32 = 30;

/// Where the validation bundle is read from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ValidationMaterial {
    /// Reuse the root CA certificate file as the bundle.
    #[default]
    CertificateFile,
    /// Read the bundle from its own PEM file.
    Dedicated { path: PathBuf },
}

/// Fixed policy applied to every issued certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuancePolicy {
    /// Seconds subtracted from the issuance time for `notBefore`, to tolerate
    /// clock skew between issuer and verifier. Zero disables backdating.
    pub backdate_seconds: u32,
    /// Extended key usages written into every leaf.
    ///
    /// Defaults to code signing only. Issued certificates are used for
    /// identity, so this default needs review by whoever owns the federation
    /// policy before it is changed.
    pub extended_key_usage: Vec<ExtendedKeyUsageOption>,
}

impl IssuancePolicy {
    pub fn backdate(&self) -> Duration {
        Duration::seconds(i64::from(self.backdate_seconds))
    }
}

impl Default for IssuancePolicy {
    fn default() -> Self {
        Self {
            backdate_seconds: DEFAULT_BACKDATE_SECONDS,
            extended_key_usage: vec![ExtendedKeyUsageOption::CodeSigning],
        }
    }
}

/// Paths to the root material plus issuance policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// Root CA certificate, PEM.
    #[serde(default)]
    pub cert_file_path: PathBuf,
    /// Root private key, unencrypted PKCS#8 PEM.
    #[serde(default)]
    pub key_file_path: PathBuf,
    #[serde(default)]
    pub validation_material: ValidationMaterial,
    #[serde(default)]
    pub policy: IssuancePolicy,
}

impl AuthorityConfig {
    pub fn new(cert_file_path: impl Into<PathBuf>, key_file_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_file_path: cert_file_path.into(),
            key_file_path: key_file_path.into(),
            ..Self::default()
        }
    }

    pub fn with_validation_material(mut self, validation_material: ValidationMaterial) -> Self {
        self.validation_material = validation_material;
        self
    }

    pub fn with_policy(mut self, policy: IssuancePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The file the validation bundle is read from.
    pub fn validation_material_path(&self) -> &PathBuf {
        match &self.validation_material {
            ValidationMaterial::CertificateFile => &self.cert_file_path,
            ValidationMaterial::Dedicated { path } => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_with_defaults() {
        let config: AuthorityConfig = serde_json::from_str(
            r#"{ "cert_file_path": "conf/root.crt", "key_file_path": "conf/root.key" }"#,
        )
        .unwrap();
        assert_eq!(config.validation_material, ValidationMaterial::CertificateFile);
        assert_eq!(config.validation_material_path(), &PathBuf::from("conf/root.crt"));
        assert_eq!(config.policy, IssuancePolicy::default());
        assert_eq!(config.policy.backdate(), Duration::seconds(30));
    }

    #[test]
    fn test_deserialize_dedicated_bundle_and_policy() {
        let config: AuthorityConfig = serde_json::from_str(
            r#"{
                "cert_file_path": "conf/root.crt",
                "key_file_path": "conf/root.key",
                "validation_material": { "source": "dedicated", "path": "conf/bundle.pem" },
                "policy": { "backdate_seconds": 0, "extended_key_usage": ["client_auth", "server_auth"] }
            }"#,
        )
        .unwrap();
        assert_eq!(config.validation_material_path(), &PathBuf::from("conf/bundle.pem"));
        assert_eq!(config.policy.backdate_seconds, 0);
        assert_eq!(
            config.policy.extended_key_usage,
            vec![
                ExtendedKeyUsageOption::ClientAuth,
                ExtendedKeyUsageOption::ServerAuth
            ]
        );
    }
}
