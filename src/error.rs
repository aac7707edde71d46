//! use federation_ca::error::CaError;

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Shorthand result type used throughout the crate.
pub type Result<T> = std::result::Result<T, CaError>;

/// Which piece of root material was being loaded when a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Material {
    RootKey,
    RootCertificate,
    ValidationBundle,
}

impl fmt::Display for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Material::RootKey => f.write_str("root key"),
            Material::RootCertificate => f.write_str("root certificate"),
            Material::ValidationBundle => f.write_str("validation bundle"),
        }
    }
}

/// Which stage of certificate issuance failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuanceStage {
    Template,
    Signing,
}

impl fmt::Display for IssuanceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssuanceStage::Template => f.write_str("create certificate template"),
            IssuanceStage::Signing => f.write_str("sign certificate"),
        }
    }
}

/// Represents errors that can occur while configuring the signing authority
/// or issuing certificates.
///
/// None of these conditions are transient; nothing in the crate retries.
#[derive(Debug, Error)]
pub enum CaError {
    /// A required configuration field was empty.
    #[error("{0} is not set")]
    MissingField(&'static str),

    /// A material file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No usable PEM block was found.
    #[error("failed to decode PEM: {0}")]
    Decode(String),

    /// A PEM block carried malformed DER.
    #[error("failed to parse DER: {0}")]
    Parse(String),

    /// The private key uses an algorithm the authority cannot sign with.
    #[error("this type of key is not supported: {0}")]
    UnsupportedKeyType(String),

    /// A caller-supplied parameter was rejected.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The operating system entropy source failed.
    #[error("failed to create random number: {0}")]
    RandomSource(String),

    /// The signing operation itself failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// A signature did not verify against the expected public key.
    #[error("signature verification failed: {0}")]
    Verification(String),

    /// A freshly signed certificate could not be encoded or re-parsed.
    #[error("failed to encode data: {0}")]
    Encoding(String),

    /// Issuance was attempted before a successful `configure`.
    #[error("signing authority is not configured")]
    NotConfigured,

    /// `configure` was called on an authority that already holds root material.
    #[error("signing authority is already configured")]
    AlreadyConfigured,

    /// Loading a piece of root material from a file failed.
    #[error("failed to load {material} from {}: {source}", .path.display())]
    Load {
        material: Material,
        path: PathBuf,
        #[source]
        source: Box<CaError>,
    },

    /// An issuance stage failed.
    #[error("failed to {stage}: {source}")]
    Issuance {
        stage: IssuanceStage,
        #[source]
        source: Box<CaError>,
    },
}

impl CaError {
    /// Returns the innermost error, looking through `Load` and `Issuance`
    /// context wrappers.
    pub fn root_cause(&self) -> &CaError {
        match self {
            CaError::Load { source, .. } | CaError::Issuance { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<der::Error> for CaError {
    /// Converts a `der::Error` into a `CaError`.
    fn from(err: der::Error) -> Self {
        CaError::Parse(err.to_string())
    }
}

impl From<pkcs8::Error> for CaError {
    fn from(err: pkcs8::Error) -> Self {
        CaError::Parse(err.to_string())
    }
}

impl From<pkcs8::spki::Error> for CaError {
    fn from(err: pkcs8::spki::Error) -> Self {
        CaError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_context() {
        let err = CaError::Issuance {
            stage: IssuanceStage::Template,
            source: Box::new(CaError::InvalidParameter("ttl must be positive".into())),
        };
        assert!(matches!(err.root_cause(), CaError::InvalidParameter(_)));
        assert_eq!(
            err.to_string(),
            "failed to create certificate template: invalid parameter: ttl must be positive"
        );
    }

    #[test]
    fn test_load_error_names_file() {
        let err = CaError::Load {
            material: Material::RootKey,
            path: PathBuf::from("/etc/ca/root.key"),
            source: Box::new(CaError::Decode("no PEM block found".into())),
        };
        let message = err.to_string();
        assert!(message.contains("root key"));
        assert!(message.contains("/etc/ca/root.key"));
    }
}
