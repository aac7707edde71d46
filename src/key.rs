//! Root key material and the single signing interface the authority uses.
//!
//! Keys are loaded from unencrypted PKCS#8 and dispatched on their algorithm
//! identifier into a closed set of variants: RSA, ECDSA (P-256, P-384,
//! P-521) and Ed25519. Anything else is rejected with [`CaError::UnsupportedKeyType`].

use std::fmt;

use const_oid::ObjectIdentifier;
use const_oid::db::{DB, rfc5912, rfc8410};
use der::asn1::{Any, AnyRef};
use der::{Decode, Encode};
use ed25519_dalek::SigningKey as Ed25519SigningKey;
use p256::ecdsa::SigningKey as P256SigningKey;
use p384::ecdsa::SigningKey as P384SigningKey;
use p521::SecretKey as P521SecretKey;
use pkcs8::{
    DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding,
    PrivateKeyInfo,
};
use rand_core::OsRng;
use rsa::signature::{SignatureEncoding, Signer as _, Verifier as _};
use rsa::{RsaPrivateKey, RsaPublicKey, pkcs1v15};
use sha2::{Digest, Sha256, Sha384, Sha512};
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};

use crate::error::{CaError, Result};
use crate::pem_utils::first_block_der;

/// Capability shared by every supported private key.
///
/// Implementations hash the message themselves with the digest bound to their
/// signature algorithm, so callers pass the raw to-be-signed bytes.
pub trait Signer {
    /// Signs `data`, returning the signature in its X.509 encoding.
    fn sign_data(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Returns the public half of the key.
    fn public_key(&self) -> Result<PublicKey>;

    /// Returns the algorithm identifier written into certificates signed by this key.
    fn signature_algorithm(&self) -> AlgorithmIdentifierOwned;
}

/// Supported private key types.
pub enum KeyPair {
    Rsa { private: Box<RsaPrivateKey> },
    EcdsaP256 { signing_key: P256SigningKey },
    EcdsaP384 { signing_key: P384SigningKey },
    EcdsaP521 { secret_key: P521SecretKey },
    Ed25519 { signing_key: Ed25519SigningKey },
}

impl KeyPair {
    /// Generate an RSA key pair with the specified number of bits.
    pub fn generate_rsa(bits: usize) -> Result<Self> {
        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CaError::InvalidParameter(e.to_string()))?;
        Ok(KeyPair::Rsa {
            private: Box::new(private),
        })
    }

    /// Generate an ECDSA P-256 key pair.
    pub fn generate_ecdsa_p256() -> Self {
        KeyPair::EcdsaP256 {
            signing_key: P256SigningKey::random(&mut OsRng),
        }
    }

    /// Generate an ECDSA P-384 key pair.
    pub fn generate_ecdsa_p384() -> Self {
        KeyPair::EcdsaP384 {
            signing_key: P384SigningKey::random(&mut OsRng),
        }
    }

    /// Generate an ECDSA P-521 key pair.
    pub fn generate_ecdsa_p521() -> Self {
        KeyPair::EcdsaP521 {
            secret_key: P521SecretKey::random(&mut OsRng),
        }
    }

    /// Generate an Ed25519 key pair.
    pub fn generate_ed25519() -> Self {
        KeyPair::Ed25519 {
            signing_key: Ed25519SigningKey::generate(&mut OsRng),
        }
    }

    /// Parses an unencrypted PKCS#8 `PrivateKeyInfo`.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let info = PrivateKeyInfo::try_from(der)?;

        match info.algorithm.oid {
            rfc5912::RSA_ENCRYPTION => Ok(KeyPair::Rsa {
                private: Box::new(RsaPrivateKey::from_pkcs8_der(der)?),
            }),
            rfc5912::ID_EC_PUBLIC_KEY => match info.algorithm.parameters_oid()? {
                rfc5912::SECP_256_R_1 => Ok(KeyPair::EcdsaP256 {
                    signing_key: P256SigningKey::from_pkcs8_der(der)?,
                }),
                rfc5912::SECP_384_R_1 => Ok(KeyPair::EcdsaP384 {
                    signing_key: P384SigningKey::from_pkcs8_der(der)?,
                }),
                rfc5912::SECP_521_R_1 => Ok(KeyPair::EcdsaP521 {
                    secret_key: P521SecretKey::from_pkcs8_der(der)?,
                }),
                curve => Err(CaError::UnsupportedKeyType(format!(
                    "ECDSA on curve {}",
                    oid_name(curve)
                ))),
            },
            rfc8410::ID_ED_25519 => Ok(KeyPair::Ed25519 {
                signing_key: Ed25519SigningKey::from_pkcs8_der(der)?,
            }),
            other => Err(CaError::UnsupportedKeyType(oid_name(other))),
        }
    }

    /// Parses the first PEM block of `input` as an unencrypted PKCS#8 key.
    pub fn from_pkcs8_pem(input: &[u8]) -> Result<Self> {
        let der = first_block_der(input)?;
        Self::from_pkcs8_der(&der)
    }

    /// Exports the key as an unencrypted PKCS#8 PEM document.
    pub fn to_pkcs8_pem(&self) -> Result<String> {
        let pem = match self {
            KeyPair::Rsa { private } => private.to_pkcs8_pem(LineEnding::LF),
            KeyPair::EcdsaP256 { signing_key } => signing_key.to_pkcs8_pem(LineEnding::LF),
            KeyPair::EcdsaP384 { signing_key } => signing_key.to_pkcs8_pem(LineEnding::LF),
            KeyPair::EcdsaP521 { secret_key } => secret_key.to_pkcs8_pem(LineEnding::LF),
            KeyPair::Ed25519 { signing_key } => signing_key.to_pkcs8_pem(LineEnding::LF),
        }
        .map_err(|e| CaError::Encoding(e.to_string()))?;
        Ok(pem.to_string())
    }

    /// Human readable algorithm name, safe to log.
    pub fn algorithm_name(&self) -> &'static str {
        match self {
            KeyPair::Rsa { .. } => "RSA",
            KeyPair::EcdsaP256 { .. } => "ECDSA P-256",
            KeyPair::EcdsaP384 { .. } => "ECDSA P-384",
            KeyPair::EcdsaP521 { .. } => "ECDSA P-521",
            KeyPair::Ed25519 { .. } => "Ed25519",
        }
    }
}

impl Signer for KeyPair {
    fn sign_data(&self, data: &[u8]) -> Result<Vec<u8>> {
        let signing_error = |e: rsa::signature::Error| CaError::Signing(e.to_string());
        match self {
            KeyPair::Rsa { private } => {
                let signing_key = pkcs1v15::SigningKey::<Sha256>::new((**private).clone());
                let signature = signing_key.try_sign(data).map_err(signing_error)?;
                Ok(signature.to_vec())
            }
            KeyPair::EcdsaP256 { signing_key } => {
                let signature: p256::ecdsa::Signature =
                    signing_key.try_sign(data).map_err(signing_error)?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            KeyPair::EcdsaP384 { signing_key } => {
                let signature: p384::ecdsa::Signature =
                    signing_key.try_sign(data).map_err(signing_error)?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            KeyPair::EcdsaP521 { secret_key } => {
                let signing_key = p521::ecdsa::SigningKey::from_bytes(&secret_key.to_bytes())
                    .map_err(signing_error)?;
                let signature: p521::ecdsa::Signature =
                    signing_key.try_sign(data).map_err(signing_error)?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            KeyPair::Ed25519 { signing_key } => {
                let signature = signing_key.try_sign(data).map_err(signing_error)?;
                Ok(signature.to_bytes().to_vec())
            }
        }
    }

    fn public_key(&self) -> Result<PublicKey> {
        let document = match self {
            KeyPair::Rsa { private } => RsaPublicKey::from(&**private).to_public_key_der(),
            KeyPair::EcdsaP256 { signing_key } => signing_key.verifying_key().to_public_key_der(),
            KeyPair::EcdsaP384 { signing_key } => signing_key.verifying_key().to_public_key_der(),
            KeyPair::EcdsaP521 { secret_key } => secret_key.public_key().to_public_key_der(),
            KeyPair::Ed25519 { signing_key } => signing_key.verifying_key().to_public_key_der(),
        }
        .map_err(|e| CaError::Encoding(e.to_string()))?;
        PublicKey::from_der(document.as_bytes())
    }

    fn signature_algorithm(&self) -> AlgorithmIdentifierOwned {
        match self {
            KeyPair::Rsa { .. } => AlgorithmIdentifierOwned {
                oid: rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
                parameters: Some(Any::from(AnyRef::NULL)),
            },
            KeyPair::EcdsaP256 { .. } => AlgorithmIdentifierOwned {
                oid: rfc5912::ECDSA_WITH_SHA_256,
                parameters: None,
            },
            KeyPair::EcdsaP384 { .. } => AlgorithmIdentifierOwned {
                oid: rfc5912::ECDSA_WITH_SHA_384,
                parameters: None,
            },
            KeyPair::EcdsaP521 { .. } => AlgorithmIdentifierOwned {
                oid: rfc5912::ECDSA_WITH_SHA_512,
                parameters: None,
            },
            KeyPair::Ed25519 { .. } => AlgorithmIdentifierOwned {
                oid: rfc8410::ID_ED_25519,
                parameters: None,
            },
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("algorithm", &self.algorithm_name())
            .finish_non_exhaustive()
    }
}

/// A subject public key, held as its X.509 `SubjectPublicKeyInfo`.
///
/// The authority certifies whatever key the caller hands it, so any algorithm
/// that encodes as SPKI is accepted here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey(SubjectPublicKeyInfoOwned);

impl PublicKey {
    pub fn from_der(der: &[u8]) -> Result<Self> {
        Ok(Self(SubjectPublicKeyInfoOwned::from_der(der)?))
    }

    /// Parses the first PEM block of `input` as a `SubjectPublicKeyInfo`.
    pub fn from_pem(input: &[u8]) -> Result<Self> {
        let der = first_block_der(input)?;
        Self::from_der(&der)
    }

    pub fn from_spki(spki: SubjectPublicKeyInfoOwned) -> Self {
        Self(spki)
    }

    pub fn as_spki(&self) -> &SubjectPublicKeyInfoOwned {
        &self.0
    }

    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.0
            .to_der()
            .map_err(|e| CaError::Encoding(e.to_string()))
    }
}

/// Verifies `signature` over `message` with `issuer_key`, for a signature
/// produced under `algorithm`.
pub fn verify_signature(
    issuer_key: &PublicKey,
    algorithm: &AlgorithmIdentifierOwned,
    message: &[u8],
    signature: &[u8],
) -> Result<()> {
    let spki = issuer_key.to_der()?;
    let failed = |e: rsa::signature::Error| CaError::Verification(e.to_string());

    match algorithm.oid {
        rfc5912::SHA_256_WITH_RSA_ENCRYPTION => verify_rsa::<Sha256>(&spki, message, signature),
        rfc5912::SHA_384_WITH_RSA_ENCRYPTION => verify_rsa::<Sha384>(&spki, message, signature),
        rfc5912::SHA_512_WITH_RSA_ENCRYPTION => verify_rsa::<Sha512>(&spki, message, signature),
        rfc5912::ECDSA_WITH_SHA_256 => {
            let key = p256::ecdsa::VerifyingKey::from_public_key_der(&spki)?;
            let signature = p256::ecdsa::Signature::from_der(signature).map_err(failed)?;
            key.verify(message, &signature).map_err(failed)
        }
        rfc5912::ECDSA_WITH_SHA_384 => {
            let key = p384::ecdsa::VerifyingKey::from_public_key_der(&spki)?;
            let signature = p384::ecdsa::Signature::from_der(signature).map_err(failed)?;
            key.verify(message, &signature).map_err(failed)
        }
        rfc5912::ECDSA_WITH_SHA_512 => {
            let point = p521::PublicKey::from_public_key_der(&spki)?.to_sec1_bytes();
            let key = p521::ecdsa::VerifyingKey::from_sec1_bytes(&point).map_err(failed)?;
            let signature = p521::ecdsa::Signature::from_der(signature).map_err(failed)?;
            key.verify(message, &signature).map_err(failed)
        }
        rfc8410::ID_ED_25519 => {
            let key = ed25519_dalek::VerifyingKey::from_public_key_der(&spki)?;
            let signature = ed25519_dalek::Signature::from_slice(signature).map_err(failed)?;
            key.verify(message, &signature).map_err(failed)
        }
        other => Err(CaError::UnsupportedKeyType(format!(
            "signature algorithm {}",
            oid_name(other)
        ))),
    }
}

fn verify_rsa<D>(spki: &[u8], message: &[u8], signature: &[u8]) -> Result<()>
where
    D: Digest + const_oid::AssociatedOid,
{
    let failed = |e: rsa::signature::Error| CaError::Verification(e.to_string());
    let key = RsaPublicKey::from_public_key_der(spki)?;
    let signature = pkcs1v15::Signature::try_from(signature).map_err(failed)?;
    pkcs1v15::VerifyingKey::<D>::new(key)
        .verify(message, &signature)
        .map_err(failed)
}

fn oid_name(oid: ObjectIdentifier) -> String {
    DB.by_oid(&oid)
        .map(str::to_string)
        .unwrap_or_else(|| oid.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_key_types() -> Vec<KeyPair> {
        vec![
            KeyPair::generate_rsa(2048).unwrap(),
            KeyPair::generate_ecdsa_p256(),
            KeyPair::generate_ecdsa_p384(),
            KeyPair::generate_ecdsa_p521(),
            KeyPair::generate_ed25519(),
        ]
    }

    #[test]
    fn test_pkcs8_pem_reload_keeps_public_key() {
        for key in all_key_types() {
            let pem = key.to_pkcs8_pem().unwrap();
            let loaded = KeyPair::from_pkcs8_pem(pem.as_bytes()).unwrap();
            assert_eq!(loaded.algorithm_name(), key.algorithm_name());
            assert_eq!(loaded.public_key().unwrap(), key.public_key().unwrap());
        }
    }

    #[test]
    fn test_signatures_verify_with_public_key() {
        for key in all_key_types() {
            let message = b"to be signed";
            let signature = key.sign_data(message).unwrap();
            let public_key = key.public_key().unwrap();
            verify_signature(&public_key, &key.signature_algorithm(), message, &signature)
                .unwrap();

            let err = verify_signature(
                &public_key,
                &key.signature_algorithm(),
                b"something else",
                &signature,
            )
            .unwrap_err();
            assert!(matches!(err, CaError::Verification(_)), "{}", key.algorithm_name());
        }
    }

    #[test]
    fn test_rsa_signatures_with_larger_digests_verify() {
        use rsa::signature::Signer as _;

        let private = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let public_key = KeyPair::Rsa {
            private: Box::new(private.clone()),
        }
        .public_key()
        .unwrap();
        let message = b"peer root certificate";
        let algorithm = |oid| AlgorithmIdentifierOwned {
            oid,
            parameters: Some(Any::from(AnyRef::NULL)),
        };

        let sha384 = pkcs1v15::SigningKey::<Sha384>::new(private.clone()).sign(message);
        verify_signature(
            &public_key,
            &algorithm(rfc5912::SHA_384_WITH_RSA_ENCRYPTION),
            message,
            &sha384.to_vec(),
        )
        .unwrap();

        let sha512 = pkcs1v15::SigningKey::<Sha512>::new(private).sign(message);
        verify_signature(
            &public_key,
            &algorithm(rfc5912::SHA_512_WITH_RSA_ENCRYPTION),
            message,
            &sha512.to_vec(),
        )
        .unwrap();

        let err = verify_signature(
            &public_key,
            &algorithm(rfc5912::SHA_384_WITH_RSA_ENCRYPTION),
            message,
            &sha512.to_vec(),
        )
        .unwrap_err();
        assert!(matches!(err, CaError::Verification(_)));
    }

    #[test]
    fn test_p521_key_loads_from_pkcs8() {
        let key = KeyPair::generate_ecdsa_p521();
        let der = match &key {
            KeyPair::EcdsaP521 { secret_key } => secret_key.to_pkcs8_der().unwrap(),
            other => panic!("unexpected key {other:?}"),
        };
        let loaded = KeyPair::from_pkcs8_der(der.as_bytes()).unwrap();
        assert_eq!(loaded.algorithm_name(), "ECDSA P-521");
        assert_eq!(
            loaded.signature_algorithm().oid,
            rfc5912::ECDSA_WITH_SHA_512
        );
        assert_eq!(loaded.public_key().unwrap(), key.public_key().unwrap());
    }

    #[test]
    fn test_x25519_key_is_unsupported() {
        let mut private_key = vec![0x04, 0x20];
        private_key.extend([7u8; 32]);
        let info = PrivateKeyInfo::new(
            pkcs8::AlgorithmIdentifierRef {
                oid: rfc8410::ID_X_25519,
                parameters: None,
            },
            &private_key,
        );
        let der = info.to_der().unwrap();
        let err = KeyPair::from_pkcs8_der(&der).unwrap_err();
        match err {
            CaError::UnsupportedKeyType(name) => assert!(name.contains("X25519"), "{name}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_der_is_parse_error() {
        let pem = crate::pem_utils::der_to_pem(&[0x30, 0x03, 0x02, 0x01], "PRIVATE KEY");
        let err = KeyPair::from_pkcs8_pem(pem.as_bytes()).unwrap_err();
        assert!(matches!(err, CaError::Parse(_)));
    }

    #[test]
    fn test_missing_pem_is_decode_error() {
        let err = KeyPair::from_pkcs8_pem(b"").unwrap_err();
        assert!(matches!(err, CaError::Decode(_)));
    }

    #[test]
    fn test_debug_does_not_print_key_material() {
        let key = KeyPair::generate_ed25519();
        assert_eq!(format!("{key:?}"), "KeyPair { algorithm: \"Ed25519\", .. }");
    }
}
