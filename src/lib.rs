//! # federation-ca - Signing Authority for a SPIFFE Federation
//!
//! Trust domains that join a federation obtain short-lived signing
//! certificates from a central authority and validate material received from
//! their peers against a bundle of trusted CAs. This crate is that authority,
//! built entirely with rustcrypto libraries.
//!
//! ## Supported Key Types
//!
//! Root keys are read from unencrypted PKCS#8 PEM:
//! - **RSA**: signed with PKCS#1 v1.5 and SHA-256
//! - **ECDSA**: P-256 (SHA-256), P-384 (SHA-384) and P-521 (SHA-512)
//! - **Ed25519**
//!
//! Any other algorithm is rejected with [`error::CaError::UnsupportedKeyType`].
//!
//! ## Lifecycle
//!
//! A [`SigningAuthority`] starts unconfigured. `configure` loads the root
//! key, root certificate and validation bundle in one step and either
//! succeeds completely or leaves the authority unconfigured. From then on the
//! authority is read-only and can serve issuance from many threads.
//!
//! ```rust,no_run
//! use federation_ca::{
//!     AuthorityConfig, SigningAuthority,
//!     cert::params::{DistinguishedName, IssuanceRequest},
//!     key::{KeyPair, Signer},
//! };
//!
//! # fn main() -> Result<(), federation_ca::error::CaError> {
//! let mut authority = SigningAuthority::new();
//! authority.configure(&AuthorityConfig::new("conf/server/root.crt", "conf/server/root.key"))?;
//!
//! let member_key = KeyPair::generate_ecdsa_p256();
//! let request = IssuanceRequest::builder()
//!     .public_key(member_key.public_key()?)
//!     .subject(
//!         DistinguishedName::builder()
//!             .common_name("member-a.example.org".to_string())
//!             .build(),
//!     )
//!     .uris(vec!["spiffe://member-a.example.org".parse().unwrap()])
//!     .ttl(time::Duration::hours(1))
//!     .build();
//!
//! let certificate = authority.issue_signing_certificate(&request)?;
//! println!("{}", certificate.to_pem());
//!
//! let trusted = authority.retrieve_validation_material()?;
//! assert!(trusted.find_issuer(&certificate).is_some());
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`authority`]: the signing authority and its configuration lifecycle
//! - [`config`]: file paths and issuance policy
//! - [`key`]: root key loading, signing and signature verification
//! - [`cert`]: certificate parsing, extensions and request parameters
//! - [`bundle`]: the validation bundle of trusted CAs
//! - [`template`]: leaf certificate templates
//! - [`issuer`]: the signing engine and self-signed root creation
//! - [`serial`]: random serial numbers
//! - [`error`]: error types

pub mod authority;
pub mod bundle;
pub mod cert;
pub mod config;
pub mod error;
pub mod issuer;
pub mod key;
pub mod pem_utils;
pub mod serial;
pub mod template;

pub use authority::{FileSystem, MaterialReader, RootMaterial, SigningAuthority};
pub use bundle::{ValidationBundle, load_validation_bundle};
pub use cert::{Certificate, load_root_certificate};
pub use config::{AuthorityConfig, IssuancePolicy, ValidationMaterial};
pub use error::{CaError, Result};
pub use key::{KeyPair, PublicKey, Signer};
