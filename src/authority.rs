//! The signing authority: root material loaded once at startup, then shared
//! read-only by every issuance.

use std::io;
use std::path::Path;

use time::OffsetDateTime;
use tracing::info;

use crate::bundle::{ValidationBundle, load_validation_bundle};
use crate::cert::params::IssuanceRequest;
use crate::cert::{Certificate, load_root_certificate};
use crate::config::{AuthorityConfig, IssuancePolicy};
use crate::error::{CaError, Material, Result};
use crate::issuer::Issuer;
use crate::key::KeyPair;

/// Source of the bytes behind configured file paths.
pub trait MaterialReader {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Reads material from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystem;

impl MaterialReader for FileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

/// Everything loaded by a successful `configure`.
#[derive(Debug)]
pub struct RootMaterial {
    key: KeyPair,
    certificate: Certificate,
    validation_bundle: ValidationBundle,
    policy: IssuancePolicy,
}

impl RootMaterial {
    pub fn new(
        key: KeyPair,
        certificate: Certificate,
        validation_bundle: ValidationBundle,
        policy: IssuancePolicy,
    ) -> Self {
        Self {
            key,
            certificate,
            validation_bundle,
            policy,
        }
    }

    pub fn validation_bundle(&self) -> &ValidationBundle {
        &self.validation_bundle
    }
}

impl Issuer for RootMaterial {
    type Key = KeyPair;

    fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    fn signing_key(&self) -> &KeyPair {
        &self.key
    }

    fn policy(&self) -> &IssuancePolicy {
        &self.policy
    }
}

/// A local signing CA with access to its root key and certificate via paths.
///
/// Starts unconfigured. [`configure`](Self::configure) either loads all root
/// material or leaves the authority untouched; it succeeds at most once.
/// Afterwards the authority is immutable and can be shared across threads
/// for concurrent issuance.
#[derive(Debug, Default)]
pub struct SigningAuthority {
    root: Option<RootMaterial>,
}

impl SigningAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps root material that was loaded some other way.
    pub fn from_root_material(root: RootMaterial) -> Self {
        Self { root: Some(root) }
    }

    pub fn is_configured(&self) -> bool {
        self.root.is_some()
    }

    /// Loads root key, root certificate and validation bundle from the
    /// filesystem, in that order.
    pub fn configure(&mut self, config: &AuthorityConfig) -> Result<()> {
        self.configure_with(config, &FileSystem)
    }

    /// Like [`configure`](Self::configure), reading files through `reader`.
    ///
    /// Empty key or certificate paths are rejected before anything is read.
    /// The first failure is returned and no material is retained.
    pub fn configure_with<R>(&mut self, config: &AuthorityConfig, reader: &R) -> Result<()>
    where
        R: MaterialReader + ?Sized,
    {
        if self.root.is_some() {
            return Err(CaError::AlreadyConfigured);
        }
        if config.key_file_path.as_os_str().is_empty() {
            return Err(CaError::MissingField("key path"));
        }
        if config.cert_file_path.as_os_str().is_empty() {
            return Err(CaError::MissingField("cert path"));
        }
        let bundle_path = config.validation_material_path();
        if bundle_path.as_os_str().is_empty() {
            return Err(CaError::MissingField("validation material path"));
        }

        let key = load(reader, Material::RootKey, &config.key_file_path, KeyPair::from_pkcs8_pem)?;
        let certificate = load(
            reader,
            Material::RootCertificate,
            &config.cert_file_path,
            load_root_certificate,
        )?;
        let validation_bundle = load(
            reader,
            Material::ValidationBundle,
            bundle_path,
            load_validation_bundle,
        )?;

        info!(
            key_algorithm = key.algorithm_name(),
            root_subject = %certificate.subject().common_name,
            trusted_cas = validation_bundle.len(),
            "signing authority configured"
        );

        self.root = Some(RootMaterial::new(
            key,
            certificate,
            validation_bundle,
            config.policy.clone(),
        ));
        Ok(())
    }

    fn root(&self) -> Result<&RootMaterial> {
        self.root.as_ref().ok_or(CaError::NotConfigured)
    }

    /// Issues a leaf certificate signed by the root for `request`.
    pub fn issue_signing_certificate(&self, request: &IssuanceRequest) -> Result<Certificate> {
        self.root()?.issue(request)
    }

    /// Issues a leaf certificate as if the current time were `now`.
    pub fn issue_signing_certificate_at(
        &self,
        request: &IssuanceRequest,
        now: OffsetDateTime,
    ) -> Result<Certificate> {
        self.root()?.issue_at(request, now)
    }

    /// The CA certificates trusted for validating peer material.
    pub fn retrieve_validation_material(&self) -> Result<&ValidationBundle> {
        Ok(self.root()?.validation_bundle())
    }

    /// The authority's own certificate.
    pub fn root_certificate(&self) -> Result<&Certificate> {
        Ok(self.root()?.certificate())
    }
}

fn load<R, T>(
    reader: &R,
    material: Material,
    path: &Path,
    parse: impl FnOnce(&[u8]) -> Result<T>,
) -> Result<T>
where
    R: MaterialReader + ?Sized,
{
    let wrap = |source: CaError| CaError::Load {
        material,
        path: path.to_path_buf(),
        source: Box::new(source),
    };

    let bytes = reader.read(path).map_err(|source| {
        wrap(CaError::Io {
            path: path.to_path_buf(),
            source,
        })
    })?;
    parse(&bytes).map_err(wrap)
}
