#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use federation_ca::cert::Certificate;
use federation_ca::cert::params::{DistinguishedName, IssuanceRequest};
use federation_ca::issuer::self_signed_root;
use federation_ca::key::{KeyPair, Signer};
use tempfile::TempDir;
use time::Duration;

/// Root CA material written to a temporary directory.
pub struct RootFiles {
    pub dir: TempDir,
    pub cert: Certificate,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

pub fn root_subject() -> DistinguishedName {
    DistinguishedName::builder()
        .common_name("Federation Root CA".to_string())
        .organization("Example Federation".to_string())
        .build()
}

pub fn generate_root_files(key: KeyPair) -> RootFiles {
    let cert = self_signed_root(&key, &root_subject(), Duration::days(365)).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let cert_path = dir.path().join("root.crt");
    let key_path = dir.path().join("root.key");
    fs::write(&cert_path, cert.to_pem()).unwrap();
    fs::write(&key_path, key.to_pkcs8_pem().unwrap()).unwrap();

    RootFiles {
        dir,
        cert,
        cert_path,
        key_path,
    }
}

pub fn member_request(trust_domain: &str, ttl: Duration) -> IssuanceRequest {
    let member_key = KeyPair::generate_ecdsa_p256();
    IssuanceRequest::builder()
        .public_key(member_key.public_key().unwrap())
        .subject(
            DistinguishedName::builder()
                .common_name(trust_domain.to_string())
                .build(),
        )
        .uris(vec![format!("spiffe://{trust_domain}").parse().unwrap()])
        .ttl(ttl)
        .build()
}
