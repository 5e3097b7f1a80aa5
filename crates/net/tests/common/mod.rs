//! Throwaway PKI for transport tests.

use pkchain_net::TlsCredentials;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose,
};
use tempfile::TempDir;

/// One authority plus a directory to write validator credentials into.
pub struct TestPki {
    pub dir: TempDir,
    ca: Certificate,
    ca_key: KeyPair,
}

impl TestPki {
    pub fn new() -> Self {
        let ca_key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params
            .distinguished_name
            .push(DnType::CommonName, "pkchain test authority");
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let ca = params.self_signed(&ca_key).unwrap();

        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("trusted")).unwrap();
        std::fs::write(dir.path().join("trusted").join("authority.pem"), ca.pem()).unwrap();

        Self { dir, ca, ca_key }
    }

    /// Issue a certificate for `name`, write it out, and load it back.
    pub fn credentials(&self, name: &str) -> TlsCredentials {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec![name.to_string()]).unwrap();
        params.distinguished_name.push(DnType::CommonName, name);
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
        let cert = params.signed_by(&key, &self.ca, &self.ca_key).unwrap();

        let node_dir = self.dir.path().join(name);
        std::fs::create_dir_all(&node_dir).unwrap();
        std::fs::write(node_dir.join("cert.pem"), cert.pem()).unwrap();
        std::fs::write(node_dir.join("key.pem"), key.serialize_pem()).unwrap();

        TlsCredentials::load(
            &node_dir.join("cert.pem"),
            &node_dir.join("key.pem"),
            &self.dir.path().join("trusted"),
        )
        .unwrap()
    }
}
