//! Mutual TLS credentials.
//!
//! Every validator holds a certificate chain and private key, plus a
//! directory of trusted peer authority certificates. The same material
//! backs both sides of a connection: the listener demands a client
//! certificate chaining to a trusted authority, and the connector presents
//! its own chain while verifying the listener's.

use crate::error::{NetError, Result};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::debug;

/// Loaded certificate material for one validator.
#[derive(Debug)]
pub struct TlsCredentials {
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    trusted: RootCertStore,
}

impl Clone for TlsCredentials {
    fn clone(&self) -> Self {
        Self {
            cert_chain: self.cert_chain.clone(),
            key: self.key.clone_key(),
            trusted: self.trusted.clone(),
        }
    }
}

impl TlsCredentials {
    /// Build credentials from DER material.
    pub fn new(
        cert_chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
        trusted: Vec<CertificateDer<'static>>,
    ) -> Result<Self> {
        if cert_chain.is_empty() {
            return Err(NetError::Credentials("empty certificate chain".into()));
        }

        let mut roots = RootCertStore::empty();
        for cert in trusted {
            roots.add(cert)?;
        }
        if roots.is_empty() {
            return Err(NetError::Credentials(
                "no trusted peer authorities loaded".into(),
            ));
        }

        Ok(Self {
            cert_chain,
            key,
            trusted: roots,
        })
    }

    /// Build credentials from PEM text.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8], trusted_pems: &[&[u8]]) -> Result<Self> {
        let cert_chain = parse_certs(cert_pem)?;
        let key = parse_key(key_pem)?;
        let mut trusted = Vec::new();
        for pem in trusted_pems {
            trusted.extend(parse_certs(pem)?);
        }
        Self::new(cert_chain, key, trusted)
    }

    /// Load a PEM certificate chain, a PEM private key, and every PEM
    /// certificate in `trusted_dir`.
    pub fn load(cert_path: &Path, key_path: &Path, trusted_dir: &Path) -> Result<Self> {
        let cert_chain = parse_certs(&read(cert_path)?)?;
        let key = parse_key(&read(key_path)?)?;

        let mut trusted = Vec::new();
        for path in trusted_files(trusted_dir)? {
            let certs = parse_certs(&read(&path)?)?;
            debug!(path = %path.display(), count = certs.len(), "loaded trusted authorities");
            trusted.extend(certs);
        }

        Self::new(cert_chain, key, trusted)
    }

    /// Listener config: present our chain, require a trusted client certificate.
    pub fn server_config(&self) -> Result<Arc<ServerConfig>> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let verifier =
            WebPkiClientVerifier::builder_with_provider(Arc::new(self.trusted.clone()), provider.clone())
                .build()
                .map_err(|e| NetError::Credentials(e.to_string()))?;

        let config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_client_cert_verifier(verifier)
            .with_single_cert(self.cert_chain.clone(), self.key.clone_key())?;
        Ok(Arc::new(config))
    }

    /// Connector config: verify the server against trusted authorities and
    /// present our chain as the client certificate.
    pub fn client_config(&self) -> Result<Arc<ClientConfig>> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_root_certificates(self.trusted.clone())
            .with_client_auth_cert(self.cert_chain.clone(), self.key.clone_key())?;
        Ok(Arc::new(config))
    }

    pub fn acceptor(&self) -> Result<TlsAcceptor> {
        Ok(TlsAcceptor::from(self.server_config()?))
    }

    pub fn connector(&self) -> Result<TlsConnector> {
        Ok(TlsConnector::from(self.client_config()?))
    }

    /// Number of trusted peer authorities.
    pub fn trusted_count(&self) -> usize {
        self.trusted.len()
    }
}

/// TLS server name for a validator identity from the discovery file.
pub fn server_name(name: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(name.to_owned()).map_err(|_| NetError::InvalidServerName(name.to_owned()))
}

/// Whether the end-entity certificate `cert` names `name` (a DNS name or
/// IP address) in its subject alternative names.
pub fn certificate_names(cert: &CertificateDer<'_>, name: &str) -> bool {
    let Ok(name) = server_name(name) else {
        return false;
    };
    webpki::EndEntityCert::try_from(cert)
        .map(|ee| ee.verify_is_valid_for_subject_name(&name).is_ok())
        .unwrap_or(false)
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| NetError::Credentials(format!("cannot read {}: {e}", path.display())))
}

fn parse_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    rustls_pemfile::certs(&mut BufReader::new(pem))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| NetError::Credentials(format!("malformed certificate PEM: {e}")))
}

fn parse_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut BufReader::new(pem))
        .map_err(|e| NetError::Credentials(format!("malformed private key PEM: {e}")))?
        .ok_or_else(|| NetError::Credentials("no private key found".into()))
}

/// PEM files in `dir`, sorted by name.
fn trusted_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| NetError::Credentials(format!("cannot read {}: {e}", dir.display())))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_pem = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("pem" | "crt")
        );
        if path.is_file() && is_pem {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};

    fn authority() -> (rcgen::Certificate, KeyPair) {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params
            .distinguished_name
            .push(DnType::CommonName, "pkchain test authority");
        let cert = params.self_signed(&key).unwrap();
        (cert, key)
    }

    fn leaf(name: &str, ca: &rcgen::Certificate, ca_key: &KeyPair) -> (String, String) {
        let key = KeyPair::generate().unwrap();
        let params = CertificateParams::new(vec![name.to_string()]).unwrap();
        let cert = params.signed_by(&key, ca, ca_key).unwrap();
        (cert.pem(), key.serialize_pem())
    }

    #[test]
    fn test_from_pem_builds_both_configs() {
        let (ca, ca_key) = authority();
        let (cert, key) = leaf("alpha.local", &ca, &ca_key);
        let ca_pem = ca.pem();

        let creds =
            TlsCredentials::from_pem(cert.as_bytes(), key.as_bytes(), &[ca_pem.as_bytes()])
                .unwrap();
        assert_eq!(creds.trusted_count(), 1);
        assert!(creds.server_config().is_ok());
        assert!(creds.client_config().is_ok());
        assert!(creds.clone().acceptor().is_ok());
    }

    #[test]
    fn test_missing_key_rejected() {
        let (ca, ca_key) = authority();
        let (cert, _) = leaf("alpha.local", &ca, &ca_key);
        let ca_pem = ca.pem();

        let result = TlsCredentials::from_pem(cert.as_bytes(), b"", &[ca_pem.as_bytes()]);
        assert!(matches!(result, Err(NetError::Credentials(_))));
    }

    #[test]
    fn test_no_trusted_authorities_rejected() {
        let (ca, ca_key) = authority();
        let (cert, key) = leaf("alpha.local", &ca, &ca_key);

        let result = TlsCredentials::from_pem(cert.as_bytes(), key.as_bytes(), &[]);
        assert!(matches!(result, Err(NetError::Credentials(_))));
    }

    #[test]
    fn test_load_reads_trusted_directory() {
        let (ca, ca_key) = authority();
        let (other_ca, _) = authority();
        let (cert, key) = leaf("alpha.local", &ca, &ca_key);

        let dir = tempfile::tempdir().unwrap();
        let trusted = dir.path().join("validators");
        std::fs::create_dir(&trusted).unwrap();
        std::fs::write(dir.path().join("cert.pem"), cert).unwrap();
        std::fs::write(dir.path().join("key.pem"), key).unwrap();
        std::fs::write(trusted.join("a.pem"), ca.pem()).unwrap();
        std::fs::write(trusted.join("b.crt"), other_ca.pem()).unwrap();
        std::fs::write(trusted.join("notes.txt"), "ignored").unwrap();

        let creds = TlsCredentials::load(
            &dir.path().join("cert.pem"),
            &dir.path().join("key.pem"),
            &trusted,
        )
        .unwrap();
        assert_eq!(creds.trusted_count(), 2);
    }

    #[test]
    fn test_certificate_names_matches_subject_alt_name() {
        let (ca, ca_key) = authority();
        let key = KeyPair::generate().unwrap();
        let cert = CertificateParams::new(vec!["beta.local".to_string()])
            .unwrap()
            .signed_by(&key, &ca, &ca_key)
            .unwrap();

        assert!(certificate_names(cert.der(), "beta.local"));
        assert!(!certificate_names(cert.der(), "alpha.local"));
        assert!(!certificate_names(cert.der(), "not a name"));
        assert!(!certificate_names(&CertificateDer::from(vec![0u8; 4]), "beta.local"));
    }

    #[test]
    fn test_server_name() {
        assert!(server_name("alpha.local").is_ok());
        assert!(server_name("127.0.0.1").is_ok());
        assert!(matches!(
            server_name("not a name"),
            Err(NetError::InvalidServerName(_))
        ));
    }
}
