//! Throwaway PKI and cluster wiring for validator tests.

use pkchain_net::{Discovery, TlsCredentials, TransportConfig};
use pkchain_node::NodeConfig;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair,
};
use std::future::Future;
use std::time::Duration;

pub struct TestPki {
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
            .push(DnType::CommonName, "pkchain cluster authority");
        let ca = params.self_signed(&ca_key).unwrap();
        Self { ca, ca_key }
    }

    pub fn credentials(&self, name: &str) -> TlsCredentials {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec![name.to_string()]).unwrap();
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
        let cert = params.signed_by(&key, &self.ca, &self.ca_key).unwrap();
        TlsCredentials::from_pem(
            cert.pem().as_bytes(),
            key.serialize_pem().as_bytes(),
            &[self.ca.pem().as_bytes()],
        )
        .unwrap()
    }
}

/// A loopback port that was free a moment ago.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Discovery entries on loopback, in the given order.
pub fn discovery(names: &[&str]) -> Discovery {
    let contents: String = names
        .iter()
        .map(|name| format!("{} 127.0.0.1 {}\n", name, free_port()))
        .collect();
    Discovery::parse(&contents).unwrap()
}

pub fn validator_config(name: &str) -> NodeConfig {
    NodeConfig {
        name: name.to_string(),
        min_respondents: 1,
        vote_timeout_ms: 2_000,
        block_interval_ms: 100,
        transport: TransportConfig::local(),
        ..NodeConfig::default()
    }
}

/// Poll `check` until it holds or `secs` elapse.
pub async fn wait_for<F, Fut>(secs: u64, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(secs);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
