//! Service-account credential bootstrap and the shared, mutex-guarded
//! bearer token the actuator refreshes on 401.

use std::sync::Mutex;

use anyhow::{Context, Result};
use reqwest::{Certificate, Client};

const NAMESPACE_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";
const TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
const CA_CERT_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// Bearer token shared across container workers, refreshed in place on 401.
///
/// Workers read a snapshot of the token at the start of a PATCH attempt,
/// not while awaiting the response, so a refresh never races a concurrent
/// read of a stale value mid-flight (read-copy-update).
pub struct TokenStore {
    inner: Mutex<String>,
}

impl TokenStore {
    pub fn new(token: String) -> Self {
        Self {
            inner: Mutex::new(token),
        }
    }

    pub fn snapshot(&self) -> String {
        self.inner.lock().expect("token mutex poisoned").clone()
    }

    /// Re-read the token from the service-account mount and atomically swap
    /// it in. Returns the new token.
    pub fn refresh(&self) -> Result<String> {
        let token = read_token()?;
        *self.inner.lock().expect("token mutex poisoned") = token.clone();
        Ok(token)
    }
}

fn read_token() -> Result<String> {
    std::fs::read_to_string(TOKEN_PATH)
        .with_context(|| format!("failed to read {TOKEN_PATH}"))
        .map(|s| s.trim().to_string())
}

/// Everything read once at process startup: the pod's own namespace, the
/// initial bearer token, and an HTTPS client trusting the cluster's CA.
pub struct Bootstrap {
    pub namespace: String,
    pub pod_name: String,
    pub token: TokenStore,
    pub client: Client,
}

impl Bootstrap {
    /// Load the service-account mount and build the shared HTTP client.
    /// Any failure here is fatal — kondense cannot run without them.
    pub fn load() -> Result<Self> {
        let pod_name = std::env::var("HOSTNAME").context("HOSTNAME is not set")?;

        let namespace = std::fs::read_to_string(NAMESPACE_PATH)
            .with_context(|| format!("failed to read {NAMESPACE_PATH}"))?
            .trim()
            .to_string();

        let token = read_token()?;

        let ca_pem = std::fs::read(CA_CERT_PATH)
            .with_context(|| format!("failed to read {CA_CERT_PATH}"))?;
        let ca_cert = Certificate::from_pem(&ca_pem).context("invalid CA certificate")?;

        let client = Client::builder()
            .add_root_certificate(ca_cert)
            .timeout(std::time::Duration::from_secs(2))
            .build()
            .context("failed to build HTTPS client")?;

        Ok(Self {
            namespace,
            pod_name,
            token: TokenStore::new(token),
            client,
        })
    }
}
