//! Shared outbound HTTP client used by the probe and the webhook sender.

use bytes::Bytes;
use http_body_util::Full;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use once_cell::sync::OnceCell;
use rustls::{ClientConfig, RootCertStore};
use std::sync::Arc;

pub type HttpClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// User agent sent with every probe and webhook request.
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

static TLS_CONFIG: OnceCell<Arc<ClientConfig>> = OnceCell::new();

/// Installs the ring crypto provider as process default. Safe to call more
/// than once.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// TLS client configuration built once per process.
pub fn get_shared_tls_config() -> Arc<ClientConfig> {
    TLS_CONFIG
        .get_or_init(|| {
            install_crypto_provider();
            let mut root_cert_store = RootCertStore::empty();
            root_cert_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

            let config = ClientConfig::builder()
                .with_root_certificates(root_cert_store)
                .with_no_client_auth();

            Arc::new(config)
        })
        .clone()
}

/// Builds a pooled client that speaks both `http://` and `https://`.
///
/// The client never follows redirects; callers see 3xx responses as-is.
pub fn build_http_client() -> HttpClient {
    let https = HttpsConnectorBuilder::new()
        .with_tls_config((*get_shared_tls_config()).clone())
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .build();
    Client::builder(TokioExecutor::new()).build(https)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_tls_config() {
        let config1 = get_shared_tls_config();
        let config2 = get_shared_tls_config();

        assert!(Arc::ptr_eq(&config1, &config2));
    }

    #[test]
    fn user_agent_names_the_crate() {
        assert!(USER_AGENT.starts_with("pulsewatch/"));
    }
}
