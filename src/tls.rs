//! TLS transport for `wss://` URLs.

use std::sync::{Arc, OnceLock};

use monoio::net::TcpStream;
use monoio_rustls::{ClientTlsStream, TlsConnector};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tracing::trace;

use crate::url::WsUrl;

#[derive(thiserror::Error, Debug)]
pub enum TlsErr {
    #[error("invalid DNS name: {0}")]
    Dns(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Rustls(#[from] monoio_rustls::TlsError),
}

/// The upgrade handshake is HTTP/1.1 only, so that is all we offer over ALPN.
const ALPN_HTTP11: &[u8] = b"http/1.1";

static GLOBAL_CONNECTOR: OnceLock<TlsConnector> = OnceLock::new();

/// Connector trusting the webpki root set, built once per process.
pub fn default_connector() -> &'static TlsConnector {
    GLOBAL_CONNECTOR.get_or_init(|| {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        connector_with_roots(roots)
    })
}

/// Connector for a custom trust store, e.g. a private CA.
pub fn connector_with_roots(roots: RootCertStore) -> TlsConnector {
    // Another crate may have installed a provider already.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let mut cfg = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    cfg.alpn_protocols = vec![ALPN_HTTP11.to_vec()];
    TlsConnector::from(Arc::new(cfg))
}

/// Opens TCP to `url` and runs the TLS handshake with its host as SNI.
pub async fn connect_wss(
    url: &WsUrl,
    connector: &TlsConnector,
) -> Result<ClientTlsStream<TcpStream>, TlsErr> {
    let dns = ServerName::try_from(url.host.clone()).map_err(|_| TlsErr::Dns(url.host.clone()))?;
    let tcp = TcpStream::connect((url.host.as_str(), url.port)).await?;
    tcp.set_nodelay(true)?;
    let tls = connector.connect(dns, tcp).await?;
    trace!(host = %url.host, port = url.port, "tls session established");
    Ok(tls)
}
