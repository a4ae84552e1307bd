//! TLS session stream (rustls)
//!
//! Certificate verification uses the webpki root set, optionally extended
//! with a caller-provided CA bundle. Verification can be disabled for
//! trusted private endpoints; that is a caller-provided trust decision and
//! is logged loudly at connect time.

use std::fs::File;
use std::io::BufReader as StdBufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use super::{LinkStream, LinkTransport};
use crate::error::LinkError;

/// TLS trust options for the control-plane endpoint.
#[derive(Debug, Clone)]
pub struct TlsOptions {
    /// Verify the server certificate (default). Disabling is a deliberate
    /// trust decision for private endpoints.
    pub verify: bool,
    /// Additional CA bundle (PEM) trusted alongside the webpki roots.
    pub ca_bundle: Option<PathBuf>,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            verify: true,
            ca_bundle: None,
        }
    }
}

/// TLS transport for the control-plane session.
pub struct TlsLinkTransport {
    addr: String,
    server_name: ServerName<'static>,
    connector: TlsConnector,
    verify: bool,
}

impl TlsLinkTransport {
    pub fn new(host: &str, port: u16, options: &TlsOptions) -> Result<Self, LinkError> {
        let config = if options.verify {
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            if let Some(path) = &options.ca_bundle {
                add_ca_bundle(&mut roots, path)?;
            }
            ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth()
        } else {
            let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerification(provider)))
                .with_no_client_auth()
        };

        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| LinkError::InvalidEndpoint(format!("{host}: {e}")))?;

        Ok(Self {
            addr: format!("{host}:{port}"),
            server_name,
            connector: TlsConnector::from(Arc::new(config)),
            verify: options.verify,
        })
    }
}

fn add_ca_bundle(roots: &mut RootCertStore, path: &Path) -> Result<(), LinkError> {
    let file = File::open(path)
        .map_err(|e| LinkError::Tls(format!("CA bundle {}: {e}", path.display())))?;
    let mut reader = StdBufReader::new(file);
    for cert in rustls_pemfile::certs(&mut reader) {
        let cert =
            cert.map_err(|e| LinkError::Tls(format!("CA bundle {}: {e}", path.display())))?;
        roots
            .add(cert)
            .map_err(|e| LinkError::Tls(format!("CA bundle {}: {e}", path.display())))?;
    }
    Ok(())
}

#[async_trait]
impl LinkTransport for TlsLinkTransport {
    async fn connect(&self) -> Result<LinkStream, LinkError> {
        debug!(addr = %self.addr, "Opening TLS session");
        if !self.verify {
            warn!(addr = %self.addr, "TLS certificate verification is disabled");
        }
        let tcp = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| LinkError::ConnectionFailed(e.to_string()))?;
        let _ = tcp.set_nodelay(true);
        let tls = self
            .connector
            .connect(self.server_name.clone(), tcp)
            .await
            .map_err(|e| LinkError::ConnectionFailed(format!("TLS handshake: {e}")))?;
        let (read, write) = tokio::io::split(tls);
        Ok(LinkStream {
            reader: Box::new(BufReader::new(read)),
            writer: Box::new(write),
        })
    }
}

/// Accept-anything verifier used when `TlsOptions::verify` is off.
///
/// Signature checks still run so a malformed handshake fails; only the
/// chain-of-trust check is skipped.
#[derive(Debug)]
struct NoVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
