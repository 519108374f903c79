//! TLS for the stream channel.
//!
//! Analysis servers on a local network usually run with a self-signed
//! certificate. The connector accepts any server certificate without
//! checking its chain or name; only the handshake signatures are verified.
//! Encryption is provided, server authentication is not.

use std::sync::Arc;

use fitstream_core::TransportError;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{ring, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

/// Accepts every server certificate; checks handshake signatures with the
/// ring provider's algorithms.
#[derive(Debug)]
struct AcceptAnyServerCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl AcceptAnyServerCert {
    fn new() -> Self {
        Self { algorithms: ring::default_provider().signature_verification_algorithms }
    }
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        debug!("Accepting {}-byte certificate from {:?} unverified", end_entity.len(), server_name);
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

fn connector() -> TlsConnector {
    // Ignored if a provider is already installed.
    let _ = ring::default_provider().install_default();

    let config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert::new()))
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

/// SNI name for `host`; IP literals and DNS names are both accepted.
pub(crate) fn server_name(host: &str) -> Result<ServerName<'static>, TransportError> {
    if let Ok(ip) = host.parse::<std::net::IpAddr>() {
        return Ok(ServerName::IpAddress(ip.into()));
    }
    ServerName::try_from(host.to_owned()).map_err(|_| TransportError::ConnectFailed {
        reason: format!("invalid hostname: {host}"),
    })
}

/// Run the client handshake over an established TCP stream.
pub(crate) async fn handshake(host: &str, tcp: TcpStream) -> Result<TlsStream<TcpStream>, TransportError> {
    let name = server_name(host)?;
    let tls = connector()
        .connect(name, tcp)
        .await
        .map_err(|e| TransportError::ConnectFailed { reason: format!("TLS handshake with {host}: {e}") })?;
    debug!("TLS handshake complete with {}", host);
    Ok(tls)
}
