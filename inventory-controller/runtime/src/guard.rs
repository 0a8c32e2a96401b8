use crate::tls::{self, TrustMaterial};
use rustls::{pki_types::CertificateDer, CipherSuite, ProtocolVersion, ServerConnection};
use std::{net::SocketAddr, sync::Arc};
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    time::{self, Duration},
};
use tokio_rustls::{server::TlsStream, TlsAcceptor};
use tracing::{debug, info};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Terminates mutually-authenticated TLS on accepted connections.
///
/// A connection is only handed to the application once the client has
/// presented a certificate that chains to a trust anchor and the connection
/// has been admitted by the [`VerifyConnection`] policy.
#[derive(Clone)]
pub struct Guard {
    acceptor: TlsAcceptor,
    verify: Arc<dyn VerifyConnection>,
}

/// Describes an established TLS session before it is admitted.
#[derive(Debug)]
pub struct ConnectionInfo<'c> {
    pub client_addr: SocketAddr,
    pub version: Option<ProtocolVersion>,
    pub cipher_suite: Option<CipherSuite>,
    pub server_name: Option<&'c str>,

    /// The client's certificate chain, leaf first.
    pub peer_certificates: &'c [CertificateDer<'static>],
}

/// Decides whether an authenticated connection may proceed.
pub trait VerifyConnection: Send + Sync + 'static {
    fn verify(&self, conn: &ConnectionInfo<'_>) -> bool;
}

/// Logs each verified connection and admits it.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogConnection;

#[derive(Debug, Error)]
pub enum Rejected {
    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] std::io::Error),

    #[error("TLS handshake timed out after {0:?}")]
    Timeout(Duration),

    #[error("client did not present a certificate")]
    NoPeerCertificate,

    #[error("connection verification failed")]
    Verification,
}

// === impl Guard ===

impl Guard {
    pub fn new(trust: &TrustMaterial, verify: impl VerifyConnection) -> Result<Self, tls::Error> {
        let config = trust.server_config()?;
        Ok(Self {
            acceptor: TlsAcceptor::from(config),
            verify: Arc::new(verify),
        })
    }

    /// Completes the TLS handshake and runs the verification policy.
    ///
    /// When an error is returned the connection has been dropped without any
    /// application data being read.
    pub async fn accept<I>(&self, io: I, client_addr: SocketAddr) -> Result<TlsStream<I>, Rejected>
    where
        I: AsyncRead + AsyncWrite + Unpin,
    {
        let tls = time::timeout(HANDSHAKE_TIMEOUT, self.acceptor.accept(io))
            .await
            .map_err(|_| Rejected::Timeout(HANDSHAKE_TIMEOUT))?
            .map_err(Rejected::Handshake)?;

        let (_, conn) = tls.get_ref();
        let info = ConnectionInfo::new(conn, client_addr).ok_or(Rejected::NoPeerCertificate)?;
        if !self.verify.verify(&info) {
            return Err(Rejected::Verification);
        }
        debug!(version = ?info.version, "Connection admitted");
        Ok(tls)
    }
}

impl std::fmt::Debug for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard").finish_non_exhaustive()
    }
}

// === impl ConnectionInfo ===

impl<'c> ConnectionInfo<'c> {
    fn new(conn: &'c ServerConnection, client_addr: SocketAddr) -> Option<Self> {
        Some(Self {
            client_addr,
            version: conn.protocol_version(),
            cipher_suite: conn.negotiated_cipher_suite().map(|s| s.suite()),
            server_name: conn.server_name(),
            peer_certificates: conn.peer_certificates()?,
        })
    }
}

// === impl VerifyConnection ===

impl<F> VerifyConnection for F
where
    F: Fn(&ConnectionInfo<'_>) -> bool + Send + Sync + 'static,
{
    fn verify(&self, conn: &ConnectionInfo<'_>) -> bool {
        (self)(conn)
    }
}

impl VerifyConnection for LogConnection {
    fn verify(&self, conn: &ConnectionInfo<'_>) -> bool {
        info!(
            client.addr = %conn.client_addr,
            version = ?conn.version,
            cipher_suite = ?conn.cipher_suite,
            server_name = ?conn.server_name,
            certificates = conn.peer_certificates.len(),
            "Verifying client",
        );
        true
    }
}
