use rustls::{
    crypto::CryptoProvider,
    pki_types::{CertificateDer, PrivateKeyDer},
    server::WebPkiClientVerifier,
    ClientConfig, RootCertStore, ServerConfig, SupportedProtocolVersion,
};
use std::{
    fs,
    io::{self, Cursor},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Connections are pinned to TLS 1.3. Its cipher suites are not configurable,
/// so suite selection is left to the handshake.
static PROTOCOL_VERSIONS: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13];

/// Trust anchors and (optionally) an end-entity identity.
///
/// The trust anchors are PEM-encoded X.509 certificates. Servers use them to
/// validate client certificates; clients use them to validate the server. The
/// identity is a PEM certificate chain and its PKCS#8, PKCS#1 or SEC1 private
/// key. Servers must have an identity; clients without one cannot complete a
/// mutually-authenticated handshake.
///
/// Trust material is loaded once and never modified, so it may be shared
/// freely between connections.
#[derive(Clone, Debug)]
pub struct TrustMaterial {
    roots: Arc<RootCertStore>,
    identity: Option<Identity>,
}

#[derive(Debug)]
struct Identity {
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse PEM: {0}")]
    Pem(#[source] io::Error),

    #[error("no valid trust anchors")]
    NoTrustAnchors,

    #[error("no certificates found")]
    NoCertificates,

    #[error("no private key found")]
    NoPrivateKey,

    #[error("a certificate and private key are required")]
    NoIdentity,

    #[error("invalid client certificate verifier: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),

    #[error("invalid TLS configuration: {0}")]
    Config(#[from] rustls::Error),
}

// === impl TrustMaterial ===

impl TrustMaterial {
    /// Loads trust anchors from a PEM file.
    pub fn load(trust_anchors: &Path) -> Result<Self, Error> {
        let pem = read(trust_anchors)?;
        let trust = Self::from_pem(&pem)?;
        info!(path = %trust_anchors.display(), "Loaded trust anchors");
        Ok(trust)
    }

    pub fn from_pem(trust_anchors: &[u8]) -> Result<Self, Error> {
        let certs = certs(trust_anchors)?;
        let mut roots = RootCertStore::empty();
        let (added, skipped) = roots.add_parsable_certificates(certs);
        if skipped != 0 {
            warn!("Skipped {skipped} invalid trust anchors");
        }
        if added == 0 {
            return Err(Error::NoTrustAnchors);
        }
        debug!(added, "Parsed trust anchors");
        Ok(Self {
            roots: Arc::new(roots),
            identity: None,
        })
    }

    /// Loads an end-entity certificate chain and private key from PEM files.
    pub fn with_identity_files(self, cert: &Path, key: &Path) -> Result<Self, Error> {
        let cert_pem = read(cert)?;
        let key_pem = read(key)?;
        self.with_identity_pem(&cert_pem, &key_pem)
    }

    pub fn with_identity_pem(self, cert: &[u8], key: &[u8]) -> Result<Self, Error> {
        let certs = certs(cert)?;
        if certs.is_empty() {
            return Err(Error::NoCertificates);
        }
        let key = rustls_pemfile::private_key(&mut Cursor::new(key))
            .map_err(Error::Pem)?
            .ok_or(Error::NoPrivateKey)?;
        Ok(Self {
            identity: Some(Identity { certs, key }),
            ..self
        })
    }

    /// Builds a server configuration that requires every client to present a
    /// certificate issued by one of the trust anchors.
    pub fn server_config(&self) -> Result<Arc<ServerConfig>, Error> {
        let Identity { certs, key } = self.identity.as_ref().ok_or(Error::NoIdentity)?;
        let provider = provider();
        let verifier =
            WebPkiClientVerifier::builder_with_provider(self.roots.clone(), provider.clone())
                .build()?;
        let mut config = ServerConfig::builder_with_provider(provider)
            .with_protocol_versions(PROTOCOL_VERSIONS)?
            .with_client_cert_verifier(verifier)
            .with_single_cert(certs.clone(), key.clone_key())?;
        config.alpn_protocols = vec![b"http/1.1".to_vec()];
        Ok(Arc::new(config))
    }

    /// Builds a client configuration that validates the server against the
    /// trust anchors and presents the identity, if one was configured.
    pub fn client_config(&self) -> Result<Arc<ClientConfig>, Error> {
        let builder = ClientConfig::builder_with_provider(provider())
            .with_protocol_versions(PROTOCOL_VERSIONS)?
            .with_root_certificates(self.roots.clone());
        let mut config = match &self.identity {
            Some(Identity { certs, key }) => {
                builder.with_client_auth_cert(certs.clone(), key.clone_key())?
            }
            None => builder.with_no_client_auth(),
        };
        config.alpn_protocols = vec![b"http/1.1".to_vec()];
        Ok(Arc::new(config))
    }
}

impl Clone for Identity {
    fn clone(&self) -> Self {
        Self {
            certs: self.certs.clone(),
            key: self.key.clone_key(),
        }
    }
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, Error> {
    rustls_pemfile::certs(&mut Cursor::new(pem))
        .collect::<Result<Vec<_>, _>>()
        .map_err(Error::Pem)
}

fn read(path: &Path) -> Result<Vec<u8>, Error> {
    fs::read(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
pub(crate) mod testdata {
    use super::TrustMaterial;

    pub const CA: &[u8] = include_bytes!("testdata/ca.crt");
    pub const SERVER_CERT: &[u8] = include_bytes!("testdata/server.crt");
    pub const SERVER_KEY: &[u8] = include_bytes!("testdata/server.key");
    pub const CLIENT_CERT: &[u8] = include_bytes!("testdata/client.crt");
    pub const CLIENT_KEY: &[u8] = include_bytes!("testdata/client.key");
    pub const UNTRUSTED_CLIENT_CERT: &[u8] = include_bytes!("testdata/untrusted-client.crt");
    pub const UNTRUSTED_CLIENT_KEY: &[u8] = include_bytes!("testdata/untrusted-client.key");

    pub fn server() -> TrustMaterial {
        TrustMaterial::from_pem(CA)
            .and_then(|t| t.with_identity_pem(SERVER_CERT, SERVER_KEY))
            .expect("server trust material must be valid")
    }

    pub fn client() -> TrustMaterial {
        TrustMaterial::from_pem(CA)
            .and_then(|t| t.with_identity_pem(CLIENT_CERT, CLIENT_KEY))
            .expect("client trust material must be valid")
    }

    pub fn untrusted_client() -> TrustMaterial {
        TrustMaterial::from_pem(CA)
            .and_then(|t| t.with_identity_pem(UNTRUSTED_CLIENT_CERT, UNTRUSTED_CLIENT_KEY))
            .expect("untrusted client trust material must parse")
    }

    pub fn anonymous_client() -> TrustMaterial {
        TrustMaterial::from_pem(CA).expect("trust anchors must be valid")
    }
}
