use crate::{
    guard::{Guard, LogConnection},
    http::Handler,
    k8s::ClusterClient,
    server,
    tls::TrustMaterial,
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::{net::SocketAddr, path::PathBuf};
use tokio::net::TcpListener;
use tracing::{info_span, warn, Instrument};

#[derive(Debug, Parser)]
#[clap(name = "inventory", about = "Serves an inventory of cluster workloads")]
pub struct Args {
    #[clap(
        long,
        default_value = "inventory=info,warn",
        env = "INVENTORY_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Address on which the inventory API is served.
    #[clap(long, default_value = "0.0.0.0:8443")]
    addr: SocketAddr,

    /// PEM-encoded trust anchors used to verify client certificates.
    #[clap(long, default_value = "/var/run/inventory/tls/ca.crt")]
    ca_cert: PathBuf,

    /// PEM-encoded server certificate chain.
    #[clap(long, default_value = "/var/run/inventory/tls/tls.crt")]
    server_cert: PathBuf,

    /// PEM-encoded server private key.
    #[clap(long, default_value = "/var/run/inventory/tls/tls.key")]
    server_key: PathBuf,

    /// Serves the API over plaintext HTTP without client authentication.
    #[clap(long)]
    tls_disabled: bool,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            admin,
            addr,
            ca_cert,
            server_cert,
            server_key,
            tls_disabled,
        } = self;

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_admin(admin.into_builder())
            .with_client(client)
            .build()
            .await?;

        // Trust material is loaded once; a failure here is fatal.
        let guard = if tls_disabled {
            warn!("TLS is disabled; clients will not be authenticated");
            None
        } else {
            let trust = TrustMaterial::load(&ca_cert)
                .and_then(|t| t.with_identity_files(&server_cert, &server_key))
                .context("failed to load TLS credentials")?;
            Some(Guard::new(&trust, LogConnection).context("invalid TLS configuration")?)
        };

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        let handler = Handler::new(ClusterClient::new(runtime.client()));
        tokio::spawn(
            server::serve(listener, guard, handler, runtime.shutdown_handle())
                .instrument(info_span!("inventory")),
        );

        // Block the main thread on the shutdown signal. Once it fires, wait for
        // open connections to complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
