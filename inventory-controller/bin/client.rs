#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

use anyhow::{bail, Context, Result};
use clap::Parser;
use inventory_controller_runtime::{client, TrustMaterial};
use std::{io::Write, path::PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Queries an inventory server over mutually-authenticated TLS.
#[derive(Debug, Parser)]
#[clap(name = "inventory-client")]
struct Args {
    #[clap(long, default_value = "warn", env = "INVENTORY_CLIENT_LOG")]
    log_level: String,

    #[clap(long, default_value = "localhost:8443")]
    addr: String,

    /// Name used to validate the server's certificate.
    #[clap(long, default_value = "localhost")]
    server_name: String,

    #[clap(long)]
    ca_cert: PathBuf,

    #[clap(long, requires = "client_key")]
    client_cert: Option<PathBuf>,

    #[clap(long, requires = "client_cert")]
    client_key: Option<PathBuf>,

    /// Exits with an error unless the server responds with a success status.
    #[clap(long)]
    fail: bool,

    #[clap(default_value = "/healthz")]
    path: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let Args {
        log_level,
        addr,
        server_name,
        ca_cert,
        client_cert,
        client_key,
        fail,
        path,
    } = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(log_level)?)
        .with_writer(std::io::stderr)
        .init();

    let mut trust = TrustMaterial::load(&ca_cert)?;
    if let (Some(cert), Some(key)) = (client_cert, client_key) {
        trust = trust.with_identity_files(&cert, &key)?;
    }
    let config = trust.client_config()?;

    debug!(%addr, %path, "Sending request");
    let rsp = client::get(addr.as_str(), &server_name, config, &path)
        .await
        .with_context(|| format!("GET {path} failed"))?;

    let status = rsp.status();
    eprintln!("{status}");
    std::io::stdout().write_all(rsp.body())?;
    if fail && !status.is_success() {
        bail!("server responded with {status}");
    }
    Ok(())
}
