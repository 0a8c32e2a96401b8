//! A minimal HTTPS client for exercising the inventory API over mTLS.

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::{header::HOST, Request, Response};
use hyper_util::rt::TokioIo;
use rustls::{pki_types::ServerName, ClientConfig};
use std::sync::Arc;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_rustls::TlsConnector;
use tracing::{debug, Instrument};

/// Issues a single `GET` request and buffers the response body.
pub async fn get(
    addr: impl ToSocketAddrs,
    server_name: &str,
    config: Arc<ClientConfig>,
    path: &str,
) -> Result<Response<Bytes>> {
    let name = ServerName::try_from(server_name.to_string())
        .with_context(|| format!("invalid server name: {server_name}"))?;

    let tcp = TcpStream::connect(addr).await.context("failed to connect")?;
    let tls = TlsConnector::from(config)
        .connect(name, tcp)
        .await
        .context("TLS handshake failed")?;

    let (mut tx, conn) = hyper::client::conn::http1::handshake(TokioIo::new(tls)).await?;
    tokio::spawn(
        async move {
            if let Err(error) = conn.await {
                debug!(%error, "Connection failed");
            }
        }
        .in_current_span(),
    );

    let req = Request::get(path)
        .header(HOST, server_name)
        .body(Empty::<Bytes>::new())?;
    let rsp = tx.send_request(req).await.context("request failed")?;
    let (parts, body) = rsp.into_parts();
    let body = body.collect().await?.to_bytes();
    Ok(Response::from_parts(parts, body))
}
