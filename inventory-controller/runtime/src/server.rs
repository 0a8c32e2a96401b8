use crate::{core::ListWorkloads, guard::Guard, http::Handler};
use hyper::server::conn::http1;
use hyper_util::{rt::TokioIo, service::TowerToHyperService};
use std::{future::Future, io, net::SocketAddr};
use tokio::{
    net::{TcpListener, TcpStream},
    time::{self, Duration},
};
use tracing::{debug, info, info_span, instrument, warn, Instrument};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts connections until shutdown is signaled.
///
/// Each connection is served on its own task. When a [`Guard`] is configured,
/// a connection reaches the handler only after it has been admitted by the
/// guard; rejected connections are closed without reading a request.
#[instrument(skip_all, fields(addr = ?listener.local_addr().ok()))]
pub async fn serve<L>(
    listener: TcpListener,
    guard: Option<Guard>,
    handler: Handler<L>,
    drain: drain::Watch,
) where
    L: ListWorkloads + Send + Sync + 'static,
{
    info!(tls = guard.is_some(), "Inventory server listening");
    loop {
        let (socket, client_addr) = tokio::select! {
            conn = accept_with_backoff(|| listener.accept()) => conn,
            release = drain.clone().signaled() => {
                info!("Inventory server shutting down");
                drop(release);
                return;
            }
        };

        tokio::spawn(
            serve_conn(
                socket,
                client_addr,
                guard.clone(),
                handler.clone(),
                drain.clone(),
            )
            .instrument(info_span!("conn", client.addr = %client_addr)),
        );
    }
}

/// Retries failed accepts after a pause, so that persistent errors (e.g.
/// `EMFILE`) do not spin the accept loop.
async fn accept_with_backoff<F, A, T>(mut accept: F) -> T
where
    F: FnMut() -> A,
    A: Future<Output = io::Result<T>>,
{
    loop {
        match accept().await {
            Ok(conn) => return conn,
            Err(error) => {
                warn!(%error, "Failed to accept connection");
                time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

async fn serve_conn<L>(
    socket: TcpStream,
    client_addr: SocketAddr,
    guard: Option<Guard>,
    handler: Handler<L>,
    drain: drain::Watch,
) where
    L: ListWorkloads + Send + Sync + 'static,
{
    if let Err(error) = socket.set_nodelay(true) {
        debug!(%error, "Failed to set TCP_NODELAY");
    }

    match guard {
        Some(guard) => {
            let accepted = tokio::select! {
                res = guard.accept(socket, client_addr) => res,
                release = drain.clone().signaled() => {
                    debug!("Shutdown signaled during TLS handshake");
                    drop(release);
                    return;
                }
            };
            match accepted {
                Ok(tls) => serve_http(TokioIo::new(tls), handler, drain).await,
                Err(error) => info!(%error, "Connection rejected"),
            }
        }
        None => serve_http(TokioIo::new(socket), handler, drain).await,
    }
}

async fn serve_http<I, L>(io: I, handler: Handler<L>, drain: drain::Watch)
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
    L: ListWorkloads + Send + Sync + 'static,
{
    let conn = http1::Builder::new().serve_connection(io, TowerToHyperService::new(handler));
    tokio::pin!(conn);

    let res = tokio::select! {
        res = &mut conn => res,
        release = drain.signaled() => {
            conn.as_mut().graceful_shutdown();
            release.release_after(conn).await
        }
    };
    match res {
        Ok(()) => debug!("Connection closed"),
        Err(error) => debug!(%error, "Connection failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn accept_errors_back_off() {
        let attempts = AtomicUsize::new(0);
        let start = time::Instant::now();
        let conn = accept_with_backoff(|| {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 3 {
                    Err(io::Error::from_raw_os_error(24))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(conn, 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert!(start.elapsed() >= ACCEPT_BACKOFF * 3, "{:?}", start.elapsed());
    }
}
