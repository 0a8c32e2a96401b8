use crate::core::{path_segments, Inventory, ListWorkloads, NamespaceFilter};
use futures::future;
use hyper::{
    header::{ALLOW, CONTENT_TYPE, USER_AGENT},
    http, Method, Request, Response, StatusCode,
};
use std::{fmt, sync::Arc};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Serves the workload inventory and liveness endpoints.
///
/// Each request results in exactly one list call against the control plane.
pub struct Handler<L> {
    workloads: Arc<L>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to encode json response: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Body = http_body_util::Full<bytes::Bytes>;

const DEPLOYMENTS: &str = "/deployments";
const HEALTHZ: &str = "/healthz";

// === impl Handler ===

impl<L> Handler<L> {
    pub fn new(workloads: L) -> Self {
        Self {
            workloads: Arc::new(workloads),
        }
    }
}

impl<L> Clone for Handler<L> {
    fn clone(&self) -> Self {
        Self {
            workloads: self.workloads.clone(),
        }
    }
}

impl<L> fmt::Debug for Handler<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").finish_non_exhaustive()
    }
}

impl<L, B> tower::Service<Request<B>> for Handler<L>
where
    L: ListWorkloads + Send + Sync + 'static,
{
    type Response = Response<Body>;
    type Error = Error;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        info!(
            method = %req.method(),
            uri = %req.uri(),
            agent = ?req.headers().get(USER_AGENT),
            "Received request",
        );

        if req.method() != Method::GET && req.method() != Method::HEAD {
            return Box::pin(future::ok(method_not_allowed()));
        }

        let path = req.uri().path();
        let workloads = self.workloads.clone();
        if path == HEALTHZ {
            return Box::pin(healthz(workloads));
        }

        if path == DEPLOYMENTS || path.starts_with("/deployments/") {
            let namespace = NamespaceFilter::from_path(&path_segments(path));
            return Box::pin(deployments(workloads, namespace));
        }

        Box::pin(future::ok(not_found()))
    }
}

async fn healthz<L>(workloads: Arc<L>) -> Result<Response<Body>, Error>
where
    L: ListWorkloads + Send + Sync,
{
    let pods = match workloads.list_pods(&NamespaceFilter::All).await {
        Ok(pods) => pods,
        Err(error) => {
            warn!(%error, "Failed to list pods");
            return Ok(unavailable(error));
        }
    };

    let body = format!(
        "healthz: OK\nThere are {} pods in the cluster\n",
        pods.len()
    );
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(body.into())
        .expect("healthz response must be valid"))
}

async fn deployments<L>(
    workloads: Arc<L>,
    namespace: NamespaceFilter,
) -> Result<Response<Body>, Error>
where
    L: ListWorkloads + Send + Sync,
{
    let items = match workloads.list_deployments(&namespace).await {
        Ok(items) => items,
        Err(error) => {
            warn!(%namespace, %error, "Failed to list deployments");
            return Ok(unavailable(error));
        }
    };

    let inventory = Inventory::aggregate(items);
    debug!(%namespace, namespaces = inventory.len(), "Listed deployments");
    let body = inventory.to_json_pretty()?;
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "application/json")
        .body(body.into())
        .expect("deployments response must be valid"))
}

fn unavailable(error: anyhow::Error) -> Response<Body> {
    Response::builder()
        .status(StatusCode::SERVICE_UNAVAILABLE)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(format!("{error:#}\n").into())
        .expect("unavailable response must be valid")
}

fn method_not_allowed() -> Response<Body> {
    Response::builder()
        .status(StatusCode::METHOD_NOT_ALLOWED)
        .header(ALLOW, http::HeaderValue::from_static("GET, HEAD"))
        .body(Body::default())
        .expect("method not allowed response must be valid")
}

fn not_found() -> Response<Body> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(Body::default())
        .expect("not found response must be valid")
}
