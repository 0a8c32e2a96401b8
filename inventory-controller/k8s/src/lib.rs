#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

use anyhow::Result;
use inventory_controller_core::{ListWorkloads, NamespaceFilter, Workload};
pub use k8s_openapi::api::{apps::v1::Deployment, core::v1::Pod};
use k8s_openapi::NamespaceResourceScope;
use kube::{
    api::{Api, ListParams},
    Resource, ResourceExt,
};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::{debug, instrument};

/// Lists workloads from the Kubernetes API.
///
/// Every call is a live `list` request against the API server.
#[derive(Clone)]
pub struct ClusterClient {
    client: kube::Client,
}

// === impl ClusterClient ===

impl ClusterClient {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &NamespaceFilter) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        match namespace {
            NamespaceFilter::All => Api::all(self.client.clone()),
            NamespaceFilter::Namespace(ns) => Api::namespaced(self.client.clone(), ns),
        }
    }

    async fn list<K>(&self, namespace: &NamespaceFilter) -> Result<Vec<Workload>>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        let list = self.api::<K>(namespace).list(&ListParams::default()).await?;
        debug!(items = list.items.len(), "Listed");
        Ok(list.items.iter().map(workload).collect())
    }
}

impl std::fmt::Debug for ClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterClient").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl ListWorkloads for ClusterClient {
    #[instrument(skip_all, fields(%namespace))]
    async fn list_deployments(&self, namespace: &NamespaceFilter) -> Result<Vec<Workload>> {
        self.list::<Deployment>(namespace).await
    }

    #[instrument(skip_all, fields(%namespace))]
    async fn list_pods(&self, namespace: &NamespaceFilter) -> Result<Vec<Workload>> {
        self.list::<Pod>(namespace).await
    }
}

fn workload<K: Resource>(obj: &K) -> Workload {
    Workload::new(obj.namespace().unwrap_or_default(), obj.name_any())
}
