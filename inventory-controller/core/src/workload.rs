use crate::NamespaceFilter;
use anyhow::Result;

/// A namespaced workload (e.g. a Deployment or Pod) as observed at list time.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Workload {
    pub namespace: String,
    pub name: String,
}

/// Models the control plane's list operations.
///
/// Implementations issue one request per call; nothing is cached between calls.
#[async_trait::async_trait]
pub trait ListWorkloads {
    async fn list_deployments(&self, namespace: &NamespaceFilter) -> Result<Vec<Workload>>;

    async fn list_pods(&self, namespace: &NamespaceFilter) -> Result<Vec<Workload>>;
}

// === impl Workload ===

impl Workload {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}
