//! Read-only access to the objects an install needs.
//!
//! The installer only ever fetches by name. A missing object is `Ok(None)`,
//! which keeps "not found" distinct from failures. Errors are already
//! classified: connection problems come back as
//! [`Error::TransientConnection`] so a [`RetryGate`](staticpod_common::RetryGate)
//! retries them.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret};
use kube::api::Api;
use kube::Client;
use tracing::trace;

#[cfg(test)]
use mockall::automock;

use staticpod_common::kube_utils::is_not_found;
use staticpod_common::Error;

/// Trait abstracting the Kubernetes reads performed during an install
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Get a Secret by namespace and name
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error>;

    /// Get a ConfigMap by namespace and name
    async fn get_config_map(&self, namespace: &str, name: &str)
        -> Result<Option<ConfigMap>, Error>;

    /// Get a Pod by namespace and name
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, Error>;
}

/// Real Kubernetes client implementation
pub struct KubeResourceClient {
    client: Client,
}

impl KubeResourceClient {
    /// Create a new KubeResourceClient wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Map a GET result onto `Option`, classifying everything but 404
fn found<K>(
    result: Result<K, kube::Error>,
    kind: &str,
    namespace: &str,
    name: &str,
) -> Result<Option<K>, Error> {
    trace!(kind, namespace, name, found = result.is_ok(), "GET");
    match result {
        Ok(obj) => Ok(Some(obj)),
        Err(e) if is_not_found(&e) => Ok(None),
        Err(e) => Err(Error::from_kube(
            format!("get {} {}/{}", kind, namespace, name),
            e,
        )),
    }
}

#[async_trait]
impl ResourceClient for KubeResourceClient {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        found(api.get(name).await, "secret", namespace, name)
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMap>, Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        found(api.get(name).await, "configmap", namespace, name)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        found(api.get(name).await, "pod", namespace, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("status {code}"),
            reason: "Test".to_string(),
            code,
        })
    }

    #[test]
    fn found_maps_not_found_to_none() {
        let result: Result<Option<Secret>, Error> =
            found(Err(api_error(404)), "secret", "ns", "etcd-3");
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn found_classifies_unavailable_as_transient() {
        let result: Result<Option<Secret>, Error> =
            found(Err(api_error(503)), "secret", "ns", "etcd-3");
        let err = result.expect_err("503 is an error");
        assert!(err.is_retryable());
        assert_eq!(err.context(), Some("get secret ns/etcd-3"));
    }

    #[test]
    fn found_keeps_forbidden_fatal() {
        let result: Result<Option<Pod>, Error> = found(Err(api_error(403)), "pod", "ns", "p");
        assert!(matches!(result, Err(Error::Kube { .. })));
    }

    #[test]
    fn found_passes_object_through() {
        let result = found(Ok(Secret::default()), "secret", "ns", "s");
        assert!(matches!(result, Ok(Some(_))));
    }
}
