//! Which object the install outcome event is attached to.
//!
//! The installer runs in a short-lived pod created by an operator. Events are
//! most useful on that pod's controller, so they show up where the operator
//! looks. Resolution is best effort: when the pod cannot be found the event
//! falls back to the pod itself, then to the namespace.

use k8s_openapi::api::core::v1::{ObjectReference, Pod};
use kube::Resource;
use tracing::{debug, warn};

use staticpod_common::RetryGate;

use crate::client::ResourceClient;

/// Reference to the controlling owner of `pod`, if it has one
pub fn controller_reference(pod: &Pod) -> Option<ObjectReference> {
    let owner = pod
        .metadata
        .owner_references
        .as_ref()?
        .iter()
        .find(|r| r.controller == Some(true))?;

    Some(ObjectReference {
        api_version: Some(owner.api_version.clone()),
        kind: Some(owner.kind.clone()),
        name: Some(owner.name.clone()),
        namespace: pod.metadata.namespace.clone(),
        uid: Some(owner.uid.clone()),
        ..Default::default()
    })
}

/// Reference to the namespace the install runs against
pub fn namespace_reference(namespace: &str) -> ObjectReference {
    ObjectReference {
        api_version: Some("v1".to_string()),
        kind: Some("Namespace".to_string()),
        name: Some(namespace.to_string()),
        ..Default::default()
    }
}

/// Resolve the object events should be attached to.
///
/// Never fails; lookup errors are logged and the namespace reference is used.
pub async fn resolve_event_target(
    client: &dyn ResourceClient,
    gate: &RetryGate,
    namespace: &str,
    pod_name: Option<&str>,
) -> ObjectReference {
    let Some(pod_name) = pod_name else {
        debug!(namespace, "No event source pod configured, reporting on namespace");
        return namespace_reference(namespace);
    };

    let operation = format!("get pod {namespace}/{pod_name}");
    match gate
        .run(&operation, || client.get_pod(namespace, pod_name))
        .await
    {
        Ok(Some(pod)) => controller_reference(&pod).unwrap_or_else(|| pod.object_ref(&())),
        Ok(None) => {
            warn!(namespace, pod = pod_name, "Event source pod not found, reporting on namespace");
            namespace_reference(namespace)
        }
        Err(e) => {
            warn!(
                namespace,
                pod = pod_name,
                error = %e,
                "Failed to look up event source pod, reporting on namespace"
            );
            namespace_reference(namespace)
        }
    }
}
