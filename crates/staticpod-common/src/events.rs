//! Kubernetes Event recording for the installer.
//!
//! Provides a trait-based abstraction over `kube::runtime::events::Recorder`
//! so the install outcome is visible via `kubectl describe` and
//! `kubectl get events` on the controller that launched the installer pod.
//!
//! Events are **fire-and-forget**: failures are logged as warnings and never
//! propagate errors. A failed event must never change the install result.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use parking_lot::Mutex;
use tracing::{info, warn};

/// Reporting component shown on every event emitted by the installer
pub const INSTALLER_COMPONENT: &str = "static-pod-installer";

/// Trait for publishing Kubernetes Events.
///
/// Implementations are expected to be fire-and-forget: `publish()` logs a
/// warning on failure but never returns an error.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a Kubernetes Event on the given resource.
    ///
    /// # Arguments
    ///
    /// * `resource_ref` - The Kubernetes object this event is about
    /// * `type_` - Normal or Warning
    /// * `reason` - Machine-readable reason string (e.g. "StaticPodInstallerCompleted")
    /// * `action` - What action was taken (e.g. "Install")
    /// * `note` - Optional human-readable message
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production implementation wrapping `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a new publisher for the given component name.
    ///
    /// The component name appears as the "reportingComponent" on Events.
    pub fn new(client: Client, component: &str) -> Self {
        let reporter = Reporter {
            controller: component.to_string(),
            instance: std::env::var("HOSTNAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(
                reason,
                action,
                error = %e,
                "Failed to publish Kubernetes event"
            );
        }
    }
}

/// One event captured by [`RecordingEventPublisher`].
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedEvent {
    /// Object the event was attached to
    pub resource_ref: ObjectReference,
    /// Normal or Warning
    pub type_: EventType,
    /// Reason string
    pub reason: String,
    /// Action string
    pub action: String,
    /// Human-readable message
    pub note: Option<String>,
}

/// In-memory publisher that keeps every event and logs it.
///
/// Used by tests in place of a cluster.
#[derive(Clone, Default)]
pub struct RecordingEventPublisher {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl RecordingEventPublisher {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// All events published so far, oldest first
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        info!(
            reason,
            action,
            type_ = ?type_,
            note = note.as_deref().unwrap_or_default(),
            "Recorded event"
        );
        self.events.lock().push(RecordedEvent {
            resource_ref: resource_ref.clone(),
            type_,
            reason: reason.to_string(),
            action: action.to_string(),
            note,
        });
    }
}

/// Well-known event reason strings.
///
/// These appear in `kubectl get events` under the REASON column.
pub mod reasons {
    /// All resources staged and the static pod manifest written
    pub const INSTALLER_COMPLETED: &str = "StaticPodInstallerCompleted";
    /// The install failed; the note carries the root error
    pub const INSTALLER_FAILED: &str = "StaticPodInstallerFailed";
}

/// Well-known event action strings.
///
/// These appear in `kubectl get events` under the ACTION column.
pub mod actions {
    /// Installing a static pod revision
    pub const INSTALL: &str = "Install";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_publisher_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RecordingEventPublisher>();
        assert_send_sync::<KubeEventPublisher>();
    }

    #[test]
    fn reason_constants_are_pascal_case() {
        assert_eq!(reasons::INSTALLER_COMPLETED, "StaticPodInstallerCompleted");
        assert_eq!(reasons::INSTALLER_FAILED, "StaticPodInstallerFailed");
        assert_eq!(actions::INSTALL, "Install");
    }

    #[tokio::test]
    async fn recording_publisher_keeps_events_in_order() {
        let publisher = RecordingEventPublisher::new();
        let obj_ref = ObjectReference {
            kind: Some("Namespace".to_string()),
            name: Some("openshift-etcd".to_string()),
            ..Default::default()
        };

        publisher
            .publish(
                &obj_ref,
                EventType::Warning,
                reasons::INSTALLER_FAILED,
                actions::INSTALL,
                Some("first".to_string()),
            )
            .await;
        publisher
            .publish(
                &obj_ref,
                EventType::Normal,
                reasons::INSTALLER_COMPLETED,
                actions::INSTALL,
                None,
            )
            .await;

        let events = publisher.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].type_, EventType::Warning);
        assert_eq!(events[0].note.as_deref(), Some("first"));
        assert_eq!(events[1].reason, reasons::INSTALLER_COMPLETED);
        assert_eq!(events[1].resource_ref, obj_ref);
    }

    #[tokio::test]
    async fn clones_share_recorded_events() {
        let publisher = RecordingEventPublisher::new();
        let handle = publisher.clone();
        publisher
            .publish(
                &ObjectReference::default(),
                EventType::Normal,
                reasons::INSTALLER_COMPLETED,
                actions::INSTALL,
                None,
            )
            .await;
        assert_eq!(handle.events().len(), 1);
    }
}
