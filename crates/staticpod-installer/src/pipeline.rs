//! Orchestration of one install run.
//!
//! A run stages Secrets, then ConfigMaps, then renders and writes the pod
//! manifest. The first failing stage ends the run. Whatever the outcome, exactly
//! one event is published once the request has passed validation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kube::runtime::events::EventType;
use tracing::{error, info, instrument, warn};

use staticpod_common::events::{actions, reasons};
use staticpod_common::{Deadline, Error, EventPublisher, Result, RetryGate};

use crate::client::ResourceClient;
use crate::files::{ensure_dir, write_content_dir};
use crate::identity::resolve_event_target;
use crate::manifest::{write_manifest, ManifestAssembler};
use crate::request::ProvisioningRequest;
use crate::source::ResourceKind;
use crate::stager::ResourceStager;

/// Upper bound on publishing the outcome event.
///
/// Reporting runs after the install deadline may already have passed, so it
/// gets its own budget.
pub const DEFAULT_EVENT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs install requests against a cluster
pub struct Installer {
    client: Arc<dyn ResourceClient>,
    events: Arc<dyn EventPublisher>,
    publish_timeout: Duration,
}

impl Installer {
    /// Create an installer reading through `client` and reporting to `events`
    pub fn new(client: Arc<dyn ResourceClient>, events: Arc<dyn EventPublisher>) -> Self {
        Self {
            client,
            events,
            publish_timeout: DEFAULT_EVENT_PUBLISH_TIMEOUT,
        }
    }

    /// Override how long publishing the outcome event may take
    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    /// Install `request`.
    ///
    /// Invalid requests are rejected before any I/O and without an event.
    /// Otherwise the outcome is published as a single event and returned.
    #[instrument(
        skip(self, request),
        fields(revision = %request.revision, namespace = %request.namespace)
    )]
    pub async fn run(&self, request: &ProvisioningRequest) -> Result<()> {
        request.validate()?;

        let gate = RetryGate::new(Deadline::after(request.timeout), request.retry.clone());
        info!(
            pod = %request.pod_config_map_prefix,
            secrets = request.secrets.len(),
            configmaps = request.config_maps.len(),
            timeout_secs = request.timeout.as_secs_f64(),
            "Starting install"
        );

        let outcome = self.install(request, &gate).await;
        self.report(request, &gate, &outcome).await;
        outcome.map(|_| ())
    }

    async fn install(&self, request: &ProvisioningRequest, gate: &RetryGate) -> Result<PathBuf> {
        let staging_root = request.staging_root();
        ensure_dir(&staging_root)?;

        let stager = ResourceStager::new(self.client.as_ref(), gate);
        for (kind, set) in [
            (ResourceKind::Secret, &request.secrets),
            (ResourceKind::ConfigMap, &request.config_maps),
        ] {
            let kind_dir = staging_root.join(kind.dir_name());
            let sources = set.sources(&request.namespace, &request.revision);
            let summary = stager
                .stage(kind, &sources, |source, content| {
                    write_content_dir(&kind_dir.join(source.prefix()), content).map(|_| ())
                })
                .await?;
            info!(
                kind = %kind,
                staged = ?summary.staged,
                skipped = ?summary.skipped,
                "Staged resources"
            );
        }

        let assembler = ManifestAssembler::new(self.client.as_ref(), gate);
        let manifest = assembler
            .assemble(
                &request.template_source(),
                &request.revision,
                &request.pod_mutations,
            )
            .await?;
        write_manifest(
            &staging_root,
            &request.pod_manifest_dir,
            &request.manifest_file_name(),
            &manifest,
        )
    }

    async fn report(
        &self,
        request: &ProvisioningRequest,
        gate: &RetryGate,
        outcome: &Result<PathBuf>,
    ) {
        let (type_, reason, note) = match outcome {
            Ok(path) => {
                info!(manifest = %path.display(), "Install complete");
                (
                    EventType::Normal,
                    reasons::INSTALLER_COMPLETED,
                    format!("Successfully installed revision {}", request.revision),
                )
            }
            Err(e) => {
                error!(error = %e, "Install failed");
                (
                    EventType::Warning,
                    reasons::INSTALLER_FAILED,
                    failure_note(&request.revision, e),
                )
            }
        };

        let target = resolve_event_target(
            self.client.as_ref(),
            gate,
            &request.namespace,
            request.event_source_pod.as_deref(),
        )
        .await;
        let publish = self
            .events
            .publish(&target, type_, reason, actions::INSTALL, Some(note));
        if tokio::time::timeout(self.publish_timeout, publish).await.is_err() {
            warn!(
                reason,
                timeout_ms = self.publish_timeout.as_millis(),
                "Timed out publishing install event"
            );
        }
    }
}

fn failure_note(revision: &str, err: &Error) -> String {
    format!("Installing revision {revision}: {err}")
}
