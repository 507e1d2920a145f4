//! Rendering and writing the static pod manifest.
//!
//! The template lives under the `pod.yaml` key of a revisioned ConfigMap.
//! Every literal `REVISION` in it is replaced by the revision being installed.
//! When mutations are configured the result is parsed into a typed [`Pod`],
//! passed through each mutation in order and serialised back; without
//! mutations the substituted text is written exactly as it came.

use std::fmt;
use std::path::{Path, PathBuf};

use k8s_openapi::api::core::v1::Pod;
use tracing::{debug, info};

use staticpod_common::{Error, Result, RetryGate};

use crate::client::ResourceClient;
use crate::files::{ensure_dir, write_file, write_file_atomic};
use crate::source::{ResourceKind, ResourceSource};

/// Key of the template ConfigMap holding the pod manifest
pub const POD_MANIFEST_KEY: &str = "pod.yaml";

/// Literal token replaced by the revision
pub const REVISION_TOKEN: &str = "REVISION";

/// Replace every `REVISION` in `template` with `revision`.
///
/// Literal, case-sensitive, non-overlapping, left to right.
pub fn substitute_revision(template: &str, revision: &str) -> String {
    template.replace(REVISION_TOKEN, revision)
}

type MutationFn = dyn Fn(Pod) -> std::result::Result<Pod, String> + Send + Sync;

/// A named transformation applied to the rendered pod before it is written
pub struct PodMutation {
    name: String,
    apply: Box<MutationFn>,
}

impl PodMutation {
    /// Wrap `apply` under `name`. The name appears in errors.
    pub fn new<F>(name: impl Into<String>, apply: F) -> Self
    where
        F: Fn(Pod) -> std::result::Result<Pod, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            apply: Box::new(apply),
        }
    }

    /// Name given at construction
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the mutation
    pub fn apply(&self, pod: Pod) -> std::result::Result<Pod, String> {
        (self.apply)(pod)
    }
}

impl fmt::Debug for PodMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PodMutation")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Apply `mutations` left to right, stopping at the first failure
pub fn apply_mutations(mut pod: Pod, mutations: &[PodMutation]) -> Result<Pod> {
    for (index, mutation) in mutations.iter().enumerate() {
        pod = mutation.apply(pod).map_err(|message| Error::Mutation {
            index,
            name: mutation.name().to_string(),
            message,
        })?;
        debug!(index, mutation = mutation.name(), "Applied pod mutation");
    }
    Ok(pod)
}

/// Produce the final manifest text from the raw template.
///
/// `template_name` is the revisioned ConfigMap name, used in errors.
pub fn render_manifest(
    template_name: &str,
    template: &str,
    revision: &str,
    mutations: &[PodMutation],
) -> Result<String> {
    let substituted = substitute_revision(template, revision);

    if mutations.is_empty() {
        serde_yaml::from_str::<serde_yaml::Value>(&substituted)
            .map_err(|e| Error::malformed_template(template_name, e.to_string()))?;
        return Ok(substituted);
    }

    let pod: Pod = serde_yaml::from_str(&substituted)
        .map_err(|e| Error::malformed_template(template_name, e.to_string()))?;
    let pod = apply_mutations(pod, mutations)?;
    serde_yaml::to_string(&pod).map_err(|e| Error::serialization(e.to_string()))
}

/// Fetches the pod template and renders it
pub struct ManifestAssembler<'a> {
    client: &'a dyn ResourceClient,
    gate: &'a RetryGate,
}

impl<'a> ManifestAssembler<'a> {
    /// Create an assembler reading through `client`, bounded by `gate`
    pub fn new(client: &'a dyn ResourceClient, gate: &'a RetryGate) -> Self {
        Self { client, gate }
    }

    /// Fetch the raw `pod.yaml` text of the template ConfigMap
    pub async fn fetch_template(&self, template_source: &ResourceSource) -> Result<String> {
        let namespace = template_source.namespace();
        let name = template_source.api_name();
        let operation = format!("get {} {}/{}", ResourceKind::ConfigMap, namespace, name);

        let config_map = self
            .gate
            .run(&operation, || self.client.get_config_map(namespace, &name))
            .await?
            .ok_or_else(|| Error::MissingRequiredResource {
                kind: ResourceKind::ConfigMap.to_string(),
                namespace: namespace.to_string(),
                prefix: template_source.prefix().to_string(),
                name: name.clone(),
            })?;

        config_map
            .data
            .and_then(|mut data| data.remove(POD_MANIFEST_KEY))
            .ok_or_else(|| {
                Error::malformed_template(&name, format!("missing key {POD_MANIFEST_KEY:?}"))
            })
    }

    /// Fetch the template, substitute `revision` and apply `mutations`
    pub async fn assemble(
        &self,
        template_source: &ResourceSource,
        revision: &str,
        mutations: &[PodMutation],
    ) -> Result<String> {
        let template = self.fetch_template(template_source).await?;
        let manifest = render_manifest(
            &template_source.api_name(),
            &template,
            revision,
            mutations,
        )?;
        debug!(
            template = %template_source.api_name(),
            mutations = mutations.len(),
            bytes = manifest.len(),
            "Rendered pod manifest"
        );
        Ok(manifest)
    }
}

/// Write the manifest to the staging tree, then to the watched directory.
///
/// Returns the path of the watched copy.
pub fn write_manifest(
    staging_dir: &Path,
    manifest_dir: &Path,
    file_name: &str,
    content: &str,
) -> Result<PathBuf> {
    let staged = staging_dir.join(file_name);
    info!(path = %staged.display(), "Writing pod manifest to staging directory");
    write_file(&staged, content.as_bytes())?;

    ensure_dir(manifest_dir)?;
    let target = write_file_atomic(manifest_dir, file_name, content.as_bytes())?;
    info!(path = %target.display(), "Wrote static pod manifest");
    Ok(target)
}
