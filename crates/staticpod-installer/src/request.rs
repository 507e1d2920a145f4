//! Everything one install run needs, and its validation.

use std::path::PathBuf;
use std::time::Duration;

use staticpod_common::{Error, Result, RetryConfig, DEFAULT_INSTALL_TIMEOUT};

use crate::manifest::PodMutation;
use crate::source::{ResourceSet, ResourceSource};

/// Input of a single install
#[derive(Debug)]
pub struct ProvisioningRequest {
    /// Revision being installed; becomes part of object names and paths
    pub revision: String,
    /// Namespace holding the revisioned objects
    pub namespace: String,
    /// Prefix of the ConfigMap holding the pod template
    pub pod_config_map_prefix: String,
    /// Secrets to stage
    pub secrets: ResourceSet,
    /// ConfigMaps to stage; at least one must be required
    pub config_maps: ResourceSet,
    /// Root of the per-revision staging directories
    pub resource_dir: PathBuf,
    /// Directory watched by the kubelet for static pod manifests
    pub pod_manifest_dir: PathBuf,
    /// Overall deadline for the run
    pub timeout: Duration,
    /// Pause between retries of transient failures
    pub retry: RetryConfig,
    /// Pod this process runs in, used to attribute the outcome event
    pub event_source_pod: Option<String>,
    /// Applied in order to the rendered pod
    pub pod_mutations: Vec<PodMutation>,
}

impl ProvisioningRequest {
    /// Request with default timeout and retry settings and no resources
    pub fn new(
        revision: impl Into<String>,
        namespace: impl Into<String>,
        pod_config_map_prefix: impl Into<String>,
        resource_dir: impl Into<PathBuf>,
        pod_manifest_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            revision: revision.into(),
            namespace: namespace.into(),
            pod_config_map_prefix: pod_config_map_prefix.into(),
            secrets: ResourceSet::new(),
            config_maps: ResourceSet::new(),
            resource_dir: resource_dir.into(),
            pod_manifest_dir: pod_manifest_dir.into(),
            timeout: DEFAULT_INSTALL_TIMEOUT,
            retry: RetryConfig::default(),
            event_source_pod: None,
            pod_mutations: Vec::new(),
        }
    }

    /// Append a mutation to run after those already configured
    pub fn with_pod_mutation(mut self, mutation: PodMutation) -> Self {
        self.pod_mutations.push(mutation);
        self
    }

    /// `resource_dir/<pod-prefix>-<revision>`
    pub fn staging_root(&self) -> PathBuf {
        self.resource_dir
            .join(format!("{}-{}", self.pod_config_map_prefix, self.revision))
    }

    /// File name of the manifest: `<pod-prefix>.yaml`
    pub fn manifest_file_name(&self) -> String {
        format!("{}.yaml", self.pod_config_map_prefix)
    }

    /// The pod template ConfigMap for this revision
    pub fn template_source(&self) -> ResourceSource {
        ResourceSource::required(&self.namespace, &self.pod_config_map_prefix, &self.revision)
    }

    /// Check the request is complete and every name is safe to use in a path.
    pub fn validate(&self) -> Result<()> {
        validate_revision(&self.revision)?;
        if self.namespace.is_empty() {
            return Err(Error::validation_for_field("--namespace", "namespace is required"));
        }
        validate_prefix("--pod", &self.pod_config_map_prefix, &self.revision)?;
        for (prefix, _) in self.secrets.iter() {
            validate_prefix("--secrets", prefix, &self.revision)?;
        }
        for (prefix, _) in self.config_maps.iter() {
            validate_prefix("--configmaps", prefix, &self.revision)?;
        }
        if !self.config_maps.has_required() {
            return Err(Error::validation_for_field(
                "--configmaps",
                "at least one required configmap is needed",
            ));
        }
        if self.resource_dir.as_os_str().is_empty() {
            return Err(Error::validation_for_field(
                "--resource-dir",
                "resource directory is required",
            ));
        }
        if self.pod_manifest_dir.as_os_str().is_empty() {
            return Err(Error::validation_for_field(
                "--pod-manifest-dir",
                "pod manifest directory is required",
            ));
        }
        if self.timeout.is_zero() {
            return Err(Error::validation_for_field(
                "--timeout-duration",
                "timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}

fn validate_revision(revision: &str) -> Result<()> {
    if revision.is_empty() {
        return Err(Error::validation_for_field("--revision", "revision is required"));
    }
    if revision == "." || revision == ".." || revision.contains('/') {
        return Err(Error::validation_for_field(
            "--revision",
            format!("revision {revision:?} is not a valid path component"),
        ));
    }
    if revision.chars().any(char::is_whitespace) {
        return Err(Error::validation_for_field(
            "--revision",
            format!("revision {revision:?} contains whitespace"),
        ));
    }
    Ok(())
}

fn validate_prefix(field: &str, prefix: &str, revision: &str) -> Result<()> {
    if prefix.is_empty() {
        return Err(Error::validation_for_field(field, "empty prefix"));
    }
    if prefix.contains('/') {
        return Err(Error::validation_for_field(
            field,
            format!("prefix {prefix:?} contains '/'"),
        ));
    }
    if prefix.ends_with(&format!("-{revision}")) {
        return Err(Error::validation_for_field(
            field,
            format!("prefix {prefix:?} already carries revision {revision:?}"),
        ));
    }
    Ok(())
}
