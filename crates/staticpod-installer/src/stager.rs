//! Copies revisioned Secrets and ConfigMaps onto the node.
//!
//! Each source is fetched through the install's [`RetryGate`] and handed to a
//! writer that materialises it on disk. Sources are independent: one failing
//! does not stop the others from being staged, but every failure is returned.
//! The exception is deadline expiry, which stops the stage immediately since
//! every later fetch would fail the same way.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use tracing::{debug, info, warn};

use staticpod_common::{Error, Result, RetryGate};

use crate::client::ResourceClient;
use crate::files::is_valid_file_name;
use crate::source::{ResourceKind, ResourceSource};

/// Content of one fetched object: file name to exact bytes
pub type ResourceContent = BTreeMap<String, Vec<u8>>;

/// Content keys of a Secret
pub fn secret_content(secret: Secret) -> ResourceContent {
    secret
        .data
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| (key, value.0))
        .collect()
}

/// Content keys of a ConfigMap: `data` as UTF-8 bytes plus `binaryData`
pub fn config_map_content(config_map: ConfigMap) -> ResourceContent {
    let mut content: ResourceContent = config_map
        .data
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| (key, value.into_bytes()))
        .collect();
    content.extend(
        config_map
            .binary_data
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| (key, value.0)),
    );
    content
}

/// Outcome of a successful stage
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StageSummary {
    /// Prefixes written to disk, in processing order
    pub staged: Vec<String>,
    /// Optional prefixes that did not exist
    pub skipped: Vec<String>,
}

/// Fetches sources and hands their content to a writer
pub struct ResourceStager<'a> {
    client: &'a dyn ResourceClient,
    gate: &'a RetryGate,
}

impl<'a> ResourceStager<'a> {
    /// Create a stager reading through `client`, bounded by `gate`
    pub fn new(client: &'a dyn ResourceClient, gate: &'a RetryGate) -> Self {
        Self { client, gate }
    }

    /// Fetch one source once; `Ok(None)` when it does not exist
    pub async fn fetch(
        &self,
        kind: ResourceKind,
        source: &ResourceSource,
    ) -> Result<Option<ResourceContent>> {
        let name = source.api_name();
        let content = match kind {
            ResourceKind::Secret => self
                .client
                .get_secret(source.namespace(), &name)
                .await?
                .map(secret_content),
            ResourceKind::ConfigMap => self
                .client
                .get_config_map(source.namespace(), &name)
                .await?
                .map(config_map_content),
        };
        Ok(content)
    }

    /// Stage every source in order, calling `write` once per fetched object.
    ///
    /// A missing optional source is skipped. A missing required source, an
    /// unusable object, or a writer failure is recorded and the remaining
    /// sources are still processed. All recorded failures are returned
    /// together (see [`Error::aggregate`]).
    pub async fn stage<W>(
        &self,
        kind: ResourceKind,
        sources: &[ResourceSource],
        mut write: W,
    ) -> Result<StageSummary>
    where
        W: FnMut(&ResourceSource, &ResourceContent) -> Result<()>,
    {
        let mut summary = StageSummary::default();
        let mut errors = Vec::new();

        for source in sources {
            match self.stage_one(kind, source, &mut write).await {
                Ok(true) => summary.staged.push(source.prefix().to_string()),
                Ok(false) => summary.skipped.push(source.prefix().to_string()),
                Err(e) => {
                    warn!(
                        kind = %kind,
                        prefix = source.prefix(),
                        error = %e,
                        "Failed to stage resource"
                    );
                    let stop = e.is_deadline_exceeded();
                    errors.push(e);
                    if stop {
                        break;
                    }
                }
            }
        }

        match Error::aggregate(errors) {
            Some(e) => Err(e),
            None => {
                debug!(
                    kind = %kind,
                    staged = summary.staged.len(),
                    skipped = summary.skipped.len(),
                    "Stage complete"
                );
                Ok(summary)
            }
        }
    }

    /// Returns whether the source was written (`false` = skipped)
    async fn stage_one<W>(
        &self,
        kind: ResourceKind,
        source: &ResourceSource,
        write: &mut W,
    ) -> Result<bool>
    where
        W: FnMut(&ResourceSource, &ResourceContent) -> Result<()>,
    {
        let name = source.api_name();
        let operation = format!("get {} {}/{}", kind, source.namespace(), name);
        info!(kind = %kind, namespace = source.namespace(), name = %name, "Getting resource");

        let fetched = self
            .gate
            .run(&operation, || self.fetch(kind, source))
            .await?;

        let Some(content) = fetched else {
            if source.requirement().is_optional() {
                info!(kind = %kind, name = %name, "Optional resource not found, skipping");
                return Ok(false);
            }
            return Err(Error::MissingRequiredResource {
                kind: kind.to_string(),
                namespace: source.namespace().to_string(),
                prefix: source.prefix().to_string(),
                name,
            });
        };

        if content.is_empty() && source.requirement().is_optional() {
            return Err(Error::EmptyResource {
                kind: kind.to_string(),
                namespace: source.namespace().to_string(),
                name,
            });
        }
        if let Some(key) = content.keys().find(|k| !is_valid_file_name(k)) {
            return Err(Error::InvalidContentKey {
                kind: kind.to_string(),
                name,
                key: key.clone(),
            });
        }

        write(source, &content)?;
        Ok(true)
    }
}
