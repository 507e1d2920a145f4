//! Command-line surface of the `staticpod-installer` binary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use staticpod_common::events::INSTALLER_COMPONENT;
use staticpod_common::kube_utils::create_client;
use staticpod_common::telemetry::LogFormat;
use staticpod_common::{Error, KubeEventPublisher, Result, RetryConfig};

use crate::client::KubeResourceClient;
use crate::pipeline::Installer;
use crate::request::ProvisioningRequest;
use crate::source::ResourceSet;

/// Install a static pod revision on this node
#[derive(Parser, Debug)]
#[command(name = "staticpod-installer", version, about)]
pub struct InstallArgs {
    /// Path to kubeconfig; in-cluster config is used when unset
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Revision to install
    #[arg(long)]
    pub revision: String,

    /// Namespace holding the revisioned secrets and configmaps
    #[arg(long)]
    pub namespace: String,

    /// Prefix of the configmap holding the pod template (`pod.yaml` key)
    #[arg(long = "pod")]
    pub pod_config_map_prefix: String,

    /// Secret prefixes that must exist for the revision
    #[arg(long, value_delimiter = ',')]
    pub secrets: Vec<String>,

    /// Secret prefixes copied only when they exist
    #[arg(long, value_delimiter = ',')]
    pub optional_secrets: Vec<String>,

    /// ConfigMap prefixes that must exist for the revision
    #[arg(long = "configmaps", value_delimiter = ',')]
    pub config_maps: Vec<String>,

    /// ConfigMap prefixes copied only when they exist
    #[arg(long = "optional-configmaps", value_delimiter = ',')]
    pub optional_config_maps: Vec<String>,

    /// Directory the revision's resources are staged under
    #[arg(long)]
    pub resource_dir: PathBuf,

    /// Directory watched by the kubelet for static pod manifests
    #[arg(long)]
    pub pod_manifest_dir: PathBuf,

    /// Overall deadline for the install (e.g. "120s", "2m", "1m30s", "1.5m")
    #[arg(long, default_value = "120s", value_parser = parse_duration)]
    pub timeout_duration: Duration,

    /// Pause between retries of transient API failures
    #[arg(long, default_value = "1s", value_parser = parse_duration)]
    pub retry_interval: Duration,

    /// Name of the pod this installer runs in; events go to its controller
    #[arg(long, env = "EVENT_SOURCE_POD_NAME")]
    pub event_source_pod: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormatArg::Text)]
    pub log_format: LogFormatArg,
}

/// `--log-format` values
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    /// Human-readable text
    Text,
    /// JSON lines
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

impl InstallArgs {
    /// Build the install request described by these arguments
    pub fn into_request(self) -> Result<ProvisioningRequest> {
        let secrets = ResourceSet::from_lists(self.secrets, self.optional_secrets).map_err(
            |prefix| {
                Error::validation_for_field(
                    "--optional-secrets",
                    format!("secret {prefix:?} is listed as both required and optional"),
                )
            },
        )?;
        let config_maps = ResourceSet::from_lists(self.config_maps, self.optional_config_maps)
            .map_err(|prefix| {
                Error::validation_for_field(
                    "--optional-configmaps",
                    format!("configmap {prefix:?} is listed as both required and optional"),
                )
            })?;

        let mut request = ProvisioningRequest::new(
            self.revision,
            self.namespace,
            self.pod_config_map_prefix,
            self.resource_dir,
            self.pod_manifest_dir,
        );
        request.secrets = secrets;
        request.config_maps = config_maps;
        request.timeout = self.timeout_duration;
        request.retry = RetryConfig::fixed(self.retry_interval);
        request.event_source_pod = self.event_source_pod.filter(|p| !p.is_empty());
        Ok(request)
    }
}

/// Run an install against the configured cluster
pub async fn run(args: InstallArgs) -> Result<()> {
    let kubeconfig = args.kubeconfig.clone();
    let request = args.into_request()?;
    // Reject bad input before touching the cluster.
    request.validate()?;

    let client = create_client(kubeconfig.as_deref()).await?;
    let events = KubeEventPublisher::new(client.clone(), INSTALLER_COMPONENT);
    let installer = Installer::new(
        Arc::new(KubeResourceClient::new(client)),
        Arc::new(events),
    );
    installer.run(&request).await
}

/// Parse a duration such as `500ms`, `30s`, `1.5m`, `1h30m`, `2m0s` or raw seconds
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    let invalid = || format!("invalid duration '{s}', expected e.g. 500ms, 30s, 2m0s, 1.5h");

    // Raw seconds
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let is_number = |c: char| c.is_ascii_digit() || c == '.';
        let unit_at = rest.find(|c: char| !is_number(c)).ok_or_else(invalid)?;
        let (number, tail) = rest.split_at(unit_at);
        let (unit, next) = tail.split_at(tail.find(is_number).unwrap_or(tail.len()));

        let unit_millis: u64 = match unit {
            "ms" => 1,
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            _ => return Err(invalid()),
        };
        let part = if number.contains('.') {
            let value: f64 = number.parse().map_err(|_| invalid())?;
            Duration::try_from_secs_f64(value * unit_millis as f64 / 1_000.0)
                .map_err(|_| invalid())?
        } else {
            let value: u64 = number.parse().map_err(|_| invalid())?;
            Duration::from_millis(value.checked_mul(unit_millis).ok_or_else(invalid)?)
        };
        total = total.checked_add(part).ok_or_else(invalid)?;
        rest = next;
    }
    Ok(total)
}
