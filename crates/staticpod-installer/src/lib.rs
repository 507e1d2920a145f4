//! Static pod installer.
//!
//! Stages the Secrets and ConfigMaps of one revision under a per-revision
//! directory on the node, renders the pod manifest from its template ConfigMap
//! and writes it where the kubelet watches for static pods. The outcome is
//! reported as a single Kubernetes Event.

#![deny(missing_docs)]

pub mod cli;
pub mod client;
pub mod files;
pub mod identity;
pub mod manifest;
pub mod pipeline;
pub mod request;
pub mod source;
pub mod stager;

pub use client::{KubeResourceClient, ResourceClient};
pub use manifest::{ManifestAssembler, PodMutation};
pub use pipeline::Installer;
pub use request::ProvisioningRequest;
pub use source::{ResourceKind, ResourceRequirement, ResourceSet, ResourceSource, RevisionedName};
pub use stager::{ResourceStager, StageSummary};
