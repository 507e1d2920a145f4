//! Common building blocks for the static pod installer: errors, deadline-bound
//! retry, Kubernetes event publishing, client construction and logging.

#![deny(missing_docs)]

pub mod error;
pub mod events;
pub mod kube_utils;
pub mod retry;
pub mod telemetry;

pub use error::Error;
pub use events::{EventPublisher, KubeEventPublisher, RecordingEventPublisher};
pub use retry::{Deadline, RetryConfig, RetryGate};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Default overall install deadline
pub const DEFAULT_INSTALL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(120);
