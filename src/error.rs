//! Crate-wide error types.
//!
//! Mirrors the error taxonomy from the control loop design: sampling and
//! actuation errors are transient and isolated per-container, while a
//! handful of configuration/auth failures are fatal and terminate the
//! process (see `main`).

use thiserror::Error;

/// Error reading or parsing a cgroup stat snapshot for one container.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("exec into container failed: {0}")]
    Exec(#[source] std::io::Error),

    #[error("cgroup read exited with status {0}")]
    NonZeroExit(std::process::ExitStatus),

    #[error("expected {expected} whitespace-separated tokens in cgroup output, got {got}: {raw:?}")]
    TokenCount {
        expected: usize,
        got: usize,
        raw: String,
    },

    #[error("failed to parse field {field}: {source}")]
    Field {
        field: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Error patching the pod's resources for one container.
#[derive(Debug, Error)]
pub enum ActuateError {
    #[error("patch request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("patch rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("token renewal failed: {0}")]
    TokenRenewal(#[source] std::io::Error),
}

/// Errors that terminate the reconcile loop.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("pod {name} has QoS class {qos:?}, kondense requires Guaranteed")]
    NotGuaranteed { name: String, qos: String },
}
