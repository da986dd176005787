use thiserror::Error;

use crate::WorkflowStage;

/// Failure kinds raised by the bake workflow itself.
///
/// Provider API errors are not listed here: they travel as `anyhow::Error`
/// with context and can still be downcast to this type when one of these
/// kinds is the root cause.
#[derive(Debug, Error)]
pub enum BakeError {
    #[error("timed out waiting for {what} after {attempts} poll attempt(s)")]
    TimedOut { what: String, attempts: u32 },

    #[error("could not connect to {target} after {attempts} attempt(s): {last_error}")]
    ConnectionFailed {
        target: String,
        attempts: u32,
        last_error: String,
    },

    #[error("remote command failed (exit={exit_code:?}): {command}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("provider returned no instance for the launch request")]
    NoInstanceReturned,

    #[error("instance {instance_id} has no public address")]
    MissingPublicAddress { instance_id: String },

    #[error("provider returned no image id for the create-image request")]
    MissingImageId,

    #[error("invalid stage transition {from} -> {to}")]
    InvalidTransition {
        from: WorkflowStage,
        to: WorkflowStage,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
