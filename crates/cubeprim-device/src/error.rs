use core::fmt::Debug;
use cubeprim_runtime::server::{IoError, LaunchError, ServerError};

/// Errors returned by the device primitives.
#[derive(thiserror::Error, Clone, PartialEq)]
pub enum PrimError {
    /// The parameters are inconsistent, nothing was submitted.
    #[error("Invalid configuration\nCaused by:\n  {reason}")]
    InvalidConfiguration {
        /// What is wrong with the parameters.
        reason: String,
    },
    /// The temporary storage is smaller than required, nothing was submitted.
    #[error(
        "Temporary storage is too small: {required} bytes are required, {provided} bytes were provided"
    )]
    AllocationFailure {
        /// Bytes required.
        required: usize,
        /// Bytes provided.
        provided: usize,
    },
    /// The runtime rejected a dispatch.
    #[error("A launch failure happened\nCaused by:\n  {0}")]
    LaunchFailure(#[from] LaunchError),
    /// A kernel failed, reported when synchronizing.
    #[error("An execution failure happened\nCaused by:\n  {0}")]
    ExecutionFailure(#[from] ServerError),
}

impl PrimError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }
}

impl From<IoError> for PrimError {
    fn from(value: IoError) -> Self {
        Self::LaunchFailure(value.into())
    }
}

impl Debug for PrimError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{self}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_chain_causes() {
        let err = PrimError::from(LaunchError::StreamUnhealthy {
            reason: "a kernel panicked".into(),
        });
        let message = format!("{err:?}");

        assert!(message.starts_with("A launch failure happened"));
        assert!(message.contains("a kernel panicked"));
    }

    #[test]
    fn io_errors_are_launch_failures() {
        let err = PrimError::from(IoError::Misaligned {
            offset: 3,
            align: 8,
        });

        assert!(matches!(err, PrimError::LaunchFailure(LaunchError::IoError(_))));
    }
}
