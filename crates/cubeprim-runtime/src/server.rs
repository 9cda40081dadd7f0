use thiserror::Error;

/// Kernel launch errors.
///
/// Launch errors are detected synchronously, before any work is queued.
#[derive(Error, Clone, PartialEq)]
pub enum LaunchError {
    /// Too many resources were requested.
    #[error("Too many resources were requested during launch\n{0}")]
    TooManyResources(#[from] ResourceLimitError),

    /// The cube count exceeds the device limits.
    #[error(
        "Cube count exceeds maximum bounds.\nRequested {requested:?}, max is {max:?}."
    )]
    CubeCount {
        /// Requested value
        requested: (u32, u32, u32),
        /// Maximum value
        max: (u32, u32, u32),
    },

    /// The stream reported an execution fault that wasn't synchronized yet.
    #[error("The stream can't accept new work\nCaused by:\n  {reason}")]
    StreamUnhealthy {
        /// Why the stream is unhealthy.
        reason: String,
    },

    /// Can't launch because of an IO Error.
    #[error("An io error happened during launch\nCaused by:\n  {0}")]
    IoError(#[from] IoError),
}

/// Resource limit errors.
#[derive(Error, Clone, PartialEq)]
pub enum ResourceLimitError {
    /// Shared memory exceeds maximum
    #[error(
        "Too much shared memory requested.\nRequested {requested} bytes, maximum {max} bytes available."
    )]
    SharedMemory {
        /// Value requested
        requested: usize,
        /// Maximum value
        max: usize,
    },
    /// Total units exceeds maximum
    #[error("Total unit count exceeds maximum.\nRequested {requested} units, max units is {max}.")]
    Units {
        /// Requested value
        requested: u32,
        /// Maximum value
        max: u32,
    },
}

impl core::fmt::Debug for LaunchError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{self}"))
    }
}

impl core::fmt::Debug for ResourceLimitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{self}"))
    }
}

/// Error that can happen asynchronously while executing queued work.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServerError {
    /// A cube faulted while executing a kernel.
    #[error("An error happened during execution of {kernel}\nCaused by:\n  {reason}")]
    Execution {
        /// Name of the faulting kernel.
        kernel: String,
        /// The fault message.
        reason: String,
    },

    /// A launch error happened while replaying work.
    #[error("A launch error happened during execution\nCaused by:\n  {0}")]
    Launch(#[from] LaunchError),

    /// An io error happened while executing a transfer.
    #[error("An io error happened during execution\nCaused by:\n  {0}")]
    Io(#[from] IoError),

    /// Graph capture was used incorrectly.
    #[error("Invalid graph capture operation\nCaused by:\n  {reason}")]
    Capture {
        /// The details of the capture error.
        reason: String,
    },

    /// The execution queue is in an invalid state.
    #[error("The stream is in an invalid state\nCaused by:\n  {reason}")]
    StreamUnhealthy {
        /// The details of the error.
        reason: String,
    },
}

/// Error returned when creating views over allocations or transferring data.
#[derive(Error, Clone, PartialEq)]
pub enum IoError {
    /// The requested range is outside of the allocation.
    #[error("range {offset}..{end} is out of bounds for a buffer of {size} bytes")]
    OutOfBounds {
        /// Start of the requested range, in bytes.
        offset: usize,
        /// End of the requested range, in bytes.
        end: usize,
        /// Size of the buffer, in bytes.
        size: usize,
    },

    /// The buffer isn't aligned for the requested element type.
    #[error("buffer at offset {offset} isn't aligned to {align} bytes")]
    Misaligned {
        /// Offset of the buffer in its allocation.
        offset: usize,
        /// Required alignment.
        align: usize,
    },
}

impl core::fmt::Debug for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{self}"))
    }
}
