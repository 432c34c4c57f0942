use thiserror::Error;

/// Errors surfaced by the switch.
///
/// Everything that happens once the event loop is running (spawn failures,
/// producer pipes closing, an unready sink) is handled inside the loop and never
/// reaches a caller; the variants here cover startup and the I/O plumbing that
/// startup goes through.
#[derive(Error, Debug)]
pub enum SwitchError {
    /// Underlying I/O failure (pipe setup, spawn, read/write).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration, detected before the loop starts.
    #[error("config error: {0}")]
    Config(String),
}

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SwitchError>;
