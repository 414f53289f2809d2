use std::io;

/// Errors raised by the ssh-executable transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection URL could not be decomposed. Never retried.
    #[error("invalid connection url '{url}': {reason}")]
    Configuration { url: String, reason: String },

    /// The ssh executable could not be started.
    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The ssh process exited with a non-zero code, or was killed by a signal
    /// (`code` is `None`).
    #[error(
        "ssh process terminated unexpectedly with {}: {}",
        describe_exit(.code),
        .stderr.trim_end()
    )]
    RemoteFailure { code: Option<i32>, stderr: String },

    /// The stream was closed while the ssh process was still running.
    #[error("closing ssh transport stream before the ssh process has finished")]
    ClosedBeforeExit,

    #[error("ssh transport stream used after it was closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "a signal".to_string(),
    }
}

impl TransportError {
    /// Whether a fresh connection attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteFailure { .. })
    }
}

impl From<TransportError> for io::Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Io(err) => err,
            other => io::Error::other(other),
        }
    }
}

impl From<TransportError> for git2::Error {
    fn from(err: TransportError) -> Self {
        git2::Error::from_str(&err.to_string())
    }
}
