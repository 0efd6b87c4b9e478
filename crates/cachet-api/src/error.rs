use thiserror::Error;

/// Failures of a single request before its body reaches the wire mapper.
///
/// `cachet-core` carries these unchanged as its transport branch.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection, DNS, timeout or body read failure reported by `reqwest`.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Base address and operation path did not join into a valid URL.
    #[error("bad request URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("no base URL configured")]
    MissingBaseUrl,

    /// Client construction failed, usually a CA certificate problem.
    #[error("TLS setup failed: {0}")]
    Tls(String),

    /// The backend answered outside the 2xx range.
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
}

impl Error {
    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}
