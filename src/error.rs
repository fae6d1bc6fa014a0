use thiserror::Error;

/// Failures of the receiver discovery service.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("no receivers found")]
    NoReceivers,

    #[error("mDNS daemon error: {0}")]
    MdnsDaemon(String),
}

/// Failures talking to a receiver. These are never caught inside a worker.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("receiver not found: {name}")]
    NotFound { name: String },

    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("receiver rejected credentials")]
    Unauthorized,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Failures of the rendering service.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("render command failed ({status}): {stderr}")]
    CommandFailed { status: String, stderr: String },

    #[error("render failed: {0}")]
    Other(#[from] anyhow::Error),
}

impl RenderError {
    pub fn is_command_failure(&self) -> bool {
        matches!(self, RenderError::CommandFailed { .. })
    }
}

/// Failures while turning a dashboard feed into an HTML document.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("invalid feed URL: {0}")]
    InvalidUrl(String),

    #[error("feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed dashboard: {0}")]
    Malformed(String),
}

impl From<FeedError> for RenderError {
    fn from(err: FeedError) -> Self {
        RenderError::Other(anyhow::Error::new(err))
    }
}
