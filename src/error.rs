use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ToneError {
    /// The runtime has no audio capability at all (headless, non-browser).
    PlatformUnavailable,
    /// Constructing the audio context failed (policy, permission, resources).
    ContextAcquisition(String),
    /// A node was already stopped by the platform or an earlier teardown.
    AlreadyStopped,
    /// Creating, wiring or automating a node failed.
    Graph(String),
    Settings(String),
    Config(String),
    Render(String),
}

impl fmt::Display for ToneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToneError::PlatformUnavailable => write!(f, "Audio is not available in this environment"),
            ToneError::ContextAcquisition(msg) => write!(f, "Could not create audio context: {msg}"),
            ToneError::AlreadyStopped => write!(f, "Node already stopped"),
            ToneError::Graph(msg) => write!(f, "Audio graph error: {msg}"),
            ToneError::Settings(msg) => write!(f, "Settings error: {msg}"),
            ToneError::Config(msg) => write!(f, "Invalid tone config: {msg}"),
            ToneError::Render(msg) => write!(f, "Render error: {msg}"),
        }
    }
}

impl std::error::Error for ToneError {}

impl From<serde_json::Error> for ToneError {
    fn from(e: serde_json::Error) -> Self {
        ToneError::Config(e.to_string())
    }
}

impl From<hound::Error> for ToneError {
    fn from(e: hound::Error) -> Self {
        ToneError::Render(e.to_string())
    }
}

