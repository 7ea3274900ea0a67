use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = MirrorError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("network error: {0}")]
    Network(String),
    #[error("translation service error: {0}")]
    TranslationService(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("language '{0}' is not downloaded")]
    NotDownloaded(String),
    #[error("language '{0}' is already available")]
    AlreadyDownloaded(String),
    #[error("automated translation for '{0}' is not enabled")]
    UnsupportedLanguage(String),
    #[error("the default language '{0}' cannot be removed")]
    DefaultLanguage(String),
    #[error("no offline copy of {url} in '{lang}'")]
    MissingOfflineCopy { url: String, lang: String },
    #[error("operation already in progress: {0}")]
    OperationInProgress(String),
    #[error("failed to persist {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt record {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("record {} has unsupported version {found}", path.display())]
    UnsupportedVersion { path: PathBuf, found: u32 },
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl MirrorError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Transport or service-level failures that say the remote side is unusable,
    /// as opposed to a problem with one particular input.
    pub fn is_service_failure(&self) -> bool {
        matches!(self, Self::Network(_) | Self::TranslationService(_))
    }
}

impl From<reqwest::Error> for MirrorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<rss::Error> for MirrorError {
    fn from(err: rss::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<atom_syndication::Error> for MirrorError {
    fn from(err: atom_syndication::Error) -> Self {
        Self::Parse(err.to_string())
    }
}
