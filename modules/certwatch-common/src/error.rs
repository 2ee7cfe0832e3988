use thiserror::Error;

#[derive(Error, Debug)]
pub enum CertwatchError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Challenge unsolved: {0}")]
    ChallengeUnsolved(String),

    #[error("Judge unavailable: {0}")]
    JudgeUnavailable(String),

    #[error("Stale audit item: {0}")]
    StaleItem(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Duplicate keyword: {0}")]
    DuplicateKeyword(String),

    #[error("Crawl lock conflict: a run is already in progress for source {0}")]
    SourceBusy(String),

    #[error("Malformed cursor: {0}")]
    MalformedCursor(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
