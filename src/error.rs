use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DigestError {
    #[error("source unavailable {}: {reason}", path.display())]
    SourceUnavailable { path: PathBuf, reason: String },
    #[error("history store unreadable {}: {reason}", path.display())]
    HistoryUnreadable { path: PathBuf, reason: String },
    #[error("observation column `{0}` is not an MM/DD date")]
    DateColumnParse(String),
    #[error("config file invalid or unreadable: {0}")]
    InvalidConfig(String),
    #[error("invalid date column `{0}`: expected zero-padded MM/DD")]
    InvalidDateColumn(String),
    #[error("another run holds the lock {}", .0.display())]
    StoreLocked(PathBuf),
    #[error("failed to write store {}: {reason}", path.display())]
    WriteFailed { path: PathBuf, reason: String },
}

impl DigestError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "SOURCE_UNAVAILABLE",
            Self::HistoryUnreadable { .. } => "HISTORY_UNREADABLE",
            Self::DateColumnParse(_) => "DATE_COLUMN_PARSE",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::InvalidDateColumn(_) => "INVALID_DATE_COLUMN",
            Self::StoreLocked(_) => "STORE_LOCKED",
            Self::WriteFailed { .. } => "WRITE_FAILED",
        }
    }
}
