use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("{context}: {source}")]
    Zip {
        context: String,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("archive entry {0} was already written in this run")]
    DuplicateEntry(String),
    #[error("archive writer already committed")]
    Committed,
    #[error("settings directory unavailable: {0}")]
    SettingsDir(String),
}

impl StorageError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn zip(context: impl Into<String>, source: zip::result::ZipError) -> Self {
        Self::Zip {
            context: context.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
#[error("{storage}: chat log {account}/{log}: {source}")]
pub struct UnitError {
    pub storage: String,
    pub account: String,
    pub log: String,
    #[source]
    pub source: StorageError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeErrorCode {
    E001Locked,
    E002ArchiveCommit,
    E003UnitFailed,
    E004ConfigInvalid,
}

impl MergeErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001Locked => "E001_LOCKED",
            Self::E002ArchiveCommit => "E002_ARCHIVE_COMMIT",
            Self::E003UnitFailed => "E003_UNIT_FAILED",
            Self::E004ConfigInvalid => "E004_CONFIG_INVALID",
        }
    }
}
