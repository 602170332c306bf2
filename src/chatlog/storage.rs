use crate::chatlog::record::RecordSequence;
use crate::error::StorageError;
use std::collections::BTreeSet;
use std::path::Path;

pub const DEFAULT_RESERVED_NAMES: &[&str] = &[
    "search_history.txt",
    "teleport_history.txt",
    "typed_locations.txt",
    "plugin_cookies.txt",
];

pub const LOG_EXTENSION: &str = "txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedNames {
    names: BTreeSet<String>,
}

impl ReservedNames {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.names.contains(file_name)
    }

    pub fn is_chat_log(&self, file_name: &str) -> bool {
        let is_txt = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == LOG_EXTENSION);
        is_txt && !self.contains(file_name)
    }
}

impl Default for ReservedNames {
    fn default() -> Self {
        Self::new(DEFAULT_RESERVED_NAMES.iter().copied())
    }
}

// Missing logs read as empty. `write_log` replaces a log atomically.
pub trait ChatLogStorage: Send + Sync {
    fn label(&self) -> &str;

    fn account_names(&self) -> Result<BTreeSet<String>, StorageError>;

    fn log_names(&self, account: &str) -> Result<BTreeSet<String>, StorageError>;

    fn read_log(&self, account: &str, log_name: &str) -> Result<RecordSequence, StorageError>;

    fn write_log(
        &self,
        account: &str,
        log_name: &str,
        records: &RecordSequence,
    ) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reserved_names_filter_viewer_files() {
        let reserved = ReservedNames::default();
        assert!(reserved.is_chat_log("chat.txt"));
        assert!(reserved.is_chat_log("Jane Doe.txt"));
        assert!(!reserved.is_chat_log("teleport_history.txt"));
        assert!(!reserved.is_chat_log("plugin_cookies.txt"));
        assert!(!reserved.is_chat_log("settings.xml"));
        assert!(!reserved.is_chat_log("txt"));
    }

    #[test]
    fn custom_reserved_names_replace_defaults() {
        let reserved = ReservedNames::new(["notes.txt"]);
        assert!(!reserved.is_chat_log("notes.txt"));
        assert!(reserved.is_chat_log("search_history.txt"));
    }
}
