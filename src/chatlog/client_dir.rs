use crate::chatlog::parser::read_records;
use crate::chatlog::record::RecordSequence;
use crate::chatlog::storage::{ChatLogStorage, ReservedNames};
use crate::error::StorageError;
use std::collections::BTreeSet;
use std::fs;
use std::io::{BufReader, ErrorKind, Write};
use std::path::PathBuf;
use tempfile::NamedTempFile;

pub const ACCOUNT_SETTINGS_FILE: &str = "settings_per_account.xml";
const IM_LOG_PATH_KEY: &str = "<key>InstantMessageLogPath</key>";

#[derive(Debug, Clone)]
pub struct ClientDirStorage {
    label: String,
    settings_dir: PathBuf,
    reserved: ReservedNames,
}

fn unescape_xml(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

pub fn im_log_path_setting(llsd: &str) -> Option<String> {
    let after_key = &llsd[llsd.find(IM_LOG_PATH_KEY)? + IM_LOG_PATH_KEY.len()..];
    let map = match after_key.find("</map>") {
        Some(end) => &after_key[..end],
        None => after_key,
    };
    let after_value = &map[map.find("<key>Value</key>")? + "<key>Value</key>".len()..];
    let trimmed = after_value.trim_start();
    let body = trimmed.strip_prefix("<string>")?;
    let value = &body[..body.find("</string>")?];
    let value = unescape_xml(value.trim());
    if value.is_empty() { None } else { Some(value) }
}

impl ClientDirStorage {
    pub fn new(label: impl Into<String>, settings_dir: PathBuf, reserved: ReservedNames) -> Self {
        Self {
            label: label.into(),
            settings_dir,
            reserved,
        }
    }

    pub fn logs_dir(&self, account: &str) -> Result<Option<PathBuf>, StorageError> {
        let settings_file = self.settings_dir.join(account).join(ACCOUNT_SETTINGS_FILE);
        let raw = match fs::read(&settings_file) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(StorageError::io(
                    format!("unable to read file {}", settings_file.display()),
                    err,
                ));
            }
        };

        let llsd = String::from_utf8_lossy(&raw);
        let dir = match im_log_path_setting(&llsd) {
            Some(base) => PathBuf::from(base).join(account),
            None => self.settings_dir.join(account),
        };
        Ok(Some(dir))
    }

    fn log_path(&self, account: &str, log_name: &str) -> Result<Option<PathBuf>, StorageError> {
        Ok(self.logs_dir(account)?.map(|dir| dir.join(log_name)))
    }
}

impl ChatLogStorage for ClientDirStorage {
    fn label(&self) -> &str {
        &self.label
    }

    fn account_names(&self) -> Result<BTreeSet<String>, StorageError> {
        let entries = match fs::read_dir(&self.settings_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(err) => {
                return Err(StorageError::io(
                    format!("unable to read directory {}", self.settings_dir.display()),
                    err,
                ));
            }
        };

        let mut out = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|err| {
                StorageError::io(
                    format!("unable to read directory {}", self.settings_dir.display()),
                    err,
                )
            })?;
            let path = entry.path();
            if !path.is_dir() || !path.join(ACCOUNT_SETTINGS_FILE).is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                out.insert(name.to_string());
            }
        }
        Ok(out)
    }

    fn log_names(&self, account: &str) -> Result<BTreeSet<String>, StorageError> {
        let Some(dir) = self.logs_dir(account)? else {
            return Ok(BTreeSet::new());
        };
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(err) => {
                return Err(StorageError::io(
                    format!("unable to read directory {}", dir.display()),
                    err,
                ));
            }
        };

        let mut out = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|err| {
                StorageError::io(format!("unable to read directory {}", dir.display()), err)
            })?;
            if !entry.path().is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if self.reserved.is_chat_log(name) {
                out.insert(name.to_string());
            }
        }
        Ok(out)
    }

    fn read_log(&self, account: &str, log_name: &str) -> Result<RecordSequence, StorageError> {
        let Some(path) = self.log_path(account, log_name)? else {
            return Ok(RecordSequence::new());
        };
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(RecordSequence::new()),
            Err(err) => {
                return Err(StorageError::io(
                    format!("unable to open chat log {}", path.display()),
                    err,
                ));
            }
        };
        read_records(BufReader::new(file)).map_err(|err| {
            StorageError::io(format!("unable to read chat log {}", path.display()), err)
        })
    }

    fn write_log(
        &self,
        account: &str,
        log_name: &str,
        records: &RecordSequence,
    ) -> Result<(), StorageError> {
        let dir = match self.logs_dir(account)? {
            Some(dir) => dir,
            None => self.settings_dir.join(account),
        };
        fs::create_dir_all(&dir).map_err(|err| {
            StorageError::io(format!("unable to create directory {}", dir.display()), err)
        })?;

        let target = dir.join(log_name);
        let mut tmp = NamedTempFile::new_in(&dir).map_err(|err| {
            StorageError::io(
                format!("error creating temp file for chat log {account}/{log_name}"),
                err,
            )
        })?;
        records
            .write_to(&mut tmp)
            .and_then(|()| tmp.flush())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|err| {
                StorageError::io(
                    format!(
                        "error writing temp file {} for chat log {account}/{log_name}",
                        tmp.path().display()
                    ),
                    err,
                )
            })?;

        tmp.persist(&target).map_err(|err| {
            StorageError::io(
                format!("error replacing chat log {}", target.display()),
                err.error,
            )
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chatlog::record::Record;
    use std::path::Path;
    use tempfile::tempdir;

    fn setup_account(settings_dir: &Path, account: &str, settings: &str) -> PathBuf {
        let dir = settings_dir.join(account);
        fs::create_dir_all(&dir).expect("mkdir account");
        fs::write(dir.join(ACCOUNT_SETTINGS_FILE), settings).expect("write settings");
        dir
    }

    #[test]
    fn im_log_path_setting_reads_value_string() {
        let llsd = r#"<llsd><map>
    <key>InstantMessageLogPath</key>
        <map>
        <key>Comment</key>
            <string>Path to your log files.</string>
        <key>Type</key>
            <string>String</string>
        <key>Value</key>
            <string>/mnt/logs &amp; more</string>
        </map>
    </map></llsd>"#;
        assert_eq!(
            im_log_path_setting(llsd),
            Some("/mnt/logs & more".to_string())
        );
    }

    #[test]
    fn im_log_path_setting_ignores_empty_or_absent_value() {
        let empty = "<key>InstantMessageLogPath</key><map><key>Value</key><string></string></map>";
        assert_eq!(im_log_path_setting(empty), None);
        let other = "<key>Other</key><map><key>Value</key><string>/x</string></map>";
        assert_eq!(im_log_path_setting(other), None);
        let next_map = "<key>InstantMessageLogPath</key><map></map><key>Value</key><string>/x</string>";
        assert_eq!(im_log_path_setting(next_map), None);
    }

    #[test]
    fn accounts_require_settings_file() {
        let tmp = tempdir().expect("tempdir");
        setup_account(tmp.path(), "jane_doe", "<llsd/>");
        fs::create_dir_all(tmp.path().join("user_settings")).expect("mkdir");
        fs::write(tmp.path().join("stray.txt"), "x").expect("write");

        let storage = ClientDirStorage::new("fs", tmp.path().to_path_buf(), ReservedNames::default());
        let accounts = storage.account_names().expect("accounts");
        assert_eq!(accounts.into_iter().collect::<Vec<_>>(), vec!["jane_doe"]);
    }

    #[test]
    fn missing_settings_dir_has_no_accounts() {
        let tmp = tempdir().expect("tempdir");
        let storage = ClientDirStorage::new(
            "fs",
            tmp.path().join("absent"),
            ReservedNames::default(),
        );
        assert!(storage.account_names().expect("accounts").is_empty());
        assert!(storage.log_names("jane_doe").expect("logs").is_empty());
        assert!(
            storage
                .read_log("jane_doe", "chat.txt")
                .expect("read")
                .is_empty()
        );
    }

    #[test]
    fn log_names_skip_reserved_and_non_txt_files() {
        let tmp = tempdir().expect("tempdir");
        let dir = setup_account(tmp.path(), "jane_doe", "<llsd/>");
        fs::write(dir.join("chat.txt"), "[2023/01/01 00:00]hi\n").expect("write");
        fs::write(dir.join("Bob Smith.txt"), "").expect("write");
        fs::write(dir.join("teleport_history.txt"), "").expect("write");
        fs::write(dir.join("settings.ini"), "").expect("write");

        let storage = ClientDirStorage::new("fs", tmp.path().to_path_buf(), ReservedNames::default());
        let names = storage.log_names("jane_doe").expect("logs");
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["Bob Smith.txt", "chat.txt"]
        );
    }

    #[test]
    fn logs_follow_custom_im_log_path() {
        let tmp = tempdir().expect("tempdir");
        let custom = tmp.path().join("custom_logs");
        let settings = format!(
            "<key>InstantMessageLogPath</key><map><key>Value</key><string>{}</string></map>",
            custom.display()
        );
        setup_account(tmp.path(), "jane_doe", &settings);
        fs::create_dir_all(custom.join("jane_doe")).expect("mkdir");
        fs::write(custom.join("jane_doe/chat.txt"), "[2023/01/01 00:00]hi\n").expect("write");

        let storage = ClientDirStorage::new("fs", tmp.path().to_path_buf(), ReservedNames::default());
        assert_eq!(
            storage.logs_dir("jane_doe").expect("dir"),
            Some(custom.join("jane_doe"))
        );
        let seq = storage.read_log("jane_doe", "chat.txt").expect("read");
        assert_eq!(seq.len(), 1);
    }

    #[test]
    fn write_log_replaces_content_and_creates_missing_account_dir() {
        let tmp = tempdir().expect("tempdir");
        let storage = ClientDirStorage::new("fs", tmp.path().to_path_buf(), ReservedNames::default());
        let records: RecordSequence = vec![
            Record::new(0, "[2023/01/01 00:00]a\n"),
            Record::new(60, "[2023/01/01 00:01]b\n  more\n"),
        ]
        .into();

        storage
            .write_log("new_account", "chat.txt", &records)
            .expect("write");
        let path = tmp.path().join("new_account/chat.txt");
        assert_eq!(
            fs::read(&path).expect("read"),
            b"[2023/01/01 00:00]a\n[2023/01/01 00:01]b\n  more\n".to_vec()
        );

        let shorter: RecordSequence = vec![Record::new(0, "[2023/01/01 00:00]a\n")].into();
        storage
            .write_log("new_account", "chat.txt", &shorter)
            .expect("rewrite");
        assert_eq!(fs::read(&path).expect("read"), b"[2023/01/01 00:00]a\n".to_vec());

        let leftovers = fs::read_dir(tmp.path().join("new_account"))
            .expect("read dir")
            .count();
        assert_eq!(leftovers, 1);
    }
}
