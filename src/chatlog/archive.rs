use crate::chatlog::parser::read_records;
use crate::chatlog::record::RecordSequence;
use crate::chatlog::storage::{ChatLogStorage, ReservedNames};
use crate::error::StorageError;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tempfile::NamedTempFile;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub struct ArchiveStorage {
    label: String,
    path: PathBuf,
    reserved: ReservedNames,
    entries: BTreeSet<String>,
    reader: Mutex<Option<ZipArchive<File>>>,
    state: Mutex<WriteState>,
}

#[derive(Default)]
struct WriteState {
    zip: Option<ZipWriter<NamedTempFile>>,
    written: BTreeSet<String>,
    broken: bool,
    committed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Replaced { written: usize, copied: usize },
    Unchanged,
}

fn split_entry(name: &str) -> Option<(&str, &str)> {
    let (account, file) = name.split_once('/')?;
    if account.is_empty() || file.is_empty() || file.contains('/') || account.contains('\\') {
        return None;
    }
    Some((account, file))
}

fn entry_name(account: &str, log_name: &str) -> String {
    format!("{account}/{log_name}")
}

fn scratch_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

impl ArchiveStorage {
    pub fn open(
        label: impl Into<String>,
        path: impl Into<PathBuf>,
        reserved: ReservedNames,
    ) -> Result<Self, StorageError> {
        let path = path.into();
        let reader = match File::open(&path) {
            Ok(file) => Some(ZipArchive::new(file).map_err(|err| {
                StorageError::zip(format!("unable to open archive {}", path.display()), err)
            })?),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                return Err(StorageError::io(
                    format!("unable to open archive {}", path.display()),
                    err,
                ));
            }
        };
        let entries = reader
            .as_ref()
            .map(|zip| zip.file_names().map(str::to_string).collect())
            .unwrap_or_default();

        Ok(Self {
            label: label.into(),
            path,
            reserved,
            entries,
            reader: Mutex::new(reader),
            state: Mutex::new(WriteState::default()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn chat_log_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .filter_map(|name| split_entry(name))
            .filter(|(_, file)| self.reserved.is_chat_log(file))
    }

    /// Without any write the archive file is left as it was.
    pub fn commit(&self) -> Result<CommitOutcome, StorageError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.committed {
            return Err(StorageError::Committed);
        }
        state.committed = true;
        if state.broken {
            return Err(StorageError::io(
                format!("archive {} left unchanged", self.path.display()),
                std::io::Error::other("an earlier entry write failed"),
            ));
        }
        let Some(mut zip) = state.zip.take() else {
            return Ok(CommitOutcome::Unchanged);
        };

        let mut copied = 0usize;
        let previous = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut previous) = previous {
            for index in 0..previous.len() {
                let file = previous.by_index_raw(index).map_err(|err| {
                    StorageError::zip(
                        format!("unable to read archive {}", self.path.display()),
                        err,
                    )
                })?;
                if state.written.contains(file.name()) {
                    continue;
                }
                let name = file.name().to_string();
                zip.raw_copy_file(file).map_err(|err| {
                    StorageError::zip(format!("error copying archive entry {name}"), err)
                })?;
                copied += 1;
            }
        }

        let mut tmp = zip.finish().map_err(|err| {
            StorageError::zip(
                format!("error closing archive copy of {}", self.path.display()),
                err,
            )
        })?;
        // An aborted entry can leave stale bytes past the central directory.
        tmp.flush()
            .and_then(|()| tmp.stream_position())
            .and_then(|end| tmp.as_file().set_len(end))
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|err| {
                StorageError::io(format!("error flushing {}", tmp.path().display()), err)
            })?;
        tmp.persist(&self.path).map_err(|err| {
            StorageError::io(
                format!("error overwriting archive {}", self.path.display()),
                err.error,
            )
        })?;

        Ok(CommitOutcome::Replaced {
            written: state.written.len(),
            copied,
        })
    }
}

impl ChatLogStorage for ArchiveStorage {
    fn label(&self) -> &str {
        &self.label
    }

    fn account_names(&self) -> Result<BTreeSet<String>, StorageError> {
        Ok(self
            .chat_log_entries()
            .map(|(account, _)| account.to_string())
            .collect())
    }

    fn log_names(&self, account: &str) -> Result<BTreeSet<String>, StorageError> {
        Ok(self
            .chat_log_entries()
            .filter(|(entry_account, _)| *entry_account == account)
            .map(|(_, file)| file.to_string())
            .collect())
    }

    fn read_log(&self, account: &str, log_name: &str) -> Result<RecordSequence, StorageError> {
        let name = entry_name(account, log_name);
        let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(zip) = reader.as_mut() else {
            return Ok(RecordSequence::new());
        };
        let file = match zip.by_name(&name) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Ok(RecordSequence::new()),
            Err(err) => {
                return Err(StorageError::zip(
                    format!("unable to open chat log {name}"),
                    err,
                ));
            }
        };
        read_records(BufReader::new(file))
            .map_err(|err| StorageError::io(format!("unable to read chat log {name}"), err))
    }

    fn write_log(
        &self,
        account: &str,
        log_name: &str,
        records: &RecordSequence,
    ) -> Result<(), StorageError> {
        let body = records.to_bytes();
        self.write_entry(entry_name(account, log_name), &mut body.as_slice())
    }
}

impl ArchiveStorage {
    fn write_entry(&self, name: String, body: &mut dyn Read) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.committed {
            return Err(StorageError::Committed);
        }
        if state.broken {
            return Err(StorageError::io(
                format!("error creating file {name}"),
                io::Error::other("archive copy is unusable after an earlier failure"),
            ));
        }
        if state.written.contains(&name) {
            return Err(StorageError::DuplicateEntry(name));
        }
        if state.zip.is_none() {
            let tmp = NamedTempFile::new_in(scratch_dir(&self.path)).map_err(|err| {
                StorageError::io(
                    format!("error creating archive copy of {}", self.path.display()),
                    err,
                )
            })?;
            state.zip = Some(ZipWriter::new(tmp));
        }
        let Some(zip) = state.zip.as_mut() else {
            return Err(StorageError::Committed);
        };

        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        if let Err(err) = zip.start_file(name.as_str(), options) {
            // The writer may be half way through a header.
            state.broken = true;
            return Err(StorageError::zip(format!("error creating file {name}"), err));
        }
        if let Err(err) = io::copy(body, zip) {
            // Drop the partial entry; commit copies the previous one through.
            if zip.abort_file().is_err() {
                state.broken = true;
            }
            return Err(StorageError::io(format!("error writing file {name}"), err));
        }
        state.written.insert(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chatlog::record::Record;
    use tempfile::tempdir;

    // One chunk, then a full disk.
    struct FailingBody {
        sent: bool,
    }

    impl Read for FailingBody {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.sent {
                return Err(io::Error::other("no space left on device"));
            }
            self.sent = true;
            let chunk = b"[2023/01/01 00:00]partial";
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            Ok(n)
        }
    }

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).expect("create zip");
        let mut zip = ZipWriter::new(file);
        for (name, body) in entries {
            zip.start_file(*name, SimpleFileOptions::default())
                .expect("start file");
            zip.write_all(body.as_bytes()).expect("write entry");
        }
        zip.finish().expect("finish zip");
    }

    fn read_entry(path: &Path, name: &str) -> String {
        let mut zip = ZipArchive::new(File::open(path).expect("open")).expect("zip");
        let mut out = String::new();
        zip.by_name(name)
            .expect("entry")
            .read_to_string(&mut out)
            .expect("read");
        out
    }

    fn sample(text: &str) -> RecordSequence {
        vec![Record::new(0, text)].into()
    }

    #[test]
    fn split_entry_accepts_first_level_files_only() {
        assert_eq!(split_entry("jane/chat.txt"), Some(("jane", "chat.txt")));
        assert_eq!(split_entry("chat.txt"), None);
        assert_eq!(split_entry("jane/sub/chat.txt"), None);
        assert_eq!(split_entry("jane/"), None);
        assert_eq!(split_entry("/chat.txt"), None);
    }

    #[test]
    fn missing_archive_reads_empty_and_commits_nothing() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("logs.zip");
        let archive = ArchiveStorage::open("archive", &path, ReservedNames::default())
            .expect("open");

        assert!(archive.account_names().expect("accounts").is_empty());
        assert!(archive.read_log("jane", "chat.txt").expect("read").is_empty());
        assert_eq!(archive.commit().expect("commit"), CommitOutcome::Unchanged);
        assert!(!path.exists());
    }

    #[test]
    fn lists_accounts_and_logs_from_entries() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("logs.zip");
        write_zip(
            &path,
            &[
                ("jane/chat.txt", "[2023/01/01 00:00]hi\n"),
                ("jane/Bob.txt", ""),
                ("jane/typed_locations.txt", ""),
                ("jane/notes.md", ""),
                ("bob/sub/deep.txt", ""),
                ("toplevel.txt", ""),
            ],
        );
        let archive = ArchiveStorage::open("archive", &path, ReservedNames::default())
            .expect("open");

        assert_eq!(
            archive.account_names().expect("accounts").into_iter().collect::<Vec<_>>(),
            vec!["jane"]
        );
        assert_eq!(
            archive.log_names("jane").expect("logs").into_iter().collect::<Vec<_>>(),
            vec!["Bob.txt", "chat.txt"]
        );
        assert_eq!(archive.read_log("jane", "chat.txt").expect("read").len(), 1);
        assert!(archive.read_log("jane", "absent.txt").expect("read").is_empty());
    }

    #[test]
    fn commit_replaces_rewritten_entries_and_keeps_the_rest() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("logs.zip");
        write_zip(
            &path,
            &[
                ("jane/chat.txt", "[2023/01/01 00:00]old\n"),
                ("jane/teleport_history.txt", "keep me\n"),
            ],
        );
        let archive = ArchiveStorage::open("archive", &path, ReservedNames::default())
            .expect("open");

        archive
            .write_log("jane", "chat.txt", &sample("[2023/01/01 00:00]new\n"))
            .expect("write");
        archive
            .write_log("bob", "chat.txt", &sample("[2023/01/01 00:00]bob\n"))
            .expect("write");

        // Old content stays visible until commit.
        assert_eq!(read_entry(&path, "jane/chat.txt"), "[2023/01/01 00:00]old\n");

        assert_eq!(
            archive.commit().expect("commit"),
            CommitOutcome::Replaced {
                written: 2,
                copied: 1
            }
        );
        assert_eq!(read_entry(&path, "jane/chat.txt"), "[2023/01/01 00:00]new\n");
        assert_eq!(read_entry(&path, "bob/chat.txt"), "[2023/01/01 00:00]bob\n");
        assert_eq!(read_entry(&path, "jane/teleport_history.txt"), "keep me\n");
    }

    #[test]
    fn duplicate_writes_and_writes_after_commit_are_rejected() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("logs.zip");
        let archive = ArchiveStorage::open("archive", &path, ReservedNames::default())
            .expect("open");

        archive
            .write_log("jane", "chat.txt", &sample("a\n"))
            .expect("write");
        let err = archive
            .write_log("jane", "chat.txt", &sample("b\n"))
            .expect_err("duplicate");
        assert!(matches!(err, StorageError::DuplicateEntry(_)));

        archive.commit().expect("commit");
        assert!(matches!(
            archive.write_log("jane", "other.txt", &sample("c\n")),
            Err(StorageError::Committed)
        ));
        assert!(matches!(archive.commit(), Err(StorageError::Committed)));
        assert_eq!(read_entry(&path, "jane/chat.txt"), "a\n");
    }

    #[test]
    fn dropping_without_commit_leaves_archive_untouched() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("logs.zip");
        write_zip(&path, &[("jane/chat.txt", "original\n")]);

        {
            let archive = ArchiveStorage::open("archive", &path, ReservedNames::default())
                .expect("open");
            archive
                .write_log("jane", "chat.txt", &sample("replacement\n"))
                .expect("write");
        }

        assert_eq!(read_entry(&path, "jane/chat.txt"), "original\n");
        let files = std::fs::read_dir(tmp.path()).expect("read dir").count();
        assert_eq!(files, 1);
    }

    #[test]
    fn failed_entry_only_loses_its_own_update() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("logs.zip");
        write_zip(
            &path,
            &[
                ("jane/chat.txt", "[2023/01/01 00:00]old\n"),
                ("jane/Bob.txt", "[2023/01/01 00:00]old bob\n"),
            ],
        );
        let archive = ArchiveStorage::open("archive", &path, ReservedNames::default())
            .expect("open");

        archive
            .write_log("jane", "Bob.txt", &sample("[2023/01/01 00:00]new bob\n"))
            .expect("write");
        let err = archive
            .write_entry(entry_name("jane", "chat.txt"), &mut FailingBody { sent: false })
            .expect_err("body fails");
        assert!(err.to_string().contains("no space left on device"));
        archive
            .write_log("bob", "chat.txt", &sample("[2023/01/01 00:00]bob\n"))
            .expect("later write still accepted");

        assert_eq!(
            archive.commit().expect("commit"),
            CommitOutcome::Replaced {
                written: 2,
                copied: 1
            }
        );
        assert_eq!(read_entry(&path, "jane/chat.txt"), "[2023/01/01 00:00]old\n");
        assert_eq!(read_entry(&path, "jane/Bob.txt"), "[2023/01/01 00:00]new bob\n");
        assert_eq!(read_entry(&path, "bob/chat.txt"), "[2023/01/01 00:00]bob\n");
    }

    #[test]
    fn broken_writer_refuses_further_writes_and_commit() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("logs.zip");
        write_zip(&path, &[("jane/chat.txt", "original\n")]);
        let archive = ArchiveStorage::open("archive", &path, ReservedNames::default())
            .expect("open");

        archive
            .write_log("jane", "chat.txt", &sample("replacement\n"))
            .expect("write");
        archive
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .broken = true;

        assert!(archive.write_log("jane", "other.txt", &sample("x\n")).is_err());
        assert!(archive.commit().is_err());
        assert_eq!(read_entry(&path, "jane/chat.txt"), "original\n");
    }
}
