use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_ATTEMPTS: usize = 3;

#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

pub fn lock_path_for(archive: &Path) -> PathBuf {
    let mut name = archive
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "archive".into());
    name.push(".lock");
    archive.with_file_name(name)
}

impl RunLock {
    /// Returns `Ok(None)` when another run already holds the lock.
    pub fn try_acquire(archive: &Path) -> Result<Option<Self>> {
        let path = lock_path_for(archive);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        for _ in 0..LOCK_ATTEMPTS {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&path)
                .with_context(|| format!("failed to open lock file {}", path.display()))?;
            if file.try_lock_exclusive().is_err() {
                return Ok(None);
            }
            // The previous holder may have unlinked the file we opened.
            if path.exists() {
                return Ok(Some(Self { file, path }));
            }
            let _ = FileExt::unlock(&file);
        }
        Ok(None)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
        let _ = FileExt::unlock(&self.file);
    }
}
