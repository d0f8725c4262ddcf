use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Exclusive advisory lock on `<file>.lock`, released on drop. Record files
/// are replaced by rename, so the lock cannot live on the file itself.
pub(crate) struct AdvisoryFileLock {
    file: File,
}

impl AdvisoryFileLock {
    pub fn acquire(target: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path_for(target))?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }
}

impl Drop for AdvisoryFileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

pub(crate) fn lock_path_for(target: &Path) -> PathBuf {
    match target.file_name() {
        Some(name) => target.with_file_name(format!("{}.lock", name.to_string_lossy())),
        None => target.with_extension("lock"),
    }
}
