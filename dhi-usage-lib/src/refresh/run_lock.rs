use crate::Result;
use camino::{Utf8Path, Utf8PathBuf};
use fs4::fs_std::FileExt;
use ohno::IntoAppError;
use std::fs::{File, OpenOptions};

const LOG_TARGET: &str = "   refresh";

/// Advisory lock on a catalog file, held for the length of a run.
///
/// Every process that refreshes the same catalog takes this lock, so `serve` and a
/// foreground `refresh` never run at once. The OS drops the lock if the holder dies.
#[derive(Debug)]
pub struct RunLock(File);

impl RunLock {
    /// Claim the run lock beside `catalog`, or `None` if another holder has it
    pub fn try_acquire(catalog: &Utf8Path) -> Result<Option<Self>> {
        let lock_path = lock_path(catalog);

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .into_app_err_with(|| format!("opening refresh lock file at '{lock_path}'"))?;

        let acquired = file
            .try_lock_exclusive()
            .into_app_err_with(|| format!("locking '{lock_path}'"))?;

        if !acquired {
            log::debug!(target: LOG_TARGET, "Refresh lock at '{lock_path}' is held elsewhere");
            return Ok(None);
        }

        log::debug!(target: LOG_TARGET, "Acquired refresh lock at '{lock_path}'");
        Ok(Some(Self(file)))
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.0) {
            log::warn!(target: LOG_TARGET, "Could not release refresh lock: {e:#}");
        }
    }
}

fn lock_path(catalog: &Utf8Path) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{catalog}.lock"))
}
