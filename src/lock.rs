//! Advisory locking of a file-backed datapool.
//!
//! An exclusive fs2 lock on the pool file itself keeps a second process (or a
//! second handle in this one) from mapping the same pool. Released on Drop.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Result;
use fs2::FileExt;

use crate::error::CacheError;

#[derive(Debug)]
pub struct PoolLock {
    file: File,
    path: PathBuf,
}

impl PoolLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PoolLock {
    fn drop(&mut self) {
        // closing the handle releases the lock anyway
        let _ = self.file.unlock();
    }
}

/// Lock the pool file without blocking. Fails with `Io` if another handle
/// already holds it.
pub fn try_lock_pool(file: &File, path: &Path) -> Result<PoolLock> {
    let handle = file
        .try_clone()
        .map_err(|e| CacheError::io(format!("dup pool handle {}", path.display()), e))?;
    handle.try_lock_exclusive().map_err(|e| {
        CacheError::io(
            format!("pool {} is locked by another user", path.display()),
            e,
        )
    })?;
    Ok(PoolLock {
        file: handle,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::kind_of;
    use std::fs::OpenOptions;

    #[test]
    fn exclusive_conflicts() {
        let path = std::env::temp_dir().join(format!(
            "sp-lock-{}-{}",
            std::process::id(),
            crate::util::now_secs()
        ));
        let f1 = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .unwrap();
        let f2 = OpenOptions::new().read(true).write(true).open(&path).unwrap();

        let g = try_lock_pool(&f1, &path).unwrap();
        assert_eq!(g.path(), path.as_path());
        let err = try_lock_pool(&f2, &path).unwrap_err();
        assert!(matches!(kind_of(&err), Some(CacheError::Io { .. })));
        drop(g);
        assert!(try_lock_pool(&f2, &path).is_ok());
        let _ = std::fs::remove_file(&path);
    }
}
