//! Filesystem blob store.
//!
//! One file per blob under a root directory.  Used on boards that mount a
//! flash filesystem (SPIFFS / LittleFS through the ESP-IDF VFS) and on the
//! host for simulation.
//!
//! Writes go to a hidden temp file in the same directory, are flushed and
//! `fsync`ed, then renamed over the destination.  A crash at any point
//! leaves either the old or the new contents, never a mix.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::debug;

use crate::app::ports::BlobStore;
use crate::error::StorageError;

pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    /// Store rooted at `root`; the directory is created if missing.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> Result<PathBuf, StorageError> {
        if name.is_empty()
            || name.starts_with('.')
            || name.contains(['/', '\\', '\0'])
        {
            return Err(StorageError::InvalidName);
        }
        Ok(self.root.join(name))
    }

    fn tmp_path(&self, name: &str) -> PathBuf {
        self.root.join(format!(".{name}.tmp"))
    }
}

impl BlobStore for FileBlobStore {
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(self.path(name)?) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, name: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.path(name)?;
        let tmp = self.tmp_path(name);

        let written = (|| -> std::io::Result<()> {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp)?;
            file.write_all(data)?;
            file.flush()?;
            file.sync_all()
        })();
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        fs::rename(&tmp, &path)?;
        // Not every VFS supports opening a directory.
        if let Ok(dir) = File::open(&self.root) {
            let _ = dir.sync_all();
        }
        debug!("FS: wrote '{}' ({} bytes)", path.display(), data.len());
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path(name)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, name: &str) -> bool {
        self.path(name).is_ok_and(|p| p.is_file())
    }
}
