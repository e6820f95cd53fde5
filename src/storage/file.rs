//! File-system storage backend.
//!
//! Writes go to buffered files that are fsynced on demand; the atomic commit
//! rename maps to `std::fs::rename`. Deletions are deferred while any open
//! input still references the file: the name is dropped from the listing
//! immediately, the physical unlink happens when the last reader releases
//! its handle.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::error::{FalxError, Result};
use crate::storage::{
    FileStorageConfig, Storage, StorageInput, StorageLock, StorageOutput,
};

/// Tracks open-input reference counts and pending deletes per file name.
#[derive(Debug, Default)]
struct FileRegistry {
    ref_counts: AHashMap<String, usize>,
    pending_delete: AHashMap<String, PathBuf>,
}

impl FileRegistry {
    fn acquire(&mut self, name: &str) {
        *self.ref_counts.entry(name.to_string()).or_insert(0) += 1;
    }

    fn release(&mut self, name: &str) -> Option<PathBuf> {
        if let Some(count) = self.ref_counts.get_mut(name) {
            *count -= 1;
            if *count == 0 {
                self.ref_counts.remove(name);
                return self.pending_delete.remove(name);
            }
        }
        None
    }

    fn is_referenced(&self, name: &str) -> bool {
        self.ref_counts.get(name).copied().unwrap_or(0) > 0
    }
}

/// Disk-backed [`Storage`] implementation.
pub struct FileStorage {
    path: PathBuf,
    config: FileStorageConfig,
    registry: Arc<Mutex<FileRegistry>>,
    closed: bool,
}

impl fmt::Debug for FileStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStorage").field("path", &self.path).finish()
    }
}

impl FileStorage {
    /// Open (creating if needed) a file storage rooted at `path`.
    pub fn new<P: AsRef<Path>>(path: P, config: FileStorageConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        Ok(FileStorage {
            path,
            config,
            registry: Arc::new(Mutex::new(FileRegistry::default())),
            closed: false,
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(FalxError::already_closed("file storage"));
        }
        Ok(())
    }

    fn resolve(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

impl Storage for FileStorage {
    fn list_all(&self) -> Result<Vec<String>> {
        self.check_open()?;
        let registry = self.registry.lock();
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    if !registry.pending_delete.contains_key(name) {
                        names.push(name.to_string());
                    }
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        self.check_open()?;
        let path = self.resolve(name);
        let file = File::open(&path)
            .map_err(|e| FalxError::storage(format!("cannot open {name}: {e}")))?;
        let len = file.metadata()?.len();
        self.registry.lock().acquire(name);
        Ok(Box::new(FileInput {
            name: name.to_string(),
            path,
            reader: BufReader::new(file),
            len,
            registry: self.registry.clone(),
            released: false,
        }))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        self.check_open()?;
        let path = self.resolve(name);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        Ok(Box::new(FileOutput {
            name: name.to_string(),
            writer: Some(BufWriter::new(file)),
            position: 0,
            sync_on_close: self.config.sync_on_close,
        }))
    }

    fn file_exists(&self, name: &str) -> bool {
        !self.registry.lock().pending_delete.contains_key(name) && self.resolve(name).is_file()
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        Ok(fs::metadata(self.resolve(name))?.len())
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.check_open()?;
        let path = self.resolve(name);
        let mut registry = self.registry.lock();
        if registry.is_referenced(name) {
            registry.pending_delete.insert(name.to_string(), path);
            Ok(())
        } else {
            fs::remove_file(&path)?;
            Ok(())
        }
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        self.check_open()?;
        fs::rename(self.resolve(old_name), self.resolve(new_name))?;
        Ok(())
    }

    fn sync(&self, names: &[&str]) -> Result<()> {
        self.check_open()?;
        for name in names {
            let file = File::open(self.resolve(name))?;
            file.sync_all()?;
        }
        Ok(())
    }

    fn sync_metadata(&self) -> Result<()> {
        self.check_open()?;
        // fsync the directory itself so renames are durable
        #[cfg(unix)]
        {
            let dir = File::open(&self.path)?;
            dir.sync_all()?;
        }
        Ok(())
    }

    fn obtain_write_lock(&self) -> Result<Box<dyn StorageLock>> {
        self.check_open()?;
        let path = self.resolve("write.lock");
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    FalxError::storage("write.lock already held")
                } else {
                    FalxError::Io(e)
                }
            })?;
        drop(file);
        Ok(Box::new(FileLock {
            name: "write.lock".to_string(),
            path,
            released: false,
        }))
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Read cursor over one on-disk file.
pub struct FileInput {
    name: String,
    path: PathBuf,
    reader: BufReader<File>,
    len: u64,
    registry: Arc<Mutex<FileRegistry>>,
    released: bool,
}

impl fmt::Debug for FileInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileInput({}, len={})", self.name, self.len)
    }
}

impl Read for FileInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Seek for FileInput {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.reader.seek(pos)
    }
}

impl StorageInput for FileInput {
    fn len(&self) -> u64 {
        self.len
    }

    fn position(&mut self) -> Result<u64> {
        Ok(self.reader.stream_position()?)
    }

    fn clone_input(&self) -> Result<Box<dyn StorageInput>> {
        let file = File::open(&self.path)?;
        self.registry.lock().acquire(&self.name);
        Ok(Box::new(FileInput {
            name: self.name.clone(),
            path: self.path.clone(),
            reader: BufReader::new(file),
            len: self.len,
            registry: self.registry.clone(),
            released: false,
        }))
    }

    fn close(&mut self) -> Result<()> {
        if !self.released {
            self.released = true;
            if let Some(path) = self.registry.lock().release(&self.name) {
                // last reference to a deleted file: unlink now
                let _ = fs::remove_file(path);
            }
        }
        Ok(())
    }
}

impl Drop for FileInput {
    fn drop(&mut self) {
        let _ = StorageInput::close(self);
    }
}

/// Write cursor over one on-disk file being created.
pub struct FileOutput {
    name: String,
    writer: Option<BufWriter<File>>,
    position: u64,
    sync_on_close: bool,
}

impl fmt::Debug for FileOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileOutput({}, pos={})", self.name, self.position)
    }
}

impl Write for FileOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "output closed"))?;
        let n = writer.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl StorageOutput for FileOutput {
    fn position(&self) -> u64 {
        self.position
    }

    fn flush_and_sync(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            if self.sync_on_close {
                writer.get_ref().sync_all()?;
            }
        }
        Ok(())
    }
}

impl Drop for FileOutput {
    fn drop(&mut self) {
        let _ = StorageOutput::close(self);
    }
}

#[derive(Debug)]
struct FileLock {
    name: String,
    path: PathBuf,
    released: bool,
}

impl StorageLock for FileLock {
    fn name(&self) -> &str {
        &self.name
    }

    fn release(&mut self) -> Result<()> {
        if !self.released {
            self.released = true;
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage(dir: &TempDir) -> FileStorage {
        FileStorage::new(dir.path(), FileStorageConfig::new(dir.path())).unwrap()
    }

    #[test]
    fn test_roundtrip() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        {
            let mut out = storage.create_output("_0.doc").unwrap();
            out.write_all(b"postings bytes").unwrap();
            out.close().unwrap();
        }
        let mut input = storage.open_input("_0.doc").unwrap();
        let mut buf = Vec::new();
        input.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"postings bytes");
    }

    #[test]
    fn test_list_all_sorted() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        for name in ["b", "a", "c"] {
            storage.create_output(name).unwrap().close().unwrap();
        }
        assert_eq!(storage.list_all().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_deferred_delete_while_open() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        {
            let mut out = storage.create_output("_0.si").unwrap();
            out.write_all(b"segment info").unwrap();
            out.close().unwrap();
        }

        let mut input = storage.open_input("_0.si").unwrap();
        storage.delete_file("_0.si").unwrap();

        // still readable through the open handle
        let mut buf = Vec::new();
        input.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"segment info");
        // but gone from the listing
        assert!(!storage.list_all().unwrap().contains(&"_0.si".to_string()));

        StorageInput::close(&mut input).unwrap();
        assert!(!dir.path().join("_0.si").exists());
    }

    #[test]
    fn test_atomic_rename() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        {
            let mut out = storage.create_output("pending_segments_2").unwrap();
            out.write_all(b"commit").unwrap();
            out.close().unwrap();
        }
        storage.rename_file("pending_segments_2", "segments_2").unwrap();
        assert!(storage.file_exists("segments_2"));
        assert!(!storage.file_exists("pending_segments_2"));
    }

    #[test]
    fn test_write_lock() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        let lock = storage.obtain_write_lock().unwrap();
        assert_eq!(lock.name(), "write.lock");
        assert!(storage.obtain_write_lock().is_err());
        drop(lock);
        assert!(storage.obtain_write_lock().is_ok());
    }
}
