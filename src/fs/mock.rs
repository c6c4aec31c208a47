// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, bail, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(Vec<u8>),
    Dir(Vec<String>), // List of child names
    Link(PathBuf),
}

/// In-memory filesystem for tests.
///
/// Clones share the same underlying tree, so a test can keep one handle for
/// assertions while the code under test owns another.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
    read_only: Arc<AtomicBool>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        let mut files = HashMap::new();
        files.insert(PathBuf::from("/"), MockEntry::Dir(Vec::new()));

        Self {
            files: Arc::new(Mutex::new(files)),
            read_only: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let mut files = self.files.lock().unwrap();
        Self::insert_entry(&mut files, path.as_ref(), MockEntry::File(content.into()));
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut files = self.files.lock().unwrap();
        Self::ensure_dir_entry(&mut files, path.as_ref());
    }

    /// Make every subsequent write fail.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Target of the link at `path`, if `path` is a link.
    pub fn link_target(&self, path: impl AsRef<Path>) -> Option<PathBuf> {
        let files = self.files.lock().unwrap();
        match files.get(path.as_ref()) {
            Some(MockEntry::Link(target)) => Some(target.clone()),
            _ => None,
        }
    }

    /// Contents of the file at `path` as UTF-8, or `None` if missing.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        self.read_to_string(path.as_ref()).ok()
    }

    fn insert_entry(files: &mut HashMap<PathBuf, MockEntry>, path: &Path, entry: MockEntry) {
        files.insert(path.to_path_buf(), entry);

        if let Some(parent) = path.parent() {
            Self::ensure_dir_entry(files, parent);
            Self::add_child(files, parent, path);
        }
    }

    fn ensure_dir_entry(files: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
        if files.contains_key(path) {
            return;
        }
        files.insert(path.to_path_buf(), MockEntry::Dir(Vec::new()));

        if let Some(parent) = path.parent() {
            Self::ensure_dir_entry(files, parent);
            Self::add_child(files, parent, path);
        }
    }

    fn add_child(files: &mut HashMap<PathBuf, MockEntry>, parent: &Path, child: &Path) {
        if let Some(MockEntry::Dir(children)) = files.get_mut(parent) {
            if let Some(name) = child.file_name().and_then(|n| n.to_str()) {
                if !children.iter().any(|c| c == name) {
                    children.push(name.to_string());
                }
            }
        }
    }

    fn resolve(files: &HashMap<PathBuf, MockEntry>, path: &Path) -> Option<MockEntry> {
        Self::try_resolve(files, path).ok().flatten()
    }

    /// Follow links from `path`. More than 16 hops is reported as a loop.
    fn try_resolve(files: &HashMap<PathBuf, MockEntry>, path: &Path) -> Result<Option<MockEntry>> {
        let mut current = path.to_path_buf();
        for _ in 0..16 {
            match files.get(&current) {
                Some(MockEntry::Link(target)) => current = target.clone(),
                Some(other) => return Ok(Some(other.clone())),
                None => return Ok(None),
            }
        }
        bail!("Too many levels of symbolic links: {:?}", path)
    }

    fn check_writable(&self, path: &Path) -> Result<()> {
        if self.read_only.load(Ordering::SeqCst) {
            bail!("Read-only filesystem: {:?}", path);
        }
        Ok(())
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let files = self.files.lock().unwrap();
        match Self::resolve(&files, path) {
            Some(MockEntry::File(content)) => {
                String::from_utf8(content).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            Some(_) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn append_line(&self, path: &Path, line: &str) -> Result<()> {
        self.check_writable(path)?;
        let mut files = self.files.lock().unwrap();
        let mut content = match files.get(path) {
            Some(MockEntry::File(existing)) => existing.clone(),
            Some(_) => bail!("Not a regular file: {:?}", path),
            None => Vec::new(),
        };
        content.extend_from_slice(line.as_bytes());
        content.push(b'\n');
        Self::insert_entry(&mut files, path, MockEntry::File(content));
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.check_writable(path)?;
        self.add_dir(path);
        Ok(())
    }

    fn symlink(&self, original: &Path, link: &Path) -> Result<()> {
        self.check_writable(link)?;
        let mut files = self.files.lock().unwrap();
        if files.contains_key(link) {
            bail!("File exists: {:?}", link);
        }
        Self::insert_entry(&mut files, link, MockEntry::Link(original.to_path_buf()));
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap();
        Self::resolve(&files, path).is_some()
    }

    fn try_exists(&self, path: &Path) -> Result<bool> {
        let files = self.files.lock().unwrap();
        Ok(Self::try_resolve(&files, path)?.is_some())
    }

    fn is_dir(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap();
        matches!(Self::resolve(&files, path), Some(MockEntry::Dir(_)))
    }

    fn is_symlink(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap();
        matches!(files.get(path), Some(MockEntry::Link(_)))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let files = self.files.lock().unwrap();
        match Self::resolve(&files, path) {
            Some(MockEntry::Dir(children)) => {
                Ok(children.iter().map(|name| path.join(name)).collect())
            }
            _ => Err(anyhow!("Not a directory or not found: {:?}", path)),
        }
    }
}
