// src/fs/mod.rs

use std::fmt::Debug;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub mod mock;

/// Abstract filesystem interface.
///
/// Everything the pipeline touches on disk (history logs, artifact checks,
/// fallback links) goes through this trait so tests can run against
/// [`mock::MockFileSystem`].
pub trait FileSystem: Send + Sync + Debug {
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Append one line to `path`, creating the file (and its parent
    /// directories) if needed. The data must be flushed to stable storage
    /// before this returns.
    fn append_line(&self, path: &Path, line: &str) -> Result<()>;

    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Create `link` pointing at `original`.
    fn symlink(&self, original: &Path, link: &Path) -> Result<()>;

    fn exists(&self, path: &Path) -> bool;

    /// Like [`exists`](Self::exists), but a path whose metadata cannot be
    /// read (permissions, link loops, IO errors) is an error, not `false`.
    fn try_exists(&self, path: &Path) -> Result<bool>;

    fn is_dir(&self, path: &Path) -> bool;

    /// True if `path` itself is a symbolic link, whatever it points at.
    fn is_symlink(&self, path: &Path) -> bool;

    /// Return a list of entries in a directory.
    /// Returns full paths.
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// All files below `root`, recursively, in sorted order.
    ///
    /// Links to directories are not descended into. Links to files are
    /// listed like files.
    fn walk_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut stack = vec![root.to_path_buf()];

        while let Some(dir) = stack.pop() {
            for entry in self.read_dir(&dir)? {
                if self.is_dir(&entry) {
                    if !self.is_symlink(&entry) {
                        stack.push(entry);
                    }
                } else {
                    files.push(entry);
                }
            }
        }

        files.sort();
        Ok(files)
    }
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("reading file {:?}", path))
    }

    fn append_line(&self, path: &Path, line: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating dir {:?}", parent))?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening file {:?} for append", path))?;
        writeln!(file, "{line}").with_context(|| format!("appending to file {:?}", path))?;
        file.sync_all()
            .with_context(|| format!("syncing file {:?}", path))?;
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).with_context(|| format!("creating dir {:?}", path))
    }

    fn symlink(&self, original: &Path, link: &Path) -> Result<()> {
        #[cfg(unix)]
        let res = std::os::unix::fs::symlink(original, link);
        #[cfg(windows)]
        let res = std::os::windows::fs::symlink_file(original, link);

        res.with_context(|| format!("linking {:?} -> {:?}", link, original))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn try_exists(&self, path: &Path) -> Result<bool> {
        path.try_exists()
            .with_context(|| format!("checking existence of {:?}", path))
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_symlink(&self, path: &Path) -> bool {
        path.is_symlink()
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path).with_context(|| format!("reading dir {:?}", path))? {
            let entry = entry?;
            entries.push(entry.path());
        }
        Ok(entries)
    }
}
