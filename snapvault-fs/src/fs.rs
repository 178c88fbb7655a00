//! Filesystem abstraction.
//!
//! Snapshot state lives entirely in directory names, so the operations the
//! repository needs are listing, atomic rename, recursive removal and a
//! handful of small-file helpers for the pid lock. Everything goes through
//! [`Filesystem`] so the state machine can be tested against
//! [`MockFilesystem`], including injected rename and removal failures.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use thiserror::Error;

/// Errors from filesystem operations.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("path error: {0}")]
    Path(String),
}

impl FsError {
    /// The underlying IO error kind, if any.
    pub fn kind(&self) -> Option<io::ErrorKind> {
        match self {
            FsError::Io(e) => Some(e.kind()),
            FsError::Path(_) => None,
        }
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DirEntry {
    pub name: String,
    /// True for real directories; symlinks are never reported as directories.
    pub is_dir: bool,
}

/// Trait for filesystem operations.
pub trait Filesystem: Send + Sync {
    /// List the direct children of `dir`, sorted by name.
    fn list_dir(&self, dir: &Path) -> Result<Vec<DirEntry>, FsError>;

    /// Create a single directory. Fails if it already exists.
    fn create_dir(&self, path: &Path) -> Result<(), FsError>;

    /// Create a directory and all missing parents.
    fn create_dir_all(&self, path: &Path) -> Result<(), FsError>;

    /// Atomically rename `from` to `to`.
    fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError>;

    /// Recursively remove a directory tree.
    fn remove_dir_all(&self, path: &Path) -> Result<(), FsError>;

    /// Point the symlink at `link` to `target`, replacing an existing
    /// symlink. A non-symlink at `link` is left alone and reported as an error.
    fn replace_symlink(&self, target: &Path, link: &Path) -> Result<(), FsError>;

    /// Read the target of a symlink.
    fn read_link(&self, link: &Path) -> Result<PathBuf, FsError>;

    /// Create a new file with `data`. Fails if the file already exists.
    fn create_new(&self, path: &Path, data: &[u8]) -> Result<(), FsError>;

    /// Read file contents as a string.
    fn read_file(&self, path: &Path) -> Result<String, FsError>;

    /// Remove a file.
    fn remove_file(&self, path: &Path) -> Result<(), FsError>;
}

impl<F: Filesystem + ?Sized> Filesystem for &F {
    fn list_dir(&self, dir: &Path) -> Result<Vec<DirEntry>, FsError> {
        (**self).list_dir(dir)
    }

    fn create_dir(&self, path: &Path) -> Result<(), FsError> {
        (**self).create_dir(path)
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        (**self).create_dir_all(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        (**self).rename(from, to)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<(), FsError> {
        (**self).remove_dir_all(path)
    }

    fn replace_symlink(&self, target: &Path, link: &Path) -> Result<(), FsError> {
        (**self).replace_symlink(target, link)
    }

    fn read_link(&self, link: &Path) -> Result<PathBuf, FsError> {
        (**self).read_link(link)
    }

    fn create_new(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        (**self).create_new(path, data)
    }

    fn read_file(&self, path: &Path) -> Result<String, FsError> {
        (**self).read_file(path)
    }

    fn remove_file(&self, path: &Path) -> Result<(), FsError> {
        (**self).remove_file(path)
    }
}

/// Real filesystem implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFilesystem;

impl Filesystem for RealFilesystem {
    fn list_dir(&self, dir: &Path) -> Result<Vec<DirEntry>, FsError> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let is_dir = entry.file_type()?.is_dir();
            let name = entry.file_name().to_string_lossy().into_owned();
            entries.push(DirEntry { name, is_dir });
        }
        entries.sort();
        Ok(entries)
    }

    fn create_dir(&self, path: &Path) -> Result<(), FsError> {
        fs::create_dir(path)?;
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        fs::create_dir_all(path)?;
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        fs::rename(from, to)?;
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<(), FsError> {
        fs::remove_dir_all(path)?;
        Ok(())
    }

    fn replace_symlink(&self, target: &Path, link: &Path) -> Result<(), FsError> {
        if let Ok(meta) = fs::symlink_metadata(link) {
            if meta.file_type().is_symlink() {
                fs::remove_file(link)?;
            }
        }
        std::os::unix::fs::symlink(target, link)?;
        Ok(())
    }

    fn read_link(&self, link: &Path) -> Result<PathBuf, FsError> {
        Ok(fs::read_link(link)?)
    }

    fn create_new(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        file.write_all(data)?;
        file.sync_all()?;
        Ok(())
    }

    fn read_file(&self, path: &Path) -> Result<String, FsError> {
        Ok(fs::read_to_string(path)?)
    }

    fn remove_file(&self, path: &Path) -> Result<(), FsError> {
        fs::remove_file(path)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MockTree {
    dirs: BTreeSet<PathBuf>,
    files: BTreeMap<PathBuf, Vec<u8>>,
    links: BTreeMap<PathBuf, PathBuf>,
    failing_removals: HashSet<PathBuf>,
    failing_renames: HashSet<PathBuf>,
}

impl MockTree {
    fn exists(&self, path: &Path) -> bool {
        self.dirs.contains(path) || self.files.contains_key(path) || self.links.contains_key(path)
    }

    fn add_dir_all(&mut self, path: &Path) {
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            self.dirs.insert(ancestor.to_path_buf());
        }
    }

    fn parent_exists(&self, path: &Path) -> bool {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => self.dirs.contains(parent),
            _ => true,
        }
    }
}

fn io_err(kind: io::ErrorKind, what: &str, path: &Path) -> FsError {
    FsError::Io(io::Error::new(kind, format!("{}: {}", what, path.display())))
}

/// Paths at or below `root`.
fn under<'a>(paths: impl Iterator<Item = &'a PathBuf>, root: &Path) -> Vec<PathBuf> {
    paths.filter(|p| p.starts_with(root)).cloned().collect()
}

fn rebase(path: &Path, from: &Path, to: &Path) -> PathBuf {
    match path.strip_prefix(from) {
        Ok(rest) if rest.as_os_str().is_empty() => to.to_path_buf(),
        Ok(rest) => to.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

/// In-memory filesystem for testing.
///
/// Cloning creates a new handle to the same underlying tree.
#[derive(Debug, Clone, Default)]
pub struct MockFilesystem {
    tree: Arc<RwLock<MockTree>>,
}

impl MockFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directory and its parents (for test setup).
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        self.tree.write().unwrap().add_dir_all(path.as_ref());
    }

    /// Add a file, creating its parents (for test setup).
    pub fn add_file(&self, path: impl AsRef<Path>, data: Vec<u8>) {
        let path = path.as_ref();
        let mut tree = self.tree.write().unwrap();
        if let Some(parent) = path.parent() {
            tree.add_dir_all(parent);
        }
        tree.files.insert(path.to_path_buf(), data);
    }

    /// Whether `path` is a directory.
    pub fn is_dir(&self, path: impl AsRef<Path>) -> bool {
        self.tree.read().unwrap().dirs.contains(path.as_ref())
    }

    /// Whether anything (directory, file or symlink) exists at `path`.
    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.tree.read().unwrap().exists(path.as_ref())
    }

    /// Names of the directories directly under `dir`.
    pub fn dir_names(&self, dir: impl AsRef<Path>) -> Vec<String> {
        self.list_dir(dir.as_ref())
            .map(|entries| {
                entries
                    .into_iter()
                    .filter(|e| e.is_dir)
                    .map(|e| e.name)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Make every `remove_dir_all` of `path` fail without removing anything.
    pub fn fail_removal_of(&self, path: impl AsRef<Path>) {
        self.tree
            .write()
            .unwrap()
            .failing_removals
            .insert(path.as_ref().to_path_buf());
    }

    /// Make every rename whose source is `path` fail.
    pub fn fail_rename_of(&self, path: impl AsRef<Path>) {
        self.tree
            .write()
            .unwrap()
            .failing_renames
            .insert(path.as_ref().to_path_buf());
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        let mut tree = self.tree.write().unwrap();
        tree.failing_removals.clear();
        tree.failing_renames.clear();
    }
}

impl Filesystem for MockFilesystem {
    fn list_dir(&self, dir: &Path) -> Result<Vec<DirEntry>, FsError> {
        let tree = self.tree.read().unwrap();
        if !tree.dirs.contains(dir) {
            return Err(io_err(io::ErrorKind::NotFound, "no such directory", dir));
        }

        let child_name = |path: &Path| -> Option<String> {
            if path.parent() == Some(dir) {
                path.file_name().map(|n| n.to_string_lossy().into_owned())
            } else {
                None
            }
        };

        let mut entries: Vec<DirEntry> = tree
            .dirs
            .iter()
            .filter_map(|p| child_name(p.as_path()).map(|name| DirEntry { name, is_dir: true }))
            .chain(
                tree.files
                    .keys()
                    .chain(tree.links.keys())
                    .filter_map(|p| {
                        child_name(p.as_path()).map(|name| DirEntry { name, is_dir: false })
                    }),
            )
            .collect();
        entries.sort();
        Ok(entries)
    }

    fn create_dir(&self, path: &Path) -> Result<(), FsError> {
        let mut tree = self.tree.write().unwrap();
        if tree.exists(path) {
            return Err(io_err(io::ErrorKind::AlreadyExists, "already exists", path));
        }
        if !tree.parent_exists(path) {
            return Err(io_err(io::ErrorKind::NotFound, "missing parent", path));
        }
        tree.dirs.insert(path.to_path_buf());
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        self.tree.write().unwrap().add_dir_all(path);
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        let mut tree = self.tree.write().unwrap();
        if tree.failing_renames.contains(from) {
            return Err(io_err(io::ErrorKind::PermissionDenied, "simulated rename failure", from));
        }
        if !tree.exists(from) {
            return Err(io_err(io::ErrorKind::NotFound, "no such path", from));
        }
        if tree.exists(to) {
            return Err(io_err(io::ErrorKind::AlreadyExists, "already exists", to));
        }

        let dirs = under(tree.dirs.iter(), from);
        for dir in dirs {
            tree.dirs.remove(&dir);
            tree.dirs.insert(rebase(&dir, from, to));
        }
        let files = under(tree.files.keys(), from);
        for file in files {
            if let Some(data) = tree.files.remove(&file) {
                tree.files.insert(rebase(&file, from, to), data);
            }
        }
        let links = under(tree.links.keys(), from);
        for link in links {
            if let Some(target) = tree.links.remove(&link) {
                tree.links.insert(rebase(&link, from, to), target);
            }
        }
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<(), FsError> {
        let mut tree = self.tree.write().unwrap();
        if tree.failing_removals.contains(path) {
            return Err(io_err(io::ErrorKind::PermissionDenied, "simulated removal failure", path));
        }
        if !tree.dirs.contains(path) {
            return Err(io_err(io::ErrorKind::NotFound, "no such directory", path));
        }
        tree.dirs.retain(|p| !p.starts_with(path));
        tree.files.retain(|p, _| !p.starts_with(path));
        tree.links.retain(|p, _| !p.starts_with(path));
        Ok(())
    }

    fn replace_symlink(&self, target: &Path, link: &Path) -> Result<(), FsError> {
        let mut tree = self.tree.write().unwrap();
        tree.links.remove(link);
        if tree.exists(link) {
            return Err(io_err(io::ErrorKind::AlreadyExists, "not a symlink", link));
        }
        if !tree.parent_exists(link) {
            return Err(io_err(io::ErrorKind::NotFound, "missing parent", link));
        }
        tree.links.insert(link.to_path_buf(), target.to_path_buf());
        Ok(())
    }

    fn read_link(&self, link: &Path) -> Result<PathBuf, FsError> {
        self.tree
            .read()
            .unwrap()
            .links
            .get(link)
            .cloned()
            .ok_or_else(|| io_err(io::ErrorKind::NotFound, "no such symlink", link))
    }

    fn create_new(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        let mut tree = self.tree.write().unwrap();
        if tree.exists(path) {
            return Err(io_err(io::ErrorKind::AlreadyExists, "already exists", path));
        }
        if !tree.parent_exists(path) {
            return Err(io_err(io::ErrorKind::NotFound, "missing parent", path));
        }
        tree.files.insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }

    fn read_file(&self, path: &Path) -> Result<String, FsError> {
        let tree = self.tree.read().unwrap();
        match tree.files.get(path) {
            Some(data) => String::from_utf8(data.clone())
                .map_err(|e| FsError::Path(format!("invalid utf8: {}", e))),
            None => Err(io_err(io::ErrorKind::NotFound, "file not found", path)),
        }
    }

    fn remove_file(&self, path: &Path) -> Result<(), FsError> {
        let mut tree = self.tree.write().unwrap();
        if tree.files.remove(path).is_none() && tree.links.remove(path).is_none() {
            return Err(io_err(io::ErrorKind::NotFound, "file not found", path));
        }
        Ok(())
    }
}
