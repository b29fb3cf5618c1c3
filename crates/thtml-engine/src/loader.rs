//! Template file access.
//!
//! The renderer never touches the filesystem directly; it reads templates
//! and resolves `t-include` paths through a [`Loader`].

use async_trait::async_trait;
use dashmap::DashMap;
use std::io;
use std::path::{Component, Path, PathBuf};

#[async_trait]
pub trait Loader: Send + Sync {
    /// Read a template's bytes.
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Resolve `relative` against the directory containing `base`.
    fn resolve(&self, base: &Path, relative: &str) -> PathBuf {
        let dir = base.parent().unwrap_or_else(|| Path::new(""));
        normalize(&dir.join(relative))
    }
}

/// Reads templates from disk with `tokio::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsLoader;

#[async_trait]
impl Loader for FsLoader {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }
}

/// Serves templates from memory, keyed by their normalized path.
#[derive(Debug, Default)]
pub struct MemoryLoader {
    files: DashMap<PathBuf, Vec<u8>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>) {
        self.files.insert(normalize(path.as_ref()), contents.into());
    }

    pub fn with_file(self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>) -> Self {
        self.insert(path, contents);
        self
    }
}

#[async_trait]
impl Loader for MemoryLoader {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files
            .get(&normalize(path))
            .map(|f| f.value().clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such template"))
    }
}

/// Read a template as UTF-8 text.
pub async fn read_text(loader: &dyn Loader, path: &Path) -> io::Result<String> {
    let bytes = loader.read(path).await?;
    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Lexically normalize a path: drop `.` and fold `..` into its parent.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
