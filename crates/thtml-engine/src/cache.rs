//! Parse-tree cache and tree-recursion registry.

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use thtml_parser::{Document, NodeId, ParseError, Parser};
use tracing::debug;

/// Parsed documents keyed by the SHA-256 of their source text.
///
/// Entries are content-addressed, so concurrent misses on the same text
/// parse twice at worst and store the same tree.
#[derive(Debug, Default)]
pub struct ParseCache {
    entries: DashMap<String, Arc<Document>>,
}

static GLOBAL: LazyLock<Arc<ParseCache>> = LazyLock::new(|| Arc::new(ParseCache::new()));

impl ParseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache used by `Engine::default()`.
    pub fn global() -> Arc<ParseCache> {
        Arc::clone(&GLOBAL)
    }

    /// SHA256 hash as hex string
    pub fn compute_hash(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Return the cached tree for `content`, parsing it on a miss.
    pub fn get_or_parse(&self, content: &str) -> Result<Arc<Document>, ParseError> {
        let hash = Self::compute_hash(content);
        if let Some(document) = self.entries.get(&hash).map(|e| Arc::clone(e.value())) {
            debug!(hash = %hash, "parse cache hit");
            return Ok(document);
        }

        debug!(hash = %hash, "parse cache miss");
        let document = Arc::new(Parser::parse(content)?);
        let stored = self.entries.entry(hash).or_insert(document);
        Ok(Arc::clone(stored.value()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

/// A parsed document together with the file it came from.
#[derive(Debug)]
pub(crate) struct Unit {
    pub document: Arc<Document>,
    pub filename: Option<PathBuf>,
}

/// What a `t-children` needs to expand one more level of a `t-tree`.
#[derive(Debug)]
pub(crate) struct TreeFrame {
    pub unit: Arc<Unit>,
    pub template: Vec<NodeId>,
    pub item_var: String,
}

/// Active `t-tree` expansions, keyed by a fresh id per invocation.
#[derive(Debug, Default)]
pub(crate) struct TreeCache {
    frames: DashMap<u64, Arc<TreeFrame>>,
    next_id: AtomicU64,
}

impl TreeCache {
    /// Register a tree expansion. The entry lives as long as the guard.
    pub fn enter(&self, frame: TreeFrame) -> TreeGuard<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.frames.insert(id, Arc::new(frame));
        debug!(tree = id, "enter tree");
        TreeGuard { cache: self, id }
    }

    pub fn get(&self, id: u64) -> Option<Arc<TreeFrame>> {
        self.frames.get(&id).map(|f| Arc::clone(f.value()))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.frames.len()
    }
}

/// Evicts its tree entry when dropped, on success and failure alike.
pub(crate) struct TreeGuard<'a> {
    cache: &'a TreeCache,
    id: u64,
}

impl TreeGuard<'_> {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for TreeGuard<'_> {
    fn drop(&mut self) {
        self.cache.frames.remove(&self.id);
        debug!(tree = self.id, "exit tree");
    }
}
