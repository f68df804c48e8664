//! Reference resolution: turning a reference path plus the referencing node's id into the id of
//! the target node, and loading that node's source.
//!
//! The builder only sees the [`NodeReferenceResolver`] trait, so the filesystem resolver can be
//! swapped for the in-memory one (or wrapped in a [`CachingResolver`]) without touching it.

use parking_lot::RwLock;
use std::{
    collections::HashMap,
    fs::read_to_string,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};
use walkdir::WalkDir;

use crate::{
    error::ContextNetworkError,
    paths::path::{
        file_name, file_stem, join, normalize, os_path_to_string, parent_dir, string_to_os_path,
        strip_fragment,
    },
    properties::{ReferenceType, ID_PREFIX},
};

const MAX_SUGGESTIONS: usize = 5;

pub trait NodeReferenceResolver {
    /// Id of the node `path` points at, resolved against the referencing node `base_path`.
    fn resolve(&self, path: &str, base_path: &str) -> Result<String, ContextNetworkError>;

    fn validate(&self, path: &str, base_path: &str) -> bool {
        self.resolve(path, base_path).is_ok()
    }

    /// Raw source of an already resolved node id.
    fn load(&self, id: &str) -> Result<String, ContextNetworkError>;

    /// Id of the network's entry node.
    fn resolve_entry(&self, entry: &str) -> Result<String, ContextNetworkError> {
        self.resolve(entry, "")
    }
}

impl<R: NodeReferenceResolver + ?Sized> NodeReferenceResolver for &R {
    fn resolve(&self, path: &str, base_path: &str) -> Result<String, ContextNetworkError> {
        (**self).resolve(path, base_path)
    }

    fn validate(&self, path: &str, base_path: &str) -> bool {
        (**self).validate(path, base_path)
    }

    fn load(&self, id: &str) -> Result<String, ContextNetworkError> {
        (**self).load(id)
    }

    fn resolve_entry(&self, entry: &str) -> Result<String, ContextNetworkError> {
        (**self).resolve_entry(entry)
    }
}

/// Root-relative id for a file reference: `/`-rooted paths start at the network root, anything
/// else starts at the referencing node's directory.
fn relative_id(path: &str, base_path: &str) -> Result<String, ContextNetworkError> {
    let target = strip_fragment(path).trim();
    let joined = if target.starts_with('/') {
        normalize(target)
    } else {
        join(parent_dir(base_path), target)
    };
    match joined {
        Some(id) if !id.is_empty() => Ok(id),
        Some(_) => Err(ContextNetworkError::not_found(path, base_path)),
        None => Err(ContextNetworkError::PathResolution(format!(
            "'{path}' referenced from '{base_path}' escapes the network root"
        ))),
    }
}

/// Resolves file references against a directory tree rooted at `root`.
#[derive(Debug, Clone)]
pub struct FilesystemResolver {
    root: PathBuf,
}

impl FilesystemResolver {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, ContextNetworkError> {
        let root = root.as_ref().canonicalize()?;
        if !root.is_dir() {
            return Err(ContextNetworkError::PathResolution(format!(
                "network root {root:?} is not a directory"
            )));
        }
        Ok(FilesystemResolver { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn os_path(&self, id: &str) -> PathBuf {
        self.root.join(string_to_os_path(id))
    }

    /// The real location of `id`, which must stay inside the root once symlinks are followed.
    fn contained(&self, id: &str) -> Result<PathBuf, ContextNetworkError> {
        let canonical = self.os_path(id).canonicalize()?;
        if canonical.starts_with(&self.root) {
            Ok(canonical)
        } else {
            Err(ContextNetworkError::PathResolution(format!(
                "'{id}' resolves to {canonical:?}, outside the network root {:?}",
                self.root
            )))
        }
    }

    /// Files under the root that share the requested file name or stem.
    fn suggestions(&self, id: &str) -> Vec<String> {
        let wanted_name = file_name(id).to_lowercase();
        let wanted_stem = file_stem(id).to_lowercase();
        let mut found: Vec<String> = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let rel = entry.path().strip_prefix(&self.root).ok()?;
                let rel = os_path_to_string(rel);
                let name = file_name(&rel).to_lowercase();
                let stem = file_stem(&rel).to_lowercase();
                (name == wanted_name || stem == wanted_stem).then_some(rel)
            })
            .collect();
        found.sort();
        found.truncate(MAX_SUGGESTIONS);
        found
    }
}

impl NodeReferenceResolver for FilesystemResolver {
    fn resolve(&self, path: &str, base_path: &str) -> Result<String, ContextNetworkError> {
        if ReferenceType::infer(path) != ReferenceType::File {
            tracing::debug!("Filesystem resolver cannot resolve non-file reference '{path}'");
            return Err(ContextNetworkError::not_found(path, base_path));
        }
        let id = relative_id(path, base_path)?;
        if self.os_path(&id).is_file() {
            self.contained(&id)?;
            Ok(id)
        } else {
            let suggestions = self.suggestions(&id);
            tracing::debug!("'{path}' from '{base_path}' not found as '{id}'");
            Err(ContextNetworkError::NodeReferenceNotFound {
                path: path.to_string(),
                referenced_from: base_path.to_string(),
                suggestions,
            })
        }
    }

    fn load(&self, id: &str) -> Result<String, ContextNetworkError> {
        let os_path = self.contained(id)?;
        tracing::debug!("Reading {:?}", os_path);
        Ok(read_to_string(os_path)?)
    }

    /// Absolute OS paths inside the root are accepted as entry points; any other entry is
    /// treated as root-relative.
    fn resolve_entry(&self, entry: &str) -> Result<String, ContextNetworkError> {
        let os_entry = Path::new(entry);
        if os_entry.is_absolute() && os_entry.exists() {
            let canonical = os_entry.canonicalize()?;
            let rel = canonical.strip_prefix(&self.root).map_err(|_| {
                ContextNetworkError::PathResolution(format!(
                    "entry {entry} lies outside the network root {:?}",
                    self.root
                ))
            })?;
            return self.resolve(&os_path_to_string(rel), "");
        }
        self.resolve(entry, "")
    }
}

/// Resolves references against sources held in memory, keyed by id.
///
/// File references are resolved with the same relative/rooted rules as [`FilesystemResolver`],
/// so ids shaped like paths behave like files. `id:` references are looked up verbatim.
#[derive(Debug, Clone, Default)]
pub struct InMemoryResolver {
    sources: HashMap<String, String>,
}

impl InMemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<I: Into<String>, S: Into<String>>(&mut self, id: I, source: S) -> &mut Self {
        self.sources.insert(id.into(), source.into());
        self
    }

    pub fn with<I: Into<String>, S: Into<String>>(mut self, id: I, source: S) -> Self {
        self.insert(id, source);
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl NodeReferenceResolver for InMemoryResolver {
    fn resolve(&self, path: &str, base_path: &str) -> Result<String, ContextNetworkError> {
        let id = match ReferenceType::infer(path) {
            ReferenceType::Id => path[ID_PREFIX.len()..].trim().to_string(),
            ReferenceType::Uri if self.sources.contains_key(path) => path.to_string(),
            ReferenceType::Uri => return Err(ContextNetworkError::not_found(path, base_path)),
            ReferenceType::File => relative_id(path, base_path)?,
        };
        if self.sources.contains_key(&id) {
            Ok(id)
        } else {
            Err(ContextNetworkError::not_found(path, base_path))
        }
    }

    fn load(&self, id: &str) -> Result<String, ContextNetworkError> {
        self.sources
            .get(id)
            .cloned()
            .ok_or_else(|| ContextNetworkError::not_found(id, id))
    }
}

/// Memoizes [`NodeReferenceResolver::load`] for repeated builds over the same sources.
///
/// Resolution itself is delegated on every call, so a missing or moved file is still reported;
/// only file contents are cached. Call [`CachingResolver::invalidate`] when a source changes.
#[derive(Debug)]
pub struct CachingResolver<R> {
    inner: R,
    cache: RwLock<HashMap<String, String>>,
    hits: AtomicUsize,
}

impl<R: NodeReferenceResolver> CachingResolver<R> {
    pub fn new(inner: R) -> Self {
        CachingResolver {
            inner,
            cache: RwLock::new(HashMap::new()),
            hits: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn cached(&self) -> usize {
        self.cache.read().len()
    }

    pub fn invalidate(&self, id: &str) {
        self.cache.write().remove(id);
    }

    pub fn clear(&self) {
        self.cache.write().clear();
    }
}

impl<R: NodeReferenceResolver> NodeReferenceResolver for CachingResolver<R> {
    fn resolve(&self, path: &str, base_path: &str) -> Result<String, ContextNetworkError> {
        self.inner.resolve(path, base_path)
    }

    fn load(&self, id: &str) -> Result<String, ContextNetworkError> {
        if let Some(source) = self.cache.read().get(id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(source.clone());
        }
        let source = self.inner.load(id)?;
        self.cache.write().insert(id.to_string(), source.clone());
        Ok(source)
    }

    fn resolve_entry(&self, entry: &str) -> Result<String, ContextNetworkError> {
        self.inner.resolve_entry(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn fixture() -> (tempfile::TempDir, FilesystemResolver) {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("blueprints")).unwrap();
        fs::create_dir_all(dir.path().join("instructions")).unwrap();
        fs::write(dir.path().join("blueprints/research.yaml"), "a: 1\n").unwrap();
        fs::write(dir.path().join("instructions/analyze.md"), "# Analyze\n").unwrap();
        let resolver = FilesystemResolver::new(dir.path()).unwrap();
        (dir, resolver)
    }

    #[test]
    fn test_relative_to_referencing_directory() {
        let (_dir, resolver) = fixture();
        assert_eq!(
            resolver
                .resolve("../instructions/analyze.md", "blueprints/research.yaml")
                .unwrap(),
            "instructions/analyze.md"
        );
        assert!(resolver.validate("../instructions/analyze.md#part", "blueprints/research.yaml"));
    }

    #[test]
    fn test_rooted_paths_use_network_root() {
        let (_dir, resolver) = fixture();
        assert_eq!(
            resolver
                .resolve("/instructions/analyze.md", "blueprints/research.yaml")
                .unwrap(),
            "instructions/analyze.md"
        );
    }

    #[test]
    fn test_escape_is_path_resolution_error() {
        let (_dir, resolver) = fixture();
        let err = resolver
            .resolve("../../etc/passwd", "blueprints/research.yaml")
            .unwrap_err();
        assert!(matches!(err, ContextNetworkError::PathResolution(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_out_of_root_is_path_resolution_error() {
        let (dir, resolver) = fixture();
        let outside = tempdir().unwrap();
        fs::write(outside.path().join("secret.md"), "outside\n").unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.md"),
            dir.path().join("instructions/link.md"),
        )
        .unwrap();
        std::os::unix::fs::symlink(
            dir.path().join("instructions/analyze.md"),
            dir.path().join("instructions/alias.md"),
        )
        .unwrap();

        let err = resolver
            .resolve("../instructions/link.md", "blueprints/research.yaml")
            .unwrap_err();
        assert!(matches!(err, ContextNetworkError::PathResolution(_)));
        assert!(matches!(
            resolver.load("instructions/link.md").unwrap_err(),
            ContextNetworkError::PathResolution(_)
        ));

        // Links that stay inside the root still resolve
        assert_eq!(
            resolver
                .resolve("../instructions/alias.md", "blueprints/research.yaml")
                .unwrap(),
            "instructions/alias.md"
        );
        assert_eq!(resolver.load("instructions/alias.md").unwrap(), "# Analyze\n");
    }

    #[test]
    fn test_missing_file_suggests_near_matches() {
        let (_dir, resolver) = fixture();
        let err = resolver
            .resolve("analyze.md", "blueprints/research.yaml")
            .unwrap_err();
        match err {
            ContextNetworkError::NodeReferenceNotFound {
                path,
                referenced_from,
                suggestions,
            } => {
                assert_eq!(path, "analyze.md");
                assert_eq!(referenced_from, "blueprints/research.yaml");
                assert_eq!(suggestions, vec!["instructions/analyze.md".to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_uri_references_are_not_resolved() {
        let (_dir, resolver) = fixture();
        assert!(resolver
            .resolve("https://example.com/a.md", "blueprints/research.yaml")
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_absolute_entry_inside_root() {
        let (dir, resolver) = fixture();
        let entry = dir.path().join("blueprints/research.yaml");
        assert_eq!(
            resolver.resolve_entry(entry.to_str().unwrap()).unwrap(),
            "blueprints/research.yaml"
        );
        assert_eq!(
            resolver.resolve_entry("blueprints/research.yaml").unwrap(),
            "blueprints/research.yaml"
        );
    }

    #[test]
    fn test_in_memory_resolver() {
        let resolver = InMemoryResolver::new()
            .with("blueprints/a.yaml", "x: 1")
            .with("shared", "# Shared");
        assert_eq!(
            resolver.resolve("a.yaml", "blueprints/b.yaml").unwrap(),
            "blueprints/a.yaml"
        );
        assert_eq!(resolver.resolve("id:shared", "anything").unwrap(), "shared");
        assert!(resolver.resolve("missing.md", "").unwrap_err().is_not_found());
        assert_eq!(resolver.load("shared").unwrap(), "# Shared");
    }

    #[test]
    fn test_caching_resolver_memoizes_loads() {
        let resolver = CachingResolver::new(InMemoryResolver::new().with("a.md", "# A"));
        assert_eq!(resolver.load("a.md").unwrap(), "# A");
        assert_eq!(resolver.load("a.md").unwrap(), "# A");
        assert_eq!(resolver.hits(), 1);
        assert_eq!(resolver.cached(), 1);
        resolver.invalidate("a.md");
        assert_eq!(resolver.cached(), 0);
        assert_eq!(resolver.resolve("a.md", "").unwrap(), "a.md");
    }
}
