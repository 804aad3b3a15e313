//! Checksum of a module's inputs computed from its file tree.

use crate::hashing::{Sha256HashFactory, hash_bytes};
use async_trait::async_trait;
use kiln_core::ports::{ChecksumCalculator, HashFactory};
use kiln_core::{
    CacheConfig, Coordinate, DigestIndex, DigestItem, Error, Module, ModuleIndex,
    ProjectsInputInfo, Result, Session,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

/// Hashes source files, dependencies and properties of a module.
///
/// Dependencies built earlier in the session are taken from the
/// [`DigestIndex`]; a dependency on a module of the current session that has
/// not been recorded yet fails the computation.
#[derive(Clone)]
pub struct FileTreeChecksum {
    hashes: Arc<dyn HashFactory>,
}

impl FileTreeChecksum {
    pub fn new(hashes: Arc<dyn HashFactory>) -> Self {
        Self { hashes }
    }
}

impl Default for FileTreeChecksum {
    fn default() -> Self {
        Self::new(Arc::new(Sha256HashFactory))
    }
}

fn relative_key(base_dir: &Path, path: &Path) -> String {
    path.strip_prefix(base_dir)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn source_files(module: &Module) -> Result<Vec<PathBuf>> {
    let mut roots: Vec<&PathBuf> = module
        .source_roots
        .iter()
        .chain(module.test_source_roots.iter())
        .collect();
    roots.sort();
    roots.dedup();

    let mut files = Vec::new();
    for root in roots {
        if !root.exists() {
            continue;
        }
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::ChecksumComputation {
                module: module.artifact_id().to_string(),
                reason: e.to_string(),
            })?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
    }
    Ok(files)
}

fn file_items(module: &Module, hashes: &dyn HashFactory) -> Result<Vec<DigestItem>> {
    let hasher = hashes.create();
    source_files(module)?
        .into_iter()
        .map(|file| {
            let hash = hasher.hash(&file)?;
            Ok(DigestItem::file(relative_key(&module.base_dir, &file), hash))
        })
        .collect()
}

fn dependency_items(
    module: &Module,
    index: &ModuleIndex,
    digests: &DigestIndex,
    hashes: &dyn HashFactory,
) -> Result<Vec<DigestItem>> {
    let hasher = hashes.create();
    let mut dependencies: Vec<_> = module.dependencies.iter().collect();
    dependencies.sort_by_key(|d| d.artifact_key());

    let mut items = Vec::with_capacity(dependencies.len());
    for dependency in dependencies {
        let key = dependency.artifact_key();
        if let Some(recorded) = digests.get(&key) {
            if let Some(digest) = recorded.digest() {
                items.push(DigestItem::dependency(key, digest));
                continue;
            }
        }
        let coordinate = Coordinate::new(&dependency.group_id, &dependency.artifact_id);
        if index.contains(&coordinate) {
            return Err(Error::ChecksumComputation {
                module: module.artifact_id().to_string(),
                reason: format!("session dependency {} has no recorded digest", key),
            });
        }
        match dependency.file.as_deref().filter(|f| f.is_file()) {
            Some(file) => items.push(DigestItem::dependency(key, hasher.hash(file)?)),
            None => items.push(DigestItem {
                value: Some(dependency.version.clone()),
                hash: None,
                ..DigestItem::dependency(key, "")
            }),
        }
    }
    Ok(items)
}

fn overall_checksum(module: &Module, items: &[DigestItem]) -> String {
    let mut body = format!("{}:{}\n", module.coordinate.versionless_key(), module.packaging);
    for item in items {
        body.push_str(&format!(
            "{:?}:{}:{}\n",
            item.kind,
            item.key,
            item.digest().unwrap_or_default()
        ));
    }
    hash_bytes(body.as_bytes())
}

#[async_trait]
impl ChecksumCalculator for FileTreeChecksum {
    async fn compute(
        &self,
        module: &Module,
        _session: &Session,
        _config: &CacheConfig,
        index: &ModuleIndex,
        digests: &DigestIndex,
    ) -> Result<ProjectsInputInfo> {
        let owned = module.clone();
        let hashes = self.hashes.clone();
        let mut items = tokio::task::spawn_blocking(move || file_items(&owned, hashes.as_ref()))
            .await
            .map_err(|e| Error::Internal(format!("checksum task failed: {}", e)))??;

        items.extend(dependency_items(module, index, digests, self.hashes.as_ref())?);
        items.extend(
            module
                .properties
                .iter()
                .map(|(name, value)| DigestItem::property(name, value)),
        );

        let checksum = overall_checksum(module, &items);
        debug!(
            module = %module.artifact_id(),
            checksum = %checksum,
            items = items.len(),
            "Computed module checksum"
        );
        Ok(ProjectsInputInfo::new(checksum, items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::{ArtifactDescriptor, Dependency, DigestKind};
    use tempfile::TempDir;

    fn module(dir: &Path) -> Module {
        let src = dir.join("src/main/java");
        std::fs::create_dir_all(src.join("com/acme")).unwrap();
        std::fs::write(src.join("com/acme/App.java"), "class App {}").unwrap();
        std::fs::write(src.join("com/acme/Util.java"), "class Util {}").unwrap();
        Module::new(Coordinate::new("com.acme", "app"), "1.0", dir).with_source_root(src)
    }

    async fn compute(module: &Module, index: &ModuleIndex, digests: &DigestIndex) -> Result<ProjectsInputInfo> {
        let session = Session::new(vec!["install".into()], "/w");
        FileTreeChecksum::default()
            .compute(module, &session, &CacheConfig::default(), index, digests)
            .await
    }

    #[tokio::test]
    async fn test_checksum_is_stable_and_ordered() {
        let tmp = TempDir::new().unwrap();
        let module = module(tmp.path()).with_property("java.version", "21");
        let index = ModuleIndex::default();
        let digests = DigestIndex::new();

        let first = compute(&module, &index, &digests).await.unwrap();
        let second = compute(&module, &index, &digests).await.unwrap();
        assert_eq!(first, second);

        let keys: Vec<_> = first.items.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "src/main/java/com/acme/App.java",
                "src/main/java/com/acme/Util.java",
                "java.version"
            ]
        );
    }

    #[tokio::test]
    async fn test_source_change_changes_checksum() {
        let tmp = TempDir::new().unwrap();
        let module = module(tmp.path());
        let index = ModuleIndex::default();
        let digests = DigestIndex::new();
        let before = compute(&module, &index, &digests).await.unwrap();

        std::fs::write(tmp.path().join("src/main/java/com/acme/App.java"), "class App { int x; }").unwrap();
        let after = compute(&module, &index, &digests).await.unwrap();
        assert_ne!(before.checksum, after.checksum);
    }

    #[tokio::test]
    async fn test_dependency_digest_comes_from_index() {
        let tmp = TempDir::new().unwrap();
        let module = module(tmp.path()).with_dependency(Dependency::new("com.acme", "core", "1.0"));
        let core = Coordinate::new("com.acme", "core");
        let index = ModuleIndex::from_modules([&core]);
        let digests = DigestIndex::new();

        let err = compute(&module, &index, &digests).await.unwrap_err();
        assert!(matches!(err, Error::ChecksumComputation { .. }));

        let artifact = ArtifactDescriptor {
            group_id: "com.acme".into(),
            artifact_id: "core".into(),
            version: "1.0".into(),
            artifact_type: "jar".into(),
            classifier: None,
            file_name: Some("core-1.0.jar".into()),
            file_hash: Some("f00d".into()),
            file_size: None,
        };
        digests.record(artifact.key(), DigestItem::by_module_checksum(&artifact, "c0re"));

        let info = compute(&module, &index, &digests).await.unwrap();
        let dep = info.find(DigestKind::Dependency, "com.acme:core:jar:1.0").unwrap();
        assert_eq!(dep.digest(), Some("c0re"));
    }

    #[tokio::test]
    async fn test_external_dependency_without_file_uses_version() {
        let tmp = TempDir::new().unwrap();
        let module = module(tmp.path()).with_dependency(Dependency::new("org.slf4j", "slf4j-api", "2.0.9"));
        let info = compute(&module, &ModuleIndex::default(), &DigestIndex::new())
            .await
            .unwrap();
        let dep = info
            .find(DigestKind::Dependency, "org.slf4j:slf4j-api:jar:2.0.9")
            .unwrap();
        assert_eq!(dep.digest(), Some("2.0.9"));
    }
}
