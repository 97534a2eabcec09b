//! Local directory source.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::bundle::{BundleFile, BundleRef};
use crate::error::{BundleError, BundleResult};
use crate::source::{BundleMetadata, Source, highest_version};

/// Bundles stored as `<root>/<name>-<version>.kb` files.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn resolve_latest(&self, name: &str) -> BundleResult<String> {
        let metadata_path = self.root.join(BundleMetadata::filename(name));
        match tokio::fs::read(&metadata_path).await {
            Ok(bytes) => {
                let metadata: BundleMetadata = serde_json::from_slice(&bytes).map_err(|e| {
                    BundleError::InvalidSource(format!("{}: {e}", metadata_path.display()))
                })?;
                return Ok(metadata.latest.version);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        // No side-file: fall back to the highest version on disk.
        let mut versions = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(BundleError::NotFound(format!("{name}:latest")));
            }
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name().to_string_lossy().into_owned();
            if let Some(found) = BundleRef::from_filename(&filename) {
                if found.name == name {
                    versions.push(found.version);
                }
            }
        }
        highest_version(versions.iter().map(String::as_str))
            .ok_or_else(|| BundleError::NotFound(format!("{name}:latest")))
    }
}

#[async_trait]
impl Source for DirectorySource {
    fn describe(&self) -> String {
        format!("directory:{}", self.root.display())
    }

    async fn get(&self, bundle: &BundleRef) -> BundleResult<BundleFile> {
        let version = if bundle.is_latest() {
            self.resolve_latest(&bundle.name).await?
        } else {
            bundle.version.clone()
        };
        let resolved = BundleRef::new(&bundle.name, version);
        let path = self.root.join(resolved.filename());
        debug!(path = %path.display(), "reading bundle");

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(BundleError::NotFound(resolved.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        BundleFile::open(bytes)
    }

    async fn put(&self, bundle: &BundleFile) -> BundleResult<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(bundle.filename());
        tokio::fs::write(&path, bundle.bytes()).await?;

        let metadata = BundleMetadata::for_bundle(bundle);
        let metadata_path = self
            .root
            .join(BundleMetadata::filename(&bundle.reference().name));
        let json = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| BundleError::InvalidSource(e.to_string()))?;
        tokio::fs::write(&metadata_path, json).await?;

        debug!(path = %path.display(), size = bundle.size(), "bundle stored");
        Ok(())
    }
}
