//! Composite sources.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::bundle::{BundleFile, BundleRef};
use crate::error::{BundleError, BundleResult};
use crate::source::{Source, highest_version};

/// Tries each source in order and returns the first hit.
///
/// `NotFound` from one source moves on to the next; any other error stops
/// the search.
pub struct MultiSource {
    sources: Vec<Box<dyn Source>>,
}

impl MultiSource {
    pub fn new(sources: Vec<Box<dyn Source>>) -> Self {
        Self { sources }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl Source for MultiSource {
    fn describe(&self) -> String {
        let parts: Vec<String> = self.sources.iter().map(|s| s.describe()).collect();
        format!("multi:[{}]", parts.join(", "))
    }

    async fn get(&self, bundle: &BundleRef) -> BundleResult<BundleFile> {
        for source in &self.sources {
            match source.get(bundle).await {
                Ok(file) => {
                    debug!(%bundle, source = %source.describe(), "bundle found");
                    return Ok(file);
                }
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(BundleError::NotFound(bundle.to_string()))
    }

    async fn put(&self, _bundle: &BundleFile) -> BundleResult<()> {
        Err(BundleError::NotImplemented("multi source put".to_string()))
    }
}

/// Resolves bundles against an explicit list of local `.kb` files.
#[derive(Debug, Clone)]
pub struct MultiFileSource {
    files: Vec<PathBuf>,
}

impl MultiFileSource {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self { files }
    }

    fn candidates(&self, name: &str) -> Vec<(BundleRef, &PathBuf)> {
        self.files
            .iter()
            .filter_map(|path| {
                let filename = path.file_name()?.to_str()?;
                let found = BundleRef::from_filename(filename)?;
                (found.name == name).then_some((found, path))
            })
            .collect()
    }
}

#[async_trait]
impl Source for MultiFileSource {
    fn describe(&self) -> String {
        format!("files:{}", self.files.len())
    }

    async fn get(&self, bundle: &BundleRef) -> BundleResult<BundleFile> {
        let candidates = self.candidates(&bundle.name);
        let version = if bundle.is_latest() {
            highest_version(candidates.iter().map(|(r, _)| r.version.as_str()))
        } else {
            Some(bundle.version.clone())
        };
        let path = version.and_then(|version| {
            candidates
                .iter()
                .find(|(r, _)| r.version == version)
                .map(|(_, path)| (*path).clone())
        });

        match path {
            Some(path) => BundleFile::open(tokio::fs::read(&path).await?),
            None => Err(BundleError::NotFound(bundle.to_string())),
        }
    }

    async fn put(&self, _bundle: &BundleFile) -> BundleResult<()> {
        Err(BundleError::NotImplemented("file list put".to_string()))
    }
}
