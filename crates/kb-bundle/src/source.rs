//! Bundle sources.
//!
//! A [`Source`] fetches bundle archives by name and version and, where the
//! backend allows it, stores new ones. Directory and HTTP sources keep a
//! small `<name>.json` side-file recording the latest published version.

use std::path::PathBuf;

use async_trait::async_trait;
use kb_core::SourceSpec;
use serde::{Deserialize, Serialize};

use crate::bundle::{BundleFile, BundleRef};
use crate::directory::DirectorySource;
use crate::error::{BundleError, BundleResult};
use crate::http::HttpSource;

#[async_trait]
pub trait Source: Send + Sync {
    /// Human-readable location, for logs.
    fn describe(&self) -> String;

    async fn get(&self, bundle: &BundleRef) -> BundleResult<BundleFile>;

    async fn put(&self, bundle: &BundleFile) -> BundleResult<()>;
}

/// Contents of the `<name>.json` side-file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub latest: LatestVersion,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestVersion {
    pub version: String,
    pub size: u64,
}

impl BundleMetadata {
    pub fn for_bundle(bundle: &BundleFile) -> Self {
        Self {
            latest: LatestVersion {
                version: bundle.reference().version.clone(),
                size: bundle.size(),
            },
        }
    }

    pub fn filename(name: &str) -> String {
        format!("{name}.json")
    }
}

/// Build a source from a stored source record.
///
/// `section` and `release` select a sub-tree of the source (for example a
/// release channel and a release number).
pub fn new_source(
    spec: &SourceSpec,
    section: &str,
    release: &str,
) -> BundleResult<Box<dyn Source>> {
    match spec.kind.as_str() {
        "directory" | "local" => {
            let mut root = PathBuf::from(&spec.path);
            for part in [section, release] {
                if !part.is_empty() {
                    root.push(part);
                }
            }
            Ok(Box::new(DirectorySource::new(root)))
        }
        "http" | "https" => Ok(Box::new(HttpSource::new(
            &spec.path,
            section,
            release,
            spec.options.clone(),
        )?)),
        other => Err(BundleError::InvalidSource(format!(
            "unknown source type '{other}' for source '{}'",
            spec.name
        ))),
    }
}

/// Highest semver among candidate versions. Non-semver versions are ignored.
pub(crate) fn highest_version<'a>(versions: impl IntoIterator<Item = &'a str>) -> Option<String> {
    versions
        .into_iter()
        .filter_map(|v| semver::Version::parse(v).ok().map(|parsed| (parsed, v)))
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, v)| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn spec(kind: &str, path: &str) -> SourceSpec {
        SourceSpec {
            name: "main".to_string(),
            kind: kind.to_string(),
            path: path.to_string(),
            options: BTreeMap::new(),
        }
    }

    #[test]
    fn directory_source_joins_section_and_release() {
        let source = new_source(&spec("directory", "/srv/kb"), "stable", "2024.1").unwrap();
        assert_eq!(source.describe(), "directory:/srv/kb/stable/2024.1");
    }

    #[test]
    fn http_source_is_built_from_url() {
        let source = new_source(&spec("http", "https://bundles.example.com"), "stable", "").unwrap();
        assert_eq!(source.describe(), "http:https://bundles.example.com/stable");
    }

    #[test]
    fn unknown_source_type_is_rejected() {
        let err = new_source(&spec("ftp", "ftp://x"), "", "").err().unwrap();
        assert!(matches!(err, BundleError::InvalidSource(_)));
    }

    #[test]
    fn highest_version_uses_semver_ordering() {
        let versions = ["1.9.0", "1.10.0", "not-a-version", "1.10.0-rc.1"];
        assert_eq!(highest_version(versions), Some("1.10.0".to_string()));
        assert_eq!(highest_version(Vec::<&str>::new()), None);
    }
}
